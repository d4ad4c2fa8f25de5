//! Discovery of source images under a directory tree

use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{BatchScaleError, Result};

/// Extensions picked up by discovery, in the order their groups are returned.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Finds candidate image files below a root directory.
#[derive(Debug, Clone, Default)]
pub struct FileDiscovery {
    case_insensitive: bool,
}

impl FileDiscovery {
    /// Case-sensitive discovery (`photo.PNG` is not matched)
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle ASCII case-insensitive extension matching
    pub fn case_insensitive(mut self, enabled: bool) -> Self {
        self.case_insensitive = enabled;
        self
    }

    /// Recursively list `.png`, `.jpg` and `.jpeg` files under `root`.
    ///
    /// Paths are grouped by extension (`png`, then `jpg`, then `jpeg`). Inside
    /// a group they follow a depth-first walk with entries sorted by file
    /// name, so the result is stable for an unchanged tree.
    pub fn find_images<P: AsRef<Path>>(&self, root: P) -> Result<Vec<PathBuf>> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(BatchScaleError::not_found(root));
        }

        let mut groups: Vec<Vec<PathBuf>> = vec![Vec::new(); IMAGE_EXTENSIONS.len()];

        for entry in WalkDir::new(root).sort_by_file_name() {
            // An unreadable subtree fails the whole discovery
            let entry = entry?;

            if !entry.file_type().is_file() {
                continue;
            }

            if let Some(group) = self.extension_group(entry.path()) {
                groups[group].push(entry.into_path());
            }
        }

        let files: Vec<PathBuf> = groups.into_iter().flatten().collect();
        debug!("Discovered {} images under {:?}", files.len(), root);
        Ok(files)
    }

    /// Whether `path` carries one of the discoverable extensions
    pub fn is_image(&self, path: &Path) -> bool {
        self.extension_group(path).is_some()
    }

    fn extension_group(&self, path: &Path) -> Option<usize> {
        let extension = path.extension()?.to_str()?;
        IMAGE_EXTENSIONS.iter().position(|&candidate| {
            if self.case_insensitive {
                candidate.eq_ignore_ascii_case(extension)
            } else {
                candidate == extension
            }
        })
    }
}

/// Case-sensitive [`FileDiscovery::find_images`]
pub fn find_images<P: AsRef<Path>>(root: P) -> Result<Vec<PathBuf>> {
    FileDiscovery::new().find_images(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    fn names(files: &[PathBuf], root: &Path) -> Vec<String> {
        files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn test_case_sensitive_matching() {
        let dir = TempDir::new().unwrap();
        for name in ["a.png", "b.txt", "c.JPEG", "d.jpeg"] {
            touch(dir.path(), name);
        }

        let files = find_images(dir.path()).unwrap();
        assert_eq!(names(&files, dir.path()), vec!["a.png", "d.jpeg"]);
    }

    #[test]
    fn test_case_insensitive_matching() {
        let dir = TempDir::new().unwrap();
        for name in ["a.png", "b.txt", "c.JPEG", "d.jpeg"] {
            touch(dir.path(), name);
        }

        let files = FileDiscovery::new()
            .case_insensitive(true)
            .find_images(dir.path())
            .unwrap();
        assert_eq!(names(&files, dir.path()), vec!["a.png", "c.JPEG", "d.jpeg"]);
    }

    #[test]
    fn test_recursive_grouped_order() {
        let dir = TempDir::new().unwrap();
        for name in ["z.jpg", "b.png", "nested/a.jpeg", "nested/deeper/c.png", "nested/y.jpg"] {
            touch(dir.path(), name);
        }

        let files = find_images(dir.path()).unwrap();
        assert_eq!(
            names(&files, dir.path()),
            vec!["b.png", "nested/deeper/c.png", "nested/y.jpg", "z.jpg", "nested/a.jpeg"]
        );
        assert_eq!(files, find_images(dir.path()).unwrap());
    }

    #[test]
    fn test_directories_with_image_names_are_skipped() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("album.png")).unwrap();
        touch(dir.path(), "album.png/inner.jpg");

        let files = find_images(dir.path()).unwrap();
        assert_eq!(names(&files, dir.path()), vec!["album.png/inner.jpg"]);
    }

    #[test]
    fn test_missing_root() {
        let dir = TempDir::new().unwrap();
        let err = find_images(dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, BatchScaleError::NotFound { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_subdirectory_fails() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.png");
        touch(dir.path(), "locked/b.png");
        let locked = dir.path().join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Permission bits do not bind a privileged user
        let readable = fs::read_dir(&locked).is_ok();
        let result = find_images(dir.path());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        if readable {
            return;
        }

        match result.unwrap_err() {
            BatchScaleError::Io { file, .. } => assert_eq!(file, locked),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_empty_tree() {
        let dir = TempDir::new().unwrap();
        assert!(find_images(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_is_image() {
        let discovery = FileDiscovery::new();
        assert!(discovery.is_image(Path::new("x/photo.jpg")));
        assert!(!discovery.is_image(Path::new("x/photo.JPG")));
        assert!(!discovery.is_image(Path::new("x/photo")));
        assert!(!discovery.is_image(Path::new("x/photo.webp")));
    }
}
