//! Error types and handling for BatchScale

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for BatchScale operations
pub type Result<T> = std::result::Result<T, BatchScaleError>;

/// Main error type for BatchScale operations
#[derive(Debug, Error)]
pub enum BatchScaleError {
    /// Source directory does not exist
    #[error("Source directory not found: {path:?}")]
    NotFound { path: PathBuf },

    /// Source bytes are not a decodable image
    #[error("Failed to decode image: {message} (file: {file:?})")]
    Decode {
        message: String,
        file: Option<PathBuf>,
    },

    /// I/O failure tied to a specific file
    #[error("I/O error on {file:?}: {source}")]
    Io {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O failure without file context
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Operation aborted through the cancellation signal
    #[error("Operation was cancelled")]
    Cancelled,

    /// Invalid resize parameters
    #[error("Invalid resize parameters: {message}")]
    InvalidParameters { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    SerdeError(String),

    /// Runtime failures (task join, panics in workers)
    #[error("System error: {message}")]
    SystemError { message: String },
}

impl BatchScaleError {
    /// Create a new not-found error
    pub fn not_found<P: Into<PathBuf>>(path: P) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(message: S, file: Option<PathBuf>) -> Self {
        Self::Decode {
            message: message.into(),
            file,
        }
    }

    /// Create a new I/O error bound to a file
    pub fn io<P: Into<PathBuf>>(file: P, source: std::io::Error) -> Self {
        Self::Io {
            file: file.into(),
            source,
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new invalid parameters error
    pub fn invalid_parameters<S: Into<String>>(message: S) -> Self {
        Self::InvalidParameters {
            message: message.into(),
        }
    }

    /// Create a new system error
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::SystemError {
            message: message.into(),
        }
    }

    /// Whether this error came from the cancellation signal
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Get the associated file path if available
    pub fn file_path(&self) -> Option<&Path> {
        match self {
            Self::NotFound { path } => Some(path),
            Self::Io { file, .. } => Some(file),
            Self::Decode { file, .. } => file.as_deref(),
            _ => None,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound { path } => {
                format!("Source directory does not exist: {}", path.display())
            }
            Self::Decode { file: Some(file), .. } => {
                format!("Not a readable PNG or JPEG image: {}", file.display())
            }
            Self::Io { file, source } => {
                format!("Could not read or write {}: {}", file.display(), source)
            }
            Self::Cancelled => {
                "Cancelled. The destination directory may be partially populated.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<toml::de::Error> for BatchScaleError {
    fn from(err: toml::de::Error) -> Self {
        Self::SerdeError(format!("TOML parsing error: {}", err))
    }
}

impl From<serde_yaml::Error> for BatchScaleError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::SerdeError(format!("YAML parsing error: {}", err))
    }
}

impl From<walkdir::Error> for BatchScaleError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(Path::to_path_buf).unwrap_or_default();
        if let Some(ancestor) = err.loop_ancestor() {
            return Self::system(format!(
                "Directory loop: {:?} points back to {:?}", path, ancestor
            ));
        }

        match err.into_io_error() {
            Some(source) => Self::io(path, source),
            None => Self::system(format!("Directory traversal failed at {:?}", path)),
        }
    }
}

impl From<tokio::task::JoinError> for BatchScaleError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::system(format!("Task join error: {}", err))
    }
}

/// Error context extension for adding file path information
pub trait ErrorContext<T> {
    /// Add file context to an error
    fn with_file_context(self, file: &Path) -> Result<T>;
}

impl<T> ErrorContext<T> for std::result::Result<T, std::io::Error> {
    fn with_file_context(self, file: &Path) -> Result<T> {
        self.map_err(|source| BatchScaleError::io(file, source))
    }
}

impl<T> ErrorContext<T> for Result<T> {
    fn with_file_context(self, file: &Path) -> Result<T> {
        self.map_err(|error| match error {
            BatchScaleError::IoError(source) => BatchScaleError::io(file, source),
            BatchScaleError::Decode { message, file: None } => {
                BatchScaleError::decode(message, Some(file.to_path_buf()))
            }
            other => other,
        })
    }
}
