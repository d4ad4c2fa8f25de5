//! BatchScale - batch image downscaler
//!
//! Recursively finds PNG and JPEG images under a source directory, scales
//! each one by a single factor and writes it as a JPEG into a flat
//! destination directory. Batches run either sequentially (fail-fast) or
//! concurrently (bounded, settle-then-report), and can be cancelled
//! cooperatively through a shared [`CancellationSignal`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use batchscale::{BatchResizer, CancellationSignal, ConcurrencyMode};
//!
//! # async fn run() -> batchscale::Result<()> {
//! let resizer = BatchResizer::new(ConcurrencyMode::Concurrent).max_concurrent(4);
//! let signal = CancellationSignal::new();
//!
//! let report = resizer.resize_images("photos", "thumbs", 0.25, &signal).await?;
//! println!("Converted {} of {} images", report.converted(), report.discovered);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod cancel;
pub mod config;
pub mod destination;
pub mod discovery;
pub mod error;
pub mod parallel;
pub mod processing;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use cancel::CancellationSignal;
pub use config::{ConcurrencyMode, Config};
pub use destination::DestinationManager;
pub use discovery::FileDiscovery;
pub use error::{BatchScaleError, Result};
pub use parallel::{BatchReport, BatchResizer, BatchState};
pub use processing::{ConversionUnit, ImageCodec, JpegCodec};

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging from `RUST_LOG` and log system capabilities.
///
/// Safe to call more than once; only the first subscriber is installed.
pub fn init() -> Result<()> {
    if install_subscriber(EnvFilter::from_default_env(), false) {
        info!("BatchScale v{} initialized", VERSION);
    }

    validate_system_requirements()
}

/// Initialize with custom configuration
pub fn init_with_config(config: &Config) -> Result<()> {
    config.validate()?;

    let filter = EnvFilter::try_new(&config.logging.level).map_err(|e| {
        BatchScaleError::config(format!("Invalid log level {:?}: {}", config.logging.level, e))
    })?;

    if install_subscriber(filter, config.logging.json_format) {
        info!("BatchScale v{} initialized with custom config", VERSION);
    }

    validate_system_requirements()
}

/// Install the global subscriber. Logs always go to stderr so stdout
/// carries only command output.
fn install_subscriber(filter: EnvFilter, json: bool) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish()).is_ok()
    } else {
        tracing::subscriber::set_global_default(builder.finish()).is_ok()
    }
}

fn validate_system_requirements() -> Result<()> {
    use sysinfo::{System, SystemExt};

    let mut system = System::new();
    system.refresh_memory();

    // Decoded rasters of large photos easily reach tens of MB each
    let available_memory = system.available_memory();
    const MIN_MEMORY_MB: u64 = 256;

    if available_memory < MIN_MEMORY_MB * 1024 * 1024 {
        warn!(
            "Low available memory: {}MB (recommended: >{}MB)",
            available_memory / (1024 * 1024),
            MIN_MEMORY_MB
        );
    }

    info!(
        "Detected {} logical CPUs ({} physical)",
        num_cpus::get(),
        num_cpus::get_physical()
    );

    if !image::ImageFormat::Png.can_read() || !image::ImageFormat::Jpeg.can_write() {
        return Err(BatchScaleError::system(
            "image codecs for PNG input and JPEG output are not available",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_init() {
        // Should not fail on multiple calls
        let _ = init();
        let _ = init();
    }

    #[test]
    fn test_init_rejects_invalid_config() {
        let mut config = Config::default();
        config.processing.max_concurrent = Some(0);
        assert!(init_with_config(&config).is_err());
    }

    #[test]
    fn test_system_validation() {
        assert!(validate_system_requirements().is_ok());
    }
}
