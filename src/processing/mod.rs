//! Per-file conversion: decode, scale, encode, write

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::cancel::CancellationSignal;
use crate::destination::remove_partial;
use crate::error::{Result, BatchScaleError, ErrorContext};

pub mod codec;
pub mod resize;

pub use codec::*;
pub use resize::*;

/// One source file bound to its output path and scale factor
#[derive(Debug, Clone)]
pub struct ConversionTask {
    pub source: PathBuf,
    pub output: PathBuf,
    pub scale: ScaleFactor,
}

impl ConversionTask {
    pub fn new<S: Into<PathBuf>, O: Into<PathBuf>>(source: S, output: O, scale: ScaleFactor) -> Self {
        Self {
            source: source.into(),
            output: output.into(),
            scale,
        }
    }
}

/// Result of a completed conversion
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutcome {
    pub source: PathBuf,
    pub output: PathBuf,
    pub source_dimensions: (u32, u32),
    pub output_dimensions: (u32, u32),
    pub bytes_written: u64,
    pub elapsed: Duration,
}

/// Encoded output waiting to be written
struct Rendered {
    source_dimensions: (u32, u32),
    output_dimensions: (u32, u32),
    bytes: Vec<u8>,
}

/// Converts one source image into one JPEG in the destination.
///
/// Checkpoints: before decode, before resize, after write.
#[derive(Clone)]
pub struct ConversionUnit {
    codec: Arc<dyn ImageCodec>,
    remove_partial_output: bool,
}

impl ConversionUnit {
    /// Unit backed by the default [`JpegCodec`]
    pub fn new() -> Self {
        Self::with_codec(Arc::new(JpegCodec::new()))
    }

    pub fn with_codec(codec: Arc<dyn ImageCodec>) -> Self {
        Self {
            codec,
            remove_partial_output: true,
        }
    }

    /// Whether an output file created by a failed conversion is deleted
    pub fn remove_partial_output(mut self, enabled: bool) -> Self {
        self.remove_partial_output = enabled;
        self
    }

    /// Convert on the calling thread
    pub fn convert_file_blocking(
        &self,
        task: &ConversionTask,
        signal: &CancellationSignal,
    ) -> Result<ConversionOutcome> {
        let start_time = Instant::now();
        debug!("Converting {:?} -> {:?}", task.source, task.output);

        let rendered = render(self.codec.as_ref(), task, signal)?;

        let mut file = std::fs::File::create(&task.output).with_file_context(&task.output)?;
        if let Err(e) = std::io::Write::write_all(&mut file, &rendered.bytes) {
            drop(file);
            self.discard(&task.output);
            return Err(BatchScaleError::io(&task.output, e));
        }
        drop(file);

        signal.throw_if_cancelled()?;
        Ok(outcome(task, rendered, start_time.elapsed()))
    }

    /// Convert with the decode/resize/encode work on the blocking pool and
    /// the destination handle opened concurrently. Both sub-tasks are
    /// joined before the write starts.
    pub async fn convert_file(
        &self,
        task: ConversionTask,
        signal: CancellationSignal,
    ) -> Result<ConversionOutcome> {
        let start_time = Instant::now();
        debug!("Converting {:?} -> {:?}", task.source, task.output);

        signal.throw_if_cancelled()?;

        let render_task = {
            let codec = Arc::clone(&self.codec);
            let task = task.clone();
            let signal = signal.clone();
            tokio::task::spawn_blocking(move || render(codec.as_ref(), &task, &signal))
        };
        let open_task = tokio::spawn(open_output(task.output.clone()));

        let (rendered, file) = tokio::join!(render_task, open_task);
        let rendered = rendered.map_err(BatchScaleError::from).and_then(|r| r);
        let file = file.map_err(BatchScaleError::from).and_then(|f| f);

        let (rendered, mut file) = match (rendered, file) {
            (Ok(rendered), Ok(file)) => (rendered, file),
            (Err(e), Ok(file)) => {
                drop(file);
                self.discard(&task.output);
                return Err(e);
            }
            (Ok(_), Err(e)) | (Err(e), Err(_)) => return Err(e),
        };

        let written = async {
            file.write_all(&rendered.bytes).await?;
            file.flush().await
        }
        .await;
        drop(file);

        if let Err(e) = written {
            self.discard(&task.output);
            return Err(BatchScaleError::io(&task.output, e));
        }

        signal.throw_if_cancelled()?;
        Ok(outcome(&task, rendered, start_time.elapsed()))
    }

    fn discard(&self, output: &Path) {
        if self.remove_partial_output {
            remove_partial(output);
        }
    }
}

impl Default for ConversionUnit {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConversionUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionUnit")
            .field("remove_partial_output", &self.remove_partial_output)
            .finish_non_exhaustive()
    }
}

fn render(
    codec: &dyn ImageCodec,
    task: &ConversionTask,
    signal: &CancellationSignal,
) -> Result<Rendered> {
    signal.throw_if_cancelled()?;

    let bytes = std::fs::read(&task.source).with_file_context(&task.source)?;
    let raster = codec.decode(&bytes).with_file_context(&task.source)?;
    drop(bytes);

    let source_dimensions = (raster.width(), raster.height());
    let (width, height) = target_dimensions(source_dimensions.0, source_dimensions.1, task.scale)?;
    debug!(
        "Scaling {:?} from {}x{} to {}x{}",
        task.source, source_dimensions.0, source_dimensions.1, width, height
    );

    signal.throw_if_cancelled()?;

    let resized = codec.resize(raster, width, height)?;
    let output_dimensions = (resized.width(), resized.height());
    let bytes = codec.encode(&resized)?;

    Ok(Rendered {
        source_dimensions,
        output_dimensions,
        bytes,
    })
}

async fn open_output(path: PathBuf) -> Result<tokio::fs::File> {
    tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)
        .await
        .with_file_context(&path)
}

fn outcome(task: &ConversionTask, rendered: Rendered, elapsed: Duration) -> ConversionOutcome {
    ConversionOutcome {
        source: task.source.clone(),
        output: task.output.clone(),
        source_dimensions: rendered.source_dimensions,
        output_dimensions: rendered.output_dimensions,
        bytes_written: rendered.bytes.len() as u64,
        elapsed,
    }
}
