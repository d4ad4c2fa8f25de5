//! Batch orchestration over every discovered image

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::cancel::CancellationSignal;
use crate::config::{ConcurrencyMode, ProcessingConfig};
use crate::destination::DestinationManager;
use crate::discovery::FileDiscovery;
use crate::error::{Result, BatchScaleError};
use crate::processing::{ConversionOutcome, ConversionTask, ConversionUnit, ImageCodec, ScaleFactor};

pub mod progress;

pub use progress::*;

/// Drives one [`ConversionUnit`] per discovered image under a [`ConcurrencyMode`].
///
/// - `Sequential` converts files one at a time in discovery order and stops
///   at the first error or cancellation.
/// - `Concurrent` spawns one task per file, at most `max_concurrent` in
///   flight, waits for every task to settle and then reports the error of
///   the earliest failed file in discovery order.
#[derive(Clone)]
pub struct BatchResizer {
    unit: ConversionUnit,
    discovery: FileDiscovery,
    mode: ConcurrencyMode,
    max_concurrent: usize,
    remove_partial_output: bool,
    progress: Arc<ProgressTracker>,
}

impl BatchResizer {
    /// Create a resizer with default processing settings and the given mode
    pub fn new(mode: ConcurrencyMode) -> Self {
        let config = ProcessingConfig {
            mode,
            ..ProcessingConfig::default()
        };
        Self::from_config(&config)
    }

    pub fn from_config(config: &ProcessingConfig) -> Self {
        let max_concurrent = config.effective_max_concurrent();
        if config.mode == ConcurrencyMode::Concurrent {
            info!("Initializing batch resizer with {} concurrent workers", max_concurrent);
        }

        Self {
            unit: ConversionUnit::new().remove_partial_output(config.remove_partial_output),
            discovery: FileDiscovery::new().case_insensitive(config.case_insensitive_extensions),
            mode: config.mode,
            max_concurrent,
            remove_partial_output: config.remove_partial_output,
            progress: Arc::new(ProgressTracker::new()),
        }
    }

    /// Replace the conversion unit, e.g. to plug in another [`ImageCodec`]
    pub fn with_unit(mut self, unit: ConversionUnit) -> Self {
        self.unit = unit;
        self
    }

    /// Swap the codec, keeping the partial output policy
    pub fn with_codec(self, codec: Arc<dyn ImageCodec>) -> Self {
        let unit = ConversionUnit::with_codec(codec).remove_partial_output(self.remove_partial_output);
        self.with_unit(unit)
    }

    /// Cap the number of files in flight in concurrent mode
    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn mode(&self) -> ConcurrencyMode {
        self.mode
    }

    /// Progress of the current or last batch
    pub fn progress(&self) -> &Arc<ProgressTracker> {
        &self.progress
    }

    pub fn state(&self) -> BatchState {
        self.progress.batch_state()
    }

    /// Resize every image under `source` into `destination`, sequentially,
    /// on the calling thread. The configured mode is ignored.
    pub fn resize_images_blocking<S: AsRef<Path>, D: AsRef<Path>>(
        &self,
        source: S,
        destination: D,
        scale: f64,
        signal: &CancellationSignal,
    ) -> Result<BatchReport> {
        let start_time = Instant::now();
        self.progress.start();

        let result = self
            .prepare_blocking(source.as_ref(), destination.as_ref(), scale)
            .and_then(|tasks| self.run_sequential(tasks, signal));

        self.settle(result, ConcurrencyMode::Sequential, destination.as_ref(), start_time)
    }

    /// Resize every image under `source` into `destination` using the
    /// configured [`ConcurrencyMode`].
    pub async fn resize_images<S: AsRef<Path>, D: AsRef<Path>>(
        &self,
        source: S,
        destination: D,
        scale: f64,
        signal: &CancellationSignal,
    ) -> Result<BatchReport> {
        let source = source.as_ref().to_path_buf();
        let destination = destination.as_ref().to_path_buf();

        match self.mode {
            ConcurrencyMode::Sequential => {
                let this = self.clone();
                let signal = signal.clone();
                tokio::task::spawn_blocking(move || {
                    this.resize_images_blocking(source, destination, scale, &signal)
                })
                .await?
            }
            ConcurrencyMode::Concurrent => {
                let start_time = Instant::now();
                self.progress.start();

                let result = match self.prepare_async(&source, &destination, scale).await {
                    Ok(tasks) => self.run_concurrent(tasks, signal).await,
                    Err(e) => Err(e),
                };

                self.settle(result, ConcurrencyMode::Concurrent, &destination, start_time)
            }
        }
    }

    fn prepare_blocking(&self, source: &Path, destination: &Path, scale: f64) -> Result<Vec<ConversionTask>> {
        let scale = ScaleFactor::new(scale)?;
        let destination = DestinationManager::new(destination);
        destination.ensure()?;

        let files = self.discovery.find_images(source)?;
        self.plan(files, &destination, scale, ConcurrencyMode::Sequential)
    }

    async fn prepare_async(&self, source: &Path, destination: &Path, scale: f64) -> Result<Vec<ConversionTask>> {
        let scale = ScaleFactor::new(scale)?;
        let destination = DestinationManager::new(destination);
        destination.ensure_async().await?;

        let discovery = self.discovery.clone();
        let source = source.to_path_buf();
        let files = tokio::task::spawn_blocking(move || discovery.find_images(source)).await??;
        self.plan(files, &destination, scale, ConcurrencyMode::Concurrent)
    }

    fn plan(
        &self,
        files: Vec<PathBuf>,
        destination: &DestinationManager,
        scale: ScaleFactor,
        mode: ConcurrencyMode,
    ) -> Result<Vec<ConversionTask>> {
        self.progress.discovered(files.len(), mode);
        info!(
            "Resizing {} images into {:?} (scale {}, {} mode)",
            files.len(), destination.root(), scale, mode
        );

        let mut seen = HashSet::new();
        files
            .into_iter()
            .map(|source| {
                let output = destination.output_path_for(&source)?;
                if !seen.insert(output.clone()) {
                    warn!("{:?} overwrites an earlier output at {:?}", source, output);
                }
                Ok(ConversionTask::new(source, output, scale))
            })
            .collect()
    }

    fn run_sequential(
        &self,
        tasks: Vec<ConversionTask>,
        signal: &CancellationSignal,
    ) -> Result<Vec<ConversionOutcome>> {
        let mut outcomes = Vec::with_capacity(tasks.len());

        for task in tasks {
            self.progress.start_file(task.source.clone());
            match self.unit.convert_file_blocking(&task, signal) {
                Ok(outcome) => {
                    self.progress.complete_file(
                        outcome.source.clone(),
                        outcome.output.clone(),
                        outcome.bytes_written,
                    );
                    outcomes.push(outcome);
                }
                Err(e) => {
                    self.progress.fail_file(task.source, e.to_string());
                    return Err(e);
                }
            }
        }

        Ok(outcomes)
    }

    async fn run_concurrent(
        &self,
        tasks: Vec<ConversionTask>,
        signal: &CancellationSignal,
    ) -> Result<Vec<ConversionOutcome>> {
        let total = tasks.len();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::new();

        // Sources sharing an output path run back to back in one task, so
        // the later file overwrites the earlier one like in sequential mode
        for lane in output_lanes(tasks) {
            let indices: Vec<usize> = lane.iter().map(|(index, _)| *index).collect();
            let unit = self.unit.clone();
            let signal = signal.clone();
            let semaphore = Arc::clone(&semaphore);
            let progress = Arc::clone(&self.progress);

            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| BatchScaleError::system(format!("Worker pool closed: {}", e)))?;

                let mut results = Vec::with_capacity(lane.len());
                for (index, task) in lane {
                    let source = task.source.clone();
                    progress.start_file(source.clone());

                    let result = unit.convert_file(task, signal.clone()).await;
                    match &result {
                        Ok(outcome) => progress.complete_file(
                            outcome.source.clone(),
                            outcome.output.clone(),
                            outcome.bytes_written,
                        ),
                        Err(e) => progress.fail_file(source, e.to_string()),
                    }
                    results.push((index, result));
                }
                Ok::<_, BatchScaleError>(results)
            });
            handles.push((indices, handle));
        }

        let (lanes, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();

        // Settle every task before reporting anything
        let joined = futures::future::join_all(handles).await;

        let mut slots: Vec<Option<Result<ConversionOutcome>>> = (0..total).map(|_| None).collect();
        for (indices, joined) in lanes.into_iter().zip(joined) {
            match joined.map_err(BatchScaleError::from).and_then(|results| results) {
                Ok(results) => {
                    for (index, result) in results {
                        slots[index] = Some(result);
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    for index in indices {
                        slots[index] = Some(Err(BatchScaleError::system(message.clone())));
                    }
                }
            }
        }

        let mut outcomes = Vec::with_capacity(total);
        let mut first_error = None;
        for slot in slots.into_iter().flatten() {
            match slot {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) if first_error.is_none() => first_error = Some(e),
                Err(e) => debug!("Additional failure in batch: {}", e),
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(outcomes),
        }
    }

    fn settle(
        &self,
        result: Result<Vec<ConversionOutcome>>,
        mode: ConcurrencyMode,
        destination: &Path,
        start_time: Instant,
    ) -> Result<BatchReport> {
        match result {
            Ok(outcomes) => {
                let final_state = self.progress.finish(BatchState::Completed);
                Ok(BatchReport {
                    mode,
                    destination: destination.to_path_buf(),
                    discovered: final_state.total_files,
                    outcomes,
                    elapsed: start_time.elapsed(),
                })
            }
            Err(e) if e.is_cancelled() => {
                self.progress.finish(BatchState::Cancelled);
                warn!("Batch cancelled; {:?} may be partially populated", destination);
                Err(e)
            }
            Err(e) => {
                self.progress.finish(BatchState::Failed);
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for BatchResizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchResizer")
            .field("mode", &self.mode)
            .field("max_concurrent", &self.max_concurrent)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Group tasks by output path, keeping discovery order inside and across groups
fn output_lanes(tasks: Vec<ConversionTask>) -> Vec<Vec<(usize, ConversionTask)>> {
    let mut lanes: Vec<Vec<(usize, ConversionTask)>> = Vec::new();
    let mut by_output: HashMap<PathBuf, usize> = HashMap::new();

    for (index, task) in tasks.into_iter().enumerate() {
        match by_output.get(&task.output) {
            Some(&lane) => lanes[lane].push((index, task)),
            None => {
                by_output.insert(task.output.clone(), lanes.len());
                lanes.push(vec![(index, task)]);
            }
        }
    }

    lanes
}

/// Result of a completed batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub mode: ConcurrencyMode,
    pub destination: PathBuf,
    /// Number of images found under the source directory
    pub discovered: usize,
    /// Per-file outcomes in discovery order
    pub outcomes: Vec<ConversionOutcome>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn converted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn total_bytes_written(&self) -> u64 {
        self.outcomes.iter().map(|o| o.bytes_written).sum()
    }

    pub fn files_per_second(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds == 0.0 {
            return 0.0;
        }
        self.converted() as f64 / seconds
    }
}
