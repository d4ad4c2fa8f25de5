//! Progress tracking for batch runs

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::ConcurrencyMode;

/// Lifecycle of one batch invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl BatchState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// Snapshot of a batch in progress
#[derive(Debug, Clone, Serialize)]
pub struct ProgressState {
    pub state: BatchState,
    pub total_files: usize,
    pub completed_files: usize,
    pub failed_files: usize,
    pub bytes_written: u64,
    pub elapsed_time: Duration,
}

impl ProgressState {
    fn new() -> Self {
        Self {
            state: BatchState::Idle,
            total_files: 0,
            completed_files: 0,
            failed_files: 0,
            bytes_written: 0,
            elapsed_time: Duration::ZERO,
        }
    }

    /// Files that have not settled yet
    pub fn remaining_files(&self) -> usize {
        self.total_files
            .saturating_sub(self.completed_files + self.failed_files)
    }

    pub fn completion_percentage(&self) -> f64 {
        if self.total_files == 0 {
            return 100.0;
        }
        (self.completed_files + self.failed_files) as f64 / self.total_files as f64 * 100.0
    }
}

/// Progress update event
#[derive(Debug, Clone)]
pub enum ProgressUpdate {
    Started {
        total_files: usize,
        mode: ConcurrencyMode,
    },
    FileStarted {
        source: PathBuf,
    },
    FileCompleted {
        source: PathBuf,
        output: PathBuf,
        bytes_written: u64,
    },
    FileFailed {
        source: PathBuf,
        error: String,
    },
    Finished {
        final_state: ProgressState,
    },
}

/// Thread-safe progress tracker shared by every task of a batch
pub struct ProgressTracker {
    state: Mutex<ProgressState>,
    started_at: Mutex<Option<Instant>>,
    sender: broadcast::Sender<ProgressUpdate>,

    completed: AtomicUsize,
    failed: AtomicUsize,
    bytes_written: AtomicU64,
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);

        Self {
            state: Mutex::new(ProgressState::new()),
            started_at: Mutex::new(None),
            sender,
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            bytes_written: AtomicU64::new(0),
        }
    }

    /// Enter `Running`; counters from a previous batch are reset
    pub fn start(&self) {
        *lock(&self.started_at) = Some(Instant::now());
        self.completed.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.bytes_written.store(0, Ordering::Relaxed);

        let mut state = lock(&self.state);
        *state = ProgressState::new();
        state.state = BatchState::Running;
    }

    /// Record the discovered file count and announce the batch
    pub fn discovered(&self, total_files: usize, mode: ConcurrencyMode) {
        lock(&self.state).total_files = total_files;

        let _ = self.sender.send(ProgressUpdate::Started { total_files, mode });
        info!("Starting {} batch of {} files", mode, total_files);
    }

    pub fn start_file(&self, source: PathBuf) {
        let _ = self.sender.send(ProgressUpdate::FileStarted { source });
    }

    pub fn complete_file(&self, source: PathBuf, output: PathBuf, bytes_written: u64) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes_written, Ordering::Relaxed);
        debug!("Completed {:?} -> {:?} ({} bytes)", source, output, bytes_written);

        let _ = self.sender.send(ProgressUpdate::FileCompleted {
            source,
            output,
            bytes_written,
        });
    }

    pub fn fail_file(&self, source: PathBuf, error: String) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        debug!("Failed {:?}: {}", source, error);

        let _ = self.sender.send(ProgressUpdate::FileFailed { source, error });
    }

    /// Enter a terminal state and publish the final snapshot
    pub fn finish(&self, outcome: BatchState) -> ProgressState {
        debug_assert!(outcome.is_terminal());

        let mut final_state = self.get_state();
        final_state.state = outcome;
        lock(&self.state).state = outcome;

        let _ = self.sender.send(ProgressUpdate::Finished {
            final_state: final_state.clone(),
        });

        info!(
            "Batch {:?}: {}/{} files converted in {:.2}s",
            final_state.state,
            final_state.completed_files,
            final_state.total_files,
            final_state.elapsed_time.as_secs_f64()
        );
        final_state
    }

    pub fn get_state(&self) -> ProgressState {
        let started_at = *lock(&self.started_at);

        let mut state = lock(&self.state);
        state.completed_files = self.completed.load(Ordering::Relaxed);
        state.failed_files = self.failed.load(Ordering::Relaxed);
        state.bytes_written = self.bytes_written.load(Ordering::Relaxed);
        if let (false, Some(start)) = (state.state.is_terminal(), started_at) {
            state.elapsed_time = start.elapsed();
        }
        state.clone()
    }

    /// Current lifecycle state
    pub fn batch_state(&self) -> BatchState {
        lock(&self.state).state
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.sender.subscribe()
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_starts_idle() {
        let tracker = ProgressTracker::new();
        assert_eq!(tracker.batch_state(), BatchState::Idle);
        assert_eq!(tracker.get_state().total_files, 0);
    }

    #[test]
    fn test_counts_and_terminal_state() {
        let tracker = ProgressTracker::new();
        tracker.start();
        tracker.discovered(4, ConcurrencyMode::Sequential);
        assert_eq!(tracker.batch_state(), BatchState::Running);

        tracker.complete_file("a.png".into(), "out/a.jpg".into(), 100);
        tracker.complete_file("b.png".into(), "out/b.jpg".into(), 50);
        tracker.fail_file("c.png".into(), "corrupt".to_string());

        let state = tracker.finish(BatchState::Failed);
        assert_eq!(state.state, BatchState::Failed);
        assert_eq!(state.completed_files, 2);
        assert_eq!(state.failed_files, 1);
        assert_eq!(state.bytes_written, 150);
        assert_eq!(state.remaining_files(), 1);
        assert_eq!(state.completion_percentage(), 75.0);
    }

    #[test]
    fn test_restart_resets_counters() {
        let tracker = ProgressTracker::new();
        tracker.start();
        tracker.discovered(1, ConcurrencyMode::Concurrent);
        tracker.complete_file("a.png".into(), "out/a.jpg".into(), 10);
        tracker.finish(BatchState::Completed);

        tracker.start();
        tracker.discovered(2, ConcurrencyMode::Concurrent);
        let state = tracker.get_state();
        assert_eq!(state.state, BatchState::Running);
        assert_eq!(state.completed_files, 0);
        assert_eq!(state.total_files, 2);
    }

    #[tokio::test]
    async fn test_progress_updates() {
        let tracker = ProgressTracker::new();
        let mut receiver = tracker.subscribe();

        tracker.start();
        tracker.discovered(1, ConcurrencyMode::Concurrent);
        tracker.start_file("a.png".into());
        tracker.fail_file("a.png".into(), "bad".to_string());
        tracker.finish(BatchState::Failed);

        assert!(matches!(
            receiver.recv().await.unwrap(),
            ProgressUpdate::Started { total_files: 1, mode: ConcurrencyMode::Concurrent }
        ));
        assert!(matches!(receiver.recv().await.unwrap(), ProgressUpdate::FileStarted { .. }));
        match receiver.recv().await.unwrap() {
            ProgressUpdate::FileFailed { source, error } => {
                assert_eq!(source, PathBuf::from("a.png"));
                assert_eq!(error, "bad");
            }
            other => panic!("unexpected update: {:?}", other),
        }
        match receiver.recv().await.unwrap() {
            ProgressUpdate::Finished { final_state } => {
                assert_eq!(final_state.state, BatchState::Failed);
            }
            other => panic!("unexpected update: {:?}", other),
        }
    }

    #[test]
    fn test_empty_batch_is_complete() {
        let mut state = ProgressState::new();
        state.state = BatchState::Completed;
        assert_eq!(state.completion_percentage(), 100.0);
    }
}
