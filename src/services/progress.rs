//! Progress reporting service
//!
//! Batch progress is pushed through a [`ProgressReporter`]. Front ends pick a
//! reporter: log lines, a plain `(completed, total)` callback, or a channel that
//! carries events from a worker thread back to the caller's own context.

use instant::Instant;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// Progress after one batch item has been attempted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchProgress {
    /// Items attempted so far
    pub completed: usize,
    /// Items in the batch
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Display name of the item just attempted
    pub current_item: String,
    /// Elapsed time since the run started (milliseconds)
    pub elapsed_ms: u64,
    /// Estimated time remaining (milliseconds, once at least one item finished)
    pub eta_ms: Option<u64>,
}

impl BatchProgress {
    /// Fraction of items attempted, in `0.0..=1.0`
    #[must_use]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }

    #[must_use]
    pub fn percentage(&self) -> u8 {
        (self.fraction() * 100.0).round() as u8
    }
}

/// Final counts of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchCompletion {
    pub run_id: Uuid,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

/// A failed item, as surfaced to the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFailure {
    /// Zero-based position in the batch
    pub index: usize,
    pub name: String,
    pub reason: String,
}

impl std::fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "item {} failed: {}", self.index + 1, self.reason)
    }
}

/// Trait for reporting batch progress
pub trait ProgressReporter: Send + Sync {
    /// Called once after every attempted item, whatever its outcome
    fn report_progress(&self, update: BatchProgress);

    /// Called for each failed item, before its progress update
    fn report_item_failed(&self, failure: ItemFailure) {
        drop(failure);
    }

    /// Called once when the run is finalized
    fn report_completion(&self, completion: BatchCompletion) {
        drop(completion);
    }
}

/// No-op progress reporter that discards all progress updates
#[derive(Debug, Default)]
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: BatchProgress) {}
}

/// Progress reporter writing log lines
#[derive(Debug)]
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: BatchProgress) {
        if self.verbose {
            match update.eta_ms {
                Some(eta) => log::info!(
                    "[{}%] {}/{} {} ({}ms elapsed, ~{}ms remaining)",
                    update.percentage(),
                    update.completed,
                    update.total,
                    update.current_item,
                    update.elapsed_ms,
                    eta
                ),
                None => log::info!(
                    "[{}%] {}/{} {} ({}ms elapsed)",
                    update.percentage(),
                    update.completed,
                    update.total,
                    update.current_item,
                    update.elapsed_ms
                ),
            }
        } else {
            log::info!("[{}%] {}", update.percentage(), update.current_item);
        }
    }

    fn report_item_failed(&self, failure: ItemFailure) {
        log::error!("{} ({})", failure, failure.name);
    }

    fn report_completion(&self, completion: BatchCompletion) {
        log::info!(
            "Batch finished in {}ms: {} succeeded, {} failed of {}{}",
            completion.elapsed_ms,
            completion.succeeded,
            completion.failed,
            completion.total,
            if completion.cancelled { " (cancelled)" } else { "" }
        );
    }
}

/// Adapter for a plain `(completed, total)` callback
pub struct FnProgressReporter<F> {
    callback: F,
}

impl<F> FnProgressReporter<F>
where
    F: Fn(usize, usize) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for FnProgressReporter<F>
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn report_progress(&self, update: BatchProgress) {
        (self.callback)(update.completed, update.total);
    }
}

/// Events sent from a batch running on a worker to its caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    Progress(BatchProgress),
    ItemFailed(ItemFailure),
    Finished(BatchCompletion),
}

/// Forwards reports into a channel so they are handled on the receiver's side
///
/// Sending never blocks the worker. Events are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelProgressReporter {
    sender: UnboundedSender<PipelineEvent>,
}

impl ChannelProgressReporter {
    #[must_use]
    pub fn new(sender: UnboundedSender<PipelineEvent>) -> Self {
        Self { sender }
    }

    fn send(&self, event: PipelineEvent) {
        if self.sender.send(event).is_err() {
            log::debug!("Progress receiver dropped; discarding event");
        }
    }
}

impl ProgressReporter for ChannelProgressReporter {
    fn report_progress(&self, update: BatchProgress) {
        self.send(PipelineEvent::Progress(update));
    }

    fn report_item_failed(&self, failure: ItemFailure) {
        self.send(PipelineEvent::ItemFailed(failure));
    }

    fn report_completion(&self, completion: BatchCompletion) {
        self.send(PipelineEvent::Finished(completion));
    }
}

/// Tracks counts and timing for one run and produces progress updates
pub struct ProgressTracker<'a> {
    reporter: &'a dyn ProgressReporter,
    start_time: Instant,
    total: usize,
    succeeded: usize,
    failed: usize,
}

impl<'a> ProgressTracker<'a> {
    #[must_use]
    pub fn new(reporter: &'a dyn ProgressReporter, total: usize) -> Self {
        Self {
            reporter,
            start_time: Instant::now(),
            total,
            succeeded: 0,
            failed: 0,
        }
    }

    fn completed(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Record a successful item and notify
    pub fn item_succeeded(&mut self, name: &str) {
        self.succeeded += 1;
        self.notify(name);
    }

    /// Record a failed item and notify
    pub fn item_failed(&mut self, index: usize, name: &str, reason: &str) {
        self.failed += 1;
        self.reporter.report_item_failed(ItemFailure {
            index,
            name: name.to_string(),
            reason: reason.to_string(),
        });
        self.notify(name);
    }

    /// Surface an item skipped by cancellation; it was never attempted, so no progress update
    pub fn item_cancelled(&self, index: usize, name: &str, reason: &str) {
        self.reporter.report_item_failed(ItemFailure {
            index,
            name: name.to_string(),
            reason: reason.to_string(),
        });
    }

    fn notify(&self, name: &str) {
        let elapsed_ms = self.elapsed_ms();
        let completed = self.completed();
        let remaining = self.total.saturating_sub(completed) as u64;
        let eta_ms = (completed > 0).then(|| elapsed_ms / completed as u64 * remaining);

        self.reporter.report_progress(BatchProgress {
            completed,
            total: self.total,
            succeeded: self.succeeded,
            failed: self.failed,
            current_item: name.to_string(),
            elapsed_ms,
            eta_ms,
        });
    }

    /// Report the end of the run
    pub fn finish(&self, run_id: Uuid, total: usize, cancelled: bool) {
        self.reporter.report_completion(BatchCompletion {
            run_id,
            total,
            succeeded: self.succeeded,
            failed: total - self.succeeded,
            cancelled,
            elapsed_ms: self.elapsed_ms(),
        });
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }
}
