//! Progress reporting for pipeline stages.
//!
//! The pipeline reports through [`ProgressCallback`] so library code never
//! depends on a terminal. The CLI plugs in `indicatif` bars; tests and
//! embedding callers use [`NullProgress`].

use std::sync::Arc;

/// Receives progress updates from a running pipeline.
///
/// Implementations must be `Send + Sync`: stages may report from rayon
/// worker threads.
pub trait ProgressCallback: Send + Sync {
    /// Set the total expected units of work (stages or rows).
    fn set_total(&self, total: u64);

    /// Advance progress by `delta` units.
    fn inc(&self, delta: u64);

    /// Update the message displayed alongside the progress indicator.
    fn set_message(&self, msg: String);

    /// Mark progress as complete with a final message.
    fn finish(&self, msg: String);
}

/// Discards all progress updates.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
