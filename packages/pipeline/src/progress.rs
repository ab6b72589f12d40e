//! Progress reporting for batch runs.
//!
//! Stages report how many season files or footprints they have worked
//! through, and [`run`](crate::run) how many pairs. The caller decides how
//! that is shown: `indicatif` bars in the CLI, nothing in tests.

use std::sync::Arc;

/// Receives the counts of a stage as it walks its inputs.
pub trait ProgressCallback: Send + Sync {
    /// Number of inputs the stage is about to process. Resets the count.
    fn set_total(&self, total: u64);

    /// `delta` more inputs are done, whether written, skipped or reused.
    fn inc(&self, delta: u64);

    /// Names what is being processed, usually the current pair.
    fn set_message(&self, msg: String);

    /// The last input is done; `msg` summarizes the outcome.
    fn finish(&self, msg: String);

    /// The last input is done and nothing should remain on screen.
    fn finish_and_clear(&self);
}

/// Discards every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
    fn finish_and_clear(&self) {}
}

#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}

/// Reporters for the two levels of a run: experiment/model pairs, and the
/// season files or footprints within the current pair.
#[derive(Clone)]
pub struct RunProgress {
    /// Advanced once per finished pair.
    pub pairs: Arc<dyn ProgressCallback>,
    /// Reset for every stage of every pair.
    pub items: Arc<dyn ProgressCallback>,
}

impl RunProgress {
    /// Reporters that discard every update.
    #[must_use]
    pub fn silent() -> Self {
        Self {
            pairs: null_progress(),
            items: null_progress(),
        }
    }
}
