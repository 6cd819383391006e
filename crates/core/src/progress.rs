//! Loading-progress reporting and phase-boundary cancellation for generation.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{MapError, Result};

type ProgressFn = Box<dyn FnMut(f32) + Send>;

/// Forwards monotonically non-decreasing progress values in `[0, 1]`.
#[derive(Default)]
pub struct Progress {
    callback: Option<ProgressFn>,
    last: f32,
}

impl Progress {
    pub fn new(callback: impl FnMut(f32) + Send + 'static) -> Self {
        Self { callback: Some(Box::new(callback)), last: 0.0 }
    }

    pub fn silent() -> Self {
        Self::default()
    }

    pub fn report(&mut self, value: f32) {
        let value = value.clamp(0.0, 1.0).max(self.last);
        self.last = value;
        if let Some(callback) = self.callback.as_mut() {
            callback(value);
        }
    }

    /// Forces completion so a loading screen never waits on a failed build.
    pub fn finish(&mut self) {
        self.report(1.0);
    }

    pub fn last(&self) -> f32 {
        self.last
    }
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("has_callback", &self.callback.is_some())
            .field("last", &self.last)
            .finish()
    }
}

/// Discard-the-result cancellation: checked between phases, never mid-phase.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag {
    requested: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.requested.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    pub fn check(&self, phase: &'static str) -> Result<()> {
        if self.is_cancelled() {
            return Err(MapError::Cancelled { phase });
        }
        Ok(())
    }
}

/// Progress sink plus cancellation flag for one generation attempt.
#[derive(Debug, Default)]
pub struct GenerationControl {
    pub progress: Progress,
    pub cancel: CancelFlag,
}

impl GenerationControl {
    pub fn new(progress: Progress, cancel: CancelFlag) -> Self {
        Self { progress, cancel }
    }
}
