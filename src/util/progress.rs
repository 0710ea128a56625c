//! Progress reporting and cancellation.
//!
//! The baker reports through the [`Progress`] trait; [`ProgressIndicator`]
//! is a ready-made thread-safe implementation that a UI can poll.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Progress collaborator.
pub trait Progress: Send + Sync {
    /// Set overall progress in `[0, 1]`.
    fn set_progress(&self, fraction: f32);

    /// Record that one unit of work finished.
    fn advance(&self) {}

    /// True once the caller asked the bake to stop.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Progress sink that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn set_progress(&self, _fraction: f32) {}
}

/// Progress internals.
#[derive(Debug, Default)]
pub struct ProgressData {
    /// `f32` bits of the last reported fraction.
    fraction: AtomicU32,
    advanced: AtomicU64,
    cancelled: AtomicBool,
}

impl ProgressData {
    /// Last reported fraction.
    pub fn fraction(&self) -> f32 {
        f32::from_bits(self.fraction.load(Ordering::Relaxed))
    }

    /// Returns progress percentage in [0; 100] range.
    pub fn progress_percent(&self) -> u32 {
        (self.fraction().clamp(0.0, 1.0) * 100.0) as u32
    }

    /// Total number of `advance` calls.
    pub fn advanced(&self) -> u64 {
        self.advanced.load(Ordering::Relaxed)
    }

    /// Raises cancellation flag, actual cancellation is not immediate!
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst)
    }
}

/// Cloneable handle to shared progress state.
#[derive(Debug, Clone, Default)]
pub struct ProgressIndicator(pub Arc<ProgressData>);

impl ProgressIndicator {
    /// Creates new progress indicator.
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::ops::Deref for ProgressIndicator {
    type Target = ProgressData;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Progress for ProgressIndicator {
    fn set_progress(&self, fraction: f32) {
        self.0.fraction.store(fraction.to_bits(), Ordering::Relaxed);
    }

    fn advance(&self) {
        self.0.advanced.fetch_add(1, Ordering::Relaxed);
    }

    fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::SeqCst)
    }
}

/// Maps a sub-stage's `[0, 1]` progress onto the `[start, start + span]`
/// slice of another sink.
pub struct ProgressSlice<'a> {
    sink: &'a dyn Progress,
    start: f32,
    span: f32,
}

impl<'a> ProgressSlice<'a> {
    pub fn new(sink: &'a dyn Progress, start: f32, span: f32) -> Self {
        Self { sink, start, span }
    }
}

impl Progress for ProgressSlice<'_> {
    fn set_progress(&self, fraction: f32) {
        self.sink.set_progress(self.start + self.span * fraction.clamp(0.0, 1.0));
    }

    fn advance(&self) {
        self.sink.advance();
    }

    fn is_cancelled(&self) -> bool {
        self.sink.is_cancelled()
    }
}

/// Counts a known number of work items for one stage and maps them onto
/// the `[start, start + span]` slice of overall progress.
///
/// Safe to advance from several rayon workers at once.
pub struct ProgressState<'a> {
    sink: &'a dyn Progress,
    total: usize,
    done: AtomicUsize,
    step: usize,
    start: f32,
    span: f32,
}

impl<'a> ProgressState<'a> {
    /// Number of fraction updates emitted over a whole stage.
    const UPDATES: usize = 100;

    pub fn new(sink: &'a dyn Progress, total: usize, start: f32, span: f32) -> Self {
        Self {
            sink,
            total,
            done: AtomicUsize::new(0),
            step: (total / Self::UPDATES).max(1),
            start,
            span,
        }
    }

    /// Finish one item.
    pub fn advance(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        self.sink.advance();
        if done % self.step == 0 || done == self.total {
            self.sink.set_progress(self.start + self.span * self.fraction_of(done));
        }
    }

    /// Jump to the end of the stage.
    pub fn finish(&self) {
        self.done.store(self.total, Ordering::Relaxed);
        self.sink.set_progress(self.start + self.span);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.sink.is_cancelled()
    }

    fn fraction_of(&self, done: usize) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            (done.min(self.total) as f32) / self.total as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indicator_cancel() {
        let p = ProgressIndicator::new();
        assert!(!p.is_cancelled());
        let clone = p.clone();
        clone.cancel();
        assert!(p.is_cancelled());
    }

    #[test]
    fn test_state_maps_range() {
        let p = ProgressIndicator::new();
        let state = ProgressState::new(&p, 4, 0.5, 0.5);
        for _ in 0..2 {
            state.advance();
        }
        assert!((p.fraction() - 0.75).abs() < 1e-6);
        state.finish();
        assert_eq!(p.progress_percent(), 100);
        assert_eq!(p.advanced(), 2);
    }

    #[test]
    fn test_slice_nests() {
        let p = ProgressIndicator::new();
        let outer = ProgressSlice::new(&p, 0.5, 0.5);
        let inner = ProgressSlice::new(&outer, 0.0, 0.5);
        inner.set_progress(1.0);
        assert!((p.fraction() - 0.75).abs() < 1e-6);
        p.cancel();
        assert!(inner.is_cancelled());
    }

    #[test]
    fn test_empty_stage() {
        let p = ProgressIndicator::new();
        let state = ProgressState::new(&p, 0, 0.0, 1.0);
        state.finish();
        assert!((p.fraction() - 1.0).abs() < 1e-6);
    }
}
