//! Progress reporting for long-running operations.
//!
//! The reporter is acquired for the duration of an update download/install or
//! a full tagging pass and receives fractions in `0.0..=1.0`.

/// Receiver for progress fractions. Implemented by the host UI.
pub trait ProgressReporter {
    /// Report completion as a fraction in `0.0..=1.0`.
    fn report(&mut self, fraction: f64);
}

/// Reporter that discards all progress.
pub struct NullProgress;

impl ProgressReporter for NullProgress {
    fn report(&mut self, _fraction: f64) {}
}

/// Adapter mapping a child operation's `0..1` range onto a sub-range of the
/// parent reporter, so multi-phase operations can split one progress bar.
pub struct ScaledProgress<'a> {
    inner: &'a mut dyn ProgressReporter,
    start: f64,
    end: f64,
}

impl<'a> ScaledProgress<'a> {
    pub fn new(inner: &'a mut dyn ProgressReporter, start: f64, end: f64) -> Self {
        Self { inner, start, end }
    }
}

impl ProgressReporter for ScaledProgress<'_> {
    fn report(&mut self, fraction: f64) {
        let clamped = fraction.clamp(0.0, 1.0);
        self.inner
            .report(self.start + (self.end - self.start) * clamped);
    }
}
