//! Progress reporting for pipeline runs
//!
//! The reporter is owned by the worker thread and forwards every update to a
//! single sink. In the app that sink is a bounded channel drained by the iced
//! event loop, so the worker never touches UI state directly.

/// One (percentage, label) progress value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    /// 0..=100
    pub percent: u8,
    pub label: String,
}

impl Progress {
    pub fn new(percent: u8, label: impl Into<String>) -> Self {
        Self {
            percent: percent.min(100),
            label: label.into(),
        }
    }

    /// Fraction in 0.0..=1.0, handy for progress bars
    pub fn fraction(&self) -> f32 {
        f32::from(self.percent) / 100.0
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new(0, "Idle")
    }
}

/// Forwards progress to a sink, never letting the percentage go backwards
/// within one run.
pub struct ProgressReporter<F: FnMut(Progress)> {
    sink: F,
    last_percent: u8,
}

impl<F: FnMut(Progress)> ProgressReporter<F> {
    pub fn new(sink: F) -> Self {
        Self {
            sink,
            last_percent: 0,
        }
    }

    pub fn report(&mut self, percent: u8, label: impl Into<String>) {
        let percent = percent.min(100).max(self.last_percent);
        self.last_percent = percent;
        (self.sink)(Progress::new(percent, label));
    }
}
