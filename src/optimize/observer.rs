//! Progress hooks for a running fit.

use std::ops::Range;

use super::sectioned::{FitOutcome, QuadrantReport};
use crate::spin::system::SpinSystem;

/// Receives progress from [`optimize_simulation`](super::sectioned::optimize_simulation).
///
/// Every method defaults to doing nothing.
pub trait FitObserver {
    fn fit_started(&mut self, _spin: &SpinSystem, _quadrants: &[Range<usize>]) {}

    fn quadrant_started(&mut self, _quadrant: usize, _range: &Range<usize>) {}

    /// Called once per minimizer iteration.
    fn objective_evaluated(&mut self, _quadrant: usize, _iteration: usize, _rmse: f64) {}

    fn quadrant_finished(&mut self, _report: &QuadrantReport) {}

    fn fit_finished(&mut self, _outcome: &FitOutcome) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl FitObserver for NoopObserver {}
