//! Background fit worker.
//!
//! Runs [`optimize_simulation`] on its own thread and streams progress back
//! over a channel, so an interactive caller never blocks on a fit.

use std::ops::Range;
use std::sync::mpsc;
use std::thread::JoinHandle;

use super::minimizer::MinimizerOptions;
use super::observer::FitObserver;
use super::sectioned::{optimize_simulation, FitError, FitOutcome, QuadrantReport};
use crate::data::spectrum::RealSpectrum;
use crate::simulate::lorentzian::FreqLimits;
use crate::simulate::water::WaterModel;
use crate::spin::system::SpinSystem;

/// Everything a fit needs, owned by the worker for its whole run.
#[derive(Debug, Clone)]
pub struct FitRequest {
    pub real: RealSpectrum,
    pub spin: SpinSystem,
    pub water_range: FreqLimits,
    pub water: Option<WaterModel>,
    pub options: MinimizerOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FitEvent {
    Started { quadrants: Vec<Range<usize>> },
    QuadrantStarted { index: usize, range: Range<usize> },
    Iteration { quadrant: usize, iteration: usize, rmse: f64 },
    QuadrantFinished(QuadrantReport),
    Finished { warnings: Vec<String> },
}

/// Forwards observer callbacks as [`FitEvent`]s.
///
/// Send failures are ignored: a caller that dropped the receiver just stops
/// listening.
struct ChannelObserver {
    tx: mpsc::Sender<FitEvent>,
}

impl FitObserver for ChannelObserver {
    fn fit_started(&mut self, _spin: &SpinSystem, quadrants: &[Range<usize>]) {
        self.tx
            .send(FitEvent::Started {
                quadrants: quadrants.to_vec(),
            })
            .ok();
    }

    fn quadrant_started(&mut self, quadrant: usize, range: &Range<usize>) {
        self.tx
            .send(FitEvent::QuadrantStarted {
                index: quadrant,
                range: range.clone(),
            })
            .ok();
    }

    fn objective_evaluated(&mut self, quadrant: usize, iteration: usize, rmse: f64) {
        self.tx
            .send(FitEvent::Iteration {
                quadrant,
                iteration,
                rmse,
            })
            .ok();
    }

    fn quadrant_finished(&mut self, report: &QuadrantReport) {
        self.tx.send(FitEvent::QuadrantFinished(report.clone())).ok();
    }

    fn fit_finished(&mut self, outcome: &FitOutcome) {
        self.tx
            .send(FitEvent::Finished {
                warnings: outcome.warnings(),
            })
            .ok();
    }
}

/// Handle to a running fit.
pub struct FitHandle {
    events: mpsc::Receiver<FitEvent>,
    thread: JoinHandle<Result<FitOutcome, FitError>>,
}

impl FitHandle {
    /// Blocking iterator over progress events; ends when the worker exits.
    pub fn events(&self) -> mpsc::Iter<'_, FitEvent> {
        self.events.iter()
    }

    /// Non-blocking poll for the next event.
    pub fn try_event(&self) -> Option<FitEvent> {
        self.events.try_recv().ok()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the fit and take its result.
    pub fn join(self) -> Result<FitOutcome, FitError> {
        self.thread
            .join()
            .map_err(|_| FitError::Worker("fit thread panicked".to_string()))?
    }
}

/// Start a fit on a background thread.
pub fn spawn_fit(request: FitRequest) -> Result<FitHandle, FitError> {
    let (tx, rx) = mpsc::channel();

    let thread = std::thread::Builder::new()
        .name("spinsim-fit".into())
        .spawn(move || {
            let mut observer = ChannelObserver { tx };
            optimize_simulation(
                &request.real,
                &request.spin,
                request.water_range,
                request.water.as_ref(),
                &request.options,
                &mut observer,
            )
        })
        .map_err(|e| FitError::Worker(e.to_string()))?;

    Ok(FitHandle { events: rx, thread })
}
