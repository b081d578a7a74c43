//! Quadrant-partitioned fitting of a spin system against a real spectrum.
//!
//! The spectrum is cut into four index ranges around the solvent line. Each
//! range is fitted in turn, warm-started from the previous one, and the
//! per-nucleus results are stitched back from the range that holds each
//! nucleus.

use std::ops::Range;
use thiserror::Error;

use super::minimizer::{minimize, MinimizerOptions, Termination};
use super::observer::FitObserver;
use super::params::ParamLayout;
use crate::data::spectrum::RealSpectrum;
use crate::simulate::lorentzian::{interpolate, synthesize, FreqLimits, SynthesisError};
use crate::simulate::water::WaterModel;
use crate::spin::system::{HalfHeightWidth, SpinError, SpinSystem};

pub const QUADRANTS: usize = 4;

#[derive(Error, Debug)]
pub enum FitError {
    #[error("water range must be two distinct finite frequencies, got ({0}, {1})")]
    InvalidWaterRange(f64, f64),
    #[error("water range ({left}, {right}) Hz lies outside the spectrum ({low}, {high}) Hz")]
    WaterRangeOutsideSpectrum {
        left: f64,
        right: f64,
        low: f64,
        high: f64,
    },
    #[error("spectrum has {0} points, at least 4 are needed")]
    SpectrumTooShort(usize),
    #[error("spin system error: {0}")]
    Spin(#[from] SpinError),
    #[error("synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),
    #[error("fit worker failed: {0}")]
    Worker(String),
}

/// Result of one quadrant's minimization.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadrantReport {
    pub index: usize,
    pub range: Range<usize>,
    /// Lowest and highest real frequency in the quadrant (Hz).
    pub freq_range: (f64, f64),
    pub initial_rmse: f64,
    pub rmse: f64,
    pub status: Termination,
    pub iterations: usize,
    pub evaluations: usize,
}

#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub spin: SpinSystem,
    /// Present when the fit modelled the solvent line.
    pub water: Option<WaterModel>,
    pub quadrants: Vec<QuadrantReport>,
    /// Spectral width and observed frequency carried through the fit.
    pub nuisance: (f64, f64),
}

impl FitOutcome {
    /// One message per quadrant whose minimizer did not converge.
    pub fn warnings(&self) -> Vec<String> {
        self.quadrants
            .iter()
            .filter(|q| !q.status.is_converged())
            .map(|q| {
                format!(
                    "quadrant {} ({:.2}..{:.2} Hz): {} after {} iterations",
                    q.index, q.freq_range.0, q.freq_range.1, q.status, q.iterations
                )
            })
            .collect()
    }
}

/// Stitched parameter vector plus the per-quadrant reports.
#[derive(Debug, Clone)]
pub struct SectionedFit {
    pub params: Vec<f64>,
    pub quadrants: Vec<QuadrantReport>,
}

/// Split a descending frequency axis into four contiguous index ranges
/// around the water line.
///
/// Quadrant 0 holds the frequencies above the right water bound, quadrant 3
/// those below the left one. The order of `water_range` does not matter.
/// Quadrant 0 always has points; the others may be empty when a bound
/// sits on the spectrum edge or both bounds fall between two samples.
pub fn partition_quadrants(x: &[f64], water_range: FreqLimits) -> Result<[Range<usize>; QUADRANTS], FitError> {
    let (a, b) = water_range;
    if !a.is_finite() || !b.is_finite() || a == b {
        return Err(FitError::InvalidWaterRange(a, b));
    }
    if x.len() < QUADRANTS {
        return Err(FitError::SpectrumTooShort(x.len()));
    }

    let (left, right) = (a.min(b), a.max(b));
    let center = (left + right) / 2.0;

    let ascending: Vec<f64> = x.iter().rev().copied().collect();
    let (low, high) = (ascending[0], ascending[ascending.len() - 1]);
    if left < low || right > high {
        return Err(FitError::WaterRangeOutsideSpectrum { left, right, low, high });
    }

    let len = x.len();
    let index = |bound: f64| len - ascending.partition_point(|&v| v < bound);
    let (at_left, at_center, at_right) = (index(left), index(center), index(right));

    Ok([0..at_right, at_right..at_center, at_center..at_left, at_left..len])
}

/// Quadrant owning each nucleus.
///
/// A nucleus on a shared boundary goes to the later quadrant; one that falls
/// in no range goes to the nearest.
pub fn assign_owners(frequencies: &[f64], freq_ranges: &[(f64, f64)]) -> Vec<usize> {
    frequencies
        .iter()
        .map(|&f| {
            let distance = |&(lo, hi): &(f64, f64)| {
                if f < lo {
                    lo - f
                } else if f > hi {
                    f - hi
                } else {
                    0.0
                }
            };
            let mut owner = 0;
            let mut best = f64::INFINITY;
            for (q, range) in freq_ranges.iter().enumerate() {
                let d = distance(range);
                if d <= best {
                    best = d;
                    owner = q;
                }
            }
            owner
        })
        .collect()
}

/// Assemble the final vector: water and nuisance from quadrant 0, each
/// nucleus' coupling row, intensity and width from its owner.
fn stitch(layout: &ParamLayout, results: &[Vec<f64>], owners: &[usize]) -> Vec<f64> {
    let mut stitched = results[0].clone();
    for (nucleus, &q) in owners.iter().enumerate() {
        let source = &results[q];
        let row = layout.coupling_row(nucleus);
        stitched[row.clone()].copy_from_slice(&source[row]);
        let i = layout.intensity_index(nucleus);
        stitched[i] = source[i];
        let w = layout.width_index(nucleus);
        stitched[w] = source[w];
    }
    stitched
}

/// Objective of one quadrant.
struct QuadrantObjective<'a> {
    spin: &'a SpinSystem,
    layout: ParamLayout,
    real_x: &'a [f64],
    real_y: &'a [f64],
    full_limits: FreqLimits,
    full_points: usize,
}

impl QuadrantObjective<'_> {
    /// Model intensities on `real_x`, in the same descending order.
    fn model(&self, params: &[f64]) -> Result<Vec<f64>, FitError> {
        let decoded = self.layout.decode(params);
        let trial = self.spin.with_parameters(
            decoded.couplings,
            decoded.intensities,
            decoded.half_height_widths,
        )?;

        let limits = (self.real_x[0], self.real_x[self.real_x.len() - 1]);
        let mut y = synthesize(&trial.peaks(), self.real_x.len(), trial.half_height_width(), Some(limits))?
            .reversed()
            .y;

        if let Some(w) = decoded.water {
            // The solvent line spans quadrant boundaries, so it is
            // synthesized over the whole spectrum and sampled here.
            let water = WaterModel::new(w.frequency, w.intensity, w.hhw, true);
            let full = water.synthesize(self.full_points, Some(self.full_limits))?;
            for (yi, wi) in y.iter_mut().zip(interpolate(self.real_x, &full.x, &full.y)) {
                *yi += wi;
            }
        }
        Ok(y)
    }

    fn rmse(&self, params: &[f64]) -> Result<f64, FitError> {
        let model = self.model(params)?;
        let sum: f64 = model
            .iter()
            .zip(self.real_y)
            .map(|(m, r)| (m - r).powi(2))
            .sum();
        Ok((sum / self.real_y.len() as f64).sqrt())
    }
}

/// Fit each quadrant in turn and stitch the results.
///
/// `initial` is laid out by `layout`; each quadrant starts from the
/// previous quadrant's optimum. Empty quadrants are skipped and produce no
/// report.
pub fn section_optimization(
    real: &RealSpectrum,
    spin: &SpinSystem,
    layout: ParamLayout,
    initial: Vec<f64>,
    water_range: FreqLimits,
    options: &MinimizerOptions,
    observer: &mut dyn FitObserver,
) -> Result<SectionedFit, FitError> {
    if real.x.len() != real.y.len() {
        return Err(SynthesisError::LengthMismatch {
            x: real.x.len(),
            y: real.y.len(),
        }
        .into());
    }
    let quadrants = partition_quadrants(&real.x, water_range)?;
    let (water_left, water_right) = (water_range.0.min(water_range.1), water_range.0.max(water_range.1));
    let bounds = layout.bounds(water_left, water_right);
    let full_limits = (real.x[0], real.x[real.x.len() - 1]);

    observer.fit_started(spin, &quadrants);

    let mut start = initial;
    let mut results = Vec::with_capacity(QUADRANTS);
    let mut reports = Vec::with_capacity(QUADRANTS);

    for (index, range) in quadrants.iter().enumerate() {
        if range.is_empty() {
            log::info!("Quadrant {index}: no points, skipped");
            results.push(start.clone());
            continue;
        }
        let real_x = &real.x[range.clone()];
        let real_y = &real.y[range.clone()];
        let freq_range = (real_x[real_x.len() - 1], real_x[0]);
        log::info!(
            "Quadrant {index}: points {}..{} ({:.2} to {:.2} Hz)",
            range.start,
            range.end,
            freq_range.0,
            freq_range.1
        );
        observer.quadrant_started(index, range);

        let objective = QuadrantObjective {
            spin,
            layout,
            real_x,
            real_y,
            full_limits,
            full_points: real.x.len(),
        };
        let initial_rmse = objective.rmse(&start)?;

        let minimum = minimize(
            |p| objective.rmse(p).unwrap_or(f64::INFINITY),
            &start,
            &bounds,
            options,
            |iteration, rmse| observer.objective_evaluated(index, iteration, rmse),
        );

        let report = QuadrantReport {
            index,
            range: range.clone(),
            freq_range,
            initial_rmse,
            rmse: minimum.fun,
            status: minimum.status,
            iterations: minimum.iterations,
            evaluations: minimum.evaluations,
        };
        log::info!(
            "Quadrant {index}: RMSE {:.6} -> {:.6} ({} iterations, {} evaluations)",
            report.initial_rmse,
            report.rmse,
            report.iterations,
            report.evaluations
        );
        if !report.status.is_converged() {
            log::warn!("Quadrant {index}: minimizer stopped without converging: {}", report.status);
        }
        observer.quadrant_finished(&report);

        start = minimum.x.clone();
        results.push(minimum.x);
        reports.push(report);
    }

    let freq_ranges: Vec<(f64, f64)> = reports.iter().map(|r| r.freq_range).collect();
    let owners: Vec<usize> = assign_owners(spin.frequencies(), &freq_ranges)
        .into_iter()
        .map(|fitted| reports[fitted].index)
        .collect();
    for (nucleus, q) in owners.iter().enumerate() {
        log::debug!("Nucleus {nucleus} taken from quadrant {q}");
    }

    Ok(SectionedFit {
        params: stitch(&layout, &results, &owners),
        quadrants: reports,
    })
}

/// Fit `spin` (and `water`, when given) against `real`.
///
/// Intensities start at 1.0 per nucleus; spectral width and observed
/// frequency come from the acquisition parameters. The inputs are not
/// modified.
pub fn optimize_simulation(
    real: &RealSpectrum,
    spin: &SpinSystem,
    water_range: FreqLimits,
    water: Option<&WaterModel>,
    options: &MinimizerOptions,
    observer: &mut dyn FitObserver,
) -> Result<FitOutcome, FitError> {
    let layout = ParamLayout::new(spin.len(), water.is_some());
    let initial = layout.encode(
        spin,
        &vec![1.0; spin.len()],
        water,
        real.acquisition.effective_spectral_width(),
        real.acquisition.effective_observed_frequency(),
    );

    let fit = section_optimization(real, spin, layout, initial, water_range, options, observer)?;
    let decoded = layout.decode(&fit.params);

    let fitted = spin.with_parameters(
        decoded.couplings,
        decoded.intensities,
        HalfHeightWidth::PerNucleus(decoded.half_height_widths),
    )?;
    let water = decoded
        .water
        .map(|w| WaterModel::new(w.frequency, w.intensity, w.hhw, true));

    let outcome = FitOutcome {
        spin: fitted,
        water,
        quadrants: fit.quadrants,
        nuisance: (decoded.spectral_width, decoded.observed_frequency),
    };
    for warning in outcome.warnings() {
        log::warn!("{warning}");
    }
    log::info!("Optimization complete");
    observer.fit_finished(&outcome);
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::spectrum::AcquisitionParams;
    use crate::optimize::observer::NoopObserver;
    use crate::simulate::lorentzian::lorentzian;
    use crate::spin::system::CouplingStrength;

    /// Descending integer axis `high..=0`.
    fn axis(high: usize) -> Vec<f64> {
        (0..=high).rev().map(|v| v as f64).collect()
    }

    fn singlet(ppm: f64, hhw: f64) -> SpinSystem {
        SpinSystem::new(
            vec!["H1".into()],
            vec![ppm],
            vec![vec![0.0]],
            hhw,
            500.0,
            None,
            CouplingStrength::Weak,
        )
        .unwrap()
    }

    fn real_from(x: Vec<f64>, line: impl Fn(f64) -> f64) -> RealSpectrum {
        let y = x.iter().map(|&f| line(f)).collect();
        RealSpectrum {
            x,
            y,
            acquisition: AcquisitionParams::default(),
        }
    }

    fn quick() -> MinimizerOptions {
        MinimizerOptions {
            max_iterations: 5,
            ..MinimizerOptions::default()
        }
    }

    #[test]
    fn test_quadrants_cover_every_index_once() {
        let x = axis(400);
        for range in [(150.0, 250.0), (250.0, 150.0), (10.0, 390.0), (198.5, 201.5)] {
            let quadrants = partition_quadrants(&x, range).unwrap();
            assert_eq!(quadrants[0].start, 0);
            assert_eq!(quadrants[3].end, x.len());
            for pair in quadrants.windows(2) {
                assert_eq!(pair[0].end, pair[1].start, "{range:?}");
            }
            let total: usize = quadrants.iter().map(|q| q.len()).sum();
            assert_eq!(total, x.len());
        }
    }

    #[test]
    fn test_quadrant_boundaries_follow_the_water_bounds() {
        let x = axis(400);
        let q = partition_quadrants(&x, (150.0, 250.0)).unwrap();
        // Quadrant 0 holds 400..=250 Hz, quadrant 3 holds 149..=0 Hz.
        assert_eq!(q[0], 0..151);
        assert_eq!(q[1], 151..201);
        assert_eq!(q[2], 201..251);
        assert_eq!(q[3], 251..401);
        assert_eq!(x[q[0].end - 1], 250.0);
        assert_eq!(x[q[3].start], 149.0);
    }

    #[test]
    fn test_invalid_partitions_are_rejected() {
        let x = axis(400);
        assert!(matches!(
            partition_quadrants(&x, (100.0, 100.0)),
            Err(FitError::InvalidWaterRange(..))
        ));
        assert!(matches!(
            partition_quadrants(&x, (f64::NAN, 100.0)),
            Err(FitError::InvalidWaterRange(..))
        ));
        assert!(matches!(
            partition_quadrants(&x, (350.0, 500.0)),
            Err(FitError::WaterRangeOutsideSpectrum { .. })
        ));
        assert!(matches!(
            partition_quadrants(&axis(2), (0.5, 1.5)),
            Err(FitError::SpectrumTooShort(3))
        ));
    }

    #[test]
    fn test_edge_and_narrow_water_ranges_leave_empty_quadrants() {
        let x = axis(400);
        let q = partition_quadrants(&x, (0.0, 100.0)).unwrap();
        assert_eq!(q, [0..301, 301..351, 351..401, 401..401]);

        // Both bounds between the same two samples.
        let q = partition_quadrants(&x, (200.2, 200.8)).unwrap();
        assert_eq!(q, [0..200, 200..200, 200..200, 200..401]);
    }

    #[test]
    fn test_empty_quadrants_are_skipped() {
        let real = real_from(axis(400), |f| lorentzian(f, 100.0, 5.0, 3.0));
        let spin = singlet(0.2, 2.0);

        let outcome = optimize_simulation(&real, &spin, (0.0, 100.0), None, &quick(), &mut NoopObserver).unwrap();
        let fitted: Vec<usize> = outcome.quadrants.iter().map(|q| q.index).collect();
        assert_eq!(fitted, vec![0, 1, 2]);

        let outcome = optimize_simulation(&real, &spin, (200.2, 200.8), None, &quick(), &mut NoopObserver).unwrap();
        let fitted: Vec<usize> = outcome.quadrants.iter().map(|q| q.index).collect();
        assert_eq!(fitted, vec![0, 3]);
        assert!(outcome.spin.intensities()[0].is_finite());
    }

    #[test]
    fn test_owners_prefer_later_quadrant_and_nearest_fallback() {
        let ranges = [(250.0, 400.0), (200.0, 249.0), (150.0, 199.0), (0.0, 149.0)];
        let freqs = [300.0, 250.0, 149.5, 199.2, 500.0, -3.0, 149.0];
        let owners = assign_owners(&freqs, &ranges);
        assert_eq!(owners, vec![0, 0, 3, 2, 0, 3, 3]);

        // A shared boundary value goes to the later quadrant.
        let shared = [(200.0, 400.0), (100.0, 200.0), (50.0, 100.0), (0.0, 50.0)];
        assert_eq!(assign_owners(&[200.0, 50.0], &shared), vec![1, 3]);
    }

    #[test]
    fn test_stitching_takes_whole_rows_from_the_owner() {
        let layout = ParamLayout::new(3, true);
        // Every slot of quadrant q's result holds q.
        let results: Vec<Vec<f64>> = (0..QUADRANTS).map(|q| vec![q as f64; layout.len()]).collect();
        let owners = [2, 0, 3];
        let stitched = stitch(&layout, &results, &owners);
        let d = layout.decode(&stitched);

        for (nucleus, &q) in owners.iter().enumerate() {
            assert!(d.couplings[nucleus].iter().all(|&v| v == q as f64));
            assert_eq!(d.intensities[nucleus], q as f64);
            assert_eq!(d.half_height_widths[nucleus], q as f64);
        }
        let water = d.water.unwrap();
        assert_eq!((water.frequency, water.intensity, water.hhw), (0.0, 0.0, 0.0));
        assert_eq!((d.spectral_width, d.observed_frequency), (0.0, 0.0));
    }

    #[test]
    fn test_water_disabled_fit_returns_a_bare_spin_system() {
        let real = real_from(axis(400), |f| lorentzian(f, 100.0, 5.0, 2.0));
        let spin = singlet(0.2, 2.0);

        let dry = optimize_simulation(&real, &spin, (150.0, 250.0), None, &quick(), &mut NoopObserver)
            .unwrap();
        assert!(dry.water.is_none());
        assert_eq!(dry.quadrants.len(), QUADRANTS);
        assert_eq!(dry.spin.names(), spin.names());
        assert_eq!(dry.spin.ppm(), spin.ppm());

        let water = WaterModel::new(200.0, 1.0, 3.0, false);
        let wet = optimize_simulation(
            &real,
            &spin,
            (150.0, 250.0),
            Some(&water),
            &quick(),
            &mut NoopObserver,
        )
        .unwrap();
        let fitted = wet.water.unwrap();
        assert!(fitted.is_enabled());
        assert!((150.0..=250.0).contains(&fitted.frequency()));

        assert!(ParamLayout::new(1, false).len() < ParamLayout::new(1, true).len());
    }

    #[test]
    fn test_true_parameters_reproduce_spin_and_water_in_every_quadrant() {
        // Broad solvent line at 205 Hz bleeding into quadrants 1 and 2.
        let real = real_from(axis(400), |f| {
            lorentzian(f, 100.0, 5.0, 3.0) + lorentzian(f, 205.0, 40.0, 8.0)
        });
        let spin = singlet(0.2, 3.0);
        let water = WaterModel::new(205.0, 40.0, 8.0, true);
        let layout = ParamLayout::new(1, true);
        let params = layout.encode(&spin, &[5.0], Some(&water), 1.0, 400.0);

        let full_limits = (real.x[0], real.x[real.x.len() - 1]);
        let quadrants = partition_quadrants(&real.x, (150.0, 250.0)).unwrap();
        for range in &quadrants {
            let objective = QuadrantObjective {
                spin: &spin,
                layout,
                real_x: &real.x[range.clone()],
                real_y: &real.y[range.clone()],
                full_limits,
                full_points: real.x.len(),
            };
            let rmse = objective.rmse(&params).unwrap();
            assert!(rmse < 1e-10, "{range:?}: {rmse}");
        }

        // A displaced solvent line shows up next to the water bounds.
        let mut shifted = params.clone();
        // Water frequency follows the intensities.
        shifted[layout.intensity_index(0) + 1] = 195.0;
        let objective = QuadrantObjective {
            spin: &spin,
            layout,
            real_x: &real.x[quadrants[1].clone()],
            real_y: &real.y[quadrants[1].clone()],
            full_limits,
            full_points: real.x.len(),
        };
        assert!(objective.rmse(&shifted).unwrap() > 1e-2);
    }

    #[test]
    fn test_singlet_fit_recovers_intensity_and_width() {
        // Nucleus at 0.2 ppm * 500 MHz = 100 Hz, inside quadrant 3.
        let real = real_from(axis(400), |f| lorentzian(f, 100.0, 5.0, 3.0));
        let spin = singlet(0.2, 2.0);

        let outcome = optimize_simulation(
            &real,
            &spin,
            (150.0, 250.0),
            None,
            &MinimizerOptions::default(),
            &mut NoopObserver,
        )
        .unwrap();

        let q3 = &outcome.quadrants[3];
        assert!(q3.rmse < q3.initial_rmse);
        assert!(q3.rmse < 2e-3, "{q3:?}");
        assert!((outcome.spin.intensities()[0] - 5.0).abs() < 0.1, "{:?}", outcome.spin.intensities());
        let width = outcome.spin.half_height_width().for_nucleus(0).unwrap();
        assert!((width - 3.0).abs() < 0.1, "{width}");
        // The model does not depend on the nuisance scalars; a zero spectral
        // width is seeded as 1.0.
        assert_eq!(outcome.nuisance, (1.0, 400.0));
    }

    #[derive(Default)]
    struct Recorder {
        started: usize,
        quadrants: Vec<usize>,
        iterations: usize,
        finished: Vec<usize>,
        done: bool,
    }

    impl FitObserver for Recorder {
        fn fit_started(&mut self, _spin: &SpinSystem, _quadrants: &[Range<usize>]) {
            self.started += 1;
        }

        fn quadrant_started(&mut self, quadrant: usize, _range: &Range<usize>) {
            self.quadrants.push(quadrant);
        }

        fn objective_evaluated(&mut self, _quadrant: usize, _iteration: usize, _rmse: f64) {
            self.iterations += 1;
        }

        fn quadrant_finished(&mut self, report: &QuadrantReport) {
            self.finished.push(report.index);
        }

        fn fit_finished(&mut self, _outcome: &FitOutcome) {
            self.done = true;
        }
    }

    #[test]
    fn test_observer_sees_every_quadrant_in_order() {
        let real = real_from(axis(400), |f| lorentzian(f, 100.0, 5.0, 3.0));
        let spin = singlet(0.2, 2.0);
        let mut recorder = Recorder::default();

        let outcome = optimize_simulation(&real, &spin, (150.0, 250.0), None, &quick(), &mut recorder).unwrap();

        assert_eq!(recorder.started, 1);
        assert_eq!(recorder.quadrants, vec![0, 1, 2, 3]);
        assert_eq!(recorder.finished, vec![0, 1, 2, 3]);
        let total: usize = outcome.quadrants.iter().map(|q| q.iterations).sum();
        assert_eq!(recorder.iterations, total);
        assert!(recorder.done);
    }
}
