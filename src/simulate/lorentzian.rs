//! Lorentzian line-shape synthesis from a peak list.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::spin::peak::{sort_peaks, Peak};
use crate::spin::system::HalfHeightWidth;

/// Default number of samples in a synthesized spectrum.
pub const DEFAULT_POINTS: usize = 800;

/// Padding (Hz) added on both sides when no frequency limits are given.
const DEFAULT_MARGIN: f64 = 50.0;

/// Width substituted for a half-height width of exactly zero.
const ZERO_WIDTH: f64 = 1e-6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SynthesisError {
    #[error("freq_limits must be two finite numbers, got {0}")]
    InvalidFreqLimits(String),
    #[error("cannot synthesize an empty peak list without frequency limits")]
    EmptyPeakList,
    #[error("no half-height width for nucleus {nucleus}")]
    MissingWidth { nucleus: i32 },
    #[error("frequency and intensity axes differ in length ({x} vs {y})")]
    LengthMismatch { x: usize, y: usize },
}

/// A sampled spectrum: frequency axis (Hz) and intensities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpectrumSample {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl SpectrumSample {
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self, SynthesisError> {
        if x.len() != y.len() {
            return Err(SynthesisError::LengthMismatch {
                x: x.len(),
                y: y.len(),
            });
        }
        Ok(Self { x, y })
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Add another spectrum sampled on the same axis.
    pub fn add(&mut self, other: &SpectrumSample) -> Result<(), SynthesisError> {
        if other.y.len() != self.y.len() {
            return Err(SynthesisError::LengthMismatch {
                x: self.y.len(),
                y: other.y.len(),
            });
        }
        for (a, b) in self.y.iter_mut().zip(&other.y) {
            *a += b;
        }
        Ok(())
    }

    /// Flip both axes (ascending <-> descending storage order).
    pub fn reversed(mut self) -> Self {
        self.x.reverse();
        self.y.reverse();
        self
    }
}

/// Synthesis bounds given as a pair; the order of the two values does not
/// matter.
pub type FreqLimits = (f64, f64);

/// Evaluate one Lorentzian at `f`.
///
/// `hhw` is the full width at half maximum; the peak height is
/// `(0.5 / hhw) * intensity`.
pub fn lorentzian(f: f64, center: f64, intensity: f64, hhw: f64) -> f64 {
    let hhw = if hhw == 0.0 { ZERO_WIDTH } else { hhw };
    let half = 0.5 * hhw;
    (0.5 / hhw) * intensity * half * half / (half * half + (f - center).powi(2))
}

/// `points` values evenly spaced over `[low, high]`, both ends included.
pub fn linspace(low: f64, high: f64, points: usize) -> Vec<f64> {
    match points {
        0 => Vec::new(),
        1 => vec![low],
        _ => {
            let step = (high - low) / (points - 1) as f64;
            (0..points)
                .map(|i| if i == points - 1 { high } else { low + step * i as f64 })
                .collect()
        }
    }
}

/// Synthesize the spectrum of a peak list.
///
/// Without `freq_limits` the axis spans the peaks with 50 Hz of padding on
/// each side. Peaks tagged with a nucleus index look up their width in
/// `half_height_width`; untagged peaks (solvent) need a uniform width.
pub fn synthesize(
    peaks: &[Peak],
    points: usize,
    half_height_width: &HalfHeightWidth,
    freq_limits: Option<FreqLimits>,
) -> Result<SpectrumSample, SynthesisError> {
    let mut peaks = peaks.to_vec();
    sort_peaks(&mut peaks);

    let (low, high) = match freq_limits {
        Some((a, b)) => {
            if !a.is_finite() || !b.is_finite() {
                return Err(SynthesisError::InvalidFreqLimits(format!("({a}, {b})")));
            }
            (a.min(b), a.max(b))
        }
        None => match (peaks.first(), peaks.last()) {
            (Some(first), Some(last)) => {
                (first.frequency - DEFAULT_MARGIN, last.frequency + DEFAULT_MARGIN)
            }
            _ => return Err(SynthesisError::EmptyPeakList),
        },
    };

    let x = linspace(low, high, points);
    let mut y = vec![0.0; x.len()];

    for peak in &peaks {
        let hhw = half_height_width
            .for_nucleus(peak.nucleus)
            .ok_or(SynthesisError::MissingWidth {
                nucleus: peak.nucleus,
            })?;
        for (yi, &xi) in y.iter_mut().zip(&x) {
            *yi += lorentzian(xi, peak.frequency, peak.intensity, hhw);
        }
    }

    Ok(SpectrumSample { x, y })
}

/// Parse user-supplied frequency limits; anything other than exactly two
/// finite numbers is rejected.
pub fn freq_limits_from_slice(values: &[f64]) -> Result<FreqLimits, SynthesisError> {
    match values {
        [a, b] if a.is_finite() && b.is_finite() => Ok((*a, *b)),
        _ => Err(SynthesisError::InvalidFreqLimits(format!("{values:?}"))),
    }
}

/// Piecewise-linear interpolation of `(xp, fp)` at each `x`.
///
/// `xp` may be ascending or descending. Outside the sampled range the end
/// values are held.
pub fn interpolate(x: &[f64], xp: &[f64], fp: &[f64]) -> Vec<f64> {
    if xp.is_empty() || fp.len() != xp.len() {
        return vec![0.0; x.len()];
    }

    let descending = xp.len() > 1 && xp[0] > xp[xp.len() - 1];
    let (xs, fs): (Vec<f64>, Vec<f64>) = if descending {
        (xp.iter().rev().copied().collect(), fp.iter().rev().copied().collect())
    } else {
        (xp.to_vec(), fp.to_vec())
    };
    let last = xs.len() - 1;

    x.iter()
        .map(|&xi| {
            if xi <= xs[0] {
                return fs[0];
            }
            if xi >= xs[last] {
                return fs[last];
            }
            // First index with xs[k] > xi; xs[k-1] <= xi < xs[k].
            let k = xs.partition_point(|&v| v <= xi);
            let (x0, x1) = (xs[k - 1], xs[k]);
            let (f0, f1) = (fs[k - 1], fs[k]);
            if x1 == x0 {
                f0
            } else {
                f0 + (f1 - f0) * (xi - x0) / (x1 - x0)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_peak_height_at_center() {
        let peaks = [Peak::new(500.0, 2.0, 0)];
        let hhw = HalfHeightWidth::Uniform(1.5);
        // Odd point count over a symmetric window puts a sample on the center.
        let s = synthesize(&peaks, 801, &hhw, None).unwrap();
        assert_eq!(s.len(), 801);
        assert!((s.x[0] - 450.0).abs() < 1e-9);
        assert!((s.x[800] - 550.0).abs() < 1e-9);

        let (imax, ymax) = s
            .y
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::MIN), |acc, (i, v)| if v > acc.1 { (i, v) } else { acc });
        assert_eq!(imax, 400);
        assert!((ymax - (0.5 / 1.5) * 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_half_height_at_half_width() {
        let hhw = 2.0;
        let top = lorentzian(100.0, 100.0, 1.0, hhw);
        let side = lorentzian(101.0, 100.0, 1.0, hhw);
        assert!((side - top / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_limits_are_order_independent() {
        let peaks = [Peak::new(10.0, 1.0, 0)];
        let hhw = HalfHeightWidth::Uniform(1.0);
        let a = synthesize(&peaks, 50, &hhw, Some((0.0, 20.0))).unwrap();
        let b = synthesize(&peaks, 50, &hhw, Some((20.0, 0.0))).unwrap();
        assert_eq!(a, b);
        assert!(matches!(
            synthesize(&peaks, 50, &hhw, Some((f64::NAN, 1.0))),
            Err(SynthesisError::InvalidFreqLimits(_))
        ));
        assert!(freq_limits_from_slice(&[1.0, 2.0, 3.0]).is_err());
        assert_eq!(freq_limits_from_slice(&[3.0, 1.0]).unwrap(), (3.0, 1.0));
    }

    #[test]
    fn test_zero_width_stays_finite() {
        let peaks = [Peak::new(10.0, 1.0, 0)];
        let s = synthesize(&peaks, 11, &HalfHeightWidth::Uniform(0.0), Some((5.0, 15.0))).unwrap();
        assert!(s.y.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_per_nucleus_widths_and_untagged_peaks() {
        let peaks = [Peak::new(10.0, 1.0, 0), Peak::new(30.0, 1.0, 1)];
        let widths = HalfHeightWidth::PerNucleus(vec![1.0, 4.0]);
        let s = synthesize(&peaks, 41, &widths, Some((0.0, 40.0))).unwrap();
        // Narrower line is taller.
        assert!(s.y[10] > s.y[30]);

        let solvent = [Peak::new(10.0, 1.0, -1)];
        assert!(matches!(
            synthesize(&solvent, 10, &widths, Some((0.0, 20.0))),
            Err(SynthesisError::MissingWidth { nucleus: -1 })
        ));
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        let peaks = [Peak::new(30.0, 1.0, 0), Peak::new(10.0, 0.5, 0)];
        let hhw = HalfHeightWidth::Uniform(1.0);
        let a = synthesize(&peaks, 100, &hhw, None).unwrap();
        let b = synthesize(&peaks, 100, &hhw, None).unwrap();
        assert_eq!(a, b);
        assert!((a.x[0] - (-40.0)).abs() < 1e-12);
    }

    #[test]
    fn test_interpolation_handles_both_orders() {
        let xp = [0.0, 1.0, 2.0];
        let fp = [0.0, 10.0, 20.0];
        assert_eq!(interpolate(&[0.5, 1.5, -1.0, 3.0], &xp, &fp), vec![5.0, 15.0, 0.0, 20.0]);

        let xd = [2.0, 1.0, 0.0];
        let fd = [20.0, 10.0, 0.0];
        assert_eq!(interpolate(&[0.5, 1.5], &xd, &fd), vec![5.0, 15.0]);
    }
}
