use serde::{Deserialize, Serialize};

use crate::spin::frequency::reconstruct_frequency_axis;

/// Acquisition scalars of a 1D spectrum (NMRPipe NDSW / NDOBS / NDORIG /
/// NDSIZE).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionParams {
    /// Spectral width (Hz)
    pub spectral_width: f64,
    /// Observed frequency (MHz)
    pub observed_frequency: f64,
    /// Origin, frequency of the last point (Hz)
    pub origin: f64,
    /// Number of points
    pub size: usize,
}

impl Default for AcquisitionParams {
    fn default() -> Self {
        Self {
            spectral_width: 0.0,
            observed_frequency: 400.0,
            origin: 0.0,
            size: 0,
        }
    }
}

impl AcquisitionParams {
    /// Spectral width with the zero guard applied.
    pub fn effective_spectral_width(&self) -> f64 {
        if self.spectral_width == 0.0 {
            1.0
        } else {
            self.spectral_width
        }
    }

    /// Observed frequency with the zero guard applied.
    pub fn effective_observed_frequency(&self) -> f64 {
        if self.observed_frequency == 0.0 {
            1.0
        } else {
            self.observed_frequency
        }
    }
}

/// A measured 1D spectrum on a Hz axis.
///
/// Samples are kept in acquisition order, so `x` runs from high to low
/// frequency.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RealSpectrum {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub acquisition: AcquisitionParams,
}

impl RealSpectrum {
    /// Pair reader intensities with the Hz axis rebuilt from `acquisition`.
    pub fn from_acquisition(y: Vec<f64>, acquisition: AcquisitionParams, field_strength: f64) -> Self {
        let acquisition = AcquisitionParams {
            size: y.len(),
            ..acquisition
        };
        let x = reconstruct_frequency_axis(&acquisition, field_strength);
        Self { x, y, acquisition }
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Lowest and highest frequency covered.
    pub fn freq_range(&self) -> Option<(f64, f64)> {
        let (first, last) = (self.x.first()?, self.x.last()?);
        Some((first.min(*last), first.max(*last)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_descending_axis() {
        let acq = AcquisitionParams {
            spectral_width: 1000.0,
            observed_frequency: 500.0,
            origin: 0.0,
            size: 0,
        };
        let spec = RealSpectrum::from_acquisition(vec![0.0, 1.0, -3.0, 2.0], acq, 500.0);
        assert_eq!(spec.acquisition.size, 4);
        assert!(spec.x.windows(2).all(|w| w[0] > w[1]));
        assert_eq!(spec.freq_range(), Some((0.0, 750.0)));
    }
}
