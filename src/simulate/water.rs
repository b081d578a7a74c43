//! Single-line solvent (water) signal.

use serde::{Deserialize, Serialize};

use super::lorentzian::{synthesize, FreqLimits, SpectrumSample, SynthesisError};
use crate::spin::peak::{Peak, PeakList, NO_NUCLEUS};
use crate::spin::system::HalfHeightWidth;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterModel {
    frequency: f64,
    intensity: f64,
    hhw: f64,
    enabled: bool,
    #[serde(skip)]
    peaks: PeakList,
}

impl Default for WaterModel {
    fn default() -> Self {
        Self::new(0.0, 1.0, 1.0, false)
    }
}

impl WaterModel {
    pub fn new(frequency: f64, intensity: f64, hhw: f64, enabled: bool) -> Self {
        Self {
            frequency,
            intensity,
            hhw,
            enabled,
            peaks: vec![Peak::new(frequency, intensity, NO_NUCLEUS)],
        }
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn intensity(&self) -> f64 {
        self.intensity
    }

    pub fn hhw(&self) -> f64 {
        self.hhw
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_frequency(&mut self, frequency: f64) {
        self.frequency = frequency;
        self.refresh_peaks();
    }

    pub fn set_intensity(&mut self, intensity: f64) {
        self.intensity = intensity;
        self.refresh_peaks();
    }

    pub fn set_hhw(&mut self, hhw: f64) {
        self.hhw = hhw;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn toggle(&mut self) {
        self.enabled = !self.enabled;
    }

    /// The one-line peak list `[(frequency, intensity, -1)]`.
    pub fn peaklist(&self) -> PeakList {
        if self.peaks.is_empty() {
            // Deserialized models skip the cached list.
            return vec![Peak::new(self.frequency, self.intensity, NO_NUCLEUS)];
        }
        self.peaks.clone()
    }

    /// Synthesize the water line with its own width, regardless of
    /// [`WaterModel::is_enabled`].
    pub fn synthesize(
        &self,
        points: usize,
        freq_limits: Option<FreqLimits>,
    ) -> Result<SpectrumSample, SynthesisError> {
        synthesize(
            &self.peaklist(),
            points,
            &HalfHeightWidth::Uniform(self.hhw),
            freq_limits,
        )
    }

    fn refresh_peaks(&mut self) {
        self.peaks = vec![Peak::new(self.frequency, self.intensity, NO_NUCLEUS)];
    }
}
