//! Spin system plus optional solvent line on one axis.

use super::lorentzian::{synthesize, FreqLimits, SpectrumSample, SynthesisError};
use super::water::WaterModel;
use crate::spin::system::SpinSystem;

/// Synthesize `spin` and, when given and enabled, add the water line over
/// the same frequency range.
pub fn simulate_combined(
    spin: &SpinSystem,
    water: Option<&WaterModel>,
    points: usize,
    freq_limits: Option<FreqLimits>,
) -> Result<SpectrumSample, SynthesisError> {
    let mut spectrum = synthesize(&spin.peaks(), points, spin.half_height_width(), freq_limits)?;

    if let Some(water) = water.filter(|w| w.is_enabled()) {
        let (Some(&low), Some(&high)) = (spectrum.x.first(), spectrum.x.last()) else {
            return Ok(spectrum);
        };
        let water_spectrum = water.synthesize(points, Some((low, high)))?;
        spectrum.add(&water_spectrum)?;
    }

    Ok(spectrum)
}
