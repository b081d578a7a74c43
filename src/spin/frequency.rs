//! ppm <-> Hz conversion and frequency-axis reconstruction from
//! acquisition parameters.

use crate::data::spectrum::AcquisitionParams;

/// Convert chemical shifts in ppm to Hz at a given field strength (MHz).
pub fn ppm_to_hz(ppm: &[f64], field_strength_mhz: f64) -> Vec<f64> {
    ppm.iter().map(|d| d * field_strength_mhz).collect()
}

/// Convert frequencies in Hz back to ppm.
pub fn hz_to_ppm(hz: &[f64], field_strength_mhz: f64) -> Vec<f64> {
    hz.iter().map(|f| f / field_strength_mhz).collect()
}

/// Reconstruct the Hz axis of a 1D spectrum from its acquisition scalars.
///
/// Point `i` (1-based) sits at `(first + (i - 1) * delta) / obs` ppm with
/// `delta = -sw / size` and `first = orig - delta * (size - 1)`, so the axis
/// runs from high to low frequency, matching how the samples are stored.
///
/// A spectral width or observed frequency of exactly 0.0 is read as 1.0.
pub fn reconstruct_frequency_axis(acq: &AcquisitionParams, field_strength_mhz: f64) -> Vec<f64> {
    let sw = if acq.spectral_width == 0.0 { 1.0 } else { acq.spectral_width };
    let obs = if acq.observed_frequency == 0.0 { 1.0 } else { acq.observed_frequency };
    let size = acq.size as f64;

    let delta = -sw / size;
    let first = acq.origin - delta * (size - 1.0);

    (0..acq.size)
        .map(|i| {
            let ppm = (first + i as f64 * delta) / obs;
            ppm * field_strength_mhz
        })
        .collect()
}
