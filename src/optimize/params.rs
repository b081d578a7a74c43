//! Flat parameter vector used by the sectioned fit.
//!
//! Layout for `n` nuclei:
//!
//! ```text
//! [ J (n*n, row-major) | I (n) | water freq, intensity, hhw (optional) | sw, obs | hhw (n) ]
//! ```

use std::ops::Range;

use crate::simulate::water::WaterModel;
use crate::spin::system::SpinSystem;

pub const COUPLING_BOUNDS: (f64, f64) = (-100.0, 100.0);
pub const INTENSITY_BOUNDS: (f64, f64) = (-1000.0, 1000.0);
pub const WIDTH_BOUNDS: (f64, f64) = (0.5, 100.0);
pub const NUISANCE_BOUNDS: (f64, f64) = (1e-6, 1e6);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamLayout {
    pub nuclei: usize,
    pub with_water: bool,
}

/// Solvent values decoded from a parameter vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaterParams {
    pub frequency: f64,
    pub intensity: f64,
    pub hhw: f64,
}

/// Named view of a parameter vector.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedParams {
    pub couplings: Vec<Vec<f64>>,
    pub intensities: Vec<f64>,
    pub water: Option<WaterParams>,
    pub spectral_width: f64,
    pub observed_frequency: f64,
    pub half_height_widths: Vec<f64>,
}

impl ParamLayout {
    pub fn new(nuclei: usize, with_water: bool) -> Self {
        Self { nuclei, with_water }
    }

    fn water_slots(&self) -> usize {
        if self.with_water {
            3
        } else {
            0
        }
    }

    pub fn len(&self) -> usize {
        let n = self.nuclei;
        n * n + n + self.water_slots() + 2 + n
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    fn intensity_start(&self) -> usize {
        self.nuclei * self.nuclei
    }

    fn water_start(&self) -> usize {
        self.intensity_start() + self.nuclei
    }

    fn nuisance_start(&self) -> usize {
        self.water_start() + self.water_slots()
    }

    fn width_start(&self) -> usize {
        self.nuisance_start() + 2
    }

    /// Slots holding row `nucleus` of the coupling matrix.
    pub fn coupling_row(&self, nucleus: usize) -> Range<usize> {
        nucleus * self.nuclei..(nucleus + 1) * self.nuclei
    }

    pub fn intensity_index(&self, nucleus: usize) -> usize {
        self.intensity_start() + nucleus
    }

    pub fn width_index(&self, nucleus: usize) -> usize {
        self.width_start() + nucleus
    }

    /// Pack a spin system (and water model) into a starting vector.
    ///
    /// `intensities` overrides the spin system's own values; the fit seeds
    /// every nucleus at 1.0.
    pub fn encode(
        &self,
        spin: &SpinSystem,
        intensities: &[f64],
        water: Option<&WaterModel>,
        spectral_width: f64,
        observed_frequency: f64,
    ) -> Vec<f64> {
        let mut params = Vec::with_capacity(self.len());
        for row in spin.couplings() {
            params.extend_from_slice(row);
        }
        params.extend_from_slice(intensities);
        if self.with_water {
            let w = water.cloned().unwrap_or_default();
            params.extend_from_slice(&[w.frequency(), w.intensity(), w.hhw()]);
        }
        params.push(spectral_width);
        params.push(observed_frequency);
        params.extend(spin.half_height_width().broadcast(self.nuclei));
        params
    }

    pub fn decode(&self, params: &[f64]) -> DecodedParams {
        let n = self.nuclei;
        let couplings = params[..n * n].chunks(n.max(1)).take(n).map(<[f64]>::to_vec).collect();
        let intensities = params[self.intensity_start()..self.water_start()].to_vec();

        let water = self.with_water.then(|| {
            let w = self.water_start();
            WaterParams {
                frequency: params[w],
                intensity: params[w + 1],
                hhw: params[w + 2],
            }
        });

        let s = self.nuisance_start();
        DecodedParams {
            couplings,
            intensities,
            water,
            spectral_width: params[s],
            observed_frequency: params[s + 1],
            half_height_widths: params[self.width_start()..self.width_start() + n].to_vec(),
        }
    }

    /// Box bounds for every slot.
    pub fn bounds(&self, water_left: f64, water_right: f64) -> Vec<(f64, f64)> {
        let n = self.nuclei;
        let mut bounds = Vec::with_capacity(self.len());
        bounds.extend(std::iter::repeat(COUPLING_BOUNDS).take(n * n));
        bounds.extend(std::iter::repeat(INTENSITY_BOUNDS).take(n));
        if self.with_water {
            bounds.push((water_left, water_right));
            bounds.push(INTENSITY_BOUNDS);
            bounds.push(WIDTH_BOUNDS);
        }
        bounds.push(NUISANCE_BOUNDS);
        bounds.push(NUISANCE_BOUNDS);
        bounds.extend(std::iter::repeat(WIDTH_BOUNDS).take(n));
        bounds
    }
}
