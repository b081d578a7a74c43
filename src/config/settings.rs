//! Run configuration, stored as JSON.
//!
//! Every section defaults field by field, so a partial settings file loads.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::optimize::minimizer::MinimizerOptions;
use crate::simulate::lorentzian::FreqLimits;
use crate::simulate::water::WaterModel;
use crate::spin::matrix::{load_spin_matrix, MatrixParseError};
use crate::spin::system::{CouplingStrength, HalfHeightWidth, SpinError, SpinSystem};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("settings JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing setting: {0}")]
    Missing(&'static str),
    #[error("spin matrix error: {0}")]
    Matrix(#[from] MatrixParseError),
    #[error("spin system error: {0}")]
    Spin(#[from] SpinError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Spin-matrix text file; fills whichever spin lists are left empty.
    pub spin_file: Option<PathBuf>,
    /// 1D NMRPipe spectrum to fit against.
    pub nmr_file: Option<PathBuf>,
    pub output_file: PathBuf,
    /// Where to save the JSON fit log, if anywhere.
    pub log_file: Option<PathBuf>,
    pub spin: SpinSettings,
    pub sim_settings: SimSettings,
    pub opt_settings: OptSettings,
    pub water_sim: WaterSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            spin_file: None,
            nmr_file: None,
            output_file: PathBuf::from("output.ft1"),
            log_file: None,
            spin: SpinSettings::default(),
            sim_settings: SimSettings::default(),
            opt_settings: OptSettings::default(),
            water_sim: WaterSettings::default(),
        }
    }
}

/// Spin system values given inline. Empty lists are taken from the spin
/// file or from [`SimSettings`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpinSettings {
    pub spin_names: Vec<String>,
    /// Chemical shifts (ppm)
    pub nuclei_frequencies: Vec<f64>,
    pub couplings: Vec<Vec<f64>>,
    pub half_height_width: Option<HalfHeightWidth>,
    pub intensities: Vec<f64>,
    pub coupling_strength: CouplingStrength,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimSettings {
    /// Spectrometer frequency (MHz)
    pub field_strength: f64,
    /// Points in the synthesized output spectrum
    pub points: usize,
    /// Per-nucleus intensity when none is given
    pub intensity: f64,
    /// Per-nucleus half-height width when none is given
    pub half_height_width: f64,
    /// Prefer these defaults over inline intensities and widths
    pub use_settings: bool,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            field_strength: 500.0,
            points: 1000,
            intensity: 1.0,
            half_height_width: 1.0,
            use_settings: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptSettings {
    /// Lower water bound (Hz)
    pub water_left: f64,
    /// Upper water bound (Hz)
    pub water_right: f64,
    #[serde(flatten)]
    pub minimizer: MinimizerOptions,
}

impl Default for OptSettings {
    fn default() -> Self {
        Self {
            water_left: 0.0,
            water_right: 10.0,
            minimizer: MinimizerOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaterSettings {
    pub water_enable: bool,
    /// Hz
    pub frequency: f64,
    pub intensity: f64,
    pub hhw: f64,
}

impl Default for WaterSettings {
    fn default() -> Self {
        Self {
            water_enable: false,
            frequency: 0.0,
            intensity: 1.0,
            hhw: 1.0,
        }
    }
}

/// Command-line values that replace settings when present.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub spin_file: Option<PathBuf>,
    pub nmr_file: Option<PathBuf>,
    pub output_file: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub field_strength: Option<f64>,
    pub water_bounds: Option<FreqLimits>,
    pub water_enable: bool,
    pub water_frequency: Option<f64>,
    pub water_intensity: Option<f64>,
    pub water_hhw: Option<f64>,
    pub points: Option<usize>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let settings = serde_json::from_str(&text)?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Save as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(path) = &overrides.spin_file {
            self.spin_file = Some(path.clone());
        }
        if let Some(path) = &overrides.nmr_file {
            self.nmr_file = Some(path.clone());
        }
        if let Some(path) = &overrides.output_file {
            self.output_file = path.clone();
        }
        if let Some(path) = &overrides.log_file {
            self.log_file = Some(path.clone());
        }
        if let Some(field) = overrides.field_strength {
            self.sim_settings.field_strength = field;
        }
        if let Some((left, right)) = overrides.water_bounds {
            self.opt_settings.water_left = left;
            self.opt_settings.water_right = right;
        }
        if overrides.water_enable {
            self.water_sim.water_enable = true;
        }
        if let Some(v) = overrides.water_frequency {
            self.water_sim.frequency = v;
        }
        if let Some(v) = overrides.water_intensity {
            self.water_sim.intensity = v;
        }
        if let Some(v) = overrides.water_hhw {
            self.water_sim.hhw = v;
        }
        if let Some(points) = overrides.points {
            self.sim_settings.points = points;
        }
    }

    /// Water bounds for the sectioned fit.
    pub fn water_range(&self) -> FreqLimits {
        (self.opt_settings.water_left, self.opt_settings.water_right)
    }

    /// Resolve the spin system from inline values and the spin file.
    ///
    /// Names, shifts and couplings left empty come from `spin_file`;
    /// intensities and widths left empty come from `sim_settings`, as do all
    /// of them when `use_settings` is set.
    pub fn build_spin(&self) -> Result<SpinSystem, ConfigError> {
        let inline = &self.spin;
        let needs_file = inline.spin_names.is_empty()
            || inline.nuclei_frequencies.is_empty()
            || inline.couplings.is_empty();

        let (mut names, mut ppm, mut couplings) = (
            inline.spin_names.clone(),
            inline.nuclei_frequencies.clone(),
            inline.couplings.clone(),
        );
        if needs_file {
            let path = self
                .spin_file
                .as_deref()
                .filter(|p| !p.as_os_str().is_empty())
                .ok_or(ConfigError::Missing("spin_file"))?;
            let matrix = load_spin_matrix(path)?;
            log::info!("Loaded {} nuclei from {}", matrix.names.len(), path.display());
            if names.is_empty() {
                names = matrix.names;
            }
            if ppm.is_empty() {
                ppm = matrix.ppm;
            }
            if couplings.is_empty() {
                couplings = matrix.couplings;
            }
        }

        let n = ppm.len();
        let sim = &self.sim_settings;
        let intensities = if sim.use_settings || inline.intensities.is_empty() {
            vec![sim.intensity; n]
        } else {
            inline.intensities.clone()
        };
        let width = match &inline.half_height_width {
            Some(width) if !sim.use_settings => width.clone(),
            _ => HalfHeightWidth::PerNucleus(vec![sim.half_height_width; n]),
        };

        Ok(SpinSystem::new(
            names,
            ppm,
            couplings,
            width,
            sim.field_strength,
            Some(intensities),
            inline.coupling_strength,
        )?)
    }

    /// The water model, when the solvent line is enabled.
    pub fn build_water(&self) -> Option<WaterModel> {
        let w = &self.water_sim;
        w.water_enable
            .then(|| WaterModel::new(w.frequency, w.intensity, w.hhw, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_fills_defaults() {
        let settings: Settings = serde_json::from_str(
            r#"{ "nmr_file": "test.ft1", "opt_settings": { "water_left": 2300.0, "max_iterations": 50 } }"#,
        )
        .unwrap();
        assert_eq!(settings.nmr_file, Some(PathBuf::from("test.ft1")));
        assert_eq!(settings.output_file, PathBuf::from("output.ft1"));
        assert_eq!(settings.opt_settings.water_left, 2300.0);
        assert_eq!(settings.opt_settings.water_right, 10.0);
        assert_eq!(settings.opt_settings.minimizer.max_iterations, 50);
        assert_eq!(settings.opt_settings.minimizer.memory, 10);
        assert_eq!(settings.sim_settings.points, 1000);
        assert!(!settings.water_sim.water_enable);
    }

    #[test]
    fn test_save_then_load() {
        let mut settings = Settings::default();
        settings.spin.spin_names = vec!["H1".into()];
        settings.spin.half_height_width = Some(HalfHeightWidth::Uniform(0.8));
        settings.water_sim.water_enable = true;

        let file = tempfile::NamedTempFile::new().unwrap();
        settings.save(file.path()).unwrap();
        let loaded = Settings::load(file.path()).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_overrides_win() {
        let mut settings = Settings::default();
        settings.apply_overrides(&Overrides {
            field_strength: Some(600.0),
            water_bounds: Some((2300.0, 2400.0)),
            water_enable: true,
            water_frequency: Some(2350.0),
            points: Some(2048),
            ..Overrides::default()
        });
        assert_eq!(settings.sim_settings.field_strength, 600.0);
        assert_eq!(settings.water_range(), (2300.0, 2400.0));
        assert_eq!(settings.sim_settings.points, 2048);
        let water = settings.build_water().unwrap();
        assert_eq!(water.frequency(), 2350.0);
        assert!(water.is_enabled());
    }

    #[test]
    fn test_spin_from_inline_values_only() {
        let mut settings = Settings::default();
        settings.spin = SpinSettings {
            spin_names: vec!["a".into(), "b".into()],
            nuclei_frequencies: vec![1.0, 2.0],
            couplings: vec![vec![0.0, 7.0], vec![7.0, 0.0]],
            half_height_width: None,
            intensities: vec![],
            coupling_strength: CouplingStrength::Weak,
        };
        settings.sim_settings.intensity = 3.0;
        settings.sim_settings.half_height_width = 0.5;

        let spin = settings.build_spin().unwrap();
        assert_eq!(spin.intensities(), &[3.0, 3.0]);
        assert_eq!(spin.half_height_width().broadcast(2), vec![0.5, 0.5]);
        assert_eq!(spin.frequencies(), &[500.0, 1000.0]);
        assert!(settings.build_water().is_none());
    }

    #[test]
    fn test_spin_lists_fall_back_to_the_spin_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Ha Hb\nHa 1.0 7.0\nHb 0.0 2.0\nend\n").unwrap();

        let mut settings = Settings {
            spin_file: Some(file.path().to_path_buf()),
            ..Settings::default()
        };
        settings.spin.intensities = vec![2.0, 4.0];
        let spin = settings.build_spin().unwrap();
        assert_eq!(spin.names(), &["Ha".to_string(), "Hb".to_string()]);
        assert_eq!(spin.ppm(), &[1.0, 2.0]);
        assert_eq!(spin.coupling(0, 1), Some(7.0));
        assert_eq!(spin.intensities(), &[2.0, 4.0]);

        settings.sim_settings.use_settings = true;
        let spin = settings.build_spin().unwrap();
        assert_eq!(spin.intensities(), &[1.0, 1.0]);
    }

    #[test]
    fn test_missing_spin_file_is_reported() {
        let settings = Settings::default();
        assert!(matches!(settings.build_spin(), Err(ConfigError::Missing("spin_file"))));
    }
}
