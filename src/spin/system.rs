//! The coupled spin system: nuclei, chemical shifts, J-coupling matrix,
//! line widths and intensities.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::frequency::ppm_to_hz;
use super::peak::{generate_weak, PeakList};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpinError {
    #[error("{what} must contain only finite numbers")]
    Type { what: &'static str },
    #[error("couplings must be a 2D square matrix of shape ({expected}, {expected}), got {rows}x{cols}")]
    Shape {
        expected: usize,
        rows: usize,
        cols: usize,
    },
    #[error("invalid coupling strength: {0}")]
    InvalidCouplingStrength(String),
    #[error("{what} has {got} values, expected {expected}")]
    Length {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("nucleus index {index} out of range for {count} nuclei")]
    NucleusIndex { index: usize, count: usize },
}

/// Coupling regime used for peak list generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CouplingStrength {
    /// First-order multiplets.
    #[default]
    Weak,
    /// Reserved for a full quantum-mechanical treatment. Not implemented;
    /// peak generation falls back to [`CouplingStrength::Weak`].
    Strong,
}

impl fmt::Display for CouplingStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CouplingStrength::Weak => write!(f, "weak"),
            CouplingStrength::Strong => write!(f, "strong"),
        }
    }
}

impl FromStr for CouplingStrength {
    type Err = SpinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "weak" => Ok(CouplingStrength::Weak),
            "strong" => Ok(CouplingStrength::Strong),
            _ => Err(SpinError::InvalidCouplingStrength(s.to_string())),
        }
    }
}

impl TryFrom<i64> for CouplingStrength {
    type Error = SpinError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CouplingStrength::Weak),
            1 => Ok(CouplingStrength::Strong),
            other => Err(SpinError::InvalidCouplingStrength(other.to_string())),
        }
    }
}

/// Half-height width in Hz, either shared by every nucleus or one per nucleus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HalfHeightWidth {
    Uniform(f64),
    PerNucleus(Vec<f64>),
}

impl Default for HalfHeightWidth {
    fn default() -> Self {
        HalfHeightWidth::Uniform(0.5)
    }
}

impl From<f64> for HalfHeightWidth {
    fn from(value: f64) -> Self {
        HalfHeightWidth::Uniform(value)
    }
}

impl From<Vec<f64>> for HalfHeightWidth {
    fn from(value: Vec<f64>) -> Self {
        HalfHeightWidth::PerNucleus(value)
    }
}

impl HalfHeightWidth {
    /// Width for a peak tagged with `nucleus`. Per-nucleus widths have no
    /// value for untagged (negative) or out-of-range indices.
    pub fn for_nucleus(&self, nucleus: i32) -> Option<f64> {
        match self {
            HalfHeightWidth::Uniform(w) => Some(*w),
            HalfHeightWidth::PerNucleus(ws) => usize::try_from(nucleus)
                .ok()
                .and_then(|i| ws.get(i).copied()),
        }
    }

    /// One width per nucleus.
    pub fn broadcast(&self, n: usize) -> Vec<f64> {
        match self {
            HalfHeightWidth::Uniform(w) => vec![*w; n],
            HalfHeightWidth::PerNucleus(ws) => ws.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SpinSystemRecord", into = "SpinSystemRecord")]
pub struct SpinSystem {
    names: Vec<String>,
    ppm: Vec<f64>,
    hz: Vec<f64>,
    couplings: Vec<Vec<f64>>,
    half_height_width: HalfHeightWidth,
    field_strength: f64,
    intensities: Vec<f64>,
    coupling_strength: CouplingStrength,
}

/// Stored form of a [`SpinSystem`]. Hz frequencies are derived on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SpinSystemRecord {
    names: Vec<String>,
    ppm: Vec<f64>,
    couplings: Vec<Vec<f64>>,
    half_height_width: HalfHeightWidth,
    field_strength: f64,
    #[serde(default)]
    intensities: Option<Vec<f64>>,
    #[serde(default)]
    coupling_strength: CouplingStrength,
}

impl TryFrom<SpinSystemRecord> for SpinSystem {
    type Error = SpinError;

    fn try_from(record: SpinSystemRecord) -> Result<Self, Self::Error> {
        SpinSystem::new(
            record.names,
            record.ppm,
            record.couplings,
            record.half_height_width,
            record.field_strength,
            record.intensities,
            record.coupling_strength,
        )
    }
}

impl From<SpinSystem> for SpinSystemRecord {
    fn from(spin: SpinSystem) -> Self {
        Self {
            names: spin.names,
            ppm: spin.ppm,
            couplings: spin.couplings,
            half_height_width: spin.half_height_width,
            field_strength: spin.field_strength,
            intensities: Some(spin.intensities),
            coupling_strength: spin.coupling_strength,
        }
    }
}

fn warn_strong_fallback(strength: CouplingStrength) {
    if strength == CouplingStrength::Strong {
        log::warn!("Strong coupling peak list generation is still in development. Defaulting to weak coupling.");
    }
}

impl Default for SpinSystem {
    fn default() -> Self {
        Self {
            names: Vec::new(),
            ppm: Vec::new(),
            hz: Vec::new(),
            couplings: Vec::new(),
            half_height_width: HalfHeightWidth::default(),
            field_strength: 500.0,
            intensities: Vec::new(),
            coupling_strength: CouplingStrength::Weak,
        }
    }
}

impl SpinSystem {
    /// Build and validate a spin system.
    ///
    /// `ppm` holds the chemical shifts; Hz frequencies are derived with the
    /// absolute value of `field_strength` (MHz). Missing intensities default
    /// to 1.0 per nucleus.
    pub fn new(
        names: Vec<String>,
        ppm: Vec<f64>,
        couplings: Vec<Vec<f64>>,
        half_height_width: impl Into<HalfHeightWidth>,
        field_strength: f64,
        intensities: Option<Vec<f64>>,
        coupling_strength: CouplingStrength,
    ) -> Result<Self, SpinError> {
        let n = ppm.len();
        let field_strength = field_strength.abs();

        check_finite("nuclei_frequencies", &ppm)?;
        if !field_strength.is_finite() {
            return Err(SpinError::Type {
                what: "field_strength",
            });
        }
        if names.len() != n {
            return Err(SpinError::Length {
                what: "spin_names",
                expected: n,
                got: names.len(),
            });
        }
        check_matrix(&couplings, n)?;

        let half_height_width = half_height_width.into();
        check_widths(&half_height_width, n)?;

        let intensities = match intensities {
            Some(values) => {
                check_intensities(&values, n)?;
                values
            }
            None => vec![1.0; n],
        };

        warn_strong_fallback(coupling_strength);
        let hz = ppm_to_hz(&ppm, field_strength);
        Ok(Self {
            names,
            ppm,
            hz,
            couplings,
            half_height_width,
            field_strength,
            intensities,
            coupling_strength,
        })
    }

    pub fn len(&self) -> usize {
        self.ppm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ppm.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn ppm(&self) -> &[f64] {
        &self.ppm
    }

    /// Nucleus frequencies in Hz.
    pub fn frequencies(&self) -> &[f64] {
        &self.hz
    }

    pub fn field_strength(&self) -> f64 {
        self.field_strength
    }

    pub fn couplings(&self) -> &[Vec<f64>] {
        &self.couplings
    }

    pub fn coupling(&self, i: usize, j: usize) -> Option<f64> {
        self.couplings.get(i).and_then(|row| row.get(j)).copied()
    }

    pub fn intensities(&self) -> &[f64] {
        &self.intensities
    }

    pub fn half_height_width(&self) -> &HalfHeightWidth {
        &self.half_height_width
    }

    pub fn coupling_strength(&self) -> CouplingStrength {
        self.coupling_strength
    }

    /// Set `J(i, j)` and `J(j, i)` together.
    pub fn set_coupling(&mut self, i: usize, j: usize, value: f64) -> Result<(), SpinError> {
        let n = self.len();
        for index in [i, j] {
            if index >= n {
                return Err(SpinError::NucleusIndex { index, count: n });
            }
        }
        if !value.is_finite() {
            return Err(SpinError::Type { what: "couplings" });
        }
        if i == j {
            // The diagonal never carries a coupling.
            self.couplings[i][i] = 0.0;
            return Ok(());
        }
        self.couplings[i][j] = value;
        self.couplings[j][i] = value;
        Ok(())
    }

    /// Replace the whole coupling matrix.
    pub fn set_couplings(&mut self, couplings: Vec<Vec<f64>>) -> Result<(), SpinError> {
        check_matrix(&couplings, self.len())?;
        self.couplings = couplings;
        Ok(())
    }

    /// Replace the chemical shifts; Hz values follow.
    pub fn set_ppm(&mut self, ppm: Vec<f64>) -> Result<(), SpinError> {
        check_finite("nuclei_frequencies", &ppm)?;
        if ppm.len() != self.len() {
            return Err(SpinError::Length {
                what: "nuclei_frequencies",
                expected: self.len(),
                got: ppm.len(),
            });
        }
        self.hz = ppm_to_hz(&ppm, self.field_strength);
        self.ppm = ppm;
        Ok(())
    }

    /// Change the spectrometer field; Hz values follow.
    pub fn set_field_strength(&mut self, field_strength: f64) -> Result<(), SpinError> {
        let field_strength = field_strength.abs();
        if !field_strength.is_finite() {
            return Err(SpinError::Type {
                what: "field_strength",
            });
        }
        self.field_strength = field_strength;
        self.hz = ppm_to_hz(&self.ppm, field_strength);
        Ok(())
    }

    pub fn set_intensities(&mut self, intensities: Vec<f64>) -> Result<(), SpinError> {
        check_intensities(&intensities, self.len())?;
        self.intensities = intensities;
        Ok(())
    }

    pub fn set_half_height_width(&mut self, width: impl Into<HalfHeightWidth>) -> Result<(), SpinError> {
        let width = width.into();
        check_widths(&width, self.len())?;
        self.half_height_width = width;
        Ok(())
    }

    pub fn set_coupling_strength(&mut self, strength: CouplingStrength) {
        if strength != self.coupling_strength {
            warn_strong_fallback(strength);
        }
        self.coupling_strength = strength;
    }

    /// A copy of this system with new couplings, intensities and widths.
    /// Names, shifts and field strength are shared.
    pub fn with_parameters(
        &self,
        couplings: Vec<Vec<f64>>,
        intensities: Vec<f64>,
        half_height_width: impl Into<HalfHeightWidth>,
    ) -> Result<Self, SpinError> {
        let mut next = self.clone();
        next.set_couplings(couplings)?;
        next.set_intensities(intensities)?;
        next.set_half_height_width(half_height_width)?;
        Ok(next)
    }

    /// Regenerate the peak list, optionally storing new intensities first.
    pub fn peaklist(&mut self, intensities: Option<Vec<f64>>) -> Result<PeakList, SpinError> {
        if let Some(values) = intensities {
            self.set_intensities(values)?;
        }
        Ok(self.peaks())
    }

    /// Peak list for the current state. Strong coupling uses the weak
    /// path; the fallback is reported when the mode is chosen.
    pub fn peaks(&self) -> PeakList {
        generate_weak(&self.hz, &self.couplings, &self.intensities)
    }
}

fn check_finite(what: &'static str, values: &[f64]) -> Result<(), SpinError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(SpinError::Type { what })
    }
}

fn check_matrix(couplings: &[Vec<f64>], n: usize) -> Result<(), SpinError> {
    let rows = couplings.len();
    if let Some(bad) = couplings.iter().find(|row| row.len() != n) {
        return Err(SpinError::Shape {
            expected: n,
            rows,
            cols: bad.len(),
        });
    }
    if rows != n {
        return Err(SpinError::Shape {
            expected: n,
            rows,
            cols: couplings.first().map_or(0, Vec::len),
        });
    }
    for row in couplings {
        check_finite("couplings", row)?;
    }
    Ok(())
}

fn check_widths(width: &HalfHeightWidth, n: usize) -> Result<(), SpinError> {
    match width {
        HalfHeightWidth::Uniform(w) => check_finite("half_height_width", &[*w]),
        HalfHeightWidth::PerNucleus(ws) => {
            if ws.len() != n {
                return Err(SpinError::Length {
                    what: "half_height_width",
                    expected: n,
                    got: ws.len(),
                });
            }
            check_finite("half_height_width", ws)
        }
    }
}

fn check_intensities(values: &[f64], n: usize) -> Result<(), SpinError> {
    if values.len() != n {
        return Err(SpinError::Length {
            what: "intensities",
            expected: n,
            got: values.len(),
        });
    }
    check_finite("intensities", values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spin::peak::nucleus_intensity;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("H{}", i + 1)).collect()
    }

    fn ab_system() -> SpinSystem {
        SpinSystem::new(
            vec!["A".into(), "B".into()],
            vec![1.0, 2.0],
            vec![vec![0.0, 10.0], vec![10.0, 0.0]],
            0.5,
            500.0,
            None,
            CouplingStrength::Weak,
        )
        .unwrap()
    }

    #[test]
    fn test_derives_hz_and_default_intensities() {
        let spin = ab_system();
        assert_eq!(spin.frequencies(), &[500.0, 1000.0]);
        assert_eq!(spin.intensities(), &[1.0, 1.0]);
        assert_eq!(spin.len(), 2);
    }

    #[test]
    fn test_rejects_non_square_matrix() {
        let err = SpinSystem::new(
            names(2),
            vec![1.0, 2.0],
            vec![vec![0.0, 1.0, 2.0], vec![1.0, 0.0, 3.0]],
            0.5,
            500.0,
            None,
            CouplingStrength::Weak,
        )
        .unwrap_err();
        assert!(matches!(err, SpinError::Shape { expected: 2, .. }));

        let err = SpinSystem::new(
            names(2),
            vec![1.0, 2.0],
            vec![vec![0.0, 1.0]],
            0.5,
            500.0,
            None,
            CouplingStrength::Weak,
        )
        .unwrap_err();
        assert!(matches!(err, SpinError::Shape { rows: 1, .. }));
    }

    #[test]
    fn test_rejects_non_finite_and_bad_lengths() {
        let err = SpinSystem::new(
            names(1),
            vec![f64::NAN],
            vec![vec![0.0]],
            0.5,
            500.0,
            None,
            CouplingStrength::Weak,
        )
        .unwrap_err();
        assert!(matches!(err, SpinError::Type { .. }));

        let err = SpinSystem::new(
            names(2),
            vec![1.0, 2.0],
            vec![vec![0.0; 2]; 2],
            vec![0.5],
            500.0,
            None,
            CouplingStrength::Weak,
        )
        .unwrap_err();
        assert!(matches!(err, SpinError::Length { what: "half_height_width", .. }));

        let err = SpinSystem::new(
            names(2),
            vec![1.0, 2.0],
            vec![vec![0.0; 2]; 2],
            0.5,
            500.0,
            Some(vec![1.0]),
            CouplingStrength::Weak,
        )
        .unwrap_err();
        assert!(matches!(err, SpinError::Length { what: "intensities", .. }));
    }

    #[test]
    fn test_coupling_strength_parsing() {
        assert_eq!("Weak".parse::<CouplingStrength>().unwrap(), CouplingStrength::Weak);
        assert_eq!("strong".parse::<CouplingStrength>().unwrap(), CouplingStrength::Strong);
        assert_eq!(CouplingStrength::try_from(1).unwrap(), CouplingStrength::Strong);
        assert!(matches!(
            "medium".parse::<CouplingStrength>(),
            Err(SpinError::InvalidCouplingStrength(_))
        ));
        assert!(CouplingStrength::try_from(2).is_err());
    }

    #[test]
    fn test_set_coupling_is_symmetric() {
        let mut spin = ab_system();
        spin.set_coupling(1, 0, 7.5).unwrap();
        assert_eq!(spin.coupling(0, 1), Some(7.5));
        assert_eq!(spin.coupling(1, 0), Some(7.5));

        spin.set_coupling(0, 0, 3.0).unwrap();
        assert_eq!(spin.coupling(0, 0), Some(0.0));

        assert!(matches!(
            spin.set_coupling(0, 2, 1.0),
            Err(SpinError::NucleusIndex { index: 2, count: 2 })
        ));
    }

    #[test]
    fn test_field_and_shift_setters_keep_hz_in_sync() {
        let mut spin = ab_system();
        spin.set_field_strength(-600.0).unwrap();
        assert_eq!(spin.field_strength(), 600.0);
        assert_eq!(spin.frequencies(), &[600.0, 1200.0]);

        spin.set_ppm(vec![2.0, 3.0]).unwrap();
        assert_eq!(spin.frequencies(), &[1200.0, 1800.0]);
        assert!(spin.set_ppm(vec![1.0]).is_err());
    }

    #[test]
    fn test_peaklist_overwrites_intensities() {
        let mut spin = ab_system();
        let peaks = spin.peaklist(Some(vec![2.0, 4.0])).unwrap();
        assert_eq!(spin.intensities(), &[2.0, 4.0]);
        assert!((nucleus_intensity(&peaks, 0) - 2.0).abs() < 1e-12);
        assert!((nucleus_intensity(&peaks, 1) - 4.0).abs() < 1e-12);
        let freqs: Vec<f64> = peaks.iter().map(|p| p.frequency).collect();
        assert_eq!(freqs, vec![495.0, 505.0, 995.0, 1005.0]);
    }

    #[test]
    fn test_strong_coupling_falls_back_to_weak() {
        let mut spin = ab_system();
        let weak = spin.peaks();
        spin.set_coupling_strength(CouplingStrength::Strong);
        assert_eq!(spin.peaks(), weak);
    }

    #[test]
    fn test_width_lookup() {
        let uniform = HalfHeightWidth::Uniform(1.5);
        assert_eq!(uniform.for_nucleus(-1), Some(1.5));
        let per = HalfHeightWidth::PerNucleus(vec![1.0, 2.0]);
        assert_eq!(per.for_nucleus(1), Some(2.0));
        assert_eq!(per.for_nucleus(-1), None);
        assert_eq!(per.for_nucleus(5), None);
        assert_eq!(uniform.broadcast(3), vec![1.5; 3]);
    }

    #[test]
    fn test_strong_system_clones_share_the_weak_peaks() {
        let mut spin = ab_system();
        spin.set_coupling_strength(CouplingStrength::Strong);
        let trial = spin
            .with_parameters(vec![vec![0.0, 10.0], vec![10.0, 0.0]], vec![1.0, 1.0], 0.5)
            .unwrap();
        assert_eq!(trial.coupling_strength(), CouplingStrength::Strong);
        assert_eq!(trial.peaks(), ab_system().peaks());
    }

    #[test]
    fn test_serde_roundtrip_rebuilds_hz() {
        let spin = ab_system();
        let json = serde_json::to_string(&spin).unwrap();
        assert!(!json.contains("\"hz\""));
        let back: SpinSystem = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spin);
        assert_eq!(back.frequencies(), &[500.0, 1000.0]);
    }

    #[test]
    fn test_deserialize_validates_through_constructor() {
        let bad_shape = r#"{
            "names": ["A", "B"],
            "ppm": [1.0, 2.0],
            "couplings": [[0.0, 1.0]],
            "half_height_width": 0.5,
            "field_strength": 500.0
        }"#;
        assert!(serde_json::from_str::<SpinSystem>(bad_shape).is_err());

        let minimal = r#"{
            "names": ["A"],
            "ppm": [2.0],
            "couplings": [[0.0]],
            "half_height_width": [1.5],
            "field_strength": -400.0
        }"#;
        let spin: SpinSystem = serde_json::from_str(minimal).unwrap();
        assert_eq!(spin.frequencies(), &[800.0]);
        assert_eq!(spin.intensities(), &[1.0]);
        assert_eq!(spin.coupling_strength(), CouplingStrength::Weak);
    }
}
