//! Spin-matrix text file reader.
//!
//! Layout:
//!
//! ```text
//! H1    H2    H3
//! H1  1.20  7.0   0.0
//! H2  0.0   3.45  2.5
//! H3  0.0   0.0   4.10
//! end
//! ```
//!
//! The first non-empty line names the nuclei. Each following line is a
//! labelled matrix row whose diagonal entry is the chemical shift (ppm) and
//! whose off-diagonal entries are couplings (Hz). The last line of the file
//! is ignored. The coupling matrix is symmetrized as `M + Mᵀ`, so only one
//! triangle should be filled in.

use std::io;
use std::path::Path;
use thiserror::Error;

use super::system::{CouplingStrength, HalfHeightWidth, SpinError, SpinSystem};

#[derive(Error, Debug)]
pub enum MatrixParseError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("spin matrix file is empty")]
    Empty,
    #[error("expected {expected} matrix rows, found {got}")]
    RowCount { expected: usize, got: usize },
    #[error("line {line}: expected {expected} values after the row label, found {got}")]
    ShortRow {
        line: usize,
        expected: usize,
        got: usize,
    },
    #[error("line {line}: '{token}' is not a number")]
    BadNumber { line: usize, token: String },
}

/// Contents of a spin-matrix file.
#[derive(Debug, Clone, PartialEq)]
pub struct SpinMatrix {
    pub names: Vec<String>,
    /// Chemical shifts in ppm, taken from the diagonal.
    pub ppm: Vec<f64>,
    /// Symmetrized coupling matrix in Hz with a zero diagonal.
    pub couplings: Vec<Vec<f64>>,
}

impl SpinMatrix {
    /// Build a weakly coupled spin system from the parsed matrix.
    pub fn into_spin(
        self,
        half_height_width: impl Into<HalfHeightWidth>,
        field_strength: f64,
        intensities: Option<Vec<f64>>,
    ) -> Result<SpinSystem, SpinError> {
        SpinSystem::new(
            self.names,
            self.ppm,
            self.couplings,
            half_height_width,
            field_strength,
            intensities,
            CouplingStrength::Weak,
        )
    }
}

pub fn load_spin_matrix(path: &Path) -> Result<SpinMatrix, MatrixParseError> {
    let text = std::fs::read_to_string(path)?;
    parse_spin_matrix(&text)
}

pub fn parse_spin_matrix(text: &str) -> Result<SpinMatrix, MatrixParseError> {
    // (1-based line number, trimmed content) of every non-empty line
    let lines: Vec<(usize, &str)> = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty())
        .collect();

    let Some(&(_, header)) = lines.first() else {
        return Err(MatrixParseError::Empty);
    };
    let names: Vec<String> = header.split_whitespace().map(str::to_string).collect();
    let n = names.len();

    let rows = if lines.len() >= 2 {
        &lines[1..lines.len() - 1]
    } else {
        &lines[1..]
    };
    if rows.len() != n {
        return Err(MatrixParseError::RowCount {
            expected: n,
            got: rows.len(),
        });
    }

    let mut ppm = Vec::with_capacity(n);
    let mut raw = vec![vec![0.0; n]; n];

    for (i, &(line, content)) in rows.iter().enumerate() {
        let values: Vec<&str> = content.split_whitespace().skip(1).collect();
        if values.len() < n {
            return Err(MatrixParseError::ShortRow {
                line,
                expected: n,
                got: values.len(),
            });
        }
        for (j, token) in values.iter().take(n).enumerate() {
            let value: f64 = token.parse().map_err(|_| MatrixParseError::BadNumber {
                line,
                token: token.to_string(),
            })?;
            if i == j {
                ppm.push(value);
            } else {
                raw[i][j] = value;
            }
        }
    }

    let couplings = (0..n)
        .map(|i| (0..n).map(|j| raw[i][j] + raw[j][i]).collect())
        .collect();

    log::debug!("Parsed spin matrix with {} nuclei", n);
    Ok(SpinMatrix {
        names,
        ppm,
        couplings,
    })
}
