//! Crate-wide error type.

use thiserror::Error;

use crate::config::settings::ConfigError;
use crate::data::nmrpipe_format::ReadError;
use crate::optimize::sectioned::FitError;
use crate::simulate::lorentzian::SynthesisError;
use crate::spin::matrix::MatrixParseError;
use crate::spin::system::SpinError;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Spin(#[from] SpinError),
    #[error(transparent)]
    Matrix(#[from] MatrixParseError),
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error(transparent)]
    Fit(#[from] FitError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
