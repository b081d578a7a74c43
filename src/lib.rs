//! Weak-coupling NMR spin system simulation and sectioned spectrum fitting
//! with solvent isolation.
//!
//! - [`spin`]: spin systems, frequency conversion, first-order peak lists
//! - [`simulate`]: Lorentzian synthesis and the solvent line
//! - [`optimize`]: quadrant-partitioned bounded fitting
//! - [`data`]: measured spectra and the NMRPipe reader/writer
//! - [`config`]: JSON run settings
//! - [`log`]: fit session log

pub mod config;
pub mod data;
pub mod error;
pub mod log;
pub mod optimize;
pub mod simulate;
pub mod spin;

pub use error::{Error, Result};
