//! Spectrum synthesis: Lorentzian line shapes and the solvent model.

pub mod combined;
pub mod lorentzian;
pub mod water;

pub use combined::*;
pub use lorentzian::*;
pub use water::*;
