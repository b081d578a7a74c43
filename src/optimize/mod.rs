//! Sectioned fitting of a spin system against a measured spectrum.

pub mod minimizer;
pub mod observer;
pub mod params;
pub mod sectioned;
pub mod worker;

pub use minimizer::*;
pub use observer::*;
pub use params::*;
pub use sectioned::*;
pub use worker::*;
