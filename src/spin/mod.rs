//! Spin system model and first-order peak list generation.

pub mod frequency;
pub mod matrix;
pub mod peak;
pub mod system;

pub use frequency::*;
pub use matrix::*;
pub use peak::*;
pub use system::*;
