//! Request extractors.

pub mod principal;
pub use principal::*;
