//! List queries: raw parameters, the Query Compiler, and the resulting plan.

mod compiler;
mod params;
mod plan;
pub use compiler::*;
pub use params::*;
pub use plan::*;
