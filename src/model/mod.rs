mod dense;
mod module;
mod sequential;

pub use dense::{ActFnConfig, Dense, DenseConfig};
pub use module::{LoadReport, Module, Parameter};
pub use sequential::{Sequential, SequentialConfig};
