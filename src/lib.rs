pub mod builder;
pub mod checkpoint;
pub mod config;
pub mod data;
pub mod error;
pub mod initialization;
pub mod model;
pub mod registry;
pub mod reporting;

pub use error::{PreglyphErr, Result};
