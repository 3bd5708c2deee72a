//! Shared building blocks for the broker crates: logging bootstrap,
//! runtime environment checks, shutdown signalling and wire types.

pub mod types;
pub mod utils;
pub mod env;
