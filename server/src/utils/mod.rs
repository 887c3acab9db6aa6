//! Utility functions and helpers.

pub mod env;

pub use env::{EnvUtils, EnvVarError};
