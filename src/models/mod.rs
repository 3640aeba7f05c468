//! Core data models for hintcal.
//!
//! - `config`: TOML configuration and run arguments
//! - `error`: error taxonomy
//! - `sample`: dataset records, reward inputs, evaluation outputs

mod config;
mod error;
mod sample;

pub use config::*;
pub use error::*;
pub use sample::*;
