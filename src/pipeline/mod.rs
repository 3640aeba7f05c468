//! Pipeline module - the reward function and the evaluation loop.

mod eval;
mod reward;

pub use eval::*;
pub use reward::*;
