//! Checkpoint module - resume discovery and the trial log directory.
//!
//! Provides:
//! - `find_last_checkpoint`: latest `checkpoint-<step>` saved by the trainer
//! - `LogDir`: run snapshot and evaluation outputs, written atomically

mod discovery;
mod log_dir;

pub use discovery::*;
pub use log_dir::*;
