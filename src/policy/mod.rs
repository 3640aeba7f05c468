//! Policy module - the hint-generating model and its trainer.

mod generator;
mod trainer;

pub use generator::PolicyGenerator;
pub use trainer::{PolicyTrainer, TrainerConfig, TrainingRun};
