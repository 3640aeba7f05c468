//! hintcal - Calibration rewards for hint-generating policy models.
//!
//! ## Architecture
//!
//! A **policy** model writes a free-text hint for a multiple-choice
//! question. A fixed **downstream** model answers the question, with and
//! without the hint, and reports its confidence. The policy is rewarded
//! with the log score of that confidence, so hints that make the downstream
//! model's confidence track its correctness score highest.
//!
//! ## Loop
//!
//! dataset record → policy → hint → downstream query → reply →
//! parse (answer, confidence) → reward (training) or metric (evaluation)
//!
//! - `scoring`: reply parser, log scoring rule, accuracy/ECE/entropy
//! - `query`: downstream prompt templates and the downstream model seam
//! - `pipeline`: reward function and evaluation loop
//! - `agent`: composition root over config, log directory and models

pub mod agent;
pub mod checkpoint;
pub mod client;
pub mod dataset;
pub mod models;
pub mod pipeline;
pub mod policy;
pub mod query;
pub mod scoring;

// Re-exports for convenience
pub use agent::Agent;
pub use client::{ChatClient, RetryPolicy, ServedModel};
pub use models::{Config, EvalResults, HintcalError, QuestionRecord, Result, RewardInput, RunArgs};
pub use pipeline::{Evaluator, RewardFn, RewardFunction};
pub use policy::{PolicyGenerator, PolicyTrainer};
pub use query::DownstreamModel;
pub use scoring::{Answer, ParsedReply, parse_reply, reward};
