//! Scoring module - reply parsing, the log scoring rule, calibration metrics.

pub mod metrics;
pub mod parser;
pub mod rules;

pub use metrics::{
    AnswerFrequency, accuracy, calibration_metrics, expected_calibration_error, normalized_entropy,
};
pub use parser::{
    Answer, INVALID_RESPONSE_FORMAT_PENALTY, PROBABILITY_FLOOR, ParsedReply, clip_probability,
    parse_reply,
};
pub use rules::{reward, score_reply};
