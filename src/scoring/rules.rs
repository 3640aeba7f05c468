//! Logarithmic scoring rule over the "top answer is correct" event.
//!
//! The reported confidence is read as P(correct). The reward is the log
//! probability the model assigned to what actually happened:
//!
//! | reply                | reward                         |
//! |----------------------|--------------------------------|
//! | unparseable          | `ln(INVALID_RESPONSE_FORMAT_PENALTY)` |
//! | answer == gt         | `ln(clip(p))`                  |
//! | answer != gt         | `ln(clip(1 - p))`              |
//!
//! with `clip` onto `[1e-10, 1]`. Its expectation is maximized exactly when
//! `p` equals the true probability of being correct, and it is never positive.

use super::parser::{Answer, ParsedReply, INVALID_RESPONSE_FORMAT_PENALTY, clip_probability};

/// Log score for one reply against the ground-truth option.
pub fn reward(answer: Answer, confidence: f64, gt_answer: u32) -> f64 {
    match answer {
        Answer::Unparseable => INVALID_RESPONSE_FORMAT_PENALTY.ln(),
        a if a.is_correct(gt_answer) => clip_probability(confidence).ln(),
        _ => clip_probability(1.0 - confidence).ln(),
    }
}

/// [`reward`] for an already parsed reply.
pub fn score_reply(reply: &ParsedReply, gt_answer: u32) -> f64 {
    reward(reply.answer, reply.confidence, gt_answer)
}
