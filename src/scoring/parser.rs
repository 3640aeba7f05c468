//! Extracts the selected option and reported confidence from a downstream
//! reply.
//!
//! The downstream prompt asks for two labelled lines:
//!
//! ```text
//! Answer: <option number>
//! Confidence: <probability between 0 and 1>
//! ```
//!
//! Models decorate these freely (`**Answer:** (2)`, `Confidence: 85%`), and
//! often restate them after some reasoning, so the last occurrence of each
//! label wins. A reply missing either label parses to [`Answer::Unparseable`]
//! with [`INVALID_RESPONSE_FORMAT_PENALTY`] as its confidence.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Probability assigned to a reply that does not follow the reporting format.
pub const INVALID_RESPONSE_FORMAT_PENALTY: f64 = 1e-4;

/// Smallest probability the loop ever carries; keeps `ln` finite.
pub const PROBABILITY_FLOOR: f64 = 1e-10;

/// Selected option of a downstream reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Answer {
    /// 1-based option number as written by the model (not range-checked)
    Choice(u32),
    /// No answer/confidence could be read from the reply
    Unparseable,
}

impl Answer {
    /// Numeric form used in exported records.
    pub const SENTINEL: i64 = -1;

    pub fn choice(self) -> Option<u32> {
        match self {
            Self::Choice(n) => Some(n),
            Self::Unparseable => None,
        }
    }

    /// The option number as `i64`, or [`Answer::SENTINEL`].
    pub fn as_i64(self) -> i64 {
        self.choice().map_or(Self::SENTINEL, i64::from)
    }

    /// `Some(index)` (0-based) when the choice names one of `num_options`.
    pub fn option_index(self, num_options: usize) -> Option<usize> {
        let n = self.choice()? as usize;
        (1..=num_options).contains(&n).then(|| n - 1)
    }

    pub fn is_correct(self, gt_answer: u32) -> bool {
        self == Self::Choice(gt_answer)
    }
}

/// A downstream reply reduced to (answer, confidence).
///
/// `confidence` is always in `[PROBABILITY_FLOOR, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParsedReply {
    pub answer: Answer,
    pub confidence: f64,
}

impl ParsedReply {
    pub fn unparseable() -> Self {
        Self {
            answer: Answer::Unparseable,
            confidence: INVALID_RESPONSE_FORMAT_PENALTY,
        }
    }

    pub fn is_unparseable(&self) -> bool {
        self.answer == Answer::Unparseable
    }
}

fn answer_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\banswer\b[^0-9\n]{0,24}?(\d+)").expect("static pattern is valid")
    })
}

fn confidence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)\bconfidence\b[^0-9.+\-\n]{0,24}?([-+]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][-+]?\d+)?)\s*(%)?",
        )
        .expect("static pattern is valid")
    })
}

/// Clamp a probability into `[PROBABILITY_FLOOR, 1]`; NaN maps to the floor.
pub fn clip_probability(p: f64) -> f64 {
    if p.is_nan() {
        return PROBABILITY_FLOOR;
    }
    p.clamp(PROBABILITY_FLOOR, 1.0)
}

/// Parse a downstream reply. Never fails: malformed text is a value.
pub fn parse_reply(text: &str) -> ParsedReply {
    let Some(confidence) = last_confidence(text) else {
        return ParsedReply::unparseable();
    };
    let Some(answer) = last_answer(text) else {
        return ParsedReply::unparseable();
    };

    ParsedReply {
        answer: Answer::Choice(answer),
        confidence: clip_probability(confidence),
    }
}

fn last_answer(text: &str) -> Option<u32> {
    answer_pattern()
        .captures_iter(text)
        .filter_map(|c| c.get(1)?.as_str().parse::<u32>().ok())
        .last()
}

fn last_confidence(text: &str) -> Option<f64> {
    confidence_pattern()
        .captures_iter(text)
        .filter_map(|c| {
            let value = c.get(1)?.as_str().parse::<f64>().ok()?;
            Some(if c.get(2).is_some() { value / 100.0 } else { value })
        })
        .last()
}
