//! Record types for hintcal.
//!
//! These types carry data through the reward/evaluation loop:
//! dataset record → policy completion → downstream reply → score/metric.

use super::{HintcalError, Result};
use serde::{Deserialize, Serialize};

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// A multiple-choice question from the dataset.
///
/// `gt_answer` is 1-based: option `1` is `options[0]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub question: String,
    pub options: Vec<String>,
    pub gt_answer: u32,
    /// Conversation turns shown to the policy model
    pub prompt: Vec<Message>,
}

impl QuestionRecord {
    pub fn num_options(&self) -> usize {
        self.options.len()
    }

    /// Reject records the loop cannot score meaningfully.
    pub fn validate(&self) -> Result<()> {
        if self.options.is_empty() {
            return Err(HintcalError::InvalidInput(format!(
                "question has no options: {:?}",
                truncate(&self.question, 80)
            )));
        }
        if self.gt_answer == 0 || self.gt_answer as usize > self.options.len() {
            return Err(HintcalError::InvalidInput(format!(
                "gt_answer {} outside [1, {}]",
                self.gt_answer,
                self.options.len()
            )));
        }
        if self.prompt.is_empty() {
            return Err(HintcalError::InvalidInput(
                "record has an empty prompt".to_string(),
            ));
        }
        Ok(())
    }
}

/// A policy completion as handed over by a trainer.
///
/// Trainers emit either plain text or conversation turns; the hint is the
/// text itself or the first turn's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Completion {
    Text(String),
    Conversation(Vec<Message>),
}

impl Completion {
    /// Text injected into the downstream prompt as the hint.
    pub fn hint_text(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Conversation(turns) => turns.first().map(|t| t.content.as_str()).unwrap_or(""),
        }
    }
}

impl From<String> for Completion {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// One element of a reward batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardInput {
    pub completion: Completion,
    pub question: String,
    pub gt_answer: u32,
    pub options: Vec<String>,
}

impl RewardInput {
    /// Zip a trainer's column-wise batch into typed rows.
    ///
    /// Every sample column is required; a missing column or a length that
    /// differs from `completions` fails the whole batch.
    pub fn from_columns(
        completions: Vec<Completion>,
        questions: Option<Vec<String>>,
        gt_answers: Option<Vec<u32>>,
        options: Option<Vec<Vec<String>>>,
    ) -> Result<Vec<Self>> {
        let questions = questions.ok_or(HintcalError::MissingField("question"))?;
        let gt_answers = gt_answers.ok_or(HintcalError::MissingField("gt_answer"))?;
        let options = options.ok_or(HintcalError::MissingField("options"))?;

        let n = completions.len();
        for (name, len) in [
            ("question", questions.len()),
            ("gt_answer", gt_answers.len()),
            ("options", options.len()),
        ] {
            if len != n {
                return Err(HintcalError::InvalidInput(format!(
                    "column '{name}' has {len} entries, expected {n}"
                )));
            }
        }

        Ok(completions
            .into_iter()
            .zip(questions)
            .zip(gt_answers)
            .zip(options)
            .map(|(((completion, question), gt_answer), options)| Self {
                completion,
                question,
                gt_answer,
                options,
            })
            .collect())
    }
}

/// Calibration metrics for one prompt variant over a split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationMetrics {
    pub accuracy: f64,
    pub ece: f64,
    pub confidence_avg: f64,
    pub confidence_std: f64,
    /// `None` when entropy was not sampled or every sample was degenerate
    pub entropy_mean: Option<f64>,
}

/// The persisted evaluation record (`eval_results.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalResults {
    pub calibrated_accuracy: f64,
    pub calibrated_ece: f64,
    pub calibrated_confidence_avg: f64,
    pub calibrated_confidence_std: f64,
    pub calibrated_entropy_mean: Option<f64>,
    pub baseline_accuracy: f64,
    pub baseline_ece: f64,
    pub baseline_confidence_avg: f64,
    pub baseline_confidence_std: f64,
    pub baseline_entropy_mean: Option<f64>,
    pub checkpoint: Option<String>,
}

impl EvalResults {
    pub fn new(
        calibrated: CalibrationMetrics,
        baseline: CalibrationMetrics,
        checkpoint: Option<String>,
    ) -> Self {
        Self {
            calibrated_accuracy: calibrated.accuracy,
            calibrated_ece: calibrated.ece,
            calibrated_confidence_avg: calibrated.confidence_avg,
            calibrated_confidence_std: calibrated.confidence_std,
            calibrated_entropy_mean: calibrated.entropy_mean,
            baseline_accuracy: baseline.accuracy,
            baseline_ece: baseline.ece,
            baseline_confidence_avg: baseline.confidence_avg,
            baseline_confidence_std: baseline.confidence_std,
            baseline_entropy_mean: baseline.entropy_mean,
            checkpoint,
        }
    }
}

/// Per-sample evaluation trace (`eval_samples.jsonl`).
///
/// Answers use `-1` for an unparseable reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalSampleRecord {
    pub index: usize,
    pub gt_answer: u32,
    pub completion: String,
    pub calibrated_answer: i64,
    pub calibrated_confidence: f64,
    pub baseline_answer: i64,
    pub baseline_confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibrated_entropy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_entropy: Option<f64>,
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
