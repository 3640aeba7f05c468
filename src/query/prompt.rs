//! Downstream prompt templates.
//!
//! A query is one user turn rendered from (dataset, question, options, hint).
//! The rendering is a pure function: the same inputs always give the same
//! text, so calibrated and baseline queries differ only by the hint block.

use crate::models::Message;
use std::fmt::Write;

/// Instruction phrasing for a family of datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTemplate {
    /// General-knowledge multiple choice (MMLU and similar)
    General,
    /// Clinical and biomedical exams
    Medical,
    /// Grade-school and competition science
    Science,
    /// Multi-step arithmetic word problems
    Math,
}

impl PromptTemplate {
    /// Template for a dataset name. Unknown names fall back to [`Self::General`].
    pub fn for_dataset(dataset_name: &str) -> Self {
        let name = dataset_name.to_ascii_lowercase();
        if name.starts_with("medmcqa") || name.starts_with("medqa") || name.starts_with("pubmedqa") {
            Self::Medical
        } else if name.starts_with("arc") || name.starts_with("sciq") || name.starts_with("gpqa") {
            Self::Science
        } else if name.starts_with("gsm") || name.starts_with("math") || name.starts_with("aqua") {
            Self::Math
        } else {
            Self::General
        }
    }

    fn preamble(self) -> &'static str {
        match self {
            Self::General => "Answer the following multiple-choice question.",
            Self::Medical => {
                "You are taking a medical licensing exam. Answer the following multiple-choice question."
            }
            Self::Science => "Answer the following multiple-choice science question.",
            Self::Math => {
                "Solve the following math problem and select the matching option. Work through the steps before answering."
            }
        }
    }
}

const HINT_HEADER: &str = "Here is a hint that may help you answer the question:";

const RESPONSE_FORMAT: &str = "Respond with the number of the option you choose and your \
confidence that it is correct, as a probability between 0 and 1, in exactly this format:
Answer: <option number>
Confidence: <probability>";

/// Render the downstream prompt text.
///
/// Options are numbered from 1. With `hint` the hint block precedes the
/// question (calibrated variant); without it the prompt is the baseline.
pub fn render_prompt(
    dataset_name: &str,
    question: &str,
    options: &[String],
    hint: Option<&str>,
) -> String {
    let template = PromptTemplate::for_dataset(dataset_name);
    let mut prompt = String::new();

    prompt.push_str(template.preamble());
    prompt.push_str("\n\n");

    if let Some(hint) = hint {
        let _ = write!(prompt, "{HINT_HEADER}\n{}\n\n", hint.trim());
    }

    let _ = write!(prompt, "Question: {}\n\nOptions:\n", question.trim());
    for (i, option) in options.iter().enumerate() {
        let _ = writeln!(prompt, "{}. {}", i + 1, option.trim());
    }

    prompt.push('\n');
    prompt.push_str(RESPONSE_FORMAT);
    prompt
}

/// Build the single user turn sent to the downstream model.
pub fn build_query(
    dataset_name: &str,
    question: &str,
    options: &[String],
    hint: Option<&str>,
) -> Message {
    Message::user(render_prompt(dataset_name, question, options, hint))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> Vec<String> {
        vec!["Paris".into(), "Rome".into(), "Berlin".into()]
    }

    #[test]
    fn test_baseline_has_no_hint_block() {
        let msg = build_query("mmlu", "Capital of France?", &options(), None);
        assert_eq!(msg.role, "user");
        assert!(!msg.content.contains(HINT_HEADER));
        assert!(msg.content.contains("1. Paris\n2. Rome\n3. Berlin\n"));
        assert!(msg.content.ends_with("Confidence: <probability>"));
    }

    #[test]
    fn test_hint_precedes_question() {
        let msg = build_query("mmlu", "Capital of France?", &options(), Some("  Think of the Eiffel Tower. "));
        let hint_at = msg.content.find("Think of the Eiffel Tower.").unwrap();
        let question_at = msg.content.find("Question: Capital of France?").unwrap();
        assert!(hint_at < question_at);
    }

    #[test]
    fn test_variants_differ_only_by_hint() {
        let baseline = render_prompt("arc_challenge", "Q?", &options(), None);
        let calibrated = render_prompt("arc_challenge", "Q?", &options(), Some("h"));
        let block = format!("{HINT_HEADER}\nh\n\n");
        assert_eq!(calibrated.replacen(&block, "", 1), baseline);
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let a = render_prompt("medmcqa", "Q?", &options(), Some("h"));
        let b = render_prompt("medmcqa", "Q?", &options(), Some("h"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_template_selection() {
        assert_eq!(PromptTemplate::for_dataset("MedMCQA"), PromptTemplate::Medical);
        assert_eq!(PromptTemplate::for_dataset("arc_easy"), PromptTemplate::Science);
        assert_eq!(PromptTemplate::for_dataset("gsm8k_mc"), PromptTemplate::Math);
        assert_eq!(PromptTemplate::for_dataset("something-new"), PromptTemplate::General);
        assert_ne!(
            render_prompt("medqa", "Q?", &options(), None),
            render_prompt("mmlu", "Q?", &options(), None)
        );
    }
}
