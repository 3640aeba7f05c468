//! Evaluation loop over a held-out split.
//!
//! Per sample:
//! 1. sample one policy completion from the first prompt turn
//! 2. query the downstream model with the completion as hint (calibrated)
//!    and without it (baseline)
//! 3. with entropy enabled, repeat both queries `mc_samples` times and
//!    take the normalized entropy of each variant's answer counts
//!
//! The split is then aggregated into [`EvalResults`]. Samples are processed
//! strictly in order, one network call at a time.

use crate::models::{EvalResults, EvalSampleRecord, HintcalError, Message, QuestionRecord, Result};
use crate::policy::PolicyGenerator;
use crate::query::{DownstreamModel, build_query};
use crate::scoring::{Answer, AnswerFrequency, ParsedReply, calibration_metrics, parse_reply};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Knobs for one evaluation run.
#[derive(Debug, Clone)]
pub struct EvalSettings {
    /// Selects the downstream prompt template
    pub dataset_name: String,
    /// Run Monte Carlo answer sampling for entropy
    pub entropy: bool,
    pub mc_samples: usize,
    pub ece_bins: usize,
    pub show_progress: bool,
}

/// Aggregate results plus the per-sample trace they were computed from.
#[derive(Debug, Clone)]
pub struct EvalOutcome {
    pub results: EvalResults,
    pub samples: Vec<EvalSampleRecord>,
}

/// Replies of one prompt variant across the split.
#[derive(Default)]
struct VariantTrace {
    answers: Vec<Answer>,
    confidences: Vec<f64>,
    entropies: Vec<Option<f64>>,
}

impl VariantTrace {
    fn push(&mut self, reply: ParsedReply) {
        self.answers.push(reply.answer);
        self.confidences.push(reply.confidence);
    }
}

/// Drives the evaluation loop for one policy against one downstream model.
pub struct Evaluator<'a, D: ?Sized, P: ?Sized> {
    downstream: &'a D,
    policy: &'a P,
    settings: EvalSettings,
}

impl<'a, D, P> Evaluator<'a, D, P>
where
    D: DownstreamModel + ?Sized,
    P: PolicyGenerator + ?Sized,
{
    pub fn new(downstream: &'a D, policy: &'a P, settings: EvalSettings) -> Self {
        Self {
            downstream,
            policy,
            settings,
        }
    }

    /// Evaluate `records`. `checkpoint` is recorded verbatim in the results.
    pub async fn run(
        &self,
        records: &[QuestionRecord],
        checkpoint: Option<String>,
    ) -> Result<EvalOutcome> {
        let start = Instant::now();
        info!(
            samples = records.len(),
            entropy = self.settings.entropy,
            mc_samples = self.settings.mc_samples,
            "Starting evaluation"
        );

        let pb = self.progress_bar(records.len());
        let mut calibrated = VariantTrace::default();
        let mut baseline = VariantTrace::default();
        let mut samples = Vec::with_capacity(records.len());

        for (index, record) in records.iter().enumerate() {
            let first_turn = record.prompt.first().ok_or_else(|| {
                HintcalError::InvalidInput(format!("sample {index} has an empty prompt"))
            })?;
            let completion = self
                .policy
                .generate(std::slice::from_ref(first_turn))
                .await?;

            let calibrated_query = self.query(record, Some(&completion));
            let baseline_query = self.query(record, None);

            let cal = self.ask(&calibrated_query).await?;
            let base = self.ask(&baseline_query).await?;

            let (cal_entropy, base_entropy) = if self.settings.entropy {
                let (c, b) = self
                    .sample_entropy(record, &calibrated_query, &baseline_query)
                    .await?;
                calibrated.entropies.push(c);
                baseline.entropies.push(b);
                (c, b)
            } else {
                (None, None)
            };

            debug!(
                index,
                gt_answer = record.gt_answer,
                calibrated = cal.answer.as_i64(),
                baseline = base.answer.as_i64(),
                "Evaluated sample"
            );

            samples.push(EvalSampleRecord {
                index,
                gt_answer: record.gt_answer,
                completion,
                calibrated_answer: cal.answer.as_i64(),
                calibrated_confidence: cal.confidence,
                baseline_answer: base.answer.as_i64(),
                baseline_confidence: base.confidence,
                calibrated_entropy: cal_entropy,
                baseline_entropy: base_entropy,
            });
            calibrated.push(cal);
            baseline.push(base);

            pb.inc(1);
        }
        pb.finish_with_message("done");

        let gt: Vec<u32> = records.iter().map(|r| r.gt_answer).collect();
        let bins = self.settings.ece_bins;
        let cal_metrics = calibration_metrics(
            &gt,
            &calibrated.answers,
            &calibrated.confidences,
            &calibrated.entropies,
            bins,
        );
        let base_metrics = calibration_metrics(
            &gt,
            &baseline.answers,
            &baseline.confidences,
            &baseline.entropies,
            bins,
        );
        let results = EvalResults::new(cal_metrics, base_metrics, checkpoint);

        info!(
            calibrated_accuracy = results.calibrated_accuracy,
            calibrated_ece = results.calibrated_ece,
            baseline_accuracy = results.baseline_accuracy,
            baseline_ece = results.baseline_ece,
            elapsed_secs = start.elapsed().as_secs_f64(),
            "Evaluation complete"
        );

        Ok(EvalOutcome { results, samples })
    }

    fn query(&self, record: &QuestionRecord, hint: Option<&str>) -> Message {
        build_query(
            &self.settings.dataset_name,
            &record.question,
            &record.options,
            hint,
        )
    }

    async fn ask(&self, query: &Message) -> Result<ParsedReply> {
        let reply = self.downstream.send(query.clone()).await?;
        Ok(parse_reply(&reply))
    }

    /// Monte Carlo rounds, calibrated then baseline in each round.
    async fn sample_entropy(
        &self,
        record: &QuestionRecord,
        calibrated_query: &Message,
        baseline_query: &Message,
    ) -> Result<(Option<f64>, Option<f64>)> {
        let k = record.num_options();
        let mut cal_freq = AnswerFrequency::new(k);
        let mut base_freq = AnswerFrequency::new(k);

        for _ in 0..self.settings.mc_samples {
            cal_freq.record(self.ask(calibrated_query).await?.answer);
            base_freq.record(self.ask(baseline_query).await?.answer);
        }

        for (variant, freq) in [("calibrated", &cal_freq), ("baseline", &base_freq)] {
            if freq.valid() == 0 {
                warn!(
                    variant,
                    rounds = self.settings.mc_samples,
                    "No valid Monte Carlo answers, entropy undefined"
                );
            }
        }
        debug!(
            calibrated_counts = ?cal_freq.counts(),
            baseline_counts = ?base_freq.counts(),
            "Monte Carlo answer counts"
        );

        Ok((cal_freq.entropy(), base_freq.entropy()))
    }

    fn progress_bar(&self, total: usize) -> ProgressBar {
        if !self.settings.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
        );
        pb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers correctly and confidently with a hint, guesses without one.
    struct HintSensitive {
        calls: AtomicUsize,
        unhinted: AtomicUsize,
        log: Mutex<Vec<bool>>,
    }

    impl HintSensitive {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                unhinted: AtomicUsize::new(0),
                log: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl DownstreamModel for HintSensitive {
        async fn send(&self, message: Message) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let hinted = message.content.contains("the answer is two");
            self.log.lock().unwrap().push(hinted);
            if hinted {
                return Ok("Answer: 2\nConfidence: 0.9".to_string());
            }
            let n = self.unhinted.fetch_add(1, Ordering::SeqCst);
            Ok(if n % 2 == 0 {
                "Answer: 1\nConfidence: 0.5".to_string()
            } else {
                "Answer: 3\nConfidence: 0.5".to_string()
            })
        }
    }

    struct FixedPolicy;

    #[async_trait]
    impl PolicyGenerator for FixedPolicy {
        async fn generate(&self, prompt: &[Message]) -> Result<String> {
            assert_eq!(prompt.len(), 1);
            Ok("the answer is two".to_string())
        }
    }

    fn record() -> QuestionRecord {
        QuestionRecord {
            question: "1 + 1 = ?".into(),
            options: vec!["1".into(), "2".into(), "3".into(), "4".into()],
            gt_answer: 2,
            prompt: vec![Message::user("hint please"), Message::assistant("ignored")],
        }
    }

    fn settings(entropy: bool, mc_samples: usize) -> EvalSettings {
        EvalSettings {
            dataset_name: "mmlu".into(),
            entropy,
            mc_samples,
            ece_bins: 10,
            show_progress: false,
        }
    }

    #[tokio::test]
    async fn test_calibrated_and_baseline_metrics() {
        let downstream = HintSensitive::new();
        let evaluator = Evaluator::new(&downstream, &FixedPolicy, settings(false, 40));

        let outcome = evaluator
            .run(&[record(), record()], Some("ckpt".into()))
            .await
            .unwrap();
        let r = &outcome.results;

        assert_eq!(r.calibrated_accuracy, 1.0);
        assert!((r.calibrated_ece - 0.1).abs() < 1e-12);
        assert!((r.calibrated_confidence_avg - 0.9).abs() < 1e-12);
        assert!(r.calibrated_confidence_std.abs() < 1e-12);
        assert_eq!(r.baseline_accuracy, 0.0);
        assert!((r.baseline_ece - 0.5).abs() < 1e-12);
        assert_eq!(r.calibrated_entropy_mean, None);
        assert_eq!(r.baseline_entropy_mean, None);
        assert_eq!(r.checkpoint.as_deref(), Some("ckpt"));

        // calibrated first, then baseline, per sample
        assert_eq!(*downstream.log.lock().unwrap(), vec![true, false, true, false]);
        assert_eq!(outcome.samples.len(), 2);
        assert_eq!(outcome.samples[1].index, 1);
        assert_eq!(outcome.samples[0].completion, "the answer is two");
    }

    #[tokio::test]
    async fn test_monte_carlo_entropy() {
        let downstream = HintSensitive::new();
        let evaluator = Evaluator::new(&downstream, &FixedPolicy, settings(true, 4));

        let outcome = evaluator.run(&[record()], None).await.unwrap();
        let r = &outcome.results;

        // 2 initial calls + 4 rounds of (calibrated, baseline)
        assert_eq!(downstream.calls.load(Ordering::SeqCst), 10);
        // calibrated always answers 2
        assert_eq!(r.calibrated_entropy_mean, Some(0.0));
        // baseline alternates 1 and 3: H = ln 2, normalized by ln 4
        let expected = 2f64.ln() / 4f64.ln();
        assert!((r.baseline_entropy_mean.unwrap() - expected).abs() < 1e-12);
        assert_eq!(outcome.samples[0].calibrated_entropy, Some(0.0));
    }

    #[tokio::test]
    async fn test_unparseable_replies_count_as_wrong() {
        struct Mute;

        #[async_trait]
        impl DownstreamModel for Mute {
            async fn send(&self, _message: Message) -> Result<String> {
                Ok("I would rather not say.".into())
            }
        }

        let evaluator = Evaluator::new(&Mute, &FixedPolicy, settings(true, 3));
        let outcome = evaluator.run(&[record()], None).await.unwrap();
        let r = &outcome.results;

        assert_eq!(r.calibrated_accuracy, 0.0);
        assert_eq!(outcome.samples[0].calibrated_answer, -1);
        assert_eq!(r.calibrated_entropy_mean, None);
        assert!(outcome.samples[0].calibrated_entropy.is_none());
    }

    #[tokio::test]
    async fn test_empty_split() {
        let downstream = HintSensitive::new();
        let evaluator = Evaluator::new(&downstream, &FixedPolicy, settings(false, 1));
        let outcome = evaluator.run(&[], None).await.unwrap();
        assert_eq!(outcome.results.calibrated_accuracy, 0.0);
        assert_eq!(outcome.results.baseline_ece, 0.0);
        assert!(outcome.samples.is_empty());
    }
}
