//! Split-level calibration metrics.
//!
//! - accuracy: exact-match fraction, unparseable replies count as wrong
//! - ECE: equal-width confidence bins, `Σ (n_b / N) · |conf_b − acc_b|`
//! - answer entropy: normalized Shannon entropy of Monte Carlo answers

use super::parser::Answer;
use crate::models::CalibrationMetrics;

/// Fraction of predictions equal to their ground truth.
///
/// An empty split has accuracy 0.
pub fn accuracy(gt_answers: &[u32], predicted: &[Answer]) -> f64 {
    assert_eq!(
        gt_answers.len(),
        predicted.len(),
        "accuracy needs one prediction per ground-truth answer"
    );
    if gt_answers.is_empty() {
        return 0.0;
    }

    let correct = gt_answers
        .iter()
        .zip(predicted)
        .filter(|(gt, pred)| pred.is_correct(**gt))
        .count();
    correct as f64 / gt_answers.len() as f64
}

/// Expected calibration error over `n_bins` equal-width bins on `[0, 1]`.
///
/// Bin `b` holds confidences in `[b/n, (b+1)/n)`; the last bin also holds 1.
/// An empty split has ECE 0.
pub fn expected_calibration_error(
    gt_answers: &[u32],
    predicted: &[Answer],
    confidences: &[f64],
    n_bins: usize,
) -> f64 {
    assert_eq!(gt_answers.len(), predicted.len());
    assert_eq!(gt_answers.len(), confidences.len());
    assert!(n_bins > 0, "ECE needs at least one bin");

    let total = gt_answers.len();
    if total == 0 {
        return 0.0;
    }

    // (count, confidence sum, correct count)
    let mut bins = vec![(0usize, 0.0f64, 0usize); n_bins];
    for ((gt, pred), &conf) in gt_answers.iter().zip(predicted).zip(confidences) {
        let bin = &mut bins[bin_index(conf, n_bins)];
        bin.0 += 1;
        bin.1 += conf;
        if pred.is_correct(*gt) {
            bin.2 += 1;
        }
    }

    bins.iter()
        .filter(|(count, _, _)| *count > 0)
        .map(|&(count, conf_sum, correct)| {
            let n = count as f64;
            let mean_confidence = conf_sum / n;
            let empirical_accuracy = correct as f64 / n;
            (n / total as f64) * (mean_confidence - empirical_accuracy).abs()
        })
        .sum()
}

fn bin_index(confidence: f64, n_bins: usize) -> usize {
    let scaled = (confidence.clamp(0.0, 1.0) * n_bins as f64).floor();
    (scaled as usize).min(n_bins - 1)
}

/// Per-option counts of Monte Carlo answers.
///
/// Only choices in `[1, num_options]` are counted; everything else is
/// dropped and does not enter the denominator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerFrequency {
    counts: Vec<u32>,
    rejected: u32,
}

impl AnswerFrequency {
    pub fn new(num_options: usize) -> Self {
        Self {
            counts: vec![0; num_options],
            rejected: 0,
        }
    }

    /// Count `answer` if it names a valid option. Returns whether it counted.
    pub fn record(&mut self, answer: Answer) -> bool {
        match answer.option_index(self.counts.len()) {
            Some(idx) => {
                self.counts[idx] += 1;
                true
            }
            None => {
                self.rejected += 1;
                false
            }
        }
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn valid(&self) -> u32 {
        self.counts.iter().sum()
    }

    pub fn rejected(&self) -> u32 {
        self.rejected
    }

    /// See [`normalized_entropy`].
    pub fn entropy(&self) -> Option<f64> {
        normalized_entropy(&self.counts)
    }
}

/// Shannon entropy of the empirical answer distribution divided by
/// `ln(k)`: 0 when every answer agrees, 1 when answers are uniform over the
/// `k` options.
///
/// Undefined (`None`) when no answer was counted, or with fewer than two
/// options.
pub fn normalized_entropy(counts: &[u32]) -> Option<f64> {
    let k = counts.len();
    let total: u32 = counts.iter().sum();
    if total == 0 || k < 2 {
        return None;
    }

    let total = total as f64;
    let h: f64 = counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.ln()
        })
        .sum();
    Some((h / (k as f64).ln()).clamp(0.0, 1.0))
}

/// Arithmetic mean; 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation; 0 for an empty slice.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Mean over the defined values only; `None` if none is defined.
pub fn mean_defined(values: &[Option<f64>]) -> Option<f64> {
    let defined: Vec<f64> = values
        .iter()
        .filter_map(|v| v.filter(|x| x.is_finite()))
        .collect();
    if defined.is_empty() {
        None
    } else {
        Some(mean(&defined))
    }
}

/// Aggregate one prompt variant's replies over a split.
pub fn calibration_metrics(
    gt_answers: &[u32],
    predicted: &[Answer],
    confidences: &[f64],
    entropies: &[Option<f64>],
    n_bins: usize,
) -> CalibrationMetrics {
    CalibrationMetrics {
        accuracy: accuracy(gt_answers, predicted),
        ece: expected_calibration_error(gt_answers, predicted, confidences, n_bins),
        confidence_avg: mean(confidences),
        confidence_std: std_dev(confidences),
        entropy_mean: mean_defined(entropies),
    }
}
