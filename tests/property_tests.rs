//! Property-based tests for the scoring core.
//!
//! - Parser: well-formed replies round-trip, confidence always in range
//! - Scoring rule: never positive, monotone, proper
//! - Metrics: accuracy, ECE and entropy stay in [0, 1] and hit their extremes

use hintcal::scoring::{
    Answer, INVALID_RESPONSE_FORMAT_PENALTY, PROBABILITY_FLOOR, accuracy,
    expected_calibration_error, normalized_entropy, parse_reply, reward,
};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

fn arb_answer() -> impl Strategy<Value = Answer> {
    prop_oneof![
        4 => (1u32..=10).prop_map(Answer::Choice),
        1 => Just(Answer::Unparseable),
    ]
}

/// Ground truth, predictions and confidences of equal length.
fn arb_split(max_len: usize) -> impl Strategy<Value = (Vec<u32>, Vec<Answer>, Vec<f64>)> {
    (1..=max_len).prop_flat_map(|n| {
        (
            proptest::collection::vec(1u32..=4, n),
            proptest::collection::vec(arb_answer(), n),
            proptest::collection::vec(0.0f64..=1.0, n),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // ========================================================================
    // Parser
    // ========================================================================

    /// Property: a well-formed reply parses back to what was written
    #[test]
    fn prop_wellformed_reply_roundtrips(answer in 1u32..=26, p in 0.001f64..=1.0) {
        let parsed = parse_reply(&format!("Answer: {answer}\nConfidence: {p}"));
        prop_assert_eq!(parsed.answer, Answer::Choice(answer));
        prop_assert_eq!(parsed.confidence, p);
    }

    /// Property: parsing never fails and confidence is always clipped
    #[test]
    fn prop_confidence_always_in_range(text in ".{0,200}") {
        let parsed = parse_reply(&text);
        prop_assert!(parsed.confidence >= PROBABILITY_FLOOR);
        prop_assert!(parsed.confidence <= 1.0);
        if parsed.answer == Answer::Unparseable {
            prop_assert_eq!(parsed.confidence, INVALID_RESPONSE_FORMAT_PENALTY);
        }
    }

    // ========================================================================
    // Scoring rule
    // ========================================================================

    /// Property: rewards are finite and never positive
    #[test]
    fn prop_reward_is_finite_and_non_positive(
        answer in arb_answer(),
        p in -1.0f64..=2.0,
        gt in 1u32..=10,
    ) {
        let r = reward(answer, p, gt);
        prop_assert!(r.is_finite());
        prop_assert!(r <= 0.0);
    }

    /// Property: more confidence helps when right and hurts when wrong
    #[test]
    fn prop_reward_monotone_in_confidence(a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(reward(Answer::Choice(1), hi, 1) >= reward(Answer::Choice(1), lo, 1));
        prop_assert!(reward(Answer::Choice(2), hi, 1) <= reward(Answer::Choice(2), lo, 1));
    }

    /// Property: expected reward is maximized by reporting the true
    /// probability of being correct
    #[test]
    fn prop_log_score_is_proper(q in 0.01f64..=0.99, p in 0.01f64..=0.99) {
        let expected = |report: f64| {
            q * reward(Answer::Choice(1), report, 1) + (1.0 - q) * reward(Answer::Choice(1), report, 2)
        };
        prop_assert!(expected(q) >= expected(p) - 1e-12);
    }

    /// Property: the format penalty ignores confidence and ground truth
    #[test]
    fn prop_unparseable_reward_is_constant(p in 0.0f64..=1.0, gt in 1u32..=10) {
        prop_assert_eq!(reward(Answer::Unparseable, p, gt), INVALID_RESPONSE_FORMAT_PENALTY.ln());
    }

    // ========================================================================
    // Metrics
    // ========================================================================

    /// Property: accuracy is 1 for perfect predictions and 0 for all-wrong
    #[test]
    fn prop_accuracy_extremes(gt in proptest::collection::vec(1u32..=4, 1..50)) {
        let perfect: Vec<Answer> = gt.iter().map(|&g| Answer::Choice(g)).collect();
        let wrong: Vec<Answer> = gt.iter().map(|&g| Answer::Choice(g + 1)).collect();
        prop_assert_eq!(accuracy(&gt, &perfect), 1.0);
        prop_assert_eq!(accuracy(&gt, &wrong), 0.0);
    }

    /// Property: ECE lies in [0, 1]
    #[test]
    fn prop_ece_in_unit_interval((gt, pred, conf) in arb_split(60), bins in 1usize..=20) {
        let ece = expected_calibration_error(&gt, &pred, &conf, bins);
        prop_assert!((0.0..=1.0 + 1e-12).contains(&ece));
    }

    /// Property: certain and always right means perfectly calibrated
    #[test]
    fn prop_ece_zero_when_certain_and_right(gt in proptest::collection::vec(1u32..=4, 1..50)) {
        let pred: Vec<Answer> = gt.iter().map(|&g| Answer::Choice(g)).collect();
        let conf = vec![1.0; gt.len()];
        prop_assert!(expected_calibration_error(&gt, &pred, &conf, 10) < 1e-12);
    }

    /// Property: normalized entropy lies in [0, 1] with 0 for unanimous
    /// answers and 1 for uniform answers
    #[test]
    fn prop_entropy_bounds(
        counts in proptest::collection::vec(0u32..40, 2..8),
        k in 2usize..8,
        n in 1u32..40,
        winner in 0usize..8,
    ) {
        if let Some(h) = normalized_entropy(&counts) {
            prop_assert!((0.0..=1.0).contains(&h));
        } else {
            prop_assert!(counts.iter().all(|&c| c == 0));
        }

        let mut unanimous = vec![0u32; k];
        unanimous[winner % k] = n;
        prop_assert_eq!(normalized_entropy(&unanimous), Some(0.0));

        let uniform = vec![n; k];
        prop_assert!((normalized_entropy(&uniform).unwrap() - 1.0).abs() < 1e-9);
    }
}
