//! Property-based tests for scoring and normalization
//!
//! - Test mathematical invariants of thresholding and MCC
//! - Test normalization shape and moments on arbitrary signals
//! - Run with ProptestConfig::with_cases(...) so the suite stays fast

use discharge_net::record::{ExampleRecord, SIGNAL_LEN};
use discharge_net::scoring::{threshold_predictions, ConfusionMatrix, ScoreReport};
use discharge_net::transform::{NormalizedSample, NORM_CONSTANT, SAMPLE_LEN};
use proptest::prelude::*;
use quickcheck::{QuickCheck, TestResult};

// ============================================================================
// Property Test Generators (Strategies)
// ============================================================================

/// Matching label/prediction vectors of equal length
fn arb_outcomes() -> impl Strategy<Value = (Vec<u8>, Vec<u8>)> {
    (1usize..200).prop_flat_map(|n| {
        (
            proptest::collection::vec(0u8..=1, n),
            proptest::collection::vec(0u8..=1, n),
        )
    })
}

/// Probabilities in [0, 1]
fn arb_probs() -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(0.0f32..=1.0, 0..200)
}

fn flip(values: &[u8]) -> Vec<u8> {
    values.iter().map(|v| 1 - v).collect()
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Raising the threshold never turns a 0 into a 1
    #[test]
    fn prop_threshold_monotonic(probs in arb_probs(), t1 in 0.0f32..=1.0, t2 in 0.0f32..=1.0) {
        let (lo, hi) = if t1 <= t2 { (t1, t2) } else { (t2, t1) };
        let at_lo = threshold_predictions(&probs, lo);
        let at_hi = threshold_predictions(&probs, hi);
        for (a, b) in at_lo.iter().zip(&at_hi) {
            prop_assert!(b <= a);
        }
    }

    /// Outputs are binary and strictly above the threshold
    #[test]
    fn prop_threshold_strict(probs in arb_probs(), t in 0.0f32..=1.0) {
        for (p, s) in probs.iter().zip(threshold_predictions(&probs, t)) {
            prop_assert_eq!(s, u8::from(*p > t));
        }
    }

    /// Counts always partition the input
    #[test]
    fn prop_confusion_counts_sum_to_total((labels, predicted) in arb_outcomes()) {
        let cm = ConfusionMatrix::from_predictions(&labels, &predicted).unwrap();
        prop_assert_eq!(
            cm.true_positives() + cm.true_negatives() + cm.false_positives() + cm.false_negatives(),
            labels.len()
        );
        prop_assert!((0.0..=1.0).contains(&cm.accuracy()));
    }

    /// MCC lies in [-1, 1]
    #[test]
    fn prop_mcc_bounded((labels, predicted) in arb_outcomes()) {
        let mcc = ScoreReport::new(&labels, &predicted).unwrap().mcc;
        prop_assert!((-1.0 - 1e-9..=1.0 + 1e-9).contains(&mcc), "mcc = {}", mcc);
    }

    /// Swapping class names on both sides leaves MCC unchanged
    #[test]
    fn prop_mcc_label_swap_symmetry((labels, predicted) in arb_outcomes()) {
        let original = ScoreReport::new(&labels, &predicted).unwrap().mcc;
        let swapped = ScoreReport::new(&flip(&labels), &flip(&predicted)).unwrap().mcc;
        prop_assert!((original - swapped).abs() < 1e-9);
    }

    /// Perfect predictions give MCC 1 whenever both classes are present
    #[test]
    fn prop_perfect_predictions((labels, _) in arb_outcomes()) {
        let report = ScoreReport::new(&labels, &labels).unwrap();
        let both = labels.contains(&0) && labels.contains(&1);
        prop_assert!((report.accuracy - 1.0).abs() < 1e-12);
        if both {
            prop_assert!((report.mcc - 1.0).abs() < 1e-9);
        } else {
            prop_assert!(report.mcc.abs() < f64::EPSILON);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    /// Every normalized sample is 240×200 with zero mean and unit variance
    /// (up to the final scale factor)
    #[test]
    fn prop_normalized_moments(seed in 0u64..1_000, scale in 10.0f32..100.0, offset in -5.0f32..5.0) {
        #[allow(clippy::cast_precision_loss)]
        let signal: Vec<f32> = (0..SIGNAL_LEN as u64)
            .map(|i| {
                let h = (i.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(seed)) >> 40;
                (h % 1000) as f32 / 1000.0 * scale + offset
            })
            .collect();
        let record = ExampleRecord::new(signal, 1, 0, Some(0)).unwrap();
        let sample = NormalizedSample::from_record(&record);

        prop_assert_eq!(sample.signal_data.len(), SAMPLE_LEN);
        prop_assert_eq!(sample.bw_data.len(), SAMPLE_LEN);
        prop_assert!(sample.bw_data.iter().all(|&v| v == 0.0 || v == 1.0));

        let n = SAMPLE_LEN as f64;
        let rescaled: Vec<f64> = sample
            .signal_data
            .iter()
            .map(|&v| f64::from(v) * f64::from(NORM_CONSTANT))
            .collect();
        let mean = rescaled.iter().sum::<f64>() / n;
        let var = rescaled.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        prop_assert!(mean.abs() < 1e-3, "mean = {}", mean);
        prop_assert!((var - 1.0).abs() < 1e-2, "var = {}", var);
    }
}

// ============================================================================
// QuickCheck
// ============================================================================

#[test]
fn quickcheck_mcc_argument_symmetry() {
    /// MCC is symmetric in labels and predictions.
    fn prop(pairs: Vec<(bool, bool)>) -> TestResult {
        if pairs.is_empty() {
            return TestResult::discard();
        }
        let labels: Vec<u8> = pairs.iter().map(|&(l, _)| u8::from(l)).collect();
        let predicted: Vec<u8> = pairs.iter().map(|&(_, p)| u8::from(p)).collect();
        let forward = ScoreReport::new(&labels, &predicted).map(|r| r.mcc);
        let backward = ScoreReport::new(&predicted, &labels).map(|r| r.mcc);
        match (forward, backward) {
            (Ok(a), Ok(b)) => TestResult::from_bool((a - b).abs() < 1e-9),
            _ => TestResult::failed(),
        }
    }
    QuickCheck::new()
        .tests(200)
        .quickcheck(prop as fn(Vec<(bool, bool)>) -> TestResult);
}

// ============================================================================
// Worked examples
// ============================================================================

#[test]
fn test_worked_example_mixed() {
    let labels = [1, 0, 1, 0, 1, 0];
    let probs = [0.9_f32, 0.2, 0.4, 0.6, 0.8, 0.1];
    let predicted = threshold_predictions(&probs, 0.5);
    assert_eq!(predicted, vec![1, 0, 0, 1, 1, 0]);

    let report = ScoreReport::new(&labels, &predicted).unwrap();
    assert_eq!(report.confusion.true_positives(), 2);
    assert_eq!(report.confusion.true_negatives(), 2);
    assert_eq!(report.confusion.false_positives(), 1);
    assert_eq!(report.confusion.false_negatives(), 1);
    assert!((report.accuracy - 4.0 / 6.0).abs() < 1e-12);
    assert!((report.mcc - 1.0 / 3.0).abs() < 1e-12);
}

#[test]
fn test_worked_example_balanced_errors() {
    let report = ScoreReport::new(&[1, 1, 0, 0], &[1, 0, 0, 1]).unwrap();
    assert_eq!(report.confusion.true_positives(), 1);
    assert_eq!(report.confusion.false_negatives(), 1);
    assert_eq!(report.confusion.false_positives(), 1);
    assert_eq!(report.confusion.true_negatives(), 1);
    assert!((report.accuracy - 0.5).abs() < 1e-12);
    assert!(report.mcc.abs() < 1e-12);
}

#[test]
fn test_worked_example_all_positive_is_degenerate() {
    let report = ScoreReport::new(&[1, 1, 1, 1], &[1, 1, 1, 1]).unwrap();
    assert_eq!(report.confusion.true_positives(), 4);
    assert!((report.accuracy - 1.0).abs() < 1e-12);
    assert!(report.mcc.abs() < f64::EPSILON);
    assert!(report.confusion.mcc().is_err());
}

#[test]
fn test_worked_example_all_negative_is_degenerate() {
    let labels = [0, 0, 0, 0];
    let predicted = threshold_predictions(&[0.1, 0.2, 0.3, 0.4], 0.5);
    let report = ScoreReport::new(&labels, &predicted).unwrap();
    assert_eq!(report.confusion.true_negatives(), 4);
    assert!((report.accuracy - 1.0).abs() < 1e-12);
    assert!(report.mcc.abs() < f64::EPSILON);
    assert!(report.confusion.mcc().is_err());
}
