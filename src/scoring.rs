//! Binary scoring: thresholding, confusion matrix, accuracy, MCC, ROC AUC
//!
//! ## Degenerate MCC
//!
//! The Matthews correlation coefficient is undefined when any row or column
//! of the confusion matrix sums to zero (e.g. every prediction is positive).
//! [`ConfusionMatrix::mcc`] reports that case as [`Error::DegenerateMetric`];
//! [`ConfusionMatrix::mcc_or_zero`] and everything built on it (the console
//! report, the metric history, the plot) map it to `0.0`. One policy for both
//! printed and recorded values.

use crate::{Error, Result};
use std::fmt;

/// Default decision threshold
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Turn probabilities into binary decisions: `1` iff `p > threshold`.
#[must_use]
pub fn threshold_predictions(probs: &[f32], threshold: f32) -> Vec<u8> {
    probs.iter().map(|&p| u8::from(p > threshold)).collect()
}

/// 2×2 confusion matrix, rows = actual, columns = predicted, label order {0,1}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfusionMatrix {
    matrix: [[usize; 2]; 2],
}

impl ConfusionMatrix {
    /// Count outcomes from ground truth and predictions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the slices differ in length or
    /// contain values other than 0 and 1.
    pub fn from_predictions(labels: &[u8], predicted: &[u8]) -> Result<Self> {
        if labels.len() != predicted.len() {
            return Err(Error::InvalidInput(format!(
                "{} labels vs {} predictions",
                labels.len(),
                predicted.len()
            )));
        }
        let mut cm = Self::default();
        for (&actual, &pred) in labels.iter().zip(predicted) {
            if actual > 1 || pred > 1 {
                return Err(Error::InvalidInput(format!(
                    "binary values expected, got label {actual} / prediction {pred}"
                )));
            }
            cm.matrix[usize::from(actual)][usize::from(pred)] += 1;
        }
        Ok(cm)
    }

    /// Build directly from counts.
    #[must_use]
    pub const fn from_counts(tp: usize, tn: usize, fp: usize, fn_: usize) -> Self {
        Self {
            matrix: [[tn, fp], [fn_, tp]],
        }
    }

    /// Count of samples with actual label `actual` predicted as `predicted`.
    ///
    /// # Panics
    ///
    /// Panics if either argument is not 0 or 1.
    #[must_use]
    pub const fn get(&self, actual: usize, predicted: usize) -> usize {
        self.matrix[actual][predicted]
    }

    /// True positives.
    #[must_use]
    pub const fn true_positives(&self) -> usize {
        self.matrix[1][1]
    }

    /// True negatives.
    #[must_use]
    pub const fn true_negatives(&self) -> usize {
        self.matrix[0][0]
    }

    /// False positives.
    #[must_use]
    pub const fn false_positives(&self) -> usize {
        self.matrix[0][1]
    }

    /// False negatives.
    #[must_use]
    pub const fn false_negatives(&self) -> usize {
        self.matrix[1][0]
    }

    /// Total number of samples.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.matrix[0][0] + self.matrix[0][1] + self.matrix[1][0] + self.matrix[1][1]
    }

    /// (TP + TN) / total; 0 for an empty matrix.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.true_positives() + self.true_negatives()) as f64 / total as f64
    }

    /// Matthews correlation coefficient.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DegenerateMetric`] when a row or column sum is zero.
    #[allow(clippy::cast_precision_loss)]
    pub fn mcc(&self) -> Result<f64> {
        let tp = self.true_positives() as f64;
        let tn = self.true_negatives() as f64;
        let fp = self.false_positives() as f64;
        let fn_ = self.false_negatives() as f64;

        let denom = ((tp + fp) * (tp + fn_) * (tn + fp) * (tn + fn_)).sqrt();
        if denom == 0.0 {
            return Err(Error::DegenerateMetric(format!(
                "MCC undefined for TP={tp} TN={tn} FP={fp} FN={fn_}"
            )));
        }
        Ok((tp * tn - fp * fn_) / denom)
    }

    /// MCC with the degenerate case mapped to `0.0`.
    #[must_use]
    pub fn mcc_or_zero(&self) -> f64 {
        self.mcc().unwrap_or(0.0)
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "                 Confusion matrix")?;
        writeln!(f, "                 Score positive    Score negative")?;
        writeln!(
            f,
            "Actual positive    {:>6}             {:>5}",
            self.true_positives(),
            self.false_negatives()
        )?;
        writeln!(
            f,
            "Actual negative    {:>6}             {:>5}",
            self.false_positives(),
            self.true_negatives()
        )
    }
}

/// Scored epoch: confusion matrix plus derived metrics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreReport {
    /// Outcome counts
    pub confusion: ConfusionMatrix,
    /// (TP + TN) / total
    pub accuracy: f64,
    /// Matthews correlation coefficient (degenerate case = 0)
    pub mcc: f64,
}

impl ScoreReport {
    /// Score binary predictions against labels.
    ///
    /// # Errors
    ///
    /// See [`ConfusionMatrix::from_predictions`].
    pub fn new(labels: &[u8], predicted: &[u8]) -> Result<Self> {
        let confusion = ConfusionMatrix::from_predictions(labels, predicted)?;
        Ok(Self {
            confusion,
            accuracy: confusion.accuracy(),
            mcc: confusion.mcc_or_zero(),
        })
    }
}

impl fmt::Display for ScoreReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.confusion)?;
        writeln!(f)?;
        writeln!(f, "Accuracy  {:.2}", self.accuracy)?;
        write!(f, "MCC = {:.2}", self.mcc)
    }
}

/// Threshold `probs`, print the confusion-matrix report to stdout and return
/// the MCC.
///
/// # Errors
///
/// See [`ConfusionMatrix::from_predictions`].
pub fn print_metrics(labels: &[u8], probs: &[f32], threshold: f32) -> Result<f64> {
    let report = ScoreReport::new(labels, &threshold_predictions(probs, threshold))?;
    println!("{report}");
    Ok(report.mcc)
}

/// Area under the ROC curve via the rank-sum statistic (ties share ranks).
///
/// Returns `None` if the slices differ in length or only one class is present.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn roc_auc(labels: &[u8], probs: &[f32]) -> Option<f64> {
    if labels.len() != probs.len() {
        return None;
    }
    let positives = labels.iter().filter(|&&l| l == 1).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_by(|&a, &b| probs[a].total_cmp(&probs[b]));

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && probs[order[end + 1]] == probs[order[start]] {
            end += 1;
        }
        // 1-based average rank of the tie group
        let rank = (start + end) as f64 / 2.0 + 1.0;
        for &idx in &order[start..=end] {
            if labels[idx] == 1 {
                positive_rank_sum += rank;
            }
        }
        start = end + 1;
    }

    let p = positives as f64;
    let n = negatives as f64;
    Some((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_strict() {
        assert_eq!(threshold_predictions(&[0.2, 0.5, 0.51, 1.0], 0.5), vec![0, 0, 1, 1]);
    }

    #[test]
    fn test_balanced_example() {
        // labels [1,1,0,0] vs scores [1,0,0,1]: one of each outcome
        let cm = ConfusionMatrix::from_predictions(&[1, 1, 0, 0], &[1, 0, 0, 1]).unwrap();
        assert_eq!(cm.true_positives(), 1);
        assert_eq!(cm.false_negatives(), 1);
        assert_eq!(cm.false_positives(), 1);
        assert_eq!(cm.true_negatives(), 1);
        assert!((cm.accuracy() - 0.5).abs() < f64::EPSILON);
        assert!(cm.mcc().unwrap().abs() < f64::EPSILON);
    }

    #[test]
    fn test_all_positive_example_is_degenerate() {
        let cm = ConfusionMatrix::from_predictions(&[1, 1, 1, 1], &[1, 1, 1, 1]).unwrap();
        assert_eq!(cm.true_positives(), 4);
        assert!((cm.accuracy() - 1.0).abs() < f64::EPSILON);
        assert!(matches!(cm.mcc(), Err(Error::DegenerateMetric(_))));

        let report = ScoreReport::new(&[1, 1, 1, 1], &[1, 1, 1, 1]).unwrap();
        assert!(report.mcc.abs() < f64::EPSILON);
        assert!(!report.mcc.is_nan());
    }

    #[test]
    fn test_perfect_and_inverse_mcc() {
        let perfect = ConfusionMatrix::from_predictions(&[1, 0, 1, 0], &[1, 0, 1, 0]).unwrap();
        assert!((perfect.mcc().unwrap() - 1.0).abs() < 1e-12);

        let inverse = ConfusionMatrix::from_predictions(&[1, 0, 1, 0], &[0, 1, 0, 1]).unwrap();
        assert!((inverse.mcc().unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_from_predictions_rejects_bad_input() {
        assert!(ConfusionMatrix::from_predictions(&[1, 0], &[1]).is_err());
        assert!(ConfusionMatrix::from_predictions(&[2], &[1]).is_err());
    }

    #[test]
    fn test_empty_matrix() {
        let cm = ConfusionMatrix::from_predictions(&[], &[]).unwrap();
        assert_eq!(cm.total(), 0);
        assert!(cm.accuracy().abs() < f64::EPSILON);
        assert!(cm.mcc_or_zero().abs() < f64::EPSILON);
    }

    #[test]
    fn test_report_format() {
        let report = ScoreReport::new(&[1, 1, 0, 0], &[1, 0, 0, 1]).unwrap();
        let text = report.to_string();
        assert!(text.contains("Confusion matrix"));
        assert!(text.contains("Actual positive         1                 1"));
        assert!(text.contains("Accuracy  0.50"));
        assert!(text.contains("MCC = 0.00"));
    }

    #[test]
    fn test_print_metrics_returns_mcc() {
        let mcc = print_metrics(&[1, 0, 1, 0], &[0.9, 0.1, 0.8, 0.3], 0.5).unwrap();
        assert!((mcc - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_roc_auc() {
        assert!((roc_auc(&[0, 0, 1, 1], &[0.1, 0.2, 0.8, 0.9]).unwrap() - 1.0).abs() < 1e-12);
        assert!((roc_auc(&[0, 1], &[0.5, 0.5]).unwrap() - 0.5).abs() < 1e-12);
        assert!((roc_auc(&[1, 1, 0, 0], &[0.1, 0.2, 0.8, 0.9]).unwrap()).abs() < 1e-12);
        assert!(roc_auc(&[1, 1], &[0.1, 0.2]).is_none());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_binary(len: usize) -> impl Strategy<Value = Vec<u8>> {
            prop::collection::vec(0u8..=1, len)
        }

        fn flip(values: &[u8]) -> Vec<u8> {
            values.iter().map(|v| 1 - v).collect()
        }

        proptest! {
            /// Property: raising the threshold never adds predicted positives
            #[test]
            fn prop_threshold_monotonic(
                probs in prop::collection::vec(0.0f32..=1.0, 0..200),
                a in 0.0f32..=1.0,
                b in 0.0f32..=1.0
            ) {
                let (low, high) = if a <= b { (a, b) } else { (b, a) };
                let count = |t| threshold_predictions(&probs, t).iter().filter(|&&p| p == 1).count();
                prop_assert!(count(high) <= count(low));
            }

            /// Property: MCC is unchanged when 0/1 are swapped in both inputs
            #[test]
            fn prop_mcc_label_swap_symmetric(
                (labels, predicted) in (1usize..100).prop_flat_map(|n| (arb_binary(n), arb_binary(n)))
            ) {
                let original = ConfusionMatrix::from_predictions(&labels, &predicted).unwrap();
                let swapped = ConfusionMatrix::from_predictions(&flip(&labels), &flip(&predicted)).unwrap();
                prop_assert!((original.mcc_or_zero() - swapped.mcc_or_zero()).abs() < 1e-12);
            }

            /// Property: MCC is finite and within [-1, 1]
            #[test]
            fn prop_mcc_bounded(
                (labels, predicted) in (0usize..100).prop_flat_map(|n| (arb_binary(n), arb_binary(n)))
            ) {
                let mcc = ConfusionMatrix::from_predictions(&labels, &predicted).unwrap().mcc_or_zero();
                prop_assert!(mcc.is_finite());
                prop_assert!((-1.0 - 1e-12..=1.0 + 1e-12).contains(&mcc));
            }

            /// Property: a zero row or column sum always yields MCC = 0
            #[test]
            fn prop_degenerate_mcc_is_zero(
                n in 1usize..100,
                value in 0u8..=1,
                other in prop::collection::vec(0u8..=1, 100)
            ) {
                let constant = vec![value; n];
                let other = &other[..n];
                let cm = ConfusionMatrix::from_predictions(&constant, other).unwrap();
                prop_assert_eq!(cm.mcc_or_zero(), 0.0);
                let cm = ConfusionMatrix::from_predictions(other, &constant).unwrap();
                prop_assert_eq!(cm.mcc_or_zero(), 0.0);
            }
        }
    }
}
