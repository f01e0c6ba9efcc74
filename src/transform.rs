//! Record normalization (raw SFFT signal → model input)
//!
//! ```text
//! signal[50000] ─reshape─> 250×200 ─crop rows 2..242─> 240×200
//!     ├─ cbrt ─> standardize ─> ÷ 6.0          = signal_data (model input)
//!     └─ sqrt ─> min-max ─> round to {0,1}     = bw_data (auxiliary channel)
//! ```
//!
//! Reductions (sum, dot, min, max) run on trueno SIMD vectors.

use crate::record::{ExampleRecord, SIGNAL_LEN};
use trueno::Vector;

/// Rows of the reshaped signal (frequency bins)
pub const SIGNAL_ROWS: usize = 250;
/// Columns of the reshaped signal (time frames)
pub const SIGNAL_COLS: usize = 200;
/// Leading low-frequency rows discarded before normalization
pub const CROP_OFFSET: usize = 2;
/// Rows kept after cropping
pub const CROPPED_ROWS: usize = 240;
/// Values per normalized sample (240×200)
pub const SAMPLE_LEN: usize = CROPPED_ROWS * SIGNAL_COLS;
/// Final divisor applied after standardization
pub const NORM_CONSTANT: f32 = 6.0;

/// Model-ready sample derived from one [`ExampleRecord`].
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSample {
    /// Standardized 240×200 input, row-major
    pub signal_data: Vec<f32>,
    /// Binarized 240×200 auxiliary channel, row-major
    pub bw_data: Vec<f32>,
    /// Originating signal identifier
    pub signal_id: i64,
    /// Originating measurement identifier
    pub measurement_id: i64,
    /// Binary label, if the record carries one
    pub label: Option<u8>,
}

impl NormalizedSample {
    /// Run the full transform on a record.
    #[must_use]
    pub fn from_record(record: &ExampleRecord) -> Self {
        let cropped = crop(record.signal());

        let mut signal_data: Vec<f32> = cropped.iter().map(|v| v.cbrt()).collect();
        standardize(&mut signal_data);
        for v in &mut signal_data {
            *v /= NORM_CONSTANT;
        }

        Self {
            signal_data,
            bw_data: binarize(cropped),
            signal_id: record.signal_id(),
            measurement_id: record.measurement_id(),
            label: record.label(),
        }
    }
}

/// Crop a 250×200 row-major signal to rows `2..242`.
///
/// # Panics
///
/// Panics if `signal` is shorter than [`SIGNAL_LEN`]; records are length-checked
/// at construction so this cannot happen for decoded data.
#[must_use]
pub fn crop(signal: &[f32]) -> &[f32] {
    assert!(signal.len() >= SIGNAL_LEN, "signal shorter than {SIGNAL_LEN}");
    let start = CROP_OFFSET * SIGNAL_COLS;
    &signal[start..start + SAMPLE_LEN]
}

/// Per-sample standardization in place: `(x - mean) / max(stddev, 1/sqrt(N))`.
///
/// The lower bound on the denominator keeps constant samples finite (they
/// standardize to all zeros).
#[allow(clippy::cast_precision_loss)]
pub fn standardize(values: &mut [f32]) {
    if values.is_empty() {
        return;
    }
    let n = values.len() as f32;
    let mean = Vector::from_slice(values).sum_kahan().unwrap_or(0.0) / n;
    for v in values.iter_mut() {
        *v -= mean;
    }

    let centered = Vector::from_slice(values);
    let variance = centered.dot(&centered).unwrap_or(0.0) / n;
    let denom = variance.sqrt().max(1.0 / n.sqrt());
    for v in values.iter_mut() {
        *v /= denom;
    }
}

/// Square root, min-max scale and round to {0,1}.
///
/// Rounding is half-to-even, so exactly 0.5 maps to 0. Negative inputs are
/// clamped to zero before the square root; a constant region yields all zeros.
#[must_use]
pub fn binarize(values: &[f32]) -> Vec<f32> {
    let rooted: Vec<f32> = values.iter().map(|v| v.max(0.0).sqrt()).collect();
    let vector = Vector::from_slice(&rooted);
    let (Ok(min), Ok(max)) = (vector.min(), vector.max()) else {
        return vec![0.0; rooted.len()];
    };

    let range = max - min;
    if !range.is_finite() || range <= 0.0 {
        return vec![0.0; rooted.len()];
    }
    rooted
        .iter()
        .map(|v| if (v - min) / range > 0.5 { 1.0 } else { 0.0 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(clippy::cast_precision_loss)]
    fn record_from(f: impl Fn(usize) -> f32) -> ExampleRecord {
        ExampleRecord::new((0..SIGNAL_LEN).map(f).collect(), 11, 3, Some(1)).unwrap()
    }

    fn mean_and_variance(values: &[f32]) -> (f64, f64) {
        let n = values.len() as f64;
        let mean = values.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
        let var = values
            .iter()
            .map(|&v| (f64::from(v) - mean).powi(2))
            .sum::<f64>()
            / n;
        (mean, var)
    }

    #[test]
    fn test_crop_drops_leading_rows() {
        #[allow(clippy::cast_precision_loss)]
        let signal: Vec<f32> = (0..SIGNAL_LEN).map(|i| (i / SIGNAL_COLS) as f32).collect();
        let cropped = crop(&signal);
        assert_eq!(cropped.len(), SAMPLE_LEN);
        assert!((cropped[0] - 2.0).abs() < f32::EPSILON);
        assert!((cropped[SAMPLE_LEN - 1] - 241.0).abs() < f32::EPSILON);
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn test_standardize_zero_mean_unit_variance() {
        let mut values: Vec<f32> = (0..SAMPLE_LEN).map(|i| ((i * 31) % 1000) as f32).collect();
        standardize(&mut values);

        let (mean, var) = mean_and_variance(&values);
        assert!(mean.abs() < 1e-3, "mean = {mean}");
        assert!((var - 1.0).abs() < 1e-3, "variance = {var}");
    }

    #[test]
    fn test_standardize_constant_sample_is_finite() {
        let mut values = vec![4.2_f32; SAMPLE_LEN];
        standardize(&mut values);
        assert!(values.iter().all(|v| v.is_finite() && v.abs() < 1e-3));
    }

    #[test]
    fn test_sample_shape_and_scale() {
        #[allow(clippy::cast_precision_loss)]
        let record = record_from(|i| ((i * 7) % 513) as f32);
        let sample = NormalizedSample::from_record(&record);

        assert_eq!(sample.signal_data.len(), SAMPLE_LEN);
        assert_eq!(sample.bw_data.len(), SAMPLE_LEN);
        assert_eq!(sample.signal_id, 11);
        assert_eq!(sample.label, Some(1));

        // Undo the final division: standardized data has unit variance
        let rescaled: Vec<f32> = sample
            .signal_data
            .iter()
            .map(|v| v * NORM_CONSTANT)
            .collect();
        let (mean, var) = mean_and_variance(&rescaled);
        assert!(mean.abs() < 1e-3);
        assert!((var - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_binarize_values_are_binary() {
        #[allow(clippy::cast_precision_loss)]
        let values: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let bw = binarize(&values);
        assert!(bw.iter().all(|&v| v == 0.0 || v == 1.0));
        assert!((bw[0]).abs() < f32::EPSILON);
        assert!((bw[99] - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_binarize_constant_region_is_zero() {
        let bw = binarize(&[3.0; 16]);
        assert!(bw.iter().all(|&v| v == 0.0));
    }
}
