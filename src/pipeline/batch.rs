//! Batch of normalized samples

use crate::transform::{NormalizedSample, SAMPLE_LEN};

/// An ordered group of normalized samples, flattened per field.
///
/// `labels` is present only when every sample in the batch carries one.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    signal_data: Vec<f32>,
    bw_data: Vec<f32>,
    signal_ids: Vec<i64>,
    measurement_ids: Vec<i64>,
    labels: Option<Vec<u8>>,
}

impl Batch {
    /// Assemble a batch, preserving sample order.
    #[must_use]
    pub fn from_samples(samples: Vec<NormalizedSample>) -> Self {
        let n = samples.len();
        let mut signal_data = Vec::with_capacity(n * SAMPLE_LEN);
        let mut bw_data = Vec::with_capacity(n * SAMPLE_LEN);
        let mut signal_ids = Vec::with_capacity(n);
        let mut measurement_ids = Vec::with_capacity(n);
        let mut labels = Some(Vec::with_capacity(n));

        for sample in samples {
            signal_data.extend_from_slice(&sample.signal_data);
            bw_data.extend_from_slice(&sample.bw_data);
            signal_ids.push(sample.signal_id);
            measurement_ids.push(sample.measurement_id);
            labels = match (labels, sample.label) {
                (Some(mut acc), Some(label)) => {
                    acc.push(label);
                    Some(acc)
                }
                _ => None,
            };
        }

        Self {
            signal_data,
            bw_data,
            signal_ids,
            measurement_ids,
            labels,
        }
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.signal_ids.len()
    }

    /// True if the batch holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signal_ids.is_empty()
    }

    /// All model inputs, `len() × 240 × 200` row-major.
    #[must_use]
    pub fn signal_data(&self) -> &[f32] {
        &self.signal_data
    }

    /// Model input of sample `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= len()`.
    #[must_use]
    pub fn sample(&self, i: usize) -> &[f32] {
        &self.signal_data[i * SAMPLE_LEN..(i + 1) * SAMPLE_LEN]
    }

    /// Auxiliary binarized channel, same layout as [`Batch::signal_data`].
    #[must_use]
    pub fn bw_data(&self) -> &[f32] {
        &self.bw_data
    }

    /// Signal identifiers in sample order.
    #[must_use]
    pub fn signal_ids(&self) -> &[i64] {
        &self.signal_ids
    }

    /// Measurement identifiers in sample order.
    #[must_use]
    pub fn measurement_ids(&self) -> &[i64] {
        &self.measurement_ids
    }

    /// Labels in sample order, if every sample has one.
    #[must_use]
    pub fn labels(&self) -> Option<&[u8]> {
        self.labels.as_deref()
    }
}
