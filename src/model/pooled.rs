//! Pooled logistic backend
//!
//! Average-pools each 240×200 sample into 10×10 blocks (24×20 = 480
//! features) and fits a single logistic unit with plain SGD. It honours the
//! full [`Classifier`] contract at a fraction of the cost of
//! [`super::ConvClassifier`], which makes it the backend of the driver tests.

use super::{sigmoid, sigmoid_cross_entropy, Classifier, DEFAULT_LEARNING_RATE};
use crate::pipeline::Batch;
use crate::transform::{CROPPED_ROWS, SIGNAL_COLS};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use trueno::Vector;

/// Pooling block edge
const POOL: usize = 10;
/// Pooled grid rows
const POOLED_ROWS: usize = CROPPED_ROWS / POOL;
/// Pooled grid columns
const POOLED_COLS: usize = SIGNAL_COLS / POOL;
/// Features per sample after pooling
pub const FEATURES: usize = POOLED_ROWS * POOLED_COLS;

/// File the backend persists itself to inside the model directory
const STATE_FILE: &str = "pooled_logistic.json";

/// Logistic regression over block-averaged samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PooledLogistic {
    weights: Vec<f32>,
    bias: f32,
    learning_rate: f32,
    steps: u64,
}

impl Default for PooledLogistic {
    fn default() -> Self {
        Self::new(DEFAULT_LEARNING_RATE)
    }
}

impl PooledLogistic {
    /// Zero-initialised model.
    #[must_use]
    pub fn new(learning_rate: f32) -> Self {
        Self {
            weights: vec![0.0; FEATURES],
            bias: 0.0,
            learning_rate,
            steps: 0,
        }
    }

    /// Path of the persisted state inside `dir`.
    #[must_use]
    pub fn state_path(dir: &Path) -> PathBuf {
        dir.join(STATE_FILE)
    }

    /// Load persisted state from `dir`, or start fresh if there is none.
    ///
    /// The configured learning rate wins over the persisted one.
    ///
    /// # Errors
    ///
    /// Returns IO/JSON errors for an unreadable state file, or
    /// [`Error::ShapeMismatch`] if its weight vector has the wrong length.
    pub fn load_or_new(dir: &Path, learning_rate: f32) -> Result<Self> {
        let path = Self::state_path(dir);
        if !path.exists() {
            return Ok(Self::new(learning_rate));
        }
        let mut model: Self = serde_json::from_slice(&std::fs::read(&path)?)?;
        if model.weights.len() != FEATURES {
            return Err(Error::ShapeMismatch {
                expected: FEATURES,
                actual: model.weights.len(),
            });
        }
        model.learning_rate = learning_rate;
        debug!(path = %path.display(), steps = model.steps, "warm start");
        Ok(model)
    }

    /// Optimizer steps taken so far.
    #[must_use]
    pub const fn steps(&self) -> u64 {
        self.steps
    }

    /// Learning rate.
    #[must_use]
    pub const fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn logit(&self, features: &[f32]) -> f32 {
        let w = Vector::from_slice(&self.weights);
        let x = Vector::from_slice(features);
        w.dot(&x).unwrap_or(0.0) + self.bias
    }
}

/// Average 10×10 blocks of a 240×200 row-major sample.
#[allow(clippy::cast_precision_loss)]
fn pool(sample: &[f32]) -> Vec<f32> {
    let mut features = vec![0.0_f32; FEATURES];
    for (row, chunk) in sample.chunks_exact(SIGNAL_COLS).enumerate() {
        let out_row = row / POOL;
        for (col, &value) in chunk.iter().enumerate() {
            features[out_row * POOLED_COLS + col / POOL] += value;
        }
    }
    let area = (POOL * POOL) as f32;
    for f in &mut features {
        *f /= area;
    }
    features
}

impl Classifier for PooledLogistic {
    fn name(&self) -> &'static str {
        "pooled-logistic"
    }

    fn forward(&self, batch: &Batch) -> Result<Vec<f32>> {
        Ok((0..batch.len())
            .map(|i| self.logit(&pool(batch.sample(i))))
            .collect())
    }

    #[allow(clippy::cast_precision_loss)]
    fn train_step(&mut self, batch: &Batch) -> Result<f32> {
        let labels = batch.labels().ok_or(Error::MissingLabels)?;
        if batch.is_empty() {
            return Ok(0.0);
        }
        let n = batch.len() as f32;

        let mut grad_w = vec![0.0_f32; FEATURES];
        let mut grad_b = 0.0_f32;
        let mut loss = 0.0_f32;
        for (i, &label) in labels.iter().enumerate() {
            let features = pool(batch.sample(i));
            let logit = self.logit(&features);
            let target = f32::from(label);
            loss += sigmoid_cross_entropy(logit, target);

            let err = sigmoid(logit) - target;
            for (g, x) in grad_w.iter_mut().zip(&features) {
                *g += err * x;
            }
            grad_b += err;
        }

        let step = self.learning_rate / n;
        for (w, g) in self.weights.iter_mut().zip(&grad_w) {
            *w -= step * g;
        }
        self.bias -= step * grad_b;
        self.steps += 1;

        Ok(loss / n)
    }

    fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let path = Self::state_path(dir);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(self)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{NormalizedSample, SAMPLE_LEN};

    fn batch(values: &[(f32, u8)]) -> Batch {
        Batch::from_samples(
            values
                .iter()
                .enumerate()
                .map(|(i, &(fill, label))| NormalizedSample {
                    signal_data: vec![fill; SAMPLE_LEN],
                    bw_data: vec![0.0; SAMPLE_LEN],
                    signal_id: i64::try_from(i).unwrap(),
                    measurement_id: 0,
                    label: Some(label),
                })
                .collect(),
        )
    }

    #[test]
    fn test_pool_averages_blocks() {
        #[allow(clippy::cast_precision_loss)]
        let sample: Vec<f32> = (0..SAMPLE_LEN)
            .map(|i| if (i / SIGNAL_COLS) < POOL && (i % SIGNAL_COLS) < POOL { 2.0 } else { 0.0 })
            .collect();
        let features = pool(&sample);
        assert_eq!(features.len(), FEATURES);
        assert!((features[0] - 2.0).abs() < 1e-6);
        assert!(features[1..].iter().all(|&f| f.abs() < 1e-6));
    }

    #[test]
    fn test_fresh_model_predicts_half() {
        let model = PooledLogistic::default();
        let logits = model.forward(&batch(&[(0.3, 1), (-0.2, 0)])).unwrap();
        assert_eq!(logits.len(), 2);
        assert!(logits.iter().all(|&l| l.abs() < f32::EPSILON));
    }

    #[test]
    fn test_training_reduces_loss() {
        let mut model = PooledLogistic::new(0.5);
        let data = batch(&[(0.5, 1), (-0.5, 0), (0.4, 1), (-0.3, 0)]);

        let first = model.train_step(&data).unwrap();
        let mut last = first;
        for _ in 0..50 {
            last = model.train_step(&data).unwrap();
        }
        assert!(last < first, "loss {first} -> {last}");
        assert_eq!(model.steps(), 51);
    }

    #[test]
    fn test_train_step_requires_labels() {
        let mut model = PooledLogistic::default();
        let unlabelled = Batch::from_samples(vec![NormalizedSample {
            signal_data: vec![0.0; SAMPLE_LEN],
            bw_data: vec![0.0; SAMPLE_LEN],
            signal_id: 1,
            measurement_id: 0,
            label: None,
        }]);
        assert!(matches!(
            model.train_step(&unlabelled),
            Err(Error::MissingLabels)
        ));
    }

    #[test]
    fn test_save_and_warm_start() {
        let dir = std::env::temp_dir().join(format!("discharge_net_pooled_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        let mut model = PooledLogistic::new(0.1);
        model.train_step(&batch(&[(0.5, 1), (-0.5, 0)])).unwrap();
        model.save(&dir).unwrap();

        let loaded = PooledLogistic::load_or_new(&dir, 0.01).unwrap();
        assert_eq!(loaded.steps(), 1);
        assert!((loaded.learning_rate() - 0.01).abs() < f32::EPSILON);
        assert_eq!(loaded.weights, model.weights);
    }

    #[test]
    fn test_evaluate_and_predict_defaults() {
        let model = PooledLogistic::default();
        let metrics = model.evaluate(vec![batch(&[(0.1, 1), (0.2, 0)])]).unwrap();
        assert_eq!(metrics.samples, 2);
        assert!((metrics.loss - f64::from(2.0_f32.ln())).abs() < 1e-5);

        let predictions = model.predict(vec![batch(&[(0.1, 1)])]).unwrap();
        assert_eq!(predictions.len(), 1);
        assert!((predictions[0].probability - 0.5).abs() < f32::EPSILON);
    }
}
