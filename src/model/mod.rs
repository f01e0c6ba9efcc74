//! Classifier boundary
//!
//! The driver talks to a model only through [`Classifier`]: one SGD step per
//! training batch, logits for any batch, and persistence into the model
//! directory. Evaluation and prediction are derived from `forward`, so a
//! backend only has to supply the numerics.
//!
//! Backends: [`ConvClassifier`] trains the [`ConvNetSpec`] network on `burn`
//! and is what the command line runs; [`PooledLogistic`] is a tiny linear
//! stand-in that exercises the same contract in milliseconds.
//!
//! Contract for every backend:
//! - input: 240×200×1 normalized sample ([`crate::transform::SAMPLE_LEN`] values)
//! - output: one logit per sample (probability = sigmoid(logit))
//! - loss: sigmoid cross-entropy against the 0/1 label
//! - optimizer: stochastic gradient descent, learning rate 0.001 by default

mod architecture;
mod convnet;
mod pooled;

pub use architecture::{Activation, ConvNetSpec, Layer, Shape};
pub use convnet::{ConvClassifier, ConvNet, ConvStage, DenseStage, TrainBackend};
pub use pooled::PooledLogistic;

use crate::pipeline::Batch;
use crate::scoring::roc_auc;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default SGD learning rate
pub const DEFAULT_LEARNING_RATE: f32 = 0.001;

/// Numerically stable sigmoid.
#[must_use]
pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Numerically stable sigmoid cross-entropy: `max(x, 0) - x*t + ln(1 + e^-|x|)`.
#[must_use]
pub fn sigmoid_cross_entropy(logit: f32, target: f32) -> f32 {
    logit.max(0.0) - logit * target + (-logit.abs()).exp().ln_1p()
}

/// Aggregate metrics of one evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    /// Mean sigmoid cross-entropy over all samples
    pub loss: f64,
    /// Fraction of samples whose rounded probability equals the label
    pub accuracy: f64,
    /// ROC AUC, if both classes are present
    pub auc: Option<f64>,
    /// Samples evaluated
    pub samples: usize,
}

/// Summary of one training pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainPass {
    /// Batches trained on
    pub steps: usize,
    /// Mean of the per-batch losses
    pub mean_loss: f64,
}

/// Probability for one sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Signal the sample came from
    pub signal_id: i64,
    /// Sigmoid of the logit
    pub probability: f32,
}

/// A binary classifier over normalized batches.
pub trait Classifier {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// One logit per sample, in batch order.
    ///
    /// # Errors
    ///
    /// Backend-specific numerical or shape errors.
    fn forward(&self, batch: &Batch) -> Result<Vec<f32>>;

    /// Run one optimizer step on `batch` and return its mean loss.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingLabels`] if the batch has no labels.
    fn train_step(&mut self, batch: &Batch) -> Result<f32>;

    /// Persist model state under `dir`.
    ///
    /// # Errors
    ///
    /// Returns IO or serialization errors.
    fn save(&self, dir: &Path) -> Result<()>;

    /// Train on every batch of `batches`.
    ///
    /// # Errors
    ///
    /// Propagates the first [`Classifier::train_step`] error.
    fn train<I>(&mut self, batches: I) -> Result<TrainPass>
    where
        I: IntoIterator<Item = Batch>,
        Self: Sized,
    {
        let mut steps = 0;
        let mut total = 0.0;
        for batch in batches {
            total += f64::from(self.train_step(&batch)?);
            steps += 1;
        }
        #[allow(clippy::cast_precision_loss)]
        let mean_loss = if steps > 0 { total / steps as f64 } else { 0.0 };
        Ok(TrainPass { steps, mean_loss })
    }

    /// Loss, accuracy and AUC over labelled batches (no parameter updates).
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingLabels`] for unlabelled batches and
    /// [`Error::InvalidInput`] if there are no samples.
    #[allow(clippy::cast_precision_loss)]
    fn evaluate<I>(&self, batches: I) -> Result<EvalMetrics>
    where
        I: IntoIterator<Item = Batch>,
        Self: Sized,
    {
        let mut loss = 0.0;
        let mut correct = 0usize;
        let mut labels = Vec::new();
        let mut probs = Vec::new();

        for batch in batches {
            let batch_labels = batch.labels().ok_or(Error::MissingLabels)?;
            let logits = self.forward(&batch)?;
            for (&logit, &label) in logits.iter().zip(batch_labels) {
                let p = sigmoid(logit);
                loss += f64::from(sigmoid_cross_entropy(logit, f32::from(label)));
                correct += usize::from(u8::from(p > 0.5) == label);
                probs.push(p);
            }
            labels.extend_from_slice(batch_labels);
        }

        if labels.is_empty() {
            return Err(Error::InvalidInput("no samples to evaluate".to_string()));
        }
        let n = labels.len() as f64;
        Ok(EvalMetrics {
            loss: loss / n,
            accuracy: correct as f64 / n,
            auc: roc_auc(&labels, &probs),
            samples: labels.len(),
        })
    }

    /// Probabilities for every sample, in iteration order.
    ///
    /// # Errors
    ///
    /// Propagates [`Classifier::forward`] errors.
    fn predict<I>(&self, batches: I) -> Result<Vec<Prediction>>
    where
        I: IntoIterator<Item = Batch>,
        Self: Sized,
    {
        let mut predictions = Vec::new();
        for batch in batches {
            let logits = self.forward(&batch)?;
            predictions.extend(
                batch
                    .signal_ids()
                    .iter()
                    .zip(logits)
                    .map(|(&signal_id, logit)| Prediction {
                        signal_id,
                        probability: sigmoid(logit),
                    }),
            );
        }
        Ok(predictions)
    }
}
