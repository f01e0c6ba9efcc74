//! Epoch Metrics - one row per completed epoch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metrics recorded at the end of one epoch.
///
/// Immutable once built; the history only ever appends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpochMetrics {
    epoch: u64,
    loss: f64,
    accuracy: f64,
    mcc: f64,
    train_loss: Option<f64>,
    auc: Option<f64>,
    recorded_at: DateTime<Utc>,
}

impl EpochMetrics {
    /// Create an epoch entry stamped with the current time.
    ///
    /// # Arguments
    ///
    /// * `epoch` - Zero-based epoch index
    /// * `loss` - Evaluation loss
    /// * `accuracy` - Evaluation accuracy
    /// * `mcc` - Matthews correlation coefficient of the thresholded predictions
    #[must_use]
    pub fn new(epoch: u64, loss: f64, accuracy: f64, mcc: f64) -> Self {
        EpochMetricsBuilder::new(epoch, loss, accuracy, mcc).build()
    }

    /// Create a builder for the optional fields.
    #[must_use]
    pub fn builder(epoch: u64, loss: f64, accuracy: f64, mcc: f64) -> EpochMetricsBuilder {
        EpochMetricsBuilder::new(epoch, loss, accuracy, mcc)
    }

    /// Zero-based epoch index.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Evaluation loss.
    #[must_use]
    pub const fn loss(&self) -> f64 {
        self.loss
    }

    /// Evaluation accuracy.
    #[must_use]
    pub const fn accuracy(&self) -> f64 {
        self.accuracy
    }

    /// Matthews correlation coefficient.
    #[must_use]
    pub const fn mcc(&self) -> f64 {
        self.mcc
    }

    /// Mean training loss of the epoch, if recorded.
    #[must_use]
    pub const fn train_loss(&self) -> Option<f64> {
        self.train_loss
    }

    /// Evaluation ROC AUC, if defined.
    #[must_use]
    pub const fn auc(&self) -> Option<f64> {
        self.auc
    }

    /// Wall-clock time the entry was created.
    #[must_use]
    pub const fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    /// Look up a metric by key (`loss`, `accuracy`, `mcc`, `train_loss`, `auc`).
    #[must_use]
    pub fn get(&self, key: &str) -> Option<f64> {
        match key {
            "loss" => Some(self.loss),
            "accuracy" => Some(self.accuracy),
            "mcc" => Some(self.mcc),
            "train_loss" => self.train_loss,
            "auc" => self.auc,
            _ => None,
        }
    }
}

/// Builder for `EpochMetrics`.
#[derive(Debug)]
pub struct EpochMetricsBuilder {
    epoch: u64,
    loss: f64,
    accuracy: f64,
    mcc: f64,
    train_loss: Option<f64>,
    auc: Option<f64>,
    recorded_at: DateTime<Utc>,
}

impl EpochMetricsBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(epoch: u64, loss: f64, accuracy: f64, mcc: f64) -> Self {
        Self {
            epoch,
            loss,
            accuracy,
            mcc,
            train_loss: None,
            auc: None,
            recorded_at: Utc::now(),
        }
    }

    /// Set the mean training loss.
    #[must_use]
    pub const fn train_loss(mut self, train_loss: f64) -> Self {
        self.train_loss = Some(train_loss);
        self
    }

    /// Set the evaluation AUC.
    #[must_use]
    pub const fn auc(mut self, auc: Option<f64>) -> Self {
        self.auc = auc;
        self
    }

    /// Set a custom timestamp (useful for deserialization/testing).
    #[must_use]
    pub const fn recorded_at(mut self, recorded_at: DateTime<Utc>) -> Self {
        self.recorded_at = recorded_at;
        self
    }

    /// Build the `EpochMetrics`.
    #[must_use]
    pub fn build(self) -> EpochMetrics {
        EpochMetrics {
            epoch: self.epoch,
            loss: self.loss,
            accuracy: self.accuracy,
            mcc: self.mcc,
            train_loss: self.train_loss,
            auc: self.auc,
            recorded_at: self.recorded_at,
        }
    }
}
