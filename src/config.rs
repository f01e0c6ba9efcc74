//! Training configuration
//!
//! Loaded from a JSON file; every field is optional and falls back to the
//! defaults below.
//!
//! ```json
//! {
//!   "train_dir": "data/train",
//!   "eval_dir": "data/eval",
//!   "batch_size": 40,
//!   "num_epochs": 60
//! }
//! ```

use crate::model::DEFAULT_LEARNING_RATE;
use crate::scoring::DEFAULT_THRESHOLD;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings for one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Training record directory
    pub train_dir: PathBuf,
    /// Evaluation record directory
    pub eval_dir: PathBuf,
    /// Unlabelled records to score after training
    pub predict_dir: Option<PathBuf>,
    /// Model state and metric history
    pub model_dir: PathBuf,
    /// Learning-curve SVG, overwritten every epoch
    pub plot_path: PathBuf,
    /// Submission CSV written from `predict_dir`
    pub submission_path: Option<PathBuf>,
    /// Samples per training/eval batch
    pub batch_size: usize,
    /// Batches trained before the first epoch (0 disables warm-up)
    pub warmup_steps: usize,
    /// Train/evaluate/score cycles
    pub num_epochs: usize,
    /// Probability above which a prediction counts as positive
    pub threshold: f32,
    /// SGD learning rate
    pub learning_rate: f32,
    /// Batch size of the one-off label capture pass
    pub label_batch_size: usize,
    /// Seed for the training shuffle
    pub shuffle_seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            train_dir: PathBuf::from("data/train"),
            eval_dir: PathBuf::from("data/eval"),
            predict_dir: None,
            model_dir: PathBuf::from("model"),
            plot_path: PathBuf::from("Learning_plot.svg"),
            submission_path: None,
            batch_size: 40,
            warmup_steps: 10,
            num_epochs: 60,
            threshold: DEFAULT_THRESHOLD,
            learning_rate: DEFAULT_LEARNING_RATE,
            label_batch_size: 2178,
            shuffle_seed: 42,
        }
    }
}

impl TrainConfig {
    /// Start from the defaults.
    #[must_use]
    pub fn builder() -> TrainConfigBuilder {
        TrainConfigBuilder::default()
    }

    /// Read and validate a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read, does not parse,
    /// or fails [`TrainConfig::validate`].
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_json_str(&content)
    }

    /// Parse and validate a JSON config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on parse or validation failure.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be > 0".to_string()));
        }
        if self.label_batch_size == 0 {
            return Err(Error::Config("label_batch_size must be > 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(Error::Config(format!(
                "threshold must be in [0, 1], got {}",
                self.threshold
            )));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(Error::Config(format!(
                "learning_rate must be > 0, got {}",
                self.learning_rate
            )));
        }
        if self.submission_path.is_some() && self.predict_dir.is_none() {
            return Err(Error::Config(
                "submission_path requires predict_dir".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`TrainConfig`].
#[derive(Debug, Clone, Default)]
pub struct TrainConfigBuilder {
    config: TrainConfig,
}

impl TrainConfigBuilder {
    /// Training record directory.
    #[must_use]
    pub fn train_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.train_dir = dir.into();
        self
    }

    /// Evaluation record directory.
    #[must_use]
    pub fn eval_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.eval_dir = dir.into();
        self
    }

    /// Prediction record directory.
    #[must_use]
    pub fn predict_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.predict_dir = Some(dir.into());
        self
    }

    /// Model directory.
    #[must_use]
    pub fn model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.model_dir = dir.into();
        self
    }

    /// Plot output path.
    #[must_use]
    pub fn plot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.plot_path = path.into();
        self
    }

    /// Submission CSV path.
    #[must_use]
    pub fn submission_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.submission_path = Some(path.into());
        self
    }

    /// Batch size.
    #[must_use]
    pub const fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    /// Warm-up steps.
    #[must_use]
    pub const fn warmup_steps(mut self, steps: usize) -> Self {
        self.config.warmup_steps = steps;
        self
    }

    /// Number of epochs.
    #[must_use]
    pub const fn num_epochs(mut self, epochs: usize) -> Self {
        self.config.num_epochs = epochs;
        self
    }

    /// Decision threshold.
    #[must_use]
    pub const fn threshold(mut self, threshold: f32) -> Self {
        self.config.threshold = threshold;
        self
    }

    /// Learning rate.
    #[must_use]
    pub const fn learning_rate(mut self, lr: f32) -> Self {
        self.config.learning_rate = lr;
        self
    }

    /// Label capture batch size.
    #[must_use]
    pub const fn label_batch_size(mut self, size: usize) -> Self {
        self.config.label_batch_size = size;
        self
    }

    /// Shuffle seed.
    #[must_use]
    pub const fn shuffle_seed(mut self, seed: u64) -> Self {
        self.config.shuffle_seed = seed;
        self
    }

    /// Validate and return the config.
    ///
    /// # Errors
    ///
    /// See [`TrainConfig::validate`].
    pub fn build(self) -> Result<TrainConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
