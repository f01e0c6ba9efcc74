//! Training/evaluation driver
//!
//! Runs the per-epoch cycle over a [`Classifier`]:
//!
//! ```text
//! capture labels ─> warm-up ─┬─> Train ─> Evaluate ─> Predict ─> Score ─> Record ─┐
//!                            └──────────────────── next epoch <──────────────────┘
//!                                                                 │ num_epochs
//!                                                                 v
//!                                                          submission (optional)
//! ```
//!
//! Phases never overlap. The only state carried between epochs is the model
//! and the append-only [`MetricHistory`].

use crate::config::TrainConfig;
use crate::model::{Classifier, EvalMetrics, Prediction, TrainPass};
use crate::pipeline::{Dataset, InputPipeline, Repeat};
use crate::record::LabelPolicy;
use crate::scoring::{print_metrics, threshold_predictions};
use crate::tracking::{EpochMetrics, MetricHistory, RunStatus};
use crate::{plot, Error, Result};
use std::fmt;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, info_span, warn};

/// File name of the metric history inside the model directory
pub const HISTORY_FILE: &str = "history.json";

/// Shuffle pass reserved for warm-up; epochs use passes `0..num_epochs`.
pub const WARMUP_PASS: u64 = u64::MAX;

/// Phase of one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochPhase {
    /// One shuffled pass over the training set
    Train,
    /// Loss/accuracy/AUC over the evaluation set
    Evaluate,
    /// Probabilities over the evaluation set
    Predict,
    /// Threshold, confusion matrix, MCC
    Score,
    /// Append to the history and persist artifacts
    Record,
}

impl fmt::Display for EpochPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Train => "train",
            Self::Evaluate => "evaluate",
            Self::Predict => "predict",
            Self::Score => "score",
            Self::Record => "record",
        };
        f.write_str(name)
    }
}

/// Epoch state; each variant carries what the earlier phases produced.
enum EpochState {
    Train,
    Evaluate {
        train: TrainPass,
    },
    Predict {
        train: TrainPass,
        eval: EvalMetrics,
    },
    Score {
        train: TrainPass,
        eval: EvalMetrics,
        probs: Vec<f32>,
    },
    Record {
        train: TrainPass,
        eval: EvalMetrics,
        mcc: f64,
    },
    Done(EpochMetrics),
}

impl EpochState {
    const fn phase(&self) -> Option<EpochPhase> {
        match self {
            Self::Train => Some(EpochPhase::Train),
            Self::Evaluate { .. } => Some(EpochPhase::Evaluate),
            Self::Predict { .. } => Some(EpochPhase::Predict),
            Self::Score { .. } => Some(EpochPhase::Score),
            Self::Record { .. } => Some(EpochPhase::Record),
            Self::Done(_) => None,
        }
    }
}

/// Outcome of a full run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Epochs completed
    pub epochs: usize,
    /// Metrics of the last epoch
    pub last: Option<EpochMetrics>,
    /// Epoch with the highest MCC
    pub best: Option<EpochMetrics>,
    /// Submission rows written, if a prediction set was configured
    pub submission_rows: Option<usize>,
}

/// Drives a [`Classifier`] through warm-up, the epoch loop and prediction.
pub struct Driver<C: Classifier> {
    config: TrainConfig,
    model: C,
    history: MetricHistory,
    phase: Option<EpochPhase>,
}

impl<C: Classifier> Driver<C> {
    /// Create a driver; the run id is derived from the current time.
    #[must_use]
    pub fn new(config: TrainConfig, model: C) -> Self {
        let run_id = format!("run-{}", chrono::Utc::now().format("%Y%m%dT%H%M%S"));
        Self {
            config,
            model,
            history: MetricHistory::new(run_id),
            phase: None,
        }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// The model being trained.
    #[must_use]
    pub const fn model(&self) -> &C {
        &self.model
    }

    /// Consume the driver, returning the trained model.
    pub fn into_model(self) -> C {
        self.model
    }

    /// Metrics recorded so far.
    #[must_use]
    pub const fn history(&self) -> &MetricHistory {
        &self.history
    }

    /// Phase currently (or last) executed; `None` before the first epoch.
    #[must_use]
    pub const fn phase(&self) -> Option<EpochPhase> {
        self.phase
    }

    /// Path of the persisted metric history.
    #[must_use]
    pub fn history_path(&self) -> PathBuf {
        self.config.model_dir.join(HISTORY_FILE)
    }

    /// Build the pipelines and run every configured epoch.
    ///
    /// # Errors
    ///
    /// Returns pipeline construction errors, [`Error::MissingLabels`] if the
    /// evaluation set is unlabelled, and any model or scoring error. Plot and
    /// history write failures are logged and do not abort the run.
    pub fn run(&mut self) -> Result<RunSummary> {
        self.config.validate()?;

        let train = InputPipeline::new(&self.config.train_dir, self.config.batch_size)
            .train(true)
            .seed(self.config.shuffle_seed)
            .build()?;
        let eval = InputPipeline::new(&self.config.eval_dir, self.config.batch_size).build()?;

        self.run_with(&train, &eval)
    }

    /// Run every configured epoch over already-built datasets.
    ///
    /// # Errors
    ///
    /// See [`Driver::run`].
    pub fn run_with(&mut self, train: &Dataset, eval: &Dataset) -> Result<RunSummary> {
        info!(
            model = self.model.name(),
            train = train.len(),
            eval = eval.len(),
            epochs = self.config.num_epochs,
            "starting run {}",
            self.history.run().run_id()
        );
        self.history.run_mut().start();

        match self.run_inner(train, eval) {
            Ok(summary) => {
                self.history.run_mut().complete(RunStatus::Success);
                self.persist_history();
                Ok(summary)
            }
            Err(e) => {
                self.history.run_mut().complete(RunStatus::Failed);
                self.persist_history();
                Err(e)
            }
        }
    }

    fn run_inner(&mut self, train: &Dataset, eval: &Dataset) -> Result<RunSummary> {
        let labels = capture_labels(eval, self.config.label_batch_size)?;
        info!(samples = labels.len(), "captured evaluation labels");

        if self.config.warmup_steps > 0 {
            let warmup = train.with_repeat(Repeat::Forever);
            let pass = self.model.train(
                warmup
                    .batches_for_pass(WARMUP_PASS)
                    .take(self.config.warmup_steps),
            )?;
            info!(steps = pass.steps, loss = pass.mean_loss, "warm-up done");
        }

        for epoch in 0..self.config.num_epochs {
            self.run_epoch(epoch as u64, train, eval, &labels)?;
        }

        let submission_rows = match (&self.config.predict_dir, &self.config.submission_path) {
            (Some(dir), Some(path)) => Some(self.predict_submission(dir, path)?),
            _ => None,
        };

        Ok(RunSummary {
            epochs: self.history.len(),
            last: self.history.latest().cloned(),
            best: self.history.best_mcc().cloned(),
            submission_rows,
        })
    }

    /// Execute Train → Evaluate → Predict → Score → Record for one epoch.
    ///
    /// # Errors
    ///
    /// Model errors, a prediction/label count mismatch, or a failure to save
    /// the model state.
    pub fn run_epoch(
        &mut self,
        epoch: u64,
        train: &Dataset,
        eval: &Dataset,
        labels: &[u8],
    ) -> Result<EpochMetrics> {
        let _span = info_span!("epoch", epoch).entered();
        let mut state = EpochState::Train;

        loop {
            self.phase = state.phase().or(self.phase);
            if let Some(phase) = state.phase() {
                debug!(%phase, "enter");
            }
            state = match state {
                EpochState::Train => EpochState::Evaluate {
                    train: self.model.train(train.batches_for_pass(epoch))?,
                },
                EpochState::Evaluate { train } => EpochState::Predict {
                    train,
                    eval: self.model.evaluate(eval.batches())?,
                },
                EpochState::Predict { train, eval: metrics } => EpochState::Score {
                    train,
                    eval: metrics,
                    probs: self
                        .model
                        .predict(eval.batches())?
                        .into_iter()
                        .map(|p| p.probability)
                        .collect(),
                },
                EpochState::Score { train, eval, probs } => {
                    if probs.len() != labels.len() {
                        return Err(Error::ShapeMismatch {
                            expected: labels.len(),
                            actual: probs.len(),
                        });
                    }
                    EpochState::Record {
                        train,
                        eval,
                        mcc: print_metrics(labels, &probs, self.config.threshold)?,
                    }
                }
                EpochState::Record { train, eval, mcc } => {
                    let metrics = EpochMetrics::builder(epoch, eval.loss, eval.accuracy, mcc)
                        .train_loss(train.mean_loss)
                        .auc(eval.auc)
                        .build();
                    self.record(metrics.clone())?;
                    EpochState::Done(metrics)
                }
                EpochState::Done(metrics) => {
                    info!(
                        loss = metrics.loss(),
                        accuracy = metrics.accuracy(),
                        mcc = metrics.mcc(),
                        "epoch done"
                    );
                    return Ok(metrics);
                }
            };
        }
    }

    fn record(&mut self, metrics: EpochMetrics) -> Result<()> {
        self.history.push(metrics);
        self.persist_history();
        if let Err(e) = plot::save(&self.config.plot_path, &self.history) {
            warn!(path = %self.config.plot_path.display(), error = %e, "failed to write plot");
        }
        self.model.save(&self.config.model_dir)
    }

    fn persist_history(&self) {
        let path = self.history_path();
        if let Err(e) = self.history.save_json(&path) {
            warn!(path = %path.display(), error = %e, "failed to write metric history");
        }
    }

    fn predict_submission(&self, dir: &Path, path: &Path) -> Result<usize> {
        let predict = InputPipeline::new(dir, self.config.batch_size)
            .labels(LabelPolicy::Optional)
            .build()?;
        let predictions = self.model.predict(predict.batches())?;
        write_submission(path, &predictions, self.config.threshold)?;
        info!(path = %path.display(), rows = predictions.len(), "submission written");
        Ok(predictions.len())
    }
}

/// Labels of every evaluation sample, in pipeline order, read with large
/// batches.
///
/// # Errors
///
/// Returns [`Error::MissingLabels`] if any record lacks a label, or
/// [`Error::InvalidInput`] for a zero batch size.
pub fn capture_labels(eval: &Dataset, batch_size: usize) -> Result<Vec<u8>> {
    let single_pass = eval
        .with_batch_size(batch_size)?
        .with_repeat(Repeat::Times(1));
    let mut labels = Vec::with_capacity(eval.len());
    for batch in single_pass.batches() {
        labels.extend_from_slice(batch.labels().ok_or(Error::MissingLabels)?);
    }
    Ok(labels)
}

/// Write `signal_id,target,probability` rows, target thresholded at
/// `threshold`.
///
/// # Errors
///
/// Returns IO errors.
pub fn write_submission(path: &Path, predictions: &[Prediction], threshold: f32) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let probs: Vec<f32> = predictions.iter().map(|p| p.probability).collect();
    let targets = threshold_predictions(&probs, threshold);

    let mut writer = BufWriter::new(std::fs::File::create(path)?);
    writeln!(writer, "signal_id,target,probability")?;
    for (prediction, target) in predictions.iter().zip(targets) {
        writeln!(
            writer,
            "{},{},{:.6}",
            prediction.signal_id, target, prediction.probability
        )?;
    }
    writer.flush()?;
    Ok(())
}
