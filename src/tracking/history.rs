//! Metric History - append-only epoch log used for plotting

use super::{EpochMetrics, RunRecord};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Ordered, append-only sequence of [`EpochMetrics`] for one run.
///
/// ## Time-Series Queries
///
/// [`MetricHistory::series`] returns one value per recorded epoch, in epoch
/// order, ready to be drawn as a curve.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricHistory {
    run: RunRecord,
    epochs: Vec<EpochMetrics>,
}

impl MetricHistory {
    /// Create an empty history for a new run.
    #[must_use]
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run: RunRecord::new(run_id),
            epochs: Vec::new(),
        }
    }

    /// The run this history belongs to.
    #[must_use]
    pub const fn run(&self) -> &RunRecord {
        &self.run
    }

    /// Mutable access to the run lifecycle.
    pub fn run_mut(&mut self) -> &mut RunRecord {
        &mut self.run
    }

    /// Append an epoch.
    pub fn push(&mut self, metrics: EpochMetrics) {
        self.epochs.push(metrics);
    }

    /// All recorded epochs, oldest first.
    #[must_use]
    pub fn epochs(&self) -> &[EpochMetrics] {
        &self.epochs
    }

    /// Number of recorded epochs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    /// True if no epoch has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    /// Most recent epoch.
    #[must_use]
    pub fn latest(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }

    /// Values of one metric across epochs; epochs lacking it are skipped.
    #[must_use]
    pub fn series(&self, key: &str) -> Vec<f64> {
        self.epochs.iter().filter_map(|m| m.get(key)).collect()
    }

    /// Epoch with the highest MCC.
    #[must_use]
    pub fn best_mcc(&self) -> Option<&EpochMetrics> {
        self.epochs
            .iter()
            .max_by(|a, b| a.mcc().total_cmp(&b.mcc()))
    }

    /// Write the history as pretty JSON (temporary file, then rename).
    ///
    /// # Errors
    ///
    /// Returns IO or serialization errors.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Read a history written by [`MetricHistory::save_json`].
    ///
    /// # Errors
    ///
    /// Returns IO or deserialization errors.
    pub fn load_json(path: &Path) -> Result<Self> {
        Ok(serde_json::from_slice(&std::fs::read(path)?)?)
    }
}
