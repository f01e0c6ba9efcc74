//! Training run tracking
//!
//! ## Schema Overview
//!
//! ```text
//! RunRecord (1) ──< EpochMetrics (N) [append-only, ordered by epoch]
//! ```
//!
//! A [`MetricHistory`] is owned by the driver and passed to the plotter; no
//! process-wide state accumulates across epochs.
//!
//! ## Usage
//!
//! ```rust
//! use discharge_net::tracking::{EpochMetrics, MetricHistory, RunStatus};
//!
//! let mut history = MetricHistory::new("run-001");
//! history.run_mut().start();
//!
//! history.push(EpochMetrics::new(0, 0.69, 0.51, 0.0));
//! history.push(EpochMetrics::new(1, 0.52, 0.74, 0.31));
//!
//! assert_eq!(history.series("mcc"), vec![0.0, 0.31]);
//! history.run_mut().complete(RunStatus::Success);
//! ```

mod epoch_metrics;
mod history;
mod run_record;

pub use epoch_metrics::{EpochMetrics, EpochMetricsBuilder};
pub use history::MetricHistory;
pub use run_record::{RunRecord, RunStatus};
