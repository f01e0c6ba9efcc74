//! Error types for discharge-net
//!
//! Clear error messages with actionable guidance: every decode failure names
//! the file and row it came from.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// discharge-net error types
#[derive(Error, Debug)]
pub enum Error {
    /// Record field missing, null, or of the wrong type
    #[error("Record decode error: {0}")]
    Decode(String),

    /// Signal length (or cropped shape) differs from the fixed layout
    #[error("Shape mismatch: expected {expected} values, got {actual}")]
    ShapeMismatch {
        /// Expected element count
        expected: usize,
        /// Actual element count
        actual: usize,
    },

    /// Confusion matrix has an empty row or column sum (MCC denominator is zero)
    #[error("Degenerate metric: {0}")]
    DegenerateMetric(String),

    /// Record directory holds no record files (or no rows)
    #[error("No records found in {}", .0.display())]
    EmptyDirectory(PathBuf),

    /// Labels were required but the batch carries none
    #[error("Batch has no labels\nTrain and evaluate pipelines need a `label` column")]
    MissingLabels,

    /// Invalid argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration rejected by validation
    #[error("Config error: {0}")]
    Config(String),

    /// Tensor backend failure (checkpoint record, tensor readback)
    #[error("Model error: {0}")]
    Model(String),

    /// Storage error (Parquet/Arrow file handling)
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// JSON (config, history, model state) error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
