//! Example records - one SFFT sensor measurement per row
//!
//! Record layout (one Parquet row per record):
//!
//! | column           | type                          | notes                    |
//! |------------------|-------------------------------|--------------------------|
//! | `signal`         | `FixedSizeList<Float32, 50000>` or `List<Float32>` | 250×200 SFFT magnitudes |
//! | `signal_ID`      | `Int64`                       | phase signal identifier  |
//! | `measurement_ID` | `Int64`                       | measurement identifier   |
//! | `label`          | `Int64` (nullable)            | 0/1, absent for predict  |
//!
//! Poka-Yoke: an [`ExampleRecord`] can only be built through
//! [`ExampleRecord::new`], so every record in memory has exactly
//! [`SIGNAL_LEN`] values and a binary label.

use crate::{Error, Result};
use arrow::array::{
    Array, ArrayRef, AsArray, FixedSizeListArray, Float32Array, Int64Array, ListArray,
    PrimitiveArray, RecordBatch,
};
use arrow::datatypes::{DataType, Field, Float32Type, Int64Type, Schema, SchemaRef};
use std::sync::Arc;

/// Number of raw values per record (250 frequency rows × 200 time columns)
pub const SIGNAL_LEN: usize = 50_000;

/// Raw signal column
pub const SIGNAL_COLUMN: &str = "signal";
/// Signal identifier column
pub const SIGNAL_ID_COLUMN: &str = "signal_ID";
/// Measurement identifier column
pub const MEASUREMENT_ID_COLUMN: &str = "measurement_ID";
/// Binary label column
pub const LABEL_COLUMN: &str = "label";

/// Whether the `label` column must be present in a record directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelPolicy {
    /// Train and evaluate directories: every row must carry a 0/1 label.
    Required,
    /// Prediction directories: the column may be missing or null.
    Optional,
}

/// One decoded sensor measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct ExampleRecord {
    signal: Vec<f32>,
    signal_id: i64,
    measurement_id: i64,
    label: Option<u8>,
}

impl ExampleRecord {
    /// Create a record, validating the signal length and label range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] if `signal` does not hold exactly
    /// [`SIGNAL_LEN`] values, or [`Error::Decode`] if `label` is not 0 or 1.
    pub fn new(
        signal: Vec<f32>,
        signal_id: i64,
        measurement_id: i64,
        label: Option<i64>,
    ) -> Result<Self> {
        if signal.len() != SIGNAL_LEN {
            return Err(Error::ShapeMismatch {
                expected: SIGNAL_LEN,
                actual: signal.len(),
            });
        }
        let label = match label {
            None => None,
            Some(0) => Some(0),
            Some(1) => Some(1),
            Some(other) => {
                return Err(Error::Decode(format!(
                    "label for signal {signal_id} must be 0 or 1, got {other}"
                )))
            }
        };
        Ok(Self {
            signal,
            signal_id,
            measurement_id,
            label,
        })
    }

    /// Raw signal values (row-major 250×200).
    #[must_use]
    pub fn signal(&self) -> &[f32] {
        &self.signal
    }

    /// Signal identifier.
    #[must_use]
    pub const fn signal_id(&self) -> i64 {
        self.signal_id
    }

    /// Measurement identifier.
    #[must_use]
    pub const fn measurement_id(&self) -> i64 {
        self.measurement_id
    }

    /// Binary label, if the record has one.
    #[must_use]
    pub const fn label(&self) -> Option<u8> {
        self.label
    }
}

/// Arrow schema used when writing records.
#[must_use]
pub fn record_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(SIGNAL_COLUMN, signal_data_type(), false),
        Field::new(SIGNAL_ID_COLUMN, DataType::Int64, false),
        Field::new(MEASUREMENT_ID_COLUMN, DataType::Int64, false),
        Field::new(LABEL_COLUMN, DataType::Int64, true),
    ]))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn signal_data_type() -> DataType {
    DataType::FixedSizeList(
        Arc::new(Field::new("item", DataType::Float32, false)),
        SIGNAL_LEN as i32,
    )
}

/// Encode records into a single Arrow batch with [`record_schema`].
///
/// # Errors
///
/// Returns error if Arrow rejects the assembled columns.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub fn encode_records(records: &[ExampleRecord]) -> Result<RecordBatch> {
    let flat: Vec<f32> = records
        .iter()
        .flat_map(|r| r.signal.iter().copied())
        .collect();
    let signal = FixedSizeListArray::try_new(
        Arc::new(Field::new("item", DataType::Float32, false)),
        SIGNAL_LEN as i32,
        Arc::new(Float32Array::from(flat)),
        None,
    )?;
    let signal_ids = Int64Array::from_iter_values(records.iter().map(ExampleRecord::signal_id));
    let measurement_ids =
        Int64Array::from_iter_values(records.iter().map(ExampleRecord::measurement_id));
    let labels: Int64Array = records
        .iter()
        .map(|r| r.label.map(i64::from))
        .collect();

    Ok(RecordBatch::try_new(
        record_schema(),
        vec![
            Arc::new(signal),
            Arc::new(signal_ids),
            Arc::new(measurement_ids),
            Arc::new(labels),
        ],
    )?)
}

/// Signal column, either fixed-size or variable-size list of `f32`.
enum SignalColumn<'a> {
    Fixed(&'a FixedSizeListArray),
    Variable(&'a ListArray),
}

impl SignalColumn<'_> {
    fn row(&self, row: usize) -> ArrayRef {
        match self {
            Self::Fixed(array) => array.value(row),
            Self::Variable(array) => array.value(row),
        }
    }

    fn is_null(&self, row: usize) -> bool {
        match self {
            Self::Fixed(array) => array.is_null(row),
            Self::Variable(array) => array.is_null(row),
        }
    }
}

/// Decode every row of `batch` into records.
///
/// `source` names the originating file in error messages.
///
/// # Errors
///
/// Returns [`Error::Decode`] for missing columns, wrong column types, null
/// values or labels outside {0,1}, and [`Error::ShapeMismatch`] for signals
/// that do not hold [`SIGNAL_LEN`] values.
pub fn decode_batch(
    batch: &RecordBatch,
    policy: LabelPolicy,
    source: &str,
) -> Result<Vec<ExampleRecord>> {
    let signal = signal_column(batch, source)?;
    let signal_ids = int64_column(batch, SIGNAL_ID_COLUMN, source)?
        .ok_or_else(|| missing_column(SIGNAL_ID_COLUMN, source))?;
    let measurement_ids = int64_column(batch, MEASUREMENT_ID_COLUMN, source)?
        .ok_or_else(|| missing_column(MEASUREMENT_ID_COLUMN, source))?;
    let labels = int64_column(batch, LABEL_COLUMN, source)?;
    if labels.is_none() && policy == LabelPolicy::Required {
        return Err(missing_column(LABEL_COLUMN, source));
    }

    let mut records = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        if signal.is_null(row) || signal_ids.is_null(row) || measurement_ids.is_null(row) {
            return Err(Error::Decode(format!("{source}: row {row} has null fields")));
        }

        let values = signal.row(row);
        let values = values.as_primitive_opt::<Float32Type>().ok_or_else(|| {
            Error::Decode(format!(
                "{source}: `{SIGNAL_COLUMN}` items must be Float32, got {}",
                values.data_type()
            ))
        })?;
        if values.null_count() > 0 {
            return Err(Error::Decode(format!(
                "{source}: row {row} signal contains nulls"
            )));
        }

        let label = match labels {
            Some(labels) if !labels.is_null(row) => Some(labels.value(row)),
            Some(_) | None if policy == LabelPolicy::Optional => None,
            _ => {
                return Err(Error::Decode(format!(
                    "{source}: row {row} is missing its label"
                )))
            }
        };

        let record = ExampleRecord::new(
            values.values().to_vec(),
            signal_ids.value(row),
            measurement_ids.value(row),
            label,
        )
        .map_err(|e| match e {
            Error::Decode(msg) => Error::Decode(format!("{source}: row {row}: {msg}")),
            other => other,
        })?;
        records.push(record);
    }

    Ok(records)
}

fn missing_column(name: &str, source: &str) -> Error {
    Error::Decode(format!("{source}: missing column `{name}`"))
}

fn signal_column<'a>(batch: &'a RecordBatch, source: &str) -> Result<SignalColumn<'a>> {
    let column = batch
        .column_by_name(SIGNAL_COLUMN)
        .ok_or_else(|| missing_column(SIGNAL_COLUMN, source))?;

    if let Some(array) = column.as_fixed_size_list_opt() {
        return Ok(SignalColumn::Fixed(array));
    }
    if let Some(array) = column.as_list_opt::<i32>() {
        return Ok(SignalColumn::Variable(array));
    }
    Err(Error::Decode(format!(
        "{source}: `{SIGNAL_COLUMN}` must be a list of Float32, got {}",
        column.data_type()
    )))
}

fn int64_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
    source: &str,
) -> Result<Option<&'a PrimitiveArray<Int64Type>>> {
    let Some(column) = batch.column_by_name(name) else {
        return Ok(None);
    };
    column.as_primitive_opt::<Int64Type>().map(Some).ok_or_else(|| {
        Error::Decode(format!(
            "{source}: `{name}` must be Int64, got {}",
            column.data_type()
        ))
    })
}
