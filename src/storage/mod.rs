//! Record store backend (Arrow/Parquet)
//!
//! **Append-Only Design**:
//! - A record directory is a flat folder of `.parquet` files
//! - Files are read in lexicographic order so pipeline output is reproducible
//!   across platforms (directory listing order is not)
//! - Writes are whole-file (fixtures, converters); rows are never updated in place
//!
//! Poka-Yoke: decoding validates every row before a pipeline is built; a single
//! malformed record aborts loading of the whole directory.

use crate::record::{decode_batch, encode_records, record_schema, ExampleRecord, LabelPolicy};
use crate::{Error, Result};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File extension recognised as a record container
pub const RECORD_EXTENSION: &str = "parquet";

/// Rows per Parquet row group when writing records (~12MB of signal data)
const ROWS_PER_ROW_GROUP: usize = 64;

/// Storage engine for record files
pub struct RecordStore {
    batches: Vec<SourcedBatch>,
}

/// A record batch tagged with the file it was read from
struct SourcedBatch {
    source: String,
    batch: RecordBatch,
}

impl RecordStore {
    /// Create a new store from existing batches
    ///
    /// Useful for testing and benchmarking
    #[must_use]
    pub fn new(batches: Vec<RecordBatch>) -> Self {
        Self {
            batches: batches
                .into_iter()
                .map(|batch| SourcedBatch {
                    source: "<memory>".to_string(),
                    batch,
                })
                .collect(),
        }
    }

    /// Load every record file in `dir`
    ///
    /// # Errors
    /// Returns [`Error::EmptyDirectory`] if the directory has no record files,
    /// or an error if any file cannot be read or parsed
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let files = discover_record_files(dir)?;
        if files.is_empty() {
            return Err(Error::EmptyDirectory(dir.to_path_buf()));
        }

        let mut store = Self { batches: Vec::new() };
        for file in &files {
            store.extend_from_parquet(file)?;
        }
        debug!(
            dir = %dir.display(),
            files = files.len(),
            rows = store.num_rows(),
            "loaded record directory"
        );
        Ok(store)
    }

    /// Load records from a single Parquet file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load_parquet<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut store = Self { batches: Vec::new() };
        store.extend_from_parquet(path.as_ref())?;
        Ok(store)
    }

    fn extend_from_parquet(&mut self, path: &Path) -> Result<()> {
        let source = path.display().to_string();

        let file = File::open(path)
            .map_err(|e| Error::Storage(format!("Failed to open Parquet file {source}: {e}")))?;

        let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| {
            Error::Storage(format!("Failed to parse Parquet file {source}: {e}"))
        })?;

        let reader = builder.build().map_err(|e| {
            Error::Storage(format!("Failed to create Parquet reader for {source}: {e}"))
        })?;

        for batch in reader {
            let batch = batch.map_err(|e| {
                Error::Storage(format!("Failed to read record batch from {source}: {e}"))
            })?;
            self.batches.push(SourcedBatch {
                source: source.clone(),
                batch,
            });
        }

        Ok(())
    }

    /// Get all record batches
    pub fn batches(&self) -> impl Iterator<Item = &RecordBatch> {
        self.batches.iter().map(|b| &b.batch)
    }

    /// Total number of rows across all batches
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.batch.num_rows()).sum()
    }

    /// Append a batch to the store
    ///
    /// # Errors
    ///
    /// Returns error if batch schema doesn't match existing batches
    pub fn append_batch(&mut self, batch: RecordBatch) -> Result<()> {
        if let Some(first) = self.batches.first() {
            let existing_schema = first.batch.schema();
            if batch.schema() != existing_schema {
                return Err(Error::Storage(format!(
                    "Schema mismatch: expected {:?}, got {:?}",
                    existing_schema,
                    batch.schema()
                )));
            }
        }

        self.batches.push(SourcedBatch {
            source: "<memory>".to_string(),
            batch,
        });
        Ok(())
    }

    /// Decode every row into [`ExampleRecord`]s, in file then row order
    ///
    /// # Errors
    /// Returns the first decode error; no partial result is produced
    pub fn decode(&self, policy: LabelPolicy) -> Result<Vec<ExampleRecord>> {
        let mut records = Vec::with_capacity(self.num_rows());
        for sourced in &self.batches {
            records.extend(decode_batch(&sourced.batch, policy, &sourced.source)?);
        }
        Ok(records)
    }
}

/// List record files in `dir`, sorted by file name
///
/// # Errors
/// Returns error if the directory cannot be read
pub fn discover_record_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let entries = std::fs::read_dir(dir).map_err(|e| {
        Error::Storage(format!("Failed to read record directory {}: {e}", dir.display()))
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_record = path.is_file()
            && path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(RECORD_EXTENSION));
        if is_record {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Write records to a Parquet file using the canonical record schema
///
/// # Errors
/// Returns error if the file cannot be created or written
pub fn write_records<P: AsRef<Path>>(path: P, records: &[ExampleRecord]) -> Result<()> {
    let batch = encode_records(records)?;
    let file = File::create(path.as_ref())?;
    let props = WriterProperties::builder()
        .set_max_row_group_size(ROWS_PER_ROW_GROUP)
        .build();
    let mut writer = ArrowWriter::try_new(file, record_schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}
