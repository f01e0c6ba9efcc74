//! Input pipeline: record directory → normalized, batched, repeated samples
//!
//! ```text
//! *.parquet (sorted) ─decode─> records ─[shuffle(2×batch)]─> batch ─> repeat
//!                                                              │
//!                                                   normalize on demand
//! ```
//!
//! Records are decoded eagerly when the pipeline is built, so a malformed
//! record fails construction instead of surfacing mid-epoch. Normalization is
//! lazy: each [`Batch`] is produced when the iterator is advanced.
//!
//! Memory: a [`Dataset`] keeps every decoded signal resident, 50 000 `f32`
//! values (about 200 KB) per record, so a directory of `n` records costs
//! roughly `n × 200 KB` for as long as the dataset lives (about 1.7 GB for
//! the 8 712 training signals). Only the batch being consumed holds
//! normalized data on top of that.
//!
//! ## Example
//!
//! ```rust,no_run
//! use discharge_net::pipeline::{InputPipeline, Repeat};
//!
//! let train = InputPipeline::new("data/train", 40)
//!     .train(true)
//!     .repeat(Repeat::Times(1))
//!     .build()?;
//!
//! for batch in train.batches() {
//!     println!("{} samples", batch.len());
//! }
//! # Ok::<(), discharge_net::Error>(())
//! ```

mod batch;
mod shuffle;

pub use batch::Batch;
pub use shuffle::ShuffleBuffer;

use crate::record::{ExampleRecord, LabelPolicy};
use crate::storage::RecordStore;
use crate::transform::NormalizedSample;
use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// How many times the record sequence is replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    /// Replay a fixed number of passes.
    Times(usize),
    /// Replay until the consumer stops (bound it with `Iterator::take`).
    Forever,
}

/// Builder for a [`Dataset`] read from a record directory.
#[derive(Debug, Clone)]
pub struct InputPipeline {
    dir: PathBuf,
    batch_size: usize,
    train: bool,
    repeat: Repeat,
    seed: u64,
    labels: LabelPolicy,
}

impl InputPipeline {
    /// Evaluation-style pipeline: no shuffling, one pass, labels required.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, batch_size: usize) -> Self {
        Self {
            dir: dir.into(),
            batch_size,
            train: false,
            repeat: Repeat::Times(1),
            seed: 0,
            labels: LabelPolicy::Required,
        }
    }

    /// Enable training mode (bounded shuffle before batching).
    #[must_use]
    pub const fn train(mut self, train: bool) -> Self {
        self.train = train;
        self
    }

    /// Set the repeat count.
    #[must_use]
    pub const fn repeat(mut self, repeat: Repeat) -> Self {
        self.repeat = repeat;
        self
    }

    /// Seed for the shuffle RNG.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Whether records must carry labels.
    #[must_use]
    pub const fn labels(mut self, labels: LabelPolicy) -> Self {
        self.labels = labels;
        self
    }

    /// Read and decode the directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a zero batch size,
    /// [`Error::EmptyDirectory`] if the directory has no records, and any
    /// storage or decode error from the record files.
    pub fn build(self) -> Result<Dataset> {
        if self.batch_size == 0 {
            return Err(Error::InvalidInput("batch size must be > 0".to_string()));
        }
        let records = RecordStore::load_dir(&self.dir)?.decode(self.labels)?;
        if records.is_empty() {
            return Err(Error::EmptyDirectory(self.dir));
        }
        let dataset = Dataset {
            records: records.into(),
            batch_size: self.batch_size,
            train: self.train,
            repeat: self.repeat,
            seed: self.seed,
        };
        info!(
            dir = %self.dir.display(),
            records = dataset.len(),
            resident_mb = dataset.resident_bytes() / (1024 * 1024),
            batch_size = self.batch_size,
            train = self.train,
            "input pipeline ready"
        );
        Ok(dataset)
    }
}

/// Decoded records plus batching settings. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Dataset {
    records: Arc<[ExampleRecord]>,
    batch_size: usize,
    train: bool,
    repeat: Repeat,
    seed: u64,
}

impl Dataset {
    /// Build a dataset from in-memory records (evaluation-style settings).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a zero batch size.
    pub fn from_records(records: Vec<ExampleRecord>, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidInput("batch size must be > 0".to_string()));
        }
        Ok(Self {
            records: records.into(),
            batch_size,
            train: false,
            repeat: Repeat::Times(1),
            seed: 0,
        })
    }

    /// Same records, different batch size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a zero batch size.
    pub fn with_batch_size(&self, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidInput("batch size must be > 0".to_string()));
        }
        Ok(Self {
            batch_size,
            ..self.clone()
        })
    }

    /// Same records, different repeat count.
    #[must_use]
    pub fn with_repeat(&self, repeat: Repeat) -> Self {
        Self {
            repeat,
            ..self.clone()
        }
    }

    /// Same records, training mode toggled.
    #[must_use]
    pub fn with_train(&self, train: bool) -> Self {
        Self {
            train,
            ..self.clone()
        }
    }

    /// Same records, different shuffle seed.
    #[must_use]
    pub fn with_seed(&self, seed: u64) -> Self {
        Self {
            seed,
            ..self.clone()
        }
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Bytes of raw signal held in memory by the decoded records.
    #[must_use]
    pub fn resident_bytes(&self) -> usize {
        self.records
            .iter()
            .map(|r| std::mem::size_of_val(r.signal()))
            .sum()
    }

    /// Configured batch size.
    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Batches per pass, counting the short final batch.
    #[must_use]
    pub fn batches_per_pass(&self) -> usize {
        self.records.len().div_ceil(self.batch_size)
    }

    /// Decoded records in storage order.
    #[must_use]
    pub fn records(&self) -> &[ExampleRecord] {
        &self.records
    }

    /// Iterate batches from the start (pass 0 shuffle stream).
    #[must_use]
    pub fn batches(&self) -> Batches<'_> {
        self.batches_for_pass(0)
    }

    /// Iterate batches with the shuffle stream of `pass`.
    ///
    /// Each call restarts from the first record; distinct `pass` values give
    /// distinct but reproducible shuffles in training mode.
    #[must_use]
    pub fn batches_for_pass(&self, pass: u64) -> Batches<'_> {
        let n = self.records.len();
        let order = if self.train {
            let rng = StdRng::seed_from_u64(self.seed ^ pass.wrapping_mul(0x9E37_79B9_7F4A_7C15));
            IndexOrder::Shuffled(ShuffleBuffer::new(0..n, self.batch_size * 2, rng))
        } else {
            IndexOrder::Sequential(0..n)
        };
        let remaining_passes = match self.repeat {
            Repeat::Times(0) => {
                return Batches {
                    records: &self.records,
                    batch_size: self.batch_size,
                    order: IndexOrder::Sequential(0..0),
                    remaining_passes: Some(0),
                }
            }
            Repeat::Times(times) => Some(times - 1),
            Repeat::Forever => None,
        };

        Batches {
            records: &self.records,
            batch_size: self.batch_size,
            order,
            remaining_passes,
        }
    }
}

enum IndexOrder {
    Sequential(Range<usize>),
    Shuffled(ShuffleBuffer<Range<usize>, StdRng>),
}

impl IndexOrder {
    fn next(&mut self) -> Option<usize> {
        match self {
            Self::Sequential(range) => range.next(),
            Self::Shuffled(buffer) => buffer.next(),
        }
    }

    fn restart(&mut self, n: usize) {
        match self {
            Self::Sequential(range) => *range = 0..n,
            Self::Shuffled(buffer) => buffer.restart(0..n),
        }
    }
}

/// Lazy batch iterator over a [`Dataset`].
///
/// The last batch of every pass may be shorter than the batch size; it is
/// neither dropped nor padded.
pub struct Batches<'a> {
    records: &'a [ExampleRecord],
    batch_size: usize,
    order: IndexOrder,
    remaining_passes: Option<usize>,
}

impl Batches<'_> {
    fn take_indices(&mut self) -> Vec<usize> {
        let mut indices = Vec::with_capacity(self.batch_size);
        while indices.len() < self.batch_size {
            match self.order.next() {
                Some(i) => indices.push(i),
                None => break,
            }
        }
        indices
    }

    fn start_next_pass(&mut self) -> bool {
        match &mut self.remaining_passes {
            Some(0) => return false,
            Some(n) => *n -= 1,
            None => {}
        }
        self.order.restart(self.records.len());
        true
    }

    fn assemble(&self, indices: &[usize]) -> Batch {
        #[cfg(feature = "rayon")]
        let samples: Vec<NormalizedSample> = {
            use rayon::prelude::*;
            indices
                .par_iter()
                .map(|&i| NormalizedSample::from_record(&self.records[i]))
                .collect()
        };
        #[cfg(not(feature = "rayon"))]
        let samples: Vec<NormalizedSample> = indices
            .iter()
            .map(|&i| NormalizedSample::from_record(&self.records[i]))
            .collect();

        Batch::from_samples(samples)
    }
}

impl Iterator for Batches<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Self::Item> {
        if self.records.is_empty() {
            return None;
        }
        loop {
            let indices = self.take_indices();
            if !indices.is_empty() {
                return Some(self.assemble(&indices));
            }
            if !self.start_next_pass() {
                return None;
            }
        }
    }
}
