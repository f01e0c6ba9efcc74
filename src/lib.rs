//! # discharge-net: Partial Discharge Classifier Training
//!
//! Trains and scores a binary classifier that detects partial discharge in
//! short-time Fourier transformed power-line signals.
//!
//! ## Pipeline
//!
//! - **Record store**: directories of Parquet files, one row per signal
//!   ([`storage`], [`record`])
//! - **Input pipeline**: decode, normalize to 240×200, shuffle, batch, repeat
//!   ([`pipeline`], [`transform`])
//! - **Classifier**: [`model::Classifier`] boundary; [`model::ConvClassifier`]
//!   trains the convolutional network on `burn` (NdArray backend, SGD)
//! - **Driver**: per-epoch Train → Evaluate → Predict → Score → Record
//!   ([`driver`])
//! - **Scoring**: confusion matrix, accuracy, Matthews correlation
//!   ([`scoring`]), metric history ([`tracking`]) and learning-curve plot
//!   ([`plot`])
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use discharge_net::config::TrainConfig;
//! use discharge_net::driver::Driver;
//! use discharge_net::model::{ConvClassifier, ConvNetSpec, TrainBackend};
//!
//! let config = TrainConfig::builder()
//!     .train_dir("data/train")
//!     .eval_dir("data/eval")
//!     .num_epochs(5)
//!     .build()?;
//! let model = ConvClassifier::<TrainBackend>::load_or_new(
//!     &config.model_dir,
//!     ConvNetSpec::default(),
//!     config.learning_rate,
//!     Default::default(),
//! )?;
//!
//! let summary = Driver::new(config, model).run()?;
//! println!("best epoch: {:?}", summary.best);
//! # Ok::<(), discharge_net::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod driver;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod plot;
pub mod record;
pub mod scoring;
pub mod storage;
pub mod tracking;
pub mod transform;

pub use error::{Error, Result};
