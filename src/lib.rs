//! # vdw-crunch: Van der Waerden trial analysis
//!
//! Turns raw trial counts from a search for two-colorings without
//! monochromatic arithmetic progressions into curve fits, then fits curves
//! across keys to estimate the Van der Waerden numbers `W(2, k)`.
//!
//! ## Pipeline
//!
//! - [`trial`]: read `(key, n, attempts, successes)` records from a
//!   directory tree or a Parquet table
//! - [`rate`]: aggregate one key into a success-rate series and `V`, the
//!   first size where every attempt succeeded
//! - [`fit`]: Levenberg-Marquardt least squares over a family of models
//! - [`meta`]: one JSON fit record per key; reruns skip existing records
//! - [`analysis`]: second-stage fits across keys
//!
//! [`pipeline::Pipeline`] wires the first four together.
//!
//! ## Example
//!
//! ```rust,no_run
//! use vdw_crunch::config::PipelineConfig;
//! use vdw_crunch::meta::JsonDirStore;
//! use vdw_crunch::pipeline::Pipeline;
//! use vdw_crunch::predicate::{KeyFilter, KeyPredicate};
//! use vdw_crunch::trial::DirectoryTrialSource;
//!
//! let pipeline = Pipeline::new(
//!     DirectoryTrialSource::new("data"),
//!     JsonDirStore::open("crunched")?,
//!     PipelineConfig::default(),
//! );
//! let filter = KeyFilter::all().with_predicate(KeyPredicate::parse("p > 100")?);
//! let summary = pipeline.run(&filter)?;
//! println!("{} records written", summary.written.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod analysis;
pub mod config;
pub mod error;
pub mod fit;
pub mod key;
pub mod meta;
pub mod pipeline;
pub mod predicate;
pub mod rate;
pub mod report;
pub mod trial;

pub use error::{Error, Result};
