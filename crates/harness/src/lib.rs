//! This library runs benchmark sweeps of [Gaussian Process](https://en.wikipedia.org/wiki/Gaussian_process)
//! regression over increasing training set sizes.
//!
//! For every training size of the sweep and every repetition, a trial loads its data,
//! trains a Kriging model (see [egobox_gp]) from fixed initial hyperparameters, tunes
//! the hyperparameters, predicts test outputs and scores the prediction. Durations of
//! the training, optimization and prediction stages as well as the prediction error
//! are appended as one csv row per trial.
//!
//! The sweep is described by a [RunConfiguration], the numerical work is done by a
//! [GpPipeline] (implemented by [KrigingPipeline]) and rows go to a [TrialSink]
//! (implemented by [CsvReport]).
//!
//! # Example
//!
//! ```no_run
//! use gpsweep_harness::{execute, logging, RunConfiguration};
//!
//! let config = RunConfiguration::from_file("config.json").expect("valid configuration");
//! let session = logging::init(config.output()).expect("log file");
//! let summary = execute(&config).expect("sweep");
//! println!("{} trials", summary.n_trials);
//! session.finish();
//! ```
#![warn(rustdoc::broken_intra_doc_links)]
mod config;
mod data;
mod driver;
mod errors;
mod kriging;
pub mod logging;
mod pipeline;
mod report;
mod runner;

pub use config::*;
pub use data::*;
pub use driver::*;
pub use errors::*;
pub use kriging::*;
pub use pipeline::*;
pub use report::*;
pub use runner::*;
