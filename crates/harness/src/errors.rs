use std::path::{Path, PathBuf};

use thiserror::Error;

/// A result type for sweep operations
pub type Result<T> = std::result::Result<T, SweepError>;

/// An error aborting a benchmark sweep
#[derive(Error, Debug)]
pub enum SweepError {
    /// When sweep bounds, precision or settings are invalid
    #[error("Invalid configuration: {0}")]
    ConfigurationError(String),
    /// When the configuration file cannot be parsed
    #[error("Invalid configuration file: {0}")]
    ConfigFileError(#[from] serde_json::Error),
    /// When a data file is missing, malformed or too short
    #[error("Data load error ({}): {reason}", .path.display())]
    DataLoadError {
        /// Data file being read
        path: PathBuf,
        /// What went wrong
        reason: String,
    },
    /// When training, optimization or prediction fails numerically
    #[error("Model failure: {0}")]
    ModelFailure(String),
    /// When the GP library reports an error
    #[error(transparent)]
    GpError(#[from] egobox_gp::GpError),
    /// When the output stream cannot be opened or written
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    /// When a csv row cannot be written
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}

impl SweepError {
    pub(crate) fn data_load(path: &Path, reason: impl ToString) -> Self {
        SweepError::DataLoadError {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}
