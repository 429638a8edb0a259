//! Sweep configuration.
//!
//! A [`RunConfiguration`] is read once from a JSON file whose keys follow the
//! benchmark conventions (`N_CORES`, `START`, `END`, `STEP`, `N_TEST`, `N_REG`,
//! `LOOP`, `PRECISION` and the four data file paths) and is never mutated
//! afterwards. Optional `optimizer` and `output` sections tune the hyperparameter
//! optimization and the output files.
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SweepError};

/// Floating point precision used by the numerical backend
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Precision {
    /// Single precision (`"float32"`)
    Float32,
    /// Double precision (`"float64"`)
    #[default]
    Float64,
}

impl From<Precision> for String {
    fn from(item: Precision) -> String {
        item.to_string()
    }
}

impl TryFrom<String> for Precision {
    type Error = String;
    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        match s.as_str() {
            "float32" => Ok(Precision::Float32),
            "float64" => Ok(Precision::Float64),
            other => Err(format!(
                "Bad precision value '{other}', should be 'float32' or 'float64'"
            )),
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Precision::Float32 => write!(f, "float32"),
            Precision::Float64 => write!(f, "float64"),
        }
    }
}

/// Locations of the training and test data files
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPaths {
    /// Training input series
    pub train_in_file: PathBuf,
    /// Training output series
    pub train_out_file: PathBuf,
    /// Test input series
    pub test_in_file: PathBuf,
    /// Test output series
    pub test_out_file: PathBuf,
}

impl Default for DataPaths {
    fn default() -> Self {
        DataPaths {
            train_in_file: PathBuf::from("data/training/training_input.txt"),
            train_out_file: PathBuf::from("data/training/training_output.txt"),
            test_in_file: PathBuf::from("data/test/test_input.txt"),
            test_out_file: PathBuf::from("data/test/test_output.txt"),
        }
    }
}

/// Which kernel hyperparameters are tuned by the optimization step.
/// The kernel variance is always estimated in closed form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Trainable {
    /// Tune the lengthscale
    pub lengthscale: bool,
    /// Tune the noise variance
    pub noise_variance: bool,
}

impl Default for Trainable {
    fn default() -> Self {
        Trainable {
            lengthscale: true,
            noise_variance: true,
        }
    }
}

/// Hyperparameter optimization settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerSettings {
    /// Number of additional starting points (spread with LHS) besides the current hyperparameters
    pub(crate) n_start: usize,
    /// Max number of likelihood evaluations per start
    pub(crate) max_eval: usize,
    /// Hyperparameters subject to optimization
    pub(crate) trainable: Trainable,
    /// Search interval for the lengthscale
    pub(crate) lengthscale_bounds: (f64, f64),
    /// Search interval for the noise variance
    pub(crate) noise_bounds: (f64, f64),
    /// Seed of the starting points design
    pub(crate) seed: u64,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        OptimizerSettings {
            n_start: 5,
            max_eval: 200,
            trainable: Trainable::default(),
            lengthscale_bounds: (1e-2, 1e2),
            noise_bounds: (1e-6, 1.),
            seed: 42,
        }
    }
}

impl OptimizerSettings {
    /// Sets the number of additional optimization starts
    pub fn n_start(mut self, n_start: usize) -> Self {
        self.n_start = n_start;
        self
    }

    /// Sets the max number of likelihood evaluations per start
    pub fn max_eval(mut self, max_eval: usize) -> Self {
        self.max_eval = max_eval;
        self
    }

    /// Sets which hyperparameters are tuned
    pub fn trainable(mut self, trainable: Trainable) -> Self {
        self.trainable = trainable;
        self
    }

    /// Sets the lengthscale search interval
    pub fn lengthscale_bounds(mut self, bounds: (f64, f64)) -> Self {
        self.lengthscale_bounds = bounds;
        self
    }

    /// Sets the noise variance search interval
    pub fn noise_bounds(mut self, bounds: (f64, f64)) -> Self {
        self.noise_bounds = bounds;
        self
    }

    /// Sets the seed of the starting points design
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Number of additional optimization starts
    pub fn get_n_start(&self) -> usize {
        self.n_start
    }

    /// Max number of likelihood evaluations per start
    pub fn get_max_eval(&self) -> usize {
        self.max_eval
    }

    /// Hyperparameters subject to optimization
    pub fn get_trainable(&self) -> Trainable {
        self.trainable
    }

    /// Lengthscale search interval
    pub fn get_lengthscale_bounds(&self) -> (f64, f64) {
        self.lengthscale_bounds
    }

    /// Noise variance search interval
    pub fn get_noise_bounds(&self) -> (f64, f64) {
        self.noise_bounds
    }

    /// Seed of the starting points design
    pub fn get_seed(&self) -> u64 {
        self.seed
    }

    fn validate(&self) -> Result<()> {
        if self.max_eval == 0 {
            return Err(SweepError::ConfigurationError(
                "optimizer max_eval should be positive".to_string(),
            ));
        }
        for (name, (lo, up)) in [
            ("lengthscale_bounds", self.lengthscale_bounds),
            ("noise_bounds", self.noise_bounds),
        ] {
            if !(lo > 0. && lo < up && up.is_finite()) {
                return Err(SweepError::ConfigurationError(format!(
                    "optimizer {name} should verify 0 < lower < upper, got ({lo}, {up})"
                )));
            }
        }
        Ok(())
    }
}

/// Whether the csv header row is written at the start of each run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderPolicy {
    /// Header written on every run, repeated runs on the same file interleave headers
    #[default]
    Always,
    /// Header written only when the output file is empty
    IfEmpty,
}

/// Output files settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Results csv file, opened in append mode
    pub csv_path: PathBuf,
    /// Header row policy
    pub header: HeaderPolicy,
    /// Log file, opened in append mode
    pub log_file: PathBuf,
    /// Also print log lines on stderr
    pub echo: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        OutputSettings {
            csv_path: PathBuf::from("./output.csv"),
            header: HeaderPolicy::Always,
            log_file: PathBuf::from("./gpsweep_logs.log"),
            echo: true,
        }
    }
}

/// Benchmark sweep configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunConfiguration {
    /// Number of threads the numerical backend may use
    #[serde(rename = "N_CORES")]
    pub(crate) n_cores: usize,
    /// First training size
    #[serde(rename = "START")]
    pub(crate) start: usize,
    /// Last training size (included when reachable from `start` by `step`)
    #[serde(rename = "END")]
    pub(crate) end: usize,
    /// Training size increment
    #[serde(rename = "STEP")]
    pub(crate) step: usize,
    /// Test size, constant over the sweep
    #[serde(rename = "N_TEST")]
    pub(crate) n_test: usize,
    /// Number of lag regressors, i.e. input dimension
    #[serde(rename = "N_REG")]
    pub(crate) n_reg: usize,
    /// Number of repetitions for each training size
    #[serde(rename = "LOOP")]
    pub(crate) n_loop: usize,
    /// Floating point precision
    #[serde(rename = "PRECISION", default)]
    pub(crate) precision: Precision,
    /// Data files
    #[serde(flatten)]
    pub(crate) paths: DataPaths,
    /// Hyperparameter optimization
    #[serde(default)]
    pub(crate) optimizer: OptimizerSettings,
    /// Output files
    #[serde(default)]
    pub(crate) output: OutputSettings,
}

impl Default for RunConfiguration {
    fn default() -> Self {
        RunConfiguration {
            n_cores: 1,
            start: 128,
            end: 1024,
            step: 128,
            n_test: 128,
            n_reg: 8,
            n_loop: 1,
            precision: Precision::Float64,
            paths: DataPaths::default(),
            optimizer: OptimizerSettings::default(),
            output: OutputSettings::default(),
        }
    }
}

impl RunConfiguration {
    /// Load a configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            SweepError::ConfigurationError(format!(
                "cannot open {}: {e}",
                path.as_ref().display()
            ))
        })?;
        let value: serde_json::Value = serde_json::from_reader(BufReader::new(file))?;
        Self::from_json(value)
    }

    /// Build a configuration from a parsed JSON document.
    ///
    /// An invalid `PRECISION` is a configuration error, other mismatches are
    /// reported as configuration file errors.
    fn from_json(value: serde_json::Value) -> Result<Self> {
        if let Some(precision) = value.get("PRECISION") {
            let name = precision.as_str().ok_or_else(|| {
                SweepError::ConfigurationError(format!(
                    "PRECISION should be a string, got {precision}"
                ))
            })?;
            Precision::try_from(name.to_string()).map_err(SweepError::ConfigurationError)?;
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Check sweep bounds and settings consistency
    pub fn validate(&self) -> Result<()> {
        if self.step == 0 {
            return Err(SweepError::ConfigurationError(
                "STEP should be positive".to_string(),
            ));
        }
        if self.start > self.end {
            return Err(SweepError::ConfigurationError(format!(
                "START ({}) should be less or equal to END ({})",
                self.start, self.end
            )));
        }
        if self.start < 2 {
            return Err(SweepError::ConfigurationError(format!(
                "START ({}) should be at least 2 training points",
                self.start
            )));
        }
        if self.n_loop == 0 {
            return Err(SweepError::ConfigurationError(
                "LOOP should be at least 1".to_string(),
            ));
        }
        if self.n_test == 0 {
            return Err(SweepError::ConfigurationError(
                "N_TEST should be positive".to_string(),
            ));
        }
        if self.n_reg == 0 {
            return Err(SweepError::ConfigurationError(
                "N_REG should be positive".to_string(),
            ));
        }
        if self.n_cores == 0 {
            return Err(SweepError::ConfigurationError(
                "N_CORES should be positive".to_string(),
            ));
        }
        self.optimizer.validate()
    }

    /// Training sizes of the sweep in ascending order, `end` included when reachable
    pub fn train_sizes(&self) -> impl Iterator<Item = usize> {
        (self.start..=self.end).step_by(self.step.max(1))
    }

    /// Ordered (training size, repetition index) pairs, one per trial
    pub fn trial_plan(&self) -> impl Iterator<Item = (usize, usize)> {
        let n_loop = self.n_loop;
        self.train_sizes()
            .flat_map(move |size| (0..n_loop).map(move |l| (size, l)))
    }

    /// Number of trials of the sweep
    pub fn n_trials(&self) -> usize {
        self.train_sizes().count() * self.n_loop
    }

    /// Sets the sweep range
    pub fn with_sizes(mut self, start: usize, end: usize, step: usize) -> Self {
        self.start = start;
        self.end = end;
        self.step = step;
        self
    }

    /// Sets the number of repetitions per training size
    pub fn with_loops(mut self, n_loop: usize) -> Self {
        self.n_loop = n_loop;
        self
    }

    /// Sets the test size
    pub fn with_n_test(mut self, n_test: usize) -> Self {
        self.n_test = n_test;
        self
    }

    /// Sets the number of lag regressors
    pub fn with_n_reg(mut self, n_reg: usize) -> Self {
        self.n_reg = n_reg;
        self
    }

    /// Sets the number of backend threads
    pub fn with_cores(mut self, n_cores: usize) -> Self {
        self.n_cores = n_cores;
        self
    }

    /// Sets the floating point precision
    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Sets the data files
    pub fn with_paths(mut self, paths: DataPaths) -> Self {
        self.paths = paths;
        self
    }

    /// Sets the optimization settings
    pub fn with_optimizer(mut self, optimizer: OptimizerSettings) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Sets the output settings
    pub fn with_output(mut self, output: OutputSettings) -> Self {
        self.output = output;
        self
    }

    /// Number of threads of the numerical backend
    pub fn n_cores(&self) -> usize {
        self.n_cores
    }

    /// Number of test samples
    pub fn n_test(&self) -> usize {
        self.n_test
    }

    /// Number of lag regressors
    pub fn n_reg(&self) -> usize {
        self.n_reg
    }

    /// Number of repetitions per training size
    pub fn n_loop(&self) -> usize {
        self.n_loop
    }

    /// Floating point precision of the sweep
    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Data files locations
    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    /// Hyperparameter optimization settings
    pub fn optimizer(&self) -> &OptimizerSettings {
        &self.optimizer
    }

    /// Output files settings
    pub fn output(&self) -> &OutputSettings {
        &self.output
    }
}
