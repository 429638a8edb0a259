//! Sweep driver.
//!
//! The driver enumerates training sizes `START..=END` by `STEP` and, for each size,
//! repetitions `0..LOOP`. Every (size, repetition) pair is one trial which loads
//! its own data, trains a model from the fixed initial hyperparameters, optimizes
//! it, predicts the test outputs and scores the prediction. Stage durations and
//! the error are written as one row to the sink before the next trial starts.
//! The total duration stops after prediction, scoring is not timed.
//!
//! Any error aborts the sweep: rows of completed trials are kept by the sink,
//! the failing trial writes nothing.
use std::marker::PhantomData;
use std::time::{Duration, Instant};

use linfa::Float;
use log::{debug, info};

use crate::config::RunConfiguration;
use crate::data::DataSource;
use crate::errors::Result;
use crate::pipeline::{GpPipeline, KernelHyperparameters};
use crate::report::{TrialResult, TrialSink};

/// Initial kernel variance of every trial
pub const INITIAL_KERNEL_VARIANCE: f64 = 1.0;
/// Initial kernel lengthscale of every trial
pub const INITIAL_LENGTHSCALE: f64 = 1.0;
/// Initial noise variance of every trial
pub const INITIAL_NOISE_VARIANCE: f64 = 0.1;

/// Settings owned by the driver itself, as opposed to the [RunConfiguration]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DriverSettings {
    /// Hyperparameters the model is trained with before optimization
    pub initial_hyperparameters: KernelHyperparameters,
}

impl Default for DriverSettings {
    fn default() -> Self {
        DriverSettings {
            initial_hyperparameters: KernelHyperparameters {
                kernel_variance: INITIAL_KERNEL_VARIANCE,
                lengthscale: INITIAL_LENGTHSCALE,
                noise_variance: INITIAL_NOISE_VARIANCE,
            },
        }
    }
}

/// Result of a whole sweep
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SweepSummary {
    /// Number of rows written
    pub n_trials: usize,
    /// Wall-clock duration of the sweep
    pub elapsed: Duration,
}

/// Run `f` and return its result with its wall-clock duration
fn timed<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let now = Instant::now();
    let res = f();
    (res, now.elapsed())
}

/// Sequential sweep over training sizes and repetitions
pub struct SweepDriver<'a, F, D, P>
where
    F: Float,
    D: DataSource<F>,
    P: GpPipeline<F>,
{
    config: &'a RunConfiguration,
    data: D,
    pipeline: P,
    settings: DriverSettings,
    phantom: PhantomData<F>,
}

impl<'a, F, D, P> SweepDriver<'a, F, D, P>
where
    F: Float,
    D: DataSource<F>,
    P: GpPipeline<F>,
{
    /// Constructor, `config` is expected to be validated
    pub fn new(config: &'a RunConfiguration, data: D, pipeline: P) -> Self {
        SweepDriver {
            config,
            data,
            pipeline,
            settings: DriverSettings::default(),
            phantom: PhantomData,
        }
    }

    /// Sets driver settings
    pub fn settings(mut self, settings: DriverSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Run every trial in order, writing one row per trial to `sink`
    pub fn run<S: TrialSink + ?Sized>(&self, sink: &mut S) -> Result<SweepSummary> {
        let now = Instant::now();
        let mut n_trials = 0;
        for (size, l) in self.config.trial_plan() {
            info!("{}", "*".repeat(40));
            info!("Train Size: {size}, Loop: {l}");
            let result = self.run_trial(size, l)?;
            sink.record(&result)?;
            n_trials += 1;
            info!("Completed iteration.");
        }
        Ok(SweepSummary {
            n_trials,
            elapsed: now.elapsed(),
        })
    }

    /// Run a single trial for training size `size` and repetition `l`
    pub fn run_trial(&self, size: usize, l: usize) -> Result<TrialResult> {
        let config = self.config;
        let total = Instant::now();

        let data = self.data.load(size, config.n_test(), config.n_reg())?;
        info!("Finished loading the data.");

        let (model, train_time) = timed(|| {
            self.pipeline.train(
                &data.x_train,
                &data.y_train,
                &self.settings.initial_hyperparameters,
            )
        });
        let mut model = model?;

        let (optimized, optimization_time) = timed(|| self.pipeline.optimize(&mut model));
        optimized?;
        info!("Finished optimization.");
        debug!("Optimized {}", self.pipeline.hyperparameters(&model));

        let (prediction, predict_time) = timed(|| self.pipeline.predict(&model, &data.x_test));
        let prediction = prediction?;
        info!("Finished prediction.");

        let total_time = total.elapsed();
        let error = self
            .pipeline
            .calculate_error(&data.y_test, &prediction.latent_mean)?;
        debug!(
            "Trial timings: total={total_time:?} train={train_time:?} optim={optimization_time:?} predict={predict_time:?} error={error}"
        );

        Ok(TrialResult {
            cores: config.n_cores(),
            n_train: size,
            n_test: config.n_test(),
            n_regressor: config.n_reg(),
            total_time: total_time.as_secs_f64(),
            train_time: train_time.as_secs_f64(),
            optimization_time: optimization_time.as_secs_f64(),
            predict_time: predict_time.as_secs_f64(),
            error,
            n_loop: l,
        })
    }
}
