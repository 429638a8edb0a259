use linfa::Float;
use log::{info, warn};

use crate::config::{Precision, RunConfiguration};
use crate::data::FileDataSource;
use crate::driver::{SweepDriver, SweepSummary};
use crate::errors::Result;
use crate::kriging::KrigingPipeline;
use crate::report::{CsvReport, TrialSink};

/// Give the numerical backend its thread budget.
///
/// The global rayon pool can only be built once per process, later calls keep
/// the existing pool.
pub fn set_backend_threads(n_cores: usize) {
    match rayon::ThreadPoolBuilder::new()
        .num_threads(n_cores)
        .build_global()
    {
        Ok(()) => info!("Numerical backend uses {n_cores} threads"),
        Err(err) => warn!(
            "Numerical backend keeps {} threads ({err})",
            rayon::current_num_threads()
        ),
    }
}

fn sweep<F: Float, S: TrialSink + ?Sized>(
    config: &RunConfiguration,
    sink: &mut S,
) -> Result<SweepSummary> {
    let data = FileDataSource::new(config.paths().clone());
    let pipeline = KrigingPipeline::new(config.optimizer().clone());
    SweepDriver::<F, _, _>::new(config, data, pipeline).run(sink)
}

/// Run the sweep described by `config` with data files and Kriging models,
/// writing rows to `sink`.
pub fn execute_with_sink<S: TrialSink + ?Sized>(
    config: &RunConfiguration,
    sink: &mut S,
) -> Result<SweepSummary> {
    config.validate()?;
    match config.precision() {
        Precision::Float32 => sweep::<f32, S>(config, sink),
        Precision::Float64 => sweep::<f64, S>(config, sink),
    }
}

/// Run the sweep described by `config` and append results to its csv output file
pub fn execute(config: &RunConfiguration) -> Result<SweepSummary> {
    config.validate()?;
    set_backend_threads(config.n_cores());
    info!("Precision: {}", config.precision());

    let output = config.output();
    let mut report = CsvReport::open(&output.csv_path, output.header)?;
    let summary = execute_with_sink(config, &mut report)?;
    report.finish()?;

    info!(
        "Completed {} trials in {:.3}s",
        summary.n_trials,
        summary.elapsed.as_secs_f64()
    );
    Ok(summary)
}
