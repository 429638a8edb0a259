use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use gpsweep_harness::{execute, logging, RunConfiguration};
use log::info;

#[derive(Parser)]
#[command(author, version, about = "Gaussian Process regression benchmark sweep", long_about = None)]
struct Args {
    /// JSON run configuration
    #[arg(default_value = "./config.json")]
    config: PathBuf,
    /// Results csv file, overrides the configured one
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = RunConfiguration::from_file(&args.config)
        .with_context(|| format!("Cannot load configuration {}", args.config.display()))?;
    if let Some(csv_path) = args.output {
        let mut output = config.output().clone();
        output.csv_path = csv_path;
        config = config.with_output(output);
    }

    let session = logging::init(config.output()).context("Cannot open log file")?;
    let summary = execute(&config)?;
    info!(
        "Completed the program ({} trials, {:.3}s)",
        summary.n_trials,
        summary.elapsed.as_secs_f64()
    );
    session.finish();
    Ok(())
}
