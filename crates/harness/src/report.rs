//! Trial results and their csv output.
use std::fs::{File, OpenOptions};
use std::path::Path;

use csv::{Writer, WriterBuilder};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::HeaderPolicy;
use crate::errors::Result;

/// One row of benchmark results
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    /// Number of backend threads
    #[serde(rename = "Cores")]
    pub cores: usize,
    /// Training size
    #[serde(rename = "N_train")]
    pub n_train: usize,
    /// Test size
    #[serde(rename = "N_test")]
    pub n_test: usize,
    /// Number of lag regressors
    #[serde(rename = "N_regressor")]
    pub n_regressor: usize,
    /// Trial duration in seconds from data loading to prediction
    #[serde(rename = "Total_time")]
    pub total_time: f64,
    /// Model training duration in seconds
    #[serde(rename = "Train_time")]
    pub train_time: f64,
    /// Hyperparameters optimization duration in seconds
    #[serde(rename = "Optimization_Time")]
    pub optimization_time: f64,
    /// Prediction duration in seconds
    #[serde(rename = "Predict_time")]
    pub predict_time: f64,
    /// Prediction error on the test set
    #[serde(rename = "Error")]
    pub error: f64,
    /// Repetition index
    #[serde(rename = "N_loop")]
    pub n_loop: usize,
}

impl TrialResult {
    /// Column names in output order
    pub const HEADER: [&'static str; 10] = [
        "Cores",
        "N_train",
        "N_test",
        "N_regressor",
        "Total_time",
        "Train_time",
        "Optimization_Time",
        "Predict_time",
        "Error",
        "N_loop",
    ];
}

/// A destination for trial results
pub trait TrialSink {
    /// Persist one trial result
    fn record(&mut self, result: &TrialResult) -> Result<()>;
}

impl TrialSink for Vec<TrialResult> {
    fn record(&mut self, result: &TrialResult) -> Result<()> {
        self.push(result.clone());
        Ok(())
    }
}

/// Append-only csv results file, flushed after each row
pub struct CsvReport {
    writer: Writer<File>,
}

impl CsvReport {
    /// Open (or create) `path` in append mode and write the header as requested by `policy`
    pub fn open<P: AsRef<Path>>(path: P, policy: HeaderPolicy) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        let write_header = match policy {
            HeaderPolicy::Always => true,
            HeaderPolicy::IfEmpty => file.metadata()?.len() == 0,
        };
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        if write_header {
            debug!("Write output file header");
            writer.write_record(TrialResult::HEADER)?;
            writer.flush()?;
        }
        Ok(CsvReport { writer })
    }

    /// Flush and close the file
    pub fn finish(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl TrialSink for CsvReport {
    fn record(&mut self, result: &TrialResult) -> Result<()> {
        self.writer.serialize(result)?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use csv::ReaderBuilder;

    fn result(n_train: usize, n_loop: usize) -> TrialResult {
        TrialResult {
            cores: 2,
            n_train,
            n_test: 5,
            n_regressor: 3,
            total_time: 0.5,
            train_time: 0.1,
            optimization_time: 0.2,
            predict_time: 0.05,
            error: 1.25,
            n_loop,
        }
    }

    fn read_lines(path: &str) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_header_always_repeats() {
        let dir = "target/tests/report_always";
        std::fs::create_dir_all(dir).ok();
        let path = format!("{dir}/output.csv");
        let _ = std::fs::remove_file(&path);

        for _ in 0..2 {
            let mut report = CsvReport::open(&path, HeaderPolicy::Always).unwrap();
            report.record(&result(10, 0)).unwrap();
            report.finish().unwrap();
        }
        let lines = read_lines(&path);
        let header = TrialResult::HEADER.join(",");
        assert_eq!(4, lines.len());
        assert_eq!(header, lines[0]);
        assert_eq!("2,10,5,3,0.5,0.1,0.2,0.05,1.25,0", lines[1]);
        assert_eq!(header, lines[2]);
    }

    #[test]
    fn test_header_if_empty() {
        let dir = "target/tests/report_if_empty";
        std::fs::create_dir_all(dir).ok();
        let path = format!("{dir}/output.csv");
        let _ = std::fs::remove_file(&path);

        for l in 0..2 {
            let mut report = CsvReport::open(&path, HeaderPolicy::IfEmpty).unwrap();
            report.record(&result(10, l)).unwrap();
            report.finish().unwrap();
        }
        let lines = read_lines(&path);
        assert_eq!(3, lines.len());
        assert_eq!(TrialResult::HEADER.join(","), lines[0]);
    }

    #[test]
    fn test_rows_are_persisted_before_finish() {
        let dir = "target/tests/report_flush";
        std::fs::create_dir_all(dir).ok();
        let path = format!("{dir}/output.csv");
        let _ = std::fs::remove_file(&path);

        let mut report = CsvReport::open(&path, HeaderPolicy::Always).unwrap();
        report.record(&result(20, 1)).unwrap();

        let mut reader = ReaderBuilder::new().from_path(&path).unwrap();
        let rows: Vec<TrialResult> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(vec![result(20, 1)], rows);
        drop(report);
    }
}
