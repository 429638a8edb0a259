//! Training and test data for one trial.
//!
//! Data files are single-column numeric series. Inputs are turned into
//! lag-regressor matrices: the row `i` of an `(n, n_reg)` input matrix holds
//! `x[i - n_reg + 1], ..., x[i]`, with zeros standing in for values before the
//! start of the series.
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use linfa::Float;
use ndarray::{s, Array1, Array2, ArrayBase, Data, Ix1};
use ndarray_csv::Array2Reader;

use crate::config::DataPaths;
use crate::errors::{Result, SweepError};

/// Arrays used by a single trial, dropped once the trial completes
#[derive(Clone, Debug, PartialEq)]
pub struct TrialData<F: Float> {
    /// Training inputs (n_train, n_reg)
    pub x_train: Array2<F>,
    /// Training outputs (n_train,)
    pub y_train: Array1<F>,
    /// Test inputs (n_test, n_reg)
    pub x_test: Array2<F>,
    /// Test outputs (n_test,)
    pub y_test: Array1<F>,
}

/// A provider of per-trial datasets
pub trait DataSource<F: Float> {
    /// Load `n_train` training and `n_test` test samples with `n_reg` lag regressors
    fn load(&self, n_train: usize, n_test: usize, n_reg: usize) -> Result<TrialData<F>>;
}

/// Build the (n, n_reg) lag regressors matrix of a series
pub fn lag_windows<F: Float>(series: &ArrayBase<impl Data<Elem = F>, Ix1>, n_reg: usize) -> Array2<F> {
    let n = series.len();
    let offset = n_reg.saturating_sub(1);
    let mut padded = Array1::<F>::zeros(n + offset);
    padded.slice_mut(s![offset..]).assign(series);
    Array2::from_shape_fn((n, n_reg), |(i, k)| padded[i + k])
}

/// Read the first `n` values of a single-column series file
pub fn read_series<F: Float>(path: &Path, n: usize) -> Result<Array1<F>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .trim(Trim::All)
        .from_path(path)
        .map_err(|e| SweepError::data_load(path, e))?;
    let values: Array2<f64> = reader
        .deserialize_array2_dynamic()
        .map_err(|e| SweepError::data_load(path, e))?;

    let available = if values.ncols() == 0 { 0 } else { values.nrows() };
    if available < n {
        return Err(SweepError::data_load(
            path,
            format!("{n} values requested, only {available} available"),
        ));
    }
    Ok(values.slice(s![..n, 0]).mapv(|v| F::cast(v)))
}

/// Dataset read from files on every trial
#[derive(Clone, Debug)]
pub struct FileDataSource {
    paths: DataPaths,
}

impl FileDataSource {
    pub fn new(paths: DataPaths) -> Self {
        FileDataSource { paths }
    }
}

impl<F: Float> DataSource<F> for FileDataSource {
    fn load(&self, n_train: usize, n_test: usize, n_reg: usize) -> Result<TrialData<F>> {
        let x_train = read_series::<F>(&self.paths.train_in_file, n_train)?;
        let y_train = read_series::<F>(&self.paths.train_out_file, n_train)?;
        let x_test = read_series::<F>(&self.paths.test_in_file, n_test)?;
        let y_test = read_series::<F>(&self.paths.test_out_file, n_test)?;
        Ok(TrialData {
            x_train: lag_windows(&x_train, n_reg),
            y_train,
            x_test: lag_windows(&x_test, n_reg),
            y_test,
        })
    }
}

/// Dataset served from in-memory series with the same windowing as files
#[derive(Clone, Debug)]
pub struct MemoryDataSource {
    train: (Array1<f64>, Array1<f64>),
    test: (Array1<f64>, Array1<f64>),
}

impl MemoryDataSource {
    /// Constructor from (input, output) training and test series
    pub fn new(train: (Array1<f64>, Array1<f64>), test: (Array1<f64>, Array1<f64>)) -> Self {
        MemoryDataSource { train, test }
    }

    fn take<F: Float>(series: &Array1<f64>, n: usize, what: &str) -> Result<Array1<F>> {
        if series.len() < n {
            return Err(SweepError::data_load(
                Path::new(what),
                format!("{n} values requested, only {} available", series.len()),
            ));
        }
        Ok(series.slice(s![..n]).mapv(|v| F::cast(v)))
    }
}

impl<F: Float> DataSource<F> for MemoryDataSource {
    fn load(&self, n_train: usize, n_test: usize, n_reg: usize) -> Result<TrialData<F>> {
        let x_train = Self::take::<F>(&self.train.0, n_train, "<train input>")?;
        let y_train = Self::take::<F>(&self.train.1, n_train, "<train output>")?;
        let x_test = Self::take::<F>(&self.test.0, n_test, "<test input>")?;
        let y_test = Self::take::<F>(&self.test.1, n_test, "<test output>")?;
        Ok(TrialData {
            x_train: lag_windows(&x_train, n_reg),
            y_train,
            x_test: lag_windows(&x_test, n_reg),
            y_test,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, array};
    use std::io::Write;
    use std::path::PathBuf;

    fn write_series(dir: &str, name: &str, values: &[f64]) -> PathBuf {
        std::fs::create_dir_all(dir).ok();
        let path = PathBuf::from(format!("{dir}/{name}"));
        let mut file = std::fs::File::create(&path).expect("cannot create series file");
        for v in values {
            writeln!(file, "{v}").unwrap();
        }
        path
    }

    #[test]
    fn test_lag_windows() {
        let x = arr1(&[1., 2., 3., 4.]);
        let w = lag_windows(&x, 3);
        let expected = array![[0., 0., 1.], [0., 1., 2.], [1., 2., 3.], [2., 3., 4.]];
        assert_abs_diff_eq!(expected, w);

        let w = lag_windows(&x, 1);
        assert_abs_diff_eq!(x.insert_axis(ndarray::Axis(1)), w);
    }

    #[test]
    fn test_file_data_source() {
        let dir = "target/tests/data_source";
        let values: Vec<f64> = (0..20).map(|i| i as f64 * 0.5).collect();
        let paths = DataPaths {
            train_in_file: write_series(dir, "train_in.txt", &values),
            train_out_file: write_series(dir, "train_out.txt", &values),
            test_in_file: write_series(dir, "test_in.txt", &values[..8]),
            test_out_file: write_series(dir, "test_out.txt", &values[..8]),
        };
        let data: TrialData<f64> = FileDataSource::new(paths).load(10, 5, 2).unwrap();
        assert_eq!((10, 2), data.x_train.dim());
        assert_eq!(10, data.y_train.len());
        assert_eq!((5, 2), data.x_test.dim());
        assert_eq!(5, data.y_test.len());
        assert_abs_diff_eq!(array![0., 0.], data.x_train.row(0));
        assert_abs_diff_eq!(array![4., 4.5], data.x_train.row(9));
    }

    #[test]
    fn test_short_file_is_a_load_error() {
        let dir = "target/tests/data_short";
        let path = write_series(dir, "short.txt", &[1., 2., 3.]);
        let res = read_series::<f64>(&path, 4);
        assert!(matches!(res, Err(SweepError::DataLoadError { .. })));
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let res = read_series::<f32>(Path::new("target/tests/does/not/exist.txt"), 1);
        assert!(matches!(res, Err(SweepError::DataLoadError { .. })));

        let dir = "target/tests/data_malformed";
        std::fs::create_dir_all(dir).ok();
        let path = PathBuf::from(format!("{dir}/bad.txt"));
        std::fs::write(&path, "1.0\nabc\n3.0\n").unwrap();
        let res = read_series::<f64>(&path, 3);
        match res {
            Err(SweepError::DataLoadError { path: p, .. }) => assert_eq!(path, p),
            other => panic!("expected a load error, got {other:?}"),
        }
    }

    #[test]
    fn test_read_series_keeps_leading_values() {
        let dir = "target/tests/data_padded";
        std::fs::create_dir_all(dir).ok();
        let path = PathBuf::from(format!("{dir}/padded.txt"));
        std::fs::write(&path, " 1.5 \n2.5\n  -3.0\n4\n").unwrap();
        let values = read_series::<f64>(&path, 3).unwrap();
        assert_abs_diff_eq!(arr1(&[1.5, 2.5, -3.0]), values);

        std::fs::write(&path, "").unwrap();
        let res = read_series::<f64>(&path, 1);
        assert!(matches!(res, Err(SweepError::DataLoadError { .. })));
    }

    #[test]
    fn test_memory_data_source_precision() {
        let series = Array1::linspace(0., 1., 11);
        let source = MemoryDataSource::new(
            (series.clone(), series.clone()),
            (series.clone(), series),
        );
        let data: TrialData<f32> = source.load(11, 4, 1).unwrap();
        assert_abs_diff_eq!(1f32, data.y_train[10]);
        assert!(DataSource::<f64>::load(&source, 12, 4, 1).is_err());
    }
}
