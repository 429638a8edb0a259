use std::fmt;

use linfa::Float;
use ndarray::{Array1, Array2};

use crate::errors::{Result, SweepError};

/// Squared exponential kernel hyperparameters
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KernelHyperparameters {
    /// Process variance (aka vertical lengthscale)
    pub kernel_variance: f64,
    /// Lengthscale of the squared exponential kernel
    pub lengthscale: f64,
    /// Observation noise variance
    pub noise_variance: f64,
}

impl fmt::Display for KernelHyperparameters {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "KernelHyperparameters(kernel_variance={:.8}, lengthscale={:.8}, noise_variance={:.8})",
            self.kernel_variance, self.lengthscale, self.noise_variance
        )
    }
}

/// Predictive distribution at test points
#[derive(Clone, Debug)]
pub struct Prediction<F: Float> {
    /// Mean of the latent function
    pub latent_mean: Array1<F>,
    /// Variance of the latent function
    pub latent_variance: Array1<F>,
    /// Mean of the noisy observations
    pub observed_mean: Array1<F>,
    /// Variance of the noisy observations
    pub observed_variance: Array1<F>,
}

/// The numerical capabilities a sweep trial relies on.
///
/// A pipeline trains a model from given initial hyperparameters, tunes it,
/// predicts at test points and scores the prediction.
pub trait GpPipeline<F: Float> {
    /// Trained model type
    type Model;

    /// Fit a model on training data with the given hyperparameters (no tuning)
    fn train(
        &self,
        x: &Array2<F>,
        y: &Array1<F>,
        hyperparameters: &KernelHyperparameters,
    ) -> Result<Self::Model>;

    /// Tune model hyperparameters in place
    fn optimize(&self, model: &mut Self::Model) -> Result<()>;

    /// Predict latent and observed mean and variance at `x`
    fn predict(&self, model: &Self::Model, x: &Array2<F>) -> Result<Prediction<F>>;

    /// Error between true targets and predicted means
    fn calculate_error(&self, y_true: &Array1<F>, y_pred: &Array1<F>) -> Result<f64> {
        l2_error(y_true, y_pred)
    }

    /// Hyperparameters currently held by a model
    fn hyperparameters(&self, model: &Self::Model) -> KernelHyperparameters;
}

/// Euclidean norm of the residuals `||y_true - y_pred||_2`
pub fn l2_error<F: Float>(y_true: &Array1<F>, y_pred: &Array1<F>) -> Result<f64> {
    if y_true.len() != y_pred.len() {
        return Err(SweepError::ModelFailure(format!(
            "cannot score {} predictions against {} targets",
            y_pred.len(),
            y_true.len()
        )));
    }
    let sq = (y_true - y_pred).mapv(|v| v * v).sum();
    sq.sqrt()
        .to_f64()
        .ok_or_else(|| SweepError::ModelFailure("error is not representable".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::arr1;

    #[test]
    fn test_l2_error() {
        let err = l2_error(&arr1(&[1., 2., 3.]), &arr1(&[1., 0., 3.])).unwrap();
        assert_abs_diff_eq!(2., err);
        let err = l2_error(&arr1(&[3f32, 0.]), &arr1(&[0f32, 4.])).unwrap();
        assert_abs_diff_eq!(5., err, epsilon = 1e-6);
    }

    #[test]
    fn test_l2_error_length_mismatch() {
        let res = l2_error(&arr1(&[1., 2.]), &arr1(&[1.]));
        assert!(matches!(res, Err(SweepError::ModelFailure(_))));
    }
}
