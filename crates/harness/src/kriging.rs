//! Kriging pipeline built on [egobox_gp].
//!
//! The squared exponential correlation of egobox reads `exp(-0.5 * (theta * d)^2)`
//! on normalized inputs, hence `theta = 1 / lengthscale` on every input dimension.
//! The noise variance is the nugget added to the correlation matrix diagonal,
//! i.e. it is relative to the process variance which egobox estimates in
//! closed form at each fit.
use egobox_doe::{Lhs, LhsKind, SamplingMethod};
use egobox_gp::correlation_models::SquaredExponentialCorr;
use egobox_gp::mean_models::ConstantMean;
use egobox_gp::{GaussianProcess, Kriging, ThetaTuning};
use linfa::prelude::{Dataset, Fit, Float};
use log::{debug, warn};
use ndarray::{Array1, Array2, Ix1};
use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
use std::time::Instant;

use crate::config::OptimizerSettings;
use crate::errors::{Result, SweepError};
use crate::pipeline::{GpPipeline, KernelHyperparameters, Prediction};

/// Kriging model type of egobox
pub type KrigingGp<F> = GaussianProcess<F, ConstantMean, SquaredExponentialCorr>;

const COBYLA_RHOBEG: f64 = 0.5;
const COBYLA_FTOL_REL: f64 = 1e-4;

/// A trained Kriging model together with its training data
#[derive(Clone, Debug)]
pub struct KrigingModel<F: Float> {
    gp: KrigingGp<F>,
    dataset: Dataset<F, F, Ix1>,
    hyperparameters: KernelHyperparameters,
}

impl<F: Float> KrigingModel<F> {
    /// Underlying egobox GP
    pub fn gp(&self) -> &KrigingGp<F> {
        &self.gp
    }

    /// Current hyperparameters, kernel variance being the closed form estimate
    pub fn hyperparameters(&self) -> &KernelHyperparameters {
        &self.hyperparameters
    }

    /// Reduced likelihood of the model (greater is better)
    pub fn likelihood(&self) -> f64 {
        self.gp.likelihood().to_f64().unwrap_or(f64::NEG_INFINITY)
    }
}

/// Fit a Kriging model with fixed lengthscale and noise
fn fit_fixed<F: Float>(
    dataset: &Dataset<F, F, Ix1>,
    lengthscale: f64,
    noise_variance: f64,
) -> Result<KrigingGp<F>> {
    let dim = dataset.records().ncols();
    let theta = Array1::from_elem(dim, F::cast(1. / lengthscale));
    let gp = Kriging::<F>::params()
        .theta_tuning(ThetaTuning::Fixed(theta))
        .nugget(F::cast(noise_variance))
        .fit(dataset)?;
    Ok(gp)
}

/// [GpPipeline] implementation using egobox Kriging (constant mean, squared exponential)
#[derive(Clone, Debug, Default)]
pub struct KrigingPipeline {
    settings: OptimizerSettings,
}

impl KrigingPipeline {
    pub fn new(settings: OptimizerSettings) -> Self {
        KrigingPipeline { settings }
    }

    /// Starting points on log10 scale: current values first then an LHS spread within bounds
    fn start_points(&self, current: &[f64], bounds: &[(f64, f64)]) -> Array2<f64> {
        let n_start = self.settings.get_n_start();
        let mut starts = Array2::zeros((n_start + 1, current.len()));
        starts.row_mut(0).assign(&Array1::from_vec(current.to_vec()));
        if n_start > 0 {
            let mut xlimits = Array2::zeros((bounds.len(), 2));
            for (i, (lo, up)) in bounds.iter().enumerate() {
                xlimits[[i, 0]] = *lo;
                xlimits[[i, 1]] = *up;
            }
            // Maximin needs at least two points to compare distances
            let kind = if n_start > 1 {
                LhsKind::Maximin
            } else {
                LhsKind::Classic
            };
            let rng = Xoshiro256Plus::seed_from_u64(self.settings.get_seed());
            let seeds = Lhs::new_with_rng(&xlimits, rng).kind(kind).sample(n_start);
            starts.slice_mut(ndarray::s![1.., ..]).assign(&seeds);
        }
        starts
    }
}

/// Tunable hyperparameter, with its position in the (lengthscale, noise) pair
#[derive(Clone, Copy, Debug)]
struct Active {
    index: usize,
    bounds: (f64, f64),
}

impl<F: Float> GpPipeline<F> for KrigingPipeline {
    type Model = KrigingModel<F>;

    fn train(
        &self,
        x: &Array2<F>,
        y: &Array1<F>,
        hyperparameters: &KernelHyperparameters,
    ) -> Result<Self::Model> {
        if x.nrows() != y.len() {
            return Err(SweepError::ModelFailure(format!(
                "training inputs ({}) and outputs ({}) sizes differ",
                x.nrows(),
                y.len()
            )));
        }
        let dataset = Dataset::new(x.to_owned(), y.to_owned());
        let gp = fit_fixed(
            &dataset,
            hyperparameters.lengthscale,
            hyperparameters.noise_variance,
        )?;
        let hyperparameters = KernelHyperparameters {
            kernel_variance: gp.variance().to_f64().unwrap_or(f64::NAN),
            ..*hyperparameters
        };
        Ok(KrigingModel {
            gp,
            dataset,
            hyperparameters,
        })
    }

    fn optimize(&self, model: &mut Self::Model) -> Result<()> {
        let trainable = self.settings.get_trainable();
        let mut active = vec![];
        if trainable.lengthscale {
            active.push(Active {
                index: 0,
                bounds: self.settings.get_lengthscale_bounds(),
            });
        }
        if trainable.noise_variance {
            active.push(Active {
                index: 1,
                bounds: self.settings.get_noise_bounds(),
            });
        }
        if active.is_empty() {
            debug!("No trainable hyperparameter, skip optimization");
            return Ok(());
        }

        let current = [
            model.hyperparameters.lengthscale,
            model.hyperparameters.noise_variance,
        ];
        let dataset = &model.dataset;

        // Minimize the opposite of the reduced likelihood wrt log10 of active hyperparameters
        let to_hyper = |z: &[f64]| {
            let mut values = current;
            for (a, zi) in active.iter().zip(z) {
                values[a.index] = 10f64.powf(*zi);
            }
            values
        };
        let objfn = |z: &[f64], _u: &mut ()| -> f64 {
            if z.iter().any(|v| v.is_nan()) {
                return f64::INFINITY;
            }
            let [lengthscale, noise] = to_hyper(z);
            match fit_fixed(dataset, lengthscale, noise) {
                Ok(gp) => gp
                    .likelihood()
                    .to_f64()
                    .map_or(f64::INFINITY, |lkh| -lkh),
                Err(_) => f64::INFINITY,
            }
        };

        let bounds: Vec<(f64, f64)> = active
            .iter()
            .map(|a| (a.bounds.0.log10(), a.bounds.1.log10()))
            .collect();
        let init: Vec<f64> = active
            .iter()
            .map(|a| current[a.index].clamp(a.bounds.0, a.bounds.1).log10())
            .collect();
        let starts = self.start_points(&init, &bounds);
        debug!("Optimize with multistart {starts:?} and bounds = {bounds:?}");

        let max_eval = self.settings.get_max_eval();
        let now = Instant::now();
        let (fmin, zmin) = (0..starts.nrows())
            .into_par_iter()
            .map(|i| {
                let z0 = starts.row(i).to_vec();
                let cons: Vec<&dyn cobyla::Func<()>> = vec![];
                match cobyla::minimize(
                    objfn,
                    &z0,
                    &bounds,
                    &cons,
                    (),
                    max_eval,
                    cobyla::RhoBeg::All(COBYLA_RHOBEG),
                    Some(cobyla::StopTols {
                        ftol_rel: COBYLA_FTOL_REL,
                        ..cobyla::StopTols::default()
                    }),
                ) {
                    Ok((_, z, f)) => (if f.is_nan() { f64::INFINITY } else { f }, z),
                    Err((status, z, _)) => {
                        warn!("Cobyla optimizer failed with status={status:?}");
                        (f64::INFINITY, z)
                    }
                }
            })
            .reduce(
                || (f64::INFINITY, vec![]),
                |a, b| if b.0 < a.0 { b } else { a },
            );
        debug!("elapsed optim = {:?}", now.elapsed().as_millis());

        if fmin < -model.likelihood() {
            let [lengthscale, noise_variance] = to_hyper(&zmin);
            let gp = fit_fixed(&model.dataset, lengthscale, noise_variance)?;
            model.hyperparameters = KernelHyperparameters {
                kernel_variance: gp.variance().to_f64().unwrap_or(f64::NAN),
                lengthscale,
                noise_variance,
            };
            model.gp = gp;
        } else if !fmin.is_finite() && !model.likelihood().is_finite() {
            return Err(SweepError::ModelFailure(
                "likelihood optimization failed from every start".to_string(),
            ));
        } else {
            debug!("Optimization did not improve likelihood, keep current hyperparameters");
        }
        Ok(())
    }

    fn predict(&self, model: &Self::Model, x: &Array2<F>) -> Result<Prediction<F>> {
        let mean = model.gp.predict(x)?;
        let variance = model.gp.predict_var(x)?.column(0).to_owned();
        let noise = F::cast(model.hyperparameters.noise_variance) * model.gp.variance();
        let observed_variance = variance.mapv(|v| v + noise);
        Ok(Prediction {
            observed_mean: mean.clone(),
            latent_mean: mean,
            latent_variance: variance,
            observed_variance,
        })
    }

    fn hyperparameters(&self, model: &Self::Model) -> KernelHyperparameters {
        model.hyperparameters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Trainable;
    use crate::pipeline::l2_error;
    use approx::assert_abs_diff_eq;
    use ndarray::Axis;

    const INITIAL: KernelHyperparameters = KernelHyperparameters {
        kernel_variance: 1.,
        lengthscale: 1.,
        noise_variance: 0.1,
    };

    fn sine(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array1::linspace(0., 6., n);
        let y = x.mapv(f64::sin);
        (x.insert_axis(Axis(1)), y)
    }

    #[test]
    fn test_train_keeps_given_hyperparameters() {
        let (x, y) = sine(20);
        let pipeline = KrigingPipeline::default();
        let model = GpPipeline::<f64>::train(&pipeline, &x, &y, &INITIAL).expect("GP fit error");
        let hyper = GpPipeline::<f64>::hyperparameters(&pipeline, &model);
        assert_abs_diff_eq!(1., hyper.lengthscale);
        assert_abs_diff_eq!(0.1, hyper.noise_variance);
        assert_abs_diff_eq!(1., model.gp().theta()[0]);
        assert!(hyper.kernel_variance > 0.);
    }

    #[test]
    fn test_optimize_never_decreases_likelihood() {
        let (x, y) = sine(25);
        let pipeline = KrigingPipeline::new(OptimizerSettings::default().n_start(3));
        let mut model =
            GpPipeline::<f64>::train(&pipeline, &x, &y, &INITIAL).expect("GP fit error");
        let before = model.likelihood();
        GpPipeline::<f64>::optimize(&pipeline, &mut model).expect("GP optimization error");
        assert!(model.likelihood() >= before);
        assert!(model.hyperparameters().noise_variance <= 0.1);
    }

    #[test]
    fn test_optimize_is_reproducible() {
        let (x, y) = sine(20);
        let (xtest, ytest) = sine(7);
        let pipeline = KrigingPipeline::new(OptimizerSettings::default().n_start(2));
        let run = || {
            let mut model =
                GpPipeline::<f64>::train(&pipeline, &x, &y, &INITIAL).expect("GP fit error");
            GpPipeline::<f64>::optimize(&pipeline, &mut model).expect("GP optimization error");
            let pred = pipeline.predict(&model, &xtest).expect("GP prediction error");
            l2_error(&ytest, &pred.latent_mean).unwrap()
        };
        assert_abs_diff_eq!(run(), run(), epsilon = 1e-10);
    }

    #[test]
    fn test_optimize_without_trainable_is_noop() {
        let (x, y) = sine(15);
        let settings = OptimizerSettings::default().trainable(Trainable {
            lengthscale: false,
            noise_variance: false,
        });
        let pipeline = KrigingPipeline::new(settings);
        let mut model =
            GpPipeline::<f64>::train(&pipeline, &x, &y, &INITIAL).expect("GP fit error");
        let before = *model.hyperparameters();
        GpPipeline::<f64>::optimize(&pipeline, &mut model).unwrap();
        assert_eq!(before, *model.hyperparameters());
    }

    #[test]
    fn test_predict_variances() {
        let (x, y) = sine(20);
        let (xtest, ytest) = sine(9);
        let pipeline = KrigingPipeline::default();
        let model = GpPipeline::<f64>::train(&pipeline, &x, &y, &INITIAL).expect("GP fit error");
        let pred = pipeline.predict(&model, &xtest).expect("GP prediction error");
        assert_eq!(9, pred.latent_mean.len());
        assert_abs_diff_eq!(pred.latent_mean, pred.observed_mean);
        pred.latent_variance
            .iter()
            .zip(pred.observed_variance.iter())
            .for_each(|(l, o)| {
                assert!(*l >= 0.);
                assert!(o > l);
            });
        let err = pipeline.calculate_error(&ytest, &pred.latent_mean).unwrap();
        let baseline = l2_error(&ytest, &Array1::zeros(9)).unwrap();
        assert!(err < baseline);
    }

    #[test]
    fn test_single_precision_pipeline() {
        let (x, y) = sine(20);
        let (xtest, ytest) = sine(5);
        let (x, y) = (x.mapv(|v| v as f32), y.mapv(|v| v as f32));
        let (xtest, ytest) = (xtest.mapv(|v| v as f32), ytest.mapv(|v| v as f32));
        let pipeline = KrigingPipeline::new(OptimizerSettings::default().n_start(1));
        let mut model =
            GpPipeline::<f32>::train(&pipeline, &x, &y, &INITIAL).expect("GP fit error");
        GpPipeline::<f32>::optimize(&pipeline, &mut model).expect("GP optimization error");
        let pred = pipeline.predict(&model, &xtest).expect("GP prediction error");
        let err = pipeline.calculate_error(&ytest, &pred.latent_mean).unwrap();
        assert!(err.is_finite());
    }

    #[test]
    fn test_train_size_mismatch() {
        let (x, _) = sine(10);
        let y = Array1::zeros(9);
        let res = GpPipeline::<f64>::train(&KrigingPipeline::default(), &x, &y, &INITIAL);
        assert!(matches!(res, Err(SweepError::ModelFailure(_))));
    }
}
