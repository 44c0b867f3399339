//! Generic RANSAC over any [`ModelFitter`].

use rand::Rng;
use thiserror::Error;

use crate::fitter::ModelFitter;
use crate::sampler::pick_random_index_into;

/// Error types for the RANSAC engine.
#[derive(Debug, Error, PartialEq)]
pub enum RansacError {
    /// The kernel must contain at least one sample.
    #[error("RANSAC kernel size must be greater than zero")]
    InvalidKernelSize,
    /// The hard iteration limit leaves no room for a single iteration.
    #[error("RANSAC hard iteration limit must be greater than zero")]
    InvalidIterationLimit,
    /// The population is smaller than a single kernel.
    #[error("RANSAC requires at least {required} samples, got {actual}")]
    InsufficientSamples {
        /// Number of samples in a kernel.
        required: usize,
        /// Number of samples available.
        actual: usize,
    },
    /// No valid model could be fitted within the iteration budget.
    #[error("RANSAC failed to fit a model after {attempts} degenerate samples")]
    DegenerateSamples {
        /// Number of consecutive kernels that failed to produce a model.
        attempts: usize,
    },
    /// Every fitted model was rejected by the fitness threshold, including its own kernel.
    #[error("RANSAC found no sample below the fitness threshold")]
    NoConsensus,
}

/// Parameters for [`ransac_single_model`].
#[derive(Debug, Clone)]
pub struct RansacParams<T> {
    /// Number of samples drawn to fit a candidate model.
    pub kernel_size: usize,
    /// A sample is an inlier if its residual is strictly below this threshold.
    pub fitness_threshold: T,
    /// Upper bound on the number of iterations, and on consecutive degenerate draws.
    pub hard_iter_limit: usize,
    /// Desired probability of drawing at least one kernel free of outliers.
    pub confidence: f64,
}

impl Default for RansacParams<f64> {
    fn default() -> Self {
        Self {
            kernel_size: 3,
            fitness_threshold: 0.1,
            hard_iter_limit: 100,
            confidence: 0.99,
        }
    }
}

/// Best model found by [`ransac_single_model`].
#[derive(Debug, Clone)]
pub struct RansacResult<M> {
    /// The model with the largest consensus.
    pub model: M,
    /// Ascending indices of the samples consistent with `model`.
    pub inliers: Vec<usize>,
    /// Number of iterations performed.
    pub iterations: usize,
}

/// Find the model supported by the largest number of samples.
///
/// Kernels of `kernel_size` samples are drawn uniformly with `rng` and fitted with
/// [`ModelFitter::fit_model`]; draws that do not yield a model are repeated. Each candidate
/// is scored against the whole population and the number of iterations adapts to the inlier
/// ratio of the best model so far.
///
/// # Arguments
///
/// * `fitter` - The model fitter over the population.
/// * `params` - The RANSAC parameters.
/// * `rng` - The random number generator used to draw kernels.
///
/// # Errors
///
/// Fails when `kernel_size` or `hard_iter_limit` is zero, when the population cannot
/// provide a single kernel, when more than `hard_iter_limit` consecutive kernels are
/// degenerate, or when no candidate has any inlier.
pub fn ransac_single_model<F, R>(
    fitter: &F,
    params: &RansacParams<F::Real>,
    rng: &mut R,
) -> Result<RansacResult<F::Model>, RansacError>
where
    F: ModelFitter,
    R: Rng + ?Sized,
{
    let n_samples = fitter.sample_count();
    let kernel_size = params.kernel_size;
    if kernel_size == 0 {
        return Err(RansacError::InvalidKernelSize);
    }
    if params.hard_iter_limit == 0 {
        return Err(RansacError::InvalidIterationLimit);
    }
    if n_samples < kernel_size {
        return Err(RansacError::InsufficientSamples {
            required: kernel_size,
            actual: n_samples,
        });
    }

    let mut best: Option<(F::Model, Vec<usize>)> = None;
    let mut best_score = 0usize;
    let mut iter = 0usize;
    let mut soft_iter_limit = 1usize;
    let mut kernel = Vec::with_capacity(n_samples);

    while iter < soft_iter_limit && iter < params.hard_iter_limit {
        let mut attempts = 0usize;
        let model = loop {
            pick_random_index_into(rng, n_samples, kernel_size, &mut kernel);
            attempts += 1;
            match fitter.fit_model(&kernel) {
                Some(model) => break model,
                None if attempts > params.hard_iter_limit => {
                    log::debug!("RANSAC gave up after {} degenerate samples", attempts);
                    return Err(RansacError::DegenerateSamples { attempts });
                }
                None => continue,
            }
        };

        let inliers: Vec<usize> = (0..n_samples)
            .filter(|&i| fitter.test_sample(i, &model) < params.fitness_threshold)
            .collect();

        if inliers.len() > best_score {
            best_score = inliers.len();
            soft_iter_limit =
                adaptive_iteration_limit(best_score, n_samples, kernel_size, params.confidence);
            log::debug!(
                "RANSAC iteration {}: {} / {} inliers, iteration limit {}",
                iter,
                best_score,
                n_samples,
                soft_iter_limit
            );
            best = Some((model, inliers));
        }

        iter += 1;
    }

    match best {
        Some((model, inliers)) => Ok(RansacResult {
            model,
            inliers,
            iterations: iter,
        }),
        None => Err(RansacError::NoConsensus),
    }
}

/// Number of iterations needed to draw an outlier-free kernel with probability `confidence`.
fn adaptive_iteration_limit(
    inliers: usize,
    n_samples: usize,
    kernel_size: usize,
    confidence: f64,
) -> usize {
    let w = inliers as f64 / n_samples as f64;
    let p_outlier_kernel =
        (1.0 - w.powi(kernel_size as i32)).clamp(f64::EPSILON, 1.0 - f64::EPSILON);
    let limit = ((1.0 - confidence).ln() / p_outlier_kernel.ln()).ceil();

    // saturating conversion, NaN maps to zero
    limit as usize
}
