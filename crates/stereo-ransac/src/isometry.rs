//! Isometry filter: keep the correspondences consistent with a single rigid motion.

use nalgebra::{Isometry3, Point3};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fitter::{FitTransform, FitTransformUncertain, FitterError, ModelFitter};
use crate::pairs::{PointPairError, PointPairSet, MIN_PAIRS};
use crate::ransac::{ransac_single_model, RansacError, RansacParams};

/// Error types for the isometry filter.
#[derive(Debug, Error)]
pub enum IsometryFilterError {
    /// The configuration is not usable.
    #[error("invalid isometry filter configuration: {0}")]
    InvalidConfig(&'static str),
    /// The correspondences could not be wrapped in a fitter.
    #[error(transparent)]
    Fitter(#[from] FitterError),
    /// RANSAC did not find a model.
    #[error(transparent)]
    Ransac(#[from] RansacError),
    /// The refit on the inliers failed.
    #[error(transparent)]
    PointPairs(#[from] PointPairError),
}

/// Configuration of the isometry filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsometryFilterConfig {
    /// Maximum number of RANSAC steps.
    pub max_steps: usize,
    /// Residual below which a correspondence is an inlier.
    pub threshold: f64,
    /// Number of correspondences per RANSAC kernel.
    pub kernel_size: usize,
    /// Desired probability of drawing an outlier-free kernel.
    pub confidence: f64,
    /// Whether to refit the transform on the inliers.
    pub refine: bool,
    /// Fraction of the inliers, by lowest residual, used for the refit.
    pub trim_ratio: f64,
    /// Optional fixed seed for reproducible sampling.
    pub random_seed: Option<u64>,
}

impl Default for IsometryFilterConfig {
    fn default() -> Self {
        Self {
            max_steps: 1000,
            threshold: 0.1,
            kernel_size: MIN_PAIRS,
            confidence: 0.99,
            refine: true,
            trim_ratio: 1.0,
            random_seed: None,
        }
    }
}

impl IsometryFilterConfig {
    /// Check that the configuration can be used to run the filter.
    pub fn validate(&self) -> Result<(), IsometryFilterError> {
        if self.max_steps == 0 {
            return Err(IsometryFilterError::InvalidConfig(
                "max_steps must be greater than zero",
            ));
        }
        if !(self.threshold > 0.0) {
            return Err(IsometryFilterError::InvalidConfig(
                "threshold must be positive",
            ));
        }
        if self.kernel_size < MIN_PAIRS {
            return Err(IsometryFilterError::InvalidConfig(
                "kernel_size must be at least 3",
            ));
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(IsometryFilterError::InvalidConfig(
                "confidence must be in (0, 1)",
            ));
        }
        if !(self.trim_ratio > 0.0 && self.trim_ratio <= 1.0) {
            return Err(IsometryFilterError::InvalidConfig(
                "trim_ratio must be in (0, 1]",
            ));
        }
        Ok(())
    }
}

/// Output of the isometry filter.
#[derive(Debug, Clone)]
pub struct IsometryFilterResult {
    /// Transform mapping the source points onto the target points.
    pub transform: Isometry3<f64>,
    /// Ascending indices of the inlier correspondences.
    pub inliers: Vec<usize>,
    /// Root mean square distance between the transformed source and target inliers.
    pub rmse: f64,
    /// Number of RANSAC iterations performed.
    pub iterations: usize,
}

/// Estimate the rigid motion mapping `p` onto `x` and the correspondences consistent with it.
///
/// # Arguments
///
/// * `x` - Points in the target frame.
/// * `p` - Corresponding points in the source frame.
/// * `config` - The filter configuration.
///
/// Example:
///
/// ```
/// use nalgebra::{Isometry3, Point3, Vector3};
/// use stereo_ransac::isometry::{filter_isometry, IsometryFilterConfig};
///
/// let motion = Isometry3::new(Vector3::new(0.5, 0.0, 1.0), Vector3::new(0.0, 0.2, 0.0));
/// let p = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
///     Point3::new(0.0, 0.0, 1.0),
/// ];
/// let x: Vec<Point3<f64>> = p.iter().map(|p| motion * p).collect();
///
/// let config = IsometryFilterConfig {
///     random_seed: Some(0),
///     ..Default::default()
/// };
/// let result = filter_isometry(&x, &p, &config)?;
/// assert_eq!(result.inliers, vec![0, 1, 2, 3]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn filter_isometry(
    x: &[Point3<f64>],
    p: &[Point3<f64>],
    config: &IsometryFilterConfig,
) -> Result<IsometryFilterResult, IsometryFilterError> {
    config.validate()?;
    let fitter = FitTransform::new(x, p, config.threshold)?;
    log::debug!(
        "isometry filter over {} pairs, error threshold {}",
        fitter.sample_count(),
        fitter.error_threshold()
    );
    run_filter(&fitter, x, p, config)
}

/// Like [`filter_isometry`] but residuals are normalized by the per-point uncertainties
/// `x_e` and `p_e` before being compared with the threshold.
pub fn filter_isometry_uncertain(
    x: &[Point3<f64>],
    p: &[Point3<f64>],
    x_e: &[f64],
    p_e: &[f64],
    config: &IsometryFilterConfig,
) -> Result<IsometryFilterResult, IsometryFilterError> {
    config.validate()?;
    let fitter = FitTransformUncertain::new(x, p, x_e, p_e, config.threshold)?;
    log::debug!(
        "uncertain isometry filter over {} pairs, normalized error threshold {}",
        fitter.sample_count(),
        fitter.error_threshold()
    );
    run_filter(&fitter, x, p, config)
}

fn run_filter<F>(
    fitter: &F,
    x: &[Point3<f64>],
    p: &[Point3<f64>],
    config: &IsometryFilterConfig,
) -> Result<IsometryFilterResult, IsometryFilterError>
where
    F: ModelFitter<Model = Isometry3<f64>, Real = f64>,
{
    let mut rng = match config.random_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => {
            let mut tr = rand::rng();
            StdRng::from_rng(&mut tr)
        }
    };

    let params = RansacParams {
        kernel_size: config.kernel_size,
        fitness_threshold: config.threshold,
        hard_iter_limit: config.max_steps,
        confidence: config.confidence,
    };
    let ransac = ransac_single_model(fitter, &params, &mut rng)?;

    let transform = if config.refine && ransac.inliers.len() >= MIN_PAIRS {
        let mut pairs = PointPairSet::with_capacity(ransac.inliers.len());
        for &i in &ransac.inliers {
            pairs.add(x[i], p[i], fitter.test_sample(i, &ransac.model));
        }

        let keep = ((config.trim_ratio * ransac.inliers.len() as f64).ceil() as usize)
            .max(MIN_PAIRS);
        let cutoff = pairs.trim(keep);
        let refined = pairs.get_transform()?;
        log::debug!(
            "refit on {} of {} inliers, residual cutoff {:.4}, mse {:?}",
            pairs.len(),
            ransac.inliers.len(),
            cutoff,
            pairs.mean_square_error()
        );
        refined
    } else {
        ransac.model
    };

    let sum_sq: f64 = ransac
        .inliers
        .iter()
        .map(|&i| (transform * p[i] - x[i]).norm_squared())
        .sum();
    let rmse = (sum_sq / ransac.inliers.len() as f64).sqrt();

    Ok(IsometryFilterResult {
        transform,
        inliers: ransac.inliers,
        rmse,
        iterations: ransac.iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Translation3, UnitQuaternion, Vector3};
    use rand::Rng;

    fn ground_truth() -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::new(-0.3, 0.8, 1.5),
            UnitQuaternion::from_euler_angles(0.1, -0.2, 0.35),
        )
    }

    /// Noisy correspondences where every fifth one is displaced far away.
    fn noisy_scene(seed: u64) -> (Vec<Point3<f64>>, Vec<Point3<f64>>, Vec<usize>) {
        let gt = ground_truth();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut x = Vec::new();
        let mut p = Vec::new();
        let mut inliers = Vec::new();
        for i in 0..60 {
            let src = Point3::new(
                rng.random_range(-2.0..2.0),
                rng.random_range(-2.0..2.0),
                rng.random_range(2.0..6.0),
            );
            let noise = Vector3::new(
                rng.random_range(-0.002..0.002),
                rng.random_range(-0.002..0.002),
                rng.random_range(-0.002..0.002),
            );
            let mut dst = gt * src + noise;
            if i % 5 == 0 {
                let direction = Vector3::new(
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                );
                dst += direction.normalize() * rng.random_range(1.0..3.0);
            } else {
                inliers.push(i);
            }
            x.push(dst);
            p.push(src);
        }
        (x, p, inliers)
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = IsometryFilterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_steps, 1000);
        assert_eq!(config.threshold, 0.1);
    }

    #[test]
    fn test_invalid_config() {
        let invalid = [
            IsometryFilterConfig {
                max_steps: 0,
                ..Default::default()
            },
            IsometryFilterConfig {
                threshold: 0.0,
                ..Default::default()
            },
            IsometryFilterConfig {
                threshold: f64::NAN,
                ..Default::default()
            },
            IsometryFilterConfig {
                kernel_size: 2,
                ..Default::default()
            },
            IsometryFilterConfig {
                confidence: 1.0,
                ..Default::default()
            },
            IsometryFilterConfig {
                trim_ratio: 0.0,
                ..Default::default()
            },
            IsometryFilterConfig {
                trim_ratio: 1.5,
                ..Default::default()
            },
        ];
        for config in invalid {
            assert!(matches!(
                config.validate(),
                Err(IsometryFilterError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_config_from_json() -> Result<(), serde_json::Error> {
        let config: IsometryFilterConfig =
            serde_json::from_str(r#"{ "max_steps": 250, "threshold": 0.05, "random_seed": 7 }"#)?;
        assert_eq!(config.max_steps, 250);
        assert_eq!(config.threshold, 0.05);
        assert_eq!(config.random_seed, Some(7));
        // missing fields fall back to the defaults
        assert_eq!(config.kernel_size, 3);
        assert!(config.refine);

        let json = serde_json::to_string(&config)?;
        let decoded: IsometryFilterConfig = serde_json::from_str(&json)?;
        assert_eq!(decoded, config);
        Ok(())
    }

    #[test]
    fn test_filter_isometry_with_outliers() -> Result<(), IsometryFilterError> {
        let (x, p, expected_inliers) = noisy_scene(11);
        let config = IsometryFilterConfig {
            threshold: 0.1,
            random_seed: Some(3),
            ..Default::default()
        };

        let result = filter_isometry(&x, &p, &config)?;
        assert_eq!(result.inliers, expected_inliers);
        assert!(result.rmse < 0.02);

        let gt = ground_truth();
        assert_relative_eq!(
            result.transform.translation.vector,
            gt.translation.vector,
            epsilon = 0.02
        );
        assert!(result.transform.rotation.angle_to(&gt.rotation) < 0.01);
        Ok(())
    }

    #[test]
    fn test_filter_isometry_trimmed_refit() -> Result<(), IsometryFilterError> {
        let (x, p, expected_inliers) = noisy_scene(23);
        let config = IsometryFilterConfig {
            trim_ratio: 0.5,
            random_seed: Some(9),
            ..Default::default()
        };

        let result = filter_isometry(&x, &p, &config)?;
        assert_eq!(result.inliers, expected_inliers);
        let gt = ground_truth();
        assert!(result.transform.rotation.angle_to(&gt.rotation) < 0.01);
        Ok(())
    }

    #[test]
    fn test_filter_isometry_without_refine() -> Result<(), IsometryFilterError> {
        let (x, p, expected_inliers) = noisy_scene(5);
        let config = IsometryFilterConfig {
            refine: false,
            random_seed: Some(1),
            ..Default::default()
        };

        let result = filter_isometry(&x, &p, &config)?;
        assert_eq!(result.inliers, expected_inliers);
        assert!(result.rmse < config.threshold);
        Ok(())
    }

    #[test]
    fn test_filter_isometry_uncertain() -> Result<(), IsometryFilterError> {
        let (x, p, expected_inliers) = noisy_scene(17);
        // uncertainties of 0.05 on both sides scale the residuals by about 14
        let e = vec![0.05; x.len()];
        let config = IsometryFilterConfig {
            threshold: 1.5,
            random_seed: Some(4),
            ..Default::default()
        };

        let result = filter_isometry_uncertain(&x, &p, &e, &e, &config)?;
        assert_eq!(result.inliers, expected_inliers);
        Ok(())
    }

    #[test]
    fn test_filter_isometry_errors() {
        let x = vec![Point3::origin(); 4];
        let p = vec![Point3::origin(); 3];
        let config = IsometryFilterConfig::default();
        assert!(matches!(
            filter_isometry(&x, &p, &config),
            Err(IsometryFilterError::Fitter(_))
        ));

        let p = vec![Point3::origin(); 2];
        let x = vec![Point3::origin(); 2];
        assert!(matches!(
            filter_isometry(&x, &p, &config),
            Err(IsometryFilterError::Ransac(
                RansacError::InsufficientSamples { .. }
            ))
        ));
    }

    #[test]
    fn test_filter_isometry_uncertain_rejects_zero_uncertainty() {
        let (x, p, _) = noisy_scene(5);
        let e = vec![0.0; x.len()];
        let config = IsometryFilterConfig {
            random_seed: Some(5),
            ..Default::default()
        };
        assert!(matches!(
            filter_isometry_uncertain(&x, &p, &e, &e, &config),
            Err(IsometryFilterError::Fitter(
                FitterError::InvalidUncertainty { index: 0, .. }
            ))
        ));
    }
}
