use nalgebra::{Isometry3, Matrix3, Point3};
use thiserror::Error;

use crate::pairs::{PointPairSet, MIN_PAIRS};

/// Default error threshold used by the rigid transform fitters.
pub const DEFAULT_ERROR_THRESHOLD: f64 = 0.1;

/// Ratio between the second and the first principal spread below which a point sample
/// is treated as collinear.
const COLLINEARITY_TOLERANCE: f64 = 1e-10;

/// Error types for building a fitter.
#[derive(Debug, Error, PartialEq)]
pub enum FitterError {
    /// The correspondence arrays have different lengths.
    #[error("{left_name} has {left_len} elements but {right_name} has {right_len}")]
    MismatchedArrayLengths {
        /// Name of the first array.
        left_name: &'static str,
        /// Length of the first array.
        left_len: usize,
        /// Name of the second array.
        right_name: &'static str,
        /// Length of the second array.
        right_len: usize,
    },

    /// An uncertainty is not a finite positive number.
    #[error("{name}[{index}] = {value} is not a valid uncertainty")]
    InvalidUncertainty {
        /// Name of the uncertainty array.
        name: &'static str,
        /// Position of the offending value.
        index: usize,
        /// The offending value.
        value: f64,
    },
}

/// The capabilities a model needs to be estimated with [`crate::ransac::ransac_single_model`].
pub trait ModelFitter {
    /// The estimated model.
    type Model: Clone;
    /// The residual type returned when testing a sample against a model.
    type Real: PartialOrd + Copy;

    /// Size of the population the samples are drawn from.
    fn sample_count(&self) -> usize;

    /// Fit a model to the samples at `indices`.
    ///
    /// Returns `None` when the samples do not yield a valid model.
    fn fit_model(&self, indices: &[usize]) -> Option<Self::Model>;

    /// Residual of the sample at `index` under `model`.
    fn test_sample(&self, index: usize, model: &Self::Model) -> Self::Real;
}

/// Fits the rigid transform mapping the `p` points onto the `x` points.
#[derive(Debug, Clone, Copy)]
pub struct FitTransform<'a> {
    x: &'a [Point3<f64>],
    p: &'a [Point3<f64>],
    error_threshold: f64,
}

impl<'a> FitTransform<'a> {
    /// Create a fitter over the target points `x` and the source points `p`.
    ///
    /// A fitted model is rejected if any of the samples it was fitted to has a residual
    /// larger than `error_threshold`.
    pub fn new(
        x: &'a [Point3<f64>],
        p: &'a [Point3<f64>],
        error_threshold: f64,
    ) -> Result<Self, FitterError> {
        check_lengths("x", x.len(), "p", p.len())?;
        Ok(Self {
            x,
            p,
            error_threshold,
        })
    }

    /// The threshold used to validate fitted models.
    pub fn error_threshold(&self) -> f64 {
        self.error_threshold
    }

    /// Euclidean distance between `model * p[index]` and `x[index]`.
    fn residual(&self, index: usize, model: &Isometry3<f64>) -> f64 {
        (model * self.p[index] - self.x[index]).norm()
    }

    fn fit_validated<F>(&self, indices: &[usize], test_sample: F) -> Option<Isometry3<f64>>
    where
        F: Fn(usize, &Isometry3<f64>) -> f64,
    {
        if indices.len() < MIN_PAIRS {
            log::trace!("sample of {} indices is too small", indices.len());
            return None;
        }

        if is_collinear(indices.iter().map(|&i| &self.p[i]))
            || is_collinear(indices.iter().map(|&i| &self.x[i]))
        {
            log::trace!("degenerate sample {:?}", indices);
            return None;
        }

        let mut pairs = PointPairSet::with_capacity(indices.len());
        for &index in indices {
            let x = self.x[index];
            let p = self.p[index];
            pairs.add(x, p, (p - x).norm());
        }

        let model = pairs.get_transform().ok()?;

        // the sample has to be consistent with its own fit
        let consistent = indices
            .iter()
            .all(|&index| test_sample(index, &model) <= self.error_threshold);

        consistent.then_some(model)
    }
}

impl ModelFitter for FitTransform<'_> {
    type Model = Isometry3<f64>;
    type Real = f64;

    fn sample_count(&self) -> usize {
        self.x.len()
    }

    fn fit_model(&self, indices: &[usize]) -> Option<Self::Model> {
        self.fit_validated(indices, |index, model| self.test_sample(index, model))
    }

    fn test_sample(&self, index: usize, model: &Self::Model) -> Self::Real {
        self.residual(index, model)
    }
}

/// Like [`FitTransform`] but the residuals are normalized by per-point uncertainties.
///
/// The residual of a sample is `|model * p - x| / sqrt(x_e^2 + p_e^2)`, which allows
/// correspondences of different quality to share one threshold.
#[derive(Debug, Clone, Copy)]
pub struct FitTransformUncertain<'a> {
    base: FitTransform<'a>,
    x_e: &'a [f64],
    p_e: &'a [f64],
}

impl<'a> FitTransformUncertain<'a> {
    /// Create a fitter over the points `x` and `p` with their uncertainties `x_e` and `p_e`.
    ///
    /// Every uncertainty must be finite and strictly positive.
    pub fn new(
        x: &'a [Point3<f64>],
        p: &'a [Point3<f64>],
        x_e: &'a [f64],
        p_e: &'a [f64],
        error_threshold: f64,
    ) -> Result<Self, FitterError> {
        let base = FitTransform::new(x, p, error_threshold)?;
        check_lengths("x", x.len(), "x_e", x_e.len())?;
        check_lengths("p", p.len(), "p_e", p_e.len())?;
        check_uncertainties("x_e", x_e)?;
        check_uncertainties("p_e", p_e)?;
        Ok(Self { base, x_e, p_e })
    }

    /// The threshold used to validate fitted models.
    pub fn error_threshold(&self) -> f64 {
        self.base.error_threshold
    }
}

impl ModelFitter for FitTransformUncertain<'_> {
    type Model = Isometry3<f64>;
    type Real = f64;

    fn sample_count(&self) -> usize {
        self.base.sample_count()
    }

    fn fit_model(&self, indices: &[usize]) -> Option<Self::Model> {
        self.base
            .fit_validated(indices, |index, model| self.test_sample(index, model))
    }

    fn test_sample(&self, index: usize, model: &Self::Model) -> Self::Real {
        let e_x = self.x_e[index];
        let e_p = self.p_e[index];
        self.base.residual(index, model) / e_x.hypot(e_p)
    }
}

fn check_lengths(
    left_name: &'static str,
    left_len: usize,
    right_name: &'static str,
    right_len: usize,
) -> Result<(), FitterError> {
    if left_len != right_len {
        return Err(FitterError::MismatchedArrayLengths {
            left_name,
            left_len,
            right_name,
            right_len,
        });
    }
    Ok(())
}

fn check_uncertainties(name: &'static str, values: &[f64]) -> Result<(), FitterError> {
    match values
        .iter()
        .position(|&value| !value.is_finite() || value <= 0.0)
    {
        Some(index) => Err(FitterError::InvalidUncertainty {
            name,
            index,
            value: values[index],
        }),
        None => Ok(()),
    }
}

/// Whether the points lie on a line (or collapse onto a single point).
fn is_collinear<'a>(points: impl Iterator<Item = &'a Point3<f64>> + Clone) -> bool {
    let n = points.clone().count() as f64;
    let centroid = points
        .clone()
        .fold(Point3::<f64>::origin(), |acc, p| acc + p.coords / n);

    let scatter = points.fold(Matrix3::<f64>::zeros(), |acc, p| {
        let d = p - centroid;
        acc + d * d.transpose()
    });

    let mut spread: Vec<f64> = scatter.symmetric_eigenvalues().iter().copied().collect();
    spread.sort_by(|a, b| b.total_cmp(a));

    spread[0] <= f64::EPSILON || spread[1] <= COLLINEARITY_TOLERANCE * spread[0]
}
