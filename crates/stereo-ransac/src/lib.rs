#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Stereo RANSAC
//!
//! Estimation of the rigid motion between two sets of corresponding 3D points, e.g. the
//! triangulated features of two stereo frames, in the presence of wrong matches.
//!
//! ## Key Features
//!
//! - **Closed-form alignment**: quaternion based absolute orientation on point pairs
//! - **Generic RANSAC**: works with any [`ModelFitter`]
//! - **Uncertainty weighting**: residuals normalized by per-point uncertainties
//! - **Reproducible**: the random number generator is always passed explicitly
//!
//! ## Example: RANSAC over correspondences
//!
//! ```rust
//! use nalgebra::{Isometry3, Point3, Vector3};
//! use rand::{rngs::StdRng, SeedableRng};
//! use stereo_ransac::{ransac_single_model, FitTransform, RansacParams};
//!
//! let motion = Isometry3::new(Vector3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 0.0, 0.3));
//! let p = vec![
//!     Point3::new(0.0, 0.0, 1.0),
//!     Point3::new(1.0, 0.0, 1.0),
//!     Point3::new(0.0, 1.0, 2.0),
//!     Point3::new(1.0, 1.0, 3.0),
//!     Point3::new(-1.0, 0.5, 1.5),
//! ];
//! let mut x: Vec<Point3<f64>> = p.iter().map(|p| motion * p).collect();
//! // a wrong match
//! x[4] = Point3::new(10.0, -4.0, 7.0);
//!
//! let fitter = FitTransform::new(&x, &p, 0.05)?;
//! let params = RansacParams {
//!     fitness_threshold: 0.05,
//!     ..Default::default()
//! };
//! let mut rng = StdRng::seed_from_u64(42);
//! let result = ransac_single_model(&fitter, &params, &mut rng)?;
//!
//! assert_eq!(result.inliers, vec![0, 1, 2, 3]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Model fitters used by RANSAC.
pub mod fitter;

/// Isometry filter over stereo feature correspondences.
pub mod isometry;

/// Closed-form rigid alignment of point pairs.
pub mod pairs;

/// RANSAC robust estimation.
pub mod ransac;

/// Random index sampling.
pub mod sampler;

pub use fitter::{FitTransform, FitTransformUncertain, FitterError, ModelFitter};
pub use isometry::{
    filter_isometry, filter_isometry_uncertain, IsometryFilterConfig, IsometryFilterError,
    IsometryFilterResult,
};
pub use pairs::{CorrespondencePair, PointPairError, PointPairSet};
pub use ransac::{ransac_single_model, RansacError, RansacParams, RansacResult};
pub use sampler::pick_random_index;
