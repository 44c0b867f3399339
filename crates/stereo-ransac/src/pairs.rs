//! Closed-form absolute orientation over a set of 3D point pairs.
//!
//! Reference: [Besl & McKay, PAMI 1992](https://doi.org/10.1109/34.121791), section III.C,
//! which builds on [Horn, JOSA A 1987](https://doi.org/10.1364/JOSAA.4.000629).

use std::cmp::Ordering;

use nalgebra::{
    Isometry3, Matrix3, Matrix4, Point3, Quaternion, Translation3, UnitQuaternion, Vector3,
};
use thiserror::Error;

/// Minimum number of pairs needed to estimate a rigid transform.
pub const MIN_PAIRS: usize = 3;

/// Error types for the point pair solver.
#[derive(Debug, Error, PartialEq)]
pub enum PointPairError {
    /// Not enough pairs to constrain a rigid transform.
    #[error("rigid alignment requires at least {required} point pairs, got {actual}")]
    InsufficientPairs {
        /// Minimum number of pairs required.
        required: usize,
        /// Number of pairs available.
        actual: usize,
    },
}

/// A single correspondence between `x[index]` and `p[index]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrespondencePair {
    /// Index into the point arrays of the owning [`PointPairSet`].
    pub index: usize,
    /// Distance associated with the pair when it was added.
    pub distance: f64,
}

impl CorrespondencePair {
    /// Order two pairs by ascending distance.
    pub fn cmp_by_distance(&self, other: &Self) -> Ordering {
        self.distance.total_cmp(&other.distance)
    }
}

/// A set of point pairs from which the rigid transform aligning `p` onto `x` is computed.
///
/// Points are only appended; [`PointPairSet::trim`] drops pair records but keeps the
/// underlying points so the indices of the remaining pairs stay valid.
#[derive(Debug, Clone, Default)]
pub struct PointPairSet {
    x: Vec<Point3<f64>>,
    p: Vec<Point3<f64>>,
    pairs: Vec<CorrespondencePair>,
    mse: Option<f64>,
}

impl PointPairSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty set with room for `capacity` pairs.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            p: Vec::with_capacity(capacity),
            pairs: Vec::with_capacity(capacity),
            mse: None,
        }
    }

    /// Add the pair (`a` in the target frame, `b` in the source frame) with its distance.
    pub fn add(&mut self, a: Point3<f64>, b: Point3<f64>, distance: f64) {
        self.pairs.push(CorrespondencePair {
            index: self.x.len(),
            distance,
        });
        self.x.push(a);
        self.p.push(b);
    }

    /// Keep only the `n` pairs with the lowest distance.
    ///
    /// Returns the largest distance among the retained pairs, or `NaN` when no pair is left.
    pub fn trim(&mut self, n: usize) -> f64 {
        self.pairs.sort_by(CorrespondencePair::cmp_by_distance);
        self.pairs.truncate(n);

        self.pairs.last().map_or(f64::NAN, |pair| pair.distance)
    }

    /// Compute the transform that, applied to the `p` points, minimizes the squared
    /// distance to the corresponding `x` points.
    ///
    /// On success the mean square error is set to the mean of the squared pair distances.
    pub fn get_transform(&mut self) -> Result<Isometry3<f64>, PointPairError> {
        if self.pairs.len() < MIN_PAIRS {
            return Err(PointPairError::InsufficientPairs {
                required: MIN_PAIRS,
                actual: self.pairs.len(),
            });
        }

        // means and cross-covariance of p and x
        let mut mu_x = Vector3::<f64>::zeros();
        let mut mu_p = Vector3::<f64>::zeros();
        let mut sigma_px = Matrix3::<f64>::zeros();
        let mut mu_d = 0.0;

        for pair in &self.pairs {
            let xv = self.x[pair.index].coords;
            let pv = self.p[pair.index].coords;

            mu_d += pair.distance * pair.distance;
            mu_x += xv;
            mu_p += pv;
            sigma_px += pv * xv.transpose();
        }

        let n_inv = 1.0 / self.pairs.len() as f64;
        mu_x *= n_inv;
        mu_p *= n_inv;
        mu_d *= n_inv;
        sigma_px = sigma_px * n_inv - mu_p * mu_x.transpose();

        let rotation = optimal_rotation(&sigma_px);
        let translation = mu_x - rotation * mu_p;

        self.mse = Some(mu_d);

        Ok(Isometry3::from_parts(
            Translation3::from(translation),
            rotation,
        ))
    }

    /// Mean square error of the last successful [`PointPairSet::get_transform`] call.
    pub fn mean_square_error(&self) -> Option<f64> {
        self.mse
    }

    /// Number of pairs in the set.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether the set holds no pairs.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Remove all pairs and points.
    pub fn clear(&mut self) {
        self.pairs.clear();
        self.x.clear();
        self.p.clear();
        self.mse = None;
    }

    /// Points in the target frame.
    pub fn x(&self) -> &[Point3<f64>] {
        &self.x
    }

    /// Points in the source frame.
    pub fn p(&self) -> &[Point3<f64>] {
        &self.p
    }

    /// The pair records, sorted by distance after a call to [`PointPairSet::trim`].
    pub fn pairs(&self) -> &[CorrespondencePair] {
        &self.pairs
    }
}

/// Rotation maximizing the correlation described by the cross-covariance `sigma`.
fn optimal_rotation(sigma: &Matrix3<f64>) -> UnitQuaternion<f64> {
    let trace = sigma.trace();
    let a = sigma - sigma.transpose();
    let delta = Vector3::new(a[(1, 2)], a[(2, 0)], a[(0, 1)]);
    let block = sigma + sigma.transpose() - Matrix3::identity() * trace;

    let mut q = Matrix4::<f64>::zeros();
    q[(0, 0)] = trace;
    for i in 0..3 {
        q[(0, i + 1)] = delta[i];
        q[(i + 1, 0)] = delta[i];
        for j in 0..3 {
            q[(i + 1, j + 1)] = block[(i, j)];
        }
    }

    let eig = q.symmetric_eigen();
    let max_eigv = eig.eigenvectors.column(eig.eigenvalues.imax());

    UnitQuaternion::from_quaternion(Quaternion::new(
        max_eigv[0],
        max_eigv[1],
        max_eigv[2],
        max_eigv[3],
    ))
}
