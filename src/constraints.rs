use std::f64::consts::PI;

use nalgebra::{DVector, Matrix2xX};
use rand::Rng;

use crate::kinematics_error::{KinematicsError, Result};

/// Joint limits of a robot, one `[from, to]` pair per joint.
#[derive(Clone, Debug, PartialEq)]
pub struct Constraints {
    /// Lower limit. Equal to the upper limit (or NaN) if the joint is not constrained
    pub from: DVector<f64>,

    /// Upper limit
    pub to: DVector<f64>,
}

impl Constraints {
    pub fn new(from: Vec<f64>, to: Vec<f64>) -> Result<Self> {
        if from.len() != to.len() {
            return Err(KinematicsError::InvalidLength {
                what: "joint limits",
                expected: from.len().to_string(),
                found: to.len(),
            });
        }
        Ok(Constraints { from: DVector::from_vec(from), to: DVector::from_vec(to) })
    }

    /// Limits from per-joint pairs, `None` for unconstrained joints.
    pub fn from_pairs(pairs: &[Option<[f64; 2]>]) -> Self {
        let from = pairs.iter().map(|p| p.map_or(0.0, |[lower, _]| lower));
        let to = pairs.iter().map(|p| p.map_or(0.0, |[_, upper]| upper));
        Constraints { from: DVector::from_iterator(pairs.len(), from), to: DVector::from_iterator(pairs.len(), to) }
    }

    pub fn n(&self) -> usize {
        self.from.len()
    }

    /// True if joint `i` has a usable limit pair.
    pub fn is_constrained(&self, i: usize) -> bool {
        let (from, to) = (self.from[i], self.to[i]);
        from != to && !from.is_nan() && !to.is_nan()
    }

    /// True if at least one joint is constrained.
    pub fn valid(&self) -> bool {
        (0..self.n()).any(|i| self.is_constrained(i))
    }

    /// Per joint, true if the value is outside its limits. Unconstrained joints never are.
    pub fn exceeded(&self, angles: &[f64]) -> Vec<bool> {
        (0..self.n())
            .map(|i| self.is_constrained(i) && (angles[i] < self.from[i] || angles[i] > self.to[i]))
            .collect()
    }

    pub fn compliant(&self, angles: &[f64]) -> bool {
        angles.len() == self.n() && !self.exceeded(angles).into_iter().any(|e| e)
    }

    pub fn filter(&self, angles: &[Vec<f64>]) -> Vec<Vec<f64>> {
        angles.iter()
            .filter(|angle_array| self.compliant(angle_array))
            .cloned()
            .collect()
    }

    /// Limits as a 2 x n matrix, lower limits in the first row.
    pub fn as_matrix(&self) -> Matrix2xX<f64> {
        Matrix2xX::from_fn(self.n(), |row, col| if row == 0 { self.from[col] } else { self.to[col] })
    }

    /// Uniformly distributed joint values within the limits, [-pi, pi] for unconstrained joints.
    pub fn random<R: Rng>(&self, rng: &mut R) -> DVector<f64> {
        DVector::from_fn(self.n(), |i, _| {
            if self.is_constrained(i) {
                let (lower, upper) = (self.from[i].min(self.to[i]), self.from[i].max(self.to[i]));
                rng.gen_range(lower..=upper)
            } else {
                rng.gen_range(-PI..=PI)
            }
        })
    }
}
