//! Second order kinematics: the manipulator Hessian, Yoshikawa manipulability and its
//! gradient with respect to the joint coordinates.

use std::str::FromStr;

use bitflags::bitflags;
use nalgebra::{DMatrix, DVector, Matrix6xX, Vector3};

use crate::kinematics_error::{KinematicsError, Result};
use crate::path::Span;
use crate::robot::Robot;

bitflags! {
    /// Task space rows manipulability is measured over.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Axes: u8 {
        const TX = 0b0000_0001;
        const TY = 0b0000_0010;
        const TZ = 0b0000_0100;
        const RX = 0b0000_1000;
        const RY = 0b0001_0000;
        const RZ = 0b0010_0000;

        const TRANS = Self::TX.bits() | Self::TY.bits() | Self::TZ.bits();
        const ROT = Self::RX.bits() | Self::RY.bits() | Self::RZ.bits();
        const ALL = Self::TRANS.bits() | Self::ROT.bits();
    }
}

impl Axes {
    /// Jacobian rows selected, in ascending order.
    pub fn rows(&self) -> Vec<usize> {
        (0..6).filter(|k| self.bits() & (1 << k) != 0).collect()
    }
}

impl FromStr for Axes {
    type Err = KinematicsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(Axes::ALL),
            "trans" => Ok(Axes::TRANS),
            "rot" => Ok(Axes::ROT),
            _ => Err(KinematicsError::InvalidSelector { what: "axes", value: s.to_string() }),
        }
    }
}

/// Manipulator Hessian, a 6 x n x n tensor stored as n slices of 6 x n.
/// `slice(j)` is the partial derivative of the geometric Jacobian with respect to joint `j`.
/// Its translational part is symmetric in the two joint indices.
#[derive(Debug, Clone, PartialEq)]
pub struct Hessian {
    slices: Vec<Matrix6xX<f64>>,
}

impl Hessian {
    /// Computes the Hessian from a base-frame geometric Jacobian.
    pub fn from_jacobian(jacobian: &Matrix6xX<f64>) -> Hessian {
        let n = jacobian.ncols();
        let linear = |k: usize| -> Vector3<f64> { jacobian.fixed_view::<3, 1>(0, k).into_owned() };
        let angular = |k: usize| -> Vector3<f64> { jacobian.fixed_view::<3, 1>(3, k).into_owned() };

        let mut slices = vec![Matrix6xX::zeros(n); n];
        for j in 0..n {
            let w = angular(j);
            for i in j..n {
                let d_linear = w.cross(&linear(i));
                let d_angular = w.cross(&angular(i));
                slices[j].fixed_view_mut::<3, 1>(0, i).copy_from(&d_linear);
                slices[j].fixed_view_mut::<3, 1>(3, i).copy_from(&d_angular);
                if i != j {
                    slices[i].fixed_view_mut::<3, 1>(0, j).copy_from(&d_linear);
                }
            }
        }
        Hessian { slices }
    }

    pub fn n(&self) -> usize {
        self.slices.len()
    }

    /// Derivative of the Jacobian with respect to joint `j`.
    pub fn slice(&self, j: usize) -> &Matrix6xX<f64> {
        &self.slices[j]
    }

    pub fn slices(&self) -> &[Matrix6xX<f64>] {
        &self.slices
    }

    /// Element `H[row, i, j]`: derivative of `J[row, i]` with respect to joint `j`.
    pub fn get(&self, row: usize, i: usize, j: usize) -> f64 {
        self.slices[j][(row, i)]
    }
}

fn select_rows(m: &Matrix6xX<f64>, rows: &[usize]) -> DMatrix<f64> {
    DMatrix::from_fn(rows.len(), m.ncols(), |r, c| m[(rows[r], c)])
}

/// Yoshikawa manipulability `sqrt(det(J J^T))` over the selected rows.
pub fn manipulability(jacobian: &Matrix6xX<f64>, axes: Axes) -> f64 {
    let j = select_rows(jacobian, &axes.rows());
    (&j * j.transpose()).determinant().max(0.0).sqrt()
}

/// Gradient of the manipulability with respect to the joint coordinates.
pub fn jacobm(jacobian: &Matrix6xX<f64>, hessian: &Hessian, axes: Axes) -> Result<DVector<f64>> {
    let rows = axes.rows();
    let j = select_rows(jacobian, &rows);
    let jjt = &j * j.transpose();
    let m = jjt.determinant().max(0.0).sqrt();
    let b = jjt.try_inverse().ok_or(KinematicsError::Singular("J J^T"))?;
    let gradient = (0..hessian.n()).map(|k| {
        let c = &j * select_rows(hessian.slice(k), &rows).transpose();
        m * c.component_mul(&b).sum()
    });
    Ok(DVector::from_iterator(hessian.n(), gradient))
}

impl Robot {
    /// Rejects spans ending in a gripper and returns the joint count of the path.
    fn second_order_path(&self, span: &Span) -> Result<usize> {
        let path = self.get_path(span)?;
        if path.gripper().is_some() {
            return Err(KinematicsError::Unsupported("second order kinematics of a gripper path".to_string()));
        }
        Ok(path.n())
    }

    fn check_jacobian(&self, jacobian: &Matrix6xX<f64>, n: usize) -> Result<()> {
        if jacobian.ncols() != n {
            return Err(KinematicsError::ShapeMismatch {
                what: "Jacobian",
                expected: (6, n),
                found: jacobian.shape(),
            });
        }
        Ok(())
    }

    /// Manipulator Hessian in the base frame.
    pub fn hessian0(&self, q: &[f64], span: &Span) -> Result<Hessian> {
        self.second_order_path(span)?;
        Ok(Hessian::from_jacobian(&self.jacob0(q, span)?))
    }

    /// Manipulator Hessian from an already computed base-frame Jacobian of the span.
    pub fn hessian0_from_jacobian(&self, jacobian: &Matrix6xX<f64>, span: &Span) -> Result<Hessian> {
        let n = self.second_order_path(span)?;
        self.check_jacobian(jacobian, n)?;
        Ok(Hessian::from_jacobian(jacobian))
    }

    pub fn manipulability(&self, q: &[f64], span: &Span, axes: Axes) -> Result<f64> {
        Ok(manipulability(&self.jacob0(q, span)?, axes))
    }

    /// Manipulability Jacobian: the gradient of the manipulability over `axes`.
    pub fn jacobm(&self, q: &[f64], span: &Span, axes: Axes) -> Result<DVector<f64>> {
        self.second_order_path(span)?;
        let jacobian = self.jacob0(q, span)?;
        jacobm(&jacobian, &Hessian::from_jacobian(&jacobian), axes)
    }

    /// Manipulability Jacobian from a precomputed Jacobian and optionally Hessian of the span.
    pub fn jacobm_from(
        &self,
        jacobian: &Matrix6xX<f64>,
        hessian: Option<&Hessian>,
        span: &Span,
        axes: Axes,
    ) -> Result<DVector<f64>> {
        let n = self.second_order_path(span)?;
        self.check_jacobian(jacobian, n)?;
        match hessian {
            Some(hessian) if hessian.n() != n => Err(KinematicsError::ShapeMismatch {
                what: "Hessian",
                expected: (n, n),
                found: (hessian.n(), hessian.slices().first().map_or(0, |s| s.ncols())),
            }),
            Some(hessian) => jacobm(jacobian, hessian, axes),
            None => jacobm(jacobian, &Hessian::from_jacobian(jacobian), axes),
        }
    }
}
