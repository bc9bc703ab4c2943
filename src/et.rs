//! Elementary transforms: a single rotation or translation about one principal axis, or an
//! arbitrary static rigid transform. Rotations and translations are either constant or driven
//! by one joint variable.

use std::fmt;

use nalgebra::{Matrix3, Matrix4, Rotation3, Translation3, UnitQuaternion, Vector3, Vector6};

use crate::kinematic_traits::Pose;
use crate::kinematics_error::{KinematicsError, Result};

/// Axis kind of an elementary transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Rx,
    Ry,
    Rz,
    Tx,
    Ty,
    Tz,
    /// Arbitrary rigid transform, never a joint
    Static,
}

impl Axis {
    pub fn is_rotation(&self) -> bool {
        matches!(self, Axis::Rx | Axis::Ry | Axis::Rz)
    }

    pub fn is_translation(&self) -> bool {
        matches!(self, Axis::Tx | Axis::Ty | Axis::Tz)
    }

    /// Name as used in ETS strings: rotations capitalized, translations not.
    pub fn symbol(&self) -> &'static str {
        match self {
            Axis::Rx => "Rx",
            Axis::Ry => "Ry",
            Axis::Rz => "Rz",
            Axis::Tx => "tx",
            Axis::Ty => "ty",
            Axis::Tz => "tz",
            Axis::Static => "SE3",
        }
    }

    /// Unit vector of the principal axis. Zero for the static transform.
    pub fn unit(&self) -> Vector3<f64> {
        match self {
            Axis::Rx | Axis::Tx => Vector3::x(),
            Axis::Ry | Axis::Ty => Vector3::y(),
            Axis::Rz | Axis::Tz => Vector3::z(),
            Axis::Static => Vector3::zeros(),
        }
    }

    /// Motion subspace of a joint about this axis in its own frame, angular part first.
    pub fn motion_subspace(&self) -> Vector6<f64> {
        let u = self.unit();
        if self.is_rotation() {
            Vector6::new(u.x, u.y, u.z, 0.0, 0.0, 0.0)
        } else {
            Vector6::new(0.0, 0.0, 0.0, u.x, u.y, u.z)
        }
    }

    /// Closed form transform for a primitive axis at parameter `eta`.
    pub(crate) fn transform(&self, eta: f64) -> Pose {
        match self {
            Axis::Rx => Pose::from_parts(Translation3::identity(), UnitQuaternion::from_axis_angle(&Vector3::x_axis(), eta)),
            Axis::Ry => Pose::from_parts(Translation3::identity(), UnitQuaternion::from_axis_angle(&Vector3::y_axis(), eta)),
            Axis::Rz => Pose::from_parts(Translation3::identity(), UnitQuaternion::from_axis_angle(&Vector3::z_axis(), eta)),
            Axis::Tx => Pose::translation(eta, 0.0, 0.0),
            Axis::Ty => Pose::translation(0.0, eta, 0.0),
            Axis::Tz => Pose::translation(0.0, 0.0, eta),
            Axis::Static => Pose::identity(),
        }
    }

    /// Writes the homogeneous matrix of a primitive axis at parameter `eta` in closed form.
    pub(crate) fn matrix(&self, eta: f64) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        let (s, c) = eta.sin_cos();
        match self {
            Axis::Rx => {
                m[(1, 1)] = c;
                m[(1, 2)] = -s;
                m[(2, 1)] = s;
                m[(2, 2)] = c;
            }
            Axis::Ry => {
                m[(0, 0)] = c;
                m[(0, 2)] = s;
                m[(2, 0)] = -s;
                m[(2, 2)] = c;
            }
            Axis::Rz => {
                m[(0, 0)] = c;
                m[(0, 1)] = -s;
                m[(1, 0)] = s;
                m[(1, 1)] = c;
            }
            Axis::Tx => m[(0, 3)] = eta,
            Axis::Ty => m[(1, 3)] = eta,
            Axis::Tz => m[(2, 3)] = eta,
            Axis::Static => {}
        }
        m
    }
}

/// Elementary transform. Exactly one of the following holds: it is a joint about a primitive
/// axis, it is a constant primitive with parameter `eta`, or it is a static transform.
#[derive(Debug, Clone, PartialEq)]
pub struct ET {
    axis: Axis,
    eta: Option<f64>,
    flip: bool,
    jindex: Option<usize>,
    qlim: Option<[f64; 2]>,
    /// Precomputed for non-joints, identity for joints
    transform: Pose,
}

impl ET {
    /// General constructor. A primitive axis takes either a constant `eta` or nothing (joint);
    /// the static axis takes a homogeneous matrix only.
    pub fn try_new(axis: Axis, eta: Option<f64>, matrix: Option<&Matrix4<f64>>) -> Result<ET> {
        match (axis, eta, matrix) {
            (Axis::Static, None, Some(m)) => ET::from_matrix(m),
            (Axis::Static, _, _) => Err(KinematicsError::InvalidTransform(
                "a static transform requires a matrix and no parameter".to_string(),
            )),
            (_, _, Some(_)) => Err(KinematicsError::InvalidTransform(format!(
                "{} is a primitive axis and cannot take a matrix",
                axis.symbol()
            ))),
            (_, Some(eta), None) => ET::constant(axis, eta),
            (_, None, None) => ET::joint(axis),
        }
    }

    /// Constant transform about/along a primitive axis.
    pub fn constant(axis: Axis, eta: f64) -> Result<ET> {
        if axis == Axis::Static {
            return Err(KinematicsError::InvalidTransform(
                "a static transform cannot be given as a parameter".to_string(),
            ));
        }
        if !eta.is_finite() {
            return Err(KinematicsError::InvalidTransform(format!(
                "{}({}) is not finite",
                axis.symbol(),
                eta
            )));
        }
        Ok(ET::primitive(axis, eta))
    }

    /// Joint about/along a primitive axis.
    pub fn joint(axis: Axis) -> Result<ET> {
        if axis == Axis::Static {
            return Err(KinematicsError::InvalidTransform(
                "a static transform cannot be a joint".to_string(),
            ));
        }
        Ok(ET::variable(axis))
    }

    /// Static transform from a 4x4 homogeneous matrix. The rotation block must be orthonormal
    /// with positive determinant and the last row must be [0 0 0 1].
    pub fn from_matrix(m: &Matrix4<f64>) -> Result<ET> {
        const TOLERANCE: f64 = 1e-6;
        let rotation: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();
        let orthonormal = (rotation.transpose() * rotation - Matrix3::identity()).amax() < TOLERANCE
            && (rotation.determinant() - 1.0).abs() < TOLERANCE;
        let bottom = m[(3, 0)] == 0.0 && m[(3, 1)] == 0.0 && m[(3, 2)] == 0.0 && m[(3, 3)] == 1.0;
        if !orthonormal || !bottom {
            return Err(KinematicsError::InvalidTransform(
                "matrix is not a rigid body transform".to_string(),
            ));
        }
        let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rotation));
        let translation = Translation3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)]);
        Ok(ET::static_transform(Pose::from_parts(translation, rotation)))
    }

    pub fn static_transform(pose: Pose) -> ET {
        ET { axis: Axis::Static, eta: None, flip: false, jindex: None, qlim: None, transform: pose }
    }

    fn primitive(axis: Axis, eta: f64) -> ET {
        ET { axis, eta: Some(eta), flip: false, jindex: None, qlim: None, transform: axis.transform(eta) }
    }

    fn variable(axis: Axis) -> ET {
        ET { axis, eta: None, flip: false, jindex: None, qlim: None, transform: Pose::identity() }
    }

    pub fn rx(eta: f64) -> ET {
        ET::primitive(Axis::Rx, eta)
    }

    pub fn ry(eta: f64) -> ET {
        ET::primitive(Axis::Ry, eta)
    }

    pub fn rz(eta: f64) -> ET {
        ET::primitive(Axis::Rz, eta)
    }

    pub fn tx(eta: f64) -> ET {
        ET::primitive(Axis::Tx, eta)
    }

    pub fn ty(eta: f64) -> ET {
        ET::primitive(Axis::Ty, eta)
    }

    pub fn tz(eta: f64) -> ET {
        ET::primitive(Axis::Tz, eta)
    }

    pub fn rx_joint() -> ET {
        ET::variable(Axis::Rx)
    }

    pub fn ry_joint() -> ET {
        ET::variable(Axis::Ry)
    }

    pub fn rz_joint() -> ET {
        ET::variable(Axis::Rz)
    }

    pub fn tx_joint() -> ET {
        ET::variable(Axis::Tx)
    }

    pub fn ty_joint() -> ET {
        ET::variable(Axis::Ty)
    }

    pub fn tz_joint() -> ET {
        ET::variable(Axis::Tz)
    }

    /// Negates the joint variable before evaluation. No effect on constants.
    pub fn flipped(mut self) -> ET {
        if self.is_joint() {
            self.flip = !self.flip;
        }
        self
    }

    pub fn with_jindex(mut self, jindex: usize) -> ET {
        if self.is_joint() {
            self.jindex = Some(jindex);
        }
        self
    }

    pub fn with_qlim(mut self, lower: f64, upper: f64) -> ET {
        self.qlim = Some([lower, upper]);
        self
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    /// Constant parameter, `None` for joints and static transforms.
    pub fn eta(&self) -> Option<f64> {
        self.eta
    }

    pub fn is_joint(&self) -> bool {
        self.eta.is_none() && self.axis != Axis::Static
    }

    pub fn is_flipped(&self) -> bool {
        self.flip
    }

    pub fn is_rotation(&self) -> bool {
        self.axis.is_rotation()
    }

    pub fn is_translation(&self) -> bool {
        self.axis.is_translation()
    }

    pub fn jindex(&self) -> Option<usize> {
        self.jindex
    }

    pub fn qlim(&self) -> Option<[f64; 2]> {
        self.qlim
    }

    pub(crate) fn set_jindex(&mut self, jindex: usize) {
        self.jindex = Some(jindex);
    }

    /// Transform at joint value `q`. The value is ignored for non-joints.
    pub fn eval(&self, q: f64) -> Pose {
        if self.is_joint() {
            self.axis.transform(if self.flip { -q } else { q })
        } else {
            self.transform
        }
    }

    /// Homogeneous 4x4 matrix at joint value `q`.
    pub fn matrix(&self, q: f64) -> Matrix4<f64> {
        if self.is_joint() {
            self.axis.matrix(if self.flip { -q } else { q })
        } else {
            self.transform.to_homogeneous()
        }
    }

    /// Inverse transform. A joint becomes its flipped copy, a constant primitive is negated and
    /// a static transform is inverted.
    pub fn inv(&self) -> ET {
        if self.is_joint() {
            let mut inverse = self.clone();
            inverse.flip = !self.flip;
            inverse
        } else {
            match self.eta {
                Some(eta) => ET { qlim: self.qlim, ..ET::primitive(self.axis, -eta) },
                None => ET::static_transform(self.transform.inverse()),
            }
        }
    }
}

impl fmt::Display for ET {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.axis == Axis::Static {
            let t = self.transform.translation.vector;
            let (r, p, y) = self.transform.rotation.euler_angles();
            return write!(f, "SE3({}, {}, {}; {}, {}, {})", t.x, t.y, t.z, r, p, y);
        }
        match self.eta {
            Some(eta) => write!(f, "{}({})", self.axis.symbol(), eta),
            None => {
                let sign = if self.flip { "-" } else { "" };
                match self.jindex {
                    Some(j) => write!(f, "{}({}q{})", self.axis.symbol(), sign, j),
                    None => write!(f, "{}({}q)", self.axis.symbol(), sign),
                }
            }
        }
    }
}
