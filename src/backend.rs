//! Evaluation backends. The reference backend multiplies every elementary transform of every
//! link in turn. The compiled backend folds the constant transforms of each link into one
//! matrix before and one after the joint, so that a link costs at most two matrix products.

use std::str::FromStr;
use std::sync::Arc;

use nalgebra::{Matrix3, Matrix4, Matrix6xX, Vector3, Vector6};

use crate::et::Axis;
use crate::ets::ETS;
use crate::kinematic_traits::{Chain, JointSource, JointValues, KinematicsBackend, Pose};
use crate::kinematics_error::KinematicsError;
use crate::link::Link;
use crate::utils::matrix_to_pose;

/// Link reduced to `pre * op(q) * post`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledLink {
    pre: Matrix4<f64>,
    joint: Option<(Axis, bool)>,
    post: Option<Matrix4<f64>>,
}

impl CompiledLink {
    /// Folds constants around the first joint of the sequence.
    pub fn compile(ets: &ETS) -> CompiledLink {
        let mut pre = Matrix4::identity();
        let mut joint = None;
        let mut post: Option<Matrix4<f64>> = None;
        for et in ets {
            if joint.is_none() {
                if et.is_joint() {
                    joint = Some((et.axis(), et.is_flipped()));
                } else {
                    pre *= et.matrix(0.0);
                }
            } else {
                let m = et.matrix(0.0);
                post = Some(post.map_or(m, |p| p * m));
            }
        }
        CompiledLink { pre, joint, post }
    }

    /// Frame right after the joint transform.
    pub fn joint_frame(&self, q: f64) -> Matrix4<f64> {
        match self.joint {
            Some((axis, flip)) => self.pre * axis.matrix(if flip { -q } else { q }),
            None => self.pre,
        }
    }

    pub fn matrix(&self, q: f64) -> Matrix4<f64> {
        let frame = self.joint_frame(q);
        match &self.post {
            Some(post) => frame * post,
            None => frame,
        }
    }

    pub fn pose(&self, q: f64) -> Pose {
        matrix_to_pose(&self.matrix(q))
    }

    pub fn joint(&self) -> Option<(Axis, bool)> {
        self.joint
    }

    /// Constant transform between the joint frame and the link frame.
    pub fn post(&self) -> Option<&Matrix4<f64>> {
        self.post.as_ref()
    }
}

/// Jacobian column of a joint about/along `axis`. `rotation` holds the joint frame axes
/// (n, o, a) in the base frame, `p` the end point in the joint frame.
pub(crate) fn jacobian_column(axis: Axis, flip: bool, rotation: &Matrix3<f64>, p: &Vector3<f64>) -> Vector6<f64> {
    let n = rotation.column(0).into_owned();
    let o = rotation.column(1).into_owned();
    let a = rotation.column(2).into_owned();
    let (x, y, z) = (p.x, p.y, p.z);
    let zero = Vector3::zeros();
    let (linear, angular) = match axis {
        Axis::Rx => (a * y - o * z, n),
        Axis::Ry => (n * z - a * x, o),
        Axis::Rz => (o * x - n * y, a),
        Axis::Tx => (n, zero),
        Axis::Ty => (o, zero),
        Axis::Tz => (a, zero),
        Axis::Static => (zero, zero),
    };
    let column = Vector6::new(linear.x, linear.y, linear.z, angular.x, angular.y, angular.z);
    if flip { -column } else { column }
}

/// Multiplies every elementary transform in turn. Defines the expected results.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceBackend;

impl KinematicsBackend for ReferenceBackend {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn link_transform(&self, link: &Link, q: f64) -> Pose {
        link.transform(q)
    }

    fn fkine(&self, chain: &Chain<'_>, values: &JointValues<'_>, tool: &Pose) -> Pose {
        let path = chain.path;
        let mut pose = Pose::identity();
        for (id, source) in path.links().iter().zip(path.sources()) {
            let q = values.value(*source);
            for et in chain.links[id.index()].ets() {
                pose *= et.eval(q);
            }
        }
        pose * tool
    }

    fn jacob0(&self, chain: &Chain<'_>, values: &JointValues<'_>, tool: &Pose) -> Matrix6xX<f64> {
        let path = chain.path;
        let target = self.fkine(chain, values, tool);
        let mut jacobian = Matrix6xX::zeros(path.n());
        let mut u = Pose::identity();
        let mut column = 0;
        for (id, source) in path.links().iter().zip(path.sources()) {
            let q = values.value(*source);
            for et in chain.links[id.index()].ets() {
                u *= et.eval(q);
                if et.is_joint() && matches!(source, JointSource::Robot(_)) {
                    let rotation = u.rotation.to_rotation_matrix().into_inner();
                    let p = (u.inverse() * target).translation.vector;
                    jacobian.set_column(column, &jacobian_column(et.axis(), et.is_flipped(), &rotation, &p));
                    column += 1;
                }
            }
        }
        jacobian
    }
}

/// Works on the precompiled per-link matrices of the path.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompiledBackend;

impl CompiledBackend {
    fn fkine_matrix(chain: &Chain<'_>, values: &JointValues<'_>) -> Matrix4<f64> {
        let compiled = chain.compiled;
        let mut m = Matrix4::identity();
        for (step, source) in compiled.steps().iter().zip(compiled.sources()) {
            m *= step.matrix(values.value(*source));
        }
        m
    }
}

impl KinematicsBackend for CompiledBackend {
    fn name(&self) -> &'static str {
        "compiled"
    }

    fn link_transform(&self, link: &Link, q: f64) -> Pose {
        link.compiled().pose(q)
    }

    fn fkine(&self, chain: &Chain<'_>, values: &JointValues<'_>, tool: &Pose) -> Pose {
        let m = Self::fkine_matrix(chain, values) * tool.to_homogeneous();
        matrix_to_pose(&m)
    }

    fn jacob0(&self, chain: &Chain<'_>, values: &JointValues<'_>, tool: &Pose) -> Matrix6xX<f64> {
        let compiled = chain.compiled;
        let target = Self::fkine_matrix(chain, values) * tool.to_homogeneous();
        let target_position: Vector3<f64> = target.fixed_view::<3, 1>(0, 3).into_owned();

        let mut jacobian = Matrix6xX::zeros(compiled.n());
        let mut u = Matrix4::identity();
        let mut column = 0;
        for (step, source) in compiled.steps().iter().zip(compiled.sources()) {
            let q = values.value(*source);
            match (step.joint(), source) {
                (Some((axis, flip)), JointSource::Robot(_)) => {
                    u *= step.joint_frame(q);
                    let rotation: Matrix3<f64> = u.fixed_view::<3, 3>(0, 0).into_owned();
                    let origin: Vector3<f64> = u.fixed_view::<3, 1>(0, 3).into_owned();
                    let p = rotation.transpose() * (target_position - origin);
                    jacobian.set_column(column, &jacobian_column(axis, flip, &rotation, &p));
                    column += 1;
                    if let Some(post) = step.post() {
                        u *= *post;
                    }
                }
                _ => u *= step.matrix(q),
            }
        }
        jacobian
    }
}

/// Backend selection, made when the robot is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Compiled,
    Reference,
}

impl BackendKind {
    pub fn instantiate(&self) -> Arc<dyn KinematicsBackend> {
        match self {
            BackendKind::Compiled => Arc::new(CompiledBackend),
            BackendKind::Reference => Arc::new(ReferenceBackend),
        }
    }
}

impl FromStr for BackendKind {
    type Err = KinematicsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compiled" => Ok(BackendKind::Compiled),
            "reference" => Ok(BackendKind::Reference),
            _ => Err(KinematicsError::InvalidSelector { what: "backend", value: s.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::et::ET;
    use crate::utils::assert_pose_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_compile_folds_constants() {
        let ets = ET::tx(-0.0825) * ET::rx(-PI / 2.0) * ET::tz(0.384) * ET::rz_joint();
        let compiled = CompiledLink::compile(&ets);
        assert_eq!(compiled.joint(), Some((Axis::Rz, false)));
        assert!(compiled.post().is_none());
        for q in [-1.0, 0.0, 0.3, 2.5] {
            assert_pose_eq(&compiled.pose(q), &ets.eval(&[q]).unwrap(), 1e-12, 1e-12);
        }
    }

    #[test]
    fn test_compile_post_and_flip() {
        let ets = ET::ty(0.2) * ET::rx_joint().flipped() * ET::tz(0.5) * ET::ry(0.1);
        let compiled = CompiledLink::compile(&ets);
        assert_eq!(compiled.joint(), Some((Axis::Rx, true)));
        assert!(compiled.post().is_some());
        assert_pose_eq(&compiled.pose(0.7), &ets.eval(&[0.7]).unwrap(), 1e-12, 1e-12);
    }

    #[test]
    fn test_fixed_link() {
        let ets = ET::tz(0.103) * ET::rz(-PI / 4.0);
        let compiled = CompiledLink::compile(&ets);
        assert_eq!(compiled.joint(), None);
        assert_pose_eq(&compiled.pose(0.0), &ets.eval(&[]).unwrap(), 1e-12, 1e-12);
    }

    #[test]
    fn test_column_formulas() {
        // Joint frame at the origin, end point at (1, 2, 3)
        let p = Vector3::new(1.0, 2.0, 3.0);
        let r = Matrix3::identity();
        let rz = jacobian_column(Axis::Rz, false, &r, &p);
        assert_eq!(rz, Vector6::new(-2.0, 1.0, 0.0, 0.0, 0.0, 1.0));
        let rx = jacobian_column(Axis::Rx, false, &r, &p);
        assert_eq!(rx, Vector6::new(0.0, -3.0, 2.0, 1.0, 0.0, 0.0));
        let ry = jacobian_column(Axis::Ry, false, &r, &p);
        assert_eq!(ry, Vector6::new(3.0, 0.0, -1.0, 0.0, 1.0, 0.0));
        let ty = jacobian_column(Axis::Ty, true, &r, &p);
        assert_eq!(ty, Vector6::new(0.0, -1.0, 0.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn test_backend_kind() {
        assert_eq!("reference".parse::<BackendKind>().unwrap(), BackendKind::Reference);
        assert_eq!(BackendKind::default().instantiate().name(), "compiled");
        assert!("native".parse::<BackendKind>().is_err());
    }
}
