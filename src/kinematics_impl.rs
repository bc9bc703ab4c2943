//! Forward kinematics and Jacobians of a [`Robot`] along a resolved path.

use std::sync::Arc;

use nalgebra::{DMatrix, Matrix3, Matrix6, Matrix6xX};

use crate::jacobian::{Analytical, Half, to_analytical};
use crate::kinematic_traits::{Chain, JointValues, Pose};
use crate::kinematics_error::{KinematicsError, Result};
use crate::path::{CompiledPath, ResolvedPath, Span};
use crate::robot::Robot;

/// A span resolved once and evaluated at any number of joint vectors.
pub(crate) struct Resolved<'r> {
    robot: &'r Robot,
    pub path: Arc<ResolvedPath>,
    compiled: Arc<CompiledPath>,
    /// Gripper tool then span tool, or the span or robot tool if no gripper tool is attached
    tool: Pose,
    /// Robot base, or identity if the path does not start at the base link
    base: Pose,
}

impl<'r> Resolved<'r> {
    fn with_values<T>(&self, q: &[f64], f: impl FnOnce(&Chain<'_>, &JointValues<'_>) -> T) -> T {
        let grippers: Vec<&[f64]> = self.robot.grippers.iter().map(|g| g.q.as_slice()).collect();
        let values = JointValues::new(q, &grippers);
        let chain = Chain { links: &self.robot.links, path: &self.path, compiled: &self.compiled };
        f(&chain, &values)
    }

    /// End pose in the frame the path starts from, base not applied.
    pub fn local_pose(&self, q: &[f64]) -> Pose {
        self.with_values(q, |chain, values| self.robot.backend.fkine(chain, values, &self.tool))
    }

    pub fn pose(&self, q: &[f64]) -> Pose {
        self.base * self.local_pose(q)
    }

    pub fn jacob0(&self, q: &[f64]) -> Matrix6xX<f64> {
        self.with_values(q, |chain, values| self.robot.backend.jacob0(chain, values, &self.tool))
    }

    /// Rotation of the end frame relative to the Jacobian frame.
    pub fn end_rotation(&self, q: &[f64]) -> Matrix3<f64> {
        self.local_pose(q).rotation.to_rotation_matrix().into_inner()
    }
}

/// `diag(r, r)`, mapping spatial velocities between frames rotated by `r`.
fn block_diagonal(r: &Matrix3<f64>) -> Matrix6<f64> {
    let mut m = Matrix6::zeros();
    m.fixed_view_mut::<3, 3>(0, 0).copy_from(r);
    m.fixed_view_mut::<3, 3>(3, 3).copy_from(r);
    m
}

/// Rows of a trajectory matrix as joint vectors.
fn trajectory_rows(robot: &Robot, q: &DMatrix<f64>) -> Result<Vec<Vec<f64>>> {
    if q.ncols() != robot.n() {
        return Err(KinematicsError::JointCount { expected: robot.n(), found: q.ncols() });
    }
    Ok(q.row_iter().map(|row| row.iter().copied().collect()).collect())
}

impl Robot {
    pub(crate) fn resolved(&self, span: &Span) -> Result<Resolved<'_>> {
        let (path, compiled) = self.resolve(span)?;
        let tool = match (path.has_gripper_tool(), span.tool) {
            (true, Some(tool)) => path.tool() * tool,
            (true, None) => *path.tool(),
            (false, tool) => *tool.unwrap_or(self.tool()),
        };
        let base = if path.start() == self.base_link() { *self.base() } else { Pose::identity() };
        Ok(Resolved { robot: self, path, compiled, tool, base })
    }

    /// Pose of the span end at joint configuration `q`. The base is applied if the span starts
    /// at the base link. At the end, a gripper tool followed by the span tool is applied, or
    /// without a gripper tool the span tool or else the robot tool.
    pub fn fkine(&self, q: &[f64], span: &Span) -> Result<Pose> {
        self.check_q(q)?;
        Ok(self.resolved(span)?.pose(q))
    }

    /// Poses along a trajectory, one row of `q` per sample. The path is resolved before the
    /// rows are fanned out.
    pub fn fkine_traj(&self, q: &DMatrix<f64>, span: &Span) -> Result<Vec<Pose>> {
        let rows = trajectory_rows(self, q)?;
        let resolved = self.resolved(span)?;

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            Ok(rows.par_iter().map(|row| resolved.pose(row)).collect())
        }

        #[cfg(not(feature = "parallel"))]
        {
            Ok(rows.iter().map(|row| resolved.pose(row)).collect())
        }
    }

    /// Pose of every robot link frame, in the order of [`Robot::order`]. Base applied, tool not.
    pub fn fkine_all(&self, q: &[f64]) -> Result<Vec<Pose>> {
        self.check_q(q)?;
        let mut frames: Vec<Option<Pose>> = vec![None; self.links().len()];
        let mut poses = Vec::with_capacity(self.order().len());
        for id in self.order() {
            let link = self.link(*id);
            let parent = match link.parent().and_then(|p| frames[p.index()]) {
                Some(pose) => pose,
                None => *self.base(),
            };
            let value = match link.jindex() {
                Some(j) if link.is_joint() => q[j],
                _ => 0.0,
            };
            let pose = parent * self.backend.link_transform(link, value);
            frames[id.index()] = Some(pose);
            poses.push(pose);
        }
        Ok(poses)
    }

    /// Geometric Jacobian in the frame the path starts from, one column per robot joint on
    /// the path. Gripper joints are held at their stored values.
    pub fn jacob0(&self, q: &[f64], span: &Span) -> Result<Matrix6xX<f64>> {
        self.check_q(q)?;
        Ok(self.resolved(span)?.jacob0(q))
    }

    /// Base-frame Jacobian with a row selection and an optional analytical representation
    /// of the angular part.
    pub fn jacob0_with(
        &self,
        q: &[f64],
        span: &Span,
        half: Half,
        analytical: Option<Analytical>,
    ) -> Result<DMatrix<f64>> {
        self.check_q(q)?;
        let resolved = self.resolved(span)?;
        let mut jacobian = resolved.jacob0(q);
        if let Some(representation) = analytical {
            jacobian = to_analytical(&jacobian, &resolved.local_pose(q), representation)?;
        }
        Ok(half.select(&jacobian))
    }

    /// Jacobians along a trajectory, one row of `q` per sample.
    pub fn jacob0_traj(&self, q: &DMatrix<f64>, span: &Span) -> Result<Vec<Matrix6xX<f64>>> {
        let rows = trajectory_rows(self, q)?;
        let resolved = self.resolved(span)?;

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            Ok(rows.par_iter().map(|row| resolved.jacob0(row)).collect())
        }

        #[cfg(not(feature = "parallel"))]
        {
            Ok(rows.iter().map(|row| resolved.jacob0(row)).collect())
        }
    }

    /// Geometric Jacobian in the end-effector frame.
    pub fn jacobe(&self, q: &[f64], span: &Span) -> Result<Matrix6xX<f64>> {
        self.check_q(q)?;
        let resolved = self.resolved(span)?;
        let rotation = block_diagonal(&resolved.end_rotation(q).transpose());
        Ok(rotation * resolved.jacob0(q))
    }

    pub fn jacobe_with(&self, q: &[f64], span: &Span, half: Half) -> Result<DMatrix<f64>> {
        Ok(half.select(&self.jacobe(q, span)?))
    }

    /// Maps an end-effector frame spatial velocity to the base frame.
    pub fn jacob0v(&self, q: &[f64], span: &Span) -> Result<Matrix6<f64>> {
        self.check_q(q)?;
        Ok(block_diagonal(&self.resolved(span)?.end_rotation(q)))
    }

    /// Maps a base frame spatial velocity to the end-effector frame.
    pub fn jacobev(&self, q: &[f64], span: &Span) -> Result<Matrix6<f64>> {
        self.check_q(q)?;
        Ok(block_diagonal(&self.resolved(span)?.end_rotation(q).transpose()))
    }
}
