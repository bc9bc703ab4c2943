//! Shared types and the pluggable evaluation backend

extern crate nalgebra as na;

use std::fmt::Debug;

use na::{Isometry3, Matrix6xX};

use crate::link::Link;
use crate::path::{CompiledPath, ResolvedPath};

/// Pose is used for link frames, the tool and the base. It contains both Cartesian position
/// and rotation quaternion
/// ```
/// extern crate nalgebra as na;
/// use na::{Isometry3, Translation3, UnitQuaternion, Vector3};
///
/// type Pose = Isometry3<f64>;
///
/// let translation = Translation3::new(1.0, 0.0, 0.0);
/// // The quaternion should be normalized to represent a valid rotation.
/// let rotation = UnitQuaternion::from_quaternion(na::Quaternion::new(1.0, 0.0, 0.0, 1.0).normalize());
/// let transform = Pose::from_parts(translation, rotation);
/// ```
pub type Pose = Isometry3<f64>;

/// Typed handle of a link in the robot arena. Handles are stable for the lifetime of the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub(crate) usize);

impl LinkId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Where the variable of a link on a path is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointSource {
    /// Fixed link, no variable.
    Fixed,
    /// Index into the robot joint vector. Produces a Jacobian column.
    Robot(usize),
    /// Index into the joint vector of the given gripper. Evaluated, never differentiated.
    Gripper { gripper: usize, index: usize },
}

/// Joint values a path is evaluated at: the robot vector plus the stored gripper vectors.
#[derive(Debug, Clone, Copy)]
pub struct JointValues<'a> {
    pub robot: &'a [f64],
    pub grippers: &'a [&'a [f64]],
}

impl<'a> JointValues<'a> {
    pub fn new(robot: &'a [f64], grippers: &'a [&'a [f64]]) -> Self {
        JointValues { robot, grippers }
    }

    pub fn value(&self, source: JointSource) -> f64 {
        match source {
            JointSource::Fixed => 0.0,
            JointSource::Robot(j) => self.robot[j],
            JointSource::Gripper { gripper, index } => self.grippers[gripper][index],
        }
    }
}

/// Everything an evaluation backend may look at for one resolved path.
#[derive(Debug, Clone, Copy)]
pub struct Chain<'a> {
    pub links: &'a [Link],
    pub path: &'a ResolvedPath,
    pub compiled: &'a CompiledPath,
}

/// Strategy evaluating forward kinematics and the base-frame Jacobian of a resolved path.
/// Implementations must agree with each other to floating point tolerance; the reference
/// implementation multiplies every elementary transform in turn and defines correctness.
pub trait KinematicsBackend: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Transform of a single link at the given joint value.
    fn link_transform(&self, link: &Link, q: f64) -> Pose;

    /// Pose of the path end relative to the frame the path start is attached to,
    /// followed by `tool`. The robot base is not applied here.
    fn fkine(&self, chain: &Chain<'_>, values: &JointValues<'_>, tool: &Pose) -> Pose;

    /// Geometric Jacobian of the path in the path start frame, one column per robot joint on it.
    fn jacob0(&self, chain: &Chain<'_>, values: &JointValues<'_>, tool: &Pose) -> Matrix6xX<f64>;
}
