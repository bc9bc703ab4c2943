//! Kinematics and dynamics of tree-structured manipulators described by elementary transform
//! sequences (ETS).
//!
//! A robot is a tree of links. Every link owns a short sequence of elementary transforms (a
//! rotation or translation about one principal axis, constant or driven by a joint variable) that
//! takes the parent link frame to its own frame. At most one transform per link is a joint.
//! Subtrees can be declared grippers: their joints are driven by the gripper's own joint vector
//! rather than by the robot configuration.
//!
//! # Features
//!
//! - Forward kinematics between any two links on the same branch, for single configurations,
//!   trajectories and all links at once.
//! - Geometric Jacobians in the base and end-effector frames, half selection and analytical
//!   (roll-pitch-yaw, Euler, exponential coordinates) representations.
//! - Kinematic Hessian, Yoshikawa manipulability and its gradient with respect to the joints.
//! - Inverse dynamics (recursive Newton-Euler) with motor inertia, viscous and Coulomb friction,
//!   gravity load and the joint-space mass matrix.
//! - Two interchangeable kinematics backends: a reference one that evaluates every elementary
//!   transform and a compiled one that folds constant transforms ahead of time.
//! - Resolved paths are cached per robot, so repeated queries over the same span are cheap.
//! - Robot models can be read from YAML (feature `allow_filesystem`), ETS from strings.
//!
//! ```
//! use rs_ets_kinematics::models;
//! use rs_ets_kinematics::path::Span;
//!
//! let panda = models::panda().unwrap();
//! let q = panda.configuration("qr").unwrap().clone();
//! let pose = panda.fkine(q.as_slice(), &Span::default()).unwrap();
//! let jacobian = panda.jacob0(q.as_slice(), &Span::default()).unwrap();
//! assert_eq!(jacobian.ncols(), 7);
//! assert!(pose.translation.vector.norm() > 0.3);
//! ```

pub mod kinematics_error;
pub mod kinematic_traits;

pub mod et;
pub mod ets;
pub mod link;
pub mod gripper;

pub mod backend;
pub mod path;
pub mod robot;
pub mod kinematics_impl;

pub mod constraints;

pub mod jacobian;
pub mod hessian;

pub mod spatial;
pub mod dynamics;

pub mod models;

#[path = "utils/utils.rs"]
pub mod utils;

#[cfg(feature = "allow_filesystem")]
pub mod robot_from_file;

#[cfg(test)]
mod tests;
