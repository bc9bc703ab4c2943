//! Error handling for model construction, path resolution and evaluation

use std::io;
use thiserror::Error;

/// Unified error reported by robot construction, path resolution, kinematics, dynamics
/// and the YAML model loader.
#[derive(Debug, Error)]
pub enum KinematicsError {
    // Construction
    #[error("link name {0} is not unique")]
    DuplicateLinkName(String),

    #[error("Multiple base links: {0} and {1}")]
    MultipleBaseLinks(String, String),

    #[error("no base link, every link has a parent")]
    NoBaseLink,

    #[error("parent {parent} of link {link} is not in the supplied links")]
    UnknownParent { link: String, parent: String },

    #[error("links {0:?} are not reachable from the base link")]
    Unreachable(Vec<String>),

    #[error("link {link} has {count} joint transforms, at most one is allowed")]
    MultipleJoints { link: String, count: usize },

    #[error("fixed link {0} carries a joint index")]
    FixedLinkIndexed(String),

    #[error("all links must have a jindex, or none have a jindex")]
    MixedJointIndices,

    #[error("joint index {0} was repeated or out of range")]
    JointIndexOutOfRange(usize),

    #[error("joints {0:?} were not assigned")]
    JointsNotAssigned(Vec<usize>),

    #[error("invalid elementary transform: {0}")]
    InvalidTransform(String),

    #[error("inertia matrix must be symmetric")]
    AsymmetricInertia,

    #[error("Invalid Length for {what}: expected {expected}, found {found}")]
    InvalidLength { what: &'static str, expected: String, found: usize },

    #[error("gripper root {0} is not a link of this robot")]
    UnknownGripper(String),

    // Resolution
    #[error("no link named {0}")]
    NoSuchLink(String),

    #[error("link {0} is not in robot links")]
    NotInRobot(String),

    #[error("Must specify which end-effector, candidates are {0:?}")]
    AmbiguousEndEffector(Vec<String>),

    #[error("Must specify which gripper, candidates are {0:?}")]
    AmbiguousGripper(Vec<String>),

    #[error("cannot find path from {start} to {end}")]
    NoPath { start: String, end: String },

    // Shape and selectors
    #[error("joint vector has length {found}, expected {expected}")]
    JointCount { expected: usize, found: usize },

    #[error("{what} has shape {found:?}, expected {expected:?}")]
    ShapeMismatch { what: &'static str, expected: (usize, usize), found: (usize, usize) },

    #[error("bad {what} specified: {value}")]
    InvalidSelector { what: &'static str, value: String },

    #[error("{0} is singular")]
    Singular(&'static str),

    #[error("unsupported: {0}")]
    Unsupported(String),

    // Model files
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    #[error("Parse Error: {0}")]
    Parse(String),

    #[error("Missing Field: {0}")]
    MissingField(String),
}

pub type Result<T, E = KinematicsError> = std::result::Result<T, E>;
