//! Grippers: link subtrees removed from the main robot, with their own joint state and tool.

use nalgebra::DVector;

use crate::kinematic_traits::{LinkId, Pose};

#[derive(Debug, Clone)]
pub struct Gripper {
    pub(crate) name: String,
    /// Subtree in depth-first order, the root first
    pub(crate) links: Vec<LinkId>,
    pub(crate) n: usize,
    pub(crate) q: DVector<f64>,
    pub(crate) tool: Pose,
}

impl Gripper {
    /// Named after its root link.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> LinkId {
        self.links[0]
    }

    pub fn links(&self) -> &[LinkId] {
        &self.links
    }

    /// Number of gripper joints.
    pub fn n(&self) -> usize {
        self.n
    }

    pub fn q(&self) -> &DVector<f64> {
        &self.q
    }

    pub fn tool(&self) -> &Pose {
        &self.tool
    }
}
