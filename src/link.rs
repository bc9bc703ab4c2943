//! Links: tree nodes owning an ETS fragment, the joint it carries and its dynamic parameters.

use std::fmt;

use nalgebra::{Matrix3, Vector3};

use crate::backend::CompiledLink;
use crate::et::ET;
use crate::ets::ETS;
use crate::kinematic_traits::{LinkId, Pose};
use crate::kinematics_error::{KinematicsError, Result};

/// Inertial, motor and friction parameters of a link. Only the dynamics uses them.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkDynamics {
    /// Mass
    pub m: f64,
    /// Center of mass in the link frame
    pub r: Vector3<f64>,
    /// Inertia tensor about the center of mass, symmetric
    inertia: Matrix3<f64>,
    /// Motor inertia, referred to the motor side
    pub jm: f64,
    /// Viscous friction, referred to the motor side
    pub b: f64,
    /// Coulomb friction for positive and negative velocity, referred to the motor side
    tc: [f64; 2],
    /// Gear ratio
    pub g: f64,
}

impl Default for LinkDynamics {
    fn default() -> Self {
        LinkDynamics {
            m: 0.0,
            r: Vector3::zeros(),
            inertia: Matrix3::zeros(),
            jm: 0.0,
            b: 0.0,
            tc: [0.0, 0.0],
            g: 1.0,
        }
    }
}

impl LinkDynamics {
    pub fn new(m: f64, r: Vector3<f64>) -> Self {
        LinkDynamics { m, r, ..Default::default() }
    }

    pub fn inertia(&self) -> &Matrix3<f64> {
        &self.inertia
    }

    pub fn tc(&self) -> [f64; 2] {
        self.tc
    }

    /// Sets the inertia tensor, which must be symmetric.
    pub fn with_inertia_matrix(mut self, inertia: Matrix3<f64>) -> Result<Self> {
        if (inertia - inertia.transpose()).amax() > 1e-8 {
            return Err(KinematicsError::AsymmetricInertia);
        }
        self.inertia = inertia;
        Ok(self)
    }

    /// Sets the inertia tensor from 3 principal moments `[Ixx Iyy Izz]`, 6 values
    /// `[Ixx Iyy Izz Ixy Iyz Ixz]` or 9 values of the full matrix in row order.
    pub fn with_inertia(self, values: &[f64]) -> Result<Self> {
        let inertia = match values.len() {
            3 => Matrix3::from_diagonal(&Vector3::new(values[0], values[1], values[2])),
            6 => Matrix3::new(
                values[0], values[3], values[5],
                values[3], values[1], values[4],
                values[5], values[4], values[2],
            ),
            9 => Matrix3::from_row_slice(values),
            found => {
                return Err(KinematicsError::InvalidLength {
                    what: "inertia",
                    expected: "3, 6 or 9".to_string(),
                    found,
                });
            }
        };
        self.with_inertia_matrix(inertia)
    }

    /// Sets Coulomb friction. A single value `F` means `[F, -F]`.
    pub fn with_tc(mut self, values: &[f64]) -> Result<Self> {
        self.tc = match values {
            [f] => [*f, -*f],
            [plus, minus] => [*plus, *minus],
            _ => {
                return Err(KinematicsError::InvalidLength {
                    what: "Coulomb friction",
                    expected: "1 or 2".to_string(),
                    found: values.len(),
                });
            }
        };
        Ok(self)
    }

    pub fn with_motor(mut self, jm: f64, b: f64, g: f64) -> Self {
        self.jm = jm;
        self.b = b;
        self.g = g;
        self
    }

    /// Joint friction force/torque at joint velocity `qd`, referred to the link side.
    /// Opposes the motion: viscous `B` plus Coulomb `Tc`, both scaled by the gear ratio.
    pub fn friction(&self, qd: f64) -> f64 {
        let g = self.g.abs();
        let mut tau = self.b * g * qd;
        if qd > 0.0 {
            tau += self.tc[0];
        } else if qd < 0.0 {
            tau += self.tc[1];
        }
        -g * tau
    }
}

/// Whether a link belongs to the main robot or to one of its grippers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Robot,
    Gripper(usize),
}

/// Robot link. The ETS fragment contains at most one joint transform.
#[derive(Debug, Clone)]
pub struct Link {
    name: Option<String>,
    ets: ETS,
    parent_name: Option<String>,
    jindex: Option<usize>,
    qlim: Option<[f64; 2]>,
    dynamics: LinkDynamics,
    compiled: CompiledLink,

    // Filled in by the robot
    parent: Option<LinkId>,
    children: Vec<LinkId>,
    owner: Owner,
}

impl Link {
    pub fn new(ets: impl Into<ETS>) -> Link {
        let ets = ets.into();
        let joint = ets.iter().find(|et| et.is_joint());
        let jindex = joint.and_then(|et| et.jindex());
        let qlim = joint.and_then(|et| et.qlim());
        let compiled = CompiledLink::compile(&ets);
        Link {
            name: None,
            ets,
            parent_name: None,
            jindex,
            qlim,
            dynamics: LinkDynamics::default(),
            compiled,
            parent: None,
            children: Vec::new(),
            owner: Owner::Robot,
        }
    }

    pub fn named(mut self, name: &str) -> Link {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_parent(mut self, parent: &str) -> Link {
        self.parent_name = Some(parent.to_string());
        self
    }

    pub fn with_jindex(mut self, jindex: usize) -> Link {
        self.set_jindex(jindex);
        self
    }

    pub fn with_qlim(mut self, lower: f64, upper: f64) -> Link {
        self.qlim = Some([lower, upper]);
        self
    }

    pub fn with_dynamics(mut self, dynamics: LinkDynamics) -> Link {
        self.dynamics = dynamics;
        self
    }

    /// Link name, empty until the link is named or added to a robot.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn ets(&self) -> &ETS {
        &self.ets
    }

    pub fn parent_name(&self) -> Option<&str> {
        self.parent_name.as_deref()
    }

    pub fn parent(&self) -> Option<LinkId> {
        self.parent
    }

    pub fn children(&self) -> &[LinkId] {
        &self.children
    }

    pub fn owner(&self) -> Owner {
        self.owner
    }

    pub fn jindex(&self) -> Option<usize> {
        self.jindex
    }

    pub fn qlim(&self) -> Option<[f64; 2]> {
        self.qlim
    }

    pub fn dynamics(&self) -> &LinkDynamics {
        &self.dynamics
    }

    pub(crate) fn compiled(&self) -> &CompiledLink {
        &self.compiled
    }

    pub fn joint_et(&self) -> Option<&ET> {
        self.ets.iter().find(|et| et.is_joint())
    }

    pub fn is_joint(&self) -> bool {
        self.joint_et().is_some()
    }

    pub fn is_revolute(&self) -> bool {
        self.joint_et().is_some_and(|et| et.is_rotation())
    }

    pub fn is_prismatic(&self) -> bool {
        self.joint_et().is_some_and(|et| et.is_translation())
    }

    /// True if `q` is outside the joint limits. Links without limits are never at a limit.
    pub fn is_limit(&self, q: f64) -> bool {
        match self.qlim {
            Some([lower, upper]) => q < lower || q > upper,
            None => false,
        }
    }

    /// Joint friction at velocity `qd`, see [`LinkDynamics::friction`].
    pub fn friction(&self, qd: f64) -> f64 {
        self.dynamics.friction(qd)
    }

    /// Link transform at joint value `q`, evaluated element by element.
    pub fn transform(&self, q: f64) -> Pose {
        self.ets.iter().fold(Pose::identity(), |pose, et| pose * et.eval(q))
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }

    pub(crate) fn set_jindex(&mut self, jindex: usize) {
        self.jindex = Some(jindex);
        for et in self.ets.items_mut() {
            if et.is_joint() {
                et.set_jindex(jindex);
            }
        }
    }

    pub(crate) fn set_dynamics(&mut self, dynamics: LinkDynamics) {
        self.dynamics = dynamics;
    }

    pub(crate) fn set_parent(&mut self, parent: Option<LinkId>) {
        self.parent = parent;
    }

    pub(crate) fn add_child(&mut self, child: LinkId) {
        self.children.push(child);
    }

    pub(crate) fn set_owner(&mut self, owner: Owner) {
        self.owner = owner;
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name(), self.ets)
    }
}
