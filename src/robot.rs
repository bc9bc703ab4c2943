//! Robot: the link tree, joint state, base and tool, and path resolution.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};

use nalgebra::{DVector, Matrix2xX, Vector3};
use tracing::{debug, trace, warn};

use crate::backend::BackendKind;
use crate::constraints::Constraints;
use crate::dynamics::DynamicsCache;
use crate::et::ET;
use crate::ets::ETS;
use crate::gripper::Gripper;
use crate::kinematic_traits::{JointSource, KinematicsBackend, LinkId, Pose};
use crate::kinematics_error::{KinematicsError, Result};
use crate::link::{Link, LinkDynamics, Owner};
use crate::path::{CompiledPath, PathCache, PathKey, ResolvedPath, Span};

/// Standard gravity, acting along -z
pub const GRAVITY: [f64; 3] = [0.0, 0.0, -9.81];

/// Collects links and options, then validates and builds the [`Robot`].
#[derive(Debug, Clone)]
pub struct RobotBuilder {
    links: Vec<Link>,
    name: String,
    manufacturer: String,
    grippers: Vec<(String, Pose)>,
    backend: BackendKind,
    base: Pose,
    tool: Pose,
    gravity: Vector3<f64>,
    configurations: Vec<(String, Vec<f64>)>,
}

impl RobotBuilder {
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn manufacturer(mut self, manufacturer: &str) -> Self {
        self.manufacturer = manufacturer.to_string();
        self
    }

    /// Designates the subtree rooted at link `root` as a gripper. The gripper takes the root
    /// link name.
    pub fn gripper(self, root: &str) -> Self {
        self.gripper_with_tool(root, Pose::identity())
    }

    pub fn gripper_with_tool(mut self, root: &str, tool: Pose) -> Self {
        self.grippers.push((root.to_string(), tool));
        self
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn base(mut self, base: Pose) -> Self {
        self.base = base;
        self
    }

    pub fn tool(mut self, tool: Pose) -> Self {
        self.tool = tool;
        self
    }

    pub fn gravity(mut self, gravity: Vector3<f64>) -> Self {
        self.gravity = gravity;
        self
    }

    /// Named joint configuration such as "qz" or "qr".
    pub fn configuration(mut self, name: &str, q: &[f64]) -> Self {
        self.configurations.push((name.to_string(), q.to_vec()));
        self
    }

    pub fn build(self) -> Result<Robot> {
        let RobotBuilder { mut links, name, manufacturer, grippers, backend, base, tool, gravity, configurations } =
            self;

        // Names and joint counts
        let mut by_name: HashMap<String, LinkId> = HashMap::with_capacity(links.len());
        for (k, link) in links.iter_mut().enumerate() {
            if link.name().is_empty() {
                link.set_name(format!("link-{}", k));
            }
            if by_name.insert(link.name().to_string(), LinkId(k)).is_some() {
                return Err(KinematicsError::DuplicateLinkName(link.name().to_string()));
            }
            let count = link.ets().n();
            if count > 1 {
                return Err(KinematicsError::MultipleJoints { link: link.name().to_string(), count });
            }
        }

        // Parents, children and the single base link
        let mut base_link: Option<LinkId> = None;
        for k in 0..links.len() {
            let parent = match links[k].parent_name().map(str::to_string) {
                Some(parent_name) => match by_name.get(&parent_name) {
                    Some(parent) => Some(*parent),
                    None => {
                        return Err(KinematicsError::UnknownParent {
                            link: links[k].name().to_string(),
                            parent: parent_name,
                        });
                    }
                },
                None => None,
            };
            links[k].set_parent(parent);
            match parent {
                Some(parent) => links[parent.0].add_child(LinkId(k)),
                None => match base_link {
                    Some(first) => {
                        return Err(KinematicsError::MultipleBaseLinks(
                            links[first.0].name().to_string(),
                            links[k].name().to_string(),
                        ));
                    }
                    None => base_link = Some(LinkId(k)),
                },
            }
        }
        let base_link = base_link.ok_or(KinematicsError::NoBaseLink)?;

        let reachable = depth_first(&links, base_link, |_| false);
        if reachable.len() != links.len() {
            let mut seen = vec![false; links.len()];
            reachable.iter().for_each(|id| seen[id.0] = true);
            let stray = links.iter().enumerate().filter(|(k, _)| !seen[*k]).map(|(_, l)| l.name().to_string());
            return Err(KinematicsError::Unreachable(stray.collect()));
        }

        // Grippers
        let mut gripper_list = Vec::with_capacity(grippers.len());
        for (g, (root_name, gripper_tool)) in grippers.into_iter().enumerate() {
            let root = *by_name.get(&root_name).ok_or_else(|| KinematicsError::UnknownGripper(root_name.clone()))?;
            if root == base_link {
                return Err(KinematicsError::Unsupported(format!("gripper root {} is the base link", root_name)));
            }
            let subtree = depth_first(&links, root, |_| false);
            let mut n = 0;
            for id in &subtree {
                let link = &mut links[id.0];
                if link.owner() != Owner::Robot {
                    return Err(KinematicsError::Unsupported(format!("gripper {} overlaps another gripper", root_name)));
                }
                link.set_owner(Owner::Gripper(g));
                if link.is_joint() {
                    link.set_jindex(n);
                    n += 1;
                }
            }
            debug!(gripper = %root_name, links = subtree.len(), joints = n, "gripper extracted");
            gripper_list.push(Gripper { name: root_name, links: subtree, n, q: DVector::zeros(n), tool: gripper_tool });
        }

        // Robot links in depth-first order, grippers excluded
        let order = depth_first(&links, base_link, |id| links[id.0].owner() != Owner::Robot);
        let joints: Vec<LinkId> = order.iter().copied().filter(|id| links[id.0].is_joint()).collect();
        if let Some(id) = order.iter().find(|id| !links[id.0].is_joint() && links[id.0].jindex().is_some()) {
            return Err(KinematicsError::FixedLinkIndexed(links[id.0].name().to_string()));
        }
        let n = joints.len();
        assign_joint_indices(&mut links, &joints)?;

        let ee_links = if gripper_list.is_empty() {
            order.iter().copied().filter(|id| links[id.0].children().is_empty()).collect()
        } else {
            let mut ee: Vec<LinkId> = Vec::new();
            for gripper in &gripper_list {
                if let Some(parent) = links[gripper.root().0].parent() {
                    if !ee.contains(&parent) {
                        ee.push(parent);
                    }
                }
            }
            ee
        };

        let mut pairs = vec![None; n];
        for id in &joints {
            if let Some(j) = links[id.0].jindex() {
                pairs[j] = links[id.0].qlim();
            }
        }
        let qlim = Constraints::from_pairs(&pairs);
        if n > 0 && !qlim.valid() {
            warn!(robot = %name, "no valid joint limits, random configurations span [-pi, pi]");
        }

        let mut named = BTreeMap::new();
        for (config_name, q) in configurations {
            if q.len() != n {
                return Err(KinematicsError::JointCount { expected: n, found: q.len() });
            }
            named.insert(config_name, DVector::from_vec(q));
        }

        debug!(
            robot = %name,
            n,
            links = order.len(),
            grippers = gripper_list.len(),
            ee_links = ee_links.len(),
            valid_qlim = qlim.valid(),
            backend = ?backend,
            "robot built"
        );

        Ok(Robot {
            name,
            manufacturer,
            links,
            order,
            by_name,
            base_link,
            ee_links,
            grippers: gripper_list,
            n,
            q: DVector::zeros(n),
            qd: DVector::zeros(n),
            qdd: DVector::zeros(n),
            base,
            tool,
            gravity,
            qlim,
            configurations: named,
            backend: backend.instantiate(),
            backend_kind: backend,
            cache: PathCache::default(),
            dynamics_version: 0,
            dynamics_cache: RwLock::new(None),
        })
    }
}

/// Depth-first order from `root`, children in insertion order. Subtrees for which `skip`
/// holds are left out.
fn depth_first(links: &[Link], root: LinkId, skip: impl Fn(LinkId) -> bool) -> Vec<LinkId> {
    let mut visited = Vec::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if skip(id) {
            continue;
        }
        visited.push(id);
        stack.extend(links[id.0].children().iter().rev().copied());
    }
    visited
}

/// Assigns joint indices in depth-first order if none are given, otherwise checks that the
/// given ones are exactly 0..n.
fn assign_joint_indices(links: &mut [Link], joints: &[LinkId]) -> Result<()> {
    let n = joints.len();
    let preset = joints.iter().filter(|id| links[id.0].jindex().is_some()).count();
    if preset == 0 {
        for (j, id) in joints.iter().enumerate() {
            links[id.0].set_jindex(j);
        }
        return Ok(());
    }
    if preset != n {
        return Err(KinematicsError::MixedJointIndices);
    }
    let mut assigned = vec![false; n];
    for id in joints {
        match links[id.0].jindex() {
            Some(j) if j < n && !assigned[j] => {
                assigned[j] = true;
                links[id.0].set_jindex(j);
            }
            Some(j) => return Err(KinematicsError::JointIndexOutOfRange(j)),
            None => return Err(KinematicsError::MixedJointIndices),
        }
    }
    let missing: Vec<usize> = (0..n).filter(|j| !assigned[*j]).collect();
    if !missing.is_empty() {
        return Err(KinematicsError::JointsNotAssigned(missing));
    }
    Ok(())
}

/// Tree-structured manipulator.
#[derive(Debug)]
pub struct Robot {
    name: String,
    manufacturer: String,
    /// Arena of all links, gripper links included
    pub(crate) links: Vec<Link>,
    /// Robot links in depth-first order
    order: Vec<LinkId>,
    by_name: HashMap<String, LinkId>,
    base_link: LinkId,
    ee_links: Vec<LinkId>,
    pub(crate) grippers: Vec<Gripper>,
    n: usize,
    q: DVector<f64>,
    qd: DVector<f64>,
    qdd: DVector<f64>,
    base: Pose,
    tool: Pose,
    gravity: Vector3<f64>,
    qlim: Constraints,
    configurations: BTreeMap<String, DVector<f64>>,
    pub(crate) backend: Arc<dyn KinematicsBackend>,
    backend_kind: BackendKind,
    cache: PathCache,
    dynamics_version: u64,
    pub(crate) dynamics_cache: RwLock<Option<Arc<DynamicsCache>>>,
}

impl Robot {
    pub fn builder(links: Vec<Link>) -> RobotBuilder {
        RobotBuilder {
            links,
            name: String::new(),
            manufacturer: String::new(),
            grippers: Vec::new(),
            backend: BackendKind::default(),
            base: Pose::identity(),
            tool: Pose::identity(),
            gravity: Vector3::from(GRAVITY),
            configurations: Vec::new(),
        }
    }

    pub fn new(links: Vec<Link>) -> Result<Robot> {
        Robot::builder(links).build()
    }

    /// Chops a sequence after every joint into links `link0`, `link1`, ... Trailing constant
    /// transforms become the fixed link `ee`.
    pub fn from_ets(ets: &ETS) -> Result<Robot> {
        let mut links: Vec<Link> = Vec::new();
        for piece in ets.split_at_joints() {
            let name = if piece.n() > 0 { format!("link{}", links.len()) } else { "ee".to_string() };
            let mut link = Link::new(piece).named(&name);
            if let Some(parent) = links.last() {
                link = link.with_parent(parent.name());
            }
            links.push(link);
        }
        if links.is_empty() {
            links.push(Link::new(ETS::default()).named("ee"));
        }
        Robot::new(links)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn manufacturer(&self) -> &str {
        &self.manufacturer
    }

    /// Number of robot joints, grippers excluded.
    pub fn n(&self) -> usize {
        self.n
    }

    /// All links, gripper links included, indexed by [`LinkId`].
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[id.0]
    }

    /// Robot links in depth-first order from the base link.
    pub fn order(&self) -> &[LinkId] {
        &self.order
    }

    pub fn link_id(&self, name: &str) -> Result<LinkId> {
        self.by_name.get(name).copied().ok_or_else(|| KinematicsError::NoSuchLink(name.to_string()))
    }

    pub fn link_by_name(&self, name: &str) -> Result<&Link> {
        Ok(&self.links[self.link_id(name)?.0])
    }

    pub fn base_link(&self) -> LinkId {
        self.base_link
    }

    pub fn ee_links(&self) -> &[LinkId] {
        &self.ee_links
    }

    pub fn grippers(&self) -> &[Gripper] {
        &self.grippers
    }

    pub fn gripper(&self, name: &str) -> Option<&Gripper> {
        self.grippers.iter().find(|g| g.name == name)
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend_kind
    }

    pub fn q(&self) -> &DVector<f64> {
        &self.q
    }

    pub fn qd(&self) -> &DVector<f64> {
        &self.qd
    }

    pub fn qdd(&self) -> &DVector<f64> {
        &self.qdd
    }

    pub fn set_q(&mut self, q: &[f64]) -> Result<()> {
        self.check_q(q)?;
        self.q = DVector::from_column_slice(q);
        Ok(())
    }

    pub fn set_qd(&mut self, qd: &[f64]) -> Result<()> {
        self.check_q(qd)?;
        self.qd = DVector::from_column_slice(qd);
        Ok(())
    }

    pub fn set_qdd(&mut self, qdd: &[f64]) -> Result<()> {
        self.check_q(qdd)?;
        self.qdd = DVector::from_column_slice(qdd);
        Ok(())
    }

    pub fn set_gripper_q(&mut self, gripper: &str, q: &[f64]) -> Result<()> {
        let gripper = self
            .grippers
            .iter_mut()
            .find(|g| g.name == gripper)
            .ok_or_else(|| KinematicsError::UnknownGripper(gripper.to_string()))?;
        if q.len() != gripper.n {
            return Err(KinematicsError::JointCount { expected: gripper.n, found: q.len() });
        }
        gripper.q = DVector::from_column_slice(q);
        Ok(())
    }

    pub fn base(&self) -> &Pose {
        &self.base
    }

    pub fn set_base(&mut self, base: Pose) {
        self.base = base;
    }

    pub fn tool(&self) -> &Pose {
        &self.tool
    }

    pub fn set_tool(&mut self, tool: Pose) {
        self.tool = tool;
    }

    pub fn gravity(&self) -> &Vector3<f64> {
        &self.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vector3<f64>) {
        self.gravity = gravity;
    }

    /// Joint limits as a 2 x n matrix, lower limits in the first row.
    pub fn qlim(&self) -> Matrix2xX<f64> {
        self.qlim.as_matrix()
    }

    pub fn constraints(&self) -> &Constraints {
        &self.qlim
    }

    /// True if at least one joint has a usable limit pair.
    pub fn valid_qlim(&self) -> bool {
        self.qlim.valid()
    }

    /// Per joint, true if `q` is outside the joint limits.
    pub fn is_limit_exceeded(&self, q: &[f64]) -> Result<Vec<bool>> {
        self.check_q(q)?;
        Ok(self.qlim.exceeded(q))
    }

    /// Random configuration within the joint limits.
    pub fn random_q(&self) -> DVector<f64> {
        self.qlim.random(&mut rand::thread_rng())
    }

    pub fn configuration(&self, name: &str) -> Option<&DVector<f64>> {
        self.configurations.get(name)
    }

    pub fn configurations(&self) -> &BTreeMap<String, DVector<f64>> {
        &self.configurations
    }

    pub fn add_configuration(&mut self, name: &str, q: &[f64]) -> Result<()> {
        self.check_q(q)?;
        self.configurations.insert(name.to_string(), DVector::from_column_slice(q));
        Ok(())
    }

    /// Joint kinds in joint index order, `R` for revolute and `P` for prismatic.
    pub fn structure(&self) -> String {
        let mut kinds = vec![' '; self.n];
        for id in &self.order {
            let link = &self.links[id.0];
            if let Some(j) = link.jindex() {
                kinds[j] = if link.is_revolute() { 'R' } else { 'P' };
            }
        }
        kinds.into_iter().collect()
    }

    /// Upper bound on the distance from the base link to any end-effector: the sum of all
    /// constant translations plus the largest extension of prismatic joints.
    pub fn reach(&self) -> f64 {
        let mut reach = 0.0;
        for id in &self.order {
            let link = &self.links[id.0];
            for et in link.ets() {
                if et.is_rotation() {
                    continue;
                }
                reach += match et.eta() {
                    Some(eta) => eta.abs(),
                    None if et.is_joint() => link.qlim().map_or(0.0, |[lower, upper]| lower.abs().max(upper.abs())),
                    None => et.eval(0.0).translation.vector.norm(),
                };
            }
        }
        reach
    }

    /// Number of resolved paths in the cache.
    pub fn cached_paths(&self) -> usize {
        self.cache.len()
    }

    /// Incremented whenever link dynamic parameters change.
    pub fn dynamics_version(&self) -> u64 {
        self.dynamics_version
    }

    /// Replaces the dynamic parameters of a robot link.
    pub fn set_dynamics(&mut self, link: &str, dynamics: LinkDynamics) -> Result<()> {
        let id = self.robot_link(link)?;
        self.links[id.0].set_dynamics(dynamics);
        self.dynamics_version += 1;
        debug!(link, version = self.dynamics_version, "link dynamics changed");
        Ok(())
    }

    /// Resolves the path of a span. Results are cached by link handles and never evicted.
    pub fn get_path(&self, span: &Span) -> Result<Arc<ResolvedPath>> {
        Ok(self.resolve(span)?.0)
    }

    /// Elementary transforms along the path of a span, gripper tool included.
    pub fn ets(&self, span: &Span) -> Result<ETS> {
        let path = self.get_path(span)?;
        let mut ets = ETS::default();
        for id in path.links() {
            ets = &ets * self.links[id.0].ets();
        }
        if path.tool() != &Pose::identity() {
            ets = ets * ET::static_transform(*path.tool());
        }
        Ok(ets)
    }

    pub(crate) fn check_q(&self, q: &[f64]) -> Result<()> {
        if q.len() != self.n {
            return Err(KinematicsError::JointCount { expected: self.n, found: q.len() });
        }
        Ok(())
    }

    /// Robot link by name, gripper links rejected.
    fn robot_link(&self, name: &str) -> Result<LinkId> {
        let id = self.link_id(name)?;
        if self.links[id.0].owner() != Owner::Robot {
            return Err(KinematicsError::NotInRobot(name.to_string()));
        }
        Ok(id)
    }

    fn names(&self, ids: impl Iterator<Item = LinkId>) -> Vec<String> {
        ids.map(|id| self.links[id.0].name().to_string()).collect()
    }

    /// End link of a span, the gripper it belongs to and whether the gripper tool is attached.
    /// A gripper name takes precedence over a link of the same name.
    fn resolve_end(&self, end: Option<&str>) -> Result<(LinkId, Option<usize>, bool)> {
        match end {
            Some(name) => match self.grippers.iter().position(|g| g.name == name) {
                Some(g) => Ok((self.grippers[g].root(), Some(g), true)),
                None => {
                    let id = self.link_id(name)?;
                    match self.links[id.0].owner() {
                        Owner::Robot => Ok((id, None, false)),
                        Owner::Gripper(g) => Ok((id, Some(g), false)),
                    }
                }
            },
            None => match self.grippers.len() {
                1 => Ok((self.grippers[0].root(), Some(0), true)),
                0 if self.ee_links.len() == 1 => Ok((self.ee_links[0], None, false)),
                0 => Err(KinematicsError::AmbiguousEndEffector(self.names(self.ee_links.iter().copied()))),
                _ => Err(KinematicsError::AmbiguousGripper(self.grippers.iter().map(|g| g.name.clone()).collect())),
            },
        }
    }

    pub(crate) fn resolve(&self, span: &Span) -> Result<(Arc<ResolvedPath>, Arc<CompiledPath>)> {
        let (end, gripper, gripper_tool) = self.resolve_end(span.end)?;
        let start = match span.start {
            Some(name) => self.robot_link(name)?,
            None => self.base_link,
        };
        let key = PathKey { start, end, gripper, gripper_tool };
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        // Walk up from the end until the start is met
        let mut links = vec![end];
        let mut current = end;
        while current != start {
            match self.links[current.0].parent() {
                Some(parent) => {
                    links.push(parent);
                    current = parent;
                }
                None => {
                    return Err(KinematicsError::NoPath {
                        start: self.links[start.0].name().to_string(),
                        end: self.links[end.0].name().to_string(),
                    });
                }
            }
        }
        links.reverse();

        let sources: Vec<JointSource> = links.iter().map(|id| self.joint_source(*id)).collect();
        let n = sources.iter().filter(|s| matches!(s, JointSource::Robot(_))).count();
        let tool = match gripper {
            Some(g) if gripper_tool => self.grippers[g].tool,
            _ => Pose::identity(),
        };
        let path = ResolvedPath { start, end, links, sources, n, tool, gripper, gripper_tool };
        let steps = path.links.iter().map(|id| self.links[id.0].compiled().clone()).collect();
        let compiled = CompiledPath::new(steps, &path);
        trace!(
            start = self.links[start.0].name(),
            end = self.links[end.0].name(),
            links = path.links.len(),
            n,
            "path cached"
        );
        Ok(self.cache.insert(key, path, compiled))
    }

    fn joint_source(&self, id: LinkId) -> JointSource {
        let link = &self.links[id.0];
        match (link.is_joint(), link.jindex(), link.owner()) {
            (true, Some(j), Owner::Robot) => JointSource::Robot(j),
            (true, Some(index), Owner::Gripper(gripper)) => JointSource::Gripper { gripper, index },
            _ => JointSource::Fixed,
        }
    }

    /// Indented link tree, one link per line.
    pub fn hierarchy(&self) -> String {
        let mut text = String::new();
        let mut stack = vec![(self.base_link, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let link = &self.links[id.0];
            let marker = match link.owner() {
                Owner::Robot => "",
                Owner::Gripper(_) => " (gripper)",
            };
            text.push_str(&format!("{}{}{}\n", "  ".repeat(depth), link.name(), marker));
            for child in link.children().iter().rev() {
                stack.push((*child, depth + 1));
            }
        }
        text
    }
}

impl fmt::Display for Robot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let manufacturer = if self.manufacturer.is_empty() { String::new() } else { format!(" (by {})", self.manufacturer) };
        writeln!(f, "{}{}: {} axes ({}), ETS model", self.name, manufacturer, self.n, self.structure())?;
        let width = self.links.iter().map(|l| l.name().len()).max().unwrap_or(4).max(4);
        writeln!(f, "{:>3} | {:<width$} | {:<width$} | ETS", "id", "link", "parent", width = width)?;
        for id in self.order.iter().chain(self.grippers.iter().flat_map(|g| g.links.iter())) {
            let link = &self.links[id.0];
            let parent = link.parent().map_or("BASE", |p| self.links[p.0].name());
            writeln!(f, "{:>3} | {:<width$} | {:<width$} | {}", id.0, link.name(), parent, link.ets(), width = width)?;
        }
        Ok(())
    }
}
