//! Resolved link paths and the two-tier path cache.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use nalgebra::Matrix4;

use crate::backend::CompiledLink;
use crate::kinematic_traits::{JointSource, LinkId, Pose};

/// Selects the part of the robot an operation works on. Omitted `end` resolves to the sole
/// gripper or end-effector, omitted `start` to the base link, which must be a robot link.
/// `end` may name a gripper, in which case its tool offset is attached, or any link including
/// links inside a gripper. `tool` is an extra transform applied after the end. Without a
/// gripper tool it replaces the robot tool, with one it is applied after the gripper tool and
/// the robot tool is not used.
#[derive(Debug, Clone, Copy, Default)]
pub struct Span<'a> {
    pub start: Option<&'a str>,
    pub end: Option<&'a str>,
    pub tool: Option<&'a Pose>,
}

impl<'a> Span<'a> {
    /// Path from the base link to `end`.
    pub fn to(end: &'a str) -> Self {
        Span { end: Some(end), ..Default::default() }
    }

    pub fn from_link(mut self, start: &'a str) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_tool(mut self, tool: &'a Pose) -> Self {
        self.tool = Some(tool);
        self
    }
}

/// Ordered links from start to end (both included), the joint count on the way and the
/// gripper tool offset if the path ends in a gripper.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPath {
    pub(crate) start: LinkId,
    pub(crate) end: LinkId,
    pub(crate) links: Vec<LinkId>,
    pub(crate) sources: Vec<JointSource>,
    pub(crate) n: usize,
    pub(crate) tool: Pose,
    pub(crate) gripper: Option<usize>,
    pub(crate) gripper_tool: bool,
}

impl ResolvedPath {
    pub fn start(&self) -> LinkId {
        self.start
    }

    pub fn end(&self) -> LinkId {
        self.end
    }

    pub fn links(&self) -> &[LinkId] {
        &self.links
    }

    /// Variable source of every link on the path.
    pub fn sources(&self) -> &[JointSource] {
        &self.sources
    }

    /// Robot joints on the path, the Jacobian column count.
    pub fn n(&self) -> usize {
        self.n
    }

    pub fn tool(&self) -> &Pose {
        &self.tool
    }

    /// Gripper the path ends in, by gripper name or at a link inside it.
    pub fn gripper(&self) -> Option<usize> {
        self.gripper
    }

    /// True if the end was given as a gripper and its tool is attached.
    pub fn has_gripper_tool(&self) -> bool {
        self.gripper_tool
    }
}

/// Second tier: the compiled links of a path in order, ready for the compiled backend.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPath {
    steps: Vec<CompiledLink>,
    sources: Vec<JointSource>,
    n: usize,
    tool: Matrix4<f64>,
}

impl CompiledPath {
    pub(crate) fn new(steps: Vec<CompiledLink>, path: &ResolvedPath) -> Self {
        CompiledPath { steps, sources: path.sources.clone(), n: path.n, tool: path.tool.to_homogeneous() }
    }

    pub fn steps(&self) -> &[CompiledLink] {
        &self.steps
    }

    pub fn sources(&self) -> &[JointSource] {
        &self.sources
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn tool(&self) -> &Matrix4<f64> {
        &self.tool
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct PathKey {
    pub start: LinkId,
    pub end: LinkId,
    pub gripper: Option<usize>,
    pub gripper_tool: bool,
}

/// Memoizes resolved paths by link handles. Entries are only ever inserted; the link tree
/// of a robot does not change after construction.
#[derive(Debug, Default)]
pub(crate) struct PathCache {
    paths: RwLock<HashMap<PathKey, Arc<ResolvedPath>>>,
    compiled: RwLock<HashMap<PathKey, Arc<CompiledPath>>>,
}

impl PathCache {
    pub fn get(&self, key: &PathKey) -> Option<(Arc<ResolvedPath>, Arc<CompiledPath>)> {
        let path = self.paths.read().unwrap_or_else(PoisonError::into_inner).get(key).cloned()?;
        let compiled = self.compiled.read().unwrap_or_else(PoisonError::into_inner).get(key).cloned()?;
        Some((path, compiled))
    }

    /// Inserts both tiers. If another caller inserted first, its entries are kept and returned.
    pub fn insert(&self, key: PathKey, path: ResolvedPath, compiled: CompiledPath) -> (Arc<ResolvedPath>, Arc<CompiledPath>) {
        let path = self
            .paths
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert_with(|| Arc::new(path))
            .clone();
        let compiled = self
            .compiled
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert_with(|| Arc::new(compiled))
            .clone();
        (path, compiled)
    }

    pub fn len(&self) -> usize {
        self.paths.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}
