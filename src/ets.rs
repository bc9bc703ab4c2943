//! Elementary transform sequences

use std::fmt;
use std::ops::{Index, Mul};

use crate::et::ET;
use crate::kinematic_traits::Pose;
use crate::kinematics_error::{KinematicsError, Result};

/// Ordered composition of elementary transforms. Concatenation copies, sequences are values.
/// The empty sequence is allowed: it is the identity, neutral under `*`, and gives a link
/// whose frame coincides with its parent's.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ETS {
    items: Vec<ET>,
}

impl ETS {
    pub fn new(items: Vec<ET>) -> Self {
        ETS { items }
    }

    /// Number of joint transforms.
    pub fn n(&self) -> usize {
        self.items.iter().filter(|et| et.is_joint()).count()
    }

    /// Number of transforms.
    pub fn m(&self) -> usize {
        self.items.len()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ET> {
        self.items.iter()
    }

    pub fn get(&self, i: usize) -> Option<&ET> {
        self.items.get(i)
    }

    pub(crate) fn items_mut(&mut self) -> &mut [ET] {
        &mut self.items
    }

    /// Positions of the joint transforms in the sequence.
    pub fn joints(&self) -> Vec<usize> {
        self.items.iter().enumerate().filter(|(_, et)| et.is_joint()).map(|(i, _)| i).collect()
    }

    /// Evaluates the whole sequence. A joint with an assigned `jindex` reads `q[jindex]`,
    /// unassigned joints consume `q` in order of appearance.
    pub fn eval(&self, q: &[f64]) -> Result<Pose> {
        let n = self.n();
        if q.len() < n {
            return Err(KinematicsError::JointCount { expected: n, found: q.len() });
        }
        let mut pose = Pose::identity();
        let mut next = 0;
        for et in &self.items {
            if et.is_joint() {
                let j = et.jindex().unwrap_or(next);
                let value = *q.get(j).ok_or(KinematicsError::JointIndexOutOfRange(j))?;
                pose *= et.eval(value);
                next += 1;
            } else {
                pose *= et.eval(0.0);
            }
        }
        Ok(pose)
    }

    /// Inverse sequence: reversed order, each transform inverted.
    pub fn inv(&self) -> ETS {
        ETS { items: self.items.iter().rev().map(|et| et.inv()).collect() }
    }

    /// Splits after every joint. Each piece holds at most one joint, trailing constants form
    /// the last piece.
    pub fn split_at_joints(&self) -> Vec<ETS> {
        let mut pieces = Vec::new();
        let mut current = Vec::new();
        for et in &self.items {
            current.push(et.clone());
            if et.is_joint() {
                pieces.push(ETS::new(std::mem::take(&mut current)));
            }
        }
        if !current.is_empty() {
            pieces.push(ETS::new(current));
        }
        pieces
    }
}

impl From<ET> for ETS {
    fn from(et: ET) -> Self {
        ETS { items: vec![et] }
    }
}

impl From<Vec<ET>> for ETS {
    fn from(items: Vec<ET>) -> Self {
        ETS { items }
    }
}

impl Index<usize> for ETS {
    type Output = ET;

    fn index(&self, i: usize) -> &ET {
        &self.items[i]
    }
}

impl<'a> IntoIterator for &'a ETS {
    type Item = &'a ET;
    type IntoIter = std::slice::Iter<'a, ET>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl Mul<ET> for ET {
    type Output = ETS;

    fn mul(self, rhs: ET) -> ETS {
        ETS { items: vec![self, rhs] }
    }
}

impl Mul<ET> for ETS {
    type Output = ETS;

    fn mul(mut self, rhs: ET) -> ETS {
        self.items.push(rhs);
        self
    }
}

impl Mul<ETS> for ET {
    type Output = ETS;

    fn mul(self, rhs: ETS) -> ETS {
        let mut items = Vec::with_capacity(rhs.items.len() + 1);
        items.push(self);
        items.extend(rhs.items);
        ETS { items }
    }
}

impl Mul<ETS> for ETS {
    type Output = ETS;

    fn mul(mut self, rhs: ETS) -> ETS {
        self.items.extend(rhs.items);
        self
    }
}

impl Mul<&ETS> for &ETS {
    type Output = ETS;

    fn mul(self, rhs: &ETS) -> ETS {
        let mut items = self.items.clone();
        items.extend(rhs.items.iter().cloned());
        ETS { items }
    }
}

impl fmt::Display for ETS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.items.iter().map(|et| et.to_string()).collect();
        write!(f, "{}", rendered.join(" * "))
    }
}
