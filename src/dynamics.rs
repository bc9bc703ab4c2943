//! Inverse dynamics by the recursive Newton-Euler algorithm over the robot link tree.

use std::sync::{Arc, PoisonError};

use nalgebra::{DMatrix, DVector, Vector3};
use tracing::debug;

use crate::kinematic_traits::LinkId;
use crate::kinematics_error::{KinematicsError, Result};
use crate::robot::Robot;
use crate::spatial::{SpatialMatrix, SpatialVector, cross_force, cross_motion, motion_transform, spatial_inertia, spatial_vec};
use crate::utils::matrix_to_pose;

/// Per-link constants of the dynamics, rebuilt whenever link dynamic parameters change.
#[derive(Debug)]
struct Body {
    link: LinkId,
    /// Position of the parent body in the list
    parent: Option<usize>,
    jindex: Option<usize>,
    /// Joint motion subspace in the link frame
    subspace: SpatialVector,
    inertia: SpatialMatrix,
    /// Motor inertia referred to the link side, `G^2 Jm`
    motor: f64,
}

#[derive(Debug)]
pub(crate) struct DynamicsCache {
    version: u64,
    /// Robot links in depth-first order
    bodies: Vec<Body>,
}

impl DynamicsCache {
    fn build(robot: &Robot) -> DynamicsCache {
        let order = robot.order();
        let bodies = order
            .iter()
            .map(|id| {
                let link = robot.link(*id);
                let dynamics = link.dynamics();
                let compiled = link.compiled();
                let subspace = match compiled.joint() {
                    Some((axis, flip)) => {
                        let s = match compiled.post() {
                            Some(post) => motion_transform(&matrix_to_pose(post)) * axis.motion_subspace(),
                            None => axis.motion_subspace(),
                        };
                        if flip { -s } else { s }
                    }
                    None => SpatialVector::zeros(),
                };
                Body {
                    link: *id,
                    parent: link.parent().and_then(|p| order.iter().position(|o| *o == p)),
                    jindex: link.jindex().filter(|_| link.is_joint()),
                    subspace,
                    inertia: spatial_inertia(dynamics.m, &dynamics.r, dynamics.inertia()),
                    motor: dynamics.g * dynamics.g * dynamics.jm,
                }
            })
            .collect();
        DynamicsCache { version: robot.dynamics_version(), bodies }
    }
}

impl Robot {
    fn dynamics(&self) -> Arc<DynamicsCache> {
        if let Some(cache) = self.dynamics_cache.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            if cache.version == self.dynamics_version() {
                return cache.clone();
            }
        }
        let cache = Arc::new(DynamicsCache::build(self));
        debug!(robot = self.name(), version = cache.version, bodies = cache.bodies.len(), "dynamics rebuilt");
        *self.dynamics_cache.write().unwrap_or_else(PoisonError::into_inner) = Some(cache.clone());
        cache
    }

    /// Joint forces/torques required for the given joint positions, velocities and
    /// accelerations. Includes motor inertia and joint friction. `gravity` defaults to the
    /// robot gravity and is given in the world frame.
    pub fn rne(&self, q: &[f64], qd: &[f64], qdd: &[f64], gravity: Option<Vector3<f64>>) -> Result<DVector<f64>> {
        self.check_q(q)?;
        self.check_q(qd)?;
        self.check_q(qdd)?;
        Ok(self.rne_with(&self.dynamics(), q, qd, qdd, &gravity.unwrap_or(*self.gravity())))
    }

    /// Inverse dynamics along a trajectory, one sample per row. Returns one row of joint
    /// forces per sample.
    pub fn rne_traj(
        &self,
        q: &DMatrix<f64>,
        qd: &DMatrix<f64>,
        qdd: &DMatrix<f64>,
        gravity: Option<Vector3<f64>>,
    ) -> Result<DMatrix<f64>> {
        let expected = (q.nrows(), self.n());
        for (what, m) in [("q", q), ("qd", qd), ("qdd", qdd)] {
            if m.shape() != expected {
                return Err(KinematicsError::ShapeMismatch { what, expected, found: m.shape() });
            }
        }
        let cache = self.dynamics();
        let gravity = gravity.unwrap_or(*self.gravity());
        let row = |m: &DMatrix<f64>, k: usize| -> Vec<f64> { m.row(k).iter().copied().collect() };
        let mut tau = DMatrix::zeros(q.nrows(), self.n());
        for k in 0..q.nrows() {
            let sample = self.rne_with(&cache, &row(q, k), &row(qd, k), &row(qdd, k), &gravity);
            tau.set_row(k, &sample.transpose());
        }
        Ok(tau)
    }

    /// Joint forces holding the robot still against gravity.
    pub fn gravload(&self, q: &[f64], gravity: Option<Vector3<f64>>) -> Result<DVector<f64>> {
        let zero = vec![0.0; self.n()];
        self.rne(q, &zero, &zero, gravity)
    }

    /// Joint space inertia matrix, one column per unit joint acceleration.
    pub fn inertia(&self, q: &[f64]) -> Result<DMatrix<f64>> {
        self.check_q(q)?;
        let cache = self.dynamics();
        let n = self.n();
        let zero = vec![0.0; n];
        let mut m = DMatrix::zeros(n, n);
        for j in 0..n {
            let mut qdd = zero.clone();
            qdd[j] = 1.0;
            m.set_column(j, &self.rne_with(&cache, q, &zero, &qdd, &Vector3::zeros()));
        }
        Ok(m)
    }

    fn rne_with(&self, cache: &DynamicsCache, q: &[f64], qd: &[f64], qdd: &[f64], gravity: &Vector3<f64>) -> DVector<f64> {
        let bodies = &cache.bodies;
        let base_rotation = self.base().rotation;
        // Gravity enters as an upward acceleration of the base
        let a0 = spatial_vec(&Vector3::zeros(), &-(base_rotation.inverse() * gravity));

        let mut xup = Vec::with_capacity(bodies.len());
        let mut v: Vec<SpatialVector> = Vec::with_capacity(bodies.len());
        let mut a: Vec<SpatialVector> = Vec::with_capacity(bodies.len());
        let mut f: Vec<SpatialVector> = Vec::with_capacity(bodies.len());

        // Outward: velocities, accelerations and the net force on every body
        for body in bodies {
            let link = self.link(body.link);
            let (value, rate, accel) = match body.jindex {
                Some(j) => (q[j], qd[j], qdd[j]),
                None => (0.0, 0.0, 0.0),
            };
            let x = motion_transform(&self.backend.link_transform(link, value));
            let (v_parent, a_parent) = match body.parent {
                Some(p) => (v[p], a[p]),
                None => (SpatialVector::zeros(), a0),
            };
            let vj = body.subspace * rate;
            let vi = x * v_parent + vj;
            let ai = x * a_parent + body.subspace * accel + cross_motion(&vi, &vj);
            let fi = body.inertia * ai + cross_force(&vi, &(body.inertia * vi));
            xup.push(x);
            v.push(vi);
            a.push(ai);
            f.push(fi);
        }

        // Inward: project onto the joint axes and pass the rest to the parent
        let mut tau = DVector::zeros(self.n());
        for k in (0..bodies.len()).rev() {
            let body = &bodies[k];
            if let Some(j) = body.jindex {
                let link = self.link(body.link);
                let projected: f64 = body.subspace.iter().zip(f[k].iter()).map(|(s, f)| s * f).sum();
                tau[j] = projected + body.motor * qdd[j] - link.friction(qd[j]);
            }
            if let Some(p) = body.parent {
                let transmitted = xup[k].transpose() * f[k];
                f[p] += transmitted;
            }
        }
        tau
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::et::ET;
    use crate::link::{Link, LinkDynamics};
    use std::f64::consts::PI;

    const G: f64 = 9.81;

    /// Two point masses of 1 kg at the middle of unit links, both joints about y.
    fn two_link() -> Robot {
        let dynamics = LinkDynamics::new(1.0, Vector3::new(0.5, 0.0, 0.0));
        let links = vec![
            Link::new(ET::ry_joint()).named("l1").with_dynamics(dynamics.clone()),
            Link::new(ET::tx(1.0) * ET::ry_joint()).named("l2").with_parent("l1").with_dynamics(dynamics),
        ];
        Robot::new(links).unwrap()
    }

    fn assert_torques(actual: &DVector<f64>, expected: &[f64]) {
        for (k, e) in expected.iter().enumerate() {
            assert!((actual[k] - e).abs() < 1e-9, "joint {}: {} vs {}", k, actual[k], e);
        }
    }

    #[test]
    fn test_gravity_only() {
        let robot = two_link();
        let zero = [0.0, 0.0];
        let cases = [
            ([0.0, 0.0], [-2.0, -0.5]),
            ([0.0, -PI / 2.0], [-1.5, 0.0]),
            ([-PI / 2.0, PI / 2.0], [-0.5, -0.5]),
            ([-PI / 2.0, 0.0], [0.0, 0.0]),
        ];
        for (q, expected) in cases {
            let tau = robot.rne(&q, &zero, &zero, None).unwrap() / G;
            assert_torques(&tau, &expected);
        }
    }

    #[test]
    fn test_velocity_terms() {
        let robot = two_link();
        let q = [0.0, -PI / 2.0];
        let h = -0.5 * q[1].sin();
        let cases = [([1.0, 0.0], [0.0, -h]), ([0.0, 1.0], [h, 0.0]), ([1.0, 1.0], [3.0 * h, -h])];
        for (qd, expected) in cases {
            let tau = robot.rne(&q, &qd, &[0.0, 0.0], Some(Vector3::zeros())).unwrap();
            assert_torques(&tau, &expected);
        }
    }

    #[test]
    fn test_inertia_terms() {
        let robot = two_link();
        for q2 in [0.0, -PI / 2.0, 0.7] {
            let q = [0.3, q2];
            let d11 = 1.5 + q2.cos();
            let d12 = 0.25 + 0.5 * q2.cos();
            let d22 = 0.25;
            let zero = [0.0, 0.0];
            let g = Some(Vector3::zeros());
            assert_torques(&robot.rne(&q, &zero, &[1.0, 0.0], g).unwrap(), &[d11, d12]);
            assert_torques(&robot.rne(&q, &zero, &[0.0, 1.0], g).unwrap(), &[d12, d22]);
            assert_torques(&robot.rne(&q, &zero, &[1.0, 1.0], g).unwrap(), &[d11 + d12, d12 + d22]);

            let m = robot.inertia(&q).unwrap();
            assert!((m[(0, 0)] - d11).abs() < 1e-9);
            assert!((m[(0, 1)] - m[(1, 0)]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_motor_and_friction() {
        let mut robot = two_link();
        let dynamics = LinkDynamics::new(0.0, Vector3::zeros())
            .with_motor(0.5, 3.0, 2.0)
            .with_tc(&[2.0, -1.0])
            .unwrap();
        let version = robot.dynamics_version();
        robot.set_dynamics("l2", dynamics).unwrap();
        assert_eq!(robot.dynamics_version(), version + 1);

        let g = Some(Vector3::zeros());
        let q = [0.0, 0.0];
        // Only the second link is left: G^2 Jm = 2, friction(10) = -124
        let tau = robot.rne(&q, &[0.0, 10.0], &[0.0, 1.0], g).unwrap();
        assert!((tau[1] - (2.0 + 124.0)).abs() < 1e-9);
    }

    #[test]
    fn test_cache_follows_dynamics_changes() {
        let mut robot = two_link();
        let before = robot.gravload(&[0.0, 0.0], None).unwrap();
        robot.set_dynamics("l2", LinkDynamics::new(2.0, Vector3::new(0.5, 0.0, 0.0))).unwrap();
        let after = robot.gravload(&[0.0, 0.0], None).unwrap();
        assert!((before[1] / G + 0.5).abs() < 1e-9);
        assert!((after[1] / G + 1.0).abs() < 1e-9);
        assert!(matches!(robot.set_dynamics("ghost", LinkDynamics::default()), Err(KinematicsError::NoSuchLink(_))));
    }

    #[test]
    fn test_rotated_base() {
        // Upside down base: gravity now pulls along +z in the robot frame
        let mut robot = two_link();
        robot.set_base(crate::kinematic_traits::Pose::rotation(Vector3::x() * PI));
        let tau = robot.gravload(&[0.0, 0.0], None).unwrap() / G;
        assert_torques(&tau, &[2.0, 0.5]);
    }

    #[test]
    fn test_trajectory() {
        let robot = two_link();
        let q = DMatrix::from_row_slice(2, 2, &[0.0, 0.0, 0.1, -0.4]);
        let qd = DMatrix::from_row_slice(2, 2, &[0.0, 0.0, 0.5, 1.0]);
        let qdd = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, -1.0]);
        let tau = robot.rne_traj(&q, &qd, &qdd, None).unwrap();
        assert_eq!(tau.shape(), (2, 2));
        let second = robot.rne(&[0.1, -0.4], &[0.5, 1.0], &[0.0, -1.0], None).unwrap();
        assert!((tau[(1, 0)] - second[0]).abs() < 1e-12);
        assert!((tau[(1, 1)] - second[1]).abs() < 1e-12);

        let short = DMatrix::zeros(1, 2);
        assert!(matches!(robot.rne_traj(&q, &short, &qdd, None), Err(KinematicsError::ShapeMismatch { what: "qd", .. })));
    }
}
