extern crate nalgebra as na;

use std::str::FromStr;

use na::linalg::SVD;
use na::{DMatrix, DVector, Matrix3, Matrix6xX, UnitQuaternion, Vector3, Vector6};

use crate::kinematic_traits::Pose;
use crate::kinematics_error::{KinematicsError, Result};

/// Rows of a Jacobian to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Half {
    #[default]
    Full,
    /// Translational rows only
    Trans,
    /// Rotational rows only
    Rot,
}

impl Half {
    pub fn select(&self, jacobian: &Matrix6xX<f64>) -> DMatrix<f64> {
        let (first, count) = match self {
            Half::Full => (0, 6),
            Half::Trans => (0, 3),
            Half::Rot => (3, 3),
        };
        let rows = jacobian.rows(first, count);
        DMatrix::from_fn(count, jacobian.ncols(), |r, c| rows[(r, c)])
    }
}

impl FromStr for Half {
    type Err = KinematicsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "full" | "all" => Ok(Half::Full),
            "trans" => Ok(Half::Trans),
            "rot" => Ok(Half::Rot),
            _ => Err(KinematicsError::InvalidSelector { what: "half", value: s.to_string() }),
        }
    }
}

/// Orientation rate representation of an analytical Jacobian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Analytical {
    /// Roll-pitch-yaw, `R = Rx(yaw) Ry(pitch) Rz(roll)`
    RpyXyz,
    /// Roll-pitch-yaw, `R = Rz(yaw) Ry(pitch) Rx(roll)`
    RpyZyx,
    /// Euler angles, `R = Rz(phi) Ry(theta) Rz(psi)`
    Eul,
    /// Exponential coordinates
    Exp,
}

impl FromStr for Analytical {
    type Err = KinematicsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rpy-xyz" => Ok(Analytical::RpyXyz),
            "rpy-zyx" => Ok(Analytical::RpyZyx),
            "eul" => Ok(Analytical::Eul),
            "exp" => Ok(Analytical::Exp),
            _ => Err(KinematicsError::InvalidSelector { what: "analytical", value: s.to_string() }),
        }
    }
}

impl Analytical {
    /// Matrix mapping the orientation rates to angular velocity at the given orientation.
    /// The analytical Jacobian is the geometric one with the inverse of this applied to the
    /// rotational rows.
    pub fn rate_matrix(&self, rotation: &UnitQuaternion<f64>) -> Matrix3<f64> {
        let r = rotation.to_rotation_matrix().into_inner();
        match self {
            Analytical::RpyXyz => {
                let (_, pitch, yaw) = rpy_xyz(&r);
                let (sp, cp) = pitch.sin_cos();
                let (sy, cy) = yaw.sin_cos();
                Matrix3::new(
                    sp, 0.0, 1.0,
                    -sy * cp, cy, 0.0,
                    cy * cp, sy, 0.0,
                )
            }
            Analytical::RpyZyx => {
                let (_, pitch, yaw) = rpy_zyx(&r);
                let (sp, cp) = pitch.sin_cos();
                let (sy, cy) = yaw.sin_cos();
                Matrix3::new(
                    cp * cy, -sy, 0.0,
                    cp * sy, cy, 0.0,
                    -sp, 0.0, 1.0,
                )
            }
            Analytical::Eul => {
                let (phi, theta, _) = eul_zyz(&r);
                let (sphi, cphi) = phi.sin_cos();
                let (stheta, ctheta) = theta.sin_cos();
                Matrix3::new(
                    0.0, -sphi, cphi * stheta,
                    0.0, cphi, sphi * stheta,
                    1.0, 0.0, ctheta,
                )
            }
            Analytical::Exp => {
                let scaled = rotation.scaled_axis();
                let theta = scaled.norm();
                if theta < 1e-12 {
                    return Matrix3::identity();
                }
                let skew = (scaled / theta).cross_matrix();
                Matrix3::identity() + skew * ((1.0 - theta.cos()) / theta)
                    + skew * skew * ((theta - theta.sin()) / theta)
            }
        }
    }
}

/// (roll, pitch, yaw) for `R = Rx(yaw) Ry(pitch) Rz(roll)`.
pub fn rpy_xyz(r: &Matrix3<f64>) -> (f64, f64, f64) {
    let pitch = r[(0, 2)].atan2((r[(1, 2)].powi(2) + r[(2, 2)].powi(2)).sqrt());
    if (r[(0, 2)].abs() - 1.0).abs() < 1e-10 {
        // Gimbal lock, roll taken as zero
        let yaw = r[(2, 1)].atan2(r[(1, 1)]);
        return (0.0, pitch, yaw);
    }
    let yaw = (-r[(1, 2)]).atan2(r[(2, 2)]);
    let roll = (-r[(0, 1)]).atan2(r[(0, 0)]);
    (roll, pitch, yaw)
}

/// (roll, pitch, yaw) for `R = Rz(yaw) Ry(pitch) Rx(roll)`.
pub fn rpy_zyx(r: &Matrix3<f64>) -> (f64, f64, f64) {
    let pitch = (-r[(2, 0)]).atan2((r[(0, 0)].powi(2) + r[(1, 0)].powi(2)).sqrt());
    if (r[(2, 0)].abs() - 1.0).abs() < 1e-10 {
        // Gimbal lock, roll taken as zero
        let yaw = (-r[(0, 1)]).atan2(r[(1, 1)]);
        return (0.0, pitch, yaw);
    }
    let roll = r[(2, 1)].atan2(r[(2, 2)]);
    let yaw = r[(1, 0)].atan2(r[(0, 0)]);
    (roll, pitch, yaw)
}

/// (phi, theta, psi) for `R = Rz(phi) Ry(theta) Rz(psi)` with theta in [0, pi].
pub fn eul_zyz(r: &Matrix3<f64>) -> (f64, f64, f64) {
    if r[(0, 2)].abs() < 1e-12 && r[(1, 2)].abs() < 1e-12 {
        // Singular, phi taken as zero
        let theta = if r[(2, 2)] > 0.0 { 0.0 } else { std::f64::consts::PI };
        let psi = r[(1, 0)].atan2(r[(1, 1)]);
        return (0.0, theta, psi);
    }
    let phi = r[(1, 2)].atan2(r[(0, 2)]);
    let (sphi, cphi) = phi.sin_cos();
    let theta = (cphi * r[(0, 2)] + sphi * r[(1, 2)]).atan2(r[(2, 2)]);
    let psi = (-sphi * r[(0, 0)] + cphi * r[(1, 0)]).atan2(-sphi * r[(0, 1)] + cphi * r[(1, 1)]);
    (phi, theta, psi)
}

/// Converts a geometric Jacobian to the analytical one for the given end orientation.
pub fn to_analytical(jacobian: &Matrix6xX<f64>, pose: &Pose, representation: Analytical) -> Result<Matrix6xX<f64>> {
    let rates = representation
        .rate_matrix(&pose.rotation)
        .try_inverse()
        .ok_or(KinematicsError::Singular("orientation rate mapping"))?;
    let mut analytical = jacobian.clone();
    let angular = rates * jacobian.fixed_rows::<3>(3);
    analytical.fixed_rows_mut::<3>(3).copy_from(&angular);
    Ok(analytical)
}

/// Geometric Jacobian of a path, as handed to IK callers
pub struct Jacobian {
    /// A 6 x n matrix
    ///
    /// The Jacobian matrix maps the joint velocities to the end-effector velocities.
    /// Each column corresponds to a joint, and each row corresponds to a degree of freedom
    /// of the end-effector (linear and angular velocities).
    matrix: Matrix6xX<f64>,

    /// Singular values below this are treated as zero in the pseudoinverse
    epsilon: f64,
}

impl Jacobian {
    /// Wraps a Jacobian computed by [`crate::robot::Robot::jacob0`] or
    /// [`crate::robot::Robot::jacobe`].
    ///
    /// # Arguments
    ///
    /// * `matrix` - The 6 x n Jacobian
    /// * `epsilon` - Singular value threshold for the pseudoinverse
    pub fn new(matrix: Matrix6xX<f64>, epsilon: f64) -> Self {
        Self { matrix, epsilon }
    }

    pub fn matrix(&self) -> &Matrix6xX<f64> {
        &self.matrix
    }

    /// Computes the joint velocities required to achieve a desired end-effector velocity
    ///
    /// # Arguments
    ///
    /// * `desired_end_effector_velocity` - A 6D vector representing the desired linear and angular velocity of the end-effector
    ///
    /// # Returns
    ///
    /// Joint velocities, or an error if the pseudoinverse cannot be computed.
    ///
    /// This method tries to compute the joint velocities using the inverse of the Jacobian matrix.
    /// If the Jacobian matrix is not square or not invertible, it falls back to using the pseudoinverse.
    pub fn velocities_from_vector(&self, desired_end_effector_velocity: &Vector6<f64>) -> Result<DVector<f64>> {
        let matrix = DMatrix::from_fn(6, self.matrix.ncols(), |r, c| self.matrix[(r, c)]);
        let twist = DVector::from_column_slice(desired_end_effector_velocity.as_slice());
        if matrix.is_square() {
            if let Some(jacobian_inverse) = matrix.clone().try_inverse() {
                return Ok(jacobian_inverse * twist);
            }
        }
        // If the inverse does not exist, use the pseudoinverse
        let svd = SVD::new(matrix, true, true);
        let jacobian_pseudoinverse = svd
            .pseudo_inverse(self.epsilon)
            .map_err(|_| KinematicsError::Singular("Jacobian pseudoinverse"))?;
        Ok(jacobian_pseudoinverse * twist)
    }

    /// Computes the joint velocities required to achieve a desired end-effector velocity,
    /// given as linear velocity and rotation vector.
    pub fn velocities(&self, linear: &Vector3<f64>, angular: &Vector3<f64>) -> Result<DVector<f64>> {
        let desired_velocity = Vector6::new(linear.x, linear.y, linear.z, angular.x, angular.y, angular.z);
        self.velocities_from_vector(&desired_velocity)
    }

    /// Computes the joint torques required to achieve a desired end-effector force/torque
    ///
    /// # Arguments
    ///
    /// * `desired_force_torque` - A 6D vector representing the desired force and torque at the end-effector
    ///
    /// # Returns
    ///
    /// Joint torques, one per Jacobian column.
    pub fn torques_from_vector(&self, desired_force_torque: &Vector6<f64>) -> DVector<f64> {
        let joint_torques = self.matrix.transpose() * desired_force_torque;
        DVector::from_column_slice(joint_torques.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use na::Rotation3;

    fn rotx(a: f64) -> Matrix3<f64> {
        Rotation3::from_axis_angle(&Vector3::x_axis(), a).into_inner()
    }

    fn roty(a: f64) -> Matrix3<f64> {
        Rotation3::from_axis_angle(&Vector3::y_axis(), a).into_inner()
    }

    fn rotz(a: f64) -> Matrix3<f64> {
        Rotation3::from_axis_angle(&Vector3::z_axis(), a).into_inner()
    }

    #[test]
    fn test_selectors() {
        assert_eq!("trans".parse::<Half>().unwrap(), Half::Trans);
        assert_eq!("rot".parse::<Half>().unwrap(), Half::Rot);
        assert!(matches!("both".parse::<Half>(), Err(KinematicsError::InvalidSelector { what: "half", .. })));
        assert_eq!("rpy-zyx".parse::<Analytical>().unwrap(), Analytical::RpyZyx);
        assert!(matches!("quat".parse::<Analytical>(), Err(KinematicsError::InvalidSelector { .. })));
    }

    #[test]
    fn test_half_rows() {
        let j = Matrix6xX::from_fn(2, |r, c| (r * 10 + c) as f64);
        let rot = Half::Rot.select(&j);
        assert_eq!(rot.shape(), (3, 2));
        assert_eq!(rot[(0, 1)], 31.0);
        assert_eq!(Half::Trans.select(&j)[(2, 0)], 20.0);
    }

    #[test]
    fn test_angle_extraction() {
        let (roll, pitch, yaw) = (0.3, -0.4, 1.1);
        let xyz = rpy_xyz(&(rotx(yaw) * roty(pitch) * rotz(roll)));
        assert!((xyz.0 - roll).abs() < 1e-12 && (xyz.1 - pitch).abs() < 1e-12 && (xyz.2 - yaw).abs() < 1e-12);

        let zyx = rpy_zyx(&(rotz(yaw) * roty(pitch) * rotx(roll)));
        assert!((zyx.0 - roll).abs() < 1e-12 && (zyx.1 - pitch).abs() < 1e-12 && (zyx.2 - yaw).abs() < 1e-12);

        let (phi, theta, psi) = (0.5, 0.8, -1.2);
        let zyz = eul_zyz(&(rotz(phi) * roty(theta) * rotz(psi)));
        assert!((zyz.0 - phi).abs() < 1e-12 && (zyz.1 - theta).abs() < 1e-12 && (zyz.2 - psi).abs() < 1e-12);
    }

    /// Orientation rates mapped through the rate matrix must reproduce the angular velocity
    /// obtained by differentiating the rotation numerically.
    fn check_rate_matrix(representation: Analytical, angles: Vector3<f64>, compose: fn(&Vector3<f64>) -> Matrix3<f64>) {
        let h = 1e-6;
        let rates = Vector3::new(0.2, 0.5, -0.7);
        let r0 = compose(&angles);
        let r1 = compose(&(angles + rates * h));
        let omega_skew = (r1 - r0) / h * r0.transpose();
        let omega = Vector3::new(omega_skew[(2, 1)], omega_skew[(0, 2)], omega_skew[(1, 0)]);
        let rotation = UnitQuaternion::from_matrix(&r0);
        let mapped = representation.rate_matrix(&rotation) * rates;
        assert!((mapped - omega).norm() < 1e-5, "{:?}: {} vs {}", representation, mapped, omega);
    }

    #[test]
    fn test_rate_matrix_rpy_xyz() {
        check_rate_matrix(Analytical::RpyXyz, Vector3::new(0.3, -0.4, 1.1), |a| {
            rotx(a[2]) * roty(a[1]) * rotz(a[0])
        });
    }

    #[test]
    fn test_rate_matrix_rpy_zyx() {
        check_rate_matrix(Analytical::RpyZyx, Vector3::new(0.3, -0.4, 1.1), |a| {
            rotz(a[2]) * roty(a[1]) * rotx(a[0])
        });
    }

    #[test]
    fn test_rate_matrix_eul() {
        // Principal triple, theta in (0, pi), so the extracted angles are the ones composed
        check_rate_matrix(Analytical::Eul, Vector3::new(0.3, 0.4, 1.1), |a| {
            rotz(a[0]) * roty(a[1]) * rotz(a[2])
        });
    }

    #[test]
    fn test_rate_matrix_exp() {
        check_rate_matrix(Analytical::Exp, Vector3::new(0.3, -0.4, 1.1), |a| Rotation3::new(*a).into_inner());
    }

    #[test]
    fn test_exp_identity() {
        assert_eq!(Analytical::Exp.rate_matrix(&UnitQuaternion::identity()), Matrix3::identity());
    }

    #[test]
    fn test_velocities_and_torques() {
        // Planar two joint arm at q = 0, unit links along x, both joints about z
        let mut matrix = Matrix6xX::zeros(2);
        matrix.set_column(0, &Vector6::new(0.0, 2.0, 0.0, 0.0, 0.0, 1.0));
        matrix.set_column(1, &Vector6::new(0.0, 1.0, 0.0, 0.0, 0.0, 1.0));
        let jacobian = Jacobian::new(matrix, 1e-9);

        let qd = jacobian.velocities(&Vector3::new(0.0, 1.0, 0.0), &Vector3::zeros()).unwrap();
        assert!((qd[0] - 1.0).abs() < 1e-9);
        assert!((qd[1] + 1.0).abs() < 1e-9);

        let tau = jacobian.torques_from_vector(&Vector6::new(0.0, 1.0, 0.0, 0.0, 0.0, 0.0));
        assert_eq!(tau.len(), 2);
        assert!((tau[0] - 2.0).abs() < 1e-12);
        assert!((tau[1] - 1.0).abs() < 1e-12);
    }
}
