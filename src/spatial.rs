//! Spatial vector algebra used by the recursive Newton-Euler dynamics.
//!
//! Spatial vectors are `[angular; linear]`, motion vectors taken at the frame origin.

use nalgebra::{Matrix3, Matrix6, Vector3, Vector6};

use crate::kinematic_traits::Pose;

pub type SpatialVector = Vector6<f64>;

/// Spatial inertia or spatial transform
pub type SpatialMatrix = Matrix6<f64>;

pub fn angular(v: &SpatialVector) -> Vector3<f64> {
    v.fixed_rows::<3>(0).into_owned()
}

pub fn linear(v: &SpatialVector) -> Vector3<f64> {
    v.fixed_rows::<3>(3).into_owned()
}

pub fn spatial_vec(angular: &Vector3<f64>, linear: &Vector3<f64>) -> SpatialVector {
    SpatialVector::new(angular.x, angular.y, angular.z, linear.x, linear.y, linear.z)
}

/// Skew-symmetric (cross-product) matrix of `v`
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    v.cross_matrix()
}

/// Motion cross product `v x m`
pub fn cross_motion(v: &SpatialVector, m: &SpatialVector) -> SpatialVector {
    let (omega, vel) = (angular(v), linear(v));
    let (omega_m, vel_m) = (angular(m), linear(m));
    spatial_vec(&omega.cross(&omega_m), &(omega.cross(&vel_m) + vel.cross(&omega_m)))
}

/// Force cross product `v x* f`, equal to `-(v x)^T f`
pub fn cross_force(v: &SpatialVector, f: &SpatialVector) -> SpatialVector {
    let (omega, vel) = (angular(v), linear(v));
    let (torque, force) = (angular(f), linear(f));
    spatial_vec(&(omega.cross(&torque) + vel.cross(&force)), &omega.cross(&force))
}

/// Spatial inertia of a body of mass `m` with center of mass `c` and rotational inertia
/// `inertia` about the center of mass, all in the body frame.
pub fn spatial_inertia(m: f64, c: &Vector3<f64>, inertia: &Matrix3<f64>) -> SpatialMatrix {
    let cx = skew(c);
    let mut result = SpatialMatrix::zeros();
    result.fixed_view_mut::<3, 3>(0, 0).copy_from(&(inertia + cx * cx.transpose() * m));
    result.fixed_view_mut::<3, 3>(0, 3).copy_from(&(cx * m));
    result.fixed_view_mut::<3, 3>(3, 0).copy_from(&(cx.transpose() * m));
    result.fixed_view_mut::<3, 3>(3, 3).copy_from(&(Matrix3::identity() * m));
    result
}

/// Motion transform from parent to child coordinates, the child frame being at `pose`
/// in the parent. The transpose carries forces from child to parent.
pub fn motion_transform(pose: &Pose) -> SpatialMatrix {
    let rt = pose.rotation.to_rotation_matrix().into_inner().transpose();
    let px = skew(&pose.translation.vector);
    let mut x = SpatialMatrix::zeros();
    x.fixed_view_mut::<3, 3>(0, 0).copy_from(&rt);
    x.fixed_view_mut::<3, 3>(3, 0).copy_from(&(-rt * px));
    x.fixed_view_mut::<3, 3>(3, 3).copy_from(&rt);
    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::UnitQuaternion;

    #[test]
    fn test_skew_cross_product() {
        let a = Vector3::new(1.0, 0.0, 0.0);
        let b = Vector3::new(0.0, 1.0, 0.0);
        assert!((skew(&a) * b - Vector3::new(0.0, 0.0, 1.0)).norm() < 1e-12);
    }

    #[test]
    fn test_spatial_inertia_symmetric() {
        let si = spatial_inertia(5.0, &Vector3::new(0.1, -0.2, 0.3), &(Matrix3::identity() * 0.01));
        assert!((si - si.transpose()).amax() < 1e-12);
        assert_eq!(si[(3, 3)], 5.0);
    }

    #[test]
    fn test_force_cross_is_dual() {
        let v = SpatialVector::new(0.1, 0.2, 0.3, -0.4, 0.5, 0.6);
        let m = SpatialVector::new(1.0, -2.0, 0.5, 0.3, 0.2, -0.1);
        let f = SpatialVector::new(0.7, 0.1, -0.3, 0.2, -0.6, 0.4);
        // Power is invariant: (v x m) . f = -m . (v x* f)
        assert!((cross_motion(&v, &m).dot(&f) + m.dot(&cross_force(&v, &f))).abs() < 1e-12);
    }

    #[test]
    fn test_motion_transform() {
        // Child frame one unit along x, rotated about z: a pure parent rotation about z is seen
        // at the child origin with a linear part
        let pose = Pose::from_parts(Vector3::new(1.0, 0.0, 0.0).into(), UnitQuaternion::from_euler_angles(0.0, 0.0, 0.5));
        let x = motion_transform(&pose);
        let twist = x * spatial_vec(&Vector3::z(), &Vector3::zeros());
        assert!((angular(&twist) - Vector3::z()).norm() < 1e-12);
        let expected = pose.rotation.inverse() * Vector3::new(0.0, 1.0, 0.0);
        assert!((linear(&twist) - expected).norm() < 1e-12);

        let back = motion_transform(&pose.inverse()) * x;
        assert!((back - SpatialMatrix::identity()).amax() < 1e-12);
    }
}
