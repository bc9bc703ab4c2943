//! Helper functions

use nalgebra::{Dim, Isometry3, Matrix, Matrix3, Matrix4, RawStorage, Rotation3, Translation3, UnitQuaternion};

/// Checks if all joint values are finite
pub fn is_valid(qs: &[f64]) -> bool {
    qs.iter().all(|&q| q.is_finite())
}

/// Allows to specify joint values in degrees (converts to radians)
pub fn as_radians(degrees: &[f64]) -> Vec<f64> {
    degrees.iter().map(|d| d.to_radians()).collect()
}

/// Print joint values, converting radians to degrees.
#[allow(dead_code)]
pub fn dump_joints(joints: &[f64]) {
    let mut row_str = String::new();
    for computed in joints {
        row_str.push_str(&format!("{:5.2} ", computed.to_degrees()));
    }
    println!("[{}]", row_str.trim_end());
}

pub fn dump_pose(isometry: &Isometry3<f64>) {
    let translation = isometry.translation.vector;
    let rotation: UnitQuaternion<f64> = isometry.rotation;
    println!(
        "x: {:.5}, y: {:.5}, z: {:.5},  quat: {:.5},{:.5},{:.5},{:.5}",
        translation.x, translation.y, translation.z, rotation.i, rotation.j, rotation.k, rotation.w
    );
}

/// Homogeneous transform to isometry. The rotation block is assumed orthonormal.
pub fn matrix_to_pose(m: &Matrix4<f64>) -> Isometry3<f64> {
    let rotation: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();
    let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rotation));
    Isometry3::from_parts(Translation3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)]), rotation)
}

pub fn assert_pose_eq(ta: &Isometry3<f64>, tb: &Isometry3<f64>,
                 distance_tolerance: f64, angular_tolerance: f64) -> bool {
    fn bad(ta: &Isometry3<f64>, tb: &Isometry3<f64>) {
        dump_pose(ta);
        dump_pose(tb);
    }

    let translation_distance = (ta.translation.vector - tb.translation.vector).norm();
    let angular_distance = ta.rotation.angle_to(&tb.rotation);

    if translation_distance.abs() > distance_tolerance {
        bad(ta, tb);
        panic!("Poses have too different translations");
    }

    if angular_distance.abs() > angular_tolerance {
        bad(ta, tb);
        panic!("Poses have too different angles");
    }
    true
}

/// Element-wise comparison of two matrices of the same shape.
pub fn assert_matrix_eq<R1, C1, S1, R2, C2, S2>(
    actual: &Matrix<f64, R1, C1, S1>,
    expected: &Matrix<f64, R2, C2, S2>,
    tolerance: f64,
) -> bool
where
    R1: Dim,
    C1: Dim,
    S1: RawStorage<f64, R1, C1>,
    R2: Dim,
    C2: Dim,
    S2: RawStorage<f64, R2, C2>,
{
    assert_eq!(actual.shape(), expected.shape(), "Matrices have different shapes");
    let (rows, cols) = actual.shape();
    for row in 0..rows {
        for col in 0..cols {
            let (a, e) = (actual[(row, col)], expected[(row, col)]);
            if (a - e).abs() > tolerance {
                panic!("Matrices differ at ({}, {}): {} vs {}", row, col, a, e);
            }
        }
    }
    true
}
