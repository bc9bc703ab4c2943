use nalgebra::{Matrix6xX, Translation3, UnitQuaternion, Vector3};

use crate::et::ET;
use crate::ets::ETS;
use crate::kinematic_traits::Pose;
use crate::kinematics_error::KinematicsError;
use crate::link::Link;
use crate::path::Span;
use crate::robot::Robot;
use crate::utils::{assert_matrix_eq, assert_pose_eq};

fn rz_chain(jindex: [Option<usize>; 4]) -> Vec<Link> {
    jindex
        .iter()
        .enumerate()
        .map(|(k, j)| {
            let mut link = Link::new(ET::rz_joint()).named(&format!("e{}", k + 1));
            if k > 0 {
                link = link.with_parent(&format!("e{}", k));
            }
            match j {
                Some(j) => link.with_jindex(*j),
                None => link,
            }
        })
        .collect()
}

#[test]
fn test_ets_robot() {
    let ets = ET::tx(-0.0825) * ET::rz_joint() * ET::tx(-0.0825) * ET::rz_joint() * ET::tx(0.1);
    let robot = Robot::from_ets(&ets).unwrap();
    assert_eq!(robot.n(), 2);
    assert_eq!(robot.links().len(), 3);
    // Joint indices are assigned on the way
    let rebuilt = robot.ets(&Span::default()).unwrap();
    assert_eq!(rebuilt.len(), ets.len());
    assert_eq!(rebuilt.to_string(), "tx(-0.0825) * Rz(q0) * tx(-0.0825) * Rz(q1) * tx(0.1)");
}

#[test]
fn test_gripper_joint_indices_are_separate() {
    // The fourth link repeats index 0, allowed since it belongs to the gripper
    let robot = Robot::builder(rz_chain([Some(0), Some(1), Some(2), Some(0)])).gripper("e4").build().unwrap();
    assert_eq!(robot.n(), 3);
    assert_eq!(robot.gripper("e4").unwrap().n(), 1);
}

#[test]
fn test_joint_index_out_of_range() {
    let result = Robot::new(rz_chain([Some(0), Some(1), Some(2), Some(5)]));
    assert!(matches!(result, Err(KinematicsError::JointIndexOutOfRange(5))));
}

#[test]
fn test_joint_index_partially_given() {
    let result = Robot::new(rz_chain([Some(0), Some(1), Some(2), None]));
    assert!(matches!(result, Err(KinematicsError::MixedJointIndices)));
}

#[test]
fn test_joint_index_repeated() {
    let result = Robot::new(rz_chain([Some(0), Some(1), Some(1), Some(3)]));
    assert!(matches!(result, Err(KinematicsError::JointIndexOutOfRange(1))));
}

#[test]
fn test_custom_joint_order() {
    let robot = Robot::new(rz_chain([Some(3), Some(2), Some(1), Some(0)])).unwrap();
    let span = Span::default();
    let jacobian = robot.jacob0(&[0.0; 4], &span).unwrap();
    assert_eq!(jacobian.ncols(), 4);
    let ets = robot.ets(&span).unwrap();
    assert_eq!(ets[0].jindex(), Some(3));
    assert_eq!(ets[3].jindex(), Some(0));
}

#[test]
fn test_two_base_links() {
    let links = vec![
        Link::new(ETS::default()).named("e1"),
        Link::new(ETS::default()).named("e2"),
        Link::new(ETS::default()).named("e3").with_parent("e1"),
        Link::new(ETS::default()).named("e4").with_parent("e2"),
    ];
    assert!(matches!(Robot::new(links), Err(KinematicsError::MultipleBaseLinks(..))));
}

#[test]
fn test_empty_link_is_a_frame() {
    let links = vec![
        Link::new(ET::tz(0.5) * ET::rz_joint()).named("column"),
        Link::new(ETS::default()).named("mount").with_parent("column"),
        Link::new(ET::tx(0.3) * ET::ry_joint()).named("arm").with_parent("mount"),
    ];
    let robot = Robot::new(links).unwrap();
    assert_eq!(robot.n(), 2);
    assert_eq!(robot.structure(), "RR");

    let q = [0.4, -0.2];
    let column = robot.fkine(&q, &Span::to("column")).unwrap();
    let mount = robot.fkine(&q, &Span::to("mount")).unwrap();
    assert_pose_eq(&mount, &column, 1e-12, 1e-12);
    assert_eq!(robot.jacob0(&q, &Span::to("mount")).unwrap().ncols(), 1);
    assert_eq!(robot.jacob0(&q, &Span::to("arm")).unwrap().ncols(), 2);
}

#[test]
fn test_complex_chain_jacobian() {
    let links = vec![
        Link::new(ET::tx(0.1) * ET::rx_joint()).named("l0"),
        Link::new(ET::tx(0.1) * ET::ry_joint()).named("l1").with_parent("l0"),
        Link::new(ET::tx(0.1) * ET::rz_joint()).named("l2").with_parent("l1"),
        Link::new(ET::tx(0.1) * ET::tx_joint()).named("l3").with_parent("l2"),
        Link::new(ET::tx(0.1) * ET::ty_joint()).named("l4").with_parent("l3"),
        Link::new(ET::tx(0.1) * ET::tz_joint()).named("l5").with_parent("l4"),
    ];
    let robot = Robot::new(links).unwrap();
    assert_eq!(robot.structure(), "RRRPPP");

    let expected = Matrix6xX::from_row_slice(&[
        0.0, 0.08752679, -0.74761985, 0.41198225, 0.05872664, 0.90929743,
        1.46443609, 2.80993063, 0.52675075, -0.68124272, -0.64287284, 0.35017549,
        -1.04432, -1.80423571, -2.20308833, 0.60512725, -0.76371834, -0.2248451,
        1.0, 0.0, 0.90929743, 0.0, 0.0, 0.0,
        0.0, 0.54030231, 0.35017549, 0.0, 0.0, 0.0,
        0.0, 0.84147098, -0.2248451, 0.0, 0.0, 0.0,
    ]);
    let jacobian = robot.jacob0(&[1.0, 2.0, 3.0, 1.0, 2.0, 3.0], &Span::default()).unwrap();
    assert_matrix_eq(&jacobian, &expected, 1e-6);
}

#[test]
fn test_branches_need_an_end() {
    let links = vec![
        Link::new(ET::rz_joint()).named("torso"),
        Link::new(ET::ty(0.2) * ET::ry_joint()).named("left").with_parent("torso"),
        Link::new(ET::ty(-0.2) * ET::ry_joint()).named("right").with_parent("torso"),
    ];
    let robot = Robot::new(links).unwrap();
    assert_eq!(robot.ee_links().len(), 2);
    assert!(matches!(
        robot.fkine(&[0.0; 3], &Span::default()),
        Err(KinematicsError::AmbiguousEndEffector(_))
    ));

    let left = robot.fkine(&[0.0; 3], &Span::to("left")).unwrap();
    assert!((left.translation.vector - Vector3::new(0.0, 0.2, 0.0)).norm() < 1e-12);
    // Sibling paths are not walked
    assert!(matches!(
        robot.fkine(&[0.0; 3], &Span::to("right").from_link("left")),
        Err(KinematicsError::NoPath { .. })
    ));
    // Each branch has its own joint set
    let jacobian = robot.jacob0(&[0.0; 3], &Span::to("right")).unwrap();
    assert_eq!(jacobian.ncols(), 2);
}

#[test]
fn test_base_and_tool() {
    let ets = ET::tz(0.5) * ET::rz_joint() * ET::tx(1.0);
    let mut robot = Robot::from_ets(&ets).unwrap();
    let q = [0.3];
    let plain = robot.fkine(&q, &Span::default()).unwrap();

    let base = Pose::from_parts(Translation3::new(0.0, 0.0, 1.0), UnitQuaternion::from_euler_angles(0.0, 0.0, 0.2));
    let tool = Pose::from_parts(Translation3::new(0.0, 0.1, 0.0), UnitQuaternion::identity());
    robot.set_base(base);
    robot.set_tool(tool);
    let with_both = robot.fkine(&q, &Span::default()).unwrap();
    assert_pose_eq(&with_both, &(base * plain * tool), 1e-12, 1e-12);

    // A span tool replaces the robot tool
    let other = Pose::from_parts(Translation3::new(0.2, 0.0, 0.0), UnitQuaternion::identity());
    let replaced = robot.fkine(&q, &Span::default().with_tool(&other)).unwrap();
    assert_pose_eq(&replaced, &(base * plain * other), 1e-12, 1e-12);

    // Naming the base link as start is the same as leaving it out
    let local = robot.fkine(&q, &Span::to("ee").from_link("link0")).unwrap();
    assert_pose_eq(&local, &(base * plain * tool), 1e-12, 1e-12);
}

#[test]
fn test_path_cache() {
    let robot = Robot::from_ets(&(ET::rz_joint() * ET::tx(1.0) * ET::ry_joint() * ET::tx(1.0))).unwrap();
    assert_eq!(robot.cached_paths(), 0);
    let first = robot.get_path(&Span::default()).unwrap();
    let second = robot.get_path(&Span::to("ee")).unwrap();
    assert_eq!(first, second);
    assert_eq!(robot.cached_paths(), 1);
    robot.get_path(&Span::to("link1")).unwrap();
    assert_eq!(robot.cached_paths(), 2);
    assert!(matches!(robot.get_path(&Span::to("nowhere")), Err(KinematicsError::NoSuchLink(_))));
}

#[test]
fn test_gripper_path() {
    let links = vec![
        Link::new(ET::tz(0.3) * ET::rz_joint()).named("arm"),
        Link::new(ET::tz(0.1)).named("hand").with_parent("arm"),
        Link::new(ET::ty_joint()).named("finger").with_parent("hand"),
    ];
    let tool = Pose::from_parts(Translation3::new(0.0, 0.0, 0.05), UnitQuaternion::identity());
    let mut robot = Robot::builder(links).gripper_with_tool("hand", tool).build().unwrap();
    assert_eq!(robot.n(), 1);
    assert_eq!(robot.ee_links(), &[robot.link_id("arm").unwrap()]);

    // Default end is the gripper, its tool is attached
    let pose = robot.fkine(&[0.0], &Span::default()).unwrap();
    assert!((pose.translation.vector - Vector3::new(0.0, 0.0, 0.45)).norm() < 1e-12);

    // Links inside the gripper are reached with the stored gripper joint values, no gripper tool
    robot.set_gripper_q("hand", &[0.02]).unwrap();
    let finger = robot.fkine(&[0.0], &Span::to("finger")).unwrap();
    assert!((finger.translation.vector - Vector3::new(0.0, 0.02, 0.4)).norm() < 1e-12);
    let jacobian = robot.jacob0(&[0.0], &Span::to("finger")).unwrap();
    assert_eq!(jacobian.ncols(), 1);
    assert!((jacobian[(0, 0)] + 0.02).abs() < 1e-12);
    assert!((jacobian[(5, 0)] - 1.0).abs() < 1e-12);
    // The start must still be a robot link
    assert!(matches!(
        robot.fkine(&[0.0], &Span::to("finger").from_link("hand")),
        Err(KinematicsError::NotInRobot(_))
    ));

    assert!(matches!(robot.set_gripper_q("hand", &[0.0, 1.0]), Err(KinematicsError::JointCount { .. })));
    assert!(robot.hierarchy().contains("hand (gripper)"));
}

#[test]
fn test_gripper_tool_composition() {
    let links = vec![
        Link::new(ET::tz(0.3) * ET::rz_joint()).named("arm"),
        Link::new(ET::tz(0.1)).named("hand").with_parent("arm"),
        Link::new(ET::ty_joint()).named("finger").with_parent("hand"),
    ];
    let gripper_tool = Pose::from_parts(Translation3::new(0.0, 0.0, 0.05), UnitQuaternion::identity());
    let robot_tool = Pose::from_parts(Translation3::new(0.2, 0.0, 0.0), UnitQuaternion::identity());
    let robot = Robot::builder(links).gripper_with_tool("hand", gripper_tool).tool(robot_tool).build().unwrap();
    let q = [0.0];
    let at = |span: &Span| robot.fkine(&q, span).unwrap().translation.vector;

    // The gripper tool replaces the robot tool
    assert!((at(&Span::default()) - Vector3::new(0.0, 0.0, 0.45)).norm() < 1e-12);
    assert!((at(&Span::to("hand")) - Vector3::new(0.0, 0.0, 0.45)).norm() < 1e-12);

    // A span tool follows the gripper tool
    let extra = Pose::from_parts(Translation3::new(0.0, 0.1, 0.0), UnitQuaternion::identity());
    assert!((at(&Span::default().with_tool(&extra)) - Vector3::new(0.0, 0.1, 0.45)).norm() < 1e-12);

    // Without a gripper tool the robot tool applies, or the span tool in its place
    assert!((at(&Span::to("arm")) - Vector3::new(0.2, 0.0, 0.3)).norm() < 1e-12);
    assert!((at(&Span::to("finger")) - Vector3::new(0.2, 0.0, 0.4)).norm() < 1e-12);
    assert!((at(&Span::to("arm").with_tool(&extra)) - Vector3::new(0.0, 0.1, 0.3)).norm() < 1e-12);
}
