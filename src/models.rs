//! Ready made robot models.

use std::f64::consts::PI;

use nalgebra::Vector3;

use crate::et::ET;
use crate::kinematics_error::Result;
use crate::link::{Link, LinkDynamics};
use crate::robot::Robot;

/// Franka Emika Panda, 7 revolute joints. Configurations `qz` (all zero) and `qr` (ready).
pub fn panda() -> Result<Robot> {
    let deg = |d: f64| d.to_radians();
    let links = vec![
        Link::new(ET::tz(0.333) * ET::rz_joint())
            .named("link0")
            .with_qlim(-2.8973, 2.8973),
        Link::new(ET::rx(deg(-90.0)) * ET::rz_joint())
            .named("link1")
            .with_parent("link0")
            .with_qlim(-1.7628, 1.7628),
        Link::new(ET::rx(deg(90.0)) * ET::tz(0.316) * ET::rz_joint())
            .named("link2")
            .with_parent("link1")
            .with_qlim(-2.8973, 2.8973),
        Link::new(ET::tx(0.0825) * ET::rx(deg(90.0)) * ET::rz_joint())
            .named("link3")
            .with_parent("link2")
            .with_qlim(-3.0718, -0.0698),
        Link::new(ET::tx(-0.0825) * ET::rx(deg(-90.0)) * ET::tz(0.384) * ET::rz_joint())
            .named("link4")
            .with_parent("link3")
            .with_qlim(-2.8973, 2.8973),
        Link::new(ET::rx(deg(90.0)) * ET::rz_joint())
            .named("link5")
            .with_parent("link4")
            .with_qlim(-0.0175, 3.7525),
        Link::new(ET::tx(0.088) * ET::rx(deg(90.0)) * ET::tz(0.107) * ET::rz_joint())
            .named("link6")
            .with_parent("link5")
            .with_qlim(-2.8973, 2.8973),
        Link::new(ET::tz(0.103) * ET::rz(-PI / 4.0))
            .named("ee")
            .with_parent("link6"),
    ];

    Robot::builder(links)
        .name("Panda")
        .manufacturer("Franka Emika")
        .configuration("qz", &[0.0; 7])
        .configuration("qr", &[0.0, -0.3, 0.0, -2.2, 0.0, 2.0, PI / 4.0])
        .build()
}

/// Planar two link arm rotating about y, unit links with 1 kg point masses at their middle.
/// The textbook case for checking dynamics.
pub fn planar_2link() -> Result<Robot> {
    let dynamics = LinkDynamics::new(1.0, Vector3::new(0.5, 0.0, 0.0));
    let links = vec![
        Link::new(ET::ry_joint())
            .named("link1")
            .with_dynamics(dynamics.clone()),
        Link::new(ET::tx(1.0) * ET::ry_joint())
            .named("link2")
            .with_parent("link1")
            .with_dynamics(dynamics),
        Link::new(ET::tx(1.0))
            .named("ee")
            .with_parent("link2"),
    ];
    Robot::builder(links)
        .name("Planar 2 link")
        .configuration("qz", &[0.0, 0.0])
        .build()
}
