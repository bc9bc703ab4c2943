use anyhow::Result;
use nalgebra::Vector3;

use rs_ets_kinematics::hessian::Axes;
use rs_ets_kinematics::models;
use rs_ets_kinematics::path::Span;
use rs_ets_kinematics::utils::{as_radians, dump_joints, dump_pose};

/// Usage example.
fn main() -> Result<()> {
    let panda = models::panda()?;
    println!("{}", panda);

    let q = as_radians(&[80.0, 11.5, 103.0, 40.0, 5.7, 177.6, 166.2]);
    let span = Span::default();
    println!("Joints:");
    dump_joints(&q);

    println!("End-effector pose:");
    dump_pose(&panda.fkine(&q, &span)?);

    println!("Base frame Jacobian:\n{}", panda.jacob0(&q, &span)?);
    println!(
        "Manipulability: {:.6} (translation only {:.6})",
        panda.manipulability(&q, &span, Axes::ALL)?,
        panda.manipulability(&q, &span, Axes::TRANS)?
    );
    println!("Manipulability gradient:\n{}", panda.jacobm(&q, &span, Axes::ALL)?);

    println!("Elbow and wrist only:");
    dump_pose(&panda.fkine(&q, &Span::to("link6").from_link("link3"))?);

    let planar = models::planar_2link()?;
    let q = [0.0, -std::f64::consts::FRAC_PI_2];
    println!("{}", planar);
    println!("Gravity load: {}", planar.gravload(&q, None)?.transpose());
    println!("Mass matrix:\n{}", planar.inertia(&q)?);
    println!(
        "Torques on the Moon: {}",
        planar.rne(&q, &[1.0, 0.0], &[0.0, 0.0], Some(Vector3::new(0.0, 0.0, -1.62)))?.transpose()
    );

    #[cfg(feature = "allow_filesystem")]
    {
        // This requires the YAML library
        let loaded = rs_ets_kinematics::robot::Robot::from_yaml_file("src/tests/data/panda.yaml");
        match loaded {
            Ok(robot) => println!("Loaded {} with {} joints from YAML", robot.name(), robot.n()),
            Err(e) => println!("YAML model not available: {}", e),
        }
    }
    Ok(())
}
