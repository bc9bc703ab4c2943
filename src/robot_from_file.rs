//! Supports reading robot models from YAML files and ETS from strings (optional)

use std::path::Path;
use std::str::FromStr;

use nalgebra::{Translation3, UnitQuaternion, Vector3};
use regex::Regex;
use tracing::debug;
use yaml_rust2::{Yaml, YamlLoader};

use crate::backend::BackendKind;
use crate::et::{Axis, ET};
use crate::ets::ETS;
use crate::kinematic_traits::Pose;
use crate::kinematics_error::{KinematicsError, Result};
use crate::link::{Link, LinkDynamics};
use crate::robot::Robot;

fn regex(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|_| KinematicsError::Parse("Invalid regex pattern".to_string()))
}

/// Parses ETS strings and numeric YAML values, where angles may be written as `deg(90)`.
struct ModelParser {
    element: Regex,
    variable: Regex,
    degrees: Regex,
}

impl ModelParser {
    fn new() -> Result<Self> {
        Ok(ModelParser {
            element: regex(r"^([Rt])([xyz])\((.+)\)$")?,
            variable: regex(r"^(-?)q(\d*)$")?,
            degrees: regex(r"^deg\(\s*([^)]+?)\s*\)$")?,
        })
    }

    fn number(&self, text: &str) -> Result<f64> {
        let text = text.trim();
        let parse = |s: &str| s.parse::<f64>().map_err(|_| KinematicsError::Parse(format!("not a number: {}", text)));
        match self.degrees.captures(text) {
            Some(caps) => Ok(parse(&caps[1])?.to_radians()),
            None => parse(text),
        }
    }

    fn et(&self, token: &str) -> Result<ET> {
        let caps = self
            .element
            .captures(token)
            .ok_or_else(|| KinematicsError::Parse(format!("not an elementary transform: {}", token)))?;
        let axis = match (&caps[1], &caps[2]) {
            ("R", "x") => Axis::Rx,
            ("R", "y") => Axis::Ry,
            ("R", "z") => Axis::Rz,
            ("t", "x") => Axis::Tx,
            ("t", "y") => Axis::Ty,
            _ => Axis::Tz,
        };
        let argument = caps[3].trim();
        match self.variable.captures(argument) {
            Some(var) => {
                let mut et = ET::joint(axis)?;
                if &var[1] == "-" {
                    et = et.flipped();
                }
                if !var[2].is_empty() {
                    let jindex = var[2]
                        .parse()
                        .map_err(|_| KinematicsError::Parse(format!("bad joint index in {}", token)))?;
                    et = et.with_jindex(jindex);
                }
                Ok(et)
            }
            None => ET::constant(axis, self.number(argument)?),
        }
    }

    fn ets(&self, text: &str) -> Result<ETS> {
        if text.trim().is_empty() {
            return Ok(ETS::default());
        }
        let items = text.split('*').map(|token| self.et(token.trim())).collect::<Result<Vec<_>>>()?;
        Ok(ETS::new(items))
    }

    fn value(&self, value: &Yaml, field: &str) -> Result<f64> {
        match value {
            Yaml::Real(_) => value
                .as_f64()
                .ok_or_else(|| KinematicsError::Parse(format!("{}: not a number", field))),
            Yaml::Integer(i) => Ok(*i as f64),
            Yaml::String(s) => self.number(s),
            Yaml::BadValue | Yaml::Null => Err(KinematicsError::MissingField(field.to_string())),
            _ => Err(KinematicsError::Parse(format!("{}: expected a number", field))),
        }
    }

    fn values(&self, value: &Yaml, field: &str) -> Result<Vec<f64>> {
        value
            .as_vec()
            .ok_or_else(|| KinematicsError::Parse(format!("{}: expected a list", field)))?
            .iter()
            .map(|v| self.value(v, field))
            .collect()
    }

    fn vector3(&self, value: &Yaml, what: &'static str) -> Result<Vector3<f64>> {
        let values = self.values(value, what)?;
        if values.len() != 3 {
            return Err(KinematicsError::InvalidLength { what, expected: "3".to_string(), found: values.len() });
        }
        Ok(Vector3::new(values[0], values[1], values[2]))
    }

    /// `{xyz: [..], rpy: [..]}`, both optional.
    fn pose(&self, value: &Yaml) -> Result<Pose> {
        if value.is_badvalue() || value.is_null() {
            return Ok(Pose::identity());
        }
        let xyz = if value["xyz"].is_badvalue() { Vector3::zeros() } else { self.vector3(&value["xyz"], "xyz")? };
        let rpy = if value["rpy"].is_badvalue() { Vector3::zeros() } else { self.vector3(&value["rpy"], "rpy")? };
        Ok(Pose::from_parts(
            Translation3::from(xyz),
            UnitQuaternion::from_euler_angles(rpy.x, rpy.y, rpy.z),
        ))
    }

    fn link(&self, yaml: &Yaml) -> Result<Link> {
        let ets = yaml["ets"].as_str().ok_or_else(|| KinematicsError::MissingField("ets".to_string()))?;
        let mut link = Link::new(self.ets(ets)?);
        if let Some(name) = yaml["name"].as_str() {
            link = link.named(name);
        }
        if let Some(parent) = yaml["parent"].as_str() {
            link = link.with_parent(parent);
        }
        if let Some(jindex) = yaml["jindex"].as_i64() {
            let jindex = usize::try_from(jindex)
                .map_err(|_| KinematicsError::Parse(format!("negative joint index {}", jindex)))?;
            link = link.with_jindex(jindex);
        }
        if !yaml["qlim"].is_badvalue() {
            let qlim = self.values(&yaml["qlim"], "qlim")?;
            if qlim.len() != 2 {
                return Err(KinematicsError::InvalidLength { what: "qlim", expected: "2".to_string(), found: qlim.len() });
            }
            link = link.with_qlim(qlim[0], qlim[1]);
        }

        let mut dynamics = LinkDynamics::default();
        let present = |field: &str| !yaml[field].is_badvalue();
        if present("m") {
            dynamics.m = self.value(&yaml["m"], "m")?;
        }
        if present("r") {
            dynamics.r = self.vector3(&yaml["r"], "r")?;
        }
        if present("I") {
            dynamics = dynamics.with_inertia(&self.values(&yaml["I"], "I")?)?;
        }
        if present("Jm") {
            dynamics.jm = self.value(&yaml["Jm"], "Jm")?;
        }
        if present("B") {
            dynamics.b = self.value(&yaml["B"], "B")?;
        }
        if present("G") {
            dynamics.g = self.value(&yaml["G"], "G")?;
        }
        if present("Tc") {
            dynamics = dynamics.with_tc(&self.values(&yaml["Tc"], "Tc")?)?;
        }
        Ok(link.with_dynamics(dynamics))
    }
}

impl FromStr for ETS {
    type Err = KinematicsError;

    /// Parses `"tz(0.333) * Rz(q0) * Rx(deg(-90)) * ty(-q)"`. Joints are `q`, `qN` for joint
    /// index N, and `-q` for a flipped joint.
    fn from_str(s: &str) -> Result<ETS> {
        ModelParser::new()?.ets(s)
    }
}

impl Robot {
    /// Read the robot model from YAML file. YAML file like this is supported:
    /// ```yaml
    /// name: Arm
    /// manufacturer: Acme
    /// gravity: [0, 0, -9.81]
    /// backend: compiled
    /// base: {xyz: [0, 0, 0.5], rpy: [0, 0, deg(90)]}
    /// links:
    ///   - name: shoulder
    ///     ets: tz(0.3) * Rz(q)
    ///     qlim: [deg(-170), deg(170)]
    ///     m: 2.0
    ///     r: [0, 0, 0.1]
    ///     I: [0.01, 0.01, 0.005]
    ///   - name: elbow
    ///     parent: shoulder
    ///     ets: tx(0.4) * Ry(q)
    ///     Jm: 0.0002
    ///     G: 100
    ///     B: 0.001
    ///     Tc: [0.4, -0.4]
    ///   - name: hand
    ///     parent: elbow
    ///     ets: tx(0.1)
    /// grippers:
    ///   - root: hand
    ///     tool: {xyz: [0, 0, 0.05]}
    /// configurations:
    ///   qz: [0, 0]
    /// ```
    /// Everything except `links` and each link's `ets` is optional. Angles can be written as
    /// `deg(angle)`.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Robot> {
        let contents = std::fs::read_to_string(path)?;
        Robot::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Robot> {
        let docs = YamlLoader::load_from_str(contents).map_err(|e| KinematicsError::Parse(e.to_string()))?;
        let doc = docs.first().ok_or_else(|| KinematicsError::Parse("empty YAML document".to_string()))?;
        let parser = ModelParser::new()?;

        let links = doc["links"]
            .as_vec()
            .ok_or_else(|| KinematicsError::MissingField("links".to_string()))?
            .iter()
            .map(|link| parser.link(link))
            .collect::<Result<Vec<_>>>()?;

        let mut builder = Robot::builder(links)
            .base(parser.pose(&doc["base"])?)
            .tool(parser.pose(&doc["tool"])?);
        if let Some(name) = doc["name"].as_str() {
            builder = builder.name(name);
        }
        if let Some(manufacturer) = doc["manufacturer"].as_str() {
            builder = builder.manufacturer(manufacturer);
        }
        if !doc["gravity"].is_badvalue() {
            builder = builder.gravity(parser.vector3(&doc["gravity"], "gravity")?);
        }
        if let Some(backend) = doc["backend"].as_str() {
            builder = builder.backend(backend.parse::<BackendKind>()?);
        }
        if let Some(grippers) = doc["grippers"].as_vec() {
            for gripper in grippers {
                let root = gripper["root"]
                    .as_str()
                    .ok_or_else(|| KinematicsError::MissingField("gripper root".to_string()))?;
                builder = builder.gripper_with_tool(root, parser.pose(&gripper["tool"])?);
            }
        }
        if let Some(configurations) = doc["configurations"].as_hash() {
            for (name, q) in configurations {
                let name = name
                    .as_str()
                    .ok_or_else(|| KinematicsError::Parse("configuration names must be strings".to_string()))?;
                builder = builder.configuration(name, &parser.values(q, name)?);
            }
        }

        let robot = builder.build()?;
        debug!(robot = robot.name(), n = robot.n(), "robot loaded from YAML");
        Ok(robot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Span;
    use std::f64::consts::PI;

    #[test]
    fn test_parse_ets() {
        let ets: ETS = "tz(0.333) * Rz(q0) * Rx(deg(-90)) * ty(-q)".parse().unwrap();
        assert_eq!(ets.len(), 4);
        assert_eq!(ets.n(), 2);
        assert_eq!(ets[0], ET::tz(0.333));
        assert_eq!(ets[1].jindex(), Some(0));
        assert!((ets[2].eta().unwrap() + PI / 2.0).abs() < 1e-12);
        assert!(ets[3].is_flipped());
        assert_eq!(ets[3].jindex(), None);
    }

    #[test]
    fn test_parse_display_output() {
        let ets = ET::tx(0.5) * ET::ry_joint().with_jindex(3) * ET::rz(-1.25);
        let parsed: ETS = ets.to_string().parse().unwrap();
        assert_eq!(parsed, ets);
        assert_eq!("".parse::<ETS>().unwrap().len(), 0);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!("Qz(1)".parse::<ETS>(), Err(KinematicsError::Parse(_))));
        assert!(matches!("Rz(one)".parse::<ETS>(), Err(KinematicsError::Parse(_))));
        assert!(matches!("Rz(q) * ".parse::<ETS>(), Err(KinematicsError::Parse(_))));
    }

    #[test]
    fn test_from_yaml_str() {
        let yaml = r#"
name: Arm
manufacturer: Acme
gravity: [0, 0, -9.81]
backend: reference
base: {xyz: [0, 0, 0.5]}
links:
  - name: shoulder
    ets: tz(0.3) * Rz(q)
    qlim: [deg(-170), deg(170)]
    m: 2
    r: [0, 0, 0.1]
    I: [0.01, 0.01, 0.005]
  - name: elbow
    parent: shoulder
    ets: tx(0.4) * Ry(q)
    Jm: 0.0002
    G: 100
    Tc: [0.4, -0.3]
  - name: hand
    parent: elbow
    ets: tx(0.1)
grippers:
  - root: hand
    tool: {xyz: [0, 0, 0.05]}
configurations:
  qz: [0, 0]
  up: [0, deg(-90)]
"#;
        let robot = Robot::from_yaml_str(yaml).unwrap();
        assert_eq!(robot.name(), "Arm");
        assert_eq!(robot.manufacturer(), "Acme");
        assert_eq!(robot.n(), 2);
        assert_eq!(robot.backend_kind(), BackendKind::Reference);
        assert_eq!(robot.grippers().len(), 1);
        assert!((robot.qlim()[(1, 0)] - 170f64.to_radians()).abs() < 1e-12);

        let shoulder = robot.link_by_name("shoulder").unwrap();
        assert_eq!(shoulder.dynamics().m, 2.0);
        assert_eq!(shoulder.dynamics().inertia()[(2, 2)], 0.005);
        let elbow = robot.link_by_name("elbow").unwrap();
        assert_eq!(elbow.dynamics().g, 100.0);
        assert_eq!(elbow.dynamics().tc(), [0.4, -0.3]);

        // Gripper tool on top of the hand, base below the shoulder
        let pose = robot.fkine(&[0.0, 0.0], &Span::default()).unwrap();
        assert!((pose.translation.vector - Vector3::new(0.5, 0.0, 0.85)).norm() < 1e-12);
        let up = robot.configuration("up").unwrap();
        assert!((up[1] + PI / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_yaml_errors() {
        assert!(matches!(Robot::from_yaml_str("name: nothing"), Err(KinematicsError::MissingField(_))));
        let no_ets = "links:\n  - name: a\n";
        assert!(matches!(Robot::from_yaml_str(no_ets), Err(KinematicsError::MissingField(_))));
        let bad_qlim = "links:\n  - ets: Rz(q)\n    qlim: [1]\n";
        assert!(matches!(Robot::from_yaml_str(bad_qlim), Err(KinematicsError::InvalidLength { what: "qlim", .. })));
        assert!(matches!(Robot::from_yaml_file("no/such/file.yaml"), Err(KinematicsError::Io(_))));
    }
}
