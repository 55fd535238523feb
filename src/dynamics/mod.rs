//! Rigid bodies, materials, activity/deactivation, and simulation islands
//! (spec.md section 3 and section 4.7). Joint definitions live in
//! [`joint`]; the constraint math that actually solves them lives in
//! `crate::solver`.

mod activity;
mod builder;
mod coefficient_combine_rule;
pub mod island;
pub mod joint;
mod material;
mod rigid_body;
mod rigid_body_set;

pub use activity::{ActivityInfo, RigidBodyChanges};
pub use builder::RigidBodyBuilder;
pub use coefficient_combine_rule::CoefficientCombineRule;
pub use island::{DeactivationConfig, IslandConnection, IslandHandle, IslandManager, SimulationIsland};
pub use joint::{Joint, JointHandle, JointKind, JointLimit, JointMotor, JointSet};
pub use material::Material;
pub use rigid_body::{BodyStatus, RigidBody};
pub use rigid_body_set::{BodyPair, RigidBodyHandle, RigidBodySet};
