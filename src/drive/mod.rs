//! drive - player car control, engine-agnostic (pure types + controller)

pub mod types;
pub mod boost;
pub mod upgrades;
pub mod crash;
pub mod distance;
pub mod controller;

pub use types::*;
pub use controller::DriveController;
