//! traffic - lane-change agents and the sensing they rely on

pub mod lanes;
pub mod sensing;
pub mod agent;

pub use agent::{AgentCommand, AgentEvent, AgentPose, AgentState, LaneChangeAgent};
pub use lanes::Lanes;
pub use sensing::{BoxProbe, SenseHit, SensedVehicle, TrafficSensor};
