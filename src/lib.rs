//! lanerush-server - authoritative simulation for an endless two-lane road:
//! the player's longitudinal drive controller, lane-changing traffic and the
//! websocket loop that streams runs to clients.

pub mod config;
pub mod error;
pub mod sched;
pub mod drive;
pub mod traffic;
pub mod physics;
pub mod vehicle;
pub mod spawn;
pub mod obstacles;
pub mod simulation;
pub mod state;
pub mod net;

pub use config::SimConfig;
pub use simulation::{Command, SimEvent, Simulation};
