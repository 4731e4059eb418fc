//! Shared types for the drive controller (engine-agnostic).
// drive/types.rs
use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================
// Wheel identification
// ============================================

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum WheelId { FL, FR, RL, RR }

impl WheelId {
    pub const ALL: [WheelId; 4] = [WheelId::FL, WheelId::FR, WheelId::RL, WheelId::RR];

    pub fn as_str(&self) -> &'static str {
        match self {
            WheelId::FL => "FL",
            WheelId::FR => "FR",
            WheelId::RL => "RL",
            WheelId::RR => "RR",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            WheelId::FL => 0,
            WheelId::FR => 1,
            WheelId::RL => 2,
            WheelId::RR => 3,
        }
    }

    pub fn is_front(&self) -> bool {
        matches!(self, WheelId::FL | WheelId::FR)
    }

    pub fn is_rear(&self) -> bool {
        matches!(self, WheelId::RL | WheelId::RR)
    }
}

impl fmt::Display for WheelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================
// ----- per-wheel output ---------------------
// ============================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WheelCommand {
    pub motor_torque: f32, // N·m, signed by drive orientation
    pub brake_torque: f32, // N·m
    pub steer_angle: f32,  // radians, front wheels only
}

/// One command per wheel, indexed by `WheelId::index`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WheelCommands(pub [WheelCommand; 4]);

impl WheelCommands {
    pub fn get(&self, id: WheelId) -> &WheelCommand {
        &self.0[id.index()]
    }

    pub fn get_mut(&mut self, id: WheelId) -> &mut WheelCommand {
        &mut self.0[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (WheelId, &WheelCommand)> {
        WheelId::ALL.into_iter().zip(self.0.iter())
    }
}

// ============================================
// ----- tunable stats ------------------------
// ============================================

/// The four stats that upgrades add to and boosts multiply.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriveStats {
    pub max_motor_torque: f32,  // N·m
    pub max_speed: f32,         // m/s
    pub acceleration_rate: f32, // N·m per second of torque ramp
    pub max_brake_torque: f32,  // N·m
}

/// Input latched by the glue layer between ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DriveInput {
    pub gas_pressed: bool,
    pub brake_pressed: bool,
    pub steer_axis: f32, // -1..1
}

/// Side effects the controller asks its owner to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveEvent {
    BoostStarted,
    BoostEnded,
}
