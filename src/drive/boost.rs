// ==============================================================================
// boost.rs — TIMED STAT BOOST (NON-COMPOUNDING)
// ------------------------------------------------------------------------------
// A boost multiplies torque, top speed and acceleration of the *baseline*
// stats (factory + upgrades). It never multiplies an already boosted value:
// re-activating while active cancels the pending expiry and re-applies the new
// multipliers to the same baseline. Brake torque is never boosted.
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::drive::types::DriveStats;
use crate::sched::TaskHandle;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostMultipliers {
    pub torque: f32,
    pub speed: f32,
    pub acceleration: f32,
}

impl BoostMultipliers {
    pub fn new(torque: f32, speed: f32, acceleration: f32) -> Self {
        Self {
            torque: torque.max(0.0),
            speed: speed.max(0.0),
            acceleration: acceleration.max(0.0),
        }
    }

    pub fn apply(&self, baseline: &DriveStats) -> DriveStats {
        DriveStats {
            max_motor_torque: baseline.max_motor_torque * self.torque,
            max_speed: baseline.max_speed * self.speed,
            acceleration_rate: baseline.acceleration_rate * self.acceleration,
            max_brake_torque: baseline.max_brake_torque,
        }
    }
}

/// Marker task placed on the controller's timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoostExpired;

#[derive(Debug, Clone, Copy)]
pub struct ActiveBoost {
    pub multipliers: BoostMultipliers,
    pub expiry: TaskHandle,
}
