// ==============================================================================
// controller.rs — LONGITUDINAL DRIVE CONTROLLER (PLAYER CAR)
// ==============================================================================
// Per fixed tick:
// 1) Fire a pending boost expiry, if due (baseline restored first).
// 2) Ramp applied torque: toward max under gas, toward 0 while coasting,
//    straight to 0 under brake (brake overrides gas).
// 3) Quadratic top-speed falloff: out = lerp(applied, 0, (v / v_max)^2).
// 4) Emit per-wheel commands: rear wheels drive, all four brake, fronts steer.
//
// Invariants:
// - applied torque stays within [0, current max motor torque]
// - boost multipliers only ever scale the baseline (factory + upgrades)
// - deactivating a boost restores the baseline bit-for-bit
// ==============================================================================

use tracing::{debug, info};

use crate::config::DriveConfig;
use crate::drive::boost::{ActiveBoost, BoostExpired, BoostMultipliers};
use crate::drive::types::{DriveEvent, DriveInput, DriveStats, WheelCommands, WheelId};
use crate::drive::upgrades::{upgraded_stats, UpgradeLevels, UpgradePaths};
use crate::error::DriveError;
use crate::sched::Timeline;

#[inline]
pub(crate) fn move_towards(current: f32, target: f32, max_delta: f32) -> f32 {
    if (target - current).abs() <= max_delta {
        target
    } else {
        current + (target - current).signum() * max_delta
    }
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Torque left after the top-speed falloff.
/// A non-positive top speed leaves nothing to drive with.
pub fn speed_limited_torque(applied: f32, speed_mps: f32, max_speed: f32) -> f32 {
    if max_speed.is_nan() || max_speed <= 0.0 {
        return 0.0;
    }
    let speed_factor = (speed_mps / max_speed).clamp(0.0, 1.0);
    lerp(applied, 0.0, speed_factor * speed_factor)
}

#[derive(Debug)]
pub struct DriveController {
    config: DriveConfig,
    baseline: DriveStats,
    stats: DriveStats,
    input: DriveInput,
    applied_torque: f32,
    last_command: WheelCommands,
    boost: Option<ActiveBoost>,
    timeline: Timeline<BoostExpired>,
    events: Vec<DriveEvent>,
}

impl DriveController {
    pub fn new(config: DriveConfig) -> Result<Self, DriveError> {
        let checks = [
            ("max_motor_torque", config.max_motor_torque),
            ("acceleration_rate", config.acceleration_rate),
            ("coasting_deceleration_rate", config.coasting_deceleration_rate),
            ("max_brake_torque", config.max_brake_torque),
            ("max_speed", config.max_speed),
        ];
        for (stat, value) in checks {
            if !(value.is_finite() && value > 0.0) {
                return Err(DriveError::InvalidStat { stat, value });
            }
        }
        if !config.max_steer_angle.is_finite() || config.max_steer_angle < 0.0 {
            return Err(DriveError::InvalidStat {
                stat: "max_steer_angle",
                value: config.max_steer_angle,
            });
        }

        let baseline = config.factory_stats();
        Ok(Self {
            config,
            baseline,
            stats: baseline,
            input: DriveInput::default(),
            applied_torque: 0.0,
            last_command: WheelCommands::default(),
            boost: None,
            timeline: Timeline::new(),
            events: Vec::new(),
        })
    }

    // ------------------------------------------------------------------
    // input setters (latched until changed)
    // ------------------------------------------------------------------

    pub fn set_gas_pressed(&mut self, pressed: bool) {
        self.input.gas_pressed = pressed;
    }

    pub fn set_brake_pressed(&mut self, pressed: bool) {
        if pressed && !self.input.brake_pressed {
            self.applied_torque = 0.0;
            for id in [WheelId::RL, WheelId::RR] {
                self.last_command.get_mut(id).motor_torque = 0.0;
            }
        }
        self.input.brake_pressed = pressed;
    }

    pub fn set_steer_axis(&mut self, axis: f32) {
        self.input.steer_axis = if axis.is_finite() { axis.clamp(-1.0, 1.0) } else { 0.0 };
    }

    // ------------------------------------------------------------------
    // accessors
    // ------------------------------------------------------------------

    pub fn input(&self) -> DriveInput {
        self.input
    }

    pub fn applied_torque(&self) -> f32 {
        self.applied_torque
    }

    /// Current stats (boosted when a boost is active).
    pub fn stats(&self) -> &DriveStats {
        &self.stats
    }

    /// Pre-boost stats: factory values plus upgrades.
    pub fn baseline(&self) -> &DriveStats {
        &self.baseline
    }

    pub fn is_boost_active(&self) -> bool {
        self.boost.is_some()
    }

    pub fn last_command(&self) -> &WheelCommands {
        &self.last_command
    }

    pub fn drain_events(&mut self) -> Vec<DriveEvent> {
        std::mem::take(&mut self.events)
    }

    // ------------------------------------------------------------------
    // fixed tick
    // ------------------------------------------------------------------

    pub fn tick(&mut self, current_speed_mps: f32, dt: f32) -> WheelCommands {
        if !self.timeline.advance(dt).is_empty() {
            debug!("speed boost expired");
            self.deactivate_speed_boost();
        }

        let DriveInput { gas_pressed, brake_pressed, steer_axis } = self.input;
        let max_torque = self.stats.max_motor_torque;

        if gas_pressed && !brake_pressed {
            self.applied_torque =
                move_towards(self.applied_torque, max_torque, self.stats.acceleration_rate * dt);
        } else if !gas_pressed && !brake_pressed {
            self.applied_torque =
                move_towards(self.applied_torque, 0.0, self.config.coasting_deceleration_rate * dt);
        } else {
            self.applied_torque = 0.0;
        }
        // a boost that just ended can leave us above the restored max
        self.applied_torque = self.applied_torque.clamp(0.0, max_torque);

        let out = speed_limited_torque(self.applied_torque, current_speed_mps.abs(), self.stats.max_speed);
        let motor = if self.config.forward_direction { out } else { -out };
        let brake = if brake_pressed { self.stats.max_brake_torque } else { 0.0 };
        let steer = steer_axis * self.config.max_steer_angle;

        let mut cmd = WheelCommands::default();
        for id in WheelId::ALL {
            let wheel = cmd.get_mut(id);
            wheel.brake_torque = brake;
            if id.is_rear() {
                wheel.motor_torque = motor;
            }
            if id.is_front() {
                wheel.steer_angle = steer;
            }
        }

        self.last_command = cmd;
        cmd
    }

    // ------------------------------------------------------------------
    // boost
    // ------------------------------------------------------------------

    pub fn activate_speed_boost(
        &mut self,
        torque_multiplier: f32,
        speed_multiplier: f32,
        acceleration_multiplier: f32,
        duration: f32,
    ) {
        let multipliers = BoostMultipliers::new(torque_multiplier, speed_multiplier, acceleration_multiplier);

        let refreshed = match self.boost.take() {
            Some(previous) => {
                self.timeline.cancel(previous.expiry);
                true
            }
            None => false,
        };

        self.stats = multipliers.apply(&self.baseline);
        let expiry = self.timeline.schedule_after(duration, BoostExpired);
        self.boost = Some(ActiveBoost { multipliers, expiry });

        if refreshed {
            debug!(?multipliers, duration, "speed boost refreshed");
        } else {
            info!(?multipliers, duration, "speed boost started");
            self.events.push(DriveEvent::BoostStarted);
        }
    }

    pub fn deactivate_speed_boost(&mut self) {
        if let Some(active) = self.boost.take() {
            self.timeline.cancel(active.expiry);
            self.stats = self.baseline;
            info!("speed boost ended");
            self.events.push(DriveEvent::BoostEnded);
        }
    }

    // ------------------------------------------------------------------
    // upgrades
    // ------------------------------------------------------------------

    /// Rebuild the baseline from factory stats and the owned upgrade tiers.
    /// An active boost keeps its multipliers on top of the new baseline.
    pub fn apply_all_upgrades(&mut self, paths: &UpgradePaths, levels: &UpgradeLevels) {
        self.baseline = upgraded_stats(&self.config.factory_stats(), paths, levels);
        self.stats = match &self.boost {
            Some(active) => active.multipliers.apply(&self.baseline),
            None => self.baseline,
        };
        info!(
            max_speed = self.baseline.max_speed,
            max_motor_torque = self.baseline.max_motor_torque,
            "upgrades applied"
        );
    }

    /// Back to a standing start: inputs released, torque and boost cleared.
    pub fn reset_run(&mut self) {
        self.deactivate_speed_boost();
        self.input = DriveInput::default();
        self.applied_torque = 0.0;
        self.last_command = WheelCommands::default();
        self.events.clear();
    }
}
