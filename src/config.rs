// ==============================================================================
// config.rs — RUN CONFIGURATION (TOML)
// ------------------------------------------------------------------------------
// Every section and every field is optional in the file; omitted values fall
// back to the tuning the game shipped with. `SimConfig::validate()` is run once
// at startup; bad values fail fast instead of producing undefined behaviour in
// the tick.
// ==============================================================================

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::drive::boost::BoostMultipliers;
use crate::drive::crash::CollisionLayer;
use crate::drive::types::DriveStats;
use crate::drive::upgrades::UpgradePaths;
use crate::error::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub server: ServerConfig,
    pub drive: DriveConfig,
    pub chassis: ChassisConfig,
    pub crash: CrashConfig,
    pub boost_pickup: BoostPickup,
    pub traffic: TrafficConfig,
    pub spawner: SpawnerConfig,
    pub obstacles: ObstacleConfig,
    pub upgrades: UpgradeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub tick_hz: u32,
    /// Fixed RNG seed for every run; random per run when absent.
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:9001".to_string(),
            tick_hz: 60,
            seed: None,
        }
    }
}

/// Factory tuning of the player car, before upgrades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub max_motor_torque: f32,           // N·m
    pub acceleration_rate: f32,          // N·m/s
    pub coasting_deceleration_rate: f32, // N·m/s
    pub max_brake_torque: f32,           // N·m
    pub max_steer_angle: f32,            // radians
    pub max_speed: f32,                  // m/s
    pub forward_direction: bool,         // false flips motor torque sign
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            max_motor_torque: 1500.0,
            acceleration_rate: 5000.0,
            coasting_deceleration_rate: 500.0,
            max_brake_torque: 3000.0,
            max_steer_angle: 30f32.to_radians(),
            max_speed: 50.0,
            forward_direction: true,
        }
    }
}

impl DriveConfig {
    pub fn factory_stats(&self) -> DriveStats {
        DriveStats {
            max_motor_torque: self.max_motor_torque,
            max_speed: self.max_speed,
            acceleration_rate: self.acceleration_rate,
            max_brake_torque: self.max_brake_torque,
        }
    }
}

/// Rigid-body geometry of the player car.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChassisConfig {
    pub mass: f32,                     // kg
    pub half_extents: [f32; 3],        // [hx, hy, hz] meters
    pub center_of_mass_y_offset: f32,  // meters, below collider center
    pub wheelbase: f32,                // meters
    pub track_width: f32,              // meters
    pub wheel_radius: f32,             // meters
    pub grip: f32,                     // lateral friction coefficient
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub spawn: [f32; 3],
}

impl Default for ChassisConfig {
    fn default() -> Self {
        Self {
            mass: 1200.0,
            half_extents: [0.9, 0.45, 2.1],
            center_of_mass_y_offset: -0.5,
            wheelbase: 2.6,
            track_width: 1.6,
            wheel_radius: 0.35,
            grip: 1.1,
            linear_damping: 0.05,
            angular_damping: 0.8,
            spawn: [0.0, 0.5, 0.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashConfig {
    pub crash_speed_threshold: f32, // m/s of relative impact speed
    pub cooldown: f32,              // s between accepted crashes
    pub handoff_delay: f32,         // s from impact to camera/UI swap
    pub game_over_delay: f32,       // s from swap to end-of-run screen
    pub crash_layers: Vec<CollisionLayer>,
}

impl Default for CrashConfig {
    fn default() -> Self {
        Self {
            crash_speed_threshold: 10.0,
            cooldown: 0.5,
            handoff_delay: 1.0,
            game_over_delay: 2.0,
            crash_layers: vec![CollisionLayer::Traffic, CollisionLayer::Obstacle],
        }
    }
}

/// What a collected speed power-up grants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostPickup {
    pub torque_multiplier: f32,
    pub speed_multiplier: f32,
    pub acceleration_multiplier: f32,
    pub duration: f32,
}

impl Default for BoostPickup {
    fn default() -> Self {
        Self {
            torque_multiplier: 1.5,
            speed_multiplier: 1.5,
            acceleration_multiplier: 2.0,
            duration: 5.0,
        }
    }
}

impl BoostPickup {
    pub fn multipliers(&self) -> BoostMultipliers {
        BoostMultipliers::new(
            self.torque_multiplier,
            self.speed_multiplier,
            self.acceleration_multiplier,
        )
    }
}

/// Tuning shared by every lane-changing traffic car.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficConfig {
    pub min_speed: f32,
    pub max_speed: f32,
    pub correction_strength: f32,
    pub max_correction_speed: f32,
    pub lane_change_sharpness: f32,
    pub right_lane_x: f32,
    pub left_lane_x: f32,
    pub detection_distance: f32,
    pub overtake_clearance_check_distance: f32,
    pub overtake_hold_time: f32,
    pub lane_check_tolerance: f32,
    /// Longitudinal lead the overtaken car must fall behind by.
    pub pass_buffer: f32,
    /// Half width of the ahead box cast; wide enough to see both lanes.
    pub ahead_half_width: f32,
    /// When false the cars still drive but sense nothing.
    pub sense_vehicles: bool,
    pub mass: f32,
    pub half_extents: [f32; 3],
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            min_speed: 8.0,
            max_speed: 15.0,
            correction_strength: 5.0,
            max_correction_speed: 3.0,
            lane_change_sharpness: 2.0,
            right_lane_x: 0.0,
            left_lane_x: 3.0,
            detection_distance: 25.0,
            overtake_clearance_check_distance: 40.0,
            overtake_hold_time: 1.5,
            lane_check_tolerance: 1.2,
            pass_buffer: 2.0,
            ahead_half_width: 10.0,
            sense_vehicles: true,
            mass: 1000.0,
            half_extents: [0.9, 0.6, 2.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnerConfig {
    pub target_car_count: usize,
    pub spawn_check_interval: f32,
    pub spawn_x: f32,
    pub spawn_y: f32,
    pub min_spawn_distance_z: f32,
    pub max_spawn_distance_z: f32,
    pub enable_cleanup: bool,
    pub cleanup_distance_z: f32,
    pub cleanup_check_interval: f32,
    pub overlap_radius: f32,
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self {
            target_car_count: 15,
            spawn_check_interval: 1.0,
            spawn_x: 0.0,
            spawn_y: 0.6,
            min_spawn_distance_z: 30.0,
            max_spawn_distance_z: 250.0,
            enable_cleanup: true,
            cleanup_distance_z: 350.0,
            cleanup_check_interval: 2.0,
            overlap_radius: 3.0,
        }
    }
}

/// Static obstacles and speed pickups dropped into the lanes ahead of the
/// player as it covers distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObstacleConfig {
    pub spawn_distance_z: f32,        // m ahead of the player
    pub trigger_distance_step: f32,   // m driven between spawn rolls
    pub lane_x_positions: Vec<f32>,
    pub spawn_y: f32,
    pub spawn_chance: f32,            // per trigger, 0..=1
    pub pickup_chance: f32,           // share of spawns that are speed pickups
    pub half_extents: [f32; 3],       // obstacle box
    pub pickup_radius: f32,
    pub enable_cleanup: bool,
    pub cleanup_distance_z: f32,      // m behind the player
    pub cleanup_check_interval: f32,
}

impl Default for ObstacleConfig {
    fn default() -> Self {
        Self {
            spawn_distance_z: 70.0,
            trigger_distance_step: 25.0,
            lane_x_positions: vec![0.0, 3.0],
            spawn_y: 0.5,
            spawn_chance: 0.6,
            pickup_chance: 0.2,
            half_extents: [0.8, 0.5, 0.8],
            pickup_radius: 1.0,
            enable_cleanup: true,
            cleanup_distance_z: 40.0,
            cleanup_check_interval: 5.0,
        }
    }
}

/// Upgrade paths of the active car plus the saved levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpgradeConfig {
    pub car_name: String,
    pub paths: UpgradePaths,
    /// Raw save-data entries, e.g. `UpgradeLevel_Coupe_Engine = 2`.
    pub saved: BTreeMap<String, i64>,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            car_name: "Coupe".to_string(),
            paths: UpgradePaths::default(),
            saved: BTreeMap::new(),
        }
    }
}

fn positive(field: &'static str, value: f32) -> ConfigResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("must be positive, got {value}"),
        })
    }
}

impl SimConfig {
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: SimConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Run-wide checks. Spawner settings are validated separately because an
    /// invalid spawner only disables traffic, not the run.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.server.tick_hz == 0 {
            return Err(ConfigError::Invalid {
                field: "server.tick_hz",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.server.bind.trim().is_empty() {
            return Err(ConfigError::Missing { what: "server.bind" });
        }

        positive("chassis.mass", self.chassis.mass)?;
        positive("chassis.wheel_radius", self.chassis.wheel_radius)?;
        positive("chassis.wheelbase", self.chassis.wheelbase)?;
        positive("chassis.track_width", self.chassis.track_width)?;
        positive("chassis.grip", self.chassis.grip)?;
        for (i, h) in self.chassis.half_extents.iter().enumerate() {
            positive(["chassis.half_extents.x", "chassis.half_extents.y", "chassis.half_extents.z"][i], *h)?;
        }

        positive("crash.crash_speed_threshold", self.crash.crash_speed_threshold)?;
        if self.crash.cooldown < 0.0 || self.crash.handoff_delay < 0.0 || self.crash.game_over_delay < 0.0 {
            return Err(ConfigError::Invalid {
                field: "crash",
                reason: "delays and cooldown cannot be negative".to_string(),
            });
        }

        let b = &self.boost_pickup;
        positive("boost_pickup.torque_multiplier", b.torque_multiplier)?;
        positive("boost_pickup.speed_multiplier", b.speed_multiplier)?;
        positive("boost_pickup.acceleration_multiplier", b.acceleration_multiplier)?;
        positive("boost_pickup.duration", b.duration)?;

        let t = &self.traffic;
        positive("traffic.min_speed", t.min_speed)?;
        if t.max_speed < t.min_speed {
            return Err(ConfigError::Invalid {
                field: "traffic.max_speed",
                reason: format!("{} is below min_speed {}", t.max_speed, t.min_speed),
            });
        }
        if (t.left_lane_x - t.right_lane_x).abs() < f32::EPSILON {
            return Err(ConfigError::Invalid {
                field: "traffic.left_lane_x",
                reason: "both lanes share the same center".to_string(),
            });
        }
        positive("traffic.detection_distance", t.detection_distance)?;
        positive("traffic.overtake_clearance_check_distance", t.overtake_clearance_check_distance)?;
        positive("traffic.overtake_hold_time", t.overtake_hold_time)?;
        positive("traffic.lane_change_sharpness", t.lane_change_sharpness)?;
        positive("traffic.correction_strength", t.correction_strength)?;
        positive("traffic.max_correction_speed", t.max_correction_speed)?;
        positive("traffic.mass", t.mass)?;
        for (i, h) in t.half_extents.iter().enumerate() {
            positive(["traffic.half_extents.x", "traffic.half_extents.y", "traffic.half_extents.z"][i], *h)?;
        }
        if t.ahead_half_width.is_nan() || t.ahead_half_width < 0.0 {
            return Err(ConfigError::Invalid {
                field: "traffic.ahead_half_width",
                reason: format!("cannot be negative, got {}", t.ahead_half_width),
            });
        }

        if self.upgrades.car_name.trim().is_empty() {
            return Err(ConfigError::Missing { what: "upgrades.car_name" });
        }

        Ok(())
    }

    /// Fixed simulation step derived from the tick rate.
    pub fn dt(&self) -> f32 {
        1.0 / self.server.tick_hz.max(1) as f32
    }
}
