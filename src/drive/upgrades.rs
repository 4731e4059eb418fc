//! Upgrade tiers and the read-only level store they are resolved against.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::drive::types::DriveStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpgradeCategory {
    Engine,
    Turbo,
    Brakes,
}

impl UpgradeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpgradeCategory::Engine => "Engine",
            UpgradeCategory::Turbo => "Turbo",
            UpgradeCategory::Brakes => "Brakes",
        }
    }
}

impl fmt::Display for UpgradeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One purchasable level. Only the deltas relevant to the tier's category are
/// read: engine → torque + top speed, turbo → acceleration, brakes → brake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpgradeTier {
    pub cost: u32,
    pub motor_torque_increase: f32,
    pub max_speed_increase: f32,
    pub acceleration_rate_increase: f32,
    pub brake_torque_increase: f32,
}

/// Ordered tiers per category for one car.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpgradePaths {
    pub engine: Vec<UpgradeTier>,
    pub turbo: Vec<UpgradeTier>,
    pub brakes: Vec<UpgradeTier>,
}

impl UpgradePaths {
    pub fn tiers(&self, category: UpgradeCategory) -> &[UpgradeTier] {
        match category {
            UpgradeCategory::Engine => &self.engine,
            UpgradeCategory::Turbo => &self.turbo,
            UpgradeCategory::Brakes => &self.brakes,
        }
    }
}

/// Persisted level per category for the active car.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpgradeLevels {
    pub engine: u32,
    pub turbo: u32,
    pub brakes: u32,
}

impl UpgradeLevels {
    pub fn load(store: &dyn UpgradeStore, car_name: &str) -> Self {
        Self {
            engine: store.upgrade_level(car_name, UpgradeCategory::Engine),
            turbo: store.upgrade_level(car_name, UpgradeCategory::Turbo),
            brakes: store.upgrade_level(car_name, UpgradeCategory::Brakes),
        }
    }

    pub fn level(&self, category: UpgradeCategory) -> u32 {
        match category {
            UpgradeCategory::Engine => self.engine,
            UpgradeCategory::Turbo => self.turbo,
            UpgradeCategory::Brakes => self.brakes,
        }
    }
}

/// Read side of the local key/value save data.
pub trait UpgradeStore {
    /// Missing keys read as level 0.
    fn upgrade_level(&self, vehicle_id: &str, category: UpgradeCategory) -> u32;
}

/// Key layout used by the save data: `UpgradeLevel_{car}_{Category}`.
pub fn prefs_key(vehicle_id: &str, category: UpgradeCategory) -> String {
    format!("UpgradeLevel_{vehicle_id}_{category}")
}

/// In-process store seeded from configuration.
#[derive(Debug, Clone, Default)]
pub struct MemoryUpgradeStore {
    values: BTreeMap<String, i64>,
}

impl MemoryUpgradeStore {
    pub fn new(values: BTreeMap<String, i64>) -> Self {
        Self { values }
    }
}

impl UpgradeStore for MemoryUpgradeStore {
    fn upgrade_level(&self, vehicle_id: &str, category: UpgradeCategory) -> u32 {
        let key = prefs_key(vehicle_id, category);
        match self.values.get(&key) {
            Some(&v) => u32::try_from(v.max(0)).unwrap_or(u32::MAX),
            None => 0,
        }
    }
}

fn owned_tiers<'a>(paths: &'a UpgradePaths, levels: &UpgradeLevels, category: UpgradeCategory) -> &'a [UpgradeTier] {
    let tiers = paths.tiers(category);
    let n = (levels.level(category) as usize).min(tiers.len());
    &tiers[..n]
}

/// Factory stats plus the summed deltas of every owned tier. Levels past the
/// end of a path only count the tiers that exist.
pub fn upgraded_stats(factory: &DriveStats, paths: &UpgradePaths, levels: &UpgradeLevels) -> DriveStats {
    let mut stats = *factory;

    let owned = |category: UpgradeCategory| owned_tiers(paths, levels, category);

    for tier in owned(UpgradeCategory::Engine) {
        stats.max_motor_torque += tier.motor_torque_increase;
        stats.max_speed += tier.max_speed_increase;
    }
    for tier in owned(UpgradeCategory::Turbo) {
        stats.acceleration_rate += tier.acceleration_rate_increase;
    }
    for tier in owned(UpgradeCategory::Brakes) {
        stats.max_brake_torque += tier.brake_torque_increase;
    }

    debug!(?levels, ?stats, "resolved upgraded drive stats");
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> DriveStats {
        DriveStats {
            max_motor_torque: 1500.0,
            max_speed: 50.0,
            acceleration_rate: 5000.0,
            max_brake_torque: 3000.0,
        }
    }

    fn tier(torque: f32, speed: f32, accel: f32, brake: f32) -> UpgradeTier {
        UpgradeTier {
            cost: 100,
            motor_torque_increase: torque,
            max_speed_increase: speed,
            acceleration_rate_increase: accel,
            brake_torque_increase: brake,
        }
    }

    #[test]
    fn only_category_relevant_deltas_are_summed() {
        // every tier carries all four deltas; only the category's own count
        let all = tier(100.0, 5.0, 250.0, 400.0);
        let paths = UpgradePaths {
            engine: vec![all, all],
            turbo: vec![all],
            brakes: vec![all, all, all],
        };
        let levels = UpgradeLevels { engine: 2, turbo: 1, brakes: 1 };

        let s = upgraded_stats(&factory(), &paths, &levels);
        assert_eq!(s.max_motor_torque, 1700.0);
        assert_eq!(s.max_speed, 60.0);
        assert_eq!(s.acceleration_rate, 5250.0);
        assert_eq!(s.max_brake_torque, 3400.0);
    }

    #[test]
    fn levels_beyond_the_path_are_capped() {
        let paths = UpgradePaths {
            engine: vec![tier(200.0, 2.0, 0.0, 0.0)],
            ..UpgradePaths::default()
        };
        let levels = UpgradeLevels { engine: 9, turbo: 3, brakes: 0 };

        let s = upgraded_stats(&factory(), &paths, &levels);
        assert_eq!(s.max_motor_torque, 1700.0);
        assert_eq!(s.acceleration_rate, 5000.0);
    }

    #[test]
    fn store_reads_prefs_keys_and_defaults_to_zero() {
        let mut values = BTreeMap::new();
        values.insert("UpgradeLevel_Coupe_Engine".to_string(), 3);
        values.insert("UpgradeLevel_Coupe_Brakes".to_string(), -2);
        let store = MemoryUpgradeStore::new(values);

        let levels = UpgradeLevels::load(&store, "Coupe");
        assert_eq!(levels, UpgradeLevels { engine: 3, turbo: 0, brakes: 0 });
        assert_eq!(store.upgrade_level("Other", UpgradeCategory::Engine), 0);
    }

    #[test]
    fn prefs_key_layout() {
        assert_eq!(prefs_key("Coupe", UpgradeCategory::Turbo), "UpgradeLevel_Coupe_Turbo");
    }
}
