// ---------------------------------------------
// OBSTACLES + SPEED PICKUPS
// ---------------------------------------------
// Road items are static colliders without a rigid body, placed in a random
// lane a fixed distance ahead of the player:
// - spawn: rolled each time the player has driven another
//   `trigger_distance_step` meters toward -Z since the last roll
// - cleanup: periodic check that drops items far behind the player
//
// Obstacles are solid for the player only. Pickups are sensors; entering one
// is reported by the physics step and resolved by the simulation.

use rand::seq::SliceRandom;
use rand::Rng;
use rapier3d::prelude::ColliderHandle;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::config::ObstacleConfig;
use crate::error::{ConfigError, ConfigResult};
use crate::physics::PhysicsWorld;
use crate::sched::PeriodicCheck;
use crate::spawn::SpawnReport;
use crate::traffic::sensing::Vec3;

/// Delay before the first cleanup, seconds.
const CLEANUP_FIRST_DELAY: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoadItemKind {
    Obstacle,
    SpeedPickup,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoadItem {
    pub collider: ColliderHandle,
    pub kind: RoadItemKind,
    pub position: Vec3,
}

impl RoadItem {
    pub fn id(&self) -> u32 {
        self.collider.into_raw_parts().0
    }
}

fn unit(v: f32) -> bool {
    (0.0..=1.0).contains(&v)
}

pub fn validate(config: &ObstacleConfig) -> ConfigResult<Vec<String>> {
    let invalid = |field: &'static str, reason: &str| {
        Err(ConfigError::Invalid { field, reason: reason.to_string() })
    };

    if config.lane_x_positions.is_empty() {
        return Err(ConfigError::Missing { what: "obstacles.lane_x_positions" });
    }
    if !(config.trigger_distance_step.is_finite() && config.trigger_distance_step > 0.0) {
        return invalid("obstacles.trigger_distance_step", "must be positive");
    }
    if config.spawn_distance_z.is_nan() || config.spawn_distance_z < 0.0 {
        return invalid("obstacles.spawn_distance_z", "cannot be negative");
    }
    if !unit(config.spawn_chance) {
        return invalid("obstacles.spawn_chance", "must be within 0..=1");
    }
    if !unit(config.pickup_chance) {
        return invalid("obstacles.pickup_chance", "must be within 0..=1");
    }
    if config.half_extents.iter().any(|h| !(h.is_finite() && *h > 0.0)) {
        return invalid("obstacles.half_extents", "every half extent must be positive");
    }
    if !(config.pickup_radius.is_finite() && config.pickup_radius > 0.0) {
        return invalid("obstacles.pickup_radius", "must be positive");
    }
    if config.enable_cleanup && !(config.cleanup_check_interval.is_finite() && config.cleanup_check_interval > 0.0) {
        return invalid("obstacles.cleanup_check_interval", "must be positive");
    }

    let mut warnings = Vec::new();
    if config.spawn_chance == 0.0 {
        warnings.push("obstacles.spawn_chance is 0; no obstacles or pickups will appear".to_string());
    }
    Ok(warnings)
}

#[derive(Debug)]
pub struct ObstacleSpawner {
    config: ObstacleConfig,
    enabled: bool,
    last_trigger_z: Option<f32>,
    cleanup_check: PeriodicCheck,
    items: Vec<RoadItem>,
}

impl ObstacleSpawner {
    pub fn new(config: ObstacleConfig) -> Self {
        let enabled = match validate(&config) {
            Ok(warnings) => {
                for w in warnings {
                    warn!("{w}");
                }
                true
            }
            Err(e) => {
                error!(error = %e, "obstacle spawner disabled");
                false
            }
        };
        let cleanup_check = PeriodicCheck::new(config.cleanup_check_interval, CLEANUP_FIRST_DELAY);

        Self {
            config,
            enabled,
            last_trigger_z: None,
            cleanup_check,
            items: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn items(&self) -> &[RoadItem] {
        &self.items
    }

    /// Remove every item and re-arm the distance trigger.
    pub fn reset(&mut self, world: &mut PhysicsWorld) {
        for item in self.items.drain(..) {
            world.remove_collider(item.collider);
        }
        self.last_trigger_z = None;
        self.cleanup_check.reset(CLEANUP_FIRST_DELAY);
    }

    /// Kind and spot of the next item, `spawn_distance_z` ahead of `player_z`.
    pub fn roll_item<R: Rng>(&self, rng: &mut R, player_z: f32) -> (RoadItemKind, Vec3) {
        let x = self.config.lane_x_positions.choose(rng).copied().unwrap_or_default();
        let kind = if rng.gen_bool(f64::from(self.config.pickup_chance)) {
            RoadItemKind::SpeedPickup
        } else {
            RoadItemKind::Obstacle
        };
        // forward is -Z
        (kind, [x, self.config.spawn_y, player_z - self.config.spawn_distance_z])
    }

    /// Take a collected pickup off the road.
    pub fn collect(&mut self, world: &mut PhysicsWorld, collider: ColliderHandle) -> Option<RoadItem> {
        let index = self
            .items
            .iter()
            .position(|i| i.collider == collider && i.kind == RoadItemKind::SpeedPickup)?;
        let item = self.items.swap_remove(index);
        world.remove_collider(item.collider);
        Some(item)
    }

    pub fn tick<R: Rng>(
        &mut self,
        dt: f32,
        player_z: f32,
        released: bool,
        world: &mut PhysicsWorld,
        rng: &mut R,
    ) -> SpawnReport {
        let mut report = SpawnReport::default();
        if !self.enabled || !released {
            return report;
        }

        let last = *self.last_trigger_z.get_or_insert(player_z);
        if player_z < last - self.config.trigger_distance_step {
            self.last_trigger_z = Some(player_z);

            if rng.gen_bool(f64::from(self.config.spawn_chance)) {
                let (kind, position) = self.roll_item(rng, player_z);
                let collider = match kind {
                    RoadItemKind::Obstacle => world.spawn_obstacle(&self.config, position),
                    RoadItemKind::SpeedPickup => world.spawn_pickup(&self.config, position),
                };
                debug!(?kind, ?position, "road item spawned");
                self.items.push(RoadItem { collider, kind, position });
                report.spawned += 1;
            } else {
                report.skipped += 1;
            }
        }

        if self.config.enable_cleanup && self.cleanup_check.tick(dt) > 0 {
            let limit = player_z + self.config.cleanup_distance_z;
            let before = self.items.len();
            let (keep, gone): (Vec<_>, Vec<_>) =
                std::mem::take(&mut self.items).into_iter().partition(|i| i.position[2] <= limit);
            self.items = keep;
            for item in gone {
                world.remove_collider(item.collider);
            }
            report.removed = before - self.items.len();
            if report.removed > 0 {
                debug!(removed = report.removed, remaining = self.items.len(), "road item cleanup");
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn always(pickup_chance: f32) -> ObstacleConfig {
        ObstacleConfig { spawn_chance: 1.0, pickup_chance, ..ObstacleConfig::default() }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(validate(&ObstacleConfig::default()).unwrap().is_empty());
    }

    #[test]
    fn bad_settings_disable_the_spawner() {
        let no_lanes = ObstacleConfig { lane_x_positions: Vec::new(), ..ObstacleConfig::default() };
        assert!(matches!(validate(&no_lanes), Err(ConfigError::Missing { .. })));
        assert!(!ObstacleSpawner::new(no_lanes).is_enabled());

        let chance = ObstacleConfig { spawn_chance: 1.5, ..ObstacleConfig::default() };
        assert!(validate(&chance).is_err());

        let step = ObstacleConfig { trigger_distance_step: 0.0, ..ObstacleConfig::default() };
        assert!(!ObstacleSpawner::new(step).is_enabled());
    }

    #[test]
    fn items_spawn_once_per_distance_step() {
        let mut spawner = ObstacleSpawner::new(always(0.0));
        let mut world = PhysicsWorld::new();
        let mut rng = StdRng::seed_from_u64(5);

        // parked: nothing, and the trigger is not armed yet
        assert_eq!(spawner.tick(0.1, -100.0, false, &mut world, &mut rng).spawned, 0);

        assert_eq!(spawner.tick(0.1, 0.0, true, &mut world, &mut rng).spawned, 0);
        assert_eq!(spawner.tick(0.1, -24.0, true, &mut world, &mut rng).spawned, 0);
        assert_eq!(spawner.tick(0.1, -26.0, true, &mut world, &mut rng).spawned, 1);
        // re-armed at -26
        assert_eq!(spawner.tick(0.1, -50.0, true, &mut world, &mut rng).spawned, 0);
        assert_eq!(spawner.tick(0.1, -52.0, true, &mut world, &mut rng).spawned, 1);

        assert_eq!(spawner.items().len(), 2);
        for item in spawner.items() {
            assert_eq!(item.kind, RoadItemKind::Obstacle);
            assert!(item.position[0] == 0.0 || item.position[0] == 3.0);
            assert_eq!(world.collider_position(item.collider), Some(item.position));
        }
        assert_eq!(spawner.items()[0].position[2], -96.0);
    }

    #[test]
    fn zero_chance_only_skips() {
        let config = ObstacleConfig { spawn_chance: 0.0, ..ObstacleConfig::default() };
        let mut spawner = ObstacleSpawner::new(config);
        let mut world = PhysicsWorld::new();
        let mut rng = StdRng::seed_from_u64(1);

        spawner.tick(0.1, 0.0, true, &mut world, &mut rng);
        let r = spawner.tick(0.1, -30.0, true, &mut world, &mut rng);
        assert_eq!((r.spawned, r.skipped), (0, 1));
    }

    #[test]
    fn cleanup_drops_items_far_behind() {
        // long step so driving past the item does not roll a new one
        let config = ObstacleConfig { trigger_distance_step: 200.0, ..always(0.0) };
        let mut spawner = ObstacleSpawner::new(config);
        let mut world = PhysicsWorld::new();
        let mut rng = StdRng::seed_from_u64(2);

        spawner.tick(0.0, 0.0, true, &mut world, &mut rng);
        spawner.tick(0.0, -201.0, true, &mut world, &mut rng); // item at z = -271
        let collider = spawner.items()[0].collider;

        // 40 m past the item is still in range, 41 m is not
        assert_eq!(spawner.tick(0.3, -311.0, true, &mut world, &mut rng).removed, 0);
        assert_eq!(spawner.tick(5.0, -312.0, true, &mut world, &mut rng).removed, 1);
        assert!(spawner.items().is_empty());
        assert_eq!(world.collider_position(collider), None);
    }

    #[test]
    fn only_pickups_can_be_collected() {
        let mut world = PhysicsWorld::new();
        let mut rng = StdRng::seed_from_u64(3);

        let mut obstacles = ObstacleSpawner::new(always(0.0));
        obstacles.tick(0.0, 0.0, true, &mut world, &mut rng);
        obstacles.tick(0.0, -30.0, true, &mut world, &mut rng);
        let wall = obstacles.items()[0].collider;
        assert_eq!(obstacles.collect(&mut world, wall), None);

        let mut pickups = ObstacleSpawner::new(always(1.0));
        pickups.tick(0.0, 0.0, true, &mut world, &mut rng);
        pickups.tick(0.0, -30.0, true, &mut world, &mut rng);
        let pickup = pickups.items()[0].collider;
        assert_eq!(pickups.collect(&mut world, pickup).map(|i| i.kind), Some(RoadItemKind::SpeedPickup));
        assert!(pickups.items().is_empty());
        assert_eq!(world.collider_position(pickup), None);
    }

    #[test]
    fn reset_clears_the_road() {
        let mut spawner = ObstacleSpawner::new(always(0.5));
        let mut world = PhysicsWorld::new();
        let mut rng = StdRng::seed_from_u64(4);

        spawner.tick(0.0, 0.0, true, &mut world, &mut rng);
        spawner.tick(0.0, -30.0, true, &mut world, &mut rng);
        let collider = spawner.items()[0].collider;

        spawner.reset(&mut world);
        assert!(spawner.items().is_empty());
        assert_eq!(world.collider_position(collider), None);
        // trigger re-arms at the next position seen
        assert_eq!(spawner.tick(0.0, -500.0, true, &mut world, &mut rng).spawned, 0);
    }
}
