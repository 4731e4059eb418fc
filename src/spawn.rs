// ---------------------------------------------
// TRAFFIC SPAWNER
// ---------------------------------------------
// Two periodic checks driven by the simulation tick:
// - spawn: one attempt per check while below the target count
// - cleanup: despawn cars too far from the player along Z
//
// An invalid spawner config disables traffic for the run instead of
// stopping it.

use rand::Rng;
use rapier3d::prelude::Group;
use tracing::{debug, error, warn};

use crate::config::{SimConfig, SpawnerConfig, TrafficConfig};
use crate::error::{ConfigError, ConfigResult};
use crate::physics::PhysicsWorld;
use crate::sched::PeriodicCheck;
use crate::traffic::sensing::Vec3;
use crate::vehicle::TrafficCar;

/// First cleanup runs this many intervals after start.
const CLEANUP_FIRST_DELAY: f32 = 1.5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpawnReport {
    pub spawned: usize,
    pub skipped: usize, // attempts that hit an occupied spot
    pub removed: usize,
}

fn positive(v: f32) -> bool {
    v.is_finite() && v > 0.0
}

/// Check the spawner settings. Returns soft warnings on success.
pub fn validate(config: &SpawnerConfig) -> ConfigResult<Vec<String>> {
    let invalid = |field: &'static str, reason: String| Err(ConfigError::Invalid { field, reason });

    if config.min_spawn_distance_z < 0.0 || config.max_spawn_distance_z < 0.0 {
        return invalid("spawner.min_spawn_distance_z", "spawn distances cannot be negative".into());
    }
    if config.min_spawn_distance_z >= config.max_spawn_distance_z {
        return invalid(
            "spawner.max_spawn_distance_z",
            format!(
                "{} must be greater than min {}",
                config.max_spawn_distance_z, config.min_spawn_distance_z
            ),
        );
    }
    if !positive(config.spawn_check_interval) {
        return invalid("spawner.spawn_check_interval", "must be positive".into());
    }
    if config.enable_cleanup && !positive(config.cleanup_check_interval) {
        return invalid("spawner.cleanup_check_interval", "must be positive".into());
    }

    let mut warnings = Vec::new();
    if config.enable_cleanup && config.cleanup_distance_z <= config.max_spawn_distance_z {
        warnings.push(format!(
            "cleanup distance {} is not beyond max spawn distance {}; new cars may be removed at once",
            config.cleanup_distance_z, config.max_spawn_distance_z
        ));
    }
    Ok(warnings)
}

#[derive(Debug)]
pub struct TrafficSpawner {
    config: SpawnerConfig,
    enabled: bool,
    spawn_check: PeriodicCheck,
    cleanup_check: PeriodicCheck,
}

impl TrafficSpawner {
    pub fn new(config: SpawnerConfig) -> Self {
        let enabled = match validate(&config) {
            Ok(warnings) => {
                for w in warnings {
                    warn!("{w}");
                }
                true
            }
            Err(e) => {
                error!(error = %e, "traffic spawner disabled");
                false
            }
        };

        let spawn_check = PeriodicCheck::new(config.spawn_check_interval, config.spawn_check_interval);
        let cleanup_check = PeriodicCheck::new(
            config.cleanup_check_interval,
            config.cleanup_check_interval * CLEANUP_FIRST_DELAY,
        );

        Self { config, enabled, spawn_check, cleanup_check }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Restart both checks for a new run.
    pub fn reset(&mut self) {
        self.spawn_check.reset(self.config.spawn_check_interval);
        self.cleanup_check
            .reset(self.config.cleanup_check_interval * CLEANUP_FIRST_DELAY);
    }

    /// Spot `d` meters ahead of or behind the player, `d` in the spawn band.
    pub fn roll_position<R: Rng>(&self, rng: &mut R, player_z: f32) -> Vec3 {
        let d = rng.gen_range(self.config.min_spawn_distance_z..=self.config.max_spawn_distance_z);
        let ahead = rng.gen_bool(0.5);
        // forward is -Z
        let z = if ahead { player_z - d } else { player_z + d };
        [self.config.spawn_x, self.config.spawn_y, z]
    }

    pub fn roll_speed<R: Rng>(rng: &mut R, traffic: &TrafficConfig) -> f32 {
        if traffic.max_speed > traffic.min_speed {
            rng.gen_range(traffic.min_speed..=traffic.max_speed)
        } else {
            traffic.min_speed
        }
    }

    pub fn out_of_range(&self, player_z: f32, car_z: f32) -> bool {
        (player_z - car_z).abs() > self.config.cleanup_distance_z
    }

    /// Run whichever checks are due this tick.
    #[allow(clippy::too_many_arguments)]
    pub fn tick<R: Rng>(
        &mut self,
        dt: f32,
        player_z: f32,
        released: bool,
        world: &mut PhysicsWorld,
        cars: &mut Vec<TrafficCar>,
        config: &SimConfig,
        rng: &mut R,
    ) -> SpawnReport {
        let mut report = SpawnReport::default();
        if !self.enabled {
            return report;
        }

        for _ in 0..self.spawn_check.tick(dt) {
            if !released || cars.len() >= self.config.target_car_count {
                continue;
            }
            let spot = self.roll_position(rng, player_z);
            if world.vehicle_overlaps(spot, self.config.overlap_radius) {
                debug!(?spot, "spawn spot occupied");
                report.skipped += 1;
                continue;
            }
            let speed = Self::roll_speed(rng, &config.traffic);
            let car = TrafficCar::spawn(world, config, spot, speed);
            debug!(body = ?car.body, ?spot, speed, "traffic car spawned");
            cars.push(car);
            report.spawned += 1;
        }

        if self.config.enable_cleanup && self.cleanup_check.tick(dt) > 0 {
            let before = cars.len();
            let (keep, gone): (Vec<_>, Vec<_>) = std::mem::take(cars).into_iter().partition(|car| {
                world
                    .position(car.body)
                    .map(|p| !self.out_of_range(player_z, p[2]))
                    .unwrap_or(false)
            });
            *cars = keep;
            for car in gone {
                car.despawn(world);
            }
            report.removed = before - cars.len();
            if report.removed > 0 {
                debug!(removed = report.removed, remaining = cars.len(), "traffic cleanup");
            }
        }

        report
    }
}

/// Group traffic senses, or nothing when sensing is turned off.
pub fn sensing_mask(traffic: &TrafficConfig) -> Option<Group> {
    traffic.sense_vehicles.then_some(crate::physics::SENSED_LAYERS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn default_spawner_config_is_valid_without_warnings() {
        assert!(validate(&SpawnerConfig::default()).unwrap().is_empty());
    }

    #[test]
    fn inverted_band_disables_the_spawner() {
        let config = SpawnerConfig {
            min_spawn_distance_z: 300.0,
            max_spawn_distance_z: 100.0,
            ..SpawnerConfig::default()
        };
        assert!(validate(&config).is_err());
        assert!(!TrafficSpawner::new(config).is_enabled());
    }

    #[test]
    fn short_cleanup_distance_only_warns() {
        let config = SpawnerConfig { cleanup_distance_z: 200.0, ..SpawnerConfig::default() };
        assert_eq!(validate(&config).unwrap().len(), 1);
        assert!(TrafficSpawner::new(config).is_enabled());
    }

    #[test]
    fn rolled_spots_stay_in_the_band_on_both_sides() {
        let spawner = TrafficSpawner::new(SpawnerConfig::default());
        let mut rng = StdRng::seed_from_u64(7);
        let (mut ahead, mut behind) = (0, 0);

        for _ in 0..200 {
            let [x, y, z] = spawner.roll_position(&mut rng, -100.0);
            assert_eq!((x, y), (0.0, 0.6));
            let d = (z + 100.0).abs();
            assert!((30.0..=250.0).contains(&d), "distance {d}");
            if z < -100.0 { ahead += 1 } else { behind += 1 }
        }
        assert!(ahead > 50 && behind > 50);
    }

    #[test]
    fn spawns_one_car_per_check_and_only_once_released() {
        let config = SimConfig::default();
        let mut spawner = TrafficSpawner::new(config.spawner.clone());
        let mut world = PhysicsWorld::new();
        let mut cars = Vec::new();
        let mut rng = StdRng::seed_from_u64(1);

        let r = spawner.tick(1.0, 0.0, false, &mut world, &mut cars, &config, &mut rng);
        assert_eq!(r.spawned, 0);

        let mut spawned = 0;
        for _ in 0..4 {
            let r = spawner.tick(1.0, 0.0, true, &mut world, &mut cars, &config, &mut rng);
            assert!(r.spawned + r.skipped <= 1);
            spawned += r.spawned;
        }
        assert_eq!(cars.len(), spawned);
        assert!(spawned >= 1);
        for car in &cars {
            let speed = car.agent.current_speed();
            assert!((8.0..=15.0).contains(&speed));
        }
    }

    #[test]
    fn cleanup_removes_cars_far_from_the_player() {
        let config = SimConfig::default();
        let mut spawner = TrafficSpawner::new(config.spawner.clone());
        let mut world = PhysicsWorld::new();
        let mut rng = StdRng::seed_from_u64(3);
        let mut cars = vec![
            TrafficCar::spawn(&mut world, &config, [0.0, 0.6, -50.0], 10.0),
            TrafficCar::spawn(&mut world, &config, [0.0, 0.6, 400.0], 10.0),
        ];

        // first cleanup is at 3 s; the player is not released so nothing spawns
        let r = spawner.tick(2.9, 0.0, false, &mut world, &mut cars, &config, &mut rng);
        assert_eq!(r.removed, 0);
        let r = spawner.tick(0.2, 0.0, false, &mut world, &mut cars, &config, &mut rng);
        assert_eq!(r.removed, 1);
        assert_eq!(cars.len(), 1);
        assert_eq!(world.position(cars[0].body).map(|p| p[2]), Some(-50.0));
    }
}
