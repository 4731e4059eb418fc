use rapier3d::prelude::{Group, RigidBodyHandle};
use tracing::{debug, info};

use crate::config::SimConfig;
use crate::drive::crash::{CrashMonitor, CrashStage};
use crate::drive::distance::DistanceMeter;
use crate::drive::upgrades::{UpgradeLevels, UpgradeStore};
use crate::drive::DriveController;
use crate::error::DriveError;
use crate::physics::PhysicsWorld;
use crate::traffic::agent::LaneChangeAgent;
use crate::traffic::sensing::Vec3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Parked,   // kinematic, waiting for the start signal
    Released, // dynamic, driven by the controller
}

pub struct PlayerCar {
    pub body: RigidBodyHandle,       // the chassis body
    pub drive: DriveController,      // torque ramp, boosts, upgrades
    pub crash: CrashMonitor,         // impact filter + crash chain
    pub distance: DistanceMeter,     // forward distance this run
    phase: RunPhase,
    frozen: bool,
}

impl PlayerCar {
    /// Build the controller from config and saved upgrades, then park a
    /// chassis at the spawn point.
    pub fn spawn(world: &mut PhysicsWorld, config: &SimConfig, store: &dyn UpgradeStore) -> Result<Self, DriveError> {
        if config.upgrades.car_name.trim().is_empty() {
            return Err(DriveError::ConfigurationMissing("upgrades.car_name"));
        }
        let mut drive = DriveController::new(config.drive.clone())?;
        let levels = UpgradeLevels::load(store, &config.upgrades.car_name);
        drive.apply_all_upgrades(&config.upgrades.paths, &levels);

        let body = world.spawn_player(&config.chassis);
        info!(car = %config.upgrades.car_name, ?levels, stats = ?drive.stats(), "player car spawned");

        Ok(Self {
            body,
            drive,
            crash: CrashMonitor::new(config.crash.clone()),
            distance: DistanceMeter::default(),
            phase: RunPhase::Parked,
            frozen: false,
        })
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn is_released(&self) -> bool {
        self.phase == RunPhase::Released
    }

    pub fn get_distance_this_run(&self) -> f32 {
        self.distance.distance()
    }

    /// Hand the chassis to physics.
    pub fn release(&mut self, world: &mut PhysicsWorld) {
        if self.is_released() || self.frozen {
            return;
        }
        world.set_parked(self.body, false);
        self.distance.rebase();
        self.phase = RunPhase::Released;
        debug!(body = ?self.body, "player released");
    }

    /// Back to the spawn point, parked, with a fresh run state.
    pub fn reset(&mut self, world: &mut PhysicsWorld, config: &SimConfig) {
        world.reset_body(self.body, config.chassis.spawn);
        world.set_parked(self.body, true);
        self.drive.reset_run();
        self.crash.reset();
        self.distance.reset();
        self.phase = RunPhase::Parked;
        self.frozen = false;
    }

    /// Controller tick + wheel impulses. Parked or frozen cars skip it.
    pub fn drive_tick(&mut self, world: &mut PhysicsWorld, config: &SimConfig, dt: f32) {
        if !self.is_released() || self.frozen {
            return;
        }
        let speed = world.speed(self.body);
        let commands = self.drive.tick(speed, dt);
        world.apply_wheel_commands(self.body, &config.chassis, &commands, dt);
    }

    /// Feed new contacts to the crash monitor, run its timeline and track
    /// distance. Returns the crash stages applied this tick.
    pub fn after_step(&mut self, world: &mut PhysicsWorld, dt: f32) -> Vec<CrashStage> {
        for impact in world.new_impacts(self.body) {
            self.crash.report_impact(impact.relative_speed, impact.layer);
        }
        self.crash.advance(dt);

        if self.crash.presentation().car_frozen && !self.frozen {
            world.freeze(self.body);
            self.frozen = true;
        }

        if self.is_released() && !self.frozen {
            if let Some(p) = world.position(self.body) {
                self.distance.track(p[2]);
            }
        }

        self.crash.drain_events()
    }
}

pub struct TrafficCar {
    pub body: RigidBodyHandle,
    pub agent: LaneChangeAgent<RigidBodyHandle>,
}

impl TrafficCar {
    pub fn spawn(world: &mut PhysicsWorld, config: &SimConfig, position: Vec3, speed: f32) -> Self {
        let body = world.spawn_traffic(&config.traffic, position);
        Self {
            body,
            agent: LaneChangeAgent::new(&config.traffic, position[0], speed),
        }
    }

    /// Sense, decide and write the velocity for this tick.
    pub fn tick(&mut self, world: &mut PhysicsWorld, mask: Option<Group>, dt: f32) {
        let Some(pose) = world.pose(self.body) else { return };
        let command = {
            let sensor = world.sensor(mask);
            self.agent.tick(self.body, &pose, &sensor, dt)
        };
        world.drive_traffic(self.body, &command);
    }

    pub fn despawn(self, world: &mut PhysicsWorld) {
        world.remove_body(self.body);
    }
}
