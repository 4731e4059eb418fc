// ==============================================================================
// simulation.rs — ONE RUN OF THE ENDLESS ROAD
// ------------------------------------------------------------------------------
// Owns the physics world, the player car, the traffic cars and both spawners.
// Fixed tick order:
// 1) spawner checks (traffic spawn / cleanup, road items)
// 2) player controller tick → wheel impulses
// 3) traffic agents sense and write their velocities
// 4) physics step
// 5) pickups entered → speed boost
// 6) player contacts → crash monitor, crash timeline, distance
//
// Events produced by any of these are queued and leave with the next snapshot.
// ==============================================================================

use rand::rngs::StdRng;
use rand::SeedableRng;
use rapier3d::prelude::{Group, RigidBodyHandle};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::SimConfig;
use crate::drive::crash::CrashStage;
use crate::drive::types::DriveEvent;
use crate::drive::upgrades::MemoryUpgradeStore;
use crate::obstacles::ObstacleSpawner;
use crate::physics::PhysicsWorld;
use crate::spawn::{sensing_mask, TrafficSpawner};
use crate::state::{PlayerSnapshot, RoadItemSnapshot, Snapshot, TrafficSnapshot};
use crate::traffic::agent::AgentEvent;
use crate::traffic::sensing::Vec3;
use crate::vehicle::{PlayerCar, TrafficCar};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SimEvent {
    Drive { event: DriveEvent },
    Crash { stage: CrashStage },
    PassBy { car: u32 },
    PickupCollected { item: u32 },
    Started,
    Restarted,
}

/// Player intent, already decoded from the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Input { gas: bool, brake: bool, steer: f32 },
    Start,
    Restart,
}

pub(crate) fn body_id(handle: RigidBodyHandle) -> u32 {
    handle.into_raw_parts().0
}

pub struct Simulation {
    config: SimConfig,
    world: PhysicsWorld,
    player: Option<PlayerCar>,
    traffic: Vec<TrafficCar>,
    spawner: TrafficSpawner,
    obstacles: ObstacleSpawner,
    mask: Option<Group>,
    rng: StdRng,
    tick: u64,
    events: Vec<SimEvent>,
}

impl Simulation {
    pub fn new(config: SimConfig, seed: Option<u64>) -> Self {
        let mut world = PhysicsWorld::new();
        let store = MemoryUpgradeStore::new(config.upgrades.saved.clone());

        let player = match PlayerCar::spawn(&mut world, &config, &store) {
            Ok(car) => Some(car),
            Err(e) => {
                error!(error = %e, "drive controller not built; run has no player car");
                None
            }
        };

        let mask = sensing_mask(&config.traffic);
        if mask.is_none() {
            warn!("traffic vehicle sensing is off; agents will not detect other cars");
        }

        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        Self {
            spawner: TrafficSpawner::new(config.spawner.clone()),
            obstacles: ObstacleSpawner::new(config.obstacles.clone()),
            config,
            world,
            player,
            traffic: Vec::new(),
            mask,
            rng,
            tick: 0,
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }
    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }
    pub fn player(&self) -> Option<&PlayerCar> {
        self.player.as_ref()
    }
    pub fn player_mut(&mut self) -> Option<&mut PlayerCar> {
        self.player.as_mut()
    }
    pub fn traffic(&self) -> &[TrafficCar] {
        &self.traffic
    }
    pub fn obstacles(&self) -> &ObstacleSpawner {
        &self.obstacles
    }

    /// Place a traffic car by hand, bypassing the spawner.
    pub fn add_traffic(&mut self, position: Vec3, speed: f32) -> RigidBodyHandle {
        let car = TrafficCar::spawn(&mut self.world, &self.config, position, speed);
        let handle = car.body;
        self.traffic.push(car);
        handle
    }

    pub fn apply(&mut self, command: Command) {
        if command == Command::Restart {
            self.restart();
            return;
        }
        let Some(player) = self.player.as_mut() else { return };

        match command {
            // controls are hidden once the crash hands off
            Command::Input { gas, brake, steer } => {
                if !player.crash.presentation().controls_visible {
                    return;
                }
                player.drive.set_gas_pressed(gas);
                player.drive.set_brake_pressed(brake);
                player.drive.set_steer_axis(steer);
            }
            Command::Start => {
                if !player.is_released() {
                    player.release(&mut self.world);
                    self.events.push(SimEvent::Started);
                    info!(tick = self.tick, "run started");
                }
            }
            Command::Restart => {} // handled above
        }
    }

    /// Clear traffic and put the player back on the start line, parked.
    pub fn restart(&mut self) {
        for car in self.traffic.drain(..) {
            car.despawn(&mut self.world);
        }
        if let Some(player) = self.player.as_mut() {
            let distance = player.get_distance_this_run();
            player.reset(&mut self.world, &self.config);
            info!(distance, "run restarted");
        }
        self.obstacles.reset(&mut self.world);
        self.world.recenter_ground(self.config.chassis.spawn[2]);
        self.spawner.reset();
        self.events.push(SimEvent::Restarted);
    }

    pub fn tick(&mut self, dt: f32) {
        self.tick += 1;

        let (player_z, released) = match &self.player {
            Some(p) => (
                self.world.position(p.body).map(|pos| pos[2]).unwrap_or(0.0),
                p.is_released(),
            ),
            None => (0.0, false),
        };

        // 1) traffic population
        self.spawner.tick(
            dt,
            player_z,
            released,
            &mut self.world,
            &mut self.traffic,
            &self.config,
            &mut self.rng,
        );
        self.obstacles.tick(dt, player_z, released, &mut self.world, &mut self.rng);

        // 2) player drive
        if let Some(player) = self.player.as_mut() {
            player.drive_tick(&mut self.world, &self.config, dt);
        }

        // 3) traffic agents
        for car in self.traffic.iter_mut() {
            car.tick(&mut self.world, self.mask, dt);
            for event in car.agent.drain_events() {
                match event {
                    AgentEvent::PassBy => self.events.push(SimEvent::PassBy { car: body_id(car.body) }),
                }
            }
        }

        // 4) physics
        self.world.step(dt);
        self.world.recenter_ground(player_z);

        let Some(player) = self.player.as_mut() else { return };

        // 5) pickups
        for collider in self.world.pickups_entered(player.body) {
            let Some(item) = self.obstacles.collect(&mut self.world, collider) else { continue };
            self.events.push(SimEvent::PickupCollected { item: item.id() });
            if !player.is_released() || player.crash.has_crashed() {
                continue;
            }
            let pickup = &self.config.boost_pickup;
            let m = pickup.multipliers();
            player.drive.activate_speed_boost(m.torque, m.speed, m.acceleration, pickup.duration);
        }

        // 6) crash + distance
        for stage in player.after_step(&mut self.world, dt) {
            self.events.push(SimEvent::Crash { stage });
        }
        for event in player.drive.drain_events() {
            self.events.push(SimEvent::Drive { event });
        }
    }

    /// Current state plus every event queued since the last snapshot.
    pub fn snapshot(&mut self) -> Snapshot {
        let world = &self.world;

        let player = self.player.as_ref().and_then(|p| {
            let [x, y, z] = world.position(p.body)?;
            Some(PlayerSnapshot {
                x,
                y,
                z,
                rotation: world.rotation(p.body)?,
                speed: world.speed(p.body),
                applied_torque: p.drive.applied_torque(),
                boost_active: p.drive.is_boost_active(),
                distance: p.get_distance_this_run(),
                phase: p.phase(),
                presentation: *p.crash.presentation(),
            })
        });

        let traffic = self
            .traffic
            .iter()
            .filter_map(|car| {
                let [x, y, z] = world.position(car.body)?;
                Some(TrafficSnapshot {
                    id: body_id(car.body),
                    x,
                    y,
                    z,
                    state: car.agent.state(),
                    target_lane_x: car.agent.target_lane_x(),
                    speed: car.agent.current_speed(),
                })
            })
            .collect();

        let items = self
            .obstacles
            .items()
            .iter()
            .map(|item| {
                let [x, y, z] = item.position;
                RoadItemSnapshot { id: item.id(), kind: item.kind, x, y, z }
            })
            .collect();

        Snapshot {
            tick: self.tick,
            player,
            traffic,
            items,
            events: std::mem::take(&mut self.events),
        }
    }
}
