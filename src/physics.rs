// src/physics.rs

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use rapier3d::na::UnitQuaternion;
use rapier3d::parry::query::ShapeCastOptions;
use rapier3d::prelude::*;
use tracing::{debug, warn};

use crate::config::{ChassisConfig, ObstacleConfig, TrafficConfig};
use crate::drive::crash::CollisionLayer;
use crate::drive::types::{WheelCommands, WheelId};
use crate::traffic::agent::{AgentCommand, AgentPose};
use crate::traffic::sensing::{BoxProbe, SenseHit, SensedVehicle, TrafficSensor, Vec3};

pub const GROUP_GROUND: Group = Group::from_bits_truncate(0b0001);
pub const GROUP_PLAYER: Group = Group::from_bits_truncate(0b0010);
pub const GROUP_TRAFFIC: Group = Group::from_bits_truncate(0b0100);
pub const GROUP_OBSTACLE: Group = Group::from_bits_truncate(0b1000);
pub const GROUP_PICKUP: Group = Group::from_bits_truncate(0b1_0000);

/// Layers traffic agents can sense. Obstacles have no rigid body.
pub const SENSED_LAYERS: Group = Group::from_bits_truncate(0b1110);

const GROUND_HALF_WIDTH: f32 = 50.0;  // m either side of the road center
const GROUND_HALF_LENGTH: f32 = 2_000.0;
const WHEEL_PROBE: f32 = 0.25;        // m below the chassis floor still counts as grounded
const GRAVITY: f32 = 9.81;

#[inline] fn v3(v: Vector<Real>) -> [f32; 3] { [v.x, v.y, v.z] }

/// World-space velocity of a point rigidly attached to the body:
/// v(p) = v_com + ω × (p - com)
#[inline]
fn point_velocity(linvel: Vector<Real>, angvel: Vector<Real>, com: Point<Real>, p: Point<Real>) -> Vector<Real> {
    linvel + angvel.cross(&(p.coords - com.coords))
}

fn layer_of(groups: InteractionGroups) -> CollisionLayer {
    if groups.memberships.intersects(GROUP_OBSTACLE) {
        CollisionLayer::Obstacle
    } else if groups.memberships.intersects(GROUP_TRAFFIC) {
        CollisionLayer::Traffic
    } else if groups.memberships.intersects(GROUP_PLAYER) {
        CollisionLayer::Player
    } else {
        CollisionLayer::Ground
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Wheel {
    pub id: WheelId,
    pub offset: Point<Real>, // contact point in chassis local space
    pub radius: Real,
}

/// Four contact points under the chassis floor. Forward is -Z.
pub fn wheel_rig(chassis: &ChassisConfig) -> [Wheel; 4] {
    let hx = chassis.track_width * 0.5;
    let hz = chassis.wheelbase * 0.5;
    let y = -chassis.half_extents[1];
    let radius = chassis.wheel_radius;

    [
        Wheel { id: WheelId::FL, offset: point![-hx, y, -hz], radius },
        Wheel { id: WheelId::FR, offset: point![ hx, y, -hz], radius },
        Wheel { id: WheelId::RL, offset: point![-hx, y,  hz], radius },
        Wheel { id: WheelId::RR, offset: point![ hx, y,  hz], radius },
    ]
}

/// A contact that started during the last step.
#[derive(Debug, Clone, Copy)]
pub struct Impact {
    pub other: Option<RigidBodyHandle>, // None for static scenery

    pub layer: CollisionLayer,
    pub relative_speed: f32, // m/s, from velocities before the step
}

pub struct PhysicsWorld {
    pub gravity: Vector<Real>,
    pub pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    pub joints: ImpulseJointSet,
    pub multibody_joints: MultibodyJointSet,
    pub ccd: CCDSolver,
    pub query_pipeline: QueryPipeline,
    ground: RigidBodyHandle,
    pre_step_linvel: HashMap<RigidBodyHandle, Vector<Real>>, // for impact speeds
    touching: HashMap<RigidBodyHandle, HashSet<ColliderHandle>>,
    sensor_entries: Vec<(ColliderHandle, ColliderHandle)>, // from the last step
}

/// Collects sensor intersections that started during a step.
#[derive(Default)]
struct SensorEntries(Mutex<Vec<(ColliderHandle, ColliderHandle)>>);

impl EventHandler for SensorEntries {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        if let CollisionEvent::Started(a, b, flags) = event {
            if flags.contains(CollisionEventFlags::SENSOR) {
                if let Ok(mut entries) = self.0.lock() {
                    entries.push((a, b));
                }
            }
        }
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: Real,
    ) {
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsWorld {
    pub fn new() -> Self {
        let mut bodies = RigidBodySet::new();
        let mut colliders = ColliderSet::new();

        // Long thin strip with its top surface at y = 0. It follows the
        // player along Z, see `recenter_ground`.
        let ground = bodies.insert(RigidBodyBuilder::fixed().translation(vector![0.0, -1.0, 0.0]).build());
        let ground_collider = ColliderBuilder::cuboid(GROUND_HALF_WIDTH, 1.0, GROUND_HALF_LENGTH)
            .collision_groups(InteractionGroups::new(GROUP_GROUND, GROUP_PLAYER | GROUP_TRAFFIC))
            .friction(1.2)
            .restitution(0.0)
            .build();
        colliders.insert_with_parent(ground_collider, ground, &mut bodies);

        debug!(bodies = bodies.len(), colliders = colliders.len(), "road inserted");

        Self {
            gravity: vector![0.0, -GRAVITY, 0.0],
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies,
            colliders,
            joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            ground,
            pre_step_linvel: HashMap::new(),
            touching: HashMap::new(),
            sensor_entries: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Bodies
    // ------------------------------------------------------------------

    /// Player chassis, parked (kinematic) until released.
    pub fn spawn_player(&mut self, chassis: &ChassisConfig) -> RigidBodyHandle {
        let [x, y, z] = chassis.spawn;
        let [hx, hy, hz] = chassis.half_extents;

        let rb = RigidBodyBuilder::kinematic_position_based()
            .translation(vector![x, y, z])
            .linear_damping(chassis.linear_damping)
            .angular_damping(chassis.angular_damping)
            .ccd_enabled(true)
            .build();

        // lowered COM keeps the box planted; the inertia is the plain cuboid's
        let m = chassis.mass;
        let inertia = vector![
            m / 3.0 * (hy * hy + hz * hz),
            m / 3.0 * (hx * hx + hz * hz),
            m / 3.0 * (hx * hx + hy * hy)
        ];
        let props = MassProperties::new(point![0.0, chassis.center_of_mass_y_offset, 0.0], m, inertia);

        // Frictionless: wheel impulses provide all grip.
        let collider = ColliderBuilder::cuboid(hx, hy, hz)
            .collision_groups(InteractionGroups::new(
                GROUP_PLAYER,
                GROUP_GROUND | GROUP_TRAFFIC | GROUP_OBSTACLE | GROUP_PICKUP,
            ))
            .mass_properties(props)
            .friction(0.0)
            .friction_combine_rule(CoefficientCombineRule::Min)
            .restitution(0.0)
            .build();

        let handle = self.bodies.insert(rb);
        self.colliders.insert_with_parent(collider, handle, &mut self.bodies);
        self.query_pipeline.update(&self.colliders);

        debug!(?handle, position = ?chassis.spawn, "player chassis spawned");
        handle
    }

    /// Traffic car: yaw only, velocity written by its agent each tick.
    pub fn spawn_traffic(&mut self, cfg: &TrafficConfig, position: Vec3) -> RigidBodyHandle {
        let [hx, hy, hz] = cfg.half_extents;
        let volume = 8.0 * hx * hy * hz;

        let rb = RigidBodyBuilder::dynamic()
            .translation(vector![position[0], position[1], position[2]])
            .enabled_rotations(false, true, false)
            .build();

        let collider = ColliderBuilder::cuboid(hx, hy, hz)
            .collision_groups(InteractionGroups::new(
                GROUP_TRAFFIC,
                GROUP_GROUND | GROUP_PLAYER | GROUP_TRAFFIC,
            ))
            .density(cfg.mass / volume)
            .friction(0.0)
            .friction_combine_rule(CoefficientCombineRule::Min)
            .restitution(0.0)
            .build();

        let handle = self.bodies.insert(rb);
        self.colliders.insert_with_parent(collider, handle, &mut self.bodies);
        self.query_pipeline.update(&self.colliders);
        handle
    }

    /// Static box in a lane, not attached to any body. Traffic senses it and
    /// passes through it; the player collides with it.
    pub fn spawn_obstacle(&mut self, cfg: &ObstacleConfig, position: Vec3) -> ColliderHandle {
        let [hx, hy, hz] = cfg.half_extents;
        let collider = ColliderBuilder::cuboid(hx, hy, hz)
            .translation(vector![position[0], position[1], position[2]])
            .collision_groups(InteractionGroups::new(GROUP_OBSTACLE, GROUP_PLAYER | GROUP_TRAFFIC))
            .solver_groups(InteractionGroups::new(GROUP_OBSTACLE, GROUP_PLAYER))
            .friction(0.5)
            .restitution(0.0)
            .build();

        let handle = self.colliders.insert(collider);
        self.query_pipeline.update(&self.colliders);
        handle
    }

    /// Speed pickup: a sensor ball only the player can enter.
    pub fn spawn_pickup(&mut self, cfg: &ObstacleConfig, position: Vec3) -> ColliderHandle {
        let collider = ColliderBuilder::ball(cfg.pickup_radius)
            .translation(vector![position[0], position[1], position[2]])
            .sensor(true)
            .collision_groups(InteractionGroups::new(GROUP_PICKUP, GROUP_PLAYER))
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();

        let handle = self.colliders.insert(collider);
        self.query_pipeline.update(&self.colliders);
        handle
    }

    pub fn remove_collider(&mut self, handle: ColliderHandle) {
        self.colliders
            .remove(handle, &mut self.island_manager, &mut self.bodies, true);
        for touched in self.touching.values_mut() {
            touched.remove(&handle);
        }
        self.sensor_entries.retain(|&(a, b)| a != handle && b != handle);
        self.query_pipeline.update(&self.colliders);
    }

    pub fn collider_position(&self, handle: ColliderHandle) -> Option<Vec3> {
        self.colliders.get(handle).map(|c| v3(*c.translation()))
    }

    pub fn remove_body(&mut self, handle: RigidBodyHandle) {
        self.bodies.remove(
            handle,
            &mut self.island_manager,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            true,
        );
        self.pre_step_linvel.remove(&handle);
        self.touching.remove(&handle);
        self.query_pipeline.update(&self.colliders);
    }

    /// Parked bodies are kinematic and ignore the drive.
    pub fn set_parked(&mut self, handle: RigidBodyHandle, parked: bool) {
        if let Some(body) = self.bodies.get_mut(handle) {
            let ty = if parked { RigidBodyType::KinematicPositionBased } else { RigidBodyType::Dynamic };
            body.set_body_type(ty, true);
        }
    }

    /// Zero velocities, put the body back at `position` facing the road.
    pub fn reset_body(&mut self, handle: RigidBodyHandle, position: Vec3) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_translation(vector![position[0], position[1], position[2]], true);
            body.set_rotation(UnitQuaternion::identity(), true);
            body.set_linvel(Vector::zeros(), true);
            body.set_angvel(Vector::zeros(), true);
        }
        self.touching.remove(&handle);
    }

    pub fn freeze(&mut self, handle: RigidBodyHandle) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_linvel(Vector::zeros(), false);
            body.set_angvel(Vector::zeros(), false);
            body.set_body_type(RigidBodyType::KinematicPositionBased, false);
        }
    }

    pub fn position(&self, handle: RigidBodyHandle) -> Option<Vec3> {
        self.bodies.get(handle).map(|b| v3(*b.translation()))
    }

    pub fn rotation(&self, handle: RigidBodyHandle) -> Option<[f32; 4]> {
        self.bodies.get(handle).map(|b| {
            let q = b.rotation();
            [q.i, q.j, q.k, q.w]
        })
    }

    pub fn pose(&self, handle: RigidBodyHandle) -> Option<AgentPose> {
        self.bodies.get(handle).map(|b| AgentPose {
            position: v3(*b.translation()),
            velocity: v3(*b.linvel()),
        })
    }

    pub fn speed(&self, handle: RigidBodyHandle) -> f32 {
        self.bodies.get(handle).map(|b| b.linvel().magnitude()).unwrap_or(0.0)
    }

    /// Forward speed (along the chassis -Z axis), m/s.
    pub fn forward_speed(&self, handle: RigidBodyHandle) -> f32 {
        self.bodies
            .get(handle)
            .map(|b| b.linvel().dot(&(b.rotation() * vector![0.0, 0.0, -1.0])))
            .unwrap_or(0.0)
    }

    /// Keep the ground strip under the player on an endless road.
    pub fn recenter_ground(&mut self, z: f32) {
        if let Some(ground) = self.bodies.get_mut(self.ground) {
            if (ground.translation().z - z).abs() > GROUND_HALF_LENGTH * 0.25 {
                ground.set_translation(vector![0.0, -1.0, z], true);
            }
        }
    }

    // ------------------------------------------------------------------
    // Forces
    // ------------------------------------------------------------------

    /// Turn per-wheel torques into impulses at the contact points.
    ///
    /// Drive pushes along the wheel heading with `torque / radius`. Brakes
    /// oppose the rolling velocity and never reverse it. Lateral grip cancels
    /// side slip. Both are capped by `grip * Fz * dt` per wheel, using the
    /// static load.
    pub fn apply_wheel_commands(
        &mut self,
        handle: RigidBodyHandle,
        chassis: &ChassisConfig,
        commands: &WheelCommands,
        dt: Real,
    ) {
        let Some(body) = self.bodies.get(handle) else { return };
        if !body.is_dynamic() {
            return;
        }

        let pos = *body.position();
        let linvel = *body.linvel();
        let angvel = *body.angvel();
        let com = *body.center_of_mass();
        let mass = body.mass();

        let rig = wheel_rig(chassis);
        let share = mass / rig.len() as Real;
        let cap = chassis.grip * share * GRAVITY * dt;
        let chassis_fwd = pos.rotation * vector![0.0, 0.0, -1.0];

        let filter = QueryFilter::new()
            .groups(InteractionGroups::new(GROUP_PLAYER, GROUP_GROUND))
            .exclude_rigid_body(handle);

        let mut impulses: Vec<(Vector<Real>, Point<Real>)> = Vec::with_capacity(rig.len());

        for wheel in rig.iter() {
            let contact = pos * wheel.offset;
            let ray = Ray::new(contact + vector![0.0, 0.1, 0.0], vector![0.0, -1.0, 0.0]);
            let grounded = self
                .query_pipeline
                .cast_ray(&self.bodies, &self.colliders, &ray, 0.1 + WHEEL_PROBE, true, filter)
                .is_some();
            if !grounded {
                continue;
            }

            let cmd = commands.get(wheel.id);
            let fwd = if wheel.id.is_front() {
                UnitQuaternion::from_axis_angle(&Vector::y_axis(), -cmd.steer_angle) * chassis_fwd
            } else {
                chassis_fwd
            };
            let side = fwd.cross(&Vector::y()).normalize();

            let v = point_velocity(linvel, angvel, com, contact);
            let v_long = v.dot(&fwd);
            let v_lat = v.dot(&side);

            let drive = cmd.motor_torque / wheel.radius * dt;
            let brake = (cmd.brake_torque / wheel.radius * dt).min(v_long.abs() * share);
            let long = (drive - brake * v_long.signum()).clamp(-cap, cap);
            let lat = (-v_lat * share).clamp(-cap, cap);

            // applied at COM height: no roll torque from grip
            let at = point![contact.x, com.y, contact.z];
            impulses.push((fwd * long + side * lat, at));
        }

        if let Some(body) = self.bodies.get_mut(handle) {
            for (impulse, at) in impulses {
                body.apply_impulse_at_point(impulse, at, true);
            }
        }
    }

    /// Write an agent's velocity and turn it toward the road heading.
    pub fn drive_traffic(&mut self, handle: RigidBodyHandle, cmd: &AgentCommand) {
        if let Some(body) = self.bodies.get_mut(handle) {
            let [vx, vy, vz] = cmd.linear_velocity;
            body.set_linvel(vector![vx, vy, vz], true);

            let rot = *body.rotation();
            body.set_rotation(rot.slerp(&UnitQuaternion::identity(), cmd.heading_blend), true);
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Sensor view for traffic agents. `None` senses nothing.
    pub fn sensor(&self, mask: Option<Group>) -> RoadSensor<'_> {
        RoadSensor { world: self, mask }
    }

    /// Any bodied vehicle within `radius` of `center`.
    pub fn vehicle_overlaps(&self, center: Vec3, radius: f32) -> bool {
        let shape = Ball::new(radius);
        let iso = Isometry::translation(center[0], center[1], center[2]);
        let bodied = |_: ColliderHandle, c: &Collider| c.parent().is_some();
        let filter = QueryFilter::new()
            .groups(InteractionGroups::new(Group::ALL, SENSED_LAYERS))
            .predicate(&bodied);

        self.query_pipeline
            .intersection_with_shape(&self.bodies, &self.colliders, &iso, &shape, filter)
            .is_some()
    }

    /// Contacts of `handle` that were not touching before the last step.
    pub fn new_impacts(&mut self, handle: RigidBodyHandle) -> Vec<Impact> {
        let Some(body) = self.bodies.get(handle) else { return Vec::new() };
        let my_vel = self.pre_step_linvel.get(&handle).copied().unwrap_or(*body.linvel());

        let mut now: HashSet<ColliderHandle> = HashSet::new();
        let mut impacts = Vec::new();
        let before = self.touching.remove(&handle).unwrap_or_default();

        for &mine in body.colliders() {
            for pair in self.narrow_phase.contact_pairs_with(mine) {
                if !pair.has_any_active_contact {
                    continue;
                }
                let other = if pair.collider1 == mine { pair.collider2 } else { pair.collider1 };
                now.insert(other);
                if before.contains(&other) {
                    continue;
                }

                let Some(co) = self.colliders.get(other) else { continue };
                let other_vel = co
                    .parent()
                    .and_then(|h| {
                        self.pre_step_linvel
                            .get(&h)
                            .copied()
                            .or_else(|| self.bodies.get(h).map(|b| *b.linvel()))
                    })
                    .unwrap_or_else(Vector::zeros);

                impacts.push(Impact {
                    other: co.parent(),
                    layer: layer_of(co.collision_groups()),
                    relative_speed: (my_vel - other_vel).magnitude(),
                });
            }
        }

        self.touching.insert(handle, now);
        impacts
    }

    /// Pickups the body started overlapping during the last step.
    pub fn pickups_entered(&mut self, handle: RigidBodyHandle) -> Vec<ColliderHandle> {
        let Some(body) = self.bodies.get(handle) else { return Vec::new() };
        let mine: HashSet<ColliderHandle> = body.colliders().iter().copied().collect();

        let entries = std::mem::take(&mut self.sensor_entries);
        entries
            .into_iter()
            .filter_map(|(a, b)| {
                let other = if mine.contains(&a) {
                    b
                } else if mine.contains(&b) {
                    a
                } else {
                    return None;
                };
                let co = self.colliders.get(other)?;
                co.collision_groups().memberships.intersects(GROUP_PICKUP).then_some(other)
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Step
    // ------------------------------------------------------------------

    pub fn step(&mut self, dt: Real) {
        let hooks = ();
        let events = SensorEntries::default();

        self.pre_step_linvel.clear();
        for (handle, body) in self.bodies.iter() {
            if body.is_dynamic() {
                self.pre_step_linvel.insert(handle, *body.linvel());
            }
        }

        self.pipeline.step(
            &self.gravity,
            &IntegrationParameters {
                dt,
                ..IntegrationParameters::default()
            },
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            Some(&mut self.query_pipeline),
            &hooks,
            &events,
        );

        self.sensor_entries = events.0.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());

        // Non-finite state would poison every later query.
        for (handle, body) in self.bodies.iter_mut() {
            let p = *body.translation();
            if p.x.is_finite() && p.y.is_finite() && p.z.is_finite() {
                continue;
            }
            body.set_translation(vector![0.0, 1.0, 0.0], true);
            body.set_linvel(Vector::zeros(), true);
            body.set_angvel(Vector::zeros(), true);
            warn!(?handle, "reset body with non-finite position");
        }
    }
}

// ----------------------------------------------------------------------
// Traffic sensing over the query pipeline
// ----------------------------------------------------------------------

pub struct RoadSensor<'a> {
    world: &'a PhysicsWorld,
    mask: Option<Group>,
}

impl TrafficSensor for RoadSensor<'_> {
    type Key = RigidBodyHandle;

    fn cast(&self, probe: &BoxProbe, me: RigidBodyHandle) -> Option<SenseHit<RigidBodyHandle>> {
        let mask = self.mask?;
        let w = self.world;

        let [hx, hy, hz] = probe.half_extents;
        let [ox, oy, oz] = probe.origin;
        let [dx, dy, dz] = probe.direction;
        let shape = Cuboid::new(vector![hx, hy, hz]);
        let iso = Isometry::translation(ox, oy, oz);
        let dir = vector![dx, dy, dz];

        let filter = QueryFilter::new()
            .groups(InteractionGroups::new(GROUP_TRAFFIC, mask))
            .exclude_rigid_body(me);

        let (collider, hit) = w.query_pipeline.cast_shape(
            &w.bodies,
            &w.colliders,
            &iso,
            &dir,
            &shape,
            ShapeCastOptions::with_max_time_of_impact(probe.distance),
            filter,
        )?;

        let body = w
            .colliders
            .get(collider)
            .and_then(|c| c.parent())
            .and_then(|h| w.bodies.get(h).map(|b| (h, b)));

        Some(match body {
            Some((key, b)) => SenseHit::Vehicle(SensedVehicle {
                key,
                position: v3(*b.translation()),
                velocity: v3(*b.linvel()),
                distance: hit.time_of_impact,
            }),
            None => SenseHit::Unbodied {
                label: format!("{collider:?}"),
                distance: hit.time_of_impact,
            },
        })
    }

    fn locate(&self, key: RigidBodyHandle) -> Option<Vec3> {
        self.world.position(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::types::WheelCommand;

    fn settle(world: &mut PhysicsWorld, ticks: usize) {
        for _ in 0..ticks {
            world.step(1.0 / 60.0);
        }
    }

    #[test]
    fn road_sensor_sees_the_car_ahead_but_not_itself() {
        let mut world = PhysicsWorld::new();
        let cfg = TrafficConfig::default();
        let me = world.spawn_traffic(&cfg, [0.0, 0.6, 0.0]);
        let lead = world.spawn_traffic(&cfg, [0.0, 0.6, -15.0]);
        settle(&mut world, 1);

        let probe = BoxProbe {
            origin: [0.0, 0.7, -1.1],
            half_extents: [10.0, 0.5, 0.1],
            direction: [0.0, 0.0, -1.0],
            distance: 25.0,
        };

        match world.sensor(Some(SENSED_LAYERS)).cast(&probe, me) {
            Some(SenseHit::Vehicle(v)) => {
                assert_eq!(v.key, lead);
                assert!((v.distance - 11.8).abs() < 0.1, "toi {}", v.distance);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(world.sensor(None).cast(&probe, me).is_none());
    }

    #[test]
    fn obstacles_are_sensed_without_a_body() {
        let mut world = PhysicsWorld::new();
        let me = world.spawn_traffic(&TrafficConfig::default(), [0.0, 0.6, 0.0]);
        world.spawn_obstacle(&ObstacleConfig::default(), [0.0, 0.5, -12.0]);
        settle(&mut world, 1);

        let probe = BoxProbe {
            origin: [0.0, 0.7, -1.1],
            half_extents: [10.0, 0.5, 0.1],
            direction: [0.0, 0.0, -1.0],
            distance: 25.0,
        };
        match world.sensor(Some(SENSED_LAYERS)).cast(&probe, me) {
            Some(SenseHit::Unbodied { distance, .. }) => assert!((distance - 10.0).abs() < 0.1, "toi {distance}"),
            other => panic!("unexpected {other:?}"),
        }
        // scenery never counts as a vehicle for spawn checks
        assert!(!world.vehicle_overlaps([0.0, 0.5, -12.0], 1.0));
    }

    #[test]
    fn traffic_passes_through_obstacles() {
        let mut world = PhysicsWorld::new();
        let car = world.spawn_traffic(&TrafficConfig::default(), [0.0, 0.6, 0.0]);
        world.spawn_obstacle(&ObstacleConfig::default(), [0.0, 0.5, -6.0]);

        let cmd = AgentCommand { linear_velocity: [0.0, 0.0, -10.0], heading_blend: 0.0 };
        for _ in 0..90 {
            world.drive_traffic(car, &cmd);
            world.step(1.0 / 60.0);
        }
        assert!(world.position(car).unwrap()[2] < -12.0);
    }

    #[test]
    fn entering_a_pickup_is_reported_once() {
        let mut world = PhysicsWorld::new();
        let chassis = ChassisConfig::default();
        let car = world.spawn_player(&chassis);
        world.set_parked(car, false);
        let pickup = world.spawn_pickup(&ObstacleConfig::default(), [0.0, 0.5, -6.0]);

        world.bodies.get_mut(car).unwrap().set_linvel(vector![0.0, 0.0, -10.0], true);

        let mut entered = Vec::new();
        for _ in 0..60 {
            world.step(1.0 / 60.0);
            entered.extend(world.pickups_entered(car));
        }
        assert_eq!(entered, vec![pickup]);
        // a pickup is not a contact
        assert!(world.new_impacts(car).is_empty());
    }

    #[test]
    fn hitting_an_obstacle_is_an_obstacle_impact() {
        let mut world = PhysicsWorld::new();
        let chassis = ChassisConfig::default();
        let car = world.spawn_player(&chassis);
        world.set_parked(car, false);
        world.spawn_obstacle(&ObstacleConfig::default(), [0.0, 0.5, -8.0]);

        world.bodies.get_mut(car).unwrap().set_linvel(vector![0.0, 0.0, -20.0], true);

        let mut hits = Vec::new();
        for _ in 0..60 {
            world.step(1.0 / 60.0);
            hits.extend(world.new_impacts(car).into_iter().filter(|i| i.layer == CollisionLayer::Obstacle));
        }
        assert!(!hits.is_empty());
        assert!(hits[0].other.is_none());
        assert!(hits[0].relative_speed > 10.0, "speed {}", hits[0].relative_speed);
    }

    #[test]
    fn overlap_check_finds_nearby_vehicles() {
        let mut world = PhysicsWorld::new();
        world.spawn_traffic(&TrafficConfig::default(), [0.0, 0.6, -40.0]);

        assert!(world.vehicle_overlaps([0.0, 0.6, -41.0], 3.0));
        assert!(!world.vehicle_overlaps([0.0, 0.6, -80.0], 3.0));
    }

    #[test]
    fn motor_torque_accelerates_the_released_chassis() {
        let mut world = PhysicsWorld::new();
        let chassis = ChassisConfig::default();
        let car = world.spawn_player(&chassis);
        world.set_parked(car, false);
        settle(&mut world, 30);

        let mut commands = WheelCommands::default();
        for id in [WheelId::RL, WheelId::RR] {
            *commands.get_mut(id) = WheelCommand { motor_torque: 1500.0, ..WheelCommand::default() };
        }
        for _ in 0..60 {
            world.apply_wheel_commands(car, &chassis, &commands, 1.0 / 60.0);
            world.step(1.0 / 60.0);
        }

        assert!(world.forward_speed(car) > 1.0, "speed {}", world.forward_speed(car));
        assert!(world.position(car).unwrap()[2] < 0.0);
    }

    #[test]
    fn driving_into_traffic_reports_one_impact() {
        let mut world = PhysicsWorld::new();
        let chassis = ChassisConfig::default();
        let car = world.spawn_player(&chassis);
        world.set_parked(car, false);
        world.spawn_traffic(&TrafficConfig::default(), [0.0, 0.6, -8.0]);

        world.bodies.get_mut(car).unwrap().set_linvel(vector![0.0, 0.0, -20.0], true);

        let mut traffic_hits = 0;
        for _ in 0..60 {
            world.step(1.0 / 60.0);
            traffic_hits += world
                .new_impacts(car)
                .iter()
                .filter(|i| i.layer == CollisionLayer::Traffic && i.relative_speed > 10.0)
                .count();
        }
        assert_eq!(traffic_hits, 1);
    }
}
