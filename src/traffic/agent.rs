// ==============================================================================
// agent.rs — LANE-CHANGE TRAFFIC AGENT
// ------------------------------------------------------------------------------
// Six-state controller for one traffic car:
//
//   DrivingStraight ──(slower car in lane)──> NeedsToOvertake
//   NeedsToOvertake ──(other lane blocked)──> DrivingStraight (speed synced)
//                   ──(other lane clear)───> ChangingToOvertakeLane
//   ChangingToOvertakeLane ──(arrived)─────> Overtaking (PassBy)
//   Overtaking ──(passed / hold cutoff)────> CheckingToReturn
//   CheckingToReturn ──(original blocked)──> Overtaking (timer reset)
//                    ──(original clear)────> ReturningToOriginalLane
//   ReturningToOriginalLane ──(arrived)────> DrivingStraight
//
// The agent owns no body. Each tick it reads a pose, queries the sensor and
// returns the velocity the owner should write back.
// ==============================================================================

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::TrafficConfig;
use crate::drive::controller::move_towards;
use crate::traffic::lanes::Lanes;
use crate::traffic::sensing::{BoxProbe, SenseHit, TrafficSensor, Vec3, FORWARD, UP};

/// Depth of the swept probe boxes.
pub const PROBE_DEPTH: f32 = 0.1;
/// Orientation slerp rate toward the road heading, per second.
pub const HEADING_RATE: f32 = 10.0;
/// Hard cutoff for Overtaking as a multiple of the hold time.
pub const HOLD_CUTOFF_FACTOR: f32 = 1.5;
/// How much shorter the return-lane check is than the ahead detection.
pub const RETURN_CHECK_SHORTFALL: f32 = 5.0;

const MIN_LANE_TOLERANCE: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    DrivingStraight,
    NeedsToOvertake,
    ChangingToOvertakeLane,
    Overtaking,
    CheckingToReturn,
    ReturningToOriginalLane,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentEvent {
    /// Arrived in the overtake lane.
    PassBy,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentPose {
    pub position: Vec3,
    pub velocity: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentCommand {
    pub linear_velocity: Vec3,
    /// Fraction to slerp the body's rotation toward the road heading.
    pub heading_blend: f32,
}

#[derive(Debug, Clone)]
pub struct LaneChangeAgent<K> {
    // tuning
    correction_strength: f32,
    max_correction_speed: f32,
    lane_change_sharpness: f32,
    detection_distance: f32,
    clearance_distance: f32,
    hold_time: f32,
    pass_buffer: f32,
    ahead_half_width: f32,
    tolerance: f32,
    lanes: Lanes,

    // run state
    state: AgentState,
    current_speed: f32,           // m/s along -Z
    lead_speed: f32,              // m/s, of the car that triggered the overtake
    original_lane_x: f32,
    target_lane_x: f32,
    current_moving_target_x: f32, // smoothed lateral target
    overtake_timer: f32,          // s
    car_to_overtake: Option<K>,
    ignored_unbodied: Option<String>, // last bodiless hit warned about

    events: Vec<AgentEvent>,
}

impl<K: Copy + Eq + std::fmt::Debug> LaneChangeAgent<K> {
    /// New agent cruising in `lane_x` at `speed` m/s.
    pub fn new(config: &TrafficConfig, lane_x: f32, speed: f32) -> Self {
        Self {
            correction_strength: config.correction_strength,
            max_correction_speed: config.max_correction_speed,
            lane_change_sharpness: config.lane_change_sharpness,
            detection_distance: config.detection_distance,
            clearance_distance: config.overtake_clearance_check_distance,
            hold_time: config.overtake_hold_time,
            pass_buffer: config.pass_buffer,
            ahead_half_width: config.ahead_half_width,
            tolerance: config.lane_check_tolerance.max(MIN_LANE_TOLERANCE),
            lanes: Lanes::new(config.right_lane_x, config.left_lane_x),

            state: AgentState::DrivingStraight,
            current_speed: speed,
            lead_speed: speed,
            original_lane_x: lane_x,
            target_lane_x: lane_x,
            current_moving_target_x: lane_x,
            overtake_timer: 0.0,
            car_to_overtake: None,
            ignored_unbodied: None,

            events: Vec::new(),
        }
    }

    pub fn state(&self) -> AgentState {
        self.state
    }
    pub fn current_speed(&self) -> f32 {
        self.current_speed
    }
    pub fn original_lane_x(&self) -> f32 {
        self.original_lane_x
    }
    pub fn target_lane_x(&self) -> f32 {
        self.target_lane_x
    }
    pub fn current_moving_target_x(&self) -> f32 {
        self.current_moving_target_x
    }
    pub fn overtake_timer(&self) -> f32 {
        self.overtake_timer
    }
    pub fn car_to_overtake(&self) -> Option<K> {
        self.car_to_overtake
    }

    pub fn drain_events(&mut self) -> Vec<AgentEvent> {
        std::mem::take(&mut self.events)
    }

    /// Advance the state machine one tick and produce the body command.
    pub fn tick<S>(&mut self, me: K, pose: &AgentPose, sensor: &S, dt: f32) -> AgentCommand
    where
        S: TrafficSensor<Key = K>,
    {
        match self.state {
            AgentState::DrivingStraight => self.drive_straight(me, pose, sensor, dt),
            AgentState::NeedsToOvertake => self.look_for_gap(me, pose, sensor),
            AgentState::ChangingToOvertakeLane | AgentState::ReturningToOriginalLane => {
                self.change_lane(dt)
            }
            AgentState::Overtaking => self.overtake(pose, sensor, dt),
            AgentState::CheckingToReturn => self.check_return(me, pose, sensor),
        }

        self.command(pose, dt)
    }

    fn transition(&mut self, to: AgentState) {
        debug!(from = ?self.state, to = ?to, target_lane_x = self.target_lane_x, "traffic agent transition");
        self.state = to;
    }

    /// Returns true once the smoothed target has reached the lane target.
    fn step_moving_target(&mut self, dt: f32) -> bool {
        self.current_moving_target_x = move_towards(
            self.current_moving_target_x,
            self.target_lane_x,
            self.lane_change_sharpness * dt,
        );
        self.current_moving_target_x == self.target_lane_x
    }

    // ------------------------------------------------------------------
    // States
    // ------------------------------------------------------------------

    fn drive_straight<S: TrafficSensor<Key = K>>(&mut self, me: K, pose: &AgentPose, sensor: &S, dt: f32) {
        self.step_moving_target(dt);

        match sensor.cast(&self.ahead_probe(pose), me) {
            Some(SenseHit::Vehicle(v)) => {
                let vz = v.velocity[2];
                let slower = vz > -self.current_speed;
                let in_lane = Lanes::within(v.position[0], self.target_lane_x, self.tolerance);

                if slower && in_lane {
                    self.car_to_overtake = Some(v.key);
                    self.lead_speed = -vz;
                    self.transition(AgentState::NeedsToOvertake);
                } else if self.car_to_overtake == Some(v.key) {
                    self.car_to_overtake = None;
                }
            }
            Some(SenseHit::Unbodied { label, .. }) => {
                if self.ignored_unbodied.as_deref() != Some(label.as_str()) {
                    warn!(%label, "sensed collider has no rigid body; ignored");
                    self.ignored_unbodied = Some(label);
                }
            }
            None => self.car_to_overtake = None,
        }
    }

    fn look_for_gap<S: TrafficSensor<Key = K>>(&mut self, me: K, pose: &AgentPose, sensor: &S) {
        let overtake_lane = self.lanes.other(self.target_lane_x);

        if self.lane_blocked(overtake_lane, self.clearance_distance, me, pose, sensor) {
            self.current_speed = self.lead_speed;
            self.transition(AgentState::DrivingStraight);
            return;
        }

        self.target_lane_x = overtake_lane;
        self.transition(AgentState::ChangingToOvertakeLane);
    }

    fn change_lane(&mut self, dt: f32) {
        if !self.step_moving_target(dt) {
            return;
        }

        if self.target_lane_x != self.original_lane_x {
            self.overtake_timer = 0.0;
            self.events.push(AgentEvent::PassBy);
            self.transition(AgentState::Overtaking);
        } else {
            self.car_to_overtake = None;
            self.transition(AgentState::DrivingStraight);
        }
    }

    fn overtake<S: TrafficSensor<Key = K>>(&mut self, pose: &AgentPose, sensor: &S, dt: f32) {
        self.step_moving_target(dt);
        self.overtake_timer += dt;
        let held = self.overtake_timer >= self.hold_time;

        let passed = match self.car_to_overtake {
            Some(key) => match sensor.locate(key) {
                Some(p) => p[2] > pose.position[2] + self.pass_buffer,
                None => {
                    debug!(?key, "overtaken car is gone");
                    self.car_to_overtake = None;
                    held
                }
            },
            None => held,
        };

        if passed || self.overtake_timer >= self.hold_time * HOLD_CUTOFF_FACTOR {
            self.transition(AgentState::CheckingToReturn);
        }
    }

    fn check_return<S: TrafficSensor<Key = K>>(&mut self, me: K, pose: &AgentPose, sensor: &S) {
        let distance = (self.detection_distance - RETURN_CHECK_SHORTFALL).max(0.0);

        if self.lane_blocked(self.original_lane_x, distance, me, pose, sensor) {
            self.overtake_timer = 0.0;
            self.transition(AgentState::Overtaking);
            return;
        }

        self.target_lane_x = self.original_lane_x;
        self.transition(AgentState::ReturningToOriginalLane);
    }

    // ------------------------------------------------------------------
    // Sensing + control
    // ------------------------------------------------------------------

    fn ahead_probe(&self, pose: &AgentPose) -> BoxProbe {
        let p = pose.position;
        let ahead = PROBE_DEPTH + 1.0;
        BoxProbe {
            origin: [
                p[0] + FORWARD[0] * ahead + UP[0] * 0.1,
                p[1] + FORWARD[1] * ahead + UP[1] * 0.1,
                p[2] + FORWARD[2] * ahead + UP[2] * 0.1,
            ],
            half_extents: [self.ahead_half_width, 0.5, PROBE_DEPTH],
            direction: FORWARD,
            distance: self.detection_distance,
        }
    }

    fn lane_probe(&self, pose: &AgentPose, lane_x: f32, distance: f32) -> BoxProbe {
        let p = pose.position;
        BoxProbe {
            origin: [lane_x, p[1] + 0.1, p[2] + FORWARD[2] * (PROBE_DEPTH + 0.2)],
            half_extents: [0.5, 0.5, PROBE_DEPTH],
            direction: FORWARD,
            distance,
        }
    }

    fn lane_blocked<S: TrafficSensor<Key = K>>(
        &self,
        lane_x: f32,
        distance: f32,
        me: K,
        pose: &AgentPose,
        sensor: &S,
    ) -> bool {
        sensor.cast(&self.lane_probe(pose, lane_x, distance), me).is_some()
    }

    fn command(&self, pose: &AgentPose, dt: f32) -> AgentCommand {
        let x_error = pose.position[0] - self.current_moving_target_x;
        let vx = (-x_error * self.correction_strength)
            .clamp(-self.max_correction_speed, self.max_correction_speed);

        AgentCommand {
            linear_velocity: [vx, pose.velocity[1], -self.current_speed],
            heading_blend: (dt * HEADING_RATE).min(1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traffic::sensing::AabbTraffic;

    const DT: f32 = 0.02;
    const ME: u32 = 0;
    const HALF: [f32; 3] = [0.9, 0.6, 2.0];

    fn agent(speed: f32) -> LaneChangeAgent<u32> {
        LaneChangeAgent::new(&TrafficConfig::default(), 0.0, speed)
    }

    fn pose(x: f32, z: f32) -> AgentPose {
        AgentPose { position: [x, 0.6, z], velocity: [0.0, 0.0, 0.0] }
    }

    fn road_with_slow_lead() -> AabbTraffic {
        let mut road = AabbTraffic::default();
        road.insert(1, [0.2, 0.6, -15.0], HALF, Some([0.0, 0.0, -5.0]));
        road
    }

    /// Drive through NeedsToOvertake and the full lane change.
    fn into_overtaking(a: &mut LaneChangeAgent<u32>, road: &AabbTraffic) {
        a.tick(ME, &pose(0.0, 0.0), road, DT);
        a.tick(ME, &pose(0.0, 0.0), road, DT);
        assert_eq!(a.state(), AgentState::ChangingToOvertakeLane);
        for _ in 0..200 {
            let x = a.current_moving_target_x();
            a.tick(ME, &pose(x, 0.0), road, DT);
            if a.state() == AgentState::Overtaking {
                return;
            }
        }
        panic!("never reached the overtake lane");
    }

    #[test]
    fn slower_car_in_lane_triggers_within_one_tick() {
        let mut a = agent(12.0);
        let road = road_with_slow_lead();

        a.tick(ME, &pose(0.0, 0.0), &road, DT);

        assert_eq!(a.state(), AgentState::NeedsToOvertake);
        assert_eq!(a.car_to_overtake(), Some(1));
    }

    #[test]
    fn faster_or_off_lane_cars_are_not_overtaken() {
        let mut a = agent(12.0);
        let mut road = AabbTraffic::default();
        road.insert(1, [0.0, 0.6, -15.0], HALF, Some([0.0, 0.0, -20.0]));
        a.tick(ME, &pose(0.0, 0.0), &road, DT);
        assert_eq!(a.state(), AgentState::DrivingStraight);

        let mut road = AabbTraffic::default();
        road.insert(1, [3.0, 0.6, -15.0], HALF, Some([0.0, 0.0, -5.0]));
        a.tick(ME, &pose(0.0, 0.0), &road, DT);
        assert_eq!(a.state(), AgentState::DrivingStraight);
        assert_eq!(a.current_speed(), 12.0);
        assert_eq!(a.car_to_overtake(), None);
    }

    #[test]
    fn blocked_overtake_lane_syncs_speed_and_keeps_lane() {
        let mut a = agent(12.0);
        let mut road = road_with_slow_lead();
        road.insert(2, [3.0, 0.6, -20.0], HALF, Some([0.0, 0.0, -14.0]));

        a.tick(ME, &pose(0.0, 0.0), &road, DT);
        a.tick(ME, &pose(0.0, 0.0), &road, DT);

        assert_eq!(a.state(), AgentState::DrivingStraight);
        assert_eq!(a.current_speed(), 5.0);
        assert_eq!(a.target_lane_x(), 0.0);

        // matched speed means the lead no longer reads as slower
        a.tick(ME, &pose(0.0, 0.0), &road, DT);
        assert_eq!(a.state(), AgentState::DrivingStraight);
    }

    #[test]
    fn full_overtake_returns_to_original_lane() {
        let mut a = agent(12.0);
        let mut road = road_with_slow_lead();
        into_overtaking(&mut a, &road);
        assert_eq!(a.drain_events(), vec![AgentEvent::PassBy]);
        assert_eq!(a.target_lane_x(), 3.0);

        // lead falls behind by more than the pass buffer
        road.get_mut(1).unwrap().center = [0.0, 0.6, 5.0];
        a.tick(ME, &pose(3.0, 0.0), &road, DT);
        assert_eq!(a.state(), AgentState::CheckingToReturn);

        a.tick(ME, &pose(3.0, 0.0), &road, DT);
        assert_eq!(a.state(), AgentState::ReturningToOriginalLane);
        assert_eq!(a.target_lane_x(), 0.0);

        for _ in 0..200 {
            let x = a.current_moving_target_x();
            a.tick(ME, &pose(x, 0.0), &road, DT);
            if a.state() == AgentState::DrivingStraight {
                break;
            }
        }
        assert_eq!(a.state(), AgentState::DrivingStraight);
        assert_eq!(a.current_moving_target_x(), 0.0);
        assert_eq!(a.car_to_overtake(), None);
        assert!(a.drain_events().is_empty());
    }

    #[test]
    fn vanished_target_waits_for_hold_time() {
        let mut a = agent(12.0);
        let mut road = road_with_slow_lead();
        into_overtaking(&mut a, &road);
        road.remove(1);

        // hold is 1.5 s, so 60 ticks is not enough
        for _ in 0..60 {
            a.tick(ME, &pose(3.0, 0.0), &road, DT);
        }
        assert_eq!(a.state(), AgentState::Overtaking);
        assert_eq!(a.car_to_overtake(), None);

        for _ in 0..20 {
            a.tick(ME, &pose(3.0, 0.0), &road, DT);
        }
        assert_eq!(a.state(), AgentState::CheckingToReturn);
    }

    #[test]
    fn unpassed_target_is_abandoned_at_the_cutoff() {
        let mut a = agent(12.0);
        let road = road_with_slow_lead();
        into_overtaking(&mut a, &road);

        // lead stays ahead the whole time; cutoff is 1.5 * 1.5 = 2.25 s
        let mut ticks = 0;
        while a.state() == AgentState::Overtaking && ticks < 500 {
            a.tick(ME, &pose(3.0, 0.0), &road, DT);
            ticks += 1;
        }
        assert_eq!(a.state(), AgentState::CheckingToReturn);
        assert!((110..=115).contains(&ticks), "left after {ticks} ticks");
    }

    #[test]
    fn blocked_return_lane_resumes_overtaking_with_fresh_timer() {
        let mut a = agent(12.0);
        let mut road = road_with_slow_lead();
        into_overtaking(&mut a, &road);
        road.get_mut(1).unwrap().center = [0.0, 0.6, 5.0];
        a.tick(ME, &pose(3.0, 0.0), &road, DT);
        assert_eq!(a.state(), AgentState::CheckingToReturn);

        road.insert(3, [0.0, 0.6, -10.0], HALF, Some([0.0, 0.0, -12.0]));
        a.tick(ME, &pose(3.0, 0.0), &road, DT);

        assert_eq!(a.state(), AgentState::Overtaking);
        assert_eq!(a.overtake_timer(), 0.0);
        assert_eq!(a.target_lane_x(), 3.0);
    }

    #[test]
    fn bodiless_hits_are_ignored_ahead_but_block_lanes() {
        let mut a = agent(12.0);
        let mut road = AabbTraffic::default();
        road.insert(7, [0.0, 0.6, -10.0], HALF, None);
        a.tick(ME, &pose(0.0, 0.0), &road, DT);
        assert_eq!(a.state(), AgentState::DrivingStraight);

        let mut road = road_with_slow_lead();
        road.insert(7, [3.0, 0.6, -25.0], HALF, None);
        a.tick(ME, &pose(0.0, 0.0), &road, DT);
        a.tick(ME, &pose(0.0, 0.0), &road, DT);
        assert_eq!(a.state(), AgentState::DrivingStraight);
        assert_eq!(a.current_speed(), 5.0);
    }

    #[test]
    fn moving_target_steps_are_bounded_and_overtaking_needs_a_lane_change() {
        let mut a = agent(14.0);
        let mut road = road_with_slow_lead();
        let max_step = TrafficConfig::default().lane_change_sharpness * DT + 1e-5;
        let mut prev_state = a.state();
        let mut z = 0.0;

        for _ in 0..1500 {
            let before = a.current_moving_target_x();
            let x = before;
            a.tick(ME, &pose(x, z), &road, DT);
            assert!((a.current_moving_target_x() - before).abs() <= max_step);

            if a.state() == AgentState::Overtaking && prev_state != AgentState::Overtaking {
                assert!(matches!(
                    prev_state,
                    AgentState::ChangingToOvertakeLane | AgentState::CheckingToReturn
                ));
                assert_ne!(a.target_lane_x(), a.original_lane_x());
            }
            prev_state = a.state();

            z -= a.current_speed() * DT;
            if let Some(lead) = road.get_mut(1) {
                lead.center[2] -= 5.0 * DT;
            }
        }
    }

    #[test]
    fn lateral_command_saturates_and_keeps_vertical_velocity() {
        let mut a = agent(10.0);
        let road = AabbTraffic::default();
        let p = AgentPose { position: [-2.0, 0.6, 0.0], velocity: [0.0, -1.5, -10.0] };

        let cmd = a.tick(ME, &p, &road, DT);
        assert_eq!(cmd.linear_velocity, [3.0, -1.5, -10.0]);
        assert!((cmd.heading_blend - 0.2).abs() < 1e-6);

        let p = AgentPose { position: [0.1, 0.6, 0.0], velocity: [0.0, 0.0, 0.0] };
        let cmd = a.tick(ME, &p, &road, DT);
        assert!((cmd.linear_velocity[0] + 0.5).abs() < 1e-5);
    }
}
