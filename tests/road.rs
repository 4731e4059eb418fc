//! Headless runs over real rapier physics.

use lanerush_server::drive::crash::CrashStage;
use lanerush_server::traffic::AgentState;
use lanerush_server::{Command, SimConfig, SimEvent, Simulation};

const DT: f32 = 1.0 / 60.0;

/// No spawner traffic; cars are placed by hand.
fn quiet_config() -> SimConfig {
    let mut config = SimConfig::default();
    config.spawner.target_car_count = 0;
    config.obstacles.spawn_chance = 0.0;
    config
}

#[test]
fn fast_car_overtakes_slow_car_and_returns() {
    let mut sim = Simulation::new(quiet_config(), Some(42));
    let slow = sim.add_traffic([0.0, 0.6, -50.0], 5.0);
    let fast = sim.add_traffic([0.0, 0.6, -20.0], 15.0);

    let mut seen = Vec::new();
    let mut pass_by = 0;

    for _ in 0..(15.0 / DT) as usize {
        sim.tick(DT);

        let car = sim.traffic().iter().find(|c| c.body == fast).expect("fast car");
        let state = car.agent.state();
        if seen.last() != Some(&state) {
            seen.push(state);
        }
        pass_by += sim
            .snapshot()
            .events
            .iter()
            .filter(|e| matches!(e, SimEvent::PassBy { car } if *car == fast.into_raw_parts().0))
            .count();
    }

    assert!(seen.starts_with(&[
        AgentState::DrivingStraight,
        AgentState::NeedsToOvertake,
        AgentState::ChangingToOvertakeLane,
        AgentState::Overtaking,
    ]), "states {seen:?}");
    assert!(seen.contains(&AgentState::ReturningToOriginalLane));
    assert_eq!(pass_by, 1);

    let world = sim.world();
    let fast_pos = world.position(fast).unwrap();
    let slow_pos = world.position(slow).unwrap();
    assert!(fast_pos[2] < slow_pos[2] - 10.0, "fast {fast_pos:?} slow {slow_pos:?}");
    assert!(fast_pos[0].abs() < 0.3, "fast car left in lane x = {}", fast_pos[0]);

    let car = sim.traffic().iter().find(|c| c.body == fast).unwrap();
    assert_eq!(car.agent.state(), AgentState::DrivingStraight);
}

#[test]
fn blocked_overtake_lane_makes_the_car_follow() {
    let mut sim = Simulation::new(quiet_config(), Some(7));
    // the lead is the nearest thing the wide ahead probe sees; the left-lane
    // car is beyond detection range but inside the clearance check
    sim.add_traffic([0.0, 0.6, -35.0], 6.0);
    sim.add_traffic([3.0, 0.6, -50.0], 6.0);
    let follower = sim.add_traffic([0.0, 0.6, -20.0], 12.0);

    for _ in 0..(3.0 / DT) as usize {
        sim.tick(DT);
    }

    let car = sim.traffic().iter().find(|c| c.body == follower).unwrap();
    assert_eq!(car.agent.target_lane_x(), 0.0);
    assert!((car.agent.current_speed() - 6.0).abs() < 0.1, "speed {}", car.agent.current_speed());
}

#[test]
fn crashing_into_traffic_runs_the_crash_chain() {
    let mut sim = Simulation::new(quiet_config(), Some(3));
    sim.add_traffic([0.0, 0.6, -25.0], 0.0);

    sim.apply(Command::Start);
    sim.apply(Command::Input { gas: true, brake: false, steer: 0.0 });

    let mut stages = Vec::new();
    for _ in 0..(8.0 / DT) as usize {
        sim.tick(DT);
        for event in sim.snapshot().events {
            if let SimEvent::Crash { stage } = event {
                stages.push(stage);
            }
        }
    }

    assert_eq!(stages, vec![CrashStage::Effect, CrashStage::HandOff, CrashStage::GameOver]);

    let player = sim.player().unwrap();
    let presentation = player.crash.presentation();
    assert!(presentation.game_over_visible);
    assert!(!presentation.controls_visible);

    // frozen: distance no longer grows
    let distance = player.get_distance_this_run();
    assert!(distance > 15.0, "distance {distance}");
    for _ in 0..60 {
        sim.tick(DT);
    }
    assert_eq!(sim.player().unwrap().get_distance_this_run(), distance);
}

#[test]
fn obstacle_in_the_lane_ends_the_run() {
    let mut config = quiet_config();
    config.obstacles.spawn_chance = 1.0;
    config.obstacles.pickup_chance = 0.0;
    config.obstacles.lane_x_positions = vec![0.0];
    let mut sim = Simulation::new(config, Some(11));

    sim.apply(Command::Start);
    sim.apply(Command::Input { gas: true, brake: false, steer: 0.0 });

    let mut stages = Vec::new();
    for _ in 0..(15.0 / DT) as usize {
        sim.tick(DT);
        for event in sim.snapshot().events {
            if let SimEvent::Crash { stage } = event {
                stages.push(stage);
            }
        }
        if stages.contains(&CrashStage::Effect) {
            break;
        }
    }

    assert_eq!(stages, vec![CrashStage::Effect]);
    assert!(!sim.obstacles().items().is_empty());
    assert!(sim.player().unwrap().crash.has_crashed());
}
