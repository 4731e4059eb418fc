use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info};

use crate::config::SimConfig;
use crate::drive::crash::CrashPresentation;
use crate::obstacles::RoadItemKind;
use crate::simulation::{SimEvent, Simulation};
use crate::traffic::agent::AgentState;
use crate::vehicle::RunPhase;

#[derive(Debug, Clone, Serialize)]
pub struct PlayerSnapshot {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub rotation: [f32; 4],     // quaternion (i, j, k, w)
    pub speed: f32,             // m/s
    pub applied_torque: f32,    // N·m before falloff
    pub boost_active: bool,
    pub distance: f32,          // m this run
    pub phase: RunPhase,
    pub presentation: CrashPresentation,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrafficSnapshot {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub state: AgentState,
    pub target_lane_x: f32,
    pub speed: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoadItemSnapshot {
    pub id: u32,
    pub kind: RoadItemKind,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub tick: u64,
    pub player: Option<PlayerSnapshot>,
    pub traffic: Vec<TrafficSnapshot>,
    pub items: Vec<RoadItemSnapshot>,
    pub events: Vec<SimEvent>,
}

/// Everything the server sends, tagged by `type`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Welcome { player_id: String },
    Pong,
    Snapshot(Snapshot),
}

impl ServerMessage {
    pub fn to_json(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(json) => Some(json),
            Err(e) => {
                error!(error = %e, "failed to encode server message");
                None
            }
        }
    }
}

/// One connected client and the run it drives.
pub struct Session {
    pub tx: UnboundedSender<String>,
    pub sim: Simulation,
}

pub struct SharedGameState {
    pub tick: u64,
    pub config: SimConfig,
    pub sessions: HashMap<String, Session>,
}

impl SharedGameState {
    pub fn new(config: SimConfig) -> Self {
        Self {
            tick: 0,
            config,
            sessions: HashMap::new(),
        }
    }

    pub fn open_session(&mut self, player_id: &str, tx: UnboundedSender<String>) {
        let sim = Simulation::new(self.config.clone(), self.config.server.seed);
        self.sessions.insert(player_id.to_string(), Session { tx, sim });
        info!(%player_id, sessions = self.sessions.len(), "session opened");
    }

    pub fn close_session(&mut self, player_id: &str) {
        if self.sessions.remove(player_id).is_some() {
            info!(%player_id, sessions = self.sessions.len(), "session closed");
        }
    }

    pub fn session_mut(&mut self, player_id: &str) -> Option<&mut Session> {
        self.sessions.get_mut(player_id)
    }

    /// Tick every run and push its snapshot to its client. Sessions whose
    /// client is gone are dropped.
    pub fn tick_all(&mut self, dt: f32) {
        self.tick += 1;
        let mut closed = Vec::new();

        for (id, session) in self.sessions.iter_mut() {
            session.sim.tick(dt);
            let Some(json) = ServerMessage::Snapshot(session.sim.snapshot()).to_json() else { continue };
            if session.tx.send(json).is_err() {
                closed.push(id.clone());
            }
        }

        for id in closed {
            debug!(player_id = %id, "client channel closed");
            self.close_session(&id);
        }
    }
}
