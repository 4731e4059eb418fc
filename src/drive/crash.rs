// ==============================================================================
// crash.rs — IMPACT DETECTION + DEFERRED CRASH SEQUENCE
// ------------------------------------------------------------------------------
// report_impact(...):
// - ignores impacts inside the cooldown window of the last accepted crash
// - ignores bodies outside the configured crash layers
// - accepts impacts at or above the crash speed threshold
//
// An accepted crash runs a fixed chain on the simulation timeline:
//   Effect   (immediately)           → crash effect shown
//   HandOff  (+handoff_delay)        → controls hidden, menu camera active
//   GameOver (+handoff+game_over)    → end-of-run screen, car frozen
//
// Stages are never cancelled once scheduled. Applying a stage only sets
// presentation flags, so a second chain overlapping the first is harmless.
// ==============================================================================

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::CrashConfig;
use crate::sched::Timeline;

/// Collision layer of whatever the player car touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionLayer {
    Ground,
    Traffic,
    Player,
    Obstacle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrashStage {
    Effect,
    HandOff,
    GameOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraView {
    #[default]
    Driver,
    Menu,
}

/// What the glue layer should currently be showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CrashPresentation {
    pub effect_visible: bool,
    pub controls_visible: bool,
    pub camera: CameraView,
    pub game_over_visible: bool,
    pub car_frozen: bool,
}

impl Default for CrashPresentation {
    fn default() -> Self {
        Self {
            effect_visible: false,
            controls_visible: true,
            camera: CameraView::Driver,
            game_over_visible: false,
            car_frozen: false,
        }
    }
}

impl CrashPresentation {
    fn apply(&mut self, stage: CrashStage) {
        match stage {
            CrashStage::Effect => self.effect_visible = true,
            CrashStage::HandOff => {
                self.controls_visible = false;
                self.camera = CameraView::Menu;
            }
            CrashStage::GameOver => {
                self.game_over_visible = true;
                self.car_frozen = true;
            }
        }
    }
}

#[derive(Debug)]
pub struct CrashMonitor {
    config: CrashConfig,
    last_crash_at: Option<f64>,
    timeline: Timeline<CrashStage>,
    presentation: CrashPresentation,
    events: Vec<CrashStage>,
}

impl CrashMonitor {
    pub fn new(config: CrashConfig) -> Self {
        Self {
            config,
            last_crash_at: None,
            timeline: Timeline::new(),
            presentation: CrashPresentation::default(),
            events: Vec::new(),
        }
    }

    pub fn presentation(&self) -> &CrashPresentation {
        &self.presentation
    }

    pub fn has_crashed(&self) -> bool {
        self.last_crash_at.is_some()
    }

    /// Returns true when the impact starts a crash sequence.
    pub fn report_impact(&mut self, impact_speed: f32, layer: CollisionLayer) -> bool {
        let now = self.timeline.now();

        if let Some(last) = self.last_crash_at {
            if now < last + f64::from(self.config.cooldown) {
                return false;
            }
        }
        if !self.config.crash_layers.contains(&layer) {
            return false;
        }
        if impact_speed < self.config.crash_speed_threshold {
            debug!(impact_speed, ?layer, "impact below crash threshold");
            return false;
        }

        info!(impact_speed, ?layer, at = now, "crash accepted");
        self.last_crash_at = Some(now);

        self.run_stage(CrashStage::Effect);
        let handoff = self.config.handoff_delay;
        self.timeline.schedule_after(handoff, CrashStage::HandOff);
        self.timeline
            .schedule_after(handoff + self.config.game_over_delay, CrashStage::GameOver);
        true
    }

    pub fn advance(&mut self, dt: f32) {
        for stage in self.timeline.advance(dt) {
            self.run_stage(stage);
        }
    }

    fn run_stage(&mut self, stage: CrashStage) {
        debug!(?stage, "crash stage");
        self.presentation.apply(stage);
        self.events.push(stage);
    }

    pub fn drain_events(&mut self) -> Vec<CrashStage> {
        std::mem::take(&mut self.events)
    }

    /// Clears presentation for a new run. Pending stages of a previous run are
    /// dropped with the old timeline.
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }
}
