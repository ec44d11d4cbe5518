// ==============================================================================
// driver.rs — PLAYER / AI DRIVER VARIANT
// ------------------------------------------------------------------------------
// Ranking and overtaking only need {vehicle state, virtual lane, at end of
// track}. Both variants expose that through DriverView, a copyable snapshot
// taken once per frame before any driver mutates its own state. AI-only data
// (personality, racing line) is reachable through the Ai variant only.
// ==============================================================================

use serde::Serialize;

use crate::ai::{AiTelemetry, RacingAiDriver};
use crate::dynamics::{DrivableVehicle, VehicleInput};
use crate::track::Track;

/// Read-only per-frame view of one driver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DriverView {
    pub id: usize,
    pub track_position: f32,
    pub speed: f32,
    pub virtual_lane: Option<i32>,
    pub is_ai: bool,
    pub at_end: bool,
}

pub struct PlayerDriver {
    pub id: usize,
    pub name: String,
    pub vehicle: DrivableVehicle,
}

impl PlayerDriver {
    pub fn new(id: usize, name: impl Into<String>, vehicle: DrivableVehicle) -> Self {
        Self {
            id,
            name: name.into(),
            vehicle,
        }
    }

    /// Caller input, clamped to the ranges the dynamics model expects.
    pub fn set_input(&mut self, input: VehicleInput) {
        self.vehicle.input = VehicleInput {
            throttle: input.throttle.clamp(0.0, 1.0),
            brake: input.brake.clamp(0.0, 1.0),
            steering: input.steering.clamp(-1.0, 1.0),
            ..input
        };
    }

    pub fn update(&mut self, track: &Track, dt: f32) {
        self.vehicle.update(track, dt);
    }
}

pub enum Driver {
    Player(PlayerDriver),
    Ai(Box<RacingAiDriver>),
}

impl Driver {
    pub fn id(&self) -> usize {
        match self {
            Driver::Player(p) => p.id,
            Driver::Ai(ai) => ai.id(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Driver::Player(p) => p.name.clone(),
            Driver::Ai(ai) => format!("AI {}", ai.id()),
        }
    }

    pub fn vehicle(&self) -> &DrivableVehicle {
        match self {
            Driver::Player(p) => &p.vehicle,
            Driver::Ai(ai) => &ai.vehicle,
        }
    }

    pub fn virtual_lane(&self) -> Option<i32> {
        match self {
            Driver::Player(_) => None,
            Driver::Ai(ai) => Some(ai.virtual_lane),
        }
    }

    pub fn at_end_of_track(&self, track: &Track) -> bool {
        match self {
            Driver::Player(p) => p.vehicle.at_end_of_track(track),
            Driver::Ai(ai) => ai.at_end_of_track,
        }
    }

    pub fn view(&self, track: &Track) -> DriverView {
        let vehicle = self.vehicle();
        DriverView {
            id: self.id(),
            track_position: vehicle.track_position(track),
            speed: vehicle.speed,
            virtual_lane: self.virtual_lane(),
            is_ai: matches!(self, Driver::Ai(_)),
            at_end: self.at_end_of_track(track),
        }
    }

    /// One frame for this driver. `others` is the pre-frame snapshot of everyone.
    pub fn update(&mut self, track: &Track, others: &[DriverView], dt: f32) -> Option<AiTelemetry> {
        match self {
            Driver::Player(p) => {
                p.update(track, dt);
                None
            }
            Driver::Ai(ai) => ai.update(track, others, dt),
        }
    }
}
