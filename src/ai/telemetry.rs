//! Observational AI trace: one record per logging interval, never read back.

use serde::Serialize;

use crate::ai::racing_line::RacingPhase;

pub const TELEMETRY_TARGET: &str = "ai_telemetry";
pub const DEFAULT_INTERVAL: f32 = 1.0; // s

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VergeStatus {
    OnRoad,
    OnLeftVerge,
    OnRightVerge,
}

impl VergeStatus {
    pub fn classify(lateral: f32, left_limit: f32, right_limit: f32) -> Self {
        if lateral > right_limit {
            VergeStatus::OnRightVerge
        } else if lateral < left_limit {
            VergeStatus::OnLeftVerge
        } else {
            VergeStatus::OnRoad
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AiTelemetry {
    pub ai_id: usize,
    pub node: usize,
    pub speed: f32,
    pub throttle: f32,
    pub brake: f32,
    pub steering: f32,
    pub peak: f32,
    pub target_speed: f32,
    pub lateral: f32,
    pub lane: i32,
    pub phase: RacingPhase,
    pub fraction: f32,
    pub verge: VergeStatus,
    pub at_end: bool,
}

impl AiTelemetry {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Interval timer deciding when a record is due.
#[derive(Debug, Clone, Copy)]
pub struct TelemetryClock {
    pub enabled: bool,
    pub interval: f32,
    elapsed: f32,
}

impl TelemetryClock {
    pub fn new(enabled: bool, interval: f32) -> Self {
        Self {
            enabled,
            interval: interval.max(1e-3),
            elapsed: 0.0,
        }
    }

    pub fn tick(&mut self, dt: f32) -> bool {
        if !self.enabled {
            return false;
        }
        self.elapsed += dt;
        if self.elapsed >= self.interval {
            self.elapsed = 0.0;
            true
        } else {
            false
        }
    }
}

impl Default for TelemetryClock {
    fn default() -> Self {
        Self::new(false, DEFAULT_INTERVAL)
    }
}
