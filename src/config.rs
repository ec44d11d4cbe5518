// ---------------------------------------------
// SERVER / RACE CONFIGURATION
// ---------------------------------------------
// Loaded from an optional TOML file; every field has a default so an empty
// file (or no file) gives a runnable race.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ai::telemetry::DEFAULT_INTERVAL;
use crate::dynamics::types::{DynamicsTuning, VehicleSpec, MUSCLE, SPORTS_COUPE, SUPERCAR};

pub const MAX_FRAME_TIME: f32 = 0.25; // s, longer stalls are not replayed

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehiclePreset {
    SportsCoupe,
    Muscle,
    Supercar,
}

impl VehiclePreset {
    pub fn spec(&self) -> VehicleSpec {
        match self {
            VehiclePreset::SportsCoupe => SPORTS_COUPE,
            VehiclePreset::Muscle => MUSCLE,
            VehiclePreset::Supercar => SUPERCAR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub interval: f32, // s
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: DEFAULT_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    pub node_spacing: f32, // m
    pub straight_nodes: usize,
    pub corner_nodes: usize,
    pub closed: bool,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            node_spacing: 4.0,
            straight_nodes: 120,
            corner_nodes: 45,
            closed: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub seed: u64,
    pub ai_drivers: usize,
    pub laps: u32,
    pub tick_hz: u32,
    pub countdown_secs: f32,
    pub bind_addr: String,
    pub manual_gearbox: bool,
    pub player_vehicle: VehiclePreset,
    pub ai_vehicle: VehiclePreset,
    pub telemetry: TelemetryConfig,
    pub track: TrackConfig,
    pub tuning: DynamicsTuning,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            ai_drivers: 5,
            laps: 3,
            tick_hz: 60,
            countdown_secs: 3.0,
            bind_addr: "0.0.0.0:9001".to_string(),
            manual_gearbox: false,
            player_vehicle: VehiclePreset::SportsCoupe,
            ai_vehicle: VehiclePreset::SportsCoupe,
            telemetry: TelemetryConfig::default(),
            track: TrackConfig::default(),
            tuning: DynamicsTuning::default(),
        }
    }
}

impl SimConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// First CLI argument is an optional config path; `RACE_SERVER_BIND` overrides the bind address.
    pub fn from_args_and_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::args().nth(1) {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Ok(bind) = std::env::var("RACE_SERVER_BIND") {
            if !bind.trim().is_empty() {
                config.bind_addr = bind;
            }
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_hz == 0 {
            return Err(ConfigError::Invalid("tick_hz must be positive".into()));
        }
        if self.track.node_spacing <= 0.0 {
            return Err(ConfigError::Invalid("track.node_spacing must be positive".into()));
        }
        if self.track.straight_nodes + self.track.corner_nodes < 2 {
            return Err(ConfigError::Invalid("track needs at least 2 nodes".into()));
        }
        if self.telemetry.interval <= 0.0 {
            return Err(ConfigError::Invalid("telemetry.interval must be positive".into()));
        }
        Ok(())
    }

    pub fn frame_time(&self) -> f32 {
        1.0 / self.tick_hz.max(1) as f32
    }

    /// Frame time to simulate for a measured wall-clock delta.
    pub fn frame_delta(&self, measured: f32) -> f32 {
        if measured.is_finite() {
            measured.clamp(0.0, MAX_FRAME_TIME)
        } else {
            self.frame_time()
        }
    }
}
