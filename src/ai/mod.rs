//! ai - racing opponents: track lookahead, racing line, speed control, overtaking

pub mod lookahead;
pub mod racing_line;
pub mod speed;
pub mod overtaking;
pub mod telemetry;
pub mod driver;

pub use driver::{Personality, RacingAiDriver};
pub use racing_line::RacingPhase;
pub use telemetry::{AiTelemetry, TelemetryClock, TELEMETRY_TARGET};
