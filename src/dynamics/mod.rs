//! dynamics - per-frame vehicle model (slip, drag, steering, body springs)

pub mod types;
pub mod spring;
pub mod slip;
pub mod drag;
pub mod steering;
pub mod vehicle;

pub use types::*;
pub use vehicle::{DrivableVehicle, VehicleSnapshot};
