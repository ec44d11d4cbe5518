//! Shared vehicle types: wheel ids, inputs, per-frame events, specs and tuning.

use std::fmt;

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

// ----- tiny yaw helpers (heading lives in the horizontal plane) -----

/// Rotates `v` about world up; positive angles turn right.
#[inline]
pub fn yaw(v: &Vector3<f32>, angle: f32) -> Vector3<f32> {
    UnitQuaternion::from_axis_angle(&Vector3::y_axis(), angle) * v
}

/// Heading of `v` in radians, 0 along +Z, increasing to the right.
#[inline]
pub fn heading_of(v: &Vector3<f32>) -> f32 {
    v.x.atan2(v.z)
}

/// Signed angle (radians, -π..π) turning `from` onto `to`; positive = `to` is to the right.
pub fn signed_yaw_angle(from: &Vector3<f32>, to: &Vector3<f32>) -> f32 {
    if from.xz().norm_squared() < 1e-12 || to.xz().norm_squared() < 1e-12 {
        return 0.0;
    }
    let mut d = heading_of(to) - heading_of(from);
    while d > std::f32::consts::PI {
        d -= std::f32::consts::TAU;
    }
    while d < -std::f32::consts::PI {
        d += std::f32::consts::TAU;
    }
    d
}

#[inline]
pub fn safe_normalize(v: Vector3<f32>, fallback: Vector3<f32>) -> Vector3<f32> {
    let n = v.norm();
    if n > 1e-6 { v / n } else { fallback }
}

// ============================================
// Wheel identification
// ============================================

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum WheelId {
    FL,
    FR,
    RL,
    RR,
}

impl WheelId {
    pub const ALL: [WheelId; 4] = [WheelId::FL, WheelId::FR, WheelId::RL, WheelId::RR];

    pub fn as_str(&self) -> &'static str {
        match self {
            WheelId::FL => "FL",
            WheelId::FR => "FR",
            WheelId::RL => "RL",
            WheelId::RR => "RR",
        }
    }

    pub fn is_front(&self) -> bool {
        matches!(self, WheelId::FL | WheelId::FR)
    }

    pub fn is_rear(&self) -> bool {
        matches!(self, WheelId::RL | WheelId::RR)
    }

    pub fn is_left(&self) -> bool {
        matches!(self, WheelId::FL | WheelId::RL)
    }
}

impl fmt::Display for WheelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Wheel {
    pub id: WheelId,
    pub rotation: f32,    // radians, cosmetic
    pub steer_angle: f32, // radians, front only
    pub skidding: bool,   // recomputed every frame
}

impl Wheel {
    pub fn new(id: WheelId) -> Self {
        Self {
            id,
            rotation: 0.0,
            steer_angle: 0.0,
            skidding: false,
        }
    }
}

// ============================================
// ----- inputs / events ----------------------
// ============================================

/// Per-frame driver inputs. Callers pre-clamp pedals to 0..1 and steering to -1..1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleInput {
    pub throttle: f32,
    pub brake: f32,
    pub steering: f32, // -1 (left) .. 1 (right)
    pub handbrake: bool,
    pub gear_up: bool,
    pub gear_down: bool,
}

/// Cosmetic/audio signals raised during one update. Never read back by physics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VehicleEvents {
    pub skidding: bool,
    pub off_road: bool,
    pub gear_change_started: bool,
    pub collision: bool,
    pub landed: bool,
}

// ============================================
// ----- vehicle specs ------------------------
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleSpec {
    pub mass: f32,            // kg
    pub horsepower: f32,
    pub redline: f32,         // rpm
    pub traction: f32,        // accel force the driven tyres hold before spinning
    pub wheelbase: f32,       // m
    pub track_width: f32,     // m
    pub max_steer_angle: f32, // rad at standstill
    pub steering_speed: f32,  // rad/s wheel slew
}

pub const SPORTS_COUPE: VehicleSpec = VehicleSpec {
    mass: 1350.0,
    horsepower: 280.0,
    redline: 7000.0,
    traction: 520.0,
    wheelbase: 2.5,
    track_width: 1.5,
    max_steer_angle: 0.6,     // ~34 degrees
    steering_speed: 4.0,
};

pub const MUSCLE: VehicleSpec = VehicleSpec {
    mass: 1600.0,
    horsepower: 330.0,
    redline: 6000.0,
    traction: 420.0,
    wheelbase: 2.7,
    track_width: 1.6,
    max_steer_angle: 0.55,
    steering_speed: 3.5,
};

pub const SUPERCAR: VehicleSpec = VehicleSpec {
    mass: 1450.0,
    horsepower: 400.0,
    redline: 7500.0,
    traction: 560.0,
    wheelbase: 2.6,
    track_width: 1.6,
    max_steer_angle: 0.6,
    steering_speed: 4.5,
};

impl Default for VehicleSpec {
    fn default() -> Self {
        SPORTS_COUPE
    }
}

/// Dynamics tuning shared by every vehicle. Speeds are kph, rates per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicsTuning {
    // drag
    pub ground_friction: f32,
    pub air_friction_per_speed: f32,
    pub max_air_friction: f32,
    pub brake_power: f32,
    pub steering_drag: f32,
    pub off_road_drag_per_wheel: f32,
    pub off_road_min_speed: f32,

    // collision / understeer
    pub max_rotation_per_sec: f32, // rad/s drained from a collision correction
    pub front_slip_multiplier: f32,
    pub max_front_slip: f32,

    // rear slip
    pub rear_slip_speed: f32,
    pub rear_slip_max: f32,
    pub auto_drift_min_speed: f32,
    pub slip_continue_min_speed: f32,
    pub rear_slip_decay_base: f32,
    pub rear_slip_decay_momentum: f32,
    pub rear_slip_snap: f32,

    // handbrake
    pub handbrake_min_speed: f32,
    pub handbrake_slip_build_rate: f32,
    pub handbrake_straight_line_steer: f32,
    pub max_yaw_reference_speed: f32,
    pub handbrake_peak_power: f32,
    pub handbrake_max_lock_time: f32,

    // engine
    pub engine_force_scale: f32,
    pub redline_force_damping: f32, // per 60 Hz frame
    pub wheelspin_rpm_fraction: f32,

    // steering
    pub high_speed_lock_fraction: f32,
    pub lock_reference_speed: f32,
}

impl Default for DynamicsTuning {
    fn default() -> Self {
        Self {
            ground_friction: 14.0,
            air_friction_per_speed: 0.07,
            max_air_friction: 7.0,
            brake_power: 70.0,
            steering_drag: 10.0,
            off_road_drag_per_wheel: 5.0,
            off_road_min_speed: 30.0,

            max_rotation_per_sec: 5.0,
            front_slip_multiplier: 0.000_001_7,
            max_front_slip: 0.91,

            rear_slip_speed: 1.6,
            rear_slip_max: 0.5,
            auto_drift_min_speed: 100.0,
            slip_continue_min_speed: 10.0,
            rear_slip_decay_base: 0.8,
            rear_slip_decay_momentum: 2.0,
            rear_slip_snap: 0.03,

            handbrake_min_speed: 20.0,
            handbrake_slip_build_rate: 2.5,
            handbrake_straight_line_steer: 0.35,
            max_yaw_reference_speed: 120.0,
            handbrake_peak_power: 50.0,
            handbrake_max_lock_time: 2.0,

            engine_force_scale: 0.4,
            redline_force_damping: 0.2,
            wheelspin_rpm_fraction: 0.7,

            high_speed_lock_fraction: 0.35,
            lock_reference_speed: 200.0,
        }
    }
}
