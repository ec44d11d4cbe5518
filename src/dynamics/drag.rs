// ==============================================================================
// drag.rs — AIR / GROUND / BRAKE DRAG
// ------------------------------------------------------------------------------
// Two kinds of drag act every frame:
// - multiplicative decay of the accumulated force vector and of speed, from
//   air friction (linear in |speed|, capped) plus ground friction (grounded only)
// - additive braking drag (grounded only) that pulls speed toward zero without
//   ever crossing it: brake pedal, handbrake lock, steering scrub, off-road
//   wheels and powertrain friction
//
// The handbrake lock drag peaks on application and fades to 60 % of peak over
// the lock duration; on release the lock timer winds back three times faster.
// ==============================================================================

use nalgebra::Vector3;

use crate::dynamics::types::DynamicsTuning;

const FORCE_DECAY_SCALE: f32 = 0.06;
const SPEED_DECAY_SCALE: f32 = 0.0015;
const HANDBRAKE_FADE: f32 = 0.4;   // fraction of peak lost at full lock time
const HANDBRAKE_RELEASE_RATE: f32 = 3.0;
const MIN_DRAG_SPEED: f32 = 1.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct HandbrakeLock {
    pub held_time: f32, // s
}

impl HandbrakeLock {
    /// Advances the lock timer and returns this frame's handbrake drag.
    pub fn update(&mut self, held: bool, tuning: &DynamicsTuning, dt: f32) -> f32 {
        if held {
            self.held_time = (self.held_time + dt).min(tuning.handbrake_max_lock_time);
            let fade = if tuning.handbrake_max_lock_time > 0.0 {
                self.held_time / tuning.handbrake_max_lock_time
            } else {
                1.0
            };
            tuning.handbrake_peak_power * (1.0 - fade * HANDBRAKE_FADE)
        } else {
            self.held_time = (self.held_time - dt * HANDBRAKE_RELEASE_RATE).max(0.0);
            0.0
        }
    }
}

/// Everything the braking drag needs from the vehicle for one frame.
#[derive(Debug, Clone, Copy)]
pub struct BrakeDragInput {
    pub speed: f32,
    pub brake: f32,
    pub handbrake: bool,
    pub steering_ratio: f32, // |wheel angle| / max lock, 0..1
    pub wheels_off_road: u32,
    pub powertrain_friction: f32,
}

pub fn air_friction(speed: f32, tuning: &DynamicsTuning) -> f32 {
    (tuning.air_friction_per_speed * speed.abs()).min(tuning.max_air_friction)
}

/// Multiplicative decay of force and speed. Factors never go negative, so a huge
/// frame stops the car instead of flipping it.
pub fn apply_decay(
    force: &mut Vector3<f32>,
    speed: &mut f32,
    on_ground: bool,
    tuning: &DynamicsTuning,
    dt: f32,
) {
    let ground = if on_ground { tuning.ground_friction } else { 0.0 };
    let friction = ground + air_friction(*speed, tuning);

    *force *= (1.0 - friction * FORCE_DECAY_SCALE * dt).max(0.0);
    *speed *= (1.0 - friction * SPEED_DECAY_SCALE * dt).max(0.0);
}

/// Sum of the additive drag terms, in kph per second.
pub fn brake_drag(input: &BrakeDragInput, lock: &mut HandbrakeLock, tuning: &DynamicsTuning, dt: f32) -> f32 {
    let mut drag = tuning.brake_power * input.brake;
    drag += lock.update(input.handbrake, tuning, dt);
    drag += input.steering_ratio.abs() * tuning.steering_drag;
    if input.speed.abs() > tuning.off_road_min_speed {
        drag += input.wheels_off_road as f32 * tuning.off_road_drag_per_wheel;
    }
    drag += input.powertrain_friction;

    if input.speed.abs() < MIN_DRAG_SPEED || drag < 0.0 {
        0.0
    } else {
        drag
    }
}

/// Moves `speed` toward zero by `drag * dt`, stopping at zero.
pub fn apply_toward_zero(speed: f32, drag: f32, dt: f32) -> f32 {
    let step = drag * dt;
    if speed > 0.0 {
        (speed - step).max(0.0)
    } else if speed < 0.0 {
        (speed + step).min(0.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handbrake_drag_peaks_then_fades_to_sixty_percent() {
        let tuning = DynamicsTuning::default();
        let mut lock = HandbrakeLock::default();
        let first = lock.update(true, &tuning, 1.0 / 60.0);
        assert!(first > tuning.handbrake_peak_power * 0.99);

        let mut last = first;
        for _ in 0..200 {
            last = lock.update(true, &tuning, 1.0 / 60.0);
        }
        assert!((last - tuning.handbrake_peak_power * 0.6).abs() < 1e-3);

        lock.update(false, &tuning, 0.5);
        assert!(lock.held_time < tuning.handbrake_max_lock_time - 1.4);
    }

    #[test]
    fn braking_never_crosses_zero() {
        assert_eq!(apply_toward_zero(5.0, 1000.0, 0.1), 0.0);
        assert_eq!(apply_toward_zero(-5.0, 1000.0, 0.1), 0.0);
        assert_eq!(apply_toward_zero(5.0, 10.0, 0.1), 4.0);
    }

    #[test]
    fn no_drag_near_standstill() {
        let tuning = DynamicsTuning::default();
        let mut lock = HandbrakeLock::default();
        let input = BrakeDragInput {
            speed: 0.5,
            brake: 1.0,
            handbrake: true,
            steering_ratio: 1.0,
            wheels_off_road: 4,
            powertrain_friction: 3.0,
        };
        assert_eq!(brake_drag(&input, &mut lock, &tuning, 1.0 / 60.0), 0.0);
    }

    #[test]
    fn off_road_penalty_only_above_threshold() {
        let tuning = DynamicsTuning::default();
        let base = BrakeDragInput {
            speed: 25.0,
            brake: 0.0,
            handbrake: false,
            steering_ratio: 0.0,
            wheels_off_road: 2,
            powertrain_friction: 0.0,
        };
        let mut lock = HandbrakeLock::default();
        assert_eq!(brake_drag(&base, &mut lock, &tuning, 0.016), 0.0);
        let fast = BrakeDragInput { speed: 40.0, ..base };
        assert_eq!(brake_drag(&fast, &mut lock, &tuning, 0.016), 10.0);
    }

    #[test]
    fn airborne_decay_uses_air_friction_only() {
        let tuning = DynamicsTuning::default();
        let mut force = Vector3::new(0.0, 0.0, 100.0);
        let mut speed = 100.0;
        apply_decay(&mut force, &mut speed, false, &tuning, 1.0);
        assert!((force.z - 100.0 * (1.0 - 7.0 * 0.06)).abs() < 1e-3);

        let mut huge = 100.0;
        apply_decay(&mut force, &mut huge, true, &tuning, 1000.0);
        assert_eq!(force.norm(), 0.0);
        assert!(huge >= 0.0);
    }
}
