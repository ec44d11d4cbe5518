// ==============================================================================
// steering.rs — STEERING RACK, BICYCLE YAW, COLLISION-OWED ROTATION
// ==============================================================================
// Responsibilities:
// - Slew the front wheel angle toward the driver's request
// - Shrink available lock as speed rises
// - Turn wheel angle into a per-frame heading change (bicycle model)
// - Drain a queued collision rotation at a bounded angular rate
// - Understeer: damp the steering heading change by the front slip factor
// ------------------------------------------------------------------------------
// yaw per frame (radians):
//
//        Δψ = (v / 3.6) / L · tan(δ) · dt
//
// where: v = speed (kph), L = wheelbase (m), δ = front wheel angle (rad)
//
// Collision rotation is stored in radians. While any is owed, steering yaw is
// suppressed and the owed amount is handed out at most max_rate·dt per frame;
// the final frame takes the whole remainder so the sum is exact.
// ==============================================================================

use crate::dynamics::types::{DynamicsTuning, VehicleSpec};

// float slop allowed when deciding whether the remainder fits in one frame
const DRAIN_TOLERANCE: f32 = 1e-4;

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Maximum wheel angle (rad) available at `speed`.
pub fn lock_at_speed(spec: &VehicleSpec, tuning: &DynamicsTuning, speed: f32) -> f32 {
    let t = if tuning.lock_reference_speed > 0.0 {
        (speed.abs() / tuning.lock_reference_speed).clamp(0.0, 1.0)
    } else {
        1.0
    };
    spec.max_steer_angle * lerp(1.0, tuning.high_speed_lock_fraction, t)
}

// ================================================================================
// - steering rack (rate-limited slew toward input · lock)
// ================================================================================
pub fn update_steering_rack(
    steer_input: f32, // -1..1, positive = right
    steer_angle: &mut f32,
    lock: f32,
    steering_speed: f32,
    dt: f32,
) {
    let target = steer_input.clamp(-1.0, 1.0) * lock;
    let step = steering_speed * dt;
    let delta = target - *steer_angle;
    if delta.abs() <= step {
        *steer_angle = target;
    } else {
        *steer_angle += delta.signum() * step;
    }

    // hard stops follow the speed-dependent lock
    *steer_angle = steer_angle.clamp(-lock, lock);
}

/// Heading change (rad) for one frame, positive turns right.
pub fn bicycle_yaw(speed: f32, wheelbase: f32, steer_angle: f32, dt: f32) -> f32 {
    if wheelbase <= 0.0 {
        return 0.0;
    }
    (speed / 3.6) / wheelbase * steer_angle.tan() * dt
}

/// Understeer: grows with mass × |speed|, capped.
pub fn front_slip_factor(mass: f32, speed: f32, tuning: &DynamicsTuning) -> f32 {
    (mass * speed.abs() * tuning.front_slip_multiplier).min(tuning.max_front_slip)
}

/// Rotation still owed after an impact, drained over the following frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollisionRotation {
    pending: f32, // rad
}

impl CollisionRotation {
    pub fn queue_degrees(&mut self, degrees: f32) {
        self.pending = degrees.to_radians();
    }

    pub fn pending(&self) -> f32 {
        self.pending
    }

    pub fn is_pending(&self) -> bool {
        self.pending != 0.0
    }

    /// Hands out this frame's share of the owed rotation.
    pub fn drain(&mut self, max_rate: f32, dt: f32) -> f32 {
        let max_rot = max_rate * dt;
        if self.pending.abs() <= max_rot * (1.0 + DRAIN_TOLERANCE) {
            let all = self.pending;
            self.pending = 0.0;
            all
        } else {
            let step = self.pending.signum() * max_rot;
            self.pending -= step;
            step
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::types::SPORTS_COUPE;

    #[test]
    fn rack_slews_at_steering_speed_and_respects_lock() {
        let mut angle = 0.0;
        update_steering_rack(1.0, &mut angle, 0.5, 4.0, 0.05);
        assert!((angle - 0.2).abs() < 1e-6);
        for _ in 0..20 {
            update_steering_rack(1.0, &mut angle, 0.5, 4.0, 0.05);
        }
        assert_eq!(angle, 0.5);
        // lock shrinks at speed: the angle is pulled inside the new stop at once
        update_steering_rack(1.0, &mut angle, 0.3, 4.0, 0.0);
        assert_eq!(angle, 0.3);
    }

    #[test]
    fn lock_shrinks_with_speed() {
        let tuning = DynamicsTuning::default();
        let slow = lock_at_speed(&SPORTS_COUPE, &tuning, 0.0);
        let fast = lock_at_speed(&SPORTS_COUPE, &tuning, 400.0);
        assert_eq!(slow, SPORTS_COUPE.max_steer_angle);
        assert!((fast - SPORTS_COUPE.max_steer_angle * 0.35).abs() < 1e-6);
    }

    #[test]
    fn bicycle_yaw_sign_and_standstill() {
        assert!(bicycle_yaw(50.0, 2.5, 0.2, 0.016) > 0.0);
        assert!(bicycle_yaw(50.0, 2.5, -0.2, 0.016) < 0.0);
        assert_eq!(bicycle_yaw(0.0, 2.5, 0.4, 0.016), 0.0);
    }

    #[test]
    fn collision_rotation_drains_in_bounded_steps() {
        let mut rot = CollisionRotation::default();
        rot.queue_degrees(-40.0);
        let r = 5.0 / 60.0;
        let frames = (40f32.to_radians() / r).ceil() as usize;
        let mut total = 0.0;
        for _ in 0..frames {
            let step = rot.drain(5.0, 1.0 / 60.0);
            assert!(step.abs() <= r * (1.0 + 1e-3));
            total += step;
        }
        assert!(!rot.is_pending());
        assert!((total + 40f32.to_radians()).abs() < 1e-4);
    }

    #[test]
    fn front_slip_is_capped() {
        let tuning = DynamicsTuning::default();
        assert!(front_slip_factor(1350.0, 100.0, &tuning) < 0.3);
        assert_eq!(front_slip_factor(1e6, 1e6, &tuning), tuning.max_front_slip);
    }
}
