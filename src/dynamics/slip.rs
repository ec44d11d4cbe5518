// ==============================================================================
// slip.rs — REAR AXLE SLIP (DRIFT / HANDBRAKE / DECAY)
// ------------------------------------------------------------------------------
// The rear slip factor is a signed yaw offset (radians) between the direction of
// travel and where the nose points. Positive slip points the nose right, the
// same sign as a right steering input.
//
// Per grounded frame, one of three build paths runs:
// 1) auto-drift (AI): above a speed, steering drives slip toward ±max at a fixed
//    rate; crossing zero snaps to zero first
// 2) handbrake: above a minimum speed, slip moves toward the steering side at a
//    rate scaled by steering magnitude and speed; with the wheel centred the
//    last steering side is used and a reduced straight-line magnitude applies
// 3) continuation: no handbrake, slip already non-zero and steering held
// then decay runs whenever the handbrake is off or the car is too slow. Decay
// speed grows with slip magnitude, so large slides take longer to catch.
// ==============================================================================

use crate::dynamics::types::DynamicsTuning;

const STEER_DEADZONE: f32 = 0.05;

#[derive(Debug, Clone, Copy)]
pub struct SlipContext {
    pub on_ground: bool,
    pub speed: f32,
    pub steering: f32,
    pub handbrake: bool,
    pub auto_drift: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct RearSlip {
    pub factor: f32,
    last_steering_sign: f32,
}

impl Default for RearSlip {
    fn default() -> Self {
        Self {
            factor: 0.0,
            last_steering_sign: 1.0,
        }
    }
}

impl RearSlip {
    pub fn update(&mut self, ctx: &SlipContext, tuning: &DynamicsTuning, dt: f32) {
        let max = tuning.rear_slip_max;

        if ctx.steering > STEER_DEADZONE {
            self.last_steering_sign = 1.0;
        } else if ctx.steering < -STEER_DEADZONE {
            self.last_steering_sign = -1.0;
        }

        if !ctx.on_ground {
            return;
        }

        let handbrake_active = ctx.handbrake && ctx.speed > tuning.handbrake_min_speed;

        if ctx.auto_drift && ctx.speed > tuning.auto_drift_min_speed {
            self.ramp_with_steering(ctx.steering, tuning.rear_slip_speed * dt, max);
        } else if handbrake_active {
            let speed_scale = ctx.speed / tuning.max_yaw_reference_speed;
            let steer_mag = ctx.steering.abs();
            let slip_sign = if steer_mag > STEER_DEADZONE {
                ctx.steering.signum()
            } else {
                self.last_steering_sign
            };
            let effective_mag = steer_mag.max(tuning.handbrake_straight_line_steer);
            let step = tuning.handbrake_slip_build_rate * effective_mag * speed_scale * dt;
            self.factor = move_towards(self.factor, slip_sign * max, step);

            // straight-line entry keeps rotating on momentum; the driver has to catch it
            if steer_mag < STEER_DEADZONE && self.factor.abs() > 0.02 {
                self.factor += self.factor.signum() * 0.3 * speed_scale * dt;
            }
        } else if !ctx.handbrake
            && ctx.steering != 0.0
            && self.factor != 0.0
            && ctx.speed > tuning.slip_continue_min_speed
        {
            self.ramp_with_steering(ctx.steering, tuning.rear_slip_speed * dt, max);
        }

        if !handbrake_active {
            self.decay(tuning, dt);
        }

        self.factor = self.factor.clamp(-max, max);
    }

    fn ramp_with_steering(&mut self, steering: f32, step: f32, max: f32) {
        let prev = self.factor;
        if steering > 0.0 {
            self.factor = (self.factor + step).min(max);
            if prev < 0.0 && self.factor > 0.0 {
                self.factor = 0.0;
            }
        } else if steering < 0.0 {
            self.factor = (self.factor - step).max(-max);
            if prev > 0.0 && self.factor < 0.0 {
                self.factor = 0.0;
            }
        }
    }

    fn decay(&mut self, tuning: &DynamicsTuning, dt: f32) {
        let mag = self.factor.abs();
        if mag <= tuning.rear_slip_snap {
            self.factor = 0.0;
            return;
        }
        let rate = tuning.rear_slip_decay_base + mag * tuning.rear_slip_decay_momentum;
        let step = rate * dt;
        self.factor = if step >= mag { 0.0 } else { self.factor - self.factor.signum() * step };
    }
}

fn move_towards(current: f32, target: f32, step: f32) -> f32 {
    let delta = target - current;
    if delta.abs() <= step {
        target
    } else {
        current + delta.signum() * step
    }
}
