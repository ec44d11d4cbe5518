// Cosmetic body pitch/roll: a unit-mass damped oscillator kicked by impulses.

use serde::Serialize;

const MAX_SUBSTEP: f32 = 1.0 / 120.0;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct BodySpring {
    pub position: f32,
    pub velocity: f32,
    pub stiffness: f32,
    pub damping: f32,
    pub max_position: f32,
}

impl BodySpring {
    /// Critically damped spring of the given stiffness.
    pub fn critical(stiffness: f32, max_position: f32) -> Self {
        Self {
            position: 0.0,
            velocity: 0.0,
            stiffness,
            damping: 2.0 * stiffness.max(0.0).sqrt(),
            max_position,
        }
    }

    pub fn change_position(&mut self, delta: f32) {
        self.position = (self.position + delta).clamp(-self.max_position, self.max_position);
    }

    /// Semi-implicit Euler, sub-stepped so long frames stay stable.
    pub fn simulate(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let steps = (dt / MAX_SUBSTEP).ceil().min(1000.0) as u32;
        let h = dt / steps as f32;
        for _ in 0..steps {
            let accel = -self.stiffness * self.position - self.damping * self.velocity;
            self.velocity += accel * h;
            self.position += self.velocity * h;
        }
        self.position = self.position.clamp(-self.max_position, self.max_position);
    }
}
