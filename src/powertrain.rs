// ==============================================================================
// powertrain.rs — ENGINE + GEARBOX (BLACK BOX TO THE DYNAMICS MODEL)
// ------------------------------------------------------------------------------
// The dynamics model only talks to the Powertrain trait: it sets throttle,
// forwards the gearbox action every frame and reads back power, rpm, redline,
// wheelspin, friction and gear state.
//
// Motor is the arcade implementation used by the server and tests:
// - 10-point normalised power curve sampled over 0..redline
// - rpm follows road speed through the engaged ratio
// - shifts take a fixed time during which no power reaches the wheels
// - gear changes are announced by bumping GearState::changes_started, which
//   consumers poll instead of subscribing to an event
// ==============================================================================

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GearboxAction {
    #[default]
    None,
    GearUp,
    GearDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct GearState {
    pub current_gear: i32,
    pub next_gear: i32,
    pub gear_engaged: bool,
    /// Monotonic count of shifts started; compare frame to frame.
    pub changes_started: u32,
}

pub trait Powertrain {
    fn set_throttle(&mut self, throttle: f32);
    fn throttle(&self) -> f32;
    fn update(&mut self, speed: f32, action: GearboxAction, dt: f32);
    fn current_power_output(&self) -> f32;
    fn rpm(&self) -> f32;
    fn redline_rpm(&self) -> f32;
    fn at_redline(&self) -> bool;
    fn wheels_spinning(&self) -> bool;
    fn set_wheels_spinning(&mut self, spinning: bool);
    fn current_friction(&self) -> f32;
    fn gear_state(&self) -> GearState;
}

pub const DEFAULT_POWER_CURVE: [f32; 10] = [0.2, 0.3, 0.4, 0.7, 0.8, 1.0, 0.8, 0.8, 0.8, 0.3];
pub const DEFAULT_RATIOS: [f32; 6] = [3.827, 2.360, 1.685, 1.312, 1.000, 0.793];

const IDLE_RPM: f32 = 1000.0;
const SHIFT_TIME: f32 = 0.2;           // s
const AUTO_UP_FRACTION: f32 = 0.92;    // of redline
const AUTO_DOWN_FRACTION: f32 = 0.45;
const RPM_PER_KPH_RATIO: f32 = 31.5;   // rpm per (kph * ratio)
const ENGINE_BRAKE: f32 = 6.0;         // kph/s at redline, throttle closed

#[derive(Debug, Clone)]
pub struct Motor {
    power_curve: Vec<f32>,
    ratios: Vec<f32>,
    horsepower: f32,
    redline: f32,
    manual: bool,

    throttle: f32,
    rpm: f32,
    gear: i32,
    next_gear: i32,
    shift_timer: f32,
    changes_started: u32,
    wheels_spinning: bool,
}

impl Motor {
    pub fn new(horsepower: f32, redline: f32, manual: bool) -> Self {
        Self::with_curve(DEFAULT_POWER_CURVE.to_vec(), DEFAULT_RATIOS.to_vec(), horsepower, redline, manual)
    }

    pub fn with_curve(power_curve: Vec<f32>, ratios: Vec<f32>, horsepower: f32, redline: f32, manual: bool) -> Self {
        Self {
            power_curve,
            ratios,
            horsepower,
            redline: redline.max(IDLE_RPM + 1.0),
            manual,
            throttle: 0.0,
            rpm: IDLE_RPM,
            gear: 1,
            next_gear: 1,
            shift_timer: 0.0,
            changes_started: 0,
            wheels_spinning: false,
        }
    }

    pub fn gear_ratio(&self, gear: i32) -> f32 {
        if gear < 1 {
            return 0.0;
        }
        self.ratios.get(gear as usize - 1).copied().unwrap_or(0.0)
    }

    fn curve_at(&self, rpm: f32) -> f32 {
        let n = self.power_curve.len();
        if n == 0 {
            return 0.0;
        }
        let x = (rpm / self.redline).clamp(0.0, 1.0) * (n - 1) as f32;
        let i = (x.floor() as usize).min(n - 1);
        let j = (i + 1).min(n - 1);
        let t = x - i as f32;
        self.power_curve[i] + (self.power_curve[j] - self.power_curve[i]) * t
    }

    /// Motive power for `gear` at `rpm` with the throttle fully open.
    pub fn power_at(&self, rpm: f32, gear: i32) -> f32 {
        let ratio = self.gear_ratio(gear);
        if ratio <= 0.0 {
            return 0.0;
        }
        self.horsepower * self.curve_at(rpm) * (1.2 + 0.5 * ratio)
    }

    fn start_shift(&mut self, to: i32) {
        let top = self.ratios.len() as i32;
        let to = to.clamp(1, top.max(1));
        if to == self.gear || self.shift_timer > 0.0 {
            return;
        }
        self.next_gear = to;
        self.shift_timer = SHIFT_TIME;
        self.changes_started = self.changes_started.wrapping_add(1);
    }
}

impl Powertrain for Motor {
    fn set_throttle(&mut self, throttle: f32) {
        self.throttle = throttle.clamp(0.0, 1.0);
    }

    fn throttle(&self) -> f32 {
        self.throttle
    }

    fn update(&mut self, speed: f32, action: GearboxAction, dt: f32) {
        if self.shift_timer > 0.0 {
            self.shift_timer -= dt;
            if self.shift_timer <= 0.0 {
                self.shift_timer = 0.0;
                self.gear = self.next_gear;
            }
        }

        let ratio = self.gear_ratio(self.gear);
        let road_rpm = IDLE_RPM + speed.abs() * ratio * RPM_PER_KPH_RATIO;
        let target = if self.wheels_spinning {
            road_rpm.max(IDLE_RPM + self.throttle * (self.redline - IDLE_RPM))
        } else {
            road_rpm
        };
        self.rpm = target.clamp(IDLE_RPM, self.redline);

        if self.manual {
            match action {
                GearboxAction::GearUp => self.start_shift(self.gear + 1),
                GearboxAction::GearDown => self.start_shift(self.gear - 1),
                GearboxAction::None => {}
            }
        } else if self.shift_timer <= 0.0 {
            let frac = self.rpm / self.redline;
            if frac > AUTO_UP_FRACTION && !self.wheels_spinning {
                self.start_shift(self.gear + 1);
            } else if frac < AUTO_DOWN_FRACTION && self.gear > 1 {
                // only drop if the lower gear would not over-rev
                let lower = IDLE_RPM + speed.abs() * self.gear_ratio(self.gear - 1) * RPM_PER_KPH_RATIO;
                if lower < self.redline * AUTO_UP_FRACTION {
                    self.start_shift(self.gear - 1);
                }
            }
        }
    }

    fn current_power_output(&self) -> f32 {
        if self.shift_timer > 0.0 {
            return 0.0;
        }
        self.throttle * self.power_at(self.rpm, self.gear)
    }

    fn rpm(&self) -> f32 {
        self.rpm
    }

    fn redline_rpm(&self) -> f32 {
        self.redline
    }

    fn at_redline(&self) -> bool {
        self.rpm >= self.redline * 0.995
    }

    fn wheels_spinning(&self) -> bool {
        self.wheels_spinning
    }

    fn set_wheels_spinning(&mut self, spinning: bool) {
        self.wheels_spinning = spinning;
    }

    fn current_friction(&self) -> f32 {
        (1.0 - self.throttle) * ENGINE_BRAKE * (self.rpm / self.redline)
    }

    fn gear_state(&self) -> GearState {
        GearState {
            current_gear: self.gear,
            next_gear: self.next_gear,
            gear_engaged: self.shift_timer <= 0.0,
            changes_started: self.changes_started,
        }
    }
}
