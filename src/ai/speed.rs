// AI speed control: hysteretic speed floor, curvature target speed, braking.

use serde::Serialize;

use crate::ai::lookahead;
use crate::track::{NodeId, Track};

pub const BRAKE_LOOKAHEAD_NODES: usize = 60;
pub const NEAR_WINDOW_NODES: usize = 10;
pub const BRAKE_GAIN: f32 = 1.5;
pub const THROTTLE_MAX: f32 = 0.95;
pub const BRAKE_MAX: f32 = 0.65;
pub const MIN_MOVING_SPEED: f32 = 15.0;
pub const RESUME_CONTROL_SPEED: f32 = 50.0;

/// Sticky low-speed override: set below the floor, cleared only past the resume speed.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SpeedFloor {
    pub active: bool,
}

impl SpeedFloor {
    pub fn update(&mut self, speed: f32) -> bool {
        let speed = speed.abs();
        if speed < MIN_MOVING_SPEED {
            self.active = true;
        }
        if self.active && speed >= RESUME_CONTROL_SPEED {
            self.active = false;
        }
        self.active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpeedCommand {
    pub throttle: f32,
    pub brake: f32,
    pub peak: f32,
    pub target_speed: f32,
}

/// Peak curvature the speed controller reacts to: the long window with jumps
/// skipped, or the near window without skipping when a jump hides a closer bend.
pub fn braking_peak(track: &Track, current: NodeId) -> f32 {
    let far = lookahead::peak_curvature(track, current, BRAKE_LOOKAHEAD_NODES, true);
    let near = lookahead::peak_curvature(track, current, NEAR_WINDOW_NODES, false);
    far.max(near)
}

pub fn speed_control(
    track: &Track,
    current: NodeId,
    speed: f32,
    corner_speed_mult: f32,
    floor: &mut SpeedFloor,
) -> SpeedCommand {
    let peak = braking_peak(track, current);
    let target_speed = lookahead::target_speed_for_curvature(peak, corner_speed_mult);

    if floor.update(speed) {
        return SpeedCommand { throttle: THROTTLE_MAX, brake: 0.0, peak, target_speed };
    }

    let speed = speed.abs();
    if speed <= target_speed {
        SpeedCommand { throttle: THROTTLE_MAX, brake: 0.0, peak, target_speed }
    } else {
        let overshoot = (speed - target_speed) / target_speed.max(1.0);
        SpeedCommand {
            throttle: 0.0,
            brake: (overshoot * BRAKE_GAIN).clamp(0.0, BRAKE_MAX),
            peak,
            target_speed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::TrackBuilder;

    #[test]
    fn floor_only_clears_past_resume_speed() {
        let mut floor = SpeedFloor::default();
        assert!(!floor.update(30.0));
        assert!(floor.update(10.0));
        // oscillating between the two thresholds keeps it latched
        for s in [16.0, 14.0, 20.0, 49.9, 30.0] {
            assert!(floor.update(s), "released at {s}");
        }
        assert!(!floor.update(50.0));
        assert!(!floor.update(20.0));
    }

    #[test]
    fn brakes_when_over_target_and_caps_pressure() {
        let track = TrackBuilder::new(4.0).straight(20).corner(10, 10.0).straight(20).build(false).unwrap();
        let mut floor = SpeedFloor::default();
        let cmd = speed_control(&track, NodeId(5), 200.0, 1.0, &mut floor);
        assert_eq!(cmd.throttle, 0.0);
        assert_eq!(cmd.brake, BRAKE_MAX);
        assert_eq!(cmd.target_speed, lookahead::MIN_CORNER_SPEED);

        let slow = speed_control(&track, NodeId(5), 52.0, 1.0, &mut floor);
        assert_eq!(slow.throttle, THROTTLE_MAX);
        assert_eq!(slow.brake, 0.0);
    }

    #[test]
    fn floor_overrides_braking() {
        let track = TrackBuilder::new(4.0).corner(40, 10.0).build(false).unwrap();
        let mut floor = SpeedFloor::default();
        let cmd = speed_control(&track, NodeId(0), 5.0, 1.0, &mut floor);
        assert_eq!(cmd.throttle, THROTTLE_MAX);
        assert!(floor.active);
    }
}
