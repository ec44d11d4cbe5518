// ==============================================================================
// vehicle.rs — DRIVABLE VEHICLE (ONE FRAME OF DYNAMICS)
// ------------------------------------------------------------------------------
// Frame order:
//   1) rear slip + render direction
//   2) engine force, wheelspin, gearbox, rev-limiter damping
//   3) drag (multiplicative decay, then braking drag toward zero)
//   4) integrate force into speed (grounded only), then the standstill clamp
//   5) steering rack, bicycle yaw, collision-owed rotation / understeer
//   6) move, follow the ground, advance the node handle
//   7) wheels + skid flags
//   8) verge / fence check (rotation correction drains from next frame)
//   9) body springs, gear-change polling
//
// Integration order (decided once, used everywhere):
//   force decays before it is projected onto the heading, and the force-to-speed
//   step is normalised to a 60 Hz reference frame so the same car accelerates
//   alike at any frame time.
// ==============================================================================

use nalgebra::Vector3;
use serde::Serialize;

use crate::dynamics::drag::{self, BrakeDragInput, HandbrakeLock};
use crate::dynamics::slip::{RearSlip, SlipContext};
use crate::dynamics::spring::BodySpring;
use crate::dynamics::steering::{self, CollisionRotation};
use crate::dynamics::types::{
    safe_normalize, yaw, DynamicsTuning, VehicleEvents, VehicleInput, VehicleSpec, Wheel, WheelId,
};
use crate::powertrain::{GearState, GearboxAction, Powertrain};
use crate::track::{NodeId, Track};
use crate::verge::{self, VergeFrame};

pub const GRAVITY: f32 = 9.81;          // m/s²
const REFERENCE_HZ: f32 = 60.0;
const FORCE_BUILD: f32 = 2.5;
const LAUNCH_SLACK: f32 = 3.0;          // m/s the ground may drop faster than gravity before we leave it
const STANDSTILL_SPEED: f32 = 1.0;
const BRAKE_SKID_PEDAL: f32 = 0.5;
const BRAKE_SKID_SPEED: f32 = 10.0;
const ALL_WHEEL_SKID_BELOW: f32 = 80.0;
const OFF_ROAD_SKID_SPEED: f32 = 3.0;
const SPIN_WHEEL_RATE: f32 = 50.0;

pub struct DrivableVehicle {
    pub spec: VehicleSpec,
    pub tuning: DynamicsTuning,
    pub input: VehicleInput,
    /// AI-only: slip follows steering above a speed without the handbrake.
    pub auto_drift: bool,

    pub position: Vector3<f32>,
    pub direction: Vector3<f32>,
    pub render_direction: Vector3<f32>,
    pub up: Vector3<f32>,
    pub speed: f32, // kph, positive = forward
    pub steering_angle: f32,
    pub front_slip: f32,
    pub body_pitch: BodySpring,
    pub body_roll: BodySpring,
    pub wheels: [Wheel; 4],

    pub current_node: NodeId,
    pub node_fraction: f32,
    pub lap: i32,
    pub on_ground: bool,
    pub wheels_off_road: u32,
    pub events: VehicleEvents,

    powertrain: Box<dyn Powertrain + Send>,
    rear_slip: RearSlip,
    handbrake_lock: HandbrakeLock,
    collision: CollisionRotation,
    rotation_change: f32,
    force: Vector3<f32>,
    vertical_velocity: f32,
    previous_speed: f32,
    last_gear_changes: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct VehicleSnapshot {
    pub position: [f32; 3],
    pub heading: [f32; 3],
    pub speed: f32,
    pub rpm: f32,
    pub gear: i32,
    pub rear_slip: f32,
    pub body_pitch: f32,
    pub body_roll: f32,
    pub node: usize,
    pub lap: i32,
    pub events: VehicleEvents,
}

impl DrivableVehicle {
    pub fn new(
        spec: VehicleSpec,
        tuning: DynamicsTuning,
        powertrain: Box<dyn Powertrain + Send>,
        track: &Track,
        start: NodeId,
        lateral_offset: f32,
    ) -> Self {
        let node = track.node(start);
        let direction = node.forward();
        let last_gear_changes = powertrain.gear_state().changes_started;
        Self {
            spec,
            tuning,
            input: VehicleInput::default(),
            auto_drift: false,
            position: node.position + node.right() * lateral_offset,
            direction,
            render_direction: direction,
            up: Vector3::y(),
            speed: 0.0,
            steering_angle: 0.0,
            front_slip: 0.0,
            body_pitch: BodySpring::critical(200.0, 1.4),
            body_roll: BodySpring::critical(180.0, 3.0),
            wheels: WheelId::ALL.map(Wheel::new),
            current_node: start,
            node_fraction: 0.0,
            lap: 0,
            on_ground: true,
            wheels_off_road: 0,
            events: VehicleEvents::default(),
            powertrain,
            rear_slip: RearSlip::default(),
            handbrake_lock: HandbrakeLock::default(),
            collision: CollisionRotation::default(),
            rotation_change: 0.0,
            force: Vector3::zeros(),
            vertical_velocity: 0.0,
            previous_speed: 0.0,
            last_gear_changes,
        }
    }

    pub fn rear_slip(&self) -> f32 {
        self.rear_slip.factor
    }

    pub fn pending_collision_rotation(&self) -> f32 {
        self.collision.pending()
    }

    pub fn powertrain(&self) -> &dyn Powertrain {
        self.powertrain.as_ref()
    }

    pub fn gear_state(&self) -> GearState {
        self.powertrain.gear_state()
    }

    /// Queues a signed heading correction (degrees, positive = right). Replaces
    /// whatever was still owed.
    pub fn rotate_after_collision(&mut self, degrees: f32) {
        self.collision.queue_degrees(degrees);
        self.rotation_change = 0.0;
    }

    pub fn at_end_of_track(&self, track: &Track) -> bool {
        track.next(self.current_node).is_none()
    }

    /// Continuous progress: laps·nodes + node index + in-segment fraction.
    pub fn track_position(&self, track: &Track) -> f32 {
        self.lap as f32 * track.len() as f32 + self.current_node.0 as f32 + self.node_fraction
    }

    /// Lateral offset from the centre line at the current segment, positive right.
    pub fn lateral_offset(&self, track: &Track) -> f32 {
        VergeFrame::at(track, self.current_node, self.node_fraction).lateral(&self.position)
    }

    /// Advances one frame. Does nothing once the node handle has no successor.
    pub fn update(&mut self, track: &Track, dt: f32) {
        if self.at_end_of_track(track) || dt <= 0.0 {
            return;
        }
        self.events = VehicleEvents::default();
        for wheel in &mut self.wheels {
            wheel.skidding = false;
        }

        self.update_rear_slip(dt);
        self.update_engine_force(dt);
        self.update_drag(dt);
        self.integrate_speed(dt);
        self.update_heading(dt);
        self.move_along_track(track, dt);
        self.update_wheels(dt);
        self.check_verge(track);
        self.update_body(dt);

        let changes = self.powertrain.gear_state().changes_started;
        if changes != self.last_gear_changes {
            self.events.gear_change_started = true;
            self.last_gear_changes = changes;
        }
        self.events.skidding = self.wheels.iter().any(|w| w.skidding);
    }

    // -------------------------------------------------------------------------
    // 1) rear slip
    // -------------------------------------------------------------------------
    fn update_rear_slip(&mut self, dt: f32) {
        let ctx = SlipContext {
            on_ground: self.on_ground,
            speed: self.speed,
            steering: self.input.steering,
            handbrake: self.input.handbrake,
            auto_drift: self.auto_drift,
        };
        self.rear_slip.update(&ctx, &self.tuning, dt);
        self.render_direction = yaw(&self.direction, self.rear_slip.factor);
    }

    // -------------------------------------------------------------------------
    // 2) engine force
    // -------------------------------------------------------------------------
    fn update_engine_force(&mut self, dt: f32) {
        self.previous_speed = self.speed;
        self.powertrain.set_throttle(self.input.throttle);
        let accel = self.powertrain.current_power_output() * self.tuning.engine_force_scale;

        let gears = self.powertrain.gear_state();
        if gears.gear_engaged && gears.current_gear > 0 {
            let traction_factor = if accel > 0.0 {
                ((self.spec.traction + self.speed) / accel).min(1.0)
            } else {
                1.0
            };
            let rpm_fraction = self.powertrain.rpm() / self.powertrain.redline_rpm().max(1.0);
            let launch_spin = rpm_fraction > self.tuning.wheelspin_rpm_fraction
                && self.speed < 10.0
                && self.powertrain.throttle() > 0.0;
            let spinning = traction_factor < 1.0 || launch_spin || !self.on_ground;
            self.powertrain.set_wheels_spinning(spinning);
            if spinning && self.on_ground {
                self.mark_rear_skid();
            }
        }

        let action = if self.input.gear_up {
            GearboxAction::GearUp
        } else if self.input.gear_down {
            GearboxAction::GearDown
        } else {
            GearboxAction::None
        };
        self.powertrain.update(self.speed, action, dt);

        if self.powertrain.at_redline() && !self.powertrain.wheels_spinning() {
            self.force *= self.tuning.redline_force_damping.powf(dt * REFERENCE_HZ);
        }

        if self.on_ground {
            self.force += self.direction * (accel * dt * FORCE_BUILD);
        }
    }

    // -------------------------------------------------------------------------
    // 3) drag
    // -------------------------------------------------------------------------
    fn update_drag(&mut self, dt: f32) {
        drag::apply_decay(&mut self.force, &mut self.speed, self.on_ground, &self.tuning, dt);

        if self.on_ground {
            let lock = steering::lock_at_speed(&self.spec, &self.tuning, self.speed).max(1e-3);
            let input = BrakeDragInput {
                speed: self.speed,
                brake: self.input.brake,
                handbrake: self.input.handbrake,
                steering_ratio: (self.steering_angle / lock).clamp(-1.0, 1.0),
                wheels_off_road: self.wheels_off_road,
                powertrain_friction: self.powertrain.current_friction(),
            };
            let total = drag::brake_drag(&input, &mut self.handbrake_lock, &self.tuning, dt);
            self.speed = drag::apply_toward_zero(self.speed, total, dt);
        }
    }

    // -------------------------------------------------------------------------
    // 4) integration
    // -------------------------------------------------------------------------
    fn integrate_speed(&mut self, dt: f32) {
        let change = self.force / self.spec.mass.max(1.0);
        let magnitude = change.norm();
        if self.on_ground && magnitude > 1e-6 {
            let apply = (change / magnitude).dot(&self.direction).min(1.0);
            self.speed += magnitude * apply * dt * REFERENCE_HZ;
        }

        if self.input.throttle == 0.0 && self.speed.abs() < STANDSTILL_SPEED {
            self.speed = 0.0;
            self.force = Vector3::zeros();
        }
    }

    // -------------------------------------------------------------------------
    // 5) heading
    // -------------------------------------------------------------------------
    fn update_heading(&mut self, dt: f32) {
        let lock = steering::lock_at_speed(&self.spec, &self.tuning, self.speed);
        steering::update_steering_rack(
            self.input.steering,
            &mut self.steering_angle,
            lock,
            self.spec.steering_speed,
            dt,
        );

        if self.collision.is_pending() {
            self.mark_rear_skid();
            self.rotation_change = self.collision.drain(self.tuning.max_rotation_per_sec, dt);
        } else {
            self.rotation_change = if self.on_ground {
                steering::bicycle_yaw(self.speed, self.spec.wheelbase, self.steering_angle, dt)
            } else {
                0.0
            };
            self.front_slip = 0.0;
            if self.rotation_change != 0.0 {
                self.front_slip = steering::front_slip_factor(self.spec.mass, self.speed, &self.tuning);
                self.rotation_change *= 1.0 - self.front_slip;
            }
        }

        self.direction = safe_normalize(yaw(&self.direction, self.rotation_change), self.direction);
        self.render_direction = yaw(&self.direction, self.rear_slip.factor);
    }

    // -------------------------------------------------------------------------
    // 6) position, ground following, node handle
    // -------------------------------------------------------------------------
    fn move_along_track(&mut self, track: &Track, dt: f32) {
        let step = self.direction * (self.speed / 3.6 * dt);
        self.position.x += step.x;
        self.position.z += step.z;

        let located = track.locate(self.current_node, &self.position);
        self.current_node = located.node;
        self.node_fraction = located.fraction;
        self.lap += located.wrapped;

        let ground = track.surface_height(self.current_node, self.node_fraction);
        if self.on_ground {
            let ground_rate = (ground - self.position.y) / dt;
            if ground_rate < self.vertical_velocity - GRAVITY * dt - LAUNCH_SLACK {
                // the surface fell away: keep the current climb rate and fly
                self.on_ground = false;
                self.position.y += self.vertical_velocity * dt;
                self.vertical_velocity -= GRAVITY * dt;
            } else {
                self.vertical_velocity = ground_rate;
                self.position.y = ground;
                self.up = self.surface_up(track);
            }
        } else {
            self.position.y += self.vertical_velocity * dt - 0.5 * GRAVITY * dt * dt;
            self.vertical_velocity -= GRAVITY * dt;
            if self.position.y <= ground {
                self.position.y = ground;
                self.vertical_velocity = 0.0;
                self.on_ground = true;
                self.events.landed = true;
                self.up = self.surface_up(track);
            }
        }
    }

    fn surface_up(&self, track: &Track) -> Vector3<f32> {
        let node = track.node(self.current_node);
        let right = node.right();
        let tangent = node.forward() + Vector3::new(0.0, node.slope / 100.0, 0.0);
        safe_normalize(tangent.cross(&right), Vector3::y())
    }

    // -------------------------------------------------------------------------
    // 7) wheels
    // -------------------------------------------------------------------------
    fn update_wheels(&mut self, dt: f32) {
        let spinning = self.powertrain.wheels_spinning();
        for wheel in &mut self.wheels {
            if wheel.id.is_front() {
                wheel.rotation -= self.speed * dt;
                wheel.steer_angle = self.steering_angle;
            } else if !self.input.handbrake {
                wheel.rotation -= dt * if spinning { SPIN_WHEEL_RATE } else { self.speed };
            }
        }

        if self.input.handbrake && self.on_ground && self.speed > self.tuning.handbrake_min_speed {
            self.mark_rear_skid();
        }

        if self.on_ground && self.input.brake > BRAKE_SKID_PEDAL && self.speed.abs() > BRAKE_SKID_SPEED {
            if self.speed < ALL_WHEEL_SKID_BELOW {
                for wheel in &mut self.wheels {
                    wheel.skidding = true;
                }
            }
            self.events.skidding = true;
        } else if self.on_ground && self.rear_slip.factor != 0.0 && !self.input.handbrake {
            self.mark_rear_skid();
        }
    }

    fn mark_rear_skid(&mut self) {
        for wheel in self.wheels.iter_mut().filter(|w| w.id.is_rear()) {
            wheel.skidding = true;
        }
    }

    // -------------------------------------------------------------------------
    // 8) verge
    // -------------------------------------------------------------------------
    fn check_verge(&mut self, track: &Track) {
        let frame = VergeFrame::at(track, self.current_node, self.node_fraction);
        let points = verge::wheel_points(&self.position, &self.direction, &self.spec);
        self.wheels_off_road = verge::wheels_outside_verge(&frame, &points);

        if self.wheels_off_road > 0 && self.speed > OFF_ROAD_SKID_SPEED {
            self.events.off_road = true;
            self.mark_rear_skid();
        }

        if let Some(contact) = verge::check_fence(&frame, &self.position, &self.direction) {
            self.position += contact.push_back;
            self.speed *= contact.speed_scale;
            self.events.collision = true;
            if let Some(degrees) = contact.rotation_degrees {
                if !self.collision.is_pending() {
                    self.rotate_after_collision(degrees);
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // 9) body springs (cosmetic)
    // -------------------------------------------------------------------------
    fn update_body(&mut self, dt: f32) {
        let frames = dt * REFERENCE_HZ;
        let speed_change = self.speed - self.previous_speed;
        let steer_norm = if self.spec.max_steer_angle > 0.0 {
            self.steering_angle / self.spec.max_steer_angle
        } else {
            0.0
        };

        self.body_pitch.change_position(speed_change * 0.6);
        self.body_roll
            .change_position(steer_norm * -0.05 * (self.speed.abs() / 30.0).min(1.0) * frames);

        if self.input.handbrake && self.on_ground {
            self.body_pitch.change_position(self.speed * 0.003 * dt);
            self.body_roll.change_position(self.rear_slip.factor * 0.08 * frames);
        }

        self.body_pitch.simulate(dt * 2.5);
        self.body_roll.simulate(dt * 2.5);
    }

    pub fn snapshot(&self) -> VehicleSnapshot {
        let gears = self.powertrain.gear_state();
        VehicleSnapshot {
            position: [self.position.x, self.position.y, self.position.z],
            heading: [self.render_direction.x, self.render_direction.y, self.render_direction.z],
            speed: self.speed,
            rpm: self.powertrain.rpm(),
            gear: gears.current_gear,
            rear_slip: self.rear_slip.factor,
            body_pitch: self.body_pitch.position,
            body_roll: self.body_roll.position,
            node: self.current_node.0,
            lap: self.lap,
            events: self.events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::powertrain::Motor;
    use crate::track::{oval, TrackBuilder};

    fn straight(nodes: usize) -> Track {
        TrackBuilder::new(4.0).verges(8.0, 8.0).straight(nodes).build(false).unwrap()
    }

    fn car(track: &Track) -> DrivableVehicle {
        let spec = VehicleSpec::default();
        let motor = Motor::new(spec.horsepower, spec.redline, false);
        DrivableVehicle::new(spec, DynamicsTuning::default(), Box::new(motor), track, NodeId(2), 0.0)
    }

    #[test]
    fn rolling_to_a_stop_clamps_to_exactly_zero() {
        let track = straight(400);
        let mut v = car(&track);
        v.speed = 20.0;
        let mut frames = 0;
        while v.speed != 0.0 && frames < 10_000 {
            v.update(&track, 1.0 / 60.0);
            frames += 1;
        }
        assert_eq!(v.speed, 0.0);
        for _ in 0..120 {
            v.update(&track, 1.0 / 60.0);
            assert_eq!(v.speed, 0.0);
        }
    }

    #[test]
    fn braking_never_reverses_either_way() {
        for start in [120.0f32, -25.0] {
            let track = straight(800);
            let mut v = car(&track);
            v.current_node = NodeId(400);
            v.position = track.node(NodeId(400)).position;
            v.speed = start;
            v.input.brake = 1.0;
            let mut last = start.abs();
            for _ in 0..600 {
                v.update(&track, 1.0 / 60.0);
                assert!(v.speed.abs() <= last + 1e-4);
                assert!(v.speed * start.signum() >= 0.0);
                last = v.speed.abs();
            }
            assert_eq!(v.speed, 0.0);
        }
    }

    #[test]
    fn throttle_accelerates_and_announces_gear_changes() {
        let track = straight(2000);
        let mut v = car(&track);
        v.input.throttle = 1.0;
        let mut shifted = false;
        for _ in 0..600 {
            v.update(&track, 1.0 / 60.0);
            shifted |= v.events.gear_change_started;
        }
        assert!(v.speed > 80.0, "speed {}", v.speed);
        assert!(shifted);
        assert!(v.current_node.0 > 2);
    }

    #[test]
    fn collision_rotation_drains_to_exact_total() {
        let track = straight(400);
        let mut v = car(&track);
        v.speed = 60.0;
        v.rotate_after_collision(30.0);
        let start = crate::dynamics::types::heading_of(&v.direction);
        let dt = 1.0 / 60.0;
        let per_frame = v.tuning.max_rotation_per_sec * dt;
        let frames = (30f32.to_radians() / per_frame).ceil() as usize;
        for _ in 0..frames {
            v.update(&track, dt);
        }
        assert_eq!(v.pending_collision_rotation(), 0.0);
        let turned = crate::dynamics::types::heading_of(&v.direction) - start;
        assert!((turned - 30f32.to_radians()).abs() < 1e-3, "turned {turned}");
    }

    #[test]
    fn skipped_at_end_of_open_track() {
        let track = straight(10);
        let mut v = car(&track);
        v.current_node = NodeId(9);
        v.speed = 50.0;
        let before = v.position;
        v.update(&track, 1.0 / 60.0);
        assert!(v.at_end_of_track(&track));
        assert_eq!(v.position, before);
    }

    #[test]
    fn laps_count_on_closed_tracks() {
        let track = oval(4.0, 10, 10).unwrap();
        let mut v = car(&track);
        let last = NodeId(track.len() - 1);
        v.current_node = last;
        v.position = track.node(last).position + track.node(last).forward() * 3.5;
        v.direction = track.node(last).forward();
        v.speed = 30.0;
        for _ in 0..30 {
            v.update(&track, 1.0 / 60.0);
        }
        assert_eq!(v.lap, 1);
        assert!(v.track_position(&track) > track.len() as f32);
    }

    #[test]
    fn crest_launches_and_lands() {
        let track = TrackBuilder::new(4.0)
            .verges(8.0, 8.0)
            .straight(10)
            .crest(4, 3.0)
            .straight(60)
            .build(false)
            .unwrap();
        let mut v = car(&track);
        v.speed = 110.0;
        v.input.throttle = 1.0;
        let mut flew = false;
        let mut landed = false;
        for _ in 0..240 {
            v.update(&track, 1.0 / 60.0);
            flew |= !v.on_ground;
            landed |= v.events.landed;
        }
        assert!(flew && landed);
        assert!(v.on_ground);
    }

    #[test]
    fn tiny_and_huge_frames_stay_finite_and_bounded() {
        for dt in [1e-4f32, 0.5] {
            let track = oval(4.0, 30, 30).unwrap();
            let mut v = car(&track);
            v.input = VehicleInput {
                throttle: 1.0,
                steering: 0.7,
                handbrake: true,
                ..Default::default()
            };
            v.speed = 90.0;
            for i in 0..400 {
                if i == 200 {
                    v.input.handbrake = false;
                    v.input.steering = -1.0;
                }
                v.update(&track, dt);
                assert!(v.speed.is_finite() && v.position.iter().all(|c| c.is_finite()));
                assert!((v.direction.norm() - 1.0).abs() < 1e-3);
                assert!(v.rear_slip().abs() <= v.tuning.rear_slip_max);
            }
        }
    }
}
