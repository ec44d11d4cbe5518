// ==============================================================================
// driver.rs — RACING AI DRIVER (ONE OPPONENT)
// ------------------------------------------------------------------------------
// Per frame:
//   1) end-of-track check (fewer than two links ahead -> full brake, flag set)
//   2) racing phase + racing-line fraction
//   3) steering toward a point between the verges of a lookahead node
//   4) speed control (speed floor, curvature target, braking)
//   5) overtaking against the pre-frame driver snapshot
//   6) vehicle dynamics update
//   7) telemetry record when the interval elapses
//
// Personality, starting lane and the first node a lane change is allowed at are
// drawn once from this driver's own seeded RNG.
// ==============================================================================

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::ai::lookahead::{self, MAX_TARGET_SPEED, VERGE_MARGIN_FRACTION};
use crate::ai::overtaking::{OvertakeContext, Overtaking, BLOCKED_SPEED_REDUCTION};
use crate::ai::racing_line::{self, RacingLine, MAX_VIRTUAL_LANE, MIN_VIRTUAL_LANE};
use crate::ai::speed::{self, SpeedCommand, SpeedFloor};
use crate::ai::telemetry::{AiTelemetry, TelemetryClock, VergeStatus};
use crate::dynamics::types::signed_yaw_angle;
use crate::dynamics::DrivableVehicle;
use crate::driver::DriverView;
use crate::track::Track;

pub const AI_STEERING_SPEED: f32 = 6.0; // rad/s, quicker hands than the player
pub const VERGE_CORRECTION_GAIN: f32 = 0.8;
const LOW_SPEED_GAIN: f32 = 4.5;
const HIGH_SPEED_GAIN: f32 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Personality {
    pub aggression: f32,
    pub corner_speed_mult: f32,
    pub lane_change_probability: f32,
}

impl Personality {
    pub fn roll<R: Rng>(rng: &mut R) -> Self {
        Self {
            aggression: 0.7 + rng.gen_range(0.0..1.0) * 0.6,
            corner_speed_mult: 0.85 + rng.gen_range(0.0..1.0) * 0.30,
            lane_change_probability: 0.5 + rng.gen_range(0.0..1.0) * 0.5,
        }
    }
}

pub struct RacingAiDriver {
    id: usize,
    pub vehicle: DrivableVehicle,
    pub virtual_lane: i32,
    pub personality: Personality,
    pub racing_line: RacingLine,
    pub speed_floor: SpeedFloor,
    pub overtaking: Overtaking,
    pub at_end_of_track: bool,
    rng: StdRng,
    telemetry: TelemetryClock,
    last_command: Option<SpeedCommand>,
}

impl RacingAiDriver {
    pub fn new(id: usize, mut vehicle: DrivableVehicle, seed: u64, telemetry: TelemetryClock) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        vehicle.spec.steering_speed = AI_STEERING_SPEED;
        vehicle.auto_drift = false;

        let first_lane_change_allowed = rng.gen_range(5..40);
        let personality = Personality::roll(&mut rng);
        let virtual_lane = rng.gen_range(MIN_VIRTUAL_LANE..=MAX_VIRTUAL_LANE);

        tracing::debug!(
            ai = id,
            lane = virtual_lane,
            aggression = personality.aggression,
            corner_speed_mult = personality.corner_speed_mult,
            "ai driver created"
        );

        Self {
            id,
            vehicle,
            virtual_lane,
            personality,
            racing_line: RacingLine::new(virtual_lane),
            speed_floor: SpeedFloor::default(),
            overtaking: Overtaking::new(first_lane_change_allowed),
            at_end_of_track: false,
            rng,
            telemetry,
            last_command: None,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Lane clamped into the configured range before any use.
    pub fn lane(&self) -> i32 {
        self.virtual_lane.clamp(MIN_VIRTUAL_LANE, MAX_VIRTUAL_LANE)
    }

    pub fn update(&mut self, track: &Track, others: &[DriverView], dt: f32) -> Option<AiTelemetry> {
        let node = self.vehicle.current_node;
        if track.links_ahead(node, 2) < 2 {
            if !self.at_end_of_track {
                tracing::info!(ai = self.id, node = node.0, speed = self.vehicle.speed, "end of track");
            }
            self.at_end_of_track = true;
            self.vehicle.input.throttle = 0.0;
            self.vehicle.input.brake = 1.0;
            self.vehicle.input.steering = 0.0;
            self.vehicle.update(track, dt);
            return self.telemetry.tick(dt).then(|| self.record(track));
        }

        let lane = self.lane();
        self.racing_line.update(track, node, lane, dt);

        self.vehicle.input.steering = self.follow_track(track);

        let cmd = speed::speed_control(
            track,
            node,
            self.vehicle.speed,
            self.personality.corner_speed_mult,
            &mut self.speed_floor,
        );
        self.vehicle.input.throttle = cmd.throttle;
        self.vehicle.input.brake = cmd.brake;
        self.vehicle.input.handbrake = false;
        self.last_command = Some(cmd);

        let ctx = OvertakeContext {
            id: self.id,
            node,
            track_position: self.vehicle.track_position(track),
            speed: self.vehicle.speed,
            lane,
            aggression: self.personality.aggression,
            lane_change_probability: self.personality.lane_change_probability,
        };
        let outcome = self.overtaking.update(track, &ctx, others, &mut self.rng, dt);
        if let Some(new_lane) = outcome.new_lane {
            self.virtual_lane = new_lane;
        }
        if outcome.speed_penalty {
            self.vehicle.speed *= BLOCKED_SPEED_REDUCTION;
        }

        self.vehicle.update(track, dt);

        self.telemetry.tick(dt).then(|| self.record(track))
    }

    /// Steering toward the racing-line point on the lookahead node.
    fn follow_track(&self, track: &Track) -> f32 {
        let vehicle = &self.vehicle;
        let node = vehicle.current_node;

        let look = lookahead::lookahead_nodes(track, node, vehicle.speed);
        let target_node = track.node(track.ahead(node, look));
        let fraction = racing_line::jump_bias(track, node, self.racing_line.fraction);
        let left = target_node.left_verge();
        let target = left + (target_node.right_verge() - left) * fraction;

        let angle = signed_yaw_angle(&vehicle.direction, &(target - vehicle.position));
        let speed_frac = (vehicle.speed / MAX_TARGET_SPEED).clamp(0.0, 1.0);
        let gain = LOW_SPEED_GAIN + (HIGH_SPEED_GAIN - LOW_SPEED_GAIN) * speed_frac;
        let mut steering = angle * gain;

        if !self.racing_line.at_tight_apex() {
            let n = track.node(node);
            let lateral = vehicle.lateral_offset(track);
            let r_margin = n.distance_to_right_verge * VERGE_MARGIN_FRACTION;
            let l_margin = n.distance_to_left_verge * VERGE_MARGIN_FRACTION;
            let (l_limit, r_limit) = lookahead::verge_limits(track, node);

            if lateral > r_limit && steering > 0.0 {
                steering = steering.min(-((lateral - r_limit) / r_margin) * VERGE_CORRECTION_GAIN);
            } else if lateral < l_limit && steering < 0.0 {
                steering = steering.max(((l_limit - lateral) / l_margin) * VERGE_CORRECTION_GAIN);
            }
        }

        steering.clamp(-1.0, 1.0)
    }

    fn record(&self, track: &Track) -> AiTelemetry {
        let node = self.vehicle.current_node;
        let peak = self
            .last_command
            .map(|c| c.peak)
            .unwrap_or_else(|| speed::braking_peak(track, node));
        let lateral = self.vehicle.lateral_offset(track);
        let (l_limit, r_limit) = lookahead::verge_limits(track, node);
        AiTelemetry {
            ai_id: self.id,
            node: node.0,
            speed: self.vehicle.speed,
            throttle: self.vehicle.input.throttle,
            brake: self.vehicle.input.brake,
            steering: self.vehicle.input.steering,
            peak,
            target_speed: lookahead::target_speed_for_curvature(peak, self.personality.corner_speed_mult),
            lateral,
            lane: self.virtual_lane,
            phase: self.racing_line.phase,
            fraction: self.racing_line.fraction,
            verge: VergeStatus::classify(lateral, l_limit, r_limit),
            at_end: self.at_end_of_track,
        }
    }
}
