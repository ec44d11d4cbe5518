// ==============================================================================
// overtaking.rs — BLOCKED DETECTION + VIRTUAL LANE CHANGES
// ------------------------------------------------------------------------------
// Per frame, for every other AI driver in the pre-frame snapshot:
// - ahead within trigger distance (scaled by aggression) and not faster -> blocked
// - if not cooling down, past the first allowed node, and the lane-change roll
//   passes: pick a lane toward the inside of the next real corner, else toward
//   the wider side of the road; reject the move if another AI holds that lane
//   within the proximity window
// - a successful change starts the cooldown and clears the blocked state
// Staying blocked past the trigger time costs a one-off speed penalty (yield)
// and restarts the blocked timer.
// ==============================================================================

use rand::Rng;
use serde::Serialize;

use crate::ai::lookahead::{self, CURV_STRAIGHT_MAX};
use crate::ai::racing_line::{MAX_VIRTUAL_LANE, MIN_VIRTUAL_LANE};
use crate::driver::DriverView;
use crate::track::{NodeId, Track};

pub const LANE_CHANGE_COOLDOWN: f32 = 3.0;   // s
pub const BLOCKED_TRIGGER_TIME: f32 = 1.5;   // s
pub const OVERTAKE_TRIGGER_DIST: f32 = 1.5;  // track-position units, × aggression
pub const BLOCKED_SPEED_REDUCTION: f32 = 0.80;
pub const LANE_OCCUPIED_DIST: f32 = 2.5;
const CORNER_SCAN_NODES: usize = 15;

/// Who is asking, and where they are right now.
#[derive(Debug, Clone, Copy)]
pub struct OvertakeContext {
    pub id: usize,
    pub node: NodeId,
    pub track_position: f32,
    pub speed: f32,
    pub lane: i32,
    pub aggression: f32,
    pub lane_change_probability: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OvertakeOutcome {
    pub new_lane: Option<i32>,
    pub speed_penalty: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Overtaking {
    pub cooldown: f32,
    pub blocked_timer: f32,
    pub first_lane_change_allowed: usize,
    /// -1 = moved left, +1 = moved right, 0 = never changed.
    pub last_direction: i32,
}

impl Overtaking {
    pub fn new(first_lane_change_allowed: usize) -> Self {
        Self {
            cooldown: 0.0,
            blocked_timer: 0.0,
            first_lane_change_allowed,
            last_direction: 0,
        }
    }

    pub fn update<R: Rng>(
        &mut self,
        track: &Track,
        ctx: &OvertakeContext,
        others: &[DriverView],
        rng: &mut R,
        dt: f32,
    ) -> OvertakeOutcome {
        self.cooldown = (self.cooldown - dt).max(0.0);

        let trigger = OVERTAKE_TRIGGER_DIST * ctx.aggression;
        let mut blocked = false;
        let mut outcome = OvertakeOutcome::default();

        for other in others {
            if other.id == ctx.id || !other.is_ai {
                continue;
            }
            let gap = other.track_position - ctx.track_position;
            if !(0.0..=trigger).contains(&gap) || ctx.speed < other.speed {
                continue;
            }

            blocked = true;
            if self.cooldown > 0.0 {
                continue;
            }
            if !rng.gen_bool(ctx.lane_change_probability.clamp(0.0, 1.0) as f64) {
                continue;
            }
            if ctx.node.0 < self.first_lane_change_allowed {
                continue;
            }

            let desired = choose_lane(track, ctx.node, ctx.lane);
            if desired == ctx.lane || lane_occupied(others, ctx.id, desired, ctx.track_position) {
                continue;
            }

            tracing::debug!(ai = ctx.id, from = ctx.lane, to = desired, "lane change");
            self.last_direction = (desired - ctx.lane).signum();
            self.cooldown = LANE_CHANGE_COOLDOWN;
            self.blocked_timer = 0.0;
            outcome.new_lane = Some(desired);
            blocked = false;
            break;
        }

        if blocked {
            self.blocked_timer += dt;
            if self.blocked_timer > BLOCKED_TRIGGER_TIME {
                outcome.speed_penalty = true;
                self.blocked_timer = 0.0;
            }
        } else {
            self.blocked_timer = (self.blocked_timer - dt).max(0.0);
        }
        outcome
    }
}

/// Lane to move into: the inside of a real corner ahead, else the wider side.
pub fn choose_lane(track: &Track, node: NodeId, lane: i32) -> i32 {
    let peak = lookahead::peak_curvature(track, node, CORNER_SCAN_NODES, true);
    let delta = if peak > CURV_STRAIGHT_MAX {
        lookahead::dominant_signed_delta(track, node, CORNER_SCAN_NODES)
    } else {
        0.0
    };

    let toward_right = if delta.abs() > CURV_STRAIGHT_MAX {
        delta > 0.0
    } else {
        let n = track.node(node);
        n.distance_to_right_verge > n.distance_to_left_verge
    };

    if toward_right {
        (lane + 1).min(MAX_VIRTUAL_LANE)
    } else {
        (lane - 1).max(MIN_VIRTUAL_LANE)
    }
}

/// True when another AI holds `lane` within the proximity window of `position`.
pub fn lane_occupied(others: &[DriverView], self_id: usize, lane: i32, position: f32) -> bool {
    others.iter().any(|o| {
        o.id != self_id
            && o.is_ai
            && o.virtual_lane == Some(lane)
            && (o.track_position - position).abs() < LANE_OCCUPIED_DIST
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::TrackBuilder;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn view(id: usize, pos: f32, speed: f32, lane: i32) -> DriverView {
        DriverView {
            id,
            track_position: pos,
            speed,
            virtual_lane: Some(lane),
            is_ai: true,
            at_end: false,
        }
    }

    fn ctx(lane: i32) -> OvertakeContext {
        OvertakeContext {
            id: 0,
            node: NodeId(50),
            track_position: 50.0,
            speed: 120.0,
            lane,
            aggression: 1.0,
            lane_change_probability: 1.0,
        }
    }

    #[test]
    fn inside_of_right_turn_is_a_higher_lane() {
        let track = TrackBuilder::new(4.0).straight(5).corner(10, 6.0).build(false).unwrap();
        assert_eq!(choose_lane(&track, NodeId(0), 2), 3);
        let left = TrackBuilder::new(4.0).straight(5).corner(10, -6.0).build(false).unwrap();
        assert_eq!(choose_lane(&left, NodeId(0), 2), 1);
        assert_eq!(choose_lane(&left, NodeId(0), 1), 1);
    }

    #[test]
    fn wider_side_wins_on_straights() {
        let track = TrackBuilder::new(4.0).verges(3.0, 7.0).straight(30).build(false).unwrap();
        assert_eq!(choose_lane(&track, NodeId(0), 2), 3);
    }

    #[test]
    fn changes_lane_when_blocked_and_free() {
        let track = TrackBuilder::new(4.0).verges(3.0, 7.0).straight(100).build(false).unwrap();
        let mut ot = Overtaking::new(5);
        let mut rng = StdRng::seed_from_u64(1);
        let others = [view(0, 50.0, 120.0, 2), view(1, 51.0, 100.0, 2)];
        let out = ot.update(&track, &ctx(2), &others, &mut rng, 1.0 / 60.0);
        assert_eq!(out.new_lane, Some(3));
        assert_eq!(ot.cooldown, LANE_CHANGE_COOLDOWN);
        assert_eq!(ot.last_direction, 1);
    }

    #[test]
    fn never_moves_into_an_occupied_lane() {
        let track = TrackBuilder::new(4.0).verges(3.0, 7.0).straight(100).build(false).unwrap();
        let mut ot = Overtaking::new(5);
        let mut rng = StdRng::seed_from_u64(7);
        // slower car ahead in lane 2, another AI alongside in lane 3
        let others = [view(0, 50.0, 120.0, 2), view(1, 51.0, 100.0, 2), view(2, 50.0, 110.0, 3)];
        for _ in 0..600 {
            let out = ot.update(&track, &ctx(2), &others, &mut rng, 1.0 / 60.0);
            assert_ne!(out.new_lane, Some(3));
        }
    }

    #[test]
    fn prolonged_blocking_costs_speed_once_per_trigger() {
        let track = TrackBuilder::new(4.0).straight(100).build(false).unwrap();
        // too early on the track to change lane
        let mut ot = Overtaking::new(80);
        let mut rng = StdRng::seed_from_u64(3);
        let others = [view(1, 51.0, 100.0, 2)];
        let penalties = (0..120)
            .filter(|_| ot.update(&track, &ctx(2), &others, &mut rng, 1.0 / 60.0).speed_penalty)
            .count();
        assert_eq!(penalties, 1);
    }

    #[test]
    fn players_and_faster_cars_do_not_block() {
        let track = TrackBuilder::new(4.0).straight(100).build(false).unwrap();
        let mut ot = Overtaking::new(80);
        let mut rng = StdRng::seed_from_u64(3);
        let mut player = view(1, 51.0, 10.0, 2);
        player.is_ai = false;
        player.virtual_lane = None;
        let faster = view(2, 51.0, 200.0, 2);
        for _ in 0..300 {
            let out = ot.update(&track, &ctx(2), &[player, faster], &mut rng, 1.0 / 60.0);
            assert!(!out.speed_penalty);
        }
        assert_eq!(ot.blocked_timer, 0.0);
    }
}
