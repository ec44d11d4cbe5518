// ==============================================================================
// lookahead.rs — READING THE TRACK AHEAD
// ------------------------------------------------------------------------------
// Curvature is the absolute heading change (degrees) between a node and its
// successor. Every scan stops at the last available node, so a track shorter
// than the window just yields a shorter scan.
//
// Jumps: a node whose |slope| exceeds the jump threshold marks a lip. Scans that
// skip jumps ignore the lip and the landing nodes after it, since the car is in
// the air there and the heading change does not matter.
// ==============================================================================

use serde::Serialize;

use crate::track::{NodeId, Track};

// steering lookahead
pub const SPEED_PER_LOOKAHEAD_NODE: f32 = 12.0;
pub const MIN_LOOKAHEAD: usize = 2;
pub const MAX_LOOKAHEAD: usize = 15;

// corner classification (degrees per node)
pub const CURV_STRAIGHT_MAX: f32 = 1.5;
pub const CURV_GENTLE_MAX: f32 = 5.0;
pub const CURV_APEX_VERGE: f32 = 7.0;

// jumps
pub const JUMP_SLOPE_THRESHOLD: f32 = 60.0;
pub const JUMP_LANDING_SKIP: usize = 8;
pub const JUMP_SCAN_WINDOW: usize = 20;
pub const POST_JUMP_CORNER_MIN: f32 = 2.0;
const POST_JUMP_SEARCH: usize = 25;

// speed targets
pub const PEAK_CURV_FULL_SPEED: f32 = 2.0;
pub const PEAK_CURV_MIN_SPEED: f32 = 8.0;
pub const MIN_CORNER_SPEED: f32 = 55.0;
pub const MAX_TARGET_SPEED: f32 = 220.0;

// verge avoidance
pub const VERGE_MARGIN_FRACTION: f32 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CornerType {
    Straight,
    Gentle,
    Tight,
}

pub fn classify_corner(peak: f32) -> CornerType {
    if peak < CURV_STRAIGHT_MAX {
        CornerType::Straight
    } else if peak < CURV_GENTLE_MAX {
        CornerType::Gentle
    } else {
        CornerType::Tight
    }
}

fn is_jump(track: &Track, id: NodeId) -> bool {
    track.node(id).slope.abs() > JUMP_SLOPE_THRESHOLD
}

/// Largest per-node heading change over the next `count` links.
pub fn peak_curvature(track: &Track, start: NodeId, count: usize, skip_jumps: bool) -> f32 {
    let mut peak = 0.0f32;
    let mut node = start;
    let mut skip_left = 0;
    for _ in 0..count {
        let Some(next) = track.next(node) else { break };
        if skip_jumps {
            if is_jump(track, node) {
                skip_left = JUMP_LANDING_SKIP;
            }
            if skip_left > 0 {
                skip_left -= 1;
                node = next;
                continue;
            }
        }
        peak = peak.max(track.signed_delta(node).abs());
        node = next;
    }
    peak
}

/// Signed heading change with the largest magnitude over the next `count` links.
/// Positive means the dominant turn is to the right.
pub fn dominant_signed_delta(track: &Track, start: NodeId, count: usize) -> f32 {
    let mut dominant = 0.0f32;
    let mut node = start;
    for _ in 0..count {
        let Some(next) = track.next(node) else { break };
        let d = track.signed_delta(node);
        if d.abs() > dominant.abs() {
            dominant = d;
        }
        node = next;
    }
    dominant
}

/// First node after an upcoming jump's landing where the track turns noticeably.
pub fn find_post_jump_corner(track: &Track, start: NodeId) -> Option<NodeId> {
    let mut node = start;
    for _ in 0..JUMP_SCAN_WINDOW {
        let next = track.next(node)?;
        if is_jump(track, node) {
            let mut land = track.ahead(node, JUMP_LANDING_SKIP);
            for _ in 0..POST_JUMP_SEARCH {
                let after = track.next(land)?;
                if track.signed_delta(land).abs() >= POST_JUMP_CORNER_MIN {
                    return Some(land);
                }
                land = after;
            }
            return None;
        }
        node = next;
    }
    None
}

/// Speed target falling linearly from the max target to the corner minimum
/// between the full-speed and min-speed curvature thresholds.
pub fn target_speed_for_curvature(peak: f32, corner_speed_mult: f32) -> f32 {
    let min_speed = MIN_CORNER_SPEED * corner_speed_mult;
    let t = ((peak - PEAK_CURV_FULL_SPEED) / (PEAK_CURV_MIN_SPEED - PEAK_CURV_FULL_SPEED)).clamp(0.0, 1.0);
    MAX_TARGET_SPEED + (min_speed - MAX_TARGET_SPEED) * t
}

/// Steering lookahead: further when fast, shorter when the road ahead bends.
pub fn lookahead_nodes(track: &Track, start: NodeId, speed: f32) -> usize {
    let peak = peak_curvature(track, start, MAX_LOOKAHEAD, true);
    let cap = (MAX_LOOKAHEAD as f32 - peak * 1.5).clamp(MIN_LOOKAHEAD as f32, MAX_LOOKAHEAD as f32);
    let look = (speed / SPEED_PER_LOOKAHEAD_NODE).clamp(MIN_LOOKAHEAD as f32, cap);
    look as usize
}

/// Lateral limits (left negative, right positive) the car should stay within.
pub fn verge_limits(track: &Track, id: NodeId) -> (f32, f32) {
    let node = track.node(id);
    let left = node.distance_to_left_verge * (1.0 - VERGE_MARGIN_FRACTION);
    let right = node.distance_to_right_verge * (1.0 - VERGE_MARGIN_FRACTION);
    (-left, right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::TrackBuilder;

    #[test]
    fn classification_thresholds() {
        assert_eq!(classify_corner(1.0), CornerType::Straight);
        assert_eq!(classify_corner(3.0), CornerType::Gentle);
        assert_eq!(classify_corner(5.0), CornerType::Tight);
    }

    #[test]
    fn scans_stop_at_the_end_of_short_tracks() {
        let track = TrackBuilder::new(4.0).straight(3).corner(3, 6.0).build(false).unwrap();
        assert!((peak_curvature(&track, NodeId(0), 500, false) - 6.0).abs() < 1e-3);
        assert!(dominant_signed_delta(&track, NodeId(0), 500) > 5.9);
        assert_eq!(peak_curvature(&track, NodeId(5), 60, true), 0.0);
    }

    #[test]
    fn left_turns_are_negative() {
        let track = TrackBuilder::new(4.0).straight(3).corner(5, -4.0).straight(3).build(false).unwrap();
        assert!((dominant_signed_delta(&track, NodeId(0), 30) + 4.0).abs() < 1e-3);
    }

    #[test]
    fn jump_scan_skips_the_landing() {
        // lip, then a kink inside the landing zone, then a real corner
        let track = TrackBuilder::new(4.0)
            .straight(2)
            .crest(3, 3.0)
            .corner(2, 10.0)
            .straight(15)
            .corner(4, 3.0)
            .straight(10)
            .build(false)
            .unwrap();
        let with_skip = peak_curvature(&track, NodeId(0), 12, true);
        let without = peak_curvature(&track, NodeId(0), 12, false);
        assert!(without >= 10.0 - 1e-3);
        assert!(with_skip < 10.0);

        let corner = find_post_jump_corner(&track, NodeId(0)).unwrap();
        assert!(track.signed_delta(corner) >= POST_JUMP_CORNER_MIN);
    }

    #[test]
    fn target_speed_ramps_between_thresholds() {
        assert_eq!(target_speed_for_curvature(1.0, 1.0), MAX_TARGET_SPEED);
        assert_eq!(target_speed_for_curvature(20.0, 1.0), MIN_CORNER_SPEED);
        let mid = target_speed_for_curvature(5.0, 1.0);
        assert!(mid < MAX_TARGET_SPEED && mid > MIN_CORNER_SPEED);
        assert!(target_speed_for_curvature(20.0, 0.85) < MIN_CORNER_SPEED);
    }

    #[test]
    fn lookahead_grows_with_speed_and_shrinks_in_bends() {
        let straight = TrackBuilder::new(4.0).straight(40).build(false).unwrap();
        assert_eq!(lookahead_nodes(&straight, NodeId(0), 0.0), MIN_LOOKAHEAD);
        assert_eq!(lookahead_nodes(&straight, NodeId(0), 400.0), MAX_LOOKAHEAD);

        let bendy = TrackBuilder::new(4.0).corner(40, 8.0).build(false).unwrap();
        assert!(lookahead_nodes(&bendy, NodeId(0), 400.0) <= 3);
    }
}
