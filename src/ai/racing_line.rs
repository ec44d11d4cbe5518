// ==============================================================================
// racing_line.rs — RACING PHASE + RACING-LINE FRACTION
// ------------------------------------------------------------------------------
// fraction: 0 = left verge, 1 = right verge of the steering target node.
//
// Phase machine, re-evaluated every frame:
// - Straight/Gentle road ahead           -> Straight (fraction eases to lane base)
// - near peak ≥ 70 % of far peak         -> Apex     (bias toward the inside)
// - mid peak  ≥ 50 % of far peak         -> Approach (bias toward the outside)
// - otherwise                            -> Exit     (bias toward the outside)
//
// A phase change restarts a 0→1 blend; the biased target is blended in by it and
// the smoothed fraction chases the target exponentially, so it never snaps.
// ==============================================================================

use serde::Serialize;

use crate::ai::lookahead::{self, CornerType};
use crate::track::{NodeId, Track};

pub const MIN_VIRTUAL_LANE: i32 = 1;
pub const MAX_VIRTUAL_LANE: i32 = 3;

pub const RACING_LINE_SCAN_NODES: usize = 30;
pub const PHASE_BLEND_NODES: usize = 7;
pub const APPROACH_OUTSIDE_BIAS: f32 = 0.20;
pub const EXIT_OUTSIDE_BIAS: f32 = 0.18;
pub const APEX_INSIDE_BIAS: f32 = 0.22;
pub const APEX_VERGE_EXTRA_BIAS: f32 = 0.05;

pub const JUMP_BIAS_MAX: f32 = 0.15;
pub const JUMP_BIAS_DELTA_REF: f32 = 8.0;

pub const MIN_FRACTION: f32 = 0.05;
pub const MAX_FRACTION: f32 = 0.95;

const STRAIGHT_EASE_RATE: f32 = 2.5;
const CORNER_EASE_RATE: f32 = 3.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum RacingPhase {
    #[default]
    Straight,
    Approach,
    Apex,
    Exit,
}

/// Lane base fraction: lane 1 sits left of centre, lane 3 right of it.
pub fn base_fraction(lane: i32) -> f32 {
    let lane = lane.clamp(MIN_VIRTUAL_LANE, MAX_VIRTUAL_LANE);
    0.35 + (lane - MIN_VIRTUAL_LANE) as f32 * 0.15
}

/// Target fraction for a phase, blended in by `blend` (0..1).
pub fn racing_line_fraction(
    base: f32,
    corner: CornerType,
    signed_delta: f32,
    phase: RacingPhase,
    blend: f32,
    allow_verge_apex: bool,
) -> f32 {
    if corner != CornerType::Tight {
        return base;
    }
    // inside of a right turn is the right verge
    let apex_side = if signed_delta > 0.0 { 1.0 } else { -1.0 };
    let apex_bias = if allow_verge_apex {
        APEX_INSIDE_BIAS + APEX_VERGE_EXTRA_BIAS
    } else {
        APEX_INSIDE_BIAS
    };
    let target = match phase {
        RacingPhase::Approach => base - apex_side * APPROACH_OUTSIDE_BIAS,
        RacingPhase::Apex => base + apex_side * apex_bias,
        RacingPhase::Exit => base - apex_side * EXIT_OUTSIDE_BIAS,
        RacingPhase::Straight => base,
    };
    let blend = blend.clamp(0.0, 1.0);
    (base + (target - base) * blend).clamp(MIN_FRACTION, MAX_FRACTION)
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RacingLine {
    pub phase: RacingPhase,
    pub blend: f32,
    pub signed_corner_delta: f32,
    pub apex_allow_verge: bool,
    pub fraction: f32,
}

impl RacingLine {
    pub fn new(lane: i32) -> Self {
        Self {
            phase: RacingPhase::Straight,
            blend: 0.0,
            signed_corner_delta: 0.0,
            apex_allow_verge: false,
            fraction: base_fraction(lane),
        }
    }

    /// True when at the apex of a corner tight enough to run onto the verge.
    pub fn at_tight_apex(&self) -> bool {
        self.phase == RacingPhase::Apex && self.apex_allow_verge
    }

    pub fn update(&mut self, track: &Track, current: NodeId, lane: i32, dt: f32) {
        let base = base_fraction(lane);
        let peak_ahead = lookahead::peak_curvature(track, current, RACING_LINE_SCAN_NODES, true);
        let corner = lookahead::classify_corner(peak_ahead);

        if corner != CornerType::Tight {
            self.phase = RacingPhase::Straight;
            self.blend = 0.0;
            self.apex_allow_verge = false;
            self.ease_toward(base, dt * STRAIGHT_EASE_RATE);
            return;
        }

        self.signed_corner_delta = lookahead::dominant_signed_delta(track, current, RACING_LINE_SCAN_NODES);
        self.apex_allow_verge = peak_ahead > lookahead::CURV_APEX_VERGE;

        let peak_near = lookahead::peak_curvature(track, current, PHASE_BLEND_NODES, true);
        let peak_mid = lookahead::peak_curvature(track, current, PHASE_BLEND_NODES * 2, true);

        let phase = if peak_near >= peak_ahead * 0.7 {
            RacingPhase::Apex
        } else if peak_mid >= peak_ahead * 0.5 {
            RacingPhase::Approach
        } else {
            RacingPhase::Exit
        };
        if phase != self.phase {
            self.phase = phase;
            self.blend = 0.0;
        }
        self.blend = (self.blend + dt / (PHASE_BLEND_NODES as f32 * 0.05)).min(1.0);

        let target = racing_line_fraction(
            base,
            corner,
            self.signed_corner_delta,
            self.phase,
            self.blend,
            self.apex_allow_verge,
        );
        self.ease_toward(target, dt * CORNER_EASE_RATE);
    }

    fn ease_toward(&mut self, target: f32, t: f32) {
        let t = t.clamp(0.0, 1.0);
        self.fraction = (self.fraction + (target - self.fraction) * t).clamp(MIN_FRACTION, MAX_FRACTION);
    }
}

/// Pre-jump positioning: shift toward the inside of the turn waiting after the landing.
pub fn jump_bias(track: &Track, current: NodeId, fraction: f32) -> f32 {
    let Some(corner) = lookahead::find_post_jump_corner(track, current) else {
        return fraction;
    };
    let delta = track.signed_delta(corner);
    let bias = (delta.abs() / JUMP_BIAS_DELTA_REF).clamp(0.0, 1.0) * JUMP_BIAS_MAX;
    let side = if delta > 0.0 { 1.0 } else { -1.0 };
    (fraction + side * bias * 0.5).clamp(MIN_FRACTION, MAX_FRACTION)
}
