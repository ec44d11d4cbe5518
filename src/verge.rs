// ==============================================================================
// verge.rs — COLLISION / VERGE RESOLVER
// ------------------------------------------------------------------------------
// Reads a vehicle's freshly integrated pose against the track and reports:
// - how many wheel sample points sit outside the verge (drag + skid input)
// - fence contact when the body centre is past the verge by more than the
//   fence margin: a push-back offset, a speed scrub and a rotation correction
//   (degrees, positive = right) that turns the nose back along the track
//
// The resolver never mutates the vehicle. The vehicle applies the result and
// queues the rotation, which it starts draining on the next frame.
// ==============================================================================

use nalgebra::Vector3;

use crate::dynamics::types::{signed_yaw_angle, VehicleSpec, WheelId};
use crate::track::{NodeId, Track};

pub const FENCE_MARGIN: f32 = 0.5;     // m past the verge before the body hits
pub const FENCE_SCRUB: f32 = 0.85;     // speed multiplier on contact
const PUSH_INSIDE: f32 = 0.25;         // m inside the verge after push-back
const DEFLECT_DEGREES: f32 = 5.0;      // extra turn away from the fence

/// Segment-local frame at a point `fraction` along the segment starting at `node`.
#[derive(Debug, Clone, Copy)]
pub struct VergeFrame {
    pub origin: Vector3<f32>,
    pub forward: Vector3<f32>,
    pub right: Vector3<f32>,
    pub left_verge: f32,
    pub right_verge: f32,
}

impl VergeFrame {
    pub fn at(track: &Track, node: NodeId, fraction: f32) -> Self {
        let a = track.node(node);
        let (forward, left, right) = match track.next(node) {
            Some(next) => {
                let b = track.node(next);
                let seg = Vector3::new(b.position.x - a.position.x, 0.0, b.position.z - a.position.z);
                let forward = if seg.norm_squared() > 1e-8 { seg.normalize() } else { a.forward() };
                let t = fraction.clamp(0.0, 1.0);
                (
                    forward,
                    a.distance_to_left_verge + (b.distance_to_left_verge - a.distance_to_left_verge) * t,
                    a.distance_to_right_verge + (b.distance_to_right_verge - a.distance_to_right_verge) * t,
                )
            }
            None => (a.forward(), a.distance_to_left_verge, a.distance_to_right_verge),
        };
        Self {
            origin: a.position,
            forward,
            right: Vector3::new(forward.z, 0.0, -forward.x),
            left_verge: left,
            right_verge: right,
        }
    }

    /// Signed lateral offset of `point`, positive to the right.
    pub fn lateral(&self, point: &Vector3<f32>) -> f32 {
        let d = point - self.origin;
        d.x * self.right.x + d.z * self.right.z
    }

    pub fn is_outside(&self, point: &Vector3<f32>) -> bool {
        let lat = self.lateral(point);
        lat > self.right_verge || lat < -self.left_verge
    }
}

/// World-space contact points in `WheelId::ALL` order.
pub fn wheel_points(position: &Vector3<f32>, direction: &Vector3<f32>, spec: &VehicleSpec) -> [Vector3<f32>; 4] {
    let fwd = direction * (spec.wheelbase * 0.5);
    let right = Vector3::new(direction.z, 0.0, -direction.x) * (spec.track_width * 0.5);
    WheelId::ALL.map(|id| {
        let along = if id.is_front() { fwd } else { -fwd };
        let side = if id.is_left() { -right } else { right };
        position + along + side
    })
}

pub fn wheels_outside_verge(frame: &VergeFrame, points: &[Vector3<f32>; 4]) -> u32 {
    points.iter().filter(|p| frame.is_outside(p)).count() as u32
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FenceContact {
    pub push_back: Vector3<f32>,
    pub speed_scale: f32,
    /// Rotation to queue, or None when the nose already points back inside.
    pub rotation_degrees: Option<f32>,
}

/// Fence test for the body centre.
pub fn check_fence(frame: &VergeFrame, position: &Vector3<f32>, direction: &Vector3<f32>) -> Option<FenceContact> {
    let lat = frame.lateral(position);
    let (side, excess) = if lat > frame.right_verge + FENCE_MARGIN {
        (1.0, lat - (frame.right_verge - PUSH_INSIDE))
    } else if lat < -(frame.left_verge + FENCE_MARGIN) {
        (-1.0, -(lat + frame.left_verge - PUSH_INSIDE))
    } else {
        return None;
    };

    // heading relative to the track, positive = pointing right
    let heading = signed_yaw_angle(&frame.forward, direction);
    let rotation_degrees = if heading * side > 0.0 {
        Some(-heading.to_degrees() - side * DEFLECT_DEGREES)
    } else {
        None
    };

    Some(FenceContact {
        push_back: -frame.right * (side * excess),
        speed_scale: FENCE_SCRUB,
        rotation_degrees,
    })
}
