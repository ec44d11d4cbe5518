// ==============================================================================
// track.rs — TRACK TOPOLOGY (READ-ONLY NODE CHAIN)
// ------------------------------------------------------------------------------
// Ordered node sequence supplied by the track-loading side. Vehicles and AI hold
// NodeId handles into the node array and never own nodes.
//
// Conventions:
// - orientation is in degrees; increasing orientation turns right
// - forward = (sin θ, 0, cos θ), right = (cos θ, 0, -sin θ)
// - lateral offsets are positive to the right of the node centre
// - next() returns None at the end of an open track; closed circuits wrap
// ==============================================================================

use nalgebra::Vector3;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TrackError {
    #[error("a track needs at least 2 nodes, got {0}")]
    TooShort(usize),
    #[error("node {index} has a non-positive verge distance")]
    BadVerge { index: usize },
}

/// Non-owning handle into `Track::nodes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone)]
pub struct TrackNode {
    pub position: Vector3<f32>,
    pub orientation: f32,            // degrees
    pub slope: f32,                  // percent grade to the next node
    pub distance_to_left_verge: f32, // meters
    pub distance_to_right_verge: f32,
    pub index: usize,
}

impl TrackNode {
    pub fn forward(&self) -> Vector3<f32> {
        let rad = self.orientation.to_radians();
        Vector3::new(rad.sin(), 0.0, rad.cos())
    }

    pub fn right(&self) -> Vector3<f32> {
        let rad = self.orientation.to_radians();
        Vector3::new(rad.cos(), 0.0, -rad.sin())
    }

    pub fn left_verge(&self) -> Vector3<f32> {
        self.position - self.right() * self.distance_to_left_verge
    }

    pub fn right_verge(&self) -> Vector3<f32> {
        self.position + self.right() * self.distance_to_right_verge
    }

    /// Signed distance of `point` from the node centre line, positive to the right.
    pub fn lateral_offset(&self, point: &Vector3<f32>) -> f32 {
        (point - self.position).dot(&self.right())
    }
}

/// Result of walking a handle along the chain to the segment containing a point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Located {
    pub node: NodeId,
    pub fraction: f32,
    /// +1 when the walk crossed the start line forwards, -1 backwards.
    pub wrapped: i32,
}

#[derive(Debug, Clone)]
pub struct Track {
    nodes: Vec<TrackNode>,
    closed: bool,
}

impl Track {
    pub fn new(mut nodes: Vec<TrackNode>, closed: bool) -> Result<Self, TrackError> {
        if nodes.len() < 2 {
            return Err(TrackError::TooShort(nodes.len()));
        }
        for (i, node) in nodes.iter_mut().enumerate() {
            if node.distance_to_left_verge <= 0.0 || node.distance_to_right_verge <= 0.0 {
                return Err(TrackError::BadVerge { index: i });
            }
            node.index = i;
        }
        Ok(Self { nodes, closed })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn node(&self, id: NodeId) -> &TrackNode {
        &self.nodes[id.0]
    }

    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        if id.0 + 1 < self.nodes.len() {
            Some(NodeId(id.0 + 1))
        } else if self.closed {
            Some(NodeId(0))
        } else {
            None
        }
    }

    pub fn prev(&self, id: NodeId) -> Option<NodeId> {
        if id.0 > 0 {
            Some(NodeId(id.0 - 1))
        } else if self.closed {
            Some(NodeId(self.nodes.len() - 1))
        } else {
            None
        }
    }

    /// Node `count` links ahead, stopping at the last available node.
    pub fn ahead(&self, id: NodeId, count: usize) -> NodeId {
        let mut n = id;
        for _ in 0..count {
            match self.next(n) {
                Some(next) => n = next,
                None => break,
            }
        }
        n
    }

    /// Number of forward links available from `id`, capped at `limit`.
    pub fn links_ahead(&self, id: NodeId, limit: usize) -> usize {
        if self.closed {
            return limit;
        }
        (self.nodes.len() - 1 - id.0).min(limit)
    }

    /// Signed heading change (degrees, -180..180) from `id` to its successor.
    pub fn signed_delta(&self, id: NodeId) -> f32 {
        match self.next(id) {
            Some(next) => normalise_delta(self.node(next).orientation - self.node(id).orientation),
            None => 0.0,
        }
    }

    /// Walks `from` along the chain until `point` falls inside the segment
    /// starting at the returned node.
    pub fn locate(&self, from: NodeId, point: &Vector3<f32>) -> Located {
        let mut node = from;
        let mut wrapped = 0;
        let mut t = self.segment_fraction(node, point);

        if t >= 1.0 {
            for _ in 0..self.nodes.len() {
                let Some(next) = self.next(node) else { break };
                if next.0 < node.0 {
                    wrapped += 1;
                }
                node = next;
                t = self.segment_fraction(node, point);
                if t < 1.0 {
                    break;
                }
            }
        } else if t < 0.0 {
            for _ in 0..self.nodes.len() {
                let Some(prev) = self.prev(node) else { break };
                if prev.0 > node.0 {
                    wrapped -= 1;
                }
                node = prev;
                t = self.segment_fraction(node, point);
                if t >= 0.0 {
                    break;
                }
            }
        }

        Located {
            node,
            fraction: t.clamp(0.0, 0.999),
            wrapped,
        }
    }

    /// Ground height under a point `fraction` of the way along the segment at `id`.
    pub fn surface_height(&self, id: NodeId, fraction: f32) -> f32 {
        let y0 = self.node(id).position.y;
        match self.next(id) {
            Some(next) => y0 + (self.node(next).position.y - y0) * fraction.clamp(0.0, 1.0),
            None => y0,
        }
    }

    // Fraction along the horizontal projection of the segment starting at `id`.
    fn segment_fraction(&self, id: NodeId, point: &Vector3<f32>) -> f32 {
        let Some(next) = self.next(id) else { return 0.0 };
        let a = self.node(id).position;
        let b = self.node(next).position;
        let seg = Vector3::new(b.x - a.x, 0.0, b.z - a.z);
        let len2 = seg.norm_squared();
        if len2 < 1e-6 {
            return 1.0;
        }
        Vector3::new(point.x - a.x, 0.0, point.z - a.z).dot(&seg) / len2
    }
}

pub fn normalise_delta(mut d: f32) -> f32 {
    while d > 180.0 {
        d -= 360.0;
    }
    while d < -180.0 {
        d += 360.0;
    }
    d
}

// ==============================================================================
// TrackBuilder — procedural layouts for the demo circuit and tests
// ==============================================================================

pub struct TrackBuilder {
    nodes: Vec<TrackNode>,
    spacing: f32,
    heading: f32,
    position: Vector3<f32>,
    left: f32,
    right: f32,
}

impl TrackBuilder {
    pub fn new(spacing: f32) -> Self {
        Self {
            nodes: Vec::new(),
            spacing,
            heading: 0.0,
            position: Vector3::zeros(),
            left: 6.0,
            right: 6.0,
        }
    }

    pub fn verges(mut self, left: f32, right: f32) -> Self {
        self.left = left;
        self.right = right;
        self
    }

    pub fn straight(self, count: usize) -> Self {
        self.corner(count, 0.0)
    }

    /// `degrees_per_node` > 0 turns right.
    pub fn corner(mut self, count: usize, degrees_per_node: f32) -> Self {
        for _ in 0..count {
            self.push(0.0);
            self.heading += degrees_per_node;
        }
        self
    }

    /// Rises by `height` over `rise` nodes and drops back down at the lip.
    pub fn crest(mut self, rise: usize, height: f32) -> Self {
        let step = height / rise.max(1) as f32;
        for _ in 0..rise {
            self.push(step);
        }
        self.push(-height);
        self
    }

    pub fn build(self, closed: bool) -> Result<Track, TrackError> {
        let mut nodes = self.nodes;
        let n = nodes.len();
        for i in 0..n {
            let j = if i + 1 < n {
                i + 1
            } else if closed {
                0
            } else {
                i
            };
            let rise = nodes[j].position.y - nodes[i].position.y;
            nodes[i].slope = rise / self.spacing.max(1e-3) * 100.0;
        }
        Track::new(nodes, closed)
    }

    fn push(&mut self, rise_after: f32) {
        let index = self.nodes.len();
        self.nodes.push(TrackNode {
            position: self.position,
            orientation: self.heading,
            slope: 0.0,
            distance_to_left_verge: self.left,
            distance_to_right_verge: self.right,
            index,
        });
        let rad = self.heading.to_radians();
        self.position += Vector3::new(rad.sin(), 0.0, rad.cos()) * self.spacing;
        self.position.y += rise_after;
    }
}

/// Closed oval: two straights joined by two 180° right-handers.
pub fn oval(spacing: f32, straight: usize, corner_nodes: usize) -> Result<Track, TrackError> {
    let per_node = 180.0 / corner_nodes.max(1) as f32;
    TrackBuilder::new(spacing)
        .straight(straight)
        .corner(corner_nodes, per_node)
        .straight(straight)
        .corner(corner_nodes, per_node)
        .build(true)
}
