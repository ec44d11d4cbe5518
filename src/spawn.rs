use serde::Serialize;

use crate::track::{NodeId, Track};

const ROW_GAP_NODES: usize = 2;
const COLUMN_OFFSET: f32 = 2.5; // m either side of the centre line

// ---------------------------------------------
// GRID COLUMN
// ---------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Column {
    Left,
    Right,
}

// ---------------------------------------------
// SPAWN RESULT RETURNED TO THE RACE SESSION
// ---------------------------------------------
#[derive(Debug, Clone, Serialize)]
pub struct GridSlot {
    pub driver_id: usize,
    pub grid_position: usize, // 0 = pole
    pub column: Column,
    pub node: NodeId,
    pub lateral: f32,
    pub position: [f32; 3],
}

// ---------------------------------------------
// SPAWN MANAGER FOR ONE STARTING GRID
// ---------------------------------------------
// Two columns, rows ROW_GAP_NODES apart. The last possible row sits on the
// start node so nobody crosses the line before the race starts.
#[derive(Debug)]
pub struct SpawnManager {
    max_drivers: usize,
    slots: Vec<Option<usize>>, // driver id per grid position
}

impl SpawnManager {
    pub fn new(max_drivers: usize) -> Self {
        Self {
            max_drivers: max_drivers.max(1),
            slots: vec![None; max_drivers.max(1)],
        }
    }

    pub fn allocated(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Frees the slot held by `driver_id` so a later joiner can take it.
    pub fn release(&mut self, driver_id: usize) -> bool {
        match self.slots.iter_mut().find(|s| **s == Some(driver_id)) {
            Some(slot) => {
                *slot = None;
                true
            }
            None => false,
        }
    }

    fn rows(&self) -> usize {
        self.max_drivers.div_ceil(2)
    }

    // ---------------------------------------------------------
    // Column alternates left/right down the grid
    // ---------------------------------------------------------
    fn choose_column(grid_position: usize) -> Column {
        if grid_position % 2 == 0 {
            Column::Left
        } else {
            Column::Right
        }
    }

    // ---------------------------------------------------------
    // Lowest free slot, or None once the grid is full
    // ---------------------------------------------------------
    pub fn allocate_slot(&mut self, track: &Track, driver_id: usize) -> Option<GridSlot> {
        let grid_position = self.slots.iter().position(|s| s.is_none())?;
        self.slots[grid_position] = Some(driver_id);

        let row = grid_position / 2;
        let pole_node = (self.rows() - 1) * ROW_GAP_NODES;
        let node_index = (pole_node - row * ROW_GAP_NODES).min(track.len().saturating_sub(2));
        let node = NodeId(node_index);

        let column = Self::choose_column(grid_position);
        let n = track.node(node);
        let lateral = match column {
            Column::Left => -COLUMN_OFFSET.min(n.distance_to_left_verge * 0.5),
            Column::Right => COLUMN_OFFSET.min(n.distance_to_right_verge * 0.5),
        };
        let p = n.position + n.right() * lateral;

        Some(GridSlot {
            driver_id,
            grid_position,
            column,
            node,
            lateral,
            position: [p.x, p.y, p.z],
        })
    }
}
