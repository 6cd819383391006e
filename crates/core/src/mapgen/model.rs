//! Public data models for generated rooms, slot tables, and deferred spans.

use slotmap::{SlotMap, new_key_type};

use crate::types::Pos;

new_key_type! {
    pub struct RoomId;
}

/// Room arena. Keys stay valid for the arena's lifetime, so the slot table,
/// k-d tree, and spanning tree can all refer to rooms by id.
pub type Rooms = SlotMap<RoomId, Room>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RoomKind {
    Normal,
    Treasure,
    Shop,
}

/// Inclusive interior bounds of a room.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Room {
    pub start_x: usize,
    pub start_y: usize,
    pub end_x: usize,
    pub end_y: usize,
    pub kind: RoomKind,
}

impl Room {
    pub fn width(&self) -> usize {
        self.end_x - self.start_x + 1
    }

    pub fn height(&self) -> usize {
        self.end_y - self.start_y + 1
    }

    pub fn center(&self) -> Pos {
        Pos {
            y: (self.start_y + self.height() / 2) as i32,
            x: (self.start_x + self.width() / 2) as i32,
        }
    }

    /// Where corridors attach: the centre column of the bottom interior row.
    pub fn connect_point(&self) -> Pos {
        Pos { y: self.end_y as i32, x: self.center().x }
    }

    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.start_x && x <= self.end_x && y >= self.start_y && y <= self.end_y
    }
}

/// Slot table: one entry per coarse slot, several slots may share a hall.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoomGrid {
    cols: usize,
    rows: usize,
    slots: Vec<Option<RoomId>>,
}

impl RoomGrid {
    pub fn new(cols: usize, rows: usize) -> Self {
        Self { cols, rows, slots: vec![None; cols * rows] }
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn get(&self, col: usize, row: usize) -> Option<RoomId> {
        if col >= self.cols || row >= self.rows {
            return None;
        }
        self.slots[row * self.cols + col]
    }

    pub(crate) fn assign(&mut self, col: usize, row: usize, room: RoomId) {
        self.slots[row * self.cols + col] = Some(room);
    }

    pub fn is_free(&self, col: usize, row: usize) -> bool {
        col < self.cols && row < self.rows && self.slots[row * self.cols + col].is_none()
    }

    /// Distinct rooms in slot order (row-major, first occurrence wins).
    pub fn unique_rooms(&self) -> Vec<RoomId> {
        let mut seen = Vec::new();
        for room in self.slots.iter().flatten() {
            if !seen.contains(room) {
                seen.push(*room);
            }
        }
        seen
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpanKind {
    Ladder,
    Rope,
}

/// Vertical climbable span `y1..=y2` at column `x`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VerticalSpan {
    pub x: usize,
    pub y1: usize,
    pub y2: usize,
    pub kind: SpanKind,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GenerationStats {
    pub normal_rooms: usize,
    pub treasure_rooms: usize,
    pub shop_rooms: usize,
    pub halls: usize,
    pub mst_edges: usize,
    pub loop_edges: usize,
    pub direct_connections: usize,
    pub spans_committed: usize,
    pub spans_tiles_skipped: usize,
    pub chests_placed: usize,
    pub shops_placed: usize,
    pub lava_pockets: usize,
    pub content_spans: usize,
}

impl GenerationStats {
    pub fn room_count(&self) -> usize {
        self.normal_rooms + self.treasure_rooms + self.shop_rooms
    }
}
