//! Corridor routing: a minimum spanning tree over room centres, optional loop
//! edges, and a direct pass between slot neighbours.

use std::cmp::Ordering;
use std::collections::HashSet;

use slotmap::SecondaryMap;
use tracing::debug;

use crate::config::ConnectionSection;
use crate::grid::Grid;
use crate::rng::RandomSource;
use crate::types::{Pos, Tile};

use super::kdtree::KdTree;
use super::model::{Room, RoomGrid, RoomId, Rooms, SpanKind, VerticalSpan};

/// Ladders and ropes collected for the deferred commit, plus edge counts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionOutput {
    pub spans: Vec<VerticalSpan>,
    pub mst_edges: usize,
    pub loop_edges: usize,
    pub direct_connections: usize,
}

/// An L-shaped corridor between two connect points: a horizontal run along the
/// source room's floor, then a vertical run down or up the target's centre.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CorridorTask {
    /// Bottom row of the horizontal run.
    pub row: usize,
    pub x_from: usize,
    pub x_to: usize,
    /// Left column of the vertical run.
    pub column: usize,
    pub y_from: usize,
    pub y_to: usize,
    pub climb: Option<VerticalSpan>,
}

impl CorridorTask {
    pub fn between<R: RandomSource>(from: &Room, to: &Room, width: usize, rng: &mut R) -> Self {
        let a = from.connect_point();
        let b = to.connect_point();
        let (ax, ay) = (a.x as usize, a.y as usize);
        let (bx, by) = (b.x as usize, b.y as usize);
        let top = ay.min(by);
        let bottom = ay.max(by);

        let climb = (bottom - top > width).then(|| VerticalSpan {
            x: bx,
            y1: top,
            y2: bottom,
            kind: if rng.coin() { SpanKind::Ladder } else { SpanKind::Rope },
        });
        Self {
            row: ay,
            x_from: ax.min(bx),
            x_to: ax.max(bx) + width - 1,
            column: bx,
            y_from: top.saturating_sub(width - 1),
            y_to: bottom,
            climb,
        }
    }

    pub fn carve(&self, tiles: &mut Grid<Tile>, width: usize) {
        carve_rect(tiles, self.x_from, self.row.saturating_sub(width - 1), self.x_to, self.row);
        carve_rect(tiles, self.column, self.y_from, self.column + width - 1, self.y_to);
    }
}

/// Writes EMPTY over an inclusive rectangle, clipped so the border survives.
pub(crate) fn carve_rect(tiles: &mut Grid<Tile>, x0: usize, y0: usize, x1: usize, y1: usize) {
    let width = tiles.width();
    let height = tiles.height();
    if width < 3 || height < 3 {
        return;
    }
    let x0 = x0.max(1);
    let y0 = y0.max(1);
    let x1 = x1.min(width - 2);
    let y1 = y1.min(height - 2);
    for x in x0..=x1 {
        for y in y0..=y1 {
            tiles.set(x, y, Tile::Empty);
        }
    }
}

/// Union-find with path compression and union by rank.
#[derive(Debug)]
struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self { parent: (0..len).collect(), rank: vec![0; len] }
    }

    fn find(&mut self, item: usize) -> usize {
        let mut root = item;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut current = item;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            Ordering::Less => self.parent[ra] = rb,
            Ordering::Greater => self.parent[rb] = ra,
            Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
        true
    }
}

fn manhattan(a: Pos, b: Pos) -> u32 {
    a.x.abs_diff(b.x) + a.y.abs_diff(b.y)
}

/// Kruskal over the complete room graph. Returns ordinal pairs into `ids`.
pub fn minimum_spanning_edges(rooms: &Rooms, ids: &[RoomId]) -> Vec<(usize, usize)> {
    let centres: Vec<Pos> = ids.iter().map(|&id| rooms[id].center()).collect();
    let mut edges = Vec::with_capacity(ids.len() * ids.len().saturating_sub(1) / 2);
    for i in 0..ids.len() {
        for j in (i + 1)..ids.len() {
            edges.push((manhattan(centres[i], centres[j]), i, j));
        }
    }
    edges.sort_unstable();

    let mut sets = DisjointSet::new(ids.len());
    let mut tree = Vec::with_capacity(ids.len().saturating_sub(1));
    for (_, i, j) in edges {
        if sets.union(i, j) {
            tree.push((i, j));
            if tree.len() + 1 == ids.len() {
                break;
            }
        }
    }
    tree
}

/// Connects every room in `room_grid`, carving EMPTY corridors into `tiles`.
/// Ladders and ropes are only collected.
pub fn connect_rooms<R: RandomSource>(
    rooms: &Rooms,
    room_grid: &RoomGrid,
    section: &ConnectionSection,
    tiles: &mut Grid<Tile>,
    rng: &mut R,
) -> ConnectionOutput {
    let ids = room_grid.unique_rooms();
    let mut output = ConnectionOutput::default();
    if ids.len() < 2 {
        return output;
    }
    let width = section.corridor_width;

    let mut neighbours: SecondaryMap<RoomId, Vec<RoomId>> = SecondaryMap::new();
    for &id in &ids {
        neighbours.insert(id, Vec::new());
    }
    for (i, j) in minimum_spanning_edges(rooms, &ids) {
        let (a, b) = (ids[i], ids[j]);
        let task = CorridorTask::between(&rooms[a], &rooms[b], width, rng);
        task.carve(tiles, width);
        output.spans.extend(task.climb);
        output.mst_edges += 1;
        if let Some(list) = neighbours.get_mut(a) {
            list.push(b);
        }
        if let Some(list) = neighbours.get_mut(b) {
            list.push(a);
        }
    }

    if section.loop_chance > 0.0 {
        let points: Vec<(Pos, RoomId)> = ids.iter().map(|&id| (rooms[id].center(), id)).collect();
        let tree = KdTree::build(&points);
        for &id in &ids {
            if !rng.chance(section.loop_chance) {
                continue;
            }
            let linked = neighbours.get(id).cloned().unwrap_or_default();
            let nearest =
                tree.nearest(rooms[id].center(), |other| other != id && !linked.contains(&other));
            let Some((other, _)) = nearest else {
                continue;
            };
            let task = CorridorTask::between(&rooms[id], &rooms[other], width, rng);
            task.carve(tiles, width);
            output.spans.extend(task.climb);
            output.loop_edges += 1;
            if let Some(list) = neighbours.get_mut(id) {
                list.push(other);
            }
            if let Some(list) = neighbours.get_mut(other) {
                list.push(id);
            }
        }
    }

    if section.direct_connections {
        direct_pass(rooms, room_grid, section, tiles, rng, &mut output);
    }
    debug!(
        rooms = ids.len(),
        mst = output.mst_edges,
        loops = output.loop_edges,
        direct = output.direct_connections,
        spans = output.spans.len(),
        "rooms connected"
    );
    output
}

fn direct_pass<R: RandomSource>(
    rooms: &Rooms,
    room_grid: &RoomGrid,
    section: &ConnectionSection,
    tiles: &mut Grid<Tile>,
    rng: &mut R,
    output: &mut ConnectionOutput,
) {
    let mut seen: HashSet<(RoomId, RoomId)> = HashSet::new();
    for row in 0..room_grid.rows() {
        for col in 0..room_grid.cols() {
            let Some(here) = room_grid.get(col, row) else {
                continue;
            };
            let right = room_grid.get(col + 1, row).filter(|&other| other != here);
            let below = room_grid.get(col, row + 1).filter(|&other| other != here);

            if let Some(other) = right
                && seen.insert((here, other))
                && !rng.chance(section.direct_skip_chance)
                && carve_door(&rooms[here], &rooms[other], section.door_height, tiles)
            {
                output.direct_connections += 1;
            }
            if let Some(other) = below
                && seen.insert((here, other))
                && !rng.chance(section.direct_skip_chance)
                && let Some(span) =
                    carve_hallway(&rooms[here], &rooms[other], section.hall_width, tiles, rng)
            {
                output.spans.push(span);
                output.direct_connections += 1;
            }
        }
    }
}

/// Door between side-by-side rooms, bottom-aligned to the floor both share.
fn carve_door(left: &Room, right: &Room, door_height: usize, tiles: &mut Grid<Tile>) -> bool {
    if right.start_x <= left.end_x + 1 {
        return false;
    }
    let floor = left.end_y.min(right.end_y);
    let Some(top) = (floor + 1).checked_sub(door_height) else {
        return false;
    };
    if top < left.start_y.max(right.start_y) {
        return false;
    }
    carve_rect(tiles, left.end_x + 1, top, right.start_x - 1, floor);
    true
}

/// Vertical hallway through the gap between stacked rooms, with a climbable
/// span from the upper floor down to the lower floor.
fn carve_hallway<R: RandomSource>(
    upper: &Room,
    lower: &Room,
    hall_width: usize,
    tiles: &mut Grid<Tile>,
    rng: &mut R,
) -> Option<VerticalSpan> {
    if lower.start_y <= upper.end_y + 1 {
        return None;
    }
    let left = upper.start_x.max(lower.start_x);
    let right = upper.end_x.min(lower.end_x);
    if right < left || right - left + 1 < hall_width {
        return None;
    }
    let centre = (left + right) / 2;
    let x0 = centre.saturating_sub(hall_width / 2).max(left);
    let x1 = (x0 + hall_width - 1).min(right);
    carve_rect(tiles, x0, upper.end_y + 1, x1, lower.start_y - 1);
    Some(VerticalSpan {
        x: x0,
        y1: upper.end_y,
        y2: lower.end_y,
        kind: if rng.coin() { SpanKind::Ladder } else { SpanKind::Rope },
    })
}
