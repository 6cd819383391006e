//! Room interiors: platforms, inner walls, shafts with ladders or ropes,
//! fixtures, and lava pockets.
//!
//! Every placement is best-effort. When a room is too small for a feature the
//! feature is skipped, so a sparse room is a normal outcome.

use std::ops::AddAssign;

use rayon::prelude::*;

use crate::config::ContentSection;
use crate::grid::Grid;
use crate::pool::WorkerPool;
use crate::rng::{GenRng, RandomSource, streams};
use crate::types::Tile;

use super::model::{Room, RoomId, RoomKind, Rooms};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContentStats {
    pub platforms: usize,
    pub inner_walls: usize,
    pub ladders: usize,
    pub ropes: usize,
    pub chests: usize,
    pub shops: usize,
    pub lava_pockets: usize,
}

impl AddAssign for ContentStats {
    fn add_assign(&mut self, other: Self) {
        self.platforms += other.platforms;
        self.inner_walls += other.inner_walls;
        self.ladders += other.ladders;
        self.ropes += other.ropes;
        self.chests += other.chests;
        self.shops += other.shops;
        self.lava_pockets += other.lava_pockets;
    }
}

/// Private copy of one room's footprint plus a one-tile read-only frame.
///
/// Only the room interior minus its outermost ring is writable, and only
/// EMPTY tiles accept a write.
#[derive(Clone, Debug)]
pub struct RoomCanvas {
    room: Room,
    x0: usize,
    y0: usize,
    tiles: Grid<Tile>,
}

impl RoomCanvas {
    pub fn capture(source: &Grid<Tile>, room: Room) -> Self {
        let x0 = room.start_x.saturating_sub(1);
        let y0 = room.start_y.saturating_sub(1);
        let x1 = (room.end_x + 1).min(source.width().saturating_sub(1));
        let y1 = (room.end_y + 1).min(source.height().saturating_sub(1));
        let mut tiles = Grid::new(x1 - x0 + 1, y1 - y0 + 1, Tile::Wall);
        for x in x0..=x1 {
            for y in y0..=y1 {
                tiles.set(x - x0, y - y0, source.at(x, y));
            }
        }
        Self { room, x0, y0, tiles }
    }

    pub fn room(&self) -> &Room {
        &self.room
    }

    /// Tile at world coordinates, `None` outside the captured frame.
    pub fn get(&self, x: usize, y: usize) -> Option<Tile> {
        if x < self.x0 || y < self.y0 {
            return None;
        }
        self.tiles.get((x - self.x0) as i32, (y - self.y0) as i32)
    }

    pub fn is_writable(&self, x: usize, y: usize) -> bool {
        x > self.room.start_x && x < self.room.end_x && y > self.room.start_y && y < self.room.end_y
    }

    pub fn is_open(&self, x: usize, y: usize) -> bool {
        self.is_writable(x, y) && self.get(x, y) == Some(Tile::Empty)
    }

    pub fn place(&mut self, x: usize, y: usize, tile: Tile) -> bool {
        if !self.is_open(x, y) {
            return false;
        }
        self.tiles.set(x - self.x0, y - self.y0, tile);
        true
    }

    pub fn write_back(&self, target: &mut Grid<Tile>) {
        for x in (self.room.start_x + 1)..self.room.end_x {
            for y in (self.room.start_y + 1)..self.room.end_y {
                target.set(x, y, self.tiles.at(x - self.x0, y - self.y0));
            }
        }
    }

    pub fn count(&self, tile: Tile) -> usize {
        self.tiles.count(|t| t == tile)
    }

    fn inner(&self) -> (usize, usize, usize, usize) {
        (self.room.start_x + 1, self.room.start_y + 1, self.room.end_x - 1, self.room.end_y - 1)
    }
}

#[derive(Debug)]
pub struct RoomContent {
    pub canvas: RoomCanvas,
    pub stats: ContentStats,
}

/// Populates every room on the pool, each with its own stream keyed by the
/// room's ordinal in `ids`. The returned canvases are in `ids` order.
pub fn generate_contents(
    rooms: &Rooms,
    ids: &[RoomId],
    tiles: &Grid<Tile>,
    section: &ContentSection,
    seed: u64,
    pool: &WorkerPool,
) -> Vec<RoomContent> {
    pool.install(|| {
        ids.par_iter()
            .enumerate()
            .map(|(ordinal, &id)| {
                let mut rng = GenRng::stream(seed, streams::CONTENT + ordinal as u64);
                let mut canvas = RoomCanvas::capture(tiles, rooms[id]);
                let stats = populate_room(&mut canvas, section, &mut rng);
                RoomContent { canvas, stats }
            })
            .collect()
    })
}

pub fn populate_room<R: RandomSource>(
    canvas: &mut RoomCanvas,
    section: &ContentSection,
    rng: &mut R,
) -> ContentStats {
    let mut stats = ContentStats::default();
    if canvas.room().width() < 5 || canvas.room().height() < 5 {
        return stats;
    }
    match canvas.room().kind {
        RoomKind::Normal => {
            lava_pockets(canvas, section, rng, &mut stats);
            central_platform(canvas, &mut stats);
            if rng.chance(section.inner_wall_chance) {
                inner_wall(canvas, rng, &mut stats);
            }
            let extra = rng.range_usize(1, 2);
            for _ in 0..extra {
                extra_platform(canvas, rng, &mut stats);
            }
            place_shaft_climbs(canvas, section, rng, &mut stats);
        }
        RoomKind::Treasure => {
            treasure(canvas, rng, &mut stats);
            lava_pockets(canvas, section, rng, &mut stats);
        }
        RoomKind::Shop => {
            shop(canvas, rng, &mut stats);
            lava_pockets(canvas, section, rng, &mut stats);
        }
    }
    stats
}

fn central_platform(canvas: &mut RoomCanvas, stats: &mut ContentStats) {
    let room = *canvas.room();
    let centre = room.center();
    let row = (room.start_y + room.height() / 2 + 1).min(room.end_y - 1);
    let length = (room.width() / 3).max(3);
    let left = (centre.x as usize).saturating_sub(length / 2);
    let mut placed = 0;
    for x in left..left + length {
        placed += usize::from(canvas.place(x, row, Tile::Platform));
    }
    if placed > 0 {
        stats.platforms += 1;
    }
}

fn inner_wall<R: RandomSource>(canvas: &mut RoomCanvas, rng: &mut R, stats: &mut ContentStats) {
    let room = *canvas.room();
    let (_, top, _, bottom) = canvas.inner();
    if room.start_x + 3 > room.end_x - 3 {
        return;
    }
    let x = rng.range_usize(room.start_x + 3, room.end_x - 3);
    let gap = rng.range_usize(3, 5);
    if top + 1 + gap > bottom {
        return;
    }
    let gap_top = rng.range_usize(top + 1, bottom - gap);
    for y in top..=bottom {
        if (gap_top..gap_top + gap).contains(&y) {
            continue;
        }
        canvas.place(x, y, Tile::Wall);
    }
    stats.inner_walls += 1;
}

fn extra_platform<R: RandomSource>(canvas: &mut RoomCanvas, rng: &mut R, stats: &mut ContentStats) {
    let (left, top, right, bottom) = canvas.inner();
    let span = right + 1 - left;
    if span < 3 || bottom < top + 2 {
        return;
    }
    let length = rng.range_usize(3, 6.min(span));
    let x0 = rng.range_usize(left, right + 1 - length);
    let y = rng.range_usize(top + 1, bottom - 1);
    let mut placed = 0;
    for x in x0..x0 + length {
        placed += usize::from(canvas.place(x, y, Tile::Platform));
    }
    if placed > 0 {
        stats.platforms += 1;
    }
}

/// Vertical run of writable EMPTY tiles whose full extent is capped above and
/// below by solid or platform tiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Shaft {
    x: usize,
    top: usize,
    bottom: usize,
}

impl Shaft {
    fn len(&self) -> usize {
        self.bottom - self.top + 1
    }
}

fn find_shafts(canvas: &RoomCanvas, min_len: usize) -> Vec<Shaft> {
    let room = *canvas.room();
    let (left, top, right, bottom) = canvas.inner();
    let mut shafts = Vec::new();
    for x in left..=right {
        let mut y = room.start_y;
        while y <= room.end_y {
            if canvas.get(x, y) != Some(Tile::Empty) {
                y += 1;
                continue;
            }
            let run_start = y;
            while y <= room.end_y && canvas.get(x, y) == Some(Tile::Empty) {
                y += 1;
            }
            let run_end = y - 1;
            let capped_above = canvas.get(x, run_start - 1).is_some_and(Tile::is_solid);
            let capped_below = canvas.get(x, run_end + 1).is_some_and(Tile::is_solid);
            if !(capped_above && capped_below) {
                continue;
            }
            let shaft = Shaft { x, top: run_start.max(top), bottom: run_end.min(bottom) };
            if shaft.bottom >= shaft.top && shaft.len() >= min_len {
                shafts.push(shaft);
            }
        }
    }
    shafts
}

fn place_shaft_climbs<R: RandomSource>(
    canvas: &mut RoomCanvas,
    section: &ContentSection,
    rng: &mut R,
    stats: &mut ContentStats,
) {
    let min_len = section.min_ladder_length.max(1);
    let mut shafts = find_shafts(canvas, min_len);
    if shafts.is_empty() {
        return;
    }
    rng.shuffle(&mut shafts);
    let wanted = rng.range_usize(1, 2);
    let mut columns: Vec<usize> = Vec::with_capacity(wanted);
    for shaft in shafts {
        if columns.len() == wanted {
            break;
        }
        if columns.iter().any(|&x| x.abs_diff(shaft.x) <= section.ladder_exclusion_radius) {
            continue;
        }
        let length = rng.range_usize(min_len, shaft.len());
        let offset = rng.range_usize(0, shaft.len() - length);
        let (tile, ladder) = if rng.coin() { (Tile::Ladder, true) } else { (Tile::Rope, false) };
        for y in shaft.top + offset..shaft.top + offset + length {
            canvas.place(shaft.x, y, tile);
        }
        columns.push(shaft.x);
        if ladder {
            stats.ladders += 1;
        } else {
            stats.ropes += 1;
        }
    }
}

fn chest_on_platform(canvas: &mut RoomCanvas, x: usize, y: usize) -> bool {
    if !canvas.is_open(x, y) || !canvas.is_open(x, y + 1) {
        return false;
    }
    canvas.place(x, y, Tile::Chest) && canvas.place(x, y + 1, Tile::Platform)
}

fn treasure<R: RandomSource>(canvas: &mut RoomCanvas, rng: &mut R, stats: &mut ContentStats) {
    let centre = canvas.room().center();
    if chest_on_platform(canvas, centre.x as usize, centre.y as usize) {
        stats.chests += 1;
    }
    let (left, top, right, bottom) = canvas.inner();
    let extra = rng.range_usize(0, 2);
    for _ in 0..extra {
        for _attempt in 0..4 {
            let x = rng.range_usize(left, right);
            let y = rng.range_usize(top, bottom - 1);
            if chest_on_platform(canvas, x, y) {
                stats.chests += 1;
                break;
            }
        }
    }
}

fn shop<R: RandomSource>(canvas: &mut RoomCanvas, rng: &mut R, stats: &mut ContentStats) {
    let centre = canvas.room().center();
    if canvas.place(centre.x as usize, centre.y as usize, Tile::Shop) {
        stats.shops += 1;
    }
    let (left, top, right, bottom) = canvas.inner();
    let extra = rng.range_usize(0, 2);
    for _ in 0..extra {
        for _attempt in 0..4 {
            let x = rng.range_usize(left, right);
            let y = rng.range_usize(top, bottom);
            if canvas.place(x, y, Tile::Shop) {
                stats.shops += 1;
                break;
            }
        }
    }
}

const POCKET_MARGIN: usize = 2;

/// Lava pockets: a `w x h` pool inside a PLATFORM container with walls on the
/// left and right, a floor, and an open top, kept two tiles off every edge.
///
/// Each room draws one or two pockets and rolls `lava_pocket_chance` per
/// pocket. While the room has no pocket yet, a miss on the random tries falls
/// back to the smallest container at the first open spot.
fn lava_pockets<R: RandomSource>(
    canvas: &mut RoomCanvas,
    section: &ContentSection,
    rng: &mut R,
    stats: &mut ContentStats,
) {
    let pockets = rng.range_usize(1, 2);
    let mut placed = 0;
    for _ in 0..pockets {
        if !rng.chance(section.lava_pocket_chance) {
            continue;
        }
        let mut done = false;
        for _attempt in 0..4 {
            let inner_w = rng.range_usize(3, 6);
            let inner_h = rng.range_usize(2, 3);
            let Some((x_max, y_max)) = pocket_origin_limits(canvas.room(), inner_w, inner_h) else {
                continue;
            };
            let (x_min, y_min) = pocket_origin_min(canvas.room());
            let x0 = rng.range_usize(x_min, x_max);
            let y0 = rng.range_usize(y_min, y_max);
            if pour_pocket(canvas, x0, y0, inner_w, inner_h) {
                done = true;
                break;
            }
        }
        if !done && placed == 0 {
            done = scan_for_pocket(canvas, 3, 2);
        }
        if done {
            placed += 1;
            stats.lava_pockets += 1;
        }
    }
}

fn pocket_origin_min(room: &Room) -> (usize, usize) {
    (room.start_x + POCKET_MARGIN, room.start_y + POCKET_MARGIN)
}

/// Largest container origin that keeps the margin, `None` when the room is
/// too small for this pocket size.
fn pocket_origin_limits(room: &Room, inner_w: usize, inner_h: usize) -> Option<(usize, usize)> {
    let (outer_w, outer_h) = (inner_w + 2, inner_h + 1);
    let (x_min, y_min) = pocket_origin_min(room);
    let x_max = (room.end_x + 1).checked_sub(POCKET_MARGIN + outer_w)?;
    let y_max = (room.end_y + 1).checked_sub(POCKET_MARGIN + outer_h)?;
    (x_max >= x_min && y_max >= y_min).then_some((x_max, y_max))
}

/// Whether a room can hold the smallest pocket with its margin.
pub fn fits_lava_pocket(room: &Room) -> bool {
    pocket_origin_limits(room, 3, 2).is_some()
}

fn scan_for_pocket(canvas: &mut RoomCanvas, inner_w: usize, inner_h: usize) -> bool {
    let room = *canvas.room();
    let Some((x_max, y_max)) = pocket_origin_limits(&room, inner_w, inner_h) else {
        return false;
    };
    let (x_min, y_min) = pocket_origin_min(&room);
    for y0 in y_min..=y_max {
        for x0 in x_min..=x_max {
            if pour_pocket(canvas, x0, y0, inner_w, inner_h) {
                return true;
            }
        }
    }
    false
}

/// Writes the container and its lava when the whole footprint is open.
fn pour_pocket(
    canvas: &mut RoomCanvas,
    x0: usize,
    y0: usize,
    inner_w: usize,
    inner_h: usize,
) -> bool {
    let (outer_w, outer_h) = (inner_w + 2, inner_h + 1);
    let clear = (x0..x0 + outer_w).all(|x| (y0..y0 + outer_h).all(|y| canvas.is_open(x, y)));
    if !clear {
        return false;
    }
    let floor = y0 + inner_h;
    for y in y0..floor {
        canvas.place(x0, y, Tile::Platform);
        canvas.place(x0 + outer_w - 1, y, Tile::Platform);
        for x in x0 + 1..x0 + outer_w - 1 {
            canvas.place(x, y, Tile::Lava);
        }
    }
    for x in x0..x0 + outer_w {
        canvas.place(x, floor, Tile::Platform);
    }
    true
}
