//! Coarse slot partitioning and stochastic room placement.

use std::collections::HashMap;
use std::ops::Range;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::RoomSection;
use crate::pool::WorkerPool;
use crate::rng::{GenRng, RandomSource, region_seeds};

use super::model::{Room, RoomGrid, RoomId, RoomKind, Rooms};

/// Slot geometry derived from the room tunables and the map size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotLayout {
    pub cols: usize,
    pub rows: usize,
    pub slot_width: usize,
    pub slot_height: usize,
}

impl SlotLayout {
    pub fn new(section: &RoomSection, width: usize, height: usize) -> Self {
        let slot_width = section.slot_width();
        let slot_height = section.slot_height();
        Self {
            cols: width.saturating_sub(3) / slot_width,
            rows: height.saturating_sub(3) / slot_height,
            slot_width,
            slot_height,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.cols == 0 || self.rows == 0
    }

    pub fn origin(&self, col: usize, row: usize) -> (usize, usize) {
        (1 + col * self.slot_width, 1 + row * self.slot_height)
    }
}

#[derive(Debug)]
pub struct RoomGridOutput {
    pub rooms: Rooms,
    pub grid: RoomGrid,
    pub halls: usize,
}

/// Rooms placed by one region. Slot entries carry the room by value because
/// region-local rooms are not yet in the shared arena.
#[derive(Debug, Default)]
struct RegionRooms {
    rooms: Vec<Room>,
    slots: Vec<(usize, usize, Room)>,
    halls: usize,
}

/// Single-stream variant: visits every slot in row-major order.
pub fn generate_sequential<R: RandomSource>(
    section: &RoomSection,
    width: usize,
    height: usize,
    rng: &mut R,
) -> RoomGridOutput {
    let layout = SlotLayout::new(section, width, height);
    if layout.is_degenerate() {
        warn!(width, height, "map too small for any room slot");
        return empty_output(layout);
    }
    let region = place_region(section, &layout, width, height, 0..layout.cols, rng);
    merge_regions(layout, vec![region])
}

/// Region-parallel variant: slot columns are split into `parallel_regions`
/// bands, each with its own splitmix-derived stream.
pub fn generate_parallel(
    section: &RoomSection,
    width: usize,
    height: usize,
    seed: u64,
    pool: &WorkerPool,
) -> RoomGridOutput {
    let layout = SlotLayout::new(section, width, height);
    if layout.is_degenerate() {
        warn!(width, height, "map too small for any room slot");
        return empty_output(layout);
    }
    let ranges = split_columns(layout.cols, section.parallel_regions.max(1));
    let seeds = region_seeds(seed, ranges.len());
    debug!(regions = ranges.len(), cols = layout.cols, rows = layout.rows, "placing rooms");

    let regions: Vec<RegionRooms> = pool.install(|| {
        ranges
            .into_par_iter()
            .zip(seeds)
            .map(|(columns, region_seed)| {
                let mut rng = GenRng::seeded(region_seed);
                place_region(section, &layout, width, height, columns, &mut rng)
            })
            .collect()
    });
    merge_regions(layout, regions)
}

fn empty_output(layout: SlotLayout) -> RoomGridOutput {
    RoomGridOutput {
        rooms: Rooms::with_key(),
        grid: RoomGrid::new(layout.cols, layout.rows),
        halls: 0,
    }
}

fn split_columns(cols: usize, regions: usize) -> Vec<Range<usize>> {
    let regions = regions.min(cols).max(1);
    let base = cols / regions;
    let extra = cols % regions;
    let mut ranges = Vec::with_capacity(regions);
    let mut start = 0;
    for region in 0..regions {
        let len = base + usize::from(region < extra);
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}

fn place_region<R: RandomSource>(
    section: &RoomSection,
    layout: &SlotLayout,
    width: usize,
    height: usize,
    columns: Range<usize>,
    rng: &mut R,
) -> RegionRooms {
    let local_cols = columns.len();
    let mut occupied = vec![false; local_cols * layout.rows];
    let is_free = |occupied: &[bool], col: usize, row: usize| {
        col >= columns.start
            && col < columns.end
            && row < layout.rows
            && !occupied[row * local_cols + (col - columns.start)]
    };

    let mut region = RegionRooms::default();
    for row in 0..layout.rows {
        for col in columns.clone() {
            if !is_free(&occupied, col, row) {
                continue;
            }
            if rng.chance(section.skip_chance) {
                continue;
            }
            let hall = rng.chance(section.hall_chance)
                && is_free(&occupied, col + 1, row)
                && is_free(&occupied, col, row + 1)
                && is_free(&occupied, col + 1, row + 1);
            let jitter = rng.range_usize(0, section.room_width_jitter);

            let (origin_x, origin_y) = layout.origin(col, row);
            let start_x = origin_x + section.slot_gap;
            let start_y = origin_y + section.slot_gap;
            let (room_width, room_height) = if hall {
                (
                    layout.slot_width + section.room_min_width + jitter,
                    layout.slot_height + section.room_min_height,
                )
            } else {
                (section.room_min_width + jitter, section.room_min_height)
            };
            let end_x = start_x + room_width - 1;
            let end_y = start_y + room_height - 1;
            if end_x > width - 3 || end_y > height - 3 {
                continue;
            }

            let kind = roll_room_kind(section, rng);
            let room = Room { start_x, start_y, end_x, end_y, kind };
            let covered: &[(usize, usize)] = if hall {
                &[(col, row), (col + 1, row), (col, row + 1), (col + 1, row + 1)]
            } else {
                &[(col, row)]
            };
            for &(slot_col, slot_row) in covered {
                occupied[slot_row * local_cols + (slot_col - columns.start)] = true;
                region.slots.push((slot_col, slot_row, room));
            }
            region.rooms.push(room);
            region.halls += usize::from(hall);
        }
    }
    region
}

fn roll_room_kind<R: RandomSource>(section: &RoomSection, rng: &mut R) -> RoomKind {
    let roll = rng.range_usize(0, 99) as u32;
    if roll < section.treasure_percent {
        RoomKind::Treasure
    } else if roll < section.treasure_percent + section.shop_percent {
        RoomKind::Shop
    } else {
        RoomKind::Normal
    }
}

/// Moves every region's rooms into one arena, then re-resolves slot entries by
/// matching bounding boxes against the arena.
fn merge_regions(layout: SlotLayout, regions: Vec<RegionRooms>) -> RoomGridOutput {
    let total: usize = regions.iter().map(|region| region.rooms.len()).sum();
    let mut rooms = Rooms::with_capacity_and_key(total);
    let mut by_bounds: HashMap<(usize, usize, usize, usize), RoomId> =
        HashMap::with_capacity(total);
    let mut grid = RoomGrid::new(layout.cols, layout.rows);
    let mut halls = 0;

    for region in &regions {
        for room in &region.rooms {
            let id = rooms.insert(*room);
            by_bounds.insert(bounds_key(room), id);
        }
        halls += region.halls;
    }
    for region in &regions {
        for (col, row, room) in &region.slots {
            if let Some(&id) = by_bounds.get(&bounds_key(room)) {
                grid.assign(*col, *row, id);
            }
        }
    }
    debug!(rooms = rooms.len(), halls, "room grid merged");
    RoomGridOutput { rooms, grid, halls }
}

fn bounds_key(room: &Room) -> (usize, usize, usize, usize) {
    (room.start_x, room.start_y, room.end_x, room.end_y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_columns_is_contiguous_and_complete() {
        let ranges = split_columns(19, 4);
        assert_eq!(ranges.len(), 4);
        assert_eq!(ranges[0].start, 0);
        assert_eq!(ranges.last().map(|range| range.end), Some(19));
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(split_columns(2, 8).len(), 2);
    }

    #[test]
    fn degenerate_map_produces_no_rooms() {
        let section = RoomSection::default();
        let mut rng = GenRng::seeded(1);
        let output = generate_sequential(&section, 20, 12, &mut rng);
        assert!(output.rooms.is_empty());
        assert_eq!(output.grid.cols(), 0);
    }

    #[test]
    fn rooms_stay_inside_the_border_margin() {
        let section = RoomSection::default();
        let mut rng = GenRng::seeded(2024);
        let output = generate_sequential(&section, 300, 200, &mut rng);
        assert!(!output.rooms.is_empty());
        for room in output.rooms.values() {
            assert!(room.start_x >= 2 && room.start_y >= 2);
            assert!(room.end_x <= 297 && room.end_y <= 197);
            assert!(room.width() >= section.room_min_width);
        }
    }

    #[test]
    fn rooms_never_overlap() {
        let section = RoomSection { hall_chance: 0.5, ..RoomSection::default() };
        let mut rng = GenRng::seeded(7);
        let output = generate_sequential(&section, 400, 240, &mut rng);
        let rooms: Vec<Room> = output.rooms.values().copied().collect();
        for (i, a) in rooms.iter().enumerate() {
            for b in &rooms[i + 1..] {
                let overlap = a.start_x <= b.end_x
                    && b.start_x <= a.end_x
                    && a.start_y <= b.end_y
                    && b.start_y <= a.end_y;
                assert!(!overlap, "rooms overlap: {a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn every_slot_entry_points_at_a_room_covering_that_slot() {
        let section = RoomSection { hall_chance: 0.4, ..RoomSection::default() };
        let pool = WorkerPool::new(3).expect("pool");
        let output = generate_parallel(&section, 500, 300, 99, &pool);
        let layout = SlotLayout::new(&section, 500, 300);
        for row in 0..layout.rows {
            for col in 0..layout.cols {
                let Some(id) = output.grid.get(col, row) else {
                    continue;
                };
                let room = output.rooms[id];
                let (ox, oy) = layout.origin(col, row);
                assert!(room.contains(ox + section.slot_gap, oy + section.slot_gap));
            }
        }
        let referenced = output.grid.unique_rooms();
        assert_eq!(referenced.len(), output.rooms.len());
    }

    #[test]
    fn parallel_variant_ignores_pool_size() {
        let section = RoomSection::default();
        let single = WorkerPool::new(1).expect("pool");
        let many = WorkerPool::new(4).expect("pool");
        let a = generate_parallel(&section, 500, 300, 31_337, &single);
        let b = generate_parallel(&section, 500, 300, 31_337, &many);
        let rooms_a: Vec<Room> = a.rooms.values().copied().collect();
        let rooms_b: Vec<Room> = b.rooms.values().copied().collect();
        assert_eq!(rooms_a, rooms_b);
        assert_eq!(a.halls, b.halls);
    }

    #[test]
    fn room_kind_thresholds_are_cumulative() {
        let section =
            RoomSection { treasure_percent: 33, shop_percent: 33, ..RoomSection::default() };
        let mut rng = GenRng::seeded(11);
        let mut counts = [0_usize; 3];
        for _ in 0..3_000 {
            match roll_room_kind(&section, &mut rng) {
                RoomKind::Treasure => counts[0] += 1,
                RoomKind::Shop => counts[1] += 1,
                RoomKind::Normal => counts[2] += 1,
            }
        }
        for count in counts {
            assert!((800..1_250).contains(&count), "unexpected distribution {counts:?}");
        }
    }
}
