//! Generation orchestrator: sequences the phases, reports progress, checks for
//! cancellation between phases, and validates the finished grid.

use std::panic::{self, AssertUnwindSafe};

use rayon::prelude::*;
use tracing::{debug, error, info, instrument, warn};

use crate::config::GenerationConfig;
use crate::error::{MapError, Result};
use crate::grid::{Grid, dilate};
use crate::lava::{LavaCell, cells_for};
use crate::pool::WorkerPool;
use crate::progress::GenerationControl;
use crate::rng::{GenRng, streams};
use crate::types::Tile;

use super::connections::connect_rooms;
use super::content::{ContentStats, generate_contents};
use super::model::{GenerationStats, RoomGrid, RoomKind, Rooms, SpanKind, VerticalSpan};
use super::room_grid::{RoomGridOutput, generate_parallel, generate_sequential};

/// Smallest grid the pipeline accepts: a border plus one interior tile.
pub const MIN_DIMENSION: usize = 3;

/// Everything the pipeline hands to the map.
#[derive(Clone, Debug)]
pub struct GeneratedMap {
    pub tiles: Grid<Tile>,
    pub original_solid: Grid<bool>,
    pub protected: Grid<bool>,
    pub lava: Grid<LavaCell>,
    pub rooms: Rooms,
    pub room_grid: RoomGrid,
    pub stats: GenerationStats,
}

pub struct RoomGenerator<'a> {
    config: &'a GenerationConfig,
    pool: &'a WorkerPool,
    seed: u64,
}

impl<'a> RoomGenerator<'a> {
    pub fn new(config: &'a GenerationConfig, seed: u64, pool: &'a WorkerPool) -> Self {
        Self { config, pool, seed }
    }

    /// Runs every phase. On any failure, including a panic on a worker,
    /// progress is forced to 1.0 before the failure leaves this call.
    #[instrument(
        skip_all,
        fields(seed = self.seed, width = self.config.map.width, height = self.config.map.height)
    )]
    pub fn generate(&self, control: &mut GenerationControl) -> Result<GeneratedMap> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_phases(control)));
        match outcome {
            Ok(Ok(map)) => Ok(map),
            Ok(Err(err)) => {
                control.progress.finish();
                match err {
                    MapError::Cancelled { phase } => warn!(phase, "map generation cancelled"),
                    ref other => error!(error = %other, "map generation failed"),
                }
                Err(err)
            }
            Err(payload) => {
                control.progress.finish();
                error!("map generation panicked");
                panic::resume_unwind(payload)
            }
        }
    }

    fn run_phases(&self, control: &mut GenerationControl) -> Result<GeneratedMap> {
        self.config.validate()?;
        let (width, height) = (self.config.map.width, self.config.map.height);
        if width < MIN_DIMENSION || height < MIN_DIMENSION {
            return Err(MapError::InvalidDimensions { width, height, min: MIN_DIMENSION });
        }
        let mut stats = GenerationStats::default();

        control.cancel.check("rooms")?;
        let RoomGridOutput { rooms, grid: room_grid, halls } = self.place_rooms();
        stats.halls = halls;
        for room in rooms.values() {
            match room.kind {
                RoomKind::Normal => stats.normal_rooms += 1,
                RoomKind::Treasure => stats.treasure_rooms += 1,
                RoomKind::Shop => stats.shop_rooms += 1,
            }
        }
        if rooms.is_empty() {
            warn!(width, height, "generation produced no rooms");
        }
        control.progress.report(0.10);

        control.cancel.check("prefill")?;
        let (mut tiles, mut original_solid) = self.prefill(width, height);
        control.progress.report(0.20);

        control.cancel.check("clear")?;
        clear_rooms(&mut tiles, &rooms);
        control.progress.report(0.30);

        control.cancel.check("connections")?;
        let mut rng = GenRng::stream(self.seed, streams::CONNECTIONS);
        let connections =
            connect_rooms(&rooms, &room_grid, &self.config.connections, &mut tiles, &mut rng);
        stats.mst_edges = connections.mst_edges;
        stats.loop_edges = connections.loop_edges;
        stats.direct_connections = connections.direct_connections;
        control.progress.report(0.45);

        control.cancel.check("content")?;
        let content = self.populate(&rooms, &room_grid, &mut tiles);
        stats.chests_placed = content.chests;
        stats.shops_placed = content.shops;
        stats.lava_pockets = content.lava_pockets;
        stats.content_spans = content.ladders + content.ropes;
        control.progress.report(0.70);

        control.cancel.check("spans")?;
        let (committed, skipped) = commit_spans(&mut tiles, &connections.spans);
        stats.spans_committed = committed;
        stats.spans_tiles_skipped = skipped;
        control.progress.report(0.80);

        control.cancel.check("protection")?;
        protect_walls(&mut tiles, self.config.content.wall_protection_radius, self.pool);
        control.progress.report(0.90);

        control.cancel.check("finalize")?;
        let radius = self.config.content.conway_protection_radius;
        let protected = finalize_flags(&tiles, &mut original_solid, radius);
        let lava = cells_for(&tiles, &self.config.lava);
        validate_border(&tiles)?;
        control.progress.finish();

        info!(
            rooms = stats.room_count(),
            halls = stats.halls,
            mst = stats.mst_edges,
            loops = stats.loop_edges,
            direct = stats.direct_connections,
            chests = stats.chests_placed,
            pockets = stats.lava_pockets,
            "map generated"
        );
        Ok(GeneratedMap { tiles, original_solid, protected, lava, rooms, room_grid, stats })
    }

    #[instrument(skip_all)]
    fn place_rooms(&self) -> RoomGridOutput {
        let section = &self.config.rooms;
        let (width, height) = (self.config.map.width, self.config.map.height);
        if section.parallel_regions > 1 {
            generate_parallel(section, width, height, self.seed, self.pool)
        } else {
            let mut rng = GenRng::stream(self.seed, streams::ROOM_GRID);
            generate_sequential(section, width, height, &mut rng)
        }
    }

    /// Fills the grid with WALL by column bands and marks every tile solid.
    #[instrument(skip_all)]
    fn prefill(&self, width: usize, height: usize) -> (Grid<Tile>, Grid<bool>) {
        let mut tiles = Grid::new(width, height, Tile::Empty);
        let mut solid = Grid::new(width, height, false);
        let band = band_width(width, self.pool.threads());
        self.pool.install(|| {
            tiles.column_bands_mut(band).zip(solid.column_bands_mut(band)).for_each(
                |((_, tile_band), (_, solid_band))| {
                    tile_band.fill(Tile::Wall);
                    solid_band.fill(true);
                },
            );
        });
        (tiles, solid)
    }

    #[instrument(skip_all)]
    fn populate(
        &self,
        rooms: &Rooms,
        room_grid: &RoomGrid,
        tiles: &mut Grid<Tile>,
    ) -> ContentStats {
        let ids = room_grid.unique_rooms();
        let contents =
            generate_contents(rooms, &ids, tiles, &self.config.content, self.seed, self.pool);
        let mut total = ContentStats::default();
        for content in contents {
            content.canvas.write_back(tiles);
            total += content.stats;
        }
        debug!(?total, "room content written");
        total
    }
}

fn band_width(width: usize, threads: usize) -> usize {
    width.div_ceil(threads.max(1)).max(1)
}

/// Opens every room interior. Sequential: neighbouring rooms may share
/// border tiles.
fn clear_rooms(tiles: &mut Grid<Tile>, rooms: &Rooms) {
    for room in rooms.values() {
        for x in room.start_x..=room.end_x {
            for y in room.start_y..=room.end_y {
                if !tiles.is_border(x, y) {
                    tiles.set(x, y, Tile::Empty);
                }
            }
        }
    }
}

/// Writes deferred ladders and ropes. Fixtures and lava are never
/// overwritten; returns (spans committed, tiles skipped).
fn commit_spans(tiles: &mut Grid<Tile>, spans: &[VerticalSpan]) -> (usize, usize) {
    let mut skipped = 0;
    for span in spans {
        let tile = match span.kind {
            SpanKind::Ladder => Tile::Ladder,
            SpanKind::Rope => Tile::Rope,
        };
        for y in span.y1..=span.y2 {
            if span.x >= tiles.width() || y >= tiles.height() || tiles.is_border(span.x, y) {
                continue;
            }
            let current = tiles.at(span.x, y);
            if matches!(current, Tile::Chest | Tile::Shop | Tile::Treasure | Tile::Lava) {
                skipped += 1;
                continue;
            }
            tiles.set(span.x, y, tile);
        }
    }
    (spans.len(), skipped)
}

/// Turns EMPTY tiles within `radius` of a WALL into PROTECTED_EMPTY.
fn protect_walls(tiles: &mut Grid<Tile>, radius: usize, pool: &WorkerPool) {
    if radius == 0 || tiles.is_empty() {
        return;
    }
    let mut walls = Grid::new(tiles.width(), tiles.height(), false);
    for (index, tile) in tiles.cells().iter().enumerate() {
        if *tile == Tile::Wall {
            walls.cells_mut()[index] = true;
        }
    }
    let near_wall = dilate(&walls, radius);
    let height = tiles.height();
    let band = band_width(tiles.width(), pool.threads());
    pool.install(|| {
        tiles.column_bands_mut(band).for_each(|(x0, cells)| {
            for (offset, tile) in cells.iter_mut().enumerate() {
                let (x, y) = (x0 + offset / height, offset % height);
                if *tile == Tile::Empty && near_wall.at(x, y) {
                    *tile = Tile::ProtectedEmpty;
                }
            }
        });
    });
}

/// Refreshes the original-solid flags from the finished grid and derives the
/// conway-protected set: the open tiles and walls within `radius` of any
/// original-solid tile.
pub(crate) fn finalize_flags(
    tiles: &Grid<Tile>,
    original_solid: &mut Grid<bool>,
    radius: usize,
) -> Grid<bool> {
    for (index, tile) in tiles.cells().iter().enumerate() {
        original_solid.cells_mut()[index] = tile.is_structural();
    }
    let mut protected = dilate(original_solid, radius);
    for (index, tile) in tiles.cells().iter().enumerate() {
        if !matches!(tile, Tile::Wall | Tile::Empty | Tile::ProtectedEmpty) {
            protected.cells_mut()[index] = false;
        }
    }
    protected
}

fn validate_border(tiles: &Grid<Tile>) -> Result<()> {
    let (width, height) = (tiles.width(), tiles.height());
    for x in 0..width {
        for y in 0..height {
            if tiles.is_border(x, y) && tiles.at(x, y) != Tile::Wall {
                return Err(MapError::Invariant(format!(
                    "border tile ({x}, {y}) is {:?}, expected Wall",
                    tiles.at(x, y)
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapgen::model::{Room, RoomId};
    use crate::progress::{CancelFlag, Progress};
    use std::sync::{Arc, Mutex};

    fn small_config() -> GenerationConfig {
        GenerationConfig::default().with_size(160, 100)
    }

    #[test]
    fn spans_skip_fixtures_and_lava() {
        let mut tiles = Grid::new(10, 10, Tile::Empty);
        tiles.set(4, 3, Tile::Chest);
        tiles.set(4, 5, Tile::Lava);
        let spans = [VerticalSpan { x: 4, y1: 1, y2: 8, kind: SpanKind::Ladder }];
        let (committed, skipped) = commit_spans(&mut tiles, &spans);
        assert_eq!((committed, skipped), (1, 2));
        assert_eq!(tiles.at(4, 3), Tile::Chest);
        assert_eq!(tiles.at(4, 5), Tile::Lava);
        assert_eq!(tiles.at(4, 4), Tile::Ladder);
    }

    #[test]
    fn protection_marks_only_tiles_near_walls() {
        let pool = WorkerPool::new(2).expect("pool");
        let mut tiles = Grid::new(9, 9, Tile::Empty);
        tiles.set(0, 0, Tile::Wall);
        tiles.set(8, 8, Tile::Wall);
        tiles.set(1, 1, Tile::Ladder);
        protect_walls(&mut tiles, 1, &pool);
        assert_eq!(tiles.at(1, 0), Tile::ProtectedEmpty);
        assert_eq!(tiles.at(7, 7), Tile::ProtectedEmpty);
        assert_eq!(tiles.at(1, 1), Tile::Ladder);
        assert_eq!(tiles.at(4, 4), Tile::Empty);
    }

    #[test]
    fn finalize_protects_open_tiles_around_every_structural_tile() {
        let mut tiles = Grid::new(12, 12, Tile::Empty);
        tiles.set(5, 5, Tile::Wall);
        tiles.set(5, 6, Tile::Platform);
        tiles.set(1, 1, Tile::Floor);
        tiles.set(9, 9, Tile::Chest);
        let mut original = Grid::new(12, 12, true);
        let protected = finalize_flags(&tiles, &mut original, 2);
        assert!(protected.at(5, 5));
        assert!(!protected.at(5, 6));
        assert!(protected.at(3, 3) && protected.at(2, 2));
        assert!(protected.at(5, 8) && protected.at(7, 8));
        assert!(!protected.at(5, 9));
        assert!(!protected.at(9, 9));
        assert!(!protected.at(10, 10));
        assert!(original.at(5, 6) && original.at(1, 1));
        assert!(!original.at(0, 0));
    }

    #[test]
    fn generation_reports_monotonic_progress_ending_at_one() {
        let pool = WorkerPool::new(2).expect("pool");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut control = GenerationControl::new(
            Progress::new(move |value| {
                if let Ok(mut values) = sink.lock() {
                    values.push(value);
                }
            }),
            CancelFlag::new(),
        );
        let config = small_config();
        RoomGenerator::new(&config, 9, &pool).generate(&mut control).expect("generation succeeds");
        let values = seen.lock().expect("lock").clone();
        assert!(values.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(values.last().copied(), Some(1.0));
        assert_eq!(values.len(), 8);
    }

    #[test]
    fn cancelled_generation_still_finishes_progress() {
        let pool = WorkerPool::new(1).expect("pool");
        let cancel = CancelFlag::new();
        cancel.cancel();
        let mut control = GenerationControl::new(Progress::silent(), cancel);
        let config = small_config();
        let err = RoomGenerator::new(&config, 1, &pool)
            .generate(&mut control)
            .expect_err("cancelled");
        assert!(matches!(err, MapError::Cancelled { phase: "rooms" }));
        assert_eq!(control.progress.last(), 1.0);
    }

    #[test]
    fn tiny_maps_are_rejected_and_small_maps_have_no_rooms() {
        let pool = WorkerPool::new(1).expect("pool");
        let config = GenerationConfig::default().with_size(2, 40);
        let err = RoomGenerator::new(&config, 1, &pool)
            .generate(&mut GenerationControl::default())
            .expect_err("too small");
        assert!(matches!(err, MapError::InvalidDimensions { .. }));

        let config = GenerationConfig::default().with_size(20, 12);
        let map = RoomGenerator::new(&config, 1, &pool)
            .generate(&mut GenerationControl::default())
            .expect("degenerate map is still valid");
        assert!(map.rooms.is_empty());
        assert!(map.tiles.cells().iter().all(|tile| *tile == Tile::Wall));
    }

    #[test]
    fn room_bounds_match_the_slot_table() {
        let pool = WorkerPool::new(2).expect("pool");
        let config = small_config();
        let map = RoomGenerator::new(&config, 44, &pool)
            .generate(&mut GenerationControl::default())
            .expect("generation succeeds");
        let referenced: Vec<RoomId> = map.room_grid.unique_rooms();
        assert_eq!(referenced.len(), map.rooms.len());
        let rooms: Vec<&Room> = referenced.iter().map(|&id| &map.rooms[id]).collect();
        assert!(rooms.iter().all(|room| room.start_x >= 1 && room.end_x <= 158));
    }
}
