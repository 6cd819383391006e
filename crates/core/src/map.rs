//! The live map: tile grid, flag grids, transition timers, and lava cells,
//! plus the cadence-driven mutators the game loop calls.

use std::sync::Arc;

use xxhash_rust::xxh3::xxh3_64;

use crate::automata::{
    self, AutomataInput, AutomataReport, TransitionReport, TransitionState, highlight_alpha,
};
use crate::chunk::{Chunk, ChunkIndex, Viewport};
use crate::config::GenerationConfig;
use crate::error::{MapError, Result};
use crate::grid::{Grid, TileQuery};
use crate::lava::{self, LavaCell, LavaSimulation, LavaVisual};
use crate::mapgen::pipeline::{MIN_DIMENSION, finalize_flags};
use crate::mapgen::{GeneratedMap, GenerationStats, RoomGenerator, RoomGrid, Rooms};
use crate::pool::WorkerPool;
use crate::progress::GenerationControl;
use crate::rng::{GenRng, streams};
use crate::spawn::{self, SpawnPoint};
use crate::types::Tile;

/// Readers take a snapshot through [`Map::snapshot`]; the automata swap in a
/// whole new grid, and every other writer copies on write if a snapshot is
/// still held, so a snapshot never observes a half-applied step.
#[derive(Debug)]
pub struct Map {
    config: GenerationConfig,
    seed: u64,
    pool: WorkerPool,
    tiles: Arc<Grid<Tile>>,
    original_solid: Grid<bool>,
    protected: Grid<bool>,
    timers: Grid<f32>,
    lava: Grid<LavaCell>,
    lava_sim: LavaSimulation,
    lava_visual: LavaVisual,
    rooms: Rooms,
    room_grid: RoomGrid,
    stats: GenerationStats,
    chunks: ChunkIndex,
    automata_steps: u64,
    transition_rng: GenRng,
}

impl Map {
    pub fn generate(
        config: GenerationConfig,
        seed: u64,
        pool: &WorkerPool,
        mut control: GenerationControl,
    ) -> Result<Self> {
        let generated = RoomGenerator::new(&config, seed, pool).generate(&mut control)?;
        Ok(Self::from_generated(config, seed, pool.clone(), generated))
    }

    pub fn new(config: GenerationConfig, seed: u64, pool: &WorkerPool) -> Result<Self> {
        Self::generate(config, seed, pool, GenerationControl::default())
    }

    /// A walled, otherwise empty room of the given size.
    pub fn bounded(width: usize, height: usize, pool: &WorkerPool) -> Result<Self> {
        if width < MIN_DIMENSION || height < MIN_DIMENSION {
            return Err(MapError::InvalidDimensions { width, height, min: MIN_DIMENSION });
        }
        let config = GenerationConfig::default().with_size(width, height);
        let mut tiles = Grid::new(width, height, Tile::Empty);
        for x in 0..width {
            for y in 0..height {
                if tiles.is_border(x, y) {
                    tiles.set(x, y, Tile::Wall);
                }
            }
        }
        let mut original_solid = Grid::new(width, height, false);
        let radius = config.content.conway_protection_radius;
        let protected = finalize_flags(&tiles, &mut original_solid, radius);
        let lava = lava::cells_for(&tiles, &config.lava);
        let generated = GeneratedMap {
            tiles,
            original_solid,
            protected,
            lava,
            rooms: Rooms::with_key(),
            room_grid: RoomGrid::new(0, 0),
            stats: GenerationStats::default(),
        };
        Ok(Self::from_generated(config, 0, pool.clone(), generated))
    }

    fn from_generated(
        config: GenerationConfig,
        seed: u64,
        pool: WorkerPool,
        generated: GeneratedMap,
    ) -> Self {
        let GeneratedMap { tiles, original_solid, protected, lava, rooms, room_grid, stats } =
            generated;
        let (width, height) = (tiles.width(), tiles.height());
        Self {
            chunks: ChunkIndex::new(width, height, config.map.render_chunk_size),
            lava_sim: LavaSimulation::new(config.lava.clone()),
            lava_visual: LavaVisual::new(width, height),
            timers: Grid::new(width, height, 0.0),
            transition_rng: GenRng::stream(seed, streams::TRANSITIONS),
            automata_steps: 0,
            tiles: Arc::new(tiles),
            original_solid,
            protected,
            lava,
            rooms,
            room_grid,
            stats,
            config,
            seed,
            pool,
        }
    }

    pub fn width(&self) -> usize {
        self.tiles.width()
    }

    pub fn height(&self) -> usize {
        self.tiles.height()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Consistent read view: unaffected by any later mutation of the map.
    pub fn snapshot(&self) -> Arc<Grid<Tile>> {
        Arc::clone(&self.tiles)
    }

    pub fn generated_rooms(&self) -> &Rooms {
        &self.rooms
    }

    pub fn room_grid(&self) -> &RoomGrid {
        &self.room_grid
    }

    pub fn stats(&self) -> &GenerationStats {
        &self.stats
    }

    pub fn automata_steps(&self) -> u64 {
        self.automata_steps
    }

    /// Pixel-space ground test; a tile spans `tile_size_px` pixels.
    pub fn collides_with_ground(&self, px: f32, py: f32) -> bool {
        let size = self.config.map.tile_size_px;
        let (x, y) = ((px / size).floor(), (py / size).floor());
        if !x.is_finite() || !y.is_finite() {
            return true;
        }
        self.is_solid_tile(x as i32, y as i32)
    }

    /// Gameplay write. `Ok(false)` for off-map or border coordinates, which
    /// are never mutated; `Err` for an unknown tile code.
    pub fn set_tile_value(&mut self, x: i32, y: i32, value: u8) -> Result<bool> {
        let tile = Tile::try_from(value)?;
        if !self.tiles.in_bounds(x, y) || self.tiles.is_border(x as usize, y as usize) {
            return Ok(false);
        }
        let (x, y) = (x as usize, y as usize);
        let tiles = Arc::make_mut(&mut self.tiles);
        let previous = tiles.at(x, y);
        tiles.set(x, y, tile);
        self.timers.set(x, y, 0.0);
        if tile == Tile::Lava {
            self.lava.set(x, y, LavaCell::full(&self.config.lava));
        } else if previous == Tile::Lava {
            self.lava.set(x, y, LavaCell::default());
        }
        Ok(true)
    }

    pub fn apply_conway_automata(&mut self) -> AutomataReport {
        let input = AutomataInput {
            tiles: &self.tiles,
            original_solid: &self.original_solid,
            protected: &self.protected,
        };
        let outcome = automata::apply_conway_automata(
            input,
            &self.config.automata,
            self.seed,
            self.automata_steps,
            &self.pool,
        );
        for index in outcome.touched {
            self.timers.cells_mut()[index] = 0.0;
        }
        self.tiles = Arc::new(outcome.next);
        self.automata_steps += 1;
        outcome.report
    }

    pub fn update_transitions(&mut self, dt: f32) -> TransitionReport {
        let state = TransitionState {
            tiles: Arc::make_mut(&mut self.tiles),
            timers: &mut self.timers,
            original_solid: &mut self.original_solid,
            protected: &mut self.protected,
            lava: &mut self.lava,
        };
        automata::update_transitions(state, &self.config.automata, &mut self.transition_rng, dt)
    }

    /// Advances the lava cadence by one frame. Returns the number of
    /// simulation steps run.
    pub fn update_lava_flow(&mut self, dt: f32) -> u32 {
        let steps = self.lava_sim.tick(Arc::make_mut(&mut self.tiles), &mut self.lava);
        self.lava_visual.update(&self.tiles, &self.lava, &self.config.lava, dt);
        steps
    }

    pub fn lava_visual(&self) -> &LavaVisual {
        &self.lava_visual
    }

    pub fn find_empty_spawn(&self) -> SpawnPoint {
        spawn::find_empty_spawn(&self.tiles, &self.config.spawn)
    }

    pub fn lava_mass(&self, x: i32, y: i32) -> f32 {
        self.lava.get(x, y).map_or(0.0, |cell| cell.mass)
    }

    pub fn total_lava_mass(&self) -> f64 {
        lava::total_mass(&self.lava)
    }

    pub fn is_original_solid(&self, x: i32, y: i32) -> bool {
        self.original_solid.get(x, y).unwrap_or(false)
    }

    pub fn is_conway_protected(&self, x: i32, y: i32) -> bool {
        self.protected.get(x, y).unwrap_or(false)
    }

    pub fn transition_timer(&self, x: i32, y: i32) -> f32 {
        self.timers.get(x, y).unwrap_or(0.0)
    }

    /// Blink opacity for highlighted tiles, `None` for every other tile.
    pub fn highlight_alpha(&self, x: i32, y: i32) -> Option<f32> {
        match self.tile(x, y)? {
            Tile::HighlightCreate | Tile::HighlightDelete => {
                Some(highlight_alpha(self.transition_timer(x, y), &self.config.automata))
            }
            _ => None,
        }
    }

    pub fn chunks(&self) -> &ChunkIndex {
        &self.chunks
    }

    pub fn visible_chunks(&self, viewport: Viewport) -> Vec<Chunk> {
        self.chunks.visible(viewport, self.config.map.tile_size_px)
    }

    /// Structural invariants that hold after every transition tick: a WALL
    /// border, protected tiles in their authored state, and lava codes in
    /// step with lava mass.
    pub fn check_invariants(&self) -> Result<()> {
        let min_mass = self.config.lava.min_mass;
        for (index, &tile) in self.tiles.cells().iter().enumerate() {
            let (x, y) = self.tiles.position(index);
            if self.tiles.is_border(x, y) && tile != Tile::Wall {
                return Err(MapError::Invariant(format!("border tile ({x}, {y}) is {tile:?}")));
            }
            if self.protected.cells()[index] {
                let expected_wall = self.original_solid.cells()[index];
                if (expected_wall && tile != Tile::Wall) || (!expected_wall && !tile.is_empty()) {
                    return Err(MapError::Invariant(format!(
                        "protected tile ({x}, {y}) is {tile:?}"
                    )));
                }
            }
            let mass = self.lava.cells()[index].mass;
            if (tile == Tile::Lava) != (mass > min_mass) {
                return Err(MapError::Invariant(format!(
                    "lava tile ({x}, {y}) is {tile:?} with mass {mass}"
                )));
            }
        }
        Ok(())
    }

    /// xxh3 over the tile codes in storage order.
    pub fn fingerprint(&self) -> u64 {
        let codes: Vec<u8> = self.tiles.cells().iter().map(|tile| tile.code()).collect();
        xxh3_64(&codes)
    }
}

impl TileQuery for Map {
    fn tile(&self, x: i32, y: i32) -> Option<Tile> {
        self.tiles.get(x, y)
    }
}
