//! Cellular lava: a mass grid coupled to LAVA tiles.
//!
//! Each pass gathers signed mass deltas against the pre-pass state and applies
//! them in one sweep, so the scan order never matters and lava moves at most
//! one tile per pass.

use tracing::trace;

use crate::config::LavaConfig;
use crate::grid::Grid;
use crate::types::Tile;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LavaCell {
    pub mass: f32,
    /// Damped outflow magnitude, only used for presentation.
    pub flow: f32,
    pub settled: bool,
}

impl LavaCell {
    pub fn full(config: &LavaConfig) -> Self {
        Self { mass: config.max_mass, flow: 0.0, settled: false }
    }
}

/// Builds the lava grid for a tile grid: full cells under LAVA, empty elsewhere.
pub fn cells_for(tiles: &Grid<Tile>, config: &LavaConfig) -> Grid<LavaCell> {
    let mut cells = Grid::new(tiles.width(), tiles.height(), LavaCell::default());
    for (index, tile) in tiles.cells().iter().enumerate() {
        if *tile == Tile::Lava {
            cells.cells_mut()[index] = LavaCell::full(config);
        }
    }
    cells
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LavaStepReport {
    pub moved: f32,
    pub seeded: usize,
    pub evaporated: f32,
    pub removed: usize,
}

/// Fixed-cadence driver: one step every `frames_per_step` frames.
#[derive(Clone, Debug)]
pub struct LavaSimulation {
    config: LavaConfig,
    frame: u32,
    steps: u64,
}

impl LavaSimulation {
    pub fn new(config: LavaConfig) -> Self {
        Self { config, frame: 0, steps: 0 }
    }

    pub fn config(&self) -> &LavaConfig {
        &self.config
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Counts one frame and steps when the cadence is due. Returns the number
    /// of steps run.
    pub fn tick(&mut self, tiles: &mut Grid<Tile>, cells: &mut Grid<LavaCell>) -> u32 {
        self.frame += 1;
        if self.frame < self.config.frames_per_step.max(1) {
            return 0;
        }
        self.frame = 0;
        let report = step(tiles, cells, &self.config);
        self.steps += 1;
        trace!(
            step = self.steps,
            moved = report.moved,
            seeded = report.seeded,
            removed = report.removed,
            "lava step"
        );
        1
    }
}

fn accepts_lava(tile: Tile, cell: &LavaCell, ceiling: f32) -> bool {
    tile.is_empty() || (tile == Tile::Lava && cell.mass < ceiling)
}

fn is_supported(tiles: &Grid<Tile>, x: usize, y: usize) -> bool {
    if y + 1 >= tiles.height() {
        return true;
    }
    let below = tiles.at(x, y + 1);
    below.is_solid() || below == Tile::Lava
}

/// Signed per-cell mass changes for one pass.
struct Deltas {
    mass: Vec<f32>,
    outflow: Vec<f32>,
}

impl Deltas {
    fn new(len: usize) -> Self {
        Self { mass: vec![0.0; len], outflow: vec![0.0; len] }
    }

    fn push(&mut self, from: usize, to: usize, amount: f32) {
        self.mass[from] -= amount;
        self.mass[to] += amount;
        self.outflow[from] += amount;
    }

    fn clear(&mut self) {
        self.mass.fill(0.0);
        self.outflow.fill(0.0);
    }
}

/// Runs one full step: a vertical pass, the horizontal passes, then
/// stabilization.
pub fn step(
    tiles: &mut Grid<Tile>,
    cells: &mut Grid<LavaCell>,
    config: &LavaConfig,
) -> LavaStepReport {
    let mut report = LavaStepReport::default();
    let mut deltas = Deltas::new(tiles.len());
    let mut step_outflow = vec![0.0_f32; tiles.len()];

    gather_vertical(tiles, cells, config, &mut deltas);
    apply(tiles, cells, &mut deltas, &mut step_outflow, &mut report);

    for _ in 0..config.horizontal_passes {
        deltas.clear();
        gather_horizontal(tiles, cells, config, &mut deltas);
        if deltas.outflow.iter().all(|&amount| amount == 0.0) {
            break;
        }
        apply(tiles, cells, &mut deltas, &mut step_outflow, &mut report);
    }

    stabilize(tiles, cells, config, &step_outflow, &mut report);
    report
}

fn gather_vertical(
    tiles: &Grid<Tile>,
    cells: &Grid<LavaCell>,
    config: &LavaConfig,
    deltas: &mut Deltas,
) {
    let ceiling = config.mass_ceiling();
    let seed_floor = 2.0 * config.min_mass;
    let height = tiles.height();
    for x in 0..tiles.width() {
        for y in (0..height.saturating_sub(1)).rev() {
            let from = tiles.index(x, y);
            if tiles.cells()[from] != Tile::Lava {
                continue;
            }
            let to = tiles.index(x, y + 1);
            let below_tile = tiles.cells()[to];
            let below = &cells.cells()[to];
            if !accepts_lava(below_tile, below, ceiling) {
                continue;
            }
            let room = if below_tile == Tile::Lava { ceiling - below.mass } else { ceiling };
            let amount = (cells.cells()[from].mass * config.vertical_fraction).min(room);
            if amount <= 0.0 || (below_tile != Tile::Lava && amount <= seed_floor) {
                continue;
            }
            deltas.push(from, to, amount);
        }
    }
}

fn gather_horizontal(
    tiles: &Grid<Tile>,
    cells: &Grid<LavaCell>,
    config: &LavaConfig,
    deltas: &mut Deltas,
) {
    let ceiling = config.mass_ceiling();
    let seed_floor = 2.0 * config.min_mass;
    let width = tiles.width();
    for x in 0..width {
        for y in 0..tiles.height() {
            let from = tiles.index(x, y);
            if tiles.cells()[from] != Tile::Lava || !is_supported(tiles, x, y) {
                continue;
            }
            let mass = cells.cells()[from].mass;
            let per_side_cap = mass * config.max_horizontal_fraction * 0.5;
            for nx in [x.wrapping_sub(1), x + 1] {
                if nx >= width {
                    continue;
                }
                let to = tiles.index(nx, y);
                let neighbour_tile = tiles.cells()[to];
                let neighbour = &cells.cells()[to];
                if !accepts_lava(neighbour_tile, neighbour, ceiling) {
                    continue;
                }
                if neighbour_tile == Tile::Lava {
                    let difference = mass - neighbour.mass;
                    if difference <= 0.0 {
                        continue;
                    }
                    let room = (ceiling - neighbour.mass) * 0.5;
                    let amount = (difference * config.flow_rate * 0.5).min(per_side_cap).min(room);
                    if amount > 0.0 {
                        deltas.push(from, to, amount);
                    }
                } else if mass > config.spread_threshold {
                    let amount =
                        (mass * config.flow_rate * 0.5).min(per_side_cap).min(ceiling * 0.5);
                    if amount > seed_floor {
                        deltas.push(from, to, amount);
                    }
                }
            }
        }
    }
}

fn apply(
    tiles: &mut Grid<Tile>,
    cells: &mut Grid<LavaCell>,
    deltas: &mut Deltas,
    step_outflow: &mut [f32],
    report: &mut LavaStepReport,
) {
    for (index, change) in deltas.mass.iter().enumerate() {
        if *change == 0.0 {
            continue;
        }
        let cell = &mut cells.cells_mut()[index];
        cell.mass = (cell.mass + change).max(0.0);
        let tile = &mut tiles.cells_mut()[index];
        if *change > 0.0 && *tile != Tile::Lava {
            *tile = Tile::Lava;
            report.seeded += 1;
        }
    }
    for (index, amount) in deltas.outflow.iter().enumerate() {
        step_outflow[index] += amount;
        report.moved += amount;
    }
}

fn stabilize(
    tiles: &mut Grid<Tile>,
    cells: &mut Grid<LavaCell>,
    config: &LavaConfig,
    step_outflow: &[f32],
    report: &mut LavaStepReport,
) {
    let ceiling = config.mass_ceiling();
    for index in 0..tiles.len() {
        if tiles.cells()[index] != Tile::Lava {
            continue;
        }
        let cell = &mut cells.cells_mut()[index];
        cell.mass = cell.mass.clamp(0.0, ceiling);
        if cell.mass < config.evaporation_level {
            let lost = config.evaporation_rate.min(cell.mass);
            cell.mass -= lost;
            report.evaporated += lost;
        }
        cell.flow = cell.flow * config.flow_damping + step_outflow[index];
        cell.settled = step_outflow[index] == 0.0;
        if cell.mass <= config.min_mass {
            report.evaporated += cell.mass;
            *cell = LavaCell::default();
            tiles.cells_mut()[index] = Tile::Empty;
            report.removed += 1;
        }
    }
}

/// Summed mass over every cell.
pub fn total_mass(cells: &Grid<LavaCell>) -> f64 {
    cells.cells().iter().map(|cell| f64::from(cell.mass)).sum()
}

/// Presentation state derived from neighbour mass deltas with exponential
/// smoothing. Nothing in the simulation reads it.
#[derive(Clone, Debug)]
pub struct LavaVisual {
    cells: Grid<LavaVisualCell>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LavaVisualCell {
    /// Smoothed horizontal flow direction in `[-1, 1]`.
    pub direction: f32,
    /// Smoothed vertical stretch, `1.0` at rest.
    pub stretch: f32,
}

impl LavaVisual {
    const RESPONSE: f32 = 8.0;

    pub fn new(width: usize, height: usize) -> Self {
        Self { cells: Grid::new(width, height, LavaVisualCell { direction: 0.0, stretch: 1.0 }) }
    }

    pub fn get(&self, x: usize, y: usize) -> Option<LavaVisualCell> {
        self.cells.get(x as i32, y as i32)
    }

    pub fn update(
        &mut self,
        tiles: &Grid<Tile>,
        lava: &Grid<LavaCell>,
        config: &LavaConfig,
        dt: f32,
    ) {
        let blend = 1.0 - (-Self::RESPONSE * dt.max(0.0)).exp();
        let mass_at = |x: i32, y: i32| lava.get(x, y).map_or(0.0, |cell| cell.mass);
        for x in 0..tiles.width() {
            for y in 0..tiles.height() {
                let current = self.cells.at(x, y);
                let (ix, iy) = (x as i32, y as i32);
                let target = if tiles.at(x, y) == Tile::Lava {
                    let direction = (mass_at(ix - 1, iy) - mass_at(ix + 1, iy)).clamp(-1.0, 1.0);
                    let fill = mass_at(ix, iy) / config.max_mass;
                    let stretch = fill.clamp(0.0, 1.0 + config.max_compress);
                    LavaVisualCell { direction, stretch }
                } else {
                    LavaVisualCell { direction: 0.0, stretch: 1.0 }
                };
                self.cells.set(
                    x,
                    y,
                    LavaVisualCell {
                        direction: current.direction
                            + (target.direction - current.direction) * blend,
                        stretch: current.stretch + (target.stretch - current.stretch) * blend,
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walled(width: usize, height: usize) -> Grid<Tile> {
        let mut tiles = Grid::new(width, height, Tile::Empty);
        for x in 0..width {
            for y in 0..height {
                if tiles.is_border(x, y) {
                    tiles.set(x, y, Tile::Wall);
                }
            }
        }
        tiles
    }

    fn drop_lava(
        tiles: &mut Grid<Tile>,
        cells: &mut Grid<LavaCell>,
        x: usize,
        y: usize,
        mass: f32,
    ) {
        tiles.set(x, y, Tile::Lava);
        cells.set(x, y, LavaCell { mass, flow: 0.0, settled: false });
    }

    fn codes_match_mass(tiles: &Grid<Tile>, cells: &Grid<LavaCell>, config: &LavaConfig) -> bool {
        tiles
            .cells()
            .iter()
            .zip(cells.cells())
            .all(|(tile, cell)| (*tile == Tile::Lava) == (cell.mass > config.min_mass))
    }

    #[test]
    fn falling_lava_moves_down_one_row_per_step() {
        let config = LavaConfig::default();
        let mut tiles = walled(8, 10);
        let mut cells = Grid::new(8, 10, LavaCell::default());
        drop_lava(&mut tiles, &mut cells, 4, 1, 1.0);
        step(&mut tiles, &mut cells, &config);
        assert_eq!(tiles.at(4, 2), Tile::Lava);
        assert_eq!(tiles.at(4, 3), Tile::Empty);
        assert!(codes_match_mass(&tiles, &cells, &config));
    }

    #[test]
    fn supported_lava_spreads_sideways() {
        let config = LavaConfig::default();
        let mut tiles = walled(12, 4);
        let mut cells = Grid::new(12, 4, LavaCell::default());
        drop_lava(&mut tiles, &mut cells, 6, 2, 1.0);
        let before = total_mass(&cells);
        step(&mut tiles, &mut cells, &config);
        assert_eq!(tiles.at(5, 2), Tile::Lava);
        assert_eq!(tiles.at(7, 2), Tile::Lava);
        assert!(total_mass(&cells) <= before + 1e-5);
        assert!(codes_match_mass(&tiles, &cells, &config));
    }

    #[test]
    fn thin_lava_evaporates_and_clears_its_tile() {
        let config = LavaConfig::default();
        let mut tiles = walled(5, 4);
        let mut cells = Grid::new(5, 4, LavaCell::default());
        drop_lava(&mut tiles, &mut cells, 2, 2, config.min_mass + 0.0005);
        step(&mut tiles, &mut cells, &config);
        assert_eq!(tiles.at(2, 2), Tile::Empty);
        assert_eq!(cells.at(2, 2), LavaCell::default());
    }

    #[test]
    fn lava_never_enters_solid_or_fixture_tiles() {
        let config = LavaConfig::default();
        let mut tiles = walled(7, 5);
        let mut cells = Grid::new(7, 5, LavaCell::default());
        tiles.set(2, 3, Tile::Chest);
        tiles.set(4, 3, Tile::Ladder);
        drop_lava(&mut tiles, &mut cells, 3, 3, 1.0);
        for _ in 0..20 {
            step(&mut tiles, &mut cells, &config);
        }
        assert_eq!(tiles.at(2, 3), Tile::Chest);
        assert_eq!(tiles.at(4, 3), Tile::Ladder);
    }

    #[test]
    fn cadence_runs_one_step_every_n_frames() {
        let config = LavaConfig { frames_per_step: 3, ..LavaConfig::default() };
        let mut sim = LavaSimulation::new(config);
        let mut tiles = walled(6, 6);
        let mut cells = Grid::new(6, 6, LavaCell::default());
        let ran: Vec<u32> = (0..7).map(|_| sim.tick(&mut tiles, &mut cells)).collect();
        assert_eq!(ran, vec![0, 0, 1, 0, 0, 1, 0]);
        assert_eq!(sim.steps(), 2);
    }

    #[test]
    fn visual_state_relaxes_towards_rest() {
        let config = LavaConfig::default();
        let mut tiles = walled(6, 4);
        let mut cells = Grid::new(6, 4, LavaCell::default());
        drop_lava(&mut tiles, &mut cells, 2, 2, 1.0);
        let mut visual = LavaVisual::new(6, 4);
        visual.update(&tiles, &cells, &config, 0.1);
        let moving = visual.get(2, 2).expect("in bounds");
        assert!(moving.direction.abs() <= 1.0);
        tiles.set(2, 2, Tile::Empty);
        cells.set(2, 2, LavaCell::default());
        for _ in 0..60 {
            visual.update(&tiles, &cells, &config, 0.1);
        }
        let rest = visual.get(2, 2).expect("in bounds");
        assert!(rest.direction.abs() < 1e-3);
        assert!((rest.stretch - 1.0).abs() < 1e-3);
    }
}
