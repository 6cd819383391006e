//! Chunked life-like terrain mutation.
//!
//! A step never edits tiles in place. Bands of columns compute candidate
//! chunks in parallel against the current grid, a balance pass picks which
//! candidates commit, and the caller swaps the resulting grid in whole.

pub mod transitions;

use std::sync::Mutex;

use rayon::prelude::*;
use tracing::debug;

use crate::config::AutomataConfig;
use crate::grid::Grid;
use crate::pool::WorkerPool;
use crate::rng::{GenRng, RandomSource, mix_seed_stream, streams};
use crate::types::{Tile, TileCategory};

pub use transitions::{TransitionReport, TransitionState, highlight_alpha, update_transitions};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AutomataReport {
    pub chunks_considered: usize,
    pub chunks_skipped: usize,
    pub creates: usize,
    pub deletes: usize,
}

impl AutomataReport {
    pub fn net_drift(&self) -> i64 {
        self.creates as i64 - self.deletes as i64
    }
}

/// Read-only view the automata evaluates against.
#[derive(Clone, Copy, Debug)]
pub struct AutomataInput<'a> {
    pub tiles: &'a Grid<Tile>,
    pub original_solid: &'a Grid<bool>,
    pub protected: &'a Grid<bool>,
}

#[derive(Debug)]
pub struct AutomataStep {
    pub next: Grid<Tile>,
    /// Indices that entered a highlight state; their timers restart.
    pub touched: Vec<usize>,
    pub report: AutomataReport,
}

/// A chunk that passed the skip rule and has at least one tile to flip.
#[derive(Clone, Debug)]
struct Candidate {
    alive: bool,
    cells: Vec<usize>,
}

#[derive(Debug, Default)]
struct BandResult {
    candidates: Vec<Candidate>,
    considered: usize,
    skipped: usize,
    creatable: usize,
    deletable: usize,
}

/// Seed for one band of one step.
pub fn band_seed(seed: u64, step: u64, band: usize) -> u64 {
    mix_seed_stream(mix_seed_stream(seed, streams::AUTOMATA.wrapping_add(step)), band as u64)
}

pub fn apply_conway_automata(
    input: AutomataInput<'_>,
    config: &AutomataConfig,
    seed: u64,
    step: u64,
    pool: &WorkerPool,
) -> AutomataStep {
    let width = input.tiles.width();
    let height = input.tiles.height();
    let bands = config.bands.max(1).min(width.max(1));
    let band_width = width.div_ceil(bands).max(1);
    let processed = Mutex::new(Grid::new(width, height, false));

    let results: Vec<BandResult> = pool.install(|| {
        (0..bands)
            .into_par_iter()
            .map(|band| {
                let x0 = band * band_width;
                let x1 = ((band + 1) * band_width).min(width);
                let mut rng = GenRng::seeded(band_seed(seed, step, band));
                evaluate_band(input, config, x0, x1, &processed, &mut rng)
            })
            .collect()
    });

    let mut report = AutomataReport::default();
    let mut candidates = Vec::new();
    let (mut creatable, mut deletable) = (0, 0);
    for result in results {
        report.chunks_considered += result.considered;
        report.chunks_skipped += result.skipped;
        creatable += result.creatable;
        deletable += result.deletable;
        candidates.extend(result.candidates);
    }

    let cap = creatable.min(deletable) + config.balance_slack;
    let mut rng = GenRng::seeded(band_seed(seed, step, bands));
    rng.shuffle(&mut candidates);

    let mut next = input.tiles.clone();
    let mut touched = Vec::new();
    for candidate in candidates {
        let len = candidate.cells.len();
        let (creates, deletes) = if candidate.alive {
            (report.creates + len, report.deletes)
        } else {
            (report.creates, report.deletes + len)
        };
        if creates.max(deletes) > cap {
            continue;
        }
        let drift = creates.abs_diff(deletes);
        let current = report.creates.abs_diff(report.deletes);
        if drift > config.balance_slack && drift >= current {
            continue;
        }
        let target = if candidate.alive { Tile::HighlightCreate } else { Tile::HighlightDelete };
        for &index in &candidate.cells {
            next.cells_mut()[index] = target;
        }
        touched.extend(candidate.cells);
        report.creates = creates;
        report.deletes = deletes;
    }

    debug!(
        step,
        considered = report.chunks_considered,
        skipped = report.chunks_skipped,
        creates = report.creates,
        deletes = report.deletes,
        cap,
        "automata step"
    );
    AutomataStep { next, touched, report }
}

fn evaluate_band<R: RandomSource>(
    input: AutomataInput<'_>,
    config: &AutomataConfig,
    x0: usize,
    x1: usize,
    processed: &Mutex<Grid<bool>>,
    rng: &mut R,
) -> BandResult {
    let tiles = input.tiles;
    let height = tiles.height();
    let mut result = BandResult::default();
    if height < 3 {
        return result;
    }
    let max_len = config.chunk_max_len.max(config.chunk_min_len);

    for x in x0..x1 {
        for y in 1..height - 1 {
            let length = rng.range_usize(config.chunk_min_len, max_len);
            let thickness = rng.range_usize(1, config.chunk_max_thickness.max(1));
            let (chunk_w, chunk_h) =
                if rng.coin() { (length, thickness) } else { (thickness, length) };
            let cx1 = (x + chunk_w).min(x1);
            let cy1 = (y + chunk_h).min(height - 1);

            let claimed = match processed.lock() {
                Ok(mut table) => claim(&mut table, x, y, cx1, cy1),
                Err(poisoned) => claim(&mut poisoned.into_inner(), x, y, cx1, cy1),
            };
            if claimed.is_empty() {
                continue;
            }
            result.considered += 1;

            if claimed.iter().any(|&index| blocks_mutation(input, index)) {
                result.skipped += 1;
                continue;
            }

            let empties: Vec<usize> = claimed
                .iter()
                .copied()
                .filter(|&index| tiles.cells()[index] == Tile::Empty)
                .collect();
            let solids: Vec<usize> = claimed
                .iter()
                .copied()
                .filter(|&index| tiles.cells()[index].is_mutable_solid())
                .collect();
            result.creatable += empties.len();
            result.deletable += solids.len();

            let alive = rng.coin();
            let cells = if alive { empties } else { solids };
            if !cells.is_empty() {
                result.candidates.push(Candidate { alive, cells });
            }
        }
    }
    result
}

/// Marks every unclaimed cell of the rectangle `[x0, x1) x [y0, y1)` and
/// returns the cells this call claimed.
fn claim(table: &mut Grid<bool>, x0: usize, y0: usize, x1: usize, y1: usize) -> Vec<usize> {
    let mut claimed = Vec::new();
    for x in x0..x1 {
        for y in y0..y1 {
            if !table.at(x, y) {
                table.set(x, y, true);
                claimed.push(table.index(x, y));
            }
        }
    }
    claimed
}

fn blocks_mutation(input: AutomataInput<'_>, index: usize) -> bool {
    let tile = input.tiles.cells()[index];
    let (x, y) = input.tiles.position(index);
    input.tiles.is_border(x, y)
        || input.protected.cells()[index]
        || input.original_solid.cells()[index]
        || matches!(
            tile.category(),
            TileCategory::Climbable
                | TileCategory::Fixture
                | TileCategory::Lava
                | TileCategory::Transition
        )
        || matches!(tile, Tile::Wall | Tile::ProtectedEmpty)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        tiles: Grid<Tile>,
        original_solid: Grid<bool>,
        protected: Grid<bool>,
    }

    impl Fixture {
        fn open(width: usize, height: usize) -> Self {
            let mut tiles = Grid::new(width, height, Tile::Empty);
            let mut original_solid = Grid::new(width, height, false);
            for x in 0..width {
                for y in 0..height {
                    if tiles.is_border(x, y) {
                        tiles.set(x, y, Tile::Wall);
                        original_solid.set(x, y, true);
                    } else if (x + y) % 3 == 0 {
                        tiles.set(x, y, Tile::Floor);
                    }
                }
            }
            Self { tiles, original_solid, protected: Grid::new(width, height, false) }
        }

        fn input(&self) -> AutomataInput<'_> {
            AutomataInput {
                tiles: &self.tiles,
                original_solid: &self.original_solid,
                protected: &self.protected,
            }
        }
    }

    #[test]
    fn step_marks_only_highlight_states_and_keeps_the_border() {
        let fixture = Fixture::open(60, 40);
        let pool = WorkerPool::new(2).expect("pool");
        let outcome =
            apply_conway_automata(fixture.input(), &AutomataConfig::default(), 5, 0, &pool);
        assert!(outcome.report.chunks_considered > 0);
        for &index in &outcome.touched {
            let before = fixture.tiles.cells()[index];
            let after = outcome.next.cells()[index];
            match after {
                Tile::HighlightCreate => assert_eq!(before, Tile::Empty),
                Tile::HighlightDelete => assert!(before.is_mutable_solid()),
                other => panic!("unexpected tile {other:?}"),
            }
        }
        for x in 0..60 {
            for y in 0..40 {
                if fixture.tiles.is_border(x, y) {
                    assert_eq!(outcome.next.at(x, y), Tile::Wall);
                }
            }
        }
    }

    #[test]
    fn protected_and_original_tiles_never_change() {
        let mut fixture = Fixture::open(50, 30);
        for x in 10..20 {
            for y in 5..15 {
                fixture.protected.set(x, y, true);
            }
        }
        fixture.tiles.set(30, 10, Tile::Platform);
        fixture.original_solid.set(30, 10, true);
        let pool = WorkerPool::new(3).expect("pool");
        let outcome =
            apply_conway_automata(fixture.input(), &AutomataConfig::default(), 8, 1, &pool);
        for x in 10..20 {
            for y in 5..15 {
                assert_eq!(outcome.next.at(x, y), fixture.tiles.at(x, y));
            }
        }
        assert_eq!(outcome.next.at(30, 10), Tile::Platform);
    }

    #[test]
    fn net_drift_stays_within_the_slack() {
        let fixture = Fixture::open(120, 80);
        let pool = WorkerPool::new(4).expect("pool");
        let config = AutomataConfig::default();
        for step in 0..8 {
            let outcome = apply_conway_automata(fixture.input(), &config, 77, step, &pool);
            assert!(outcome.report.net_drift().unsigned_abs() as usize <= config.balance_slack);
        }
    }

    #[test]
    fn result_does_not_depend_on_pool_size() {
        let fixture = Fixture::open(80, 50);
        let config = AutomataConfig::default();
        let single = WorkerPool::new(1).expect("pool");
        let many = WorkerPool::new(4).expect("pool");
        let a = apply_conway_automata(fixture.input(), &config, 123, 3, &single);
        let b = apply_conway_automata(fixture.input(), &config, 123, 3, &many);
        assert_eq!(a.next, b.next);
        assert_eq!(a.report, b.report);
    }

    #[test]
    fn claim_skips_cells_already_taken() {
        let mut table = Grid::new(6, 6, false);
        assert_eq!(claim(&mut table, 1, 1, 4, 2).len(), 3);
        assert_eq!(claim(&mut table, 2, 1, 5, 3).len(), 4);
    }
}
