use std::io;

use anyhow::{Context, Result, bail};
use clap::Parser;
use map_core::{GenerationConfig, Map, SpawnTier, Tile, TileCategory, TileQuery, WorkerPool};
use rand_chacha::{
    ChaCha8Rng,
    rand_core::{Rng, SeedableRng},
};
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value_t = 42)]
    seed: u64,
    /// Number of maps to generate and simulate
    #[arg(short, long, default_value_t = 20)]
    maps: u32,
    #[arg(short, long, default_value_t = 300)]
    frames: u32,
    #[arg(short, long, default_value_t = 4)]
    threads: usize,
}

fn range(rng: &mut ChaCha8Rng, min: usize, max: usize) -> usize {
    min + rng.next_u64() as usize % (max - min + 1)
}

fn choose<T: Copy>(rng: &mut ChaCha8Rng, slice: &[T]) -> T {
    slice[rng.next_u64() as usize % slice.len()]
}

/// Every room anchor must be reachable from the first one through open space,
/// platforms, and ladders or ropes.
fn check_connected(map: &Map) -> Result<()> {
    let tiles = map.snapshot();
    let mut anchors = map.generated_rooms().values().map(|room| room.connect_point());
    let Some(first) = anchors.next() else {
        return Ok(());
    };
    let mut seen = vec![false; tiles.len()];
    let mut stack = vec![(first.x, first.y)];
    seen[tiles.index(first.x as usize, first.y as usize)] = true;
    while let Some((x, y)) = stack.pop() {
        for (nx, ny) in [(x + 1, y), (x - 1, y), (x, y + 1), (x, y - 1)] {
            let walkable = map.tile(nx, ny).is_some_and(|tile| {
                matches!(
                    tile.category(),
                    TileCategory::Empty | TileCategory::Platform | TileCategory::Climbable
                )
            });
            if !walkable {
                continue;
            }
            let index = tiles.index(nx as usize, ny as usize);
            if !seen[index] {
                seen[index] = true;
                stack.push((nx, ny));
            }
        }
    }
    for anchor in anchors {
        if !seen[tiles.index(anchor.x as usize, anchor.y as usize)] {
            bail!("room anchored at ({}, {}) is cut off", anchor.x, anchor.y);
        }
    }
    Ok(())
}

fn run_one(
    seed: u64,
    width: usize,
    height: usize,
    frames: u32,
    pool: &WorkerPool,
    rng: &mut ChaCha8Rng,
) -> Result<()> {
    let config = GenerationConfig::default().with_size(width, height);
    let mut map = Map::new(config, seed, pool)?;
    map.check_invariants()?;
    check_connected(&map)?;
    let chests = map.snapshot().count(|tile| tile == Tile::Chest);
    if chests != map.stats().chests_placed {
        bail!("{chests} chests on the grid, {} recorded", map.stats().chests_placed);
    }

    let dt = 1.0 / 60.0;
    let edits = [Tile::Empty, Tile::Platform, Tile::Floor, Tile::Lava, Tile::Ladder];
    for frame in 1..=frames {
        if frame % 60 == 0 {
            let report = map.apply_conway_automata();
            let slack = map.config().automata.balance_slack as i64;
            if report.net_drift().abs() > slack {
                bail!("automata drift {} exceeds {slack}", report.net_drift());
            }
        }
        if frame % 7 == 0 {
            let x = range(rng, 0, width + 1) as i32 - 1;
            let y = range(rng, 0, height + 1) as i32 - 1;
            map.set_tile_value(x, y, choose(rng, &edits).code())?;
        }
        map.update_lava_flow(dt);
        map.update_transitions(dt);
        map.check_invariants().with_context(|| format!("frame {frame}"))?;
    }

    let spawn = map.find_empty_spawn();
    if spawn.tier == SpawnTier::Fallback {
        warn!(seed, "no empty tile left for a spawn");
    } else if !map.is_tile_empty(spawn.pos.x, spawn.pos.y) {
        bail!("spawn ({}, {}) is not empty", spawn.pos.x, spawn.pos.y);
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    println!(
        "Starting fuzz harness on seed {} for {} maps of {} frames...",
        args.seed, args.maps, args.frames
    );
    let pool = WorkerPool::new(args.threads).context("Failed to build worker pool")?;
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);

    for index in 0..args.maps {
        let seed = rng.next_u64();
        let width = range(&mut rng, 40, 260);
        let height = range(&mut rng, 30, 160);
        run_one(seed, width, height, args.frames, &pool, &mut rng)
            .with_context(|| {
                format!("Invariant failed on map {index} (seed {seed}, {width}x{height})")
            })?;
        info!(index, seed, width, height, "map passed");
    }

    println!("Fuzzing completed successfully.");
    Ok(())
}
