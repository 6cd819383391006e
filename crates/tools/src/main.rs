use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use map_core::{GenerationConfig, Grid, Map, Tile, WorkerPool};
use serde::Serialize;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate one map and print its statistics
    Generate {
        #[command(flatten)]
        map: MapArgs,
        /// Print a machine-readable summary instead of text
        #[arg(long)]
        json: bool,
        /// Print the map as ASCII, one character per `scale` x `scale` block
        #[arg(long)]
        preview: bool,
        #[arg(long, default_value_t = 4)]
        scale: usize,
    },
    /// Generate a map, then run the automata, transition, and lava loop
    Simulate {
        #[command(flatten)]
        map: MapArgs,
        #[arg(short, long, default_value_t = 600)]
        frames: u32,
        /// Frames between automata steps
        #[arg(long, default_value_t = 120)]
        automata_every: u32,
        #[arg(long, default_value_t = 60.0)]
        fps: f32,
    },
}

#[derive(Args)]
struct MapArgs {
    /// TOML configuration file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long, default_value_t = 42)]
    seed: u64,
    #[arg(long)]
    width: Option<usize>,
    #[arg(long)]
    height: Option<usize>,
    /// Worker threads; overrides the configuration file
    #[arg(short, long)]
    threads: Option<usize>,
}

impl MapArgs {
    fn load(&self) -> Result<(GenerationConfig, WorkerPool)> {
        let mut config = match &self.config {
            Some(path) => GenerationConfig::load(path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?,
            None => GenerationConfig::default(),
        };
        let width = self.width.unwrap_or(config.map.width);
        let height = self.height.unwrap_or(config.map.height);
        config = config.with_size(width, height);
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        config.validate().context("Invalid configuration")?;
        let pool = WorkerPool::new(config.threads).context("Failed to build worker pool")?;
        Ok((config, pool))
    }

    fn generate(&self) -> Result<Map> {
        let (config, pool) = self.load()?;
        let started = Instant::now();
        let map = Map::new(config, self.seed, &pool)
            .with_context(|| format!("Map generation failed for seed {}", self.seed))?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(seed = self.seed, elapsed_ms, "generation finished");
        Ok(map)
    }
}

#[derive(Serialize)]
struct Summary {
    seed: u64,
    width: usize,
    height: usize,
    fingerprint: String,
    rooms: RoomSummary,
    connections: ConnectionSummary,
    content: ContentSummary,
    spawn: SpawnSummary,
}

#[derive(Serialize)]
struct RoomSummary {
    normal: usize,
    treasure: usize,
    shop: usize,
    halls: usize,
}

#[derive(Serialize)]
struct ConnectionSummary {
    mst_edges: usize,
    loop_edges: usize,
    direct: usize,
    spans_committed: usize,
    span_tiles_skipped: usize,
}

#[derive(Serialize)]
struct ContentSummary {
    chests: usize,
    shops: usize,
    lava_pockets: usize,
    climbables: usize,
    lava_mass: f64,
}

#[derive(Serialize)]
struct SpawnSummary {
    x: i32,
    y: i32,
    tier: String,
    reachable: usize,
}

impl Summary {
    fn of(map: &Map) -> Self {
        let stats = map.stats();
        let spawn = map.find_empty_spawn();
        Self {
            seed: map.seed(),
            width: map.width(),
            height: map.height(),
            fingerprint: format!("{:016x}", map.fingerprint()),
            rooms: RoomSummary {
                normal: stats.normal_rooms,
                treasure: stats.treasure_rooms,
                shop: stats.shop_rooms,
                halls: stats.halls,
            },
            connections: ConnectionSummary {
                mst_edges: stats.mst_edges,
                loop_edges: stats.loop_edges,
                direct: stats.direct_connections,
                spans_committed: stats.spans_committed,
                span_tiles_skipped: stats.spans_tiles_skipped,
            },
            content: ContentSummary {
                chests: stats.chests_placed,
                shops: stats.shops_placed,
                lava_pockets: stats.lava_pockets,
                climbables: stats.content_spans,
                lava_mass: map.total_lava_mass(),
            },
            spawn: SpawnSummary {
                x: spawn.pos.x,
                y: spawn.pos.y,
                tier: format!("{:?}", spawn.tier),
                reachable: spawn.reachable,
            },
        }
    }

    fn print(&self) {
        println!("Seed: {}", self.seed);
        println!("Size: {}x{}", self.width, self.height);
        println!("Fingerprint: {}", self.fingerprint);
        println!(
            "Rooms: {} normal, {} treasure, {} shop ({} halls)",
            self.rooms.normal, self.rooms.treasure, self.rooms.shop, self.rooms.halls
        );
        println!(
            "Connections: {} spanning, {} loops, {} direct, {} spans ({} tiles skipped)",
            self.connections.mst_edges,
            self.connections.loop_edges,
            self.connections.direct,
            self.connections.spans_committed,
            self.connections.span_tiles_skipped
        );
        println!(
            "Content: {} chests, {} shops, {} lava pockets, {} climbables, lava mass {:.2}",
            self.content.chests,
            self.content.shops,
            self.content.lava_pockets,
            self.content.climbables,
            self.content.lava_mass
        );
        println!(
            "Spawn: ({}, {}) via {} reaching {} tiles",
            self.spawn.x, self.spawn.y, self.spawn.tier, self.spawn.reachable
        );
    }
}

fn glyph(tile: Tile) -> char {
    match tile {
        Tile::Empty | Tile::ProtectedEmpty => ' ',
        Tile::Wall => '#',
        Tile::Floor => '=',
        Tile::Platform => '-',
        Tile::Ladder => 'H',
        Tile::Rope => '|',
        Tile::Treasure => '$',
        Tile::Chest => 'C',
        Tile::Shop => 'S',
        Tile::Lava => '~',
        Tile::HighlightCreate | Tile::HighlightDelete => '?',
        Tile::GlitchCreateSolid | Tile::GlitchCreatePlatform | Tile::GlitchDelete => '%',
    }
}

/// Picks the most interesting tile of each block: anything over open space,
/// open space over wall.
fn block_glyph(tiles: &Grid<Tile>, x0: usize, y0: usize, scale: usize) -> char {
    let mut best = '#';
    for x in x0..(x0 + scale).min(tiles.width()) {
        for y in y0..(y0 + scale).min(tiles.height()) {
            let mark = glyph(tiles.at(x, y));
            match mark {
                '#' => {}
                ' ' if best == '#' => best = ' ',
                ' ' => {}
                other => return other,
            }
        }
    }
    best
}

fn render_rows(tiles: &Grid<Tile>, scale: usize) -> Vec<String> {
    let scale = scale.max(1);
    (0..tiles.height())
        .step_by(scale)
        .map(|y0| {
            (0..tiles.width())
                .step_by(scale)
                .map(|x0| block_glyph(tiles, x0, y0, scale))
                .collect()
        })
        .collect()
}

fn preview(map: &Map, scale: usize) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for row in render_rows(&map.snapshot(), scale) {
        writeln!(out, "{row}").context("Failed to write preview")?;
    }
    Ok(())
}

fn simulate(map: &mut Map, frames: u32, automata_every: u32, fps: f32) -> Result<()> {
    let dt = 1.0 / fps.max(1.0);
    let automata_every = automata_every.max(1);
    let start_mass = map.total_lava_mass();
    let (mut creates, mut deletes, mut commits, mut lava_steps) = (0, 0, 0, 0);
    for frame in 1..=frames {
        if frame % automata_every == 0 {
            let report = map.apply_conway_automata();
            creates += report.creates;
            deletes += report.deletes;
        }
        lava_steps += map.update_lava_flow(dt);
        let transitions = map.update_transitions(dt);
        commits += transitions.committed_solid + transitions.committed_empty;
        map.check_invariants().with_context(|| format!("Invariant failed at frame {frame}"))?;
    }
    println!(
        "Simulated {frames} frames ({} automata steps, {lava_steps} lava steps)",
        map.automata_steps()
    );
    println!("Automata: {creates} creates, {deletes} deletes, {commits} commits");
    println!("Lava mass: {start_mass:.3} -> {:.3}", map.total_lava_mass());
    println!("Fingerprint: {:016x}", map.fingerprint());
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Generate { map, json, preview: show, scale } => {
            let generated = map.generate()?;
            let summary = Summary::of(&generated);
            if json {
                let encoded = serde_json::to_string_pretty(&summary)
                    .context("Failed to encode summary")?;
                println!("{encoded}");
            } else {
                summary.print();
            }
            if show {
                preview(&generated, scale)?;
            }
        }
        Command::Simulate { map, frames, automata_every, fps } => {
            let mut generated = map.generate()?;
            simulate(&mut generated, frames, automata_every, fps)?;
        }
    }
    Ok(())
}
