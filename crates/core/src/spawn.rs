//! Spawn selection: sampled ground candidates ranked by local openness, a few
//! capped flood fills, and a degradation chain that always yields a position.

use std::collections::VecDeque;

use tracing::{info, warn};

use crate::config::SpawnConfig;
use crate::grid::{Grid, TileQuery};
use crate::types::{Pos, Tile};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpawnTier {
    /// A flood fill reached the configured share of all empty tiles.
    Reachable,
    /// No candidate met the threshold; the one reaching the most was kept.
    BestCandidate,
    /// Nearest ground tile found searching outward from the map centre.
    CenterSearch,
    /// First empty tile in scan order, not necessarily on ground.
    FirstEmpty,
    Fallback,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpawnPoint {
    pub pos: Pos,
    pub tier: SpawnTier,
    /// Empty tiles reached by the flood fill that chose this point (0 when no
    /// flood fill ran).
    pub reachable: usize,
}

fn passable(tile: Tile) -> bool {
    tile.is_empty() || matches!(tile, Tile::Platform | Tile::Lava)
}

/// Standing spot: empty with solid footing directly below, inside the border.
pub fn is_ground(tiles: &Grid<Tile>, x: usize, y: usize) -> bool {
    let (ix, iy) = (x as i32, y as i32);
    !tiles.is_border(x, y) && tiles.is_tile_empty(ix, iy) && tiles.is_solid_tile(ix, iy + 1)
}

/// Counts empty tiles reachable from `start` through empty, platform, and lava
/// tiles in eight directions, stopping once `cap` is reached.
pub fn reachable_empty(tiles: &Grid<Tile>, start: (usize, usize), cap: usize) -> usize {
    let (width, height) = (tiles.width(), tiles.height());
    if start.0 >= width || start.1 >= height || !passable(tiles.at(start.0, start.1)) {
        return 0;
    }
    let mut visited = Grid::new(width, height, false);
    let mut queue = VecDeque::new();
    visited.set(start.0, start.1, true);
    queue.push_back(start);
    let mut count = 0;
    while let Some((x, y)) = queue.pop_front() {
        if tiles.at(x, y).is_empty() {
            count += 1;
            if count >= cap {
                break;
            }
        }
        for dx in -1_i32..=1 {
            for dy in -1_i32..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let (nx, ny) = (x as i32 + dx, y as i32 + dy);
                let Some(tile) = tiles.get(nx, ny) else {
                    continue;
                };
                let (nx, ny) = (nx as usize, ny as usize);
                if visited.at(nx, ny) || !passable(tile) {
                    continue;
                }
                visited.set(nx, ny, true);
                queue.push_back((nx, ny));
            }
        }
    }
    count
}

/// Cheap openness proxy: passable tiles on a stride-2 lattice around `(x, y)`.
fn local_density(tiles: &Grid<Tile>, x: usize, y: usize, radius: usize) -> usize {
    let radius = radius as i32;
    let mut score = 0;
    for dx in (-radius..=radius).step_by(2) {
        for dy in (-radius..=radius).step_by(2) {
            if tiles.get(x as i32 + dx, y as i32 + dy).is_some_and(passable) {
                score += 1;
            }
        }
    }
    score
}

fn sample_candidates(tiles: &Grid<Tile>, stride: usize) -> Vec<(usize, usize)> {
    let (width, height) = (tiles.width(), tiles.height());
    let mut candidates = Vec::new();
    if width < 3 || height < 3 {
        return candidates;
    }
    for x in (1..width - 1).step_by(stride) {
        for y in (1..height - 1).step_by(stride) {
            let bottom = (y + stride).min(height - 1);
            if let Some(ground) = (y..bottom).find(|&gy| is_ground(tiles, x, gy)) {
                candidates.push((x, ground));
            }
        }
    }
    candidates
}

/// Offsets at Chebyshev distance exactly `radius`, column by column.
fn ring(radius: i32) -> impl Iterator<Item = (i32, i32)> {
    (-radius..=radius).flat_map(move |dx| {
        let step = if dx.abs() == radius { 1 } else { (2 * radius) as usize };
        (-radius..=radius).step_by(step).map(move |dy| (dx, dy))
    })
}

fn center_search(tiles: &Grid<Tile>) -> Option<(usize, usize)> {
    let (width, height) = (tiles.width() as i32, tiles.height() as i32);
    let (cx, cy) = (width / 2, height / 2);
    (0..=width.max(height)).flat_map(ring).find_map(|(dx, dy)| {
        let (x, y) = (cx + dx, cy + dy);
        (tiles.in_bounds(x, y) && is_ground(tiles, x as usize, y as usize))
            .then_some((x as usize, y as usize))
    })
}

pub fn find_empty_spawn(tiles: &Grid<Tile>, config: &SpawnConfig) -> SpawnPoint {
    let point = select(tiles, config);
    match point.tier {
        SpawnTier::Reachable => {
            info!(
                x = point.pos.x,
                y = point.pos.y,
                reachable = point.reachable,
                tier = ?point.tier,
                "spawn selected"
            );
        }
        _ => {
            warn!(
                x = point.pos.x,
                y = point.pos.y,
                reachable = point.reachable,
                tier = ?point.tier,
                "spawn fell back"
            );
        }
    }
    point
}

fn select(tiles: &Grid<Tile>, config: &SpawnConfig) -> SpawnPoint {
    let total_empty = tiles.count(Tile::is_empty);
    let wanted = ((total_empty as f64 * f64::from(config.reachable_fraction)).ceil() as usize)
        .min(config.reachability_cap)
        .max(1);

    let mut ranked: Vec<(usize, (usize, usize))> =
        sample_candidates(tiles, config.sample_stride.max(1))
            .into_iter()
            .map(|(x, y)| (local_density(tiles, x, y, config.density_radius), (x, y)))
            .collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    let mut best: Option<((usize, usize), usize)> = None;
    for &(_, candidate) in ranked.iter().take(config.top_candidates) {
        let reached = reachable_empty(tiles, candidate, config.reachability_cap);
        let point =
            SpawnPoint { pos: to_pos(candidate), tier: SpawnTier::Reachable, reachable: reached };
        if reached >= wanted {
            return point;
        }
        if best.is_none_or(|(_, most)| reached > most) {
            best = Some((candidate, reached));
        }
    }
    if let Some((candidate, reached)) = best {
        return SpawnPoint {
            pos: to_pos(candidate),
            tier: SpawnTier::BestCandidate,
            reachable: reached,
        };
    }

    if let Some(found) = center_search(tiles) {
        return SpawnPoint { pos: to_pos(found), tier: SpawnTier::CenterSearch, reachable: 0 };
    }
    if let Some(index) = tiles.cells().iter().position(|tile| tile.is_empty()) {
        let found = tiles.position(index);
        return SpawnPoint { pos: to_pos(found), tier: SpawnTier::FirstEmpty, reachable: 0 };
    }
    let fallback =
        (1.min(tiles.width().saturating_sub(1)), 1.min(tiles.height().saturating_sub(1)));
    SpawnPoint { pos: to_pos(fallback), tier: SpawnTier::Fallback, reachable: 0 }
}

fn to_pos((x, y): (usize, usize)) -> Pos {
    Pos::new(x as i32, y as i32)
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

    #[test]
    fn open_room_spawns_on_the_floor_with_full_reach() {
        let tiles = walled(40, 20);
        let point = find_empty_spawn(&tiles, &SpawnConfig::default());
        assert_eq!(point.tier, SpawnTier::Reachable);
        let (x, y) = (point.pos.x, point.pos.y);
        assert!(tiles.is_tile_empty(x, y));
        assert!(tiles.is_solid_tile(x, y + 1));
    }

    #[test]
    fn flood_fill_stops_at_the_cap() {
        let tiles = walled(30, 30);
        assert_eq!(reachable_empty(&tiles, (5, 5), 50), 50);
        assert_eq!(reachable_empty(&tiles, (5, 5), usize::MAX), 28 * 28);
        assert_eq!(reachable_empty(&tiles, (0, 0), 50), 0);
    }

    #[test]
    fn flood_fill_crosses_diagonal_gaps_and_platforms() {
        let mut tiles = walled(10, 10);
        for y in 1..9 {
            tiles.set(5, y, Tile::Wall);
        }
        tiles.set(5, 4, Tile::Platform);
        let reached = reachable_empty(&tiles, (1, 1), usize::MAX);
        assert_eq!(reached, tiles.count(Tile::is_empty));
    }

    #[test]
    fn split_map_prefers_the_larger_side() {
        let mut tiles = walled(60, 20);
        for y in 1..19 {
            tiles.set(10, y, Tile::Wall);
        }
        let config = SpawnConfig { reachable_fraction: 1.0, ..SpawnConfig::default() };
        let point = find_empty_spawn(&tiles, &config);
        assert_eq!(point.tier, SpawnTier::BestCandidate);
        assert!(point.pos.x > 10);
    }

    #[test]
    fn solid_map_degrades_to_the_fallback_coordinate() {
        let tiles = Grid::new(12, 8, Tile::Wall);
        let point = find_empty_spawn(&tiles, &SpawnConfig::default());
        assert_eq!(point.tier, SpawnTier::Fallback);
        assert_eq!(point.pos, Pos::new(1, 1));

        let sliver = Grid::new(1, 1, Tile::Wall);
        let point = find_empty_spawn(&sliver, &SpawnConfig::default());
        assert_eq!(point.pos, Pos::new(0, 0));
    }

    #[test]
    fn floating_empty_tile_is_found_by_the_scan() {
        let mut tiles = Grid::new(12, 8, Tile::Wall);
        tiles.set(4, 3, Tile::Empty);
        tiles.set(4, 4, Tile::Ladder);
        let point = find_empty_spawn(&tiles, &SpawnConfig::default());
        assert_eq!(point.tier, SpawnTier::FirstEmpty);
        assert_eq!(point.pos, Pos::new(4, 3));
    }

    #[test]
    fn ring_walks_only_the_chebyshev_shell() {
        assert_eq!(ring(0).collect::<Vec<_>>(), vec![(0, 0)]);
        for radius in 1..6 {
            let shell: Vec<(i32, i32)> = ring(radius).collect();
            assert_eq!(shell.len(), 8 * radius as usize);
            assert!(shell.iter().all(|&(dx, dy)| dx.abs().max(dy.abs()) == radius));
            let mut unique = shell.clone();
            unique.sort_unstable();
            unique.dedup();
            assert_eq!(unique.len(), shell.len());
        }
    }

    #[test]
    fn centre_search_takes_the_closest_shell_first() {
        let mut tiles = Grid::new(41, 41, Tile::Wall);
        tiles.set(33, 20, Tile::Empty);
        tiles.set(20, 25, Tile::Empty);
        assert_eq!(center_search(&tiles), Some((20, 25)));
        assert_eq!(center_search(&Grid::new(9, 9, Tile::Wall)), None);
    }

    #[test]
    fn unsampled_ground_is_found_from_the_centre() {
        let mut tiles = Grid::new(40, 40, Tile::Wall);
        tiles.set(20, 20, Tile::Empty);
        let config = SpawnConfig { sample_stride: 64, ..SpawnConfig::default() };
        let point = find_empty_spawn(&tiles, &config);
        assert_eq!(point.tier, SpawnTier::CenterSearch);
        assert_eq!(point.pos, Pos::new(20, 20));
    }
}
