//! Per-tile transition timers: highlight, glitch, commit.

use crate::config::AutomataConfig;
use crate::grid::Grid;
use crate::lava::LavaCell;
use crate::rng::RandomSource;
use crate::types::Tile;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransitionReport {
    pub glitched: usize,
    pub committed_solid: usize,
    pub committed_empty: usize,
    pub protection_resets: usize,
}

/// Mutable state the transition tick walks over.
#[derive(Debug)]
pub struct TransitionState<'a> {
    pub tiles: &'a mut Grid<Tile>,
    pub timers: &'a mut Grid<f32>,
    pub original_solid: &'a mut Grid<bool>,
    pub protected: &'a mut Grid<bool>,
    pub lava: &'a mut Grid<LavaCell>,
}

/// What a conway-protected tile must read: WALL where the skeleton was solid,
/// otherwise an empty-category tile.
fn protected_value(current: Tile, original_solid: bool) -> Tile {
    if original_solid {
        Tile::Wall
    } else if current.is_empty() {
        current
    } else {
        Tile::Empty
    }
}

pub fn update_transitions<R: RandomSource>(
    state: TransitionState<'_>,
    config: &AutomataConfig,
    rng: &mut R,
    dt: f32,
) -> TransitionReport {
    let mut report = TransitionReport::default();
    let dt = dt.max(0.0);
    for index in 0..state.tiles.len() {
        let current = state.tiles.cells()[index];

        if state.protected.cells()[index] {
            let wanted = protected_value(current, state.original_solid.cells()[index]);
            if wanted != current {
                state.tiles.cells_mut()[index] = wanted;
                state.timers.cells_mut()[index] = 0.0;
                state.lava.cells_mut()[index] = LavaCell::default();
                report.protection_resets += 1;
            }
            continue;
        }

        if !current.is_transition() {
            continue;
        }
        let timer = &mut state.timers.cells_mut()[index];
        *timer += dt;
        let next = match current {
            Tile::HighlightCreate if *timer >= config.highlight_time => {
                report.glitched += 1;
                if rng.coin() { Tile::GlitchCreateSolid } else { Tile::GlitchCreatePlatform }
            }
            Tile::HighlightDelete if *timer >= config.highlight_time => {
                report.glitched += 1;
                Tile::GlitchDelete
            }
            Tile::GlitchCreateSolid if *timer >= config.glitch_time => Tile::Floor,
            Tile::GlitchCreatePlatform if *timer >= config.glitch_time => Tile::Platform,
            Tile::GlitchDelete if *timer >= config.glitch_time => Tile::Empty,
            _ => continue,
        };
        *timer = 0.0;
        state.tiles.cells_mut()[index] = next;
        match next {
            Tile::Floor | Tile::Platform => {
                state.original_solid.cells_mut()[index] = false;
                state.protected.cells_mut()[index] = false;
                report.committed_solid += 1;
            }
            Tile::Empty => report.committed_empty += 1,
            _ => {}
        }
    }
    report
}

/// Blink envelope for highlighted tiles: a triangle wave over
/// `blink_cycle_time`, starting opaque and never dropping below
/// `min_blink_alpha`.
pub fn highlight_alpha(timer: f32, config: &AutomataConfig) -> f32 {
    if config.blink_cycle_time <= 0.0 {
        return 1.0;
    }
    let phase = timer.max(0.0).rem_euclid(config.blink_cycle_time) / config.blink_cycle_time;
    (2.0 * phase - 1.0).abs().clamp(config.min_blink_alpha, 1.0)
}
