//! Tunables for generation and simulation, loadable from TOML.
//!
//! Every field has a default, so a config file only needs the values it
//! overrides:
//!
//! ```toml
//! threads = 4
//!
//! [map]
//! width = 320
//! height = 200
//!
//! [lava]
//! horizontal_passes = 4
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MapError, Result};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub map: MapSection,
    pub rooms: RoomSection,
    pub connections: ConnectionSection,
    pub content: ContentSection,
    pub automata: AutomataConfig,
    pub lava: LavaConfig,
    pub spawn: SpawnConfig,
    /// Worker threads for the pool; 0 lets rayon pick.
    pub threads: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapSection {
    pub width: usize,
    pub height: usize,
    pub tile_size_px: f32,
    pub render_chunk_size: usize,
}

impl Default for MapSection {
    fn default() -> Self {
        Self { width: 500, height: 300, tile_size_px: 32.0, render_chunk_size: 16 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomSection {
    pub room_min_width: usize,
    pub room_min_height: usize,
    pub room_width_jitter: usize,
    pub slot_gap: usize,
    pub skip_chance: f32,
    pub hall_chance: f32,
    pub treasure_percent: u32,
    pub shop_percent: u32,
    /// Column regions for the parallel room-grid variant; 0 or 1 runs the
    /// sequential variant.
    pub parallel_regions: usize,
}

impl Default for RoomSection {
    fn default() -> Self {
        Self {
            room_min_width: 16,
            room_min_height: 12,
            room_width_jitter: 8,
            slot_gap: 2,
            skip_chance: 0.05,
            hall_chance: 0.15,
            treasure_percent: 8,
            shop_percent: 5,
            parallel_regions: 4,
        }
    }
}

impl RoomSection {
    pub fn slot_width(&self) -> usize {
        self.slot_gap + self.room_min_width + self.room_width_jitter
    }

    pub fn slot_height(&self) -> usize {
        self.slot_gap + self.room_min_height
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSection {
    pub corridor_width: usize,
    pub door_height: usize,
    pub hall_width: usize,
    pub direct_skip_chance: f32,
    pub direct_connections: bool,
    pub loop_chance: f32,
}

impl Default for ConnectionSection {
    fn default() -> Self {
        Self {
            corridor_width: 3,
            door_height: 4,
            hall_width: 3,
            direct_skip_chance: 0.3,
            direct_connections: true,
            loop_chance: 0.1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentSection {
    pub min_ladder_length: usize,
    pub ladder_exclusion_radius: usize,
    pub inner_wall_chance: f32,
    pub lava_pocket_chance: f32,
    pub wall_protection_radius: usize,
    pub conway_protection_radius: usize,
}

impl Default for ContentSection {
    fn default() -> Self {
        Self {
            min_ladder_length: 4,
            ladder_exclusion_radius: 3,
            inner_wall_chance: 0.25,
            lava_pocket_chance: 1.0,
            wall_protection_radius: 1,
            conway_protection_radius: 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomataConfig {
    pub highlight_time: f32,
    pub glitch_time: f32,
    pub blink_cycle_time: f32,
    pub min_blink_alpha: f32,
    pub bands: usize,
    pub chunk_min_len: usize,
    pub chunk_max_len: usize,
    pub chunk_max_thickness: usize,
    pub balance_slack: usize,
}

impl Default for AutomataConfig {
    fn default() -> Self {
        Self {
            highlight_time: 2.0,
            glitch_time: 0.5,
            blink_cycle_time: 0.5,
            min_blink_alpha: 0.25,
            bands: 8,
            chunk_min_len: 4,
            chunk_max_len: 12,
            chunk_max_thickness: 2,
            balance_slack: 24,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LavaConfig {
    pub max_mass: f32,
    pub max_compress: f32,
    pub min_mass: f32,
    pub vertical_fraction: f32,
    pub flow_rate: f32,
    pub max_horizontal_fraction: f32,
    pub horizontal_passes: usize,
    pub spread_threshold: f32,
    pub evaporation_level: f32,
    pub evaporation_rate: f32,
    pub flow_damping: f32,
    pub frames_per_step: u32,
}

impl Default for LavaConfig {
    fn default() -> Self {
        Self {
            max_mass: 1.0,
            max_compress: 0.02,
            min_mass: 0.005,
            vertical_fraction: 0.25,
            flow_rate: 0.5,
            max_horizontal_fraction: 0.25,
            horizontal_passes: 6,
            spread_threshold: 0.03,
            evaporation_level: 0.05,
            evaporation_rate: 0.001,
            flow_damping: 0.9,
            frames_per_step: 3,
        }
    }
}

impl LavaConfig {
    pub fn mass_ceiling(&self) -> f32 {
        self.max_mass * (1.0 + self.max_compress)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    pub sample_stride: usize,
    pub top_candidates: usize,
    pub reachability_cap: usize,
    pub reachable_fraction: f32,
    pub density_radius: usize,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            sample_stride: 8,
            top_candidates: 10,
            reachability_cap: 10_000,
            reachable_fraction: 0.8,
            density_radius: 8,
        }
    }
}

impl GenerationConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn with_size(mut self, width: usize, height: usize) -> Self {
        self.map.width = width;
        self.map.height = height;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let probabilities = [
            ("rooms.skip_chance", self.rooms.skip_chance),
            ("rooms.hall_chance", self.rooms.hall_chance),
            ("connections.direct_skip_chance", self.connections.direct_skip_chance),
            ("connections.loop_chance", self.connections.loop_chance),
            ("content.inner_wall_chance", self.content.inner_wall_chance),
            ("content.lava_pocket_chance", self.content.lava_pocket_chance),
            ("lava.vertical_fraction", self.lava.vertical_fraction),
            ("lava.flow_rate", self.lava.flow_rate),
            ("lava.max_horizontal_fraction", self.lava.max_horizontal_fraction),
            ("lava.flow_damping", self.lava.flow_damping),
            ("spawn.reachable_fraction", self.spawn.reachable_fraction),
        ];
        for (name, value) in probabilities {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(format!("{name} must lie in [0, 1], got {value}")));
            }
        }
        if self.rooms.treasure_percent + self.rooms.shop_percent > 100 {
            return Err(invalid("rooms.treasure_percent + rooms.shop_percent exceeds 100"));
        }
        if self.rooms.room_min_width < 8 || self.rooms.room_min_height < 8 {
            return Err(invalid("rooms must be at least 8x8 tiles"));
        }
        if self.rooms.slot_gap == 0 {
            return Err(invalid("rooms.slot_gap must be at least 1"));
        }
        if self.connections.corridor_width == 0
            || self.connections.door_height == 0
            || self.connections.hall_width == 0
        {
            return Err(invalid("corridor, door, and hall sizes must be non-zero"));
        }
        if self.map.render_chunk_size == 0 || self.map.tile_size_px <= 0.0 {
            return Err(invalid("map.render_chunk_size and map.tile_size_px must be positive"));
        }
        let automata = &self.automata;
        if automata.bands == 0 || automata.chunk_min_len == 0 || automata.chunk_max_thickness == 0
        {
            return Err(invalid("automata bands and chunk sizes must be non-zero"));
        }
        if automata.chunk_min_len > automata.chunk_max_len {
            return Err(invalid("automata.chunk_min_len exceeds automata.chunk_max_len"));
        }
        if automata.highlight_time <= 0.0 || automata.glitch_time <= 0.0 {
            return Err(invalid("automata transition times must be positive"));
        }
        let lava = &self.lava;
        if lava.max_mass <= 0.0 || lava.min_mass <= 0.0 || lava.min_mass >= lava.max_mass {
            return Err(invalid("lava masses must satisfy 0 < min_mass < max_mass"));
        }
        if lava.frames_per_step == 0 {
            return Err(invalid("lava.frames_per_step must be at least 1"));
        }
        if self.spawn.sample_stride == 0 || self.spawn.top_candidates == 0 {
            return Err(invalid("spawn.sample_stride and spawn.top_candidates must be non-zero"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> MapError {
    MapError::InvalidConfig(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_validate() {
        GenerationConfig::default().validate().expect("defaults should validate");
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = GenerationConfig::from_toml_str(
            "threads = 2\n[map]\nwidth = 120\n[lava]\nhorizontal_passes = 4\n",
        )
        .expect("partial config should parse");
        assert_eq!(config.threads, 2);
        assert_eq!(config.map.width, 120);
        assert_eq!(config.map.height, 300);
        assert_eq!(config.lava.horizontal_passes, 4);
        assert_eq!(config.lava.frames_per_step, 3);
        assert_eq!(config.rooms, RoomSection::default());
    }

    #[test]
    fn rejects_out_of_range_probability() {
        let err = GenerationConfig::from_toml_str("[rooms]\nhall_chance = 1.5\n")
            .expect_err("probability above one should be rejected");
        assert!(matches!(
            err,
            MapError::InvalidConfig(ref message) if message.contains("hall_chance")
        ));
    }

    #[test]
    fn rejects_inverted_chunk_bounds() {
        let err = GenerationConfig::from_toml_str(
            "[automata]\nchunk_min_len = 9\nchunk_max_len = 3\n",
        )
        .expect_err("inverted bounds should be rejected");
        assert!(matches!(err, MapError::InvalidConfig(_)));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = GenerationConfig::from_toml_str("[map\nwidth = 1")
            .expect_err("malformed toml should fail");
        assert!(matches!(err, MapError::ConfigParse(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "[spawn]\ntop_candidates = 3").expect("write config");
        let config = GenerationConfig::load(file.path()).expect("config file should load");
        assert_eq!(config.spawn.top_candidates, 3);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = GenerationConfig::load(&dir.path().join("absent.toml"))
            .expect_err("missing file should fail");
        assert!(matches!(err, MapError::Io(_)));
    }
}
