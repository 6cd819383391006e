//! Procedural dungeon generation split into coherent submodules.

pub mod connections;
pub mod content;
pub mod kdtree;
pub mod model;
pub mod pipeline;
pub mod room_grid;

pub use model::{
    GenerationStats, Room, RoomGrid, RoomId, RoomKind, Rooms, SpanKind, VerticalSpan,
};
pub use pipeline::{GeneratedMap, RoomGenerator};

use crate::config::GenerationConfig;
use crate::error::Result;
use crate::pool::WorkerPool;
use crate::progress::GenerationControl;

pub fn generate_map(
    config: &GenerationConfig,
    seed: u64,
    pool: &WorkerPool,
    control: &mut GenerationControl,
) -> Result<GeneratedMap> {
    RoomGenerator::new(config, seed, pool).generate(control)
}

#[cfg(test)]
mod tests {
    use super::{GenerationConfig, GenerationControl, RoomGenerator, WorkerPool};

    #[test]
    fn generate_map_matches_room_generator_output() {
        let pool = WorkerPool::new(2).expect("pool");
        let config = GenerationConfig::default().with_size(140, 90);

        let from_helper =
            super::generate_map(&config, 123, &pool, &mut GenerationControl::default())
                .expect("helper generation");
        let from_generator = RoomGenerator::new(&config, 123, &pool)
            .generate(&mut GenerationControl::default())
            .expect("generator generation");

        assert_eq!(from_helper.tiles, from_generator.tiles);
        assert_eq!(from_helper.stats, from_generator.stats);
    }
}
