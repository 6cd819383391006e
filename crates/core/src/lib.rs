pub mod automata;
pub mod chunk;
pub mod config;
pub mod error;
pub mod grid;
pub mod lava;
pub mod map;
pub mod mapgen;
pub mod pool;
pub mod progress;
pub mod rng;
pub mod spawn;
pub mod types;

pub use automata::{AutomataReport, TransitionReport};
pub use chunk::{Chunk, ChunkIndex, Viewport};
pub use config::GenerationConfig;
pub use error::{MapError, Result};
pub use grid::{Grid, TileQuery};
pub use lava::{LavaCell, LavaVisual};
pub use map::Map;
pub use mapgen::{GenerationStats, Room, RoomGrid, RoomId, RoomKind};
pub use pool::WorkerPool;
pub use progress::{CancelFlag, GenerationControl, Progress};
pub use spawn::{SpawnPoint, SpawnTier};
pub use types::*;
