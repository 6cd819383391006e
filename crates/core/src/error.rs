//! Error types raised by map construction and configuration loading.

use thiserror::Error;

/// Errors surfaced by the map core. Constraint misses during generation are
/// never reported here; they simply produce a sparser map.
#[derive(Debug, Error)]
pub enum MapError {
    #[error("map dimensions {width}x{height} are below the minimum of {min}x{min}")]
    InvalidDimensions { width: usize, height: usize, min: usize },

    #[error("unknown tile code {0}")]
    UnknownTileCode(u8),

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("generation cancelled during {phase}")]
    Cancelled { phase: &'static str },

    #[error("generation invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, MapError>;
