use crate::error::MapError;

/// Pixel edge length of one tile.
pub const TILE_SIZE_PX: f32 = 32.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pos {
    pub y: i32,
    pub x: i32,
}

impl Pos {
    pub fn new(x: i32, y: i32) -> Self {
        Self { y, x }
    }
}

/// Canonical tile codes. The discriminants are the wire values exposed through
/// `tile_value`/`set_tile_value`.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tile {
    #[default]
    Empty = 0,
    Wall = 1,
    Ladder = 2,
    Rope = 3,
    Treasure = 4,
    Shop = 5,
    Platform = 6,
    Chest = 7,
    GlitchCreateSolid = 8,
    GlitchCreatePlatform = 9,
    GlitchDelete = 10,
    HighlightCreate = 11,
    HighlightDelete = 12,
    Floor = 13,
    ProtectedEmpty = 14,
    Lava = 15,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TileCategory {
    Empty,
    Solid,
    Platform,
    Climbable,
    Fixture,
    Lava,
    Transition,
}

impl Tile {
    pub const ALL: [Tile; 16] = [
        Tile::Empty,
        Tile::Wall,
        Tile::Ladder,
        Tile::Rope,
        Tile::Treasure,
        Tile::Shop,
        Tile::Platform,
        Tile::Chest,
        Tile::GlitchCreateSolid,
        Tile::GlitchCreatePlatform,
        Tile::GlitchDelete,
        Tile::HighlightCreate,
        Tile::HighlightDelete,
        Tile::Floor,
        Tile::ProtectedEmpty,
        Tile::Lava,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn category(self) -> TileCategory {
        match self {
            Tile::Empty | Tile::ProtectedEmpty => TileCategory::Empty,
            Tile::Wall | Tile::Floor => TileCategory::Solid,
            Tile::Platform => TileCategory::Platform,
            Tile::Ladder | Tile::Rope => TileCategory::Climbable,
            Tile::Treasure | Tile::Shop | Tile::Chest => TileCategory::Fixture,
            Tile::Lava => TileCategory::Lava,
            Tile::GlitchCreateSolid
            | Tile::GlitchCreatePlatform
            | Tile::GlitchDelete
            | Tile::HighlightCreate
            | Tile::HighlightDelete => TileCategory::Transition,
        }
    }

    /// Whether an actor can stand on this tile. A tile telegraphing its
    /// deletion still holds weight until the glitch phase starts.
    pub fn is_solid(self) -> bool {
        matches!(self.category(), TileCategory::Solid | TileCategory::Platform)
            || self == Tile::HighlightDelete
    }

    pub fn is_empty(self) -> bool {
        self.category() == TileCategory::Empty
    }

    /// Tiles that the hand-authored skeleton is made of.
    pub fn is_structural(self) -> bool {
        matches!(self, Tile::Wall | Tile::Floor | Tile::Platform)
    }

    pub fn is_transition(self) -> bool {
        self.category() == TileCategory::Transition
    }

    /// Solid or platform tiles the automata may schedule for deletion.
    pub fn is_mutable_solid(self) -> bool {
        matches!(self, Tile::Floor | Tile::Platform)
    }
}

impl TryFrom<u8> for Tile {
    type Error = MapError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Tile::ALL.get(usize::from(code)).copied().ok_or(MapError::UnknownTileCode(code))
    }
}

impl From<Tile> for u8 {
    fn from(tile: Tile) -> Self {
        tile.code()
    }
}
