use thiserror::Error;

/// Problems found while validating a level description.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LevelError {
    #[error("grid must be at least 1x1, got {width}x{height}")]
    EmptyGrid { width: u32, height: u32 },

    #[error("grid {width}x{height} exceeds the {max} cell limit")]
    TooLarge { width: u32, height: u32, max: u32 },

    #[error("tile size must be positive, got {0}")]
    InvalidTileSize(f32),

    #[error("{context} at ({x}, {y}) is outside the {width}x{height} grid")]
    OutOfBounds {
        context: String,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },

    #[error("{context} references unknown tile type '{tile}'")]
    UnknownTile { context: String, tile: String },

    #[error("layer '{0}' is declared more than once")]
    DuplicateLayer(String),

    #[error("{context} at ({x}, {y}) is on a cell that cannot be walked on")]
    BlockedCell { context: String, x: u32, y: u32 },

    #[error("level has no spawn point")]
    MissingSpawn,

    #[error("level asset failed to load: {0}")]
    Load(String),
}
