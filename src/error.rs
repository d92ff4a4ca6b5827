use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum EngineError {
    #[error("tile id {id} is out of range for a {width}x{height} board")]
    TileOutOfRange {
        id: usize,
        width: usize,
        height: usize,
    },
    #[error("board dimensions must be positive, got {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    #[error("mine probability must lie in [0, 1], got {0}")]
    InvalidMineProbability(f64),
    #[error("mine mask holds {got} entries, expected {expected}")]
    GridMaskMismatch { expected: usize, got: usize },
    #[error("config is {config_width}x{config_height} but the grid is {grid_width}x{grid_height}")]
    DimensionMismatch {
        config_width: usize,
        config_height: usize,
        grid_width: usize,
        grid_height: usize,
    },
}

pub type Result<T> = std::result::Result<T, EngineError>;
