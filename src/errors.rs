use crate::components::{cache::BlockKey, pixel::PixelType, window::Window};

pub type Result<T> = std::result::Result<T, RastroError>;

#[derive(thiserror::Error, Debug)]
pub enum RastroError {
    #[error("no driver claims resource `{0}`")]
    NotIdentifiable(String),
    #[error("driver `{driver}` failed to open `{name}`: {reason}")]
    OpenFailed {
        driver: String,
        name: String,
        reason: String,
    },
    #[error("driver `{driver}` failed to create `{name}`: {reason}")]
    CreateFailed {
        driver: String,
        name: String,
        reason: String,
    },
    #[error("invalid option `{name}`: {reason}")]
    InvalidOption { name: String, reason: String },
    #[error("window {window:?} outside raster bounds {width}x{height}")]
    WindowOutOfBounds {
        window: Window,
        width: usize,
        height: usize,
    },
    #[error("block I/O on ({col}, {row}) failed: {reason}")]
    BlockIo {
        col: usize,
        row: usize,
        reason: String,
    },
    #[error("{} dirty block(s) could not be written back", .failures.len())]
    FlushFailed { failures: Vec<(BlockKey, String)> },
    #[error("operation cancelled by progress callback")]
    UserCancelled,
    #[error("driver `{driver}` does not support {operation}")]
    Unsupported {
        driver: String,
        operation: &'static str,
    },
    #[error("band holds {band:?} pixels but {requested:?} was requested")]
    TypeMismatch {
        band: PixelType,
        requested: PixelType,
    },
    #[error("dataset `{0}` is open read-only")]
    ReadOnly(String),
    #[error("band index {0} out of range")]
    BandIndex(usize),
    #[error("no driver registered under `{0}`")]
    UnknownDriver(String),
    #[error("buffer holds {got} elements, window needs {expected}")]
    BufferSize { expected: usize, got: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
