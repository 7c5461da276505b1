use crate::tile::Tile;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid bounding box {0:?}: {1}")]
    InvalidBoundingBox([f64; 4], &'static str),

    #[error("invalid meta-tile origin {x}, {y}, {zoom}")]
    InvalidMetaTile { x: u32, y: u32, zoom: u8 },

    #[error("invalid zoom level {0}")]
    InvalidZoom(u8),

    #[error("error rendering {target}: {message}")]
    Render { target: String, message: String },

    #[error("error encoding tile {tile}: {message}")]
    Encode { tile: Tile, message: String },

    #[error("tile store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("render pool error: {0}")]
    RenderPool(String),

    #[error("error building cut thread pool: {0}")]
    CutPool(#[from] rayon::ThreadPoolBuildError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("error reading style {path}: {source}")]
    Style {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn render(target: impl ToString, message: impl ToString) -> Self {
        Self::Render {
            target: target.to_string(),
            message: message.to_string(),
        }
    }
}
