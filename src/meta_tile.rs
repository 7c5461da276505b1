//! Meta-tiles: aligned 8×8 blocks of XYZ tiles rendered as one image.
//!
//! Rendering a block instead of single tiles gives the renderer enough
//! context to place labels across tile edges and cuts the number of render
//! calls by 64.

use crate::{bbox::BBox, error::Error, tile::Tile};
use std::fmt::{self, Display, Formatter};

/// Number of leaf tiles along one side of a meta-tile.
pub const META_TILE_SPAN: u32 = 8;

/// Lowest zoom with at least 8×8 tiles.
pub const MIN_META_ZOOM: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetaTile {
    x: u32,
    y: u32,
    zoom: u8,
}

impl MetaTile {
    /// Creates the meta-tile whose upper-left leaf tile is `(x, y)`.
    pub fn new(x: u32, y: u32, zoom: u8) -> Result<Self, Error> {
        if zoom < MIN_META_ZOOM || x % META_TILE_SPAN != 0 || y % META_TILE_SPAN != 0 {
            return Err(Error::InvalidMetaTile { x, y, zoom });
        }

        Ok(Self { x, y, zoom })
    }

    /// Caller guarantees alignment and zoom.
    pub(crate) fn new_aligned(x: u32, y: u32, zoom: u8) -> Self {
        debug_assert!(Self::new(x, y, zoom).is_ok());

        Self { x, y, zoom }
    }

    /// Upper-left tile coordinate of the meta-tile containing `(x, y)`.
    pub fn aligned_origin(x: u32, y: u32) -> (u32, u32) {
        (align(x), align(y))
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// EPSG:3857 extent of the whole 8×8 block.
    pub fn extent(&self) -> BBox {
        let upper_left = Tile {
            zoom: self.zoom,
            x: self.x,
            y: self.y,
        }
        .bounds_to_epsg3857();

        let lower_right = Tile {
            zoom: self.zoom,
            x: self.x + META_TILE_SPAN - 1,
            y: self.y + META_TILE_SPAN - 1,
        }
        .bounds_to_epsg3857();

        BBox {
            min_x: upper_left.min_x,
            min_y: lower_right.min_y,
            max_x: lower_right.max_x,
            max_y: upper_left.max_y,
        }
    }

    /// The 64 leaf tiles, row by row from the top, left to right in a row.
    pub fn leaf_tiles(&self) -> LeafTiles {
        LeafTiles {
            meta_tile: *self,
            current: 0,
        }
    }
}

fn align(v: u32) -> u32 {
    v / META_TILE_SPAN * META_TILE_SPAN
}

impl Display for MetaTile {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "MetaTile({}, {}, {})", self.x, self.y, self.zoom)
    }
}

#[derive(Debug, Clone)]
pub struct LeafTiles {
    meta_tile: MetaTile,
    current: u32,
}

impl Iterator for LeafTiles {
    type Item = Tile;

    fn next(&mut self) -> Option<Tile> {
        if self.current >= META_TILE_SPAN * META_TILE_SPAN {
            return None;
        }

        let tile = Tile {
            zoom: self.meta_tile.zoom,
            x: self.meta_tile.x + self.current % META_TILE_SPAN,
            y: self.meta_tile.y + self.current / META_TILE_SPAN,
        };

        self.current += 1;

        Some(tile)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (META_TILE_SPAN * META_TILE_SPAN - self.current) as usize;

        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for LeafTiles {}
