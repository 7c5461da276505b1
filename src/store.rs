use crate::{bbox::BBox, error::Error, tile::Tile};

/// Describes a tile pyramid table and its Web Mercator tile matrices.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSpec {
    pub name: String,
    pub label: Option<String>,
    pub description: Option<String>,
    pub contents_bounds: BBox,
    pub matrix_set_bounds: BBox,
    pub zoom_min: u8,
    pub zoom_max: u8,
    pub tile_size: u32,
}

/// Tile container shared by all cutting threads.
///
/// No call spans more than one tile, so two writers may both see a tile as
/// missing; `add_tile` must tolerate inserting an existing tile.
pub trait TileStore: Sync {
    fn has_table(&self, name: &str) -> Result<bool, Error>;

    /// Creates the table or adds its missing zoom levels.
    fn ensure_schema(&self, spec: &TableSpec) -> Result<(), Error>;

    fn has_tile(&self, table: &str, tile: &Tile) -> Result<bool, Error>;

    fn add_tile(&self, table: &str, tile: &Tile, data: &[u8]) -> Result<(), Error>;

    /// Human readable location, e.g. the file path.
    fn location(&self) -> String;
}

impl<T: TileStore> TileStore for &T {
    fn has_table(&self, name: &str) -> Result<bool, Error> {
        (**self).has_table(name)
    }

    fn ensure_schema(&self, spec: &TableSpec) -> Result<(), Error> {
        (**self).ensure_schema(spec)
    }

    fn has_tile(&self, table: &str, tile: &Tile) -> Result<bool, Error> {
        (**self).has_tile(table, tile)
    }

    fn add_tile(&self, table: &str, tile: &Tile, data: &[u8]) -> Result<(), Error> {
        (**self).add_tile(table, tile, data)
    }

    fn location(&self) -> String {
        (**self).location()
    }
}
