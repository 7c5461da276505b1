use crate::{bbox::BBox, geo::WEB_MERCATOR_EXTENT};
use std::fmt::Display;

/// One leaf tile of the XYZ pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tile {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl Tile {
    pub fn bounds_to_epsg3857(&self) -> BBox {
        let tile_span = (2.0 * WEB_MERCATOR_EXTENT) / f64::from(self.zoom).exp2();

        let min_x = f64::from(self.x).mul_add(tile_span, -WEB_MERCATOR_EXTENT);
        let max_y = f64::from(self.y).mul_add(-tile_span, WEB_MERCATOR_EXTENT);

        BBox {
            min_x,
            min_y: max_y - tile_span,
            max_x: min_x + tile_span,
            max_y,
        }
    }
}

impl Display for Tile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}
