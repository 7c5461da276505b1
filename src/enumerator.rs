//! Enumeration of the meta-tiles covering a bounding box.
//!
//! Only the corner tiles are projected; every aligned meta-tile between the
//! two corner meta-tiles is produced, so edge meta-tiles may barely touch the
//! box. Rendering a few extra tiles is harmless because the cutter never
//! overwrites existing tiles.

use crate::{
    bbox::BoundingBox,
    error::Error,
    geo::{lat_to_tile_y, lon_to_tile_x},
    meta_tile::{META_TILE_SPAN, MIN_META_ZOOM, MetaTile},
};

pub const MAX_ZOOM: u8 = 30;

pub fn validate_zoom(zoom: u8) -> Result<(), Error> {
    if (MIN_META_ZOOM..=MAX_ZOOM).contains(&zoom) {
        Ok(())
    } else {
        Err(Error::InvalidZoom(zoom))
    }
}

/// Meta-tiles of one non-crossing box at one zoom, rows from the top.
///
/// Columns beyond the antimeridian are wrapped, so a box given as
/// `160..200` and one given as `-200..-160` yield the same sequence.
#[derive(Debug, Clone)]
pub struct MetaTilesCovering {
    zoom: u8,
    world: u32,
    x_start: u32,
    x_end: u32,
    y_end: u32,
    x: u32,
    y: u32,
}

pub fn meta_tiles_covering(bbox: &BoundingBox, zoom: u8) -> Result<MetaTilesCovering, Error> {
    validate_zoom(zoom)?;

    bbox.validate_latitudes()?;

    if bbox.west >= bbox.east {
        return Err(Error::InvalidBoundingBox(
            bbox.to_array(),
            "west must be less than east",
        ));
    }

    let world = 1i64 << zoom;

    // the west edge is wrapped into [-180, 180) and the width kept, capped at
    // one full turn; columns past the east edge of the world are wrapped when
    // yielded
    let width = (bbox.east - bbox.west).min(360.0);
    let west = (bbox.west + 180.0).rem_euclid(360.0) - 180.0;
    let east = west + width;

    // far edges are exclusive so a box ending on a tile boundary
    // does not pull in the next column or row
    let ul_x = (lon_to_tile_x(west, zoom).floor() as i64).clamp(0, world - 1);
    let lr_x = (lon_to_tile_x(east, zoom).ceil() as i64 - 1).clamp(ul_x, ul_x + world - 1);

    let ul_y = (lat_to_tile_y(bbox.north, zoom).floor() as i64).clamp(0, world - 1);
    let lr_y = (lat_to_tile_y(bbox.south, zoom).ceil() as i64 - 1).clamp(ul_y, world - 1);

    let (x_start, y_start) = MetaTile::aligned_origin(ul_x as u32, ul_y as u32);
    let (x_end, y_end) = MetaTile::aligned_origin(lr_x as u32, lr_y as u32);

    let world = world as u32;

    Ok(MetaTilesCovering {
        zoom,
        world,
        x_start,
        x_end: x_end.min(x_start + world - META_TILE_SPAN),
        y_end,
        x: x_start,
        y: y_start,
    })
}

impl Iterator for MetaTilesCovering {
    type Item = MetaTile;

    fn next(&mut self) -> Option<MetaTile> {
        if self.y > self.y_end {
            return None;
        }

        let meta_tile = MetaTile::new_aligned(self.x % self.world, self.y, self.zoom);

        self.x += META_TILE_SPAN;

        if self.x > self.x_end {
            self.x = self.x_start;
            self.y += META_TILE_SPAN;
        }

        Some(meta_tile)
    }
}

/// Meta-tiles of all boxes over a zoom range, highest zoom first.
#[derive(Debug, Clone)]
pub struct AllMetaTiles(std::iter::Flatten<std::vec::IntoIter<MetaTilesCovering>>);

/// Validates every zoom and box up front, then yields lazily.
pub fn all_meta_tiles(
    bboxes: &[BoundingBox],
    zoom_min: u8,
    zoom_max: u8,
) -> Result<AllMetaTiles, Error> {
    validate_zoom(zoom_min)?;

    validate_zoom(zoom_max)?;

    let mut coverings = Vec::new();

    for zoom in (zoom_min..=zoom_max).rev() {
        for bbox in bboxes {
            coverings.push(meta_tiles_covering(bbox, zoom)?);
        }
    }

    Ok(AllMetaTiles(coverings.into_iter().flatten()))
}

impl Iterator for AllMetaTiles {
    type Item = MetaTile;

    fn next(&mut self) -> Option<MetaTile> {
        self.0.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn meta(x: u32, y: u32, zoom: u8) -> MetaTile {
        MetaTile::new(x, y, zoom).unwrap()
    }

    fn covering(west: f64, south: f64, east: f64, north: f64, zoom: u8) -> Vec<MetaTile> {
        meta_tiles_covering(&BoundingBox::new(west, south, east, north), zoom)
            .unwrap()
            .collect()
    }

    #[test]
    fn covers_regular_box() {
        let bbox = (-105.3101, 39.5263, -104.6399, 40.0225);

        assert_eq!(
            covering(bbox.0, bbox.1, bbox.2, bbox.3, 10),
            vec![meta(208, 384, 10)]
        );

        assert_eq!(
            covering(bbox.0, bbox.1, bbox.2, bbox.3, 11),
            vec![meta(424, 768, 11), meta(424, 776, 11)]
        );

        assert_eq!(
            covering(bbox.0, bbox.1, bbox.2, bbox.3, 12),
            vec![
                meta(848, 1544, 12),
                meta(856, 1544, 12),
                meta(848, 1552, 12),
                meta(856, 1552, 12)
            ]
        );
    }

    #[test]
    fn covers_box_beyond_antimeridian() {
        let expected: Vec<_> = [40, 48, 56, 64]
            .into_iter()
            .flat_map(|y| [240, 248, 0, 8].map(|x| meta(x, y, 8)))
            .collect();

        assert_eq!(
            covering(160.6275, 65.083, 199.3217, 74.8175, 8),
            expected
        );

        assert_eq!(
            covering(-199.3725, 65.083, -160.6783, 74.8175, 8),
            expected
        );
    }

    #[test]
    fn split_box_covers_same_tiles_as_unwrapped_box() {
        let split: HashSet<_> = BoundingBox::new(160.6275, 65.083, -160.6783, 74.8175)
            .normalize()
            .unwrap()
            .iter()
            .flat_map(|bbox| meta_tiles_covering(bbox, 8).unwrap())
            .collect();

        let unwrapped: HashSet<_> = covering(160.6275, 65.083, 199.3217, 74.8175, 8)
            .into_iter()
            .collect();

        assert_eq!(split, unwrapped);
    }

    #[test]
    fn accepts_box_crossing_180_longitude() {
        assert!(!covering(-181.0, 1.0, -179.0, 2.0, 4).is_empty());
        assert!(!covering(179.0, 1.0, 181.0, 2.0, 4).is_empty());
    }

    #[test]
    fn whole_world_has_no_duplicates() {
        let tiles = covering(-180.0, -90.0, 180.0, 90.0, 5);

        assert_eq!(tiles.len(), 16);
        assert_eq!(tiles.iter().collect::<HashSet<_>>().len(), 16);

        let wider = covering(-400.0, -90.0, 400.0, 90.0, 5);

        assert_eq!(wider.iter().collect::<HashSet<_>>().len(), 16);
        assert_eq!(wider.len(), 16);
    }

    #[test]
    fn wraps_far_away_longitudes() {
        assert_eq!(
            covering(720.0 - 105.3101, 39.5263, 720.0 - 104.6399, 40.0225, 10),
            vec![meta(208, 384, 10)]
        );

        let huge = covering(1e21, 0.0, 1e22, 1.0, 3);

        assert_eq!(huge, vec![meta(0, 0, 3)]);

        let extreme = covering(-f64::MAX, 0.0, f64::MAX, 1.0, 5);

        assert_eq!(extreme.len(), 4);
        assert_eq!(extreme.iter().collect::<HashSet<_>>().len(), 4);
    }

    #[test]
    fn rejects_invalid_boxes() {
        for (west, south, east, north) in [
            (179.0, 0.0, -179.0, 1.0),
            (170.0, 0.0, 170.0, 1.0),
            (0.0, -38.0, 1.0, -39.0),
            (0.0, 0.0, 1.0, 0.0),
        ] {
            assert!(matches!(
                meta_tiles_covering(&BoundingBox::new(west, south, east, north), 4),
                Err(Error::InvalidBoundingBox(..))
            ));
        }
    }

    #[test]
    fn rejects_low_zoom() {
        assert!(matches!(
            meta_tiles_covering(&BoundingBox::new(1.0, 1.0, 2.0, 2.0), 2),
            Err(Error::InvalidZoom(2))
        ));

        assert!(matches!(
            meta_tiles_covering(&BoundingBox::new(1.0, 1.0, 2.0, 2.0), MAX_ZOOM + 1),
            Err(Error::InvalidZoom(_))
        ));
    }

    #[test]
    fn single_zoom_yields_only_that_zoom() {
        let bboxes = [BoundingBox::new(-105.3101, 39.5263, -104.6399, 40.0225)];

        let tiles: Vec<_> = all_meta_tiles(&bboxes, 11, 11).unwrap().collect();

        assert_eq!(tiles, vec![meta(424, 768, 11), meta(424, 776, 11)]);
    }

    #[test]
    fn zoom_levels_descend() {
        let bboxes = [BoundingBox::new(-105.3101, 39.5263, -104.6399, 40.0225)];

        let zooms: Vec<_> = all_meta_tiles(&bboxes, 10, 12)
            .unwrap()
            .map(|meta_tile| meta_tile.zoom())
            .collect();

        assert_eq!(zooms, vec![12, 12, 12, 12, 11, 11, 10]);
    }

    #[test]
    fn zoom_major_then_box_order() {
        let bboxes = BoundingBox::new(170.0, 10.0, -170.0, 20.0).normalize().unwrap();

        let tiles: Vec<_> = all_meta_tiles(&bboxes, 5, 6).unwrap().collect();

        let first_zoom5 = tiles.iter().position(|t| t.zoom() == 5).unwrap();

        assert!(tiles[..first_zoom5].iter().all(|t| t.zoom() == 6));
        assert!(tiles[first_zoom5..].iter().all(|t| t.zoom() == 5));

        // east side of the antimeridian first within a zoom
        assert!(tiles[0].x() > 0);
        assert_eq!(tiles[first_zoom5 - 1].x(), 0);
    }

    #[test]
    fn fails_before_yielding_on_bad_zoom() {
        let bboxes = [BoundingBox::new(1.0, 1.0, 2.0, 2.0)];

        assert!(matches!(
            all_meta_tiles(&bboxes, 2, 5),
            Err(Error::InvalidZoom(2))
        ));
    }

    #[test]
    fn restarts_per_call() {
        let bboxes = [BoundingBox::new(-105.3101, 39.5263, -104.6399, 40.0225)];

        let first: Vec<_> = all_meta_tiles(&bboxes, 10, 12).unwrap().collect();
        let second: Vec<_> = all_meta_tiles(&bboxes, 10, 12).unwrap().collect();

        assert_eq!(first, second);
    }
}
