use crate::{
    encode::{Format, encode},
    error::Error,
    meta_tile::{META_TILE_SPAN, MetaTile},
    store::TileStore,
    tile::Tile,
    time_track::{self, Metric, StatsMsg},
};
use image::{RgbaImage, imageops};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use std::{ops::Add, sync::mpsc::Sender, time::Instant};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CutSummary {
    pub inserted: usize,
    pub skipped: usize,
}

impl Add for CutSummary {
    type Output = CutSummary;

    fn add(self, other: CutSummary) -> CutSummary {
        CutSummary {
            inserted: self.inserted + other.inserted,
            skipped: self.skipped + other.skipped,
        }
    }
}

/// Slices rendered meta-tile images into leaf tiles and stores them.
pub struct TileCutter<'a, S: TileStore> {
    store: &'a S,
    table: &'a str,
    tile_size: u32,
    format: Format,
    jpeg_quality: u8,
    stats_tx: Sender<StatsMsg>,
}

impl<'a, S: TileStore> TileCutter<'a, S> {
    pub fn new(
        store: &'a S,
        table: &'a str,
        tile_size: u32,
        format: Format,
        jpeg_quality: u8,
        stats_tx: Sender<StatsMsg>,
    ) -> Self {
        Self {
            store,
            table,
            tile_size,
            format,
            jpeg_quality,
            stats_tx,
        }
    }

    /// Stores all 64 leaf tiles in parallel, leaving existing ones untouched.
    ///
    /// Fails on the first encode or store error; tiles already written stay.
    pub fn cut(&self, meta_tile: &MetaTile, image: &RgbaImage) -> Result<CutSummary, Error> {
        let meta_size = self.tile_size * META_TILE_SPAN;

        if image.dimensions() != (meta_size, meta_size) {
            return Err(Error::render(
                meta_tile,
                format!(
                    "expected {meta_size}x{meta_size} image, got {}x{}",
                    image.width(),
                    image.height()
                ),
            ));
        }

        meta_tile
            .leaf_tiles()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|tile| self.cut_tile(meta_tile, image, &tile))
            .try_reduce(CutSummary::default, |a, b| Ok(a + b))
    }

    fn cut_tile(
        &self,
        meta_tile: &MetaTile,
        image: &RgbaImage,
        tile: &Tile,
    ) -> Result<CutSummary, Error> {
        if self.store.has_tile(self.table, tile)? {
            log::info!("Table {} already contains tile {tile}", self.table);

            return Ok(CutSummary {
                inserted: 0,
                skipped: 1,
            });
        }

        let instant = Instant::now();

        let px = (tile.x - meta_tile.x()) * self.tile_size;
        let py = (tile.y - meta_tile.y()) * self.tile_size;

        let sub_image = imageops::crop_imm(image, px, py, self.tile_size, self.tile_size).to_image();

        let data = encode(&sub_image, self.format, self.jpeg_quality)
            .map_err(|message| Error::Encode {
                tile: *tile,
                message,
            })?;

        time_track::record(&self.stats_tx, Metric::Encode, instant);

        let instant = Instant::now();

        log::debug!("Adding tile {tile}");

        self.store.add_tile(self.table, tile, &data)?;

        time_track::record(&self.stats_tx, Metric::Insert, instant);

        Ok(CutSummary {
            inserted: 1,
            skipped: 0,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        bbox::BBox, geo::WEB_MERCATOR_EXTENT, gpkg::GeoPackage, store::TableSpec,
    };
    use image::Rgba;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc,
    };

    pub fn table_spec(tile_size: u32) -> TableSpec {
        let world = BBox {
            min_x: -WEB_MERCATOR_EXTENT,
            max_x: WEB_MERCATOR_EXTENT,
            min_y: -WEB_MERCATOR_EXTENT,
            max_y: WEB_MERCATOR_EXTENT,
        };

        TableSpec {
            name: "tiles".into(),
            label: None,
            description: None,
            contents_bounds: world,
            matrix_set_bounds: world,
            zoom_min: 3,
            zoom_max: 12,
            tile_size,
        }
    }

    /// Each leaf tile gets a color encoding its column and row in the block.
    fn meta_image(tile_size: u32) -> RgbaImage {
        RgbaImage::from_fn(tile_size * 8, tile_size * 8, |x, y| {
            Rgba([(x / tile_size) as u8 * 10, (y / tile_size) as u8 * 10, 7, 255])
        })
    }

    fn cutter<S: TileStore>(store: &S, tile_size: u32) -> TileCutter<'_, S> {
        let (tx, _rx) = mpsc::channel();

        TileCutter::new(store, "tiles", tile_size, Format::PNG, 85, tx)
    }

    #[test]
    fn stores_64_tiles_with_matching_pixels() {
        let gpkg = GeoPackage::open_in_memory().unwrap();
        gpkg.ensure_schema(&table_spec(16)).unwrap();

        let meta_tile = MetaTile::new(8, 16, 5).unwrap();

        let summary = cutter(&gpkg, 16).cut(&meta_tile, &meta_image(16)).unwrap();

        assert_eq!(
            summary,
            CutSummary {
                inserted: 64,
                skipped: 0
            }
        );

        assert_eq!(gpkg.tile_count("tiles").unwrap(), 64);

        for tile in meta_tile.leaf_tiles() {
            let data = gpkg.tile_data("tiles", &tile).unwrap().unwrap();

            let decoded = image::load_from_memory(&data).unwrap().to_rgba8();

            assert_eq!(decoded.dimensions(), (16, 16));

            let expected = Rgba([
                (tile.x - 8) as u8 * 10,
                (tile.y - 16) as u8 * 10,
                7,
                255,
            ]);

            assert!(decoded.pixels().all(|p| *p == expected), "{tile}");
        }
    }

    #[test]
    fn skips_existing_tiles() {
        let gpkg = GeoPackage::open_in_memory().unwrap();
        gpkg.ensure_schema(&table_spec(16)).unwrap();

        let meta_tile = MetaTile::new(0, 0, 3).unwrap();

        let existing = Tile { zoom: 3, x: 2, y: 5 };

        gpkg.add_tile("tiles", &existing, b"keep").unwrap();

        let summary = cutter(&gpkg, 16).cut(&meta_tile, &meta_image(16)).unwrap();

        assert_eq!(summary.inserted, 63);
        assert_eq!(summary.skipped, 1);
        assert_eq!(gpkg.tile_data("tiles", &existing).unwrap(), Some(b"keep".to_vec()));

        let again = cutter(&gpkg, 16).cut(&meta_tile, &meta_image(16)).unwrap();

        assert_eq!(
            again,
            CutSummary {
                inserted: 0,
                skipped: 64
            }
        );
    }

    #[test]
    fn rejects_wrong_image_size() {
        let gpkg = GeoPackage::open_in_memory().unwrap();
        gpkg.ensure_schema(&table_spec(16)).unwrap();

        let meta_tile = MetaTile::new(0, 0, 3).unwrap();

        assert!(matches!(
            cutter(&gpkg, 16).cut(&meta_tile, &meta_image(8)),
            Err(Error::Render { .. })
        ));
    }

    struct FailingStore {
        inserts: AtomicUsize,
    }

    impl TileStore for FailingStore {
        fn has_table(&self, _name: &str) -> Result<bool, Error> {
            Ok(true)
        }

        fn ensure_schema(&self, _spec: &TableSpec) -> Result<(), Error> {
            Ok(())
        }

        fn has_tile(&self, _table: &str, _tile: &Tile) -> Result<bool, Error> {
            Ok(false)
        }

        fn add_tile(&self, _table: &str, tile: &Tile, _data: &[u8]) -> Result<(), Error> {
            self.inserts.fetch_add(1, Ordering::SeqCst);

            if tile.x == 3 && tile.y == 3 {
                Err(Error::Store(rusqlite::Error::InvalidQuery))
            } else {
                Ok(())
            }
        }

        fn location(&self) -> String {
            "failing".into()
        }
    }

    #[test]
    fn fails_on_store_error() {
        let store = FailingStore {
            inserts: AtomicUsize::new(0),
        };

        let meta_tile = MetaTile::new(0, 0, 3).unwrap();

        assert!(matches!(
            cutter(&store, 4).cut(&meta_tile, &meta_image(4)),
            Err(Error::Store(_))
        ));

        assert!(store.inserts.load(Ordering::SeqCst) >= 1);
    }
}
