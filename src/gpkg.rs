use crate::{
    error::Error,
    schema,
    store::{TableSpec, TileStore},
    tile::Tile,
};
use rusqlite::{Connection, OptionalExtension};
use std::{
    fs,
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};

/// GeoPackage file holding tile pyramid tables.
pub struct GeoPackage {
    location: String,
    conn: Mutex<Connection>,
}

impl GeoPackage {
    /// Opens or creates the file, bootstrapping the GeoPackage core tables.
    pub fn open(path: &Path) -> Result<Self, Error> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| {
                Error::Config(format!("Error creating directory {}: {e}", dir.display()))
            })?;
        }

        let conn = Connection::open(path)?;

        conn.pragma_update(None, "synchronous", "OFF")?;

        conn.pragma_update(None, "journal_mode", "WAL")?;

        Self::init(conn, path.display().to_string())
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, Error> {
        Self::init(Connection::open_in_memory()?, ":memory:".into())
    }

    fn init(conn: Connection, location: String) -> Result<Self, Error> {
        conn.pragma_update(None, "application_id", schema::APPLICATION_ID)?;

        conn.pragma_update(None, "user_version", schema::USER_VERSION)?;

        schema::create_core_tables(&conn)?;

        log::info!("Opened GeoPackage {location}");

        Ok(Self {
            location,
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_name(name: &str) -> Result<(), Error> {
        if schema::is_valid_table_name(name) {
            Ok(())
        } else {
            Err(Error::Config(format!("invalid table name: {name}")))
        }
    }

    #[cfg(test)]
    pub fn tile_count(&self, table: &str) -> Result<u64, Error> {
        Self::check_name(table)?;

        Ok(self
            .conn()
            .query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), (), |row| {
                row.get(0)
            })?)
    }

    #[cfg(test)]
    pub fn tile_data(&self, table: &str, tile: &Tile) -> Result<Option<Vec<u8>>, Error> {
        Self::check_name(table)?;

        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT tile_data FROM \"{table}\" WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3"
                ),
                (tile.zoom, tile.x, tile.y),
                |row| row.get(0),
            )
            .optional()?)
    }
}

impl TileStore for GeoPackage {
    fn has_table(&self, name: &str) -> Result<bool, Error> {
        Ok(self
            .conn()
            .query_row(
                "SELECT 1 FROM gpkg_contents WHERE table_name = ?1 AND data_type = 'tiles'",
                [name],
                |_| Ok(()),
            )
            .optional()?
            .is_some())
    }

    fn ensure_schema(&self, spec: &TableSpec) -> Result<(), Error> {
        Self::check_name(&spec.name)?;

        let exists = self.has_table(&spec.name)?;

        let mut conn = self.conn();

        let tx = conn.transaction()?;

        if exists {
            log::info!("Reusing tile table {}", spec.name);
        } else {
            log::info!("Creating tile table {}", spec.name);

            schema::create_tile_table(&tx, spec)?;
        }

        let added = schema::add_missing_tile_matrices(&tx, spec)?;

        if exists && !added.is_empty() {
            log::info!("Added zoom levels {added:?} to {}", spec.name);
        }

        schema::set_contents_attrs(&tx, spec)?;

        tx.commit()?;

        Ok(())
    }

    fn has_tile(&self, table: &str, tile: &Tile) -> Result<bool, Error> {
        Self::check_name(table)?;

        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT 1 FROM \"{table}\" WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3"
                ),
                (tile.zoom, tile.x, tile.y),
                |_| Ok(()),
            )
            .optional()?
            .is_some())
    }

    fn add_tile(&self, table: &str, tile: &Tile, data: &[u8]) -> Result<(), Error> {
        Self::check_name(table)?;

        self.conn()
            .prepare_cached(&format!(
                "INSERT OR IGNORE INTO \"{table}\" (zoom_level, tile_column, tile_row, tile_data) VALUES (?1, ?2, ?3, ?4)"
            ))?
            .execute((tile.zoom, tile.x, tile.y, data))?;

        Ok(())
    }

    fn location(&self) -> String {
        self.location.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bbox::BBox, geo::WEB_MERCATOR_EXTENT};

    fn spec(name: &str, zoom_min: u8, zoom_max: u8) -> TableSpec {
        TableSpec {
            name: name.into(),
            label: None,
            description: None,
            contents_bounds: BBox {
                min_x: 0.0,
                max_x: 1000.0,
                min_y: 0.0,
                max_y: 1000.0,
            },
            matrix_set_bounds: BBox {
                min_x: -WEB_MERCATOR_EXTENT,
                max_x: WEB_MERCATOR_EXTENT,
                min_y: -WEB_MERCATOR_EXTENT,
                max_y: WEB_MERCATOR_EXTENT,
            },
            zoom_min,
            zoom_max,
            tile_size: 256,
        }
    }

    fn zoom_levels(gpkg: &GeoPackage, table: &str) -> Vec<u8> {
        let conn = gpkg.conn();

        let mut stmt = conn
            .prepare("SELECT zoom_level FROM gpkg_tile_matrix WHERE table_name = ?1 ORDER BY zoom_level")
            .unwrap();

        let zooms = stmt
            .query_map([table], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        zooms
    }

    #[test]
    fn bootstraps_core_tables() {
        let gpkg = GeoPackage::open_in_memory().unwrap();

        let conn = gpkg.conn();

        let srs_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM gpkg_spatial_ref_sys", (), |row| row.get(0))
            .unwrap();

        assert_eq!(srs_count, 4);

        let application_id: i32 = conn
            .query_row("PRAGMA application_id", (), |row| row.get(0))
            .unwrap();

        assert_eq!(application_id, schema::APPLICATION_ID);
    }

    #[test]
    fn creates_tile_table() {
        let gpkg = GeoPackage::open_in_memory().unwrap();

        assert!(!gpkg.has_table("tiles").unwrap());

        gpkg.ensure_schema(&spec("tiles", 3, 5)).unwrap();

        assert!(gpkg.has_table("tiles").unwrap());
        assert_eq!(zoom_levels(&gpkg, "tiles"), vec![3, 4, 5]);

        let (width, pixel_size): (i64, f64) = gpkg
            .conn()
            .query_row(
                "SELECT matrix_width, pixel_x_size FROM gpkg_tile_matrix WHERE table_name = 'tiles' AND zoom_level = 4",
                (),
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();

        assert_eq!(width, 16);
        assert!((pixel_size - 2.0 * WEB_MERCATOR_EXTENT / (16.0 * 256.0)).abs() < 1e-9);
    }

    #[test]
    fn extends_existing_table_with_missing_zooms() {
        let gpkg = GeoPackage::open_in_memory().unwrap();

        gpkg.ensure_schema(&spec("tiles", 5, 6)).unwrap();

        let tile = Tile { zoom: 5, x: 1, y: 2 };

        gpkg.add_tile("tiles", &tile, b"png").unwrap();

        gpkg.ensure_schema(&spec("tiles", 3, 7)).unwrap();

        assert_eq!(zoom_levels(&gpkg, "tiles"), vec![3, 4, 5, 6, 7]);
        assert!(gpkg.has_tile("tiles", &tile).unwrap());

        gpkg.ensure_schema(&spec("tiles", 3, 7)).unwrap();

        assert_eq!(zoom_levels(&gpkg, "tiles"), vec![3, 4, 5, 6, 7]);
    }

    #[test]
    fn sets_label_and_description() {
        let gpkg = GeoPackage::open_in_memory().unwrap();

        let mut spec = spec("tiles", 3, 3);
        spec.label = Some("Tiles".into());
        spec.description = Some("Rendered tiles".into());

        gpkg.ensure_schema(&spec).unwrap();

        let (identifier, description): (String, String) = gpkg
            .conn()
            .query_row(
                "SELECT identifier, description FROM gpkg_contents WHERE table_name = 'tiles'",
                (),
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();

        assert_eq!(identifier, "Tiles");
        assert_eq!(description, "Rendered tiles");
    }

    #[test]
    fn stores_tiles_by_xyz() {
        let gpkg = GeoPackage::open_in_memory().unwrap();

        gpkg.ensure_schema(&spec("tiles", 3, 3)).unwrap();

        let tile = Tile { zoom: 3, x: 4, y: 6 };

        assert!(!gpkg.has_tile("tiles", &tile).unwrap());

        gpkg.add_tile("tiles", &tile, b"first").unwrap();

        assert!(gpkg.has_tile("tiles", &tile).unwrap());
        assert!(!gpkg.has_tile("tiles", &Tile { zoom: 3, x: 6, y: 4 }).unwrap());

        // duplicates are ignored, never overwritten
        gpkg.add_tile("tiles", &tile, b"second").unwrap();

        assert_eq!(gpkg.tile_count("tiles").unwrap(), 1);
        assert_eq!(gpkg.tile_data("tiles", &tile).unwrap(), Some(b"first".to_vec()));
    }

    #[test]
    fn rejects_unsafe_table_names() {
        let gpkg = GeoPackage::open_in_memory().unwrap();

        for name in ["", "1tiles", "ti\"les", "tiles; DROP", "gpkg_contents"] {
            assert!(
                matches!(gpkg.ensure_schema(&spec(name, 3, 3)), Err(Error::Config(_))),
                "{name}"
            );
        }
    }

    #[test]
    fn missing_table_is_store_error() {
        let gpkg = GeoPackage::open_in_memory().unwrap();

        assert!(matches!(
            gpkg.add_tile("nope", &Tile { zoom: 3, x: 0, y: 0 }, b"x"),
            Err(Error::Store(_))
        ));
    }
}
