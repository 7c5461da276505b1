//! GeoPackage 1.2 tile schema.

use crate::store::TableSpec;
use rusqlite::{Connection, Error, OptionalExtension};

pub const APPLICATION_ID: i32 = 0x4750_4B47; // "GPKG"

pub const USER_VERSION: i32 = 10200;

const WEB_MERCATOR_SRS_ID: i32 = 3857;

const WEB_MERCATOR_DEFINITION: &str = r#"PROJCS["WGS 84 / Pseudo-Mercator",GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4326"]],PROJECTION["Mercator_1SP"],PARAMETER["central_meridian",0],PARAMETER["scale_factor",1],PARAMETER["false_easting",0],PARAMETER["false_northing",0],UNIT["metre",1,AUTHORITY["EPSG","9001"]],AXIS["X",EAST],AXIS["Y",NORTH],EXTENSION["PROJ4","+proj=merc +a=6378137 +b=6378137 +lat_ts=0.0 +lon_0=0.0 +x_0=0.0 +y_0=0 +k=1.0 +units=m +nadgrids=@null +wktext +no_defs"],AUTHORITY["EPSG","3857"]]"#;

const WGS84_DEFINITION: &str = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4326"]]"#;

/// Table names are interpolated into SQL, so only plain identifiers pass.
pub fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();

    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.to_ascii_lowercase().starts_with("gpkg_")
}

pub fn create_core_tables(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS gpkg_spatial_ref_sys (
          srs_name TEXT NOT NULL,
          srs_id INTEGER NOT NULL PRIMARY KEY,
          organization TEXT NOT NULL,
          organization_coordsys_id INTEGER NOT NULL,
          definition TEXT NOT NULL,
          description TEXT
      );

      CREATE TABLE IF NOT EXISTS gpkg_contents (
          table_name TEXT NOT NULL PRIMARY KEY,
          data_type TEXT NOT NULL,
          identifier TEXT UNIQUE,
          description TEXT DEFAULT '',
          last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
          min_x DOUBLE,
          min_y DOUBLE,
          max_x DOUBLE,
          max_y DOUBLE,
          srs_id INTEGER,
          CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
      );

      CREATE TABLE IF NOT EXISTS gpkg_tile_matrix_set (
          table_name TEXT NOT NULL PRIMARY KEY,
          srs_id INTEGER NOT NULL,
          min_x DOUBLE NOT NULL,
          min_y DOUBLE NOT NULL,
          max_x DOUBLE NOT NULL,
          max_y DOUBLE NOT NULL,
          CONSTRAINT fk_gtms_table_name FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
          CONSTRAINT fk_gtms_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys (srs_id)
      );

      CREATE TABLE IF NOT EXISTS gpkg_tile_matrix (
          table_name TEXT NOT NULL,
          zoom_level INTEGER NOT NULL,
          matrix_width INTEGER NOT NULL,
          matrix_height INTEGER NOT NULL,
          tile_width INTEGER NOT NULL,
          tile_height INTEGER NOT NULL,
          pixel_x_size DOUBLE NOT NULL,
          pixel_y_size DOUBLE NOT NULL,
          CONSTRAINT pk_ttm PRIMARY KEY (table_name, zoom_level),
          CONSTRAINT fk_tmm_table_name FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name)
      );",
    )?;

    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO gpkg_spatial_ref_sys
          (srs_name, srs_id, organization, organization_coordsys_id, definition, description)
          VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;

    stmt.execute((
        "Undefined cartesian SRS",
        -1,
        "NONE",
        -1,
        "undefined",
        "undefined cartesian coordinate reference system",
    ))?;

    stmt.execute((
        "Undefined geographic SRS",
        0,
        "NONE",
        0,
        "undefined",
        "undefined geographic coordinate reference system",
    ))?;

    stmt.execute((
        "WGS 84 geodetic",
        4326,
        "EPSG",
        4326,
        WGS84_DEFINITION,
        "longitude/latitude coordinates in decimal degrees on the WGS 84 spheroid",
    ))?;

    stmt.execute((
        "WGS 84 / Pseudo-Mercator",
        WEB_MERCATOR_SRS_ID,
        "EPSG",
        WEB_MERCATOR_SRS_ID,
        WEB_MERCATOR_DEFINITION,
        "spherical Mercator projection used by slippy maps",
    ))?;

    Ok(())
}

pub fn create_tile_table(conn: &Connection, spec: &TableSpec) -> Result<(), Error> {
    conn.execute(
        &format!(
            "CREATE TABLE \"{}\" (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          zoom_level INTEGER NOT NULL,
          tile_column INTEGER NOT NULL,
          tile_row INTEGER NOT NULL,
          tile_data BLOB NOT NULL,
          UNIQUE (zoom_level, tile_column, tile_row)
        )",
            spec.name
        ),
        (),
    )?;

    let bounds = &spec.contents_bounds;

    conn.execute(
        "INSERT INTO gpkg_contents (table_name, data_type, identifier, min_x, min_y, max_x, max_y, srs_id)
          VALUES (?1, 'tiles', ?1, ?2, ?3, ?4, ?5, ?6)",
        (
            &spec.name,
            bounds.min_x,
            bounds.min_y,
            bounds.max_x,
            bounds.max_y,
            WEB_MERCATOR_SRS_ID,
        ),
    )?;

    let bounds = &spec.matrix_set_bounds;

    conn.execute(
        "INSERT INTO gpkg_tile_matrix_set (table_name, srs_id, min_x, min_y, max_x, max_y)
          VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        (
            &spec.name,
            WEB_MERCATOR_SRS_ID,
            bounds.min_x,
            bounds.min_y,
            bounds.max_x,
            bounds.max_y,
        ),
    )?;

    Ok(())
}

/// Inserts the tile matrix rows missing for the configured zoom range.
///
/// Returns the zoom levels added.
pub fn add_missing_tile_matrices(conn: &Connection, spec: &TableSpec) -> Result<Vec<u8>, Error> {
    let (min_x, min_y, max_x, max_y): (f64, f64, f64, f64) = conn.query_row(
        "SELECT min_x, min_y, max_x, max_y FROM gpkg_tile_matrix_set WHERE table_name = ?1",
        [&spec.name],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
    )?;

    let mut added = Vec::new();

    for zoom in spec.zoom_min..=spec.zoom_max {
        let exists = conn
            .query_row(
                "SELECT 1 FROM gpkg_tile_matrix WHERE table_name = ?1 AND zoom_level = ?2",
                (&spec.name, zoom),
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        if exists {
            continue;
        }

        let matrix_size = 1u64 << zoom;

        let pixels = matrix_size as f64 * f64::from(spec.tile_size);

        conn.execute(
            "INSERT INTO gpkg_tile_matrix
              (table_name, zoom_level, matrix_width, matrix_height, tile_width, tile_height, pixel_x_size, pixel_y_size)
              VALUES (?1, ?2, ?3, ?3, ?4, ?4, ?5, ?6)",
            (
                &spec.name,
                zoom,
                matrix_size as i64,
                spec.tile_size,
                (max_x - min_x) / pixels,
                (max_y - min_y) / pixels,
            ),
        )?;

        added.push(zoom);
    }

    Ok(added)
}

pub fn set_contents_attrs(conn: &Connection, spec: &TableSpec) -> Result<(), Error> {
    if let Some(ref label) = spec.label {
        conn.execute(
            "UPDATE gpkg_contents SET identifier = ?2 WHERE table_name = ?1",
            (&spec.name, label),
        )?;
    }

    if let Some(ref description) = spec.description {
        conn.execute(
            "UPDATE gpkg_contents SET description = ?2 WHERE table_name = ?1",
            (&spec.name, description),
        )?;
    }

    Ok(())
}
