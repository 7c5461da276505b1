//! Spherical Web Mercator (EPSG:3857) helpers.

use std::f64::consts::PI;

pub const WEB_MERCATOR_EXTENT: f64 = 20_037_508.342_789_244;

/// Latitude at which the square Web Mercator world ends.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Fractional tile column of a longitude at `zoom`.
///
/// The result is not wrapped, so longitudes beyond ±180° land outside
/// `0..2^zoom`. Callers wrap columns themselves.
pub fn lon_to_tile_x(lon: f64, zoom: u8) -> f64 {
    (lon + 180.0) / 360.0 * f64::from(zoom).exp2()
}

/// Fractional tile row of a latitude at `zoom`, clamped to the Mercator world.
pub fn lat_to_tile_y(lat: f64, zoom: u8) -> f64 {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();

    (1.0 - lat.tan().asinh() / PI) / 2.0 * f64::from(zoom).exp2()
}

/// Projects longitude/latitude degrees to EPSG:3857 meters.
pub fn lon_lat_to_meters(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);

    let x = lon * WEB_MERCATOR_EXTENT / 180.0;
    let y = ((90.0 + lat) * PI / 360.0).tan().ln() * WEB_MERCATOR_EXTENT / PI;

    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_columns_span_the_world() {
        assert_eq!(lon_to_tile_x(-180.0, 4), 0.0);
        assert_eq!(lon_to_tile_x(180.0, 4), 16.0);
        assert_eq!(lon_to_tile_x(0.0, 4), 8.0);
    }

    #[test]
    fn tile_columns_are_not_wrapped() {
        assert!(lon_to_tile_x(-199.3725, 8) < 0.0);
        assert!(lon_to_tile_x(199.3217, 8) > 256.0);
    }

    #[test]
    fn tile_rows_are_clamped_at_the_poles() {
        assert!(lat_to_tile_y(90.0, 5).abs() < 1e-9);
        assert!((lat_to_tile_y(-90.0, 5) - 32.0).abs() < 1e-9);
        assert!((lat_to_tile_y(0.0, 5) - 16.0).abs() < 1e-9);
    }

    #[test]
    fn meters_match_the_world_extent() {
        let (x, y) = lon_lat_to_meters(180.0, MAX_LATITUDE);

        assert!((x - WEB_MERCATOR_EXTENT).abs() < 1e-6);
        assert!((y - WEB_MERCATOR_EXTENT).abs() < 1.0);

        let (x, y) = lon_lat_to_meters(0.0, 0.0);

        assert!(x.abs() < 1e-9);
        assert!(y.abs() < 1e-6);
    }
}
