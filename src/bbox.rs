use crate::{error::Error, geo::lon_lat_to_meters};

/// Projected EPSG:3857 extent in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BBox {
    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            min_x: self.min_x.min(other.min_x),
            max_x: self.max_x.max(other.max_x),
            min_y: self.min_y.min(other.min_y),
            max_y: self.max_y.max(other.max_y),
        }
    }
}

/// Geographic bounding box in degrees.
///
/// `west > east` denotes a box crossing the antimeridian. Longitudes outside
/// `[-180, 180]` are accepted as an equivalent, unwrapped way of saying the
/// same thing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    pub fn to_array(self) -> [f64; 4] {
        [self.west, self.south, self.east, self.north]
    }

    fn invalid(self, reason: &'static str) -> Error {
        Error::InvalidBoundingBox(self.to_array(), reason)
    }

    pub fn validate_latitudes(&self) -> Result<(), Error> {
        if self.to_array().iter().any(|v| !v.is_finite()) {
            return Err(self.invalid("coordinates must be finite"));
        }

        if self.south >= self.north {
            return Err(self.invalid("south must be less than north"));
        }

        if self.south < -90.0 || self.north > 90.0 {
            return Err(self.invalid("latitude out of range"));
        }

        Ok(())
    }

    /// Splits the box at the antimeridian into one or two boxes with `west < east`.
    pub fn normalize(&self) -> Result<Vec<BoundingBox>, Error> {
        self.validate_latitudes()?;

        if self.west < self.east {
            return Ok(vec![*self]);
        }

        if self.west == self.east {
            return Err(self.invalid("zero-width box"));
        }

        if !(-180.0..=180.0).contains(&self.west) || !(-180.0..=180.0).contains(&self.east) {
            return Err(self.invalid("crossing box longitudes must lie within [-180, 180]"));
        }

        Ok(vec![
            BoundingBox::new(self.west, self.south, 180.0, self.north),
            BoundingBox::new(-180.0, self.south, self.east, self.north),
        ])
    }

    /// EPSG:3857 extent of a non-crossing box.
    pub fn to_meters(&self) -> BBox {
        let (min_x, min_y) = lon_lat_to_meters(self.west, self.south);
        let (max_x, max_y) = lon_lat_to_meters(self.east, self.north);

        BBox {
            min_x,
            max_x,
            min_y,
            max_y,
        }
    }
}
