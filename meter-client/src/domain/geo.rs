use serde::{Deserialize, Serialize};

use super::DomainError;

/// A WGS84 coordinate. Construct through [`GeoPoint::new`] to keep the
/// latitude/longitude ranges valid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGeoPoint")]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawGeoPoint {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawGeoPoint> for GeoPoint {
    type Error = DomainError;

    fn try_from(raw: RawGeoPoint) -> Result<Self, Self::Error> {
        GeoPoint::new(raw.latitude, raw.longitude)
    }
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, DomainError> {
        let lat_ok = (-90.0..=90.0).contains(&latitude);
        let lon_ok = (-180.0..=180.0).contains(&longitude);
        if !lat_ok || !lon_ok {
            return Err(DomainError::InvalidCoordinate { latitude, longitude });
        }
        Ok(Self { latitude, longitude })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// Axis-aligned geographic rectangle. Both corners are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub south_west: GeoPoint,
    pub north_east: GeoPoint,
}

impl GeoBounds {
    pub fn new(south_west: GeoPoint, north_east: GeoPoint) -> Self {
        Self { south_west, north_east }
    }

    /// Smallest rectangle covering every point; `None` for an empty iterator.
    pub fn enclosing<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = GeoPoint>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (mut south, mut west) = (first.latitude, first.longitude);
        let (mut north, mut east) = (first.latitude, first.longitude);

        for p in iter {
            south = south.min(p.latitude);
            north = north.max(p.latitude);
            west = west.min(p.longitude);
            east = east.max(p.longitude);
        }

        // Min/max of already-valid coordinates stay in range.
        Some(Self {
            south_west: GeoPoint { latitude: south, longitude: west },
            north_east: GeoPoint { latitude: north, longitude: east },
        })
    }

    pub fn contains(&self, p: &GeoPoint) -> bool {
        p.latitude >= self.south_west.latitude
            && p.latitude <= self.north_east.latitude
            && p.longitude >= self.south_west.longitude
            && p.longitude <= self.north_east.longitude
    }
}

/// The visible map rectangle plus zoom level, as reported by the map after a
/// pan or zoom settles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub bounds: GeoBounds,
    pub zoom: u8,
}
