//! Administrative district boundaries, loaded once and looked up by id.

use std::{collections::HashMap, path::Path};

use geo::{BoundingRect, Coord, LineString, MultiPolygon, Polygon};
use meter_client::domain::{GeoBounds, GeoPoint};
use serde::Deserialize;

#[derive(thiserror::Error, Debug)]
pub enum DistrictError {
    #[error("failed to read district source: {0}")]
    Read(String),
    #[error("invalid district GeoJSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A district boundary. `ring` keeps the outer ring of the first part in
/// latitude/longitude order; `shape` is the same geometry converted once to
/// the (x = lon, y = lat) layout the containment test works on.
#[derive(Debug, Clone)]
pub struct DistrictPolygon {
    pub district_id: String,
    pub ring: Vec<GeoPoint>,
    pub shape: MultiPolygon<f64>,
}

impl DistrictPolygon {
    pub fn bounds(&self) -> Option<GeoBounds> {
        let rect = self.shape.bounding_rect()?;
        let sw = GeoPoint::new(rect.min().y, rect.min().x).ok()?;
        let ne = GeoPoint::new(rect.max().y, rect.max().x).ok()?;
        Some(GeoBounds::new(sw, ne))
    }
}

#[derive(Debug, Clone, Default)]
pub struct DistrictShapeIndex {
    by_id: HashMap<String, DistrictPolygon>,
}

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    #[serde(default)]
    properties: Option<HashMap<String, serde_json::Value>>,
    geometry: Option<Geometry>,
}

#[derive(Deserialize)]
struct Geometry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: serde_json::Value,
}

type Ring = Vec<[f64; 2]>;

impl Geometry {
    fn into_polygons(self) -> Result<Vec<Polygon<f64>>, serde_json::Error> {
        let polygons = match self.kind.as_str() {
            "Polygon" => {
                let rings: Vec<Ring> = serde_json::from_value(self.coordinates)?;
                to_polygon(&rings).into_iter().collect()
            }
            "MultiPolygon" => {
                let polys: Vec<Vec<Ring>> = serde_json::from_value(self.coordinates)?;
                polys.iter().filter_map(|p| to_polygon(p)).collect()
            }
            _ => Vec::new(),
        };
        Ok(polygons)
    }
}

fn to_polygon(rings: &[Ring]) -> Option<Polygon<f64>> {
    let mut iter = rings.iter().map(|ring| {
        LineString::from(
            ring.iter()
                .map(|[lon, lat]| Coord { x: *lon, y: *lat })
                .collect::<Vec<_>>(),
        )
    });
    let exterior = iter.next()?;
    if exterior.0.len() < 3 {
        return None;
    }
    Some(Polygon::new(exterior, iter.collect()))
}

fn property_as_id(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl DistrictShapeIndex {
    /// Parse a GeoJSON FeatureCollection. Features without a usable id
    /// property, with non-polygonal geometry or with malformed coordinates
    /// are skipped.
    pub fn from_geojson(json: &str, id_property: &str) -> Result<Self, DistrictError> {
        let collection: FeatureCollection = serde_json::from_str(json)?;
        let mut by_id = HashMap::with_capacity(collection.features.len());

        for feature in collection.features {
            let id = feature
                .properties
                .as_ref()
                .and_then(|props| props.get(id_property))
                .and_then(property_as_id);
            let Some(id) = id else {
                tracing::debug!(id_property, "skipping district feature without id");
                continue;
            };

            let parts = match feature.geometry {
                Some(geometry) => match geometry.into_polygons() {
                    Ok(parts) => parts,
                    Err(e) => {
                        tracing::warn!(district_id = %id, error = %e, "skipping district with malformed geometry");
                        metrics::counter!("district_features_skipped_total").increment(1);
                        continue;
                    }
                },
                None => Vec::new(),
            };
            if parts.is_empty() {
                tracing::debug!(district_id = %id, "skipping district without polygon geometry");
                continue;
            }

            let ring = parts[0]
                .exterior()
                .coords()
                .filter_map(|c| GeoPoint::new(c.y, c.x).ok())
                .collect();

            by_id.insert(
                id.clone(),
                DistrictPolygon {
                    district_id: id,
                    ring,
                    shape: MultiPolygon::new(parts),
                },
            );
        }

        Ok(Self { by_id })
    }

    /// Load the boundary dataset from a local path or an http(s) URL.
    ///
    /// Never fails: any error is logged and yields an empty index, which turns
    /// district filtering into a pass-through.
    pub async fn load(source: &str, id_property: &str, http: &reqwest::Client) -> Self {
        let body = if source.starts_with("http://") || source.starts_with("https://") {
            fetch_remote(source, http).await
        } else {
            tokio::fs::read_to_string(Path::new(source))
                .await
                .map_err(|e| DistrictError::Read(e.to_string()))
        };

        let parsed = body.and_then(|json| Self::from_geojson(&json, id_property));
        match parsed {
            Ok(index) => {
                tracing::info!(source, districts = index.len(), "district shapes loaded");
                metrics::gauge!("district_shapes_loaded").set(index.len() as f64);
                index
            }
            Err(e) => {
                tracing::warn!(source, error = %e, "district shapes unavailable, district filter disabled");
                metrics::counter!("district_shapes_load_failures_total").increment(1);
                Self::default()
            }
        }
    }

    pub fn lookup(&self, district_id: &str) -> Option<&DistrictPolygon> {
        self.by_id.get(district_id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl FromIterator<DistrictPolygon> for DistrictShapeIndex {
    fn from_iter<T: IntoIterator<Item = DistrictPolygon>>(iter: T) -> Self {
        Self {
            by_id: iter.into_iter().map(|d| (d.district_id.clone(), d)).collect(),
        }
    }
}

async fn fetch_remote(url: &str, http: &reqwest::Client) -> Result<String, DistrictError> {
    let resp = http
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| DistrictError::Read(e.to_string()))?;
    resp.text().await.map_err(|e| DistrictError::Read(e.to_string()))
}
