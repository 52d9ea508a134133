use geo::{Contains, Point};
use meter_client::domain::{Entity, GeoPoint};

use crate::districts::{DistrictPolygon, DistrictShapeIndex};

/// Strict point-in-polygon test.
///
/// Points lying exactly on the boundary (edges or vertices) are outside.
pub fn contains(polygon: &DistrictPolygon, p: &GeoPoint) -> bool {
    polygon.shape.contains(&Point::new(p.longitude(), p.latitude()))
}

/// Keep only the entities located strictly inside `polygon`, preserving
/// order.
pub fn filter_inside<T>(polygon: &DistrictPolygon, entities: Vec<T>) -> Vec<T>
where
    T: AsRef<Entity>,
{
    entities
        .into_iter()
        .filter(|e| contains(polygon, &e.as_ref().location))
        .collect()
}

/// District filter as applied on every refresh: no district, or a district
/// whose boundary is not loaded, passes everything through.
pub fn apply_district<T>(index: &DistrictShapeIndex, district_id: Option<&str>, entities: Vec<T>) -> Vec<T>
where
    T: AsRef<Entity>,
{
    match district_id.and_then(|id| index.lookup(id)) {
        Some(polygon) => {
            let before = entities.len();
            let kept = filter_inside(polygon, entities);
            tracing::debug!(
                district_id = %polygon.district_id,
                before,
                after = kept.len(),
                "district filter applied"
            );
            kept
        }
        None => entities,
    }
}
