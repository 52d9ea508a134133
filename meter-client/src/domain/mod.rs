pub mod entity;
pub mod geo;
pub mod query;

pub use entity::{ContactInfo, Entity, Meter, MeterSlot, Tariff};
pub use geo::{GeoBounds, GeoPoint, Viewport};
pub use query::{AsOf, QueryContext, ViewportQuery};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("coordinate out of range: lat={latitude}, lon={longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },
    #[error("invalid as-of timestamp {0}, expected YYYY-MM-DD HH:MM")]
    InvalidAsOf(String),
}
