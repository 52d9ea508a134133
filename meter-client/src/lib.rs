pub mod api;
pub mod domain;

pub use api::{FetchError, HttpSpatialClient, SpatialFetchClient};
