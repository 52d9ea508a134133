pub mod http;
pub(crate) mod wire;

pub use http::{BackendRoutes, HttpSpatialClient};

use crate::domain::{AsOf, Entity, ViewportQuery};

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend returned {status} for {url}")]
    Status { status: u16, url: String },
    #[error("failed to decode backend response: {0}")]
    Decode(String),
    #[error("entity {0} not found")]
    NotFound(String),
    #[error("invalid request url {0}")]
    InvalidUrl(String),
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Backend operations consumed by the map engine.
///
/// Implementations normalize the backend's wire format into [`Entity`]
/// values; entities with invalid coordinates are dropped, never returned.
#[async_trait::async_trait]
pub trait SpatialFetchClient: Send + Sync {
    /// Entity summaries located inside the query bounds, at most
    /// `record_limit` of them.
    async fn points_in_viewport(&self, query: &ViewportQuery) -> Result<Vec<Entity>, FetchError>;

    /// Full record for one entity with its meters resolved.
    async fn entity_detail(&self, id: &str, as_of: &AsOf) -> Result<Entity, FetchError>;

    /// Candidates matching a free-text query (id, name or meter code).
    async fn identify(&self, query: &str, as_of: &AsOf) -> Result<Vec<Entity>, FetchError>;
}

/// Local fallback for [`SpatialFetchClient::identify`]: case-insensitive
/// substring scan over a full entity list, keeping the first record per id.
pub fn identify_locally<I>(entities: I, query: &str) -> Vec<Entity>
where
    I: IntoIterator<Item = Entity>,
{
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }

    let mut seen = std::collections::HashSet::new();
    entities
        .into_iter()
        .filter(|e| e.matches_lowercase(&needle))
        .filter(|e| seen.insert(e.id.clone()))
        .collect()
}
