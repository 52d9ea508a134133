pub mod config;
pub mod containment;
pub mod districts;
pub mod engine;
pub mod metrics_server;
pub mod observability;
pub mod popup;
pub mod render_tier;
pub mod search;
pub mod session;

pub use engine::{EngineHandle, EngineOptions, MapCommand, MapEvent, MapState, ViewportSyncEngine};
