use std::sync::Arc;

use meter_client::domain::{AsOf, Entity, GeoBounds, GeoPoint, Viewport};
use serde::{Deserialize, Serialize};

/// Map interaction and filter changes fed into the engine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MapEvent {
    /// Pan or zoom settled.
    ViewportChanged { viewport: Viewport },
    AsOfChanged { as_of: AsOf },
    RecordLimitChanged { record_limit: u32 },
    DistrictSelected { district_id: Option<String> },
    Search { query: String },
    EntitySelected { entity_id: String },
    MarkerMounted { entity_id: String },
    PopupClosed { entity_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PopupView {
    Loading,
    Ready(Arc<Entity>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Notice {
    NoMatch { query: String },
    SearchFailed { query: String, reason: String },
}

/// One-shot instructions for the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MapCommand {
    FitBounds(GeoBounds),
    CenterOn { point: GeoPoint, zoom: u8 },
    OpenPopup { entity_id: String },
    Popup { entity_id: String, view: PopupView },
    Notice(Notice),
}
