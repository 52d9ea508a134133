use serde::Serialize;

/// Zoom-dependent visualization. Low zoom levels render nothing, mid levels an
/// aggregate heat layer, high levels one marker per entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RenderTier {
    None,
    Heat,
    Markers,
}

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("marker_min_zoom ({marker}) must not be below heat_min_zoom ({heat})")]
pub struct InvalidThresholds {
    heat: u8,
    marker: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierThresholds {
    heat_min_zoom: u8,
    marker_min_zoom: u8,
}

impl TierThresholds {
    pub fn new(heat_min_zoom: u8, marker_min_zoom: u8) -> Result<Self, InvalidThresholds> {
        if marker_min_zoom < heat_min_zoom {
            return Err(InvalidThresholds {
                heat: heat_min_zoom,
                marker: marker_min_zoom,
            });
        }
        Ok(Self {
            heat_min_zoom,
            marker_min_zoom,
        })
    }

    pub fn heat_min_zoom(&self) -> u8 {
        self.heat_min_zoom
    }

    pub fn marker_min_zoom(&self) -> u8 {
        self.marker_min_zoom
    }
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            heat_min_zoom: 10,
            marker_min_zoom: 14,
        }
    }
}

impl RenderTier {
    pub fn for_zoom(zoom: u8, thresholds: &TierThresholds) -> Self {
        if zoom >= thresholds.marker_min_zoom {
            Self::Markers
        } else if zoom >= thresholds.heat_min_zoom {
            Self::Heat
        } else {
            Self::None
        }
    }
}
