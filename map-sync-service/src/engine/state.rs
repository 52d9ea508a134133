use std::sync::Arc;

use meter_client::domain::{Entity, GeoPoint, QueryContext};
use serde::Serialize;

use crate::render_tier::RenderTier;

/// Entities currently shown on the map, in backend order.
///
/// Updates build a new set; entries that did not change keep their `Arc`, so
/// consumers can skip re-rendering them by pointer comparison.
#[derive(Debug, Clone, Default)]
pub struct VisibleSet {
    entities: Vec<Arc<Entity>>,
}

impl VisibleSet {
    pub fn new(entities: Vec<Arc<Entity>>) -> Self {
        Self { entities }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Entity>> {
        self.entities.iter()
    }

    pub fn get(&self, entity_id: &str) -> Option<&Arc<Entity>> {
        self.entities.iter().find(|e| e.id == entity_id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entities.iter().map(|e| e.id.as_str()).collect()
    }

    /// One weighted point per entity for the aggregate layer; the weight is
    /// the entity's period consumption.
    pub fn heat_points(&self) -> Vec<HeatPoint> {
        self.entities
            .iter()
            .map(|e| HeatPoint {
                location: e.location,
                intensity: e.period_consumption(),
            })
            .collect()
    }

    /// Overwrite the entry with the same id, or append.
    pub fn upsert(&self, entity: Arc<Entity>) -> Self {
        match self.replace_existing(entity.clone()) {
            Some(updated) => updated,
            None => {
                let mut entities = self.entities.clone();
                entities.push(entity);
                Self { entities }
            }
        }
    }

    /// Overwrite the entry with the same id; `None` when the id is not shown.
    pub fn replace_existing(&self, entity: Arc<Entity>) -> Option<Self> {
        let idx = self.entities.iter().position(|e| e.id == entity.id)?;
        let mut entities = self.entities.clone();
        entities[idx] = entity;
        Some(Self { entities })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeatPoint {
    pub location: GeoPoint,
    pub intensity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SyncStatus {
    /// Nothing fetched yet.
    Idle,
    Refreshing,
    Fresh,
    /// Last refresh failed; the visible set is the last good one.
    Degraded { reason: String },
}

/// Snapshot published after every change the map has to react to.
#[derive(Debug, Clone)]
pub struct MapState {
    pub visible: Arc<VisibleSet>,
    /// Incremented whenever `visible` is replaced.
    pub generation: u64,
    pub tier: RenderTier,
    pub status: SyncStatus,
    pub context: QueryContext,
}

impl MapState {
    /// Heat layer contents; empty unless the current zoom renders heat.
    pub fn heat_layer(&self) -> Vec<HeatPoint> {
        match self.tier {
            RenderTier::Heat => self.visible.heat_points(),
            RenderTier::None | RenderTier::Markers => Vec::new(),
        }
    }
}
