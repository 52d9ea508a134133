//! Lazy detail loading for entity popups, cached per (entity id, as-of).

use std::{collections::HashMap, sync::Arc};

use meter_client::{
    domain::{AsOf, Entity},
    FetchError,
};

#[derive(Debug, Clone)]
enum DetailState {
    Pending,
    Ready(Arc<Entity>),
}

/// What the popup should do right after a selection.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Detail already resolved for this as-of.
    Ready(Arc<Entity>),
    /// A fetch for this key is still outstanding.
    AlreadyLoading,
    /// Caller must start a fetch; the key is now marked pending.
    Fetch,
}

#[derive(Debug, Default)]
pub struct PopupDetailLoader {
    cache: HashMap<(String, AsOf), DetailState>,
}

impl PopupDetailLoader {
    pub fn select(&mut self, entity_id: &str, as_of: &AsOf) -> Selection {
        let key = (entity_id.to_string(), as_of.clone());
        match self.cache.get(&key) {
            Some(DetailState::Ready(detail)) => Selection::Ready(detail.clone()),
            Some(DetailState::Pending) => Selection::AlreadyLoading,
            None => {
                self.cache.insert(key, DetailState::Pending);
                Selection::Fetch
            }
        }
    }

    /// Record a finished fetch. A failure forgets the pending mark so the next
    /// selection retries.
    pub fn complete(
        &mut self,
        entity_id: &str,
        as_of: &AsOf,
        result: Result<Entity, FetchError>,
    ) -> Result<Arc<Entity>, FetchError> {
        let key = (entity_id.to_string(), as_of.clone());
        match result {
            Ok(detail) => {
                let detail = Arc::new(detail);
                self.cache.insert(key, DetailState::Ready(detail.clone()));
                Ok(detail)
            }
            Err(e) => {
                self.cache.remove(&key);
                Err(e)
            }
        }
    }

    pub fn cached(&self, entity_id: &str, as_of: &AsOf) -> Option<Arc<Entity>> {
        match self.cache.get(&(entity_id.to_string(), as_of.clone())) {
            Some(DetailState::Ready(detail)) => Some(detail.clone()),
            _ => None,
        }
    }

    /// Drop resolved details for other points in time. Pending entries stay so
    /// their completion is still accounted for.
    pub fn retain_as_of(&mut self, as_of: &AsOf) {
        self.cache
            .retain(|(_, key_as_of), state| key_as_of == as_of || matches!(state, DetailState::Pending));
    }
}
