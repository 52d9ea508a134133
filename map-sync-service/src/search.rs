//! Free-text identify flow: turns backend candidates into a camera action and
//! tracks which entity's popup should open once its marker is on the map.

use std::{collections::HashSet, sync::Arc};

use meter_client::domain::{Entity, GeoBounds};

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    NoMatch,
    Single(Arc<Entity>),
    Multiple { bounds: GeoBounds, count: usize },
}

/// Issued for every accepted query; only the latest ticket may land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTicket {
    pub token: u64,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingFocus {
    entity_id: String,
    opened: bool,
}

#[derive(Debug, Default)]
pub struct SearchIdentifyFlow {
    latest: u64,
    pending_focus: Option<PendingFocus>,
}

impl SearchIdentifyFlow {
    /// Accept a query. Blank input is ignored.
    pub fn begin(&mut self, raw: &str) -> Option<SearchTicket> {
        let query = raw.trim();
        if query.is_empty() {
            return None;
        }
        self.latest += 1;
        Some(SearchTicket {
            token: self.latest,
            query: query.to_string(),
        })
    }

    pub fn is_current(&self, token: u64) -> bool {
        token == self.latest
    }

    /// Classify candidates, collapsing duplicate ids (first one wins).
    pub fn resolve(candidates: Vec<Entity>) -> SearchOutcome {
        let mut seen = HashSet::new();
        let mut unique: Vec<Entity> = candidates
            .into_iter()
            .filter(|e| seen.insert(e.id.clone()))
            .collect();

        match unique.len() {
            0 => SearchOutcome::NoMatch,
            1 => SearchOutcome::Single(Arc::new(unique.remove(0))),
            count => match GeoBounds::enclosing(unique.iter().map(|e| e.location)) {
                Some(bounds) => SearchOutcome::Multiple { bounds, count },
                None => SearchOutcome::NoMatch,
            },
        }
    }

    /// Mark `entity_id` as the popup to open once its marker mounts.
    pub fn focus(&mut self, entity_id: &str) {
        self.pending_focus = Some(PendingFocus {
            entity_id: entity_id.to_string(),
            opened: false,
        });
    }

    pub fn clear_focus(&mut self) {
        self.pending_focus = None;
    }

    pub fn pending_focus(&self) -> Option<&str> {
        self.pending_focus.as_ref().map(|p| p.entity_id.as_str())
    }

    /// Consulted for every mounted marker. Returns `true` exactly once for the
    /// pending entity; re-renders of the same marker do not reopen it.
    pub fn on_marker_mounted(&mut self, entity_id: &str) -> bool {
        match self.pending_focus.as_mut() {
            Some(p) if p.entity_id == entity_id && !p.opened => {
                p.opened = true;
                true
            }
            _ => false,
        }
    }

    /// The user closed a popup; forget the focus target if it was this one.
    pub fn on_popup_closed(&mut self, entity_id: &str) -> bool {
        if self.pending_focus() == Some(entity_id) {
            self.pending_focus = None;
            true
        } else {
            false
        }
    }
}
