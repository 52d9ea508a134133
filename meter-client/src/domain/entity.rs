use serde::{Deserialize, Serialize};

use super::GeoPoint;

/// A contract/household and the meters installed on it.
///
/// Entities are shared as `Arc<Entity>` once received and are never mutated;
/// a re-fetch or a detail refinement replaces the whole record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub contact: ContactInfo,
    pub location: GeoPoint,
    pub district: Option<String>,
    pub zone: Option<String>,
    pub meters: Vec<MeterSlot>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub tax_id: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// A meter reference as delivered by the backend.
///
/// Summary responses may list only meter codes; those stay `Pending` until a
/// detail fetch resolves them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MeterSlot {
    Resolved(Meter),
    Pending(String),
}

impl MeterSlot {
    pub fn code(&self) -> &str {
        match self {
            Self::Resolved(m) => &m.code,
            Self::Pending(code) => code,
        }
    }

    pub fn resolved(&self) -> Option<&Meter> {
        match self {
            Self::Resolved(m) => Some(m),
            Self::Pending(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meter {
    pub code: String,
    pub model: Option<String>,
    /// Operational state as reported by the meter (`Activo`, `Falla`, ...).
    pub status: Option<String>,
    pub read_at: Option<String>,
    pub last_reading: Option<f64>,
    pub period_consumption: Option<f64>,
    pub tariff: Option<Tariff>,
}

/// Tariffs arrive either pre-formatted (`"$1.25"`) or as a bare amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Tariff {
    Amount(f64),
    Formatted(String),
}

impl Entity {
    /// Case-insensitive substring match against the id, the name and every
    /// meter code. `needle` must already be lowercase.
    pub fn matches_lowercase(&self, needle: &str) -> bool {
        self.id.to_lowercase().contains(needle)
            || self.name.to_lowercase().contains(needle)
            || self
                .meters
                .iter()
                .any(|m| m.code().to_lowercase().contains(needle))
    }

    /// Sum of the period consumption of resolved meters, used as the heat
    /// intensity. Pending meters contribute nothing.
    pub fn period_consumption(&self) -> f64 {
        self.meters
            .iter()
            .filter_map(MeterSlot::resolved)
            .filter_map(|m| m.period_consumption)
            .sum()
    }
}
