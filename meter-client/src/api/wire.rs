//! JSON shapes emitted by the metering backend and their conversion into the
//! domain model.

use std::fmt;

use serde::Deserialize;

use crate::domain::{ContactInfo, DomainError, Entity, GeoPoint, Meter, MeterSlot, Tariff};

/// Identifier-like fields that some backend versions emit as numbers.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum Loose {
    Text(String),
    Number(serde_json::Number),
}

impl fmt::Display for Loose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct IncomingEntity {
    #[serde(rename = "ContratoID")]
    id: Loose,
    #[serde(rename = "Nombre", default)]
    name: Option<String>,
    #[serde(rename = "CI/NIT", alias = "CI_NIT", default)]
    tax_id: Option<Loose>,
    #[serde(rename = "Email", default)]
    email: Option<String>,
    #[serde(rename = "Telefono", default)]
    phone: Option<Loose>,
    #[serde(rename = "Latitud")]
    latitude: f64,
    #[serde(rename = "Longitud")]
    longitude: f64,
    #[serde(rename = "Distrito", default)]
    district: Option<Loose>,
    #[serde(rename = "Zona", default)]
    zone: Option<Loose>,
    #[serde(rename = "Medidores", default)]
    meters: Option<Vec<IncomingMeterSlot>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IncomingMeterSlot {
    Resolved(IncomingMeter),
    Code(Loose),
    Malformed(serde_json::Value),
}

#[derive(Debug, Deserialize)]
struct IncomingMeter {
    #[serde(rename = "CodigoMedidor")]
    code: Loose,
    #[serde(rename = "Modelo", default)]
    model: Option<String>,
    #[serde(rename = "Estado", default)]
    status: Option<String>,
    #[serde(rename = "FechaHora", default)]
    read_at: Option<String>,
    #[serde(rename = "Lectura", default)]
    reading: Option<f64>,
    #[serde(rename = "ConsumoPeriodo", default)]
    period_consumption: Option<f64>,
    #[serde(rename = "TarifaUSD", default)]
    tariff: Option<Tariff>,
}

impl From<IncomingMeterSlot> for MeterSlot {
    fn from(i: IncomingMeterSlot) -> Self {
        match i {
            IncomingMeterSlot::Code(code) => MeterSlot::Pending(code.to_string()),
            IncomingMeterSlot::Malformed(_) => MeterSlot::Pending(String::new()),
            IncomingMeterSlot::Resolved(m) => MeterSlot::Resolved(Meter {
                code: m.code.to_string(),
                model: m.model,
                status: m.status,
                read_at: m.read_at,
                last_reading: m.reading,
                period_consumption: m.period_consumption,
                tariff: m.tariff,
            }),
        }
    }
}

impl TryFrom<IncomingEntity> for Entity {
    type Error = DomainError;

    fn try_from(i: IncomingEntity) -> Result<Self, Self::Error> {
        let location = GeoPoint::new(i.latitude, i.longitude)?;
        Ok(Entity {
            id: i.id.to_string(),
            name: i.name.unwrap_or_default(),
            contact: ContactInfo {
                tax_id: i.tax_id.map(|v| v.to_string()),
                email: i.email,
                phone: i.phone.map(|v| v.to_string()),
            },
            location,
            district: i.district.map(|v| v.to_string()),
            zone: i.zone.map(|v| v.to_string()),
            meters: i
                .meters
                .unwrap_or_default()
                .into_iter()
                .map(MeterSlot::from)
                .collect(),
        })
    }
}

/// List endpoints answer either with a bare array or wrapped together with
/// the effective query time. Items stay raw so one broken record cannot fail
/// the whole list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum EntityList {
    Bare(Vec<serde_json::Value>),
    Envelope {
        #[serde(rename = "clientes")]
        entities: Vec<serde_json::Value>,
    },
}

impl EntityList {
    pub(crate) fn into_inner(self) -> Vec<serde_json::Value> {
        match self {
            Self::Bare(v) => v,
            Self::Envelope { entities } => entities,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum EntityDetail {
    Envelope {
        #[serde(rename = "cliente")]
        entity: IncomingEntity,
    },
    Bare(IncomingEntity),
}

impl EntityDetail {
    pub(crate) fn into_inner(self) -> IncomingEntity {
        match self {
            Self::Envelope { entity } => entity,
            Self::Bare(e) => e,
        }
    }
}

/// Convert a decoded list, dropping (and counting) entries that are
/// malformed or carry invalid coordinates instead of failing the whole
/// response.
pub(crate) fn normalize(incoming: Vec<serde_json::Value>) -> Vec<Entity> {
    let mut out = Vec::with_capacity(incoming.len());
    for raw in incoming {
        let id = match raw.get("ContratoID") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let converted = serde_json::from_value::<IncomingEntity>(raw)
            .map_err(|e| e.to_string())
            .and_then(|i| Entity::try_from(i).map_err(|e| e.to_string()));
        match converted {
            Ok(e) => out.push(e),
            Err(e) => {
                tracing::warn!(entity_id = %id, error = %e, "dropping undecodable entity");
                metrics::counter!("map_entities_dropped_invalid_total").increment(1);
            }
        }
    }
    out
}
