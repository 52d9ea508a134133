use std::fmt;

use serde::{Deserialize, Serialize};
use time::{format_description::FormatItem, macros::format_description, OffsetDateTime, PrimitiveDateTime};

use super::{DomainError, GeoBounds};

const AS_OF_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day] [hour]:[minute]");

/// Point-in-time selector sent to the backend as `YYYY-MM-DD HH:MM`.
///
/// The value is opaque to the engine: it is only compared for equality and
/// forwarded verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AsOf(String);

impl AsOf {
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        let trimmed = s.trim();
        PrimitiveDateTime::parse(trimmed, AS_OF_FORMAT)
            .map_err(|e| DomainError::InvalidAsOf(format!("'{trimmed}': {e}")))?;
        Ok(Self(trimmed.to_string()))
    }

    pub fn from_datetime(dt: PrimitiveDateTime) -> Self {
        Self(dt.format(AS_OF_FORMAT).unwrap_or_else(|_| dt.to_string()))
    }

    pub fn now_utc() -> Self {
        let now = OffsetDateTime::now_utc();
        Self::from_datetime(PrimitiveDateTime::new(now.date(), now.time()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AsOf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AsOf {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        AsOf::parse(&s)
    }
}

impl From<AsOf> for String {
    fn from(a: AsOf) -> Self {
        a.0
    }
}

/// Operator-selected filters. Any change starts a new fetch cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryContext {
    pub as_of: AsOf,
    pub district_id: Option<String>,
    pub record_limit: u32,
}

/// Parameters of a single `points-in-viewport` request.
///
/// District filtering happens locally, so the district is deliberately not
/// part of the network query.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportQuery {
    pub bounds: GeoBounds,
    pub as_of: AsOf,
    pub record_limit: u32,
}

impl ViewportQuery {
    pub fn new(bounds: GeoBounds, ctx: &QueryContext) -> Self {
        Self {
            bounds,
            as_of: ctx.as_of.clone(),
            record_limit: ctx.record_limit,
        }
    }
}
