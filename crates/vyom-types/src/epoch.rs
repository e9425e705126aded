//! Serde helpers encoding `DateTime<Utc>` as fractional epoch seconds.
//!
//! Device clients exchange timestamps as floating-point UNIX seconds, so
//! every timestamp that crosses the wire goes through these helpers.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serializer};

/// Converts a timestamp to fractional epoch seconds.
pub fn to_secs(ts: &DateTime<Utc>) -> f64 {
    ts.timestamp_millis() as f64 / 1000.0
}

/// Converts fractional epoch seconds to a timestamp, if representable.
pub fn from_secs(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    Utc.timestamp_millis_opt((secs * 1000.0).round() as i64).single()
}

pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(to_secs(ts))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let secs = f64::deserialize(deserializer)?;
    from_secs(secs).ok_or_else(|| serde::de::Error::custom(format!("invalid epoch seconds: {secs}")))
}

/// Same encoding for optional timestamps (`null` when absent).
pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(
        ts: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => serializer.serialize_some(&to_secs(ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<f64>::deserialize(deserializer)? {
            Some(secs) => from_secs(secs).map(Some).ok_or_else(|| {
                serde::de::Error::custom(format!("invalid epoch seconds: {secs}"))
            }),
            None => Ok(None),
        }
    }
}
