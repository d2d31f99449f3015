//! The license record and its canonical byte form.
//!
//! The canonical form is the exact input to signing and verification. It is
//! compact JSON with a fixed key order, the `signature` field forced empty and
//! timestamps rendered as RFC 3339 in UTC:
//!
//! ```text
//! {"owner":"Acme Inc","license_id":"…","max_users":100,"max_messages":10000,
//!  "issued_at":"2025-01-01T00:00:00Z","expires_at":"2025-12-31T23:59:59Z","signature":""}
//! ```
//!
//! Changing anything about this layout invalidates every license already
//! issued.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A license as issued, stored and transported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseRecord {
    pub owner: String,
    pub license_id: String,
    pub max_users: i64,
    pub max_messages: i64,
    #[serde(with = "rfc3339_utc")]
    pub issued_at: DateTime<Utc>,
    #[serde(with = "rfc3339_utc")]
    pub expires_at: DateTime<Utc>,
    /// Base64 (standard alphabet) RSA signature over [`canonicalize`].
    #[serde(default)]
    pub signature: String,
}

impl LicenseRecord {
    /// Whether the license has expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Render a timestamp the way it appears in the canonical form and on the wire.
///
/// UTC with a `Z` suffix; fractional seconds only when present (3, 6 or 9
/// digits), so whole-second values stay short.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Produce the canonical bytes of `record` with its signature cleared.
///
/// Only the business fields contribute; whatever `record.signature` holds is
/// ignored.
pub fn canonicalize(record: &LicenseRecord) -> Vec<u8> {
    format!(
        concat!(
            "{{",
            "\"owner\":{},",
            "\"license_id\":{},",
            "\"max_users\":{},",
            "\"max_messages\":{},",
            "\"issued_at\":{},",
            "\"expires_at\":{},",
            "\"signature\":\"\"",
            "}}"
        ),
        json_string(&record.owner),
        json_string(&record.license_id),
        record.max_users,
        record.max_messages,
        json_string(&format_timestamp(&record.issued_at)),
        json_string(&format_timestamp(&record.expires_at)),
    )
    .into_bytes()
}

fn json_string(s: &str) -> String {
    Value::String(s.to_owned()).to_string()
}

/// Serde adapter writing timestamps with [`format_timestamp`].
pub(crate) mod rfc3339_utc {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
