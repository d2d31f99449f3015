//! Envelope codec: the transport form of a signed license.
//!
//! An envelope is the standard-alphabet base64 encoding of the record's JSON.
//! The codec does no cryptographic work; a decoded record is only as
//! trustworthy as the signature check performed on it afterwards.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;

use crate::errors::{LicenseError, LicenseResult};
use crate::license::LicenseRecord;

/// Serialize a fully populated record into an envelope string.
pub fn encode(record: &LicenseRecord) -> String {
    let json = serde_json::json!({
        "owner": record.owner,
        "license_id": record.license_id,
        "max_users": record.max_users,
        "max_messages": record.max_messages,
        "issued_at": crate::license::format_timestamp(&record.issued_at),
        "expires_at": crate::license::format_timestamp(&record.expires_at),
        "signature": record.signature,
    });
    B64.encode(json.to_string())
}

/// Parse an envelope back into a record.
///
/// Leading and trailing whitespace (e.g. a newline at the end of a `.lic`
/// file) is ignored.
pub fn decode(envelope: &str) -> LicenseResult<LicenseRecord> {
    let raw = B64
        .decode(envelope.trim())
        .map_err(|e| LicenseError::Decode(format!("invalid base64: {e}")))?;

    serde_json::from_slice(&raw)
        .map_err(|e| LicenseError::Decode(format!("invalid license JSON: {e}")))
}

/// The `license_id` an envelope claims, without any trust in it.
///
/// Used to trace rejected envelopes in logs.
pub fn claimed_license_id(envelope: &str) -> Option<String> {
    decode(envelope).ok().map(|record| record.license_id)
}

/// File name under which an envelope is offered for download.
pub fn download_filename(license_id: &str) -> String {
    format!("license_{license_id}.lic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample() -> LicenseRecord {
        LicenseRecord {
            owner: "Acme Inc".to_string(),
            license_id: "0b8e8f7c-3c55-4e5e-8a63-2f0a9e0c6d11".to_string(),
            max_users: 100,
            max_messages: 10000,
            issued_at: Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap(),
            expires_at: Utc.timestamp_opt(1_767_225_599, 123_456_000).unwrap(),
            signature: "c2lnbmF0dXJl".to_string(),
        }
    }

    #[test]
    fn round_trip() {
        let record = sample();
        assert_eq!(decode(&encode(&record)).unwrap(), record);
    }

    #[test]
    fn wire_format_uses_documented_keys() {
        let raw = B64.decode(encode(&sample())).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();

        assert_eq!(json["owner"], "Acme Inc");
        assert_eq!(json["max_users"], 100);
        assert_eq!(json["max_messages"], 10000);
        assert_eq!(json["issued_at"], "2025-01-01T12:00:00Z");
        assert_eq!(json["signature"], "c2lnbmF0dXJl");
        assert!(json["license_id"].is_string());
        assert!(json["expires_at"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn tolerates_surrounding_whitespace() {
        let record = sample();
        let envelope = format!("  {}\n", encode(&record));
        assert_eq!(decode(&envelope).unwrap(), record);
    }

    #[test]
    fn accepts_non_utc_offsets() {
        let json = r#"{"owner":"Acme Inc","license_id":"x","max_users":1,"max_messages":2,
            "issued_at":"2025-01-01T14:00:00+02:00","expires_at":"2026-01-01T00:00:00Z","signature":""}"#;
        let record = decode(&B64.encode(json)).unwrap();
        assert_eq!(
            record.issued_at,
            Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn invalid_base64_is_decode_error() {
        assert!(matches!(decode("***not base64***"), Err(LicenseError::Decode(_))));
    }

    #[test]
    fn invalid_json_is_decode_error() {
        let envelope = B64.encode("{\"owner\": \"Acme\"");
        assert!(matches!(decode(&envelope), Err(LicenseError::Decode(_))));
    }

    #[test]
    fn missing_field_is_decode_error() {
        let envelope = B64.encode(r#"{"owner":"Acme","license_id":"x"}"#);
        assert!(matches!(decode(&envelope), Err(LicenseError::Decode(_))));
    }

    #[test]
    fn claimed_id_survives_a_forged_signature() {
        let mut record = sample();
        record.signature = "Zm9yZ2Vk".to_string();
        assert_eq!(
            claimed_license_id(&encode(&record)).as_deref(),
            Some("0b8e8f7c-3c55-4e5e-8a63-2f0a9e0c6d11")
        );
        assert_eq!(claimed_license_id("***"), None);
    }

    #[test]
    fn filename_format() {
        assert_eq!(download_filename("abc"), "license_abc.lic");
    }
}
