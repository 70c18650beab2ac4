//! Audit Log Record
//!
//! Records are JSON objects carrying opaque payload fields plus the two
//! chain fields `prevHash` and `hash`. The record hash binds the payload
//! to its predecessor:
//!
//! `hash = sha256_hex(prevHash || canonicalize(record without hash))`

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::audit::canonical::{canonicalize, json_type_name};
use crate::audit::digest::sha256_hex;
use crate::error::EncodingError;

/// A single audit record, keys in the order they were read
pub type Record = Map<String, Value>;

pub const PREV_HASH_FIELD: &str = "prevHash";
pub const HASH_FIELD: &str = "hash";

/// Parse one log line into a record
pub fn parse_record(line: &str) -> Result<Record, String> {
    match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(record)) => Ok(record),
        Ok(other) => Err(format!(
            "expected a JSON object, found {}",
            json_type_name(&other)
        )),
        Err(e) => Err(e.to_string()),
    }
}

/// Expected `hash` of a record chained onto `prev_hash`
pub fn chain_hash(prev_hash: &str, record: &Record) -> Result<String, EncodingError> {
    let canonical = canonicalize(record)?;
    Ok(sha256_hex(&[prev_hash.as_bytes(), &canonical]))
}

/// Link a record onto `prev_hash`, setting both chain fields.
///
/// Any existing `prevHash` or `hash` on the input is overwritten.
pub fn seal(mut record: Record, prev_hash: &str) -> Result<Record, EncodingError> {
    record.insert(
        PREV_HASH_FIELD.to_string(),
        Value::String(prev_hash.to_string()),
    );
    let hash = chain_hash(prev_hash, &record)?;
    record.insert(HASH_FIELD.to_string(), Value::String(hash));
    Ok(record)
}

/// Kinds of control-layer events written to the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEventKind {
    #[serde(rename = "tool.proposed")]
    ToolProposed,
    #[serde(rename = "policy.decision")]
    PolicyDecision,
    #[serde(rename = "approval.requested")]
    ApprovalRequested,
    #[serde(rename = "approval.decided")]
    ApprovalDecided,
    #[serde(rename = "tool.executed")]
    ToolExecuted,
}

/// Structured audit event, before chaining
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Milliseconds since the Unix epoch
    pub ts: i64,
    pub kind: AuditEventKind,
    pub data: Value,
}

impl AuditEvent {
    /// Create an event stamped with the current time
    pub fn new(kind: AuditEventKind, data: Value) -> Self {
        Self {
            ts: Utc::now().timestamp_millis(),
            kind,
            data,
        }
    }

    /// Convert into an unsealed record
    pub fn into_record(self) -> Result<Record, EncodingError> {
        match serde_json::to_value(self)? {
            Value::Object(record) => Ok(record),
            other => Err(EncodingError::NotAnObject(
                json_type_name(&other).to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_record() {
        let record = parse_record(r#"{"prevHash":"GENESIS","x":1}"#).unwrap();
        assert_eq!(record.get("x"), Some(&json!(1)));

        assert!(parse_record("{not json").is_err());
        let err = parse_record("[1,2]").unwrap_err();
        assert!(err.contains("array"));
    }

    #[test]
    fn test_parse_preserves_key_order() {
        let record = parse_record(r#"{"z":1,"a":2}"#).unwrap();
        let keys: Vec<_> = record.keys().cloned().collect();
        assert_eq!(keys, vec!["z", "a"]);
    }

    #[test]
    fn test_chain_hash_prefixes_raw_prev_hash() {
        let mut record = Record::new();
        record.insert("x".to_string(), json!(1));
        record.insert(PREV_HASH_FIELD.to_string(), json!("GENESIS"));

        let expected = sha256_hex(&[b"GENESIS", br#"{"prevHash":"GENESIS","x":1}"#]);
        assert_eq!(chain_hash("GENESIS", &record).unwrap(), expected);
    }

    #[test]
    fn test_seal_sets_chain_fields() {
        let mut record = Record::new();
        record.insert("x".to_string(), json!(1));
        let sealed = seal(record, "GENESIS").unwrap();

        assert_eq!(sealed.get(PREV_HASH_FIELD), Some(&json!("GENESIS")));
        let hash = sealed.get(HASH_FIELD).and_then(Value::as_str).unwrap();
        assert_eq!(hash, chain_hash("GENESIS", &sealed).unwrap());
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_seal_overwrites_stale_fields() {
        let mut record = Record::new();
        record.insert(PREV_HASH_FIELD.to_string(), json!("old"));
        record.insert(HASH_FIELD.to_string(), json!("stale"));
        let sealed = seal(record, "new").unwrap();

        assert_eq!(sealed.get(PREV_HASH_FIELD), Some(&json!("new")));
        assert_ne!(sealed.get(HASH_FIELD), Some(&json!("stale")));
    }

    #[test]
    fn test_event_record_layout() {
        let event = AuditEvent {
            ts: 1_700_000_000_000,
            kind: AuditEventKind::PolicyDecision,
            data: json!({"toolName": "exec", "decision": "REQUIRE_CONFIRMATION"}),
        };
        let record = event.into_record().unwrap();
        assert_eq!(record.get("kind"), Some(&json!("policy.decision")));
        assert_eq!(record.get("ts"), Some(&json!(1_700_000_000_000i64)));
    }
}
