//! Canonical JSON Encoding
//!
//! Deterministic byte encoding of audit records used as hash input.
//! The byte layout is a wire contract: records hashed by an appender
//! must re-encode to exactly the same bytes here, or the chain breaks.
//!
//! Record form (`canonicalize`):
//! - top-level `hash` removed
//! - top-level keys in ascending byte order; nested values kept as parsed
//! - compact separators, non-ASCII emitted as literal UTF-8
//! - no trailing newline
//!
//! Deep form (`canonical_json`) sorts keys at every level and removes
//! nothing. It backs the binding hash of tool invocations.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::audit::digest::sha256_hex;
use crate::audit::entry::{Record, HASH_FIELD};
use crate::error::EncodingError;

/// Object whose entries serialize in the order given
struct SortedEntries<'a>(Vec<(&'a String, &'a Value)>);

impl Serialize for SortedEntries<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Value with object keys sorted at every depth
struct DeepSorted<'a>(&'a Value);

impl Serialize for DeepSorted<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Value::Object(object) => {
                let mut entries: Vec<_> = object.iter().collect();
                entries.sort_by(|(a, _), (b, _)| a.as_bytes().cmp(b.as_bytes()));

                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, &DeepSorted(value))?;
                }
                map.end()
            }
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(&DeepSorted(item))?;
                }
                seq.end()
            }
            scalar => scalar.serialize(serializer),
        }
    }
}

/// Canonical bytes of a record, excluding its own `hash`
pub fn canonicalize(record: &Record) -> Result<Vec<u8>, EncodingError> {
    let mut entries: Vec<_> = record
        .iter()
        .filter(|(key, _)| key.as_str() != HASH_FIELD)
        .collect();
    entries.sort_by(|(a, _), (b, _)| a.as_bytes().cmp(b.as_bytes()));

    Ok(serde_json::to_vec(&SortedEntries(entries))?)
}

/// Canonicalize any serializable value that encodes to a JSON object
pub fn canonicalize_value<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, EncodingError> {
    match serde_json::to_value(value)? {
        Value::Object(record) => canonicalize(&record),
        other => Err(EncodingError::NotAnObject(json_type_name(&other).to_string())),
    }
}

/// Deep canonical bytes: keys sorted at every level, nothing removed
pub fn canonical_json(value: &Value) -> Result<Vec<u8>, EncodingError> {
    Ok(serde_json::to_vec(&DeepSorted(value))?)
}

/// SHA-256 over the deep canonical form, hex-encoded.
///
/// This is the value an approval binds to when a tool invocation is
/// proposed; any change to the invocation changes the binding hash.
pub fn binding_hash(value: &Value) -> Result<String, EncodingError> {
    let canonical = canonical_json(value)?;
    Ok(sha256_hex(&[&canonical]))
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
