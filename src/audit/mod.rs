//! Audit Log System
//!
//! Tamper-evident JSONL audit logs: canonical record encoding, hash
//! chaining, streaming verification and an append-side writer.

pub mod canonical;
pub mod digest;
pub mod entry;
pub mod logger;
pub mod verify;

pub use canonical::{binding_hash, canonical_json, canonicalize, canonicalize_value};
pub use digest::sha256_hex;
pub use entry::{
    chain_hash, parse_record, seal, AuditEvent, AuditEventKind, Record, HASH_FIELD,
    PREV_HASH_FIELD,
};
pub use logger::ChainWriter;
pub use verify::{verify_audit_log_file, ChainVerifier, VerifySummary};
