pub mod audit;
pub mod config;
pub mod error;

pub use audit::{
    binding_hash, canonical_json, canonicalize, chain_hash, seal, verify_audit_log_file,
    ChainVerifier, ChainWriter, Record, VerifySummary,
};
pub use config::AuditConfig;
pub use error::{ChainError, EncodingError, ErrorKind};
