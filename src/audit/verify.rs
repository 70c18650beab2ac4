//! Audit Log Verification
//!
//! Single-pass, fail-fast verification of a hash-chained JSONL audit log.
//! Only the previous record's hash is carried between lines, so memory use
//! does not grow with the length of the log.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::audit::entry::{chain_hash, parse_record, HASH_FIELD, PREV_HASH_FIELD};
use crate::error::{ChainError, GENESIS_REQUIRED};

/// Label used for I/O errors on sources that are not files
const STREAM_SOURCE: &str = "<stream>";

/// Outcome of a successful verification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifySummary {
    /// Number of records checked (blank lines excluded)
    pub records: usize,
    /// `prevHash` of the first record
    pub genesis: Option<String>,
    /// `hash` of the last record; the value the next record must link to
    pub head_hash: Option<String>,
}

impl VerifySummary {
    pub fn summary(&self) -> String {
        format!("OK: hash chain verified ({} records)", self.records)
    }
}

/// Hash-chain verifier.
///
/// By default the first record's `prevHash` is taken as the chain's genesis
/// value without further checks. Use [`ChainVerifier::with_genesis`] to pin
/// the genesis to a known value.
#[derive(Debug, Clone, Default)]
pub struct ChainVerifier {
    pinned_genesis: Option<String>,
}

impl ChainVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require the first record's `prevHash` to equal `genesis`
    pub fn with_genesis(genesis: impl Into<String>) -> Self {
        Self {
            pinned_genesis: Some(genesis.into()),
        }
    }

    pub fn pinned_genesis(&self) -> Option<&str> {
        self.pinned_genesis.as_deref()
    }

    /// Verify the audit log at `path`
    pub fn verify_file(&self, path: impl AsRef<Path>) -> Result<VerifySummary, ChainError> {
        let path = path.as_ref();
        info!("Verifying audit log file: {}", path.display());

        let file = File::open(path).map_err(|e| ChainError::io(path, e))?;
        self.scan(BufReader::new(file), path)
    }

    /// Verify newline-delimited records from any buffered reader
    pub fn verify_reader<R: BufRead>(&self, reader: R) -> Result<VerifySummary, ChainError> {
        self.scan(reader, Path::new(STREAM_SOURCE))
    }

    /// Verify an in-memory log
    pub fn verify_str(&self, input: &str) -> Result<VerifySummary, ChainError> {
        self.verify_reader(input.as_bytes())
    }

    fn scan<R: BufRead>(&self, mut reader: R, origin: &Path) -> Result<VerifySummary, ChainError> {
        let mut state = ChainState::default();
        let mut buf = Vec::new();
        let mut line_no = 0;

        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .map_err(|e| ChainError::io(origin, e))?;
            if read == 0 {
                break;
            }
            line_no += 1;

            let line = match std::str::from_utf8(&buf) {
                Ok(text) => text.trim(),
                Err(e) => {
                    let err = ChainError::Parse {
                        line: line_no,
                        raw: String::from_utf8_lossy(&buf).trim().to_string(),
                        reason: format!("invalid UTF-8: {}", e),
                    };
                    warn!("Audit log verification failed: {}", err);
                    return Err(err);
                }
            };
            if line.is_empty() {
                continue;
            }

            if let Err(err) = self.check_line(&mut state, line_no, line) {
                warn!("Audit log verification failed: {}", err);
                return Err(err);
            }
        }

        let summary = state.into_summary();
        info!("Audit log verification successful: {} records", summary.records);
        Ok(summary)
    }

    fn check_line(&self, state: &mut ChainState, line_no: usize, line: &str) -> Result<(), ChainError> {
        let record = parse_record(line).map_err(|reason| ChainError::Parse {
            line: line_no,
            raw: line.to_string(),
            reason,
        })?;

        let declared_prev = record.get(PREV_HASH_FIELD);
        let expected_prev = match (&state.previous, &self.pinned_genesis) {
            (Some(previous), _) => previous.clone(),
            (None, Some(pinned)) => pinned.clone(),
            // First record declares its own genesis, which must be a string
            (None, None) => match declared_prev {
                Some(Value::String(genesis)) => genesis.clone(),
                other => return Err(ChainError::prev_hash_mismatch(line_no, GENESIS_REQUIRED, other)),
            },
        };

        if declared_prev.and_then(Value::as_str) != Some(expected_prev.as_str()) {
            return Err(ChainError::prev_hash_mismatch(line_no, &expected_prev, declared_prev));
        }

        let expected_hash = chain_hash(&expected_prev, &record).map_err(|source| ChainError::Encoding {
            line: line_no,
            source,
        })?;

        let stored_hash = record.get(HASH_FIELD);
        if stored_hash.and_then(Value::as_str) != Some(expected_hash.as_str()) {
            return Err(ChainError::hash_mismatch(line_no, &expected_hash, stored_hash));
        }

        debug!("Line {} verified: {}", line_no, expected_hash);
        if state.genesis.is_none() {
            state.genesis = Some(expected_prev);
        }
        state.previous = Some(expected_hash);
        state.records += 1;
        Ok(())
    }
}

/// Rolling verification state
#[derive(Debug, Default)]
struct ChainState {
    previous: Option<String>,
    genesis: Option<String>,
    records: usize,
}

impl ChainState {
    fn into_summary(self) -> VerifySummary {
        VerifySummary {
            records: self.records,
            genesis: self.genesis,
            head_hash: self.previous,
        }
    }
}

/// Verify an audit log file with a self-declared genesis
pub fn verify_audit_log_file(path: impl AsRef<Path>) -> Result<VerifySummary, ChainError> {
    ChainVerifier::new().verify_file(path)
}
