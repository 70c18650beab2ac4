//! Audit Chain Writer
//!
//! Appends hash-chained records to a JSONL audit log. Opening an existing
//! log verifies it first; a log whose chain is already broken is refused.

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::audit::entry::{seal, AuditEvent, AuditEventKind, Record, HASH_FIELD};
use crate::audit::verify::ChainVerifier;

struct WriterState {
    file: File,
    head_hash: String,
    record_count: u64,
    /// Set after a failed write; the file tail can no longer be trusted
    poisoned: bool,
}

/// Append-only writer for a hash-chained JSONL log
#[derive(Clone)]
pub struct ChainWriter {
    log_path: PathBuf,
    state: Arc<Mutex<WriterState>>,
}

impl ChainWriter {
    /// Open `log_path` for appending, creating it if needed.
    ///
    /// An empty or new log starts its chain at `genesis`. An existing log
    /// continues from its last record's hash.
    pub fn open(log_path: impl Into<PathBuf>, genesis: &str) -> Result<Self> {
        let log_path = log_path.into();

        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
        }

        let (head_hash, record_count) = if log_path.exists() {
            let summary = ChainVerifier::new()
                .verify_file(&log_path)
                .map_err(|e| anyhow!("Refusing to append to broken audit log: {}", e))?;
            let head = summary.head_hash.unwrap_or_else(|| genesis.to_string());
            (head, summary.records as u64)
        } else {
            (genesis.to_string(), 0)
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open audit log {}", log_path.display()))?;

        info!(
            "Opened audit log {} ({} existing records)",
            log_path.display(),
            record_count
        );

        Ok(Self {
            log_path,
            state: Arc::new(Mutex::new(WriterState {
                file,
                head_hash,
                record_count,
                poisoned: false,
            })),
        })
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Seal `payload` onto the current head and append it as one line
    pub async fn append(&self, payload: Record) -> Result<Record> {
        let mut state = self.state.lock().await;
        if state.poisoned {
            return Err(anyhow!(
                "Audit log writer for {} is poisoned by an earlier failed write; reopen the log",
                self.log_path.display()
            ));
        }

        let record = seal(payload, &state.head_hash)
            .map_err(|e| anyhow!("Failed to seal audit record: {}", e))?;
        let mut line = serde_json::to_vec(&record)
            .map_err(|e| anyhow!("Failed to serialize audit record: {}", e))?;
        line.push(b'\n');

        if let Err(e) = append_line(&mut state.file, &line) {
            state.poisoned = true;
            return Err(e);
        }

        if let Some(Value::String(hash)) = record.get(HASH_FIELD) {
            state.head_hash = hash.clone();
        }
        state.record_count += 1;

        debug!("Appended audit record {}: {}", state.record_count, state.head_hash);
        Ok(record)
    }

    /// Append a timestamped control-layer event
    pub async fn append_event(&self, kind: AuditEventKind, data: Value) -> Result<Record> {
        let record = AuditEvent::new(kind, data)
            .into_record()
            .map_err(|e| anyhow!("Failed to encode audit event: {}", e))?;
        self.append(record).await
    }

    /// Hash the next record will link to
    pub async fn head_hash(&self) -> String {
        self.state.lock().await.head_hash.clone()
    }

    pub async fn record_count(&self) -> u64 {
        self.state.lock().await.record_count
    }
}

/// Append `line`, truncating back to the previous length if the write fails
fn append_line(file: &mut File, line: &[u8]) -> Result<()> {
    let len = file.metadata().context("Failed to stat audit log")?.len();

    if let Err(e) = file.write_all(line).and_then(|_| file.flush()) {
        file.set_len(len).with_context(|| {
            format!("Failed to roll back partial audit record after write error: {}", e)
        })?;
        return Err(anyhow::Error::new(e).context("Failed to write to audit log"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_new_log_starts_at_genesis() {
        let temp_dir = tempdir().unwrap();
        let log_path = temp_dir.path().join("nested/audit.jsonl");

        let writer = ChainWriter::open(&log_path, "GENESIS").unwrap();
        assert_eq!(writer.record_count().await, 0);
        assert_eq!(writer.head_hash().await, "GENESIS");
        assert!(log_path.exists());
    }

    #[tokio::test]
    async fn test_append_and_verify() {
        let temp_dir = tempdir().unwrap();
        let log_path = temp_dir.path().join("audit.jsonl");
        let writer = ChainWriter::open(&log_path, "GENESIS").unwrap();

        writer
            .append_event(AuditEventKind::ToolProposed, json!({"toolName": "exec"}))
            .await
            .unwrap();
        let last = writer
            .append_event(
                AuditEventKind::PolicyDecision,
                json!({"toolName": "exec", "decision": "REQUIRE_CONFIRMATION"}),
            )
            .await
            .unwrap();

        assert_eq!(writer.record_count().await, 2);
        assert_eq!(Some(writer.head_hash().await.as_str()), last[HASH_FIELD].as_str());

        let summary = ChainVerifier::new().verify_file(&log_path).unwrap();
        assert_eq!(summary.records, 2);
        assert_eq!(summary.genesis.as_deref(), Some("GENESIS"));
    }

    #[tokio::test]
    async fn test_reopen_continues_chain() {
        let temp_dir = tempdir().unwrap();
        let log_path = temp_dir.path().join("audit.jsonl");

        let writer = ChainWriter::open(&log_path, "GENESIS").unwrap();
        writer.append(Record::new()).await.unwrap();
        let head = writer.head_hash().await;
        drop(writer);

        let writer = ChainWriter::open(&log_path, "ignored").unwrap();
        assert_eq!(writer.record_count().await, 1);
        assert_eq!(writer.head_hash().await, head);

        writer
            .append_event(AuditEventKind::ToolExecuted, json!({"ok": true}))
            .await
            .unwrap();
        let summary = ChainVerifier::with_genesis("GENESIS")
            .verify_file(&log_path)
            .unwrap();
        assert_eq!(summary.records, 2);
    }

    #[tokio::test]
    async fn test_detects_tampering() {
        let temp_dir = tempdir().unwrap();
        let log_path = temp_dir.path().join("audit.jsonl");
        let writer = ChainWriter::open(&log_path, "GENESIS").unwrap();

        writer
            .append_event(AuditEventKind::ToolProposed, json!({"toolName": "exec"}))
            .await
            .unwrap();
        writer
            .append_event(AuditEventKind::ToolExecuted, json!({"toolName": "exec", "ok": true}))
            .await
            .unwrap();
        drop(writer);

        let raw = std::fs::read_to_string(&log_path).unwrap();
        let mut lines: Vec<String> = raw.lines().map(str::to_string).collect();
        let mut second: Value = serde_json::from_str(&lines[1]).unwrap();
        second["data"]["ok"] = json!(false);
        lines[1] = serde_json::to_string(&second).unwrap();
        std::fs::write(&log_path, format!("{}\n", lines.join("\n"))).unwrap();

        let err = ChainVerifier::new().verify_file(&log_path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HashMismatch);
        assert_eq!(err.line(), Some(2));

        assert!(ChainWriter::open(&log_path, "GENESIS").is_err());
    }

    #[tokio::test]
    async fn test_failed_write_poisons_writer() {
        let temp_dir = tempdir().unwrap();
        let log_path = temp_dir.path().join("audit.jsonl");
        let writer = ChainWriter::open(&log_path, "GENESIS").unwrap();
        writer.append(Record::new()).await.unwrap();
        let head = writer.head_hash().await;

        // A read-only handle makes the next write fail
        writer.state.lock().await.file = File::open(&log_path).unwrap();
        assert!(writer.append(Record::new()).await.is_err());

        assert_eq!(writer.record_count().await, 1);
        assert_eq!(writer.head_hash().await, head);

        // Even with a usable handle again, the writer refuses to continue
        writer.state.lock().await.file =
            OpenOptions::new().append(true).open(&log_path).unwrap();
        let err = writer.append(Record::new()).await.unwrap_err();
        assert!(err.to_string().contains("poisoned"));

        let summary = ChainVerifier::new().verify_file(&log_path).unwrap();
        assert_eq!(summary.records, 1);
        assert_eq!(summary.head_hash, Some(head));
    }

    #[tokio::test]
    async fn test_append_line_rolls_back_on_failure() {
        let temp_dir = tempdir().unwrap();
        let log_path = temp_dir.path().join("audit.jsonl");
        std::fs::write(&log_path, b"{}\n").unwrap();

        let mut file = OpenOptions::new().append(true).open(&log_path).unwrap();
        append_line(&mut file, b"{\"a\":1}\n").unwrap();
        assert_eq!(std::fs::read(&log_path).unwrap(), b"{}\n{\"a\":1}\n".to_vec());

        let mut read_only = File::open(&log_path).unwrap();
        assert!(append_line(&mut read_only, b"{\"b\":2}\n").is_err());
        assert_eq!(std::fs::read(&log_path).unwrap(), b"{}\n{\"a\":1}\n".to_vec());
    }

    #[tokio::test]
    async fn test_payload_chain_fields_are_overwritten() {
        let temp_dir = tempdir().unwrap();
        let log_path = temp_dir.path().join("audit.jsonl");
        let writer = ChainWriter::open(&log_path, "GENESIS").unwrap();

        let mut payload = Record::new();
        payload.insert("prevHash".to_string(), json!("forged"));
        payload.insert("hash".to_string(), json!("forged"));
        let record = writer.append(payload).await.unwrap();

        assert_eq!(record["prevHash"], json!("GENESIS"));
        assert!(ChainVerifier::new().verify_file(&log_path).is_ok());
    }
}
