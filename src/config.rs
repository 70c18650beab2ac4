use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::audit::ChainVerifier;

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "AUDIT_CHAIN_CONFIG";
const ENV_PREFIX: &str = "AUDIT_CHAIN";
const DEFAULT_CONFIG_FILE: &str = "audit-chain.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Explicit audit log location; defaults to `<state_dir>/audit/audit-chain.jsonl`
    pub log_path: Option<PathBuf>,
    pub state_dir: PathBuf,
    /// `prevHash` of the first record written to a new log
    pub genesis: String,
    /// When set, verification requires the first record to link to this value
    pub pinned_genesis: Option<String>,
    /// `tracing` filter used when `RUST_LOG` is unset
    pub log_filter: String,
}

impl AuditConfig {
    /// Load defaults, then the config file, then `AUDIT_CHAIN_*` variables
    pub fn load() -> Result<Self, ConfigError> {
        let file = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(Some(file), None)
    }

    /// Load with an explicit config file and, for tests, an explicit
    /// environment map in place of the process environment
    pub fn load_from(
        file: Option<PathBuf>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("state_dir", ".audit-chain")?
            .set_default("genesis", "GENESIS")?
            .set_default("log_filter", "audit_chain=error")?;

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(false));
        }

        builder
            .add_source(Environment::with_prefix(ENV_PREFIX).source(env))
            .build()?
            .try_deserialize()
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_path
            .clone()
            .unwrap_or_else(|| self.state_dir.join("audit").join("audit-chain.jsonl"))
    }

    pub fn verifier(&self) -> ChainVerifier {
        match &self.pinned_genesis {
            Some(genesis) => ChainVerifier::with_genesis(genesis.clone()),
            None => ChainVerifier::new(),
        }
    }
}
