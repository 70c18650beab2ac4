use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

use audit_chain::{AuditConfig, ChainVerifier};

#[derive(Parser)]
#[command(name = "verify-audit-log")]
#[command(version, about = "Verify the hash chain of a JSONL audit log")]
struct Cli {
    /// Path to the audit log (defaults to the configured log path)
    path: Option<PathBuf>,

    /// Require the first record's prevHash to equal this value
    #[arg(short, long, value_name = "VALUE")]
    genesis: Option<String>,

    /// Suppress the success message
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AuditConfig::load().context("Failed to load configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let log_path = cli.path.unwrap_or_else(|| config.log_path());
    let verifier = match cli.genesis {
        Some(genesis) => ChainVerifier::with_genesis(genesis),
        None => config.verifier(),
    };

    match verifier.verify_file(&log_path) {
        Ok(summary) => {
            if !cli.quiet {
                println!("{}", summary.summary());
            }
            Ok(())
        }
        Err(e) => {
            error!(kind = %e.kind(), line = ?e.line(), "Audit log verification failed");
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
