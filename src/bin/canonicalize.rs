//! Canonicalize one JSON value read from stdin.
//!
//! Writes the canonical bytes to stdout with no trailing newline, so the
//! output can be piped straight into a hash or signing tool.

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use std::io::{Read, Write};

use audit_chain::audit::{binding_hash, canonical_json, canonicalize};

#[derive(Parser)]
#[command(name = "canonicalize")]
#[command(version, about = "Write the canonical JSON form of stdin to stdout")]
struct Cli {
    /// Use the audit record form: top-level keys sorted, `hash` removed
    #[arg(long)]
    record: bool,

    /// Print the SHA-256 binding hash instead of the canonical bytes
    #[arg(long, conflicts_with = "record")]
    hash: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read stdin")?;
    let value: Value = serde_json::from_str(&input).context("Input is not valid JSON")?;

    let output = if cli.hash {
        binding_hash(&value)?.into_bytes()
    } else if cli.record {
        match &value {
            Value::Object(record) => canonicalize(record)?,
            _ => anyhow::bail!("--record expects a JSON object"),
        }
    } else {
        canonical_json(&value)?
    };

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&output).context("Failed to write stdout")?;
    stdout.flush()?;
    Ok(())
}
