//! state-tree CLI - reconcile, diff and fingerprint JSON documents
//!
//! Every command prints a single JSON object on stdout; logs go to stderr.

use anyhow::Context;
use clap::{Parser, Subcommand};
use state_tree::{diff_values, Config, DiffEntry, Reconciler, Value};
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "state-tree")]
#[command(about = "Identity-preserving reconciliation of JSON state trees")]
#[command(version)]
struct Cli {
    /// Path to a config file (default: ~/.config/state-tree/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format (json or text)
    #[arg(short, long, default_value = "json")]
    format: OutputFormat,

    /// Deepest level the reconciler merges
    #[arg(long, conflicts_with = "unlimited_depth")]
    max_depth: Option<usize>,

    /// Remove the reconciler depth limit
    #[arg(long)]
    unlimited_depth: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile two snapshots and report what was reused
    Reconcile {
        /// Previous snapshot (JSON file, or - for stdin)
        previous: String,
        /// Next snapshot (JSON file, or - for stdin)
        next: String,
        /// Omit the merged value from the output
        #[arg(long)]
        stats_only: bool,
    },

    /// Show the paths that differ between two snapshots
    Diff {
        /// Old snapshot (JSON file, or - for stdin)
        from: String,
        /// New snapshot (JSON file, or - for stdin)
        to: String,
    },

    /// Print the content fingerprint of a snapshot
    Fingerprint {
        /// Snapshot (JSON file, or - for stdin)
        file: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    if let Some(max_depth) = cli.max_depth {
        config.reconcile.max_depth = Some(max_depth);
    }
    if cli.unlimited_depth {
        config.reconcile.max_depth = None;
    }
    init_tracing(&config);

    let pretty = config.pretty || cli.format == OutputFormat::Text;

    match cli.command {
        Commands::Reconcile {
            previous,
            next,
            stats_only,
        } => {
            if previous == "-" && next == "-" {
                anyhow::bail!("Only one snapshot can be read from stdin");
            }
            let previous = read_value(&previous)?;
            let next = read_value(&next)?;

            let reconciler = Reconciler::new(config.reconcile);
            let result = reconciler.reconcile_with_stats(&previous, &next);

            let mut report = serde_json::json!({
                "reused_root": result.value.is_same(&previous),
                "stats": result.stats,
                "previous_hash": previous.fingerprint().to_hex(),
                "next_hash": next.fingerprint().to_hex(),
                "result_hash": result.value.fingerprint().to_hex()
            });
            if !stats_only {
                report["value"] = result.value.to_json()?;
            }
            output(pretty, &report)?;
        }

        Commands::Diff { from, to } => {
            if from == "-" && to == "-" {
                anyhow::bail!("Only one snapshot can be read from stdin");
            }
            let old = read_value(&from)?;
            let new = read_value(&to)?;

            let diff = diff_values(&old, &new);
            let entries: Vec<_> = diff
                .entries
                .iter()
                .map(|e| match e {
                    DiffEntry::Added { path, new_hash } => serde_json::json!({
                        "type": "added",
                        "path": path.to_string(),
                        "hash": new_hash.to_hex()
                    }),
                    DiffEntry::Removed { path, old_hash } => serde_json::json!({
                        "type": "removed",
                        "path": path.to_string(),
                        "hash": old_hash.to_hex()
                    }),
                    DiffEntry::Modified {
                        path,
                        old_hash,
                        new_hash,
                    } => serde_json::json!({
                        "type": "modified",
                        "path": path.to_string(),
                        "old_hash": old_hash.to_hex(),
                        "new_hash": new_hash.to_hex()
                    }),
                })
                .collect();
            output(
                pretty,
                &serde_json::json!({
                    "from": old.fingerprint().to_hex(),
                    "to": new.fingerprint().to_hex(),
                    "added": diff.added_count(),
                    "removed": diff.removed_count(),
                    "modified": diff.modified_count(),
                    "entries": entries
                }),
            )?;
        }

        Commands::Fingerprint { file } => {
            let value = read_value(&file)?;
            let hash = value.fingerprint();
            output(
                pretty,
                &serde_json::json!({
                    "hash": hash.to_hex(),
                    "short": hash.short(),
                    "kind": value.kind().as_str()
                }),
            )?;
        }
    }

    Ok(())
}

fn init_tracing(config: &Config) {
    let fallback = config.log_filter.as_deref().unwrap_or("warn");
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_value(source: &str) -> anyhow::Result<Value> {
    let content = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(source).with_context(|| format!("Failed to read {}", source))?
    };
    let value: Value =
        serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", source))?;
    Ok(value)
}

fn output(pretty: bool, value: &serde_json::Value) -> anyhow::Result<()> {
    if pretty {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", serde_json::to_string(value)?);
    }
    Ok(())
}
