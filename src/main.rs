use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ots_anchor::anchor::outbox::outbox;
use ots_anchor::anchor::{Anchorer, Contact, ResolveOutcome};
use ots_anchor::config::Settings;
use ots_anchor::error::{AnchorError, Result};
use ots_anchor::migrate;
use ots_anchor::server::{self, AppState};
use ots_anchor::state::DocumentHash;
use ots_anchor::status;

#[derive(Parser)]
#[command(name = "ots-anchor")]
#[command(about = "OpenTimestamps proof anchoring and verification service")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        #[arg(long, env = "OTS_BIND", default_value = "0.0.0.0:8787")]
        bind: String,
        /// Bearer token for admin routes (disabled when unset)
        #[arg(long, env = "OTS_ADMIN_TOKEN", hide_env_values = true)]
        admin_token: Option<String>,
        /// Run the resolution sweep every N seconds (0 disables)
        #[arg(long, env = "OTS_SWEEP_INTERVAL_SECS", default_value_t = 0)]
        sweep_interval_secs: u64,
    },
    /// Submit a document hash and anchor it
    Anchor {
        id: String,
        /// SHA-256 hex digest of the document
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        hash: Option<String>,
        /// Hash this file instead of passing --hash
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Re-resolve a stored receipt
    Resolve { id: String },
    /// Ask the sidecar to upgrade a stored receipt
    Upgrade { id: String },
    /// Run one resolution sweep over recent proofs
    Sweep {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show proof status
    Status { id: String },
    /// Copy legacy objects into the canonical namespace
    Migrate {
        /// Proof id; all discovered proofs when omitted
        id: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value)
        .map_err(|e| AnchorError::Serialization(e.to_string()))?;
    println!("{out}");
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let anchorer: Anchorer = cli.settings.build_anchorer()?;

    match cli.command {
        Commands::Serve {
            bind,
            admin_token,
            sweep_interval_secs,
        } => {
            let (producer, worker) = outbox(anchorer.clone(), cli.settings.workflow.outbox());
            tokio::spawn(worker.run());

            if sweep_interval_secs > 0 {
                info!(every_secs = sweep_interval_secs, "Scheduled sweep enabled");
                server::spawn_sweeper(anchorer.clone(), Duration::from_secs(sweep_interval_secs));
            }

            let state = AppState {
                anchorer,
                outbox: Some(producer),
                admin_token,
            };
            server::serve(state, &bind).await
        }
        Commands::Anchor { id, hash, file } => {
            let hash = match (hash, file) {
                (Some(hash), _) => DocumentHash::parse(&hash)?,
                (None, Some(path)) => DocumentHash::of_bytes(&tokio::fs::read(&path).await?),
                (None, None) => {
                    return Err(AnchorError::InvalidHash("--hash or --file is required".into()))
                }
            };
            let doc = anchorer
                .submit_and_anchor(&id, &hash, &Contact::default())
                .await?;
            print_json(&doc)
        }
        Commands::Resolve { id } => match anchorer.resolve(&id).await? {
            ResolveOutcome::NoReceipt => Err(AnchorError::NoReceipt(id)),
            ResolveOutcome::Settled(doc)
            | ResolveOutcome::Unchanged(doc)
            | ResolveOutcome::Advanced(doc) => print_json(&doc),
        },
        Commands::Upgrade { id } => print_json(&anchorer.upgrade(&id).await?),
        Commands::Sweep { limit } => print_json(&anchorer.resolve_cron(limit).await?),
        Commands::Status { id } => {
            print_json(&status::get_status(anchorer.repository(), &id).await)
        }
        Commands::Migrate { id, dry_run } => {
            let store = anchorer.repository().store();
            match id {
                Some(id) => print_json(&migrate::migrate(store, &id, dry_run).await?),
                None => print_json(&migrate::migrate_discovered(store, dry_run).await?),
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "ots-anchor failed");
            ExitCode::FAILURE
        }
    }
}
