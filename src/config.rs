/// Runtime configuration.
///
/// Every setting can be given as a CLI flag or an environment variable.
/// The argument groups turn into explicit config structs and constructed
/// clients; nothing is kept in process-wide state.
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tracing::info;

use crate::anchor::outbox::OutboxConfig;
use crate::anchor::{Anchorer, WorkflowConfig};
use crate::error::{AnchorError, Result};
use crate::sidecar::{HttpSidecar, SidecarConfig};
use crate::state::ProofRepository;
use crate::storage::memory::MemoryStore;
use crate::storage::s3::{S3Config, S3Store};
use crate::storage::{ordered_namespaces, MultiNamespaceStore, ObjectStore};

/// Object store settings.
#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    /// S3-compatible endpoint URL.
    #[arg(long = "store-endpoint", env = "OTS_STORE_ENDPOINT", default_value = "")]
    pub endpoint: String,

    #[arg(
        long = "store-access-key-id",
        env = "OTS_STORE_ACCESS_KEY_ID",
        default_value = "",
        hide_env_values = true
    )]
    pub access_key_id: String,

    #[arg(
        long = "store-secret-access-key",
        env = "OTS_STORE_SECRET_ACCESS_KEY",
        default_value = "",
        hide_env_values = true
    )]
    pub secret_access_key: String,

    #[arg(long = "store-region", env = "OTS_STORE_REGION", default_value = "auto")]
    pub region: String,

    /// Namespace all writes go to.
    #[arg(
        long = "canonical-namespace",
        env = "OTS_CANONICAL_NAMESPACE",
        default_value = "ots-proofs"
    )]
    pub canonical_namespace: String,

    /// Older namespaces probed on reads, in order (comma separated).
    #[arg(
        long = "legacy-namespaces",
        env = "OTS_LEGACY_NAMESPACES",
        value_delimiter = ','
    )]
    pub legacy_namespaces: Vec<String>,

    /// Keep everything in memory (development only).
    #[arg(long = "memory-store", env = "OTS_MEMORY_STORE")]
    pub memory: bool,
}

impl StoreArgs {
    pub fn namespaces(&self) -> Vec<String> {
        ordered_namespaces(&self.canonical_namespace, &self.legacy_namespaces)
    }

    pub fn build(&self) -> Result<MultiNamespaceStore> {
        let namespaces = self.namespaces();
        if namespaces.is_empty() {
            return Err(AnchorError::Config("canonical namespace is empty".into()));
        }

        let stores: Vec<Arc<dyn ObjectStore>> = if self.memory {
            namespaces
                .iter()
                .map(|ns| Arc::new(MemoryStore::new(ns.as_str())) as Arc<dyn ObjectStore>)
                .collect()
        } else {
            let client = S3Config {
                endpoint: self.endpoint.clone(),
                access_key_id: self.access_key_id.clone(),
                secret_access_key: self.secret_access_key.clone(),
                region: self.region.clone(),
            }
            .build_client()?;
            namespaces
                .iter()
                .map(|ns| Arc::new(S3Store::new(client.clone(), ns.as_str())) as Arc<dyn ObjectStore>)
                .collect()
        };

        info!(
            namespaces = ?namespaces,
            memory = self.memory,
            "Object store configured"
        );
        MultiNamespaceStore::from_ordered(stores)
    }
}

/// Timestamp sidecar settings.
#[derive(Debug, Clone, Args)]
pub struct SidecarArgs {
    #[arg(long = "sidecar-url", env = "OTS_SIDECAR_URL", default_value = "http://127.0.0.1:8080")]
    pub url: String,

    /// Per-request timeout in seconds.
    #[arg(long = "sidecar-timeout-secs", env = "OTS_SIDECAR_TIMEOUT_SECS", default_value_t = 10)]
    pub timeout_secs: u64,
}

impl SidecarArgs {
    pub fn build(&self) -> Result<HttpSidecar> {
        if self.timeout_secs == 0 {
            return Err(AnchorError::Config("sidecar timeout must be positive".into()));
        }
        HttpSidecar::new(SidecarConfig {
            base_url: self.url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }
}

/// Workflow tunables.
#[derive(Debug, Clone, Args)]
pub struct WorkflowArgs {
    /// Number of recent proof ids kept in the sweep index.
    #[arg(long = "index-limit", env = "OTS_INDEX_LIMIT", default_value_t = 500)]
    pub index_limit: usize,

    /// Proofs resolved per sweep.
    #[arg(long = "sweep-batch", env = "OTS_SWEEP_BATCH", default_value_t = 25)]
    pub sweep_batch: usize,

    /// Confirmations after which the sweep stops polling a proof.
    #[arg(
        long = "settled-confirmations",
        env = "OTS_SETTLED_CONFIRMATIONS",
        default_value_t = 6
    )]
    pub settled_confirmations: u64,

    /// Outbox delivery attempts before a job waits for the next replay.
    #[arg(long = "outbox-attempts", env = "OTS_OUTBOX_ATTEMPTS", default_value_t = 4)]
    pub outbox_attempts: u32,

    /// Seconds between replays of persisted outbox entries.
    #[arg(
        long = "outbox-replay-secs",
        env = "OTS_OUTBOX_REPLAY_SECS",
        default_value_t = 60
    )]
    pub outbox_replay_secs: u64,
}

impl WorkflowArgs {
    pub fn workflow(&self) -> Result<WorkflowConfig> {
        if self.index_limit == 0 || self.sweep_batch == 0 {
            return Err(AnchorError::Config(
                "index limit and sweep batch must be positive".into(),
            ));
        }
        Ok(WorkflowConfig {
            index_limit: self.index_limit,
            sweep_batch: self.sweep_batch,
            settled_confirmations: self.settled_confirmations,
        })
    }

    pub fn outbox(&self) -> OutboxConfig {
        OutboxConfig {
            max_attempts: self.outbox_attempts.max(1),
            replay_interval: Duration::from_secs(self.outbox_replay_secs.max(1)),
            ..OutboxConfig::default()
        }
    }
}

/// All settings shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct Settings {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub sidecar: SidecarArgs,

    #[command(flatten)]
    pub workflow: WorkflowArgs,
}

impl Settings {
    /// Construct the store, sidecar client and workflow.
    pub fn build_anchorer(&self) -> Result<Anchorer> {
        let store = self.store.build()?;
        let sidecar = self.sidecar.build()?;
        Ok(Anchorer::new(
            ProofRepository::new(store),
            Arc::new(sidecar),
            self.workflow.workflow()?,
        ))
    }
}
