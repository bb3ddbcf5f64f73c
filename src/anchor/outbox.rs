/// Submission outbox for webhook-initiated anchoring.
///
/// The webhook must answer quickly, so it hands the `(id, hash)` pair to
/// the outbox instead of waiting for the sidecar:
///
/// ```text
/// enqueue ──▶ outbox/<id>.json (canonical namespace) ──▶ mpsc ──▶ worker
///                                                                 │
///                         delete entry ◀──── submit_and_anchor ok ┘
/// ```
///
/// The entry is written before the job is handed over and removed only after
/// `submit_and_anchor` succeeds, so a job survives a crash or a full channel.
/// The worker replays every persisted entry on startup and again on each
/// replay tick, which picks up parked jobs and jobs that never made it into
/// the channel (at-least-once).
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::{Anchorer, Contact};
use crate::error::{AnchorError, Result};
use crate::state::models::validate_proof_id;
use crate::state::{outbox_key, DocumentHash, OUTBOX_PREFIX};

/// A pending submission, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionJob {
    pub id: String,
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(
        rename = "displayName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub display_name: Option<String>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(rename = "enqueuedAt")]
    pub enqueued_at: DateTime<Utc>,
}

impl SubmissionJob {
    pub fn new(id: impl Into<String>, hash: &DocumentHash, contact: Contact) -> Self {
        Self {
            id: id.into(),
            hash: hash.as_str().to_string(),
            email: contact.email,
            display_name: contact.display_name,
            attempts: 0,
            enqueued_at: Utc::now(),
        }
    }

    fn contact(&self) -> Contact {
        Contact {
            email: self.email.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// Attempts per delivery before the job is parked until the next replay.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub base_backoff: Duration,
    /// Channel capacity between producers and the worker.
    pub capacity: usize,
    /// How often persisted entries are replayed while the worker runs.
    pub replay_interval: Duration,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_backoff: Duration::from_secs(2),
            capacity: 256,
            replay_interval: Duration::from_secs(60),
        }
    }
}

/// How a single delivery ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Anchored; the entry was removed.
    Completed,
    /// Retries exhausted; the entry stays for the next replay.
    Parked,
    /// The job can never succeed; the entry was removed.
    Dropped,
}

/// Producer handle, cheap to clone.
#[derive(Clone)]
pub struct Outbox {
    anchorer: Anchorer,
    tx: mpsc::Sender<SubmissionJob>,
}

pub struct OutboxWorker {
    anchorer: Anchorer,
    rx: mpsc::Receiver<SubmissionJob>,
    config: OutboxConfig,
}

/// Create a connected producer and worker.
pub fn outbox(anchorer: Anchorer, config: OutboxConfig) -> (Outbox, OutboxWorker) {
    let (tx, rx) = mpsc::channel(config.capacity.max(1));
    (
        Outbox {
            anchorer: anchorer.clone(),
            tx,
        },
        OutboxWorker {
            anchorer,
            rx,
            config,
        },
    )
}

async fn persist(anchorer: &Anchorer, job: &SubmissionJob) -> Result<()> {
    let json = serde_json::to_vec(job)
        .map_err(|e| AnchorError::Serialization(format!("outbox entry: {e}")))?;
    anchorer
        .repository()
        .store()
        .write(&outbox_key(&job.id), &json)
        .await
}

impl Outbox {
    /// Durably record the job, then hand it to the worker.
    pub async fn enqueue(&self, job: SubmissionJob) -> Result<()> {
        validate_proof_id(&job.id)?;
        DocumentHash::parse(&job.hash)?;

        persist(&self.anchorer, &job).await?;

        match self.tx.try_send(job) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(proof_id = %job.id, "Outbox channel full, job left for replay");
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                warn!(proof_id = %job.id, "Outbox worker stopped, job left for replay");
            }
        }
        Ok(())
    }
}

impl OutboxWorker {
    /// Load every persisted entry from the canonical namespace.
    pub async fn pending(&self) -> Result<Vec<SubmissionJob>> {
        let store = self.anchorer.repository().store();
        let mut jobs = Vec::new();

        for key in store.list_canonical(OUTBOX_PREFIX).await? {
            let Some(bytes) = store.read_canonical(&key).await? else {
                continue;
            };
            match serde_json::from_slice::<SubmissionJob>(&bytes) {
                Ok(job) => jobs.push(job),
                Err(e) => warn!(key = %key, error = %e, "Unreadable outbox entry, skipping"),
            }
        }

        jobs.sort_by_key(|job| job.enqueued_at);
        Ok(jobs)
    }

    /// Deliver one job, retrying with exponential backoff.
    pub async fn deliver(&self, mut job: SubmissionJob) -> Delivery {
        let hash = match DocumentHash::parse(&job.hash) {
            Ok(hash) => hash,
            Err(e) => {
                error!(proof_id = %job.id, error = %e, "Dropping outbox entry with invalid hash");
                self.remove(&job.id).await;
                return Delivery::Dropped;
            }
        };
        let contact = job.contact();

        for attempt in 1..=self.config.max_attempts.max(1) {
            job.attempts += 1;
            match self
                .anchorer
                .submit_and_anchor(&job.id, &hash, &contact)
                .await
            {
                Ok(doc) => {
                    info!(proof_id = %job.id, state = %doc.state, attempts = job.attempts, "Outbox job delivered");
                    self.remove(&job.id).await;
                    return Delivery::Completed;
                }
                Err(AnchorError::InvalidId(detail)) => {
                    error!(proof_id = %job.id, detail = %detail, "Dropping outbox entry with invalid id");
                    self.remove(&job.id).await;
                    return Delivery::Dropped;
                }
                Err(e) => {
                    warn!(proof_id = %job.id, attempt, error = %e, "Outbox delivery failed");
                    if attempt < self.config.max_attempts {
                        let backoff = self.config.base_backoff * 2u32.saturating_pow(attempt - 1);
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        error!(proof_id = %job.id, attempts = job.attempts, "Outbox job parked until next replay");
        if let Err(e) = persist(&self.anchorer, &job).await {
            warn!(proof_id = %job.id, error = %e, "Failed to update parked outbox entry");
        }
        Delivery::Parked
    }

    async fn remove(&self, id: &str) {
        if let Err(e) = self
            .anchorer
            .repository()
            .store()
            .delete_canonical(&outbox_key(id))
            .await
        {
            warn!(proof_id = %id, error = %e, "Failed to remove outbox entry");
        }
    }

    /// Deliver every persisted entry, oldest first.
    pub async fn replay(&self) {
        match self.pending().await {
            Ok(jobs) => {
                if !jobs.is_empty() {
                    info!(count = jobs.len(), "Replaying persisted outbox entries");
                }
                for job in jobs {
                    self.deliver(job).await;
                }
            }
            Err(e) => error!(error = %e, "Failed to load outbox entries"),
        }
    }

    /// Replay persisted entries, then serve the channel until every producer
    /// is gone, replaying again on every tick.
    pub async fn run(mut self) {
        self.replay().await;

        let every = self.config.replay_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                job = self.rx.recv() => match job {
                    Some(job) => {
                        self.deliver(job).await;
                    }
                    None => break,
                },
                _ = ticker.tick() => self.replay().await,
            }
        }
        info!("Outbox worker stopped");
    }
}
