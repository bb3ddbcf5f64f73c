/// Anchoring workflow.
///
/// Drives a proof through its lifecycle:
///
/// ```text
/// NEW ──receipt──▶ OTS_RECEIPT ──txid──▶ ANCHORED ──more confirmations──▶ ANCHORED
/// ```
///
/// Every transition is a monotonic merge (see `AnchorDocument::merged`), so
/// concurrent invocations for the same proof can interleave without locks:
/// the worst case is a redundant sidecar call.
///
/// Entry points:
/// - `submit_and_anchor`: webhook path, submits the hash then resolves
/// - `resolve`: on-demand resolution of an existing receipt
/// - `upgrade`: user-triggered sidecar upgrade
/// - `resolve_cron` (in `sweep`): scheduled batch resolution
pub mod outbox;
pub mod sweep;

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::error::{AnchorError, Result};
use crate::sidecar::TimestampSidecar;
use crate::state::models::validate_proof_id;
use crate::state::{receipt_key, AnchorDocument, DocumentHash, Observation, ProofRepository};

/// Tunables for the workflow.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Maximum number of ids kept in the sweep index.
    pub index_limit: usize,
    /// Maximum number of ids resolved per sweep.
    pub sweep_batch: usize,
    /// Anchored proofs at or above this many confirmations are skipped by the sweep.
    pub settled_confirmations: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            index_limit: 500,
            sweep_batch: 25,
            settled_confirmations: 6,
        }
    }
}

/// Optional contact details carried on the anchor document.
#[derive(Debug, Clone, Default)]
pub struct Contact {
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Result of resolving an existing receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// No receipt is stored for the proof.
    NoReceipt,
    /// Already anchored deeply enough that the sweep leaves it alone.
    Settled(AnchorDocument),
    /// Nothing new was learned; no write happened.
    Unchanged(AnchorDocument),
    /// The anchor document was created or advanced.
    Advanced(AnchorDocument),
}

#[derive(Clone)]
pub struct Anchorer {
    repo: ProofRepository,
    sidecar: Arc<dyn TimestampSidecar>,
    config: WorkflowConfig,
}

impl Anchorer {
    pub fn new(
        repo: ProofRepository,
        sidecar: Arc<dyn TimestampSidecar>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            repo,
            sidecar,
            config,
        }
    }

    pub fn repository(&self) -> &ProofRepository {
        &self.repo
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Submit a document hash and push the proof as far along as possible.
    ///
    /// A receipt that is already stored is kept as is, since it may be an
    /// upgraded one; the sidecar is only asked for a receipt when none exists.
    /// Fails with `NoReceipt` when the sidecar returned nothing and no
    /// receipt was stored earlier.
    pub async fn submit_and_anchor(
        &self,
        id: &str,
        hash: &DocumentHash,
        contact: &Contact,
    ) -> Result<AnchorDocument> {
        validate_proof_id(id)?;

        // 1. Current state
        let existing = self
            .repo
            .get_anchor_for_update(id)
            .await?
            .unwrap_or_else(|| AnchorDocument::new(id));

        // 2-3. Stored receipt, else a fresh one
        let receipt = match self.repo.get_receipt_for_update(id).await? {
            Some(stored) => {
                info!(
                    proof_id = %id,
                    namespace = %stored.namespace,
                    "Receipt already stored, skipping submission"
                );
                stored.bytes
            }
            None => {
                info!(proof_id = %id, hash = %hash, "Submitting hash for timestamping");
                match self.sidecar.submit(hash).await {
                    Some(bytes) => {
                        self.repo.put_receipt(id, &bytes).await?;
                        bytes
                    }
                    None => {
                        // 4. Nothing to anchor
                        error!(proof_id = %id, "No OTS receipt available after submission");
                        return Err(AnchorError::NoReceipt(id.to_string()));
                    }
                }
            }
        };

        // 5. Best-effort resolution
        let resolution = self.sidecar.resolve(&receipt).await;
        let mut next = existing.merged(
            &Observation {
                receipt_stored: true,
                txid: resolution.txid,
                confirmations: resolution.confirmations,
                reported_state: None,
            },
            Utc::now(),
        );
        next.receipt_ref = Some(receipt_key(id));
        if contact.email.is_some() {
            next.email = contact.email.clone();
        }
        if contact.display_name.is_some() {
            next.display_name = contact.display_name.clone();
        }

        // 6. Persist
        self.repo.put_anchor(id, &next).await?;
        if let Err(e) = self.repo.record_in_index(id, self.config.index_limit).await {
            warn!(proof_id = %id, error = %e, "Failed to record proof in sweep index");
        }

        info!(
            proof_id = %id,
            state = %next.state,
            txid = ?next.txid,
            confirmations = next.confirmations,
            "Proof anchoring step complete"
        );
        Ok(next)
    }

    /// Resolve an already stored receipt without submitting anything.
    pub async fn resolve(&self, id: &str) -> Result<ResolveOutcome> {
        self.resolve_inner(id, None).await
    }

    pub(crate) async fn resolve_inner(
        &self,
        id: &str,
        settled_at: Option<u64>,
    ) -> Result<ResolveOutcome> {
        validate_proof_id(id)?;

        let stored_doc = self.repo.get_anchor_for_update(id).await?;
        if let (Some(doc), Some(threshold)) = (&stored_doc, settled_at) {
            if doc.txid.is_some() && doc.confirmations >= threshold {
                return Ok(ResolveOutcome::Settled(doc.clone()));
            }
        }

        let Some(receipt) = self.repo.get_receipt(id).await? else {
            return Ok(ResolveOutcome::NoReceipt);
        };

        let existing = stored_doc
            .clone()
            .unwrap_or_else(|| AnchorDocument::new(id));
        let resolution = self.sidecar.resolve(&receipt.bytes).await;
        let mut next = existing.merged(
            &Observation {
                receipt_stored: true,
                txid: resolution.txid,
                confirmations: resolution.confirmations,
                reported_state: None,
            },
            Utc::now(),
        );
        if next.receipt_ref.is_none() {
            next.receipt_ref = Some(receipt_key(id));
        }

        if stored_doc.is_some() && !next.differs_from(&existing) {
            return Ok(ResolveOutcome::Unchanged(existing));
        }

        self.repo.put_anchor(id, &next).await?;
        info!(
            proof_id = %id,
            state = %next.state,
            confirmations = next.confirmations,
            "Anchor document advanced"
        );
        Ok(ResolveOutcome::Advanced(next))
    }

    /// Ask the sidecar to upgrade the stored receipt and record the result.
    ///
    /// Unlike background resolution, any sidecar failure is returned.
    pub async fn upgrade(&self, id: &str) -> Result<AnchorDocument> {
        validate_proof_id(id)?;

        let receipt = self
            .repo
            .get_receipt_for_update(id)
            .await?
            .ok_or_else(|| AnchorError::NoReceipt(id.to_string()))?;

        let outcome = match self.sidecar.upgrade(id, &receipt.bytes).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(proof_id = %id, error = %e, "Sidecar upgrade failed");
                return Err(e);
            }
        };

        if !outcome.receipt.is_empty() && outcome.receipt != receipt.bytes {
            self.repo.put_receipt(id, &outcome.receipt).await?;
            info!(proof_id = %id, size = outcome.receipt.len(), "Receipt replaced by upgraded receipt");
        }

        let existing = self
            .repo
            .get_anchor_for_update(id)
            .await?
            .unwrap_or_else(|| AnchorDocument::new(id));
        let mut next = existing.merged(
            &Observation {
                receipt_stored: true,
                txid: outcome.txid,
                confirmations: outcome.confirmations,
                reported_state: outcome.state,
            },
            Utc::now(),
        );
        if next.receipt_ref.is_none() {
            next.receipt_ref = Some(receipt_key(id));
        }

        self.repo.put_anchor(id, &next).await?;
        info!(
            proof_id = %id,
            state = %next.state,
            txid = ?next.txid,
            "Upgrade recorded"
        );
        Ok(next)
    }
}
