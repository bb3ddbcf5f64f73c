/// Scheduled resolution sweep.
///
/// Walks the head of the rolling sweep index and tries to advance each
/// proof toward `ANCHORED`. The sweep never submits new hashes. At most
/// `limit` ids are visited per run so a single invocation stays within its
/// execution budget.
///
/// Index updates are read-modify-write, so concurrent submissions can drop
/// an id. Budget left over after the index head goes to a backfill: unsettled
/// anchor documents and bare receipts in the canonical namespace that the
/// index does not list are resolved and recorded again. A proof stays
/// unvisited only while the index head alone fills the budget.
///
/// A failure on one id is logged and counted; it never aborts the batch.
use std::collections::HashSet;

use serde::Serialize;
use tracing::{error, info, warn};

use super::{Anchorer, ResolveOutcome};
use crate::error::Result;
use crate::state::{id_from_anchor_key, id_from_receipt_key, ANCHOR_PREFIX, RECEIPT_PREFIX};

/// Counters for one sweep run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub advanced: usize,
    pub unchanged: usize,
    pub settled: usize,
    pub missing_receipt: usize,
    pub failed: usize,
    /// Proofs found outside the index and recorded again.
    pub backfilled: usize,
}

impl Anchorer {
    /// Resolve up to `limit` recent proofs (defaults to the configured batch size).
    pub async fn resolve_cron(&self, limit: Option<usize>) -> Result<SweepReport> {
        let limit = limit.unwrap_or(self.config.sweep_batch);
        let ids = self.repo.load_index().await?;
        let mut report = SweepReport::default();

        info!(indexed = ids.len(), limit, "Starting resolution sweep");

        for id in ids.iter().take(limit) {
            self.sweep_one(id, &mut report).await;
        }

        let budget = limit.saturating_sub(report.examined);
        if budget > 0 {
            let indexed: HashSet<&str> = ids.iter().map(String::as_str).collect();
            for id in self.unindexed_proofs(&indexed, budget).await {
                report.backfilled += 1;
                self.sweep_one(&id, &mut report).await;
                if let Err(e) = self.repo.record_in_index(&id, self.config.index_limit).await {
                    warn!(proof_id = %id, error = %e, "Failed to restore proof in sweep index");
                }
            }
        }

        info!(
            examined = report.examined,
            advanced = report.advanced,
            unchanged = report.unchanged,
            settled = report.settled,
            missing_receipt = report.missing_receipt,
            failed = report.failed,
            backfilled = report.backfilled,
            "Resolution sweep complete"
        );
        Ok(report)
    }

    async fn sweep_one(&self, id: &str, report: &mut SweepReport) {
        report.examined += 1;

        match self
            .resolve_inner(id, Some(self.config.settled_confirmations))
            .await
        {
            Ok(ResolveOutcome::Advanced(_)) => report.advanced += 1,
            Ok(ResolveOutcome::Unchanged(_)) => report.unchanged += 1,
            Ok(ResolveOutcome::Settled(_)) => report.settled += 1,
            Ok(ResolveOutcome::NoReceipt) => report.missing_receipt += 1,
            Err(e) => {
                error!(proof_id = %id, error = %e, "Sweep failed for proof");
                report.failed += 1;
            }
        }
    }

    /// Up to `budget` canonical proofs the index does not list: unsettled
    /// anchor documents first, then receipts with no document at all.
    async fn unindexed_proofs(&self, indexed: &HashSet<&str>, budget: usize) -> Vec<String> {
        let store = self.repo.store();
        let mut found = Vec::new();
        let mut with_doc = HashSet::new();

        match store.list_canonical(ANCHOR_PREFIX).await {
            Ok(keys) => {
                for key in &keys {
                    let Some(id) = id_from_anchor_key(key) else {
                        continue;
                    };
                    if indexed.contains(id) || !with_doc.insert(id.to_string()) {
                        continue;
                    }
                    match self.repo.get_anchor(id).await {
                        Ok(Some(doc))
                            if doc.txid.is_none()
                                || doc.confirmations < self.config.settled_confirmations =>
                        {
                            found.push(id.to_string());
                            if found.len() >= budget {
                                return found;
                            }
                        }
                        Ok(_) => {}
                        Err(e) => warn!(proof_id = %id, error = %e, "Skipping unreadable anchor document"),
                    }
                }
            }
            Err(e) => warn!(error = %e, "Failed to list anchor documents for backfill"),
        }

        match store.list_canonical(RECEIPT_PREFIX).await {
            Ok(keys) => {
                for key in &keys {
                    let Some(id) = id_from_receipt_key(key) else {
                        continue;
                    };
                    if indexed.contains(id) || with_doc.contains(id) {
                        continue;
                    }
                    with_doc.insert(id.to_string());
                    found.push(id.to_string());
                    if found.len() >= budget {
                        break;
                    }
                }
            }
            Err(e) => warn!(error = %e, "Failed to list receipts for backfill"),
        }

        if !found.is_empty() {
            info!(count = found.len(), "Backfilling proofs missing from sweep index");
        }
        found
    }
}
