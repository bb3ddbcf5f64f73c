/// Repository layer: typed access to receipts, anchor documents and the
/// sweep index on top of the multi-namespace gateway.
///
/// Reads probe every namespace; writes land in the canonical namespace.
/// A store that cannot be reached at all surfaces as an error, a missing
/// object as `None`.
use chrono::Utc;
use tracing::{debug, warn};

use super::models::AnchorDocument;
use super::{anchor_key, receipt_alias_key, receipt_key, INDEX_KEY};
use crate::error::{AnchorError, Result};
use crate::storage::{MultiNamespaceStore, NamespaceHit};

/// Receipt bytes plus where they were found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredReceipt {
    pub bytes: Vec<u8>,
    pub key: String,
    pub namespace: String,
}

#[derive(Clone)]
pub struct ProofRepository {
    store: MultiNamespaceStore,
}

impl ProofRepository {
    pub fn new(store: MultiNamespaceStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &MultiNamespaceStore {
        &self.store
    }

    // ── Receipts ──

    /// Store receipt bytes under the canonical key and the legacy alias.
    pub async fn put_receipt(&self, id: &str, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Err(AnchorError::EmptyReceipt(id.to_string()));
        }

        self.store.write(&receipt_key(id), bytes).await?;
        self.store.write(&receipt_alias_key(id), bytes).await?;

        debug!(proof_id = %id, size = bytes.len(), "Receipt stored");
        Ok(())
    }

    /// Look up a receipt under the canonical key, then the alias key.
    pub async fn get_receipt(&self, id: &str) -> Result<Option<StoredReceipt>> {
        self.find_receipt(id, false).await
    }

    /// Like `get_receipt`, but any namespace error is returned instead of
    /// skipped. Used before deciding whether to store a new receipt.
    pub async fn get_receipt_for_update(&self, id: &str) -> Result<Option<StoredReceipt>> {
        self.find_receipt(id, true).await
    }

    async fn find_receipt(&self, id: &str, for_update: bool) -> Result<Option<StoredReceipt>> {
        for key in [receipt_key(id), receipt_alias_key(id)] {
            let hit = if for_update {
                self.store.read_for_update(&key).await?
            } else {
                self.store.read(&key).await?
            };
            if let Some(hit) = hit {
                return Ok(Some(StoredReceipt {
                    bytes: hit.bytes,
                    key,
                    namespace: hit.namespace,
                }));
            }
        }
        Ok(None)
    }

    // ── Anchor documents ──

    /// Load the anchor document. Malformed JSON is logged and treated as absent.
    pub async fn get_anchor(&self, id: &str) -> Result<Option<AnchorDocument>> {
        let hit = self.store.read(&anchor_key(id)).await?;
        Ok(hit.and_then(|hit| decode_anchor(id, hit)))
    }

    /// Load the anchor document a workflow is about to merge into.
    ///
    /// Fails with `StoreUnavailable` when any namespace errors before the
    /// document is found, so a merge never starts from a partial view.
    pub async fn get_anchor_for_update(&self, id: &str) -> Result<Option<AnchorDocument>> {
        let hit = self.store.read_for_update(&anchor_key(id)).await?;
        Ok(hit.and_then(|hit| decode_anchor(id, hit)))
    }

    /// Write the anchor document to the canonical namespace (last write wins).
    pub async fn put_anchor(&self, id: &str, doc: &AnchorDocument) -> Result<()> {
        let mut doc = doc.clone();
        doc.id = id.to_string();
        if doc.updated_at.is_none() {
            doc.updated_at = Some(Utc::now());
        }

        let json = serde_json::to_vec(&doc)
            .map_err(|e| AnchorError::Serialization(format!("anchor document: {e}")))?;
        self.store.write(&anchor_key(id), &json).await?;

        debug!(
            proof_id = %id,
            state = %doc.state,
            confirmations = doc.confirmations,
            "Anchor document stored"
        );
        Ok(())
    }

    // ── Sweep index ──

    /// Load recent proof ids, most recent first. A malformed index is empty.
    pub async fn load_index(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .read(INDEX_KEY)
            .await?
            .map(decode_index)
            .unwrap_or_default())
    }

    /// Move `id` to the head of the sweep index, keeping at most `limit` ids.
    ///
    /// Two concurrent updates can still lose one id; the sweep backfills
    /// unsettled proofs missing from the index.
    pub async fn record_in_index(&self, id: &str, limit: usize) -> Result<()> {
        let mut ids = self
            .store
            .read_for_update(INDEX_KEY)
            .await?
            .map(decode_index)
            .unwrap_or_default();
        if ids.first().map(String::as_str) == Some(id) && ids.len() <= limit {
            return Ok(());
        }

        ids.retain(|existing| existing != id);
        ids.insert(0, id.to_string());
        ids.truncate(limit.max(1));

        let json = serde_json::to_vec(&ids)
            .map_err(|e| AnchorError::Serialization(format!("sweep index: {e}")))?;
        self.store.write(INDEX_KEY, &json).await
    }
}

fn decode_index(hit: NamespaceHit) -> Vec<String> {
    match serde_json::from_slice::<Vec<String>>(&hit.bytes) {
        Ok(ids) => ids,
        Err(e) => {
            warn!(namespace = %hit.namespace, error = %e, "Malformed sweep index, ignoring");
            Vec::new()
        }
    }
}

fn decode_anchor(id: &str, hit: NamespaceHit) -> Option<AnchorDocument> {
    match serde_json::from_slice::<AnchorDocument>(&hit.bytes) {
        Ok(mut doc) => {
            if doc.id.is_empty() {
                doc.id = id.to_string();
            }
            Some(doc)
        }
        Err(e) => {
            warn!(
                proof_id = %id,
                namespace = %hit.namespace,
                error = %e,
                "Malformed anchor document, ignoring"
            );
            None
        }
    }
}
