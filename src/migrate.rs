/// Copy proof objects from legacy namespaces into the canonical namespace.
///
/// Sources are never modified: namespace discovery may be imperfect, so the
/// legacy copies stay in place as a fallback for readers.
use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::state::models::validate_proof_id;
use crate::state::{
    anchor_key, id_from_anchor_key, id_from_receipt_key, receipt_alias_key, receipt_key,
    ANCHOR_PREFIX, RECEIPT_PREFIX,
};
use crate::storage::MultiNamespaceStore;

const ALIAS_PREFIX: &str = "ots:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectCopy {
    pub key: String,
    pub from_namespace: String,
    pub size: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub id: String,
    pub dry_run: bool,
    /// Copies performed (or planned, in a dry run).
    pub copied: Vec<ObjectCopy>,
    /// Keys already present in the canonical namespace.
    pub already_canonical: Vec<String>,
    /// Keys found in no namespace.
    pub missing: Vec<String>,
}

/// Migrate the receipt, receipt alias and anchor document of one proof.
pub async fn migrate(
    store: &MultiNamespaceStore,
    id: &str,
    dry_run: bool,
) -> Result<MigrationReport> {
    validate_proof_id(id)?;

    let mut report = MigrationReport {
        id: id.to_string(),
        dry_run,
        ..Default::default()
    };

    for key in [receipt_key(id), receipt_alias_key(id), anchor_key(id)] {
        if store.read_canonical(&key).await?.is_some() {
            report.already_canonical.push(key);
            continue;
        }

        let mut found = None;
        for legacy in store.legacy() {
            match legacy.get(&key).await {
                Ok(Some(bytes)) if !bytes.is_empty() => {
                    found = Some((legacy.namespace().to_string(), bytes));
                    break;
                }
                Ok(_) => {}
                Err(e) => warn!(
                    namespace = %legacy.namespace(),
                    key = %key,
                    error = %e,
                    "Legacy namespace unreadable, skipping"
                ),
            }
        }

        let Some((from_namespace, bytes)) = found else {
            report.missing.push(key);
            continue;
        };

        if !dry_run {
            store.write(&key, &bytes).await?;
        }
        info!(
            proof_id = %id,
            key = %key,
            from = %from_namespace,
            size = bytes.len(),
            dry_run,
            "Migrated object into canonical namespace"
        );
        report.copied.push(ObjectCopy {
            key,
            from_namespace,
            size: bytes.len(),
        });
    }

    Ok(report)
}

fn id_from_alias_key(key: &str) -> Option<&str> {
    key.strip_prefix(ALIAS_PREFIX)?
        .strip_suffix(".receipt")
        .filter(|id| !id.is_empty())
}

/// Discover proof ids present in any legacy namespace.
pub async fn discover_legacy_ids(store: &MultiNamespaceStore) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();

    for legacy in store.legacy() {
        for prefix in [RECEIPT_PREFIX, ALIAS_PREFIX, ANCHOR_PREFIX] {
            let keys = match legacy.list(prefix).await {
                Ok(keys) => keys,
                Err(e) => {
                    warn!(namespace = %legacy.namespace(), prefix, error = %e, "Listing failed");
                    continue;
                }
            };
            for key in &keys {
                let id = id_from_receipt_key(key)
                    .or_else(|| id_from_alias_key(key))
                    .or_else(|| id_from_anchor_key(key));
                if let Some(id) = id.filter(|id| validate_proof_id(id).is_ok()) {
                    ids.insert(id.to_string());
                }
            }
        }
    }

    ids
}

/// Migrate every proof discovered in the legacy namespaces.
pub async fn migrate_discovered(
    store: &MultiNamespaceStore,
    dry_run: bool,
) -> Result<Vec<MigrationReport>> {
    let ids = discover_legacy_ids(store).await;
    info!(count = ids.len(), dry_run, "Migrating discovered proofs");

    let mut reports = Vec::with_capacity(ids.len());
    for id in &ids {
        reports.push(migrate(store, id, dry_run).await?);
    }
    Ok(reports)
}
