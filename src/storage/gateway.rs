/// Multi-namespace object store gateway.
///
/// The same logical store has existed under several bucket names. Writes
/// always go to the canonical namespace; reads probe the canonical namespace
/// first and then every legacy namespace in configured order.
///
/// ```text
///            write ──▶ canonical
/// read ──▶ canonical ──miss──▶ legacy[0] ──miss──▶ legacy[1] ──▶ ...
/// ```
///
/// A namespace that errors during a probe counts as a miss for that
/// namespace only. If every namespace errors the read fails with
/// `StoreUnavailable`, which callers can tell apart from "not found".
///
/// Writers that merge into what they read use `read_for_update` instead:
/// there any namespace error ahead of the first hit aborts the read, so a
/// merge never starts from a view that skipped the authoritative copy.
use std::sync::Arc;

use tracing::{debug, warn};

use super::ObjectStore;
use crate::error::{AnchorError, Result};

/// A successful probe: the bytes and the namespace they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceHit {
    pub namespace: String,
    pub bytes: Vec<u8>,
}

/// Outcome of a single namespace lookup during a probe.
pub type ProbeAttempt = (String, Result<Option<Vec<u8>>>);

/// Final verdict of a probe over one or more namespaces.
#[derive(Debug)]
pub enum ProbeOutcome {
    Hit(NamespaceHit),
    Miss,
    /// Every namespace failed; carries `(namespace, error)` pairs.
    Unreachable(Vec<(String, String)>),
}

/// Settle a sequence of lookup attempts into a single outcome.
///
/// The first non-empty object wins. Empty objects are misses. The probe is
/// unreachable only when every attempt errored.
pub fn settle_probe(attempts: impl IntoIterator<Item = ProbeAttempt>) -> ProbeOutcome {
    let mut failures = Vec::new();
    let mut answered = false;

    for (namespace, attempt) in attempts {
        match attempt {
            Ok(Some(bytes)) if !bytes.is_empty() => {
                return ProbeOutcome::Hit(NamespaceHit { namespace, bytes });
            }
            Ok(_) => answered = true,
            Err(e) => failures.push((namespace, e.to_string())),
        }
    }

    if !answered && !failures.is_empty() {
        ProbeOutcome::Unreachable(failures)
    } else {
        ProbeOutcome::Miss
    }
}

/// One canonical namespace plus ordered legacy read targets.
#[derive(Clone)]
pub struct MultiNamespaceStore {
    canonical: Arc<dyn ObjectStore>,
    legacy: Vec<Arc<dyn ObjectStore>>,
}

impl MultiNamespaceStore {
    /// Build a gateway. Legacy handles that repeat an earlier namespace are dropped.
    pub fn new(canonical: Arc<dyn ObjectStore>, legacy: Vec<Arc<dyn ObjectStore>>) -> Self {
        let mut kept: Vec<Arc<dyn ObjectStore>> = Vec::with_capacity(legacy.len());
        for store in legacy {
            let name = store.namespace();
            let duplicate = name == canonical.namespace()
                || kept.iter().any(|k| k.namespace() == name);
            if duplicate {
                debug!(namespace = %name, "Dropping duplicate legacy namespace");
                continue;
            }
            kept.push(store);
        }

        Self {
            canonical,
            legacy: kept,
        }
    }

    /// Build from an ordered list whose first entry is canonical.
    pub fn from_ordered(mut stores: Vec<Arc<dyn ObjectStore>>) -> Result<Self> {
        if stores.is_empty() {
            return Err(AnchorError::Config(
                "at least one store namespace is required".into(),
            ));
        }
        let canonical = stores.remove(0);
        Ok(Self::new(canonical, stores))
    }

    pub fn canonical(&self) -> &Arc<dyn ObjectStore> {
        &self.canonical
    }

    pub fn canonical_namespace(&self) -> &str {
        self.canonical.namespace()
    }

    pub fn legacy(&self) -> &[Arc<dyn ObjectStore>] {
        &self.legacy
    }

    /// Namespace names in probe order.
    pub fn namespaces(&self) -> Vec<&str> {
        std::iter::once(self.canonical.namespace())
            .chain(self.legacy.iter().map(|s| s.namespace()))
            .collect()
    }

    /// Write to the canonical namespace.
    pub async fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        self.canonical.put(key, data).await?;
        debug!(
            namespace = %self.canonical.namespace(),
            key = %key,
            size = data.len(),
            "Object written"
        );
        Ok(())
    }

    /// Probe every namespace in order and return the first non-empty hit.
    pub async fn read(&self, key: &str) -> Result<Option<NamespaceHit>> {
        let mut attempts: Vec<ProbeAttempt> = Vec::with_capacity(self.legacy.len() + 1);

        for store in std::iter::once(&self.canonical).chain(self.legacy.iter()) {
            let attempt = store.get(key).await;
            let stop = matches!(&attempt, Ok(Some(bytes)) if !bytes.is_empty());
            if let Err(e) = &attempt {
                warn!(
                    namespace = %store.namespace(),
                    key = %key,
                    error = %e,
                    "Namespace probe failed, treating as miss"
                );
            }
            attempts.push((store.namespace().to_string(), attempt));
            if stop {
                break;
            }
        }

        match settle_probe(attempts) {
            ProbeOutcome::Hit(hit) => {
                if hit.namespace != self.canonical.namespace() {
                    debug!(namespace = %hit.namespace, key = %key, "Found object in legacy namespace");
                }
                Ok(Some(hit))
            }
            ProbeOutcome::Miss => Ok(None),
            ProbeOutcome::Unreachable(failures) => Err(AnchorError::StoreUnavailable {
                key: key.to_string(),
                detail: failures
                    .into_iter()
                    .map(|(ns, e)| format!("{ns}: {e}"))
                    .collect::<Vec<_>>()
                    .join("; "),
            }),
        }
    }

    /// Read in namespace order like `read`, but fail on the first namespace error.
    pub async fn read_for_update(&self, key: &str) -> Result<Option<NamespaceHit>> {
        for store in std::iter::once(&self.canonical).chain(self.legacy.iter()) {
            match store.get(key).await {
                Ok(Some(bytes)) if !bytes.is_empty() => {
                    return Ok(Some(NamespaceHit {
                        namespace: store.namespace().to_string(),
                        bytes,
                    }));
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(AnchorError::StoreUnavailable {
                        key: key.to_string(),
                        detail: format!("{}: {e}", store.namespace()),
                    });
                }
            }
        }
        Ok(None)
    }

    /// Read from the canonical namespace only.
    pub async fn read_canonical(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .canonical
            .get(key)
            .await?
            .filter(|bytes| !bytes.is_empty()))
    }

    pub async fn delete_canonical(&self, key: &str) -> Result<()> {
        self.canonical.delete(key).await
    }

    pub async fn list_canonical(&self, prefix: &str) -> Result<Vec<String>> {
        self.canonical.list(prefix).await
    }
}
