/// In-memory object store.
///
/// Backs the test suite and the `--memory-store` dev mode. One instance models
/// one namespace; reachability can be toggled to simulate an outage, and
/// reads can be failed alone to model a flaky backend.
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use super::ObjectStore;
use crate::error::{AnchorError, Result};

pub struct MemoryStore {
    namespace: String,
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
    unreachable: AtomicBool,
    reads_failing: AtomicBool,
}

impl MemoryStore {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            objects: RwLock::new(BTreeMap::new()),
            unreachable: AtomicBool::new(false),
            reads_failing: AtomicBool::new(false),
        }
    }

    /// Seed an object directly, bypassing reachability.
    pub fn insert(&self, key: &str, data: impl Into<Vec<u8>>) {
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), data.into());
    }

    /// Read an object directly, bypassing reachability.
    pub fn peek(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every subsequent call fail as if the backend were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Make reads and listings fail while writes keep succeeding.
    pub fn set_reads_failing(&self, failing: bool) {
        self.reads_failing.store(failing, Ordering::SeqCst);
    }

    fn check_readable(&self) -> Result<()> {
        self.check_reachable()?;
        if self.reads_failing.load(Ordering::SeqCst) {
            return Err(AnchorError::Store(format!(
                "read from namespace {} failed",
                self.namespace
            )));
        }
        Ok(())
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(AnchorError::Store(format!(
                "namespace {} is unreachable",
                self.namespace
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_readable()?;
        Ok(self.peek(key))
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        self.check_reachable()?;
        self.insert(key, data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check_reachable()?;
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.check_readable()?;
        Ok(self
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
