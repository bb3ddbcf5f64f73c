/// Object storage abstraction for proof receipts and anchor documents.
///
/// Receipts and anchor documents live in a key/value object store whose
/// namespace (bucket) name has changed across deployments. Every backend
/// handle is bound to exactly one namespace:
/// - `s3`: S3-compatible bucket (production)
/// - `memory`: process-local map (tests and `--memory-store` dev mode)
///
/// The `gateway` module stacks one canonical handle and any number of
/// legacy handles behind a single read/write surface.
pub mod gateway;
pub mod memory;
pub mod s3;

use async_trait::async_trait;

use crate::error::Result;

pub use gateway::{MultiNamespaceStore, NamespaceHit};

/// Trait for namespace-scoped object stores.
///
/// A missing object is `Ok(None)`, never an error. Errors mean the
/// namespace itself could not be reached.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Namespace (bucket) this handle reads from and writes to.
    fn namespace(&self) -> &str;

    /// Fetch an object's raw bytes.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store raw bytes, replacing any previous object under `key`.
    async fn put(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Delete an object. Returns Ok even if the object doesn't exist.
    async fn delete(&self, key: &str) -> Result<()>;

    /// List keys with a given prefix.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Order namespace names canonical-first, dropping blanks and duplicates.
pub fn ordered_namespaces(canonical: &str, legacy: &[String]) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(legacy.len() + 1);
    for name in std::iter::once(canonical).chain(legacy.iter().map(String::as_str)) {
        let name = name.trim();
        if name.is_empty() || names.iter().any(|n| n == name) {
            continue;
        }
        names.push(name.to_string());
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordered_namespaces_canonical_first() {
        let legacy = vec!["OTS_STORE".to_string(), "docuproof".to_string()];
        assert_eq!(
            ordered_namespaces("proofs", &legacy),
            vec!["proofs", "OTS_STORE", "docuproof"]
        );
    }

    #[test]
    fn test_ordered_namespaces_dedup() {
        let legacy = vec![
            "proofs".to_string(),
            " legacy ".to_string(),
            "legacy".to_string(),
            String::new(),
        ];
        assert_eq!(ordered_namespaces("proofs", &legacy), vec!["proofs", "legacy"]);
    }
}
