/// OpenTimestamps sidecar integration.
///
/// The sidecar is an external HTTP service that stamps hashes against the
/// OTS calendars and later upgrades the resulting receipts once a Bitcoin
/// attestation exists. This crate treats it as a black box with three
/// operations:
///
/// - `submit`: best effort. No receipt yet is a normal answer.
/// - `resolve`: best effort. Never fails, degrades to "nothing new".
/// - `upgrade`: user triggered. Failures are surfaced to the caller.
#[cfg(test)]
pub mod fake;
pub mod http;

use async_trait::async_trait;

use crate::error::Result;
use crate::state::{AnchorState, DocumentHash};

pub use http::{HttpSidecar, SidecarConfig};

/// Endpoints tried in order when resolving a receipt to a txid.
pub const RESOLVE_PATHS: [&str; 3] = ["/txid-from-receipt", "/txid", "/verify"];

/// Best known anchoring data for a receipt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub txid: Option<String>,
    pub confirmations: u64,
}

impl Resolution {
    pub fn unresolved() -> Self {
        Self::default()
    }
}

/// Result of a successful sidecar upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeOutcome {
    /// Upgraded receipt bytes. Empty if the sidecar returned nothing new.
    pub receipt: Vec<u8>,
    pub state: Option<AnchorState>,
    pub txid: Option<String>,
    pub confirmations: u64,
}

/// Trait for the timestamping sidecar, so workflows can run against fakes.
#[async_trait]
pub trait TimestampSidecar: Send + Sync {
    /// Submit a document hash. Returns receipt bytes if the sidecar produced them.
    async fn submit(&self, hash: &DocumentHash) -> Option<Vec<u8>>;

    /// Resolve a receipt to a txid and confirmation count.
    async fn resolve(&self, receipt: &[u8]) -> Resolution;

    /// Ask the sidecar to upgrade a receipt. Any failure is an error.
    async fn upgrade(&self, id: &str, receipt: &[u8]) -> Result<UpgradeOutcome>;
}
