//! Scriptable in-process sidecar for workflow and server tests.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{Resolution, TimestampSidecar, UpgradeOutcome};
use crate::error::{AnchorError, Result};
use crate::state::DocumentHash;

#[derive(Default)]
pub struct FakeSidecar {
    receipt: Mutex<Option<Vec<u8>>>,
    resolution: Mutex<Resolution>,
    upgrade: Mutex<Option<UpgradeOutcome>>,
    pub submits: AtomicUsize,
    pub resolves: AtomicUsize,
    pub upgrades: AtomicUsize,
}

impl FakeSidecar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_receipt(self, receipt: &[u8]) -> Self {
        self.set_receipt(Some(receipt));
        self
    }

    pub fn set_receipt(&self, receipt: Option<&[u8]>) {
        *self.receipt.lock().unwrap_or_else(PoisonError::into_inner) = receipt.map(<[u8]>::to_vec);
    }

    pub fn set_resolution(&self, txid: Option<&str>, confirmations: u64) {
        *self.resolution.lock().unwrap_or_else(PoisonError::into_inner) = Resolution {
            txid: txid.map(str::to_string),
            confirmations,
        };
    }

    /// `None` makes the next upgrade fail as a 502 from the sidecar.
    pub fn set_upgrade(&self, outcome: Option<UpgradeOutcome>) {
        *self.upgrade.lock().unwrap_or_else(PoisonError::into_inner) = outcome;
    }

    pub fn submit_count(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn resolve_count(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TimestampSidecar for FakeSidecar {
    async fn submit(&self, _hash: &DocumentHash) -> Option<Vec<u8>> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        self.receipt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn resolve(&self, _receipt: &[u8]) -> Resolution {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        self.resolution
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn upgrade(&self, _id: &str, _receipt: &[u8]) -> Result<UpgradeOutcome> {
        self.upgrades.fetch_add(1, Ordering::SeqCst);
        self.upgrade
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| AnchorError::SidecarRejected {
                status: 502,
                detail: "calendar unavailable".into(),
            })
    }
}
