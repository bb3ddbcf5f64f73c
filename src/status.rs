/// Proof status queries.
///
/// Receipts and anchor documents are written by different code paths that
/// can race or partially fail, so the query degrades in tiers:
///
/// 1. anchor document present: report it
/// 2. only a receipt present: report `OTS_RECEIPT`, inferred
/// 3. nothing present: report `NOT_FOUND`
///
/// Queries are strictly read-only and never fail.
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::error;

use crate::state::models::validate_proof_id;
use crate::state::{anchor_key, AnchorState, ProofRepository};

/// Reported proof state, including the query-only `NOT_FOUND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProofState {
    New,
    OtsReceipt,
    Anchored,
    NotFound,
}

impl From<AnchorState> for ProofState {
    fn from(state: AnchorState) -> Self {
        match state {
            AnchorState::New => ProofState::New,
            AnchorState::OtsReceipt => ProofState::OtsReceipt,
            AnchorState::Anchored => ProofState::Anchored,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofStatus {
    pub id: String,
    pub state: ProofState,
    pub txid: Option<String>,
    pub confirmations: u64,
    pub receipt_available: bool,
    pub inferred_from_receipt: bool,
    pub anchor_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProofStatus {
    fn not_found(id: &str) -> Self {
        Self {
            id: id.to_string(),
            state: ProofState::NotFound,
            txid: None,
            confirmations: 0,
            receipt_available: false,
            inferred_from_receipt: false,
            anchor_key: anchor_key(id),
            updated_at: None,
        }
    }

    pub fn is_found(&self) -> bool {
        self.state != ProofState::NotFound
    }
}

/// Answer "what state is this proof in?" for one id.
pub async fn get_status(repo: &ProofRepository, id: &str) -> ProofStatus {
    if validate_proof_id(id).is_err() {
        return ProofStatus::not_found(id);
    }

    let anchor = match repo.get_anchor(id).await {
        Ok(anchor) => anchor,
        Err(e) => {
            error!(proof_id = %id, error = %e, "Status lookup failed reading anchor document");
            None
        }
    };

    let receipt_available = match repo.get_receipt(id).await {
        Ok(receipt) => receipt.is_some(),
        Err(e) => {
            error!(proof_id = %id, error = %e, "Status lookup failed reading receipt");
            false
        }
    };

    match anchor {
        Some(doc) => ProofStatus {
            id: id.to_string(),
            state: doc.state.into(),
            txid: doc.txid,
            confirmations: doc.confirmations,
            receipt_available,
            inferred_from_receipt: false,
            anchor_key: anchor_key(id),
            updated_at: doc.updated_at,
        },
        None if receipt_available => ProofStatus {
            state: ProofState::OtsReceipt,
            receipt_available: true,
            inferred_from_receipt: true,
            ..ProofStatus::not_found(id)
        },
        None => ProofStatus::not_found(id),
    }
}
