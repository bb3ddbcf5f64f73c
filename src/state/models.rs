/// Persisted proof models.
///
/// The anchor document is stored as JSON with mixed-case field names kept
/// for compatibility with readers that predate this service.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::{AnchorError, Result};

const MAX_PROOF_ID_LEN: usize = 256;

/// Persisted anchoring progress. Variant order is progression order.
///
/// Deserialization is lenient: documents written by older services use
/// other spellings, and an unknown label reads as `NEW` so the rest of the
/// document (txid, confirmations) survives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnchorState {
    #[default]
    New,
    OtsReceipt,
    Anchored,
}

impl AnchorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnchorState::New => "NEW",
            AnchorState::OtsReceipt => "OTS_RECEIPT",
            AnchorState::Anchored => "ANCHORED",
        }
    }

    /// Interpret a state label from the sidecar or an older stored document.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "new" => Some(AnchorState::New),
            "ots_receipt" | "otsreceipt" | "receipt" | "pending" | "submitted" => {
                Some(AnchorState::OtsReceipt)
            }
            "anchored" | "confirmed" | "complete" => Some(AnchorState::Anchored),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for AnchorState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let Some(label) = Option::<String>::deserialize(deserializer)? else {
            return Ok(AnchorState::New);
        };
        Ok(AnchorState::from_label(&label).unwrap_or_else(|| {
            warn!(label = %label, "Unrecognised stored state, reading as NEW");
            AnchorState::New
        }))
    }
}

impl std::fmt::Display for AnchorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anchor status document stored at `anchor:<id>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorDocument {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub state: AnchorState,
    #[serde(default)]
    pub txid: Option<String>,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub confirmations: u64,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Canonical key of the receipt this document describes.
    #[serde(default)]
    pub receipt_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(
        rename = "displayName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub display_name: Option<String>,
}

fn null_as_zero<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    Ok(Option::<u64>::deserialize(deserializer)?.unwrap_or(0))
}

/// What one round of submission or resolution learned about a proof.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
    /// A receipt is durably stored for the proof.
    pub receipt_stored: bool,
    pub txid: Option<String>,
    pub confirmations: u64,
    /// State reported directly by the sidecar, if any.
    pub reported_state: Option<AnchorState>,
}

impl AnchorDocument {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: AnchorState::New,
            txid: None,
            confirmations: 0,
            updated_at: None,
            receipt_ref: None,
            email: None,
            display_name: None,
        }
    }

    /// Fold an observation into this document.
    ///
    /// State only advances, a stored txid is never replaced or cleared and
    /// confirmations never decrease.
    pub fn merged(&self, observation: &Observation, now: DateTime<Utc>) -> AnchorDocument {
        let mut next = self.clone();

        if observation.receipt_stored {
            next.state = next.state.max(AnchorState::OtsReceipt);
        }
        if let Some(reported) = observation.reported_state {
            next.state = next.state.max(reported);
        }

        let observed_txid = observation
            .txid
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        match (&self.txid, observed_txid) {
            (None, Some(txid)) => next.txid = Some(txid.to_string()),
            (Some(existing), Some(txid)) if existing != txid => {
                warn!(
                    proof_id = %self.id,
                    stored = %existing,
                    observed = %txid,
                    "Sidecar reported a different txid, keeping stored one"
                );
            }
            _ => {}
        }

        if next.txid.is_some() {
            next.state = next.state.max(AnchorState::Anchored);
        }
        next.confirmations = next.confirmations.max(observation.confirmations);
        next.updated_at = Some(now);
        next
    }

    /// Whether `other` differs in anything but its timestamp.
    pub fn differs_from(&self, other: &AnchorDocument) -> bool {
        self.state != other.state
            || self.txid != other.txid
            || self.confirmations != other.confirmations
            || self.receipt_ref != other.receipt_ref
            || self.email != other.email
            || self.display_name != other.display_name
    }
}

/// A SHA-256 document hash as 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentHash(String);

impl DocumentHash {
    /// Parse a hex digest. Case is normalised; anything but 64 hex chars is rejected.
    pub fn parse(input: &str) -> Result<Self> {
        let normalized = input.trim().to_ascii_lowercase();
        if normalized.len() != 64 || !normalized.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AnchorError::InvalidHash(format!(
                "expected 64 hex characters, got {:?}",
                input.trim()
            )));
        }
        Ok(Self(normalized))
    }

    /// Hash document bytes.
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(data)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reject ids that cannot be embedded safely in object keys.
pub fn validate_proof_id(id: &str) -> Result<()> {
    if id.is_empty() || id.trim() != id {
        return Err(AnchorError::InvalidId(format!("{id:?} is empty or padded")));
    }
    if id.len() > MAX_PROOF_ID_LEN {
        return Err(AnchorError::InvalidId(format!(
            "id longer than {MAX_PROOF_ID_LEN} bytes"
        )));
    }
    if id
        .chars()
        .any(|c| c == '/' || c.is_whitespace() || c.is_control())
    {
        return Err(AnchorError::InvalidId(format!(
            "{id:?} contains '/', whitespace or control characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_state_order_and_labels() {
        assert!(AnchorState::New < AnchorState::OtsReceipt);
        assert!(AnchorState::OtsReceipt < AnchorState::Anchored);
        assert_eq!(
            serde_json::to_string(&AnchorState::OtsReceipt).unwrap(),
            "\"OTS_RECEIPT\""
        );
        assert_eq!(AnchorState::from_label("pending"), Some(AnchorState::OtsReceipt));
        assert_eq!(AnchorState::from_label("ots-receipt"), Some(AnchorState::OtsReceipt));
        assert_eq!(AnchorState::from_label("ANCHORED"), Some(AnchorState::Anchored));
        assert_eq!(AnchorState::from_label("bogus"), None);
    }

    #[test]
    fn test_document_wire_format() {
        let mut doc = AnchorDocument::new("p1");
        doc.state = AnchorState::Anchored;
        doc.txid = Some("abc123".into());
        doc.confirmations = 2;
        doc.display_name = Some("Ada".into());

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["id"], "p1");
        assert_eq!(value["state"], "ANCHORED");
        assert_eq!(value["txid"], "abc123");
        assert_eq!(value["confirmations"], 2);
        assert_eq!(value["displayName"], "Ada");
        assert!(value.get("updatedAt").is_some());
        assert!(value.get("email").is_none());
    }

    #[test]
    fn test_document_defaults_missing_fields() {
        let doc: AnchorDocument =
            serde_json::from_str(r#"{"state":"OTS_RECEIPT","confirmations":null}"#).unwrap();
        assert_eq!(doc.state, AnchorState::OtsReceipt);
        assert_eq!(doc.confirmations, 0);
        assert!(doc.txid.is_none());
        assert!(doc.id.is_empty());
    }

    #[test]
    fn test_legacy_state_labels_read_leniently() {
        let doc: AnchorDocument =
            serde_json::from_str(r#"{"state":"confirmed","txid":"t"}"#).unwrap();
        assert_eq!(doc.state, AnchorState::Anchored);

        let doc: AnchorDocument =
            serde_json::from_str(r#"{"state":null,"confirmations":2}"#).unwrap();
        assert_eq!(doc.state, AnchorState::New);
    }

    #[test]
    fn test_unknown_state_keeps_document() {
        let doc: AnchorDocument =
            serde_json::from_str(r#"{"state":"MYSTERY","txid":"abc123","confirmations":4}"#)
                .unwrap();
        assert_eq!(doc.state, AnchorState::New);
        assert_eq!(doc.txid.as_deref(), Some("abc123"));

        // The next merge restores the state implied by the txid
        let next = doc.merged(&Observation::default(), Utc::now());
        assert_eq!(next.state, AnchorState::Anchored);
        assert_eq!(next.confirmations, 4);
    }

    #[test]
    fn test_merge_receipt_advances_new() {
        let doc = AnchorDocument::new("p1");
        let next = doc.merged(
            &Observation {
                receipt_stored: true,
                ..Default::default()
            },
            now(),
        );
        assert_eq!(next.state, AnchorState::OtsReceipt);
        assert!(next.updated_at.is_some());
    }

    #[test]
    fn test_merge_txid_anchors() {
        let doc = AnchorDocument::new("p1");
        let next = doc.merged(
            &Observation {
                receipt_stored: true,
                txid: Some("abc123".into()),
                confirmations: 2,
                reported_state: None,
            },
            now(),
        );
        assert_eq!(next.state, AnchorState::Anchored);
        assert_eq!(next.txid.as_deref(), Some("abc123"));
        assert_eq!(next.confirmations, 2);
    }

    #[test]
    fn test_merge_never_regresses() {
        let mut doc = AnchorDocument::new("p1");
        doc.state = AnchorState::Anchored;
        doc.txid = Some("abc123".into());
        doc.confirmations = 6;

        let next = doc.merged(
            &Observation {
                receipt_stored: true,
                txid: None,
                confirmations: 1,
                reported_state: Some(AnchorState::OtsReceipt),
            },
            now(),
        );
        assert_eq!(next.state, AnchorState::Anchored);
        assert_eq!(next.txid.as_deref(), Some("abc123"));
        assert_eq!(next.confirmations, 6);
    }

    #[test]
    fn test_merge_keeps_first_txid() {
        let mut doc = AnchorDocument::new("p1");
        doc.txid = Some("first".into());
        doc.state = AnchorState::Anchored;
        let next = doc.merged(
            &Observation {
                txid: Some("second".into()),
                confirmations: 3,
                ..Default::default()
            },
            now(),
        );
        assert_eq!(next.txid.as_deref(), Some("first"));
        assert_eq!(next.confirmations, 3);
    }

    #[test]
    fn test_merge_ignores_blank_txid() {
        let doc = AnchorDocument::new("p1");
        let next = doc.merged(
            &Observation {
                receipt_stored: true,
                txid: Some("  ".into()),
                ..Default::default()
            },
            now(),
        );
        assert!(next.txid.is_none());
        assert_eq!(next.state, AnchorState::OtsReceipt);
    }

    #[test]
    fn test_differs_from_ignores_timestamp() {
        let doc = AnchorDocument::new("p1");
        let touched = doc.merged(&Observation::default(), now());
        assert!(!doc.differs_from(&touched));
    }

    #[test]
    fn test_document_hash_parse() {
        let upper = "A".repeat(64);
        let hash = DocumentHash::parse(&upper).unwrap();
        assert_eq!(hash.as_str(), "a".repeat(64));

        assert!(DocumentHash::parse("abc").is_err());
        assert!(DocumentHash::parse(&"g".repeat(64)).is_err());
    }

    #[test]
    fn test_document_hash_of_bytes() {
        let hash = DocumentHash::of_bytes(b"abc");
        assert_eq!(
            hash.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_validate_proof_id() {
        assert!(validate_proof_id("cs_test_a1B2c3").is_ok());
        assert!(validate_proof_id("").is_err());
        assert!(validate_proof_id(" p1").is_err());
        assert!(validate_proof_id("a/b").is_err());
        assert!(validate_proof_id(&"x".repeat(300)).is_err());
    }
}
