/// Durable proof state.
///
/// Each proof is represented by up to three objects:
/// - receipt bytes at `ots/receipts/<id>.ots` (canonical key)
/// - the same bytes at `ots:<id>.receipt` (legacy alias key)
/// - the anchor document at `anchor:<id>.json`
///
/// The sweep index lives at `anchors/index.json` and pending webhook
/// submissions at `outbox/<id>.json`. This layout is shared with older
/// readers and must not change.
pub mod models;
pub mod repository;

pub use models::{AnchorDocument, AnchorState, DocumentHash, Observation};
pub use repository::{ProofRepository, StoredReceipt};

pub const INDEX_KEY: &str = "anchors/index.json";
pub const RECEIPT_PREFIX: &str = "ots/receipts/";
pub const ANCHOR_PREFIX: &str = "anchor:";
pub const OUTBOX_PREFIX: &str = "outbox/";

pub fn receipt_key(id: &str) -> String {
    format!("{RECEIPT_PREFIX}{id}.ots")
}

pub fn receipt_alias_key(id: &str) -> String {
    format!("ots:{id}.receipt")
}

pub fn anchor_key(id: &str) -> String {
    format!("{ANCHOR_PREFIX}{id}.json")
}

pub fn outbox_key(id: &str) -> String {
    format!("{OUTBOX_PREFIX}{id}.json")
}

/// Recover the proof id from a canonical receipt key.
pub fn id_from_receipt_key(key: &str) -> Option<&str> {
    key.strip_prefix(RECEIPT_PREFIX)?
        .strip_suffix(".ots")
        .filter(|id| !id.is_empty())
}

/// Recover the proof id from an anchor document key.
pub fn id_from_anchor_key(key: &str) -> Option<&str> {
    key.strip_prefix(ANCHOR_PREFIX)?
        .strip_suffix(".json")
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(receipt_key("p1"), "ots/receipts/p1.ots");
        assert_eq!(receipt_alias_key("p1"), "ots:p1.receipt");
        assert_eq!(anchor_key("p1"), "anchor:p1.json");
        assert_eq!(outbox_key("p1"), "outbox/p1.json");
    }

    #[test]
    fn test_ids_from_keys() {
        assert_eq!(id_from_receipt_key("ots/receipts/cs_1.ots"), Some("cs_1"));
        assert_eq!(id_from_receipt_key("ots/receipts/.ots"), None);
        assert_eq!(id_from_receipt_key("ots:cs_1.receipt"), None);
        assert_eq!(id_from_anchor_key("anchor:cs_1.json"), Some("cs_1"));
        assert_eq!(id_from_anchor_key("anchors/index.json"), None);
    }
}
