/// HTTP client for the OTS sidecar.
///
/// Wire format (JSON bodies, receipts as standard base64):
///
/// ```text
/// POST /submit              {hash}              -> {ok, receipt_b64?}
/// POST /txid-from-receipt   {receiptBase64}     -> {txid?, confirmations?}
/// POST /txid                (same)
/// POST /verify              (same)
/// POST /upgrade             {id, receipt_b64}   -> {ok, receipt_b64, state?, txid?, confirmations?}
/// ```
///
/// Every request is bounded by the configured timeout.
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{Resolution, TimestampSidecar, UpgradeOutcome, RESOLVE_PATHS};
use crate::error::{AnchorError, Result};
use crate::state::{AnchorState, DocumentHash};

/// Configuration for the sidecar client.
#[derive(Debug, Clone)]
pub struct SidecarConfig {
    /// Base URL, e.g. `http://ots-sidecar:8080`.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

pub struct HttpSidecar {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    hash: &'a str,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    receipt_b64: Option<String>,
}

#[derive(Debug, Serialize)]
struct ResolveRequest {
    #[serde(rename = "receiptBase64")]
    receipt_base64: String,
}

#[derive(Debug, Deserialize)]
struct ResolveResponse {
    #[serde(default)]
    txid: Option<String>,
    #[serde(default)]
    confirmations: Option<u64>,
}

#[derive(Debug, Serialize)]
struct UpgradeRequest<'a> {
    id: &'a str,
    receipt_b64: String,
}

#[derive(Debug, Deserialize)]
struct UpgradeResponse {
    ok: bool,
    #[serde(default)]
    receipt_b64: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    txid: Option<String>,
    #[serde(default)]
    confirmations: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpSidecar {
    pub fn new(config: SidecarConfig) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(AnchorError::Config("sidecar URL not configured".into()));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AnchorError::Config(format!("sidecar HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn try_resolve(&self, path: &str, body: &ResolveRequest) -> Option<Resolution> {
        let resp = match self.client.post(self.url(path)).json(body).send().await {
            Ok(resp) => resp,
            Err(e) => {
                debug!(path, error = %e, "Resolve endpoint unreachable");
                return None;
            }
        };

        if !resp.status().is_success() {
            debug!(path, status = %resp.status(), "Resolve endpoint declined");
            return None;
        }

        match resp.json::<ResolveResponse>().await {
            Ok(parsed) => Some(Resolution {
                txid: parsed.txid.filter(|t| !t.trim().is_empty()),
                confirmations: parsed.confirmations.unwrap_or(0),
            }),
            Err(e) => {
                debug!(path, error = %e, "Resolve endpoint returned unparseable body");
                None
            }
        }
    }
}

fn decode_receipt(encoded: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    BASE64.decode(encoded.trim())
}

#[async_trait]
impl TimestampSidecar for HttpSidecar {
    async fn submit(&self, hash: &DocumentHash) -> Option<Vec<u8>> {
        let resp = match self
            .client
            .post(self.url("/submit"))
            .json(&SubmitRequest {
                hash: hash.as_str(),
            })
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = %e, "Sidecar submit unreachable");
                return None;
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Sidecar submit declined");
            return None;
        }

        let parsed: SubmitResponse = match resp.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "Sidecar submit returned unparseable body");
                return None;
            }
        };

        let encoded = parsed.receipt_b64.filter(|r| !r.trim().is_empty())?;
        match decode_receipt(&encoded) {
            Ok(bytes) if !bytes.is_empty() => {
                info!(hash = %hash, size = bytes.len(), "Sidecar returned receipt");
                Some(bytes)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Sidecar submit returned invalid base64 receipt");
                None
            }
        }
    }

    async fn resolve(&self, receipt: &[u8]) -> Resolution {
        let body = ResolveRequest {
            receipt_base64: BASE64.encode(receipt),
        };

        for path in RESOLVE_PATHS {
            if let Some(resolution) = self.try_resolve(path, &body).await {
                debug!(
                    path,
                    txid = ?resolution.txid,
                    confirmations = resolution.confirmations,
                    "Receipt resolved"
                );
                return resolution;
            }
        }

        warn!("No sidecar resolve endpoint answered");
        Resolution::unresolved()
    }

    async fn upgrade(&self, id: &str, receipt: &[u8]) -> Result<UpgradeOutcome> {
        let resp = self
            .client
            .post(self.url("/upgrade"))
            .json(&UpgradeRequest {
                id,
                receipt_b64: BASE64.encode(receipt),
            })
            .send()
            .await
            .map_err(|e| AnchorError::SidecarUnavailable(format!("upgrade: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AnchorError::SidecarRejected {
                status: status.as_u16(),
                detail: body,
            });
        }

        let parsed: UpgradeResponse = resp
            .json()
            .await
            .map_err(|e| AnchorError::SidecarProtocol(format!("upgrade response: {e}")))?;

        if !parsed.ok {
            return Err(AnchorError::SidecarRejected {
                status: status.as_u16(),
                detail: parsed
                    .error
                    .unwrap_or_else(|| "sidecar reported ok=false".to_string()),
            });
        }

        let receipt = match parsed.receipt_b64.as_deref() {
            Some(encoded) => decode_receipt(encoded)
                .map_err(|e| AnchorError::SidecarProtocol(format!("upgrade receipt: {e}")))?,
            None => {
                return Err(AnchorError::SidecarProtocol(
                    "upgrade response missing receipt_b64".into(),
                ))
            }
        };

        let state = match parsed.state.as_deref() {
            Some(label) => Some(AnchorState::from_label(label).ok_or_else(|| {
                AnchorError::SidecarProtocol(format!("unknown upgrade state {label:?}"))
            })?),
            None => None,
        };

        Ok(UpgradeOutcome {
            receipt,
            state,
            txid: parsed.txid.filter(|t| !t.trim().is_empty()),
            confirmations: parsed.confirmations.unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use super::*;

    async fn spawn(router: Router) -> HttpSidecar {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        HttpSidecar::new(SidecarConfig {
            base_url: format!("http://{addr}"),
            timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    fn hash() -> DocumentHash {
        DocumentHash::parse(&"ab".repeat(32)).unwrap()
    }

    #[test]
    fn test_blank_url_is_config_error() {
        let result = HttpSidecar::new(SidecarConfig {
            base_url: "/".into(),
            timeout: Duration::from_secs(1),
        });
        assert!(matches!(result, Err(AnchorError::Config(_))));
    }

    #[tokio::test]
    async fn test_submit_returns_receipt() {
        let router = Router::new().route(
            "/submit",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["hash"], "ab".repeat(32));
                Json(json!({"ok": true, "receipt_b64": BASE64.encode(b"receipt")}))
            }),
        );
        let sidecar = spawn(router).await;
        assert_eq!(sidecar.submit(&hash()).await, Some(b"receipt".to_vec()));
    }

    #[tokio::test]
    async fn test_submit_without_receipt_is_none() {
        let router = Router::new().route("/submit", post(|| async { Json(json!({"ok": true})) }));
        let sidecar = spawn(router).await;
        assert_eq!(sidecar.submit(&hash()).await, None);
    }

    #[tokio::test]
    async fn test_submit_server_error_is_none() {
        let router = Router::new().route(
            "/submit",
            post(|| async { (StatusCode::BAD_GATEWAY, "calendar submit failed") }),
        );
        let sidecar = spawn(router).await;
        assert_eq!(sidecar.submit(&hash()).await, None);
    }

    #[tokio::test]
    async fn test_submit_unreachable_is_none() {
        let sidecar = HttpSidecar::new(SidecarConfig {
            base_url: "http://127.0.0.1:1".into(),
            timeout: Duration::from_millis(500),
        })
        .unwrap();
        assert_eq!(sidecar.submit(&hash()).await, None);
    }

    #[tokio::test]
    async fn test_resolve_falls_through_candidates() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new()
            .route(
                "/txid-from-receipt",
                post(|| async { StatusCode::NOT_FOUND }),
            )
            .route("/txid", post(|| async { "not json" }))
            .route(
                "/verify",
                post(move |Json(body): Json<Value>| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(body["receiptBase64"], BASE64.encode(b"r"));
                        Json(json!({"txid": "abc123", "confirmations": 4}))
                    }
                }),
            );
        let sidecar = spawn(router).await;

        let resolution = sidecar.resolve(b"r").await;
        assert_eq!(resolution.txid.as_deref(), Some("abc123"));
        assert_eq!(resolution.confirmations, 4);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resolve_first_success_wins() {
        let router = Router::new()
            .route(
                "/txid-from-receipt",
                post(|| async { Json(json!({"txid": "first", "confirmations": 1})) }),
            )
            .route(
                "/txid",
                post(|| async { Json(json!({"txid": "second", "confirmations": 9})) }),
            );
        let sidecar = spawn(router).await;
        assert_eq!(sidecar.resolve(b"r").await.txid.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_resolve_all_failing_is_unresolved() {
        let sidecar = spawn(Router::new()).await;
        assert_eq!(sidecar.resolve(b"r").await, Resolution::unresolved());
    }

    #[tokio::test]
    async fn test_upgrade_success() {
        let router = Router::new().route(
            "/upgrade",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["id"], "p1");
                Json(json!({
                    "ok": true,
                    "id": "p1",
                    "receipt_b64": BASE64.encode(b"upgraded"),
                    "state": "ANCHORED",
                    "txid": "abc123",
                    "confirmations": 0
                }))
            }),
        );
        let sidecar = spawn(router).await;

        let outcome = sidecar.upgrade("p1", b"pending").await.unwrap();
        assert_eq!(outcome.receipt, b"upgraded");
        assert_eq!(outcome.state, Some(AnchorState::Anchored));
        assert_eq!(outcome.txid.as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn test_upgrade_http_error_is_rejected() {
        let router = Router::new().route(
            "/upgrade",
            post(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"ok": false, "error": "Upgrade failed"})),
                )
            }),
        );
        let sidecar = spawn(router).await;

        match sidecar.upgrade("p1", b"pending").await {
            Err(AnchorError::SidecarRejected { status, detail }) => {
                assert_eq!(status, 500);
                assert!(detail.contains("Upgrade failed"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_upgrade_malformed_body_is_protocol_error() {
        let router = Router::new().route(
            "/upgrade",
            post(|| async { Json(json!({"receipt_b64": "AAAA"})) }),
        );
        let sidecar = spawn(router).await;
        assert!(matches!(
            sidecar.upgrade("p1", b"pending").await,
            Err(AnchorError::SidecarProtocol(_))
        ));
    }

    #[tokio::test]
    async fn test_upgrade_not_ok_is_rejected() {
        let router = Router::new().route(
            "/upgrade",
            post(|| async { Json(json!({"ok": false, "error": "Receipt not found in sidecar"})) }),
        );
        let sidecar = spawn(router).await;
        assert!(matches!(
            sidecar.upgrade("p1", b"pending").await,
            Err(AnchorError::SidecarRejected { status: 200, .. })
        ));
    }

    #[tokio::test]
    async fn test_upgrade_unreachable() {
        let sidecar = HttpSidecar::new(SidecarConfig {
            base_url: "http://127.0.0.1:1".into(),
            timeout: Duration::from_millis(500),
        })
        .unwrap();
        assert!(matches!(
            sidecar.upgrade("p1", b"pending").await,
            Err(AnchorError::SidecarUnavailable(_))
        ));
    }
}
