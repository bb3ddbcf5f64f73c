/// REST API routes.
///
/// Errors are returned as `{ok: false, error, code}` with a status code
/// chosen by `reject`. The status route never errors on lookup: unknown
/// proofs are a 404 carrying `state: NOT_FOUND`.
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::middleware::AdminAccess;
use super::AppState;
use crate::anchor::outbox::SubmissionJob;
use crate::anchor::sweep::SweepReport;
use crate::anchor::{Contact, ResolveOutcome};
use crate::error::AnchorError;
use crate::migrate::{self, MigrationReport};
use crate::state::{AnchorDocument, DocumentHash};
use crate::status::{self, ProofStatus};

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
    pub code: &'static str,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: &'static str) -> Self {
        Self {
            ok: false,
            error: error.into(),
            code,
        }
    }
}

type Rejection = (StatusCode, Json<ErrorResponse>);

/// Map a workflow error to an HTTP status and body.
fn reject(e: AnchorError) -> Rejection {
    let (status, code) = match &e {
        AnchorError::InvalidHash(_) => (StatusCode::BAD_REQUEST, "INVALID_HASH"),
        AnchorError::InvalidId(_) => (StatusCode::BAD_REQUEST, "INVALID_ID"),
        AnchorError::NoReceipt(_) => (StatusCode::UNPROCESSABLE_ENTITY, "NO_RECEIPT"),
        AnchorError::SidecarUnavailable(_)
        | AnchorError::SidecarRejected { .. }
        | AnchorError::SidecarProtocol(_) => (StatusCode::BAD_GATEWAY, "SIDECAR_FAILED"),
        AnchorError::StoreUnavailable { .. } | AnchorError::Store(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE")
        }
        AnchorError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIGURATION"),
        AnchorError::EmptyReceipt(_) | AnchorError::Serialization(_) | AnchorError::Io(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL")
        }
    };
    (status, Json(ErrorResponse::new(e.to_string(), code)))
}

// ─── Health ──────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    canonical_namespace: String,
}

/// GET /health
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        canonical_namespace: state
            .anchorer
            .repository()
            .store()
            .canonical_namespace()
            .to_string(),
    })
}

pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

// ─── Status ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct StatusQuery {
    id: Option<String>,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    ok: bool,
    #[serde(flatten)]
    status: ProofStatus,
}

/// GET /status?id=<id>
async fn get_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Response {
    let Some(id) = query.id.filter(|id| !id.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Missing id", "MISSING_ID")),
        )
            .into_response();
    };

    let status = status::get_status(state.anchorer.repository(), &id).await;
    let code = if status.is_found() {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };

    (
        code,
        Json(StatusResponse {
            ok: status.is_found(),
            status,
        }),
    )
        .into_response()
}

pub fn status_routes() -> Router<Arc<AppState>> {
    Router::new().route("/status", get(get_status))
}

// ─── Anchoring ───────────────────────────────────────────

/// Webhook hand-off: a paid proof and its document hash.
#[derive(Debug, Deserialize)]
struct AnchorRequest {
    id: String,
    hash: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(rename = "displayName", default)]
    display_name: Option<String>,
}

impl AnchorRequest {
    fn contact(&self) -> Contact {
        Contact {
            email: self.email.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct AnchorResponse {
    ok: bool,
    anchor: AnchorDocument,
}

#[derive(Debug, Serialize)]
struct QueuedResponse {
    ok: bool,
    id: String,
    queued: bool,
}

#[derive(Debug, Deserialize)]
struct IdRequest {
    id: String,
}

#[derive(Debug, Serialize)]
struct ResolveResponse {
    ok: bool,
    outcome: &'static str,
    anchor: AnchorDocument,
}

/// POST /anchor: submit and anchor synchronously.
async fn anchor(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnchorRequest>,
) -> Result<(StatusCode, Json<AnchorResponse>), Rejection> {
    let hash = DocumentHash::parse(&req.hash).map_err(reject)?;
    let doc = state
        .anchorer
        .submit_and_anchor(&req.id, &hash, &req.contact())
        .await
        .map_err(reject)?;

    Ok((
        StatusCode::CREATED,
        Json(AnchorResponse {
            ok: true,
            anchor: doc,
        }),
    ))
}

/// POST /anchor/enqueue: persist and hand off to the outbox worker.
async fn enqueue(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnchorRequest>,
) -> Result<(StatusCode, Json<QueuedResponse>), Rejection> {
    let Some(outbox) = &state.outbox else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new("Outbox worker not running", "OUTBOX_DISABLED")),
        ));
    };

    let hash = DocumentHash::parse(&req.hash).map_err(reject)?;
    outbox
        .enqueue(SubmissionJob::new(req.id.clone(), &hash, req.contact()))
        .await
        .map_err(reject)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(QueuedResponse {
            ok: true,
            id: req.id,
            queued: true,
        }),
    ))
}

/// POST /resolve: re-resolve a stored receipt now.
async fn resolve(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IdRequest>,
) -> Result<Json<ResolveResponse>, Rejection> {
    let outcome = state.anchorer.resolve(&req.id).await.map_err(reject)?;

    let (label, anchor) = match outcome {
        ResolveOutcome::NoReceipt => {
            return Err((
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new(
                    format!("No receipt stored for {}", req.id),
                    "NOT_FOUND",
                )),
            ))
        }
        ResolveOutcome::Settled(doc) => ("settled", doc),
        ResolveOutcome::Unchanged(doc) => ("unchanged", doc),
        ResolveOutcome::Advanced(doc) => ("advanced", doc),
    };

    Ok(Json(ResolveResponse {
        ok: true,
        outcome: label,
        anchor,
    }))
}

/// POST /upgrade: user-triggered sidecar upgrade.
async fn upgrade(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IdRequest>,
) -> Result<Json<AnchorResponse>, Rejection> {
    match state.anchorer.upgrade(&req.id).await {
        Ok(doc) => Ok(Json(AnchorResponse {
            ok: true,
            anchor: doc,
        })),
        Err(e @ AnchorError::NoReceipt(_)) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(e.to_string(), "NOT_FOUND")),
        )),
        Err(e) => Err(reject(e)),
    }
}

pub fn anchor_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/anchor", post(anchor))
        .route("/anchor/enqueue", post(enqueue))
        .route("/resolve", post(resolve))
        .route("/upgrade", post(upgrade))
}

// ─── Admin ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SweepQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct MigrateRequest {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "dryRun", default)]
    dry_run: bool,
}

#[derive(Debug, Serialize)]
struct MigrateResponse {
    ok: bool,
    reports: Vec<MigrationReport>,
}

/// POST /sweep?limit=<n>: run one resolution sweep.
async fn sweep(
    _admin: AdminAccess,
    State(state): State<Arc<AppState>>,
    Query(query): Query<SweepQuery>,
) -> Result<Json<SweepReport>, Rejection> {
    state
        .anchorer
        .resolve_cron(query.limit)
        .await
        .map(Json)
        .map_err(reject)
}

/// POST /migrate: copy legacy objects into the canonical namespace.
async fn migrate_proofs(
    _admin: AdminAccess,
    State(state): State<Arc<AppState>>,
    Json(req): Json<MigrateRequest>,
) -> Result<Json<MigrateResponse>, Rejection> {
    let store = state.anchorer.repository().store();
    let reports = match req.id.as_deref() {
        Some(id) => vec![migrate::migrate(store, id, req.dry_run)
            .await
            .map_err(reject)?],
        None => migrate::migrate_discovered(store, req.dry_run)
            .await
            .map_err(reject)?,
    };

    Ok(Json(MigrateResponse { ok: true, reports }))
}

pub fn admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sweep", post(sweep))
        .route("/migrate", post(migrate_proofs))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::anchor::outbox::{outbox, OutboxConfig};
    use crate::anchor::tests::{harness, Harness};
    use crate::server::build_app;
    use crate::sidecar::fake::FakeSidecar;

    fn app(h: &Harness) -> Router {
        build_app(AppState {
            anchorer: h.anchorer.clone(),
            outbox: None,
            admin_token: Some("s3cret".into()),
        })
    }

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let resp = app.oneshot(request).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn test_reject_mapping() {
        let (status, body) = reject(AnchorError::EmptyReceipt("p1".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.0.code, "INTERNAL");

        let (status, _) = reject(AnchorError::StoreUnavailable {
            key: "k".into(),
            detail: "down".into(),
        });
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _) = reject(AnchorError::SidecarProtocol("bad".into()));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness(FakeSidecar::new());
        let (status, body) = call(app(&h), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["canonical_namespace"], "proofs");
    }

    #[tokio::test]
    async fn test_status_not_found() {
        let h = harness(FakeSidecar::new());
        let (status, body) = call(app(&h), get("/status?id=p1")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["ok"], false);
        assert_eq!(body["state"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_status_missing_id() {
        let h = harness(FakeSidecar::new());
        let (status, body) = call(app(&h), get("/status")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "MISSING_ID");
    }

    #[tokio::test]
    async fn test_anchor_then_status() {
        let h = harness(FakeSidecar::new().with_receipt(b"receipt"));
        h.sidecar.set_resolution(Some("abc123"), 2);

        let (status, body) = call(
            app(&h),
            post_json(
                "/anchor",
                json!({"id": "p1", "hash": "ab".repeat(32), "displayName": "Ada"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["anchor"]["state"], "ANCHORED");
        assert_eq!(body["anchor"]["txid"], "abc123");
        assert_eq!(body["anchor"]["displayName"], "Ada");

        let (status, body) = call(app(&h), get("/status?id=p1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["id"], "p1");
        assert_eq!(body["state"], "ANCHORED");
        assert_eq!(body["txid"], "abc123");
        assert_eq!(body["confirmations"], 2);
        assert_eq!(body["anchorKey"], "anchor:p1.json");
        assert!(body["updatedAt"].is_string());
    }

    #[tokio::test]
    async fn test_anchor_without_receipt_is_not_2xx() {
        let h = harness(FakeSidecar::new());
        let (status, body) = call(
            app(&h),
            post_json("/anchor", json!({"id": "p1", "hash": "ab".repeat(32)})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "NO_RECEIPT");
    }

    #[tokio::test]
    async fn test_anchor_bad_hash() {
        let h = harness(FakeSidecar::new().with_receipt(b"r"));
        let (status, body) = call(
            app(&h),
            post_json("/anchor", json!({"id": "p1", "hash": "xyz"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_HASH");
        assert_eq!(h.sidecar.submit_count(), 0);
    }

    #[tokio::test]
    async fn test_enqueue_requires_worker() {
        let h = harness(FakeSidecar::new());
        let (status, _) = call(
            app(&h),
            post_json("/anchor/enqueue", json!({"id": "p1", "hash": "ab".repeat(32)})),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_enqueue_accepted() {
        let h = harness(FakeSidecar::new());
        let (producer, _worker) = outbox(h.anchorer.clone(), OutboxConfig::default());
        let app = build_app(AppState {
            anchorer: h.anchorer.clone(),
            outbox: Some(producer),
            admin_token: None,
        });

        let (status, body) = call(
            app,
            post_json("/anchor/enqueue", json!({"id": "p1", "hash": "ab".repeat(32)})),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["queued"], true);
        assert!(h.canonical.peek("outbox/p1.json").is_some());
    }

    #[tokio::test]
    async fn test_resolve_route() {
        let h = harness(FakeSidecar::new());
        let (status, _) = call(app(&h), post_json("/resolve", json!({"id": "p1"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        h.anchorer.repository().put_receipt("p1", b"r").await.unwrap();
        let (status, body) = call(app(&h), post_json("/resolve", json!({"id": "p1"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "advanced");
        assert_eq!(body["anchor"]["state"], "OTS_RECEIPT");
    }

    #[tokio::test]
    async fn test_upgrade_failure_is_bad_gateway() {
        let h = harness(FakeSidecar::new());
        let (status, _) = call(app(&h), post_json("/upgrade", json!({"id": "p1"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        h.anchorer.repository().put_receipt("p1", b"r").await.unwrap();
        let (status, body) = call(app(&h), post_json("/upgrade", json!({"id": "p1"}))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], "SIDECAR_FAILED");
    }

    #[tokio::test]
    async fn test_admin_routes_need_token() {
        let h = harness(FakeSidecar::new());
        let (status, _) = call(app(&h), post_json("/sweep", json!({}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let request = Request::builder()
            .method("POST")
            .uri("/sweep?limit=5")
            .header("Authorization", "Bearer s3cret")
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(app(&h), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["examined"], 0);
    }

    #[tokio::test]
    async fn test_admin_routes_disabled_without_token() {
        let h = harness(FakeSidecar::new());
        let app = build_app(AppState {
            anchorer: h.anchorer.clone(),
            outbox: None,
            admin_token: None,
        });
        let request = Request::builder()
            .method("POST")
            .uri("/sweep")
            .header("Authorization", "Bearer anything")
            .body(Body::empty())
            .unwrap();
        let (status, _) = call(app, request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_migrate_route() {
        let h = harness(FakeSidecar::new());
        h.legacy.insert("ots/receipts/p1.ots", b"r".to_vec());

        let request = Request::builder()
            .method("POST")
            .uri("/migrate")
            .header("Authorization", "Bearer s3cret")
            .header("content-type", "application/json")
            .body(Body::from(json!({"id": "p1", "dryRun": false}).to_string()))
            .unwrap();
        let (status, body) = call(app(&h), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reports"][0]["copied"][0]["fromNamespace"], "OTS_STORE");
        assert!(h.canonical.peek("ots/receipts/p1.ots").is_some());
    }
}
