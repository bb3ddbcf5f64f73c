/// Bearer-token guard for admin routes.
///
/// Sweep and migration are operator actions. They require
/// `Authorization: Bearer <admin token>` and are disabled entirely when no
/// token is configured.
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;

use super::routes::ErrorResponse;
use super::AppState;

/// Marker extractor: present only on requests carrying the admin token.
#[derive(Debug, Clone)]
pub struct AdminAccess;

fn reject(status: StatusCode, error: &str) -> (StatusCode, Json<ErrorResponse>) {
    (status, Json(ErrorResponse::new(error, "UNAUTHORIZED")))
}

/// Compare without short-circuiting on the first differing byte.
fn tokens_match(presented: &[u8], expected: &[u8]) -> bool {
    if presented.len() != expected.len() {
        return false;
    }
    presented
        .iter()
        .zip(expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

impl FromRequestParts<Arc<AppState>> for AdminAccess {
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.admin_token.as_deref().filter(|t| !t.is_empty()) else {
            return Err(reject(StatusCode::FORBIDDEN, "Admin routes are disabled"));
        };

        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "Missing Authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "Invalid Authorization format"))?;

        if !tokens_match(token.as_bytes(), expected.as_bytes()) {
            return Err(reject(StatusCode::UNAUTHORIZED, "Invalid admin token"));
        }

        Ok(AdminAccess)
    }
}
