//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use crate::web::state::AppState;

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": "Unauthorized" })),
    )
        .into_response()
}

/// Middleware that resolves the bearer token to a user id.
///
/// If valid, inserts the user id (`Uuid`) into request extensions for handlers to use.
/// If invalid or missing, returns 401 with a JSON `message`.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    // 1. Extract the bearer token
    let Some(token) = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_string)
    else {
        return unauthorized();
    };

    // 2. Ask the identity provider who it belongs to
    let user_id = match state.identity.verify_access_token(&token).await {
        Ok(user_id) => user_id,
        Err(e) => {
            warn!("Rejected access token: {}", e);
            return unauthorized();
        }
    };

    // 3. Insert user_id into request extensions and continue
    req.extensions_mut().insert(user_id);
    next.run(req).await
}
