//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{error, warn};
use unit_booking_core::Viewer;

use crate::web::state::AppState;

const SESSION_COOKIE: &str = "session=";

/// Extracts the session token from the `session` cookie, falling back to an
/// `Authorization: Bearer` header.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|c| c.trim().strip_prefix(SESSION_COOKIE))
        .map(str::trim)
        .find(|token| !token.is_empty());

    from_cookie.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
    })
}

/// Middleware that resolves the session token to a `Viewer`, role included.
///
/// If valid, inserts the viewer into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // 1. Extract the session token
    let token = session_token(req.headers())
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_string();

    // 2. Resolve it to an identity
    let identity = state
        .viewers
        .current_viewer(&token)
        .await
        .map_err(|e| {
            error!("Failed to validate session token: {:?}", e);
            StatusCode::SERVICE_UNAVAILABLE
        })?
        .ok_or_else(|| {
            warn!("Rejected unknown or expired session token.");
            StatusCode::UNAUTHORIZED
        })?;

    // 3. Fetch the role once for this request
    let role = state.viewers.get_role(identity.id).await.map_err(|e| {
        error!("Failed to load role for viewer {}: {:?}", identity.id, e);
        StatusCode::SERVICE_UNAVAILABLE
    })?;

    // 4. Insert the viewer into request extensions
    req.extensions_mut().insert(Viewer::new(identity, role));

    // 5. Continue to the handler
    Ok(next.run(req).await)
}
