//! Bearer token check
//!
//! Every `/api` route requires `Authorization: Bearer <token>` matching the
//! shared worker token.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::api::AppState;
use crate::api::error::ApiError;

pub async fn require_bearer_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    let authorized = matches!(presented, Some(token) if token == state.token.as_ref());

    if !authorized {
        tracing::warn!("Rejected request to {} with missing or bad token", request.uri());
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}
