use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use super::AppState;
use crate::auth::{extract_token, AuthUser};
use crate::error::AppError;

/// Bearer/cookie JWT authentication for the message API.
/// Inserts the caller's `AuthUser` into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(req.headers())
        .ok_or_else(|| AppError::Auth("Missing authentication token".to_string()))?;

    let claims = state.jwt_validator.validate(&token).map_err(|e| {
        tracing::warn!(error = %e, "Rejected API request with invalid token");
        e
    })?;
    let user = AuthUser::try_from(claims)?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
