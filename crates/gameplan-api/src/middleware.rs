use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use gameplan_db::models::UserRow;

use crate::error::ApiError;
use crate::AppState;

/// The authenticated caller, resolved once per request and stashed in
/// request extensions.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserRow);

/// Extract and validate the bearer token from the Authorization header,
/// then resolve it to a live user row.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing authorization header".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Unauthorized("Malformed authorization header".to_string()))?;

    let user = state.auth.verify_access(&state.db, token)?;

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}
