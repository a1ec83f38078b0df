use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{Duration, Utc};
use uuid::Uuid;

use gameplan_auth::{password, DeviceInfo, TokenPair};
use gameplan_db::models::UserRow;
use gameplan_types::api::{
    ForgotPasswordRequest, LoginRequest, LogoutRequest, RefreshTokenRequest, ResetPasswordRequest,
    SignUpRequest, TokenResponse, VerifyCodeRequest,
};
use gameplan_types::models::TRIAL_DAYS;

use crate::error::{conflict_on_unique, ApiError};
use crate::{fmt_ts, AppState};

const MIN_PASSWORD_LEN: usize = 6;

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignUpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !req.agreed_to_terms {
        return Err(ApiError::Validation(
            "You must agree to the Terms & Conditions".to_string(),
        ));
    }
    if req.username.len() < 2 || req.username.len() > 50 {
        return Err(ApiError::Validation(
            "Username must be between 2 and 50 characters".to_string(),
        ));
    }
    if !req.email.contains('@') {
        return Err(ApiError::Validation("Invalid email address".to_string()));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(
            "Password must be at least 6 characters".to_string(),
        ));
    }
    if req.password != req.confirm_password {
        return Err(ApiError::Validation(
            "Password and Confirm Password do not match".to_string(),
        ));
    }

    if state.db.get_user_by_email(&req.email)?.is_some() {
        return Err(ApiError::Conflict("Email already registered".to_string()));
    }

    let password_hash = password::hash_password(&req.password)?;
    let now = Utc::now();
    let user = UserRow {
        id: Uuid::new_v4().to_string(),
        username: req.username,
        email: req.email,
        password_hash,
        agreed_to_terms: true,
        email_verified: false,
        is_subscribed: false,
        subscription_ref: None,
        customer_ref: None,
        trial_ends_at: fmt_ts(now + Duration::days(TRIAL_DAYS)),
        created_at: fmt_ts(now),
        updated_at: fmt_ts(now),
    };

    // The email UNIQUE constraint backs up the check above under races.
    state
        .db
        .create_user(&user)
        .map_err(|e| conflict_on_unique(e, "Email already registered"))?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "message": "User created successfully" })),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.auth.authenticate(&state.db, &req.email, &req.password)?;

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("corrupt user id '{}': {e}", user.id)))?;

    let pair = state
        .auth
        .issue_session(&state.db, user_id, device_info(&headers))?;

    Ok(Json(token_response(pair)))
}

pub async fn logout(
    State(state): State<AppState>,
    Json(req): Json<LogoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.revoke(&state.db, &req.refresh_token)?;
    Ok(Json(serde_json::json!({ "message": "Logged out successfully" })))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pair = state.auth.refresh(&state.db, &req.refresh_token)?;
    Ok(Json(token_response(pair)))
}

// -- Forgot password --

pub async fn forgot_password_request(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let code = state.auth.start_reset(&state.db, &req.email)?;
    state.mailer.send_reset_code(&req.email, &code).await?;

    Ok(Json(serde_json::json!({
        "message": "Verification code sent to your email"
    })))
}

pub async fn forgot_password_verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyCodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.check_reset_code(&state.db, &req.email, &req.code)?;
    Ok(Json(serde_json::json!({ "message": "Verification code validated" })))
}

pub async fn forgot_password_reset(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.new_password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(
            "Password must be at least 6 characters".to_string(),
        ));
    }

    state
        .auth
        .reset_password(&state.db, &req.email, &req.code, &req.new_password)?;

    Ok(Json(serde_json::json!({ "message": "Password reset successful" })))
}

fn token_response(pair: TokenPair) -> TokenResponse {
    TokenResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        token_type: "bearer".to_string(),
    }
}

fn device_info(headers: &HeaderMap) -> DeviceInfo {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    // First hop of X-Forwarded-For when running behind a proxy.
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string());

    DeviceInfo {
        user_agent,
        ip_address,
    }
}
