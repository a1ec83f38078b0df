use axum::{response::IntoResponse, Extension, Json};

use gameplan_types::api::ProfileResponse;

use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::parse_ts;

pub async fn profile(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(ProfileResponse {
        username: user.username,
        email: user.email,
        is_subscribed: user.is_subscribed,
        subscription_ref: user.subscription_ref,
        trial_ends_at: parse_ts(&user.trial_ends_at),
        email_verified: user.email_verified,
    }))
}
