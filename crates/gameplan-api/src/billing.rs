use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    Extension, Json,
};
use tracing::{debug, info, warn};

use gameplan_db::now_ts;
use gameplan_types::api::{CheckoutRequest, CheckoutResponse, PortalResponse};
use gameplan_upstream::billing::SIGNATURE_HEADER;
use gameplan_upstream::{BillingEvent, BillingPlan};

use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::{parse_id, AppState};

pub async fn checkout_session(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let plan = BillingPlan::parse(&req.plan)
        .ok_or_else(|| ApiError::Validation("Invalid plan".to_string()))?;

    let checkout_url = state
        .billing
        .create_checkout_session(parse_id(&user.id), &user.email, plan)
        .await?;

    Ok(Json(CheckoutResponse { checkout_url }))
}

pub async fn portal(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let customer_ref = user
        .customer_ref
        .or(user.subscription_ref)
        .ok_or_else(|| ApiError::Validation("No active subscription found".to_string()))?;

    let url = state.billing.create_portal_session(&customer_ref).await?;
    Ok(Json(PortalResponse { url }))
}

/// Inbound billing events. The signature check against the shared secret
/// gates everything; an unsigned body never reaches the parser.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Validation("Missing signature header".to_string()))?;

    let event = state.billing.verify_and_parse_event(&body, signature)?;

    match event {
        BillingEvent::CheckoutCompleted {
            user_id,
            subscription_ref,
            customer_ref,
        } => {
            let updated = state.db.mark_subscribed(
                &user_id.to_string(),
                subscription_ref.as_deref(),
                customer_ref.as_deref(),
                &now_ts(),
            )?;
            if updated {
                info!(%user_id, "subscription activated from checkout event");
            } else {
                // Acknowledge anyway so the provider stops retrying.
                warn!(%user_id, "checkout event for unknown user");
            }
        }
        BillingEvent::Ignored { kind } => {
            debug!(%kind, "ignoring billing event");
        }
    }

    Ok(Json(serde_json::json!({ "status": "success" })))
}
