pub mod auth;
pub mod billing;
pub mod chats;
pub mod classes;
pub mod error;
pub mod middleware;
pub mod plans;
pub mod users;

use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

use gameplan_auth::AuthService;
use gameplan_db::Database;
use gameplan_upstream::{BillingProvider, Mailer, ReplyGenerator};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub auth: AuthService,
    pub billing: Arc<dyn BillingProvider>,
    pub replies: Arc<dyn ReplyGenerator>,
    pub mailer: Arc<dyn Mailer>,
}

pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/refresh", post(auth::refresh))
        .route(
            "/api/auth/forgot-password/request-code",
            post(auth::forgot_password_request),
        )
        .route(
            "/api/auth/forgot-password/verify-code",
            post(auth::forgot_password_verify),
        )
        .route(
            "/api/auth/forgot-password/reset",
            post(auth::forgot_password_reset),
        )
        .route("/api/billing/webhook", post(billing::webhook));

    let protected = Router::new()
        .route("/api/user/profile", get(users::profile))
        .route("/api/plans", post(plans::create_plan).get(plans::list_plans))
        .route("/api/plans/recent", get(plans::recent_plans))
        .route("/api/plans/last", get(plans::last_plan))
        .route(
            "/api/plans/{plan_id}",
            put(plans::update_plan).delete(plans::delete_plan),
        )
        .route(
            "/api/classes",
            post(classes::create_class).get(classes::list_classes),
        )
        .route(
            "/api/classes/{class_id}",
            get(classes::get_class)
                .put(classes::update_class)
                .delete(classes::delete_class),
        )
        .route(
            "/api/classes/{class_id}/plans/{plan_id}",
            post(classes::add_plan).delete(classes::remove_plan),
        )
        .route("/api/chats", get(chats::list_chats))
        .route("/api/chats/last", get(chats::last_chat))
        .route("/api/chats/messages", post(chats::send_message))
        .route("/api/chats/{chat_id}/messages", get(chats::get_chat_messages))
        .route("/api/billing/checkout-session", post(billing::checkout_session))
        .route("/api/billing/portal", post(billing::portal))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new().merge(public).merge(protected).with_state(state)
}

pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's own datetime() writes "YYYY-MM-DD HH:MM:SS" without a
            // timezone; treat it as UTC.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

pub(crate) fn parse_id(raw: &str) -> uuid::Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt id '{}': {}", raw, e);
        uuid::Uuid::default()
    })
}
