use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Duration as ChronoDuration;

use gameplan_auth::AuthConfig;
use gameplan_upstream::{BillingConfig, ReplyConfig};

/// Everything the server reads from the environment, gathered in one place.
/// Secrets have development defaults; production sets them all.
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: String,
    pub auth: AuthConfig,
    pub billing: BillingConfig,
    pub reply: ReplyConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let host = env_or("GAMEPLAN_HOST", "0.0.0.0");
        let port: u16 = env_or("GAMEPLAN_PORT", "3000")
            .parse()
            .context("GAMEPLAN_PORT must be a port number")?;
        let db_path = env_or("GAMEPLAN_DB_PATH", "gameplan.db");

        let auth = AuthConfig {
            jwt_secret: env_or("GAMEPLAN_JWT_SECRET", "dev-secret-change-me"),
            access_ttl: ChronoDuration::minutes(parse_i64("GAMEPLAN_ACCESS_TTL_MINUTES", 60)?),
            refresh_ttl: ChronoDuration::days(parse_i64("GAMEPLAN_REFRESH_TTL_DAYS", 7)?),
            rotate_refresh: env_or("GAMEPLAN_ROTATE_REFRESH", "false") == "true",
        };

        let frontend = env_or("GAMEPLAN_FRONTEND_URL", "http://localhost:3000");
        let billing = BillingConfig {
            api_base: env_or("BILLING_API_BASE", "https://api.stripe.com"),
            secret_key: env_or("BILLING_SECRET_KEY", ""),
            webhook_secret: env_or("BILLING_WEBHOOK_SECRET", ""),
            price_monthly: env_or("BILLING_PRICE_MONTHLY", ""),
            price_yearly: env_or("BILLING_PRICE_YEARLY", ""),
            success_url: format!("{frontend}/subscription-success"),
            cancel_url: format!("{frontend}/subscription-cancelled"),
            return_url: format!("{frontend}/profile"),
            timeout: Duration::from_secs(parse_u64("BILLING_TIMEOUT_SECS", 10)?),
        };

        let reply = ReplyConfig {
            api_url: env_or("AI_API_URL", "https://api.openai.com/v1/chat/completions"),
            api_key: env_or("AI_API_KEY", ""),
            model: env_or("AI_MODEL", "gpt-4o-mini"),
            timeout: Duration::from_secs(parse_u64("AI_TIMEOUT_SECS", 30)?),
        };

        Ok(Self {
            host,
            port,
            db_path,
            auth,
            billing,
            reply,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_i64(key: &str, default: i64) -> Result<i64> {
    env_or(key, &default.to_string())
        .parse()
        .with_context(|| format!("{key} must be an integer"))
}

fn parse_u64(key: &str, default: u64) -> Result<u64> {
    env_or(key, &default.to_string())
        .parse()
        .with_context(|| format!("{key} must be a non-negative integer"))
}
