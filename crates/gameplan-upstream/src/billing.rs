use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::warn;
use uuid::Uuid;

use crate::UpstreamError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the webhook signature, `t=<unix>,v1=<hex>`.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingPlan {
    Monthly,
    Yearly,
}

impl BillingPlan {
    /// Maps the request's plan string; anything else is the caller's
    /// validation error.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "monthly" => Some(Self::Monthly),
            "yearly" => Some(Self::Yearly),
            _ => None,
        }
    }
}

/// The one webhook event the backend reacts to, plus a catch-all that is
/// acknowledged and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingEvent {
    CheckoutCompleted {
        user_id: Uuid,
        subscription_ref: Option<String>,
        customer_ref: Option<String>,
    },
    Ignored {
        kind: String,
    },
}

#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Hosted checkout page URL for the given plan.
    async fn create_checkout_session(
        &self,
        user_id: Uuid,
        email: &str,
        plan: BillingPlan,
    ) -> Result<String, UpstreamError>;

    /// Hosted subscription-management portal URL.
    async fn create_portal_session(&self, customer_ref: &str) -> Result<String, UpstreamError>;

    /// Authenticate an inbound webhook against the shared secret and parse
    /// it. The signature check comes first; an unsigned payload is never
    /// inspected.
    fn verify_and_parse_event(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<BillingEvent, UpstreamError>;
}

#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub api_base: String,
    pub secret_key: String,
    pub webhook_secret: String,
    pub price_monthly: String,
    pub price_yearly: String,
    pub success_url: String,
    pub cancel_url: String,
    pub return_url: String,
    pub timeout: Duration,
}

/// Talks to the payment provider's REST API directly: form-encoded requests,
/// bearer-authenticated with the account's secret key.
pub struct HttpBillingProvider {
    client: reqwest::Client,
    config: BillingConfig,
}

impl HttpBillingProvider {
    pub fn new(config: BillingConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| UpstreamError::Billing(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn price_for(&self, plan: BillingPlan) -> &str {
        match plan {
            BillingPlan::Monthly => &self.config.price_monthly,
            BillingPlan::Yearly => &self.config.price_yearly,
        }
    }
}

#[async_trait]
impl BillingProvider for HttpBillingProvider {
    async fn create_checkout_session(
        &self,
        user_id: Uuid,
        email: &str,
        plan: BillingPlan,
    ) -> Result<String, UpstreamError> {
        let user_id = user_id.to_string();
        let form: Vec<(&str, &str)> = vec![
            ("mode", "subscription"),
            ("success_url", &self.config.success_url),
            ("cancel_url", &self.config.cancel_url),
            ("line_items[0][price]", self.price_for(plan)),
            ("line_items[0][quantity]", "1"),
            ("customer_email", email),
            ("metadata[user_id]", &user_id),
        ];

        let url = format!("{}/v1/checkout/sessions", self.config.api_base);
        let session: HostedSession = post_form(&self.client, &url, &self.config.secret_key, &form).await?;
        Ok(session.url)
    }

    async fn create_portal_session(&self, customer_ref: &str) -> Result<String, UpstreamError> {
        let form: Vec<(&str, &str)> = vec![
            ("customer", customer_ref),
            ("return_url", &self.config.return_url),
        ];

        let url = format!("{}/v1/billing_portal/sessions", self.config.api_base);
        let session: HostedSession = post_form(&self.client, &url, &self.config.secret_key, &form).await?;
        Ok(session.url)
    }

    fn verify_and_parse_event(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<BillingEvent, UpstreamError> {
        verify_signature(&self.config.webhook_secret, payload, signature_header)?;

        let event: WebhookEvent =
            serde_json::from_slice(payload).map_err(|_| UpstreamError::InvalidPayload)?;

        if event.kind != CHECKOUT_COMPLETED {
            return Ok(BillingEvent::Ignored { kind: event.kind });
        }

        let object = event.data.object;
        let user_id = object
            .metadata
            .get("user_id")
            .and_then(|v| v.parse::<Uuid>().ok())
            .ok_or(UpstreamError::InvalidPayload)?;

        Ok(BillingEvent::CheckoutCompleted {
            user_id,
            subscription_ref: object.subscription,
            customer_ref: object.customer,
        })
    }
}

async fn post_form<T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    secret_key: &str,
    form: &[(&str, &str)],
) -> Result<T, UpstreamError> {
    let response = client
        .post(url)
        .bearer_auth(secret_key)
        .form(form)
        .send()
        .await
        .map_err(|e| UpstreamError::Billing(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        warn!(%url, %status, "billing provider rejected request");
        return Err(UpstreamError::Billing(format!("provider returned {status}")));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| UpstreamError::Billing(e.to_string()))
}

/// Check `t=<unix>,v1=<hex>` against HMAC-SHA256 of `"{t}.{payload}"`.
/// Comparison is constant-time via the hmac crate.
fn verify_signature(secret: &str, payload: &[u8], header: &str) -> Result<(), UpstreamError> {
    let mut timestamp = None;
    let mut signature = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = Some(v),
            Some(("v1", v)) => signature = Some(v),
            _ => {}
        }
    }
    let (timestamp, signature) = match (timestamp, signature) {
        (Some(t), Some(s)) => (t, s),
        _ => return Err(UpstreamError::InvalidSignature),
    };

    let expected = hex::decode(signature).map_err(|_| UpstreamError::InvalidSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| UpstreamError::InvalidSignature)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac.verify_slice(&expected)
        .map_err(|_| UpstreamError::InvalidSignature)
}

/// Produce a signature header for a payload. The webhook tests (and any
/// local event replay) sign with this.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let digest = hex::encode(mac.finalize().into_bytes());
    format!("t={timestamp},v1={digest}")
}

#[derive(Debug, Deserialize)]
struct HostedSession {
    url: String,
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    #[serde(rename = "type")]
    kind: String,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    object: WebhookObject,
}

#[derive(Debug, Deserialize)]
struct WebhookObject {
    #[serde(default)]
    metadata: HashMap<String, String>,
    subscription: Option<String>,
    customer: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";

    fn checkout_payload(user_id: Uuid) -> String {
        serde_json::json!({
            "type": "checkout.session.completed",
            "data": {
                "object": {
                    "metadata": { "user_id": user_id.to_string() },
                    "subscription": "sub_123",
                    "customer": "cus_456"
                }
            }
        })
        .to_string()
    }

    fn test_provider() -> HttpBillingProvider {
        HttpBillingProvider::new(BillingConfig {
            api_base: "http://127.0.0.1:0".to_string(),
            secret_key: "sk_test".to_string(),
            webhook_secret: SECRET.to_string(),
            price_monthly: "price_m".to_string(),
            price_yearly: "price_y".to_string(),
            success_url: "http://localhost/ok".to_string(),
            cancel_url: "http://localhost/cancel".to_string(),
            return_url: "http://localhost/profile".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn signed_checkout_event_parses() {
        let provider = test_provider();
        let user_id = Uuid::new_v4();
        let payload = checkout_payload(user_id);
        let header = sign_payload(SECRET, chrono::Utc::now().timestamp(), payload.as_bytes());

        let event = provider
            .verify_and_parse_event(payload.as_bytes(), &header)
            .unwrap();
        assert_eq!(
            event,
            BillingEvent::CheckoutCompleted {
                user_id,
                subscription_ref: Some("sub_123".to_string()),
                customer_ref: Some("cus_456".to_string()),
            }
        );
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let provider = test_provider();
        let payload = checkout_payload(Uuid::new_v4());
        let header = sign_payload("whsec_other", 1_700_000_000, payload.as_bytes());

        assert!(matches!(
            provider.verify_and_parse_event(payload.as_bytes(), &header),
            Err(UpstreamError::InvalidSignature)
        ));
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let provider = test_provider();
        let payload = checkout_payload(Uuid::new_v4());
        let header = sign_payload(SECRET, 1_700_000_000, payload.as_bytes());

        let tampered = payload.replace("sub_123", "sub_evil");
        assert!(matches!(
            provider.verify_and_parse_event(tampered.as_bytes(), &header),
            Err(UpstreamError::InvalidSignature)
        ));
    }

    #[test]
    fn malformed_header_fails_verification() {
        let provider = test_provider();
        let payload = checkout_payload(Uuid::new_v4());

        for header in ["", "t=123", "v1=abcd", "nonsense", "t=1,v1=zz"] {
            assert!(matches!(
                provider.verify_and_parse_event(payload.as_bytes(), header),
                Err(UpstreamError::InvalidSignature)
            ));
        }
    }

    #[test]
    fn unhandled_event_types_are_ignored_not_errors() {
        let provider = test_provider();
        let payload = serde_json::json!({
            "type": "customer.subscription.deleted",
            "data": { "object": {} }
        })
        .to_string();
        let header = sign_payload(SECRET, 1_700_000_000, payload.as_bytes());

        let event = provider
            .verify_and_parse_event(payload.as_bytes(), &header)
            .unwrap();
        assert_eq!(
            event,
            BillingEvent::Ignored {
                kind: "customer.subscription.deleted".to_string()
            }
        );
    }

    #[test]
    fn checkout_without_user_id_is_invalid() {
        let provider = test_provider();
        let payload = serde_json::json!({
            "type": "checkout.session.completed",
            "data": { "object": { "metadata": {} } }
        })
        .to_string();
        let header = sign_payload(SECRET, 1_700_000_000, payload.as_bytes());

        assert!(matches!(
            provider.verify_and_parse_event(payload.as_bytes(), &header),
            Err(UpstreamError::InvalidPayload)
        ));
    }

    #[test]
    fn plan_parsing() {
        assert_eq!(BillingPlan::parse("monthly"), Some(BillingPlan::Monthly));
        assert_eq!(BillingPlan::parse("yearly"), Some(BillingPlan::Yearly));
        assert_eq!(BillingPlan::parse("weekly"), None);
    }
}
