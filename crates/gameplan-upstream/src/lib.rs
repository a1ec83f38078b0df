//! Capability interfaces for the external collaborators: the billing
//! provider, the AI reply generator, and reset-code mail delivery. The core
//! only ever talks to these traits; the HTTP implementations live beside
//! them so any concrete vendor can be swapped out.

pub mod billing;
pub mod mailer;
pub mod reply;

pub use billing::{BillingConfig, BillingEvent, BillingPlan, BillingProvider, HttpBillingProvider};
pub use mailer::{LogMailer, Mailer};
pub use reply::{HttpReplyGenerator, ReplyConfig, ReplyGenerator};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Outbound billing call failed or came back unusable.
    #[error("billing provider error: {0}")]
    Billing(String),

    /// Outbound reply generation failed, timed out, or came back empty.
    #[error("reply generation failed: {0}")]
    Reply(String),

    /// Webhook body that does not parse into a known event shape.
    #[error("invalid webhook payload")]
    InvalidPayload,

    /// Webhook signature missing or failing verification.
    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error("mail delivery failed: {0}")]
    Mail(String),
}
