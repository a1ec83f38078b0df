use async_trait::async_trait;
use tracing::info;

use crate::UpstreamError;

/// Delivery of password-reset codes. Transport is out of scope here; the
/// default implementation just logs, which is what local development runs.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_reset_code(&self, email: &str, code: &str) -> Result<(), UpstreamError>;
}

pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_reset_code(&self, email: &str, code: &str) -> Result<(), UpstreamError> {
        info!(%email, %code, "password reset code issued");
        Ok(())
    }
}
