pub mod password;
pub mod service;
pub mod tokens;

pub use service::{AuthConfig, AuthService, DeviceInfo, TokenPair};
pub use tokens::{Claims, TokenUse};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Same error for unknown email and wrong password.
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Missing, malformed, expired, or revoked credential.
    #[error("Invalid or expired token")]
    Unauthorized,

    /// Revoke of a refresh token that has no session record.
    #[error("Refresh token not found")]
    SessionNotFound,

    #[error("Invalid or expired verification code")]
    InvalidResetCode,

    #[error("Email not found")]
    UnknownEmail,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
