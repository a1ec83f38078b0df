use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rand::Rng;
use tracing::debug;
use uuid::Uuid;

use gameplan_db::models::{SessionRow, UserRow};
use gameplan_db::{now_ts, Database};

use crate::password::{burn_verification, hash_password, verify_password};
use crate::tokens::{self, TokenUse};
use crate::AuthError;

/// Reset codes outlive their request by this long.
const RESET_CODE_TTL_MINUTES: i64 = 15;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Access token lifetime, minutes-to-hours scale.
    pub access_ttl: Duration,
    /// Refresh token and session lifetime, days scale.
    pub refresh_ttl: Duration,
    /// When set, every refresh replaces the stored refresh token.
    pub rotate_refresh: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "dev-secret-change-me".to_string(),
            access_ttl: Duration::minutes(60),
            refresh_ttl: Duration::days(7),
            rotate_refresh: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Issues, verifies, rotates, and expires authentication credentials.
/// Session records live in the database; this service owns their lifecycle.
pub struct AuthService {
    config: AuthConfig,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Password check against the stored Argon2 hash. Unknown email and
    /// wrong password return the identical error.
    pub fn authenticate(
        &self,
        db: &Database,
        email: &str,
        password: &str,
    ) -> Result<UserRow, AuthError> {
        match db.get_user_by_email(email)? {
            Some(user) if verify_password(password, &user.password_hash) => Ok(user),
            Some(_) => Err(AuthError::InvalidCredentials),
            None => {
                // Equalize cost with the wrong-password path.
                burn_verification(password);
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    /// Mint an access/refresh pair and persist the refresh session.
    /// Already-expired sessions of this user are reaped first — expiry has
    /// no background sweep.
    pub fn issue_session(
        &self,
        db: &Database,
        user_id: Uuid,
        device: DeviceInfo,
    ) -> Result<TokenPair, AuthError> {
        let reaped = db.delete_expired_sessions(&user_id.to_string(), &now_ts())?;
        if reaped > 0 {
            debug!(%user_id, reaped, "reaped expired sessions");
        }

        let access_token = tokens::mint(
            &self.config.jwt_secret,
            user_id,
            TokenUse::Access,
            self.config.access_ttl,
        )?;
        let refresh_token = tokens::mint(
            &self.config.jwt_secret,
            user_id,
            TokenUse::Refresh,
            self.config.refresh_ttl,
        )?;

        let now = Utc::now();
        db.create_session(&SessionRow {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            refresh_token: refresh_token.clone(),
            user_agent: device.user_agent,
            ip_address: device.ip_address,
            created_at: fmt_ts(now),
            expires_at: fmt_ts(now + self.config.refresh_ttl),
        })?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Stateless check plus one lookup: the claimed identity must still
    /// resolve to a user row.
    pub fn verify_access(&self, db: &Database, token: &str) -> Result<UserRow, AuthError> {
        let claims = tokens::verify(&self.config.jwt_secret, token, TokenUse::Access)?;
        db.get_user_by_id(&claims.sub.to_string())?
            .ok_or(AuthError::Unauthorized)
    }

    /// A refresh token must be cryptographically valid AND still backed by a
    /// live session record — logout kills it regardless of its expiry claim.
    pub fn refresh(&self, db: &Database, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = tokens::verify(&self.config.jwt_secret, refresh_token, TokenUse::Refresh)?;

        let session = db
            .get_active_session(refresh_token, &now_ts())?
            .ok_or(AuthError::Unauthorized)?;
        if session.user_id != claims.sub.to_string() {
            return Err(AuthError::Unauthorized);
        }

        let access_token = tokens::mint(
            &self.config.jwt_secret,
            claims.sub,
            TokenUse::Access,
            self.config.access_ttl,
        )?;

        let refresh_out = if self.config.rotate_refresh {
            let rotated = tokens::mint(
                &self.config.jwt_secret,
                claims.sub,
                TokenUse::Refresh,
                self.config.refresh_ttl,
            )?;
            db.rotate_session_token(
                refresh_token,
                &rotated,
                &fmt_ts(Utc::now() + self.config.refresh_ttl),
            )?;
            rotated
        } else {
            refresh_token.to_string()
        };

        Ok(TokenPair {
            access_token,
            refresh_token: refresh_out,
        })
    }

    /// Delete the session record. Revoking an unknown (or already revoked)
    /// token is an error, not a silent success.
    pub fn revoke(&self, db: &Database, refresh_token: &str) -> Result<(), AuthError> {
        if db.delete_session_by_token(refresh_token)? {
            Ok(())
        } else {
            Err(AuthError::SessionNotFound)
        }
    }

    // -- Password reset --

    /// Store a fresh single-use code for the email and hand it back for
    /// delivery. Replaces any previous code.
    pub fn start_reset(&self, db: &Database, email: &str) -> Result<String, AuthError> {
        if db.get_user_by_email(email)?.is_none() {
            return Err(AuthError::UnknownEmail);
        }

        let code = generate_code();
        let expires_at = fmt_ts(Utc::now() + Duration::minutes(RESET_CODE_TTL_MINUTES));
        db.upsert_reset_code(email, &code, &expires_at)?;
        Ok(code)
    }

    /// Validate without consuming, for the verify step of the flow.
    pub fn check_reset_code(&self, db: &Database, email: &str, code: &str) -> Result<(), AuthError> {
        let Some(row) = db.get_reset_code(email)? else {
            return Err(AuthError::InvalidResetCode);
        };
        if row.code != code || row.expires_at <= now_ts() {
            return Err(AuthError::InvalidResetCode);
        }
        Ok(())
    }

    /// Re-hash the password and consume the code; a second reset with the
    /// same code fails.
    pub fn reset_password(
        &self,
        db: &Database,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        self.check_reset_code(db, email, code)?;

        let hash = hash_password(new_password)?;
        if !db.update_password(email, &hash, &now_ts())? {
            return Err(AuthError::UnknownEmail);
        }
        db.delete_reset_code(email)?;
        Ok(())
    }
}

fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn generate_code() -> String {
    format!("{:06}", rand::rng().random_range(0..1_000_000u32))
}
