use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AuthError;

/// What a token is good for. Carried in the claims so a refresh token can
/// never be presented as an access token or the other way around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iat: usize,
    pub exp: usize,
    #[serde(rename = "use")]
    pub kind: TokenUse,
}

pub fn mint(secret: &str, user_id: Uuid, kind: TokenUse, ttl: Duration) -> Result<String, AuthError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        iat: now.timestamp() as usize,
        exp: (now + ttl).timestamp() as usize,
        kind,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::Internal(anyhow::anyhow!("token encoding failed: {e}")))
}

/// Signature, expiry, and token-use check. Everything wrong collapses into
/// Unauthorized so callers leak nothing about which check failed.
pub fn verify(secret: &str, token: &str, expected: TokenUse) -> Result<Claims, AuthError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AuthError::Unauthorized)?;

    if data.claims.kind != expected {
        return Err(AuthError::Unauthorized);
    }

    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn mint_and_verify_roundtrip() {
        let user_id = Uuid::new_v4();
        let token = mint(SECRET, user_id, TokenUse::Access, Duration::minutes(60)).unwrap();

        let claims = verify(SECRET, &token, TokenUse::Access).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.kind, TokenUse::Access);
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let token = mint(SECRET, Uuid::new_v4(), TokenUse::Refresh, Duration::days(7)).unwrap();

        assert!(verify(SECRET, &token, TokenUse::Refresh).is_ok());
        assert!(matches!(
            verify(SECRET, &token, TokenUse::Access),
            Err(AuthError::Unauthorized)
        ));
    }

    #[test]
    fn expired_token_rejected() {
        // Well past the validator's default leeway.
        let token = mint(SECRET, Uuid::new_v4(), TokenUse::Access, Duration::minutes(-10)).unwrap();
        assert!(matches!(
            verify(SECRET, &token, TokenUse::Access),
            Err(AuthError::Unauthorized)
        ));
    }

    #[test]
    fn wrong_secret_rejected() {
        let token = mint(SECRET, Uuid::new_v4(), TokenUse::Access, Duration::minutes(60)).unwrap();
        assert!(verify("other-secret", &token, TokenUse::Access).is_err());
    }

    #[test]
    fn garbage_rejected() {
        assert!(verify(SECRET, "not.a.token", TokenUse::Access).is_err());
    }
}
