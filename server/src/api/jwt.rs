use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub code: String,                 // Invite code the session was opened with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_address: Option<String>, // Bound once the code is consumed
    pub expires: i64,                 // Unix seconds
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session expired")]
    Expired,

    #[error("Invalid session")]
    Invalid,

    #[error("No session")]
    Missing,
}

/// Signs and verifies the session cookie with the invite code key.
pub struct SessionManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    ttl: Duration,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("algorithm", &self.algorithm)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl SessionManager {
    pub fn new(secret: &str, ttl: std::time::Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            algorithm: Algorithm::HS256,
            ttl: Duration::from_std(ttl).unwrap_or(Duration::hours(1)),
        }
    }

    pub fn claims_for(&self, code: &str, user_address: Option<&str>) -> Claims {
        Claims {
            code: code.to_string(),
            user_address: user_address.map(|a| a.to_lowercase()),
            expires: (Utc::now() + self.ttl).timestamp(),
        }
    }

    pub fn issue(&self, claims: &Claims) -> Result<String> {
        let header = Header::new(self.algorithm);
        encode(&header, claims, &self.encoding_key).context("Failed to encode session token")
    }

    /// Re-issues `claims` with a fresh expiry.
    pub fn refresh(&self, claims: &Claims) -> Result<(Claims, String)> {
        let refreshed = Claims {
            expires: (Utc::now() + self.ttl).timestamp(),
            ..claims.clone()
        };
        let token = self.issue(&refreshed)?;
        Ok((refreshed, token))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, SessionError> {
        // Expiry lives in `expires`, not the registered `exp` claim.
        let mut validation = Validation::new(self.algorithm);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| SessionError::Invalid)?
            .claims;
        if claims.expires <= Utc::now().timestamp() {
            return Err(SessionError::Expired);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SessionManager {
        SessionManager::new("test-key", std::time::Duration::from_secs(60))
    }

    #[test]
    fn issued_tokens_verify() {
        let sessions = manager();
        let claims = sessions.claims_for("AB12CD", Some("0xABC"));
        let token = sessions.issue(&claims).unwrap();
        let verified = sessions.verify(&token).unwrap();
        assert_eq!(verified, claims);
        assert_eq!(verified.user_address.as_deref(), Some("0xabc"));
    }

    #[test]
    fn other_keys_are_rejected() {
        let token = manager().issue(&manager().claims_for("AB12CD", None)).unwrap();
        let other = SessionManager::new("other-key", std::time::Duration::from_secs(60));
        assert!(matches!(other.verify(&token), Err(SessionError::Invalid)));
    }

    #[test]
    fn expired_sessions_are_rejected() {
        let sessions = manager();
        let claims = Claims {
            expires: Utc::now().timestamp() - 1,
            ..sessions.claims_for("AB12CD", None)
        };
        let token = sessions.issue(&claims).unwrap();
        assert!(matches!(sessions.verify(&token), Err(SessionError::Expired)));
    }

    #[test]
    fn refresh_extends_expiry() {
        let sessions = manager();
        let stale = Claims {
            expires: Utc::now().timestamp() + 5,
            ..sessions.claims_for("AB12CD", Some("0xabc"))
        };
        let (fresh, token) = sessions.refresh(&stale).unwrap();
        assert!(fresh.expires > stale.expires);
        assert_eq!(fresh.user_address, stale.user_address);
        assert_eq!(sessions.verify(&token).unwrap(), fresh);
    }
}
