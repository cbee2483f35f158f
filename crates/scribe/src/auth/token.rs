//! Signed bearer tokens (HS256 JWT).
//!
//! Tokens are stateless: the claims carry enough identity for the
//! authorization gate to act without a store lookup. Expiry is checked here
//! against an explicit clock so the boundary is exact and testable.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use scribe_common::{IssuedToken, ScribeError, UserIdentity};
use serde::{Deserialize, Serialize};

/// Token claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id as string)
    pub sub: String,
    pub user_id: u64,
    pub username: String,
    pub email: String,
    pub iss: String,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expiry (Unix seconds)
    pub exp: i64,
    /// Issuance time of the first token in a refresh chain
    pub orig_iat: i64,
}

/// Token service configuration
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub issuer: String,
    pub ttl_secs: u64,
    pub refresh_window_secs: u64,
}

/// Mints and verifies bearer tokens
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    ttl_secs: i64,
    refresh_window_secs: i64,
}

impl TokenService {
    pub fn new(config: &TokenConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is compared in `verify_at` against the caller's clock, with no leeway.
        validation.validate_exp = false;
        validation.set_issuer(&[&config.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
            ttl_secs: config.ttl_secs as i64,
            refresh_window_secs: config.refresh_window_secs as i64,
        }
    }

    /// Mint a fresh token for `user`
    pub fn mint(&self, user: &UserIdentity) -> Result<IssuedToken, ScribeError> {
        let now = chrono::Utc::now().timestamp();
        self.mint_at(user, now, now)
    }

    /// Mint a token issued at `now`, belonging to a chain started at `orig_iat`
    pub fn mint_at(
        &self,
        user: &UserIdentity,
        now: i64,
        orig_iat: i64,
    ) -> Result<IssuedToken, ScribeError> {
        let claims = Claims {
            sub: user.id.to_string(),
            user_id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            iss: self.issuer.clone(),
            iat: now,
            exp: now + self.ttl_secs,
            orig_iat,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ScribeError::Internal(format!("token encoding failed: {}", e)))?;

        tracing::debug!(user_id = user.id, expires_at = claims.exp, "Minted token");

        Ok(IssuedToken {
            token,
            expires_at: claims.exp,
        })
    }

    /// Verify signature, issuer, and expiry against the wall clock
    pub fn verify(&self, token: &str) -> Result<Claims, ScribeError> {
        self.verify_at(token, chrono::Utc::now().timestamp())
    }

    /// Verify signature, issuer, and expiry against `now`.
    ///
    /// A token is accepted up to and including its `exp` second.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claims, ScribeError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => ScribeError::TokenExpired,
                _ => {
                    tracing::debug!(error = %e, "Rejected token");
                    ScribeError::TokenInvalid
                }
            }
        })?;

        let claims = data.claims;
        if claims.sub != claims.user_id.to_string() {
            return Err(ScribeError::TokenInvalid);
        }
        if now > claims.exp {
            return Err(ScribeError::TokenExpired);
        }

        Ok(claims)
    }

    /// Check that a verified token may still be exchanged for a new one.
    ///
    /// The chain as a whole expires `refresh_window_secs` after `orig_iat`.
    pub fn check_refreshable(&self, claims: &Claims, now: i64) -> Result<(), ScribeError> {
        if now > claims.orig_iat + self.refresh_window_secs {
            return Err(ScribeError::TokenExpired);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use scribe_common::NewUser;

    fn config(secret: &str) -> TokenConfig {
        TokenConfig {
            secret: secret.to_string(),
            issuer: "scribe".to_string(),
            ttl_secs: 300,
            refresh_window_secs: 3600,
        }
    }

    fn user() -> UserIdentity {
        NewUser {
            username: "alice".into(),
            telephone: "13800000000".into(),
            email: "a@b.com".into(),
            password_hash: "x".into(),
            is_active: true,
            is_staff: false,
            is_superuser: false,
            date_joined: Utc::now(),
        }
        .with_id(42)
    }

    #[test]
    fn test_mint_and_verify() {
        let service = TokenService::new(&config("test_secret_key"));
        let issued = service.mint(&user()).unwrap();

        let claims = service.verify(&issued.token).unwrap();
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.exp, issued.expires_at);
        assert_eq!(claims.orig_iat, claims.iat);
    }

    #[test]
    fn test_expiry_boundary() {
        let service = TokenService::new(&config("test_secret_key"));
        let issued_at = 1_700_000_000;
        let issued = service.mint_at(&user(), issued_at, issued_at).unwrap();
        let t = issued.expires_at;

        assert!(service.verify_at(&issued.token, t - 1).is_ok());
        assert!(service.verify_at(&issued.token, t).is_ok());
        assert!(matches!(
            service.verify_at(&issued.token, t + 1),
            Err(ScribeError::TokenExpired)
        ));
    }

    #[test]
    fn test_wrong_secret() {
        let service1 = TokenService::new(&config("secret1"));
        let service2 = TokenService::new(&config("secret2"));

        let issued = service1.mint(&user()).unwrap();
        assert!(matches!(
            service2.verify(&issued.token),
            Err(ScribeError::TokenInvalid)
        ));
    }

    #[test]
    fn test_garbage_and_tampered_tokens() {
        let service = TokenService::new(&config("test_secret_key"));
        assert!(matches!(
            service.verify("invalid_token"),
            Err(ScribeError::TokenInvalid)
        ));

        // Graft another subject's payload onto a valid signature.
        let issued = service.mint(&user()).unwrap();
        let mut other_user = user();
        other_user.id = 1;
        let other = service.mint(&other_user).unwrap();

        let parts: Vec<&str> = issued.token.split('.').collect();
        let other_parts: Vec<&str> = other.token.split('.').collect();
        let tampered = format!("{}.{}.{}", parts[0], other_parts[1], parts[2]);
        assert!(matches!(
            service.verify(&tampered),
            Err(ScribeError::TokenInvalid)
        ));
    }

    #[test]
    fn test_wrong_issuer() {
        let service = TokenService::new(&config("shared"));
        let other = TokenService::new(&TokenConfig {
            issuer: "someone-else".into(),
            ..config("shared")
        });

        let issued = other.mint(&user()).unwrap();
        assert!(matches!(
            service.verify(&issued.token),
            Err(ScribeError::TokenInvalid)
        ));
    }

    #[test]
    fn test_refresh_window() {
        let service = TokenService::new(&config("test_secret_key"));
        let claims = Claims {
            sub: "1".into(),
            user_id: 1,
            username: "alice".into(),
            email: "a@b.com".into(),
            iss: "scribe".into(),
            iat: 1000,
            exp: 1300,
            orig_iat: 1000,
        };

        assert!(service.check_refreshable(&claims, 1000 + 3600).is_ok());
        assert!(matches!(
            service.check_refreshable(&claims, 1000 + 3601),
            Err(ScribeError::TokenExpired)
        ));
    }
}
