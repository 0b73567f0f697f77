use std::time::Duration;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::{
    auth::{
        claims::{AccessClaims, RefreshClaims, TokenKind},
        dto::{PublicUser, TokenPair},
    },
    config::JwtConfig,
    error::{AppError, AppResult},
};

/// HS256 is the only accepted algorithm; the header's `alg` is never trusted.
const ALGORITHM: Algorithm = Algorithm::HS256;

/// Signs and verifies access and refresh JWTs. The two kinds use separate
/// secrets, so one leaked key cannot mint the other kind of token.
#[derive(Clone)]
pub struct JwtKeys {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(cfg.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(cfg.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(cfg.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(cfg.refresh_secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: Duration::from_secs((cfg.ttl_minutes.max(0) as u64) * 60),
            refresh_ttl: Duration::from_secs((cfg.refresh_ttl_minutes.max(0) as u64) * 60),
        }
    }

    fn window(now: OffsetDateTime, ttl: Duration) -> (usize, usize) {
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        (now.unix_timestamp() as usize, exp.unix_timestamp() as usize)
    }

    fn sign<C: Serialize>(claims: &C, key: &EncodingKey) -> AppResult<String> {
        encode(&Header::new(ALGORITHM), claims, key).map_err(|e| {
            error!(error = %e, "jwt encode failed");
            AppError::Internal("token signing failed".into())
        })
    }

    pub(crate) fn sign_access_at(&self, user: &PublicUser, now: OffsetDateTime) -> AppResult<String> {
        let (iat, exp) = Self::window(now, self.access_ttl);
        let claims = AccessClaims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role.clone(),
            iat,
            exp,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: Uuid::new_v4(),
            kind: TokenKind::Access,
        };
        Self::sign(&claims, &self.access_encoding)
    }

    pub(crate) fn sign_refresh_at(&self, user_id: Uuid, now: OffsetDateTime) -> AppResult<String> {
        let (iat, exp) = Self::window(now, self.refresh_ttl);
        let claims = RefreshClaims {
            sub: user_id,
            iat,
            exp,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: Uuid::new_v4(),
            kind: TokenKind::Refresh,
        };
        Self::sign(&claims, &self.refresh_encoding)
    }

    /// Issue a fresh access/refresh pair for `user`.
    pub fn issue(&self, user: &PublicUser) -> AppResult<TokenPair> {
        let now = OffsetDateTime::now_utc();
        let pair = TokenPair {
            access_token: self.sign_access_at(user, now)?,
            refresh_token: self.sign_refresh_at(user.id, now)?,
        };
        debug!(user_id = %user.id, "jwt pair issued");
        Ok(pair)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(ALGORITHM);
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        validation
    }

    fn decode_with<C: DeserializeOwned>(&self, token: &str, key: &DecodingKey) -> AppResult<C> {
        // Expired, forged and malformed all collapse into InvalidToken.
        decode::<C>(token, key, &self.validation())
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "jwt rejected");
                AppError::InvalidToken
            })
    }

    pub fn verify_access(&self, token: &str) -> AppResult<AccessClaims> {
        let claims: AccessClaims = self.decode_with(token, &self.access_decoding)?;
        if claims.kind != TokenKind::Access {
            return Err(AppError::InvalidToken);
        }
        debug!(user_id = %claims.sub, "access token verified");
        Ok(claims)
    }

    pub fn verify_refresh(&self, token: &str) -> AppResult<RefreshClaims> {
        let claims: RefreshClaims = self.decode_with(token, &self.refresh_decoding)?;
        if claims.kind != TokenKind::Refresh {
            return Err(AppError::InvalidToken);
        }
        debug!(user_id = %claims.sub, "refresh token verified");
        Ok(claims)
    }
}

/// Extracts and validates a bearer access token, yielding the user ID.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Unauthorized)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .or_else(|| auth_header.strip_prefix("bearer "))
            .ok_or(AppError::Unauthorized)?;

        let claims = keys.verify_access(token).map_err(|e| {
            warn!("invalid or expired access token");
            e
        })?;

        Ok(AuthUser(claims.sub))
    }
}

#[cfg(test)]
pub(crate) fn test_keys() -> JwtKeys {
    JwtKeys::from_config(&JwtConfig {
        access_secret: "access-secret".into(),
        refresh_secret: "refresh-secret".into(),
        issuer: "test-issuer".into(),
        audience: "test-aud".into(),
        ttl_minutes: 5,
        refresh_ttl_minutes: 60,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> PublicUser {
        PublicUser {
            id: Uuid::new_v4(),
            email: "jane@x.com".into(),
            role: "user".into(),
            name: "Jane".into(),
            surname: "Doe".into(),
        }
    }

    #[test]
    fn issue_and_verify_access_token() {
        let keys = test_keys();
        let user = user();
        let pair = keys.issue(&user).expect("issue");
        let claims = keys.verify_access(&pair.access_token).expect("verify access");
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.email, "jane@x.com");
        assert_eq!(claims.role, "user");
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.kind, TokenKind::Access);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn refresh_token_roundtrips_subject() {
        let keys = test_keys();
        let user = user();
        let pair = keys.issue(&user).expect("issue");
        let claims = keys.verify_refresh(&pair.refresh_token).expect("verify refresh");
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.kind, TokenKind::Refresh);
    }

    #[test]
    fn consecutive_pairs_differ() {
        let keys = test_keys();
        let user = user();
        let a = keys.issue(&user).unwrap();
        let b = keys.issue(&user).unwrap();
        assert_ne!(a.refresh_token, b.refresh_token);
        assert_ne!(a.access_token, b.access_token);
    }

    #[test]
    fn token_kinds_are_not_interchangeable() {
        let keys = test_keys();
        let pair = keys.issue(&user()).unwrap();
        assert!(matches!(
            keys.verify_refresh(&pair.access_token),
            Err(AppError::InvalidToken)
        ));
        assert!(matches!(
            keys.verify_access(&pair.refresh_token),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn expired_and_forged_tokens_fail_the_same_way() {
        let keys = test_keys();
        let user = user();
        let past = OffsetDateTime::now_utc() - TimeDuration::days(2);
        let expired = keys.sign_refresh_at(user.id, past).unwrap();

        let mut forged = keys.issue(&user).unwrap().refresh_token;
        forged.push('x');

        let expired_err = keys.verify_refresh(&expired).unwrap_err();
        let forged_err = keys.verify_refresh(&forged).unwrap_err();
        assert!(matches!(expired_err, AppError::InvalidToken));
        assert!(matches!(forged_err, AppError::InvalidToken));
        assert_eq!(expired_err.to_string(), forged_err.to_string());
    }

    #[test]
    fn rejects_garbage_and_foreign_keys() {
        let keys = test_keys();
        assert!(keys.verify_access("not.a.jwt").is_err());
        assert!(keys.verify_access("").is_err());

        let other = JwtKeys::from_config(&JwtConfig {
            access_secret: "other-access".into(),
            refresh_secret: "other-refresh".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            ttl_minutes: 5,
            refresh_ttl_minutes: 60,
        });
        let pair = other.issue(&user()).unwrap();
        assert!(keys.verify_access(&pair.access_token).is_err());
        assert!(keys.verify_refresh(&pair.refresh_token).is_err());
    }

    #[test]
    fn rejects_unsigned_alg_none_token() {
        let keys = test_keys();
        let user = user();
        let pair = keys.issue(&user).unwrap();
        let payload = pair.access_token.split('.').nth(1).unwrap().to_string();
        // {"alg":"none","typ":"JWT"}
        let unsigned = format!("eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.{payload}.");
        assert!(matches!(
            keys.verify_access(&unsigned),
            Err(AppError::InvalidToken)
        ));
    }
}
