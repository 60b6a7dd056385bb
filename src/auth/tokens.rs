use base64ct::{Base64UrlUnpadded, Encoding};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation,
};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::{Claims, TokenKind};
use crate::config::JwtConfig;

const RESET_TOKEN_BYTES: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is invalid")]
    Invalid,
    #[error("token has expired")]
    Expired,
    #[error("wrong token kind")]
    WrongKind,
    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid,
        }
    }
}

#[derive(Clone)]
struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Single-use password reset token and the moment it stops being valid.
#[derive(Debug, Clone)]
pub struct ResetToken {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

/// Issues and verifies session JWTs and reset tokens. Built once at startup.
#[derive(Clone)]
pub struct TokenIssuer {
    access: KeyPair,
    refresh: KeyPair,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    reset_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            access: KeyPair::from_secret(config.access_secret.expose()),
            refresh: KeyPair::from_secret(config.refresh_secret.expose()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_ttl: Duration::minutes(config.access_ttl_minutes),
            refresh_ttl: Duration::minutes(config.refresh_ttl_minutes),
            reset_ttl: Duration::minutes(config.reset_ttl_minutes),
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    fn keys(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn sign_with_kind(&self, user_id: Uuid, kind: TokenKind) -> Result<String, TokenError> {
        let now = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: user_id,
            jti: Uuid::new_v4(),
            iat: now.unix_timestamp(),
            exp: (now + ttl).unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
        };
        let token = encode(&Header::default(), &claims, &self.keys(kind).encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        debug!(user_id = %user_id, kind = ?kind, "jwt signed");
        Ok(token)
    }

    pub fn sign_access(&self, user_id: Uuid) -> Result<String, TokenError> {
        self.sign_with_kind(user_id, TokenKind::Access)
    }

    pub fn sign_refresh(&self, user_id: Uuid) -> Result<String, TokenError> {
        self.sign_with_kind(user_id, TokenKind::Refresh)
    }

    fn verify_with_kind(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.keys(kind).decoding, &validation)?;
        if data.claims.kind != kind {
            return Err(TokenError::WrongKind);
        }
        debug!(user_id = %data.claims.sub, kind = ?kind, "jwt verified");
        Ok(data.claims)
    }

    /// Stateless check: signature, issuer, audience, expiry and kind.
    pub fn verify_access(&self, token: &str) -> Result<Uuid, TokenError> {
        self.verify_with_kind(token, TokenKind::Access)
            .map(|claims| claims.sub)
    }

    /// Stateless part of refresh verification; the caller still has to compare
    /// the token with the one stored on the user record.
    pub fn verify_refresh(&self, token: &str) -> Result<Uuid, TokenError> {
        self.verify_with_kind(token, TokenKind::Refresh)
            .map(|claims| claims.sub)
    }

    pub fn issue_reset_token(&self) -> ResetToken {
        let mut buffer = [0u8; RESET_TOKEN_BYTES];
        OsRng.fill_bytes(&mut buffer);
        ResetToken {
            token: Base64UrlUnpadded::encode_string(&buffer),
            expires_at: OffsetDateTime::now_utc() + self.reset_ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Secret;

    fn jwt_config(issuer: &str, audience: &str) -> JwtConfig {
        JwtConfig {
            access_secret: Secret::new("access-secret"),
            refresh_secret: Secret::new("refresh-secret"),
            issuer: issuer.into(),
            audience: audience.into(),
            access_ttl_minutes: 5,
            refresh_ttl_minutes: 60,
            reset_ttl_minutes: 30,
        }
    }

    fn make_issuer() -> TokenIssuer {
        TokenIssuer::new(&jwt_config("test-issuer", "test-aud"))
    }

    #[test]
    fn sign_and_verify_access_token() {
        let issuer = make_issuer();
        let user_id = Uuid::new_v4();
        let token = issuer.sign_access(user_id).expect("sign access");
        assert_eq!(issuer.verify_access(&token), Ok(user_id));
    }

    #[test]
    fn sign_and_verify_refresh_token() {
        let issuer = make_issuer();
        let user_id = Uuid::new_v4();
        let token = issuer.sign_refresh(user_id).expect("sign refresh");
        assert_eq!(issuer.verify_refresh(&token), Ok(user_id));
    }

    #[test]
    fn tokens_issued_back_to_back_differ() {
        let issuer = make_issuer();
        let user_id = Uuid::new_v4();
        let first = issuer.sign_refresh(user_id).expect("sign");
        let second = issuer.sign_refresh(user_id).expect("sign");
        assert_ne!(first, second);
    }

    #[test]
    fn access_and_refresh_are_not_interchangeable() {
        let issuer = make_issuer();
        let user_id = Uuid::new_v4();
        let access = issuer.sign_access(user_id).expect("sign access");
        let refresh = issuer.sign_refresh(user_id).expect("sign refresh");
        // Different secrets, so the signature check fails first.
        assert_eq!(issuer.verify_refresh(&access), Err(TokenError::Invalid));
        assert_eq!(issuer.verify_access(&refresh), Err(TokenError::Invalid));
    }

    #[test]
    fn kind_claim_is_checked_when_secrets_match() {
        let mut config = jwt_config("iss", "aud");
        config.refresh_secret = config.access_secret.clone();
        let issuer = TokenIssuer::new(&config);
        let access = issuer.sign_access(Uuid::new_v4()).expect("sign access");
        assert_eq!(issuer.verify_refresh(&access), Err(TokenError::WrongKind));
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let good = TokenIssuer::new(&jwt_config("good-iss", "good-aud"));
        let bad = TokenIssuer::new(&jwt_config("bad-iss", "bad-aud"));
        let token = good.sign_access(Uuid::new_v4()).expect("sign access");
        assert_eq!(bad.verify_access(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let mut config = jwt_config("iss", "aud");
        config.refresh_ttl_minutes = -10;
        let issuer = TokenIssuer::new(&config);
        let token = issuer.sign_refresh(Uuid::new_v4()).expect("sign refresh");
        assert_eq!(issuer.verify_refresh(&token), Err(TokenError::Expired));
    }

    #[test]
    fn garbage_is_invalid() {
        let issuer = make_issuer();
        assert_eq!(issuer.verify_access("not.a.jwt"), Err(TokenError::Invalid));
        assert_eq!(issuer.verify_refresh(""), Err(TokenError::Invalid));
    }

    #[test]
    fn reset_tokens_are_random_and_expire_in_the_future() {
        let issuer = make_issuer();
        let a = issuer.issue_reset_token();
        let b = issuer.issue_reset_token();
        assert_ne!(a.token, b.token);
        // 32 bytes, base64url without padding.
        assert_eq!(a.token.len(), 43);
        assert!(!a.token.contains('='));

        let now = OffsetDateTime::now_utc();
        assert!(a.expires_at > now);
        assert!(a.expires_at <= now + Duration::minutes(31));
    }
}
