//! Signed, time-boxed tokens
//!
//! One signer issues every token the service hands out: email confirmation,
//! password reset and API access. Each token binds an identity id to a
//! purpose and an expiry.
//!
//! Security notes:
//! - Tokens are signed with HS256 (HMAC-SHA256)
//! - Tokens are stateless: there is no revocation list, and issuing a new
//!   token leaves earlier ones valid until their own expiry
//! - Expiry is checked here rather than by `jsonwebtoken` so there is no leeway:
//!   a token is valid strictly before `exp` and expired at or after it

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::types::WeblogError;

/// Signing secret used when DEV_MODE is set and no SECRET_KEY is given
pub const DEV_SECRET: &str = "dev-mode-secret-not-for-production-use-123456";

/// What a token may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenPurpose {
    /// Proves control of the account's email address
    ConfirmIdentity,
    /// Authorizes a password reset for the named account
    ResetPassword,
    /// Bearer credential for the JSON API
    ApiAccess,
}

impl fmt::Display for TokenPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenPurpose::ConfirmIdentity => write!(f, "confirm-identity"),
            TokenPurpose::ResetPassword => write!(f, "reset-password"),
            TokenPurpose::ApiAccess => write!(f, "api-access"),
        }
    }
}

/// Payload stored in the token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Identity id
    pub uid: i64,
    pub purpose: TokenPurpose,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Token generator and verifier
#[derive(Clone)]
pub struct TokenSigner {
    secret: String,
}

impl TokenSigner {
    /// Create a new signer
    ///
    /// Returns an error if the secret is empty or too short
    pub fn new(secret: String) -> Result<Self, WeblogError> {
        if secret.is_empty() {
            return Err(WeblogError::Config(
                "SECRET_KEY is required in production mode".into(),
            ));
        }

        if secret.len() < 32 {
            return Err(WeblogError::Config(
                "SECRET_KEY must be at least 32 characters".into(),
            ));
        }

        Ok(Self { secret })
    }

    /// Create a signer for dev mode
    pub fn new_dev() -> Self {
        Self {
            secret: DEV_SECRET.into(),
        }
    }

    /// Generate a token for `uid` valid for `ttl` from now
    pub fn generate_token(
        &self,
        uid: i64,
        purpose: TokenPurpose,
        ttl: Duration,
    ) -> Result<String, WeblogError> {
        self.generate_token_at(uid, purpose, ttl, unix_now()?)
    }

    /// Generate a token as if issued at `now` (Unix seconds)
    pub fn generate_token_at(
        &self,
        uid: i64,
        purpose: TokenPurpose,
        ttl: Duration,
        now: u64,
    ) -> Result<String, WeblogError> {
        let claims = Claims {
            uid,
            purpose,
            iat: now,
            exp: now.saturating_add(ttl.as_secs()),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| WeblogError::Internal(format!("Failed to generate token: {}", e)))
    }

    /// Verify signature and expiry, returning the claims
    pub fn verify_token(&self, token: &str) -> Result<Claims, WeblogError> {
        self.verify_token_at(token, unix_now()?)
    }

    /// Verify as of `now` (Unix seconds)
    pub fn verify_token_at(&self, token: &str, now: u64) -> Result<Claims, WeblogError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|err| {
            use jsonwebtoken::errors::ErrorKind;
            match err.kind() {
                ErrorKind::ExpiredSignature => WeblogError::TokenExpired,
                ErrorKind::InvalidSignature => WeblogError::TokenInvalid("Invalid signature".into()),
                _ => WeblogError::TokenInvalid("Malformed token".into()),
            }
        })?;

        if now >= data.claims.exp {
            return Err(WeblogError::TokenExpired);
        }

        Ok(data.claims)
    }

    /// Verify a token and require a specific purpose, returning the identity id
    pub fn verify_purpose(&self, token: &str, purpose: TokenPurpose) -> Result<i64, WeblogError> {
        let claims = self.verify_token(token)?;
        if claims.purpose != purpose {
            return Err(WeblogError::TokenInvalid(format!(
                "token issued for {}, not {}",
                claims.purpose, purpose
            )));
        }
        Ok(claims.uid)
    }
}

fn unix_now() -> Result<u64, WeblogError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| WeblogError::Internal(format!("System time error: {}", e)))
}

/// Extract token from Authorization header.
/// Supports "Bearer <token>" format and raw tokens.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;

    if let Some(token) = header.strip_prefix("Bearer ") {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    if !header.contains(' ') {
        let token = header.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    fn test_signer() -> TokenSigner {
        TokenSigner::new("test-secret-that-is-at-least-32-characters-long".into()).unwrap()
    }

    #[test]
    fn test_generate_and_verify_token() {
        let signer = test_signer();
        let token = signer
            .generate_token(42, TokenPurpose::ConfirmIdentity, HOUR)
            .unwrap();

        let claims = signer.verify_token(&token).unwrap();
        assert_eq!(claims.uid, 42);
        assert_eq!(claims.purpose, TokenPurpose::ConfirmIdentity);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_expiry_boundary() {
        let signer = test_signer();
        let issued = 1_700_000_000;
        let token = signer
            .generate_token_at(7, TokenPurpose::ConfirmIdentity, HOUR, issued)
            .unwrap();

        assert!(signer.verify_token_at(&token, issued).is_ok());
        assert!(signer.verify_token_at(&token, issued + 3599).is_ok());
        assert!(matches!(
            signer.verify_token_at(&token, issued + 3600),
            Err(WeblogError::TokenExpired)
        ));
        assert!(matches!(
            signer.verify_token_at(&token, issued + 7200),
            Err(WeblogError::TokenExpired)
        ));
    }

    #[test]
    fn test_invalid_token() {
        let signer = test_signer();
        assert!(matches!(
            signer.verify_token("invalid-token"),
            Err(WeblogError::TokenInvalid(_))
        ));
    }

    #[test]
    fn test_wrong_secret() {
        let signer1 = test_signer();
        let signer2 =
            TokenSigner::new("different-secret-that-is-at-least-32-characters".into()).unwrap();

        let token = signer1
            .generate_token(1, TokenPurpose::ApiAccess, HOUR)
            .unwrap();
        assert!(matches!(
            signer2.verify_token(&token),
            Err(WeblogError::TokenInvalid(_))
        ));
    }

    #[test]
    fn test_dev_signer_matches_dev_secret() {
        let dev = TokenSigner::new_dev();
        let configured = TokenSigner::new(DEV_SECRET.to_string()).unwrap();
        let token = dev
            .generate_token(3, TokenPurpose::ApiAccess, Duration::from_secs(60))
            .unwrap();
        assert_eq!(configured.verify_purpose(&token, TokenPurpose::ApiAccess).unwrap(), 3);
    }

    #[test]
    fn test_purpose_mismatch() {
        let signer = test_signer();
        let token = signer
            .generate_token(1, TokenPurpose::ResetPassword, HOUR)
            .unwrap();
        assert_eq!(signer.verify_purpose(&token, TokenPurpose::ResetPassword).unwrap(), 1);
        assert!(matches!(
            signer.verify_purpose(&token, TokenPurpose::ConfirmIdentity),
            Err(WeblogError::TokenInvalid(_))
        ));
    }

    #[test]
    fn test_reissue_keeps_old_tokens_valid() {
        let signer = test_signer();
        let first = signer
            .generate_token_at(3, TokenPurpose::ConfirmIdentity, HOUR, 100)
            .unwrap();
        let second = signer
            .generate_token_at(3, TokenPurpose::ConfirmIdentity, HOUR, 200)
            .unwrap();
        assert!(signer.verify_token_at(&first, 250).is_ok());
        assert!(signer.verify_token_at(&second, 250).is_ok());
    }

    #[test]
    fn test_extract_token_from_header() {
        assert_eq!(
            extract_token_from_header(Some("Bearer abc123")),
            Some("abc123")
        );
        assert_eq!(extract_token_from_header(Some("abc123")), Some("abc123"));
        assert_eq!(extract_token_from_header(None), None);
        assert_eq!(extract_token_from_header(Some("")), None);
        assert_eq!(extract_token_from_header(Some("Bearer ")), None);
        assert_eq!(extract_token_from_header(Some("Basic abc123")), None);
    }

    #[test]
    fn test_secret_validation() {
        assert!(TokenSigner::new("short".into()).is_err());
        assert!(TokenSigner::new("".into()).is_err());
        assert!(TokenSigner::new("this-secret-is-at-least-32-chars-long".into()).is_ok());
    }
}
