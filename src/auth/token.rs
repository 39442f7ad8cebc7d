//! HS256 JWT verification.
//!
//! Tokens are issued by the user service with the user id in an `id`
//! claim; newer issuers use the registered `sub` claim. Both are accepted.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::error::AdmissionError;

/// Claims carried by an admission token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User identity the connection is admitted under.
    #[serde(alias = "id")]
    pub sub: String,
    /// Expiry, Unix seconds.
    pub exp: u64,
    /// Account email, if the issuer included it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Account role, if the issuer included it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Checks a bearer token and returns its claims.
pub trait TokenVerifier: Send + Sync + 'static {
    /// Verifies signature and expiry of `token`.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError`] when the token is empty, expired, or
    /// otherwise invalid.
    fn verify(&self, token: &str) -> Result<Claims, AdmissionError>;
}

/// [`TokenVerifier`] for HMAC-SHA256 signed JWTs sharing one secret.
#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// Creates a verifier for tokens signed with `secret`.
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("algorithms", &self.validation.algorithms)
            .finish_non_exhaustive()
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<Claims, AdmissionError> {
        if token.is_empty() {
            return Err(AdmissionError::MissingToken);
        }

        let claims = decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AdmissionError::Expired,
                _ => AdmissionError::Invalid(e.to_string()),
            })?;

        if claims.sub.trim().is_empty() {
            return Err(AdmissionError::Invalid("empty subject claim".to_string()));
        }
        Ok(claims)
    }
}
