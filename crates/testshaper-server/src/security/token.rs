//! Signed bearer tokens
//!
//! Tokens are HS256 JWTs signed with one process-wide secret. The lifetime is
//! policy-driven (`JWT_ACCESS_TOKEN_EXPIRY_MINUTES`, resolved for the
//! subject's tenant). Tokens are stateless; logout does not revoke them.

use super::error::AuthError;
use super::policy::PolicyCache;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use testshaper_core::{Clock, Error, Result, TenantId};

/// JWT Claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (login identifier)
    pub sub: String,
    /// Issued at, seconds since the epoch
    pub iat: i64,
    /// Expiry, seconds since the epoch
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl TokenClaims {
    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant.as_deref().map(TenantId::new)
    }
}

/// A freshly issued token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    pub access_token: String,
    pub token_type: String,
    /// Lifetime in seconds
    pub expires_in: i64,
    pub expires_at: DateTime<Utc>,
}

/// Issues and validates access tokens
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    policy: Arc<PolicyCache>,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    pub fn new(secret: &str, policy: Arc<PolicyCache>, clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            policy,
            clock,
        }
    }

    /// Issue a token for `subject` with a tenant-resolved lifetime
    pub fn issue(
        &self,
        subject: &str,
        roles: &[String],
        tenant: Option<&TenantId>,
    ) -> Result<IssuedToken> {
        let lifetime = self.policy.access_token_lifetime(tenant)?;
        let now = self.clock.now();
        let expires_at = now.checked_add_signed(lifetime).ok_or_else(|| {
            Error::Internal(format!("Token lifetime of {} overflows the clock", lifetime))
        })?;

        let claims = TokenClaims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            tenant: tenant.map(|t| t.as_str().to_string()),
            roles: roles.to_vec(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| Error::Internal(format!("Failed to sign token: {}", e)))?;

        Ok(IssuedToken {
            access_token: token,
            token_type: "Bearer".to_string(),
            expires_in: lifetime.num_seconds(),
            expires_at,
        })
    }

    /// Verify signature, algorithm, structure and expiry.
    ///
    /// Every failure is reported as [`AuthError::InvalidToken`].
    pub fn validate(&self, token: &str) -> std::result::Result<TokenClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against the injected clock below
        validation.validate_exp = false;

        let data = decode::<TokenClaims>(token, &self.decoding_key, &validation).map_err(|e| {
            tracing::debug!("Rejected token: {}", e);
            AuthError::InvalidToken
        })?;

        if self.clock.now().timestamp() >= data.claims.exp {
            tracing::debug!("Rejected expired token for {}", data.claims.sub);
            return Err(AuthError::InvalidToken);
        }

        Ok(data.claims)
    }

    /// Tokens are stateless; there is nothing to revoke.
    pub fn logout(&self, _token: &str) {}
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer").finish_non_exhaustive()
    }
}
