//! Authenticated caller identity

use super::token::TokenClaims;
use serde::{Deserialize, Serialize};
use testshaper_core::TenantId;

/// Role names carried in tokens
pub mod roles {
    pub const SUPER_ADMIN: &str = "SUPER_ADMIN";
    pub const INSTITUTE_ADMIN: &str = "INSTITUTE_ADMIN";
}

/// What request handlers need to know about the caller
pub trait AuthenticatedPrincipal {
    fn username(&self) -> &str;
    fn authorities(&self) -> &[String];
    fn tenant_id(&self) -> Option<&TenantId>;
    fn is_enabled(&self) -> bool;

    fn has_authority(&self, authority: &str) -> bool {
        self.authorities().iter().any(|a| a == authority)
    }

    fn has_any_authority(&self, authorities: &[&str]) -> bool {
        authorities.iter().any(|a| self.has_authority(a))
    }
}

/// Principal built from validated token claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub username: String,
    pub authorities: Vec<String>,
    pub tenant_id: Option<TenantId>,
    pub enabled: bool,
}

impl Principal {
    /// Principal for validated claims. `enabled` reflects the identity's
    /// current account status, which the token itself does not carry.
    pub fn from_claims(claims: TokenClaims, enabled: bool) -> Self {
        let tenant_id = claims.tenant_id();
        Self {
            username: claims.sub,
            authorities: claims.roles,
            tenant_id,
            enabled,
        }
    }
}

impl AuthenticatedPrincipal for Principal {
    fn username(&self) -> &str {
        &self.username
    }

    fn authorities(&self) -> &[String] {
        &self.authorities
    }

    fn tenant_id(&self) -> Option<&TenantId> {
        self.tenant_id.as_ref()
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}
