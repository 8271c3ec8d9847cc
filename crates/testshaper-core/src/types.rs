//! Policy scopes, policy settings and identity records

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a tenant (an institute)
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TenantId({})", self.0)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TenantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Namespace a policy setting lives in
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    Global,
    Tenant(TenantId),
}

impl Scope {
    /// Identifier used for the global namespace
    pub const GLOBAL_ID: &'static str = "GLOBAL";

    /// Scope for an optional tenant; `None` maps to the global scope
    pub fn for_tenant(tenant: Option<&TenantId>) -> Self {
        match tenant {
            Some(id) => Scope::Tenant(id.clone()),
            None => Scope::Global,
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Scope::Global)
    }

    /// `"GLOBAL"` or the tenant id
    pub fn id(&self) -> &str {
        match self {
            Scope::Global => Self::GLOBAL_ID,
            Scope::Tenant(id) => id.as_str(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => write!(f, "{}", Self::GLOBAL_ID),
            Scope::Tenant(id) => write!(f, "tenant:{}", id),
        }
    }
}

/// A persisted policy key/value pair. At most one exists per `(scope, key)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySetting {
    pub scope: Scope,
    pub key: String,
    /// Plaintext, or base64 ciphertext when `encrypted` is set
    pub value: String,
    pub encrypted: bool,
}

impl PolicySetting {
    pub fn plain(scope: Scope, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            scope,
            key: key.into(),
            value: value.into(),
            encrypted: false,
        }
    }

    pub fn encrypted(scope: Scope, key: impl Into<String>, ciphertext: impl Into<String>) -> Self {
        Self {
            scope,
            key: key.into(),
            value: ciphertext.into(),
            encrypted: true,
        }
    }
}

/// Failed-login bookkeeping stored on an identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityLockoutState {
    pub failed_attempts: u32,
    pub locked: bool,
    pub lock_timestamp: Option<DateTime<Utc>>,
}

impl IdentityLockoutState {
    /// `UNLOCKED(0)`
    pub fn unlocked() -> Self {
        Self::default()
    }

    /// `LOCKED(at)` keeping the attempt count that triggered the lock
    pub fn locked_at(failed_attempts: u32, at: DateTime<Utc>) -> Self {
        Self {
            failed_attempts,
            locked: true,
            lock_timestamp: Some(at),
        }
    }

    /// When an automatic lock lifts. `None` while unlocked, for a lock
    /// without a timestamp, or when the expiry lies beyond the representable
    /// range. Such locks never lift on their own.
    pub fn lock_expires_at(&self, lock_duration: Duration) -> Option<DateTime<Utc>> {
        if !self.locked {
            return None;
        }
        self.lock_timestamp
            .and_then(|ts| ts.checked_add_signed(lock_duration))
    }

    /// Whether the lock is still in force at `now`
    pub fn is_locked_at(&self, now: DateTime<Utc>, lock_duration: Duration) -> bool {
        if !self.locked {
            return false;
        }
        match self.lock_expires_at(lock_duration) {
            Some(expires) => now < expires,
            None => true,
        }
    }
}

/// Identity record held by the credential store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Login identifier (email)
    pub identifier: String,
    /// Argon2 PHC string
    pub password_hash: String,
    pub tenant_id: Option<TenantId>,
    pub roles: Vec<String>,
    pub active: bool,
    pub lockout: IdentityLockoutState,
    pub created_at: DateTime<Utc>,
}

impl IdentityRecord {
    pub fn new(identifier: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            password_hash: password_hash.into(),
            tenant_id: None,
            roles: Vec::new(),
            active: true,
            lockout: IdentityLockoutState::unlocked(),
            created_at: Utc::now(),
        }
    }

    /// Builder: assign a tenant
    pub fn with_tenant(mut self, tenant: TenantId) -> Self {
        self.tenant_id = Some(tenant);
        self
    }

    /// Builder: add a role
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        let role = role.into();
        if !self.roles.contains(&role) {
            self.roles.push(role);
        }
        self
    }

    /// Builder: mark the account disabled
    pub fn disabled(mut self) -> Self {
        self.active = false;
        self
    }
}
