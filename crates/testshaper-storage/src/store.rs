//! Store contracts consumed by the security core
//!
//! The security core treats persistence as a collaborator. Both contracts are
//! synchronous: request handling in the core is blocking by design, and the
//! server moves blocking work off the async executor.

use std::sync::Arc;
use testshaper_core::{IdentityLockoutState, IdentityRecord, PolicySetting, Result, Scope};

/// Persisted key/value policy settings scoped to a tenant or to the global
/// scope. At most one setting exists per `(scope, key)`.
pub trait PolicyStore: Send + Sync {
    /// All settings stored for one scope
    fn find_by_scope(&self, scope: &Scope) -> Result<Vec<PolicySetting>>;

    /// A single setting
    fn find(&self, scope: &Scope, key: &str) -> Result<Option<PolicySetting>>;

    /// Insert or replace the setting for `(setting.scope, setting.key)`
    fn upsert(&self, setting: &PolicySetting) -> Result<()>;
}

/// Identity records with their lockout state
pub trait IdentityStore: Send + Sync {
    fn find_by_identifier(&self, identifier: &str) -> Result<Option<IdentityRecord>>;

    /// Durably replace the lockout state of an existing identity
    fn save_lockout(&self, identifier: &str, state: &IdentityLockoutState) -> Result<()>;

    /// Create a new identity; fails if the identifier is taken
    fn create(&self, record: &IdentityRecord) -> Result<()>;

    /// Number of stored identities
    fn count(&self) -> Result<usize>;
}

impl<T: PolicyStore + ?Sized> PolicyStore for Arc<T> {
    fn find_by_scope(&self, scope: &Scope) -> Result<Vec<PolicySetting>> {
        (**self).find_by_scope(scope)
    }

    fn find(&self, scope: &Scope, key: &str) -> Result<Option<PolicySetting>> {
        (**self).find(scope, key)
    }

    fn upsert(&self, setting: &PolicySetting) -> Result<()> {
        (**self).upsert(setting)
    }
}

impl<T: IdentityStore + ?Sized> IdentityStore for Arc<T> {
    fn find_by_identifier(&self, identifier: &str) -> Result<Option<IdentityRecord>> {
        (**self).find_by_identifier(identifier)
    }

    fn save_lockout(&self, identifier: &str, state: &IdentityLockoutState) -> Result<()> {
        (**self).save_lockout(identifier, state)
    }

    fn create(&self, record: &IdentityRecord) -> Result<()> {
        (**self).create(record)
    }

    fn count(&self) -> Result<usize> {
        (**self).count()
    }
}
