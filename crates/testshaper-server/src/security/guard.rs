//! Login guard with account lockout
//!
//! Each identity is either `UNLOCKED(attempts)` or `LOCKED(since)`. A login
//! attempt against an identity:
//!
//! 1. is rejected as locked, without checking credentials, while the lock
//!    window (`ACCOUNT_LOCK_DURATION_MINUTES`) has not elapsed;
//! 2. resets the identity to `UNLOCKED(0)` once the window has elapsed;
//! 3. on valid credentials resets to `UNLOCKED(0)` and issues a token;
//! 4. on invalid credentials increments the counter and locks once it
//!    reaches `MAX_LOGIN_ATTEMPTS`.
//!
//! Every transition is persisted before the outcome is returned. Attempts on
//! the same identity are serialized.

use super::error::AuthError;
use super::password::verify_password;
use super::policy::PolicyCache;
use super::token::{IssuedToken, TokenIssuer};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use testshaper_core::{Clock, IdentityLockoutState, Result};
use testshaper_storage::IdentityStore;
use tracing::{debug, info, warn};

/// Lockout status of an identity as seen at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutStatus {
    /// Whether a login attempt would be rejected as locked right now
    pub locked: bool,
    pub failed_attempts: u32,
    /// Failures left before the identity locks
    pub remaining_attempts: u32,
    /// When the lock lifts; `None` while unlocked or for a permanent lock
    pub lock_expires_at: Option<DateTime<Utc>>,
}

/// Authenticates identities and enforces the lockout policy
pub struct AuthenticationGuard {
    identities: Arc<dyn IdentityStore>,
    policy: Arc<PolicyCache>,
    tokens: Arc<TokenIssuer>,
    clock: Arc<dyn Clock>,
    identity_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AuthenticationGuard {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        policy: Arc<PolicyCache>,
        tokens: Arc<TokenIssuer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            identities,
            policy,
            tokens,
            clock,
            identity_locks: DashMap::new(),
        }
    }

    /// Attempt a login. Blocking: hashes and touches storage.
    pub fn login(&self, identifier: &str, password: &str) -> std::result::Result<IssuedToken, AuthError> {
        self.with_identity_lock(identifier, || self.login_locked(identifier, password))
    }

    /// Administrative reset to `UNLOCKED(0)`. Returns `false` for an unknown
    /// identifier.
    pub fn unlock(&self, identifier: &str) -> Result<bool> {
        self.with_identity_lock(identifier, || {
            if self.identities.find_by_identifier(identifier)?.is_none() {
                return Ok(false);
            }
            self.identities
                .save_lockout(identifier, &IdentityLockoutState::unlocked())?;
            info!("Account {} unlocked by administrator", identifier);
            Ok(true)
        })
    }

    /// Whether the identity exists and its account is active
    pub fn is_active(&self, identifier: &str) -> Result<bool> {
        Ok(self
            .identities
            .find_by_identifier(identifier)?
            .is_some_and(|record| record.active))
    }

    /// Current lockout status, or `None` for an unknown identifier
    pub fn lockout_status(&self, identifier: &str) -> Result<Option<LockoutStatus>> {
        let Some(record) = self.identities.find_by_identifier(identifier)? else {
            return Ok(None);
        };
        let tenant = record.tenant_id.as_ref();
        let max_attempts = self.policy.max_login_attempts(tenant)?;
        let lock_duration = self.policy.lock_duration(tenant)?;

        let state = &record.lockout;
        let locked = state.is_locked_at(self.clock.now(), lock_duration);
        Ok(Some(LockoutStatus {
            locked,
            failed_attempts: state.failed_attempts,
            remaining_attempts: if locked {
                0
            } else {
                max_attempts.saturating_sub(state.failed_attempts)
            },
            lock_expires_at: if locked {
                state.lock_expires_at(lock_duration)
            } else {
                None
            },
        }))
    }

    fn login_locked(&self, identifier: &str, password: &str) -> std::result::Result<IssuedToken, AuthError> {
        let Some(record) = self.identities.find_by_identifier(identifier)? else {
            debug!("Login attempt for unknown identity");
            return Err(AuthError::AuthenticationFailed);
        };

        // Resolve both thresholds before touching state so a policy outage
        // rejects the attempt without recording anything.
        let tenant = record.tenant_id.as_ref();
        let max_attempts = self.policy.max_login_attempts(tenant)?;
        let lock_duration = self.policy.lock_duration(tenant)?;
        let now = self.clock.now();

        let mut state = record.lockout.clone();
        if state.locked {
            if state.is_locked_at(now, lock_duration) {
                return Err(AuthError::AccountLocked {
                    until: state.lock_expires_at(lock_duration),
                });
            }
            info!("Lock window elapsed for {}", identifier);
            state = IdentityLockoutState::unlocked();
        }

        if record.active && verify_password(password, &record.password_hash) {
            let reset = IdentityLockoutState::unlocked();
            if record.lockout != reset {
                self.identities.save_lockout(identifier, &reset)?;
            }
            let token = self.tokens.issue(identifier, &record.roles, tenant)?;
            info!("Login succeeded for {}", identifier);
            return Ok(token);
        }

        state.failed_attempts = state.failed_attempts.saturating_add(1);
        if state.failed_attempts >= max_attempts {
            state.locked = true;
            state.lock_timestamp = Some(now);
            warn!(
                "Account {} locked after {} failed login attempts",
                identifier, state.failed_attempts
            );
        } else {
            debug!(
                "Failed login for {} ({}/{})",
                identifier, state.failed_attempts, max_attempts
            );
        }
        self.identities.save_lockout(identifier, &state)?;
        Err(AuthError::AuthenticationFailed)
    }

    fn with_identity_lock<T>(&self, identifier: &str, f: impl FnOnce() -> T) -> T {
        let mutex = self
            .identity_locks
            .entry(identifier.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        let entry = IdentityLock {
            locks: &self.identity_locks,
            identifier,
            mutex: Some(mutex),
        };

        let _held = entry.mutex.as_ref().map(|m| m.lock());
        f()
    }
}

/// Per-identity mutex borrowed from the lock map. Dropping it, also during
/// unwinding, removes the map entry once nobody else holds or waits on it.
struct IdentityLock<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    identifier: &'a str,
    mutex: Option<Arc<Mutex<()>>>,
}

impl Drop for IdentityLock<'_> {
    fn drop(&mut self) {
        drop(self.mutex.take());
        // Only the map still references the mutex
        self.locks
            .remove_if(self.identifier, |_, l| Arc::strong_count(l) == 1);
    }
}

impl std::fmt::Debug for AuthenticationGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationGuard")
            .field("pending_identities", &self.identity_locks.len())
            .finish_non_exhaustive()
    }
}
