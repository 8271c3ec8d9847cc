//! In-memory store
//!
//! Used by tests and by embedded setups that do not need durability. The
//! availability toggle lets callers simulate a store outage.

use crate::store::{IdentityStore, PolicyStore};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use testshaper_core::{Error, IdentityLockoutState, IdentityRecord, PolicySetting, Result, Scope};

/// Policy settings and identities kept in process memory
#[derive(Debug)]
pub struct MemoryStore {
    policies: RwLock<HashMap<Scope, HashMap<String, PolicySetting>>>,
    identities: RwLock<HashMap<String, IdentityRecord>>,
    available: AtomicBool,
    scope_reads: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            policies: RwLock::new(HashMap::new()),
            identities: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            scope_reads: AtomicUsize::new(0),
        }
    }

    /// Make every subsequent call fail (`false`) or succeed again (`true`)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of `find_by_scope` calls served so far
    pub fn scope_reads(&self) -> usize {
        self.scope_reads.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::StorageUnavailable("memory store offline".to_string()))
        }
    }
}

impl PolicyStore for MemoryStore {
    fn find_by_scope(&self, scope: &Scope) -> Result<Vec<PolicySetting>> {
        self.check_available()?;
        self.scope_reads.fetch_add(1, Ordering::SeqCst);
        let policies = self.policies.read();
        Ok(policies
            .get(scope)
            .map(|settings| settings.values().cloned().collect())
            .unwrap_or_default())
    }

    fn find(&self, scope: &Scope, key: &str) -> Result<Option<PolicySetting>> {
        self.check_available()?;
        let policies = self.policies.read();
        Ok(policies.get(scope).and_then(|settings| settings.get(key)).cloned())
    }

    fn upsert(&self, setting: &PolicySetting) -> Result<()> {
        self.check_available()?;
        self.policies
            .write()
            .entry(setting.scope.clone())
            .or_default()
            .insert(setting.key.clone(), setting.clone());
        Ok(())
    }
}

impl IdentityStore for MemoryStore {
    fn find_by_identifier(&self, identifier: &str) -> Result<Option<IdentityRecord>> {
        self.check_available()?;
        Ok(self.identities.read().get(identifier).cloned())
    }

    fn save_lockout(&self, identifier: &str, state: &IdentityLockoutState) -> Result<()> {
        self.check_available()?;
        let mut identities = self.identities.write();
        let record = identities
            .get_mut(identifier)
            .ok_or_else(|| Error::IdentityNotFound(identifier.to_string()))?;
        record.lockout = state.clone();
        Ok(())
    }

    fn create(&self, record: &IdentityRecord) -> Result<()> {
        self.check_available()?;
        let mut identities = self.identities.write();
        if identities.contains_key(&record.identifier) {
            return Err(Error::IdentityExists(record.identifier.clone()));
        }
        identities.insert(record.identifier.clone(), record.clone());
        Ok(())
    }

    fn count(&self) -> Result<usize> {
        self.check_available()?;
        Ok(self.identities.read().len())
    }
}
