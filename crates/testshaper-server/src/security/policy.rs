//! Tiered security policy resolution
//!
//! A policy value is resolved tenant override first, then global override,
//! then the built-in default, then the empty string. Overrides are read
//! through a per-scope cache of decrypted buckets.
//!
//! Each scope owns a slot carrying a generation counter. Writes bump the
//! generation and drop the bucket; a load that started before the bump never
//! installs its (stale) result.

use super::codec::SecretCodec;
use super::password::{validate_password_with_policy, PasswordPolicy};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use testshaper_core::{Clock, Error, PolicySetting, Result, Scope, TenantId};
use testshaper_storage::keys::check_component;
use testshaper_storage::PolicyStore;
use tracing::{debug, error, info, warn};

/// Policy keys understood by the security core
pub mod keys {
    pub const PASSWORD_MIN_LENGTH: &str = "PASSWORD_MIN_LENGTH";
    pub const PASSWORD_REQUIRE_UPPERCASE: &str = "PASSWORD_REQUIRE_UPPERCASE";
    pub const PASSWORD_REQUIRE_LOWERCASE: &str = "PASSWORD_REQUIRE_LOWERCASE";
    pub const PASSWORD_REQUIRE_NUMBER: &str = "PASSWORD_REQUIRE_NUMBER";
    pub const PASSWORD_REQUIRE_SPECIAL: &str = "PASSWORD_REQUIRE_SPECIAL";
    pub const MAX_LOGIN_ATTEMPTS: &str = "MAX_LOGIN_ATTEMPTS";
    pub const ACCOUNT_LOCK_DURATION_MINUTES: &str = "ACCOUNT_LOCK_DURATION_MINUTES";
    pub const JWT_ACCESS_TOKEN_EXPIRY_MINUTES: &str = "JWT_ACCESS_TOKEN_EXPIRY_MINUTES";
    pub const JWT_REFRESH_TOKEN_EXPIRY_DAYS: &str = "JWT_REFRESH_TOKEN_EXPIRY_DAYS";
    pub const API_RATE_LIMIT_PER_MINUTE: &str = "API_RATE_LIMIT_PER_MINUTE";
}

pub const DEFAULT_MAX_LOGIN_ATTEMPTS: u32 = 5;
pub const DEFAULT_LOCK_DURATION_MINUTES: i64 = 15;
pub const DEFAULT_ACCESS_TOKEN_EXPIRY_MINUTES: i64 = 60;
pub const DEFAULT_REFRESH_TOKEN_EXPIRY_DAYS: i64 = 30;
pub const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 100;

/// Upper bound for minute-valued policies (100 years)
pub const MAX_POLICY_MINUTES: i64 = 100 * 366 * 24 * 60;

/// Built-in defaults, the last tier of resolution
const DEFAULTS: &[(&str, &str)] = &[
    (keys::PASSWORD_MIN_LENGTH, "8"),
    (keys::PASSWORD_REQUIRE_UPPERCASE, "true"),
    (keys::PASSWORD_REQUIRE_LOWERCASE, "true"),
    (keys::PASSWORD_REQUIRE_NUMBER, "true"),
    (keys::PASSWORD_REQUIRE_SPECIAL, "true"),
    (keys::MAX_LOGIN_ATTEMPTS, "5"),
    (keys::ACCOUNT_LOCK_DURATION_MINUTES, "15"),
    (keys::JWT_ACCESS_TOKEN_EXPIRY_MINUTES, "60"),
    (keys::JWT_REFRESH_TOKEN_EXPIRY_DAYS, "30"),
    (keys::API_RATE_LIMIT_PER_MINUTE, "100"),
];

/// Keys that are always sensitive regardless of suffix
const SENSITIVE_KEYS: &[&str] = &[
    "SMTP_PASSWORD",
    "SMS_API_KEY",
    "AI_API_KEY",
    "AWS_SECRET_KEY",
    "STRIPE_SECRET_KEY",
];

/// Display placeholder for sensitive values. Writing it back is a no-op.
pub const SENSITIVE_MASK: &str = "******";

/// Default bucket lifetime
pub const DEFAULT_CACHE_TTL: std::time::Duration = std::time::Duration::from_secs(60);

/// Built-in default for a key, if any
pub fn default_value(key: &str) -> Option<&'static str> {
    DEFAULTS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| *v)
}

/// Whether a key holds a secret that must be encrypted at rest
pub fn is_sensitive(key: &str) -> bool {
    SENSITIVE_KEYS.contains(&key)
        || key.ends_with("_PASSWORD")
        || key.ends_with("_KEY")
        || key.ends_with("_SECRET")
}

type Bucket = HashMap<String, String>;

#[derive(Debug)]
struct Slot {
    generation: u64,
    bucket: Option<Arc<Bucket>>,
    loaded_at: DateTime<Utc>,
}

impl Slot {
    fn empty(now: DateTime<Utc>) -> Self {
        Self {
            generation: 0,
            bucket: None,
            loaded_at: now,
        }
    }
}

/// Read-through cache over a [`PolicyStore`]
pub struct PolicyCache {
    store: Arc<dyn PolicyStore>,
    codec: Arc<SecretCodec>,
    clock: Arc<dyn Clock>,
    ttl: Option<std::time::Duration>,
    slots: DashMap<Scope, Slot>,
}

impl PolicyCache {
    pub fn new(store: Arc<dyn PolicyStore>, codec: Arc<SecretCodec>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            codec,
            clock,
            ttl: Some(DEFAULT_CACHE_TTL),
            slots: DashMap::new(),
        }
    }

    /// Set the bucket lifetime; `None` keeps buckets until the next write
    pub fn with_ttl(mut self, ttl: Option<std::time::Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Resolve a policy value: tenant override, global override, default,
    /// empty string.
    pub fn resolve(&self, tenant: Option<&TenantId>, key: &str) -> Result<String> {
        if let Some(tenant) = tenant {
            let bucket = self.bucket(&Scope::Tenant(tenant.clone()))?;
            if let Some(value) = bucket.get(key) {
                return Ok(value.clone());
            }
        }

        let global = self.bucket(&Scope::Global)?;
        if let Some(value) = global.get(key) {
            return Ok(value.clone());
        }

        Ok(default_value(key).unwrap_or_default().to_string())
    }

    /// Persist one setting and invalidate its scope.
    ///
    /// Returns `false` when the sentinel mask was submitted for a sensitive
    /// key, in which case nothing changes.
    pub fn write(&self, scope: &Scope, key: &str, value: &str) -> Result<bool> {
        let written = self.persist(scope, key, value)?;
        if written {
            self.invalidate(scope);
        }
        Ok(written)
    }

    /// Persist a batch of settings for one scope and invalidate it once.
    ///
    /// Returns the number of settings actually written. On error, settings
    /// written before the failure stay written and the scope is still
    /// invalidated.
    pub fn write_all<'a, I>(&self, scope: &Scope, settings: I) -> Result<usize>
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut written = 0;
        let mut outcome = Ok(());

        for (key, value) in settings {
            match self.persist(scope, key, value) {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        if written > 0 {
            self.invalidate(scope);
        }
        info!("Updated {} security settings for scope {}", written, scope);
        outcome.map(|_| written)
    }

    /// Raw overrides of one scope for display, with secrets masked
    pub fn masked_settings(&self, scope: &Scope) -> Result<BTreeMap<String, String>> {
        let settings = self.store.find_by_scope(scope)?;
        Ok(settings
            .into_iter()
            .map(|s| {
                let value = if s.encrypted || (is_sensitive(&s.key) && !s.value.is_empty()) {
                    SENSITIVE_MASK.to_string()
                } else {
                    s.value
                };
                (s.key, value)
            })
            .collect())
    }

    /// Drop the cached bucket of a scope
    pub fn invalidate(&self, scope: &Scope) {
        let now = self.clock.now();
        let mut slot = self
            .slots
            .entry(scope.clone())
            .or_insert_with(|| Slot::empty(now));
        slot.generation += 1;
        slot.bucket = None;
        debug!("Invalidated policy cache for scope {}", scope);
    }

    // ========== Typed accessors ==========

    pub fn max_login_attempts(&self, tenant: Option<&TenantId>) -> Result<u32> {
        self.positive(tenant, keys::MAX_LOGIN_ATTEMPTS, DEFAULT_MAX_LOGIN_ATTEMPTS)
    }

    pub fn lock_duration(&self, tenant: Option<&TenantId>) -> Result<Duration> {
        self.minutes(
            tenant,
            keys::ACCOUNT_LOCK_DURATION_MINUTES,
            DEFAULT_LOCK_DURATION_MINUTES,
        )
    }

    pub fn access_token_lifetime(&self, tenant: Option<&TenantId>) -> Result<Duration> {
        self.minutes(
            tenant,
            keys::JWT_ACCESS_TOKEN_EXPIRY_MINUTES,
            DEFAULT_ACCESS_TOKEN_EXPIRY_MINUTES,
        )
    }

    pub fn refresh_token_lifetime_days(&self, tenant: Option<&TenantId>) -> Result<i64> {
        self.positive(
            tenant,
            keys::JWT_REFRESH_TOKEN_EXPIRY_DAYS,
            DEFAULT_REFRESH_TOKEN_EXPIRY_DAYS,
        )
    }

    pub fn rate_limit_per_minute(&self, tenant: Option<&TenantId>) -> Result<u32> {
        self.positive(
            tenant,
            keys::API_RATE_LIMIT_PER_MINUTE,
            DEFAULT_RATE_LIMIT_PER_MINUTE,
        )
    }

    pub fn password_policy(&self, tenant: Option<&TenantId>) -> Result<PasswordPolicy> {
        let defaults = PasswordPolicy::default();
        Ok(PasswordPolicy {
            min_length: self.positive(tenant, keys::PASSWORD_MIN_LENGTH, defaults.min_length)?,
            require_uppercase: self.flag(
                tenant,
                keys::PASSWORD_REQUIRE_UPPERCASE,
                defaults.require_uppercase,
            )?,
            require_lowercase: self.flag(
                tenant,
                keys::PASSWORD_REQUIRE_LOWERCASE,
                defaults.require_lowercase,
            )?,
            require_digit: self.flag(tenant, keys::PASSWORD_REQUIRE_NUMBER, defaults.require_digit)?,
            require_special: self.flag(
                tenant,
                keys::PASSWORD_REQUIRE_SPECIAL,
                defaults.require_special,
            )?,
        })
    }

    /// Check a candidate password against the tenant's password policy
    pub fn validate_password(&self, tenant: Option<&TenantId>, password: &str) -> Result<()> {
        let policy = self.password_policy(tenant)?;
        validate_password_with_policy(password, &policy)
    }

    // ========== Internals ==========

    fn persist(&self, scope: &Scope, key: &str, value: &str) -> Result<bool> {
        check_component("setting key", key)?;
        let sensitive = is_sensitive(key);
        if sensitive && value == SENSITIVE_MASK {
            debug!("Ignoring masked value for {} in scope {}", key, scope);
            return Ok(false);
        }

        let setting = if sensitive && !value.is_empty() {
            let sealed = self
                .codec
                .encrypt(value)
                .map_err(|e| Error::Encryption(e.to_string()))?;
            PolicySetting::encrypted(scope.clone(), key, sealed)
        } else {
            PolicySetting::plain(scope.clone(), key, value)
        };

        self.store.upsert(&setting)?;
        Ok(true)
    }

    fn bucket(&self, scope: &Scope) -> Result<Arc<Bucket>> {
        let now = self.clock.now();
        let generation = {
            let mut slot = self
                .slots
                .entry(scope.clone())
                .or_insert_with(|| Slot::empty(now));
            if let Some(bucket) = &slot.bucket {
                if self.is_fresh(slot.loaded_at, now) {
                    return Ok(Arc::clone(bucket));
                }
            }
            slot.bucket = None;
            slot.generation
        };

        let bucket = Arc::new(self.load(scope)?);

        if let Some(mut slot) = self.slots.get_mut(scope) {
            if slot.generation == generation {
                slot.bucket = Some(Arc::clone(&bucket));
                slot.loaded_at = now;
            }
        }
        Ok(bucket)
    }

    fn is_fresh(&self, loaded_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self.ttl {
            None => true,
            Some(ttl) => (now - loaded_at)
                .to_std()
                .map(|age| age < ttl)
                .unwrap_or(true),
        }
    }

    fn load(&self, scope: &Scope) -> Result<Bucket> {
        let settings = self
            .store
            .find_by_scope(scope)
            .map_err(|e| Error::PolicyResolution(format!("scope {}: {}", scope, e)))?;

        let mut bucket = HashMap::with_capacity(settings.len());
        for setting in settings {
            if setting.encrypted {
                match self.codec.decrypt(&setting.value) {
                    Ok(plain) => {
                        bucket.insert(setting.key, plain);
                    }
                    Err(e) => {
                        error!(
                            "Failed to decrypt setting {} in scope {}: {}",
                            setting.key, scope, e
                        );
                    }
                }
            } else {
                bucket.insert(setting.key, setting.value);
            }
        }

        debug!("Loaded {} policy overrides for scope {}", bucket.len(), scope);
        Ok(bucket)
    }

    fn positive<T>(&self, tenant: Option<&TenantId>, key: &str, fallback: T) -> Result<T>
    where
        T: FromStr + PartialOrd + Default + Copy + std::fmt::Display,
    {
        let raw = self.resolve(tenant, key)?;
        match raw.trim().parse::<T>() {
            Ok(value) if value > T::default() => Ok(value),
            _ => {
                warn!(
                    "Invalid value '{}' for policy {}, using default {}",
                    raw, key, fallback
                );
                Ok(fallback)
            }
        }
    }

    /// A positive number of minutes no larger than [`MAX_POLICY_MINUTES`]
    fn minutes(&self, tenant: Option<&TenantId>, key: &str, fallback: i64) -> Result<Duration> {
        let minutes = self.positive(tenant, key, fallback)?;
        let duration = (minutes <= MAX_POLICY_MINUTES)
            .then(|| Duration::try_minutes(minutes))
            .flatten();
        match duration {
            Some(duration) => Ok(duration),
            None => {
                warn!(
                    "Value {} for policy {} is out of range, using default {}",
                    minutes, key, fallback
                );
                Ok(Duration::try_minutes(fallback).unwrap_or(Duration::zero()))
            }
        }
    }

    fn flag(&self, tenant: Option<&TenantId>, key: &str, fallback: bool) -> Result<bool> {
        let raw = self.resolve(tenant, key)?;
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("true") {
            Ok(true)
        } else if raw.eq_ignore_ascii_case("false") {
            Ok(false)
        } else {
            warn!(
                "Invalid value '{}' for policy {}, using default {}",
                raw, key, fallback
            );
            Ok(fallback)
        }
    }
}

impl std::fmt::Debug for PolicyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyCache")
            .field("ttl", &self.ttl)
            .field("scopes", &self.slots.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use testshaper_core::ManualClock;
    use testshaper_storage::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        cache: PolicyCache,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::starting_now());
        let codec = Arc::new(SecretCodec::new("test-encryption-key").unwrap());
        let cache = PolicyCache::new(store.clone(), codec, clock.clone());
        Fixture { store, clock, cache }
    }

    fn tenant(id: &str) -> TenantId {
        TenantId::new(id)
    }

    #[test]
    fn test_resolution_order() {
        let f = fixture();
        let t1 = tenant("inst-1");
        let key = keys::MAX_LOGIN_ATTEMPTS;

        assert_eq!(f.cache.resolve(Some(&t1), key).unwrap(), "5");

        f.cache.write(&Scope::Global, key, "7").unwrap();
        assert_eq!(f.cache.resolve(Some(&t1), key).unwrap(), "7");
        assert_eq!(f.cache.resolve(None, key).unwrap(), "7");

        f.cache.write(&Scope::Tenant(t1.clone()), key, "3").unwrap();
        assert_eq!(f.cache.resolve(Some(&t1), key).unwrap(), "3");
        assert_eq!(f.cache.resolve(Some(&tenant("inst-2")), key).unwrap(), "7");
        assert_eq!(f.cache.resolve(None, key).unwrap(), "7");
    }

    #[test]
    fn test_unknown_key_resolves_to_empty() {
        let f = fixture();
        assert_eq!(f.cache.resolve(None, "NO_SUCH_KEY").unwrap(), "");
    }

    #[test]
    fn test_tenant_named_global_is_not_the_global_scope() {
        let f = fixture();
        let impostor = tenant(Scope::GLOBAL_ID);
        f.cache
            .write(&Scope::Tenant(impostor.clone()), keys::MAX_LOGIN_ATTEMPTS, "2")
            .unwrap();

        assert_eq!(f.cache.resolve(None, keys::MAX_LOGIN_ATTEMPTS).unwrap(), "5");
        assert_eq!(f.cache.resolve(Some(&impostor), keys::MAX_LOGIN_ATTEMPTS).unwrap(), "2");
    }

    #[test]
    fn test_sensitive_values_are_encrypted_at_rest() {
        let f = fixture();
        f.cache.write(&Scope::Global, "SMTP_PASSWORD", "hunter2").unwrap();

        let stored = f.store.find(&Scope::Global, "SMTP_PASSWORD").unwrap().unwrap();
        assert!(stored.encrypted);
        assert_ne!(stored.value, "hunter2");
        assert_eq!(f.cache.resolve(None, "SMTP_PASSWORD").unwrap(), "hunter2");
    }

    #[test]
    fn test_sentinel_write_is_noop() {
        let f = fixture();
        f.cache.write(&Scope::Global, "AI_API_KEY", "sk-live-1").unwrap();
        let before = f.store.find(&Scope::Global, "AI_API_KEY").unwrap().unwrap();

        assert!(!f.cache.write(&Scope::Global, "AI_API_KEY", SENSITIVE_MASK).unwrap());

        let after = f.store.find(&Scope::Global, "AI_API_KEY").unwrap().unwrap();
        assert_eq!(before, after);
        assert_eq!(f.cache.resolve(None, "AI_API_KEY").unwrap(), "sk-live-1");
    }

    #[test]
    fn test_sentinel_is_literal_for_non_sensitive_keys() {
        let f = fixture();
        assert!(f.cache.write(&Scope::Global, "SITE_BANNER", SENSITIVE_MASK).unwrap());
        assert_eq!(f.cache.resolve(None, "SITE_BANNER").unwrap(), SENSITIVE_MASK);
    }

    #[test]
    fn test_empty_sensitive_value_clears_secret() {
        let f = fixture();
        f.cache.write(&Scope::Global, "SMTP_PASSWORD", "hunter2").unwrap();
        f.cache.write(&Scope::Global, "SMTP_PASSWORD", "").unwrap();

        let stored = f.store.find(&Scope::Global, "SMTP_PASSWORD").unwrap().unwrap();
        assert!(!stored.encrypted);
        assert_eq!(stored.value, "");
        assert_eq!(f.cache.resolve(None, "SMTP_PASSWORD").unwrap(), "");
    }

    #[test]
    fn test_undecryptable_value_is_treated_as_absent() {
        let f = fixture();
        f.store
            .upsert(&PolicySetting::encrypted(
                Scope::Tenant(tenant("inst-1")),
                "STRIPE_SECRET_KEY",
                "garbage",
            ))
            .unwrap();
        f.cache.write(&Scope::Global, "STRIPE_SECRET_KEY", "global-secret").unwrap();

        let value = f.cache.resolve(Some(&tenant("inst-1")), "STRIPE_SECRET_KEY").unwrap();
        assert_eq!(value, "global-secret");
    }

    #[test]
    fn test_buckets_are_cached_until_invalidated() {
        let f = fixture();
        f.cache.resolve(None, keys::MAX_LOGIN_ATTEMPTS).unwrap();
        f.cache.resolve(None, keys::ACCOUNT_LOCK_DURATION_MINUTES).unwrap();
        assert_eq!(f.store.scope_reads(), 1);

        // A write that bypasses the cache is not observed...
        f.store
            .upsert(&PolicySetting::plain(Scope::Global, keys::MAX_LOGIN_ATTEMPTS, "9"))
            .unwrap();
        assert_eq!(f.cache.resolve(None, keys::MAX_LOGIN_ATTEMPTS).unwrap(), "5");

        // ...until the scope is invalidated
        f.cache.invalidate(&Scope::Global);
        assert_eq!(f.cache.resolve(None, keys::MAX_LOGIN_ATTEMPTS).unwrap(), "9");
        assert_eq!(f.store.scope_reads(), 2);
    }

    /// Store whose scope reads park until the test releases them
    struct GatedStore {
        inner: MemoryStore,
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
        gate: AtomicBool,
    }

    impl PolicyStore for GatedStore {
        fn find_by_scope(&self, scope: &Scope) -> Result<Vec<PolicySetting>> {
            let settings = self.inner.find_by_scope(scope)?;
            if self.gate.swap(false, Ordering::SeqCst) {
                self.entered.lock().send(()).unwrap();
                self.release.lock().recv().unwrap();
            }
            Ok(settings)
        }

        fn find(&self, scope: &Scope, key: &str) -> Result<Option<PolicySetting>> {
            self.inner.find(scope, key)
        }

        fn upsert(&self, setting: &PolicySetting) -> Result<()> {
            self.inner.upsert(setting)
        }
    }

    #[test]
    fn test_load_racing_a_write_is_not_installed() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let store = Arc::new(GatedStore {
            inner: MemoryStore::new(),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
            gate: AtomicBool::new(true),
        });
        let codec = Arc::new(SecretCodec::new("test-encryption-key").unwrap());
        let cache = PolicyCache::new(store.clone(), codec, Arc::new(ManualClock::starting_now()))
            .with_ttl(None);
        let key = keys::MAX_LOGIN_ATTEMPTS;

        std::thread::scope(|s| {
            let reader = s.spawn(|| cache.resolve(None, key).unwrap());

            // The reader has read the empty scope and is parked before installing it
            entered_rx.recv().unwrap();
            cache.write(&Scope::Global, key, "9").unwrap();
            release_tx.send(()).unwrap();

            assert_eq!(reader.join().unwrap(), "5");
        });

        assert_eq!(cache.resolve(None, key).unwrap(), "9");
    }

    #[test]
    fn test_ttl_bounds_staleness() {
        let f = fixture();
        f.cache.resolve(None, keys::MAX_LOGIN_ATTEMPTS).unwrap();
        f.store
            .upsert(&PolicySetting::plain(Scope::Global, keys::MAX_LOGIN_ATTEMPTS, "4"))
            .unwrap();

        f.clock.advance(Duration::seconds(59));
        assert_eq!(f.cache.resolve(None, keys::MAX_LOGIN_ATTEMPTS).unwrap(), "5");

        f.clock.advance(Duration::seconds(1));
        assert_eq!(f.cache.resolve(None, keys::MAX_LOGIN_ATTEMPTS).unwrap(), "4");
    }

    #[test]
    fn test_ttl_disabled() {
        let f = fixture();
        let cache = f.cache.with_ttl(None);
        cache.resolve(None, keys::MAX_LOGIN_ATTEMPTS).unwrap();
        f.clock.advance(Duration::hours(24));
        cache.resolve(None, keys::MAX_LOGIN_ATTEMPTS).unwrap();
        assert_eq!(f.store.scope_reads(), 1);
    }

    #[test]
    fn test_store_failure_is_policy_resolution_error() {
        let f = fixture();
        f.store.set_available(false);
        let err = f.cache.resolve(None, keys::MAX_LOGIN_ATTEMPTS).unwrap_err();
        assert!(matches!(err, Error::PolicyResolution(_)));
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_typed_accessors_fall_back_on_garbage() {
        let f = fixture();
        f.cache.write(&Scope::Global, keys::MAX_LOGIN_ATTEMPTS, "five").unwrap();
        f.cache.write(&Scope::Global, keys::ACCOUNT_LOCK_DURATION_MINUTES, "-3").unwrap();
        f.cache.write(&Scope::Global, keys::PASSWORD_REQUIRE_SPECIAL, "FALSE").unwrap();
        f.cache.write(&Scope::Global, keys::PASSWORD_REQUIRE_NUMBER, "maybe").unwrap();

        assert_eq!(f.cache.max_login_attempts(None).unwrap(), 5);
        assert_eq!(f.cache.lock_duration(None).unwrap(), Duration::minutes(15));
        let policy = f.cache.password_policy(None).unwrap();
        assert!(!policy.require_special);
        assert!(policy.require_digit);
    }

    #[test]
    fn test_out_of_range_minutes_fall_back_to_defaults() {
        let f = fixture();
        let t1 = tenant("inst-1");
        let scope = Scope::Tenant(t1.clone());
        f.cache
            .write(&scope, keys::JWT_ACCESS_TOKEN_EXPIRY_MINUTES, "9223372036854775807")
            .unwrap();
        f.cache
            .write(&scope, keys::ACCOUNT_LOCK_DURATION_MINUTES, "1000000000000")
            .unwrap();

        assert_eq!(f.cache.access_token_lifetime(Some(&t1)).unwrap(), Duration::minutes(60));
        assert_eq!(f.cache.lock_duration(Some(&t1)).unwrap(), Duration::minutes(15));

        f.cache
            .write(&scope, keys::ACCOUNT_LOCK_DURATION_MINUTES, &MAX_POLICY_MINUTES.to_string())
            .unwrap();
        assert_eq!(
            f.cache.lock_duration(Some(&t1)).unwrap(),
            Duration::minutes(MAX_POLICY_MINUTES)
        );
    }

    #[test]
    fn test_oversized_setting_key_is_rejected() {
        let f = fixture();
        let key = "K".repeat(testshaper_storage::keys::MAX_COMPONENT_LEN + 1);

        let err = f.cache.write(&Scope::Global, &key, "1").unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)));
        assert!(f.store.find_by_scope(&Scope::Global).unwrap().is_empty());
    }

    #[test]
    fn test_typed_accessor_defaults() {
        let f = fixture();
        assert_eq!(f.cache.access_token_lifetime(None).unwrap(), Duration::minutes(60));
        assert_eq!(f.cache.refresh_token_lifetime_days(None).unwrap(), 30);
        assert_eq!(f.cache.rate_limit_per_minute(None).unwrap(), 100);
        assert_eq!(f.cache.password_policy(None).unwrap(), PasswordPolicy::default());
    }

    #[test]
    fn test_default_table_matches_typed_defaults() {
        assert_eq!(
            default_value(keys::MAX_LOGIN_ATTEMPTS),
            Some(DEFAULT_MAX_LOGIN_ATTEMPTS.to_string().as_str())
        );
        assert_eq!(
            default_value(keys::API_RATE_LIMIT_PER_MINUTE),
            Some(DEFAULT_RATE_LIMIT_PER_MINUTE.to_string().as_str())
        );
        assert_eq!(
            default_value(keys::JWT_ACCESS_TOKEN_EXPIRY_MINUTES),
            Some(DEFAULT_ACCESS_TOKEN_EXPIRY_MINUTES.to_string().as_str())
        );
    }

    #[test]
    fn test_validate_password_uses_tenant_policy() {
        let f = fixture();
        let t1 = tenant("inst-1");
        f.cache.write(&Scope::Tenant(t1.clone()), keys::PASSWORD_MIN_LENGTH, "12").unwrap();
        f.cache
            .write(&Scope::Tenant(t1.clone()), keys::PASSWORD_REQUIRE_SPECIAL, "false")
            .unwrap();

        assert!(f.cache.validate_password(None, "Abcdef1!").is_ok());
        assert!(f.cache.validate_password(Some(&t1), "Abcdef1!").is_err());
        assert!(f.cache.validate_password(Some(&t1), "Abcdefghijk1").is_ok());
    }

    #[test]
    fn test_write_all_and_masked_settings() {
        let f = fixture();
        let scope = Scope::Tenant(tenant("inst-1"));
        let mut form = BTreeMap::new();
        form.insert(keys::MAX_LOGIN_ATTEMPTS.to_string(), "4".to_string());
        form.insert("SMS_API_KEY".to_string(), "sms-secret".to_string());

        assert_eq!(f.cache.write_all(&scope, &form).unwrap(), 2);

        let masked = f.cache.masked_settings(&scope).unwrap();
        assert_eq!(masked.get(keys::MAX_LOGIN_ATTEMPTS).unwrap(), "4");
        assert_eq!(masked.get("SMS_API_KEY").unwrap(), SENSITIVE_MASK);

        // Submitting the masked form back changes nothing sensitive
        assert_eq!(f.cache.write_all(&scope, &masked).unwrap(), 1);
        assert_eq!(
            f.cache.resolve(Some(&tenant("inst-1")), "SMS_API_KEY").unwrap(),
            "sms-secret"
        );
    }

    #[test]
    fn test_is_sensitive() {
        assert!(is_sensitive("SMTP_PASSWORD"));
        assert!(is_sensitive("STRIPE_SECRET_KEY"));
        assert!(is_sensitive("WEBHOOK_SECRET"));
        assert!(is_sensitive("MAPS_KEY"));
        assert!(!is_sensitive("MAX_LOGIN_ATTEMPTS"));
        assert!(!is_sensitive("KEY_ROTATION_DAYS"));
    }

    proptest! {
        #[test]
        fn prop_resolution_prefers_narrowest_scope(
            tenant_value in proptest::option::of("[a-z0-9]{1,8}"),
            global_value in proptest::option::of("[a-z0-9]{1,8}"),
        ) {
            let f = fixture();
            let t1 = tenant("inst-1");
            let key = keys::JWT_ACCESS_TOKEN_EXPIRY_MINUTES;

            if let Some(v) = &global_value {
                f.cache.write(&Scope::Global, key, v).unwrap();
            }
            if let Some(v) = &tenant_value {
                f.cache.write(&Scope::Tenant(t1.clone()), key, v).unwrap();
            }

            let expected = tenant_value
                .or(global_value)
                .unwrap_or_else(|| "60".to_string());
            prop_assert_eq!(f.cache.resolve(Some(&t1), key).unwrap(), expected);
        }
    }
}
