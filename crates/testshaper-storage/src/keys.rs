//! Key encoding for storage operations
//!
//! Provides binary key encoding for policy settings and identity records.

use testshaper_core::{Error, Result, Scope};

/// Prefix bytes for different key types
pub mod prefix {
    pub const POLICY: u8 = 0x01;
    pub const IDENTITY: u8 = 0x02;
}

/// Longest string a key component can hold (two-byte length prefix)
pub const MAX_COMPONENT_LEN: usize = u16::MAX as usize;

/// Reject strings that do not fit a key component
pub fn check_component(what: &str, s: &str) -> Result<()> {
    if s.len() > MAX_COMPONENT_LEN {
        return Err(Error::InvalidKey(format!(
            "{} is {} bytes, limit is {}",
            what,
            s.len(),
            MAX_COMPONENT_LEN
        )));
    }
    Ok(())
}

/// Scope tag bytes following the policy prefix
mod scope_tag {
    pub const GLOBAL: u8 = 0x00;
    pub const TENANT: u8 = 0x01;
}

/// Key builder for storage operations
#[derive(Debug)]
pub struct KeyBuilder {
    buffer: Vec<u8>,
}

impl KeyBuilder {
    /// Create a new key builder with estimated capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Create a policy setting key: prefix, scope, setting key
    pub fn policy(scope: &Scope, key: &str) -> Vec<u8> {
        let mut builder = Self::new(8 + scope.id().len() + key.len());
        builder.push_u8(prefix::POLICY);
        builder.push_scope(scope);
        builder.push_string(key);
        builder.finish()
    }

    /// Create a policy prefix for scanning all settings of one scope
    pub fn policy_prefix(scope: &Scope) -> Vec<u8> {
        let mut builder = Self::new(4 + scope.id().len());
        builder.push_u8(prefix::POLICY);
        builder.push_scope(scope);
        builder.finish()
    }

    /// Create an identity key
    pub fn identity(identifier: &str) -> Vec<u8> {
        let mut builder = Self::new(3 + identifier.len());
        builder.push_u8(prefix::IDENTITY);
        builder.push_string(identifier);
        builder.finish()
    }

    /// Create a prefix covering every identity key
    pub fn identity_prefix() -> Vec<u8> {
        vec![prefix::IDENTITY]
    }

    // Builder methods

    fn push_u8(&mut self, val: u8) {
        self.buffer.push(val);
    }

    fn push_scope(&mut self, scope: &Scope) {
        match scope {
            Scope::Global => self.push_u8(scope_tag::GLOBAL),
            Scope::Tenant(id) => {
                self.push_u8(scope_tag::TENANT);
                self.push_string(id.as_str());
            }
        }
    }

    fn push_string(&mut self, s: &str) {
        // Length-prefixed string; callers keep components within MAX_COMPONENT_LEN
        let bytes = s.as_bytes();
        let len = u16::try_from(bytes.len()).unwrap_or(u16::MAX);
        self.buffer.extend_from_slice(&len.to_be_bytes());
        self.buffer.extend_from_slice(bytes);
    }

    fn finish(self) -> Vec<u8> {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testshaper_core::TenantId;

    #[test]
    fn test_policy_key() {
        let scope = Scope::Tenant(TenantId::new("inst-7"));
        let key = KeyBuilder::policy(&scope, "MAX_LOGIN_ATTEMPTS");

        let mut expected = vec![prefix::POLICY, scope_tag::TENANT, 0, 6];
        expected.extend_from_slice(b"inst-7");
        expected.extend_from_slice(&[0, 18]);
        expected.extend_from_slice(b"MAX_LOGIN_ATTEMPTS");
        assert_eq!(key, expected);
    }

    #[test]
    fn test_global_policy_key() {
        let key = KeyBuilder::policy(&Scope::Global, "API_RATE_LIMIT_PER_MINUTE");

        let mut expected = vec![prefix::POLICY, scope_tag::GLOBAL, 0, 25];
        expected.extend_from_slice(b"API_RATE_LIMIT_PER_MINUTE");
        assert_eq!(key, expected);
    }

    #[test]
    fn test_check_component() {
        assert!(check_component("key", &"K".repeat(MAX_COMPONENT_LEN)).is_ok());
        let err = check_component("key", &"K".repeat(MAX_COMPONENT_LEN + 1)).unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)));
    }

    #[test]
    fn test_longest_component_keeps_its_length() {
        let key = "K".repeat(MAX_COMPONENT_LEN);
        let encoded = KeyBuilder::identity(&key);
        assert_eq!(&encoded[1..3], &[0xFF, 0xFF]);
        assert_eq!(encoded.len(), 3 + MAX_COMPONENT_LEN);
    }

    #[test]
    fn test_scope_prefixes_do_not_overlap() {
        // A tenant literally named "GLOBAL" must not share the global prefix
        let global = KeyBuilder::policy_prefix(&Scope::Global);
        let impostor = KeyBuilder::policy(&Scope::Tenant(TenantId::new("GLOBAL")), "K");
        assert!(!impostor.starts_with(&global));

        let tenant_a = KeyBuilder::policy_prefix(&Scope::Tenant(TenantId::new("a")));
        let tenant_ab = KeyBuilder::policy(&Scope::Tenant(TenantId::new("ab")), "K");
        assert!(!tenant_ab.starts_with(&tenant_a));
    }

    #[test]
    fn test_key_prefix_scanning() {
        let scope = Scope::Tenant(TenantId::new("inst-1"));
        let prefix = KeyBuilder::policy_prefix(&scope);
        let full_key = KeyBuilder::policy(&scope, "SMTP_PASSWORD");

        assert!(full_key.starts_with(&prefix));
        assert!(KeyBuilder::identity("a@b.c").starts_with(&KeyBuilder::identity_prefix()));
    }

    proptest::proptest! {
        #[test]
        fn prop_distinct_tenants_never_share_a_prefix(a in "[a-zA-Z0-9_-]{0,12}", b in "[a-zA-Z0-9_-]{0,12}", key in "[A-Z_]{1,24}") {
            proptest::prop_assume!(a != b);
            let scope_a = Scope::Tenant(TenantId::new(a));
            let scope_b = Scope::Tenant(TenantId::new(b));

            let prefix_a = KeyBuilder::policy_prefix(&scope_a);
            proptest::prop_assert!(!KeyBuilder::policy(&scope_b, &key).starts_with(&prefix_a));
            proptest::prop_assert!(!KeyBuilder::policy(&Scope::Global, &key).starts_with(&prefix_a));
            proptest::prop_assert!(KeyBuilder::policy(&scope_a, &key).starts_with(&prefix_a));
        }
    }
}
