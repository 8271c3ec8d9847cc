//! TestShaper - security policy core for a multi-tenant admin backend
//!
//! This is the main library crate that re-exports all TestShaper components.

pub use testshaper_core as core;
pub use testshaper_protocol as protocol;
pub use testshaper_server as server;
pub use testshaper_storage as storage;

// Re-export commonly used types
pub use testshaper_core::{
    Clock, Error, IdentityLockoutState, IdentityRecord, ManualClock, PolicySetting, Result, Scope,
    SystemClock, TenantId,
};

pub use testshaper_server::security::{
    AuthError, AuthenticationGuard, IssuedToken, LockoutStatus, PolicyCache, RateLimitDecision,
    RequestRateLimiter, SecretCodec, TokenClaims, TokenIssuer,
};
pub use testshaper_server::{Server, ServerConfig};
pub use testshaper_storage::{IdentityStore, MemoryStore, PolicyStore, StorageEngine, StorageOptions};
