//! TestShaper Core Library
//!
//! This crate provides the fundamental types, the injectable clock and the
//! error taxonomy shared by the TestShaper security core.
//!
//! # Overview
//!
//! TestShaper is a multi-tenant administrative backend. The security core
//! resolves tiered policy settings (tenant, then global, then built-in
//! defaults), guards logins with an account-lockout state machine, issues
//! signed access tokens and rate limits inbound API traffic.
//!
//! # Modules
//!
//! - `types` - Policy scopes, settings and identity records
//! - `error` - Error types and result aliases
//! - `clock` - Wall-clock abstraction for deterministic time handling

pub mod clock;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use types::{IdentityLockoutState, IdentityRecord, PolicySetting, Scope, TenantId};
