//! TestShaper Security Server
//!
//! Ties the security core together behind an HTTP API.
//!
//! # Features
//!
//! - Tiered policy resolution (tenant, global, built-in default) with a
//!   per-scope cache and encrypted secrets at rest
//! - Login guard with account lockout
//! - Signed, policy-driven access tokens
//! - Per-client request rate limiting
//! - Admin endpoints for security settings and account unlocks

pub mod config;
pub mod http_server;
pub mod security;
pub mod server;

pub use config::ServerConfig;
pub use http_server::{create_router, AppState};
pub use security::{
    AuthError, AuthenticationGuard, IssuedToken, PolicyCache, RequestRateLimiter, SecretCodec,
    TokenIssuer,
};
pub use server::Server;
