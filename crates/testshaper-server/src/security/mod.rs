//! Security subsystem for TestShaper
//!
//! Tiered policy resolution with encrypted secrets, a login guard with
//! account lockout, policy-driven bearer tokens and per-client request rate
//! limiting.

pub mod codec;
pub mod cors;
pub mod error;
pub mod guard;
pub mod middleware;
pub mod password;
pub mod policy;
pub mod principal;
pub mod rate_limit;
pub mod token;

pub use codec::{CodecError, SecretCodec};
pub use cors::cors_layer;
pub use error::AuthError;
pub use guard::{AuthenticationGuard, LockoutStatus};
pub use middleware::{client_key, rate_limit as rate_limit_middleware, require_auth, SecurityMiddleware};
pub use password::{hash_password, verify_password, PasswordPolicy};
pub use policy::{PolicyCache, SENSITIVE_MASK};
pub use principal::{AuthenticatedPrincipal, Principal};
pub use rate_limit::{RateLimitDecision, RequestRateLimiter};
pub use token::{IssuedToken, TokenClaims, TokenIssuer};
