//! TestShaper Protocol Types
//!
//! Request and response bodies exchanged over the HTTP API, plus the route
//! paths the server mounts.

pub mod http;

pub use http::{ApiResponse, ErrorResponse, HealthResponse, LoginRequest, SettingsMap};
