//! Cross-origin policy for the admin front end

use axum::http::{header, HeaderName, HeaderValue, Method};
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Rate limit headers the browser may read
pub const EXPOSED_HEADERS: [&str; 3] = [
    "x-ratelimit-limit",
    "x-ratelimit-remaining",
    "x-ratelimit-reset",
];

/// Build the CORS layer. With no origins configured every origin is allowed,
/// which only suits development.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let expose: Vec<HeaderName> = EXPOSED_HEADERS
        .into_iter()
        .map(HeaderName::from_static)
        .collect();

    if allowed_origins.is_empty() {
        return CorsLayer::permissive().expose_headers(expose);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers(expose)
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
