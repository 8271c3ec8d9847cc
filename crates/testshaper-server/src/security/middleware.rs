//! HTTP security middleware for Axum

use super::error::AuthError;
use super::guard::AuthenticationGuard;
use super::principal::{AuthenticatedPrincipal, Principal};
use super::rate_limit::{RateLimitDecision, RequestRateLimiter};
use super::token::TokenIssuer;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use testshaper_protocol::http::endpoints;

/// Shared security middleware state
#[derive(Clone)]
pub struct SecurityMiddleware {
    pub tokens: Arc<TokenIssuer>,
    pub guard: Arc<AuthenticationGuard>,
    pub rate_limiter: Arc<RequestRateLimiter>,
}

impl SecurityMiddleware {
    pub fn new(
        tokens: Arc<TokenIssuer>,
        guard: Arc<AuthenticationGuard>,
        rate_limiter: Arc<RequestRateLimiter>,
    ) -> Self {
        Self {
            tokens,
            guard,
            rate_limiter,
        }
    }
}

/// Key a client is rate limited under: the first `X-Forwarded-For` entry,
/// else the peer address, else `"unknown"`.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Extract the bearer token from the `Authorization` header
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Authentication middleware: validates the bearer token, checks that the
/// account is still active and stores the [`Principal`] in the request
/// extensions.
pub async fn require_auth(
    State(middleware): State<SecurityMiddleware>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_token(req.headers()).ok_or(AuthError::InvalidToken)?;
    let claims = middleware.tokens.validate(token)?;

    let guard = middleware.guard.clone();
    let subject = claims.sub.clone();
    let enabled = tokio::task::spawn_blocking(move || guard.is_active(&subject))
        .await
        .map_err(|e| AuthError::Internal(format!("Account check failed: {}", e)))??;
    let principal = Principal::from_claims(claims, enabled);

    if !principal.is_enabled() {
        tracing::debug!("Rejected token of inactive account {}", principal.username());
        return Err(AuthError::Forbidden);
    }

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

/// Fixed-window rate limiting for every `/api/` route
pub async fn rate_limit(
    State(middleware): State<SecurityMiddleware>,
    req: Request,
    next: Next,
) -> Response {
    if !req.uri().path().starts_with(endpoints::API_PREFIX) {
        return next.run(req).await;
    }

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_key(req.headers(), peer);

    let decision = middleware.rate_limiter.check(&key);
    let mut response = if decision.allowed {
        next.run(req).await
    } else {
        AuthError::TooManyRequests.into_response()
    };
    set_rate_limit_headers(response.headers_mut(), &decision);
    response
}

fn set_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    let remaining = decision.limit.saturating_sub(decision.count);
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(decision.reset_in_secs));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_key_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", " 192.168.1.1 , 10.0.0.1".parse().unwrap());
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();

        assert_eq!(client_key(&headers, Some(peer)), "192.168.1.1");
    }

    #[test]
    fn test_client_key_falls_back_to_peer() {
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        assert_eq!(client_key(&HeaderMap::new(), Some(peer)), "127.0.0.1");
        assert_eq!(client_key(&HeaderMap::new(), None), "unknown");

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "".parse().unwrap());
        assert_eq!(client_key(&headers, Some(peer)), "127.0.0.1");
    }

    #[test]
    fn test_rate_limit_headers() {
        let mut headers = HeaderMap::new();
        let decision = RateLimitDecision {
            allowed: true,
            count: 40,
            limit: 100,
            reset_in_secs: 12,
        };
        set_rate_limit_headers(&mut headers, &decision);

        assert_eq!(headers["x-ratelimit-limit"], "100");
        assert_eq!(headers["x-ratelimit-remaining"], "60");
        assert_eq!(headers["x-ratelimit-reset"], "12");
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));
    }
}
