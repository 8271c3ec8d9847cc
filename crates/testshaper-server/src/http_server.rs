//! HTTP/REST API server implementation using Axum

use axum::{
    extract::{FromRef, Path, State},
    http::HeaderMap,
    middleware::from_fn_with_state,
    response::{IntoResponse, Json},
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;
use std::time::Instant;
use testshaper_core::{Clock, Error, Result, Scope};
use testshaper_protocol::http::{endpoints, ApiResponse, HealthResponse, LoginRequest, SettingsMap};
use testshaper_storage::{IdentityStore, PolicyStore};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::security::{
    cors_layer, principal::roles, rate_limit_middleware, require_auth, AuthError, AuthenticatedPrincipal,
    AuthenticationGuard, PolicyCache, Principal, RequestRateLimiter, SecretCodec,
    SecurityMiddleware, TokenIssuer,
};

type ApiResult<T> = std::result::Result<T, AuthError>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub policy: Arc<PolicyCache>,
    pub guard: Arc<AuthenticationGuard>,
    pub tokens: Arc<TokenIssuer>,
    pub rate_limiter: Arc<RequestRateLimiter>,
    pub security: SecurityMiddleware,
    pub cors_allowed_origins: Arc<[String]>,
    pub start_time: Instant,
}

impl AppState {
    /// Wire the security services over the given stores
    pub fn new(
        config: &ServerConfig,
        policies: Arc<dyn PolicyStore>,
        identities: Arc<dyn IdentityStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let codec = SecretCodec::new(&config.encryption_key)
            .map_err(|e| Error::Configuration(format!("Invalid encryption key: {}", e)))?;

        let policy = Arc::new(
            PolicyCache::new(policies, Arc::new(codec), clock.clone())
                .with_ttl(config.policy_cache_ttl()),
        );
        let tokens = Arc::new(TokenIssuer::new(
            &config.jwt_secret,
            policy.clone(),
            clock.clone(),
        ));
        let guard = Arc::new(AuthenticationGuard::new(
            identities,
            policy.clone(),
            tokens.clone(),
            clock.clone(),
        ));
        let rate_limiter = Arc::new(RequestRateLimiter::new(policy.clone(), clock));
        let security = SecurityMiddleware::new(tokens.clone(), guard.clone(), rate_limiter.clone());

        Ok(Self {
            policy,
            guard,
            tokens,
            rate_limiter,
            security,
            cors_allowed_origins: config.cors_allowed_origins.clone().into(),
            start_time: Instant::now(),
        })
    }
}

impl FromRef<AppState> for SecurityMiddleware {
    fn from_ref(state: &AppState) -> Self {
        state.security.clone()
    }
}

/// Create HTTP server router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Authenticated routes
        .route(endpoints::LOGOUT, post(auth_logout))
        .route(
            endpoints::GLOBAL_SECURITY_SETTINGS,
            get(get_global_settings).put(update_global_settings),
        )
        .route(
            endpoints::INSTITUTE_SECURITY_SETTINGS,
            get(get_institute_settings).put(update_institute_settings),
        )
        .route(
            endpoints::ACCOUNT_LOCKOUT,
            get(get_account_lockout).delete(unlock_account),
        )
        .route_layer(from_fn_with_state(state.clone(), require_auth))
        // Public routes
        .route(endpoints::HEALTH, get(health_check))
        .route(endpoints::LOGIN, post(auth_login))
        .layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(cors_layer(&state.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run store, hashing or crypto work off the async executor
async fn blocking<T, F>(task: &'static str, f: F) -> ApiResult<T>
where
    F: FnOnce() -> std::result::Result<T, AuthError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AuthError::Internal(format!("{} task failed: {}", task, e)))?
}

fn require_any(principal: &Principal, authorities: &[&str]) -> ApiResult<()> {
    if principal.has_any_authority(authorities) {
        Ok(())
    } else {
        tracing::debug!(
            "{} lacks any of {:?}",
            principal.username(),
            authorities
        );
        Err(AuthError::Forbidden)
    }
}

// ==================== Health ====================

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    };

    Json(response)
}

// ==================== Authentication ====================

async fn auth_login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    if request.email.trim().is_empty() || request.password.is_empty() {
        return Err(AuthError::BadRequest(
            "Email and password are required".to_string(),
        ));
    }

    let guard = state.guard.clone();
    let token = blocking("Login", move || {
        guard.login(request.email.trim(), &request.password)
    })
    .await?;

    Ok(Json(ApiResponse::success("Login successful", token)))
}

async fn auth_logout(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if let Some(token) = crate::security::middleware::bearer_token(&headers) {
        state.tokens.logout(token);
    }
    tracing::debug!("{} logged out", principal.username());
    Json(ApiResponse::message("Logged out successfully"))
}

// ==================== Security settings ====================

async fn get_global_settings(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<SettingsMap>> {
    require_any(&principal, &[roles::SUPER_ADMIN])?;
    let policy = state.policy.clone();
    let settings = blocking("Settings", move || Ok(policy.masked_settings(&Scope::Global)?)).await?;
    Ok(Json(settings))
}

async fn update_global_settings(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(settings): Json<SettingsMap>,
) -> ApiResult<impl IntoResponse> {
    require_any(&principal, &[roles::SUPER_ADMIN])?;
    let policy = state.policy.clone();
    blocking("Settings", move || Ok(policy.write_all(&Scope::Global, &settings)?)).await?;
    Ok(Json(ApiResponse::message(
        "Global security settings updated successfully",
    )))
}

async fn get_institute_settings(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<SettingsMap>> {
    require_any(&principal, &[roles::INSTITUTE_ADMIN, roles::SUPER_ADMIN])?;
    let scope = Scope::for_tenant(principal.tenant_id());
    let policy = state.policy.clone();
    let settings = blocking("Settings", move || Ok(policy.masked_settings(&scope)?)).await?;
    Ok(Json(settings))
}

async fn update_institute_settings(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(settings): Json<SettingsMap>,
) -> ApiResult<impl IntoResponse> {
    require_any(&principal, &[roles::INSTITUTE_ADMIN])?;
    let Some(tenant) = principal.tenant_id() else {
        return Err(AuthError::BadRequest(
            "User does not belong to an institute".to_string(),
        ));
    };

    let scope = Scope::Tenant(tenant.clone());
    let policy = state.policy.clone();
    blocking("Settings", move || Ok(policy.write_all(&scope, &settings)?)).await?;
    Ok(Json(ApiResponse::message(
        "Institute security settings updated successfully",
    )))
}

// ==================== Account lockout ====================

async fn get_account_lockout(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(identifier): Path<String>,
) -> ApiResult<impl IntoResponse> {
    require_any(&principal, &[roles::SUPER_ADMIN])?;
    let guard = state.guard.clone();
    let status = blocking("Lockout", move || Ok(guard.lockout_status(&identifier)?))
        .await?
        .ok_or_else(|| AuthError::NotFound("Account".to_string()))?;
    Ok(Json(ApiResponse::success("Lockout status", status)))
}

async fn unlock_account(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(identifier): Path<String>,
) -> ApiResult<impl IntoResponse> {
    require_any(&principal, &[roles::SUPER_ADMIN])?;
    let guard = state.guard.clone();
    let unlocked = blocking("Unlock", move || Ok(guard.unlock(&identifier)?)).await?;

    if !unlocked {
        return Err(AuthError::NotFound("Account".to_string()));
    }
    tracing::info!("{} unlocked an account", principal.username());
    Ok(Json(ApiResponse::message("Account unlocked")))
}
