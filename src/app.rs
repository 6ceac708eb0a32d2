//! Application state and router assembly

use std::sync::Arc;

use axum::{
    Router,
    extract::{FromRef, State},
    http::{HeaderValue, Method, header},
    middleware,
    routing::get,
};
use serde::Serialize;
use tower::Layer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};

use crate::core::auth::crypt::CryptService;
use crate::core::auth::jwt::JwtService;
use crate::core::auth::oauth::{OAuthError, OAuthProviders};
use crate::core::auth::{AuthService, auth_router};
use crate::core::config::Config;
use crate::core::db::{PgPool, health_check};
use crate::core::error::{ApiError, ApiResult};
use crate::core::jmy::{JmyService, jmy_router};
use crate::core::logging::log_requests;
use crate::core::response::ApiResponse;
use crate::core::shields::shields_router;
use crate::core::users::{UserService, user_router};

/// Shared state handed to every handler
#[derive(Clone, FromRef)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: PgPool,
    pub auth: AuthService,
    pub users: UserService,
    pub jmy: JmyService,
    pub oauth: Arc<OAuthProviders>,
}

impl AppState {
    pub fn new(config: Config, pool: PgPool) -> Result<Self, OAuthError> {
        let crypt = CryptService::default();
        let jwt = JwtService::new(config.jwt.clone());
        let oauth = OAuthProviders::from_configs(config.github.as_ref(), config.google.as_ref())?;

        Ok(Self {
            auth: AuthService::new(pool.clone(), jwt, crypt),
            users: UserService::new(pool.clone(), crypt),
            jmy: JmyService::new(pool.clone()),
            oauth: Arc::new(oauth),
            config: Arc::new(config),
            pool,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub name: String,
    pub version: String,
    pub database: &'static str,
}

/// GET {prefix}/health
async fn health(
    State(config): State<Arc<Config>>,
    State(pool): State<PgPool>,
) -> ApiResult<ApiResponse<HealthStatus>> {
    health_check(&pool)
        .await
        .map_err(|e| ApiError::DatabaseException(e.to_string()))?;

    Ok(ApiResponse::ok(HealthStatus {
        name: config.project_name.clone(),
        version: config.version.clone(),
        database: "ok",
    }))
}

/// CORS for the configured origins; `*` allows any origin without credentials
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }

    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];

    if origins.iter().any(|o| o == "*") {
        return Some(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(methods)
                .allow_headers(Any),
        );
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {origin}");
                None
            }
        })
        .collect();

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(methods)
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
            .allow_credentials(true),
    )
}

/// All routes under `{prefix}`, with logging, compression and CORS
pub fn build_router(state: AppState) -> Router {
    let prefix = state.config.prefix.clone();

    let v1 = Router::new()
        .nest("/auth", auth_router())
        .nest("/user", user_router())
        .nest("/jmy", jmy_router())
        .nest("/shields", shields_router());

    let mut router = Router::new()
        .route(&format!("{prefix}/health"), get(health))
        .nest(&format!("{prefix}/v1"), v1)
        .layer(middleware::from_fn(log_requests))
        .layer(CompressionLayer::new());

    if let Some(cors) = cors_layer(&state.config.cors_origins) {
        router = router.layer(cors);
    }

    router.with_state(state)
}

/// The router with trailing slashes trimmed before routing
pub fn build_app(state: AppState) -> NormalizePath<Router> {
    NormalizePathLayer::trim_trailing_slash().layer(build_router(state))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;

    use super::AppState;
    use crate::core::config::Config;
    use crate::core::db::create_lazy_pool;

    /// State over a pool that never connects unless a handler touches it
    pub fn test_state(extra: &[(&str, &str)]) -> AppState {
        let mut vars: HashMap<String, String> = [
            ("DATABASE_URL", "postgres://localhost/cookbook_test"),
            ("JWT_SECRET_KEY", "test_secret"),
            ("DB_ECHO", "false"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in extra {
            vars.insert(k.to_string(), v.to_string());
        }

        let config = Config::from_lookup(|key| vars.get(key).cloned()).unwrap();
        let pool = create_lazy_pool(&config.database).unwrap();
        AppState::new(config, pool).unwrap()
    }
}
