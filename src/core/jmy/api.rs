//! Jmy endpoints
//!
//! Mounted under `/v1/jmy`, admin only:
//! - POST / - Record an observation
//! - GET /?name= - Company by name
//! - GET /{id} - Company by ID

use axum::{
    Router,
    extract::State,
    routing::get,
};
use serde::Deserialize;

use crate::app::AppState;
use crate::core::auth::extract::AdminUser;
use crate::core::db::models::JmyCompanyOut;
use crate::core::error::{ApiResult, AppJson, AppPath, AppQuery};
use crate::core::jmy::service::{JmyCompanyRequest, JmyService};
use crate::core::response::ApiResponse;

#[derive(Debug, Deserialize)]
pub struct NameQuery {
    pub name: String,
}

pub fn jmy_router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_by_name).post(create))
        .route("/{id}", get(get_by_id))
}

/// POST /jmy
async fn create(
    State(jmy): State<JmyService>,
    _admin: AdminUser,
    AppJson(request): AppJson<JmyCompanyRequest>,
) -> ApiResult<ApiResponse<JmyCompanyOut>> {
    Ok(ApiResponse::ok(jmy.create(request).await?))
}

/// GET /jmy?name=
async fn get_by_name(
    State(jmy): State<JmyService>,
    _admin: AdminUser,
    AppQuery(query): AppQuery<NameQuery>,
) -> ApiResult<ApiResponse<JmyCompanyOut>> {
    Ok(ApiResponse::ok(jmy.get_by_name(&query.name).await?))
}

/// GET /jmy/{id}
async fn get_by_id(
    State(jmy): State<JmyService>,
    _admin: AdminUser,
    AppPath(id): AppPath<i64>,
) -> ApiResult<ApiResponse<JmyCompanyOut>> {
    Ok(ApiResponse::ok(jmy.get_by_id(id).await?))
}
