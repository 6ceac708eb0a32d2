//! User administration endpoints
//!
//! Mounted under `/v1/user`, admin only:
//! - GET / - List users
//! - GET /{id} - Get user by ID
//! - PUT /{id} - Replace name and email
//! - PATCH /{id} - Update provided fields
//! - DELETE /{id} - Delete user

use axum::{Router, extract::State, routing::get};

use crate::app::AppState;
use crate::core::auth::extract::AdminUser;
use crate::core::db::models::UserOut;
use crate::core::error::{ApiResult, AppJson, AppPath};
use crate::core::response::ApiResponse;
use crate::core::users::service::{UserPatchRequest, UserPutRequest, UserService};

/// Create the user API router
pub fn user_router() -> Router<AppState> {
    Router::new().route("/", get(list_users)).route(
        "/{id}",
        get(get_user)
            .put(put_user)
            .patch(patch_user)
            .delete(delete_user),
    )
}

/// GET /user
async fn list_users(
    State(users): State<UserService>,
    _admin: AdminUser,
) -> ApiResult<ApiResponse<Vec<UserOut>>> {
    Ok(ApiResponse::ok(users.get_all().await?))
}

/// GET /user/{id}
async fn get_user(
    State(users): State<UserService>,
    _admin: AdminUser,
    AppPath(id): AppPath<i64>,
) -> ApiResult<ApiResponse<UserOut>> {
    Ok(ApiResponse::ok(users.get_by_id(id).await?))
}

/// PUT /user/{id}
async fn put_user(
    State(users): State<UserService>,
    _admin: AdminUser,
    AppPath(id): AppPath<i64>,
    AppJson(request): AppJson<UserPutRequest>,
) -> ApiResult<ApiResponse<UserOut>> {
    Ok(ApiResponse::ok(users.put_by_id(id, request).await?))
}

/// PATCH /user/{id}
async fn patch_user(
    State(users): State<UserService>,
    AdminUser(admin): AdminUser,
    AppPath(id): AppPath<i64>,
    AppJson(request): AppJson<UserPatchRequest>,
) -> ApiResult<ApiResponse<UserOut>> {
    tracing::debug!(admin_id = admin.id, user_id = id, "Patching user");
    Ok(ApiResponse::ok(users.patch_by_id(id, request).await?))
}

/// DELETE /user/{id}
async fn delete_user(
    State(users): State<UserService>,
    AdminUser(admin): AdminUser,
    AppPath(id): AppPath<i64>,
) -> ApiResult<ApiResponse<UserOut>> {
    tracing::info!(admin_id = admin.id, user_id = id, "Deleting user");
    Ok(ApiResponse::ok(users.delete_by_id(id).await?))
}
