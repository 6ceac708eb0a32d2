//! Request extractors for authenticated routes
//!
//! The access token comes from `Authorization: Bearer <token>`, or from an
//! `access_token` cookie when the header is absent.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use axum_extra::extract::CookieJar;
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};

use crate::core::auth::service::AuthService;
use crate::core::db::models::User;
use crate::core::error::ApiError;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Access token carried by a request, if any
pub fn access_token(headers: &HeaderMap) -> Option<String> {
    if let Some(Authorization(bearer)) = headers.typed_get::<Authorization<Bearer>>() {
        let token = bearer.token().trim();
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }

    CookieJar::from_headers(headers)
        .get(ACCESS_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

/// Any logged-in user
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl<S> FromRequestParts<S> for CurrentUser
where
    AuthService: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = access_token(&parts.headers).ok_or(ApiError::NotAuthenticated)?;

        let service = AuthService::from_ref(state);
        let user = service.verify_user(&token).await?;

        Ok(CurrentUser(user))
    }
}

/// A logged-in user holding the admin role
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

impl<S> FromRequestParts<S> for AdminUser
where
    AuthService: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;

        if !user.role.is_admin() {
            tracing::warn!(user_id = user.id, "Non-admin user hit an admin route");
            return Err(ApiError::NotAuthenticated);
        }

        Ok(AdminUser(user))
    }
}
