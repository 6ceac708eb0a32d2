//! Auth API endpoints
//!
//! Mounted under `/v1/auth`:
//! - POST /register/password - Register with email and password
//! - POST /token/password - OAuth2 password grant
//! - POST /token/github, /token/google - OAuth2 authorization-code grant
//! - GET /oauth/login/{provider} - Redirect to the provider consent screen
//! - GET /oauth/callback/{provider} - Finish the redirect flow
//! - POST /refresh - Rotate the refresh token
//! - POST /logout - Revoke the refresh token
//! - GET /me - Current user

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::core::auth::extract::CurrentUser;
use crate::core::auth::jwt::JwtToken;
use crate::core::auth::oauth::{OAuthClient, OAuthProviders};
use crate::core::auth::service::{
    AuthService, GRANT_AUTHORIZATION_CODE, GRANT_PASSWORD, RefreshRequest, RegisterRequest,
    check_grant_type,
};
use crate::core::db::models::UserOut;
use crate::core::error::{ApiError, ApiResult, AppForm, AppJson, AppQuery};
use crate::core::response::ApiResponse;

/// OAuth2 password form; `username` carries the email
#[derive(Debug, Deserialize)]
pub struct PasswordRegisterForm {
    pub grant_type: Option<String>,
    pub username: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordTokenForm {
    pub grant_type: Option<String>,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthorizationCodeForm {
    pub grant_type: Option<String>,
    pub code: String,
    pub redirect_uri: Option<String>,
}

/// Query the provider appends when redirecting back
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub revoked: bool,
}

/// Create the auth API router
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/register/password", post(register_password))
        .route("/token/password", post(token_password))
        .route("/token/github", post(token_github))
        .route("/token/google", post(token_google))
        .route("/oauth/login/github", get(login_github))
        .route("/oauth/login/google", get(login_google))
        .route("/oauth/callback/github", get(callback_github))
        .route("/oauth/callback/google", get(callback_google))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/me", get(me))
}

/// POST /register/password
async fn register_password(
    State(auth): State<AuthService>,
    AppForm(form): AppForm<PasswordRegisterForm>,
) -> ApiResult<ApiResponse<UserOut>> {
    check_grant_type(GRANT_PASSWORD, form.grant_type.as_deref())?;
    tracing::info!("Registration attempt for email: {}", form.username);

    let user = auth
        .register(RegisterRequest {
            name: form.name,
            email: form.username,
            password: form.password,
        })
        .await?;

    Ok(ApiResponse::created(user))
}

/// POST /token/password
async fn token_password(
    State(auth): State<AuthService>,
    AppForm(form): AppForm<PasswordTokenForm>,
) -> ApiResult<Json<JwtToken>> {
    check_grant_type(GRANT_PASSWORD, form.grant_type.as_deref())?;
    tracing::info!("Login attempt for email: {}", form.username);

    let tokens = auth.log_in_password(&form.username, &form.password).await?;

    Ok(Json(tokens))
}

async fn token_with<C: OAuthClient>(
    auth: &AuthService,
    client: Option<&C>,
    form: AuthorizationCodeForm,
) -> ApiResult<Json<JwtToken>> {
    check_grant_type(GRANT_AUTHORIZATION_CODE, form.grant_type.as_deref())?;
    let client = client.ok_or(ApiError::OAuthNotConfigured)?;

    let tokens = auth
        .log_in_oauth(client, &form.code, form.redirect_uri.as_deref())
        .await?;

    Ok(Json(tokens))
}

/// POST /token/github
async fn token_github(
    State(auth): State<AuthService>,
    State(providers): State<Arc<OAuthProviders>>,
    AppForm(form): AppForm<AuthorizationCodeForm>,
) -> ApiResult<Json<JwtToken>> {
    token_with(&auth, providers.github.as_ref(), form).await
}

/// POST /token/google
async fn token_google(
    State(auth): State<AuthService>,
    State(providers): State<Arc<OAuthProviders>>,
    AppForm(form): AppForm<AuthorizationCodeForm>,
) -> ApiResult<Json<JwtToken>> {
    token_with(&auth, providers.google.as_ref(), form).await
}

fn redirect_to<C: OAuthClient>(providers: &OAuthProviders, client: Option<&C>) -> ApiResult<Response> {
    let client = client.ok_or(ApiError::OAuthNotConfigured)?;
    let state = providers.states.issue(client.provider());
    let url = client
        .authorize_url(&state)
        .map_err(|e| ApiError::InternalServerError(e.to_string()))?;

    Ok((StatusCode::FOUND, [(header::LOCATION, url)]).into_response())
}

/// GET /oauth/login/github
async fn login_github(State(providers): State<Arc<OAuthProviders>>) -> ApiResult<Response> {
    redirect_to(&providers, providers.github.as_ref())
}

/// GET /oauth/login/google
async fn login_google(State(providers): State<Arc<OAuthProviders>>) -> ApiResult<Response> {
    redirect_to(&providers, providers.google.as_ref())
}

async fn callback_with<C: OAuthClient>(
    auth: &AuthService,
    providers: &OAuthProviders,
    client: Option<&C>,
    query: CallbackQuery,
) -> ApiResult<ApiResponse<JwtToken>> {
    let client = client.ok_or(ApiError::OAuthNotConfigured)?;

    let state = query.state.ok_or(ApiError::OAuthStateMismatch)?;
    if !providers.states.consume(&state, client.provider()) {
        return Err(ApiError::OAuthStateMismatch);
    }
    let code = query.code.ok_or(ApiError::OAuthFormDataInvalid)?;

    let tokens = auth.log_in_oauth(client, &code, None).await?;

    Ok(ApiResponse::ok(tokens))
}

/// GET /oauth/callback/github
async fn callback_github(
    State(auth): State<AuthService>,
    State(providers): State<Arc<OAuthProviders>>,
    AppQuery(query): AppQuery<CallbackQuery>,
) -> ApiResult<ApiResponse<JwtToken>> {
    callback_with(&auth, &providers, providers.github.as_ref(), query).await
}

/// GET /oauth/callback/google
async fn callback_google(
    State(auth): State<AuthService>,
    State(providers): State<Arc<OAuthProviders>>,
    AppQuery(query): AppQuery<CallbackQuery>,
) -> ApiResult<ApiResponse<JwtToken>> {
    callback_with(&auth, &providers, providers.google.as_ref(), query).await
}

/// POST /refresh
async fn refresh(
    State(auth): State<AuthService>,
    AppJson(request): AppJson<RefreshRequest>,
) -> ApiResult<ApiResponse<JwtToken>> {
    tracing::debug!("Token refresh request");

    let tokens = auth.refresh(&request.refresh_token).await?;

    Ok(ApiResponse::ok(tokens))
}

/// POST /logout
async fn logout(
    State(auth): State<AuthService>,
    AppJson(request): AppJson<RefreshRequest>,
) -> ApiResult<ApiResponse<LogoutResponse>> {
    let revoked = auth.log_out(&request.refresh_token).await?;

    Ok(ApiResponse::ok(LogoutResponse { revoked }))
}

/// GET /me
async fn me(
    State(auth): State<AuthService>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<ApiResponse<UserOut>> {
    Ok(ApiResponse::ok(auth.user_out(user).await?))
}
