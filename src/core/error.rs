//! HTTP-facing error type
//!
//! Every failure a handler can return ends up as an [`ApiError`], rendered
//! as the response envelope with `data: null` and a `"[Variant] message"`
//! message.

use axum::{
    extract::{
        FromRequest, FromRequestParts,
        rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::core::auth::crypt::CryptError;
use crate::core::auth::jwt::JwtError;
use crate::core::db::repositories::{SessionRepositoryError, UserRepositoryError};
use crate::core::db::repositories::is_unique_violation;
use crate::core::response::ApiResponse;

/// Business and infrastructure failures with their HTTP mapping
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("User already exists. Please use a different email.")]
    UserAlreadyExists,

    #[error("User not registered. Please sign up first.")]
    NotRegistered,

    #[error("Login failed. Invalid credentials.")]
    LoginFailed,

    #[error("GitHub OAuth failed.")]
    GitHubOAuthFailed,

    #[error("Google OAuth failed.")]
    GoogleOAuthFailed,

    #[error("Invalid OAuth form data.")]
    OAuthFormDataInvalid,

    #[error("OAuth state is missing, unknown or expired.")]
    OAuthStateMismatch,

    #[error("OAuth provider is not configured.")]
    OAuthNotConfigured,

    #[error("Not authenticated.")]
    NotAuthenticated,

    #[error("Token decode error.")]
    TokenDecodeError,

    #[error("Expired token.")]
    TokenExpired,

    #[error("Entity not found in the database.")]
    EntityNotFound,

    #[error("Entity already exists in the database.")]
    EntityAlreadyExists,

    #[error("The input provided is invalid: {0}")]
    InvalidInput(String),

    /// Detail is logged, never sent to the client
    #[error("Database error occurred.")]
    DatabaseException(String),

    #[error("{0}")]
    InternalServerError(String),
}

impl ApiError {
    /// Variant name used as the message prefix
    pub fn name(&self) -> &'static str {
        match self {
            ApiError::UserAlreadyExists => "UserAlreadyExists",
            ApiError::NotRegistered => "NotRegistered",
            ApiError::LoginFailed => "LoginFailed",
            ApiError::GitHubOAuthFailed => "GitHubOAuthFailed",
            ApiError::GoogleOAuthFailed => "GoogleOAuthFailed",
            ApiError::OAuthFormDataInvalid => "OAuthFormDataInvalid",
            ApiError::OAuthStateMismatch => "OAuthStateMismatch",
            ApiError::OAuthNotConfigured => "OAuthNotConfigured",
            ApiError::NotAuthenticated => "NotAuthenticated",
            ApiError::TokenDecodeError => "TokenDecodeError",
            ApiError::TokenExpired => "TokenExpired",
            ApiError::EntityNotFound => "EntityNotFound",
            ApiError::EntityAlreadyExists => "EntityAlreadyExists",
            ApiError::InvalidInput(_) => "InvalidInput",
            ApiError::DatabaseException(_) => "DatabaseException",
            ApiError::InternalServerError(_) => "InternalServerError",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::UserAlreadyExists | ApiError::EntityAlreadyExists => StatusCode::CONFLICT,
            ApiError::NotRegistered | ApiError::EntityNotFound => StatusCode::NOT_FOUND,
            ApiError::LoginFailed => StatusCode::UNAUTHORIZED,
            ApiError::GitHubOAuthFailed
            | ApiError::GoogleOAuthFailed
            | ApiError::OAuthFormDataInvalid
            | ApiError::OAuthStateMismatch
            | ApiError::TokenDecodeError
            | ApiError::TokenExpired => StatusCode::BAD_REQUEST,
            ApiError::OAuthNotConfigured => StatusCode::NOT_IMPLEMENTED,
            ApiError::NotAuthenticated => StatusCode::FORBIDDEN,
            ApiError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::DatabaseException(_) | ApiError::InternalServerError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Client-facing message, `"[Variant] message"`
    pub fn message(&self) -> String {
        format!("[{}] {}", self.name(), self)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            ApiError::DatabaseException(detail) => {
                tracing::error!(error = %detail, "Database error");
            }
            ApiError::InternalServerError(detail) => {
                tracing::error!(error = %detail, "Internal server error");
            }
            _ => tracing::warn!(status = status.as_u16(), "{}", self.message()),
        }

        ApiResponse::error(status, self.message()).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        if is_unique_violation(&err) {
            return ApiError::EntityAlreadyExists;
        }
        match err {
            sqlx::Error::RowNotFound => ApiError::EntityNotFound,
            other => ApiError::DatabaseException(other.to_string()),
        }
    }
}

impl From<UserRepositoryError> for ApiError {
    fn from(err: UserRepositoryError) -> Self {
        match err {
            UserRepositoryError::NotFound => ApiError::EntityNotFound,
            UserRepositoryError::EmailAlreadyExists => ApiError::EntityAlreadyExists,
            UserRepositoryError::DatabaseError(e) => ApiError::DatabaseException(e.to_string()),
        }
    }
}

impl From<SessionRepositoryError> for ApiError {
    fn from(err: SessionRepositoryError) -> Self {
        match err {
            SessionRepositoryError::NotFound => ApiError::TokenDecodeError,
            SessionRepositoryError::Expired => ApiError::TokenExpired,
            SessionRepositoryError::DatabaseError(e) => ApiError::DatabaseException(e.to_string()),
        }
    }
}

impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => ApiError::TokenExpired,
            JwtError::EncodingError(detail) => ApiError::InternalServerError(detail),
            JwtError::DecodingError(_) | JwtError::InvalidToken | JwtError::InvalidTokenType => {
                ApiError::TokenDecodeError
            }
        }
    }
}

impl From<CryptError> for ApiError {
    fn from(err: CryptError) -> Self {
        ApiError::InternalServerError(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidInput(rejection.body_text())
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        ApiError::InvalidInput(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::InvalidInput(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::InvalidInput(rejection.body_text())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// JSON body whose rejection renders as [`ApiError::InvalidInput`]
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct AppJson<T>(pub T);

/// Form body whose rejection renders as [`ApiError::InvalidInput`]
#[derive(FromRequest)]
#[from_request(via(axum::Form), rejection(ApiError))]
pub struct AppForm<T>(pub T);

/// Query string whose rejection renders as [`ApiError::InvalidInput`]
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct AppQuery<T>(pub T);

/// Path parameters whose rejection renders as [`ApiError::InvalidInput`]
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct AppPath<T>(pub T);
