//! Session repository for refresh token management
//!
//! Handles storage and validation of refresh tokens for JWT authentication.
//! Tokens are stored as SHA-256 hashes, never in the clear.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::{PgExecutor, PgPool};

use crate::core::db::models::Session;

const SESSION_COLUMNS: &str = "id, user_id, token_hash, expires_at, created_at";

/// Session repository error types
#[derive(Debug, thiserror::Error)]
pub enum SessionRepositoryError {
    #[error("Session not found")]
    NotFound,

    #[error("Session expired")]
    Expired,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Session repository for database operations
#[derive(Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    /// Create a new session repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Hash a token using SHA-256
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Store a session for a raw refresh token through the given executor
    pub async fn insert<'e, E>(
        executor: E,
        user_id: i64,
        raw_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Session, SessionRepositoryError>
    where
        E: PgExecutor<'e>,
    {
        let session = sqlx::query_as::<_, Session>(&format!(
            r#"
            INSERT INTO sessions (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(Self::hash_token(raw_token))
        .bind(expires_at)
        .fetch_one(executor)
        .await?;

        Ok(session)
    }

    /// Store a session for a raw refresh token
    pub async fn create(
        &self,
        user_id: i64,
        raw_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Session, SessionRepositoryError> {
        Self::insert(&self.pool, user_id, raw_token, expires_at).await
    }

    /// Find a session by raw token (will be hashed for lookup)
    pub async fn find_by_token(
        &self,
        raw_token: &str,
    ) -> Result<Option<Session>, SessionRepositoryError> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE token_hash = $1"
        ))
        .bind(Self::hash_token(raw_token))
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Validate a session token and return the session if valid
    /// Returns None if token not found, Err if expired
    pub async fn validate_token(
        &self,
        raw_token: &str,
    ) -> Result<Option<Session>, SessionRepositoryError> {
        let session = match self.find_by_token(raw_token).await? {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.expires_at < Utc::now() {
            self.delete(session.id).await?;
            return Err(SessionRepositoryError::Expired);
        }

        Ok(Some(session))
    }

    /// Delete a session by ID
    pub async fn delete(&self, id: i64) -> Result<bool, SessionRepositoryError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a session by raw token through the given executor
    pub async fn remove_token<'e, E>(executor: E, raw_token: &str) -> Result<bool, SessionRepositoryError>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(Self::hash_token(raw_token))
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a session by raw token
    pub async fn delete_by_token(&self, raw_token: &str) -> Result<bool, SessionRepositoryError> {
        Self::remove_token(&self.pool, raw_token).await
    }

    /// Delete all sessions for a user through the given executor
    pub async fn remove_all_for_user<'e, E>(executor: E, user_id: i64) -> Result<u64, SessionRepositoryError>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }

    /// Delete all sessions for a user (logout from all devices)
    pub async fn delete_all_for_user(&self, user_id: i64) -> Result<u64, SessionRepositoryError> {
        Self::remove_all_for_user(&self.pool, user_id).await
    }

    /// Clean up expired sessions
    pub async fn cleanup_expired(&self) -> Result<u64, SessionRepositoryError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Count active sessions for a user
    pub async fn count_user_sessions(&self, user_id: i64) -> Result<i64, SessionRepositoryError> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM sessions
            WHERE user_id = $1 AND expires_at > NOW()
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0)
    }
}
