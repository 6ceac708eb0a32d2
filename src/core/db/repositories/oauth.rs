//! Credential repository
//!
//! Every login method of a user is one row of the `oauth` table: the bcrypt
//! hash for the password provider, or the remote account id and token for a
//! third-party provider. A user has at most one row per provider.

use sqlx::{PgExecutor, PgPool};

use crate::core::db::models::{CreateOAuth, OAuth, OAuthProvider};

const OAUTH_COLUMNS: &str =
    "id, user_id, provider, password, oauth_id, oauth_token, created_at, updated_at";

/// Credential repository for database operations
#[derive(Clone)]
pub struct OAuthRepository {
    pool: PgPool,
}

impl OAuthRepository {
    /// Create a new credential repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a credential through the given executor
    pub async fn insert<'e, E>(executor: E, dto: &CreateOAuth) -> Result<OAuth, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, OAuth>(&format!(
            r#"
            INSERT INTO oauth (user_id, provider, password, oauth_id, oauth_token)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {OAUTH_COLUMNS}
            "#
        ))
        .bind(dto.user_id)
        .bind(dto.provider)
        .bind(&dto.password)
        .bind(&dto.oauth_id)
        .bind(&dto.oauth_token)
        .fetch_one(executor)
        .await
    }

    /// Insert a credential
    pub async fn create(&self, dto: &CreateOAuth) -> Result<OAuth, sqlx::Error> {
        Self::insert(&self.pool, dto).await
    }

    /// Find the credential a user holds for a provider
    pub async fn find_by_user_id_and_provider(
        &self,
        user_id: i64,
        provider: OAuthProvider,
    ) -> Result<Option<OAuth>, sqlx::Error> {
        sqlx::query_as::<_, OAuth>(&format!(
            "SELECT {OAUTH_COLUMNS} FROM oauth WHERE user_id = $1 AND provider = $2"
        ))
        .bind(user_id)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await
    }

    /// Find the credential bound to a remote account
    pub async fn find_by_oauth_id_and_provider(
        &self,
        oauth_id: &str,
        provider: OAuthProvider,
    ) -> Result<Option<OAuth>, sqlx::Error> {
        sqlx::query_as::<_, OAuth>(&format!(
            "SELECT {OAUTH_COLUMNS} FROM oauth WHERE oauth_id = $1 AND provider = $2"
        ))
        .bind(oauth_id)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await
    }

    /// All credentials of a user
    pub async fn find_by_user_id(&self, user_id: i64) -> Result<Vec<OAuth>, sqlx::Error> {
        Self::find_by_user_id_with(&self.pool, user_id).await
    }

    pub async fn find_by_user_id_with<'e, E>(
        executor: E,
        user_id: i64,
    ) -> Result<Vec<OAuth>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, OAuth>(&format!(
            "SELECT {OAUTH_COLUMNS} FROM oauth WHERE user_id = $1 ORDER BY id"
        ))
        .bind(user_id)
        .fetch_all(executor)
        .await
    }

    /// All credentials of several users in one round trip
    pub async fn find_by_user_ids(&self, user_ids: &[i64]) -> Result<Vec<OAuth>, sqlx::Error> {
        sqlx::query_as::<_, OAuth>(&format!(
            "SELECT {OAUTH_COLUMNS} FROM oauth WHERE user_id = ANY($1) ORDER BY id"
        ))
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await
    }

    /// Replace the stored provider token of a credential
    pub async fn update_token(&self, id: i64, oauth_token: &str) -> Result<OAuth, sqlx::Error> {
        sqlx::query_as::<_, OAuth>(&format!(
            "UPDATE oauth SET oauth_token = $2 WHERE id = $1 RETURNING {OAUTH_COLUMNS}"
        ))
        .bind(id)
        .bind(oauth_token)
        .fetch_one(&self.pool)
        .await
    }

    /// Set the password hash of a user, creating the credential when missing
    pub async fn upsert_password<'e, E>(
        executor: E,
        user_id: i64,
        password_hash: &str,
    ) -> Result<OAuth, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, OAuth>(&format!(
            r#"
            INSERT INTO oauth (user_id, provider, password)
            VALUES ($1, 'password', $2)
            ON CONFLICT (user_id, provider) DO UPDATE SET password = EXCLUDED.password
            RETURNING {OAUTH_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(password_hash)
        .fetch_one(executor)
        .await
    }
}
