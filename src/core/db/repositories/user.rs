//! User repository for database operations
//!
//! Provides CRUD operations for users. Credentials live in the `oauth` table,
//! see [`super::OAuthRepository`].

use sqlx::{PgExecutor, PgPool};

use crate::core::db::models::{CreateUser, Role, UpdateUser, User};

use super::is_unique_violation;

const USER_COLUMNS: &str = "id, name, email, role, created_at, updated_at";

/// User repository error types
#[derive(Debug, thiserror::Error)]
pub enum UserRepositoryError {
    #[error("User not found")]
    NotFound,

    #[error("Email already exists")]
    EmailAlreadyExists,

    #[error("Database error: {0}")]
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for UserRepositoryError {
    fn from(err: sqlx::Error) -> Self {
        if is_unique_violation(&err) {
            UserRepositoryError::EmailAlreadyExists
        } else {
            UserRepositoryError::DatabaseError(err)
        }
    }
}

/// User repository for database operations
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a user through the given executor
    pub async fn insert<'e, E>(executor: E, dto: &CreateUser) -> Result<User, UserRepositoryError>
    where
        E: PgExecutor<'e>,
    {
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (name, email, role) VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
        ))
        .bind(&dto.name)
        .bind(&dto.email)
        .bind(dto.role)
        .fetch_one(executor)
        .await?;

        Ok(user)
    }

    /// Create a user
    pub async fn create(&self, dto: &CreateUser) -> Result<User, UserRepositoryError> {
        Self::insert(&self.pool, dto).await
    }

    /// Find a user by ID
    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>, UserRepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Find a user by email
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserRepositoryError> {
        Self::find_by_email_with(&self.pool, email).await
    }

    /// Find a user by email through the given executor
    pub async fn find_by_email_with<'e, E>(
        executor: E,
        email: &str,
    ) -> Result<Option<User>, UserRepositoryError>
    where
        E: PgExecutor<'e>,
    {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(executor)
        .await?;

        Ok(user)
    }

    /// List all users, oldest first
    pub async fn list(&self) -> Result<Vec<User>, UserRepositoryError> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    /// Update the provided columns of a user
    pub async fn update(&self, id: i64, updates: &UpdateUser) -> Result<User, UserRepositoryError> {
        Self::update_with(&self.pool, id, updates).await
    }

    pub async fn update_with<'e, E>(
        executor: E,
        id: i64,
        updates: &UpdateUser,
    ) -> Result<User, UserRepositoryError>
    where
        E: PgExecutor<'e>,
    {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET
                name = COALESCE($2, name),
                email = COALESCE($3, email)
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&updates.name)
        .bind(&updates.email)
        .fetch_optional(executor)
        .await?;

        user.ok_or(UserRepositoryError::NotFound)
    }

    /// Set the role of a user
    pub async fn update_role(&self, id: i64, role: Role) -> Result<User, UserRepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET role = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(role)
        .fetch_optional(&self.pool)
        .await?;

        user.ok_or(UserRepositoryError::NotFound)
    }

    /// Delete a user by ID, returning the deleted row
    ///
    /// Credentials and sessions go with it (ON DELETE CASCADE).
    pub async fn delete_with<'e, E>(executor: E, id: i64) -> Result<Option<User>, UserRepositoryError>
    where
        E: PgExecutor<'e>,
    {
        let user = sqlx::query_as::<_, User>(&format!(
            "DELETE FROM users WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await?;

        Ok(user)
    }

    /// Delete a user by ID
    pub async fn delete(&self, id: i64) -> Result<bool, UserRepositoryError> {
        Ok(Self::delete_with(&self.pool, id).await?.is_some())
    }

    /// Count total users
    pub async fn count(&self) -> Result<i64, UserRepositoryError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }
}
