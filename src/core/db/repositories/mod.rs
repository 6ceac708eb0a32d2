//! Database repositories
//!
//! Repositories encapsulate data access logic and provide a clean API for
//! the services. Writes that must share a transaction are exposed as
//! associated functions taking any Postgres executor (`&PgPool` or
//! `&mut *tx`).

pub mod jmy;
pub mod oauth;
pub mod session;
pub mod user;

pub use jmy::JmyRepository;
pub use oauth::OAuthRepository;
pub use session::{SessionRepository, SessionRepositoryError};
pub use user::{UserRepository, UserRepositoryError};

/// Whether the error is a violated UNIQUE constraint
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}
