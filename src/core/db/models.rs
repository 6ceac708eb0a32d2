//! Database models
//!
//! Entity structs that map to PostgreSQL tables, plus the outbound shapes
//! (`*Out`) the API returns for them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::FromRow;

// ============================================================================
// Enums
// ============================================================================

/// Account role, stored as SMALLINT and serialized as its integer value
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Default)]
#[repr(i16)]
pub enum Role {
    Admin = 0,
    #[default]
    User = 1,
}

impl Role {
    pub fn is_admin(self) -> bool {
        self == Role::Admin
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i16(*self as i16)
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match i16::deserialize(deserializer)? {
            0 => Ok(Role::Admin),
            1 => Ok(Role::User),
            other => Err(serde::de::Error::custom(format!("unknown role {other}"))),
        }
    }
}

/// Login method attached to a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Password,
    Github,
    Google,
}

impl std::fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OAuthProvider::Password => write!(f, "password"),
            OAuthProvider::Github => write!(f, "github"),
            OAuthProvider::Google => write!(f, "google"),
        }
    }
}

// ============================================================================
// User Model
// ============================================================================

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User data for creation
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// User data for updates; `None` leaves the column untouched
#[derive(Debug, Clone, Default)]
pub struct UpdateUser {
    pub name: Option<String>,
    pub email: Option<String>,
}

// ============================================================================
// OAuth Model
// ============================================================================

/// Login credential of a user for one provider
///
/// `password` holds the bcrypt hash for the password provider; `oauth_id`
/// and `oauth_token` hold the remote account id and the last provider token.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OAuth {
    pub id: i64,
    pub user_id: i64,
    pub provider: OAuthProvider,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub oauth_id: Option<String>,
    #[serde(skip_serializing)]
    pub oauth_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Credential data for creation
#[derive(Debug, Clone)]
pub struct CreateOAuth {
    pub user_id: i64,
    pub provider: OAuthProvider,
    pub password: Option<String>,
    pub oauth_id: Option<String>,
    pub oauth_token: Option<String>,
}

impl CreateOAuth {
    /// Password credential carrying an already hashed secret
    pub fn password(user_id: i64, password_hash: String) -> Self {
        Self {
            user_id,
            provider: OAuthProvider::Password,
            password: Some(password_hash),
            oauth_id: None,
            oauth_token: None,
        }
    }

    /// Third-party credential
    pub fn remote(user_id: i64, provider: OAuthProvider, oauth_id: String, token: String) -> Self {
        Self {
            user_id,
            provider,
            password: None,
            oauth_id: Some(oauth_id),
            oauth_token: Some(token),
        }
    }
}

/// Credential without secrets (for API responses)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthOut {
    pub id: i64,
    pub provider: OAuthProvider,
    #[serde(with = "crate::core::response::local_time")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::core::response::local_time")]
    pub updated_at: DateTime<Utc>,
}

impl From<OAuth> for OAuthOut {
    fn from(oauth: OAuth) -> Self {
        Self {
            id: oauth.id,
            provider: oauth.provider,
            created_at: oauth.created_at,
            updated_at: oauth.updated_at,
        }
    }
}

/// User with linked login methods (for API responses)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserOut {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub oauth: Vec<OAuthOut>,
    #[serde(with = "crate::core::response::local_time")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::core::response::local_time")]
    pub updated_at: DateTime<Utc>,
}

impl UserOut {
    pub fn new(user: User, oauth: Vec<OAuth>) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            oauth: oauth.into_iter().map(OAuthOut::from).collect(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

// ============================================================================
// Session Model
// ============================================================================

/// Session entity for refresh tokens
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Jmy Models
// ============================================================================

/// Company row of the jmy table
#[derive(Debug, Clone, FromRow)]
pub struct JmyCompany {
    pub id: i64,
    pub name: String,
    pub year: i32,
    pub location: String,
    pub address: String,
    #[sqlx(rename = "type")]
    pub type_: String,
    pub size: String,
    pub research: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Company data for creation
#[derive(Debug, Clone)]
pub struct CreateJmyCompany {
    pub name: String,
    pub year: i32,
    pub location: String,
    pub address: String,
    pub type_: String,
    pub size: String,
    pub research: Option<String>,
}

/// One headcount observation of a company
#[derive(Debug, Clone, FromRow)]
pub struct JmyTimeSeries {
    pub id: i64,
    pub company_id: i64,
    pub date: DateTime<Utc>,
    pub b_assigned: i32,
    pub b_new: i32,
    pub b_old: i32,
    pub a_assigned: i32,
    pub a_new: i32,
    pub a_old: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Observation data for creation
#[derive(Debug, Clone)]
pub struct CreateJmyTimeSeries {
    pub date: DateTime<Utc>,
    pub b_assigned: i32,
    pub b_new: i32,
    pub b_old: i32,
    pub a_assigned: i32,
    pub a_new: i32,
    pub a_old: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JmyTimeSeriesOut {
    pub id: i64,
    #[serde(with = "crate::core::response::local_time")]
    pub date: DateTime<Utc>,
    pub b_assigned: i32,
    pub b_new: i32,
    pub b_old: i32,
    pub a_assigned: i32,
    pub a_new: i32,
    pub a_old: i32,
    #[serde(with = "crate::core::response::local_time")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::core::response::local_time")]
    pub updated_at: DateTime<Utc>,
}

impl From<JmyTimeSeries> for JmyTimeSeriesOut {
    fn from(point: JmyTimeSeries) -> Self {
        Self {
            id: point.id,
            date: point.date,
            b_assigned: point.b_assigned,
            b_new: point.b_new,
            b_old: point.b_old,
            a_assigned: point.a_assigned,
            a_new: point.a_new,
            a_old: point.a_old,
            created_at: point.created_at,
            updated_at: point.updated_at,
        }
    }
}

/// Company with its full series (for API responses)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JmyCompanyOut {
    pub id: i64,
    pub name: String,
    pub year: i32,
    pub location: String,
    pub address: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub size: String,
    pub research: Option<String>,
    pub time_series: Vec<JmyTimeSeriesOut>,
    #[serde(with = "crate::core::response::local_time")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::core::response::local_time")]
    pub updated_at: DateTime<Utc>,
}

impl JmyCompanyOut {
    pub fn new(company: JmyCompany, time_series: Vec<JmyTimeSeries>) -> Self {
        Self {
            id: company.id,
            name: company.name,
            year: company.year,
            location: company.location,
            address: company.address,
            type_: company.type_,
            size: company.size,
            research: company.research,
            time_series: time_series.into_iter().map(Into::into).collect(),
            created_at: company.created_at,
            updated_at: company.updated_at,
        }
    }
}
