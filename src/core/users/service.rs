//! User administration service

use std::collections::HashMap;

use serde::Deserialize;

use crate::core::auth::crypt::CryptService;
use crate::core::auth::service::AuthService;
use crate::core::db::PgPool;
use crate::core::db::models::{OAuth, UpdateUser, UserOut};
use crate::core::db::repositories::{OAuthRepository, SessionRepository, UserRepository};
use crate::core::error::{ApiError, ApiResult};

/// Full replacement of the editable user fields
#[derive(Debug, Clone, Deserialize)]
pub struct UserPutRequest {
    pub name: String,
    pub email: String,
}

/// Partial update; absent fields keep their value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatchRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    /// New login password, stored as a bcrypt hash
    pub password: Option<String>,
}

#[derive(Clone)]
pub struct UserService {
    pool: PgPool,
    users: UserRepository,
    oauth: OAuthRepository,
    crypt: CryptService,
}

impl UserService {
    pub fn new(pool: PgPool, crypt: CryptService) -> Self {
        Self {
            users: UserRepository::new(pool.clone()),
            oauth: OAuthRepository::new(pool.clone()),
            pool,
            crypt,
        }
    }

    /// Every user with its credentials, oldest first
    pub async fn get_all(&self) -> ApiResult<Vec<UserOut>> {
        let users = self.users.list().await?;
        let ids: Vec<i64> = users.iter().map(|u| u.id).collect();

        let mut credentials: HashMap<i64, Vec<OAuth>> = HashMap::new();
        for credential in self.oauth.find_by_user_ids(&ids).await? {
            credentials.entry(credential.user_id).or_default().push(credential);
        }

        Ok(users
            .into_iter()
            .map(|user| {
                let oauth = credentials.remove(&user.id).unwrap_or_default();
                UserOut::new(user, oauth)
            })
            .collect())
    }

    pub async fn get_by_id(&self, id: i64) -> ApiResult<UserOut> {
        let user = self
            .users
            .find_by_id(id)
            .await?
            .ok_or(ApiError::EntityNotFound)?;
        let oauth = self.oauth.find_by_user_id(user.id).await?;

        Ok(UserOut::new(user, oauth))
    }

    pub async fn put_by_id(&self, id: i64, request: UserPutRequest) -> ApiResult<UserOut> {
        AuthService::validate_required("name", &request.name)?;
        AuthService::validate_email(&request.email)?;

        let user = self
            .users
            .update(
                id,
                &UpdateUser {
                    name: Some(request.name),
                    email: Some(request.email),
                },
            )
            .await?;
        let oauth = self.oauth.find_by_user_id(user.id).await?;

        tracing::info!(user_id = user.id, "User replaced");

        Ok(UserOut::new(user, oauth))
    }

    /// Apply the provided fields; a new password revokes every session
    pub async fn patch_by_id(&self, id: i64, request: UserPatchRequest) -> ApiResult<UserOut> {
        if let Some(name) = &request.name {
            AuthService::validate_required("name", name)?;
        }
        if let Some(email) = &request.email {
            AuthService::validate_email(email)?;
        }
        let password_hash = match &request.password {
            Some(password) => {
                AuthService::validate_required("password", password)?;
                Some(self.crypt.hash(password)?)
            }
            None => None,
        };

        let mut tx = self.pool.begin().await?;
        let user = UserRepository::update_with(
            &mut *tx,
            id,
            &UpdateUser {
                name: request.name,
                email: request.email,
            },
        )
        .await?;
        if let Some(hash) = password_hash {
            OAuthRepository::upsert_password(&mut *tx, user.id, &hash).await?;
            let revoked = SessionRepository::remove_all_for_user(&mut *tx, user.id).await?;
            tracing::info!(user_id = user.id, revoked, "Password reset by admin");
        }
        let oauth = OAuthRepository::find_by_user_id_with(&mut *tx, user.id).await?;
        tx.commit().await?;

        Ok(UserOut::new(user, oauth))
    }

    /// Delete a user, returning it as it was
    pub async fn delete_by_id(&self, id: i64) -> ApiResult<UserOut> {
        let mut tx = self.pool.begin().await?;
        let oauth = OAuthRepository::find_by_user_id_with(&mut *tx, id).await?;
        let user = UserRepository::delete_with(&mut *tx, id)
            .await?
            .ok_or(ApiError::EntityNotFound)?;
        tx.commit().await?;

        tracing::info!(user_id = user.id, "User deleted");

        Ok(UserOut::new(user, oauth))
    }
}
