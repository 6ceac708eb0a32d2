//! Authentication service
//!
//! Registration, password and OAuth login, refresh-token rotation and
//! access-token verification. Coordinates the user, credential and session
//! repositories with the JWT and bcrypt services.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::core::auth::crypt::CryptService;
use crate::core::auth::jwt::{JwtService, JwtToken};
use crate::core::auth::oauth::{OAuthClient, OAuthError, OAuthUserInfo};
use crate::core::config::AdminConfig;
use crate::core::db::models::{CreateOAuth, CreateUser, OAuthProvider, Role, User, UserOut};
use crate::core::db::repositories::{
    OAuthRepository, SessionRepository, UserRepository, UserRepositoryError,
};
use crate::core::db::PgPool;
use crate::core::error::{ApiError, ApiResult};

/// How often expired refresh sessions are swept
pub const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

pub const GRANT_PASSWORD: &str = "password";
pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";

/// Password registration data
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Refresh or logout body
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Reject a form whose `grant_type` is not the one the endpoint serves
pub fn check_grant_type(expected: &str, given: Option<&str>) -> ApiResult<()> {
    match given {
        Some(grant_type) if grant_type == expected => Ok(()),
        _ => Err(ApiError::OAuthFormDataInvalid),
    }
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    pool: PgPool,
    users: UserRepository,
    oauth: OAuthRepository,
    sessions: SessionRepository,
    jwt: JwtService,
    crypt: CryptService,
}

impl AuthService {
    pub fn new(pool: PgPool, jwt: JwtService, crypt: CryptService) -> Self {
        Self {
            users: UserRepository::new(pool.clone()),
            oauth: OAuthRepository::new(pool.clone()),
            sessions: SessionRepository::new(pool.clone()),
            pool,
            jwt,
            crypt,
        }
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    /// Validate email format
    pub(crate) fn validate_email(email: &str) -> ApiResult<()> {
        let invalid = || ApiError::InvalidInput(format!("'{email}' is not a valid email address"));

        let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
        if local.is_empty() || domain.is_empty() || domain.contains('@') {
            return Err(invalid());
        }

        // Domain needs at least one dot and no empty labels
        if !domain.contains('.') || domain.split('.').any(str::is_empty) {
            return Err(invalid());
        }

        Ok(())
    }

    pub(crate) fn validate_required(field: &str, value: &str) -> ApiResult<()> {
        if value.trim().is_empty() {
            return Err(ApiError::InvalidInput(format!("{field} must not be empty")));
        }
        Ok(())
    }

    /// Credentials of a user, shaped for responses
    pub async fn user_out(&self, user: User) -> ApiResult<UserOut> {
        let credentials = self.oauth.find_by_user_id(user.id).await?;
        Ok(UserOut::new(user, credentials))
    }

    /// Register a new user with a password credential
    pub async fn register(&self, request: RegisterRequest) -> ApiResult<UserOut> {
        Self::validate_required("name", &request.name)?;
        Self::validate_required("password", &request.password)?;
        Self::validate_email(&request.email)?;

        if self.users.find_by_email(&request.email).await?.is_some() {
            return Err(ApiError::UserAlreadyExists);
        }

        let password_hash = self.crypt.hash(&request.password)?;

        let mut tx = self.pool.begin().await?;
        let user = UserRepository::insert(
            &mut *tx,
            &CreateUser {
                name: request.name,
                email: request.email,
                role: Role::User,
            },
        )
        .await
        .map_err(|err| match err {
            UserRepositoryError::EmailAlreadyExists => ApiError::UserAlreadyExists,
            other => other.into(),
        })?;
        let credential =
            OAuthRepository::insert(&mut *tx, &CreateOAuth::password(user.id, password_hash))
                .await?;
        tx.commit().await?;

        tracing::info!(user_id = user.id, "User registered with password");

        Ok(UserOut::new(user, vec![credential]))
    }

    /// Exchange email and password for a token pair
    pub async fn log_in_password(&self, email: &str, password: &str) -> ApiResult<JwtToken> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(ApiError::NotRegistered)?;

        let credential = self
            .oauth
            .find_by_user_id_and_provider(user.id, OAuthProvider::Password)
            .await?
            .ok_or(ApiError::LoginFailed)?;

        let hash = credential.password.as_deref().ok_or(ApiError::LoginFailed)?;
        if !self.crypt.verify(password, hash) {
            return Err(ApiError::LoginFailed);
        }

        tracing::info!(user_id = user.id, "Password login");

        self.issue_tokens(user.id).await
    }

    /// Exchange a provider authorization code for a token pair
    pub async fn log_in_oauth<C: OAuthClient>(
        &self,
        client: &C,
        code: &str,
        redirect_uri: Option<&str>,
    ) -> ApiResult<JwtToken> {
        let provider = client.provider();
        let info = client
            .exchange(code, redirect_uri)
            .await
            .map_err(|err| oauth_failure(provider, err))?;

        let user = self.upsert_oauth_user(&info).await?;

        tracing::info!(user_id = user.id, %provider, "OAuth login");

        self.issue_tokens(user.id).await
    }

    /// Find or create the local account behind a remote profile
    ///
    /// A known remote account gets its stored token refreshed. Otherwise the
    /// credential is linked to the user with the same email, or to a new user.
    async fn upsert_oauth_user(&self, info: &OAuthUserInfo) -> ApiResult<User> {
        if let Some(credential) = self
            .oauth
            .find_by_oauth_id_and_provider(&info.oauth_id, info.provider)
            .await?
        {
            self.oauth.update_token(credential.id, &info.token).await?;
            return self
                .users
                .find_by_id(credential.user_id)
                .await?
                .ok_or(ApiError::EntityNotFound);
        }

        let mut tx = self.pool.begin().await?;
        let user = match UserRepository::find_by_email_with(&mut *tx, &info.email).await? {
            Some(user) => user,
            None => {
                UserRepository::insert(
                    &mut *tx,
                    &CreateUser {
                        name: info.name.clone(),
                        email: info.email.clone(),
                        role: Role::User,
                    },
                )
                .await?
            }
        };
        OAuthRepository::insert(
            &mut *tx,
            &CreateOAuth::remote(user.id, info.provider, info.oauth_id.clone(), info.token.clone()),
        )
        .await?;
        tx.commit().await?;

        Ok(user)
    }

    /// Sign a token pair and remember the refresh token
    async fn issue_tokens(&self, user_id: i64) -> ApiResult<JwtToken> {
        let tokens = self.jwt.generate_token_pair(user_id)?;
        let expires_at = Utc::now() + self.jwt.refresh_token_lifetime();

        self.sessions
            .create(user_id, &tokens.refresh_token, expires_at)
            .await?;

        Ok(tokens)
    }

    /// Delete every expired refresh session
    pub async fn purge_expired_sessions(&self) -> ApiResult<u64> {
        let removed = self.sessions.cleanup_expired().await?;
        if removed > 0 {
            tracing::info!(removed, "Expired sessions purged");
        }
        Ok(removed)
    }

    /// Purge expired sessions now and then once per `every`
    pub fn spawn_session_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let auth = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                if let Err(err) = auth.purge_expired_sessions().await {
                    tracing::warn!(error = %err, "Session sweep failed");
                }
            }
        })
    }

    /// Trade a refresh token for a new pair, revoking the old one
    pub async fn refresh(&self, refresh_token: &str) -> ApiResult<JwtToken> {
        let claims = self.jwt.validate_refresh_token(refresh_token)?;
        let user_id = claims.user_id()?;

        let session = self
            .sessions
            .validate_token(refresh_token)
            .await?
            .ok_or(ApiError::TokenDecodeError)?;
        if session.user_id != user_id {
            return Err(ApiError::TokenDecodeError);
        }

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(ApiError::NotRegistered)?;

        let tokens = self.jwt.generate_token_pair(user.id)?;
        let expires_at = Utc::now() + self.jwt.refresh_token_lifetime();

        let mut tx = self.pool.begin().await?;
        // Losing this race means the token was already spent
        if !SessionRepository::remove_token(&mut *tx, refresh_token).await? {
            return Err(ApiError::TokenDecodeError);
        }
        SessionRepository::insert(&mut *tx, user.id, &tokens.refresh_token, expires_at).await?;
        tx.commit().await?;

        tracing::debug!(user_id = user.id, "Refresh token rotated");

        Ok(tokens)
    }

    /// Revoke a refresh token; false when it was not stored
    pub async fn log_out(&self, refresh_token: &str) -> ApiResult<bool> {
        Ok(self.sessions.delete_by_token(refresh_token).await?)
    }

    /// Resolve an access token to its user
    pub async fn verify(&self, access_token: &str) -> ApiResult<UserOut> {
        let user = self.verify_user(access_token).await?;
        self.user_out(user).await
    }

    /// Resolve an access token to the bare user row
    pub async fn verify_user(&self, access_token: &str) -> ApiResult<User> {
        let claims = self.jwt.validate_access_token(access_token)?;

        self.users
            .find_by_id(claims.user_id()?)
            .await?
            .ok_or(ApiError::NotAuthenticated)
    }

    /// Make sure the configured admin exists, holds the admin role and can
    /// log in with a password
    ///
    /// An existing password is left untouched.
    pub async fn ensure_admin(&self, admin: &AdminConfig) -> ApiResult<User> {
        let user = match self.users.find_by_email(&admin.email).await? {
            Some(user) if user.role.is_admin() => user,
            Some(user) => {
                tracing::info!(user_id = user.id, "Promoting existing user to admin");
                self.users.update_role(user.id, Role::Admin).await?
            }
            None => {
                let user = self
                    .users
                    .create(&CreateUser {
                        name: admin.name.clone(),
                        email: admin.email.clone(),
                        role: Role::Admin,
                    })
                    .await?;
                tracing::info!(user_id = user.id, "Admin account created");
                user
            }
        };

        if self
            .oauth
            .find_by_user_id_and_provider(user.id, OAuthProvider::Password)
            .await?
            .is_none()
        {
            let hash = self.crypt.hash(&admin.password)?;
            self.oauth
                .create(&CreateOAuth::password(user.id, hash))
                .await?;
        }

        Ok(user)
    }
}

/// Map a client failure to the provider's business error
fn oauth_failure(provider: OAuthProvider, err: OAuthError) -> ApiError {
    tracing::warn!(%provider, error = %err, "OAuth exchange failed");
    match provider {
        OAuthProvider::Github => ApiError::GitHubOAuthFailed,
        OAuthProvider::Google => ApiError::GoogleOAuthFailed,
        OAuthProvider::Password => ApiError::OAuthFormDataInvalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::jwt::JwtConfig;
    use crate::core::auth::oauth::OAuthClientConfig;
    use crate::core::auth::oauth::{GitHubClient, OAuthEndpoints};
    use crate::core::db::repositories::test_support::{create_test_pool, unique_email};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_validate_email_valid() {
        assert!(AuthService::validate_email("user@example.com").is_ok());
        assert!(AuthService::validate_email("user.name@example.com").is_ok());
        assert!(AuthService::validate_email("user+tag@example.co.uk").is_ok());
        assert!(AuthService::validate_email("a@b.co").is_ok());
    }

    #[test]
    fn test_validate_email_invalid() {
        assert!(AuthService::validate_email("").is_err());
        assert!(AuthService::validate_email("invalid").is_err());
        assert!(AuthService::validate_email("@example.com").is_err());
        assert!(AuthService::validate_email("user@").is_err());
        assert!(AuthService::validate_email("user@example").is_err());
        assert!(AuthService::validate_email("user@@example.com").is_err());
        assert!(AuthService::validate_email("user@.com").is_err());
        assert!(AuthService::validate_email("user@example.").is_err());
    }

    #[test]
    fn test_validate_required() {
        assert!(AuthService::validate_required("name", "Cook").is_ok());
        assert!(matches!(
            AuthService::validate_required("name", "   "),
            Err(ApiError::InvalidInput(detail)) if detail.contains("name")
        ));
    }

    #[test]
    fn test_check_grant_type() {
        assert!(check_grant_type(GRANT_PASSWORD, Some("password")).is_ok());
        assert!(matches!(
            check_grant_type(GRANT_PASSWORD, Some("authorization_code")),
            Err(ApiError::OAuthFormDataInvalid)
        ));
        assert!(matches!(
            check_grant_type(GRANT_AUTHORIZATION_CODE, None),
            Err(ApiError::OAuthFormDataInvalid)
        ));
    }

    #[test]
    fn test_oauth_failure_per_provider() {
        let err = || OAuthError::Provider("bad_verification_code".into());
        assert!(matches!(
            oauth_failure(OAuthProvider::Github, err()),
            ApiError::GitHubOAuthFailed
        ));
        assert!(matches!(
            oauth_failure(OAuthProvider::Google, err()),
            ApiError::GoogleOAuthFailed
        ));
    }

    #[test]
    fn test_refresh_request_deserialization() {
        let request: RefreshRequest =
            serde_json::from_str(r#"{"refresh_token": "eyJhbGciOiJIUzI1NiJ9.x.y"}"#).unwrap();
        assert!(request.refresh_token.starts_with("eyJ"));
    }

    // ========================================================================
    // Integration Tests (require database)
    // ========================================================================

    async fn create_test_service() -> AuthService {
        let pool = create_test_pool().await;
        AuthService::new(
            pool,
            JwtService::new(JwtConfig::new("service_test_secret")),
            CryptService::with_cost(4),
        )
    }

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            name: "Cook".to_string(),
            email: email.to_string(),
            password: "Password123".to_string(),
        }
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_register_then_log_in() {
        let service = create_test_service().await;
        let email = unique_email("register");

        let user = service.register(register_request(&email)).await.unwrap();
        assert_eq!(user.role, Role::User);
        assert_eq!(user.oauth.len(), 1);
        assert_eq!(user.oauth[0].provider, OAuthProvider::Password);

        let tokens = service.log_in_password(&email, "Password123").await.unwrap();
        let me = service.verify(&tokens.access_token).await.unwrap();
        assert_eq!(me.id, user.id);

        service.users.delete(user.id).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_register_taken_email() {
        let service = create_test_service().await;
        let email = unique_email("taken");

        let user = service.register(register_request(&email)).await.unwrap();
        let result = service.register(register_request(&email)).await;
        assert!(matches!(result, Err(ApiError::UserAlreadyExists)));

        service.users.delete(user.id).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_log_in_failures() {
        let service = create_test_service().await;
        let email = unique_email("login");
        let user = service.register(register_request(&email)).await.unwrap();

        assert!(matches!(
            service.log_in_password(&unique_email("nobody"), "x").await,
            Err(ApiError::NotRegistered)
        ));
        assert!(matches!(
            service.log_in_password(&email, "WrongPassword1").await,
            Err(ApiError::LoginFailed)
        ));

        service.users.delete(user.id).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_refresh_rotates_session() {
        let service = create_test_service().await;
        let email = unique_email("refresh");
        let user = service.register(register_request(&email)).await.unwrap();
        let tokens = service.log_in_password(&email, "Password123").await.unwrap();

        let rotated = service.refresh(&tokens.refresh_token).await.unwrap();
        assert_ne!(rotated.refresh_token, tokens.refresh_token);

        // The old refresh token is spent
        assert!(matches!(
            service.refresh(&tokens.refresh_token).await,
            Err(ApiError::TokenDecodeError)
        ));

        assert!(service.log_out(&rotated.refresh_token).await.unwrap());
        assert!(!service.log_out(&rotated.refresh_token).await.unwrap());

        service.users.delete(user.id).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_refresh_rejects_access_token() {
        let service = create_test_service().await;
        let (access, _) = service.jwt().create_access_token(1).unwrap();

        assert!(matches!(
            service.refresh(&access).await,
            Err(ApiError::TokenDecodeError)
        ));
    }

    /// GitHub client against a mock server that answers for one remote account
    async fn github_stub(remote_id: i64, email: &str) -> (MockServer, GitHubClient) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "gho"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": remote_id, "login": "cook", "name": "Cook", "email": email
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/emails"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"email": email, "primary": true, "verified": true}
            ])))
            .mount(&server)
            .await;

        let client = GitHubClient::with_endpoints(
            OAuthClientConfig {
                client_id: "id".into(),
                client_secret: "secret".into(),
                redirect_uri: None,
            },
            OAuthEndpoints {
                authorize_url: format!("{}/authorize", server.uri()),
                token_url: format!("{}/token", server.uri()),
                user_url: server.uri(),
            },
        )
        .unwrap();
        (server, client)
    }

    /// Remote id unlikely to be taken by another run
    fn unique_remote_id() -> i64 {
        (uuid::Uuid::new_v4().as_u128() % 1_000_000_000_000) as i64
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_oauth_login_links_by_email_then_reuses_credential() {
        let service = create_test_service().await;
        let email = unique_email("oauth_link");
        let registered = service.register(register_request(&email)).await.unwrap();
        let (_server, client) = github_stub(unique_remote_id(), &email).await;

        let first = service.log_in_oauth(&client, "code", None).await.unwrap();
        let first_user = service.verify(&first.access_token).await.unwrap();
        assert_eq!(first_user.id, registered.id);
        assert_eq!(first_user.oauth.len(), 2);

        let second = service.log_in_oauth(&client, "code", None).await.unwrap();
        let second_user = service.verify(&second.access_token).await.unwrap();
        assert_eq!(second_user.id, registered.id);
        assert_eq!(second_user.oauth.len(), 2);

        service.users.delete(registered.id).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_oauth_login_creates_new_user() {
        let service = create_test_service().await;
        let email = unique_email("oauth_new");
        let remote_id = unique_remote_id();
        let (_server, client) = github_stub(remote_id, &email).await;

        let tokens = service.log_in_oauth(&client, "code", None).await.unwrap();
        let user = service.verify(&tokens.access_token).await.unwrap();

        assert_eq!(user.email, email);
        assert_eq!(user.name, "Cook");
        assert_eq!(user.role, Role::User);
        assert_eq!(user.oauth.len(), 1);
        assert_eq!(user.oauth[0].provider, OAuthProvider::Github);

        let credential = service
            .oauth
            .find_by_oauth_id_and_provider(&remote_id.to_string(), OAuthProvider::Github)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(credential.user_id, user.id);

        service.users.delete(user.id).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_oauth_second_remote_account_for_same_user_conflicts() {
        let service = create_test_service().await;
        let email = unique_email("oauth_conflict");
        let (_first_server, first) = github_stub(unique_remote_id(), &email).await;
        let (_second_server, second) = github_stub(unique_remote_id(), &email).await;

        let tokens = service.log_in_oauth(&first, "code", None).await.unwrap();
        let user = service.verify(&tokens.access_token).await.unwrap();

        let result = service.log_in_oauth(&second, "code", None).await;
        assert!(matches!(result, Err(ApiError::EntityAlreadyExists)));

        assert_eq!(service.oauth.find_by_user_id(user.id).await.unwrap().len(), 1);

        service.users.delete(user.id).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_purge_expired_sessions() {
        let service = create_test_service().await;
        let email = unique_email("purge");
        let user = service.register(register_request(&email)).await.unwrap();
        let tokens = service.log_in_password(&email, "Password123").await.unwrap();
        service
            .sessions
            .create(user.id, "long-gone", Utc::now() - chrono::Duration::days(1))
            .await
            .unwrap();

        assert!(service.purge_expired_sessions().await.unwrap() >= 1);
        assert!(service.sessions.find_by_token("long-gone").await.unwrap().is_none());
        assert!(service.sessions.find_by_token(&tokens.refresh_token).await.unwrap().is_some());

        service.users.delete(user.id).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_session_sweeper_runs_on_start() {
        let service = create_test_service().await;
        let user = service
            .register(register_request(&unique_email("sweeper")))
            .await
            .unwrap();
        service
            .sessions
            .create(user.id, "swept", Utc::now() - chrono::Duration::minutes(1))
            .await
            .unwrap();

        let sweeper = service.spawn_session_sweeper(Duration::from_secs(3600));
        let mut swept = false;
        for _ in 0..50 {
            if service.sessions.find_by_token("swept").await.unwrap().is_none() {
                swept = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        sweeper.abort();

        assert!(swept);
        service.users.delete(user.id).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_ensure_admin_is_idempotent() {
        let service = create_test_service().await;
        let admin = AdminConfig {
            name: "admin".to_string(),
            email: unique_email("admin"),
            password: "AdminPassword1".to_string(),
        };

        let first = service.ensure_admin(&admin).await.unwrap();
        let second = service.ensure_admin(&admin).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.role, Role::Admin);
        assert!(service.log_in_password(&admin.email, "AdminPassword1").await.is_ok());

        service.users.delete(first.id).await.unwrap();
    }
}
