//! Third-party OAuth clients
//!
//! Both providers follow the same authorization-code dance: trade the code
//! for a provider access token, then read the profile with that token.
//! [`OAuthStateStore`] guards the browser redirect flow against CSRF.

use std::future::Future;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::Rng;
use rand::distributions::Alphanumeric;
use reqwest::{Client, RequestBuilder, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::core::db::models::OAuthProvider;

const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_API_URL: &str = "https://api.github.com";
const GITHUB_SCOPES: &str = "read:user user:email";

const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const GOOGLE_SCOPES: &str = "openid email profile";

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// How long an issued `state` stays redeemable
const STATE_TTL: Duration = Duration::from_secs(10 * 60);

const STATE_LENGTH: usize = 32;

/// Pending states kept before the oldest is evicted
const MAX_PENDING_STATES: usize = 10_000;

/// Registered OAuth application
#[derive(Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Callback registered with the provider; sent along when set
    pub redirect_uri: Option<String>,
}

impl std::fmt::Debug for OAuthClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// Provider URLs, overridable so tests can point at a mock server
#[derive(Debug, Clone)]
pub struct OAuthEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    /// GitHub: API base URL. Google: the userinfo URL itself.
    pub user_url: String,
}

impl OAuthEndpoints {
    pub fn github() -> Self {
        Self {
            authorize_url: GITHUB_AUTHORIZE_URL.to_string(),
            token_url: GITHUB_TOKEN_URL.to_string(),
            user_url: GITHUB_API_URL.to_string(),
        }
    }

    pub fn google() -> Self {
        Self {
            authorize_url: GOOGLE_AUTHORIZE_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            user_url: GOOGLE_USERINFO_URL.to_string(),
        }
    }
}

/// OAuth client errors
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Provider answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Provider rejected the request: {0}")]
    Provider(String),

    #[error("Provider response is missing {0}")]
    MissingField(&'static str),

    #[error("Provider has not verified {0}")]
    UnverifiedEmail(String),

    #[error("Invalid provider URL: {0}")]
    InvalidUrl(String),
}

/// Profile of the remote account after a successful exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthUserInfo {
    pub provider: OAuthProvider,
    /// Stable account id at the provider
    pub oauth_id: String,
    pub name: String,
    pub email: String,
    /// Provider access token obtained from the code
    pub token: String,
}

/// Authorization-code client of one provider
pub trait OAuthClient: Send + Sync {
    fn provider(&self) -> OAuthProvider;

    /// Browser URL that starts the consent screen
    fn authorize_url(&self, state: &str) -> Result<String, OAuthError>;

    /// Trade an authorization code for the remote profile
    fn exchange(
        &self,
        code: &str,
        redirect_uri: Option<&str>,
    ) -> impl Future<Output = Result<OAuthUserInfo, OAuthError>> + Send;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl TokenResponse {
    fn into_token(self) -> Result<String, OAuthError> {
        if let Some(error) = self.error {
            let detail = match self.error_description {
                Some(description) => format!("{error}: {description}"),
                None => error,
            };
            return Err(OAuthError::Provider(detail));
        }
        self.access_token
            .filter(|token| !token.is_empty())
            .ok_or(OAuthError::MissingField("access_token"))
    }
}

fn build_http_client() -> Result<Client, OAuthError> {
    Ok(Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Send a request and decode a JSON body, logging any non-2xx answer
async fn send_json<T: DeserializeOwned>(
    provider: OAuthProvider,
    request: RequestBuilder,
) -> Result<T, OAuthError> {
    let response = request.header("Accept", "application/json").send().await?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::error!(%provider, status = status.as_u16(), body = %body, "OAuth provider error");
        return Err(OAuthError::Status {
            status: status.as_u16(),
            body,
        });
    }

    Ok(response.json::<T>().await?)
}

fn authorize_url(
    endpoint: &str,
    config: &OAuthClientConfig,
    scope: &str,
    state: &str,
    extra: &[(&str, &str)],
) -> Result<String, OAuthError> {
    let mut params = vec![
        ("client_id", config.client_id.as_str()),
        ("scope", scope),
        ("state", state),
    ];
    if let Some(redirect_uri) = config.redirect_uri.as_deref() {
        params.push(("redirect_uri", redirect_uri));
    }
    params.extend_from_slice(extra);

    Url::parse_with_params(endpoint, &params)
        .map(String::from)
        .map_err(|e| OAuthError::InvalidUrl(e.to_string()))
}

// ============================================================================
// GitHub
// ============================================================================

#[derive(Deserialize)]
struct GitHubUser {
    id: i64,
    login: String,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

#[derive(Clone)]
pub struct GitHubClient {
    config: OAuthClientConfig,
    endpoints: OAuthEndpoints,
    http: Client,
}

impl GitHubClient {
    pub fn new(config: OAuthClientConfig) -> Result<Self, OAuthError> {
        Self::with_endpoints(config, OAuthEndpoints::github())
    }

    pub fn with_endpoints(
        config: OAuthClientConfig,
        endpoints: OAuthEndpoints,
    ) -> Result<Self, OAuthError> {
        Ok(Self {
            config,
            endpoints,
            http: build_http_client()?,
        })
    }

    async fn fetch_token(&self, code: &str, redirect_uri: Option<&str>) -> Result<String, OAuthError> {
        let body = serde_json::json!({
            "client_id": self.config.client_id,
            "client_secret": self.config.client_secret,
            "code": code,
            "redirect_uri": redirect_uri.or(self.config.redirect_uri.as_deref()),
        });
        let response: TokenResponse = send_json(
            OAuthProvider::Github,
            self.http.post(&self.endpoints.token_url).json(&body),
        )
        .await?;

        response.into_token().inspect_err(|err| {
            tracing::error!(provider = "github", error = %err, "GitHub token exchange failed");
        })
    }

    /// Verified address of the account
    ///
    /// The public profile email carries no verification flag, so it is only
    /// accepted when `/user/emails` lists it as verified. Without a public
    /// email the primary verified address is used.
    async fn fetch_verified_email(
        &self,
        token: &str,
        public: Option<&str>,
    ) -> Result<String, OAuthError> {
        let emails: Vec<GitHubEmail> = send_json(
            OAuthProvider::Github,
            self.http
                .get(format!("{}/user/emails", self.endpoints.user_url))
                .bearer_auth(token),
        )
        .await?;

        let chosen = match public {
            Some(public) => emails.into_iter().find(|e| e.email.eq_ignore_ascii_case(public)),
            None => emails.into_iter().find(|e| e.primary),
        };
        match chosen {
            Some(e) if e.verified => Ok(e.email),
            Some(e) => Err(OAuthError::UnverifiedEmail(e.email)),
            None => Err(OAuthError::MissingField("email")),
        }
    }
}

impl OAuthClient for GitHubClient {
    fn provider(&self) -> OAuthProvider {
        OAuthProvider::Github
    }

    fn authorize_url(&self, state: &str) -> Result<String, OAuthError> {
        authorize_url(&self.endpoints.authorize_url, &self.config, GITHUB_SCOPES, state, &[])
    }

    async fn exchange(&self, code: &str, redirect_uri: Option<&str>) -> Result<OAuthUserInfo, OAuthError> {
        let token = self.fetch_token(code, redirect_uri).await?;

        let user: GitHubUser = send_json(
            OAuthProvider::Github,
            self.http
                .get(format!("{}/user", self.endpoints.user_url))
                .bearer_auth(&token),
        )
        .await?;

        let public = user.email.as_deref().filter(|e| !e.is_empty());
        let email = self.fetch_verified_email(&token, public).await?;

        Ok(OAuthUserInfo {
            provider: OAuthProvider::Github,
            oauth_id: user.id.to_string(),
            name: user.name.filter(|n| !n.is_empty()).unwrap_or(user.login),
            email,
            token,
        })
    }
}

// ============================================================================
// Google
// ============================================================================

#[derive(Deserialize)]
struct GoogleUser {
    id: String,
    email: Option<String>,
    #[serde(default, alias = "email_verified")]
    verified_email: bool,
    name: Option<String>,
}

#[derive(Clone)]
pub struct GoogleClient {
    config: OAuthClientConfig,
    endpoints: OAuthEndpoints,
    http: Client,
}

impl GoogleClient {
    pub fn new(config: OAuthClientConfig) -> Result<Self, OAuthError> {
        Self::with_endpoints(config, OAuthEndpoints::google())
    }

    pub fn with_endpoints(
        config: OAuthClientConfig,
        endpoints: OAuthEndpoints,
    ) -> Result<Self, OAuthError> {
        Ok(Self {
            config,
            endpoints,
            http: build_http_client()?,
        })
    }
}

impl OAuthClient for GoogleClient {
    fn provider(&self) -> OAuthProvider {
        OAuthProvider::Google
    }

    fn authorize_url(&self, state: &str) -> Result<String, OAuthError> {
        authorize_url(
            &self.endpoints.authorize_url,
            &self.config,
            GOOGLE_SCOPES,
            state,
            &[("response_type", "code"), ("access_type", "online")],
        )
    }

    async fn exchange(&self, code: &str, redirect_uri: Option<&str>) -> Result<OAuthUserInfo, OAuthError> {
        let body = serde_json::json!({
            "client_id": self.config.client_id,
            "client_secret": self.config.client_secret,
            "grant_type": "authorization_code",
            "code": code,
            "redirect_uri": redirect_uri.or(self.config.redirect_uri.as_deref()),
        });
        let response: TokenResponse = send_json(
            OAuthProvider::Google,
            self.http.post(&self.endpoints.token_url).json(&body),
        )
        .await?;
        let token = response.into_token()?;

        let user: GoogleUser = send_json(
            OAuthProvider::Google,
            self.http.get(&self.endpoints.user_url).bearer_auth(&token),
        )
        .await?;

        let email = user
            .email
            .filter(|e| !e.is_empty())
            .ok_or(OAuthError::MissingField("email"))?;
        if !user.verified_email {
            return Err(OAuthError::UnverifiedEmail(email));
        }
        let name = user
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

        Ok(OAuthUserInfo {
            provider: OAuthProvider::Google,
            oauth_id: user.id,
            name,
            email,
            token,
        })
    }
}

// ============================================================================
// State store
// ============================================================================

/// Single-use `state` values handed out by the login redirect
#[derive(Default)]
pub struct OAuthStateStore {
    states: DashMap<String, (OAuthProvider, Instant)>,
    ttl: Option<Duration>,
    capacity: Option<usize>,
}

impl OAuthStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose states expire after `ttl` instead of ten minutes
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }

    /// Store holding at most `capacity` pending states
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    fn ttl(&self) -> Duration {
        self.ttl.unwrap_or(STATE_TTL)
    }

    fn capacity(&self) -> usize {
        self.capacity.unwrap_or(MAX_PENDING_STATES)
    }

    /// Issue a fresh state for a provider, dropping expired ones and
    /// evicting the oldest when the store is full
    pub fn issue(&self, provider: OAuthProvider) -> String {
        let ttl = self.ttl();
        self.states.retain(|_, (_, issued)| issued.elapsed() < ttl);

        while self.states.len() >= self.capacity().max(1) {
            let oldest = self
                .states
                .iter()
                .min_by_key(|entry| entry.value().1)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.states.remove(&key);
                }
                None => break,
            }
        }

        let state: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(STATE_LENGTH)
            .map(char::from)
            .collect();
        self.states.insert(state.clone(), (provider, Instant::now()));
        state
    }

    /// Redeem a state; true only once, for the issuing provider, within the TTL
    pub fn consume(&self, state: &str, provider: OAuthProvider) -> bool {
        match self.states.remove(state) {
            Some((_, (issued_for, issued))) => {
                issued_for == provider && issued.elapsed() < self.ttl()
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

// ============================================================================
// Provider registry
// ============================================================================

/// Configured providers plus the state store of the redirect flow
#[derive(Default)]
pub struct OAuthProviders {
    pub github: Option<GitHubClient>,
    pub google: Option<GoogleClient>,
    pub states: OAuthStateStore,
}

impl OAuthProviders {
    /// Build a client for every provider that has credentials
    pub fn from_configs(
        github: Option<&OAuthClientConfig>,
        google: Option<&OAuthClientConfig>,
    ) -> Result<Self, OAuthError> {
        Ok(Self {
            github: github.cloned().map(GitHubClient::new).transpose()?,
            google: google.cloned().map(GoogleClient::new).transpose()?,
            states: OAuthStateStore::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config() -> OAuthClientConfig {
        OAuthClientConfig {
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            redirect_uri: Some("http://localhost:8000/api/v1/auth/oauth/callback".to_string()),
        }
    }

    fn mock_endpoints(server: &MockServer, user_path: &str) -> OAuthEndpoints {
        OAuthEndpoints {
            authorize_url: format!("{}/authorize", server.uri()),
            token_url: format!("{}/token", server.uri()),
            user_url: format!("{}{}", server.uri(), user_path),
        }
    }

    #[test]
    fn test_config_debug_hides_secret() {
        let debug = format!("{:?}", config());
        assert!(debug.contains("client-id"));
        assert!(!debug.contains("client-secret"));
    }

    #[test]
    fn test_github_authorize_url() {
        let client = GitHubClient::new(config()).unwrap();
        let url = Url::parse(&client.authorize_url("abc").unwrap()).unwrap();

        assert_eq!(url.host_str(), Some("github.com"));
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("client_id".to_string(), "client-id".to_string())));
        assert!(pairs.contains(&("state".to_string(), "abc".to_string())));
        assert!(pairs.contains(&("scope".to_string(), GITHUB_SCOPES.to_string())));
        assert!(pairs.iter().any(|(k, _)| k == "redirect_uri"));
    }

    #[test]
    fn test_google_authorize_url() {
        let client = GoogleClient::new(config()).unwrap();
        let url = Url::parse(&client.authorize_url("xyz").unwrap()).unwrap();

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("response_type".to_string(), "code".to_string())));
        assert!(pairs.contains(&("scope".to_string(), GOOGLE_SCOPES.to_string())));
        assert!(pairs.contains(&("state".to_string(), "xyz".to_string())));
    }

    #[tokio::test]
    async fn test_github_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(header("accept", "application/json"))
            .and(body_partial_json(serde_json::json!({"code": "the-code"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "gho_token", "token_type": "bearer", "scope": "read:user"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header("authorization", "Bearer gho_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 583231, "login": "octocat", "name": "The Octocat", "email": "octo@github.com"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/emails"))
            .and(header("authorization", "Bearer gho_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"email": "main@github.com", "primary": true, "verified": true},
                {"email": "octo@github.com", "primary": false, "verified": true}
            ])))
            .mount(&server)
            .await;

        let client = GitHubClient::with_endpoints(config(), mock_endpoints(&server, "")).unwrap();
        let info = client.exchange("the-code", None).await.unwrap();

        assert_eq!(
            info,
            OAuthUserInfo {
                provider: OAuthProvider::Github,
                oauth_id: "583231".to_string(),
                name: "The Octocat".to_string(),
                email: "octo@github.com".to_string(),
                token: "gho_token".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_github_private_email_falls_back_to_primary() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "gho_token"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 1, "login": "hidden", "name": null, "email": null
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/emails"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"email": "old@example.com", "primary": false, "verified": true},
                {"email": "main@example.com", "primary": true, "verified": true}
            ])))
            .mount(&server)
            .await;

        let client = GitHubClient::with_endpoints(config(), mock_endpoints(&server, "")).unwrap();
        let info = client.exchange("code", None).await.unwrap();

        assert_eq!(info.email, "main@example.com");
        assert_eq!(info.name, "hidden");
    }

    #[tokio::test]
    async fn test_github_unverified_public_email_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "gho_token"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 7, "login": "mallory", "name": null, "email": "admin@victim.com"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/emails"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"email": "mallory@example.com", "primary": true, "verified": true},
                {"email": "admin@victim.com", "primary": false, "verified": false}
            ])))
            .mount(&server)
            .await;

        let client = GitHubClient::with_endpoints(config(), mock_endpoints(&server, "")).unwrap();
        let result = client.exchange("code", None).await;

        match result {
            Err(OAuthError::UnverifiedEmail(email)) => assert_eq!(email, "admin@victim.com"),
            other => panic!("expected unverified email, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_github_unverified_primary_email_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "gho_token"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 8, "login": "fresh", "email": null
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/emails"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"email": "fresh@example.com", "primary": true, "verified": false}
            ])))
            .mount(&server)
            .await;

        let client = GitHubClient::with_endpoints(config(), mock_endpoints(&server, "")).unwrap();
        let result = client.exchange("code", None).await;

        assert!(matches!(result, Err(OAuthError::UnverifiedEmail(_))));
    }

    #[tokio::test]
    async fn test_github_error_field_in_200_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": "bad_verification_code",
                "error_description": "The code passed is incorrect or expired."
            })))
            .mount(&server)
            .await;

        let client = GitHubClient::with_endpoints(config(), mock_endpoints(&server, "")).unwrap();
        let result = client.exchange("expired", None).await;

        match result {
            Err(OAuthError::Provider(detail)) => assert!(detail.contains("bad_verification_code")),
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_google_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_partial_json(serde_json::json!({
                "grant_type": "authorization_code",
                "code": "g-code",
                "redirect_uri": "http://front/callback"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "ya29.token", "expires_in": 3599})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", "Bearer ya29.token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "1098", "email": "jane@gmail.com", "verified_email": true, "name": "Jane"
            })))
            .mount(&server)
            .await;

        let client =
            GoogleClient::with_endpoints(config(), mock_endpoints(&server, "/userinfo")).unwrap();
        let info = client
            .exchange("g-code", Some("http://front/callback"))
            .await
            .unwrap();

        assert_eq!(info.provider, OAuthProvider::Google);
        assert_eq!(info.oauth_id, "1098");
        assert_eq!(info.email, "jane@gmail.com");
        assert_eq!(info.token, "ya29.token");
    }

    #[tokio::test]
    async fn test_google_unverified_email_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "ya29.token"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "666", "email": "admin@victim.com", "verified_email": false, "name": "Admin"
            })))
            .mount(&server)
            .await;

        let client =
            GoogleClient::with_endpoints(config(), mock_endpoints(&server, "/userinfo")).unwrap();
        let result = client.exchange("g-code", None).await;

        match result {
            Err(OAuthError::UnverifiedEmail(email)) => assert_eq!(email, "admin@victim.com"),
            other => panic!("expected unverified email, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_google_missing_verification_flag_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "ya29.token"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "667", "email": "someone@gmail.com"
            })))
            .mount(&server)
            .await;

        let client =
            GoogleClient::with_endpoints(config(), mock_endpoints(&server, "/userinfo")).unwrap();

        assert!(matches!(
            client.exchange("g-code", None).await,
            Err(OAuthError::UnverifiedEmail(_))
        ));
    }

    #[tokio::test]
    async fn test_google_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(serde_json::json!({"error": "invalid_grant"})),
            )
            .mount(&server)
            .await;

        let client =
            GoogleClient::with_endpoints(config(), mock_endpoints(&server, "/userinfo")).unwrap();
        let result = client.exchange("bad", None).await;

        assert!(matches!(result, Err(OAuthError::Status { status: 400, .. })));
    }

    #[test]
    fn test_state_is_single_use() {
        let store = OAuthStateStore::new();
        let state = store.issue(OAuthProvider::Github);

        assert_eq!(state.len(), STATE_LENGTH);
        assert!(store.consume(&state, OAuthProvider::Github));
        assert!(!store.consume(&state, OAuthProvider::Github));
        assert!(store.is_empty());
    }

    #[test]
    fn test_state_bound_to_provider() {
        let store = OAuthStateStore::new();
        let state = store.issue(OAuthProvider::Google);

        assert!(!store.consume(&state, OAuthProvider::Github));
        assert!(!store.consume("unknown", OAuthProvider::Google));
    }

    #[test]
    fn test_state_expires() {
        let store = OAuthStateStore::with_ttl(Duration::ZERO);
        let state = store.issue(OAuthProvider::Github);

        assert!(!store.consume(&state, OAuthProvider::Github));
    }

    #[test]
    fn test_providers_from_configs() {
        let providers = OAuthProviders::from_configs(Some(&config()), None).unwrap();

        assert!(providers.github.is_some());
        assert!(providers.google.is_none());
        assert!(providers.states.is_empty());
    }

    #[test]
    fn test_issue_prunes_expired_states() {
        let store = OAuthStateStore::with_ttl(Duration::ZERO);
        store.issue(OAuthProvider::Github);
        store.issue(OAuthProvider::Github);

        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_full_store_evicts_oldest_state() {
        let store = OAuthStateStore::with_capacity(2);
        let first = store.issue(OAuthProvider::Github);
        std::thread::sleep(Duration::from_millis(2));
        let second = store.issue(OAuthProvider::Github);
        std::thread::sleep(Duration::from_millis(2));
        let third = store.issue(OAuthProvider::Google);

        assert_eq!(store.len(), 2);
        assert!(!store.consume(&first, OAuthProvider::Github));
        assert!(store.consume(&second, OAuthProvider::Github));
        assert!(store.consume(&third, OAuthProvider::Google));
    }

    #[test]
    fn test_default_store_is_bounded() {
        assert_eq!(OAuthStateStore::new().capacity(), MAX_PENDING_STATES);
        assert_eq!(OAuthStateStore::with_ttl(Duration::ZERO).capacity(), MAX_PENDING_STATES);
    }
}
