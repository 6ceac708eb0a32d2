//! Authentication module
//!
//! This module provides authentication functionality including:
//! - JWT token generation and validation
//! - Password hashing
//! - GitHub and Google OAuth clients
//! - Registration, login and refresh-token rotation
//! - Extractors guarding user and admin routes
//! - REST API endpoints for auth operations

pub mod api;
pub mod crypt;
pub mod extract;
pub mod jwt;
pub mod oauth;
pub mod service;

pub use api::auth_router;
pub use crypt::{CryptError, CryptService};
pub use extract::{AdminUser, CurrentUser};
pub use jwt::{Claims, JwtConfig, JwtError, JwtService, JwtToken, TokenType};
pub use oauth::{OAuthClientConfig, OAuthProviders};
pub use service::{AuthService, RefreshRequest, RegisterRequest};
