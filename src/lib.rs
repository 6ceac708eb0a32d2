//! cookbook - CRUD and authentication backend
//!
//! User accounts with password, GitHub and Google login, JWT access and
//! refresh tokens, admin user management, a company headcount resource and a
//! shields.io badge, served over axum with PostgreSQL storage.

pub mod app;
pub mod core;
