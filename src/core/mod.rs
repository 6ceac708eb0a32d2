//! Domain modules, persistence and the shared HTTP plumbing

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod jmy;
pub mod logging;
pub mod response;
pub mod shields;
pub mod users;
