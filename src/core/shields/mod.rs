//! shields.io endpoint badges
//!
//! Answers in the shields.io endpoint schema directly, without the response
//! envelope, so `https://img.shields.io/endpoint?url=...` can render it.

pub mod api;

pub use api::{Shields, dday, shields_router};
