//! Admin-only user management

pub mod api;
pub mod service;

pub use api::user_router;
pub use service::{UserPatchRequest, UserPutRequest, UserService};
