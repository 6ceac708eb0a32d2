//! Company headcount series (admin only)

pub mod api;
pub mod service;

pub use api::jmy_router;
pub use service::{JmyCompanyRequest, JmyService};
