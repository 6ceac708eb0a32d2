//! Uniform JSON envelope for API responses
//!
//! ```json
//! {"status": 200, "message": "...", "data": {...}, "timestamp": "2025-01-20T13:23:40.132620+09:00"}
//! ```

use std::sync::OnceLock;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, FixedOffset, Offset, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub const SUCCESS_MESSAGE: &str = "The request has been successfully processed.";

/// Offset every timestamp is rendered in, set once at start-up
static TIMEZONE: OnceLock<FixedOffset> = OnceLock::new();

const DEFAULT_OFFSET_SECS: i32 = 9 * 3600;

/// Install the configured offset; later calls are ignored
pub fn init_timezone(offset: FixedOffset) {
    if TIMEZONE.set(offset).is_err() {
        tracing::debug!("Timezone already initialized, keeping {}", timezone());
    }
}

/// The configured offset (+09:00 until initialized)
pub fn timezone() -> FixedOffset {
    *TIMEZONE.get_or_init(|| FixedOffset::east_opt(DEFAULT_OFFSET_SECS).unwrap_or(Utc.fix()))
}

/// Current time in the configured offset
pub fn now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&timezone())
}

/// RFC 3339 with microseconds in the configured offset
pub fn render_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String {
    at.with_timezone(&timezone())
        .to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Serde adapter for `DateTime<Utc>` fields shown to clients in the configured offset
///
/// Use with `#[serde(with = "crate::core::response::local_time")]`.
pub mod local_time {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::render_timestamp(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|at| at.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: u16,
    pub message: String,
    pub data: Option<T>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(status: StatusCode, data: T) -> Self {
        Self {
            status: status.as_u16(),
            message: SUCCESS_MESSAGE.to_string(),
            data: Some(data),
            timestamp: render_timestamp(&now()),
        }
    }

    /// 200 with data
    pub fn ok(data: T) -> Self {
        Self::success(StatusCode::OK, data)
    }

    /// 201 with data
    pub fn created(data: T) -> Self {
        Self::success(StatusCode::CREATED, data)
    }
}

impl ApiResponse<()> {
    /// Envelope without data
    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: status.as_u16(),
            message: message.into(),
            data: None,
            timestamp: render_timestamp(&now()),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}
