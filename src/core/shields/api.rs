//! Badge endpoints
//!
//! - GET /v1/shields/jmy - Days left until the service term ends

use axum::{Json, Router, routing::get};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::core::response::now;

const JMY_LABEL: &str = "전문연구요원";

/// shields.io endpoint schema
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Shields {
    pub schema_version: u8,
    pub label: String,
    pub message: String,
    pub color: String,
    pub label_color: String,
    pub named_logo: String,
    pub style: String,
}

/// Last day of the service term
fn jmy_end() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 2, 28).unwrap_or(NaiveDate::MAX)
}

/// D-day label of `target` seen from `today`: `D-3`, `D-Day`, `D+2`
pub fn dday(today: NaiveDate, target: NaiveDate) -> String {
    let days = (target - today).num_days();
    match days {
        0 => "D-Day".to_string(),
        d if d > 0 => format!("D-{d}"),
        d => format!("D+{}", -d),
    }
}

pub fn shields_router() -> Router<AppState> {
    Router::new().route("/jmy", get(jmy))
}

/// GET /shields/jmy
async fn jmy() -> Json<Shields> {
    let today = now().date_naive();

    Json(Shields {
        schema_version: 1,
        label: JMY_LABEL.to_string(),
        message: dday(today, jmy_end()),
        color: "800a0a".to_string(),
        label_color: "000".to_string(),
        named_logo: "googlescholar".to_string(),
        style: "for-the-badge".to_string(),
    })
}
