//! Company headcount tracking

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

use crate::core::db::PgPool;
use crate::core::db::models::{CreateJmyCompany, CreateJmyTimeSeries, JmyCompanyOut};
use crate::core::db::repositories::JmyRepository;
use crate::core::error::{ApiError, ApiResult};
use crate::core::response::timezone;

/// One observation of a company, carrying the company details in case it is new
#[derive(Debug, Clone, Deserialize)]
pub struct JmyCompanyRequest {
    pub name: String,
    pub year: i32,
    pub location: String,
    pub address: String,
    #[serde(rename = "type", alias = "type_")]
    pub type_: String,
    pub size: String,
    #[serde(default)]
    pub research: Option<String>,
    #[serde(deserialize_with = "deserialize_date")]
    pub date: DateTime<Utc>,
    pub b_assigned: i32,
    pub b_new: i32,
    pub b_old: i32,
    pub a_assigned: i32,
    pub a_new: i32,
    pub a_old: i32,
}

impl JmyCompanyRequest {
    fn company(&self) -> CreateJmyCompany {
        CreateJmyCompany {
            name: self.name.clone(),
            year: self.year,
            location: self.location.clone(),
            address: self.address.clone(),
            type_: self.type_.clone(),
            size: self.size.clone(),
            research: self.research.clone(),
        }
    }

    fn point(&self) -> CreateJmyTimeSeries {
        CreateJmyTimeSeries {
            date: self.date,
            b_assigned: self.b_assigned,
            b_new: self.b_new,
            b_old: self.b_old,
            a_assigned: self.a_assigned,
            a_new: self.a_new,
            a_old: self.a_old,
        }
    }
}

/// Parse an RFC 3339 timestamp, a naive `YYYY-MM-DDTHH:MM:SS` or a bare date
///
/// Values without an offset are read in the configured time zone.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return Some(date.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;

    timezone()
        .from_local_datetime(&naive)
        .single()
        .map(|date| date.with_timezone(&Utc))
}

fn deserialize_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_date(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid date `{raw}`")))
}

#[derive(Clone)]
pub struct JmyService {
    pool: PgPool,
    repo: JmyRepository,
}

impl JmyService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repo: JmyRepository::new(pool.clone()),
            pool,
        }
    }

    /// Record one observation, creating the company on first sight
    pub async fn create(&self, request: JmyCompanyRequest) -> ApiResult<JmyCompanyOut> {
        if request.name.trim().is_empty() {
            return Err(ApiError::InvalidInput("name must not be empty".to_string()));
        }

        let mut tx = self.pool.begin().await?;
        let company = JmyRepository::get_or_create_company(&mut *tx, &request.company()).await?;
        JmyRepository::insert_time_series(&mut *tx, company.id, &request.point()).await?;
        let series = JmyRepository::find_time_series(&mut *tx, company.id).await?;
        tx.commit().await?;

        tracing::info!(company_id = company.id, points = series.len(), "Jmy observation recorded");

        Ok(JmyCompanyOut::new(company, series))
    }

    pub async fn get_by_name(&self, name: &str) -> ApiResult<JmyCompanyOut> {
        let company = self
            .repo
            .find_by_name(name)
            .await?
            .ok_or(ApiError::EntityNotFound)?;
        let series = self.repo.time_series(company.id).await?;

        Ok(JmyCompanyOut::new(company, series))
    }

    pub async fn get_by_id(&self, id: i64) -> ApiResult<JmyCompanyOut> {
        let company = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or(ApiError::EntityNotFound)?;
        let series = self.repo.time_series(company.id).await?;

        Ok(JmyCompanyOut::new(company, series))
    }
}
