//! Company and headcount series repository

use sqlx::{PgExecutor, PgPool};

use crate::core::db::models::{CreateJmyCompany, CreateJmyTimeSeries, JmyCompany, JmyTimeSeries};

const COMPANY_COLUMNS: &str =
    "id, name, year, location, address, type, size, research, created_at, updated_at";

const SERIES_COLUMNS: &str = "id, company_id, date, b_assigned, b_new, b_old, a_assigned, a_new, a_old, created_at, updated_at";

#[derive(Clone)]
pub struct JmyRepository {
    pool: PgPool,
}

impl JmyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<JmyCompany>, sqlx::Error> {
        sqlx::query_as::<_, JmyCompany>(&format!(
            "SELECT {COMPANY_COLUMNS} FROM jmy_company WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<JmyCompany>, sqlx::Error> {
        sqlx::query_as::<_, JmyCompany>(&format!(
            "SELECT {COMPANY_COLUMNS} FROM jmy_company WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Return the company named in `dto`, inserting it first when absent
    ///
    /// An existing row keeps its descriptive columns.
    pub async fn get_or_create_company<'e, E>(
        executor: E,
        dto: &CreateJmyCompany,
    ) -> Result<JmyCompany, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        // The no-op update makes RETURNING yield the existing row as well.
        sqlx::query_as::<_, JmyCompany>(&format!(
            r#"
            INSERT INTO jmy_company (name, year, location, address, type, size, research)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING {COMPANY_COLUMNS}
            "#
        ))
        .bind(&dto.name)
        .bind(dto.year)
        .bind(&dto.location)
        .bind(&dto.address)
        .bind(&dto.type_)
        .bind(&dto.size)
        .bind(&dto.research)
        .fetch_one(executor)
        .await
    }

    /// Append one observation to a company's series
    pub async fn insert_time_series<'e, E>(
        executor: E,
        company_id: i64,
        dto: &CreateJmyTimeSeries,
    ) -> Result<JmyTimeSeries, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, JmyTimeSeries>(&format!(
            r#"
            INSERT INTO jmy_time_series
                (company_id, date, b_assigned, b_new, b_old, a_assigned, a_new, a_old)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {SERIES_COLUMNS}
            "#
        ))
        .bind(company_id)
        .bind(dto.date)
        .bind(dto.b_assigned)
        .bind(dto.b_new)
        .bind(dto.b_old)
        .bind(dto.a_assigned)
        .bind(dto.a_new)
        .bind(dto.a_old)
        .fetch_one(executor)
        .await
    }

    /// Series of a company, oldest observation first
    pub async fn find_time_series<'e, E>(
        executor: E,
        company_id: i64,
    ) -> Result<Vec<JmyTimeSeries>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, JmyTimeSeries>(&format!(
            "SELECT {SERIES_COLUMNS} FROM jmy_time_series WHERE company_id = $1 ORDER BY date, id"
        ))
        .bind(company_id)
        .fetch_all(executor)
        .await
    }

    pub async fn time_series(&self, company_id: i64) -> Result<Vec<JmyTimeSeries>, sqlx::Error> {
        Self::find_time_series(&self.pool, company_id).await
    }

    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM jmy_company WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::core::db::repositories::test_support::create_test_pool;

    fn company(name: &str) -> CreateJmyCompany {
        CreateJmyCompany {
            name: name.to_string(),
            year: 2015,
            location: "Seoul".to_string(),
            address: "Teheran-ro 1".to_string(),
            type_: "IT".to_string(),
            size: "mid".to_string(),
            research: Some("ML".to_string()),
        }
    }

    fn point(days_ago: i64, assigned: i32) -> CreateJmyTimeSeries {
        CreateJmyTimeSeries {
            date: Utc::now() - Duration::days(days_ago),
            b_assigned: assigned,
            b_new: 1,
            b_old: 0,
            a_assigned: assigned,
            a_new: 1,
            a_old: 0,
        }
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_get_or_create_company_is_idempotent() {
        let pool = create_test_pool().await;
        let repo = JmyRepository::new(pool.clone());
        let name = format!("acme-{}", uuid::Uuid::new_v4());

        let first = JmyRepository::get_or_create_company(&pool, &company(&name))
            .await
            .unwrap();
        let mut changed = company(&name);
        changed.year = 1999;
        let second = JmyRepository::get_or_create_company(&pool, &changed)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.year, 2015);
        assert_eq!(repo.find_by_name(&name).await.unwrap().unwrap().id, first.id);

        repo.delete(first.id).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_time_series_ordered_by_date() {
        let pool = create_test_pool().await;
        let repo = JmyRepository::new(pool.clone());
        let name = format!("series-{}", uuid::Uuid::new_v4());
        let created = JmyRepository::get_or_create_company(&pool, &company(&name))
            .await
            .unwrap();

        JmyRepository::insert_time_series(&pool, created.id, &point(1, 3))
            .await
            .unwrap();
        JmyRepository::insert_time_series(&pool, created.id, &point(30, 2))
            .await
            .unwrap();

        let series = repo.time_series(created.id).await.unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].b_assigned, 2);
        assert_eq!(series[1].b_assigned, 3);

        assert!(repo.delete(created.id).await.unwrap());
        assert!(repo.time_series(created.id).await.unwrap().is_empty());
    }
}
