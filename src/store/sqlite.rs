//! SQLite-backed [`CompanyStore`].
//!
//! One row per company in the `companies` table (see
//! [`migrate`](crate::migrate)). The raw row and enrichment result are
//! stored as JSON text; timestamps are unix seconds. Lookups and filters
//! compare against `*_key` columns folded with
//! [`fold_case`](crate::models::fold_case) before binding.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::models::{
    fold_case, CleanedRecord, Company, CompanyFilters, EmployeeSize, EnrichmentResult, RawRecord,
};

use super::CompanyStore;

const COLUMNS: &str = "id, name, domain, country, employee_size, raw_json, enrichment_json, \
                       created_at, updated_at, enriched_at";

// Each optional filter is bound twice: once for the NULL test, once for the match.
const FILTER_CLAUSE: &str = r#"
    WHERE (? IS NULL OR instr(country_key, ?) > 0)
      AND (? IS NULL OR employee_size = ?)
      AND (? IS NULL OR (domain_key IS NOT NULL AND instr(domain_key, ?) > 0))
"#;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_one_where(&self, clause: &str, value: &str) -> Result<Option<Company>> {
        let sql = format!(
            "SELECT {} FROM companies WHERE {} ORDER BY created_at ASC LIMIT 1",
            COLUMNS, clause
        );
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_company).transpose()
    }

    async fn require(&self, id: &str) -> Result<Company> {
        self.get(id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("company {}", id)).into())
    }
}

/// Filter values in the form [`FILTER_CLAUSE`] compares against.
fn bound_filters(filters: &CompanyFilters) -> (Option<String>, Option<&'static str>, Option<String>) {
    (
        filters.country.as_deref().map(fold_case),
        filters.employee_size.map(|s| s.label()),
        filters.domain.as_deref().map(fold_case),
    )
}

fn ts(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| anyhow!("invalid timestamp {}", secs))
}

fn row_to_company(row: &SqliteRow) -> Result<Company> {
    let size: String = row.get("employee_size");
    let raw_json: String = row.get("raw_json");
    let enrichment_json: Option<String> = row.get("enrichment_json");
    let enriched_at: Option<i64> = row.get("enriched_at");

    Ok(Company {
        id: row.get("id"),
        name: row.get("name"),
        domain: row.get("domain"),
        country: row.get("country"),
        employee_size: size.parse::<EmployeeSize>().map_err(|e| anyhow!(e))?,
        raw_json: serde_json::from_str::<RawRecord>(&raw_json).context("corrupt raw_json")?,
        enrichment_data: enrichment_json
            .map(|j| serde_json::from_str::<EnrichmentResult>(&j))
            .transpose()
            .context("corrupt enrichment_json")?,
        created_at: ts(row.get("created_at"))?,
        updated_at: ts(row.get("updated_at"))?,
        enriched_at: enriched_at.map(ts).transpose()?,
    })
}

#[async_trait]
impl CompanyStore for SqliteStore {
    async fn find_by_domain(&self, domain: &str) -> Result<Option<Company>> {
        self.fetch_one_where("domain_key = ?", &fold_case(domain)).await
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Company>> {
        self.fetch_one_where("name_key = ?", &fold_case(name)).await
    }

    async fn get(&self, id: &str) -> Result<Option<Company>> {
        self.fetch_one_where("id = ?", id).await
    }

    async fn insert(&self, record: &CleanedRecord) -> Result<Company> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp();
        let raw_json = serde_json::to_string(&record.raw_json)?;

        sqlx::query(
            r#"
            INSERT INTO companies (id, name, name_key, domain, domain_key, country, country_key,
                                   employee_size, raw_json, enrichment_json,
                                   created_at, updated_at, enriched_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?, NULL)
            "#,
        )
        .bind(&id)
        .bind(&record.name)
        .bind(fold_case(&record.name))
        .bind(&record.domain)
        .bind(record.domain.as_deref().map(fold_case))
        .bind(&record.country)
        .bind(fold_case(&record.country))
        .bind(record.employee_size.label())
        .bind(&raw_json)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.require(&id).await
    }

    async fn replace(&self, id: &str, record: &CleanedRecord) -> Result<Company> {
        let raw_json = serde_json::to_string(&record.raw_json)?;
        let result = sqlx::query(
            r#"
            UPDATE companies
            SET name = ?, name_key = ?, domain = ?, domain_key = ?, country = ?, country_key = ?,
                employee_size = ?, raw_json = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&record.name)
        .bind(fold_case(&record.name))
        .bind(&record.domain)
        .bind(record.domain.as_deref().map(fold_case))
        .bind(&record.country)
        .bind(fold_case(&record.country))
        .bind(record.employee_size.label())
        .bind(&raw_json)
        .bind(Utc::now().timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PipelineError::NotFound(format!("company {}", id)).into());
        }
        self.require(id).await
    }

    async fn update_enrichment(&self, id: &str, enrichment: &EnrichmentResult) -> Result<Company> {
        let json = serde_json::to_string(enrichment)?;
        let result = sqlx::query(
            "UPDATE companies SET enrichment_json = ?, enriched_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&json)
        .bind(enrichment.enriched_at.timestamp())
        .bind(Utc::now().timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PipelineError::NotFound(format!("company {}", id)).into());
        }
        self.require(id).await
    }

    async fn delete_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM companies")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list(&self, filters: &CompanyFilters) -> Result<Vec<Company>> {
        let sql = format!(
            "SELECT {} FROM companies {} ORDER BY created_at DESC, name ASC LIMIT ? OFFSET ?",
            COLUMNS, FILTER_CLAUSE
        );
        let (country, size, domain) = bound_filters(filters);
        let rows = sqlx::query(&sql)
            .bind(&country)
            .bind(&country)
            .bind(size)
            .bind(size)
            .bind(&domain)
            .bind(&domain)
            .bind(filters.effective_limit())
            .bind(filters.effective_offset())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_company).collect()
    }

    async fn count(&self, filters: &CompanyFilters) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM companies {}", FILTER_CLAUSE);
        let (country, size, domain) = bound_filters(filters);
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(&country)
            .bind(&country)
            .bind(size)
            .bind(size)
            .bind(&domain)
            .bind(&domain)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
