use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // No UNIQUE on domain or name: dedup is the upsert lookup's job.
    // The *_key columns hold Unicode case-folded copies written by the
    // store, since SQLite's lower() only folds ASCII.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS companies (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            name_key TEXT NOT NULL,
            domain TEXT,
            domain_key TEXT,
            country TEXT NOT NULL,
            country_key TEXT NOT NULL,
            employee_size TEXT NOT NULL,
            raw_json TEXT NOT NULL DEFAULT '{}',
            enrichment_json TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            enriched_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_companies_domain ON companies(domain_key)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_companies_name ON companies(name_key)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_companies_country ON companies(country_key)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_companies_size ON companies(employee_size)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_companies_created_at ON companies(created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
