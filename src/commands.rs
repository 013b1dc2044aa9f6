//! Implementations behind the `intel` CLI subcommands.
//!
//! Each `run_*` function opens the database from the config, does its work
//! and prints to stdout. Human output is the default; `--json` switches a
//! command to a single JSON document so scripts can parse it.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::{Company, CompanyFilters, EmployeeSize, UploadResult};
use crate::pipeline::UploadPipeline;
use crate::progress::ProgressMode;
use crate::store::{CompanyStore, SqliteStore};

async fn open_store(config: &Config) -> Result<Arc<dyn CompanyStore>> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    Ok(Arc::new(SqliteStore::new(pool)))
}

pub async fn run_init(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    pool.close().await;
    println!("Database initialized at {}", config.db.path.display());
    Ok(())
}

pub async fn run_upload(
    config: &Config,
    file: &Path,
    enable_enrichment: bool,
    json: bool,
    progress: ProgressMode,
) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read CSV file: {}", file.display()))?;

    let store = open_store(config).await?;
    let pipeline = UploadPipeline::from_config(config, store)?;
    let reporter = progress.reporter();
    let result = pipeline
        .process_csv_with(&text, enable_enrichment, reporter.as_ref())
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_upload_result(file, &result);
    }
    Ok(())
}

fn print_upload_result(file: &Path, result: &UploadResult) {
    println!("upload {}", file.display());
    println!("  processed: {}", result.processed);
    println!("  inserted: {}", result.inserted);
    println!("  updated: {}", result.updated);
    println!("  errors: {}", result.errors);
    if result.enrichment_skipped > 0 {
        println!("  enrichment skipped: {}", result.enrichment_skipped);
    } else {
        println!("  enriched: {}", result.enriched);
        println!("  enrichment errors: {}", result.enrichment_errors);
    }
    if let Some(tokens) = result.total_tokens {
        println!("  tokens: {}", tokens);
    }
    if let Some(cost) = result.total_cost {
        println!("  cost: ${:.4}", cost);
    }
    if !result.error_details.is_empty() {
        println!("  details:");
        for detail in &result.error_details {
            println!("    {}", detail);
        }
    }
}

pub async fn run_list(config: &Config, filters: CompanyFilters, json: bool) -> Result<()> {
    let store = open_store(config).await?;
    let companies = store.list(&filters).await?;
    let total = store.count(&filters).await?;

    if json {
        let body = serde_json::json!({ "companies": companies, "total": total });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    if companies.is_empty() {
        println!("No companies found.");
        return Ok(());
    }

    for c in &companies {
        print_company_line(c);
    }
    println!(
        "\nShowing {} of {} (offset {})",
        companies.len(),
        total,
        filters.effective_offset()
    );
    Ok(())
}

fn print_company_line(c: &Company) {
    let score = c
        .enrichment_data
        .as_ref()
        .map(|e| e.confidence_score.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{}  {}  {}  {}  {}  score={}",
        c.id,
        c.name,
        c.domain.as_deref().unwrap_or("-"),
        c.country,
        c.employee_size,
        score
    );
}

pub async fn run_enrich(config: &Config, id: &str) -> Result<()> {
    let store = open_store(config).await?;
    let pipeline = UploadPipeline::from_config(config, Arc::clone(&store))?;
    let company = pipeline
        .enricher()
        .enrich_and_store(store.as_ref(), id)
        .await?;

    println!("{}", serde_json::to_string_pretty(&company)?);
    Ok(())
}

pub async fn run_reset(config: &Config, yes: bool) -> Result<()> {
    if !yes {
        bail!("Refusing to delete all companies without --yes");
    }
    let store = open_store(config).await?;
    let deleted = store.delete_all().await?;
    println!("Deleted {} companies.", deleted);
    Ok(())
}

/// Parse a `--size` argument into a bucket.
pub fn parse_size_arg(raw: &str) -> Result<EmployeeSize, String> {
    raw.trim().parse()
}
