//! Upload orchestration.
//!
//! Drives one upload through strictly ordered phases:
//!
//! ```text
//! parse → validate → clean (batched) → upsert → enrich (fan-out) → result
//! ```
//!
//! Inside the clean and enrich phases items run concurrently and fail
//! independently; a failure is counted and described in the
//! [`UploadResult`] and never stops its siblings. The run as a whole only
//! aborts when the input is unparseable, when no row survives validation,
//! or when every row fails cleaning.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinSet;

use crate::ai::create_provider;
use crate::cleaner::Cleaner;
use crate::config::Config;
use crate::csv_parser;
use crate::enrich::EnrichmentService;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{Company, UploadResult};
use crate::news::create_news_search;
use crate::progress::{NoProgress, ProgressReporter, UploadProgressEvent};
use crate::store::CompanyStore;
use crate::validate::{self, Validation};

/// Diagnostics quoted in the zero-valid-rows abort message.
const ABORT_DETAIL_LIMIT: usize = 5;

#[derive(Clone)]
pub struct UploadPipeline {
    store: Arc<dyn CompanyStore>,
    cleaner: Arc<Cleaner>,
    enricher: Arc<EnrichmentService>,
}

impl UploadPipeline {
    pub fn new(store: Arc<dyn CompanyStore>, cleaner: Cleaner, enricher: EnrichmentService) -> Self {
        Self {
            store,
            cleaner: Arc::new(cleaner),
            enricher: Arc::new(enricher),
        }
    }

    /// Build the AI and news collaborators described by `config`.
    pub fn from_config(config: &Config, store: Arc<dyn CompanyStore>) -> anyhow::Result<Self> {
        let ai = create_provider(&config.ai)?;
        let news = create_news_search(&config.news)?;

        let mut cleaner = Cleaner::new(ai.clone()).with_batching(
            config.ai.batch_size,
            Duration::from_millis(config.ai.batch_delay_ms),
        );
        if let Some(ref prompt) = config.prompts.cleaning_system {
            cleaner = cleaner.with_system_prompt(prompt.clone());
        }

        let mut enricher = EnrichmentService::new(news, ai);
        if let Some(ref prompt) = config.prompts.enrichment_system {
            enricher = enricher.with_system_prompt(prompt.clone());
        }

        Ok(Self::new(store, cleaner, enricher))
    }

    pub fn store(&self) -> &Arc<dyn CompanyStore> {
        &self.store
    }

    pub fn enricher(&self) -> &Arc<EnrichmentService> {
        &self.enricher
    }

    pub async fn process_csv(&self, text: &str, enable_enrichment: bool) -> PipelineResult<UploadResult> {
        self.process_csv_with(text, enable_enrichment, &NoProgress).await
    }

    pub async fn process_csv_with(
        &self,
        text: &str,
        enable_enrichment: bool,
        progress: &dyn ProgressReporter,
    ) -> PipelineResult<UploadResult> {
        let parsed = csv_parser::parse(text).map_err(|e| match e {
            PipelineError::MalformedInput(msg) => PipelineError::Processing(msg),
            other => other,
        })?;
        tracing::info!(
            rows = parsed.rows.len(),
            columns = parsed.headers.len(),
            warnings = parsed.warnings.len(),
            "parsed CSV"
        );

        let processed = parsed.rows.len();
        progress.report(UploadProgressEvent::Validating {
            rows: processed as u64,
        });
        let validation = validate::validate(parsed.rows);

        self.run(processed, parsed.warnings, validation, enable_enrichment, progress)
            .await
    }

    /// Ingest already-structured rows (e.g. a JSON array) instead of CSV text.
    pub async fn process_records(
        &self,
        rows: Vec<Value>,
        enable_enrichment: bool,
    ) -> PipelineResult<UploadResult> {
        self.process_records_with(rows, enable_enrichment, &NoProgress)
            .await
    }

    pub async fn process_records_with(
        &self,
        rows: Vec<Value>,
        enable_enrichment: bool,
        progress: &dyn ProgressReporter,
    ) -> PipelineResult<UploadResult> {
        let processed = rows.len();
        progress.report(UploadProgressEvent::Validating {
            rows: processed as u64,
        });
        let validation = validate::validate_json(&rows);
        self.run(processed, Vec::new(), validation, enable_enrichment, progress)
            .await
    }

    async fn run(
        &self,
        processed: usize,
        warnings: Vec<String>,
        validation: Validation,
        enable_enrichment: bool,
        progress: &dyn ProgressReporter,
    ) -> PipelineResult<UploadResult> {
        let mut result = UploadResult {
            processed,
            ..Default::default()
        };
        result.error_details.extend(warnings);

        for invalid in &validation.invalid {
            result.record_error(invalid.detail());
        }
        tracing::info!(
            valid = validation.valid.len(),
            invalid = validation.invalid.len(),
            "validated rows"
        );

        if validation.valid.is_empty() {
            let first: Vec<String> = validation
                .invalid
                .iter()
                .take(ABORT_DETAIL_LIMIT)
                .map(|e| e.detail())
                .collect();
            return Err(PipelineError::Processing(format!(
                "No valid rows to process ({})",
                if first.is_empty() {
                    "no data rows".to_string()
                } else {
                    first.join("; ")
                }
            )));
        }

        // Clean
        let (indices, rows): (Vec<usize>, Vec<_>) = validation.valid.into_iter().unzip();
        let total = rows.len() as u64;
        let outcomes = self
            .cleaner
            .clean_many_with(&rows, |n| {
                progress.report(UploadProgressEvent::Cleaning {
                    n: n as u64,
                    total,
                })
            })
            .await;

        let mut cleaned = Vec::with_capacity(outcomes.len());
        for (row_index, outcome) in indices.into_iter().zip(outcomes) {
            match outcome {
                Ok(c) => {
                    result.add_usage(c.tokens_used, c.cost);
                    cleaned.push((row_index, c.record));
                }
                Err(failure) => {
                    tracing::warn!(row = row_index, error = %failure, "cleaning failed");
                    result.record_error(format!("Row {}: AI cleaning failed: {}", row_index, failure));
                }
            }
        }
        tracing::info!(cleaned = cleaned.len(), total, "cleaning finished");

        if cleaned.is_empty() {
            return Err(PipelineError::Processing(
                "AI cleaning failed for all companies".to_string(),
            ));
        }

        // Upsert
        let total = cleaned.len() as u64;
        let mut saved: Vec<Company> = Vec::with_capacity(cleaned.len());
        for (n, (row_index, record)) in cleaned.iter().enumerate() {
            match self.store.upsert(record).await {
                Ok(outcome) => {
                    if outcome.was_updated {
                        result.updated += 1;
                    } else {
                        result.inserted += 1;
                    }
                    saved.push(outcome.company);
                }
                Err(e) => {
                    tracing::warn!(row = row_index, error = %e, "failed to save company");
                    result.record_error(format!("Row {}: Failed to save company: {:#}", row_index, e));
                }
            }
            progress.report(UploadProgressEvent::Saving {
                n: n as u64 + 1,
                total,
            });
        }
        tracing::info!(
            inserted = result.inserted,
            updated = result.updated,
            "companies saved"
        );

        // Rows that resolved to the same company are enriched once.
        let saved = unique_by_id(saved);

        // Enrich
        if !enable_enrichment {
            result.enrichment_skipped = saved.len();
        } else if !saved.is_empty() {
            self.enrich_all(saved, &mut result, progress).await;
        }

        progress.report(UploadProgressEvent::Done);
        tracing::info!(
            processed = result.processed,
            errors = result.errors,
            enriched = result.enriched,
            enrichment_errors = result.enrichment_errors,
            "upload finished"
        );
        Ok(result)
    }

    async fn enrich_all(
        &self,
        companies: Vec<Company>,
        result: &mut UploadResult,
        progress: &dyn ProgressReporter,
    ) {
        let total = companies.len() as u64;
        let mut tasks = JoinSet::new();

        for company in companies {
            let enricher = Arc::clone(&self.enricher);
            let store = Arc::clone(&self.store);
            tasks.spawn(async move {
                let outcome = async {
                    let enriched = enricher.enrich_company(&company).await?;
                    store
                        .update_enrichment(&company.id, &enriched.result)
                        .await?;
                    Ok::<_, anyhow::Error>(enriched)
                }
                .await;
                (company.name, outcome)
            });
        }

        let mut done = 0u64;
        while let Some(joined) = tasks.join_next().await {
            done += 1;
            match joined {
                Ok((_, Ok(enriched))) => {
                    result.enriched += 1;
                    result.add_usage(enriched.tokens_used, enriched.cost);
                }
                Ok((name, Err(e))) => {
                    tracing::warn!(company = %name, error = %e, "enrichment failed");
                    result.enrichment_errors += 1;
                    result.error_details.push(format!("{}: {:#}", name, e));
                }
                Err(join_err) => {
                    tracing::error!(error = %join_err, "enrichment task panicked");
                    result.enrichment_errors += 1;
                    result
                        .error_details
                        .push(format!("Enrichment task failed: {}", join_err));
                }
            }
            progress.report(UploadProgressEvent::Enriching { n: done, total });
        }
    }
}

/// Keep one entry per company id, holding the last saved version, in
/// first-seen order.
fn unique_by_id(companies: Vec<Company>) -> Vec<Company> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<Company> = Vec::with_capacity(companies.len());
    for company in companies {
        match positions.get(&company.id) {
            Some(&i) => unique[i] = company,
            None => {
                positions.insert(company.id.clone(), unique.len());
                unique.push(company);
            }
        }
    }
    unique
}
