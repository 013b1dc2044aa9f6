//! AI-driven cleaning of raw company rows.
//!
//! One request per row: the model normalizes the name, infers missing
//! domain/country/size and must answer with a JSON object whose shape is
//! checked here before anything reaches the store. A failure for one
//! row is a value ([`CleaningFailure`]), never a panic or an abort.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use thiserror::Error;

use crate::ai::{AiProvider, CompletionRequest};
use crate::models::{CleanedRecord, EmployeeSize, RawRecord};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CleaningFailure {
    #[error("missing company name")]
    MissingName,
    #[error("AI request failed: {0}")]
    Provider(String),
    #[error("invalid AI response: {0}")]
    InvalidResponse(String),
}

/// A cleaned record plus the usage reported for producing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Cleaned {
    pub record: CleanedRecord,
    pub tokens_used: Option<u64>,
    pub cost: Option<f64>,
}

pub fn default_system_prompt() -> String {
    format!(
        r#"You are a data-cleaning assistant for B2B company records.
Given one raw company record, return a single JSON object with exactly these keys:
  "name": string, "domain": string or null, "country": string or null, "employee_size": string

RULES:
- name: proper-case the company name and strip corporate suffixes (Inc, Inc., LLC, Ltd, GmbH, Corp, Co., S.A., PLC).
- domain: bare hostname only, no scheme, no "www.", no path (e.g. "apple.com"). If missing, infer it from your general knowledge of the named company; use null only if you cannot.
- country: full English country name (e.g. "us" or "USA" → "United States", "uk" → "United Kingdom"). If missing, infer the headquarters country; use null only if you cannot.
- employee_size: exactly one of {buckets}.
  Map raw numbers to the bucket containing them. Anything above 10,000 is "10,000+"; anything below 1 is "1-10".
  If size is missing, infer it from general knowledge of the company. If the company is unknown to you, use "1-10".
- Output ONLY the JSON object, no markdown, no explanations."#,
        buckets = EmployeeSize::label_list()
    )
}

pub fn build_user_prompt(row: &RawRecord) -> String {
    let raw = serde_json::to_string_pretty(&row.to_json()).unwrap_or_default();
    format!("Clean this company record:\n\n{}\n\nJSON OUTPUT:", raw)
}

pub struct Cleaner {
    provider: Arc<dyn AiProvider>,
    system_prompt: String,
    batch_size: usize,
    batch_delay: Duration,
}

impl Cleaner {
    pub fn new(provider: Arc<dyn AiProvider>) -> Self {
        Self {
            provider,
            system_prompt: default_system_prompt(),
            batch_size: 5,
            batch_delay: Duration::ZERO,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_batching(mut self, batch_size: usize, batch_delay: Duration) -> Self {
        self.batch_size = batch_size.max(1);
        self.batch_delay = batch_delay;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub async fn clean_one(&self, row: &RawRecord) -> Result<Cleaned, CleaningFailure> {
        if row.name().is_none() {
            return Err(CleaningFailure::MissingName);
        }

        let request = CompletionRequest {
            system_prompt: self.system_prompt.clone(),
            user_prompt: build_user_prompt(row),
            data: row.to_json(),
            json_mode: true,
        };

        let completion = self
            .provider
            .complete(&request)
            .await
            .map_err(|e| CleaningFailure::Provider(format!("{:#}", e)))?;

        let record = validate_response(&completion.data, row)
            .map_err(CleaningFailure::InvalidResponse)?;

        Ok(Cleaned {
            record,
            tokens_used: completion.tokens_used,
            cost: completion.cost,
        })
    }

    /// Clean rows in bounded concurrent batches; output order matches input.
    pub async fn clean_many(&self, rows: &[RawRecord]) -> Vec<Result<Cleaned, CleaningFailure>> {
        self.clean_many_with(rows, |_done| {}).await
    }

    /// Like [`clean_many`](Self::clean_many), calling `on_batch` with the
    /// number of rows finished after each batch.
    pub async fn clean_many_with<F>(
        &self,
        rows: &[RawRecord],
        mut on_batch: F,
    ) -> Vec<Result<Cleaned, CleaningFailure>>
    where
        F: FnMut(usize),
    {
        let mut results = Vec::with_capacity(rows.len());
        let batches: Vec<&[RawRecord]> = rows.chunks(self.batch_size).collect();
        let batch_count = batches.len();

        for (i, batch) in batches.into_iter().enumerate() {
            let outcomes = join_all(batch.iter().map(|row| self.clean_one(row))).await;
            results.extend(outcomes);
            on_batch(results.len());

            if i + 1 < batch_count && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
        }

        results
    }
}

/// Check the model's answer and turn it into a [`CleanedRecord`].
pub fn validate_response(data: &Value, raw: &RawRecord) -> Result<CleanedRecord, String> {
    let obj = data
        .as_object()
        .ok_or_else(|| "response is not a JSON object".to_string())?;

    let name = match obj.get("name") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => return Err("'name' must be a non-empty string".to_string()),
    };

    let domain = match obj.get("domain") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => normalize_domain(s),
        Some(_) => return Err("'domain' must be a string or null".to_string()),
    };

    let country = match obj.get("country") {
        None | Some(Value::Null) => "Unknown".to_string(),
        Some(Value::String(s)) if s.trim().is_empty() => "Unknown".to_string(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(_) => return Err("'country' must be a string or null".to_string()),
    };

    let employee_size = match obj.get("employee_size") {
        Some(Value::String(s)) => s
            .parse::<EmployeeSize>()
            .map_err(|_| format!("'employee_size' must be one of {}", EmployeeSize::label_list()))?,
        _ => return Err("'employee_size' must be a string".to_string()),
    };

    Ok(CleanedRecord {
        name,
        domain,
        country,
        employee_size,
        raw_json: raw.clone(),
    })
}

/// Reduce a URL or hostname to a bare lower-case host.
pub fn normalize_domain(input: &str) -> Option<String> {
    let lower = input.trim().to_lowercase();
    let without_scheme = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
        .unwrap_or(&lower);
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or("");
    let host = host.strip_prefix("www.").unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}
