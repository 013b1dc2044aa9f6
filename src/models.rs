//! Core data models used throughout the company pipeline.
//!
//! These types represent the records that flow through ingestion
//! (raw CSV rows → cleaned records → persisted companies) and the
//! enrichment and reporting structures attached to them.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical field names every raw record may carry.
pub const KNOWN_FIELDS: [&str; 4] = ["name", "domain", "country", "employee_size"];

/// A loosely-typed row produced from a CSV line after header normalization.
///
/// Unknown columns are preserved: the record is an open mapping from
/// header to value, with typed accessors for the canonical fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord {
    fields: BTreeMap<String, String>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Raw value for `key`, if the column exists (may be empty).
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Trimmed, non-empty value for `key`.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn name(&self) -> Option<&str> {
        self.value("name")
    }

    pub fn domain(&self) -> Option<&str> {
        self.value("domain")
    }

    pub fn country(&self) -> Option<&str> {
        self.value("country")
    }

    pub fn employee_size(&self) -> Option<&str> {
        self.value("employee_size")
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.fields).unwrap_or_else(|_| serde_json::json!({}))
    }

    /// Coerce an arbitrary JSON value into a record.
    ///
    /// Objects are accepted; string values are kept verbatim, numbers and
    /// booleans are stringified and nulls are dropped. Nested arrays or
    /// objects, or a non-object input, are shape errors.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, String> {
        let obj = value
            .as_object()
            .ok_or_else(|| format!("Expected an object, got {}", json_kind(value)))?;

        let mut record = RawRecord::new();
        for (key, v) in obj {
            match v {
                serde_json::Value::Null => {}
                serde_json::Value::String(s) => record.insert(key.clone(), s.clone()),
                serde_json::Value::Number(n) => record.insert(key.clone(), n.to_string()),
                serde_json::Value::Bool(b) => record.insert(key.clone(), b.to_string()),
                other => {
                    return Err(format!(
                        "Field '{}' must be a string, got {}",
                        key,
                        json_kind(other)
                    ))
                }
            }
        }
        Ok(record)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// One of the eight fixed employee-count buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmployeeSize {
    #[serde(rename = "1-10")]
    Tiny,
    #[serde(rename = "11-50")]
    Small,
    #[serde(rename = "51-200")]
    Medium,
    #[serde(rename = "201-500")]
    MidMarket,
    #[serde(rename = "501-1,000")]
    Large,
    #[serde(rename = "1,001-5,000")]
    Enterprise,
    #[serde(rename = "5,001-10,000")]
    BigEnterprise,
    #[serde(rename = "10,000+")]
    Giant,
}

impl EmployeeSize {
    pub const ALL: [EmployeeSize; 8] = [
        EmployeeSize::Tiny,
        EmployeeSize::Small,
        EmployeeSize::Medium,
        EmployeeSize::MidMarket,
        EmployeeSize::Large,
        EmployeeSize::Enterprise,
        EmployeeSize::BigEnterprise,
        EmployeeSize::Giant,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            EmployeeSize::Tiny => "1-10",
            EmployeeSize::Small => "11-50",
            EmployeeSize::Medium => "51-200",
            EmployeeSize::MidMarket => "201-500",
            EmployeeSize::Large => "501-1,000",
            EmployeeSize::Enterprise => "1,001-5,000",
            EmployeeSize::BigEnterprise => "5,001-10,000",
            EmployeeSize::Giant => "10,000+",
        }
    }

    /// Comma-separated list of bucket labels, quoted, for prompts.
    pub fn label_list() -> String {
        Self::ALL
            .iter()
            .map(|s| format!("\"{}\"", s.label()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for EmployeeSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EmployeeSize {
    type Err = String;

    /// Exact label match only; no numeric interpretation.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|b| b.label() == s)
            .ok_or_else(|| format!("Unknown employee size bucket: '{}'", s))
    }
}

/// A company record after AI-driven normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedRecord {
    pub name: String,
    pub domain: Option<String>,
    pub country: String,
    pub employee_size: EmployeeSize,
    /// The original row, retained for audit.
    pub raw_json: RawRecord,
}

/// Persisted company entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: String,
    pub name: String,
    pub domain: Option<String>,
    pub country: String,
    pub employee_size: EmployeeSize,
    pub raw_json: RawRecord,
    pub enrichment_data: Option<EnrichmentResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub enriched_at: Option<DateTime<Utc>>,
}

/// Sales signals extracted from news coverage.
///
/// Every category defaults to an empty list; absence is never null.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanySignals {
    #[serde(default)]
    pub recent_news: Vec<String>,
    #[serde(default)]
    pub hiring_signals: Vec<String>,
    #[serde(default)]
    pub funding_events: Vec<String>,
    #[serde(default)]
    pub technology_adoption: Vec<String>,
    #[serde(default)]
    pub trigger_events: Vec<String>,
    #[serde(default)]
    pub growth_indicators: Vec<String>,
    #[serde(default)]
    pub leadership_changes: Vec<String>,
}

impl CompanySignals {
    pub const CATEGORIES: [&'static str; 7] = [
        "recent_news",
        "hiring_signals",
        "funding_events",
        "technology_adoption",
        "trigger_events",
        "growth_indicators",
        "leadership_changes",
    ];

    pub fn total(&self) -> usize {
        self.recent_news.len()
            + self.hiring_signals.len()
            + self.funding_events.len()
            + self.technology_adoption.len()
            + self.trigger_events.len()
            + self.growth_indicators.len()
            + self.leadership_changes.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub signals: CompanySignals,
    /// Article URLs, in search order.
    pub sources: Vec<String>,
    /// 0–100.
    pub confidence_score: u8,
    pub enriched_at: DateTime<Utc>,
}

/// A news article returned by the news search collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub content: String,
    pub url: String,
    pub published_at: Option<String>,
}

/// Aggregated outcome of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadResult {
    pub processed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub errors: usize,
    pub enriched: usize,
    pub enrichment_errors: usize,
    pub enrichment_skipped: usize,
    pub error_details: Vec<String>,
    pub total_tokens: Option<u64>,
    pub total_cost: Option<f64>,
}

impl UploadResult {
    pub fn record_error(&mut self, detail: impl Into<String>) {
        self.errors += 1;
        self.error_details.push(detail.into());
    }

    pub fn add_usage(&mut self, tokens: Option<u64>, cost: Option<f64>) {
        if let Some(t) = tokens {
            *self.total_tokens.get_or_insert(0) += t;
        }
        if let Some(c) = cost {
            *self.total_cost.get_or_insert(0.0) += c;
        }
    }
}

pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 100;

/// Listing filters shared by the store, the HTTP API and the CLI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyFilters {
    /// Case-insensitive substring match.
    pub country: Option<String>,
    /// Exact bucket match.
    pub employee_size: Option<EmployeeSize>,
    /// Case-insensitive substring match.
    pub domain: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl CompanyFilters {
    pub fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT)
    }

    pub fn effective_offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    /// Whether `company` passes the non-paging filters.
    pub fn matches(&self, company: &Company) -> bool {
        if let Some(ref country) = self.country {
            if !contains_ci(&company.country, country) {
                return false;
            }
        }
        if let Some(size) = self.employee_size {
            if company.employee_size != size {
                return false;
            }
        }
        if let Some(ref domain) = self.domain {
            match company.domain {
                Some(ref d) if contains_ci(d, domain) => {}
                _ => return false,
            }
        }
        true
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    fold_case(haystack).contains(&fold_case(needle))
}

/// Unicode lower-casing used for every case-insensitive comparison.
pub fn fold_case(value: &str) -> String {
    value.to_lowercase()
}
