//! Row validation: record shape plus business rules.
//!
//! Every input row yields exactly one outcome, valid or invalid. Row
//! indices in diagnostics are 1-based and count the header line, so the
//! first data row is row 2.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::models::RawRecord;

static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?)*\.[a-zA-Z]{2,}$")
        .expect("domain pattern is valid")
});

/// Diagnostic for one invalid row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowError {
    pub row_index: usize,
    pub data: serde_json::Value,
    pub error: String,
}

impl RowError {
    pub fn detail(&self) -> String {
        format!("Row {}: {}", self.row_index, self.error)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Validation {
    /// Valid rows paired with their row index.
    pub valid: Vec<(usize, RawRecord)>,
    pub invalid: Vec<RowError>,
}

pub fn row_index(position: usize) -> usize {
    position + 2
}

/// Validate already-parsed records.
///
/// Parsed records are record-shaped by construction, so only the
/// business rules can reject them.
pub fn validate(rows: Vec<RawRecord>) -> Validation {
    let shaped = rows.into_iter().map(Ok).collect();
    partition(shaped)
}

/// Validate arbitrary JSON rows, coercing each into a [`RawRecord`] first.
pub fn validate_json(rows: &[serde_json::Value]) -> Validation {
    let shaped = rows
        .iter()
        .map(|v| RawRecord::from_json(v).map_err(|e| (v.clone(), e)))
        .collect();
    partition(shaped)
}

fn partition(rows: Vec<Result<RawRecord, (serde_json::Value, String)>>) -> Validation {
    let mut out = Validation::default();
    let mut shape_valid = Vec::new();

    for (pos, row) in rows.into_iter().enumerate() {
        match row {
            Ok(record) => shape_valid.push((row_index(pos), record)),
            Err((data, error)) => out.invalid.push(RowError {
                row_index: row_index(pos),
                data,
                error,
            }),
        }
    }

    let rule_errors = check_business_rules(&shape_valid);
    let rejected: BTreeSet<usize> = rule_errors.iter().map(|e| e.row_index).collect();
    out.invalid.extend(rule_errors);
    out.invalid.sort_by_key(|e| e.row_index);
    out.valid = shape_valid
        .into_iter()
        .filter(|(idx, _)| !rejected.contains(idx))
        .collect();
    out
}

/// Business-rule pass over schema-valid rows, indexed by position.
pub fn validate_business_rules(rows: &[RawRecord]) -> Vec<RowError> {
    let indexed: Vec<(usize, RawRecord)> = rows
        .iter()
        .enumerate()
        .map(|(pos, r)| (row_index(pos), r.clone()))
        .collect();
    check_business_rules(&indexed)
}

fn check_business_rules(rows: &[(usize, RawRecord)]) -> Vec<RowError> {
    let mut errors = Vec::new();
    for (idx, record) in rows {
        if record.name().is_none() && record.domain().is_none() {
            errors.push(RowError {
                row_index: *idx,
                data: record.to_json(),
                error: "Company must have either a name or domain".to_string(),
            });
        }

        if let Some(domain) = record.domain() {
            if !is_valid_domain(domain) {
                errors.push(RowError {
                    row_index: *idx,
                    data: record.to_json(),
                    error: format!("Invalid domain format: {}", domain),
                });
            }
        }
    }
    errors
}

/// Hostname check; an `http://` or `https://` prefix and a trailing slash are tolerated.
pub fn is_valid_domain(domain: &str) -> bool {
    let lower = domain.trim().to_lowercase();
    let host = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
        .unwrap_or(&lower);
    let host = host.trim_end_matches('/');
    DOMAIN_RE.is_match(host)
}
