//! CSV text → raw records.
//!
//! Lenient parsing: ragged rows become warnings and
//! a best-effort record, and only input without a header plus one data
//! row is rejected outright. Field splitting (quotes, embedded
//! delimiters) is delegated to the `csv` crate; this module owns blank
//! record filtering, delimiter detection and header normalization.

use crate::error::PipelineError;
use crate::models::RawRecord;

#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub skip_empty_lines: bool,
    pub trim: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            skip_empty_lines: true,
            trim: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParsedCsv {
    pub headers: Vec<String>,
    pub rows: Vec<RawRecord>,
    pub warnings: Vec<String>,
}

/// Parse CSV text with default options.
pub fn parse(text: &str) -> Result<ParsedCsv, PipelineError> {
    parse_with(text, &ParseOptions::default())
}

pub fn parse_with(text: &str, options: &ParseOptions) -> Result<ParsedCsv, PipelineError> {
    let non_empty = text.lines().filter(|l| !l.trim().is_empty()).count();
    if non_empty < 2 {
        return Err(PipelineError::MalformedInput(
            "CSV must contain a header row and at least one data row".to_string(),
        ));
    }

    let header_line = text
        .lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or_default();
    let delimiter = detect_delimiter(header_line);

    // Text goes to the reader untouched so quoted fields keep their blank lines.
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .trim(if options.trim {
            csv::Trim::All
        } else {
            csv::Trim::None
        })
        .from_reader(text.as_bytes());

    let skip_blank = options.skip_empty_lines;
    let mut records = reader
        .records()
        .filter(|r| !(skip_blank && r.as_ref().is_ok_and(is_blank)));

    let headers: Vec<String> = match records.next() {
        Some(Ok(record)) => record.iter().map(normalize_header).collect(),
        Some(Err(e)) => {
            return Err(PipelineError::MalformedInput(format!(
                "Unreadable header row: {}",
                e
            )))
        }
        None => {
            return Err(PipelineError::MalformedInput(
                "CSV has no header row".to_string(),
            ))
        }
    };

    let mut parsed = ParsedCsv {
        headers,
        ..Default::default()
    };
    for field in repeated_fields(&parsed.headers) {
        parsed.warnings.push(format!(
            "Header: several columns map to '{}'; the first non-empty value is used",
            field
        ));
    }

    for (i, result) in records.enumerate() {
        // Header is line 1, first data row is line 2.
        let row_number = i + 2;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                parsed
                    .warnings
                    .push(format!("Row {}: Unreadable row ({})", row_number, e));
                continue;
            }
        };

        if record.len() != parsed.headers.len() {
            parsed.warnings.push(format!(
                "Row {}: Expected {} columns, got {}",
                row_number,
                parsed.headers.len(),
                record.len()
            ));
        }

        let mut row = RawRecord::new();
        for (col, header) in parsed.headers.iter().enumerate() {
            let value = record.get(col).unwrap_or("");
            if row.get(header).map_or(true, |seen| seen.trim().is_empty()) {
                row.insert(header.clone(), value);
            }
        }
        parsed.rows.push(row);
    }

    Ok(parsed)
}

/// A line holding nothing but whitespace.
fn is_blank(record: &csv::StringRecord) -> bool {
    record.len() <= 1 && record.iter().all(|f| f.trim().is_empty())
}

/// Canonical names that more than one header column maps to, in column order.
fn repeated_fields(headers: &[String]) -> Vec<&str> {
    let mut repeated: Vec<&str> = Vec::new();
    for (i, header) in headers.iter().enumerate() {
        if headers[..i].contains(header) && !repeated.contains(&header.as_str()) {
            repeated.push(header);
        }
    }
    repeated
}

/// Tab-delimited when the header line contains a tab, comma otherwise.
pub fn detect_delimiter(header_line: &str) -> u8 {
    if header_line.contains('\t') {
        b'\t'
    } else {
        b','
    }
}

/// Map a header cell to its canonical field name.
///
/// Headers are lower-cased and spaces/hyphens become underscores before
/// synonym lookup; unknown headers pass through in that normalized form.
pub fn normalize_header(raw: &str) -> String {
    let key = raw
        .trim()
        .trim_start_matches('\u{feff}')
        .to_lowercase()
        .replace([' ', '-'], "_");

    match key.as_str() {
        "company_name" | "company" | "organization" | "name" => "name".to_string(),
        "website" | "url" | "web" | "domain" | "company_domain" => "domain".to_string(),
        "employees" | "size" | "headcount" | "employee_count" | "company_size"
        | "employee_size" => "employee_size".to_string(),
        "location" | "country" | "hq_country" => "country".to_string(),
        _ => key,
    }
}
