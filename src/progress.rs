//! Upload progress reporting.
//!
//! The pipeline emits an [`UploadProgressEvent`] at each phase boundary
//! and after every cleaning batch, saved row and finished enrichment.
//! CLI reporters write to **stderr** so stdout stays parseable; the job
//! manager has its own reporter that maps events to a 0–100 percentage.

use std::io::{IsTerminal, Write};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadProgressEvent {
    /// Rows are being checked for shape and business rules.
    Validating { rows: u64 },
    /// `n` of `total` valid rows have been through the AI cleaner.
    Cleaning { n: u64, total: u64 },
    /// `n` of `total` cleaned records have been written.
    Saving { n: u64, total: u64 },
    /// `n` of `total` saved companies have finished enrichment.
    Enriching { n: u64, total: u64 },
    Done,
}

impl UploadProgressEvent {
    pub fn phase(&self) -> &'static str {
        match self {
            UploadProgressEvent::Validating { .. } => "validating",
            UploadProgressEvent::Cleaning { .. } => "cleaning",
            UploadProgressEvent::Saving { .. } => "saving",
            UploadProgressEvent::Enriching { .. } => "enriching",
            UploadProgressEvent::Done => "done",
        }
    }
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: UploadProgressEvent);
}

/// Human-friendly progress on stderr: "upload  cleaning  10 / 250 rows".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: UploadProgressEvent) {
        let line = match &event {
            UploadProgressEvent::Validating { rows } => {
                format!("upload  validating  {} rows\n", format_number(*rows))
            }
            UploadProgressEvent::Cleaning { n, total }
            | UploadProgressEvent::Saving { n, total }
            | UploadProgressEvent::Enriching { n, total } => format!(
                "upload  {}  {} / {} rows\n",
                event.phase(),
                format_number(*n),
                format_number(*total)
            ),
            UploadProgressEvent::Done => "upload  done\n".to_string(),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: UploadProgressEvent) {
        let obj = match &event {
            UploadProgressEvent::Validating { rows } => serde_json::json!({
                "event": "progress",
                "phase": event.phase(),
                "rows": rows
            }),
            UploadProgressEvent::Cleaning { n, total }
            | UploadProgressEvent::Saving { n, total }
            | UploadProgressEvent::Enriching { n, total } => serde_json::json!({
                "event": "progress",
                "phase": event.phase(),
                "n": n,
                "total": total
            }),
            UploadProgressEvent::Done => serde_json::json!({
                "event": "progress",
                "phase": event.phase()
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: UploadProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a terminal, otherwise off.
    pub fn default_for_tty() -> Self {
        if std::io::stderr().is_terminal() {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn phase_names() {
        assert_eq!(UploadProgressEvent::Validating { rows: 3 }.phase(), "validating");
        assert_eq!(UploadProgressEvent::Enriching { n: 1, total: 2 }.phase(), "enriching");
        assert_eq!(UploadProgressEvent::Done.phase(), "done");
    }
}
