//! Typed errors that escape the pipeline.
//!
//! Only fatal conditions are represented here. Per-row and per-company
//! failures are recorded in [`UploadResult`](crate::models::UploadResult)
//! and never surface as errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// The CSV has no header line or no data rows.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// The run cannot continue (parse abort, nothing valid, all cleaning failed).
    #[error("Processing failed: {0}")]
    Processing(String),

    /// News search failed for a company.
    #[error("Enrichment failed for {company}: {source}")]
    Enrichment {
        company: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
