//! Background upload jobs.
//!
//! [`JobManager`] is an explicitly constructed, cloneable handle: the
//! server builds one at startup and hands clones to its routes. Submitting
//! returns a job id immediately; the pipeline then runs on the tokio
//! runtime and reports status changes over an mpsc channel to a single
//! updater task, which is the only writer of job status. Finished jobs
//! are evicted on the next submission once older than the retention
//! window (one hour by default).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock, Semaphore};
use uuid::Uuid;

use crate::models::UploadResult;
use crate::pipeline::UploadPipeline;
use crate::progress::{ProgressReporter, UploadProgressEvent};

const DEFAULT_MAX_CONCURRENT_JOBS: usize = 2;
const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);

/// What an upload job ingests.
#[derive(Debug, Clone)]
pub enum UploadInput {
    Csv(String),
    /// Pre-structured rows, one JSON object per company.
    Records(Vec<Value>),
}

impl UploadInput {
    fn row_hint(&self) -> usize {
        match self {
            UploadInput::Csv(text) => text.lines().count().saturating_sub(1),
            UploadInput::Records(rows) => rows.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub id: String,
    pub state: JobState,
    /// 0–100, never decreasing.
    pub progress: u8,
    pub result: Option<UploadResult>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self.state, JobState::Completed | JobState::Failed)
    }

    fn expired(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        self.is_finished()
            && (now - self.updated_at)
                .to_std()
                .is_ok_and(|age| age >= retention)
    }
}

#[derive(Debug)]
enum JobChange {
    Started,
    Progress(u8),
    Completed(UploadResult),
    Failed(String),
}

#[derive(Debug)]
struct JobUpdate {
    job_id: String,
    change: JobChange,
}

#[derive(Clone)]
pub struct JobManager {
    pipeline: UploadPipeline,
    jobs: Arc<RwLock<HashMap<String, JobStatus>>>,
    tx: mpsc::UnboundedSender<JobUpdate>,
    slots: Arc<Semaphore>,
    retention: Duration,
}

impl JobManager {
    /// Must be called from within a tokio runtime; spawns the updater task.
    pub fn new(pipeline: UploadPipeline) -> Self {
        Self::with_concurrency(pipeline, DEFAULT_MAX_CONCURRENT_JOBS)
    }

    pub fn with_concurrency(pipeline: UploadPipeline, max_concurrent: usize) -> Self {
        let jobs = Arc::new(RwLock::new(HashMap::new()));
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_updater(Arc::clone(&jobs), rx));

        Self {
            pipeline,
            jobs,
            tx,
            slots: Arc::new(Semaphore::new(max_concurrent.max(1))),
            retention: DEFAULT_RETENTION,
        }
    }

    /// How long a completed or failed job stays queryable.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn pipeline(&self) -> &UploadPipeline {
        &self.pipeline
    }

    /// Queue `input` for processing and return its job id.
    pub async fn submit(&self, input: UploadInput, enable_enrichment: bool) -> String {
        let job_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| !job.expired(now, self.retention));
        if jobs.len() < before {
            tracing::debug!(evicted = before - jobs.len(), "evicted finished upload jobs");
        }
        jobs.insert(
            job_id.clone(),
            JobStatus {
                id: job_id.clone(),
                state: JobState::Queued,
                progress: 0,
                result: None,
                failure_reason: None,
                created_at: now,
                updated_at: now,
            },
        );
        drop(jobs);
        tracing::info!(job_id = %job_id, rows = input.row_hint(), enable_enrichment, "upload job queued");

        let pipeline = self.pipeline.clone();
        let slots = Arc::clone(&self.slots);
        let tx = self.tx.clone();
        let id = job_id.clone();

        tokio::spawn(async move {
            let _permit = match slots.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    send(&tx, &id, JobChange::Failed("job manager shut down".to_string()));
                    return;
                }
            };
            send(&tx, &id, JobChange::Started);

            let reporter = JobProgress {
                job_id: id.clone(),
                tx: tx.clone(),
            };
            let run = tokio::spawn(async move {
                match input {
                    UploadInput::Csv(text) => {
                        pipeline
                            .process_csv_with(&text, enable_enrichment, &reporter)
                            .await
                    }
                    UploadInput::Records(rows) => {
                        pipeline
                            .process_records_with(rows, enable_enrichment, &reporter)
                            .await
                    }
                }
            });

            let change = match run.await {
                Ok(Ok(result)) => JobChange::Completed(result),
                Ok(Err(e)) => JobChange::Failed(e.to_string()),
                Err(join_err) => JobChange::Failed(format!("upload task aborted: {}", join_err)),
            };
            send(&tx, &id, change);
        });

        job_id
    }

    pub async fn status(&self, job_id: &str) -> Option<JobStatus> {
        self.jobs.read().await.get(job_id).cloned()
    }
}

fn send(tx: &mpsc::UnboundedSender<JobUpdate>, job_id: &str, change: JobChange) {
    if tx
        .send(JobUpdate {
            job_id: job_id.to_string(),
            change,
        })
        .is_err()
    {
        tracing::warn!(job_id, "job updater is gone, dropping status update");
    }
}

async fn run_updater(
    jobs: Arc<RwLock<HashMap<String, JobStatus>>>,
    mut rx: mpsc::UnboundedReceiver<JobUpdate>,
) {
    while let Some(update) = rx.recv().await {
        let mut jobs = jobs.write().await;
        let Some(job) = jobs.get_mut(&update.job_id) else {
            continue;
        };
        job.updated_at = Utc::now();
        match update.change {
            JobChange::Started => job.state = JobState::Active,
            JobChange::Progress(p) => job.progress = job.progress.max(p),
            JobChange::Completed(result) => {
                tracing::info!(job_id = %job.id, processed = result.processed, errors = result.errors, "upload job completed");
                job.state = JobState::Completed;
                job.progress = 100;
                job.result = Some(result);
            }
            JobChange::Failed(reason) => {
                tracing::warn!(job_id = %job.id, reason = %reason, "upload job failed");
                job.state = JobState::Failed;
                job.failure_reason = Some(reason);
            }
        }
    }
}

/// Maps pipeline events onto the job's 0–100 progress.
struct JobProgress {
    job_id: String,
    tx: mpsc::UnboundedSender<JobUpdate>,
}

impl ProgressReporter for JobProgress {
    fn report(&self, event: UploadProgressEvent) {
        send(&self.tx, &self.job_id, JobChange::Progress(progress_percent(&event)));
    }
}

pub fn progress_percent(event: &UploadProgressEvent) -> u8 {
    fn span(start: u64, width: u64, n: u64, total: u64) -> u8 {
        if total == 0 {
            return (start + width) as u8;
        }
        (start + width * n.min(total) / total) as u8
    }

    match *event {
        UploadProgressEvent::Validating { .. } => 10,
        UploadProgressEvent::Cleaning { n, total } => span(10, 40, n, total),
        UploadProgressEvent::Saving { n, total } => span(50, 20, n, total),
        UploadProgressEvent::Enriching { n, total } => span(70, 25, n, total),
        UploadProgressEvent::Done => 95,
    }
}
