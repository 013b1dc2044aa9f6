//! Scripted collaborators shared by the pipeline and HTTP tests.
#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use company_intel::ai::{AiProvider, Completion, CompletionRequest};
use company_intel::cleaner::Cleaner;
use company_intel::enrich::EnrichmentService;
use company_intel::models::Article;
use company_intel::news::NewsSearch;
use company_intel::pipeline::UploadPipeline;
use company_intel::store::{CompanyStore, InMemoryStore};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// AI model that answers cleaning and signal-extraction requests from
/// their structured input. Cleaning fails for any name in `fail_names`.
pub struct ScriptedAi {
    pub fail_names: HashSet<String>,
    pub signals: Value,
    pub cleaning_calls: AtomicUsize,
    pub enrichment_calls: AtomicUsize,
    pub seen_names: Mutex<Vec<String>>,
}

impl ScriptedAi {
    pub fn new() -> Self {
        Self {
            fail_names: HashSet::new(),
            signals: json!({}),
            cleaning_calls: AtomicUsize::new(0),
            enrichment_calls: AtomicUsize::new(0),
            seen_names: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_for(names: &[&str]) -> Self {
        let mut ai = Self::new();
        ai.fail_names = names.iter().map(|n| n.to_string()).collect();
        ai
    }

    pub fn with_signals(mut self, signals: Value) -> Self {
        self.signals = signals;
        self
    }
}

#[async_trait]
impl AiProvider for ScriptedAi {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-1"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        // Enrichment requests carry the article count.
        if request.data.get("article_count").is_some() {
            self.enrichment_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(Completion {
                data: self.signals.clone(),
                tokens_used: Some(50),
                cost: Some(0.02),
            });
        }

        self.cleaning_calls.fetch_add(1, Ordering::SeqCst);
        let raw_name = request.data["name"].as_str().unwrap_or_default().trim().to_string();
        self.seen_names.lock().unwrap().push(raw_name.clone());
        if self.fail_names.contains(&raw_name) {
            bail!("model timed out");
        }

        let name = raw_name.trim_end_matches(" Inc.").trim_end_matches(" LLC").to_string();
        let domain = request.data["domain"]
            .as_str()
            .filter(|d| !d.trim().is_empty())
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null);

        Ok(Completion {
            data: json!({
                "name": name,
                "domain": domain,
                "country": "United States",
                "employee_size": "51-200",
            }),
            tokens_used: Some(10),
            cost: Some(0.01),
        })
    }
}

/// News search returning two articles per company, failing for `fail_names`.
pub struct ScriptedNews {
    pub fail_names: HashSet<String>,
    pub calls: AtomicUsize,
    pub seen_names: Mutex<Vec<String>>,
}

impl ScriptedNews {
    pub fn new() -> Self {
        Self {
            fail_names: HashSet::new(),
            calls: AtomicUsize::new(0),
            seen_names: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_for(names: &[&str]) -> Self {
        let mut news = Self::new();
        news.fail_names = names.iter().map(|n| n.to_string()).collect();
        news
    }
}

#[async_trait]
impl NewsSearch for ScriptedNews {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn search(&self, company_name: &str) -> Result<Vec<Article>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_names.lock().unwrap().push(company_name.to_string());
        if self.fail_names.contains(company_name) {
            bail!("news backend unavailable");
        }
        Ok((1..=2)
            .map(|i| Article {
                title: format!("{} story {}", company_name, i),
                content: format!("{} did something notable.", company_name),
                url: format!("https://news.test/{}/{}", company_name.to_lowercase(), i),
                published_at: Some("2026-09-01T00:00:00Z".to_string()),
            })
            .collect())
    }
}

pub struct Harness {
    pub ai: Arc<ScriptedAi>,
    pub news: Arc<ScriptedNews>,
    pub store: Arc<InMemoryStore>,
    pub pipeline: UploadPipeline,
}

pub fn harness(ai: ScriptedAi, news: ScriptedNews) -> Harness {
    let ai = Arc::new(ai);
    let news = Arc::new(news);
    let store = Arc::new(InMemoryStore::new());
    let pipeline = pipeline_on(store.clone(), &ai, &news);

    Harness {
        ai,
        news,
        store,
        pipeline,
    }
}

/// Pipeline over an arbitrary store, batching cleaning two rows at a time.
pub fn pipeline_on(
    store: Arc<dyn CompanyStore>,
    ai: &Arc<ScriptedAi>,
    news: &Arc<ScriptedNews>,
) -> UploadPipeline {
    let cleaner = Cleaner::new(ai.clone()).with_batching(2, Duration::ZERO);
    let enricher = EnrichmentService::new(news.clone(), ai.clone());
    UploadPipeline::new(store, cleaner, enricher)
}
