//! News-based enrichment of persisted companies.
//!
//! News search is the one hard dependency: if it fails, enrichment fails
//! for that company. Everything after it degrades instead. A failed or
//! malformed AI extraction yields empty signals and the enrichment still
//! succeeds with a score computed from the article count alone.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};

use crate::ai::{AiProvider, CompletionRequest};
use crate::error::{PipelineError, PipelineResult};
use crate::models::{Article, Company, CompanySignals, EnrichmentResult};
use crate::news::NewsSearch;
use crate::store::CompanyStore;

const MAX_ARTICLES_IN_PROMPT: usize = 10;
const MAX_ARTICLE_CHARS: usize = 1000;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a sales intelligence analyst. You read recent news \
coverage about a company and extract concrete, evidence-backed signals that a sales team can act on. \
You only report what the articles support and you always answer with a single JSON object.";

/// An enrichment result plus the AI cost incurred producing it.
#[derive(Debug, Clone)]
pub struct Enriched {
    pub result: EnrichmentResult,
    pub tokens_used: Option<u64>,
    pub cost: Option<f64>,
}

pub struct EnrichmentService {
    news: Arc<dyn NewsSearch>,
    ai: Arc<dyn AiProvider>,
    system_prompt: String,
}

impl EnrichmentService {
    pub fn new(news: Arc<dyn NewsSearch>, ai: Arc<dyn AiProvider>) -> Self {
        Self {
            news,
            ai,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub async fn enrich_company(&self, company: &Company) -> PipelineResult<Enriched> {
        let articles = self
            .news
            .search(&company.name)
            .await
            .map_err(|e| PipelineError::Enrichment {
                company: company.name.clone(),
                source: e,
            })?;

        let request = CompletionRequest {
            system_prompt: self.system_prompt.clone(),
            user_prompt: build_user_prompt(company, &articles),
            data: json!({
                "company": company.name,
                "domain": company.domain,
                "article_count": articles.len(),
            }),
            json_mode: true,
        };

        let (signals, tokens_used, cost) = match self.ai.complete(&request).await {
            Ok(completion) => match parse_signals(&completion.data) {
                Some(signals) => (signals, completion.tokens_used, completion.cost),
                None => {
                    tracing::warn!(company = %company.name, "malformed signal extraction, using empty signals");
                    (CompanySignals::default(), completion.tokens_used, completion.cost)
                }
            },
            Err(e) => {
                tracing::warn!(company = %company.name, error = %e, "signal extraction failed, using empty signals");
                (CompanySignals::default(), None, None)
            }
        };

        let confidence_score = confidence_score(articles.len(), &signals);

        Ok(Enriched {
            result: EnrichmentResult {
                signals,
                sources: articles.into_iter().map(|a| a.url).collect(),
                confidence_score,
                enriched_at: Utc::now(),
            },
            tokens_used,
            cost,
        })
    }

    /// Enrich the stored company `id` and persist the result.
    pub async fn enrich_and_store(
        &self,
        store: &dyn CompanyStore,
        id: &str,
    ) -> anyhow::Result<Company> {
        let company = store
            .get(id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("company {}", id)))?;
        let enriched = self.enrich_company(&company).await?;
        store.update_enrichment(id, &enriched.result).await
    }
}

/// Deterministic 0–100 score from article volume and extracted signals.
pub fn confidence_score(article_count: usize, signals: &CompanySignals) -> u8 {
    let mut score = (article_count * 10).min(30) + (signals.total() * 5).min(40);
    if !signals.funding_events.is_empty() {
        score += 20;
    }
    if !signals.leadership_changes.is_empty() {
        score += 15;
    }
    if !signals.hiring_signals.is_empty() {
        score += 10;
    }
    score.min(100) as u8
}

/// Decode model output; `None` if any category is not an array of strings.
pub fn parse_signals(data: &Value) -> Option<CompanySignals> {
    let obj = data.as_object()?;
    let signals_obj = match obj.get("signals") {
        Some(Value::Object(inner)) => inner,
        _ => obj,
    };
    for category in CompanySignals::CATEGORIES {
        match signals_obj.get(category) {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) if items.iter().all(Value::is_string) => {}
            Some(_) => return None,
        }
    }
    let cleaned: serde_json::Map<String, Value> = signals_obj
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    serde_json::from_value(Value::Object(cleaned)).ok()
}

pub fn build_articles_block(articles: &[Article]) -> String {
    articles
        .iter()
        .take(MAX_ARTICLES_IN_PROMPT)
        .map(|a| {
            let content: String = a.content.chars().take(MAX_ARTICLE_CHARS).collect();
            format!(
                "Title: {}\nPublished: {}\nContent: {}",
                a.title,
                a.published_at.as_deref().unwrap_or("unknown"),
                content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_user_prompt(company: &Company, articles: &[Article]) -> String {
    let articles_block = if articles.is_empty() {
        "(no recent articles found)".to_string()
    } else {
        build_articles_block(articles)
    };

    format!(
        r#"Analyze recent news about this company and extract sales signals.

COMPANY:
Name: {name}
Domain: {domain}
Country: {country}
Employee size: {size}

ARTICLES:
{articles}

Return a JSON object with exactly these keys, each an array of short strings:
{{
  "recent_news": [],
  "hiring_signals": [],
  "funding_events": [],
  "technology_adoption": [],
  "trigger_events": [],
  "growth_indicators": [],
  "leadership_changes": []
}}

RULES:
- Focus on coverage from the last 6 months.
- Use an empty array for any category without evidence in the articles.
- Output ONLY the JSON object."#,
        name = company.name,
        domain = company.domain.as_deref().unwrap_or("unknown"),
        country = company.country,
        size = company.employee_size,
        articles = articles_block,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals_with(funding: &[&str], hiring: &[&str], leadership: &[&str]) -> CompanySignals {
        CompanySignals {
            funding_events: funding.iter().map(|s| s.to_string()).collect(),
            hiring_signals: hiring.iter().map(|s| s.to_string()).collect(),
            leadership_changes: leadership.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_score_reference_case() {
        // 2 articles, one funding and one hiring signal.
        let signals = signals_with(&["x"], &["y"], &[]);
        assert_eq!(confidence_score(2, &signals), 60);
    }

    #[test]
    fn test_score_no_evidence() {
        assert_eq!(confidence_score(0, &CompanySignals::default()), 0);
        assert_eq!(confidence_score(1, &CompanySignals::default()), 10);
        assert_eq!(confidence_score(7, &CompanySignals::default()), 30);
    }

    #[test]
    fn test_score_clamped_to_100() {
        let many: Vec<&str> = vec!["s"; 10];
        let signals = signals_with(&many, &many, &many);
        assert_eq!(confidence_score(5, &signals), 100);
    }

    #[test]
    fn test_score_leadership_bonus() {
        let signals = signals_with(&[], &[], &["New CFO"]);
        // 10 (1 article) + 5 (1 signal) + 15
        assert_eq!(confidence_score(1, &signals), 30);
    }

    #[test]
    fn test_parse_signals_ok_and_nested() {
        let flat = json!({"funding_events": ["Series A"], "recent_news": []});
        assert_eq!(parse_signals(&flat).unwrap().funding_events, vec!["Series A"]);

        let nested = json!({"signals": {"hiring_signals": ["50 open roles"]}});
        assert_eq!(parse_signals(&nested).unwrap().hiring_signals.len(), 1);

        let with_null = json!({"recent_news": null, "trigger_events": ["Moved HQ"]});
        let parsed = parse_signals(&with_null).unwrap();
        assert!(parsed.recent_news.is_empty());
        assert_eq!(parsed.trigger_events.len(), 1);
    }

    #[test]
    fn test_parse_signals_rejects_non_string_arrays() {
        assert!(parse_signals(&json!({"funding_events": "Series A"})).is_none());
        assert!(parse_signals(&json!({"hiring_signals": [1, 2]})).is_none());
        assert!(parse_signals(&json!(["recent_news"])).is_none());
    }

    #[test]
    fn test_articles_block_truncates() {
        let articles: Vec<Article> = (0..12)
            .map(|i| Article {
                title: format!("T{}", i),
                content: "x".repeat(2000),
                url: format!("https://n/{}", i),
                published_at: None,
            })
            .collect();
        let block = build_articles_block(&articles);
        assert!(block.contains("Title: T9"));
        assert!(!block.contains("Title: T10"));
        assert!(!block.contains(&"x".repeat(1001)));
        assert!(block.contains("Published: unknown"));
    }
}
