//! News search collaborators.
//!
//! The enrichment service only needs "company name → articles"; this
//! module provides that contract as the [`NewsSearch`] trait with a
//! NewsAPI-backed implementation and a disabled stub.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::NewsConfig;
use crate::models::Article;

#[async_trait]
pub trait NewsSearch: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, company_name: &str) -> Result<Vec<Article>>;
}

pub fn create_news_search(config: &NewsConfig) -> Result<Arc<dyn NewsSearch>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledNews)),
        "newsapi" => Ok(Arc::new(NewsApiClient::new(config)?)),
        other => bail!("Unknown news provider: {}", other),
    }
}

pub struct DisabledNews;

#[async_trait]
impl NewsSearch for DisabledNews {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn search(&self, _company_name: &str) -> Result<Vec<Article>> {
        bail!("news search is disabled")
    }
}

/// Client for the NewsAPI `/everything` endpoint.
///
/// Requires the `NEWS_API_KEY` environment variable.
pub struct NewsApiClient {
    url: String,
    api_key: String,
    page_size: u32,
    lookback_days: i64,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct NewsApiResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsApiArticle {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
}

impl NewsApiClient {
    pub fn new(config: &NewsConfig) -> Result<Self> {
        let api_key = std::env::var("NEWS_API_KEY")
            .map_err(|_| anyhow!("NEWS_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://newsapi.org/v2".to_string()),
            api_key,
            page_size: config.page_size,
            lookback_days: config.lookback_days,
            client,
        })
    }
}

#[async_trait]
impl NewsSearch for NewsApiClient {
    fn name(&self) -> &str {
        "newsapi"
    }

    async fn search(&self, company_name: &str) -> Result<Vec<Article>> {
        let from = ChronoDuration::try_days(self.lookback_days)
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .ok_or_else(|| anyhow!("news lookback of {} days is out of range", self.lookback_days))?
            .format("%Y-%m-%d")
            .to_string();
        let query = format!("\"{}\"", company_name);
        let page_size = self.page_size.to_string();

        let response = self
            .client
            .get(format!("{}/everything", self.url.trim_end_matches('/')))
            .header("X-Api-Key", &self.api_key)
            .query(&[
                ("q", query.as_str()),
                ("from", from.as_str()),
                ("sortBy", "publishedAt"),
                ("language", "en"),
                ("pageSize", page_size.as_str()),
            ])
            .send()
            .await
            .context("News search request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("News API error {}: {}", status, body_text);
        }

        let body: NewsApiResponse = response
            .json()
            .await
            .context("Failed to parse news search response")?;
        if body.status != "ok" {
            bail!(
                "News API returned status '{}': {}",
                body.status,
                body.message.unwrap_or_default()
            );
        }

        Ok(body.articles.into_iter().filter_map(into_article).collect())
    }
}

fn into_article(a: NewsApiArticle) -> Option<Article> {
    let url = a.url.filter(|u| !u.is_empty())?;
    Some(Article {
        title: a.title.unwrap_or_default(),
        content: a.content.or(a.description).unwrap_or_default(),
        url,
        published_at: a.published_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_article_content_falls_back_to_description() {
        let raw: NewsApiArticle = serde_json::from_value(serde_json::json!({
            "title": "Acme raises $10M",
            "description": "Series A led by Fund",
            "content": null,
            "url": "https://news.example/acme",
            "publishedAt": "2026-03-01T10:00:00Z"
        }))
        .unwrap();
        let article = into_article(raw).unwrap();
        assert_eq!(article.content, "Series A led by Fund");
        assert_eq!(article.published_at.as_deref(), Some("2026-03-01T10:00:00Z"));
    }

    #[test]
    fn test_article_without_url_dropped() {
        let raw: NewsApiArticle =
            serde_json::from_value(serde_json::json!({ "title": "No link" })).unwrap();
        assert!(into_article(raw).is_none());
    }

    #[tokio::test]
    async fn test_disabled_news_fails() {
        let news = create_news_search(&NewsConfig::default()).unwrap();
        assert!(news.search("Acme").await.is_err());
    }
}
