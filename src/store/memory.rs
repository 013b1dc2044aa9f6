//! In-memory [`CompanyStore`] for tests and ephemeral runs.
//!
//! Companies live in a `HashMap` behind `std::sync::RwLock`. Every method
//! completes without awaiting, so a single call is atomic; a sequence of
//! calls (like the lookup-then-write inside `upsert`) is not.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::models::{fold_case, CleanedRecord, Company, CompanyFilters, EnrichmentResult};

use super::CompanyStore;

pub struct InMemoryStore {
    companies: RwLock<HashMap<String, Company>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            companies: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Company>>> {
        self.companies
            .read()
            .map_err(|_| anyhow!("company store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Company>>> {
        self.companies
            .write()
            .map_err(|_| anyhow!("company store lock poisoned"))
    }

    fn find_by<F>(&self, pred: F) -> Result<Option<Company>>
    where
        F: Fn(&Company) -> bool,
    {
        let companies = self.read()?;
        Ok(companies
            .values()
            .filter(|c| pred(c))
            .min_by_key(|c| c.created_at)
            .cloned())
    }

    fn filtered(&self, filters: &CompanyFilters) -> Result<Vec<Company>> {
        let companies = self.read()?;
        let mut matching: Vec<Company> = companies
            .values()
            .filter(|c| filters.matches(c))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(matching)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompanyStore for InMemoryStore {
    async fn find_by_domain(&self, domain: &str) -> Result<Option<Company>> {
        let domain = fold_case(domain);
        self.find_by(|c| c.domain.as_deref().is_some_and(|d| fold_case(d) == domain))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Company>> {
        let name = fold_case(name);
        self.find_by(|c| fold_case(&c.name) == name)
    }

    async fn get(&self, id: &str) -> Result<Option<Company>> {
        Ok(self.read()?.get(id).cloned())
    }

    async fn insert(&self, record: &CleanedRecord) -> Result<Company> {
        let now = Utc::now();
        let company = Company {
            id: Uuid::new_v4().to_string(),
            name: record.name.clone(),
            domain: record.domain.clone(),
            country: record.country.clone(),
            employee_size: record.employee_size,
            raw_json: record.raw_json.clone(),
            enrichment_data: None,
            created_at: now,
            updated_at: now,
            enriched_at: None,
        };
        self.write()?.insert(company.id.clone(), company.clone());
        Ok(company)
    }

    async fn replace(&self, id: &str, record: &CleanedRecord) -> Result<Company> {
        let mut companies = self.write()?;
        let company = companies
            .get_mut(id)
            .ok_or_else(|| PipelineError::NotFound(format!("company {}", id)))?;
        company.name = record.name.clone();
        company.domain = record.domain.clone();
        company.country = record.country.clone();
        company.employee_size = record.employee_size;
        company.raw_json = record.raw_json.clone();
        company.updated_at = Utc::now();
        Ok(company.clone())
    }

    async fn update_enrichment(&self, id: &str, result: &EnrichmentResult) -> Result<Company> {
        let mut companies = self.write()?;
        let company = companies
            .get_mut(id)
            .ok_or_else(|| PipelineError::NotFound(format!("company {}", id)))?;
        company.enrichment_data = Some(result.clone());
        company.enriched_at = Some(result.enriched_at);
        company.updated_at = Utc::now();
        Ok(company.clone())
    }

    async fn delete_all(&self) -> Result<u64> {
        let mut companies = self.write()?;
        let n = companies.len() as u64;
        companies.clear();
        Ok(n)
    }

    async fn list(&self, filters: &CompanyFilters) -> Result<Vec<Company>> {
        Ok(self
            .filtered(filters)?
            .into_iter()
            .skip(filters.effective_offset() as usize)
            .take(filters.effective_limit() as usize)
            .collect())
    }

    async fn count(&self, filters: &CompanyFilters) -> Result<i64> {
        Ok(self.filtered(filters)?.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CompanySignals, EmployeeSize, RawRecord};

    fn record(name: &str, domain: Option<&str>, country: &str) -> CleanedRecord {
        CleanedRecord {
            name: name.to_string(),
            domain: domain.map(str::to_string),
            country: country.to_string(),
            employee_size: EmployeeSize::Small,
            raw_json: RawRecord::new(),
        }
    }

    #[tokio::test]
    async fn test_upsert_same_domain_updates_in_place() {
        let store = InMemoryStore::new();
        let first = store
            .upsert(&record("Acme", Some("acme.com"), "United States"))
            .await
            .unwrap();
        assert!(!first.was_updated);

        let second = store
            .upsert(&record("Acme Corp", Some("ACME.com"), "Canada"))
            .await
            .unwrap();
        assert!(second.was_updated);
        assert_eq!(second.company.id, first.company.id);
        assert_eq!(second.company.created_at, first.company.created_at);
        assert_eq!(second.company.country, "Canada");
        assert_eq!(store.count(&CompanyFilters::default()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_without_domain_matches_name() {
        let store = InMemoryStore::new();
        store.upsert(&record("Globex", None, "US")).await.unwrap();
        let again = store.upsert(&record("globex", None, "US")).await.unwrap();
        assert!(again.was_updated);
        assert_eq!(store.count(&CompanyFilters::default()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_non_ascii_case_folding() {
        let store = InMemoryStore::new();
        store.upsert(&record("ÉCOLE BLEUE", None, "Österreich")).await.unwrap();
        let again = store.upsert(&record("école bleue", None, "Österreich")).await.unwrap();
        assert!(again.was_updated);

        store.insert(&record("Ärzte", Some("ÄRZTE.de"), "DE")).await.unwrap();
        assert!(store.find_by_domain("ärzte.de").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_replace_keeps_enrichment() {
        let store = InMemoryStore::new();
        let c = store.insert(&record("Acme", Some("acme.com"), "US")).await.unwrap();
        let result = EnrichmentResult {
            signals: CompanySignals::default(),
            sources: vec![],
            confidence_score: 20,
            enriched_at: Utc::now(),
        };
        store.update_enrichment(&c.id, &result).await.unwrap();
        let replaced = store
            .replace(&c.id, &record("Acme", Some("acme.com"), "UK"))
            .await
            .unwrap();
        assert_eq!(replaced.enrichment_data.unwrap().confidence_score, 20);
        assert!(replaced.enriched_at.is_some());
    }

    #[tokio::test]
    async fn test_update_enrichment_missing_id() {
        let store = InMemoryStore::new();
        let result = EnrichmentResult {
            signals: CompanySignals::default(),
            sources: vec![],
            confidence_score: 0,
            enriched_at: Utc::now(),
        };
        let err = store.update_enrichment("nope", &result).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_filters_and_paging() {
        let store = InMemoryStore::new();
        store.insert(&record("Alpha", Some("alpha.io"), "United States")).await.unwrap();
        store.insert(&record("Beta", Some("beta.de"), "Germany")).await.unwrap();
        store.insert(&record("Gamma", None, "united states")).await.unwrap();

        let us = CompanyFilters {
            country: Some("UNITED".to_string()),
            ..Default::default()
        };
        assert_eq!(store.count(&us).await.unwrap(), 2);

        let by_domain = CompanyFilters {
            domain: Some(".DE".to_string()),
            ..Default::default()
        };
        let found = store.list(&by_domain).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Beta");

        let paged = CompanyFilters {
            limit: Some(1),
            offset: Some(1),
            ..Default::default()
        };
        assert_eq!(store.list(&paged).await.unwrap().len(), 1);
        assert_eq!(store.count(&paged).await.unwrap(), 3);

        assert_eq!(store.delete_all().await.unwrap(), 3);
        assert!(store.list(&CompanyFilters::default()).await.unwrap().is_empty());
    }
}
