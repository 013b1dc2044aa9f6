//! Storage abstraction for company records.
//!
//! The [`CompanyStore`] trait is everything the pipeline, the HTTP API and
//! the CLI need from persistence. Two backends ship with the crate:
//! [`SqliteStore`](sqlite::SqliteStore) for real use and
//! [`InMemoryStore`](memory::InMemoryStore) for tests.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`find_by_domain`](CompanyStore::find_by_domain) | Case-insensitive exact domain lookup |
//! | [`find_by_name`](CompanyStore::find_by_name) | Case-insensitive exact name lookup |
//! | [`get`](CompanyStore::get) | Fetch by id |
//! | [`insert`](CompanyStore::insert) | Create a new company from a cleaned record |
//! | [`replace`](CompanyStore::replace) | Overwrite the cleaned fields of an existing company |
//! | [`upsert`](CompanyStore::upsert) | Domain-then-name lookup, then replace or insert |
//! | [`update_enrichment`](CompanyStore::update_enrichment) | Attach an enrichment result |
//! | [`delete_all`](CompanyStore::delete_all) | Bulk reset |
//! | [`list`](CompanyStore::list) / [`count`](CompanyStore::count) | Filtered listing |
//!
//! Uniqueness of domain (or name when domain is absent) is enforced only
//! by the lookup inside [`upsert`](CompanyStore::upsert). Two upserts for
//! the same key running at the same time are not serialized; the later
//! write wins, and if both lookups miss, both insert.
//!
//! Case-insensitive matching always goes through
//! [`fold_case`](crate::models::fold_case), so both
//! backends agree on non-ASCII names and countries.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CleanedRecord, Company, CompanyFilters, EnrichmentResult};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Result of [`CompanyStore::upsert`].
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub company: Company,
    /// `true` when an existing company was overwritten in place.
    pub was_updated: bool,
}

#[async_trait]
pub trait CompanyStore: Send + Sync {
    async fn find_by_domain(&self, domain: &str) -> Result<Option<Company>>;

    async fn find_by_name(&self, name: &str) -> Result<Option<Company>>;

    async fn get(&self, id: &str) -> Result<Option<Company>>;

    async fn insert(&self, record: &CleanedRecord) -> Result<Company>;

    /// Overwrite name, domain, country, size and raw row of company `id`,
    /// bumping `updated_at`. Enrichment data is left untouched.
    async fn replace(&self, id: &str, record: &CleanedRecord) -> Result<Company>;

    /// Insert `record`, or overwrite the company it matches.
    ///
    /// A record with a domain is matched by domain first; a record without
    /// one, or whose domain matches nothing, is matched by name.
    async fn upsert(&self, record: &CleanedRecord) -> Result<UpsertOutcome> {
        let mut existing = None;
        if let Some(ref domain) = record.domain {
            existing = self.find_by_domain(domain).await?;
        }
        if existing.is_none() {
            existing = self.find_by_name(&record.name).await?;
        }

        match existing {
            Some(found) => Ok(UpsertOutcome {
                company: self.replace(&found.id, record).await?,
                was_updated: true,
            }),
            None => Ok(UpsertOutcome {
                company: self.insert(record).await?,
                was_updated: false,
            }),
        }
    }

    /// Fails with [`PipelineError::NotFound`](crate::error::PipelineError::NotFound)
    /// if `id` does not exist.
    async fn update_enrichment(&self, id: &str, result: &EnrichmentResult) -> Result<Company>;

    /// Remove every company; returns how many were deleted.
    async fn delete_all(&self) -> Result<u64>;

    /// Matching companies, newest first (ties by name), paged.
    async fn list(&self, filters: &CompanyFilters) -> Result<Vec<Company>>;

    /// Number of matching companies, ignoring paging.
    async fn count(&self, filters: &CompanyFilters) -> Result<i64>;
}
