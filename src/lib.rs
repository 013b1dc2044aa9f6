//! # Company Intel
//!
//! Ingests CSV files of loosely-structured B2B company records, cleans
//! each row with an AI model, enriches saved companies with sales signals
//! extracted from recent news, and serves the result through a CLI and an
//! HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   ┌──────────┐   ┌─────────┐   ┌────────┐   ┌──────────┐
//! │  CSV    │──▶│ Validate │──▶│  Clean  │──▶│ Upsert │──▶│  Enrich  │
//! │ parser  │   │  rows    │   │  (AI)   │   │ store  │   │ news+AI  │
//! └─────────┘   └──────────┘   └─────────┘   └───┬────┘   └────┬─────┘
//!                                                │             │
//!                                                ▼             ▼
//!                                           ┌──────────────────────┐
//!                                           │   SQLite companies   │
//!                                           └──────────┬───────────┘
//!                                      ┌───────────────┤
//!                                      ▼               ▼
//!                                 ┌─────────┐     ┌─────────┐
//!                                 │   CLI   │     │  HTTP   │
//!                                 │ (intel) │     │  + jobs │
//!                                 └─────────┘     └─────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Core data types |
//! | [`error`] | Fatal pipeline errors |
//! | [`config`] | TOML configuration parsing |
//! | [`csv_parser`] | CSV text → raw records |
//! | [`validate`] | Shape and business-rule validation |
//! | [`ai`] | AI provider abstraction (OpenAI, Ollama) |
//! | [`cleaner`] | AI-driven row normalization |
//! | [`news`] | News search abstraction (NewsAPI) |
//! | [`enrich`] | Signal extraction and confidence scoring |
//! | [`store`] | Company persistence (SQLite, in-memory) |
//! | [`pipeline`] | Upload orchestration |
//! | [`progress`] | Upload progress reporting |
//! | [`jobs`] | Background upload jobs |
//! | [`server`] | HTTP API |
//! | [`commands`] | CLI command implementations |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod ai;
pub mod cleaner;
pub mod commands;
pub mod config;
pub mod csv_parser;
pub mod db;
pub mod enrich;
pub mod error;
pub mod jobs;
pub mod migrate;
pub mod models;
pub mod news;
pub mod pipeline;
pub mod progress;
pub mod server;
pub mod store;
pub mod validate;
