#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Citation Corpus Maintenance
//!
//! Batched maintenance pipelines for the Data Citation Corpus database.
//!
//! ## Overview
//!
//! Every maintenance job follows the same shape: select a working set of
//! records, transform each one (locally, or through a remote registry with
//! bounded concurrency), and write the successful results in fixed-size
//! batches, each inside its own transaction. A run ends with a [`RunReport`]
//! that accounts for every record of the working set.
//!
//! ## Jobs
//!
//! - Accession-number validation and review export, per repository
//! - Deletion of assertions with malformed accession numbers or listed in files
//! - DOI normalization across the identifier-bearing columns
//! - ROR reconciliation for affiliations and funders, plus a candidate report
//! - Subject mapping backfill
//!
//! ## Module Organization
//!
//! - [`pipeline`] - Batching, concurrency, failure isolation and run reports
//! - [`store`] - Record store seam with PostgreSQL and in-memory backends
//! - [`source`] - Working-set sources (store selections, CSV id lists)
//! - [`transform`] - Per-record transformers
//! - [`sink`] - Batch destinations (store writes, CSV files)
//! - [`ror`] - ROR registry client with pacing, retries and caching
//! - [`jobs`] - The maintenance jobs wired from the pieces above
//! - [`config`] - Layered configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use citation_corpus::config::ConfigLoader;
//! use citation_corpus::database::DatabaseConnection;
//! use citation_corpus::jobs::{normalize_dois, JobContext};
//! use citation_corpus::store::PgRecordStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> citation_corpus::Result<()> {
//! let config = ConfigLoader::new().load()?;
//! let connection = DatabaseConnection::connect(&config.database).await?;
//! let store = Arc::new(PgRecordStore::new(connection.pool().clone()));
//!
//! let report = normalize_dois(&JobContext::new(config, store)).await?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test                        # Unit and in-memory integration tests
//! cargo test --features test-db     # PostgreSQL tests (requires DATABASE_URL)
//! ```

pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod macros;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod resilience;
pub mod ror;
pub mod sink;
pub mod source;
pub mod store;
pub mod transform;

pub use config::{ConfigLoader, CorpusConfig};
pub use error::{CorpusError, Result};
pub use models::{Record, RecordId, TransformResult};
pub use pipeline::{FailurePolicy, Pipeline, PipelineSettings, RunReport, ShutdownHandle};
pub use store::{InMemoryRecordStore, PgRecordStore, RecordStore};
