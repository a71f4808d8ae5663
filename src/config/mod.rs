//! # Configuration
//!
//! One explicit [`CorpusConfig`] is handed to every job: connection settings,
//! pipeline sizing, registry client behavior and the per-group strategy
//! tables. Nothing reads ambient connection state after loading.
//!
//! ## Sources
//!
//! [`ConfigLoader`] layers, lowest precedence first:
//!
//! 1. Built-in defaults
//! 2. `config/corpus.toml` (or the file passed with `--config`)
//! 3. `config/strategies.toml` (per-group patterns and subjects)
//! 4. `CORPUS__SECTION__KEY` environment variables
//! 5. The legacy `DB_*`, `DATABASE_URL` and `ROR_API_BASE_URL` variables
//!
//! ```rust,no_run
//! use citation_corpus::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new().load()?;
//! println!("batch size {}", config.pipeline.batch_size);
//! # Ok(())
//! # }
//! ```

pub mod loader;

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions;
use std::collections::HashMap;
use std::time::Duration;

use crate::constants::{pipeline, ror, tables};
use crate::error::{CorpusError, Result};
use crate::pipeline::FailurePolicy;
use crate::resilience::BackoffPolicy;
use crate::store::{ChildRelation, DeleteStrategy};
use crate::transform::StrategyRegistry;

pub use loader::{apply_legacy_env, sanitize_for_logging, ConfigLoader};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    pub database: DatabaseConfig,
    pub pipeline: PipelineConfig,
    pub ror: RorConfig,
    pub accession: AccessionConfig,
    pub deletion: DeletionConfig,
    pub cleanup: CleanupConfig,
    /// Group key (repository id) to its strategies
    pub groups: HashMap<String, GroupStrategy>,
}

impl CorpusConfig {
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.batch_size == 0 {
            return Err(CorpusError::ConfigurationError(
                "pipeline.batch_size must be greater than zero".to_string(),
            ));
        }
        if self.pipeline.max_concurrency == 0 {
            return Err(CorpusError::ConfigurationError(
                "pipeline.max_concurrency must be greater than zero".to_string(),
            ));
        }
        if self.pipeline.page_size == Some(0) {
            return Err(CorpusError::ConfigurationError(
                "pipeline.page_size must be greater than zero when set".to_string(),
            ));
        }
        if self.deletion.batch_size == 0 {
            return Err(CorpusError::ConfigurationError(
                "deletion.batch_size must be greater than zero".to_string(),
            ));
        }
        if self.ror.max_attempts == 0 {
            return Err(CorpusError::ConfigurationError(
                "ror.max_attempts must be at least 1".to_string(),
            ));
        }
        url::Url::parse(&self.ror.base_url).map_err(|e| {
            CorpusError::ConfigurationError(format!("ror.base_url {}: {e}", self.ror.base_url))
        })?;
        self.strategies()?;
        Ok(())
    }

    /// Compile the per-group strategy tables
    pub fn strategies(&self) -> Result<StrategyRegistry> {
        StrategyRegistry::from_groups(&self.groups)
    }

    /// The configuration as JSON with secrets masked
    pub fn sanitized(&self) -> serde_json::Value {
        sanitize_for_logging(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Full connection URL; takes precedence over the individual fields
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: String::new(),
            database: "citation_corpus".to_string(),
            max_connections: 5,
            acquire_timeout_secs: 30,
        }
    }
}

impl DatabaseConfig {
    pub fn connect_options(&self) -> Result<PgConnectOptions> {
        if let Some(url) = self.url.as_deref().filter(|url| !url.trim().is_empty()) {
            return url
                .parse::<PgConnectOptions>()
                .map_err(|e| CorpusError::ConfigurationError(format!("invalid database url: {e}")));
        }

        let mut options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .database(&self.database);
        if !self.password.is_empty() {
            options = options.password(&self.password);
        }
        Ok(options)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Successful results per set-based write
    pub batch_size: usize,
    /// In-flight remote lookups
    pub max_concurrency: usize,
    /// Keyset page size for the source query; one query when unset
    pub page_size: Option<usize>,
    pub failure_policy: FailurePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: pipeline::DEFAULT_BATCH_SIZE,
            max_concurrency: pipeline::DEFAULT_REMOTE_CONCURRENCY,
            page_size: None,
            failure_policy: FailurePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RorConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
    /// Minimum spacing between consecutive request starts
    pub politeness_delay_ms: u64,
    /// Attempts per lookup for timeouts, connection errors and 5xx
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    /// 429 responses honored per lookup; counted apart from `max_attempts`
    pub max_rate_limit_waits: u32,
    /// Used when a 429 carries neither Retry-After nor X-RateLimit-Reset
    pub default_rate_limit_wait_ms: u64,
    pub max_rate_limit_wait_ms: u64,
    pub cache_responses: bool,
}

impl Default for RorConfig {
    fn default() -> Self {
        Self {
            base_url: ror::DEFAULT_BASE_URL.to_string(),
            request_timeout_ms: 30_000,
            politeness_delay_ms: 150,
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
            max_rate_limit_waits: 5,
            default_rate_limit_wait_ms: 10_000,
            max_rate_limit_wait_ms: 300_000,
            cache_responses: true,
        }
    }
}

impl RorConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn politeness_delay(&self) -> Duration {
        Duration::from_millis(self.politeness_delay_ms)
    }

    pub fn default_rate_limit_wait(&self) -> Duration {
        Duration::from_millis(self.default_rate_limit_wait_ms)
    }

    pub fn max_rate_limit_wait(&self) -> Duration {
        Duration::from_millis(self.max_rate_limit_wait_ms)
    }
}

/// Accession-number validation scope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessionConfig {
    /// Only assertions from this source are validated, when set
    pub source_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeletionConfig {
    pub batch_size: usize,
    pub strategy: DeleteStrategy,
    /// Relations referencing assertions, deleted in this order before them
    pub children: Vec<ChildRelation>,
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            strategy: DeleteStrategy::DependencyOrdered,
            children: vec![
                ChildRelation::new(tables::ASSERTIONS_AFFILIATIONS, tables::ASSERTION_ID),
                ChildRelation::new(tables::ASSERTIONS_FUNDERS, tables::ASSERTION_ID),
                ChildRelation::new(tables::ASSERTIONS_SUBJECTS, tables::ASSERTION_ID),
            ],
        }
    }
}

/// Junk `external_id` values cleared before reconciliation, per table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub invalid_external_ids: HashMap<String, Vec<String>>,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        let affiliations = ["N/A", "null"];
        let funders = [
            "DOE BER/TES/ARM",
            "LANL - LDRD",
            "2016YFC0203302, 2016YFC0200404, 2016YFC0203300",
            "https://data.bris.ac.uk/datasets",
            "Grant agreement No 654109",
            "224308 (ARF)",
            "WFLUS008/12 (ARF) and WFLUS006/14 (ARF)",
            "W81XWH-10-1-0910 (MSB) and W81XWH-13-1-0297 (MSB)",
            "CO19772 (MSB and JCB)",
            "(BioSC)",
        ];
        Self {
            invalid_external_ids: HashMap::from([
                (
                    tables::AFFILIATIONS.to_string(),
                    affiliations.iter().map(|v| v.to_string()).collect(),
                ),
                (
                    tables::FUNDERS.to_string(),
                    funders.iter().map(|v| v.to_string()).collect(),
                ),
            ]),
        }
    }
}

impl CleanupConfig {
    pub fn invalid_values(&self, table: &str) -> &[String] {
        self.invalid_external_ids
            .get(table)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupStrategy {
    /// Identifier format, matched from the start of the value
    #[serde(default)]
    pub pattern: Option<String>,
    /// Subject ids mapped onto every record of the group
    #[serde(default)]
    pub subjects: Vec<String>,
}
