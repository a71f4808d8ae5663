//! Configuration Loader
//!
//! Layers TOML files and environment variables over the built-in defaults
//! with the `config` crate, then applies the legacy connection variables the
//! maintenance scripts have always read.

use config::{Config, Environment, File};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};

use super::CorpusConfig;
use crate::error::Result;

pub const DEFAULT_CONFIG_FILE: &str = "config/corpus.toml";
pub const DEFAULT_STRATEGIES_FILE: &str = "config/strategies.toml";
pub const ENV_PREFIX: &str = "CORPUS";

const SENSITIVE_PATTERNS: [&str; 5] = ["password", "secret", "token", "credential", "url"];

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Files in precedence order, with whether each must exist
    files: Vec<(PathBuf, bool)>,
    read_environment: bool,
    read_dotenv: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Defaults, the optional standard files, `.env` and the environment
    pub fn new() -> Self {
        Self {
            files: vec![
                (PathBuf::from(DEFAULT_CONFIG_FILE), false),
                (PathBuf::from(DEFAULT_STRATEGIES_FILE), false),
            ],
            read_environment: true,
            read_dotenv: true,
        }
    }

    /// Nothing but the built-in defaults
    pub fn empty() -> Self {
        Self {
            files: Vec::new(),
            read_environment: false,
            read_dotenv: false,
        }
    }

    /// Replace the main config file; an explicitly named file must exist
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match self
            .files
            .iter_mut()
            .find(|(existing, _)| existing == &PathBuf::from(DEFAULT_CONFIG_FILE))
        {
            Some(slot) => *slot = (path, true),
            None => self.files.insert(0, (path, true)),
        }
        self
    }

    /// Add a file on top of those already layered
    pub fn with_file(mut self, path: impl Into<PathBuf>, required: bool) -> Self {
        self.files.push((path.into(), required));
        self
    }

    pub fn without_environment(mut self) -> Self {
        self.read_environment = false;
        self.read_dotenv = false;
        self
    }

    pub fn load(&self) -> Result<CorpusConfig> {
        if self.read_dotenv {
            match dotenvy::dotenv() {
                Ok(path) => debug!(path = %path.display(), "Loaded .env"),
                Err(e) if e.not_found() => {}
                Err(e) => debug!(error = %e, "Ignoring unreadable .env"),
            }
        }

        let mut builder = Config::builder();
        for (path, required) in &self.files {
            builder = builder.add_source(File::from(path.as_path()).required(*required));
        }
        if self.read_environment {
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let mut config: CorpusConfig = builder.build()?.try_deserialize()?;
        if self.read_environment {
            apply_legacy_env(&mut config, |key| std::env::var(key).ok());
        }
        config.validate()?;

        debug!(config = %sanitize_for_logging(&config), "Configuration loaded");
        info!(
            database_host = %config.database.host,
            batch_size = config.pipeline.batch_size,
            max_concurrency = config.pipeline.max_concurrency,
            groups = config.groups.len(),
            "Configuration loaded successfully"
        );
        Ok(config)
    }
}

/// Apply the variables the original maintenance scripts read.
///
/// `PG_PASSWORD` is accepted where `DB_PASSWORD` is absent.
pub fn apply_legacy_env<F>(config: &mut CorpusConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|value| !value.is_empty());

    if let Some(url) = get("DATABASE_URL") {
        config.database.url = Some(url);
    }
    if let Some(host) = get("DB_HOST") {
        config.database.host = host;
    }
    if let Some(port) = get("DB_PORT").and_then(|port| port.parse().ok()) {
        config.database.port = port;
    }
    if let Some(name) = get("DB_NAME") {
        config.database.database = name;
    }
    if let Some(user) = get("DB_USER") {
        config.database.username = user;
    }
    if let Some(password) = get("DB_PASSWORD").or_else(|| get("PG_PASSWORD")) {
        config.database.password = password;
    }
    if let Some(base_url) = get("ROR_API_BASE_URL") {
        config.ror.base_url = base_url;
    }
}

/// JSON rendering with sensitive values masked
pub fn sanitize_for_logging<T: Serialize>(config: &T) -> serde_json::Value {
    let mut value = serde_json::to_value(config).unwrap_or(serde_json::Value::Null);
    sanitize_recursive(&mut value);
    value
}

fn sanitize_recursive(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                let key_lower = key.to_lowercase();
                let is_sensitive = SENSITIVE_PATTERNS
                    .iter()
                    .any(|pattern| key_lower.contains(pattern));

                if is_sensitive {
                    if let serde_json::Value::String(s) = val {
                        *val = serde_json::Value::String(mask(s));
                        continue;
                    }
                }
                sanitize_recursive(val);
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(sanitize_recursive),
        _ => {}
    }
}

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        "[EMPTY]".to_string()
    } else {
        "[MASKED]".to_string()
    }
}
