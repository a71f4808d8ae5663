use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::header::HeaderMap;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::types::ItemsResponse;
use super::{
    AffiliationCandidate, LookupError, LookupResult, OrganizationMatch, OrganizationRegistry,
    RequestPacer,
};
use crate::config::RorConfig;
use crate::constants::{prefixes, ror::USER_AGENT};
use crate::error::{CorpusError, Result};
use crate::resilience::BackoffPolicy;

const RETRY_AFTER: &str = "retry-after";
const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";
/// Reset values below this are read as a delay in seconds rather than a Unix time
const EPOCH_THRESHOLD_SECS: f64 = 1_000_000_000.0;

/// Request counters for one client, exposed for run reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LookupStats {
    pub requests_sent: u64,
    pub rate_limit_waits: u64,
    pub transient_retries: u64,
    pub cache_hits: u64,
}

#[derive(Debug, Default)]
struct Counters {
    requests_sent: AtomicU64,
    rate_limit_waits: AtomicU64,
    transient_retries: AtomicU64,
    cache_hits: AtomicU64,
}

/// HTTP client for the ROR organizations API
#[derive(Debug)]
pub struct RorClient {
    http: reqwest::Client,
    base_url: Url,
    pacer: RequestPacer,
    max_attempts: u32,
    backoff: BackoffPolicy,
    max_rate_limit_waits: u32,
    default_rate_limit_wait: Duration,
    max_rate_limit_wait: Duration,
    cache: Option<DashMap<String, Option<Value>>>,
    counters: Counters,
}

impl RorClient {
    pub fn new(config: &RorConfig) -> Result<Self> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/')).map_err(|e| {
            CorpusError::ConfigurationError(format!("invalid ROR base URL {}: {e}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(CorpusError::ConfigurationError(format!(
                "ROR base URL {} cannot carry a path",
                config.base_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CorpusError::SetupError(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            pacer: RequestPacer::new(config.politeness_delay()),
            max_attempts: config.max_attempts.max(1),
            backoff: config.backoff.clone(),
            max_rate_limit_waits: config.max_rate_limit_waits,
            default_rate_limit_wait: config.default_rate_limit_wait(),
            max_rate_limit_wait: config.max_rate_limit_wait(),
            cache: config.cache_responses.then(DashMap::new),
            counters: Counters::default(),
        })
    }

    pub fn stats(&self) -> LookupStats {
        LookupStats {
            requests_sent: self.counters.requests_sent.load(Ordering::Relaxed),
            rate_limit_waits: self.counters.rate_limit_waits.load(Ordering::Relaxed),
            transient_retries: self.counters.transient_retries.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
        }
    }

    fn exact_url(&self, ror_id: &str) -> LookupResult<Url> {
        let bare = last_segment(ror_id);
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| LookupError::Transport("base URL cannot carry a path".to_string()))?;
            segments.pop_if_empty().push(bare);
        }
        Ok(url)
    }

    fn query_url(&self, parameter: &str, value: &str) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut().append_pair(parameter, value);
        url
    }

    /// Wait signalled by a 429 response, capped at the configured maximum
    fn rate_limit_wait(&self, headers: &HeaderMap) -> Duration {
        let header = |name: &'static str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
        };

        let retry_after = header(RETRY_AFTER)
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_secs);

        let reset = || {
            let reset = header(RATE_LIMIT_RESET)?.parse::<f64>().ok()?;
            if !reset.is_finite() {
                return None;
            }
            let seconds = if reset > EPOCH_THRESHOLD_SECS {
                reset - chrono::Utc::now().timestamp_millis() as f64 / 1000.0
            } else {
                reset
            };
            let capped = seconds.clamp(0.0, self.max_rate_limit_wait.as_secs_f64());
            Some(Duration::from_secs_f64(capped))
        };

        retry_after
            .or_else(reset)
            .unwrap_or(self.default_rate_limit_wait)
            .min(self.max_rate_limit_wait)
    }

    async fn fetch<T: DeserializeOwned>(&self, url: Url) -> LookupResult<Option<T>> {
        let key = url.as_str().to_string();
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(&key) {
                self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                return decode(cached.value().clone());
            }
        }

        let body = self.fetch_uncached(url).await?;
        if let Some(cache) = &self.cache {
            cache.insert(key, body.clone());
        }
        decode(body)
    }

    /// One logical request: paced, retried on transient failures, and
    /// re-issued after every rate-limit wait until either budget runs out.
    #[instrument(skip_all, fields(url = %url))]
    async fn fetch_uncached(&self, url: Url) -> LookupResult<Option<Value>> {
        let mut failures: u32 = 0;
        let mut rate_limit_waits: u32 = 0;

        loop {
            self.pacer.wait().await;
            self.counters.requests_sent.fetch_add(1, Ordering::Relaxed);

            let transient_error = match self.http.get(url.clone()).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        if rate_limit_waits >= self.max_rate_limit_waits {
                            return Err(LookupError::RateLimitExhausted {
                                waits: rate_limit_waits,
                            });
                        }
                        let wait = self.rate_limit_wait(response.headers());
                        rate_limit_waits += 1;
                        self.counters.rate_limit_waits.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            wait_ms = wait.as_millis() as u64,
                            waits = rate_limit_waits,
                            "Rate limited by registry, waiting before retry"
                        );
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                    if status == StatusCode::NOT_FOUND {
                        debug!("No registry entry");
                        return Ok(None);
                    }
                    if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
                        format!("status {}", status.as_u16())
                    } else if !status.is_success() {
                        return Err(LookupError::Status(status.as_u16()));
                    } else {
                        let body = response
                            .json::<Value>()
                            .await
                            .map_err(|e| LookupError::Decode(e.to_string()))?;
                        return Ok(Some(body));
                    }
                }
                Err(e) => e.to_string(),
            };

            failures += 1;
            if failures >= self.max_attempts {
                return Err(LookupError::AttemptsExhausted {
                    attempts: failures,
                    last_error: transient_error,
                });
            }
            let delay = self.backoff.delay_for(failures);
            self.counters.transient_retries.fetch_add(1, Ordering::Relaxed);
            warn!(
                attempt = failures,
                delay_ms = delay.as_millis() as u64,
                error = %transient_error,
                "Transient registry failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn decode<T: DeserializeOwned>(body: Option<Value>) -> LookupResult<Option<T>> {
    body.map(|value| serde_json::from_value(value).map_err(|e| LookupError::Decode(e.to_string())))
        .transpose()
}

fn last_segment(identifier: &str) -> &str {
    let trimmed = identifier.trim().trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Identifier URLs are queried by their final path segment
fn query_term(identifier: &str) -> &str {
    let is_url_form = [prefixes::GRID, prefixes::ISNI, prefixes::DOI_RESOLVER]
        .iter()
        .any(|prefix| identifier.starts_with(prefix.trim_end_matches('/')));
    if is_url_form {
        last_segment(identifier)
    } else {
        identifier
    }
}

#[async_trait]
impl OrganizationRegistry for RorClient {
    async fn lookup_by_id(&self, ror_id: &str) -> LookupResult<Option<OrganizationMatch>> {
        let url = self.exact_url(ror_id)?;
        self.fetch(url).await
    }

    async fn query_identifier(&self, identifier: &str) -> LookupResult<Option<OrganizationMatch>> {
        let url = self.query_url("query", query_term(identifier));
        let response: Option<ItemsResponse<OrganizationMatch>> = self.fetch(url).await?;
        Ok(response.and_then(|r| r.items.into_iter().next()))
    }

    async fn match_affiliation(&self, name: &str) -> LookupResult<Vec<AffiliationCandidate>> {
        let url = self.query_url("affiliation", name);
        let response: Option<ItemsResponse<AffiliationCandidate>> = self.fetch(url).await?;
        Ok(response.map(|r| r.items).unwrap_or_default())
    }
}
