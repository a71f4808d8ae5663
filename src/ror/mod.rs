//! # Organization Registry Client
//!
//! Lookups against the ROR organization registry. [`OrganizationRegistry`]
//! is the seam the reconciliation transformers depend on; [`RorClient`] is the
//! HTTP implementation with request pacing, a bounded retry loop, rate-limit
//! handling and a per-run response cache.

pub mod client;
pub mod error;
pub mod pacer;
pub mod types;

use async_trait::async_trait;
use std::fmt;

pub use client::{LookupStats, RorClient};
pub use error::LookupError;
pub use pacer::RequestPacer;
pub use types::{AffiliationCandidate, OrganizationMatch};

pub type LookupResult<T> = std::result::Result<T, LookupError>;

#[async_trait]
pub trait OrganizationRegistry: Send + Sync + fmt::Debug {
    /// Exact lookup of a ROR id, bare or as a `https://ror.org/` URL
    async fn lookup_by_id(&self, ror_id: &str) -> LookupResult<Option<OrganizationMatch>>;

    /// Identifier query (GRID, ISNI, Crossref funder DOI); first item wins
    async fn query_identifier(&self, identifier: &str) -> LookupResult<Option<OrganizationMatch>>;

    /// Ranked affiliation-matching candidates for a free-text name
    async fn match_affiliation(&self, name: &str) -> LookupResult<Vec<AffiliationCandidate>>;
}
