//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use citation_corpus::config::{CorpusConfig, GroupStrategy};
use citation_corpus::constants::tables::{ACCESSION_NUMBER, ASSERTIONS, REPOSITORY_ID};
use citation_corpus::jobs::JobContext;
use citation_corpus::store::InMemoryRecordStore;
use std::sync::Arc;

/// GEO repository id and its accession pattern
pub const GEO: &str = "b2a4aa2b-db3f-456a-8e2b-7d935343385e";
pub const GEO_PATTERN: &str = r"^G(PL|SM|SE|DS)\d+$";

/// Deterministic UUID whose text order follows `n`
pub fn uuid_for(n: usize) -> String {
    format!("00000000-0000-4000-8000-{n:012}")
}

pub fn geo_config() -> CorpusConfig {
    let mut config = CorpusConfig::default();
    config.groups.insert(
        GEO.to_string(),
        GroupStrategy {
            pattern: Some(GEO_PATTERN.to_string()),
            subjects: Vec::new(),
        },
    );
    config
}

pub fn context(config: CorpusConfig, store: &Arc<InMemoryRecordStore>) -> JobContext {
    JobContext::new(config, store.clone())
}

/// `count` assertions carrying a bare DOI, ids from `uuid_for(0)` upwards
pub fn seed_bare_dois(store: &InMemoryRecordStore, count: usize) {
    for n in 0..count {
        let id = uuid_for(n);
        let doi = format!("10.5061/dryad.{n}");
        store.insert_row(ASSERTIONS, [("id", Some(id.as_str())), ("doi", Some(doi.as_str()))]);
    }
}

pub fn seed_accessions(store: &InMemoryRecordStore, accessions: &[&str]) {
    for (n, accession) in accessions.iter().enumerate() {
        let id = uuid_for(n);
        store.insert_row(
            ASSERTIONS,
            [
                ("id", Some(id.as_str())),
                (REPOSITORY_ID, Some(GEO)),
                (ACCESSION_NUMBER, Some(*accession)),
            ],
        );
    }
}
