//! End-to-end job runs against the in-memory store.
//!
//! These cover the guarantees every job relies on: each record is written at
//! most once, a failed batch leaves no trace, and a re-run only touches what
//! is still pending.

mod common;

use citation_corpus::config::ConfigLoader;
use citation_corpus::constants::tables::{ACCESSION_MATCH, ASSERTIONS};
use citation_corpus::jobs::{export_accessions, normalize_dois, validate_accessions};
use citation_corpus::pipeline::{FailurePolicy, ShutdownHandle};
use citation_corpus::report;
use citation_corpus::resilience::BackoffPolicy;
use citation_corpus::store::InMemoryRecordStore;
use common::*;
use std::sync::Arc;

fn doi_of(store: &InMemoryRecordStore, n: usize) -> Option<String> {
    store.value(ASSERTIONS, &uuid_for(n), "doi")
}

#[tokio::test]
async fn large_working_set_is_written_in_fixed_batches() {
    let store = Arc::new(InMemoryRecordStore::new());
    seed_bare_dois(&store, 2500);
    let mut config = geo_config();
    config.pipeline.batch_size = 1000;

    let report = normalize_dois(&context(config, &store)).await.unwrap();

    assert_eq!(report.total, 2500);
    assert_eq!(report.batches_committed, 3);
    assert_eq!(report.records_written, 2500);
    assert_eq!(report.rows_affected, 2500);
    assert!(report.is_clean());
    assert_eq!(store.write_statements(), 3);
    assert_eq!(doi_of(&store, 2499).as_deref(), Some("https://doi.org/10.5061/dryad.2499"));
}

#[tokio::test]
async fn rerun_writes_nothing() {
    let store = Arc::new(InMemoryRecordStore::new());
    seed_bare_dois(&store, 50);
    let ctx = context(geo_config(), &store);

    normalize_dois(&ctx).await.unwrap();
    let statements = store.write_statements();
    let rerun = normalize_dois(&ctx).await.unwrap();

    assert_eq!(rerun.unchanged, 50);
    assert_eq!(rerun.records_written, 0);
    assert_eq!(rerun.batches_committed, 0);
    assert_eq!(store.write_statements(), statements);
}

#[tokio::test]
async fn failed_batch_is_rolled_back_and_recovered_by_rerun() {
    let store = Arc::new(InMemoryRecordStore::new());
    seed_bare_dois(&store, 2500);
    store.fail_writes_touching(&uuid_for(1500));
    let mut config = geo_config();
    config.pipeline.batch_size = 1000;
    let ctx = context(config, &store);

    let report = normalize_dois(&ctx).await.unwrap();

    assert_eq!(report.batches_committed, 2);
    assert_eq!(report.batches_rolled_back(), 1);
    assert_eq!(report.records_written, 1500);
    let rolled_back = &report.rolled_back[0];
    assert_eq!(rolled_back.record_ids.len(), 1000);
    assert_eq!(rolled_back.record_ids[0].as_str(), uuid_for(1000));
    // Rows staged before the failing one are discarded with it
    assert_eq!(doi_of(&store, 1000).as_deref(), Some("10.5061/dryad.1000"));
    assert_eq!(doi_of(&store, 1999).as_deref(), Some("10.5061/dryad.1999"));
    assert_eq!(doi_of(&store, 999).as_deref(), Some("https://doi.org/10.5061/dryad.999"));
    assert_eq!(doi_of(&store, 2000).as_deref(), Some("https://doi.org/10.5061/dryad.2000"));

    store.clear_failures();
    let rerun = normalize_dois(&ctx).await.unwrap();
    assert_eq!(rerun.records_written, 1000);
    assert_eq!(rerun.unchanged, 1500);
    assert!(rerun.is_clean());
}

#[tokio::test]
async fn retry_policy_absorbs_transient_write_failures() {
    let store = Arc::new(InMemoryRecordStore::new());
    seed_bare_dois(&store, 30);
    store.fail_next_writes(2);
    let mut config = geo_config();
    config.pipeline.batch_size = 10;
    config.pipeline.failure_policy = FailurePolicy::Retry {
        max_retries: 2,
        backoff: BackoffPolicy::immediate(),
    };

    let report = normalize_dois(&context(config, &store)).await.unwrap();

    assert_eq!(report.batches_committed, 3);
    assert!(report.rolled_back.is_empty());
    assert_eq!(report.records_written, 30);
    assert_eq!(store.write_statements(), 5);
}

#[tokio::test]
async fn stop_requested_before_start_touches_nothing() {
    let store = Arc::new(InMemoryRecordStore::new());
    seed_bare_dois(&store, 20);
    let shutdown = ShutdownHandle::new();
    shutdown.request_stop();
    let ctx = context(geo_config(), &store).with_shutdown(shutdown);

    let report = normalize_dois(&ctx).await.unwrap();

    assert_eq!(report.not_dispatched, 20);
    assert_eq!(report.records_written, 0);
    assert_eq!(store.write_statements(), 0);
    assert_eq!(doi_of(&store, 0).as_deref(), Some("10.5061/dryad.0"));
}

#[tokio::test]
async fn accession_validation_export_and_summary() {
    let store = Arc::new(InMemoryRecordStore::new());
    seed_accessions(&store, &["GSE12345", "BADID", "GSM999"]);
    let ctx = context(geo_config(), &store);

    let reports = validate_accessions(&ctx).await.unwrap();
    assert_eq!(reports[0].records_written, 3);
    assert_eq!(store.value(ASSERTIONS, &uuid_for(1), ACCESSION_MATCH).as_deref(), Some("false"));

    let dir = tempfile::tempdir().unwrap();
    export_accessions(&ctx, dir.path()).await.unwrap();
    let summaries = report::summarize_dir(dir.path()).unwrap();

    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].group, GEO);
    assert_eq!(summaries[0].total_accession_numbers, 3);
    assert_eq!(summaries[0].false_match, 1);
    assert_eq!(summaries[0].percent_false_match, "33%");
}

#[tokio::test]
async fn failures_are_exported_for_review() {
    let store = Arc::new(InMemoryRecordStore::new());
    seed_bare_dois(&store, 10);
    store.fail_writes_touching(&uuid_for(3));
    let mut config = geo_config();
    config.pipeline.batch_size = 5;

    let report = normalize_dois(&context(config, &store)).await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    report::export_failures(dir.path(), &report).unwrap();

    let rolled_back =
        std::fs::read_to_string(dir.path().join("normalize-dois-rolled-back.csv")).unwrap();
    assert_eq!(rolled_back.lines().count(), 6);
    assert!(rolled_back.lines().nth(1).unwrap().starts_with(&format!("1,{}", uuid_for(0))));
    assert!(!dir.path().join("normalize-dois-failures.csv").exists());
}

#[test]
fn shipped_strategies_compile() {
    let config = ConfigLoader::empty()
        .with_file("config/strategies.toml", true)
        .load()
        .unwrap();

    let strategies = config.strategies().unwrap();
    assert_eq!(config.groups.len(), 38);
    assert!(!strategies.pattern_groups().is_empty());
    assert!(!strategies.subject_groups().is_empty());
}

#[test]
fn shipped_base_config_is_valid() {
    let config = ConfigLoader::empty()
        .with_file("config/corpus.toml", true)
        .load()
        .unwrap();

    assert_eq!(config.pipeline.batch_size, 5000);
    assert_eq!(config.deletion.batch_size, 1000);
    assert_eq!(
        config.accession.source_id.as_deref(),
        Some("c66aafc0-cfd6-4bce-9235-661a4a7c6126")
    );
}
