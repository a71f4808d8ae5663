//! PostgreSQL store tests; each test gets its own migrated database.
//!
//! Run with `cargo test --features test-db` and `DATABASE_URL` pointing at a
//! server the tests may create databases on.

#![cfg(feature = "test-db")]

mod common;

use citation_corpus::constants::tables::{
    ACCESSION_MATCH, ASSERTIONS, ASSERTIONS_SUBJECTS, ASSERTION_ID, REPOSITORY_ID, SUBJECT_ID,
};
use citation_corpus::jobs::{backfill_subjects, delete_invalid_accessions, validate_accessions, JobContext};
use citation_corpus::models::{FieldValue, FieldValues, PendingWrite, RecordId};
use citation_corpus::store::{
    ColumnType, OutputColumn, PgRecordStore, Predicate, RecordStore, Selection, UpdateTarget,
};
use common::*;
use sqlx::PgPool;
use std::sync::Arc;

const SUBJECT: &str = "84fe679f-156c-4090-b25e-f752b3f8ea92";

async fn seed(pool: &PgPool, accessions: &[&str]) {
    sqlx::query("INSERT INTO repositories (id, title) VALUES ($1::uuid, 'GEO')")
        .bind(GEO)
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO subjects (id, title) VALUES ($1::uuid, 'biological sciences')")
        .bind(SUBJECT)
        .execute(pool)
        .await
        .unwrap();
    for (n, accession) in accessions.iter().enumerate() {
        sqlx::query(
            "INSERT INTO assertions (id, repository_id, accession_number) VALUES ($1::uuid, $2::uuid, $3)",
        )
        .bind(uuid_for(n))
        .bind(GEO)
        .bind(*accession)
        .execute(pool)
        .await
        .unwrap();
    }
}

async fn count(pool: &PgPool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap()
}

#[sqlx::test(migrations = "./migrations")]
async fn selection_pages_in_id_order(pool: PgPool) {
    seed(&pool, &["GSE1", "GSE2", "GSE3", "GSE4", "GSE5"]).await;
    let store = PgRecordStore::new(pool);
    let selection = Selection::new(ASSERTIONS)
        .group_column(REPOSITORY_ID)
        .input_columns(["accession_number"])
        .filter(Predicate::equals(REPOSITORY_ID, GEO, ColumnType::Uuid))
        .unset([ACCESSION_MATCH]);

    let first = store.select_page(&selection, None, Some(2)).await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].id.as_str(), uuid_for(0));
    assert_eq!(first[0].group.as_deref(), Some(GEO));
    assert_eq!(first[0].field("accession_number"), Some("GSE1"));

    let rest = store
        .select_page(&selection, Some(&first[1].id), None)
        .await
        .unwrap();
    assert_eq!(rest.len(), 3);
    assert_eq!(rest[0].id.as_str(), uuid_for(2));
}

#[sqlx::test(migrations = "./migrations")]
async fn typed_update_round_trips(pool: PgPool) {
    seed(&pool, &["GSE1", "BAD"]).await;
    let store = PgRecordStore::new(pool.clone());
    let target = UpdateTarget::new(
        ASSERTIONS,
        vec![OutputColumn::new(ACCESSION_MATCH, ColumnType::Boolean)],
    );
    let writes: Vec<PendingWrite> = [(0, "true"), (1, "false")]
        .into_iter()
        .map(|(n, flag)| PendingWrite {
            record_id: RecordId::new(uuid_for(n)),
            group: None,
            rows: vec![FieldValues::from([(
                ACCESSION_MATCH.to_string(),
                FieldValue::text(flag),
            )])],
        })
        .collect();

    assert_eq!(store.update_rows(&target, &writes).await.unwrap(), 2);
    let flags: Vec<Option<bool>> = sqlx::query_scalar(
        "SELECT accession_number_pattern_match FROM assertions ORDER BY id",
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(flags, vec![Some(true), Some(false)]);
}

#[sqlx::test(migrations = "./migrations")]
async fn accession_jobs_run_end_to_end(pool: PgPool) {
    seed(&pool, &["GSE12345", "BADID", "GSM999"]).await;
    sqlx::query("INSERT INTO assertions_subjects (assertion_id, subject_id) VALUES ($1::uuid, $2::uuid)")
        .bind(uuid_for(1))
        .bind(SUBJECT)
        .execute(&pool)
        .await
        .unwrap();

    let mut config = geo_config();
    config.groups.get_mut(GEO).unwrap().subjects = vec![SUBJECT.to_string()];
    let ctx = JobContext::new(config, Arc::new(PgRecordStore::new(pool.clone())));

    let reports = validate_accessions(&ctx).await.unwrap();
    assert_eq!(reports[0].records_written, 3);
    let rerun = validate_accessions(&ctx).await.unwrap();
    assert_eq!(rerun[0].total, 0);

    let reports = delete_invalid_accessions(&ctx).await.unwrap();
    assert_eq!(reports[0].records_written, 1);
    assert_eq!(count(&pool, ASSERTIONS).await, 2);
    assert_eq!(count(&pool, ASSERTIONS_SUBJECTS).await, 0);

    let reports = backfill_subjects(&ctx).await.unwrap();
    assert_eq!(reports[0].rows_affected, 2);
    let mapped: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {ASSERTIONS_SUBJECTS} WHERE {SUBJECT_ID} = $1::uuid AND {ASSERTION_ID} IS NOT NULL"
    ))
    .bind(SUBJECT)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(mapped, 2);
}
