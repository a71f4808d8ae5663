//! # PostgreSQL Record Store
//!
//! sqlx implementation of [`RecordStore`]. Statements are assembled with
//! `QueryBuilder`; only validated identifiers are spliced into SQL text and
//! every value travels as a bind parameter.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::{debug, instrument};

use super::{
    DeletePlan, DeleteStrategy, InsertTarget, Predicate, RecordStore, Selection, SqlIdent,
    UpdateTarget,
};
use crate::constants::pipeline::MAX_BIND_PARAMETERS;
use crate::debug_with_pgpool;
use crate::error::Result;
use crate::models::{FieldValue, FieldValues, PendingWrite, Record, RecordId};

const GROUP_ALIAS: &str = "corpus_group";
const KEPT_ROWS_TABLE: &str = "corpus_kept_rows";

pub struct PgRecordStore {
    pool: PgPool,
}

debug_with_pgpool!(PgRecordStore { pool: PgPool });

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn select_query<'a>(
        selection: &Selection,
        after: Option<&RecordId>,
        limit: Option<usize>,
    ) -> QueryBuilder<'a, Postgres> {
        let table = &selection.table;
        let id = &selection.id_column;

        let mut qb = QueryBuilder::new(format!("SELECT {id}::text AS id"));
        if let Some(group) = &selection.group_column {
            qb.push(format!(", {group}::text AS {GROUP_ALIAS}"));
        }
        for column in &selection.input_columns {
            qb.push(format!(", {column}::text AS {column}"));
        }
        qb.push(format!(" FROM {table} WHERE TRUE"));

        for predicate in &selection.predicates {
            match predicate {
                Predicate::Equals {
                    column,
                    value,
                    cast,
                } => {
                    qb.push(format!(" AND {column} = "));
                    qb.push_bind(value.clone());
                    qb.push(format!("::{cast}"));
                }
                Predicate::IsNull { column } => {
                    qb.push(format!(" AND {column} IS NULL"));
                }
                Predicate::IsNotNull { column } => {
                    qb.push(format!(" AND {column} IS NOT NULL"));
                }
                Predicate::NoChildRows {
                    table: child,
                    foreign_key,
                } => {
                    qb.push(format!(
                        " AND NOT EXISTS (SELECT 1 FROM {child} WHERE {child}.{foreign_key} = {table}.{id})"
                    ));
                }
            }
        }

        if let Some(after) = after {
            qb.push(format!(" AND {id} > "));
            qb.push_bind(after.as_str().to_string());
            qb.push(format!("::{}", selection.id_type));
        }

        qb.push(format!(" ORDER BY {id}"));
        if let Some(limit) = limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit as i64);
        }
        qb
    }

    fn id_array(ids: &[RecordId]) -> Vec<String> {
        ids.iter().map(|id| id.as_str().to_string()).collect()
    }

    async fn delete_children(
        tx: &mut Transaction<'_, Postgres>,
        plan: &DeletePlan,
        ids: &[String],
    ) -> Result<()> {
        for child in &plan.children {
            let sql = format!(
                "DELETE FROM {} WHERE {} = ANY($1::{}[])",
                child.table, child.foreign_key, plan.id_type
            );
            let removed = sqlx::query(&sql)
                .bind(ids)
                .execute(&mut **tx)
                .await?
                .rows_affected();
            debug!(table = %child.table, removed, "Deleted dependent rows");
        }
        Ok(())
    }

    async fn rebuild_parent(
        tx: &mut Transaction<'_, Postgres>,
        plan: &DeletePlan,
        ids: &[String],
    ) -> Result<u64> {
        let parent = &plan.parent;
        let id = &plan.id_column;
        let id_type = plan.id_type;

        let doomed: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {parent} WHERE {id} = ANY($1::{id_type}[])"
        ))
        .bind(ids)
        .fetch_one(&mut **tx)
        .await?;

        sqlx::query(&format!(
            "CREATE TEMP TABLE {KEPT_ROWS_TABLE} (LIKE {parent} INCLUDING DEFAULTS) ON COMMIT DROP"
        ))
        .execute(&mut **tx)
        .await?;
        sqlx::query(&format!(
            "INSERT INTO {KEPT_ROWS_TABLE} SELECT * FROM {parent} WHERE NOT ({id} = ANY($1::{id_type}[]))"
        ))
        .bind(ids)
        .execute(&mut **tx)
        .await?;
        sqlx::query(&format!("TRUNCATE {parent}"))
            .execute(&mut **tx)
            .await?;
        sqlx::query(&format!("INSERT INTO {parent} SELECT * FROM {KEPT_ROWS_TABLE}"))
            .execute(&mut **tx)
            .await?;

        Ok(doomed as u64)
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    #[instrument(skip(self, selection), fields(table = %selection.table))]
    async fn select_page(
        &self,
        selection: &Selection,
        after: Option<&RecordId>,
        limit: Option<usize>,
    ) -> Result<Vec<Record>> {
        selection.validate()?;

        let rows = Self::select_query(selection, after, limit)
            .build()
            .fetch_all(&self.pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let mut record = Record::new(row.try_get::<String, _>("id")?);
            if selection.group_column.is_some() {
                record.group = row.try_get::<Option<String>, _>(GROUP_ALIAS)?;
            }
            for column in &selection.input_columns {
                let value = row.try_get::<Option<String>, _>(column.as_str())?;
                record.fields.insert(column.clone(), value);
            }
            records.push(record);
        }

        debug!(count = records.len(), "Selected records");
        Ok(records)
    }

    #[instrument(skip(self, target, rows), fields(table = %target.table, rows = rows.len()))]
    async fn update_rows(&self, target: &UpdateTarget, rows: &[PendingWrite]) -> Result<u64> {
        target.validate()?;
        if rows.is_empty() || target.columns.is_empty() {
            return Ok(0);
        }

        let table = &target.table;
        let id = &target.id_column;
        let assignments = target
            .columns
            .iter()
            .map(|c| format!("{0} = data.{0}::{1}", c.name, c.column_type))
            .collect::<Vec<_>>()
            .join(", ");
        let data_columns = target
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let rows_per_statement = (MAX_BIND_PARAMETERS / (target.columns.len() + 1)).max(1);

        let mut tx = self.pool.begin().await?;
        let mut updated = 0;
        for chunk in rows.chunks(rows_per_statement) {
            let mut qb: QueryBuilder<'_, Postgres> =
                QueryBuilder::new(format!("UPDATE {table} SET {assignments} FROM ("));
            qb.push_values(chunk, |mut b, write| {
                b.push_bind(write.record_id.as_str().to_string());
                for column in &target.columns {
                    b.push_bind(
                        write
                            .values()
                            .and_then(|values| values.get(&column.name))
                            .and_then(FieldValue::as_text),
                    );
                }
            });
            qb.push(format!(
                ") AS data(id, {data_columns}) WHERE {table}.{id} = data.id::{}",
                target.id_type
            ));

            updated += qb.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;

        Ok(updated)
    }

    #[instrument(skip(self, target, rows), fields(table = %target.table, rows = rows.len()))]
    async fn insert_rows(&self, target: &InsertTarget, rows: &[PendingWrite]) -> Result<u64> {
        target.validate()?;
        let flattened: Vec<(&RecordId, &FieldValues)> = rows
            .iter()
            .flat_map(|write| write.rows.iter().map(move |row| (&write.record_id, row)))
            .collect();
        if flattened.is_empty() {
            return Ok(0);
        }

        let column_list = std::iter::once(target.foreign_key.as_str())
            .chain(target.columns.iter().map(|c| c.name.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        let rows_per_statement = (MAX_BIND_PARAMETERS / (target.columns.len() + 1)).max(1);

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for chunk in flattened.chunks(rows_per_statement) {
            let mut qb: QueryBuilder<'_, Postgres> =
                QueryBuilder::new(format!("INSERT INTO {} ({column_list}) ", target.table));
            qb.push_values(chunk, |mut b, (record_id, values)| {
                b.push_bind(record_id.as_str().to_string())
                    .push_unseparated(format!("::{}", target.foreign_key_type));
                for column in &target.columns {
                    b.push_bind(values.get(&column.name).and_then(FieldValue::as_text))
                        .push_unseparated(format!("::{}", column.column_type));
                }
            });
            if target.skip_conflicts {
                qb.push(" ON CONFLICT DO NOTHING");
            }

            inserted += qb.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;

        Ok(inserted)
    }

    #[instrument(skip(self, plan, ids), fields(table = %plan.parent, ids = ids.len(), strategy = ?plan.strategy))]
    async fn delete_records(&self, plan: &DeletePlan, ids: &[RecordId]) -> Result<u64> {
        plan.validate()?;
        if ids.is_empty() {
            return Ok(0);
        }
        let ids = Self::id_array(ids);

        let mut tx = self.pool.begin().await?;
        Self::delete_children(&mut tx, plan, &ids).await?;

        let deleted = match plan.strategy {
            DeleteStrategy::DependencyOrdered => {
                let sql = format!(
                    "DELETE FROM {} WHERE {} = ANY($1::{}[])",
                    plan.parent, plan.id_column, plan.id_type
                );
                sqlx::query(&sql)
                    .bind(&ids)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected()
            }
            DeleteStrategy::RebuildTable => Self::rebuild_parent(&mut tx, plan, &ids).await?,
        };
        tx.commit().await?;

        Ok(deleted)
    }

    #[instrument(skip(self, values))]
    async fn clear_values(&self, table: &str, column: &str, values: &[String]) -> Result<u64> {
        let table = SqlIdent::new(table)?;
        let column = SqlIdent::new(column)?;
        if values.is_empty() {
            return Ok(0);
        }

        let sql = format!("UPDATE {table} SET {column} = NULL WHERE TRIM({column}) = ANY($1)");
        let cleared = sqlx::query(&sql)
            .bind(values)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(cleared)
    }
}
