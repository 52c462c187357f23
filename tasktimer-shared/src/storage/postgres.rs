/// PostgreSQL storage adapter
///
/// Filters and sorts are pushed down as SQL. Field names are checked against the
/// collection's column whitelist before they reach a statement, and every bound value
/// is cast to the column's type (`$n::bigint`, `$n::timestamptz`, ...).
///
/// Rows are read as `to_jsonb(row)` and written through `jsonb_populate_record`, so
/// the JSON shape of a record is exactly the column layout of its table.
///
/// # Example
///
/// ```no_run
/// use tasktimer_shared::db::pool::{create_pool, DatabaseConfig};
/// use tasktimer_shared::storage::postgres::PostgresStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::from_url(std::env::var("DATABASE_URL")?)).await?;
/// let store = PostgresStore::new(pool);
/// # Ok(())
/// # }
/// ```

use super::{Collection, Filter, Record, Sort, SortDirection, StorageAdapter, StorageError, StorageResult};
use crate::db::pool;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres};
use tracing::debug;

const BACKEND: &str = "postgres";

/// Value bound to a statement placeholder
#[derive(Debug, Clone, PartialEq)]
enum SqlParam {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

macro_rules! bind_params {
    ($query:expr, $params:expr) => {{
        let mut query = $query;
        for param in $params {
            query = match param {
                SqlParam::Text(v) => query.bind(v),
                SqlParam::Int(v) => query.bind(v),
                SqlParam::Float(v) => query.bind(v),
                SqlParam::Bool(v) => query.bind(v),
            };
        }
        query
    }};
}

/// WHERE clause with its bound parameters
#[derive(Debug, Default)]
struct WhereClause {
    sql: String,
    params: Vec<SqlParam>,
}

fn checked_column(
    collection: Collection,
    field: &str,
    operation: &'static str,
) -> StorageResult<&'static str> {
    collection.column_type(field).ok_or_else(|| {
        StorageError::failure(
            BACKEND,
            collection,
            operation,
            format!("unknown field {:?}", field),
        )
    })
}

fn to_param(
    collection: Collection,
    operation: &'static str,
    value: &Value,
) -> StorageResult<SqlParam> {
    match value {
        Value::String(s) => Ok(SqlParam::Text(s.clone())),
        Value::Bool(b) => Ok(SqlParam::Bool(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(SqlParam::Int(i)),
            None => Ok(SqlParam::Float(n.as_f64().unwrap_or_default())),
        },
        other => Err(StorageError::failure(
            BACKEND,
            collection,
            operation,
            format!("unsupported filter value {}", other),
        )),
    }
}

/// Builds `WHERE ...` for equality filters, numbering placeholders from `first`
fn build_where(
    collection: Collection,
    operation: &'static str,
    filters: &[Filter],
    first: usize,
) -> StorageResult<WhereClause> {
    let mut conditions = Vec::with_capacity(filters.len());
    let mut params = Vec::new();

    for filter in filters {
        let ty = checked_column(collection, &filter.field, operation)?;

        if filter.value.is_null() {
            conditions.push(format!("t.\"{}\" IS NULL", filter.field));
            continue;
        }

        params.push(to_param(collection, operation, &filter.value)?);
        conditions.push(format!(
            "t.\"{}\" = ${}::{}",
            filter.field,
            first + params.len() - 1,
            ty
        ));
    }

    let sql = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    Ok(WhereClause { sql, params })
}

fn build_order_by(collection: Collection, sorts: &[Sort]) -> StorageResult<String> {
    if sorts.is_empty() {
        return Ok(String::new());
    }

    let keys = sorts
        .iter()
        .map(|sort| {
            checked_column(collection, &sort.field, "query")?;
            let direction = match sort.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            Ok(format!("t.\"{}\" {} NULLS LAST", sort.field, direction))
        })
        .collect::<StorageResult<Vec<_>>>()?;

    Ok(format!(" ORDER BY {}", keys.join(", ")))
}

fn column_list(
    collection: Collection,
    operation: &'static str,
    record: &Record,
) -> StorageResult<Vec<String>> {
    record
        .keys()
        .filter(|field| !(operation == "update" && field.as_str() == "id"))
        .map(|field| checked_column(collection, field, operation).map(|_| field.clone()))
        .collect()
}

/// PostgreSQL-backed storage adapter
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates an adapter over an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Underlying connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl StorageAdapter for PostgresStore {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    async fn query(
        &self,
        collection: Collection,
        filters: &[Filter],
        sorts: &[Sort],
    ) -> StorageResult<Vec<Record>> {
        let clause = build_where(collection, "query", filters, 1)?;
        let order_by = build_order_by(collection, sorts)?;

        let sql = format!(
            "SELECT to_jsonb(t) FROM {} AS t{}{}",
            collection.table_name(),
            clause.sql,
            order_by
        );
        debug!(%collection, sql = %sql, "Running query");

        let rows: Vec<Json<Record>> = bind_params!(
            sqlx::query_scalar::<Postgres, Json<Record>>(&sql),
            clause.params
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::failure(BACKEND, collection, "query", e))?;

        Ok(rows.into_iter().map(|Json(record)| record).collect())
    }

    async fn get_one(&self, collection: Collection, id: &str) -> StorageResult<Option<Record>> {
        let sql = format!(
            "SELECT to_jsonb(t) FROM {} AS t WHERE t.id = $1",
            collection.table_name()
        );

        let row: Option<Json<Record>> = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::failure(BACKEND, collection, "fetch", e))?;

        Ok(row.map(|Json(record)| record))
    }

    async fn insert(&self, collection: Collection, record: Record) -> StorageResult<Record> {
        let columns = column_list(collection, "insert", &record)?;
        if columns.is_empty() {
            return Err(StorageError::failure(
                BACKEND,
                collection,
                "insert",
                "record has no fields",
            ));
        }

        let quoted = columns
            .iter()
            .map(|c| format!("\"{}\"", c))
            .collect::<Vec<_>>()
            .join(", ");
        let table = collection.table_name();

        let sql = format!(
            "INSERT INTO {table} AS t ({quoted}) \
             SELECT {quoted} FROM jsonb_populate_record(NULL::{table}, $1) \
             RETURNING to_jsonb(t)"
        );

        let Json(inserted): Json<Record> = sqlx::query_scalar(&sql)
            .bind(Json(record))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::failure(BACKEND, collection, "insert", e))?;

        Ok(inserted)
    }

    async fn update(&self, collection: Collection, id: &str, patch: Record) -> StorageResult<Record> {
        let columns = column_list(collection, "update", &patch)?;

        if columns.is_empty() {
            return self
                .get_one(collection, id)
                .await?
                .ok_or_else(|| StorageError::not_found(BACKEND, collection, id));
        }

        let assignments = columns
            .iter()
            .map(|c| format!("\"{c}\" = p.\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let table = collection.table_name();

        let sql = format!(
            "UPDATE {table} AS t SET {assignments} \
             FROM jsonb_populate_record(NULL::{table}, $2) AS p \
             WHERE t.id = $1 \
             RETURNING to_jsonb(t)"
        );

        let row: Option<Json<Record>> = sqlx::query_scalar(&sql)
            .bind(id)
            .bind(Json(patch))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::failure(BACKEND, collection, "update", e))?;

        match row {
            Some(Json(record)) => Ok(record),
            None => Err(StorageError::not_found(BACKEND, collection, id)),
        }
    }

    async fn remove(&self, collection: Collection, id: &str) -> StorageResult<bool> {
        let sql = format!("DELETE FROM {} WHERE id = $1", collection.table_name());

        let result = sqlx::query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::failure(BACKEND, collection, "delete", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_matching(&self, collection: Collection, filters: &[Filter]) -> StorageResult<usize> {
        let clause = build_where(collection, "delete", filters, 1)?;
        let sql = format!(
            "DELETE FROM {} AS t{}",
            collection.table_name(),
            clause.sql
        );

        let result = bind_params!(sqlx::query::<Postgres>(&sql), clause.params)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::failure(BACKEND, collection, "delete", e))?;

        Ok(result.rows_affected() as usize)
    }

    async fn health_check(&self) -> bool {
        pool::health_check(&self.pool).await.is_ok()
    }
}
