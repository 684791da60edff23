//! Statement service for Postgres-wire warehouses.
//!
//! Each submission runs on its own tokio task against a shared sqlx pool.
//! Status and the buffered result live in a table keyed by handle until the
//! caller has seen the terminal state and taken whatever result there is.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{Column, Executor, PgPool, Row, TypeInfo};
use tracing::{debug, warn};

use super::{
    ColumnMetadata, Field, ResultSet, StatementDescription, StatementHandle, StatementService,
    StatementStatus,
};
use crate::error::{LoadError, LoadResult};

#[derive(Debug, Clone)]
struct Entry {
    sql: String,
    status: StatementStatus,
    error: Option<String>,
    result: Option<ResultSet>,
    rows_affected: Option<i64>,
}

type Registry = Arc<Mutex<HashMap<StatementHandle, Entry>>>;

/// [`StatementService`] backed by a sqlx Postgres pool.
#[derive(Clone)]
pub struct PgWireService {
    pool: PgPool,
    statements: Registry,
    next_id: Arc<AtomicU64>,
}

impl PgWireService {
    /// Connect to the warehouse at `url`, using `database` as the target
    /// database regardless of what the URL names.
    pub async fn connect(url: &str, database: &str, max_connections: u32) -> LoadResult<Self> {
        let options = PgConnectOptions::from_str(url)
            .map_err(|e| LoadError::Warehouse(format!("Invalid warehouse url: {}", e)))?
            .database(database);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| LoadError::Warehouse(format!("Connection failed: {}", e)))?;

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            statements: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn registry(&self) -> LoadResult<MutexGuard<'_, HashMap<StatementHandle, Entry>>> {
        self.statements
            .lock()
            .map_err(|_| LoadError::Warehouse("statement registry poisoned".into()))
    }

    /// Number of statements still tracked.
    pub fn tracked(&self) -> usize {
        self.statements.lock().map(|s| s.len()).unwrap_or_default()
    }
}

fn unknown(handle: &StatementHandle) -> LoadError {
    LoadError::Warehouse(format!("Unknown statement {}", handle))
}

fn update(registry: &Registry, handle: &StatementHandle, apply: impl FnOnce(&mut Entry)) {
    match registry.lock() {
        Ok(mut statements) => {
            if let Some(entry) = statements.get_mut(handle) {
                apply(entry);
            }
        }
        Err(_) => warn!(id = %handle, "Statement registry poisoned, dropping status update"),
    }
}

/// Statements that return rows, judged by their leading keyword.
fn returns_rows(sql: &str) -> bool {
    let head = sql
        .trim_start()
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    matches!(head.as_str(), "select" | "with" | "show" | "values")
}

async fn run_statement(pool: PgPool, registry: Registry, handle: StatementHandle, sql: String) {
    update(&registry, &handle, |e| e.status = StatementStatus::Started);

    if returns_rows(&sql) {
        match sqlx::query(&sql).fetch_all(&pool).await {
            Ok(rows) => {
                let result = rows_to_result_set(&rows);
                let count = result.records.len() as i64;
                update(&registry, &handle, |e| {
                    e.status = StatementStatus::Finished;
                    e.rows_affected = Some(count);
                    e.result = Some(result);
                });
            }
            Err(err) => fail(&registry, &handle, err),
        }
    } else {
        match pool.execute(sql.as_str()).await {
            Ok(done) => {
                let affected = done.rows_affected() as i64;
                update(&registry, &handle, |e| {
                    e.status = StatementStatus::Finished;
                    e.rows_affected = Some(affected);
                });
            }
            Err(err) => fail(&registry, &handle, err),
        }
    }
}

fn fail(registry: &Registry, handle: &StatementHandle, err: sqlx::Error) {
    // Connection-level problems abort the statement; anything the server
    // rejected is a plain failure.
    let status = match &err {
        sqlx::Error::Database(_) => StatementStatus::Failed,
        _ => StatementStatus::Aborted,
    };
    let message = err.to_string();
    update(registry, handle, |e| {
        e.status = status;
        e.error = Some(message);
    });
}

#[async_trait]
impl StatementService for PgWireService {
    async fn submit(&self, sql: &str) -> LoadResult<StatementHandle> {
        let seq = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = StatementHandle(format!(
            "{}-{:04}",
            chrono::Utc::now().format("%Y%m%dT%H%M%S"),
            seq
        ));

        {
            let mut statements = self.registry()?;
            statements.insert(
                handle.clone(),
                Entry {
                    sql: sql.to_string(),
                    status: StatementStatus::Submitted,
                    error: None,
                    result: None,
                    rows_affected: None,
                },
            );
        }

        debug!(id = %handle, "Dispatching statement");
        tokio::spawn(run_statement(
            self.pool.clone(),
            Arc::clone(&self.statements),
            handle.clone(),
            sql.to_string(),
        ));

        Ok(handle)
    }

    async fn describe(&self, handle: &StatementHandle) -> LoadResult<StatementDescription> {
        let entry = {
            let mut statements = self.registry()?;
            let entry = statements.get(handle).cloned().ok_or_else(|| unknown(handle))?;
            // Nothing left to fetch once a rowless statement is terminal.
            if entry.status.is_terminal() && entry.result.is_none() {
                statements.remove(handle);
            }
            entry
        };
        Ok(StatementDescription {
            id: handle.clone(),
            status: entry.status,
            query_string: entry.sql,
            error: entry.error,
            has_result_set: entry.result.is_some(),
            result_rows: entry.rows_affected,
        })
    }

    async fn fetch_result(&self, handle: &StatementHandle) -> LoadResult<ResultSet> {
        let entry = self.registry()?.remove(handle).ok_or_else(|| unknown(handle))?;
        entry
            .result
            .ok_or_else(|| LoadError::Warehouse(format!("Statement {} has no result set", handle)))
    }
}

fn rows_to_result_set(rows: &[PgRow]) -> ResultSet {
    let columns = rows
        .first()
        .map(|row| {
            row.columns()
                .iter()
                .map(|c| ColumnMetadata {
                    name: c.name().to_string(),
                    type_name: c.type_info().name().to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    let records = rows.iter().map(row_to_fields).collect();
    ResultSet { columns, records }
}

/// Convert a row into tagged fields, column by column.
fn row_to_fields(row: &PgRow) -> Vec<Field> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let type_name = column.type_info().name();
            let field = match type_name {
                "BOOL" => row.try_get::<Option<bool>, _>(i).map(|v| v.map(Field::Boolean)),
                "INT2" => row
                    .try_get::<Option<i16>, _>(i)
                    .map(|v| v.map(|n| Field::Long(n.into()))),
                "INT4" => row
                    .try_get::<Option<i32>, _>(i)
                    .map(|v| v.map(|n| Field::Long(n.into()))),
                "INT8" => row.try_get::<Option<i64>, _>(i).map(|v| v.map(Field::Long)),
                "FLOAT4" => row
                    .try_get::<Option<f32>, _>(i)
                    .map(|v| v.map(|n| Field::Double(n.into()))),
                "FLOAT8" => row.try_get::<Option<f64>, _>(i).map(|v| v.map(Field::Double)),
                "DATE" => row
                    .try_get::<Option<chrono::NaiveDate>, _>(i)
                    .map(|v| v.map(|d| Field::String(d.to_string()))),
                "TIMESTAMP" => row
                    .try_get::<Option<chrono::NaiveDateTime>, _>(i)
                    .map(|v| v.map(|d| Field::String(d.format("%Y-%m-%d %H:%M:%S").to_string()))),
                "TIMESTAMPTZ" => row
                    .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i)
                    .map(|v| v.map(|d| Field::String(d.to_rfc3339()))),
                _ => row.try_get::<Option<String>, _>(i).map(|v| v.map(Field::String)),
            };

            match field {
                Ok(Some(field)) => field,
                Ok(None) => Field::Null(true),
                Err(err) => {
                    warn!(column = column.name(), type_name, %err, "Undecodable column, returning null");
                    Field::Null(true)
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> PgWireService {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://salesload@localhost/dev")
            .unwrap();
        PgWireService::from_pool(pool)
    }

    fn track(service: &PgWireService, id: &str, status: StatementStatus, result: Option<ResultSet>) -> StatementHandle {
        let handle = StatementHandle(id.to_string());
        service.statements.lock().unwrap().insert(
            handle.clone(),
            Entry {
                sql: "select 1".into(),
                status,
                error: None,
                result,
                rows_affected: None,
            },
        );
        handle
    }

    #[tokio::test]
    async fn test_handles_discarded_after_terminal_state() {
        let service = service();
        let running = track(&service, "running", StatementStatus::Started, None);
        let truncated = track(&service, "truncate", StatementStatus::Finished, None);
        let counted = track(
            &service,
            "count",
            StatementStatus::Finished,
            Some(ResultSet { columns: vec![], records: vec![vec![Field::Long(2)]] }),
        );

        service.describe(&running).await.unwrap();
        assert_eq!(service.tracked(), 3);

        service.describe(&truncated).await.unwrap();
        assert_eq!(service.tracked(), 2);
        assert!(service.describe(&truncated).await.is_err());

        let description = service.describe(&counted).await.unwrap();
        assert!(description.has_result_set);
        assert_eq!(service.tracked(), 2);
        let result = service.fetch_result(&counted).await.unwrap();
        assert_eq!(result.records, vec![vec![Field::Long(2)]]);
        assert_eq!(service.tracked(), 1);
    }

    #[test]
    fn test_returns_rows() {
        assert!(returns_rows("select count(*) as c from sales.sales_fact;"));
        assert!(returns_rows("  SELECT 1"));
        assert!(returns_rows("with x as (select 1) select * from x"));
        assert!(!returns_rows("truncate table sales.sales_fact;"));
        assert!(!returns_rows("\ncreate schema if not exists sales;"));
        assert!(!returns_rows(""));
    }
}
