//! In-memory warehouse for integration tests.
//!
//! Understands exactly the statements the job issues. Effects are applied
//! when a statement reaches its terminal state, not at submission, so tests
//! observe the same ordering a real asynchronous warehouse gives.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use salesload::config::RunConfig;
use salesload::error::{LoadError, LoadResult};
use salesload::location::Location;
use salesload::warehouse::{
    ColumnMetadata, Field, Pacer, ResultSet, StatementDescription, StatementHandle,
    StatementService, StatementStatus,
};

use arrow::array::{Array, Date32Array, Float64Array};

/// Statuses a statement passes through before its terminal state.
const PENDING: [StatementStatus; 3] = [
    StatementStatus::Submitted,
    StatementStatus::Picked,
    StatementStatus::Started,
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactRow {
    pub revenue: Option<f64>,
    pub order_date: Option<chrono::NaiveDate>,
}

#[derive(Debug)]
struct Statement {
    sql: String,
    polls: usize,
    outcome: Option<Outcome>,
}

#[derive(Debug, Clone)]
struct Outcome {
    status: StatementStatus,
    error: Option<String>,
    result: Option<ResultSet>,
    rows: Option<i64>,
}

#[derive(Debug, Default)]
struct State {
    schema_exists: bool,
    table_exists: bool,
    rows: Vec<FactRow>,
    submitted: Vec<String>,
    statements: HashMap<String, Statement>,
    /// Statement prefix → forced terminal status.
    failures: Vec<(String, StatementStatus)>,
    /// Row counts observed by each count query, in order.
    counts_seen: Vec<i64>,
}

pub struct FakeWarehouse {
    root: PathBuf,
    pending_polls: usize,
    state: Mutex<State>,
}

impl FakeWarehouse {
    /// `root` is the local storage mirror COPY reads from.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pending_polls: PENDING.len(),
            state: Mutex::new(State::default()),
        }
    }

    /// Statements reach their terminal state on the first poll.
    pub fn instant(mut self) -> Self {
        self.pending_polls = 0;
        self
    }

    /// Force statements starting with `prefix` to end in `status`.
    pub fn fail_on(self, prefix: &str, status: StatementStatus) -> Self {
        self.state
            .lock()
            .unwrap()
            .failures
            .push((prefix.to_string(), status));
        self
    }

    /// Start with an existing, populated table.
    pub fn with_rows(self, rows: Vec<FactRow>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.schema_exists = true;
            state.table_exists = true;
            state.rows = rows;
        }
        self
    }

    pub fn submitted(&self) -> Vec<String> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn row_count(&self) -> usize {
        self.state.lock().unwrap().rows.len()
    }

    pub fn counts_seen(&self) -> Vec<i64> {
        self.state.lock().unwrap().counts_seen.clone()
    }

    fn apply(&self, state: &mut State, sql: &str) -> Outcome {
        let lowered = sql.trim().to_lowercase();

        if let Some((_, status)) = state
            .failures
            .iter()
            .find(|(prefix, _)| lowered.starts_with(prefix.as_str()))
        {
            return failed(*status, "forced failure");
        }

        if lowered.starts_with("create schema") {
            state.schema_exists = true;
            return finished(None, None);
        }
        if lowered.starts_with("create table") {
            if !state.schema_exists {
                return failed(StatementStatus::Failed, "schema \"sales\" does not exist");
            }
            state.table_exists = true;
            return finished(None, None);
        }
        if !state.table_exists {
            return failed(StatementStatus::Failed, "relation \"sales.sales_fact\" does not exist");
        }

        if lowered.starts_with("truncate") {
            state.rows.clear();
            return finished(None, None);
        }
        if lowered.starts_with("copy") {
            return match self.copy(sql) {
                Ok(rows) => {
                    let n = rows.len() as i64;
                    state.rows.extend(rows);
                    finished(None, Some(n))
                }
                Err(e) => failed(StatementStatus::Failed, &e.to_string()),
            };
        }
        if lowered.starts_with("select count(*)") {
            let n = state.rows.len() as i64;
            state.counts_seen.push(n);
            return finished(Some(result_set(&["c"], vec![vec![Field::Long(n)]])), Some(1));
        }
        if lowered.starts_with("select to_char(sum(revenue)") {
            let total = sum(state.rows.iter().map(|r| r.revenue));
            let field = total.map_or(Field::Null(true), |t| Field::String(format!("{:.2}", t)));
            return finished(Some(result_set(&["total_revenue"], vec![vec![field]])), Some(1));
        }
        if lowered.starts_with("select order_date") {
            let mut groups: BTreeMap<Option<chrono::NaiveDate>, Vec<Option<f64>>> = BTreeMap::new();
            for row in &state.rows {
                groups.entry(row.order_date).or_default().push(row.revenue);
            }
            let records: Vec<Vec<Field>> = groups
                .into_iter()
                .map(|(date, revenues)| {
                    vec![
                        date.map_or(Field::Null(true), |d| Field::String(d.to_string())),
                        Field::Long(revenues.len() as i64),
                        sum(revenues.into_iter())
                            .map_or(Field::Null(true), |t| Field::String(format!("{:.2}", t))),
                    ]
                })
                .collect();
            let n = records.len() as i64;
            return finished(Some(result_set(&["order_date", "n", "revenue"], records)), Some(n));
        }

        failed(StatementStatus::Failed, "unsupported statement")
    }

    /// Read every Parquet file at the COPY source.
    fn copy(&self, sql: &str) -> LoadResult<Vec<FactRow>> {
        let source = sql
            .split('\'')
            .nth(1)
            .ok_or_else(|| LoadError::Warehouse("copy without source".into()))?;
        let dir = Location::parse(source)?.resolve_under(&self.root);
        read_fact_rows(&dir)
    }
}

fn finished(result: Option<ResultSet>, rows: Option<i64>) -> Outcome {
    Outcome {
        status: StatementStatus::Finished,
        error: None,
        result,
        rows,
    }
}

fn failed(status: StatementStatus, error: &str) -> Outcome {
    Outcome {
        status,
        error: Some(error.to_string()),
        result: None,
        rows: None,
    }
}

fn sum(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    values.flatten().fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
}

fn result_set(columns: &[&str], records: Vec<Vec<Field>>) -> ResultSet {
    ResultSet {
        columns: columns
            .iter()
            .map(|name| ColumnMetadata {
                name: name.to_string(),
                type_name: "varchar".into(),
            })
            .collect(),
        records,
    }
}

/// Revenue and order date of every row in the Parquet files under `dir`.
pub fn read_fact_rows(dir: &Path) -> LoadResult<Vec<FactRow>> {
    let mut rows = Vec::new();
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "parquet"))
        .collect();
    files.sort();

    for path in files {
        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&path)?)
            .map_err(|e| LoadError::Warehouse(e.to_string()))?
            .build()
            .map_err(|e| LoadError::Warehouse(e.to_string()))?;
        for batch in reader {
            let batch = batch.map_err(|e| LoadError::Warehouse(e.to_string()))?;
            let revenue = batch
                .column_by_name("revenue")
                .and_then(|c| c.as_any().downcast_ref::<Float64Array>().cloned())
                .ok_or_else(|| LoadError::Warehouse("no revenue column".into()))?;
            let dates = batch
                .column_by_name("order_date")
                .and_then(|c| c.as_any().downcast_ref::<Date32Array>().cloned())
                .ok_or_else(|| LoadError::Warehouse("no order_date column".into()))?;
            for i in 0..batch.num_rows() {
                rows.push(FactRow {
                    revenue: (!revenue.is_null(i)).then(|| revenue.value(i)),
                    order_date: if dates.is_null(i) { None } else { dates.value_as_date(i) },
                });
            }
        }
    }
    Ok(rows)
}

#[async_trait]
impl StatementService for FakeWarehouse {
    async fn submit(&self, sql: &str) -> LoadResult<StatementHandle> {
        let mut state = self.state.lock().unwrap();
        state.submitted.push(sql.to_string());
        let id = format!("fake-{}", state.submitted.len());
        state.statements.insert(
            id.clone(),
            Statement {
                sql: sql.to_string(),
                polls: 0,
                outcome: None,
            },
        );
        Ok(StatementHandle(id))
    }

    async fn describe(&self, handle: &StatementHandle) -> LoadResult<StatementDescription> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let statement = state
            .statements
            .get_mut(handle.as_str())
            .ok_or_else(|| LoadError::Warehouse(format!("unknown statement {}", handle)))?;

        let polls = statement.polls;
        statement.polls += 1;
        let sql = statement.sql.clone();

        if polls < self.pending_polls && statement.outcome.is_none() {
            return Ok(StatementDescription {
                id: handle.clone(),
                status: PENDING[polls.min(PENDING.len() - 1)],
                query_string: sql,
                error: None,
                has_result_set: false,
                result_rows: None,
            });
        }

        let outcome = match statement.outcome.clone() {
            Some(outcome) => outcome,
            None => {
                let outcome = self.apply(state, &sql);
                if let Some(statement) = state.statements.get_mut(handle.as_str()) {
                    statement.outcome = Some(outcome.clone());
                }
                outcome
            }
        };

        Ok(StatementDescription {
            id: handle.clone(),
            status: outcome.status,
            query_string: sql,
            error: outcome.error,
            has_result_set: outcome.result.is_some(),
            result_rows: outcome.rows,
        })
    }

    async fn fetch_result(&self, handle: &StatementHandle) -> LoadResult<ResultSet> {
        let state = self.state.lock().unwrap();
        state
            .statements
            .get(handle.as_str())
            .and_then(|s| s.outcome.as_ref())
            .and_then(|o| o.result.clone())
            .ok_or_else(|| LoadError::Warehouse(format!("no result for {}", handle)))
    }
}

/// Pacer that never sleeps.
#[derive(Default)]
pub struct InstantPacer {
    pub pauses: AtomicU32,
}

impl InstantPacer {
    pub fn pauses(&self) -> u32 {
        self.pauses.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Pacer for InstantPacer {
    async fn pause(&self, _interval: Duration) {
        self.pauses.fetch_add(1, Ordering::SeqCst);
    }
}

pub const CSV_HEADER: &str = "order_id,customer_id,product_id,quantity,unit_price,order_timestamp\n";

/// Job arguments pointing at `raw/in/` and `proc/out/`.
pub fn run_config() -> RunConfig {
    RunConfig::from_tokens([
        "--raw_bucket",
        "raw",
        "--raw_prefix",
        "in",
        "--PROCESSED_BUCKET",
        "proc",
        "--processed_prefix",
        "/out",
        "--redshift_workgroup",
        "wg",
        "--redshift_secret_arn",
        "arn:aws:secretsmanager:eu-west-1:1:secret:wh",
        "--REDSHIFT_IAM_ROLE_ARN",
        "arn:aws:iam::1:role/load",
    ])
    .unwrap()
}

/// Write a raw CSV file under the storage root.
pub fn write_raw(root: &Path, name: &str, body: &str) {
    let dir = root.join("raw").join("in");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(name), body).unwrap();
}
