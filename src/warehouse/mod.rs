//! Asynchronous warehouse statement execution.
//!
//! The warehouse accepts a statement, hands back a handle immediately and
//! runs the statement out of process. Callers learn the outcome by polling
//! the handle. [`StatementService`] is that boundary; the
//! [`executor::AsyncStatementExecutor`] turns it into a call that returns only
//! once the statement is done.

pub mod executor;
pub mod pgwire;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LoadResult;

pub use self::executor::{AsyncStatementExecutor, Pacer, PollPolicy, StatementResult, TokioPacer};
pub use self::pgwire::PgWireService;

/// Lifecycle of a submitted statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatementStatus {
    /// Accepted, not yet scheduled.
    Submitted,
    /// Queued for execution.
    Picked,
    /// Running.
    Started,
    Finished,
    Failed,
    Aborted,
}

impl StatementStatus {
    /// No further transition happens once a statement is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Aborted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::Picked => "PICKED",
            Self::Started => "STARTED",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
            Self::Aborted => "ABORTED",
        }
    }
}

impl fmt::Display for StatementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque id correlating a submission with its eventual result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatementHandle(pub String);

impl StatementHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StatementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status snapshot returned by [`StatementService::describe`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatementDescription {
    pub id: StatementHandle,
    pub status: StatementStatus,
    pub query_string: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub has_result_set: bool,
    /// Rows returned or affected, when known.
    pub result_rows: Option<i64>,
}

/// A tagged scalar as the statement service returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Field {
    #[serde(rename = "stringValue")]
    String(String),
    #[serde(rename = "longValue")]
    Long(i64),
    #[serde(rename = "doubleValue")]
    Double(f64),
    #[serde(rename = "booleanValue")]
    Boolean(bool),
    #[serde(rename = "isNull")]
    Null(bool),
}

impl Field {
    /// Plain JSON scalar; nulls (and non-finite doubles) become `Value::Null`.
    pub fn to_value(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Field::String(s) => Value::String(s.clone()),
            Field::Long(v) => Value::Number((*v).into()),
            Field::Double(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Field::Boolean(b) => Value::Bool(*b),
            Field::Null(_) => Value::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    pub type_name: String,
}

/// Result set of a finished query, still in tagged form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<ColumnMetadata>,
    pub records: Vec<Vec<Field>>,
}

/// A row converted to column name → scalar.
pub type Row = serde_json::Map<String, serde_json::Value>;

impl ResultSet {
    /// Convert tagged records into plain rows.
    ///
    /// Records shorter than the column list yield nulls for the missing cells.
    pub fn into_rows(self) -> Vec<Row> {
        let ResultSet { columns, records } = self;
        records
            .into_iter()
            .map(|record| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(i, col)| {
                        let value = record
                            .get(i)
                            .map(Field::to_value)
                            .unwrap_or(serde_json::Value::Null);
                        (col.name.clone(), value)
                    })
                    .collect()
            })
            .collect()
    }
}

/// Remote, asynchronous SQL execution.
///
/// `submit` returns as soon as the statement is accepted; execution happens
/// elsewhere and is observed through `describe`.
#[async_trait]
pub trait StatementService: Send + Sync {
    async fn submit(&self, sql: &str) -> LoadResult<StatementHandle>;

    async fn describe(&self, handle: &StatementHandle) -> LoadResult<StatementDescription>;

    /// Only valid for a finished statement with a result set.
    async fn fetch_result(&self, handle: &StatementHandle) -> LoadResult<ResultSet>;
}
