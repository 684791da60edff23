//! Full-replace load of the sales fact table.
//!
//! The load is four statements run strictly in order, each to completion:
//!
//! ```text
//! EnsureSchema ─▶ EnsureTable ─▶ Replace (truncate) ─▶ Copy (parquet)
//! ```
//!
//! There are no retries. Between Replace and Copy the table is empty; if
//! Copy fails it stays that way until the next successful run.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{LoadError, LoadResult};
use crate::sql::{LoadStatement, TableRef, ToSql};
use crate::warehouse::executor::{AsyncStatementExecutor, Pacer, StatementResult};
use crate::warehouse::{StatementService, StatementStatus};

/// One step of the load sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStep {
    EnsureSchema,
    EnsureTable,
    Replace,
    Copy,
}

impl LoadStep {
    pub const SEQUENCE: [LoadStep; 4] = [
        LoadStep::EnsureSchema,
        LoadStep::EnsureTable,
        LoadStep::Replace,
        LoadStep::Copy,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LoadStep::EnsureSchema => "CREATE SCHEMA",
            LoadStep::EnsureTable => "CREATE TABLE",
            LoadStep::Replace => "TRUNCATE",
            LoadStep::Copy => "COPY",
        }
    }
}

/// Which non-Finished steps abort the load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Only a failed Copy is fatal; earlier failures are logged and the
    /// sequence continues.
    #[default]
    CopyOnly,
    /// Any failed step is fatal.
    Strict,
}

impl FailurePolicy {
    fn is_fatal(self, step: LoadStep) -> bool {
        match self {
            FailurePolicy::CopyOnly => step == LoadStep::Copy,
            FailurePolicy::Strict => true,
        }
    }
}

/// Statuses observed for each executed step.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOutcome {
    pub steps: Vec<(LoadStep, StatementResult)>,
}

impl LoadOutcome {
    pub fn status_of(&self, step: LoadStep) -> Option<StatementStatus> {
        self.steps
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, r)| r.status)
    }

    /// Rows reported by the Copy step, when the service knows.
    pub fn rows_loaded(&self) -> Option<i64> {
        self.steps
            .iter()
            .find(|(s, _)| *s == LoadStep::Copy)
            .and_then(|(_, r)| r.description.result_rows)
    }
}

/// The statement a load step issues against `table`.
pub fn load_statement(
    step: LoadStep,
    table: &TableRef,
    source: &str,
    iam_role: &str,
) -> LoadStatement {
    match step {
        LoadStep::EnsureSchema => LoadStatement::CreateSchema {
            schema: table.schema.clone(),
        },
        LoadStep::EnsureTable => LoadStatement::CreateTable {
            table: table.clone(),
        },
        LoadStep::Replace => LoadStatement::Truncate {
            table: table.clone(),
        },
        LoadStep::Copy => LoadStatement::CopyParquet {
            table: table.clone(),
            source: source.to_string(),
            iam_role: iam_role.to_string(),
        },
    }
}

/// Replaces the contents of the fact table from a Parquet dataset.
pub struct WarehouseLoader<'a, S, P> {
    executor: &'a AsyncStatementExecutor<S, P>,
    table: TableRef,
    iam_role: String,
    policy: FailurePolicy,
}

impl<'a, S: StatementService, P: Pacer> WarehouseLoader<'a, S, P> {
    pub fn new(
        executor: &'a AsyncStatementExecutor<S, P>,
        table: TableRef,
        iam_role: impl Into<String>,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            executor,
            table,
            iam_role: iam_role.into(),
            policy,
        }
    }

    /// The statement for `step`, loading from `source`.
    pub fn statement(&self, step: LoadStep, source: &str) -> LoadStatement {
        load_statement(step, &self.table, source, &self.iam_role)
    }

    /// Run the full sequence against the dataset at `source`.
    pub async fn load(&self, source: &str) -> LoadResult<LoadOutcome> {
        let mut steps = Vec::with_capacity(LoadStep::SEQUENCE.len());

        for step in LoadStep::SEQUENCE {
            let sql = self.statement(step, source).to_sql();
            info!(step = step.name(), table = %self.table.to_sql(), "Running load step");

            let result = self.executor.execute(&sql).await?;
            let status = result.status;
            steps.push((step, result));

            if status == StatementStatus::Finished {
                continue;
            }
            if self.policy.is_fatal(step) {
                return Err(LoadError::LoadFailed {
                    step: step.name(),
                    status,
                });
            }
            warn!(step = step.name(), %status, "Load step did not finish, continuing");
        }

        let outcome = LoadOutcome { steps };
        info!(
            table = %self.table.to_sql(),
            rows = ?outcome.rows_loaded(),
            "Load complete"
        );
        Ok(outcome)
    }
}
