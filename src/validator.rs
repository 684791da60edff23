//! Post-load validation queries.

use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::error::LoadResult;
use crate::sql::{TableRef, ToSql, ValidationQuery};
use crate::warehouse::executor::{AsyncStatementExecutor, Pacer, StatementResult};
use crate::warehouse::{Row, StatementService, StatementStatus};

/// Results of the three validation queries.
///
/// Statuses are not checked: a failed query simply contributes no rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub count: Vec<Row>,
    pub sum_revenue: Vec<Row>,
    pub by_day: Vec<Row>,
}

impl ValidationReport {
    /// Value of `c` from the row count query.
    pub fn row_count(&self) -> Option<i64> {
        self.count.first()?.get("c")?.as_i64()
    }

    /// Formatted total revenue, `None` for an empty table.
    pub fn total_revenue(&self) -> Option<&str> {
        self.sum_revenue.first()?.get("total_revenue")?.as_str()
    }

    /// The `{"validation": ...}` document printed after a run.
    pub fn to_json(&self) -> serde_json::Value {
        json!({ "validation": self })
    }
}

/// Row count, total revenue and per-day breakdown, in that order.
pub fn validation_queries(table: &TableRef) -> [ValidationQuery; 3] {
    [
        ValidationQuery::RowCount(table.clone()),
        ValidationQuery::TotalRevenue(table.clone()),
        ValidationQuery::RevenueByDay(table.clone()),
    ]
}

pub struct Validator<'a, S, P> {
    executor: &'a AsyncStatementExecutor<S, P>,
    table: TableRef,
}

impl<'a, S: StatementService, P: Pacer> Validator<'a, S, P> {
    pub fn new(executor: &'a AsyncStatementExecutor<S, P>, table: TableRef) -> Self {
        Self { executor, table }
    }

    pub fn queries(&self) -> [ValidationQuery; 3] {
        validation_queries(&self.table)
    }

    pub async fn validate(&self) -> LoadResult<ValidationReport> {
        let [count, sum_revenue, by_day] = self.queries();

        let report = ValidationReport {
            count: self.rows(&count).await?,
            sum_revenue: self.rows(&sum_revenue).await?,
            by_day: self.rows(&by_day).await?,
        };

        info!(
            rows = ?report.row_count(),
            revenue = ?report.total_revenue(),
            days = report.by_day.len(),
            "Validation complete"
        );
        Ok(report)
    }

    async fn rows(&self, query: &ValidationQuery) -> LoadResult<Vec<Row>> {
        let StatementResult { status, rows, .. } = self.executor.execute(&query.to_sql()).await?;
        if status != StatementStatus::Finished {
            warn!(%status, "Validation query did not finish");
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(value: serde_json::Value) -> Row {
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_report_accessors() {
        let report = ValidationReport {
            count: vec![row(json!({"c": 2}))],
            sum_revenue: vec![row(json!({"total_revenue": "25.00"}))],
            by_day: vec![],
        };
        assert_eq!(report.row_count(), Some(2));
        assert_eq!(report.total_revenue(), Some("25.00"));
    }

    #[test]
    fn test_null_revenue() {
        let report = ValidationReport {
            count: vec![row(json!({"c": 0}))],
            sum_revenue: vec![row(json!({"total_revenue": null}))],
            by_day: vec![],
        };
        assert_eq!(report.total_revenue(), None);
        assert_eq!(
            report.to_json(),
            json!({"validation": {
                "count": [{"c": 0}],
                "sum_revenue": [{"total_revenue": null}],
                "by_day": []
            }})
        );
    }
}
