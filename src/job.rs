//! End-to-end job orchestration.
//!
//! ```text
//! RunConfig ─▶ Transform ─▶ WarehouseLoader ─▶ Validator
//! ```
//!
//! Each stage runs to completion before the next starts. A fatal error
//! anywhere ends the run; validation only happens after a successful load.

use tracing::info;

use crate::config::RunConfig;
use crate::error::LoadResult;
use crate::loader::{FailurePolicy, LoadOutcome, LoadStep, WarehouseLoader, load_statement};
use crate::sql::{TableRef, ToSql};
use crate::transform::{TransformEngine, TransformJob, TransformOutput};
use crate::validator::{ValidationReport, Validator, validation_queries};
use crate::warehouse::executor::{AsyncStatementExecutor, Pacer};
use crate::warehouse::StatementService;

/// Everything one run produced.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub transform: TransformOutput,
    pub load: LoadOutcome,
    pub validation: ValidationReport,
}

/// Load and validation SQL for `config`, in execution order.
pub fn plan_statements(config: &RunConfig, table: &TableRef) -> Vec<String> {
    let source = config.processed_path();
    LoadStep::SEQUENCE
        .iter()
        .map(|step| load_statement(*step, table, &source, &config.iam_role_arn).to_sql())
        .chain(validation_queries(table).iter().map(ToSql::to_sql))
        .collect()
}

/// The sales load job with its collaborators injected.
pub struct SalesJob<E, S, P> {
    config: RunConfig,
    engine: E,
    executor: AsyncStatementExecutor<S, P>,
    table: TableRef,
    policy: FailurePolicy,
}

impl<E, S, P> SalesJob<E, S, P>
where
    E: TransformEngine,
    S: StatementService,
    P: Pacer,
{
    pub fn new(
        config: RunConfig,
        engine: E,
        executor: AsyncStatementExecutor<S, P>,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            config,
            engine,
            executor,
            table: TableRef::sales_fact(),
            policy,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn executor(&self) -> &AsyncStatementExecutor<S, P> {
        &self.executor
    }

    pub fn transform_job(&self) -> LoadResult<TransformJob> {
        Ok(TransformJob {
            input: self.config.raw_location()?,
            output: self.config.processed_location()?,
            staging: self.config.temp_dir.clone(),
        })
    }

    fn loader(&self) -> WarehouseLoader<'_, S, P> {
        WarehouseLoader::new(
            &self.executor,
            self.table.clone(),
            self.config.iam_role_arn.clone(),
            self.policy,
        )
    }

    /// Every statement a run would issue, in order, without running any.
    pub fn plan(&self) -> Vec<String> {
        plan_statements(&self.config, &self.table)
    }

    /// Transform, load, then validate.
    pub async fn run(&self) -> LoadResult<JobReport> {
        let job = self.transform_job()?;
        info!(input = %job.input, output = %job.output, "Starting transform");
        let transform = self.engine.run(&job).await?;

        let load = self.loader().load(&self.config.processed_path()).await?;

        let validation = Validator::new(&self.executor, self.table.clone())
            .validate()
            .await?;

        Ok(JobReport {
            transform,
            load,
            validation,
        })
    }
}
