//! # salesload: batch sales ETL
//!
//! Raw sales CSVs in, a validated warehouse fact table out.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use salesload::prelude::*;
//!
//! let config = RunConfig::from_tokens(std::env::args())?;
//! let service = PgWireService::connect(url, &config.database, 4).await?;
//! let executor = AsyncStatementExecutor::new(service, PollPolicy::default());
//! let job = SalesJob::new(config, LocalArrowEngine::new("/mnt/lake"), executor, FailurePolicy::CopyOnly);
//!
//! let report = job.run().await?;
//! println!("{}", report.validation.to_json());
//! ```
//!
//! ## Stages
//!
//! | Stage     | Module      | Output                         |
//! |-----------|-------------|--------------------------------|
//! | Resolve   | `config`    | `RunConfig`                    |
//! | Transform | `transform` | one Parquet file               |
//! | Load      | `loader`    | `sales.sales_fact` replaced    |
//! | Validate  | `validator` | `ValidationReport`             |

pub mod config;
pub mod error;
pub mod job;
pub mod loader;
pub mod location;
pub mod sql;
pub mod transform;
pub mod validator;
pub mod warehouse;

pub mod prelude {
    pub use crate::config::{JobSettings, RunConfig};
    pub use crate::error::*;
    pub use crate::job::{JobReport, SalesJob};
    pub use crate::loader::{FailurePolicy, LoadOutcome, LoadStep, WarehouseLoader};
    pub use crate::location::Location;
    pub use crate::sql::{TableRef, ToSql};
    pub use crate::transform::{LocalArrowEngine, TransformEngine, TransformJob};
    pub use crate::validator::{ValidationReport, Validator};
    pub use crate::warehouse::{
        AsyncStatementExecutor, Pacer, PgWireService, PollPolicy, StatementService,
        StatementStatus, TokioPacer,
    };
}

/// Resolve a run configuration from raw job arguments.
///
/// # Example
///
/// ```
/// let config = salesload::resolve([
///     "--raw_bucket", "raw", "--processed_bucket", "proc",
///     "--REDSHIFT_WORKGROUP", "wg", "--redshift_secret_arn", "s",
///     "--redshift_iam_role_arn", "r",
/// ]).unwrap();
/// assert_eq!(config.processed_path(), "s3://proc/processed/sales/");
/// ```
pub fn resolve<I, S>(tokens: I) -> error::LoadResult<config::RunConfig>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    config::RunConfig::from_tokens(tokens)
}
