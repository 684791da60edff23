//! salesload: the sales ETL job runner
//!
//! # Usage
//!
//! ```bash
//! # Full run: transform, load, validate
//! salesload run --raw_bucket sales-raw --processed_bucket sales-proc \
//!     --REDSHIFT_WORKGROUP analytics --redshift_secret_arn arn:... \
//!     --redshift_iam_role_arn arn:...
//!
//! # Show the resolved config and every statement, touch nothing
//! salesload plan --raw_bucket sales-raw ...
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::*;
use salesload::job::plan_statements;
use salesload::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "salesload")]
#[command(version)]
#[command(about = "Batch sales ETL: CSV to Parquet, full-replace warehouse load, validation", long_about = None)]
#[command(after_help = "EXAMPLES:
    salesload run --raw_bucket raw --processed_bucket proc --REDSHIFT_WORKGROUP wg \\
        --redshift_secret_arn arn:secret --redshift_iam_role_arn arn:role
    salesload --settings ./salesload.toml plan --RAW_BUCKET raw ...")]
struct Cli {
    /// Runtime settings file (TOML)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Warehouse connection URL, overrides the settings file
    #[arg(long, env = "SALESLOAD_WAREHOUSE_URL")]
    warehouse_url: Option<String>,

    /// Local directory mirroring storage buckets, overrides the settings file
    #[arg(long, env = "SALESLOAD_STORAGE_ROOT")]
    storage_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform, load and validate
    Run {
        /// Job arguments as `--key value` pairs, any casing
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, num_args = 0..)]
        job_args: Vec<String>,
    },
    /// Resolve arguments and print the statements a run would issue
    Plan {
        /// Job arguments as `--key value` pairs, any casing
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, num_args = 0..)]
        job_args: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("salesload=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Run { job_args } => run(&cli, job_args).await,
        Commands::Plan { job_args } => plan(&cli, job_args),
    };

    if let Err(e) = result {
        match &e {
            LoadError::MissingArgs(names) => {
                eprintln!("{} Missing required job args: {:?}", "FATAL:".red().bold(), names)
            }
            other => eprintln!("{} {}", "Error:".red().bold(), other),
        }
        std::process::exit(e.exit_code());
    }
}

fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

fn load_settings(cli: &Cli) -> Result<JobSettings, LoadError> {
    let mut settings = JobSettings::discover(cli.settings.as_deref())?;
    if let Some(url) = &cli.warehouse_url {
        settings.warehouse.url = Some(url.clone());
    }
    if let Some(root) = &cli.storage_root {
        settings.storage.root = Some(root.clone());
    }
    Ok(settings)
}

fn plan(cli: &Cli, job_args: &[String]) -> Result<(), LoadError> {
    let config = RunConfig::from_tokens(job_args)?;
    print_json(&config.summary());

    let settings = load_settings(cli)?;
    let statements = plan_statements(&config, &TableRef::sales_fact());

    println!();
    println!(
        "{} poll every {:?}, failure policy {:?}",
        "Executor:".green().bold(),
        settings.executor.poll_policy().interval,
        settings.executor.failure_policy
    );
    println!("{}", "Statements:".green().bold());
    for (i, sql) in statements.iter().enumerate() {
        println!("{} {}", format!("[{}]", i + 1).cyan(), sql.white());
    }
    Ok(())
}

async fn run(cli: &Cli, job_args: &[String]) -> Result<(), LoadError> {
    // Argument problems end the run before any storage or warehouse call.
    let config = RunConfig::from_tokens(job_args)?;
    print_json(&config.summary());

    let settings = load_settings(cli)?;
    let url = settings.warehouse.url.clone().ok_or_else(|| {
        LoadError::Settings(
            "no warehouse url: set [warehouse] url, --warehouse-url or SALESLOAD_WAREHOUSE_URL"
                .into(),
        )
    })?;
    let root = settings
        .storage
        .root
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));

    let service = PgWireService::connect(
        &url,
        &config.database,
        settings.warehouse.max_connections.unwrap_or(4),
    )
    .await?;
    let executor = AsyncStatementExecutor::new(service, settings.executor.poll_policy());
    let job = SalesJob::new(
        config,
        LocalArrowEngine::new(root),
        executor,
        settings.executor.failure_policy,
    );

    let report = job.run().await?;
    println!(
        "Wrote Parquet to {} ({} rows from {} files)",
        report.transform.output, report.transform.rows_written, report.transform.files_read
    );
    print_json(&report.validation.to_json());
    Ok(())
}
