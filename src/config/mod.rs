//! Run configuration resolution.
//!
//! Turns raw job arguments into an immutable [`RunConfig`]. Every required
//! setting is checked before anything else happens so a misconfigured run
//! never touches storage or the warehouse.

pub mod args;
pub mod settings;

use serde_json::json;

use self::args::{ArgMap, SettingSpec, parse_args};
use crate::error::{LoadError, LoadResult};
use crate::location::Location;

pub use self::settings::JobSettings;

/// Resolved, read-only settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub raw_bucket: String,
    pub raw_prefix: String,
    pub processed_bucket: String,
    pub processed_prefix: String,
    pub workgroup: String,
    pub database: String,
    pub secret_arn: String,
    pub iam_role_arn: String,
    pub temp_dir: Option<String>,
}

/// Lookup table for every logical job setting.
fn setting_specs() -> [SettingSpec; 9] {
    [
        SettingSpec::new("raw_bucket", &["raw_bucket", "RAW_BUCKET"]).required(),
        SettingSpec::new("raw_prefix", &["raw_prefix", "RAW_PREFIX"]).with_default("raw/"),
        SettingSpec::new("processed_bucket", &["processed_bucket", "PROCESSED_BUCKET"]).required(),
        SettingSpec::new("processed_prefix", &["processed_prefix", "PROCESSED_PREFIX"])
            .with_default("processed/sales/"),
        SettingSpec::new("redshift_workgroup", &["redshift_workgroup", "REDSHIFT_WORKGROUP"])
            .required(),
        SettingSpec::new("redshift_db", &["redshift_db", "REDSHIFT_DB"]).with_default("dev"),
        SettingSpec::new("redshift_secret_arn", &["redshift_secret_arn", "REDSHIFT_SECRET_ARN"])
            .required(),
        SettingSpec::new(
            "redshift_iam_role_arn",
            &["redshift_iam_role_arn", "REDSHIFT_IAM_ROLE_ARN"],
        )
        .required(),
        SettingSpec::new("temp_dir", &["TempDir", "TEMP_DIR"]),
    ]
}

impl RunConfig {
    /// Resolve from a raw token sequence (typically the process argv).
    pub fn from_tokens<I, S>(tokens: I) -> LoadResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::resolve(&parse_args(tokens))
    }

    /// Resolve from parsed arguments, reporting every missing required name.
    pub fn resolve(args: &ArgMap) -> LoadResult<Self> {
        let specs = setting_specs();
        let mut missing = Vec::new();
        let mut values: Vec<Option<String>> = Vec::with_capacity(specs.len());

        for spec in &specs {
            let value = spec.lookup(args).filter(|v| !v.is_empty());
            if spec.required && value.is_none() {
                missing.push(spec.name.to_string());
            }
            values.push(value.map(str::to_string));
        }

        if !missing.is_empty() {
            return Err(LoadError::MissingArgs(missing));
        }

        let mut values = values.into_iter();
        let mut next = || values.next().flatten().unwrap_or_default();

        let raw_bucket = next();
        let raw_prefix = normalize_prefix(&next());
        let processed_bucket = next();
        let processed_prefix = normalize_prefix(&next());
        let workgroup = next();
        let database = next();
        let secret_arn = next();
        let iam_role_arn = next();
        let temp_dir = Some(next()).filter(|v| !v.is_empty());

        Ok(Self {
            raw_bucket,
            raw_prefix,
            processed_bucket,
            processed_prefix,
            workgroup,
            database,
            secret_arn,
            iam_role_arn,
            temp_dir,
        })
    }

    /// `s3://<raw_bucket>/<raw_prefix>`
    pub fn raw_path(&self) -> String {
        format!("s3://{}/{}", self.raw_bucket, self.raw_prefix)
    }

    /// Wildcard matching every CSV file under the raw path.
    pub fn input_glob(&self) -> String {
        format!("{}*.csv", self.raw_path())
    }

    /// `s3://<processed_bucket>/<processed_prefix>`
    pub fn processed_path(&self) -> String {
        format!("s3://{}/{}", self.processed_bucket, self.processed_prefix)
    }

    pub fn raw_location(&self) -> LoadResult<Location> {
        Location::parse(&self.raw_path())
    }

    pub fn processed_location(&self) -> LoadResult<Location> {
        Location::parse(&self.processed_path())
    }

    /// Operator-facing summary printed before the run starts.
    pub fn summary(&self) -> serde_json::Value {
        json!({
            "resolved_args": {
                "raw_bucket": self.raw_bucket,
                "raw_prefix": self.raw_prefix,
                "processed_bucket": self.processed_bucket,
                "processed_prefix": self.processed_prefix,
                "redshift_workgroup": self.workgroup,
                "redshift_db": self.database,
                "redshift_secret_arn": self.secret_arn,
                "redshift_iam_role_arn": self.iam_role_arn,
                "temp_dir": self.temp_dir,
            },
            "paths": {
                "raw_path": self.raw_path(),
                "processed_path": self.processed_path(),
            }
        })
    }
}

/// Strip leading separators and enforce a single trailing one.
///
/// Empty input stays empty.
pub fn normalize_prefix(prefix: &str) -> String {
    let mut out = prefix.trim_start_matches('/').to_string();
    if !out.is_empty() && !out.ends_with('/') {
        out.push('/');
    }
    out
}
