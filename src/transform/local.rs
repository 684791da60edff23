//! Transform engine over a local mirror of object storage.
//!
//! Buckets live as directories under a root, so `s3://raw/in/` reads
//! `<root>/raw/in/*.csv`. The work is synchronous Arrow/Parquet IO and runs
//! on the blocking pool.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use arrow::csv::ReaderBuilder;
use async_trait::async_trait;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use tracing::{debug, info};

use super::{
    TransformEngine, TransformJob, TransformOutput, apply_raw_schema, derive_columns, sales_schema,
    text_schema,
};
use crate::error::{LoadError, LoadResult};
use crate::location::Location;

/// Name of the single file written to the destination.
pub const OUTPUT_FILE: &str = "part-00000.parquet";

const BATCH_SIZE: usize = 8192;

#[derive(Debug, Clone)]
pub struct LocalArrowEngine {
    root: PathBuf,
}

impl LocalArrowEngine {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl TransformEngine for LocalArrowEngine {
    async fn run(&self, job: &TransformJob) -> LoadResult<TransformOutput> {
        let root = self.root.clone();
        let job = job.clone();
        tokio::task::spawn_blocking(move || run_blocking(&root, &job))
            .await
            .map_err(|e| LoadError::Transform(format!("transform task failed: {}", e)))?
    }
}

/// CSV files directly under `dir`, sorted by name for a stable row order.
fn list_csv_files(dir: &Path) -> LoadResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(LoadError::Transform(format!(
            "input path does not exist: {}",
            dir.display()
        )));
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "csv") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn run_blocking(root: &Path, job: &TransformJob) -> LoadResult<TransformOutput> {
    let input_dir = job.input.resolve_under(root);
    let output_dir = job.output.resolve_under(root);
    let files = list_csv_files(&input_dir)?;
    info!(input = %job.input, files = files.len(), "Reading raw CSV");

    let staging_dir = match &job.staging {
        Some(staging) => Location::parse(staging)
            .map(|loc| loc.resolve_under(root))
            .unwrap_or_else(|_| PathBuf::from(staging)),
        None => output_dir.clone(),
    };
    fs::create_dir_all(&staging_dir)?;
    let staging_file = staging_dir.join(format!(".{}.inprogress", OUTPUT_FILE));

    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::default()))
        .build();
    let mut writer = ArrowWriter::try_new(File::create(&staging_file)?, sales_schema(), Some(props))?;

    let mut rows_written = 0;
    for path in &files {
        // Everything is read as text so a bad value nulls one field instead
        // of failing the file; short rows are padded with nulls.
        let reader = ReaderBuilder::new(text_schema())
            .with_header(true)
            .with_truncated_rows(true)
            .with_batch_size(BATCH_SIZE)
            .build(BufReader::new(File::open(path)?))?;

        for batch in reader {
            let batch = derive_columns(&apply_raw_schema(&batch?)?)?;
            rows_written += batch.num_rows();
            writer.write(&batch)?;
        }
        debug!(file = %path.display(), "CSV file consumed");
    }
    writer.close()?;

    replace_output(&output_dir, &staging_file)?;
    info!(output = %job.output, rows = rows_written, "Wrote Parquet");

    Ok(TransformOutput {
        files_read: files.len(),
        rows_written,
        output: job.output.clone(),
    })
}

/// Clear the destination and move the finished file into place.
fn replace_output(output_dir: &Path, staging_file: &Path) -> LoadResult<()> {
    fs::create_dir_all(output_dir)?;
    for entry in fs::read_dir(output_dir)? {
        let path = entry?.path();
        if path == staging_file {
            continue;
        }
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    let target = output_dir.join(OUTPUT_FILE);
    if fs::rename(staging_file, &target).is_err() {
        // Staging on another filesystem.
        fs::copy(staging_file, &target)?;
        fs::remove_file(staging_file)?;
    }
    Ok(())
}
