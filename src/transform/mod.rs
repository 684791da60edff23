//! CSV to Parquet transform.
//!
//! The transform applies a fixed schema to raw sales rows, adds two derived
//! columns and writes one Parquet file that fully replaces the destination.
//! The engine doing the work sits behind [`TransformEngine`]; the loader only
//! relies on a complete dataset existing once `run` returns `Ok`.

pub mod local;

use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::record_batch::RecordBatch;
use arrow::compute::kernels::numeric::mul;
use arrow::compute::{CastOptions, cast, cast_with_options};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use async_trait::async_trait;

use crate::error::{LoadError, LoadResult};
use crate::location::Location;

pub use self::local::LocalArrowEngine;

/// Input column order of the raw CSV files.
pub fn raw_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("order_id", DataType::Utf8, true),
        Field::new("customer_id", DataType::Utf8, true),
        Field::new("product_id", DataType::Utf8, true),
        Field::new("quantity", DataType::Int32, true),
        Field::new("unit_price", DataType::Float64, true),
        Field::new(
            "order_timestamp",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            true,
        ),
    ]))
}

/// The raw columns read as text, before any value is parsed.
pub fn text_schema() -> SchemaRef {
    let fields: Vec<Field> = raw_schema()
        .fields()
        .iter()
        .map(|f| Field::new(f.name(), DataType::Utf8, true))
        .collect();
    Arc::new(Schema::new(fields))
}

/// Parse a text batch into [`raw_schema`] types.
///
/// A value that does not parse becomes null; the row itself is kept.
pub fn apply_raw_schema(batch: &RecordBatch) -> LoadResult<RecordBatch> {
    let schema = raw_schema();
    let options = CastOptions {
        safe: true,
        ..Default::default()
    };

    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());
    for field in schema.fields() {
        let text = batch
            .column_by_name(field.name())
            .ok_or_else(missing(field.name()))?;
        columns.push(cast_with_options(text, field.data_type(), &options)?);
    }

    Ok(RecordBatch::try_new(schema, columns)?)
}

/// Raw schema plus `revenue` and `order_date`.
pub fn sales_schema() -> SchemaRef {
    let raw = raw_schema();
    let mut fields: Vec<Field> = raw.fields().iter().map(|f| f.as_ref().clone()).collect();
    fields.push(Field::new("revenue", DataType::Float64, true));
    fields.push(Field::new("order_date", DataType::Date32, true));
    Arc::new(Schema::new(fields))
}

/// Add the derived columns to a batch of raw rows.
///
/// `revenue = quantity * unit_price` and `order_date = date(order_timestamp)`;
/// a null on either input gives a null output.
pub fn derive_columns(batch: &RecordBatch) -> LoadResult<RecordBatch> {
    let quantity = batch
        .column_by_name("quantity")
        .ok_or_else(missing("quantity"))?;
    let quantity = cast(quantity, &DataType::Float64)?;
    let unit_price = batch
        .column_by_name("unit_price")
        .ok_or_else(missing("unit_price"))?;
    let revenue = mul(&quantity, unit_price)?;

    let timestamp = batch
        .column_by_name("order_timestamp")
        .ok_or_else(missing("order_timestamp"))?;
    let order_date = cast(timestamp, &DataType::Date32)?;

    let mut columns: Vec<ArrayRef> = batch.columns().to_vec();
    columns.push(revenue);
    columns.push(order_date);

    Ok(RecordBatch::try_new(sales_schema(), columns)?)
}

fn missing(column: &str) -> impl FnOnce() -> LoadError + '_ {
    move || LoadError::Transform(format!("input batch has no column '{}'", column))
}

/// One transform run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformJob {
    /// Directory-like location holding `*.csv` files with a header row.
    pub input: Location,
    /// Destination, overwritten with a single Parquet file.
    pub output: Location,
    /// Scratch area for the in-progress file: a storage location or a
    /// plain local path.
    pub staging: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutput {
    pub files_read: usize,
    pub rows_written: usize,
    pub output: Location,
}

/// Engine that executes a [`TransformJob`].
#[async_trait]
pub trait TransformEngine: Send + Sync {
    async fn run(&self, job: &TransformJob) -> LoadResult<TransformOutput>;
}
