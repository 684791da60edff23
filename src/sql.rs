//! SQL rendering for the sales fact table.
//!
//! Every statement the job issues is one of a small, fixed set. They are
//! modelled as values and rendered through [`ToSql`] so the loader, the
//! validator and dry runs all see the same text.

/// Trait for converting statements to SQL.
pub trait ToSql {
    /// Convert this node to a SQL string.
    fn to_sql(&self) -> String;
}

/// Warehouse column types used by the fact table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Varchar(u16),
    Int,
    Double,
    Timestamp,
    Date,
}

impl ToSql for ColumnType {
    fn to_sql(&self) -> String {
        match self {
            ColumnType::Varchar(n) => format!("varchar({})", n),
            ColumnType::Int => "int".to_string(),
            ColumnType::Double => "double precision".to_string(),
            ColumnType::Timestamp => "timestamp".to_string(),
            ColumnType::Date => "date".to_string(),
        }
    }
}

/// Fact table columns in load order. Matches the Parquet output schema.
pub const SALES_COLUMNS: [(&str, ColumnType); 8] = [
    ("order_id", ColumnType::Varchar(64)),
    ("customer_id", ColumnType::Varchar(64)),
    ("product_id", ColumnType::Varchar(64)),
    ("quantity", ColumnType::Int),
    ("unit_price", ColumnType::Double),
    ("order_timestamp", ColumnType::Timestamp),
    ("revenue", ColumnType::Double),
    ("order_date", ColumnType::Date),
];

/// A schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// `sales.sales_fact`
    pub fn sales_fact() -> Self {
        Self::new("sales", "sales_fact")
    }
}

impl ToSql for TableRef {
    fn to_sql(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

/// Statements issued by the loader, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatement {
    CreateSchema { schema: String },
    CreateTable { table: TableRef },
    Truncate { table: TableRef },
    CopyParquet {
        table: TableRef,
        source: String,
        iam_role: String,
    },
}

impl ToSql for LoadStatement {
    fn to_sql(&self) -> String {
        match self {
            LoadStatement::CreateSchema { schema } => {
                format!("create schema if not exists {};", schema)
            }
            LoadStatement::CreateTable { table } => {
                let columns: Vec<String> = SALES_COLUMNS
                    .iter()
                    .map(|(name, ty)| format!("    {:<15} {}", name, ty.to_sql()))
                    .collect();
                format!(
                    "create table if not exists {} (\n{}\n)",
                    table.to_sql(),
                    columns.join(",\n")
                )
            }
            LoadStatement::Truncate { table } => {
                format!("truncate table {};", table.to_sql())
            }
            LoadStatement::CopyParquet {
                table,
                source,
                iam_role,
            } => format!(
                "copy {}\nfrom '{}'\niam_role '{}'\nformat parquet;",
                table.to_sql(),
                escape_literal(source),
                escape_literal(iam_role)
            ),
        }
    }
}

/// Read-only checks run after a load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationQuery {
    RowCount(TableRef),
    TotalRevenue(TableRef),
    RevenueByDay(TableRef),
}

impl ToSql for ValidationQuery {
    fn to_sql(&self) -> String {
        match self {
            ValidationQuery::RowCount(t) => {
                format!("select count(*) as c from {};", t.to_sql())
            }
            ValidationQuery::TotalRevenue(t) => format!(
                "select to_char(sum(revenue), 'FM999999990.00') as total_revenue from {};",
                t.to_sql()
            ),
            // Numeric sums travel as text so every backend reports them the same way.
            ValidationQuery::RevenueByDay(t) => format!(
                "select order_date, count(*) as n, sum(revenue)::numeric(18,2)::varchar as revenue from {} group by 1 order by 1;",
                t.to_sql()
            ),
        }
    }
}

/// Escape a value for use inside a single-quoted SQL literal.
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}
