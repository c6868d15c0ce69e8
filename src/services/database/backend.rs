use crate::error::Result;
use crate::services::router::CatalogRole;
use chrono::{NaiveDate, NaiveDateTime};
use std::sync::Arc;

/// A single value as delivered by a backend, before JSON normalization.
///
/// Decimal carries the backend's textual fixed-point rendering; the result
/// normalizer converts it to a float.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Decimal(String),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    List(Vec<CellValue>),
    Map(Vec<(String, CellValue)>),
}

impl CellValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) | CellValue::Decimal(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Int(i) => Some(*i),
            CellValue::UInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    /// Scalar content rendered as text; empty for NULL and composites.
    /// Temporal values render ISO-8601, matching the normalizer.
    pub fn render_text(&self) -> String {
        match self {
            CellValue::Null | CellValue::List(_) | CellValue::Map(_) => String::new(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Int(i) => i.to_string(),
            CellValue::UInt(u) => u.to_string(),
            CellValue::Float(f) => f.to_string(),
            CellValue::Decimal(s) | CellValue::Text(s) => s.clone(),
            CellValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            CellValue::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
        }
    }
}

/// The closed set of row shapes a backend may deliver. The execution
/// pipeline resolves the shape once per result set, not per row.
#[derive(Debug, Clone)]
pub enum BackendRow {
    Mapping(Vec<(String, CellValue)>),
    Tuple(Vec<CellValue>),
}

impl BackendRow {
    /// Field lookup by column name; None for tuple rows.
    pub fn get(&self, name: &str) -> Option<&CellValue> {
        match self {
            BackendRow::Mapping(fields) => {
                fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
            }
            BackendRow::Tuple(_) => None,
        }
    }

    pub fn text(&self, name: &str) -> String {
        self.get(name).map(CellValue::render_text).unwrap_or_default()
    }

    pub fn integer(&self, name: &str) -> i64 {
        self.get(name).and_then(CellValue::as_i64).unwrap_or_default()
    }
}

/// What a statement produced: a row set, or a scalar outcome for
/// statements with no tabular result.
#[derive(Debug, Clone)]
pub enum QueryOutput {
    Rows(Vec<BackendRow>),
    Scalar(String),
}

/// Order-preserving tabular result, used where row order is significant
/// (e.g. grouping `SHOW INDEX` output).
#[derive(Debug, Clone, Default)]
pub struct TabularResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl TabularResult {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Narrow execution interface the catalog and pipeline are written against.
/// The production implementation speaks the MySQL wire protocol; tests use
/// in-memory fakes.
#[async_trait::async_trait]
pub trait QueryBackend: Send + Sync {
    /// Execute `sql`, optionally against a specific database.
    async fn run_query(&self, sql: &str, db: Option<&str>) -> Result<QueryOutput>;

    /// Execute `sql` and keep the backend's row and column order intact.
    async fn run_query_tabular(&self, sql: &str, db: Option<&str>) -> Result<TabularResult>;
}

/// The two catalogs this gateway federates.
pub struct Backends {
    pub warehouse: Arc<dyn QueryBackend>,
    pub secondary: Arc<dyn QueryBackend>,
}

impl Backends {
    pub fn new(warehouse: Arc<dyn QueryBackend>, secondary: Arc<dyn QueryBackend>) -> Self {
        Self {
            warehouse,
            secondary,
        }
    }

    pub fn for_role(&self, role: CatalogRole) -> &Arc<dyn QueryBackend> {
        match role {
            CatalogRole::Warehouse => &self.warehouse,
            CatalogRole::Secondary => &self.secondary,
        }
    }
}
