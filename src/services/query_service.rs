// Guarded query execution: security screen, row ceiling, timing, result
// normalization, failure classification.
use crate::error::Error;
use crate::services::database::backend::{BackendRow, Backends, QueryOutput};
use crate::services::normalize::{normalize_mapping, normalize_tuple};
use crate::services::router::DatabaseRouter;
use crate::validation::security::{SecurityIssue, SqlSecurityGuard};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Outcome of one execution request. Serialized as-is into the tool
/// payload; the outer envelope passes it through without re-wrapping.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ExecutionOutcome {
    Completed(QueryExecution),
    Scalar(ScalarExecution),
    Failed(ExecutionFailure),
}

#[derive(Debug, Serialize)]
pub struct QueryExecution {
    pub success: bool,
    pub sql: String,
    pub row_count: usize,
    pub columns: Vec<String>,
    pub data: Vec<Value>,
    /// Wall-clock seconds spent in the backend call.
    pub execution_time: f64,
    /// True when the backend returned more rows than the requested cap,
    /// independent of any LIMIT injected into the statement.
    pub truncated: bool,
}

/// Non-tabular backend results wrapped as a string payload.
#[derive(Debug, Serialize)]
pub struct ScalarExecution {
    pub success: bool,
    pub sql: String,
    pub result: String,
    pub execution_time: f64,
}

#[derive(Debug, Serialize)]
pub struct ExecutionFailure {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<ErrorDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_issues: Option<Vec<SecurityIssue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub suggestion: String,
}

/// Backend failure categories, derived by message sniffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    Syntax,
    NotFound,
    Unknown,
}

impl ErrorKind {
    pub fn classify(message: &str) -> Self {
        let lowered = message.to_lowercase();
        if lowered.contains("timeout") {
            ErrorKind::Timeout
        } else if lowered.contains("syntax") {
            ErrorKind::Syntax
        } else if lowered.contains("not found") || lowered.contains("doesn't exist") {
            ErrorKind::NotFound
        } else {
            ErrorKind::Unknown
        }
    }

    pub fn suggestion(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "Query timed out, please optimize SQL or increase timeout",
            ErrorKind::Syntax => "SQL syntax error, please check syntax",
            ErrorKind::NotFound => "Table or column not found, please check table and column names",
            ErrorKind::Unknown => "Please check the SQL statement and try simplifying the query",
        }
    }
}

pub struct QueryExecutor {
    router: DatabaseRouter,
    guard: SqlSecurityGuard,
    backends: Arc<Backends>,
}

impl QueryExecutor {
    pub fn new(router: DatabaseRouter, guard: SqlSecurityGuard, backends: Arc<Backends>) -> Self {
        Self {
            router,
            guard,
            backends,
        }
    }

    /// Execute `sql` against the resolved backend, capping the returned
    /// rows at `max_rows` and abandoning the call after `timeout`.
    pub async fn execute(
        &self,
        sql: &str,
        db_name: Option<&str>,
        max_rows: usize,
        timeout: Duration,
    ) -> ExecutionOutcome {
        if sql.trim().is_empty() {
            return ExecutionOutcome::Failed(ExecutionFailure {
                success: false,
                error: "Missing SQL parameter".to_string(),
                message: Some("Please provide the SQL query to execute".to_string()),
                error_details: None,
                security_issues: None,
                sql: None,
                db_name: None,
            });
        }

        let verdict = self.guard.screen(sql);
        if !verdict.is_safe {
            info!("SQL rejected by security screen: {}", sql);
            return ExecutionOutcome::Failed(ExecutionFailure {
                success: false,
                error: "SQL security check failed".to_string(),
                message: Some(
                    "Query contains unsafe operations and cannot be executed".to_string(),
                ),
                error_details: None,
                security_issues: Some(verdict.security_issues),
                sql: Some(sql.to_string()),
                db_name: None,
            });
        }

        let prepared = apply_row_limit(sql, max_rows);

        let route = self.router.resolve(db_name);
        let backend = self.backends.for_role(route.role);

        let started = Instant::now();
        let outcome = tokio::time::timeout(
            timeout,
            backend.run_query(&prepared, Some(&route.database)),
        )
        .await
        .map_err(|_| Error::Timeout(timeout.as_secs()));

        let elapsed = started.elapsed().as_secs_f64();

        let output = match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(e)) | Err(e) => {
                let message = e.to_string();
                let kind = ErrorKind::classify(&message);
                error!("Query execution failed ({:?}): {}", kind, message);
                return ExecutionOutcome::Failed(ExecutionFailure {
                    success: false,
                    error: message,
                    message: None,
                    error_details: Some(ErrorDetails {
                        kind,
                        suggestion: kind.suggestion().to_string(),
                    }),
                    security_issues: None,
                    sql: Some(prepared),
                    db_name: Some(route.database),
                });
            }
        };

        match output {
            QueryOutput::Rows(rows) => {
                let row_count = rows.len();
                let (columns, data) = shape_rows(&rows, max_rows);

                ExecutionOutcome::Completed(QueryExecution {
                    success: true,
                    sql: prepared,
                    row_count,
                    columns,
                    data,
                    execution_time: elapsed,
                    truncated: row_count > max_rows,
                })
            }
            QueryOutput::Scalar(result) => ExecutionOutcome::Scalar(ScalarExecution {
                success: true,
                sql: prepared,
                result,
                execution_time: elapsed,
            }),
        }
    }
}

/// Append `LIMIT max_rows` to SELECT statements that carry no limit of
/// their own. Textual, not a parse: any occurrence of the `limit` token
/// (even inside a subquery) suppresses injection, which can leave a
/// statement uncapped but never produces invalid double-limit SQL.
fn apply_row_limit(sql: &str, max_rows: usize) -> String {
    let lowered = sql.trim().to_lowercase();
    if lowered.starts_with("select") && !lowered.contains("limit") {
        let trimmed = sql.trim().trim_end_matches(';').trim_end();
        return format!("{} LIMIT {}", trimmed, max_rows);
    }
    sql.to_string()
}

/// Resolve the row shape once per result set and normalize every row.
/// Column names come from the first row; tuple rows without column
/// metadata normalize to arrays.
fn shape_rows(rows: &[BackendRow], max_rows: usize) -> (Vec<String>, Vec<Value>) {
    let Some(first) = rows.first() else {
        return (Vec::new(), Vec::new());
    };

    match first {
        BackendRow::Mapping(fields) => {
            let columns: Vec<String> = fields.iter().map(|(name, _)| name.clone()).collect();
            let data = rows
                .iter()
                .take(max_rows)
                .map(|row| match row {
                    BackendRow::Mapping(fields) => Value::Object(normalize_mapping(fields)),
                    BackendRow::Tuple(cells) => Value::Array(normalize_tuple(cells)),
                })
                .collect();
            (columns, data)
        }
        BackendRow::Tuple(_) => {
            let data = rows
                .iter()
                .take(max_rows)
                .map(|row| match row {
                    BackendRow::Tuple(cells) => Value::Array(normalize_tuple(cells)),
                    BackendRow::Mapping(fields) => Value::Object(normalize_mapping(fields)),
                })
                .collect();
            (Vec::new(), data)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::services::database::backend::{CellValue, QueryBackend, TabularResult};
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticBackend {
        output: QueryOutput,
        calls: AtomicUsize,
    }

    impl StaticBackend {
        fn rows(rows: Vec<BackendRow>) -> Self {
            Self {
                output: QueryOutput::Rows(rows),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl QueryBackend for StaticBackend {
        async fn run_query(&self, _sql: &str, _db: Option<&str>) -> Result<QueryOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.output.clone())
        }

        async fn run_query_tabular(&self, _sql: &str, _db: Option<&str>) -> Result<TabularResult> {
            Ok(TabularResult::default())
        }
    }

    struct FailingBackend {
        message: &'static str,
    }

    #[async_trait::async_trait]
    impl QueryBackend for FailingBackend {
        async fn run_query(&self, _sql: &str, _db: Option<&str>) -> Result<QueryOutput> {
            Err(Error::Backend(self.message.to_string()))
        }

        async fn run_query_tabular(&self, _sql: &str, _db: Option<&str>) -> Result<TabularResult> {
            Err(Error::Backend(self.message.to_string()))
        }
    }

    struct HangingBackend;

    #[async_trait::async_trait]
    impl QueryBackend for HangingBackend {
        async fn run_query(&self, _sql: &str, _db: Option<&str>) -> Result<QueryOutput> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(QueryOutput::Rows(Vec::new()))
        }

        async fn run_query_tabular(&self, _sql: &str, _db: Option<&str>) -> Result<TabularResult> {
            Ok(TabularResult::default())
        }
    }

    fn executor_with(backend: Arc<dyn QueryBackend>) -> QueryExecutor {
        let backends = Arc::new(Backends::new(backend.clone(), backend));
        QueryExecutor::new(
            DatabaseRouter::new("sales_dw", "mysql_catalog"),
            SqlSecurityGuard::new(true),
            backends,
        )
    }

    fn sample_rows() -> Vec<BackendRow> {
        vec![
            BackendRow::Mapping(vec![
                ("id".to_string(), CellValue::Int(1)),
                ("amount".to_string(), CellValue::Decimal("12.50".to_string())),
                (
                    "day".to_string(),
                    CellValue::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
                ),
            ]),
            BackendRow::Mapping(vec![
                ("id".to_string(), CellValue::Int(2)),
                ("amount".to_string(), CellValue::Decimal("7.25".to_string())),
                (
                    "day".to_string(),
                    CellValue::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()),
                ),
            ]),
        ]
    }

    #[test]
    fn test_limit_injection() {
        assert_eq!(
            apply_row_limit("SELECT * FROM t", 50),
            "SELECT * FROM t LIMIT 50"
        );
        assert_eq!(
            apply_row_limit("SELECT * FROM t;", 50),
            "SELECT * FROM t LIMIT 50"
        );
        // Existing LIMIT anywhere in the text suppresses injection.
        assert_eq!(
            apply_row_limit("SELECT * FROM t LIMIT 10", 50),
            "SELECT * FROM t LIMIT 10"
        );
        assert_eq!(
            apply_row_limit(
                "SELECT * FROM (SELECT id FROM t LIMIT 5) sub",
                50
            ),
            "SELECT * FROM (SELECT id FROM t LIMIT 5) sub"
        );
        // Non-SELECT statements are left alone.
        assert_eq!(apply_row_limit("SHOW TABLES", 50), "SHOW TABLES");
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(
            ErrorKind::classify("Query timeout after 30 seconds"),
            ErrorKind::Timeout
        );
        assert_eq!(
            ErrorKind::classify("You have an error in your SQL syntax"),
            ErrorKind::Syntax
        );
        assert_eq!(
            ErrorKind::classify("Table 'demo.ghost' doesn't exist"),
            ErrorKind::NotFound
        );
        assert_eq!(ErrorKind::classify("disk is on fire"), ErrorKind::Unknown);
    }

    #[tokio::test]
    async fn test_empty_sql_is_an_input_error() {
        let executor = executor_with(Arc::new(StaticBackend::rows(Vec::new())));
        let outcome = executor
            .execute("  ", None, 100, Duration::from_secs(30))
            .await;

        match outcome {
            ExecutionOutcome::Failed(failure) => {
                assert_eq!(failure.error, "Missing SQL parameter");
                assert!(failure.error_details.is_none());
            }
            _ => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn test_unsafe_sql_never_reaches_backend() {
        let backend = Arc::new(StaticBackend::rows(Vec::new()));
        let executor = executor_with(backend.clone());

        let outcome = executor
            .execute("DROP TABLE t", None, 100, Duration::from_secs(30))
            .await;

        match outcome {
            ExecutionOutcome::Failed(failure) => {
                assert_eq!(failure.error, "SQL security check failed");
                let issues = failure.security_issues.expect("issues attached");
                assert!(!issues.is_empty());
            }
            _ => panic!("expected failure"),
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_successful_execution_normalizes_rows() {
        let executor = executor_with(Arc::new(StaticBackend::rows(sample_rows())));

        let outcome = executor
            .execute("SELECT * FROM orders", Some("sales_dw"), 100, Duration::from_secs(30))
            .await;

        match outcome {
            ExecutionOutcome::Completed(execution) => {
                assert!(execution.success);
                assert_eq!(execution.sql, "SELECT * FROM orders LIMIT 100");
                assert_eq!(execution.row_count, 2);
                assert_eq!(execution.columns, vec!["id", "amount", "day"]);
                assert!(!execution.truncated);
                assert_eq!(execution.data[0]["amount"], serde_json::json!(12.5));
                assert_eq!(execution.data[0]["day"], serde_json::json!("2024-01-01"));
            }
            _ => panic!("expected completion"),
        }
    }

    #[tokio::test]
    async fn test_truncation_reflects_backend_count() {
        let executor = executor_with(Arc::new(StaticBackend::rows(sample_rows())));

        let outcome = executor
            .execute(
                // Statement already limited, so no injection happens and
                // the backend count exceeds the cap.
                "SELECT * FROM orders LIMIT 99",
                None,
                1,
                Duration::from_secs(30),
            )
            .await;

        match outcome {
            ExecutionOutcome::Completed(execution) => {
                assert_eq!(execution.row_count, 2);
                assert_eq!(execution.data.len(), 1);
                assert!(execution.truncated);
            }
            _ => panic!("expected completion"),
        }
    }

    #[tokio::test]
    async fn test_tuple_rows_normalize_to_arrays() {
        let rows = vec![
            BackendRow::Tuple(vec![CellValue::Int(1), CellValue::Text("a".to_string())]),
            BackendRow::Tuple(vec![CellValue::Int(2), CellValue::Text("b".to_string())]),
        ];
        let executor = executor_with(Arc::new(StaticBackend::rows(rows)));

        let outcome = executor
            .execute("SELECT id, tag FROM t", None, 100, Duration::from_secs(30))
            .await;

        match outcome {
            ExecutionOutcome::Completed(execution) => {
                assert!(execution.columns.is_empty());
                assert_eq!(execution.data[0], serde_json::json!([1, "a"]));
            }
            _ => panic!("expected completion"),
        }
    }

    #[tokio::test]
    async fn test_backend_failure_is_classified_with_context() {
        let executor = executor_with(Arc::new(FailingBackend {
            message: "Table 'sales_dw.ghost' doesn't exist",
        }));

        let outcome = executor
            .execute("SELECT * FROM ghost", Some("sales_dw"), 100, Duration::from_secs(30))
            .await;

        match outcome {
            ExecutionOutcome::Failed(failure) => {
                let details = failure.error_details.expect("details attached");
                assert_eq!(details.kind, ErrorKind::NotFound);
                assert_eq!(failure.sql.as_deref(), Some("SELECT * FROM ghost LIMIT 100"));
                assert_eq!(failure.db_name.as_deref(), Some("sales_dw"));
            }
            _ => panic!("expected failure"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_abandons_backend_call() {
        let executor = executor_with(Arc::new(HangingBackend));

        let outcome = executor
            .execute("SELECT * FROM slow", None, 100, Duration::from_secs(1))
            .await;

        match outcome {
            ExecutionOutcome::Failed(failure) => {
                let details = failure.error_details.expect("details attached");
                assert_eq!(details.kind, ErrorKind::Timeout);
            }
            _ => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn test_prefixed_database_routes_to_secondary() {
        let warehouse = Arc::new(StaticBackend::rows(Vec::new()));
        let secondary = Arc::new(StaticBackend::rows(sample_rows()));
        let backends = Arc::new(Backends::new(warehouse.clone(), secondary.clone()));
        let executor = QueryExecutor::new(
            DatabaseRouter::new("sales_dw", "mysql_catalog"),
            SqlSecurityGuard::new(true),
            backends,
        );

        let outcome = executor
            .execute(
                "SELECT * FROM t",
                Some("mysql_catalog.bigdata"),
                100,
                Duration::from_secs(30),
            )
            .await;

        assert!(matches!(outcome, ExecutionOutcome::Completed(_)));
        assert_eq!(warehouse.calls.load(Ordering::SeqCst), 0);
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 1);
    }
}
