// Operations exposed to the tool-invocation host.
//
// Each handler takes named parameters, runs the corresponding catalog or
// execution operation, and wraps the payload in the common envelope. The
// host owns registration and transport; nothing here knows about a wire.
use crate::models::ToolResponse;
use crate::services::catalog::MetadataCatalog;
use crate::services::query_service::QueryExecutor;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub const DEFAULT_MAX_ROWS: usize = 100;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub struct ToolHandlers {
    catalog: Arc<MetadataCatalog>,
    executor: Arc<QueryExecutor>,
}

impl ToolHandlers {
    pub fn new(catalog: Arc<MetadataCatalog>, executor: Arc<QueryExecutor>) -> Self {
        Self { catalog, executor }
    }

    /// Execute a SQL statement. The pipeline's own envelope (sql,
    /// row_count, columns, data, execution_time, truncated / classified
    /// error) is returned directly rather than re-wrapped.
    pub async fn exec_query(
        &self,
        sql: Option<&str>,
        db_name: Option<&str>,
        max_rows: Option<usize>,
        timeout_secs: Option<u64>,
    ) -> Value {
        let sql = sql.unwrap_or("");
        let max_rows = max_rows.unwrap_or(DEFAULT_MAX_ROWS);
        let timeout = Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
        info!("Tool call: exec_query, db: {:?}, max_rows: {}", db_name, max_rows);

        let outcome = self.executor.execute(sql, db_name, max_rows, timeout).await;
        match serde_json::to_value(&outcome) {
            Ok(value) => value,
            Err(e) => {
                error!("Execution result serialization failed: {}", e);
                serde_json::to_value(ToolResponse::err(
                    format!("Result serialization error: {}", e),
                    "Error serializing SQL execution result",
                ))
                .unwrap_or(Value::Null)
            }
        }
    }

    pub async fn get_db_list(&self) -> ToolResponse {
        info!("Tool call: get_db_list");
        let databases = self.catalog.list_databases().await;
        ToolResponse::ok(databases, "Operation successful")
    }

    pub async fn get_db_table_list(&self, db_name: Option<&str>) -> ToolResponse {
        info!("Tool call: get_db_table_list, db: {:?}", db_name);
        let tables = self.catalog.list_tables(db_name).await;
        ToolResponse::ok(tables, "Operation successful")
    }

    pub async fn get_table_schema(
        &self,
        table_name: Option<&str>,
        db_name: Option<&str>,
    ) -> ToolResponse {
        info!("Tool call: get_table_schema, table: {:?}, db: {:?}", table_name, db_name);
        let Some(table) = required(table_name) else {
            return missing_table_name();
        };

        match self.catalog.get_table_schema(table, db_name).await {
            Some(schema) => ToolResponse::ok(schema, "Operation successful"),
            None => ToolResponse::err(
                "Table not found or has no columns",
                format!("Could not get schema for table {}", table),
            ),
        }
    }

    pub async fn get_table_comment(
        &self,
        table_name: Option<&str>,
        db_name: Option<&str>,
    ) -> ToolResponse {
        info!("Tool call: get_table_comment, table: {:?}, db: {:?}", table_name, db_name);
        let Some(table) = required(table_name) else {
            return missing_table_name();
        };

        let comment = self.catalog.get_table_comment(table, db_name).await;
        ToolResponse::ok(comment, "Operation successful")
    }

    pub async fn get_table_column_comments(
        &self,
        table_name: Option<&str>,
        db_name: Option<&str>,
    ) -> ToolResponse {
        info!(
            "Tool call: get_table_column_comments, table: {:?}, db: {:?}",
            table_name, db_name
        );
        let Some(table) = required(table_name) else {
            return missing_table_name();
        };

        let comments = self.catalog.get_column_comments(table, db_name).await;
        ToolResponse::ok(comments, "Operation successful")
    }

    pub async fn get_table_indexes(
        &self,
        table_name: Option<&str>,
        db_name: Option<&str>,
    ) -> ToolResponse {
        info!("Tool call: get_table_indexes, table: {:?}, db: {:?}", table_name, db_name);
        let Some(table) = required(table_name) else {
            return missing_table_name();
        };

        let indexes = self.catalog.get_table_indexes(table, db_name).await;
        ToolResponse::ok(indexes, "Operation successful")
    }

    pub async fn get_table_partitions(
        &self,
        table_name: Option<&str>,
        db_name: Option<&str>,
    ) -> ToolResponse {
        info!(
            "Tool call: get_table_partitions, table: {:?}, db: {:?}",
            table_name, db_name
        );
        let Some(table) = required(table_name) else {
            return missing_table_name();
        };

        let partitions = self.catalog.get_table_partitions(db_name, table).await;
        ToolResponse::ok(partitions, "Operation successful")
    }

    pub async fn get_table_relationships(&self, db_name: Option<&str>) -> ToolResponse {
        info!("Tool call: get_table_relationships, db: {:?}", db_name);
        let relationships = self.catalog.infer_relationships(db_name).await;
        ToolResponse::ok(relationships, "Operation successful")
    }

    pub async fn get_sql_patterns(&self, limit: Option<usize>) -> ToolResponse {
        let limit = limit.unwrap_or(50);
        info!("Tool call: get_sql_patterns, limit: {}", limit);
        let patterns = self.catalog.mine_sql_patterns(limit).await;
        ToolResponse::ok(patterns, "Operation successful")
    }

    pub async fn get_recent_audit_logs(
        &self,
        days: Option<i64>,
        limit: Option<usize>,
    ) -> ToolResponse {
        let days = days.unwrap_or(7);
        let limit = limit.unwrap_or(100);
        info!("Tool call: get_recent_audit_logs, days: {}, limit: {}", days, limit);
        let logs = self.catalog.get_recent_audit_logs(days, limit).await;
        ToolResponse::ok(logs, "Operation successful")
    }

    pub async fn find_tables_by_pattern(
        &self,
        pattern: Option<&str>,
        db_name: Option<&str>,
    ) -> ToolResponse {
        info!(
            "Tool call: find_tables_by_pattern, pattern: {:?}, db: {:?}",
            pattern, db_name
        );
        let Some(pattern) = required(pattern) else {
            return ToolResponse::err("Missing pattern parameter", "Operation failed");
        };

        let matches = self.catalog.find_tables_by_pattern(pattern, db_name).await;
        ToolResponse::ok(matches, "Operation successful")
    }
}

fn required(argument: Option<&str>) -> Option<&str> {
    argument.map(str::trim).filter(|s| !s.is_empty())
}

fn missing_table_name() -> ToolResponse {
    ToolResponse::err("Missing table_name parameter", "Operation failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendSettings, CatalogSettings, SecuritySettings, Settings};
    use crate::error::Result;
    use crate::services::database::backend::{
        BackendRow, Backends, CellValue, QueryBackend, QueryOutput, TabularResult,
    };
    use crate::services::metadata_cache::TtlCache;
    use crate::services::router::DatabaseRouter;
    use crate::validation::security::SqlSecurityGuard;

    struct EmptyBackend;

    #[async_trait::async_trait]
    impl QueryBackend for EmptyBackend {
        async fn run_query(&self, sql: &str, _db: Option<&str>) -> Result<QueryOutput> {
            if sql.contains("schemata") {
                return Ok(QueryOutput::Rows(vec![BackendRow::Mapping(vec![(
                    "SCHEMA_NAME".to_string(),
                    CellValue::Text("sales_dw".to_string()),
                )])]));
            }
            Ok(QueryOutput::Rows(Vec::new()))
        }

        async fn run_query_tabular(&self, _sql: &str, _db: Option<&str>) -> Result<TabularResult> {
            Ok(TabularResult::default())
        }
    }

    fn handlers() -> ToolHandlers {
        let settings = Settings {
            warehouse: BackendSettings { url: String::new() },
            secondary: BackendSettings { url: String::new() },
            catalog: CatalogSettings {
                default_database: "sales_dw".to_string(),
                cache_ttl_secs: 60,
                secondary_prefix: "mysql_catalog".to_string(),
                enable_table_hierarchy: false,
                table_hierarchy_patterns: String::new(),
                excluded_databases: "[]".to_string(),
                database_allowlist: "[]".to_string(),
            },
            security: SecuritySettings {
                enable_security_check: true,
            },
        };

        let backend: Arc<dyn QueryBackend> = Arc::new(EmptyBackend);
        let backends = Arc::new(Backends::new(backend.clone(), backend));

        let catalog = Arc::new(MetadataCatalog::new(
            &settings,
            backends.clone(),
            TtlCache::new(Duration::from_secs(60)),
        ));
        let executor = Arc::new(QueryExecutor::new(
            DatabaseRouter::new("sales_dw", "mysql_catalog"),
            SqlSecurityGuard::new(true),
            backends,
        ));

        ToolHandlers::new(catalog, executor)
    }

    #[tokio::test]
    async fn test_missing_table_name_is_an_input_error() {
        let handlers = handlers();

        let response = handlers.get_table_schema(None, Some("sales_dw")).await;
        assert!(!response.success);
        assert_eq!(
            response.error.as_deref(),
            Some("Missing table_name parameter")
        );

        let response = handlers.get_table_comment(Some("  "), None).await;
        assert!(!response.success);
    }

    #[tokio::test]
    async fn test_schema_for_unknown_table_is_a_structured_error() {
        let handlers = handlers();
        let response = handlers
            .get_table_schema(Some("ghost"), Some("sales_dw"))
            .await;

        assert!(!response.success);
        assert_eq!(
            response.error.as_deref(),
            Some("Table not found or has no columns")
        );
    }

    #[tokio::test]
    async fn test_db_list_wraps_result_in_envelope() {
        let handlers = handlers();
        let response = handlers.get_db_list().await;

        assert!(response.success);
        assert_eq!(response.result, Some(serde_json::json!(["sales_dw"])));
        assert_eq!(response.message, "Operation successful");
        assert!(!response.timestamp.is_empty());
    }

    #[tokio::test]
    async fn test_exec_query_envelope_is_passed_through() {
        let handlers = handlers();

        let value = handlers
            .exec_query(Some("SELECT 1"), None, None, None)
            .await;

        // The pipeline's envelope, not the ToolResponse shape.
        assert_eq!(value["success"], serde_json::json!(true));
        assert!(value.get("timestamp").is_none());
        assert!(value.get("row_count").is_some());

        let missing = handlers.exec_query(None, None, None, None).await;
        assert_eq!(missing["success"], serde_json::json!(false));
        assert_eq!(missing["error"], serde_json::json!("Missing SQL parameter"));
    }

    #[tokio::test]
    async fn test_unsafe_sql_is_refused_with_issue_list() {
        let handlers = handlers();

        let value = handlers
            .exec_query(Some("DROP TABLE users"), None, None, None)
            .await;

        assert_eq!(value["success"], serde_json::json!(false));
        assert!(value["security_issues"].as_array().map_or(false, |a| !a.is_empty()));
    }
}
