// Federated metadata catalog over the warehouse and the secondary
// relational catalog.
//
// Every lookup degrades to an empty result on backend failure: this is a
// browsing surface and callers never need to distinguish "empty" from
// "error" through exceptions. Failures are logged and retried on the next
// cache miss.
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::models::{
    AuditLogEntry, ColumnComments, ColumnInfo, IndexInfo, PartitionDetail, PartitionInfo,
    Relationship, SqlPattern, TableBrief, TableSchema,
};
use crate::services::database::backend::{
    BackendRow, Backends, CellValue, QueryBackend, QueryOutput,
};
use crate::services::hierarchy::HierarchyClassifier;
use crate::services::metadata_cache::TtlCache;
use crate::services::router::{DatabaseRouter, Route};
use chrono::{Duration as ChronoDuration, Utc};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};

const MAX_EXAMPLES_PER_PATTERN: usize = 3;
const TOP_PATTERNS_PER_TYPE: usize = 3;
const AUDIT_WINDOW_DAYS: i64 = 30;

const KNOWN_STATEMENT_TYPES: &[&str] = &[
    "SELECT", "INSERT", "UPDATE", "DELETE", "CREATE", "DROP", "ALTER", "TRUNCATE", "WITH",
];

pub struct MetadataCatalog {
    backends: Arc<Backends>,
    router: DatabaseRouter,
    cache: TtlCache<Value>,
    classifier: HierarchyClassifier,
    hierarchy_enabled: bool,
    excluded_databases: Vec<String>,
    database_allowlist: Vec<String>,
    secondary_prefix: String,
    default_database: String,
}

impl MetadataCatalog {
    /// The cache is constructed by the caller so its TTL (and clock, in
    /// tests) is explicit rather than process-global state.
    pub fn new(settings: &Settings, backends: Arc<Backends>, cache: TtlCache<Value>) -> Self {
        let hierarchy_enabled = settings.catalog.enable_table_hierarchy;
        let classifier = if hierarchy_enabled {
            HierarchyClassifier::from_patterns(&settings.catalog.table_hierarchy_patterns())
        } else {
            HierarchyClassifier::from_patterns(&[])
        };

        Self {
            backends,
            router: DatabaseRouter::new(
                settings.catalog.default_database.clone(),
                &settings.catalog.secondary_prefix,
            ),
            cache,
            classifier,
            hierarchy_enabled,
            excluded_databases: settings.catalog.excluded_databases(),
            database_allowlist: settings.catalog.database_allowlist(),
            secondary_prefix: settings.catalog.secondary_prefix.clone(),
            default_database: settings.catalog.default_database.clone(),
        }
    }

    /// All databases visible through the gateway: allow-listed warehouse
    /// schemas first, then secondary-catalog schemas re-labeled with the
    /// qualifier prefix.
    pub async fn list_databases(&self) -> Vec<String> {
        match self
            .cached("databases".to_string(), || self.fetch_databases())
            .await
        {
            Ok(databases) => databases,
            Err(e) => {
                error!("Error getting database list: {}", e);
                Vec::new()
            }
        }
    }

    /// Base tables (no views) of one database, with comments. Hierarchy
    /// classification is applied when enabled.
    pub async fn list_tables(&self, db: Option<&str>) -> Vec<TableBrief> {
        let logical = self.router.logical_name(db);
        if logical.is_empty() {
            warn!("Database name not specified");
            return Vec::new();
        }

        match self
            .cached(format!("tables:{}", logical), || self.fetch_tables(db))
            .await
        {
            Ok(tables) => tables,
            Err(e) => {
                error!("Error getting table list for {}: {}", logical, e);
                Vec::new()
            }
        }
    }

    /// Full schema for one table. `None` is the canonical not-found signal
    /// (missing table and columnless table look the same) and is never
    /// cached, so a later appearance of the table is picked up.
    pub async fn get_table_schema(&self, table: &str, db: Option<&str>) -> Option<TableSchema> {
        let logical = self.router.logical_name(db);
        if logical.is_empty() {
            warn!("Database name not specified");
            return None;
        }

        let key = format!("schema:{}:{}", logical, table);
        if let Some(value) = self.cache.get(&key) {
            return serde_json::from_value(value).ok();
        }

        match self.fetch_table_schema(table, db, &logical).await {
            Ok(Some(schema)) => {
                if let Ok(value) = serde_json::to_value(&schema) {
                    self.cache.insert(&key, value);
                }
                Some(schema)
            }
            Ok(None) => {
                warn!("Table {}.{} does not exist or has no columns", logical, table);
                None
            }
            Err(e) => {
                error!("Error getting table schema for {}.{}: {}", logical, table, e);
                None
            }
        }
    }

    pub async fn get_table_comment(&self, table: &str, db: Option<&str>) -> String {
        let logical = self.router.logical_name(db);
        if logical.is_empty() {
            warn!("Database name not specified");
            return String::new();
        }

        match self
            .cached(format!("table_comment:{}:{}", logical, table), || {
                self.fetch_table_comment(table, db)
            })
            .await
        {
            Ok(comment) => comment,
            Err(e) => {
                error!("Error getting table comment for {}.{}: {}", logical, table, e);
                String::new()
            }
        }
    }

    pub async fn get_column_comments(&self, table: &str, db: Option<&str>) -> ColumnComments {
        let logical = self.router.logical_name(db);
        if logical.is_empty() {
            warn!("Database name not specified");
            return ColumnComments::new();
        }

        match self
            .cached(format!("column_comments:{}:{}", logical, table), || {
                self.fetch_column_comments(table, db)
            })
            .await
        {
            Ok(comments) => comments,
            Err(e) => {
                error!("Error getting column comments for {}.{}: {}", logical, table, e);
                ColumnComments::new()
            }
        }
    }

    pub async fn get_table_indexes(&self, table: &str, db: Option<&str>) -> Vec<IndexInfo> {
        let logical = self.router.logical_name(db);
        if logical.is_empty() {
            warn!("Database name not specified");
            return Vec::new();
        }

        match self
            .cached(format!("indexes:{}:{}", logical, table), || {
                self.fetch_table_indexes(table, db)
            })
            .await
        {
            Ok(indexes) => indexes,
            Err(e) => {
                error!("Error getting indexes for {}.{}: {}", logical, table, e);
                Vec::new()
            }
        }
    }

    /// Partition descriptors, or the empty structure for unpartitioned
    /// tables. Never an error from the caller's point of view.
    pub async fn get_table_partitions(&self, db: Option<&str>, table: &str) -> PartitionInfo {
        let logical = self.router.logical_name(db);
        if logical.is_empty() {
            warn!("Database name not specified");
            return PartitionInfo::default();
        }

        match self
            .cached(format!("partitions:{}:{}", logical, table), || {
                self.fetch_table_partitions(table, db)
            })
            .await
        {
            Ok(info) => info,
            Err(e) => {
                error!("Error getting partitions for {}.{}: {}", logical, table, e);
                PartitionInfo::default()
            }
        }
    }

    /// Foreign-key candidates from column naming conventions: a column
    /// ending in `_id` is proposed against every other table exposing an
    /// `id` column. Quadratic in table count; catalogs are small and the
    /// result is cached.
    pub async fn infer_relationships(&self, db: Option<&str>) -> Vec<Relationship> {
        let logical = self.router.logical_name(db);
        if logical.is_empty() {
            warn!("Database name not specified");
            return Vec::new();
        }

        match self
            .cached(format!("relationships:{}", logical), || {
                self.fetch_relationships(db)
            })
            .await
        {
            Ok(relationships) => relationships,
            Err(e) => {
                error!("Error inferring relationships for {}: {}", logical, e);
                Vec::new()
            }
        }
    }

    /// Recent successfully completed statements from the warehouse audit
    /// trail, read-only traffic only, newest first. Introspection probes
    /// (SHOW/DESC/EXPLAIN/SELECT 1) are filtered out at the source.
    pub async fn get_recent_audit_logs(&self, days: i64, limit: usize) -> Vec<AuditLogEntry> {
        match self.fetch_audit_logs(days, limit).await {
            Ok(entries) => entries,
            Err(e) => {
                error!("Error getting audit logs: {}", e);
                Vec::new()
            }
        }
    }

    /// Cluster recent audit-log statements into generalized SQL patterns.
    /// Falls back to two fixed generic patterns when the audit window is
    /// empty or mining fails; this operation never raises.
    pub async fn mine_sql_patterns(&self, limit: usize) -> Vec<SqlPattern> {
        let key = format!("sql_patterns:{}", limit);
        if let Some(value) = self.cache.get(&key) {
            if let Ok(patterns) = serde_json::from_value(value) {
                return patterns;
            }
        }

        let patterns = self.compute_sql_patterns(limit).await;
        if let Ok(value) = serde_json::to_value(&patterns) {
            self.cache.insert(&key, value);
        }
        patterns
    }

    /// Tables whose name matches `pattern`, in one database or across all
    /// target databases. Returns `(database, table)` pairs.
    pub async fn find_tables_by_pattern(
        &self,
        pattern: &str,
        db: Option<&str>,
    ) -> Vec<(String, String)> {
        let regex = match Regex::new(pattern) {
            Ok(regex) => regex,
            Err(e) => {
                error!("Invalid table name pattern {:?}: {}", pattern, e);
                return Vec::new();
            }
        };

        let databases = match db {
            Some(name) => vec![name.to_string()],
            None => self.target_databases().await,
        };

        let mut matches = Vec::new();
        for database in databases {
            for table in self.list_tables(Some(&database)).await {
                if regex.is_match(&table.table_name) {
                    matches.push((database.clone(), table.table_name));
                }
            }
        }
        matches
    }

    /// Databases metadata operations iterate over: the process default
    /// first, then everything else visible, minus the excluded list.
    pub async fn target_databases(&self) -> Vec<String> {
        let mut databases = self.list_databases().await;

        if let Some(pos) = databases.iter().position(|db| db == &self.default_database) {
            let default = databases.remove(pos);
            databases.insert(0, default);
        }

        databases.retain(|db| !self.excluded_databases.contains(db));
        databases
    }

    // ------------------------------------------------------------------
    // Fetch paths (cache misses)
    // ------------------------------------------------------------------

    async fn fetch_databases(&self) -> Result<Vec<String>> {
        let query = if self.database_allowlist.is_empty() {
            "SELECT SCHEMA_NAME FROM information_schema.schemata ORDER BY SCHEMA_NAME".to_string()
        } else {
            let quoted: Vec<String> = self
                .database_allowlist
                .iter()
                .map(|db| format!("'{}'", db))
                .collect();
            format!(
                "SELECT SCHEMA_NAME FROM information_schema.schemata \
                 WHERE SCHEMA_NAME IN ({}) ORDER BY SCHEMA_NAME",
                quoted.join(", ")
            )
        };

        let mut databases: Vec<String> = rows_of(self.backends.warehouse.run_query(&query, None).await?)
            .iter()
            .map(|row| row.text("SCHEMA_NAME"))
            .filter(|name| !name.is_empty())
            .collect();

        if self.database_allowlist.is_empty() {
            databases.retain(|db| !self.excluded_databases.contains(db));
        }
        info!("Retrieved database list: {:?}", databases);

        let secondary: Vec<String> = rows_of(self.backends.secondary.run_query(&query, None).await?)
            .iter()
            .map(|row| row.text("SCHEMA_NAME"))
            .filter(|name| !name.is_empty())
            .map(|name| format!("{}.{}", self.secondary_prefix, name))
            .collect();

        if !secondary.is_empty() {
            info!("Retrieved secondary catalog database list: {:?}", secondary);
            databases.extend(secondary);
        }

        Ok(databases)
    }

    async fn fetch_tables(&self, db: Option<&str>) -> Result<Vec<TableBrief>> {
        let route = self.router.resolve(db);
        let query = format!(
            "SELECT TABLE_NAME, TABLE_COMMENT FROM information_schema.tables \
             WHERE TABLE_SCHEMA = '{}' AND TABLE_TYPE = 'BASE TABLE'",
            route.database
        );

        let rows = rows_of(
            self.backend(&route)
                .run_query(&query, Some(&route.database))
                .await?,
        );

        let mut tables: Vec<TableBrief> = rows
            .iter()
            .map(|row| TableBrief {
                table_name: row.text("TABLE_NAME"),
                table_comment: row.text("TABLE_COMMENT"),
            })
            .collect();

        if self.hierarchy_enabled && !self.classifier.is_empty() && !tables.is_empty() {
            tables = self.order_by_hierarchy(tables);
        }

        Ok(tables)
    }

    async fn fetch_table_schema(
        &self,
        table: &str,
        db: Option<&str>,
        logical: &str,
    ) -> Result<Option<TableSchema>> {
        let route = self.router.resolve(db);
        let query = format!(
            "SELECT COLUMN_NAME, DATA_TYPE, IS_NULLABLE, COLUMN_DEFAULT, COLUMN_COMMENT, \
             ORDINAL_POSITION, COLUMN_KEY, EXTRA \
             FROM information_schema.columns \
             WHERE TABLE_SCHEMA = '{}' AND TABLE_NAME = '{}' \
             ORDER BY ORDINAL_POSITION",
            route.database, table
        );

        let rows = rows_of(
            self.backend(&route)
                .run_query(&query, Some(&route.database))
                .await?,
        );
        if rows.is_empty() {
            return Ok(None);
        }

        let columns = rows
            .iter()
            .map(|row| ColumnInfo {
                name: row.text("COLUMN_NAME"),
                data_type: row.text("DATA_TYPE"),
                nullable: row.text("IS_NULLABLE") == "YES",
                default: row.text("COLUMN_DEFAULT"),
                comment: row.text("COLUMN_COMMENT"),
                position: row.integer("ORDINAL_POSITION"),
                key: row.text("COLUMN_KEY"),
                extra: row.text("EXTRA"),
            })
            .collect();

        let comment = self.get_table_comment(table, db).await;

        let mut schema = TableSchema {
            name: table.to_string(),
            database: logical.to_string(),
            comment,
            columns,
            table_type: String::new(),
            engine: String::new(),
            create_time: Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
        };

        // Table type and engine are best-effort; a failure here leaves the
        // fields empty instead of dropping the whole schema.
        let type_query = format!(
            "SELECT TABLE_TYPE, ENGINE FROM information_schema.tables \
             WHERE TABLE_SCHEMA = '{}' AND TABLE_NAME = '{}'",
            route.database, table
        );
        match self
            .backend(&route)
            .run_query(&type_query, Some(&route.database))
            .await
        {
            Ok(output) => {
                if let Some(row) = rows_of(output).first() {
                    schema.table_type = row.text("TABLE_TYPE");
                    schema.engine = row.text("ENGINE");
                }
            }
            Err(e) => warn!("Error getting table type information: {}", e),
        }

        Ok(Some(schema))
    }

    async fn fetch_table_comment(&self, table: &str, db: Option<&str>) -> Result<String> {
        let route = self.router.resolve(db);
        let query = format!(
            "SELECT TABLE_COMMENT FROM information_schema.tables \
             WHERE TABLE_SCHEMA = '{}' AND TABLE_NAME = '{}'",
            route.database, table
        );

        let rows = rows_of(
            self.backend(&route)
                .run_query(&query, Some(&route.database))
                .await?,
        );

        Ok(rows
            .first()
            .map(|row| row.text("TABLE_COMMENT"))
            .unwrap_or_default())
    }

    async fn fetch_column_comments(&self, table: &str, db: Option<&str>) -> Result<ColumnComments> {
        let route = self.router.resolve(db);
        let query = format!(
            "SELECT COLUMN_NAME, COLUMN_COMMENT FROM information_schema.columns \
             WHERE TABLE_SCHEMA = '{}' AND TABLE_NAME = '{}' \
             ORDER BY ORDINAL_POSITION",
            route.database, table
        );

        let rows = rows_of(
            self.backend(&route)
                .run_query(&query, Some(&route.database))
                .await?,
        );

        let mut comments = ColumnComments::new();
        for row in &rows {
            let name = row.text("COLUMN_NAME");
            if !name.is_empty() {
                comments.insert(name, row.text("COLUMN_COMMENT"));
            }
        }
        Ok(comments)
    }

    async fn fetch_table_indexes(&self, table: &str, db: Option<&str>) -> Result<Vec<IndexInfo>> {
        let route = self.router.resolve(db);
        let query = format!("SHOW INDEX FROM `{}`.`{}`", route.database, table);

        let tabular = self
            .backend(&route)
            .run_query_tabular(&query, Some(&route.database))
            .await?;
        if tabular.is_empty() {
            return Ok(Vec::new());
        }

        let key_idx = tabular
            .column_index("Key_name")
            .ok_or_else(|| Error::Backend("SHOW INDEX result missing Key_name".to_string()))?;
        let column_idx = tabular
            .column_index("Column_name")
            .ok_or_else(|| Error::Backend("SHOW INDEX result missing Column_name".to_string()))?;
        let unique_idx = tabular
            .column_index("Non_unique")
            .ok_or_else(|| Error::Backend("SHOW INDEX result missing Non_unique".to_string()))?;
        let type_idx = tabular
            .column_index("Index_type")
            .ok_or_else(|| Error::Backend("SHOW INDEX result missing Index_type".to_string()))?;

        let mut rows: Vec<(String, String, i64, String)> = tabular
            .rows
            .iter()
            .map(|row| {
                (
                    cell_text(row, key_idx),
                    cell_text(row, column_idx),
                    cell_int(row, unique_idx),
                    cell_text(row, type_idx),
                )
            })
            .collect();

        // Grouping below is by adjacency, so order by index name explicitly
        // rather than trusting arrival order. The sort is stable, keeping
        // column sequence within each index intact.
        rows.sort_by(|a, b| a.0.cmp(&b.0));

        let mut indexes: Vec<IndexInfo> = Vec::new();
        for (name, column, non_unique, index_type) in rows {
            match indexes.last_mut() {
                Some(last) if last.name == name => last.columns.push(column),
                _ => indexes.push(IndexInfo {
                    name,
                    columns: vec![column],
                    unique: non_unique == 0,
                    index_type,
                }),
            }
        }

        Ok(indexes)
    }

    async fn fetch_table_partitions(&self, table: &str, db: Option<&str>) -> Result<PartitionInfo> {
        let route = self.router.resolve(db);
        let query = format!(
            "SELECT PARTITION_NAME, PARTITION_EXPRESSION, PARTITION_DESCRIPTION, TABLE_ROWS \
             FROM information_schema.partitions \
             WHERE TABLE_SCHEMA = '{}' AND TABLE_NAME = '{}'",
            route.database, table
        );

        let rows = rows_of(
            self.backend(&route)
                .run_query(&query, Some(&route.database))
                .await?,
        );

        // Unpartitioned tables surface as a single row with a NULL
        // partition name; that counts as "no partitions".
        let partitions: Vec<PartitionDetail> = rows
            .iter()
            .filter(|row| !row.text("PARTITION_NAME").is_empty())
            .map(|row| PartitionDetail {
                name: row.text("PARTITION_NAME"),
                expression: row.text("PARTITION_EXPRESSION"),
                description: row.text("PARTITION_DESCRIPTION"),
                rows: row.integer("TABLE_ROWS"),
            })
            .collect();

        Ok(PartitionInfo {
            has_partitions: !partitions.is_empty(),
            partitions,
        })
    }

    async fn fetch_relationships(&self, db: Option<&str>) -> Result<Vec<Relationship>> {
        let tables = self.list_tables(db).await;

        let mut schemas: Vec<(String, Vec<ColumnInfo>)> = Vec::with_capacity(tables.len());
        for brief in &tables {
            if let Some(schema) = self.get_table_schema(&brief.table_name, db).await {
                schemas.push((brief.table_name.clone(), schema.columns));
            }
        }

        let mut relationships = Vec::new();
        for (table, columns) in &schemas {
            for column in columns {
                if !column.name.ends_with("_id") {
                    continue;
                }
                for (candidate, candidate_columns) in &schemas {
                    if candidate == table {
                        continue;
                    }
                    if candidate_columns.iter().any(|c| c.name == "id") {
                        relationships.push(Relationship::many_to_one(
                            table,
                            &column.name,
                            candidate,
                        ));
                    }
                }
            }
        }

        Ok(relationships)
    }

    async fn fetch_audit_logs(&self, days: i64, limit: usize) -> Result<Vec<AuditLogEntry>> {
        let start_date = (Utc::now() - ChronoDuration::days(days))
            .format("%Y-%m-%d")
            .to_string();
        let query = format!(
            "SELECT client_ip, user, db, time, stmt_id, stmt, state, error_code \
             FROM `__internal_schema`.`audit_log` \
             WHERE `time` >= '{}' \
             AND state = 'EOF' AND error_code = 0 \
             AND `stmt` NOT LIKE 'SHOW%' \
             AND `stmt` NOT LIKE 'DESC%' \
             AND `stmt` NOT LIKE 'EXPLAIN%' \
             AND `stmt` NOT LIKE 'SELECT 1%' \
             ORDER BY time DESC \
             LIMIT {}",
            start_date, limit
        );

        let rows = rows_of(self.backends.warehouse.run_query(&query, None).await?);

        Ok(rows
            .iter()
            .map(|row| AuditLogEntry {
                client_ip: row.text("client_ip"),
                user: row.text("user"),
                db: row.text("db"),
                time: row.text("time"),
                stmt_id: row.integer("stmt_id"),
                stmt: row.text("stmt"),
                state: row.text("state"),
                error_code: row.integer("error_code"),
            })
            .collect())
    }

    async fn compute_sql_patterns(&self, limit: usize) -> Vec<SqlPattern> {
        let logs = self.get_recent_audit_logs(AUDIT_WINDOW_DAYS, limit).await;
        if logs.is_empty() {
            info!("Audit window empty, returning generic SQL patterns");
            return default_sql_patterns();
        }

        let miner = SqlPatternMiner::new();

        struct Cluster {
            simplified: String,
            examples: Vec<String>,
            comments: Vec<String>,
            count: u64,
            tables: Vec<String>,
        }

        let mut by_type: HashMap<String, Vec<Cluster>> = HashMap::new();

        for entry in &logs {
            let stmt = entry.stmt.trim();
            if stmt.is_empty() {
                continue;
            }
            let Some(sql_type) = statement_type(stmt) else {
                continue;
            };

            let simplified = miner.simplify(stmt);
            let comments = miner.extract_comments(stmt);
            let clusters = by_type.entry(sql_type).or_default();

            if let Some(cluster) = clusters.iter_mut().find(|c| c.simplified == simplified) {
                cluster.count += 1;
                if cluster.examples.len() < MAX_EXAMPLES_PER_PATTERN {
                    cluster.examples.push(stmt.to_string());
                }
                if !comments.is_empty() && cluster.comments.len() < MAX_EXAMPLES_PER_PATTERN {
                    cluster.comments.push(comments);
                }
            } else {
                clusters.push(Cluster {
                    simplified,
                    examples: vec![stmt.to_string()],
                    comments: if comments.is_empty() {
                        Vec::new()
                    } else {
                        vec![comments]
                    },
                    count: 1,
                    tables: miner.extract_tables(stmt),
                });
            }
        }

        let mut patterns = Vec::new();
        let mut types: Vec<String> = by_type.keys().cloned().collect();
        types.sort();
        for sql_type in types {
            let mut clusters = by_type.remove(&sql_type).unwrap_or_default();
            clusters.sort_by(|a, b| b.count.cmp(&a.count));
            for cluster in clusters.into_iter().take(TOP_PATTERNS_PER_TYPE) {
                patterns.push(SqlPattern {
                    pattern: cluster.simplified,
                    sql_type: sql_type.clone(),
                    frequency: cluster.count,
                    examples: cluster.examples,
                    comments: cluster.comments,
                    tables: cluster.tables,
                });
            }
        }

        if patterns.is_empty() {
            return default_sql_patterns();
        }
        patterns
    }

    fn order_by_hierarchy(&self, tables: Vec<TableBrief>) -> Vec<TableBrief> {
        let names: Vec<String> = tables.iter().map(|t| t.table_name.clone()).collect();
        let ordered = self.classifier.classify(names);

        let mut by_name: HashMap<String, TableBrief> = tables
            .into_iter()
            .map(|t| (t.table_name.clone(), t))
            .collect();

        ordered
            .into_iter()
            .filter_map(|name| by_name.remove(&name))
            .collect()
    }

    fn backend(&self, route: &Route) -> &Arc<dyn QueryBackend> {
        self.backends.for_role(route.role)
    }

    /// Cache wrapper: typed values go through `serde_json::Value` so one
    /// cache serves every operation without colliding key spaces.
    async fn cached<T, F, Fut>(&self, key: String, fetch: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let value = self
            .cache
            .get_or_compute(&key, || async move {
                let fetched = fetch().await?;
                serde_json::to_value(fetched).map_err(Error::from)
            })
            .await?;

        serde_json::from_value(value).map_err(Error::from)
    }
}

fn rows_of(output: QueryOutput) -> Vec<BackendRow> {
    match output {
        QueryOutput::Rows(rows) => rows,
        QueryOutput::Scalar(_) => Vec::new(),
    }
}

fn cell_text(row: &[CellValue], idx: usize) -> String {
    row.get(idx).map(CellValue::render_text).unwrap_or_default()
}

fn cell_int(row: &[CellValue], idx: usize) -> i64 {
    row.get(idx)
        .and_then(|cell| {
            cell.as_i64()
                .or_else(|| cell.as_str().and_then(|s| s.parse().ok()))
        })
        .unwrap_or_default()
}

/// Leading keyword of a statement, if it is a statement type the miner
/// clusters on.
fn statement_type(sql: &str) -> Option<String> {
    let first = sql.split_whitespace().next()?;
    let keyword: String = first
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_uppercase();

    KNOWN_STATEMENT_TYPES
        .contains(&keyword.as_str())
        .then_some(keyword)
}

fn default_sql_patterns() -> Vec<SqlPattern> {
    vec![
        SqlPattern {
            pattern: "SELECT * FROM {table} WHERE {condition}".to_string(),
            sql_type: "SELECT".to_string(),
            frequency: 1,
            examples: Vec::new(),
            comments: Vec::new(),
            tables: Vec::new(),
        },
        SqlPattern {
            pattern: "SELECT {columns} FROM {table} GROUP BY {group_by} \
                      ORDER BY {order_by} LIMIT {limit}"
                .to_string(),
            sql_type: "SELECT".to_string(),
            frequency: 1,
            examples: Vec::new(),
            comments: Vec::new(),
            tables: Vec::new(),
        },
    ]
}

/// Statement simplification and lexical table extraction for pattern
/// mining. Regex-based by design; this is a clustering heuristic, not a
/// SQL parser.
struct SqlPatternMiner {
    line_comment: Regex,
    block_comment: Regex,
    string_literal: Regex,
    bare_number: Regex,
    in_clause: Regex,
    whitespace: Regex,
    table_refs: Vec<Regex>,
    line_comment_text: Regex,
    block_comment_text: Regex,
}

impl SqlPatternMiner {
    fn new() -> Self {
        Self {
            line_comment: Regex::new(r"--[^\n]*").expect("mining pattern must compile"),
            block_comment: Regex::new(r"(?s)/\*.*?\*/").expect("mining pattern must compile"),
            string_literal: Regex::new(r"'[^']*'").expect("mining pattern must compile"),
            bare_number: Regex::new(r"\b\d+\b").expect("mining pattern must compile"),
            in_clause: Regex::new(r"(?i)\bIN\s*\([^)]+\)").expect("mining pattern must compile"),
            whitespace: Regex::new(r"\s+").expect("mining pattern must compile"),
            table_refs: vec![
                Regex::new(r"(?i)\bFROM\s+`?(\w+)`?").expect("mining pattern must compile"),
                Regex::new(r"(?i)\bJOIN\s+`?(\w+)`?").expect("mining pattern must compile"),
                Regex::new(r"(?i)\bINSERT\s+INTO\s+`?(\w+)`?")
                    .expect("mining pattern must compile"),
                Regex::new(r"(?i)\bUPDATE\s+`?(\w+)`?").expect("mining pattern must compile"),
                Regex::new(r"(?i)\bDELETE\s+FROM\s+`?(\w+)`?")
                    .expect("mining pattern must compile"),
            ],
            line_comment_text: Regex::new(r"--\s*([^\n]*)").expect("mining pattern must compile"),
            block_comment_text: Regex::new(r"(?s)/\*(.*?)\*/")
                .expect("mining pattern must compile"),
        }
    }

    /// Replace literals, numbers and IN-list contents with placeholders
    /// and collapse whitespace, so statements differing only in constants
    /// cluster together.
    fn simplify(&self, sql: &str) -> String {
        let sql = self.line_comment.replace_all(sql, " ");
        let sql = self.block_comment.replace_all(&sql, " ");
        let sql = self.string_literal.replace_all(&sql, "'?'");
        let sql = self.bare_number.replace_all(&sql, "?");
        let sql = self.in_clause.replace_all(&sql, "IN (?)");
        let sql = self.whitespace.replace_all(&sql, " ");
        sql.trim().to_string()
    }

    /// Table names referenced by the statement, found by keyword scanning.
    fn extract_tables(&self, sql: &str) -> Vec<String> {
        let mut tables: Vec<String> = Vec::new();
        for pattern in &self.table_refs {
            for capture in pattern.captures_iter(sql) {
                let name = capture[1].to_string();
                if !tables.contains(&name) {
                    tables.push(name);
                }
            }
        }
        tables.sort();
        tables
    }

    /// Inline comments of the statement, joined line by line.
    fn extract_comments(&self, sql: &str) -> String {
        let mut comments: Vec<String> = Vec::new();
        for capture in self.line_comment_text.captures_iter(sql) {
            let text = capture[1].trim();
            if !text.is_empty() {
                comments.push(text.to_string());
            }
        }
        for capture in self.block_comment_text.captures_iter(sql) {
            let text = capture[1].trim();
            if !text.is_empty() {
                comments.push(text.to_string());
            }
        }
        comments.join("\n")
    }
}
