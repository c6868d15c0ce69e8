use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One entry in a database's table listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableBrief {
    pub table_name: String,
    /// Empty string when the table carries no comment.
    pub table_comment: String,
}

/// Full schema of a single table, as surfaced to the tool host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub database: String,
    pub comment: String,
    pub columns: Vec<ColumnInfo>,
    pub table_type: String,
    pub engine: String,
    /// Extraction timestamp, ISO-8601.
    pub create_time: String,
}

/// Column metadata, ordered by ordinal position within the table.
///
/// Absent comments and defaults normalize to the empty string so the JSON
/// shape stays stable for downstream consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub default: String,
    pub comment: String,
    pub position: i64,
    pub key: String,
    pub extra: String,
}

/// Index metadata grouped from `SHOW INDEX` output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
    #[serde(rename = "type")]
    pub index_type: String,
}

/// Partition layout of a table. `has_partitions` is false and the list is
/// empty for unpartitioned tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartitionInfo {
    pub has_partitions: bool,
    pub partitions: Vec<PartitionDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionDetail {
    pub name: String,
    pub expression: String,
    pub description: String,
    pub rows: i64,
}

/// A foreign-key candidate inferred from column naming conventions, not
/// from constraint introspection. Confidence is always "medium".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relationship {
    pub table: String,
    pub column: String,
    pub references_table: String,
    pub references_column: String,
    pub relationship_type: String,
    pub confidence: String,
}

impl Relationship {
    pub fn many_to_one(table: &str, column: &str, references_table: &str) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            references_table: references_table.to_string(),
            references_column: "id".to_string(),
            relationship_type: "many-to-one".to_string(),
            confidence: "medium".to_string(),
        }
    }
}

/// A cluster of similar statements mined from the audit log. `pattern` is
/// the simplified form shared by every statement in the cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlPattern {
    pub pattern: String,
    #[serde(rename = "type")]
    pub sql_type: String,
    pub frequency: u64,
    pub examples: Vec<String>,
    pub comments: Vec<String>,
    pub tables: Vec<String>,
}

/// One executed-statement record from the warehouse audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub client_ip: String,
    pub user: String,
    pub db: String,
    pub time: String,
    pub stmt_id: i64,
    pub stmt: String,
    pub state: String,
    pub error_code: i64,
}

/// Column-name to comment mapping for a table.
pub type ColumnComments = BTreeMap<String, String>;
