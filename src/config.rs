use serde::Deserialize;
use std::env;
use tracing::warn;

const DEFAULT_EXCLUDED_DATABASES: &[&str] = &[
    "information_schema",
    "mysql",
    "performance_schema",
    "sys",
    "__internal_schema",
];

const DEFAULT_HIERARCHY_PATTERNS: &[&str] = &[
    "^ads_.*$",
    "^dim_.*$",
    "^dws_.*$",
    "^dwd_.*$",
    "^ods_.*$",
    "^tmp_.*$",
    "^stg_.*$",
    "^.*$",
];

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub warehouse: BackendSettings,
    pub secondary: BackendSettings,
    pub catalog: CatalogSettings,
    pub security: SecuritySettings,
}

/// Connection settings for one backend, consumed by the transport layer.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendSettings {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSettings {
    pub default_database: String,
    pub cache_ttl_secs: u64,
    pub secondary_prefix: String,
    pub enable_table_hierarchy: bool,
    /// JSON array of regex strings; parsed lazily so a bad value degrades
    /// to the default list instead of failing startup.
    pub table_hierarchy_patterns: String,
    /// JSON array of database names never surfaced by the catalog.
    pub excluded_databases: String,
    /// JSON array of primary-catalog databases exposed by list_databases.
    /// Empty array means "everything not excluded".
    pub database_allowlist: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecuritySettings {
    pub enable_security_check: bool,
}

impl Settings {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Pick up a .env file first so its values are visible below.
        let _ = dotenv::dotenv();

        let mut builder = config::Config::builder()
            .set_default("warehouse.url", "mysql://root@localhost:9030/")?
            .set_default("secondary.url", "mysql://root@localhost:3306/")?
            .set_default("catalog.default_database", "")?
            .set_default("catalog.cache_ttl_secs", 3600)?
            .set_default("catalog.secondary_prefix", "mysql_catalog")?
            .set_default("catalog.enable_table_hierarchy", false)?
            .set_default("catalog.table_hierarchy_patterns", "")?
            .set_default("catalog.excluded_databases", "")?
            .set_default("catalog.database_allowlist", "[]")?
            .set_default("security.enable_security_check", true)?;

        if let Ok(url) = env::var("WAREHOUSE_URL") {
            builder = builder.set_override("warehouse.url", url)?;
        }

        if let Ok(url) = env::var("SECONDARY_URL") {
            builder = builder.set_override("secondary.url", url)?;
        }

        if let Ok(db) = env::var("DB_DATABASE") {
            builder = builder.set_override("catalog.default_database", db)?;
        }

        if let Ok(ttl) = env::var("METADATA_CACHE_TTL") {
            builder = builder
                .set_override("catalog.cache_ttl_secs", ttl.parse::<u64>().unwrap_or(3600))?;
        }

        if let Ok(prefix) = env::var("SECONDARY_CATALOG_PREFIX") {
            builder = builder.set_override("catalog.secondary_prefix", prefix)?;
        }

        if let Ok(flag) = env::var("ENABLE_TABLE_HIERARCHY") {
            builder = builder
                .set_override("catalog.enable_table_hierarchy", flag.to_lowercase() == "true")?;
        }

        if let Ok(patterns) = env::var("TABLE_HIERARCHY_PATTERNS") {
            builder = builder.set_override("catalog.table_hierarchy_patterns", patterns)?;
        }

        if let Ok(excluded) = env::var("EXCLUDED_DATABASES") {
            builder = builder.set_override("catalog.excluded_databases", excluded)?;
        }

        if let Ok(allowlist) = env::var("DATABASE_ALLOWLIST") {
            builder = builder.set_override("catalog.database_allowlist", allowlist)?;
        }

        if let Ok(flag) = env::var("ENABLE_SQL_SECURITY_CHECK") {
            builder = builder
                .set_override("security.enable_security_check", flag.to_lowercase() == "true")?;
        }

        builder.build()?.try_deserialize()
    }
}

impl CatalogSettings {
    pub fn excluded_databases(&self) -> Vec<String> {
        parse_string_list(
            &self.excluded_databases,
            "EXCLUDED_DATABASES",
            DEFAULT_EXCLUDED_DATABASES,
        )
    }

    pub fn database_allowlist(&self) -> Vec<String> {
        parse_string_list(&self.database_allowlist, "DATABASE_ALLOWLIST", &[])
    }

    pub fn table_hierarchy_patterns(&self) -> Vec<String> {
        parse_string_list(
            &self.table_hierarchy_patterns,
            "TABLE_HIERARCHY_PATTERNS",
            DEFAULT_HIERARCHY_PATTERNS,
        )
    }
}

/// Parse a JSON string-array setting, falling back to `default` on empty or
/// malformed input. Configuration mistakes degrade, they never abort.
fn parse_string_list(raw: &str, key: &str, default: &[&str]) -> Vec<String> {
    if raw.trim().is_empty() {
        return default.iter().map(|s| s.to_string()).collect();
    }

    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(values) => values,
        Err(e) => {
            warn!("{} is not a JSON string array ({}), using default", key, e);
            default.iter().map(|s| s.to_string()).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        env::remove_var("METADATA_CACHE_TTL");
        env::remove_var("ENABLE_TABLE_HIERARCHY");
        env::remove_var("ENABLE_SQL_SECURITY_CHECK");

        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.catalog.cache_ttl_secs, 3600);
        assert!(!settings.catalog.enable_table_hierarchy);
        assert!(settings.security.enable_security_check);
        assert_eq!(settings.catalog.secondary_prefix, "mysql_catalog");
    }

    #[test]
    fn test_list_parsing_falls_back_on_garbage() {
        let parsed = parse_string_list("not json", "TEST_KEY", &["a", "b"]);
        assert_eq!(parsed, vec!["a".to_string(), "b".to_string()]);

        let parsed = parse_string_list(r#"["x","y"]"#, "TEST_KEY", &["a"]);
        assert_eq!(parsed, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn test_empty_allowlist_defaults_to_empty() {
        let parsed = parse_string_list("[]", "DATABASE_ALLOWLIST", &[]);
        assert!(parsed.is_empty());
    }
}
