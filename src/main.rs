// Diagnostic entry point: wires the gateway from environment settings and
// dumps a catalog snapshot, or runs one statement when SMOKE_SQL is set.
// The production surface is the library consumed by the tool host.
use std::sync::Arc;
use tracing::{error, info};

use doris_gateway::api::ToolHandlers;
use doris_gateway::config::Settings;
use doris_gateway::services::catalog::MetadataCatalog;
use doris_gateway::services::database::{Backends, MySqlBackend};
use doris_gateway::services::metadata_cache::TtlCache;
use doris_gateway::services::query_service::QueryExecutor;
use doris_gateway::services::router::DatabaseRouter;
use doris_gateway::validation::security::SqlSecurityGuard;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let warehouse = Arc::new(MySqlBackend::new(&settings.warehouse.url)?);
    let secondary = Arc::new(MySqlBackend::new(&settings.secondary.url)?);
    let backends = Arc::new(Backends::new(warehouse, secondary));

    let catalog = Arc::new(MetadataCatalog::new(
        &settings,
        backends.clone(),
        TtlCache::new(std::time::Duration::from_secs(settings.catalog.cache_ttl_secs)),
    ));
    let executor = Arc::new(QueryExecutor::new(
        DatabaseRouter::new(
            settings.catalog.default_database.clone(),
            &settings.catalog.secondary_prefix,
        ),
        SqlSecurityGuard::new(settings.security.enable_security_check),
        backends,
    ));

    let handlers = ToolHandlers::new(catalog, executor);

    if let Ok(sql) = std::env::var("SMOKE_SQL") {
        info!("Executing smoke statement");
        let result = handlers.exec_query(Some(&sql), None, None, None).await;
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let databases = handlers.get_db_list().await;
    println!("{}", serde_json::to_string_pretty(&databases)?);

    let patterns = handlers.get_sql_patterns(None).await;
    println!("{}", serde_json::to_string_pretty(&patterns)?);

    Ok(())
}
