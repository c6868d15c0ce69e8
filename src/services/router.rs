use tracing::debug;

/// Which backend catalog a logical database name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogRole {
    Warehouse,
    Secondary,
}

/// A resolved routing decision: physical database plus owning backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub role: CatalogRole,
    pub database: String,
}

/// Resolves logical database names to a backend and physical schema name.
///
/// Names carrying the secondary-catalog qualifier (`"<prefix>."`) route to
/// the secondary backend with the qualifier stripped; everything else goes
/// to the warehouse unchanged. The qualifier match is on the exact token,
/// so a name that merely contains the prefix text is never misrouted.
pub struct DatabaseRouter {
    default_database: String,
    prefix_token: String,
}

impl DatabaseRouter {
    pub fn new(default_database: impl Into<String>, secondary_prefix: &str) -> Self {
        Self {
            default_database: default_database.into(),
            prefix_token: format!("{}.", secondary_prefix),
        }
    }

    pub fn resolve(&self, logical: Option<&str>) -> Route {
        let name = logical.unwrap_or("").trim();

        if name.is_empty() {
            return Route {
                role: CatalogRole::Warehouse,
                database: self.default_database.clone(),
            };
        }

        if let Some(physical) = name.strip_prefix(&self.prefix_token) {
            debug!("Routing {} to secondary catalog as {}", name, physical);
            return Route {
                role: CatalogRole::Secondary,
                database: physical.to_string(),
            };
        }

        Route {
            role: CatalogRole::Warehouse,
            database: name.to_string(),
        }
    }

    /// Logical name a caller-supplied argument resolves to, with the
    /// process default filled in. Used for cache keying.
    pub fn logical_name(&self, logical: Option<&str>) -> String {
        let name = logical.unwrap_or("").trim();
        if name.is_empty() {
            self.default_database.clone()
        } else {
            name.to_string()
        }
    }
}
