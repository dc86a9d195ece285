//! Routing-table sources.
//!
//! The relay only depends on [`RouteRepository`]. Two implementations:
//! - [`FileRouteRepository`]: JSON document on disk, cached with a TTL
//! - [`StaticRouteRepository`]: a fixed in-memory table

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::ConfigError;
use crate::routing::matcher;
use crate::routing::model::{Route, RoutingTable};

/// Read-only access to a routing table.
#[async_trait]
pub trait RouteRepository: Send + Sync {
    /// Routes for a recipient: every match, else the default, else empty.
    async fn resolve(&self, recipient: &str) -> Result<Vec<Route>, ConfigError>;

    /// The default route, if one is configured.
    async fn default_route(&self) -> Result<Option<Route>, ConfigError>;

    /// Force the next lookup to see the current source.
    async fn reload(&self) -> Result<(), ConfigError>;
}

// ── Static ──────────────────────────────────────────────────────────

/// A fixed routing table held in memory.
pub struct StaticRouteRepository {
    table: RoutingTable,
}

impl StaticRouteRepository {
    pub fn new(table: RoutingTable) -> Self {
        Self { table }
    }
}

#[async_trait]
impl RouteRepository for StaticRouteRepository {
    async fn resolve(&self, recipient: &str) -> Result<Vec<Route>, ConfigError> {
        Ok(matcher::resolve(&self.table, recipient))
    }

    async fn default_route(&self) -> Result<Option<Route>, ConfigError> {
        Ok(matcher::default_route(&self.table).cloned())
    }

    async fn reload(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

// ── File-backed ─────────────────────────────────────────────────────

struct CachedTable {
    table: Arc<RoutingTable>,
    loaded_at: Instant,
}

/// A JSON routing document on disk, re-read once the cached copy is older
/// than the TTL.
///
/// A failed refresh keeps serving the previously loaded table.
pub struct FileRouteRepository {
    path: PathBuf,
    ttl: Duration,
    cache: RwLock<Option<CachedTable>>,
}

impl FileRouteRepository {
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            ttl,
            cache: RwLock::new(None),
        }
    }

    /// The current table, loading or refreshing it if needed.
    pub async fn table(&self) -> Result<Arc<RoutingTable>, ConfigError> {
        {
            let guard = self.cache.read().await;
            if let Some(cached) = guard.as_ref()
                && cached.loaded_at.elapsed() < self.ttl
            {
                return Ok(Arc::clone(&cached.table));
            }
        }

        let mut guard = self.cache.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(cached) = guard.as_ref()
            && cached.loaded_at.elapsed() < self.ttl
        {
            return Ok(Arc::clone(&cached.table));
        }

        match self.load().await {
            Ok(table) => {
                let table = Arc::new(table);
                *guard = Some(CachedTable {
                    table: Arc::clone(&table),
                    loaded_at: Instant::now(),
                });
                Ok(table)
            }
            Err(e) => match guard.as_mut() {
                Some(stale) => {
                    warn!(
                        path = %self.path.display(),
                        error = %e,
                        "Routing table refresh failed, serving previous table"
                    );
                    stale.loaded_at = Instant::now();
                    Ok(Arc::clone(&stale.table))
                }
                None => Err(e),
            },
        }
    }

    async fn load(&self) -> Result<RoutingTable, ConfigError> {
        let json = tokio::fs::read_to_string(&self.path).await?;
        let table = RoutingTable::from_json(&json)?;
        info!(
            path = %self.path.display(),
            routes = table.len(),
            "Loaded routing table"
        );
        Ok(table)
    }
}

#[async_trait]
impl RouteRepository for FileRouteRepository {
    async fn resolve(&self, recipient: &str) -> Result<Vec<Route>, ConfigError> {
        let table = self.table().await?;
        Ok(matcher::resolve(&table, recipient))
    }

    async fn default_route(&self) -> Result<Option<Route>, ConfigError> {
        let table = self.table().await?;
        Ok(matcher::default_route(&table).cloned())
    }

    async fn reload(&self) -> Result<(), ConfigError> {
        let table = self.load().await?;
        debug!(path = %self.path.display(), "Routing table reloaded on request");
        *self.cache.write().await = Some(CachedTable {
            table: Arc::new(table),
            loaded_at: Instant::now(),
        });
        Ok(())
    }
}
