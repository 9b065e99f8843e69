//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, navigable
//! location) and the search and sync backends into a [`BrowseSession`].
//! Desktop apps typically enable the `desktop-shims` feature (which depends
//! on `bridge-desktop`) so missing bridges fall back to the desktop defaults.

pub mod error;
pub mod session;

pub use error::{CoreError, Result};
pub use session::BrowseSession;

use std::sync::Arc;

use bridge_traits::{http::HttpClient, navigation::NavigationHost};
use core_browse::{HttpSearchBackend, SearchBackend};
use core_runtime::config::CoreConfig;
use core_sync::{HttpSyncBackend, SyncBackend};

/// Aggregated handle to the bridges and backends a session requires.
#[derive(Clone)]
pub struct CoreDependencies {
    pub http_client: Arc<dyn HttpClient>,
    pub navigation: Arc<dyn NavigationHost>,
    pub search: Arc<dyn SearchBackend>,
    pub sync: Arc<dyn SyncBackend>,
}

impl CoreDependencies {
    /// Construct a dependency bundle from explicit handles.
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        navigation: Arc<dyn NavigationHost>,
        search: Arc<dyn SearchBackend>,
        sync: Arc<dyn SyncBackend>,
    ) -> Self {
        Self {
            http_client,
            navigation,
            search,
            sync,
        }
    }

    /// HTTP backends over the configured client and base URL.
    pub fn from_config(config: &CoreConfig) -> Self {
        let http = config.http_client.clone();
        Self {
            search: Arc::new(HttpSearchBackend::new(http.clone(), config.base_url.clone())),
            sync: Arc::new(HttpSyncBackend::new(http.clone(), config.base_url.clone())),
            http_client: http,
            navigation: config.navigation.clone(),
        }
    }

    pub fn with_search(mut self, search: Arc<dyn SearchBackend>) -> Self {
        self.search = search;
        self
    }

    pub fn with_sync(mut self, sync: Arc<dyn SyncBackend>) -> Self {
        self.sync = sync;
        self
    }
}

/// Convenience bootstrapper for desktop hosts.
///
/// ```no_run
/// # #[cfg(feature = "desktop-shims")]
/// # async fn example() -> core_service::Result<()> {
/// use core_runtime::config::{CoreConfig, SyncSourceConfig};
///
/// let builder = CoreConfig::builder()
///     .base_url("http://localhost:5000")
///     .sync_source(SyncSourceConfig::new("chub", "Chub", "/api/sync/chub"));
/// let session = core_service::bootstrap_desktop(builder)?;
/// session.set_query_text("vampire");
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "desktop-shims")]
pub fn bootstrap_desktop(
    builder: core_runtime::config::CoreConfigBuilder,
) -> Result<BrowseSession> {
    let config = builder.build()?;
    BrowseSession::from_config(config)
}
