//! # Core Configuration Module
//!
//! Provides configuration management for the catalog client core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds every bridge and tunable the browse session needs. It
//! enforces fail-fast validation so a misconfigured host learns about it at
//! startup rather than on the first request.
//!
//! ## Required Settings
//!
//! - `base_url` - Origin of the catalog backend (`http` or `https`)
//! - `sync_sources` - At least one sync source, ids unique
//!
//! ## Bridges (with platform defaults)
//!
//! - `HttpClient` - HTTP operations (desktop default: reqwest)
//! - `NavigationHost` - Navigable location (desktop default: in-memory)
//!
//! When the `desktop-shims` feature is enabled, desktop-ready defaults are
//! injected automatically if not provided. Without it, a missing bridge fails
//! with [`Error::CapabilityMissing`].
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, SyncSourceConfig};
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .base_url("http://localhost:5000")
//!     .sync_source(SyncSourceConfig::new("chub", "Chub", "/api/sync/chub"))
//!     .sync_source(SyncSourceConfig::new("janny", "JannyAI", "/api/sync/janny"))
//!     .page_size(60)
//!     .debounce_delay(Duration::from_millis(500))
//!     .hybrid_provenance(true)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{HttpClient, NavigationHost};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Items requested per page when the host does not override it.
pub const DEFAULT_PAGE_SIZE: u32 = 48;

/// Largest page the backend is asked for.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Quiet period before free-text and expression edits are committed.
pub const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_millis(700);

/// Interval between sync status polls while any source is active.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

const MAX_DEBOUNCE_DELAY: Duration = Duration::from_secs(10);
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(300);

/// One external source that can be synchronized into the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSourceConfig {
    /// Stable identifier, also the key in the status endpoint response
    pub id: String,
    /// Display label
    pub label: String,
    /// Path of the streaming start endpoint, relative to `base_url`
    pub stream_path: String,
}

impl SyncSourceConfig {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        stream_path: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            stream_path: stream_path.into(),
        }
    }
}

/// Feature flags control optional functionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Ask the search endpoint for lexical/semantic provenance counts
    pub hybrid_provenance: bool,

    /// Mirror browse state into the host's navigable location
    pub url_sync: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            hybrid_provenance: false,
            url_sync: true,
        }
    }
}

/// Core configuration for the catalog client core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Backend origin, without a trailing slash
    pub base_url: String,

    /// Items per page
    pub page_size: u32,

    /// Debounce window for free-text query and filter expression
    pub debounce_delay: Duration,

    /// Sync status poll interval
    pub poll_interval: Duration,

    /// Configured sync sources, in display order
    pub sync_sources: Vec<SyncSourceConfig>,

    /// HTTP client for search, sync and status requests
    pub http_client: Arc<dyn HttpClient>,

    /// Host navigable location
    pub navigation: Arc<dyn NavigationHost>,

    /// Broadcast buffer for the event bus
    pub event_buffer_size: usize,

    /// Features flags
    pub features: FeatureFlags,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("base_url", &self.base_url)
            .field("page_size", &self.page_size)
            .field("debounce_delay", &self.debounce_delay)
            .field("poll_interval", &self.poll_interval)
            .field("sync_sources", &self.sync_sources)
            .field("http_client", &"HttpClient { ... }")
            .field("navigation", &"NavigationHost { ... }")
            .field("event_buffer_size", &self.event_buffer_size)
            .field("features", &self.features)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Looks up a configured sync source by id.
    pub fn sync_source(&self, id: &str) -> Option<&SyncSourceConfig> {
        self.sync_sources.iter().find(|source| source.id == id)
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Base URL parses as an absolute `http`/`https` URL
    /// - Page size is within `1..=500`
    /// - Debounce and poll intervals are within sane bounds
    /// - Event buffer is non-empty
    /// - At least one sync source, with unique non-empty ids and
    ///   `/`-prefixed stream paths
    pub fn validate(&self) -> Result<()> {
        let parsed = Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("Invalid base URL '{}': {}", self.base_url, e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(Error::Config(format!(
                "Base URL must use http or https, got '{}'",
                parsed.scheme()
            )));
        }

        if self.page_size == 0 {
            return Err(Error::Config(
                "Page size must be greater than 0".to_string(),
            ));
        }

        if self.page_size > MAX_PAGE_SIZE {
            return Err(Error::Config(format!(
                "Page size exceeds maximum of {}",
                MAX_PAGE_SIZE
            )));
        }

        if self.debounce_delay > MAX_DEBOUNCE_DELAY {
            return Err(Error::Config(format!(
                "Debounce delay exceeds maximum of {}ms",
                MAX_DEBOUNCE_DELAY.as_millis()
            )));
        }

        if self.poll_interval < MIN_POLL_INTERVAL || self.poll_interval > MAX_POLL_INTERVAL {
            return Err(Error::Config(format!(
                "Poll interval must be between {}ms and {}s",
                MIN_POLL_INTERVAL.as_millis(),
                MAX_POLL_INTERVAL.as_secs()
            )));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.sync_sources.is_empty() {
            return Err(Error::Config(
                "At least one sync source is required. Use .sync_source() to add one."
                    .to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for source in &self.sync_sources {
            if source.id.trim().is_empty() {
                return Err(Error::Config("Sync source id cannot be empty".to_string()));
            }
            if !seen.insert(source.id.as_str()) {
                return Err(Error::Config(format!(
                    "Duplicate sync source id '{}'",
                    source.id
                )));
            }
            if !source.stream_path.starts_with('/') {
                return Err(Error::Config(format!(
                    "Stream path for sync source '{}' must start with '/'",
                    source.id
                )));
            }
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required for search and sync requests. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default ReqwestHttpClient. \
                 Embedded hosts: inject an adapter over the host's networking stack."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn navigation_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "NavigationHost".to_string(),
        message: "NavigationHost implementation is required to read and write the browse location. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default InMemoryNavigation. \
                 Web hosts: inject an adapter over the browser history API."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_navigation() -> Result<Arc<dyn NavigationHost>> {
    use bridge_desktop::InMemoryNavigation;

    let navigation: Arc<dyn NavigationHost> = Arc::new(InMemoryNavigation::new());
    Ok(navigation)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_navigation() -> Result<Arc<dyn NavigationHost>> {
    Err(navigation_missing_error())
}

/// Builder for constructing [`CoreConfig`] instances.
///
/// Call [`build()`](CoreConfigBuilder::build) to validate and produce the
/// final config.
#[derive(Default)]
pub struct CoreConfigBuilder {
    base_url: Option<String>,
    page_size: Option<u32>,
    debounce_delay: Option<Duration>,
    poll_interval: Option<Duration>,
    sync_sources: Vec<SyncSourceConfig>,
    http_client: Option<Arc<dyn HttpClient>>,
    navigation: Option<Arc<dyn NavigationHost>>,
    event_buffer_size: Option<usize>,
    features: FeatureFlags,
}

impl CoreConfigBuilder {
    /// Sets the backend origin (required). A trailing slash is dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder().base_url("http://localhost:5000/");
    /// ```
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the number of items per page.
    ///
    /// Default: 48
    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Sets the debounce window for free-text inputs.
    ///
    /// Default: 700ms
    pub fn debounce_delay(mut self, delay: Duration) -> Self {
        self.debounce_delay = Some(delay);
        self
    }

    /// Sets the sync status poll interval.
    ///
    /// Default: 2s
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Adds one sync source. Sources keep insertion order.
    pub fn sync_source(mut self, source: SyncSourceConfig) -> Self {
        self.sync_sources.push(source);
        self
    }

    /// Replaces the whole sync source list.
    pub fn sync_sources(mut self, sources: Vec<SyncSourceConfig>) -> Self {
        self.sync_sources = sources;
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the desktop default (reqwest-based) will be used when
    /// the `desktop-shims` feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the navigation host implementation.
    ///
    /// If not provided, an in-memory location will be used when the
    /// `desktop-shims` feature is enabled.
    pub fn navigation(mut self, navigation: Arc<dyn NavigationHost>) -> Self {
        self.navigation = Some(navigation);
        self
    }

    /// Sets the event bus buffer size.
    ///
    /// Default: [`DEFAULT_EVENT_BUFFER_SIZE`](crate::events::DEFAULT_EVENT_BUFFER_SIZE)
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Enables or disables hybrid retrieval provenance.
    ///
    /// Default: false
    pub fn hybrid_provenance(mut self, enabled: bool) -> Self {
        self.features.hybrid_provenance = enabled;
        self
    }

    /// Enables or disables writing browse state to the navigable location.
    ///
    /// Default: true
    pub fn url_sync(mut self, enabled: bool) -> Self {
        self.features.url_sync = enabled;
        self
    }

    /// Sets all feature flags at once.
    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Returns
    ///
    /// Returns `Ok(CoreConfig)` on success, or an error if:
    /// - The base URL is missing or invalid
    /// - A bridge is missing and no desktop default is available
    /// - Any tunable is out of bounds
    pub fn build(self) -> Result<CoreConfig> {
        let base_url = self.base_url.ok_or_else(|| {
            Error::Config("Base URL is required. Use .base_url() to set it.".to_string())
        })?;
        let base_url = base_url.trim().trim_end_matches('/').to_string();

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let navigation = match self.navigation {
            Some(navigation) => navigation,
            None => provide_default_navigation()?,
        };

        let config = CoreConfig {
            base_url,
            page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            debounce_delay: self.debounce_delay.unwrap_or(DEFAULT_DEBOUNCE_DELAY),
            poll_interval: self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
            sync_sources: self.sync_sources,
            http_client,
            navigation,
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
            features: self.features,
        };

        config.validate()?;

        Ok(config)
    }
}
