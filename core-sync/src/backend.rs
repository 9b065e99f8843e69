//! # Sync Backend
//!
//! The three sync endpoints behind one trait: per-source streaming start,
//! the lightweight status poll and the cancel-all control request.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::http::{ByteStream, HttpClient, HttpRequest};
use core_runtime::config::SyncSourceConfig;
use serde::de::IgnoredAny;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::{Result, SyncError};

pub const STATUS_PATH: &str = "/api/sync/status";
pub const CANCEL_ALL_PATH: &str = "/api/sync/cancel-all";

/// Backend view of which sources have a job in progress
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemoteStatus {
    sources: HashMap<String, bool>,
}

impl RemoteStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source_id: impl Into<String>, in_progress: bool) -> Self {
        self.sources.insert(source_id.into(), in_progress);
        self
    }

    pub fn in_progress(&self, source_id: &str) -> bool {
        self.sources.get(source_id).copied().unwrap_or(false)
    }

    pub fn any_in_progress(&self) -> bool {
        self.sources.values().any(|in_progress| *in_progress)
    }

    /// Parse the status endpoint body
    ///
    /// Each source maps to `{ "inProgress": bool }` or a bare boolean; any
    /// other value counts as not in progress.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let entries: HashMap<String, StatusEntry> = serde_json::from_slice(body)
            .map_err(|e| SyncError::InvalidResponse(e.to_string()))?;

        let sources = entries
            .into_iter()
            .map(|(id, entry)| (id, entry.in_progress()))
            .collect();
        Ok(Self { sources })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StatusEntry {
    Flag(bool),
    Detailed {
        #[serde(rename = "inProgress", default)]
        in_progress: bool,
    },
    Other(IgnoredAny),
}

impl StatusEntry {
    fn in_progress(&self) -> bool {
        match self {
            StatusEntry::Flag(flag) => *flag,
            StatusEntry::Detailed { in_progress } => *in_progress,
            StatusEntry::Other(_) => false,
        }
    }
}

/// Sync endpoints used by the orchestrator
#[async_trait]
pub trait SyncBackend: Send + Sync {
    /// Open the progress stream that starts a sync of `source`
    async fn open_stream(&self, source: &SyncSourceConfig) -> Result<ByteStream>;

    /// Fetch which sources the backend reports in progress
    async fn fetch_status(&self) -> Result<RemoteStatus>;

    /// Ask the backend to stop every in-progress job
    async fn cancel_all(&self) -> Result<()>;
}

/// [`SyncBackend`] over the host's [`HttpClient`]
pub struct HttpSyncBackend {
    http: Arc<dyn HttpClient>,
    base_url: String,
}

impl HttpSyncBackend {
    pub fn new(http: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl SyncBackend for HttpSyncBackend {
    #[instrument(skip(self, source), fields(source_id = %source.id))]
    async fn open_stream(&self, source: &SyncSourceConfig) -> Result<ByteStream> {
        let request = HttpRequest::post(self.url(&source.stream_path))
            .header("Accept", "text/event-stream");

        let response = self.http.execute_stream(request).await?;
        debug!(status = response.status, "Sync stream opened");
        Ok(response.body)
    }

    async fn fetch_status(&self) -> Result<RemoteStatus> {
        let response = self
            .http
            .execute(HttpRequest::get(self.url(STATUS_PATH)))
            .await?
            .error_for_status()?;

        RemoteStatus::from_json(&response.body)
    }

    #[instrument(skip(self))]
    async fn cancel_all(&self) -> Result<()> {
        self.http
            .execute(HttpRequest::post(self.url(CANCEL_ALL_PATH)))
            .await?
            .error_for_status()?;
        debug!("Backend cancel-all acknowledged");
        Ok(())
    }
}
