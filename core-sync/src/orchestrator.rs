//! # Sync Orchestrator
//!
//! Runs one independent streaming job per configured source.
//!
//! ## Workflow
//!
//! 1. `start(source)` cancels any stream already open for that source, mints
//!    a fresh run id and cancellation token, marks the job Running and spawns
//!    the stream task
//! 2. The stream task decodes frames and applies them while the job's run id
//!    still matches its own
//! 3. A `progress: 100` frame completes the job and fires the completion
//!    callback; an `error` frame fails it, and the remaining frames are
//!    drained without effect
//! 4. When the task ends for any reason the job settles back to Idle
//!
//! Cancelling one source never touches another source's token.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::SyncOrchestrator;
//! use std::sync::Arc;
//!
//! let orchestrator = Arc::new(SyncOrchestrator::new(backend, sources, event_bus));
//! orchestrator.set_completion_callback(|source_id| println!("{source_id} finished"));
//!
//! let run_id = orchestrator.start("chub")?;
//! let mut updates = orchestrator.subscribe();
//! updates.changed().await?;
//! println!("{:?}", orchestrator.job("chub"));
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use bridge_traits::time::{Clock, SystemClock};
use core_async::sync::{watch, CancellationToken, Notify};
use core_async::time::Duration;
use core_runtime::config::{CoreConfig, SyncSourceConfig, DEFAULT_POLL_INTERVAL};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use futures::StreamExt;
use tracing::{debug, info, instrument, warn};

use crate::backend::{RemoteStatus, SyncBackend};
use crate::frame::frames;
use crate::job::{FrameEffect, SyncJobState, SyncRunId, SyncStatus};
use crate::payload::ProgressFrame;
use crate::poller::PollingState;
use crate::{Result, SyncError};

/// Invoked with the source id whenever a sync finishes with new data
pub type CompletionCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Whole-value view of every source's job, in configuration order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncSnapshot {
    pub jobs: Vec<SyncJobState>,
}

impl SyncSnapshot {
    pub fn job(&self, source_id: &str) -> Option<&SyncJobState> {
        self.jobs.iter().find(|job| job.source_id == source_id)
    }

    fn job_mut(&mut self, source_id: &str) -> Option<&mut SyncJobState> {
        self.jobs.iter_mut().find(|job| job.source_id == source_id)
    }

    /// Whether any source has a local stream in Running state
    pub fn any_running(&self) -> bool {
        self.jobs.iter().any(|job| job.status == SyncStatus::Running)
    }
}

struct ActiveStream {
    run_id: SyncRunId,
    token: CancellationToken,
}

pub struct SyncOrchestrator {
    backend: Arc<dyn SyncBackend>,
    sources: Vec<SyncSourceConfig>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    poll_interval: Duration,
    jobs: watch::Sender<SyncSnapshot>,
    active: Mutex<HashMap<String, ActiveStream>>,
    remote: Mutex<RemoteStatus>,
    // Sources with a local run since the previous successful poll
    touched: Mutex<HashSet<String>>,
    on_complete: RwLock<Option<CompletionCallback>>,
    wake: Notify,
}

impl SyncOrchestrator {
    pub fn new(
        backend: Arc<dyn SyncBackend>,
        sources: Vec<SyncSourceConfig>,
        events: EventBus,
    ) -> Self {
        let snapshot = SyncSnapshot {
            jobs: sources
                .iter()
                .map(|source| SyncJobState::new(source.id.clone()))
                .collect(),
        };
        let (jobs, _) = watch::channel(snapshot);

        Self {
            backend,
            sources,
            clock: Arc::new(SystemClock),
            events,
            poll_interval: DEFAULT_POLL_INTERVAL,
            jobs,
            active: Mutex::new(HashMap::new()),
            remote: Mutex::new(RemoteStatus::default()),
            touched: Mutex::new(HashSet::new()),
            on_complete: RwLock::new(None),
            wake: Notify::new(),
        }
    }

    /// Build from the configured sources and poll interval
    pub fn from_config(config: &CoreConfig, backend: Arc<dyn SyncBackend>, events: EventBus) -> Self {
        Self::new(backend, config.sync_sources.clone(), events)
            .with_poll_interval(config.poll_interval)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn set_completion_callback<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let mut slot = match self.on_complete.write() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(Arc::new(callback));
    }

    pub fn sources(&self) -> &[SyncSourceConfig] {
        &self.sources
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        self.jobs.borrow().clone()
    }

    pub fn job(&self, source_id: &str) -> Option<SyncJobState> {
        self.jobs.borrow().job(source_id).cloned()
    }

    /// Receiver that observes every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.jobs.subscribe()
    }

    /// Last backend status seen by the poller
    pub fn remote_status(&self) -> RemoteStatus {
        lock(&self.remote).clone()
    }

    /// Start (or restart) the stream for `source_id`
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::UnknownSource`] for an unconfigured source
    #[instrument(skip(self))]
    pub fn start(self: &Arc<Self>, source_id: &str) -> Result<SyncRunId> {
        let source = self.source(source_id)?.clone();
        let run_id = SyncRunId::new();
        let token = CancellationToken::new();

        let previous = lock(&self.active).insert(
            source.id.clone(),
            ActiveStream {
                run_id,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            debug!(previous_run = %previous.run_id, "Replacing open sync stream");
            previous.token.cancel();
        }

        let now = self.clock.now();
        let replaced = self
            .modify_job(&source.id, |job| {
                let replaced = job.run_id.filter(|_| job.status == SyncStatus::Running);
                if replaced.is_some() {
                    job.cancel(now).ok()?;
                }
                job.start(run_id, now).ok()?;
                Some(replaced)
            })
            .ok_or_else(|| SyncError::InvalidStateTransition {
                from: "unknown".to_string(),
                to: SyncStatus::Running.as_str().to_string(),
                reason: "Job could not be started".to_string(),
            })?;

        if let Some(replaced) = replaced {
            self.emit(SyncEvent::Cancelled {
                source_id: source.id.clone(),
                run_id: Some(replaced.to_string()),
            });
        }
        self.emit(SyncEvent::Started {
            source_id: source.id.clone(),
            run_id: run_id.to_string(),
        });

        lock(&self.touched).insert(source.id.clone());
        self.wake.notify_waiters();

        info!(run_id = %run_id, "Sync started");

        let this = Arc::clone(self);
        core_async::spawn(this.run_stream(source, run_id, token));

        Ok(run_id)
    }

    /// Abort the local stream of `source_id`
    ///
    /// Returns `false` when no local stream was open.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::UnknownSource`] for an unconfigured source
    #[instrument(skip(self))]
    pub fn cancel(&self, source_id: &str) -> Result<bool> {
        self.source(source_id)?;

        let Some(active) = lock(&self.active).remove(source_id) else {
            debug!("No local sync stream to cancel");
            return Ok(false);
        };
        active.token.cancel();

        let now = self.clock.now();
        self.modify_job(source_id, |job| {
            if !job.accepts(active.run_id) {
                return None;
            }
            job.cancel(now).ok()
        });

        self.emit(SyncEvent::Cancelled {
            source_id: source_id.to_string(),
            run_id: Some(active.run_id.to_string()),
        });
        info!(run_id = %active.run_id, "Sync cancelled");
        Ok(true)
    }

    /// Stop backend-initiated jobs, then every local stream
    ///
    /// A failed control request is logged; local streams are cancelled
    /// regardless. Returns the number of local streams cancelled.
    #[instrument(skip(self))]
    pub async fn cancel_all(&self) -> usize {
        if let Err(err) = self.backend.cancel_all().await {
            warn!(error = %err, "Backend cancel-all request failed");
        }

        let source_ids: Vec<String> = lock(&self.active).keys().cloned().collect();
        let mut cancelled = 0;
        for source_id in source_ids {
            if matches!(self.cancel(&source_id), Ok(true)) {
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Current polling decision from local and backend state
    pub fn polling_state(&self) -> PollingState {
        let local_running = self.jobs.borrow().any_running();
        PollingState::evaluate(local_running, &lock(&self.remote))
    }

    pub(crate) fn wake(&self) -> &Notify {
        &self.wake
    }

    /// Fetch the backend status once and react to transitions
    pub(crate) async fn poll_once(&self) {
        match self.backend.fetch_status().await {
            Ok(status) => self.apply_remote_status(status),
            Err(err) => warn!(error = %err, "Sync status poll failed"),
        }
    }

    fn apply_remote_status(&self, status: RemoteStatus) {
        let previous = std::mem::replace(&mut *lock(&self.remote), status.clone());
        let snapshot = self.snapshot();

        let mut changes = Vec::new();
        {
            let mut touched = lock(&self.touched);
            for source in &self.sources {
                let source_id = source.id.as_str();
                let was_in_progress = previous.in_progress(source_id);
                let in_progress = status.in_progress(source_id);
                let local_running = snapshot
                    .job(source_id)
                    .is_some_and(|job| job.status == SyncStatus::Running);

                if local_running {
                    touched.insert(source.id.clone());
                }
                // A local run stays claimed until the backend also reports it idle.
                let claimed = if local_running || in_progress {
                    touched.contains(source_id)
                } else {
                    touched.remove(source_id)
                };

                if was_in_progress != in_progress {
                    let finished_remotely = was_in_progress && !local_running && !claimed;
                    changes.push((source.id.clone(), in_progress, finished_remotely));
                }
            }
        }

        for (source_id, in_progress, finished_remotely) in changes {
            debug!(source_id = %source_id, in_progress, "Backend sync activity changed");
            self.emit(SyncEvent::RemoteActivity {
                source_id: source_id.clone(),
                in_progress,
            });

            if finished_remotely {
                info!(source_id = %source_id, "Backend-initiated sync finished");
                self.notify_completion(&source_id);
            }
        }
    }

    #[instrument(skip_all, fields(source_id = %source.id, run_id = %run_id))]
    async fn run_stream(
        self: Arc<Self>,
        source: SyncSourceConfig,
        run_id: SyncRunId,
        token: CancellationToken,
    ) {
        let result = core_async::select! {
            _ = token.cancelled() => Err(SyncError::Cancelled),
            result = self.drain(&source, run_id) => result,
        };

        match result {
            Ok(()) => debug!("Sync stream closed"),
            Err(err) if err.is_cancellation() => debug!("Sync stream aborted"),
            Err(err) => {
                warn!(error = %err, "Sync stream failed");
                self.fail_run(&source.id, run_id, err.to_string());
            }
        }

        self.settle(&source.id, run_id);
    }

    async fn drain(&self, source: &SyncSourceConfig, run_id: SyncRunId) -> Result<()> {
        let body = self.backend.open_stream(source).await?;
        let mut frames = frames(body);

        while let Some(frame) = frames.next().await {
            let Some(data) = frame?.data() else {
                continue;
            };

            match ProgressFrame::parse(&data) {
                Ok(progress) => self.apply_frame(&source.id, run_id, progress),
                Err(err) => warn!(error = %err, "Skipping malformed sync frame"),
            }
        }

        Ok(())
    }

    fn apply_frame(&self, source_id: &str, run_id: SyncRunId, frame: ProgressFrame) {
        let now = self.clock.now();
        let applied = self.modify_job(source_id, |job| {
            if !job.accepts(run_id) {
                return None;
            }
            match job.apply_frame(frame, now) {
                Ok(effect) => Some((effect, job.clone())),
                Err(err) => {
                    warn!(error = %err, "Frame rejected by job state");
                    None
                }
            }
        });

        let Some((effect, job)) = applied else {
            debug!("Ignoring frame for a finished run");
            return;
        };

        match effect {
            FrameEffect::Progress => {
                debug!(percent = job.percent, new_items = job.new_items, "Sync progress");
                self.emit(SyncEvent::Progress {
                    source_id: source_id.to_string(),
                    run_id: run_id.to_string(),
                    percent: job.percent,
                    current_item: job.current_item,
                    new_items: job.new_items,
                });
            }
            FrameEffect::Completed { new_items } => {
                info!(new_items, "Sync completed");
                self.emit(SyncEvent::Completed {
                    source_id: source_id.to_string(),
                    run_id: run_id.to_string(),
                    new_items,
                });
                self.notify_completion(source_id);
            }
            FrameEffect::Failed { message } => {
                warn!(error = %message, "Source reported sync error");
                self.emit(SyncEvent::Failed {
                    source_id: source_id.to_string(),
                    run_id: run_id.to_string(),
                    message,
                });
            }
        }
    }

    fn fail_run(&self, source_id: &str, run_id: SyncRunId, message: String) {
        let now = self.clock.now();
        let failed = self.modify_job(source_id, |job| {
            if !job.accepts(run_id) {
                return None;
            }
            job.fail(message.clone(), now).ok()
        });

        if failed.is_some() {
            self.emit(SyncEvent::Failed {
                source_id: source_id.to_string(),
                run_id: run_id.to_string(),
                message,
            });
        }
    }

    fn settle(&self, source_id: &str, run_id: SyncRunId) {
        {
            let mut active = lock(&self.active);
            if active
                .get(source_id)
                .is_some_and(|stream| stream.run_id == run_id)
            {
                active.remove(source_id);
            }
        }

        let settled = self.modify_job(source_id, |job| {
            if job.run_id != Some(run_id) || job.status == SyncStatus::Idle {
                return None;
            }
            job.settle().ok()
        });

        if settled.is_some() {
            debug!("Sync job settled to idle");
        }
    }

    fn source(&self, source_id: &str) -> Result<&SyncSourceConfig> {
        self.sources
            .iter()
            .find(|source| source.id == source_id)
            .ok_or_else(|| SyncError::UnknownSource {
                source_id: source_id.to_string(),
            })
    }

    /// Mutate one job and publish the snapshot if `mutate` returns `Some`
    fn modify_job<R>(
        &self,
        source_id: &str,
        mutate: impl FnOnce(&mut SyncJobState) -> Option<R>,
    ) -> Option<R> {
        let mut out = None;
        self.jobs.send_if_modified(|snapshot| match snapshot.job_mut(source_id) {
            Some(job) => {
                out = mutate(job);
                out.is_some()
            }
            None => false,
        });
        out
    }

    fn notify_completion(&self, source_id: &str) {
        let callback = match self.on_complete.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if let Some(callback) = callback {
            callback(source_id);
        }
    }

    fn emit(&self, event: SyncEvent) {
        self.events.emit(CoreEvent::Sync(event)).ok();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
