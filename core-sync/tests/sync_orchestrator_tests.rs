//! Orchestrator behaviour against a scripted backend under paused time.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bridge_traits::error::BridgeError;
use bridge_traits::http::ByteStream;
use bytes::Bytes;
use core_async::sync::broadcast;
use core_async::time::{timeout, Duration, Instant};
use core_runtime::config::SyncSourceConfig;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_sync::{
    PollingState, RemoteStatus, Result, StatusPoller, SyncBackend, SyncError, SyncOrchestrator,
    SyncStatus,
};
use futures::stream::{self, StreamExt};

/// One chunk of a scripted stream, delivered after `delay`
#[derive(Clone)]
enum Step {
    Chunk(Duration, &'static str),
    Fail(Duration),
}

/// What happens once every step has been delivered
#[derive(Clone, Copy, PartialEq)]
enum Tail {
    Close,
    Hang,
}

#[derive(Clone)]
struct Script {
    steps: Vec<Step>,
    tail: Tail,
}

impl Script {
    fn new(tail: Tail) -> Self {
        Self {
            steps: Vec::new(),
            tail,
        }
    }

    fn chunk(mut self, delay_ms: u64, data: &'static str) -> Self {
        self.steps.push(Step::Chunk(Duration::from_millis(delay_ms), data));
        self
    }

    fn fail(mut self, delay_ms: u64) -> Self {
        self.steps.push(Step::Fail(Duration::from_millis(delay_ms)));
        self
    }

    fn into_stream(self) -> ByteStream {
        let tail = self.tail;
        let steps = stream::iter(self.steps).then(|step| async move {
            match step {
                Step::Chunk(delay, data) => {
                    core_async::sleep(delay).await;
                    Ok(Bytes::from_static(data.as_bytes()))
                }
                Step::Fail(delay) => {
                    core_async::sleep(delay).await;
                    Err(BridgeError::OperationFailed("connection reset".into()))
                }
            }
        });

        if tail == Tail::Hang {
            steps.chain(stream::pending()).boxed()
        } else {
            steps.boxed()
        }
    }
}

#[derive(Default)]
struct ScriptedBackend {
    streams: Mutex<HashMap<String, VecDeque<Script>>>,
    statuses: Mutex<VecDeque<RemoteStatus>>,
    polls: Mutex<Vec<Instant>>,
    cancel_all_calls: Mutex<usize>,
    cancel_all_fails: bool,
}

impl ScriptedBackend {
    fn new() -> Self {
        Self::default()
    }

    fn failing_cancel_all() -> Self {
        Self {
            cancel_all_fails: true,
            ..Self::default()
        }
    }

    fn script(self, source_id: &str, script: Script) -> Self {
        self.streams
            .lock()
            .unwrap()
            .entry(source_id.to_string())
            .or_default()
            .push_back(script);
        self
    }

    fn status(self, status: RemoteStatus) -> Self {
        self.statuses.lock().unwrap().push_back(status);
        self
    }

    fn poll_offsets(&self, origin: Instant) -> Vec<u64> {
        self.polls
            .lock()
            .unwrap()
            .iter()
            .map(|at| at.duration_since(origin).as_secs())
            .collect()
    }
}

#[async_trait]
impl SyncBackend for ScriptedBackend {
    async fn open_stream(&self, source: &SyncSourceConfig) -> Result<ByteStream> {
        let script = self
            .streams
            .lock()
            .unwrap()
            .get_mut(&source.id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Script::new(Tail::Close));
        Ok(script.into_stream())
    }

    async fn fetch_status(&self) -> Result<RemoteStatus> {
        self.polls.lock().unwrap().push(Instant::now());
        Ok(self.statuses.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn cancel_all(&self) -> Result<()> {
        *self.cancel_all_calls.lock().unwrap() += 1;
        if self.cancel_all_fails {
            Err(SyncError::Bridge(BridgeError::Http {
                status: 503,
                message: "unavailable".into(),
            }))
        } else {
            Ok(())
        }
    }
}

struct Harness {
    backend: Arc<ScriptedBackend>,
    orchestrator: Arc<SyncOrchestrator>,
    events: broadcast::Receiver<CoreEvent>,
    completions: Arc<Mutex<Vec<String>>>,
}

fn harness(backend: ScriptedBackend) -> Harness {
    let backend = Arc::new(backend);
    let bus = EventBus::new(64);
    let events = bus.subscribe();

    let orchestrator = Arc::new(
        SyncOrchestrator::new(
            backend.clone(),
            vec![
                SyncSourceConfig::new("chub", "Chub", "/api/sync/chub"),
                SyncSourceConfig::new("local", "Local", "/api/sync/local"),
            ],
            bus,
        )
        .with_poll_interval(Duration::from_secs(2)),
    );

    let completions = Arc::new(Mutex::new(Vec::new()));
    let sink = completions.clone();
    orchestrator.set_completion_callback(move |id| sink.lock().unwrap().push(id.to_string()));

    Harness {
        backend,
        orchestrator,
        events,
        completions,
    }
}

impl Harness {
    async fn wait_for_outcome(&self, source_id: &str) {
        let mut updates = self.orchestrator.subscribe();
        let settled = async {
            loop {
                let job = self.orchestrator.job(source_id).unwrap();
                if job.status == SyncStatus::Idle && job.last_outcome.is_some() {
                    return;
                }
                updates.changed().await.unwrap();
            }
        };
        timeout(Duration::from_secs(60), settled)
            .await
            .expect("job never settled");
    }

    fn drain_sync_events(&mut self) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            if let CoreEvent::Sync(event) = event {
                events.push(event);
            }
        }
        events
    }

    fn completions(&self) -> Vec<String> {
        self.completions.lock().unwrap().clone()
    }
}

#[core_async::test(start_paused)]
async fn test_stream_progress_then_completion() {
    let backend = ScriptedBackend::new().script(
        "chub",
        Script::new(Tail::Close)
            .chunk(10, "data: {\"progress\":10,\"name\":\"X\",\"added\":0}\n\n")
            .chunk(10, "data: {\"progress\":100,\"newCards\":4}\n\n"),
    );
    let mut h = harness(backend);

    let run_id = h.orchestrator.start("chub").unwrap();
    h.wait_for_outcome("chub").await;

    let job = h.orchestrator.job("chub").unwrap();
    let outcome = job.last_outcome.clone().unwrap();
    assert_eq!(outcome.run_id, run_id);
    assert_eq!(outcome.status, SyncStatus::Completed);
    assert_eq!(outcome.new_items, 4);
    assert!(job.status_text.contains("complete"));
    assert!(job.status_text.contains('4'));
    assert_eq!(h.completions(), vec!["chub".to_string()]);

    let events = h.drain_sync_events();
    assert!(matches!(&events[0], SyncEvent::Started { source_id, .. } if source_id == "chub"));
    assert!(matches!(
        &events[1],
        SyncEvent::Progress { percent: 10, current_item: Some(item), new_items: 0, .. } if item == "X"
    ));
    assert!(matches!(&events[2], SyncEvent::Completed { new_items: 4, .. }));
    assert_eq!(events.len(), 3);
}

#[core_async::test(start_paused)]
async fn test_frames_split_across_chunks_are_applied() {
    let backend = ScriptedBackend::new().script(
        "chub",
        Script::new(Tail::Close)
            .chunk(5, "data: {\"progr")
            .chunk(5, "ess\":100,\"newCards\":1}\r\n")
            .chunk(5, "\r\n"),
    );
    let h = harness(backend);

    h.orchestrator.start("chub").unwrap();
    h.wait_for_outcome("chub").await;

    let outcome = h.orchestrator.job("chub").unwrap().last_outcome.unwrap();
    assert_eq!(outcome.status, SyncStatus::Completed);
    assert_eq!(outcome.new_items, 1);
}

#[core_async::test(start_paused)]
async fn test_malformed_frame_is_skipped() {
    let backend = ScriptedBackend::new().script(
        "chub",
        Script::new(Tail::Close)
            .chunk(10, "data: {not json}\n\n")
            .chunk(10, ": keep-alive\n\n")
            .chunk(10, "data: {\"progress\":100,\"newCards\":2}\n\n"),
    );
    let h = harness(backend);

    h.orchestrator.start("chub").unwrap();
    h.wait_for_outcome("chub").await;

    let outcome = h.orchestrator.job("chub").unwrap().last_outcome.unwrap();
    assert_eq!(outcome.status, SyncStatus::Completed);
    assert_eq!(outcome.new_items, 2);
}

#[core_async::test(start_paused)]
async fn test_error_frame_fails_and_later_frames_are_ignored() {
    let backend = ScriptedBackend::new().script(
        "chub",
        Script::new(Tail::Close)
            .chunk(10, "data: {\"error\":\"rate limited\"}\n\n")
            .chunk(10, "data: {\"progress\":100,\"newCards\":9}\n\n"),
    );
    let mut h = harness(backend);

    h.orchestrator.start("chub").unwrap();
    h.wait_for_outcome("chub").await;
    core_async::sleep(Duration::from_millis(50)).await;

    let job = h.orchestrator.job("chub").unwrap();
    let outcome = job.last_outcome.clone().unwrap();
    assert_eq!(outcome.status, SyncStatus::Failed);
    assert!(job.status_text.contains("rate limited"));
    assert_eq!(job.new_items, 0);
    assert!(h.completions().is_empty());

    let events = h.drain_sync_events();
    assert!(events.iter().any(|e| matches!(e, SyncEvent::Failed { .. })));
    assert!(!events.iter().any(|e| matches!(e, SyncEvent::Completed { .. })));
}

#[core_async::test(start_paused)]
async fn test_transport_error_fails_running_job() {
    let backend = ScriptedBackend::new().script(
        "chub",
        Script::new(Tail::Close)
            .chunk(10, "data: {\"progress\":40}\n\n")
            .fail(10),
    );
    let h = harness(backend);

    h.orchestrator.start("chub").unwrap();
    h.wait_for_outcome("chub").await;

    let job = h.orchestrator.job("chub").unwrap();
    assert_eq!(job.last_outcome.unwrap().status, SyncStatus::Failed);
    assert!(job.status_text.contains("connection reset"));
}

#[core_async::test(start_paused)]
async fn test_restart_isolates_runs() {
    let backend = ScriptedBackend::new()
        .script(
            "chub",
            Script::new(Tail::Close)
                .chunk(10, "data: {\"progress\":10}\n\n")
                .chunk(500, "data: {\"progress\":100,\"newCards\":7}\n\n"),
        )
        .script(
            "chub",
            Script::new(Tail::Hang).chunk(10, "data: {\"progress\":50,\"newCards\":1}\n\n"),
        );
    let mut h = harness(backend);

    let first = h.orchestrator.start("chub").unwrap();
    core_async::sleep(Duration::from_millis(20)).await;
    let second = h.orchestrator.start("chub").unwrap();
    assert_ne!(first, second);

    core_async::sleep(Duration::from_secs(1)).await;

    let job = h.orchestrator.job("chub").unwrap();
    assert_eq!(job.status, SyncStatus::Running);
    assert_eq!(job.run_id, Some(second));
    assert_eq!(job.percent, 50);
    assert_eq!(job.new_items, 1);
    assert!(h.completions().is_empty());

    let events = h.drain_sync_events();
    let first_id = first.to_string();
    assert!(events.iter().any(|e| matches!(
        e,
        SyncEvent::Cancelled { run_id: Some(id), .. } if *id == first_id
    )));
    assert!(!events.iter().any(|e| matches!(e, SyncEvent::Completed { .. })));
}

#[core_async::test(start_paused)]
async fn test_cancel_leaves_other_sources_running() {
    let backend = ScriptedBackend::new()
        .script(
            "chub",
            Script::new(Tail::Hang).chunk(10, "data: {\"progress\":20}\n\n"),
        )
        .script(
            "local",
            Script::new(Tail::Hang).chunk(10, "data: {\"progress\":30}\n\n"),
        );
    let h = harness(backend);

    h.orchestrator.start("chub").unwrap();
    h.orchestrator.start("local").unwrap();
    core_async::sleep(Duration::from_millis(50)).await;

    assert!(h.orchestrator.cancel("chub").unwrap());
    h.wait_for_outcome("chub").await;

    let chub = h.orchestrator.job("chub").unwrap();
    assert_eq!(chub.last_outcome.unwrap().status, SyncStatus::Cancelled);
    assert_eq!(chub.status_text, core_sync::CANCELLED_TEXT);

    let local = h.orchestrator.job("local").unwrap();
    assert_eq!(local.status, SyncStatus::Running);
    assert_eq!(local.percent, 30);

    assert!(!h.orchestrator.cancel("chub").unwrap());
}

#[core_async::test(start_paused)]
async fn test_cancel_all_survives_failed_control_request() {
    let backend = ScriptedBackend::failing_cancel_all()
        .script("chub", Script::new(Tail::Hang))
        .script("local", Script::new(Tail::Hang));
    let h = harness(backend);

    h.orchestrator.start("chub").unwrap();
    h.orchestrator.start("local").unwrap();
    core_async::sleep(Duration::from_millis(10)).await;

    assert_eq!(h.orchestrator.cancel_all().await, 2);
    assert_eq!(*h.backend.cancel_all_calls.lock().unwrap(), 1);

    h.wait_for_outcome("chub").await;
    h.wait_for_outcome("local").await;
    for job in h.orchestrator.snapshot().jobs {
        assert_eq!(job.last_outcome.unwrap().status, SyncStatus::Cancelled);
    }
}

#[core_async::test(start_paused)]
async fn test_poller_stays_quiet_at_rest_and_follows_local_run() {
    let backend = ScriptedBackend::new().script(
        "chub",
        Script::new(Tail::Close)
            .chunk(2500, "data: {\"progress\":10}\n\n")
            .chunk(2500, "data: {\"progress\":100,\"newCards\":1}\n\n"),
    );
    let h = harness(backend);
    let origin = Instant::now();

    let _poller = StatusPoller::spawn(h.orchestrator.clone());
    core_async::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.backend.poll_offsets(origin), vec![0]);
    assert_eq!(h.orchestrator.polling_state(), PollingState::Suspended);

    h.orchestrator.start("chub").unwrap();
    assert_eq!(h.orchestrator.polling_state(), PollingState::Active);

    core_async::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.backend.poll_offsets(origin), vec![0, 12, 14, 16]);
    assert_eq!(h.orchestrator.polling_state(), PollingState::Suspended);
    assert_eq!(h.completions(), vec!["chub".to_string()]);
}

#[core_async::test(start_paused)]
async fn test_poller_reports_backend_initiated_completion() {
    let backend = ScriptedBackend::new()
        .status(RemoteStatus::new().with_source("chub", true))
        .status(RemoteStatus::new().with_source("chub", true))
        .status(RemoteStatus::new().with_source("chub", false));
    let mut h = harness(backend);
    let origin = Instant::now();

    let poller = StatusPoller::spawn(h.orchestrator.clone());
    core_async::sleep(Duration::from_secs(20)).await;

    assert_eq!(h.backend.poll_offsets(origin), vec![0, 2, 4]);
    assert_eq!(h.completions(), vec!["chub".to_string()]);

    let activity: Vec<bool> = h
        .drain_sync_events()
        .into_iter()
        .filter_map(|e| match e {
            SyncEvent::RemoteActivity { in_progress, .. } => Some(in_progress),
            _ => None,
        })
        .collect();
    assert_eq!(activity, vec![true, false]);

    poller.stop();
}

#[core_async::test(start_paused)]
async fn test_progress_rounding_up_does_not_complete() {
    let backend = ScriptedBackend::new().script(
        "chub",
        Script::new(Tail::Close)
            .chunk(10, "data: {\"progress\":99.6,\"currentCard\":\"Last\",\"newCards\":3}\n\n")
            .chunk(500, "data: {\"progress\":100,\"newCards\":3}\n\n"),
    );
    let mut h = harness(backend);

    h.orchestrator.start("chub").unwrap();
    core_async::sleep(Duration::from_millis(100)).await;

    let job = h.orchestrator.job("chub").unwrap();
    assert_eq!(job.status, SyncStatus::Running);
    assert_eq!(job.percent, 100);
    assert!(job.last_outcome.is_none());
    assert!(h.completions().is_empty());
    assert!(!h
        .drain_sync_events()
        .iter()
        .any(|e| matches!(e, SyncEvent::Completed { .. })));

    h.wait_for_outcome("chub").await;
    let outcome = h.orchestrator.job("chub").unwrap().last_outcome.unwrap();
    assert_eq!(outcome.status, SyncStatus::Completed);
    assert_eq!(h.completions(), vec!["chub".to_string()]);
}

#[core_async::test(start_paused)]
async fn test_lagging_backend_status_does_not_repeat_completion() {
    let backend = ScriptedBackend::new()
        .script(
            "chub",
            Script::new(Tail::Close).chunk(500, "data: {\"progress\":100,\"newCards\":2}\n\n"),
        )
        .status(RemoteStatus::new().with_source("chub", true))
        .status(RemoteStatus::new().with_source("chub", true))
        .status(RemoteStatus::new().with_source("chub", false));
    let mut h = harness(backend);
    let origin = Instant::now();

    h.orchestrator.start("chub").unwrap();
    let poller = StatusPoller::spawn(h.orchestrator.clone());

    core_async::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.completions(), vec!["chub".to_string()]);

    core_async::sleep(Duration::from_secs(20)).await;
    assert_eq!(h.backend.poll_offsets(origin), vec![0, 2, 4]);
    assert_eq!(h.completions(), vec!["chub".to_string()]);
    assert_eq!(h.orchestrator.polling_state(), PollingState::Suspended);

    let activity: Vec<bool> = h
        .drain_sync_events()
        .into_iter()
        .filter_map(|e| match e {
            SyncEvent::RemoteActivity { in_progress, .. } => Some(in_progress),
            _ => None,
        })
        .collect();
    assert_eq!(activity, vec![true, false]);

    poller.stop();
}
