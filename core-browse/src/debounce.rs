//! # Debouncing
//!
//! [`Debouncer`] is the clock-injected state machine: every `push` replaces
//! the pending value and moves its deadline, and `poll` only yields a value
//! once its deadline has passed. [`DebounceGate`] drives one `Debouncer` from
//! a background task and hands committed values to a callback.
//!
//! Each gate owns its own timer, so the free-text query and the expression
//! field never delay each other.

use core_async::sync::mpsc;
use core_async::task::JoinHandle;
use core_async::time::{sleep_until, Duration, Instant};
use tracing::trace;

#[derive(Debug)]
struct Pending<T> {
    value: T,
    deadline: Instant,
}

/// Pure debounce state machine.
#[derive(Debug)]
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<Pending<T>>,
    edits: u64,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
            edits: 0,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Records a new value at `now`, superseding any pending one.
    ///
    /// Returns the edit counter, which increases by one per push.
    pub fn push(&mut self, value: T, now: Instant) -> u64 {
        self.edits += 1;
        self.pending = Some(Pending {
            value,
            deadline: now + self.delay,
        });
        self.edits
    }

    /// Takes the pending value if its quiet period has elapsed at `now`.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some(pending) if pending.deadline <= now => self.pending.take().map(|p| p.value),
            _ => None,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    /// Takes the pending value regardless of its deadline.
    pub fn flush(&mut self) -> Option<T> {
        self.pending.take().map(|p| p.value)
    }

    /// Drops the pending value. Returns `true` if one was dropped.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn edits(&self) -> u64 {
        self.edits
    }
}

enum Command<T> {
    /// Value and the instant it was pushed
    Push(T, Instant),
    Flush,
    Cancel,
}

/// Async debounce gate backed by a single background task.
///
/// Must be created inside a runtime. Dropping the gate stops the task and
/// discards any pending value.
pub struct DebounceGate<T> {
    commands: mpsc::UnboundedSender<Command<T>>,
    task: JoinHandle<()>,
}

impl<T: Send + 'static> DebounceGate<T> {
    pub fn new<F>(delay: Duration, emit: F) -> Self
    where
        F: Fn(T) + Send + 'static,
    {
        let (commands, receiver) = mpsc::unbounded_channel();
        let task = core_async::spawn(run_gate(Debouncer::new(delay), receiver, emit));
        Self { commands, task }
    }

    /// Queues a value. Never blocks.
    ///
    /// The quiet period starts now, not when the gate task gets to it.
    pub fn push(&self, value: T) {
        self.send(Command::Push(value, Instant::now()));
    }

    /// Commits the pending value immediately, if any.
    pub fn flush(&self) {
        self.send(Command::Flush);
    }

    /// Drops the pending value without emitting it.
    pub fn cancel(&self) {
        self.send(Command::Cancel);
    }

    fn send(&self, command: Command<T>) {
        if self.commands.send(command).is_err() {
            trace!("debounce gate task already stopped");
        }
    }
}

impl<T> Drop for DebounceGate<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_gate<T, F>(
    mut debouncer: Debouncer<T>,
    mut commands: mpsc::UnboundedReceiver<Command<T>>,
    emit: F,
) where
    F: Fn(T),
{
    loop {
        let deadline = debouncer.deadline();

        core_async::select! {
            command = commands.recv() => match command {
                Some(Command::Push(value, pushed_at)) => {
                    let edits = debouncer.push(value, pushed_at);
                    trace!(edits, "debounce value queued");
                }
                Some(Command::Flush) => {
                    if let Some(value) = debouncer.flush() {
                        emit(value);
                    }
                }
                Some(Command::Cancel) => {
                    debouncer.cancel();
                }
                None => break,
            },
            // The deadline expression is evaluated even while disabled.
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if let Some(value) = debouncer.poll(Instant::now()) {
                    emit(value);
                }
            }
        }
    }
}
