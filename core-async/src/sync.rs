//! Synchronization primitives.
//!
//! All primitives are `Send + Sync` and async-aware; holding one of the async
//! locks across an `.await` never blocks the executor. Short, non-awaiting
//! critical sections in the core use `std::sync::Mutex` instead.
//!
//! [`CancellationToken`] is the cooperative cancellation signal shared by the
//! query coordinator and the sync orchestrator: each in-flight operation owns
//! one token, and cancelling it never affects any other operation.
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::{CancellationToken, Mutex};
//!
//! async fn example() {
//!     let mutex = Mutex::new(42);
//!     *mutex.lock().await += 1;
//!
//!     let token = CancellationToken::new();
//!     token.cancel();
//!     assert!(token.is_cancelled());
//! }
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Mutex, MutexGuard, Notify, RwLock, RwLockReadGuard,
    RwLockWriteGuard,
};

pub use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFuture};
