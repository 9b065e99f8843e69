//! Runtime abstraction layer for the catalog client core.
//!
//! Every core-* and bridge-* crate goes through this crate instead of naming
//! the executor directly. The surface is intentionally small: spawning,
//! timers, synchronization primitives, cooperative cancellation and a
//! `block_on` entry point for tests and binaries.
//!
//! # Modules
//!
//! - `task`: Task spawning and join handles
//! - `time`: Sleep, intervals, deadlines and instants
//! - `sync`: Mutexes, channels, `Notify` and `CancellationToken`
//! - `runtime`: `block_on` helpers (real clock and paused clock)
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::CancellationToken;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let token = CancellationToken::new();
//!     let child = token.clone();
//!
//!     let handle = core_async::spawn(async move {
//!         core_async::select! {
//!             _ = child.cancelled() => None,
//!             _ = sleep(Duration::from_secs(5)) => Some(42),
//!         }
//!     });
//!
//!     token.cancel();
//!     assert_eq!(handle.await.unwrap(), None);
//! }
//! ```

// Re-export the async entry-point/test macros so downstream crates never need
// direct Tokio dependencies.
pub use core_async_macros::{main, test};

pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

// Racing futures against cancellation is common enough in the core that the
// macro is re-exported alongside the rest of the runtime surface.
pub use tokio::select;

pub use task::spawn;
pub use time::{sleep, Duration, Instant};
