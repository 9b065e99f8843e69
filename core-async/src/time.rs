//! Time-related abstractions.
//!
//! Re-exports Tokio's timer primitives together with the standard library's
//! duration and clock types. Under a paused runtime (see
//! [`runtime::block_on_paused`](crate::runtime::block_on_paused)) `Instant`
//! from this module follows the virtual clock, so code measuring elapsed time
//! must use it rather than `std::time::Instant`.
//!
//! # Examples
//!
//! ```rust
//! use core_async::time::{sleep, Duration, Instant};
//!
//! async fn example() {
//!     let start = Instant::now();
//!     sleep(Duration::from_millis(10)).await;
//!     assert!(start.elapsed() >= Duration::from_millis(10));
//! }
//! ```

pub use tokio::time::{
    advance, interval, sleep, sleep_until, timeout, Instant, Interval, MissedTickBehavior, Sleep, Timeout,
};

pub use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Returns the current time as milliseconds since UNIX_EPOCH.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
