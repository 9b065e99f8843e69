//! # Host Bridge Traits
//!
//! Capability contracts the catalog client core needs from its host.
//!
//! ## Overview
//!
//! The core never talks to the network, the navigable location, or the
//! host's log pipeline directly. Each of those is a trait defined here and
//! implemented per host: `bridge-desktop` ships the native adapters, and an
//! embedding UI may inject its own.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Buffered and streaming HTTP with retry
//! - [`NavigationHost`](navigation::NavigationHost) - Read/replace the navigable location
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with descriptive errors when a required capability is missing:
//!
//! ```ignore
//! let http_client = builder.http_client.ok_or_else(|| Error::CapabilityMissing {
//!     capability: "HttpClient".to_string(),
//!     message: "No HTTP client implementation provided. \
//!               Desktop: enable the `desktop-shims` feature. \
//!               Embedded: inject a host adapter.".to_string(),
//! })?;
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Cancellation is
//! reported as [`BridgeError::Cancelled`] so callers can tell an abandoned
//! request from a failed one.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds so adapters can be shared
//! across async tasks behind an `Arc`.

pub mod error;
pub mod http;
pub mod navigation;
pub mod time;

pub use error::BridgeError;

pub use http::{
    ByteStream, HttpClient, HttpMethod, HttpRequest, HttpResponse, HttpStreamResponse, RetryPolicy,
};
pub use navigation::NavigationHost;
pub use time::{Clock, ConsoleLogger, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
