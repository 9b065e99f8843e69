//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop hosts
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`, with retry for buffered requests and a
//!   chunked body stream for the sync progress endpoints
//! - `NavigationHost` kept in memory, for hosts without a browser URL bar
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{InMemoryNavigation, ReqwestHttpClient};
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .base_url("http://localhost:5000")
//!     .http_client(Arc::new(ReqwestHttpClient::new()))
//!     .navigation(Arc::new(InMemoryNavigation::new()))
//!     .build()?;
//! ```

mod http;
mod navigation;

pub use http::ReqwestHttpClient;
pub use navigation::InMemoryNavigation;
