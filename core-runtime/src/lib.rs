//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the catalog client core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! Every domain crate logs through `tracing`, reads its tunables from
//! [`config::CoreConfig`], and publishes observable transitions on the
//! [`events::EventBus`].

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
