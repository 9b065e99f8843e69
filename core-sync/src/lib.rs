//! # Sync Module
//!
//! Drives streaming sync jobs against the catalog backend.
//!
//! ## Overview
//!
//! Each configured source owns one job. Starting a source opens a long-lived
//! progress stream whose frames update that job; a completed run notifies the
//! registered completion callback so the browse view can refresh. A status
//! poller watches for jobs the backend started on its own and goes quiet when
//! nothing is running.
//!
//! ## Components
//!
//! - **Job State** (`job`): per-source status machine with run-id guarded updates
//! - **Frame Decoder** (`frame`): chunk-boundary safe splitting of the byte stream
//! - **Progress Payload** (`payload`): tolerant parsing of one frame's JSON
//! - **Backend** (`backend`): stream, status and cancel-all endpoints
//! - **Orchestrator** (`orchestrator`): start, cancel and cancel-all across sources
//! - **Poller** (`poller`): Active/Suspended status polling supervisor

pub mod backend;
pub mod error;
pub mod frame;
pub mod job;
pub mod orchestrator;
pub mod payload;
pub mod poller;

pub use backend::{HttpSyncBackend, RemoteStatus, SyncBackend, CANCEL_ALL_PATH, STATUS_PATH};
pub use error::{Result, SyncError};
pub use frame::{frames, Frame, FrameDecoder};
pub use job::{FrameEffect, SyncJobState, SyncOutcome, SyncRunId, SyncStatus, CANCELLED_TEXT};
pub use orchestrator::{CompletionCallback, SyncOrchestrator, SyncSnapshot};
pub use payload::ProgressFrame;
pub use poller::{PollingState, StatusPoller};
