//! Synchronization engine.
//!
//! - `orchestrator`: timer-driven and on-demand cycles with single-flight
//!   protection per domain
//! - `events`: event types, handler trait and dispatcher for the boundary
//!   out of the core
//! - `stats`: per-cycle statistics

pub mod events;
pub mod orchestrator;
pub mod stats;

pub use events::{EventDispatcher, LoggingEventHandler, SyncEvent, SyncEventHandler};
pub use orchestrator::{OrchestratorSettings, SyncOrchestrator};
pub use stats::CycleStats;

use crate::protocol::ProtocolError;
use crate::store::StoreError;

/// Errors surfaced by sync cycles.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A cycle for this domain is already in flight. The trigger is
    /// rejected immediately; nothing is queued and no state was touched.
    #[error("{0} sync already in progress")]
    AlreadyRunning(&'static str),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Internal(String),
}
