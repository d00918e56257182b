//! Event system for the sync engine.
//!
//! Sync cycles emit events instead of calling notification code directly,
//! so the UI and messaging layers outside this crate can subscribe without
//! the orchestrator knowing about them. Handlers are registered on a
//! dispatcher; a failing handler is logged and never aborts a cycle.

use crate::store::records::{PaymentStatus, ReconType, VoucherType};

use super::SyncError;
use super::stats::CycleStats;

/// Events crossing the boundary out of the sync core.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A voucher identity was seen for the first time. Existing identities
    /// are upserted silently, even when their content changed.
    VoucherCreated {
        guid: String,
        voucher_type: VoucherType,
        party: String,
        amount: f64,
    },
    /// A known voucher advanced its version with real field differences.
    VoucherChanged {
        guid: String,
        changed_fields: Vec<String>,
    },
    /// A bill's derived paid-state actually transitioned.
    PaymentStatusChanged {
        bill_ref: String,
        old: PaymentStatus,
        new: PaymentStatus,
    },
    /// A sync cycle ran to completion.
    CycleCompleted { stats: CycleStats },
    /// A sync cycle aborted; the domain is in Error until the next trigger.
    CycleFailed { kind: &'static str, error: String },
    /// One reconciliation recomputed its match set.
    ReconciliationCompleted {
        recon_type: ReconType,
        matched: usize,
        unmatched: usize,
    },
}

/// Trait for consumers of sync events.
#[async_trait::async_trait]
pub trait SyncEventHandler: Send + Sync {
    async fn handle(&mut self, event: &SyncEvent) -> Result<(), SyncError>;

    /// Name used in logs when this handler fails.
    fn name(&self) -> &'static str;
}

/// Fan-out dispatcher over registered handlers, called in registration
/// order. Handler errors are logged and swallowed.
pub struct EventDispatcher {
    handlers: Vec<Box<dyn SyncEventHandler>>,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn register_handler(&mut self, handler: Box<dyn SyncEventHandler>) {
        self.handlers.push(handler);
    }

    pub async fn dispatch(&mut self, event: &SyncEvent) {
        for handler in &mut self.handlers {
            if let Err(e) = handler.handle(event).await {
                tracing::error!(
                    handler = handler.name(),
                    error = %e,
                    "Event handler failed, continuing"
                );
            }
        }
    }
}

/// Handler that mirrors events into the log. Registered by default in the
/// binary so a bare deployment still has an audit trail.
pub struct LoggingEventHandler;

#[async_trait::async_trait]
impl SyncEventHandler for LoggingEventHandler {
    async fn handle(&mut self, event: &SyncEvent) -> Result<(), SyncError> {
        match event {
            SyncEvent::VoucherCreated {
                guid,
                voucher_type,
                party,
                amount,
            } => {
                tracing::info!(
                    guid = %guid,
                    voucher_type = voucher_type.as_remote(),
                    party = %party,
                    amount,
                    "New voucher"
                );
            }
            SyncEvent::VoucherChanged { guid, changed_fields } => {
                tracing::info!(guid = %guid, fields = ?changed_fields, "Voucher changed");
            }
            SyncEvent::PaymentStatusChanged { bill_ref, old, new } => {
                tracing::info!(bill_ref = %bill_ref, ?old, ?new, "Bill payment status changed");
            }
            SyncEvent::CycleCompleted { stats } => {
                tracing::info!("Cycle completed: {}", stats.summary());
            }
            SyncEvent::CycleFailed { kind, error } => {
                tracing::warn!(kind, error = %error, "Cycle failed");
            }
            SyncEvent::ReconciliationCompleted {
                recon_type,
                matched,
                unmatched,
            } => {
                tracing::info!(
                    recon = recon_type.as_str(),
                    matched,
                    unmatched,
                    "Reconciliation completed"
                );
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "LoggingEventHandler"
    }
}
