//! Mirror-and-reconcile engine for a polling XML-over-HTTP accounting
//! system.
//!
//! The engine keeps a local mirror of vouchers and master data in sync with
//! the remote ledger engine through versioned incremental pulls, tracks
//! field-level history of every change, pushes locally created invoices
//! back through a chain of write shapes, and reconciles the ledger against
//! bank statement and payment-gateway feeds with confidence-scored
//! matchers.

pub mod config;
pub mod protocol;
pub mod recon;
pub mod store;
pub mod sync;

pub use config::AppConfig;
pub use protocol::{HttpTransport, LedgerClient, ProtocolError};
pub use recon::{ReconConfig, Reconciler};
pub use store::persistence::FileStateRepository;
pub use store::{MirrorStore, StoreSettings};
pub use sync::{OrchestratorSettings, SyncOrchestrator};
