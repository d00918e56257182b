//! Protocol client for the accounting engine's XML-over-HTTP interface.
//!
//! - `client`: throttled transport plus the typed read/write surface
//! - `envelope`: request builders for the collection/import schema
//! - `xml`: loose response tree that absorbs the engine's field-shape quirks
//! - `write`: ordered multi-shape mutation chain
//! - `types`: error taxonomy and structured write outcomes

pub mod client;
pub mod envelope;
pub mod types;
pub mod write;
pub mod xml;

pub use client::{DEFAULT_MIN_SPACING, HttpTransport, LedgerClient, Transport};
pub use types::{ProtocolError, TenantInfo, WriteAction, WriteOutcome};
