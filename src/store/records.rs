//! Record types held in the local mirror.
//!
//! Everything here mirrors state owned by external systems: the accounting
//! engine (vouchers, masters), the bank statement feed and the payment
//! gateway feed. Records carry the external system's own identity scheme and
//! are never physically removed once ingested.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Voucher classification as reported by the accounting engine.
///
/// The stored amount is always an unsigned magnitude; debit/credit direction
/// is derived from this type alone, never from the sign the engine sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoucherType {
    Sales,
    CreditSales,
    Receipt,
    Payment,
    Journal,
    PendingSalesBill,
    Other(String),
}

impl VoucherType {
    /// Parse the engine's display name for a voucher type.
    pub fn from_remote(name: &str) -> Self {
        match name.trim() {
            "Sales" => VoucherType::Sales,
            "Credit Sales" => VoucherType::CreditSales,
            "Receipt" => VoucherType::Receipt,
            "Payment" => VoucherType::Payment,
            "Journal" => VoucherType::Journal,
            "Pending Sales Bill" => VoucherType::PendingSalesBill,
            other => VoucherType::Other(other.to_string()),
        }
    }

    pub fn as_remote(&self) -> &str {
        match self {
            VoucherType::Sales => "Sales",
            VoucherType::CreditSales => "Credit Sales",
            VoucherType::Receipt => "Receipt",
            VoucherType::Payment => "Payment",
            VoucherType::Journal => "Journal",
            VoucherType::PendingSalesBill => "Pending Sales Bill",
            VoucherType::Other(name) => name,
        }
    }

    /// True for types that move money into the business.
    pub fn is_inflow(&self) -> bool {
        matches!(
            self,
            VoucherType::Sales
                | VoucherType::CreditSales
                | VoucherType::Receipt
                | VoucherType::PendingSalesBill
        )
    }

    /// Signed amount for downstream arithmetic, reconstructed from the type.
    pub fn signed_amount(&self, magnitude: f64) -> f64 {
        if self.is_inflow() { magnitude } else { -magnitude }
    }

    /// Types a voucher of this type is known to be repurposed into by the
    /// engine's workflow (same record mutated in place, identity lost).
    pub fn conversion_targets(&self) -> &'static [VoucherType] {
        match self {
            VoucherType::PendingSalesBill => &[VoucherType::Sales, VoucherType::CreditSales],
            VoucherType::Sales => &[VoucherType::CreditSales],
            _ => &[],
        }
    }
}

/// Lifecycle of a mirrored voucher. Records absent from a full remote dump
/// are soft-marked, never deleted locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Lifecycle {
    Active,
    Converted { target: VoucherType },
    Deleted { reason: String },
}

/// Reasons a voucher is flagged for human attention. The set is additive and
/// self-healing: each reason is re-derived on every mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CriticalReason {
    /// Payment-mode total is nonzero but does not reconcile with the face amount.
    PaymentMismatch,
    /// Record was human-marked audited and was altered afterwards.
    AlteredAfterAudit,
    /// Voucher date lies in the future relative to processing time.
    FutureDated,
}

/// Paid-state of a bill derived from its linked receipts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
}

/// Per-mode sub-amounts attached to a voucher. The engine reports up to
/// seven modes; absent modes come through as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentModes {
    pub cash: f64,
    pub cheque: f64,
    pub card: f64,
    pub upi: f64,
    pub netbanking: f64,
    pub wallet: f64,
    pub other: f64,
}

impl PaymentModes {
    pub fn total(&self) -> f64 {
        self.cash + self.cheque + self.card + self.upi + self.netbanking + self.wallet + self.other
    }
}

/// A mirrored voucher from the accounting engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoucherRecord {
    /// Stable external identity.
    pub guid: String,
    /// Secondary numeric identity assigned by the engine.
    pub master_id: u64,
    /// Monotonic per-record version counter from the engine.
    pub alter_id: u64,
    pub voucher_type: VoucherType,
    pub date: NaiveDate,
    pub party: String,
    /// Unsigned magnitude. See [`VoucherType::signed_amount`].
    pub amount: f64,
    pub narration: String,
    pub payment_modes: PaymentModes,
    /// Bill this voucher settles against, when the engine links one.
    pub bill_ref: Option<String>,
    pub critical_reasons: BTreeSet<CriticalReason>,
    /// Set by a human reviewer through the query surface, never by sync.
    pub audited: bool,
    pub lifecycle: Lifecycle,
}

impl VoucherRecord {
    pub fn is_critical(&self) -> bool {
        !self.critical_reasons.is_empty()
    }
}

/// Immutable pre-mutation copy of a voucher, captured before every
/// version-advancing upsert. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoucherHistorySnapshot {
    pub guid: String,
    /// Per-identity sequence number, starting at 1.
    pub seq: u64,
    pub from_alter_id: u64,
    pub to_alter_id: u64,
    pub record: VoucherRecord,
    pub recorded_at: DateTime<Utc>,
}

/// One row per differing tracked field per mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChangeEntry {
    pub guid: String,
    pub from_alter_id: u64,
    pub to_alter_id: u64,
    pub field: String,
    pub old: String,
    pub new: String,
}

/// Independent synchronization domains, each with its own cursor and
/// single-flight guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncDomain {
    Vouchers,
    StockItems,
    Parties,
}

impl SyncDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncDomain::Vouchers => "vouchers",
            SyncDomain::StockItems => "stock_items",
            SyncDomain::Parties => "parties",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    Idle,
    Syncing,
    Error,
}

/// High-water mark for one sync domain. Never decreases; advances only after
/// a batch has fully committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCursor {
    pub domain: SyncDomain,
    pub high_water: u64,
    pub status: SyncStatus,
    pub last_error: Option<String>,
}

impl SyncCursor {
    pub fn new(domain: SyncDomain) -> Self {
        Self {
            domain,
            high_water: 0,
            status: SyncStatus::Idle,
            last_error: None,
        }
    }
}

/// Master record for a stock item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockItem {
    pub name: String,
    pub alter_id: u64,
    pub closing_qty: f64,
    pub closing_value: f64,
}

/// Master record for a party (a ledger account in the engine's terms).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Party {
    pub name: String,
    pub guid: String,
    pub alter_id: u64,
    pub closing_balance: f64,
}

/// An open receivable bill reported by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    pub bill_ref: String,
    pub party: String,
    pub amount: f64,
    pub date: NaiveDate,
    pub status: PaymentStatus,
}

/// Direction of a bank statement line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BankDirection {
    Credit,
    Debit,
}

/// Raw bank statement line. Day-granularity timestamps, bank's own ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankTransaction {
    pub id: String,
    pub date: NaiveDate,
    pub amount: f64,
    pub direction: BankDirection,
    pub narration: String,
}

/// Raw payment-gateway transaction. Settles to the bank in date-grouped
/// batches, typically lagged a day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayTransaction {
    pub id: String,
    pub date: NaiveDate,
    pub amount: f64,
    pub fee: f64,
}

/// A money movement extracted from the accounting engine for reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub date: NaiveDate,
    pub amount: f64,
    pub party: String,
}

/// The three pairwise reconciliations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReconType {
    LedgerBank,
    GatewayBank,
    GatewayLedger,
}

impl ReconType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconType::LedgerBank => "ledger_bank",
            ReconType::GatewayBank => "gateway_bank",
            ReconType::GatewayLedger => "gateway_ledger",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStatus {
    Matched,
    Unmatched,
    /// Placed by a human; survives automatic recomputation.
    ManualMatch,
}

/// Outcome row for one source record of a reconciliation run. Unmatched
/// records are persisted too so reconciliation gaps stay queryable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationMatch {
    pub recon_type: ReconType,
    pub source_ref: String,
    pub source_amount: f64,
    pub target_ref: Option<String>,
    pub target_amount: Option<f64>,
    pub status: MatchStatus,
    /// In [0, 1]. Zero for unmatched rows.
    pub confidence: f64,
}

/// Locally created invoice awaiting acceptance by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundInvoice {
    pub local_id: String,
    pub voucher: VoucherRecord,
    pub attempts: u32,
    pub accepted: bool,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_amount_follows_type_not_sign() {
        assert_eq!(VoucherType::Sales.signed_amount(150.0), 150.0);
        assert_eq!(VoucherType::Payment.signed_amount(150.0), -150.0);
        assert_eq!(VoucherType::Journal.signed_amount(75.0), -75.0);
    }

    #[test]
    fn voucher_type_round_trips_remote_names() {
        for name in ["Sales", "Credit Sales", "Receipt", "Pending Sales Bill"] {
            assert_eq!(VoucherType::from_remote(name).as_remote(), name);
        }
        let custom = VoucherType::from_remote("Stock Journal");
        assert_eq!(custom, VoucherType::Other("Stock Journal".to_string()));
    }

    #[test]
    fn payment_mode_total_sums_all_slots() {
        let modes = PaymentModes {
            cash: 100.0,
            upi: 50.0,
            ..Default::default()
        };
        assert_eq!(modes.total(), 150.0);
    }
}
