//! Local mirror of the accounting engine plus the two reconciliation feeds.
//!
//! The store keeps every table behind one `RwLock` so batch upserts commit
//! atomically: a sync cycle either lands a whole batch or none of it.
//! Voucher upserts run through the change tracker, which snapshots history
//! and records per-field diffs before any mutation is applied. The full
//! state is serializable for the file persistence layer.

pub mod change_tracker;
pub mod persistence;
pub mod records;

use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use change_tracker::{classify_absentee, derive_critical, diff_tracked};
use records::{
    BankTransaction, Bill, FieldChangeEntry, GatewayTransaction, LedgerEntry, Lifecycle,
    MatchStatus, OutboundInvoice, Party, PaymentStatus, ReconType, ReconciliationMatch,
    StockItem, SyncCursor, SyncDomain, SyncStatus, VoucherHistorySnapshot, VoucherRecord,
};

/// Errors surfaced by the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("State serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown record: {0}")]
    NotFound(String),
}

/// Outcome of a single voucher upsert.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Inserted,
    /// Version advanced; history was snapshotted and these fields changed.
    Updated { changed_fields: Vec<FieldChangeEntry> },
    /// Incoming version did not exceed the stored one. Nothing written.
    Unchanged,
}

/// Aggregate result of one atomically committed voucher batch.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub new_guids: Vec<String>,
    pub updated: Vec<(String, Vec<FieldChangeEntry>)>,
    pub unchanged: usize,
    /// Highest version counter observed in the batch, 0 if empty.
    pub max_alter_id: u64,
}

/// Serializable snapshot of the whole mirror, used by persistence.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct MirrorState {
    pub vouchers: BTreeMap<String, VoucherRecord>,
    pub history: Vec<VoucherHistorySnapshot>,
    pub field_changes: Vec<FieldChangeEntry>,
    pub cursors: Vec<SyncCursor>,
    pub stock_items: BTreeMap<String, StockItem>,
    pub parties: BTreeMap<String, Party>,
    pub bills: BTreeMap<String, Bill>,
    pub bank_transactions: Vec<BankTransaction>,
    pub gateway_transactions: Vec<GatewayTransaction>,
    pub ledger_entries: Vec<LedgerEntry>,
    pub matches: Vec<ReconciliationMatch>,
    pub outbound: Vec<OutboundInvoice>,
}

#[derive(Default)]
struct Tables {
    vouchers: BTreeMap<String, VoucherRecord>,
    history: Vec<VoucherHistorySnapshot>,
    history_seq: HashMap<String, u64>,
    field_changes: Vec<FieldChangeEntry>,
    cursors: HashMap<SyncDomain, SyncCursor>,
    stock_items: BTreeMap<String, StockItem>,
    parties: BTreeMap<String, Party>,
    bills: BTreeMap<String, Bill>,
    bank_transactions: Vec<BankTransaction>,
    gateway_transactions: Vec<GatewayTransaction>,
    ledger_entries: Vec<LedgerEntry>,
    matches: Vec<ReconciliationMatch>,
    outbound: Vec<OutboundInvoice>,
}

/// Tunables applied during upserts.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub tracked_fields: Vec<String>,
    /// Tolerance for the payment-mismatch critical flag.
    pub payment_tolerance: f64,
    /// Tolerance for the converted-vs-deleted classifier.
    pub conversion_amount_tolerance: f64,
    /// Tolerance under which a bill's receipts count as covering its face
    /// amount.
    pub paid_tolerance: f64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            tracked_fields: change_tracker::DEFAULT_TRACKED_FIELDS
                .iter()
                .map(|f| f.to_string())
                .collect(),
            payment_tolerance: 0.5,
            conversion_amount_tolerance: 1.0,
            paid_tolerance: 0.005,
        }
    }
}

/// The local mirror. One instance is shared between the orchestrator and
/// the reconciler.
pub struct MirrorStore {
    tables: RwLock<Tables>,
    settings: StoreSettings,
}

impl MirrorStore {
    pub fn new(settings: StoreSettings) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            settings,
        }
    }

    fn read_tables(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_tables(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rebuild a store from persisted state.
    pub fn from_state(state: MirrorState, settings: StoreSettings) -> Self {
        let mut tables = Tables {
            vouchers: state.vouchers,
            history: state.history,
            field_changes: state.field_changes,
            stock_items: state.stock_items,
            parties: state.parties,
            bills: state.bills,
            bank_transactions: state.bank_transactions,
            gateway_transactions: state.gateway_transactions,
            ledger_entries: state.ledger_entries,
            matches: state.matches,
            outbound: state.outbound,
            ..Default::default()
        };
        for snapshot in &tables.history {
            let seq = tables.history_seq.entry(snapshot.guid.clone()).or_insert(0);
            *seq = (*seq).max(snapshot.seq);
        }
        for cursor in state.cursors {
            tables.cursors.insert(cursor.domain, cursor);
        }
        Self {
            tables: RwLock::new(tables),
            settings,
        }
    }

    /// Snapshot the full mirror for persistence.
    pub fn to_state(&self) -> MirrorState {
        let tables = self.read_tables();
        MirrorState {
            vouchers: tables.vouchers.clone(),
            history: tables.history.clone(),
            field_changes: tables.field_changes.clone(),
            cursors: tables.cursors.values().cloned().collect(),
            stock_items: tables.stock_items.clone(),
            parties: tables.parties.clone(),
            bills: tables.bills.clone(),
            bank_transactions: tables.bank_transactions.clone(),
            gateway_transactions: tables.gateway_transactions.clone(),
            ledger_entries: tables.ledger_entries.clone(),
            matches: tables.matches.clone(),
            outbound: tables.outbound.clone(),
        }
    }

    // ---- vouchers & change tracking ----

    /// Upsert one voucher under an already-held write guard.
    fn upsert_voucher_locked(tables: &mut Tables, settings: &StoreSettings, mut incoming: VoucherRecord) -> UpsertOutcome {
        let today = Utc::now().date_naive();
        match tables.vouchers.get(&incoming.guid) {
            None => {
                derive_critical(&mut incoming, None, settings.payment_tolerance, today);
                debug!(guid = %incoming.guid, alter_id = incoming.alter_id, "Inserting new voucher");
                tables.vouchers.insert(incoming.guid.clone(), incoming);
                UpsertOutcome::Inserted
            }
            Some(stored) if incoming.alter_id > stored.alter_id => {
                let previous = stored.clone();

                // Snapshot the pre-mutation record before anything changes.
                let seq = tables
                    .history_seq
                    .entry(previous.guid.clone())
                    .or_insert(0);
                *seq += 1;
                tables.history.push(VoucherHistorySnapshot {
                    guid: previous.guid.clone(),
                    seq: *seq,
                    from_alter_id: previous.alter_id,
                    to_alter_id: incoming.alter_id,
                    record: previous.clone(),
                    recorded_at: Utc::now(),
                });

                // Locally derived state carries over; the engine knows
                // nothing about audits, reasons or soft lifecycle marks.
                incoming.audited = previous.audited;
                incoming.critical_reasons = previous.critical_reasons.clone();
                incoming.lifecycle = Lifecycle::Active;
                derive_critical(
                    &mut incoming,
                    Some(previous.audited),
                    settings.payment_tolerance,
                    today,
                );

                let changes = diff_tracked(&previous, &incoming, &settings.tracked_fields);
                tables.field_changes.extend(changes.iter().cloned());
                tables.vouchers.insert(incoming.guid.clone(), incoming);
                UpsertOutcome::Updated {
                    changed_fields: changes,
                }
            }
            Some(_) => UpsertOutcome::Unchanged,
        }
    }

    /// Upsert a single voucher, running the change tracker.
    pub fn upsert_voucher(&self, incoming: VoucherRecord) -> UpsertOutcome {
        let mut tables = self.write_tables();
        Self::upsert_voucher_locked(&mut tables, &self.settings, incoming)
    }

    /// Upsert a whole fetched batch under one write guard so the commit is
    /// atomic with respect to readers.
    pub fn upsert_voucher_batch(&self, batch: Vec<VoucherRecord>) -> BatchOutcome {
        let mut tables = self.write_tables();
        let mut outcome = BatchOutcome::default();
        for voucher in batch {
            let guid = voucher.guid.clone();
            outcome.max_alter_id = outcome.max_alter_id.max(voucher.alter_id);
            match Self::upsert_voucher_locked(&mut tables, &self.settings, voucher) {
                UpsertOutcome::Inserted => outcome.new_guids.push(guid),
                UpsertOutcome::Updated { changed_fields } => {
                    outcome.updated.push((guid, changed_fields))
                }
                UpsertOutcome::Unchanged => outcome.unchanged += 1,
            }
        }
        outcome
    }

    /// Mark a voucher as audited (or clear the mark). Human action through
    /// the query surface.
    pub fn set_audited(&self, guid: &str, audited: bool) -> Result<(), StoreError> {
        let mut tables = self.write_tables();
        let record = tables
            .vouchers
            .get_mut(guid)
            .ok_or_else(|| StoreError::NotFound(guid.to_string()))?;
        record.audited = audited;
        if !audited {
            record
                .critical_reasons
                .remove(&records::CriticalReason::AlteredAfterAudit);
        }
        Ok(())
    }

    pub fn voucher(&self, guid: &str) -> Option<VoucherRecord> {
        self.read_tables().vouchers.get(guid).cloned()
    }

    pub fn vouchers(&self) -> Vec<VoucherRecord> {
        self.read_tables().vouchers.values().cloned().collect()
    }

    pub fn history_for(&self, guid: &str) -> Vec<VoucherHistorySnapshot> {
        self.read_tables()
            .history
            .iter()
            .filter(|s| s.guid == guid)
            .cloned()
            .collect()
    }

    pub fn changes_for(&self, guid: &str) -> Vec<FieldChangeEntry> {
        self.read_tables()
            .field_changes
            .iter()
            .filter(|c| c.guid == guid)
            .cloned()
            .collect()
    }

    /// Compare the local identity set against a complete remote dump and
    /// soft-mark absentees as converted or deleted. Returns the
    /// classifications applied in this sweep.
    pub fn mark_absentees(&self, remote_full: &[VoucherRecord]) -> Vec<(String, Lifecycle)> {
        let remote_guids: HashSet<&str> = remote_full.iter().map(|v| v.guid.as_str()).collect();
        let mut tables = self.write_tables();
        let mut applied = Vec::new();

        let absent: Vec<String> = tables
            .vouchers
            .values()
            .filter(|v| v.lifecycle == Lifecycle::Active && !remote_guids.contains(v.guid.as_str()))
            .map(|v| v.guid.clone())
            .collect();

        for guid in absent {
            let record = tables.vouchers.get(&guid).cloned();
            if let Some(record) = record {
                let lifecycle = classify_absentee(
                    &record,
                    remote_full,
                    self.settings.conversion_amount_tolerance,
                );
                info!(guid = %guid, ?lifecycle, "Voucher absent from remote set, soft-marking");
                if let Some(stored) = tables.vouchers.get_mut(&guid) {
                    stored.lifecycle = lifecycle.clone();
                }
                applied.push((guid, lifecycle));
            }
        }
        applied
    }

    // ---- cursors ----

    pub fn cursor(&self, domain: SyncDomain) -> SyncCursor {
        self.read_tables()
            .cursors
            .get(&domain)
            .cloned()
            .unwrap_or_else(|| SyncCursor::new(domain))
    }

    /// Advance a cursor to `candidate` if it increased. Cursors never move
    /// backwards regardless of what a cycle observed.
    pub fn advance_cursor(&self, domain: SyncDomain, candidate: u64) -> u64 {
        let mut tables = self.write_tables();
        let cursor = tables
            .cursors
            .entry(domain)
            .or_insert_with(|| SyncCursor::new(domain));
        if candidate > cursor.high_water {
            cursor.high_water = candidate;
        }
        cursor.high_water
    }

    pub fn set_cursor_status(&self, domain: SyncDomain, status: SyncStatus, error: Option<String>) {
        let mut tables = self.write_tables();
        let cursor = tables
            .cursors
            .entry(domain)
            .or_insert_with(|| SyncCursor::new(domain));
        cursor.status = status;
        cursor.last_error = error;
    }

    // ---- masters ----

    /// Upsert stock items, returning (new, updated, max observed AlterID)
    /// so the caller can advance the domain cursor.
    pub fn upsert_stock_items(&self, items: Vec<StockItem>) -> (usize, usize, u64) {
        let mut tables = self.write_tables();
        let mut inserted = 0;
        let mut updated = 0;
        let mut max_alter_id = 0;
        for item in items {
            max_alter_id = max_alter_id.max(item.alter_id);
            match tables.stock_items.get(&item.name) {
                None => {
                    tables.stock_items.insert(item.name.clone(), item);
                    inserted += 1;
                }
                Some(stored) if item.alter_id > stored.alter_id => {
                    tables.stock_items.insert(item.name.clone(), item);
                    updated += 1;
                }
                Some(_) => {}
            }
        }
        (inserted, updated, max_alter_id)
    }

    pub fn upsert_parties(&self, parties: Vec<Party>) -> (usize, usize, u64) {
        let mut tables = self.write_tables();
        let mut inserted = 0;
        let mut updated = 0;
        let mut max_alter_id = 0;
        for party in parties {
            max_alter_id = max_alter_id.max(party.alter_id);
            match tables.parties.get(&party.name) {
                None => {
                    tables.parties.insert(party.name.clone(), party);
                    inserted += 1;
                }
                Some(stored) if party.alter_id > stored.alter_id => {
                    tables.parties.insert(party.name.clone(), party);
                    updated += 1;
                }
                Some(_) => {}
            }
        }
        (inserted, updated, max_alter_id)
    }

    pub fn upsert_bills(&self, bills: Vec<Bill>) -> usize {
        let mut tables = self.write_tables();
        let mut count = 0;
        for bill in bills {
            tables.bills.insert(bill.bill_ref.clone(), bill);
            count += 1;
        }
        count
    }

    pub fn bills(&self) -> Vec<Bill> {
        self.read_tables().bills.values().cloned().collect()
    }

    pub fn stock_items(&self) -> Vec<StockItem> {
        self.read_tables().stock_items.values().cloned().collect()
    }

    pub fn parties(&self) -> Vec<Party> {
        self.read_tables().parties.values().cloned().collect()
    }

    /// Recompute each open bill's paid state from its linked receipts.
    /// Returns only real transitions, so repeated runs are idempotent.
    pub fn recompute_payment_statuses(&self) -> Vec<(String, PaymentStatus, PaymentStatus)> {
        let mut tables = self.write_tables();
        let mut received: HashMap<String, f64> = HashMap::new();
        for voucher in tables.vouchers.values() {
            if voucher.voucher_type == records::VoucherType::Receipt
                && voucher.lifecycle == Lifecycle::Active
            {
                if let Some(bill_ref) = &voucher.bill_ref {
                    *received.entry(bill_ref.clone()).or_insert(0.0) += voucher.amount;
                }
            }
        }

        let mut transitions = Vec::new();
        for bill in tables.bills.values_mut() {
            let paid = received.get(&bill.bill_ref).copied().unwrap_or(0.0);
            let computed = if paid + self.settings.paid_tolerance >= bill.amount {
                PaymentStatus::Paid
            } else if paid > 0.0 {
                PaymentStatus::Partial
            } else {
                PaymentStatus::Pending
            };
            if computed != bill.status {
                transitions.push((bill.bill_ref.clone(), bill.status, computed));
                bill.status = computed;
            }
        }
        transitions
    }

    // ---- reconciliation feeds & matches ----

    pub fn ingest_bank_transactions(&self, rows: Vec<BankTransaction>) {
        let mut tables = self.write_tables();
        for row in rows {
            if !tables.bank_transactions.iter().any(|t| t.id == row.id) {
                tables.bank_transactions.push(row);
            }
        }
    }

    pub fn ingest_gateway_transactions(&self, rows: Vec<GatewayTransaction>) {
        let mut tables = self.write_tables();
        for row in rows {
            if !tables.gateway_transactions.iter().any(|t| t.id == row.id) {
                tables.gateway_transactions.push(row);
            }
        }
    }

    pub fn ingest_ledger_entries(&self, rows: Vec<LedgerEntry>) {
        let mut tables = self.write_tables();
        for row in rows {
            if !tables.ledger_entries.iter().any(|t| t.id == row.id) {
                tables.ledger_entries.push(row);
            }
        }
    }

    pub fn bank_transactions(&self) -> Vec<BankTransaction> {
        self.read_tables().bank_transactions.clone()
    }

    pub fn gateway_transactions(&self) -> Vec<GatewayTransaction> {
        self.read_tables().gateway_transactions.clone()
    }

    pub fn ledger_entries(&self) -> Vec<LedgerEntry> {
        self.read_tables().ledger_entries.clone()
    }

    /// Replace all automatic rows of one reconciliation with a fresh result
    /// set. Manual matches are never touched, so recomputation converges
    /// instead of accumulating.
    pub fn replace_auto_matches(&self, recon_type: ReconType, fresh: Vec<ReconciliationMatch>) {
        let mut tables = self.write_tables();
        tables
            .matches
            .retain(|m| m.recon_type != recon_type || m.status == MatchStatus::ManualMatch);
        tables.matches.extend(fresh);
    }

    pub fn matches(&self, recon_type: ReconType) -> Vec<ReconciliationMatch> {
        self.read_tables()
            .matches
            .iter()
            .filter(|m| m.recon_type == recon_type)
            .cloned()
            .collect()
    }

    /// Record a human-placed match for a pair of records.
    pub fn add_manual_match(&self, entry: ReconciliationMatch) {
        let mut tables = self.write_tables();
        let mut entry = entry;
        entry.status = MatchStatus::ManualMatch;
        tables.matches.push(entry);
    }

    // ---- outbound queue ----

    pub fn queue_outbound(&self, invoice: OutboundInvoice) {
        let mut tables = self.write_tables();
        tables.outbound.push(invoice);
    }

    pub fn pending_outbound(&self) -> Vec<OutboundInvoice> {
        self.read_tables()
            .outbound
            .iter()
            .filter(|i| !i.accepted)
            .cloned()
            .collect()
    }

    /// Record one push attempt's outcome against a queued invoice.
    pub fn record_outbound_attempt(&self, local_id: &str, accepted: bool, error: Option<String>) {
        let mut tables = self.write_tables();
        match tables.outbound.iter_mut().find(|i| i.local_id == local_id) {
            Some(invoice) => {
                invoice.attempts += 1;
                invoice.accepted = accepted;
                invoice.last_error = error;
            }
            None => warn!(local_id, "Outbound attempt recorded for unknown invoice"),
        }
    }
}
