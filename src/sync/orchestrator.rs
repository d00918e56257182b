//! Sync orchestrator: coordinates cycles against the accounting engine.
//!
//! One orchestrator owns the protocol client, the mirror store and the
//! event dispatcher, wired explicitly from config. Each sync domain runs at
//! most one cycle at a time: a single-flight flag shared between the timers
//! and manual triggers rejects overlapping requests immediately instead of
//! queueing them. A cycle runs to completion or fails; there is no mid-cycle
//! cancellation and no in-cycle retry, and the flag is released on every
//! exit path. Failures stay local to their domain.

use chrono::NaiveDate;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::protocol::{LedgerClient, ProtocolError};
use crate::recon::{ReconSummary, Reconciler};
use crate::store::persistence::StateRepository;
use crate::store::records::{Lifecycle, SyncDomain, SyncStatus, VoucherType};
use crate::store::MirrorStore;

use super::SyncError;
use super::events::{EventDispatcher, SyncEvent, SyncEventHandler};
use super::stats::CycleStats;

/// Behavior knobs for the orchestrator, taken from config.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Voucher types requested in incremental syncs; empty means all.
    pub voucher_types: Vec<VoucherType>,
    /// Spacing of the master-data cycle when running continuously.
    pub master_interval: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            voucher_types: Vec::new(),
            master_interval: Duration::from_secs(300),
        }
    }
}

/// Releases a single-flight flag on every exit path.
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool, kind: &'static str) -> Result<Self, SyncError> {
        if flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Ok(Self(flag))
        } else {
            Err(SyncError::AlreadyRunning(kind))
        }
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Coordinates incremental voucher sync, master-data sync, outbound retry
/// and payment-status recomputation over one engine connection.
pub struct SyncOrchestrator {
    client: Arc<LedgerClient>,
    store: Arc<MirrorStore>,
    dispatcher: tokio::sync::Mutex<EventDispatcher>,
    settings: OrchestratorSettings,
    persistence: Option<Arc<dyn StateRepository>>,
    voucher_flight: AtomicBool,
    master_flight: AtomicBool,
}

impl SyncOrchestrator {
    pub fn new(
        client: Arc<LedgerClient>,
        store: Arc<MirrorStore>,
        settings: OrchestratorSettings,
        persistence: Option<Arc<dyn StateRepository>>,
    ) -> Self {
        Self {
            client,
            store,
            dispatcher: tokio::sync::Mutex::new(EventDispatcher::new()),
            settings,
            persistence,
            voucher_flight: AtomicBool::new(false),
            master_flight: AtomicBool::new(false),
        }
    }

    pub async fn register_handler(&self, handler: Box<dyn SyncEventHandler>) {
        self.dispatcher.lock().await.register_handler(handler);
    }

    async fn dispatch(&self, event: SyncEvent) {
        self.dispatcher.lock().await.dispatch(&event).await;
    }

    async fn persist_best_effort(&self) {
        if let Some(repo) = &self.persistence {
            if let Err(e) = repo.save(&self.store.to_state()).await {
                warn!(error = %e, "Failed to persist mirror state after cycle");
            }
        }
    }

    /// One incremental voucher cycle: fetch strictly-newer vouchers, commit
    /// the batch atomically, advance the cursor only if it grew, and emit
    /// one created-event per net-new identity.
    pub async fn run_incremental_voucher_sync(&self) -> Result<CycleStats, SyncError> {
        let _flight = FlightGuard::acquire(&self.voucher_flight, "vouchers")?;

        let cursor = self.store.cursor(SyncDomain::Vouchers).high_water;
        self.store
            .set_cursor_status(SyncDomain::Vouchers, SyncStatus::Syncing, None);
        debug!(cursor, "Starting incremental voucher sync");

        let batch = match self
            .client
            .fetch_vouchers_incremental(cursor, &self.settings.voucher_types)
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                self.store.set_cursor_status(
                    SyncDomain::Vouchers,
                    SyncStatus::Error,
                    Some(e.to_string()),
                );
                self.dispatch(SyncEvent::CycleFailed {
                    kind: "vouchers",
                    error: e.to_string(),
                })
                .await;
                return Err(e.into());
            }
        };

        let fetched = batch.len();
        let outcome = self.store.upsert_voucher_batch(batch);

        // The cursor moves only after the batch has fully committed, and
        // only forward.
        let new_cursor = if outcome.max_alter_id > cursor {
            self.store
                .advance_cursor(SyncDomain::Vouchers, outcome.max_alter_id)
        } else {
            cursor
        };
        self.store
            .set_cursor_status(SyncDomain::Vouchers, SyncStatus::Idle, None);

        for guid in &outcome.new_guids {
            if let Some(voucher) = self.store.voucher(guid) {
                self.dispatch(SyncEvent::VoucherCreated {
                    guid: guid.clone(),
                    voucher_type: voucher.voucher_type,
                    party: voucher.party,
                    amount: voucher.amount,
                })
                .await;
            }
        }
        for (guid, changes) in &outcome.updated {
            if !changes.is_empty() {
                self.dispatch(SyncEvent::VoucherChanged {
                    guid: guid.clone(),
                    changed_fields: changes.iter().map(|c| c.field.clone()).collect(),
                })
                .await;
            }
        }

        let stats = CycleStats {
            kind: "vouchers",
            fetched,
            inserted: outcome.new_guids.len(),
            updated: outcome.updated.len(),
            unchanged: outcome.unchanged,
            cursor: Some(new_cursor),
            errors: Vec::new(),
        };
        info!("{}", stats.summary());
        self.dispatch(SyncEvent::CycleCompleted {
            stats: stats.clone(),
        })
        .await;
        self.persist_best_effort().await;
        Ok(stats)
    }

    /// Master-data cycle: stock items, parties, pending bills and the
    /// outbound invoice retry, run sequentially. Each step is independent;
    /// failures are collected into the summary instead of aborting the
    /// later steps.
    pub async fn run_master_data_sync(&self) -> Result<CycleStats, SyncError> {
        let _flight = FlightGuard::acquire(&self.master_flight, "master_data")?;
        let mut stats = CycleStats {
            kind: "master_data",
            ..Default::default()
        };

        self.store
            .set_cursor_status(SyncDomain::StockItems, SyncStatus::Syncing, None);
        match self.client.fetch_stock_items().await {
            Ok(items) => {
                stats.fetched += items.len();
                let (inserted, updated, max_alter_id) = self.store.upsert_stock_items(items);
                stats.inserted += inserted;
                stats.updated += updated;
                self.store.advance_cursor(SyncDomain::StockItems, max_alter_id);
                self.store
                    .set_cursor_status(SyncDomain::StockItems, SyncStatus::Idle, None);
            }
            Err(e) => {
                warn!(error = %e, "Stock item sync failed");
                self.store.set_cursor_status(
                    SyncDomain::StockItems,
                    SyncStatus::Error,
                    Some(e.to_string()),
                );
                stats.errors.push(format!("stock_items: {e}"));
            }
        }

        self.store
            .set_cursor_status(SyncDomain::Parties, SyncStatus::Syncing, None);
        match self.client.fetch_parties().await {
            Ok(parties) => {
                stats.fetched += parties.len();
                let (inserted, updated, max_alter_id) = self.store.upsert_parties(parties);
                stats.inserted += inserted;
                stats.updated += updated;
                self.store.advance_cursor(SyncDomain::Parties, max_alter_id);
                self.store
                    .set_cursor_status(SyncDomain::Parties, SyncStatus::Idle, None);
            }
            Err(e) => {
                warn!(error = %e, "Party sync failed");
                self.store.set_cursor_status(
                    SyncDomain::Parties,
                    SyncStatus::Error,
                    Some(e.to_string()),
                );
                stats.errors.push(format!("parties: {e}"));
            }
        }

        match self.client.fetch_pending_bills().await {
            Ok(bills) => {
                stats.fetched += bills.len();
                stats.inserted += self.store.upsert_bills(bills);
            }
            Err(e) => {
                warn!(error = %e, "Pending bill sync failed");
                stats.errors.push(format!("pending_bills: {e}"));
            }
        }

        if let Err(e) = self.retry_pending_outbound().await {
            warn!(error = %e, "Outbound invoice retry failed");
            stats.errors.push(format!("outbound: {e}"));
        }

        self.update_payment_statuses().await;

        info!("{}", stats.summary());
        self.dispatch(SyncEvent::CycleCompleted {
            stats: stats.clone(),
        })
        .await;
        self.persist_best_effort().await;
        Ok(stats)
    }

    /// Push locally queued invoices the engine has not accepted yet. Each
    /// record gets a structured outcome; a rejection of one invoice does
    /// not stop the rest, connectivity loss does.
    async fn retry_pending_outbound(&self) -> Result<(), SyncError> {
        for invoice in self.store.pending_outbound() {
            match self.client.create_voucher(&invoice.voucher).await {
                Ok(outcome) => {
                    info!(
                        local_id = %invoice.local_id,
                        strategy = %outcome.strategy,
                        "Outbound invoice accepted"
                    );
                    self.store
                        .record_outbound_attempt(&invoice.local_id, true, None);
                }
                Err(e @ ProtocolError::Connectivity(_)) => {
                    self.store.record_outbound_attempt(
                        &invoice.local_id,
                        false,
                        Some(e.to_string()),
                    );
                    return Err(e.into());
                }
                Err(e) => {
                    self.store.record_outbound_attempt(
                        &invoice.local_id,
                        false,
                        Some(e.to_string()),
                    );
                }
            }
        }
        Ok(())
    }

    /// Recompute bill paid-states and emit an event per real transition.
    /// Safe to call repeatedly; an unchanged state emits nothing.
    pub async fn update_payment_statuses(&self) {
        for (bill_ref, old, new) in self.store.recompute_payment_statuses() {
            self.dispatch(SyncEvent::PaymentStatusChanged { bill_ref, old, new })
                .await;
        }
    }

    /// Run all three matchers and surface each recomputation on the event
    /// stream.
    pub async fn run_matchers(&self, reconciler: &Reconciler) -> Vec<ReconSummary> {
        let summaries = reconciler.run_all();
        for summary in &summaries {
            self.dispatch(SyncEvent::ReconciliationCompleted {
                recon_type: summary.recon_type,
                matched: summary.matched,
                unmatched: summary.unmatched,
            })
            .await;
        }
        self.persist_best_effort().await;
        summaries
    }

    /// Non-incremental sweep: fetch the complete remote voucher set for the
    /// window and soft-mark local vouchers missing from it as converted or
    /// deleted. Shares the voucher single-flight guard: a voucher committed
    /// by a concurrent incremental cycle would be absent from an
    /// already-fetched dump and get marked deleted by mistake.
    pub async fn run_reconciliation_sweep(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<(String, Lifecycle)>, SyncError> {
        let _flight = FlightGuard::acquire(&self.voucher_flight, "vouchers")?;
        let remote = self.client.fetch_vouchers_full(from, to).await?;
        let applied = self.store.mark_absentees(&remote);
        if !applied.is_empty() {
            info!(count = applied.len(), "Reconciliation sweep soft-marked absentees");
            self.persist_best_effort().await;
        }
        Ok(applied)
    }

    /// Start timer-driven syncing. A zero voucher interval means manual
    /// only: nothing is scheduled and no tasks are returned.
    pub fn start_continuous(self: &Arc<Self>, voucher_interval: Duration) -> Vec<JoinHandle<()>> {
        if voucher_interval.is_zero() {
            info!("Sync interval is zero, running in manual-only mode");
            return Vec::new();
        }

        let mut handles = Vec::new();

        let orchestrator = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            let mut timer = tokio::time::interval(voucher_interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                timer.tick().await;
                match orchestrator.run_incremental_voucher_sync().await {
                    Ok(_) => {}
                    Err(SyncError::AlreadyRunning(kind)) => {
                        debug!(kind, "Timer tick skipped, sync already in progress");
                    }
                    Err(e) => warn!(error = %e, "Scheduled voucher sync failed"),
                }
            }
        }));

        let orchestrator = Arc::clone(self);
        let master_interval = self.settings.master_interval;
        handles.push(tokio::spawn(async move {
            let mut timer = tokio::time::interval(master_interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                timer.tick().await;
                match orchestrator.run_master_data_sync().await {
                    Ok(_) => {}
                    Err(SyncError::AlreadyRunning(kind)) => {
                        debug!(kind, "Timer tick skipped, sync already in progress");
                    }
                    Err(e) => warn!(error = %e, "Scheduled master-data sync failed"),
                }
            }
        }));

        info!(
            voucher_interval_secs = voucher_interval.as_secs(),
            master_interval_secs = self.settings.master_interval.as_secs(),
            "Continuous sync started"
        );
        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Transport;
    use crate::protocol::client::tests::FakeTransport;
    use crate::store::StoreSettings;
    use crate::sync::events::tests::RecordingHandler;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;

    fn collection(vouchers: &str) -> String {
        format!(
            "<ENVELOPE><HEADER><STATUS>1</STATUS></HEADER>\
             <BODY><DATA><COLLECTION>{vouchers}</COLLECTION></DATA></BODY></ENVELOPE>"
        )
    }

    fn voucher_xml(guid: &str, alter_id: u64, amount: f64) -> String {
        format!(
            "<VOUCHER><GUID>{guid}</GUID><ALTERID>{alter_id}</ALTERID>\
             <VOUCHERTYPENAME>Sales</VOUCHERTYPENAME>\
             <DATE>20260310</DATE><PARTYLEDGERNAME>Acme</PARTYLEDGERNAME>\
             <AMOUNT>{amount}</AMOUNT></VOUCHER>"
        )
    }

    fn orchestrator_with(responses: Vec<Result<String, ProtocolError>>) -> Arc<SyncOrchestrator> {
        let client = Arc::new(LedgerClient::new(
            Box::new(FakeTransport::new(responses)),
            "Main Books".to_string(),
        ));
        let store = Arc::new(MirrorStore::new(StoreSettings::default()));
        Arc::new(SyncOrchestrator::new(
            client,
            store,
            OrchestratorSettings::default(),
            None,
        ))
    }

    fn store_of(orchestrator: &SyncOrchestrator) -> &MirrorStore {
        &orchestrator.store
    }

    #[tokio::test]
    async fn successful_cycle_advances_cursor_and_reports_new_vouchers() {
        let orchestrator = orchestrator_with(vec![Ok(collection(&format!(
            "{}{}",
            voucher_xml("v-1", 11, 100.0),
            voucher_xml("v-2", 14, 50.0)
        )))]);

        let events = Arc::new(StdMutex::new(Vec::new()));
        orchestrator
            .register_handler(Box::new(RecordingHandler {
                events: events.clone(),
                fail: false,
            }))
            .await;

        let stats = orchestrator.run_incremental_voucher_sync().await.unwrap();
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.cursor, Some(14));
        assert_eq!(
            store_of(&orchestrator).cursor(SyncDomain::Vouchers).high_water,
            14
        );
        assert_eq!(
            store_of(&orchestrator).cursor(SyncDomain::Vouchers).status,
            SyncStatus::Idle
        );

        let created: usize = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, SyncEvent::VoucherCreated { .. }))
            .count();
        assert_eq!(created, 2);
    }

    #[tokio::test]
    async fn existing_vouchers_do_not_raise_created_events_again() {
        let orchestrator = orchestrator_with(vec![
            Ok(collection(&voucher_xml("v-1", 11, 100.0))),
            Ok(collection(&voucher_xml("v-1", 12, 175.0))),
        ]);
        orchestrator.run_incremental_voucher_sync().await.unwrap();

        let events = Arc::new(StdMutex::new(Vec::new()));
        orchestrator
            .register_handler(Box::new(RecordingHandler {
                events: events.clone(),
                fail: false,
            }))
            .await;
        orchestrator.run_incremental_voucher_sync().await.unwrap();

        let events = events.lock().unwrap();
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, SyncEvent::VoucherCreated { .. })),
            "content change must not raise a duplicate new-voucher alert"
        );
        assert!(events
            .iter()
            .any(|e| matches!(e, SyncEvent::VoucherChanged { .. })));
    }

    #[tokio::test]
    async fn connectivity_failure_marks_error_and_keeps_cursor() {
        let orchestrator = orchestrator_with(vec![
            Ok(collection(&voucher_xml("v-1", 20, 10.0))),
            Err(ProtocolError::Connectivity("refused".to_string())),
        ]);
        orchestrator.run_incremental_voucher_sync().await.unwrap();

        let err = orchestrator.run_incremental_voucher_sync().await.unwrap_err();
        assert!(matches!(err, SyncError::Protocol(ProtocolError::Connectivity(_))));

        let cursor = store_of(&orchestrator).cursor(SyncDomain::Vouchers);
        assert_eq!(cursor.high_water, 20, "failed cycle must not move the cursor");
        assert_eq!(cursor.status, SyncStatus::Error);
        assert!(cursor.last_error.is_some());
    }

    /// Transport that parks until released, to hold a cycle in flight.
    struct GatedTransport {
        release: Arc<Notify>,
        response: String,
    }

    #[async_trait::async_trait]
    impl Transport for GatedTransport {
        async fn post_xml(&self, _body: &str) -> Result<String, ProtocolError> {
            self.release.notified().await;
            Ok(self.response.clone())
        }
    }

    #[tokio::test]
    async fn overlapping_trigger_is_rejected_without_touching_state() {
        let release = Arc::new(Notify::new());
        let client = Arc::new(LedgerClient::new(
            Box::new(GatedTransport {
                release: release.clone(),
                response: collection(&voucher_xml("v-1", 7, 10.0)),
            }),
            "Main Books".to_string(),
        ));
        let store = Arc::new(MirrorStore::new(StoreSettings::default()));
        let orchestrator = Arc::new(SyncOrchestrator::new(
            client,
            store,
            OrchestratorSettings::default(),
            None,
        ));

        let first = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.run_incremental_voucher_sync().await })
        };

        // Wait until the first cycle is inside its fetch.
        while store_of(&orchestrator).cursor(SyncDomain::Vouchers).status != SyncStatus::Syncing {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let second = orchestrator.run_incremental_voucher_sync().await;
        assert!(matches!(second, Err(SyncError::AlreadyRunning("vouchers"))));
        assert_eq!(
            store_of(&orchestrator).cursor(SyncDomain::Vouchers).high_water,
            0,
            "rejected trigger must leave the cursor untouched"
        );

        release.notify_one();
        let stats = first.await.unwrap().unwrap();
        assert_eq!(stats.cursor, Some(7));

        // Guard released: a new cycle may start (and fail on transport).
        release.notify_one();
        assert!(!matches!(
            orchestrator.run_incremental_voucher_sync().await,
            Err(SyncError::AlreadyRunning(_))
        ));
    }

    #[tokio::test]
    async fn master_sync_continues_past_a_failed_domain() {
        // Stock items fail with an engine status error; parties and bills
        // still land.
        let orchestrator = orchestrator_with(vec![
            Err(ProtocolError::Status("header status 0".to_string())),
            Ok(collection(
                "<LEDGER><NAME>Acme</NAME><GUID>p-1</GUID>\
                 <ALTERID>4</ALTERID><CLOSINGBALANCE>90</CLOSINGBALANCE></LEDGER>",
            )),
            Ok(collection(
                "<BILL><NAME>INV-1</NAME><PARTY>Acme</PARTY>\
                 <AMOUNT>400</AMOUNT><DATE>20260301</DATE></BILL>",
            )),
        ]);

        let stats = orchestrator.run_master_data_sync().await.unwrap();
        assert_eq!(stats.errors.len(), 1);
        assert!(stats.errors[0].starts_with("stock_items:"));
        assert_eq!(store_of(&orchestrator).parties().len(), 1);
        assert_eq!(store_of(&orchestrator).bills().len(), 1);

        // Each master domain keeps its own cursor state.
        let stock = store_of(&orchestrator).cursor(SyncDomain::StockItems);
        assert_eq!(stock.status, SyncStatus::Error);
        assert!(stock.last_error.is_some());
        let parties = store_of(&orchestrator).cursor(SyncDomain::Parties);
        assert_eq!(parties.status, SyncStatus::Idle);
        assert_eq!(parties.high_water, 4);
    }

    #[tokio::test]
    async fn master_sync_advances_per_domain_cursors() {
        let orchestrator = orchestrator_with(vec![
            Ok(collection(
                "<STOCKITEM><NAME>Widget</NAME><ALTERID>9</ALTERID>\
                 <CLOSINGQTY>12</CLOSINGQTY></STOCKITEM>",
            )),
            Ok(collection(
                "<LEDGER><NAME>Acme</NAME><GUID>p-1</GUID>\
                 <ALTERID>6</ALTERID><CLOSINGBALANCE>90</CLOSINGBALANCE></LEDGER>",
            )),
            Ok(collection("")),
        ]);

        orchestrator.run_master_data_sync().await.unwrap();
        assert_eq!(
            store_of(&orchestrator).cursor(SyncDomain::StockItems).high_water,
            9
        );
        assert_eq!(
            store_of(&orchestrator).cursor(SyncDomain::Parties).high_water,
            6
        );
        assert_eq!(
            store_of(&orchestrator).cursor(SyncDomain::StockItems).status,
            SyncStatus::Idle
        );
    }

    #[tokio::test]
    async fn reconciliation_sweep_holds_the_voucher_flight() {
        let release = Arc::new(Notify::new());
        let client = Arc::new(LedgerClient::new(
            Box::new(GatedTransport {
                release: release.clone(),
                response: collection(&voucher_xml("v-1", 7, 10.0)),
            }),
            "Main Books".to_string(),
        ));
        let store = Arc::new(MirrorStore::new(StoreSettings::default()));
        let orchestrator = Arc::new(SyncOrchestrator::new(
            client,
            store,
            OrchestratorSettings::default(),
            None,
        ));

        let from = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2026, 3, 31).unwrap();
        let sweep = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.run_reconciliation_sweep(from, to).await })
        };

        while !orchestrator.voucher_flight.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        // While the sweep's full dump is in flight, no incremental cycle
        // may land vouchers the dump cannot know about.
        let racing = orchestrator.run_incremental_voucher_sync().await;
        assert!(matches!(racing, Err(SyncError::AlreadyRunning("vouchers"))));

        release.notify_one();
        let marked = sweep.await.unwrap().unwrap();
        assert!(marked.is_empty());

        release.notify_one();
        orchestrator.run_incremental_voucher_sync().await.unwrap();
        assert_eq!(
            store_of(&orchestrator).voucher("v-1").unwrap().lifecycle,
            Lifecycle::Active
        );
    }

    #[tokio::test]
    async fn matcher_runs_surface_on_the_event_stream() {
        use crate::recon::ReconConfig;
        use crate::store::records::{BankDirection, BankTransaction, LedgerEntry, ReconType};

        let client = Arc::new(LedgerClient::new(
            Box::new(FakeTransport::new(Vec::new())),
            "Main Books".to_string(),
        ));
        let store = Arc::new(MirrorStore::new(StoreSettings::default()));
        store.ingest_bank_transactions(vec![BankTransaction {
            id: "b-1".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
            amount: 900.0,
            direction: BankDirection::Credit,
            narration: String::new(),
        }]);
        store.ingest_ledger_entries(vec![LedgerEntry {
            id: "l-1".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
            amount: 900.0,
            party: "Acme".to_string(),
        }]);
        let orchestrator = Arc::new(SyncOrchestrator::new(
            client,
            store.clone(),
            OrchestratorSettings::default(),
            None,
        ));

        let events = Arc::new(StdMutex::new(Vec::new()));
        orchestrator
            .register_handler(Box::new(RecordingHandler {
                events: events.clone(),
                fail: false,
            }))
            .await;

        let reconciler = Reconciler::new(store, ReconConfig::default());
        let summaries = orchestrator.run_matchers(&reconciler).await;
        assert_eq!(summaries.len(), 3);

        let events = events.lock().unwrap();
        let recon_events: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                SyncEvent::ReconciliationCompleted {
                    recon_type,
                    matched,
                    unmatched,
                } => Some((*recon_type, *matched, *unmatched)),
                _ => None,
            })
            .collect();
        assert_eq!(recon_events.len(), 3);
        assert!(recon_events.contains(&(ReconType::LedgerBank, 1, 0)));
    }
}
