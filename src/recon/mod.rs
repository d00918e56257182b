//! Cross-source reconciliation.
//!
//! Three independent heuristic matchers, one per source pair, because no
//! key is shared across the ledger system, the bank statement feed and the
//! payment gateway feed. Each matcher is a pure function over the two
//! pools; the [`Reconciler`] wraps them with store access, manual-match
//! exclusion and idempotent persistence. Every source record that fails to
//! match is persisted with an explicit unmatched status so gaps stay
//! queryable.

pub mod gateway_bank;
pub mod gateway_ledger;
pub mod ledger_bank;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::store::MirrorStore;
use crate::store::records::{MatchStatus, ReconType, ReconciliationMatch};

/// Matching constants. Heuristic by design: confidence-scored and
/// auditable, not provably correct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconConfig {
    /// Amount comparison tolerance, in currency units.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// Maximum date gap accepted between a ledger entry and a bank line.
    #[serde(default = "default_bank_day_window")]
    pub bank_day_window: i64,
    /// Maximum date gap accepted between a gateway txn and a ledger entry.
    #[serde(default = "default_gateway_day_window")]
    pub gateway_day_window: i64,
}

fn default_epsilon() -> f64 {
    0.01
}

fn default_bank_day_window() -> i64 {
    2
}

fn default_gateway_day_window() -> i64 {
    1
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            epsilon: default_epsilon(),
            bank_day_window: default_bank_day_window(),
            gateway_day_window: default_gateway_day_window(),
        }
    }
}

/// Result counts of one matcher run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconSummary {
    pub recon_type: ReconType,
    pub matched: usize,
    pub unmatched: usize,
}

/// Runs the matchers against the mirror. Owns nothing but a store handle
/// and the constants; safe to re-run at any time.
pub struct Reconciler {
    store: Arc<MirrorStore>,
    config: ReconConfig,
}

impl Reconciler {
    pub fn new(store: Arc<MirrorStore>, config: ReconConfig) -> Self {
        Self { store, config }
    }

    /// Record ids already pinned by a human for this reconciliation. Those
    /// records are withheld from the automatic pools entirely.
    fn manual_refs(&self, recon_type: ReconType) -> HashSet<String> {
        self.store
            .matches(recon_type)
            .into_iter()
            .filter(|m| m.status == MatchStatus::ManualMatch)
            .flat_map(|m| {
                std::iter::once(m.source_ref).chain(m.target_ref.into_iter())
            })
            .collect()
    }

    fn persist(&self, recon_type: ReconType, rows: Vec<ReconciliationMatch>) -> ReconSummary {
        let matched = rows.iter().filter(|r| r.status == MatchStatus::Matched).count();
        let unmatched = rows.len() - matched;
        // Prior automatic rows are dropped before the fresh set lands, so
        // repeated runs converge instead of accumulating duplicates.
        self.store.replace_auto_matches(recon_type, rows);
        let summary = ReconSummary {
            recon_type,
            matched,
            unmatched,
        };
        info!(
            recon = recon_type.as_str(),
            matched = summary.matched,
            unmatched = summary.unmatched,
            "Reconciliation recomputed"
        );
        summary
    }

    pub fn run_ledger_bank(&self) -> ReconSummary {
        let manual = self.manual_refs(ReconType::LedgerBank);
        let bank: Vec<_> = self
            .store
            .bank_transactions()
            .into_iter()
            .filter(|t| !manual.contains(&t.id))
            .collect();
        let ledger: Vec<_> = self
            .store
            .ledger_entries()
            .into_iter()
            .filter(|e| !manual.contains(&e.id))
            .collect();
        let rows = ledger_bank::match_records(&bank, &ledger, &self.config);
        self.persist(ReconType::LedgerBank, rows)
    }

    pub fn run_gateway_bank(&self) -> ReconSummary {
        let manual = self.manual_refs(ReconType::GatewayBank);
        let gateway: Vec<_> = self
            .store
            .gateway_transactions()
            .into_iter()
            .filter(|t| !manual.contains(&t.id))
            .collect();
        let bank: Vec<_> = self
            .store
            .bank_transactions()
            .into_iter()
            .filter(|t| !manual.contains(&t.id))
            .collect();
        let rows = gateway_bank::match_records(&gateway, &bank, &self.config);
        self.persist(ReconType::GatewayBank, rows)
    }

    pub fn run_gateway_ledger(&self) -> ReconSummary {
        let manual = self.manual_refs(ReconType::GatewayLedger);
        let gateway: Vec<_> = self
            .store
            .gateway_transactions()
            .into_iter()
            .filter(|t| !manual.contains(&t.id))
            .collect();
        let ledger: Vec<_> = self
            .store
            .ledger_entries()
            .into_iter()
            .filter(|e| !manual.contains(&e.id))
            .collect();
        let rows = gateway_ledger::match_records(&gateway, &ledger, &self.config);
        self.persist(ReconType::GatewayLedger, rows)
    }

    pub fn run_all(&self) -> Vec<ReconSummary> {
        vec![
            self.run_ledger_bank(),
            self.run_gateway_bank(),
            self.run_gateway_ledger(),
        ]
    }
}
