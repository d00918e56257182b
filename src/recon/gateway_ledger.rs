//! Gateway ↔ ledger matcher.
//!
//! One-to-one: each gateway capture should have a corresponding ledger
//! entry for the same amount. A same-day hit scores 1.0, a one-day gap
//! 0.9; anything further apart is not a match. Accepted ledger entries are
//! consumed so two captures never claim the same entry.

use std::collections::HashSet;

use crate::store::records::{
    GatewayTransaction, LedgerEntry, MatchStatus, ReconType, ReconciliationMatch,
};

use super::ReconConfig;

pub fn match_records(
    gateway: &[GatewayTransaction],
    ledger: &[LedgerEntry],
    config: &ReconConfig,
) -> Vec<ReconciliationMatch> {
    let mut rows = Vec::new();
    let mut consumed: HashSet<usize> = HashSet::new();

    for txn in gateway {
        let best = ledger
            .iter()
            .enumerate()
            .filter(|(idx, entry)| {
                !consumed.contains(idx) && (entry.amount - txn.amount).abs() <= config.epsilon
            })
            .map(|(idx, entry)| (idx, entry, (entry.date - txn.date).num_days().abs()))
            .filter(|(_, _, gap)| *gap <= config.gateway_day_window)
            .min_by_key(|(_, _, gap)| *gap);

        match best {
            Some((idx, entry, gap)) => {
                consumed.insert(idx);
                rows.push(ReconciliationMatch {
                    recon_type: ReconType::GatewayLedger,
                    source_ref: txn.id.clone(),
                    source_amount: txn.amount,
                    target_ref: Some(entry.id.clone()),
                    target_amount: Some(entry.amount),
                    status: MatchStatus::Matched,
                    confidence: if gap == 0 { 1.0 } else { 0.9 },
                });
            }
            None => {
                rows.push(ReconciliationMatch {
                    recon_type: ReconType::GatewayLedger,
                    source_ref: txn.id.clone(),
                    source_amount: txn.amount,
                    target_ref: None,
                    target_amount: None,
                    status: MatchStatus::Unmatched,
                    confidence: 0.0,
                });
            }
        }
    }

    for (idx, entry) in ledger.iter().enumerate() {
        if !consumed.contains(&idx) {
            rows.push(ReconciliationMatch {
                recon_type: ReconType::GatewayLedger,
                source_ref: entry.id.clone(),
                source_amount: entry.amount,
                target_ref: None,
                target_amount: None,
                status: MatchStatus::Unmatched,
                confidence: 0.0,
            });
        }
    }

    rows
}
