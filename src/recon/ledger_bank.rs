//! Ledger ↔ bank statement matcher.
//!
//! For each bank line, scan the ledger pool for an amount match within
//! epsilon; among candidates prefer the smallest date gap and accept only
//! gaps up to the configured window (2 days by default). Confidence decays
//! with the gap: 1.0 / 0.9 / 0.8 for 0 / 1 / 2 days. An accepted ledger
//! entry is consumed and cannot match a second bank line. Leftovers on both
//! sides are persisted as unmatched rows.

use std::collections::HashSet;

use crate::store::records::{
    BankTransaction, LedgerEntry, MatchStatus, ReconType, ReconciliationMatch,
};

use super::ReconConfig;

fn confidence_for_gap(gap: i64) -> f64 {
    match gap {
        0 => 1.0,
        1 => 0.9,
        _ => 0.8,
    }
}

pub fn match_records(
    bank: &[BankTransaction],
    ledger: &[LedgerEntry],
    config: &ReconConfig,
) -> Vec<ReconciliationMatch> {
    let mut rows = Vec::new();
    let mut consumed: HashSet<usize> = HashSet::new();

    for txn in bank {
        let best = ledger
            .iter()
            .enumerate()
            .filter(|(idx, entry)| {
                !consumed.contains(idx) && (entry.amount - txn.amount).abs() <= config.epsilon
            })
            .map(|(idx, entry)| (idx, entry, (entry.date - txn.date).num_days().abs()))
            .min_by_key(|(_, _, gap)| *gap);

        match best {
            Some((idx, entry, gap)) if gap <= config.bank_day_window => {
                consumed.insert(idx);
                rows.push(ReconciliationMatch {
                    recon_type: ReconType::LedgerBank,
                    source_ref: txn.id.clone(),
                    source_amount: txn.amount,
                    target_ref: Some(entry.id.clone()),
                    target_amount: Some(entry.amount),
                    status: MatchStatus::Matched,
                    confidence: confidence_for_gap(gap),
                });
            }
            _ => {
                rows.push(ReconciliationMatch {
                    recon_type: ReconType::LedgerBank,
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
                recon_type: ReconType::LedgerBank,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::records::BankDirection;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn bank(id: &str, d: u32, amount: f64) -> BankTransaction {
        BankTransaction {
            id: id.to_string(),
            date: day(d),
            amount,
            direction: BankDirection::Credit,
            narration: String::new(),
        }
    }

    fn entry(id: &str, d: u32, amount: f64) -> LedgerEntry {
        LedgerEntry {
            id: id.to_string(),
            date: day(d),
            amount,
            party: "Acme".to_string(),
        }
    }

    #[test]
    fn confidence_decays_with_date_gap() {
        let config = ReconConfig::default();
        let banks = [bank("b-0", 10, 100.0), bank("b-1", 10, 200.0), bank("b-2", 10, 300.0)];
        let ledgers = [entry("l-0", 10, 100.0), entry("l-1", 11, 200.0), entry("l-2", 8, 300.0)];

        let rows = match_records(&banks, &ledgers, &config);
        let by_source = |id: &str| rows.iter().find(|r| r.source_ref == id).unwrap();
        assert_eq!(by_source("b-0").confidence, 1.0);
        assert_eq!(by_source("b-1").confidence, 0.9);
        assert_eq!(by_source("b-2").confidence, 0.8);
    }

    #[test]
    fn gap_beyond_window_is_rejected() {
        let rows = match_records(
            &[bank("b-1", 10, 100.0)],
            &[entry("l-1", 14, 100.0)],
            &ReconConfig::default(),
        );
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.status == MatchStatus::Unmatched));
    }

    #[test]
    fn closest_candidate_wins_and_is_consumed() {
        let banks = [bank("b-1", 10, 100.0), bank("b-2", 12, 100.0)];
        let ledgers = [entry("l-near", 10, 100.0), entry("l-far", 12, 100.0)];
        let rows = match_records(&banks, &ledgers, &ReconConfig::default());

        let first = rows.iter().find(|r| r.source_ref == "b-1").unwrap();
        assert_eq!(first.target_ref.as_deref(), Some("l-near"));
        let second = rows.iter().find(|r| r.source_ref == "b-2").unwrap();
        // l-near is spent; b-2 falls back to the remaining candidate.
        assert_eq!(second.target_ref.as_deref(), Some("l-far"));
    }

    #[test]
    fn unmatched_records_are_persisted_not_dropped() {
        let rows = match_records(
            &[bank("b-1", 10, 100.0)],
            &[entry("l-1", 10, 555.0)],
            &ReconConfig::default(),
        );
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().any(|r| r.source_ref == "b-1" && r.status == MatchStatus::Unmatched));
        assert!(rows.iter().any(|r| r.source_ref == "l-1" && r.status == MatchStatus::Unmatched));
    }
}
