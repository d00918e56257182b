//! Gateway ↔ bank statement matcher.
//!
//! Gateways settle in batches: all captures for a day land in the bank as a
//! single credit, usually the next business day. We group gateway
//! transactions by capture date and, for each bank credit, look for a day
//! group whose sum equals the credit amount within epsilon. Offsets of
//! zero, minus one, and plus one days are tried in that order; a same-day
//! settlement scores 1.0, a shifted one 0.85. Every transaction in an
//! accepted group becomes a matched row pointing at that credit.

use std::collections::{BTreeMap, HashSet};

use chrono::{Duration, NaiveDate};
use itertools::Itertools;

use crate::store::records::{
    BankDirection, BankTransaction, GatewayTransaction, MatchStatus, ReconType,
    ReconciliationMatch,
};

use super::ReconConfig;

const DAY_OFFSETS: [i64; 3] = [0, -1, 1];

pub fn match_records(
    gateway: &[GatewayTransaction],
    bank: &[BankTransaction],
    config: &ReconConfig,
) -> Vec<ReconciliationMatch> {
    let mut groups: BTreeMap<NaiveDate, Vec<&GatewayTransaction>> = BTreeMap::new();
    for (date, chunk) in &gateway.iter().group_by(|txn| txn.date) {
        groups.entry(date).or_default().extend(chunk);
    }

    let mut rows = Vec::new();
    let mut settled_days: HashSet<NaiveDate> = HashSet::new();
    let mut settled_credits: HashSet<&str> = HashSet::new();

    for credit in bank.iter().filter(|b| b.direction == BankDirection::Credit) {
        let accepted = DAY_OFFSETS.iter().find_map(|offset| {
            let day = credit.date + Duration::days(*offset);
            if settled_days.contains(&day) {
                return None;
            }
            let batch = groups.get(&day)?;
            let total: f64 = batch.iter().map(|txn| txn.amount).sum();
            ((total - credit.amount).abs() <= config.epsilon).then_some((day, *offset))
        });

        if let Some((day, offset)) = accepted {
            settled_days.insert(day);
            settled_credits.insert(credit.id.as_str());
            let confidence = if offset == 0 { 1.0 } else { 0.85 };
            for txn in &groups[&day] {
                rows.push(ReconciliationMatch {
                    recon_type: ReconType::GatewayBank,
                    source_ref: txn.id.clone(),
                    source_amount: txn.amount,
                    target_ref: Some(credit.id.clone()),
                    target_amount: Some(credit.amount),
                    status: MatchStatus::Matched,
                    confidence,
                });
            }
        }
    }

    for (day, batch) in &groups {
        if settled_days.contains(day) {
            continue;
        }
        for txn in batch {
            rows.push(ReconciliationMatch {
                recon_type: ReconType::GatewayBank,
                source_ref: txn.id.clone(),
                source_amount: txn.amount,
                target_ref: None,
                target_amount: None,
                status: MatchStatus::Unmatched,
                confidence: 0.0,
            });
        }
    }

    for credit in bank.iter().filter(|b| b.direction == BankDirection::Credit) {
        if !settled_credits.contains(credit.id.as_str()) {
            rows.push(ReconciliationMatch {
                recon_type: ReconType::GatewayBank,
                source_ref: credit.id.clone(),
                source_amount: credit.amount,
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

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn gw(id: &str, d: u32, amount: f64) -> GatewayTransaction {
        GatewayTransaction { id: id.to_string(), date: day(d), amount, fee: 0.0 }
    }

    fn credit(id: &str, d: u32, amount: f64) -> BankTransaction {
        BankTransaction {
            id: id.to_string(),
            date: day(d),
            amount,
            direction: BankDirection::Credit,
            narration: String::new(),
        }
    }

    #[test]
    fn next_day_settlement_matches_whole_batch() {
        // Three captures on the 10th settle as one credit on the 11th.
        let gateway = [gw("g-1", 10, 5000.0), gw("g-2", 10, 7000.0), gw("g-3", 10, 3000.0)];
        let bank = [credit("b-1", 11, 15000.0)];

        let rows = match_records(&gateway, &bank, &ReconConfig::default());
        let matched: Vec<_> =
            rows.iter().filter(|r| r.status == MatchStatus::Matched).collect();
        assert_eq!(matched.len(), 3);
        assert!(matched.iter().all(|r| r.confidence == 0.85));
        assert!(matched.iter().all(|r| r.target_ref.as_deref() == Some("b-1")));
        assert!(!rows
            .iter()
            .any(|r| r.source_ref.starts_with("g-") && r.status == MatchStatus::Unmatched));
    }

    #[test]
    fn same_day_settlement_scores_full_confidence() {
        let rows = match_records(
            &[gw("g-1", 10, 2500.0)],
            &[credit("b-1", 10, 2500.0)],
            &ReconConfig::default(),
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].confidence, 1.0);
    }

    #[test]
    fn sum_mismatch_leaves_both_sides_unmatched() {
        let rows = match_records(
            &[gw("g-1", 10, 5000.0), gw("g-2", 10, 7000.0)],
            &[credit("b-1", 11, 11000.0)],
            &ReconConfig::default(),
        );
        assert!(rows.iter().all(|r| r.status == MatchStatus::Unmatched));
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn debits_are_ignored() {
        let mut debit = credit("b-1", 10, 2500.0);
        debit.direction = BankDirection::Debit;
        let rows = match_records(&[gw("g-1", 10, 2500.0)], &[debit], &ReconConfig::default());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, MatchStatus::Unmatched);
    }

    #[test]
    fn a_day_group_settles_at_most_once() {
        // Two credits for the same amount; only one can claim the batch.
        let gateway = [gw("g-1", 10, 4000.0)];
        let bank = [credit("b-1", 10, 4000.0), credit("b-2", 11, 4000.0)];
        let rows = match_records(&gateway, &bank, &ReconConfig::default());

        let matched: Vec<_> =
            rows.iter().filter(|r| r.status == MatchStatus::Matched).collect();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].target_ref.as_deref(), Some("b-1"));
        assert!(rows.iter().any(|r| r.source_ref == "b-2" && r.status == MatchStatus::Unmatched));
    }
}
