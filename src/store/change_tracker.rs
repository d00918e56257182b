//! Change tracking for version-counted external records.
//!
//! Invoked by the store on every voucher upsert. When an incoming version
//! strictly exceeds the stored one, the pre-mutation record is snapshotted,
//! a fixed allow-list of fields is diffed into change rows, and the critical
//! flag is re-derived. The tracker also classifies vouchers that vanish from
//! a full remote dump as converted or deleted.

use chrono::NaiveDate;

use super::records::{CriticalReason, FieldChangeEntry, Lifecycle, VoucherRecord};

/// Fields diffed on every version-advancing mutation unless the operator
/// narrows the list in config.
pub const DEFAULT_TRACKED_FIELDS: &[&str] = &[
    "date",
    "party",
    "amount",
    "narration",
    "voucher_type",
    "payment_total",
    "bill_ref",
];

fn field_value(record: &VoucherRecord, field: &str) -> Option<String> {
    match field {
        "date" => Some(record.date.to_string()),
        "party" => Some(record.party.clone()),
        "amount" => Some(format!("{:.2}", record.amount)),
        "narration" => Some(record.narration.clone()),
        "voucher_type" => Some(record.voucher_type.as_remote().to_string()),
        "payment_total" => Some(format!("{:.2}", record.payment_modes.total())),
        "bill_ref" => Some(record.bill_ref.clone().unwrap_or_default()),
        _ => None,
    }
}

/// Diff the tracked allow-list between two versions of one voucher,
/// producing one change row per differing field.
pub fn diff_tracked(
    old: &VoucherRecord,
    new: &VoucherRecord,
    tracked_fields: &[String],
) -> Vec<FieldChangeEntry> {
    let mut changes = Vec::new();
    for field in tracked_fields {
        let (Some(old_value), Some(new_value)) =
            (field_value(old, field), field_value(new, field))
        else {
            tracing::debug!("Ignoring unknown tracked field '{}'", field);
            continue;
        };
        if old_value != new_value {
            changes.push(FieldChangeEntry {
                guid: old.guid.clone(),
                from_alter_id: old.alter_id,
                to_alter_id: new.alter_id,
                field: field.clone(),
                old: old_value,
                new: new_value,
            });
        }
    }
    changes
}

/// Re-derive the critical reason set on a record.
///
/// Each reason is added when its condition holds and removed once it no
/// longer does, so a record heals itself when a later version fixes the
/// trigger. `previously_audited` comes from the stored version at mutation
/// time; `None` means this is a first insert.
pub fn derive_critical(
    record: &mut VoucherRecord,
    previously_audited: Option<bool>,
    payment_tolerance: f64,
    today: NaiveDate,
) {
    let total = record.payment_modes.total();
    if total != 0.0 && (total - record.amount).abs() > payment_tolerance {
        record.critical_reasons.insert(CriticalReason::PaymentMismatch);
    } else {
        record.critical_reasons.remove(&CriticalReason::PaymentMismatch);
    }

    if record.date > today {
        record.critical_reasons.insert(CriticalReason::FutureDated);
    } else {
        record.critical_reasons.remove(&CriticalReason::FutureDated);
    }

    // Altered-after-audit is triggered by a mutation of an audited record
    // and holds until the audit mark itself is withdrawn.
    if previously_audited == Some(true) {
        record.critical_reasons.insert(CriticalReason::AlteredAfterAudit);
    } else if !record.audited {
        record.critical_reasons.remove(&CriticalReason::AlteredAfterAudit);
    }
}

/// Classify a voucher that is present locally but absent from a complete
/// freshly fetched remote set.
///
/// The engine repurposes records in place under the same business workflow
/// without preserving identity, so a newer remote record with the same
/// party, an amount within tolerance, and an allowed target type is read as
/// a conversion. Anything else is read as a deletion. Best-effort: the
/// engine gives no authoritative confirmation either way.
pub fn classify_absentee(
    missing: &VoucherRecord,
    remote: &[VoucherRecord],
    amount_tolerance: f64,
) -> Lifecycle {
    let targets = missing.voucher_type.conversion_targets();
    let candidate = remote.iter().find(|r| {
        r.alter_id > missing.alter_id
            && r.party == missing.party
            && (r.amount - missing.amount).abs() <= amount_tolerance
            && targets.contains(&r.voucher_type)
    });

    match candidate {
        Some(found) => Lifecycle::Converted {
            target: found.voucher_type.clone(),
        },
        None => Lifecycle::Deleted {
            reason: "absent from full remote set".to_string(),
        },
    }
}
