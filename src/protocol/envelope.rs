//! Request envelope builders for the engine's collection/import schema.
//!
//! Every request is one `<ENVELOPE>` with a `<HEADER>` naming the request
//! kind and a `<BODY>` carrying static variables plus, for reads, a
//! system-formula filter evaluated server-side. Incremental voucher reads
//! filter on `$AlterId > cursor` so only strictly newer versions travel.

use chrono::NaiveDate;
use quick_xml::escape::escape;

use crate::store::records::{VoucherRecord, VoucherType};

use super::types::WriteAction;

fn esc(value: &str) -> String {
    escape(value).into_owned()
}

fn remote_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

fn static_variables(tenant: &str) -> String {
    format!(
        "<STATICVARIABLES>\
         <SVCURRENTCOMPANY>{}</SVCURRENTCOMPANY>\
         <SVEXPORTFORMAT>XML</SVEXPORTFORMAT>\
         </STATICVARIABLES>",
        esc(tenant)
    )
}

/// Minimal probe: ask for the list of loaded companies. Success is judged
/// from the response header status flag, not from the payload.
pub fn probe(tenant: &str) -> String {
    format!(
        "<ENVELOPE>\
         <HEADER><VERSION>1</VERSION><REQUEST>Export</REQUEST>\
         <TYPE>Collection</TYPE><ID>Companies</ID></HEADER>\
         <BODY><DESC>{}</DESC></BODY>\
         </ENVELOPE>",
        static_variables(tenant)
    )
}

/// Collection request for vouchers strictly newer than `cursor`.
/// Cancelled and optional vouchers are excluded server-side; they never
/// represent committed money movements.
pub fn vouchers_incremental(tenant: &str, cursor: u64, types: &[VoucherType]) -> String {
    let type_filter = if types.is_empty() {
        String::new()
    } else {
        let names = types
            .iter()
            .map(|t| format!("$VoucherTypeName = \"{}\"", esc(t.as_remote())))
            .collect::<Vec<_>>()
            .join(" OR ");
        format!("<SYSTEM TYPE=\"Formulae\" NAME=\"TypeFilter\">{}</SYSTEM>", esc(&names))
    };
    format!(
        "<ENVELOPE>\
         <HEADER><VERSION>1</VERSION><REQUEST>Export</REQUEST>\
         <TYPE>Collection</TYPE><ID>Vouchers</ID></HEADER>\
         <BODY><DESC>{}\
         <SYSTEM TYPE=\"Formulae\" NAME=\"AlterFilter\">$AlterId &gt; {}</SYSTEM>\
         <SYSTEM TYPE=\"Formulae\" NAME=\"StateFilter\">NOT $IsCancelled AND NOT $IsOptional</SYSTEM>\
         {}\
         </DESC></BODY>\
         </ENVELOPE>",
        static_variables(tenant),
        cursor,
        type_filter
    )
}

/// Complete voucher dump over a date range, used by the reconciliation
/// sweep that detects absentees.
pub fn vouchers_full(tenant: &str, from: NaiveDate, to: NaiveDate) -> String {
    format!(
        "<ENVELOPE>\
         <HEADER><VERSION>1</VERSION><REQUEST>Export</REQUEST>\
         <TYPE>Collection</TYPE><ID>Vouchers</ID></HEADER>\
         <BODY><DESC>{}\
         <SYSTEM TYPE=\"Formulae\" NAME=\"DateFilter\">$Date &gt;= {} AND $Date &lt;= {}</SYSTEM>\
         <SYSTEM TYPE=\"Formulae\" NAME=\"StateFilter\">NOT $IsCancelled AND NOT $IsOptional</SYSTEM>\
         </DESC></BODY>\
         </ENVELOPE>",
        static_variables(tenant),
        remote_date(from),
        remote_date(to)
    )
}

/// Master-data collection request: `collection` is the engine-side
/// collection name ("Stock Items", "Ledgers", "Bills Receivable").
pub fn masters(tenant: &str, collection: &str) -> String {
    format!(
        "<ENVELOPE>\
         <HEADER><VERSION>1</VERSION><REQUEST>Export</REQUEST>\
         <TYPE>Collection</TYPE><ID>{}</ID></HEADER>\
         <BODY><DESC>{}</DESC></BODY>\
         </ENVELOPE>",
        esc(collection),
        static_variables(tenant)
    )
}

/// Identity shapes a voucher import may carry. The engine's acceptance of
/// each shape is undocumented and inconsistent across versions, so writes
/// walk these in a fixed order until one is structurally confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteShape {
    /// Address the record by its numeric MasterID element.
    ByMasterId,
    /// Address the record by its GUID element.
    ByGuid,
    /// Address the record by the legacy REMOTEID attribute.
    LegacyAttribute,
}

impl WriteShape {
    pub fn name(&self) -> &'static str {
        match self {
            WriteShape::ByMasterId => "by_master_id",
            WriteShape::ByGuid => "by_guid",
            WriteShape::LegacyAttribute => "legacy_attribute",
        }
    }
}

fn voucher_body(voucher: &VoucherRecord) -> String {
    let bill_ref = voucher
        .bill_ref
        .as_deref()
        .map(|r| format!("<BILLREF>{}</BILLREF>", esc(r)))
        .unwrap_or_default();
    format!(
        "<DATE>{}</DATE>\
         <PARTYLEDGERNAME>{}</PARTYLEDGERNAME>\
         <VOUCHERTYPENAME>{}</VOUCHERTYPENAME>\
         <AMOUNT>{:.2}</AMOUNT>\
         <NARRATION>{}</NARRATION>\
         {}",
        remote_date(voucher.date),
        esc(&voucher.party),
        esc(voucher.voucher_type.as_remote()),
        voucher.amount,
        esc(&voucher.narration),
        bill_ref
    )
}

/// Import envelope for one voucher mutation in one identity shape.
///
/// Returns `None` when the voucher lacks the identity this shape addresses
/// by (a never-synced local voucher has no MasterID yet, for instance).
pub fn voucher_import(
    tenant: &str,
    action: WriteAction,
    voucher: &VoucherRecord,
    shape: WriteShape,
) -> Option<String> {
    let (open_tag, identity) = match shape {
        WriteShape::ByMasterId => {
            if voucher.master_id == 0 && action != WriteAction::Create {
                return None;
            }
            (
                format!("<VOUCHER ACTION=\"{}\">", action.as_str()),
                format!("<MASTERID>{}</MASTERID>", voucher.master_id),
            )
        }
        WriteShape::ByGuid => {
            if voucher.guid.is_empty() {
                return None;
            }
            (
                format!("<VOUCHER ACTION=\"{}\">", action.as_str()),
                format!("<GUID>{}</GUID>", esc(&voucher.guid)),
            )
        }
        WriteShape::LegacyAttribute => {
            if voucher.guid.is_empty() {
                return None;
            }
            (
                format!(
                    "<VOUCHER REMOTEID=\"{}\" ACTION=\"{}\">",
                    esc(&voucher.guid),
                    action.as_str()
                ),
                String::new(),
            )
        }
    };

    Some(format!(
        "<ENVELOPE>\
         <HEADER><VERSION>1</VERSION><REQUEST>Import</REQUEST>\
         <TYPE>Data</TYPE><ID>Vouchers</ID></HEADER>\
         <BODY><DESC>{}</DESC>\
         <DATA><MESSAGE>{}{}{}</VOUCHER></MESSAGE></DATA>\
         </BODY></ENVELOPE>",
        static_variables(tenant),
        open_tag,
        identity,
        voucher_body(voucher)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::records::{Lifecycle, PaymentModes};

    fn voucher() -> VoucherRecord {
        VoucherRecord {
            guid: "abc-00017".to_string(),
            master_id: 17,
            alter_id: 3,
            voucher_type: VoucherType::Sales,
            date: NaiveDate::from_ymd_opt(2026, 3, 15).unwrap(),
            party: "Acme & Co".to_string(),
            amount: 1500.0,
            narration: "march order".to_string(),
            payment_modes: PaymentModes::default(),
            bill_ref: None,
            critical_reasons: Default::default(),
            audited: false,
            lifecycle: Lifecycle::Active,
        }
    }

    #[test]
    fn incremental_envelope_filters_strictly_above_cursor() {
        let body = vouchers_incremental("Main Books", 412, &[]);
        assert!(body.contains("$AlterId &gt; 412"));
        assert!(body.contains("NOT $IsCancelled"));
        assert!(body.contains("<SVCURRENTCOMPANY>Main Books</SVCURRENTCOMPANY>"));
    }

    #[test]
    fn party_names_are_escaped() {
        let body = voucher_import("Main Books", WriteAction::Create, &voucher(), WriteShape::ByGuid)
            .unwrap();
        assert!(body.contains("Acme &amp; Co"));
    }

    #[test]
    fn legacy_shape_puts_identity_in_attribute() {
        let body = voucher_import(
            "Main Books",
            WriteAction::Alter,
            &voucher(),
            WriteShape::LegacyAttribute,
        )
        .unwrap();
        assert!(body.contains("REMOTEID=\"abc-00017\""));
        assert!(!body.contains("<GUID>"));
    }

    #[test]
    fn master_id_shape_is_skipped_without_a_master_id() {
        let mut v = voucher();
        v.master_id = 0;
        assert!(voucher_import("Main Books", WriteAction::Alter, &v, WriteShape::ByMasterId).is_none());
    }

    #[test]
    fn dates_use_the_engine_compact_format() {
        let body = vouchers_full(
            "Main Books",
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
        );
        assert!(body.contains("20260101"));
        assert!(body.contains("20260331"));
    }
}
