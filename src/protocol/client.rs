//! Throttled XML-over-HTTP client for the accounting engine.
//!
//! The engine accepts exactly one outbound request at a time and falls over
//! under bursts, so the transport serializes requests through a single-slot
//! mutex holding the last-request timestamp, with a minimum inter-request
//! spacing. All responses pass through the loose XML tree in the `xml`
//! module, so shape quirks are normalized before any record leaves this
//! layer.

use chrono::NaiveDate;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::store::records::{Bill, LedgerEntry, Party, PaymentStatus, StockItem, VoucherRecord, VoucherType};

use super::envelope;
use super::types::{ProtocolError, TenantInfo, WriteAction, WriteOutcome};
use super::write;
use super::xml::{XmlElement, parse_document};

/// Request timeout. The engine builds collection exports synchronously and
/// can take most of a minute on large books.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Default minimum spacing between consecutive requests.
pub const DEFAULT_MIN_SPACING: Duration = Duration::from_millis(200);

/// One-request-at-a-time transport boundary. Tests substitute an in-memory
/// fake; production uses [`HttpTransport`].
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn post_xml(&self, body: &str) -> Result<String, ProtocolError>;
}

/// Production transport: POST `text/xml` to the engine's host:port.
pub struct HttpTransport {
    http_client: reqwest::Client,
    endpoint: String,
    min_spacing: Duration,
    /// Single slot: held across the request so calls serialize, storing the
    /// completion instant of the previous request.
    last_request: Mutex<Option<Instant>>,
}

impl HttpTransport {
    pub fn new(endpoint: String, min_spacing: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self {
            http_client,
            endpoint,
            min_spacing,
            last_request: Mutex::new(None),
        }
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn post_xml(&self, body: &str) -> Result<String, ProtocolError> {
        let mut slot = self.last_request.lock().await;
        if let Some(last) = *slot {
            let elapsed = last.elapsed();
            if elapsed < self.min_spacing {
                tokio::time::sleep(self.min_spacing - elapsed).await;
            }
        }

        debug!(endpoint = %self.endpoint, bytes = body.len(), "Sending engine request");
        let result = self
            .http_client
            .post(&self.endpoint)
            .header("Content-Type", "text/xml")
            .body(body.to_string())
            .send()
            .await;

        *slot = Some(Instant::now());

        let response = result.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                ProtocolError::Connectivity(e.to_string())
            } else {
                ProtocolError::Http(e)
            }
        })?;

        if !response.status().is_success() {
            return Err(ProtocolError::Status(format!(
                "HTTP {}",
                response.status()
            )));
        }
        response.text().await.map_err(ProtocolError::Http)
    }
}

/// Typed client over the engine's collection/import protocol.
pub struct LedgerClient {
    transport: Box<dyn Transport>,
    tenant: String,
}

impl LedgerClient {
    pub fn new(transport: Box<dyn Transport>, tenant: String) -> Self {
        Self { transport, tenant }
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    async fn request(&self, body: String) -> Result<XmlElement, ProtocolError> {
        let raw = self.transport.post_xml(&body).await?;
        parse_document(&raw)
    }

    /// Header status flag must equal 1; anything else is a failed request
    /// regardless of payload.
    fn require_ok_status(root: &XmlElement) -> Result<(), ProtocolError> {
        let status = root
            .first("HEADER")
            .map(|h| h.loose_u64("STATUS"))
            .unwrap_or(0);
        if status == 1 {
            Ok(())
        } else {
            Err(ProtocolError::Status(format!("header status {status}")))
        }
    }

    /// Minimal probe. Success iff the header status flag is 1; returns the
    /// companies the engine has loaded.
    pub async fn check_connection(&self) -> Result<Vec<TenantInfo>, ProtocolError> {
        let root = self.request(envelope::probe(&self.tenant)).await?;
        Self::require_ok_status(&root)?;
        let tenants = root
            .find_all("COMPANY")
            .iter()
            .filter_map(|c| c.loose_text("NAME"))
            .filter(|name| !name.is_empty())
            .map(|name| TenantInfo { name })
            .collect();
        Ok(tenants)
    }

    /// Fetch vouchers with `AlterID` strictly greater than `cursor`.
    ///
    /// The filter runs server-side, but the contract is enforced here too:
    /// anything at or below the cursor is dropped with a log line. The
    /// caller owns cursor arithmetic.
    pub async fn fetch_vouchers_incremental(
        &self,
        cursor: u64,
        types: &[VoucherType],
    ) -> Result<Vec<VoucherRecord>, ProtocolError> {
        let root = self
            .request(envelope::vouchers_incremental(&self.tenant, cursor, types))
            .await?;
        Self::require_ok_status(&root)?;

        let mut vouchers = parse_voucher_collection(&root);
        let before = vouchers.len();
        vouchers.retain(|v| v.alter_id > cursor);
        if vouchers.len() != before {
            warn!(
                dropped = before - vouchers.len(),
                cursor, "Engine returned vouchers at or below the cursor, dropping"
            );
        }
        info!(count = vouchers.len(), cursor, "Fetched incremental vouchers");
        Ok(vouchers)
    }

    /// Complete dump for the reconciliation sweep.
    pub async fn fetch_vouchers_full(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<VoucherRecord>, ProtocolError> {
        let root = self
            .request(envelope::vouchers_full(&self.tenant, from, to))
            .await?;
        Self::require_ok_status(&root)?;
        Ok(parse_voucher_collection(&root))
    }

    pub async fn fetch_stock_items(&self) -> Result<Vec<StockItem>, ProtocolError> {
        let root = self
            .request(envelope::masters(&self.tenant, "Stock Items"))
            .await?;
        Self::require_ok_status(&root)?;
        let items = root
            .find_all("STOCKITEM")
            .iter()
            .filter_map(|item| {
                let name = item.loose_text("NAME").filter(|n| !n.is_empty())?;
                Some(StockItem {
                    name,
                    alter_id: item.loose_u64("ALTERID"),
                    closing_qty: item.loose_f64("CLOSINGQTY"),
                    closing_value: item.loose_f64("CLOSINGVALUE").abs(),
                })
            })
            .collect();
        Ok(items)
    }

    pub async fn fetch_parties(&self) -> Result<Vec<Party>, ProtocolError> {
        let root = self
            .request(envelope::masters(&self.tenant, "Ledgers"))
            .await?;
        Self::require_ok_status(&root)?;
        let parties = root
            .find_all("LEDGER")
            .iter()
            .filter_map(|ledger| {
                let name = ledger.loose_text("NAME").filter(|n| !n.is_empty())?;
                Some(Party {
                    name,
                    guid: ledger.loose_text("GUID").unwrap_or_default(),
                    alter_id: ledger.loose_u64("ALTERID"),
                    closing_balance: ledger.loose_f64("CLOSINGBALANCE"),
                })
            })
            .collect();
        Ok(parties)
    }

    pub async fn fetch_pending_bills(&self) -> Result<Vec<Bill>, ProtocolError> {
        let root = self
            .request(envelope::masters(&self.tenant, "Bills Receivable"))
            .await?;
        Self::require_ok_status(&root)?;
        let bills = root
            .find_all("BILL")
            .iter()
            .filter_map(|bill| {
                let bill_ref = bill.loose_text("NAME").filter(|n| !n.is_empty())?;
                Some(Bill {
                    bill_ref,
                    party: bill.loose_text("PARTY").unwrap_or_default(),
                    amount: bill.loose_f64("AMOUNT").abs(),
                    date: parse_remote_date(bill.loose_text("DATE").as_deref())?,
                    status: PaymentStatus::Pending,
                })
            })
            .collect();
        Ok(bills)
    }

    /// Ledger-side money movements for the reconciliation feeds.
    pub async fn fetch_ledger_entries(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<LedgerEntry>, ProtocolError> {
        let vouchers = self.fetch_vouchers_full(from, to).await?;
        Ok(vouchers
            .into_iter()
            .map(|v| LedgerEntry {
                id: v.guid.clone(),
                date: v.date,
                amount: v.amount,
                party: v.party,
            })
            .collect())
    }

    pub async fn create_voucher(&self, voucher: &VoucherRecord) -> Result<WriteOutcome, ProtocolError> {
        write::attempt_write(self.transport.as_ref(), &self.tenant, WriteAction::Create, voucher).await
    }

    pub async fn alter_voucher(&self, voucher: &VoucherRecord) -> Result<WriteOutcome, ProtocolError> {
        write::attempt_write(self.transport.as_ref(), &self.tenant, WriteAction::Alter, voucher).await
    }

    pub async fn delete_voucher(&self, voucher: &VoucherRecord) -> Result<WriteOutcome, ProtocolError> {
        write::attempt_write(self.transport.as_ref(), &self.tenant, WriteAction::Delete, voucher).await
    }
}

fn parse_remote_date(raw: Option<&str>) -> Option<NaiveDate> {
    let raw = raw?.trim();
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

/// Extract all vouchers from a collection response. Records missing a GUID
/// or a date are skipped with a log line rather than failing the batch.
fn parse_voucher_collection(root: &XmlElement) -> Vec<VoucherRecord> {
    root.find_all("VOUCHER")
        .iter()
        .filter_map(|v| parse_voucher(v))
        .collect()
}

fn parse_voucher(element: &XmlElement) -> Option<VoucherRecord> {
    // Identity may live in elements or, on older engine versions, in the
    // legacy REMOTEID attribute.
    let guid = element
        .loose_text("GUID")
        .filter(|g| !g.is_empty())
        .or_else(|| element.attributes.get("REMOTEID").cloned())?;

    let date = match parse_remote_date(element.loose_text("DATE").as_deref()) {
        Some(date) => date,
        None => {
            warn!(guid = %guid, "Voucher has no parseable date, skipping");
            return None;
        }
    };

    let voucher_type = element
        .loose_text("VOUCHERTYPENAME")
        .map(|n| VoucherType::from_remote(&n))
        .unwrap_or(VoucherType::Other("Unknown".to_string()));

    // The engine's sign convention flips per export path; the magnitude is
    // stored and direction reconstructed from the type.
    let amount = element.loose_f64("AMOUNT").abs();

    let mut record = VoucherRecord {
        guid,
        master_id: element.loose_u64("MASTERID"),
        alter_id: element.loose_u64("ALTERID"),
        voucher_type,
        date,
        party: element.loose_text("PARTYLEDGERNAME").unwrap_or_default(),
        amount,
        narration: element.loose_text("NARRATION").unwrap_or_default(),
        payment_modes: Default::default(),
        bill_ref: element.loose_text("BILLREF").filter(|b| !b.is_empty()),
        critical_reasons: Default::default(),
        audited: false,
        lifecycle: crate::store::records::Lifecycle::Active,
    };

    record.payment_modes.cash = element.loose_f64("CASHAMOUNT").abs();
    record.payment_modes.cheque = element.loose_f64("CHEQUEAMOUNT").abs();
    record.payment_modes.card = element.loose_f64("CARDAMOUNT").abs();
    record.payment_modes.upi = element.loose_f64("UPIAMOUNT").abs();
    record.payment_modes.netbanking = element.loose_f64("NETBANKINGAMOUNT").abs();
    record.payment_modes.wallet = element.loose_f64("WALLETAMOUNT").abs();
    record.payment_modes.other = element.loose_f64("OTHERAMOUNT").abs();

    Some(record)
}
