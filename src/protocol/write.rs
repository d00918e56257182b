//! Multi-shape write chain for voucher mutations.
//!
//! The engine's acceptance of each import identity shape is undocumented
//! and varies across versions, so a mutation walks an ordered list of
//! envelope shapes and stops at the first structurally confirmed success.
//! Confirmation means the counter matching the action is positive and no
//! exceptions were reported; a bare "received" acknowledgment never counts.
//! Connectivity failures abort the chain immediately, rejections move on to
//! the next shape.

use tracing::{debug, info, warn};

use crate::store::records::VoucherRecord;

use super::client::Transport;
use super::envelope::{self, WriteShape};
use super::types::{ProtocolError, WriteAction, WriteOutcome};
use super::xml::{XmlElement, parse_document};

/// Shapes in the order they are attempted.
const SHAPE_ORDER: [WriteShape; 3] = [
    WriteShape::ByMasterId,
    WriteShape::ByGuid,
    WriteShape::LegacyAttribute,
];

/// Parse the engine's import response counters.
fn parse_outcome(root: &XmlElement, shape: WriteShape) -> WriteOutcome {
    // Counters sit under RESPONSE on current engines; older ones put them
    // under IMPORTRESULT. Search from the root either way.
    let responses = root.find_all("RESPONSE");
    let import_results = root.find_all("IMPORTRESULT");
    let counters: &XmlElement = responses
        .first()
        .copied()
        .or_else(|| import_results.first().copied())
        .unwrap_or(root);

    let line_errors = root
        .find_all("LINEERROR")
        .iter()
        .map(|e| e.text.clone())
        .filter(|t| !t.is_empty())
        .collect();

    WriteOutcome {
        strategy: shape.name().to_string(),
        created: counters.loose_u64("CREATED") as u32,
        altered: counters.loose_u64("ALTERED") as u32,
        deleted: counters.loose_u64("DELETED") as u32,
        errors: counters.loose_u64("ERRORS") as u32,
        exceptions: counters.loose_u64("EXCEPTIONS") as u32,
        line_errors,
    }
}

/// Push one voucher mutation through the shape chain.
pub async fn attempt_write(
    transport: &dyn Transport,
    tenant: &str,
    action: WriteAction,
    voucher: &VoucherRecord,
) -> Result<WriteOutcome, ProtocolError> {
    let mut rejections: Vec<String> = Vec::new();

    for shape in SHAPE_ORDER {
        let Some(body) = envelope::voucher_import(tenant, action, voucher, shape) else {
            debug!(shape = shape.name(), "Shape not addressable for this voucher, skipping");
            continue;
        };

        let raw = match transport.post_xml(&body).await {
            Ok(raw) => raw,
            Err(e @ ProtocolError::Connectivity(_)) => return Err(e),
            Err(e) => {
                warn!(shape = shape.name(), error = %e, "Write request failed, trying next shape");
                rejections.push(format!("{}: {}", shape.name(), e));
                continue;
            }
        };

        let root = match parse_document(&raw) {
            Ok(root) => root,
            Err(e) => {
                warn!(shape = shape.name(), error = %e, "Unparseable write response, trying next shape");
                rejections.push(format!("{}: {}", shape.name(), e));
                continue;
            }
        };

        let outcome = parse_outcome(&root, shape);
        if outcome.accepted(action) {
            info!(
                guid = %voucher.guid,
                action = action.as_str(),
                shape = shape.name(),
                "Write confirmed"
            );
            return Ok(outcome);
        }

        debug!(
            shape = shape.name(),
            detail = %outcome.detail(),
            "Write not confirmed by this shape"
        );
        rejections.push(format!("{}: {}", shape.name(), outcome.detail()));
    }

    Err(ProtocolError::Rejection(format!(
        "{} of voucher {} refused by all shapes [{}]",
        action.as_str(),
        voucher.guid,
        rejections.join(" | ")
    )))
}
