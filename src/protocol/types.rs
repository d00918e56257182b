//! Types shared across the protocol client.

use serde::{Deserialize, Serialize};

/// Error taxonomy for talking to the accounting engine.
///
/// Failures are returned as values, never panicked across the client
/// boundary. Shape ambiguity in responses is not an error at all: the
/// parser defaults and logs instead (see the `xml` module).
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Engine unreachable or request timed out. The caller aborts its cycle
    /// and leaves cursors untouched.
    #[error("Engine unreachable: {0}")]
    Connectivity(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Structurally unparseable response document.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// The engine parsed the request but refused the mutation, or reported
    /// exception counters. Carries everything the response said.
    #[error("Write rejected: {0}")]
    Rejection(String),

    /// Response header status flag was not 1.
    #[error("Engine reported failure status: {0}")]
    Status(String),
}

/// A company/tenant the engine reports as loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantInfo {
    pub name: String,
}

/// Mutation kinds pushed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAction {
    Create,
    Alter,
    Delete,
}

impl WriteAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteAction::Create => "Create",
            WriteAction::Alter => "Alter",
            WriteAction::Delete => "Delete",
        }
    }
}

/// Parsed result of one import request.
///
/// A generic "request received" acknowledgment is never enough: acceptance
/// requires the counter matching the attempted action to be positive and
/// the exception counter to be zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteOutcome {
    /// Name of the envelope strategy that produced this response.
    pub strategy: String,
    pub created: u32,
    pub altered: u32,
    pub deleted: u32,
    pub errors: u32,
    pub exceptions: u32,
    pub line_errors: Vec<String>,
}

impl WriteOutcome {
    /// Structural confirmation that the action landed.
    pub fn accepted(&self, action: WriteAction) -> bool {
        if self.exceptions > 0 || self.errors > 0 {
            return false;
        }
        match action {
            WriteAction::Create => self.created > 0,
            WriteAction::Alter => self.altered > 0,
            WriteAction::Delete => self.deleted > 0,
        }
    }

    /// Condensed diagnostic for logs and rejection errors.
    pub fn detail(&self) -> String {
        let mut detail = format!(
            "created={} altered={} deleted={} errors={} exceptions={}",
            self.created, self.altered, self.deleted, self.errors, self.exceptions
        );
        for line in &self.line_errors {
            detail.push_str("; ");
            detail.push_str(line);
        }
        detail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_acknowledgment_is_not_acceptance() {
        // All counters zero: the engine "received" the request but
        // confirmed nothing.
        let outcome = WriteOutcome::default();
        assert!(!outcome.accepted(WriteAction::Create));
        assert!(!outcome.accepted(WriteAction::Alter));
    }

    #[test]
    fn nonzero_exceptions_void_a_positive_counter() {
        let outcome = WriteOutcome {
            created: 1,
            exceptions: 1,
            ..Default::default()
        };
        assert!(!outcome.accepted(WriteAction::Create));
    }

    #[test]
    fn counter_must_match_the_action() {
        let outcome = WriteOutcome {
            altered: 1,
            ..Default::default()
        };
        assert!(outcome.accepted(WriteAction::Alter));
        assert!(!outcome.accepted(WriteAction::Create));
    }
}
