//! Per-cycle statistics.

/// What one sync cycle did, reported in the completion event and the log.
#[derive(Debug, Clone, Default)]
pub struct CycleStats {
    pub kind: &'static str,
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Cursor position after the cycle, where the cycle has one.
    pub cursor: Option<u64>,
    /// Non-fatal per-domain failures collected by best-effort cycles.
    pub errors: Vec<String>,
}

impl CycleStats {
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{}: fetched {}, {} new, {} updated, {} unchanged",
            self.kind, self.fetched, self.inserted, self.updated, self.unchanged
        );
        if let Some(cursor) = self.cursor {
            summary.push_str(&format!(", cursor {cursor}"));
        }
        if !self.errors.is_empty() {
            summary.push_str(&format!(" ({} errors)", self.errors.len()));
        }
        summary
    }
}
