//! Ledger value types.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ExpectedLine
// ---------------------------------------------------------------------------

/// One expected transaction line, as supplied by the screen when it loads an
/// invoice / stock-take sheet from the system of record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedLine {
    /// SKU or other stable item identifier.
    pub item_key: String,
    /// Human-readable label shown in the scan list.
    pub label: String,
    /// Quantity that must be scanned before the line balances.
    pub required_qty: u32,
}

impl ExpectedLine {
    pub fn new(item_key: impl Into<String>, label: impl Into<String>, required_qty: u32) -> Self {
        Self {
            item_key: item_key.into(),
            label: label.into(),
            required_qty,
        }
    }
}

// ---------------------------------------------------------------------------
// LedgerLine
// ---------------------------------------------------------------------------

/// A tracked line: expected quantity plus the server-acknowledged scan count.
///
/// `scanned_qty` is owned exclusively by the session's
/// [`ReconciliationLedger`](crate::ReconciliationLedger) and only moves via
/// [`apply`](crate::ReconciliationLedger::apply) — never decremented, never
/// incremented locally ahead of a remote acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerLine {
    pub item_key: String,
    pub label: String,
    pub required_qty: u32,
    pub scanned_qty: u32,
}

impl LedgerLine {
    /// `true` once the acknowledged count covers the required count.
    pub fn is_matched(&self) -> bool {
        self.scanned_qty >= self.required_qty
    }

    /// Quantity still missing (0 once matched).
    pub fn remaining_qty(&self) -> u32 {
        self.required_qty.saturating_sub(self.scanned_qty)
    }
}

impl From<ExpectedLine> for LedgerLine {
    fn from(e: ExpectedLine) -> Self {
        Self {
            item_key: e.item_key,
            label: e.label,
            required_qty: e.required_qty,
            scanned_qty: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// MatchOutcome
// ---------------------------------------------------------------------------

/// Result of applying one server-acknowledged scan to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchOutcome {
    /// The item key does not belong to this transaction. Ledger untouched;
    /// the caller must surface a "not part of this transaction" notice.
    NotFound,
    /// The line was updated (or re-confirmed) and at least one line is still
    /// short.
    Updated { item_key: String, scanned_qty: u32 },
    /// The line was updated and every line in the ledger now balances.
    AllMatched { item_key: String, scanned_qty: u32 },
}

impl MatchOutcome {
    pub fn is_not_found(&self) -> bool {
        matches!(self, MatchOutcome::NotFound)
    }
}

// ---------------------------------------------------------------------------
// LedgerSummary
// ---------------------------------------------------------------------------

/// Aggregate progress snapshot, mirroring the totals the backend reports on
/// invoice load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub total_required: u32,
    pub total_scanned: u32,
    pub lines_matched: usize,
    pub lines_total: usize,
}
