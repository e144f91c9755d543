//! Reconciliation ledger.
//!
//! # Invariants
//!
//! 1. **Monotonic quantities.** `apply` sets a line's `scanned_qty` to the
//!    server-acknowledged value, clamped so it never moves backwards. A late
//!    or duplicate acknowledgement can re-deliver an old count; accepting a
//!    decrement would let stale responses unwind confirmed progress.
//! 2. **No local invention.** `apply` never inserts lines. An unknown item
//!    key returns [`MatchOutcome::NotFound`] and leaves every line untouched.
//! 3. **Completion is stable.** Once `is_complete()` is true, re-applying
//!    any acknowledged line cannot make it false again.

use crate::types::{ExpectedLine, LedgerLine, LedgerSummary, MatchOutcome};

/// Expected-vs-scanned state for the current session's line items.
///
/// Construct from the expected lines the screen loaded, or [`empty`] for
/// pure-lookup modes that carry no transaction.
///
/// [`empty`]: ReconciliationLedger::empty
#[derive(Debug, Clone, Default)]
pub struct ReconciliationLedger {
    lines: Vec<LedgerLine>,
}

impl ReconciliationLedger {
    /// Build a ledger from the expected lines of one transaction.
    ///
    /// Line order is preserved — screens render the ledger in load order.
    pub fn new(expected: Vec<ExpectedLine>) -> Self {
        Self {
            lines: expected.into_iter().map(LedgerLine::from).collect(),
        }
    }

    /// Ledger with no lines, for single-shot / lookup modes.
    ///
    /// `is_complete()` is vacuously true; callers gate confirmation on their
    /// own locked value instead.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Apply one server-acknowledged scan result.
    ///
    /// `acked_qty` is the authoritative per-line count returned by the scan
    /// acknowledgement call — not a delta. The stored value becomes
    /// `max(current, acked_qty)` (invariant 1).
    pub fn apply(&mut self, item_key: &str, acked_qty: u32) -> MatchOutcome {
        let Some(line) = self.lines.iter_mut().find(|l| l.item_key == item_key) else {
            return MatchOutcome::NotFound;
        };

        line.scanned_qty = line.scanned_qty.max(acked_qty);
        let scanned_qty = line.scanned_qty;
        let item_key = line.item_key.clone();

        if self.is_complete() {
            MatchOutcome::AllMatched {
                item_key,
                scanned_qty,
            }
        } else {
            MatchOutcome::Updated {
                item_key,
                scanned_qty,
            }
        }
    }

    /// `true` when every line balances. Vacuously true for an empty ledger.
    pub fn is_complete(&self) -> bool {
        self.lines.iter().all(LedgerLine::is_matched)
    }

    pub fn lines(&self) -> &[LedgerLine] {
        &self.lines
    }

    pub fn line(&self, item_key: &str) -> Option<&LedgerLine> {
        self.lines.iter().find(|l| l.item_key == item_key)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Aggregate totals for progress display.
    pub fn summary(&self) -> LedgerSummary {
        LedgerSummary {
            total_required: self.lines.iter().map(|l| l.required_qty).sum(),
            total_scanned: self.lines.iter().map(|l| l.scanned_qty).sum(),
            lines_matched: self.lines.iter().filter(|l| l.is_matched()).count(),
            lines_total: self.lines.len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
