//! smk-ledger
//!
//! Expected-vs-scanned reconciliation state for one scanning session.
//!
//! This crate is pure and deterministic — no IO, no clock, no network. The
//! engine feeds it server-acknowledged quantities; it answers "does this
//! transaction balance yet?". Quantities move in one direction only: a
//! [`LedgerLine`]'s `scanned_qty` can never decrease, and is never bumped
//! optimistically ahead of the system of record.

mod ledger;
mod types;

pub use ledger::ReconciliationLedger;
pub use types::{ExpectedLine, LedgerLine, LedgerSummary, MatchOutcome};
