//! Session status, operating modes, and transient notices.
//!
//! # State diagram
//!
//! ```text
//!          start()                 lock (single-shot / match hit)
//!  Idle ────────────► Scanning ────────────────────────► Locked
//!   ▲                  │   ▲ │                              │
//!   │                  │   │ └── mismatch / not-found /     │
//!   │      confirm()   │   │     scan-level remote failure  │
//!   │                  ▼   │     (notice, stays Scanning)   │
//!   │              Confirming ◄─────────────────────────────┘
//!   │                  │   ▲              confirm()
//!   │        ┌─────────┴─┐ │ retry confirm()
//!   │        ▼           ▼ │
//!   │    Confirmed      Failed
//!   │        │             │
//!   └────────┴── reset() ──┘      (reset() is the only way out of
//!                                  Confirmed/Failed; it re-opens the
//!                                  decode loop for a clean handle)
//! ```
//!
//! A mismatch is not a state: the session stays `Scanning` and surfaces a
//! transient [`SessionNotice`] instead.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SessionStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of one scanning session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Created, camera not running.
    Idle,
    /// Decode loop live; admitted codes are dispatched by mode.
    Scanning,
    /// A code was accepted and held; camera stopped. Awaiting confirm or
    /// reset.
    Locked,
    /// Commit call in flight. All scan admission is suppressed.
    Confirming,
    /// Commit acknowledged by the system of record. Terminal until reset.
    Confirmed,
    /// Commit failed. Ledger and locked value preserved for an explicit
    /// retry.
    Failed,
}

impl SessionStatus {
    /// States from which `confirm()` may be attempted.
    pub fn is_confirmable(self) -> bool {
        matches!(
            self,
            SessionStatus::Scanning | SessionStatus::Locked | SessionStatus::Failed
        )
    }

    /// Legal state-machine edges. `Idle` is reachable from anywhere
    /// (reset / teardown).
    pub fn can_transition_to(self, to: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, to),
            (_, Idle)
                | (Idle, Scanning)
                | (Scanning, Locked)
                | (Scanning | Locked | Failed, Confirming)
                | (Confirming, Confirmed | Failed)
        )
    }
}

/// Returned when the engine would make an illegal status transition.
///
/// Always a programming error in the engine, never an operator condition;
/// callers treat it as a halt/alert signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: SessionStatus,
    pub to: SessionStatus,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "illegal session transition: {:?} -> {:?}", self.from, self.to)
    }
}

impl std::error::Error for TransitionError {}

// ---------------------------------------------------------------------------
// SessionMode
// ---------------------------------------------------------------------------

/// Operating mode, fixed at session construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionMode {
    /// Accept the first admitted code unconditionally and lock (ad-hoc
    /// registration, stock-item lookup).
    SingleShot,
    /// Compare each admitted code against one pre-loaded expected value;
    /// lock on equality (per-line barcode verification).
    MatchAgainstLedger { expected: String },
    /// Send every admitted code to the remote reconciliation endpoint and
    /// fold the acknowledgement into the ledger; the camera stays live even
    /// once complete (multi-item outbound, stock-take).
    AccumulateAgainstLedger,
}

impl SessionMode {
    /// Modes whose completion is defined by the ledger.
    pub fn uses_ledger(&self) -> bool {
        matches!(self, SessionMode::AccumulateAgainstLedger)
    }
}

// ---------------------------------------------------------------------------
// SessionNotice
// ---------------------------------------------------------------------------

/// Transient, toast-equivalent operator notices. Every recoverable error
/// surfaces as exactly one of these; none of them halts the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionNotice {
    /// Scanned code is not part of the active transaction.
    NotInTransaction { code: String },
    /// Wrong item for the expected barcode (match mode).
    WrongItem { got: String },
    /// Line already fully scanned; the server acknowledged without counting.
    OverScan { item_key: String },
    /// Scan-level or commit-level remote failure, message verbatim.
    RemoteFailed { message: String },
    /// Feedback audio could not be unlocked or played; scanning continues
    /// silently.
    AudioUnavailable,
    /// Camera acquisition failed; the session is halted until a manual
    /// restart.
    DecodeUnavailable { message: String },
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
