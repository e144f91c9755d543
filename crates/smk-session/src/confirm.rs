//! Confirm gate: completion preconditions for the remote commit.
//!
//! The gate is a pure verdict function over a session snapshot — no IO, no
//! clock. The engine evaluates it internally before every commit; a screen
//! can evaluate the same gate to drive its confirm-button affordance, but
//! the engine never trusts the screen's answer.

use crate::state::{SessionMode, SessionStatus};
use smk_remote::RemoteError;

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// Why a commit attempt was refused at the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmBlocked {
    /// Session is not in a confirmable state (never started / torn down).
    NotActive,
    /// A commit is already in flight — no double submit.
    ConfirmInProgress,
    /// A scan acknowledgement round-trip has not finished; committing now
    /// would overlap two remote calls and race the ledger update.
    ScanInFlight,
    /// The transaction is already committed; reset before scanning again.
    AlreadyConfirmed,
    /// Single-shot / match mode without a locked code.
    NoLockedCode,
    /// Ledger mode without a loaded transaction reference.
    NoTransaction,
    /// At least one ledger line is still short.
    LedgerIncomplete,
    /// The flow requires a positive ancillary measurement (package weight)
    /// that has not been entered.
    MissingMeasurement,
}

impl std::fmt::Display for ConfirmBlocked {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfirmBlocked::NotActive => write!(f, "session is not active"),
            ConfirmBlocked::ConfirmInProgress => write!(f, "commit already in flight"),
            ConfirmBlocked::ScanInFlight => {
                write!(f, "scan acknowledgement still in flight")
            }
            ConfirmBlocked::AlreadyConfirmed => write!(f, "transaction already confirmed"),
            ConfirmBlocked::NoLockedCode => write!(f, "no scanned code is locked"),
            ConfirmBlocked::NoTransaction => write!(f, "no transaction loaded"),
            ConfirmBlocked::LedgerIncomplete => write!(f, "scanned quantities do not balance"),
            ConfirmBlocked::MissingMeasurement => {
                write!(f, "package weight missing or not positive")
            }
        }
    }
}

impl std::error::Error for ConfirmBlocked {}

/// Result of a confirm gate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmVerdict {
    Permitted,
    Blocked(ConfirmBlocked),
}

impl ConfirmVerdict {
    pub fn is_permitted(&self) -> bool {
        matches!(self, ConfirmVerdict::Permitted)
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Snapshot of everything the gate looks at.
#[derive(Debug, Clone)]
pub struct ConfirmContext<'a> {
    pub mode: &'a SessionMode,
    pub status: SessionStatus,
    /// The throttle's in-flight lock is held (a scan round-trip is open).
    pub scan_in_flight: bool,
    pub target_ref: Option<&'a str>,
    pub last_code: Option<&'a str>,
    pub ledger_complete: bool,
    pub require_weight: bool,
    pub weight_g: Option<u32>,
}

/// Evaluate the confirm gate. First refusal wins; checks are ordered from
/// lifecycle (cheap, unconditional) to mode-specific completion.
pub fn check_confirm_gate(ctx: &ConfirmContext<'_>) -> ConfirmVerdict {
    use ConfirmBlocked::*;

    match ctx.status {
        SessionStatus::Confirming => return ConfirmVerdict::Blocked(ConfirmInProgress),
        SessionStatus::Confirmed => return ConfirmVerdict::Blocked(AlreadyConfirmed),
        SessionStatus::Idle => return ConfirmVerdict::Blocked(NotActive),
        SessionStatus::Scanning | SessionStatus::Locked | SessionStatus::Failed => {}
    }

    // One in-flight business-logic call per session: a commit may not
    // overlap an open scan acknowledgement.
    if ctx.scan_in_flight {
        return ConfirmVerdict::Blocked(ScanInFlight);
    }

    match ctx.mode {
        SessionMode::SingleShot | SessionMode::MatchAgainstLedger { .. } => {
            if ctx.last_code.is_none() {
                return ConfirmVerdict::Blocked(NoLockedCode);
            }
        }
        SessionMode::AccumulateAgainstLedger => {
            if ctx.target_ref.is_none() {
                return ConfirmVerdict::Blocked(NoTransaction);
            }
            if !ctx.ledger_complete {
                return ConfirmVerdict::Blocked(LedgerIncomplete);
            }
        }
    }

    if ctx.require_weight && !ctx.weight_g.is_some_and(|g| g > 0) {
        return ConfirmVerdict::Blocked(MissingMeasurement);
    }

    ConfirmVerdict::Permitted
}

// ---------------------------------------------------------------------------
// ConfirmError
// ---------------------------------------------------------------------------

/// Failure surface of `ScanEngine::confirm`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmError {
    /// Refused at the gate; no remote call was issued.
    Blocked(ConfirmBlocked),
    /// The commit call failed. Session moves to `Failed` with all scan
    /// state preserved; retrying `confirm()` is legal.
    Remote(RemoteError),
    /// The session was reset or torn down while the commit was in flight;
    /// the result was discarded.
    Superseded,
}

impl std::fmt::Display for ConfirmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfirmError::Blocked(b) => write!(f, "confirm blocked: {b}"),
            ConfirmError::Remote(e) => write!(f, "commit failed: {e}"),
            ConfirmError::Superseded => write!(f, "commit superseded by reset"),
        }
    }
}

impl std::error::Error for ConfirmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfirmError::Remote(e) => Some(e),
            ConfirmError::Blocked(b) => Some(b),
            ConfirmError::Superseded => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
