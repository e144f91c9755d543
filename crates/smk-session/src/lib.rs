//! smk-session
//!
//! The scanning session engine: one [`ScanEngine`] per scanning screen,
//! wired to the device seams from `smk-device`, the reconciliation ledger
//! from `smk-ledger`, and a `smk-remote` backend adapter.
//!
//! The engine owns the whole pipeline between "the decode library saw a
//! barcode" and "the transaction is committed":
//!
//! ```text
//! decode frames ─► ScanThrottle ─► mode dispatch ─► remote ack ─► ledger
//!                                                                   │
//! confirm() ──► confirm gate ──► remote commit ◄────────────────────┘
//! ```
//!
//! # Invariants
//!
//! - At most one in-flight remote call per session; duplicates of one
//!   physical scan never reach the backend.
//! - Ledger counts move only on server acknowledgement and never decrement.
//! - Exactly one commit call per confirm attempt; a confirmed session
//!   refuses further commits until reset.
//! - Recoverable faults surface as [`SessionNotice`]s and leave the session
//!   `Scanning`; camera acquisition failure is the one fatal class.

mod confirm;
mod engine;
mod state;
mod throttle;

pub use confirm::{
    check_confirm_gate, ConfirmBlocked, ConfirmContext, ConfirmError, ConfirmVerdict,
};
pub use engine::{
    LedgerListener, NoticeListener, ScanEngine, SessionConfig, StatusListener,
};
pub use state::{SessionMode, SessionNotice, SessionStatus, TransitionError};
pub use throttle::{ScanThrottle, DEFAULT_WINDOW_MS};
