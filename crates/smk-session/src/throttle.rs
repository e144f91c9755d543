//! Scan admission throttle.
//!
//! One physical scan produces many decode frames, and the decode library's
//! callback cadence is not ours to control. Two independent suppression
//! rules keep that cadence away from business logic:
//!
//! 1. **Identical-value suppression** — a code equal to the immediately
//!    preceding admitted code is rejected inside a short window.
//! 2. **In-flight lock** — from the moment a code is admitted until its
//!    downstream handling completes (remote round-trip included), every
//!    code is rejected regardless of value. The lock is set synchronously
//!    inside `admit` — never across an await point — so overlapping
//!    callbacks cannot both pass the check.
//!
//! The lock is also held for the whole commit round-trip ([`hold`]), so a
//! frame decoded mid-commit is rejected at admission rather than by a UI
//! affordance.
//!
//! [`hold`]: ScanThrottle::hold

/// Default identical-value suppression window.
pub const DEFAULT_WINDOW_MS: u64 = 600;

/// Debounce + in-flight lock in front of the session's `on_code`.
#[derive(Debug, Clone)]
pub struct ScanThrottle {
    window_ms: u64,
    last_admitted: Option<(String, u64)>,
    in_flight: bool,
}

impl Default for ScanThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_MS)
    }
}

impl ScanThrottle {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            last_admitted: None,
            in_flight: false,
        }
    }

    /// Admission check. On `true` the in-flight lock is already taken; the
    /// caller MUST pair it with [`release`](Self::release) when handling
    /// finishes, success or failure.
    pub fn admit(&mut self, code: &str, now_ms: u64) -> bool {
        if self.in_flight {
            return false;
        }
        if let Some((last, at_ms)) = &self.last_admitted {
            if last == code && now_ms.saturating_sub(*at_ms) < self.window_ms {
                return false;
            }
        }
        self.last_admitted = Some((code.to_string(), now_ms));
        self.in_flight = true;
        true
    }

    /// Downstream handling finished; admit the next code.
    pub fn release(&mut self) {
        self.in_flight = false;
    }

    /// Re-assert the lock without an admission (commit in flight).
    pub fn hold(&mut self) {
        self.in_flight = true;
    }

    /// Forget everything (session reset).
    pub fn reset(&mut self) {
        self.last_admitted = None;
        self.in_flight = false;
    }

    pub fn is_locked(&self) -> bool {
        self.in_flight
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
