//! Wire types and the remote error taxonomy.
//!
//! The backend wraps every response in the same envelope:
//!
//! ```text
//! { "ok": true,  "trace_id": "…", "data": { … } }
//! { "ok": false, "trace_id": "…", "error": { "code": "OUTBOUND-NOTFOUND-101", "detail": "…" } }
//! ```
//!
//! Error codes follow `<DOMAIN>-<TYPE>-<NNN>` (domains: AUTH, INBOUND,
//! OUTBOUND, PRODUCT, STOCK, REPORTS, SYSTEM).

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Uniform response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default = "none_of", skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorBody>,
}

fn none_of<T>() -> Option<T> {
    None
}

/// Structured failure payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    /// `<DOMAIN>-<TYPE>-<NNN>` code, e.g. `OUTBOUND-STATE-451`.
    pub code: String,
    /// Operator-facing message, surfaced verbatim.
    pub detail: String,
}

// ---------------------------------------------------------------------------
// Data payloads
// ---------------------------------------------------------------------------

/// Resolved SKU record for a raw barcode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuInfo {
    pub sku: String,
    pub name: String,
    pub barcode: String,
}

/// Server acknowledgement of one physical scan.
///
/// `scanned_qty` is the authoritative per-line count *after* this scan. An
/// over-scan (line already full) is acknowledged with the count unchanged
/// and `over_scan = true` — the server never counts past `required_qty`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanAck {
    /// SKU the scanned barcode resolved to.
    pub item_key: String,
    pub required_qty: u32,
    pub scanned_qty: u32,
    #[serde(default)]
    pub over_scan: bool,
}

/// Commit call parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRequest {
    /// Transaction key (invoice number / header id). Absent for single-shot
    /// flows that commit a lone code (ad-hoc registration).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_ref: Option<String>,
    /// Locked raw code, for single-shot flows (ad-hoc registration).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Package weight in grams, for flows that require the measurement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_g: Option<u32>,
}

/// Commit confirmation summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub target_ref: String,
    /// Final transaction status as reported by the server (`"completed"`).
    pub status: String,
}

// ---------------------------------------------------------------------------
// RemoteError
// ---------------------------------------------------------------------------

/// Failure surface of a [`ScanRemote`](crate::ScanRemote) call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Network or transport failure; the request may or may not have been
    /// processed server-side.
    Transport(String),
    /// The backend returned a structured application error.
    Api { code: String, message: String },
    /// A response body could not be decoded as the expected envelope.
    Decode(String),
}

impl RemoteError {
    /// `true` for `-NOTFOUND-` application codes: the scanned code does not
    /// belong to the active transaction (or is unregistered).
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::Api { code, .. } if code.contains("-NOTFOUND-"))
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteError::Transport(msg) => write!(f, "transport error: {msg}"),
            RemoteError::Api { code, message } => write!(f, "api error {code}: {message}"),
            RemoteError::Decode(msg) => write!(f, "decode error: {msg}"),
        }
    }
}

impl std::error::Error for RemoteError {}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
