//! smk-remote
//!
//! Adapter to the warehouse system of record. The engine treats the backend
//! as an opaque request/response client that answers with a uniform
//! `{ ok, data | error }` envelope; this crate owns that envelope, the three
//! calls the scanning engine makes (barcode lookup, scan acknowledgement,
//! commit), and the [`HttpScanRemote`] reqwest implementation.
//!
//! **No automatic retries, anywhere.** A scan acknowledgement mutates a
//! quantity ledger server-side; a silent retry risks double-counting. Retry
//! is always an explicit operator action (re-scan, re-press confirm).

mod http;
mod types;

pub use http::HttpScanRemote;
pub use types::{
    ApiEnvelope, ApiErrorBody, CommitRequest, CommitSummary, RemoteError, ScanAck, SkuInfo,
};

/// The system-of-record seam the scanning engine calls.
///
/// Object-safe and `Send + Sync` so the engine can hold an
/// `Arc<dyn ScanRemote>` across task boundaries. Every method performs at
/// most one request.
#[async_trait::async_trait]
pub trait ScanRemote: Send + Sync {
    /// Resolve a raw barcode to its SKU record (stock lookup, registration
    /// probe). `Err(RemoteError::Api)` with a `-NOTFOUND-` code means the
    /// barcode is unregistered.
    async fn lookup_barcode(&self, code: &str) -> Result<SkuInfo, RemoteError>;

    /// Acknowledge one physical scan against the transaction `target_ref`
    /// (invoice / header id). Returns the server-authoritative per-line
    /// count; the ledger is only ever updated from this response.
    async fn acknowledge_scan(&self, target_ref: &str, code: &str) -> Result<ScanAck, RemoteError>;

    /// Commit the completed transaction. The server re-validates completion
    /// (and the ancillary measurement, when the flow requires one).
    async fn commit(&self, req: &CommitRequest) -> Result<CommitSummary, RemoteError>;
}
