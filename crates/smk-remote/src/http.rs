//! reqwest-backed [`ScanRemote`] implementation.
//!
//! Paths follow the backend's `/api/<domain>/<page>` route convention. The
//! base URL is injected so tests can point the adapter at a local mock
//! server.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{
    ApiEnvelope, CommitRequest, CommitSummary, RemoteError, ScanAck, SkuInfo,
};
use crate::ScanRemote;

/// HTTP adapter to the warehouse backend.
#[derive(Debug, Clone)]
pub struct HttpScanRemote {
    http: reqwest::Client,
    base_url: String,
    bearer: Option<String>,
}

impl HttpScanRemote {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            bearer: None,
        }
    }

    /// Attach the session's access token. The token is never logged.
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Execute a request and unwrap the response envelope.
    async fn dispatch<T: serde::de::DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, RemoteError> {
        let response = req
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        // Application errors come back with their own HTTP status but the
        // same envelope; decode before looking at the status code.
        let envelope: ApiEnvelope<T> = serde_json::from_slice(&body).map_err(|e| {
            RemoteError::Decode(format!("http {status}: invalid envelope: {e}"))
        })?;

        if envelope.ok {
            envelope
                .data
                .ok_or_else(|| RemoteError::Decode(format!("http {status}: ok without data")))
        } else {
            let error = envelope.error.ok_or_else(|| {
                RemoteError::Decode(format!("http {status}: failure without error body"))
            })?;
            Err(RemoteError::Api {
                code: error.code,
                message: error.detail,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Wire shapes (backend-local, mapped to crate DTOs)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ScanBody<'a> {
    invoice_no: &'a str,
    barcode: &'a str,
}

#[derive(Debug, Deserialize)]
struct ScanData {
    item: ScanItemWire,
}

/// Per-line scan acknowledgement as the backend reports it. `message` is
/// only present on an over-scan ("already full") acknowledgement.
#[derive(Debug, Deserialize)]
struct ScanItemWire {
    sku: String,
    qty: u32,
    scanned_qty: u32,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct ConfirmBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    invoice_no: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    barcode: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    weight_g: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ConfirmData {
    #[serde(default)]
    invoice_no: Option<String>,
    status: String,
}

// ---------------------------------------------------------------------------
// ScanRemote impl
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
impl ScanRemote for HttpScanRemote {
    async fn lookup_barcode(&self, code: &str) -> Result<SkuInfo, RemoteError> {
        debug!(barcode = %code, "lookup_barcode");
        let req = self
            .authorize(self.http.get(self.url("/api/stock/lookup")))
            .query(&[("barcode", code)]);
        self.dispatch::<SkuInfo>(req).await
    }

    async fn acknowledge_scan(&self, target_ref: &str, code: &str) -> Result<ScanAck, RemoteError> {
        debug!(invoice = %target_ref, barcode = %code, "acknowledge_scan");
        let req = self
            .authorize(self.http.post(self.url("/api/outbound/process/scan")))
            .json(&ScanBody {
                invoice_no: target_ref,
                barcode: code,
            });
        let data = self.dispatch::<ScanData>(req).await?;
        Ok(ScanAck {
            item_key: data.item.sku,
            required_qty: data.item.qty,
            scanned_qty: data.item.scanned_qty,
            over_scan: data.item.message.is_some(),
        })
    }

    async fn commit(&self, req: &CommitRequest) -> Result<CommitSummary, RemoteError> {
        debug!(invoice = ?req.target_ref, "commit");
        let http_req = self
            .authorize(self.http.post(self.url("/api/outbound/process/confirm")))
            .json(&ConfirmBody {
                invoice_no: req.target_ref.as_deref(),
                barcode: req.code.as_deref(),
                weight_g: req.weight_g,
            });
        let data = self.dispatch::<ConfirmData>(http_req).await?;
        Ok(CommitSummary {
            target_ref: data.invoice_no.unwrap_or_default(),
            status: data.status,
        })
    }
}

// ---------------------------------------------------------------------------
// Unit tests (mock server)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn scan_ack_maps_wire_shape() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/outbound/process/scan")
                    .json_body_partial(r#"{"invoice_no":"INV-1","barcode":"880123"}"#);
                then.status(200).json_body(serde_json::json!({
                    "ok": true,
                    "trace_id": "t-1",
                    "data": {
                        "invoice_no": "INV-1",
                        "header_id": 7,
                        "item": { "item_id": 3, "sku": "A", "qty": 2, "scanned_qty": 1, "status": "short" }
                    }
                }));
            })
            .await;

        let remote = HttpScanRemote::new(server.base_url());
        let ack = remote.acknowledge_scan("INV-1", "880123").await.unwrap();

        mock.assert_async().await;
        assert_eq!(
            ack,
            ScanAck {
                item_key: "A".to_string(),
                required_qty: 2,
                scanned_qty: 1,
                over_scan: false,
            }
        );
    }

    #[tokio::test]
    async fn over_scan_message_sets_flag() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/outbound/process/scan");
                then.status(200).json_body(serde_json::json!({
                    "ok": true,
                    "data": {
                        "item": { "sku": "A", "qty": 2, "scanned_qty": 2, "message": "over-scan" }
                    }
                }));
            })
            .await;

        let remote = HttpScanRemote::new(server.base_url());
        let ack = remote.acknowledge_scan("INV-1", "880123").await.unwrap();
        assert!(ack.over_scan);
        assert_eq!(ack.scanned_qty, 2);
    }

    #[tokio::test]
    async fn api_error_envelope_maps_to_api_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/outbound/process/scan");
                then.status(404).json_body(serde_json::json!({
                    "ok": false,
                    "error": { "code": "OUTBOUND-NOTFOUND-101", "detail": "no such product" }
                }));
            })
            .await;

        let remote = HttpScanRemote::new(server.base_url());
        let err = remote.acknowledge_scan("INV-1", "zzz").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(
            err,
            RemoteError::Api {
                code: "OUTBOUND-NOTFOUND-101".to_string(),
                message: "no such product".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/stock/lookup");
                then.status(200).body("<html>gateway timeout</html>");
            })
            .await;

        let remote = HttpScanRemote::new(server.base_url());
        let err = remote.lookup_barcode("880123").await.unwrap_err();
        assert!(matches!(err, RemoteError::Decode(_)));
    }

    #[tokio::test]
    async fn commit_sends_weight_and_maps_summary() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/outbound/process/confirm")
                    .json_body_partial(r#"{"invoice_no":"INV-1","weight_g":1250}"#);
                then.status(200).json_body(serde_json::json!({
                    "ok": true,
                    "data": { "invoice_no": "INV-1", "header_id": 7, "status": "completed" }
                }));
            })
            .await;

        let remote = HttpScanRemote::new(server.base_url());
        let summary = remote
            .commit(&CommitRequest {
                target_ref: Some("INV-1".to_string()),
                code: None,
                weight_g: Some(1250),
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(summary.status, "completed");
        assert_eq!(summary.target_ref, "INV-1");
    }

    #[tokio::test]
    async fn bearer_token_is_attached() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/stock/lookup")
                    .header("authorization", "Bearer tok-123");
                then.status(200).json_body(serde_json::json!({
                    "ok": true,
                    "data": { "sku": "A", "name": "Item A", "barcode": "880123" }
                }));
            })
            .await;

        let remote = HttpScanRemote::new(server.base_url()).with_bearer("tok-123");
        let info = remote.lookup_barcode("880123").await.unwrap();
        mock.assert_async().await;
        assert_eq!(info.sku, "A");
    }
}
