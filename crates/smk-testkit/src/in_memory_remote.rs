//! In-process system of record for scenario tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use smk_remote::{CommitRequest, CommitSummary, RemoteError, ScanAck, ScanRemote, SkuInfo};

#[derive(Debug, Clone)]
struct LineState {
    sku: String,
    required_qty: u32,
    scanned_qty: u32,
}

/// Stand-in for the warehouse backend, with the same acknowledgement
/// semantics: per-line counts are authoritative here, an over-scan is
/// acknowledged without counting, and commit re-validates completion.
///
/// Transport and commit failures are scriptable so tests can exercise the
/// no-retry and retry-after-failure contracts.
pub struct InMemoryRemote {
    target_ref: String,
    lines: Mutex<HashMap<String, LineState>>,
    catalog: Mutex<HashMap<String, SkuInfo>>,
    fail_next_scans: AtomicU32,
    fail_next_commits: AtomicU32,
    scan_delay_ms: AtomicU64,
    commit_delay_ms: AtomicU64,
    scan_calls: AtomicU32,
    commit_calls: AtomicU32,
    committed: Mutex<bool>,
}

impl InMemoryRemote {
    pub fn for_transaction(target_ref: impl Into<String>) -> Self {
        Self {
            target_ref: target_ref.into(),
            lines: Mutex::new(HashMap::new()),
            catalog: Mutex::new(HashMap::new()),
            fail_next_scans: AtomicU32::new(0),
            fail_next_commits: AtomicU32::new(0),
            scan_delay_ms: AtomicU64::new(0),
            commit_delay_ms: AtomicU64::new(0),
            scan_calls: AtomicU32::new(0),
            commit_calls: AtomicU32::new(0),
            committed: Mutex::new(false),
        }
    }

    /// Add one transaction line. The barcode doubles as the scan code the
    /// engine will send.
    pub fn with_line(
        self,
        barcode: impl Into<String>,
        sku: impl Into<String>,
        required_qty: u32,
    ) -> Self {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                barcode.into(),
                LineState {
                    sku: sku.into(),
                    required_qty,
                    scanned_qty: 0,
                },
            );
        self
    }

    /// Register a barcode in the stock catalog (for `lookup_barcode`).
    pub fn with_sku(
        self,
        barcode: impl Into<String>,
        sku: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let barcode = barcode.into();
        self.catalog
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                barcode.clone(),
                SkuInfo {
                    sku: sku.into(),
                    name: name.into(),
                    barcode,
                },
            );
        self
    }

    pub fn fail_next_scans(&self, n: u32) {
        self.fail_next_scans.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_commits(&self, n: u32) {
        self.fail_next_commits.store(n, Ordering::SeqCst);
    }

    /// Make every scan acknowledgement take this long (in-flight scenarios).
    pub fn set_scan_delay_ms(&self, ms: u64) {
        self.scan_delay_ms.store(ms, Ordering::SeqCst);
    }

    /// Make every commit take this long (scan-during-commit scenarios).
    pub fn set_commit_delay_ms(&self, ms: u64) {
        self.commit_delay_ms.store(ms, Ordering::SeqCst);
    }

    pub fn scan_calls(&self) -> u32 {
        self.scan_calls.load(Ordering::SeqCst)
    }

    pub fn commit_calls(&self) -> u32 {
        self.commit_calls.load(Ordering::SeqCst)
    }

    pub fn is_committed(&self) -> bool {
        *self.committed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Server-side scanned count for a barcode (assert against double
    /// counting).
    pub fn scanned_qty(&self, barcode: &str) -> u32 {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(barcode)
            .map(|l| l.scanned_qty)
            .unwrap_or(0)
    }

    fn take_scripted_failure(counter: &AtomicU32) -> bool {
        let remaining = counter.load(Ordering::SeqCst);
        if remaining > 0 {
            counter.store(remaining - 1, Ordering::SeqCst);
            true
        } else {
            false
        }
    }
}

#[async_trait::async_trait]
impl ScanRemote for InMemoryRemote {
    async fn lookup_barcode(&self, code: &str) -> Result<SkuInfo, RemoteError> {
        self.catalog
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(code)
            .cloned()
            .ok_or_else(|| RemoteError::Api {
                code: "STOCK-NOTFOUND-101".to_string(),
                message: format!("barcode {code} is not registered"),
            })
    }

    async fn acknowledge_scan(&self, target_ref: &str, code: &str) -> Result<ScanAck, RemoteError> {
        self.scan_calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.scan_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if Self::take_scripted_failure(&self.fail_next_scans) {
            return Err(RemoteError::Transport("connection reset".to_string()));
        }
        if target_ref != self.target_ref {
            return Err(RemoteError::Api {
                code: "OUTBOUND-NOTFOUND-102".to_string(),
                message: format!("invoice {target_ref} not found"),
            });
        }

        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(line) = lines.get_mut(code) else {
            return Err(RemoteError::Api {
                code: "OUTBOUND-NOTFOUND-101".to_string(),
                message: "no such product in this invoice".to_string(),
            });
        };

        // Line already full: acknowledge without counting.
        let over_scan = line.scanned_qty >= line.required_qty;
        if !over_scan {
            line.scanned_qty += 1;
        }
        Ok(ScanAck {
            item_key: line.sku.clone(),
            required_qty: line.required_qty,
            scanned_qty: line.scanned_qty,
            over_scan,
        })
    }

    async fn commit(&self, req: &CommitRequest) -> Result<CommitSummary, RemoteError> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.commit_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if Self::take_scripted_failure(&self.fail_next_commits) {
            return Err(RemoteError::Transport("connection reset".to_string()));
        }

        // Single-shot registration: no transaction to validate.
        let Some(target_ref) = &req.target_ref else {
            return Ok(CommitSummary {
                target_ref: req.code.clone().unwrap_or_default(),
                status: "completed".to_string(),
            });
        };

        if target_ref != &self.target_ref {
            return Err(RemoteError::Api {
                code: "OUTBOUND-NOTFOUND-102".to_string(),
                message: format!("invoice {target_ref} not found"),
            });
        }

        let mut committed = self.committed.lock().unwrap_or_else(PoisonError::into_inner);
        if *committed {
            return Err(RemoteError::Api {
                code: "OUTBOUND-STATE-451".to_string(),
                message: "invoice is not in picking state".to_string(),
            });
        }

        // Server-side re-validation: the engine's gate is not trusted.
        let lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        if lines.values().any(|l| l.scanned_qty < l.required_qty) {
            return Err(RemoteError::Api {
                code: "OUTBOUND-STATE-452".to_string(),
                message: "scanned quantities do not balance".to_string(),
            });
        }
        if matches!(req.weight_g, Some(0)) {
            return Err(RemoteError::Api {
                code: "OUTBOUND-VALIDATION-401".to_string(),
                message: "weight_g must be a positive integer".to_string(),
            });
        }

        *committed = true;
        Ok(CommitSummary {
            target_ref: target_ref.clone(),
            status: "completed".to_string(),
        })
    }
}
