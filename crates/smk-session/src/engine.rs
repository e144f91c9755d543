//! Scan session engine.
//!
//! [`ScanEngine`] is the single surface a scanning screen binds to: it owns
//! the decode loop, the throttle, the ledger, the audio gate and the remote
//! adapter, and exposes `start / on_code / confirm / reset / stop` plus
//! listener registration.
//!
//! # Concurrency model
//!
//! All session state lives in one mutex-guarded [`SessionInner`]; every
//! mutation happens inside a single locked turn, and the lock is never held
//! across an await of a remote call. Decode callbacks are funneled through
//! an unbounded channel into one pump task, so business-logic handling is
//! serialized regardless of the decode library's callback cadence. The
//! throttle's in-flight lock (taken synchronously at admission) guarantees
//! at most one in-flight remote call per session even when `on_code` is
//! driven directly by an embedder.
//!
//! Results of awaited calls are applied only if the session epoch is
//! unchanged: `reset()` and `stop()` bump the epoch, so a response landing
//! after a reset is discarded instead of resurrecting dead state.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use smk_device::{
    AudioGate, ContinuousDecoder, DecodeError, DecodeHandle, DecodeLoop, Haptics, RawCodeFn,
    ScanEvent,
};
use smk_ledger::{ExpectedLine, LedgerLine, LedgerSummary, MatchOutcome, ReconciliationLedger};
use smk_remote::{CommitRequest, CommitSummary, ScanRemote};

use crate::confirm::{check_confirm_gate, ConfirmContext, ConfirmError, ConfirmVerdict};
use crate::state::{SessionMode, SessionNotice, SessionStatus};
use crate::throttle::{ScanThrottle, DEFAULT_WINDOW_MS};

/// Vibration pulse for a successful scan.
const FEEDBACK_VIBRATE_MS: u64 = 100;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Construction-time session parameters.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub mode: SessionMode,
    /// Transaction key the scans reconcile against (invoice / header id).
    pub target_ref: Option<String>,
    /// Expected lines, for ledger modes.
    pub expected: Vec<ExpectedLine>,
    /// Identical-value suppression window.
    pub throttle_window_ms: u64,
    /// Commit requires a positive package weight.
    pub require_weight: bool,
}

impl SessionConfig {
    /// Ad-hoc registration / stock lookup: first code wins.
    pub fn single_shot() -> Self {
        Self {
            mode: SessionMode::SingleShot,
            target_ref: None,
            expected: Vec::new(),
            throttle_window_ms: DEFAULT_WINDOW_MS,
            require_weight: false,
        }
    }

    /// Verify scans against one pre-loaded expected barcode.
    pub fn match_against(expected: impl Into<String>) -> Self {
        Self {
            mode: SessionMode::MatchAgainstLedger {
                expected: expected.into(),
            },
            target_ref: None,
            expected: Vec::new(),
            throttle_window_ms: DEFAULT_WINDOW_MS,
            require_weight: false,
        }
    }

    /// Reconcile scans against a loaded transaction.
    pub fn accumulate(target_ref: impl Into<String>, expected: Vec<ExpectedLine>) -> Self {
        Self {
            mode: SessionMode::AccumulateAgainstLedger,
            target_ref: Some(target_ref.into()),
            expected,
            throttle_window_ms: DEFAULT_WINDOW_MS,
            require_weight: false,
        }
    }

    /// Require a positive weight measurement before commit (outbound flow).
    pub fn with_weight_required(mut self) -> Self {
        self.require_weight = true;
        self
    }

    pub fn with_throttle_window_ms(mut self, window_ms: u64) -> Self {
        self.throttle_window_ms = window_ms;
        self
    }
}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

pub type StatusListener = Arc<dyn Fn(SessionStatus) + Send + Sync>;
pub type LedgerListener = Arc<dyn Fn(&[LedgerLine]) + Send + Sync>;
pub type NoticeListener = Arc<dyn Fn(&SessionNotice) + Send + Sync>;

// ---------------------------------------------------------------------------
// SessionInner
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct SessionInner {
    status: SessionStatus,
    last_code: Option<String>,
    ledger: ReconciliationLedger,
    throttle: ScanThrottle,
    weight_g: Option<u32>,
    /// Bumped by reset/stop; awaited results from an older epoch are
    /// discarded instead of applied.
    epoch: u64,
}

impl SessionInner {
    fn transition(&mut self, to: SessionStatus, session_id: Uuid) {
        if self.status.can_transition_to(to) {
            debug!(session = %session_id, from = ?self.status, ?to, "transition");
            self.status = to;
        } else {
            // Gate and status checks make this unreachable; if it fires, the
            // state machine has a hole and must be investigated.
            error!(session = %session_id, from = ?self.status, ?to, "illegal session transition");
        }
    }
}

// ---------------------------------------------------------------------------
// ScanEngine
// ---------------------------------------------------------------------------

/// Orchestrates one scanning screen's session. Construct with [`new`],
/// share as `Arc<ScanEngine>`.
///
/// [`new`]: ScanEngine::new
pub struct ScanEngine {
    session_id: Uuid,
    config: SessionConfig,
    decoder: Arc<dyn ContinuousDecoder>,
    remote: Arc<dyn ScanRemote>,
    audio: AudioGate,
    haptics: Arc<dyn Haptics>,
    inner: Mutex<SessionInner>,
    decode_handle: StdMutex<Option<Arc<DecodeHandle>>>,
    feed_tx: StdMutex<Option<mpsc::UnboundedSender<ScanEvent>>>,
    status_listeners: StdMutex<Vec<StatusListener>>,
    ledger_listeners: StdMutex<Vec<LedgerListener>>,
    notice_listeners: StdMutex<Vec<NoticeListener>>,
}

impl ScanEngine {
    pub fn new(
        config: SessionConfig,
        decoder: Arc<dyn ContinuousDecoder>,
        remote: Arc<dyn ScanRemote>,
        audio: AudioGate,
        haptics: Arc<dyn Haptics>,
    ) -> Arc<Self> {
        let ledger = ReconciliationLedger::new(config.expected.clone());
        let throttle = ScanThrottle::new(config.throttle_window_ms);
        Arc::new(Self {
            session_id: Uuid::new_v4(),
            config,
            decoder,
            remote,
            audio,
            haptics,
            inner: Mutex::new(SessionInner {
                status: SessionStatus::Idle,
                last_code: None,
                ledger,
                throttle,
                weight_g: None,
                epoch: 0,
            }),
            decode_handle: StdMutex::new(None),
            feed_tx: StdMutex::new(None),
            status_listeners: StdMutex::new(Vec::new()),
            ledger_listeners: StdMutex::new(Vec::new()),
            notice_listeners: StdMutex::new(Vec::new()),
        })
    }

    // -- lifecycle ----------------------------------------------------------

    /// Open the decode loop and move to `Scanning`. Idempotent while the
    /// session is active. Camera failure is the one fatal error class: it
    /// is surfaced once (notice + log) and the session stays `Idle` until
    /// the embedder retries `start()`.
    pub async fn start(self: &Arc<Self>) -> Result<(), DecodeError> {
        {
            let inner = self.inner.lock().await;
            if inner.status != SessionStatus::Idle {
                return Ok(());
            }
        }

        self.open_decode_loop().await?;

        {
            let mut inner = self.inner.lock().await;
            inner.transition(SessionStatus::Scanning, self.session_id);
        }
        self.emit_status(SessionStatus::Scanning);
        info!(session = %self.session_id, mode = ?self.config.mode, "scan session started");
        Ok(())
    }

    /// Forward the embedding screen's first user gesture to the audio gate.
    /// Failure never blocks scanning.
    pub async fn unlock_audio(&self) -> bool {
        let ok = self.audio.unlock().await;
        if !ok {
            self.emit_notice(&SessionNotice::AudioUnavailable);
        }
        ok
    }

    /// Clear all scan state and restart the decode loop with a fresh camera
    /// handle. The only path out of `Confirmed` / `Failed`.
    pub async fn reset(self: &Arc<Self>) -> Result<(), DecodeError> {
        let (was_active, lines) = {
            let mut inner = self.inner.lock().await;
            inner.epoch += 1;
            inner.last_code = None;
            inner.weight_g = None;
            inner.throttle.reset();
            inner.ledger = ReconciliationLedger::new(self.config.expected.clone());
            let was_active = inner.status != SessionStatus::Idle;
            inner.transition(SessionStatus::Idle, self.session_id);
            (was_active, inner.ledger.lines().to_vec())
        };

        self.close_decode_loop();
        self.emit_status(SessionStatus::Idle);
        // Screens mirror the ledger through the listener, so the cleared
        // counts have to reach them the same way scans do.
        self.emit_ledger(&lines);
        info!(session = %self.session_id, "session reset");

        if was_active {
            self.start().await?;
        }
        Ok(())
    }

    /// Deterministic teardown on unmount: bump the epoch, release the
    /// camera, end the pump. Idempotent. Stream teardown must never rely on
    /// garbage collection.
    pub async fn stop(&self) {
        {
            let mut inner = self.inner.lock().await;
            inner.epoch += 1;
            inner.throttle.reset();
            inner.transition(SessionStatus::Idle, self.session_id);
        }
        self.close_decode_loop();
        self.emit_status(SessionStatus::Idle);
        info!(session = %self.session_id, "session stopped");
    }

    // -- scan entry point ---------------------------------------------------

    /// "A code was read." Admission-checked, then dispatched by mode.
    ///
    /// Driven by the internal pump in production; tests and headless
    /// embedders may call it directly.
    pub async fn on_code(&self, event: ScanEvent) {
        let epoch = {
            let mut inner = self.inner.lock().await;
            if inner.status != SessionStatus::Scanning {
                return;
            }
            if !inner.throttle.admit(&event.raw_code, event.timestamp_ms) {
                return;
            }
            inner.epoch
        };

        match self.config.mode.clone() {
            SessionMode::SingleShot => self.handle_single_shot(event.raw_code).await,
            SessionMode::MatchAgainstLedger { expected } => {
                self.handle_match(event.raw_code, &expected).await
            }
            SessionMode::AccumulateAgainstLedger => {
                self.handle_accumulate(event.raw_code, epoch).await
            }
        }
    }

    /// First admitted code is accepted unconditionally; camera stops at
    /// once.
    async fn handle_single_shot(&self, code: String) {
        {
            let mut inner = self.inner.lock().await;
            inner.last_code = Some(code.clone());
            inner.transition(SessionStatus::Locked, self.session_id);
            inner.throttle.release();
        }
        self.close_decode_loop();
        self.emit_status(SessionStatus::Locked);
        info!(session = %self.session_id, %code, "code locked");
        self.success_feedback().await;
    }

    /// Compare against the pre-loaded expected value; lock on equality.
    async fn handle_match(&self, code: String, expected: &str) {
        if code == expected {
            self.handle_single_shot(code).await;
            return;
        }

        {
            let mut inner = self.inner.lock().await;
            // Release immediately so the next distinct attempt is admitted;
            // identical wrong-item frames stay suppressed by the value
            // window.
            inner.throttle.release();
        }
        warn!(session = %self.session_id, got = %code, "wrong item scanned");
        self.emit_notice(&SessionNotice::WrongItem { got: code });
    }

    /// Round-trip the scan to the reconciliation endpoint and fold the
    /// acknowledgement into the ledger. The session stays `Scanning` on
    /// every outcome — the operator may keep correcting lines even after
    /// completion.
    async fn handle_accumulate(&self, code: String, epoch: u64) {
        let Some(target_ref) = self.config.target_ref.clone() else {
            self.inner.lock().await.throttle.release();
            self.emit_notice(&SessionNotice::NotInTransaction { code });
            return;
        };

        let result = self.remote.acknowledge_scan(&target_ref, &code).await;

        let mut feedback = false;
        let mut notice = None;
        let mut snapshot = None;

        {
            let mut inner = self.inner.lock().await;
            if inner.epoch != epoch {
                debug!(session = %self.session_id, "stale scan acknowledgement discarded");
                return;
            }
            inner.throttle.release();

            match result {
                Ok(ack) => match inner.ledger.apply(&ack.item_key, ack.scanned_qty) {
                    MatchOutcome::NotFound => {
                        notice = Some(SessionNotice::NotInTransaction { code });
                    }
                    MatchOutcome::Updated { .. } | MatchOutcome::AllMatched { .. } => {
                        feedback = true;
                        if ack.over_scan {
                            notice = Some(SessionNotice::OverScan {
                                item_key: ack.item_key,
                            });
                        }
                        snapshot = Some(inner.ledger.lines().to_vec());
                    }
                },
                Err(err) if err.is_not_found() => {
                    notice = Some(SessionNotice::NotInTransaction { code });
                }
                Err(err) => {
                    warn!(session = %self.session_id, %err, "scan acknowledgement failed");
                    notice = Some(SessionNotice::RemoteFailed {
                        message: err.to_string(),
                    });
                }
            }
        }

        if let Some(lines) = snapshot {
            let complete = lines.iter().all(LedgerLine::is_matched);
            self.emit_ledger(&lines);
            if complete {
                info!(session = %self.session_id, "ledger complete; ready to confirm");
            }
        }
        if let Some(n) = notice {
            self.emit_notice(&n);
        }
        if feedback {
            self.success_feedback().await;
        }
    }

    // -- confirm ------------------------------------------------------------

    /// Whether `confirm()` would pass the gate right now.
    pub async fn can_confirm(&self) -> bool {
        let inner = self.inner.lock().await;
        self.gate_verdict(&inner).is_permitted()
    }

    /// Record the package weight (grams, must be positive).
    pub async fn set_weight_g(&self, grams: u32) -> bool {
        if grams == 0 {
            return false;
        }
        self.inner.lock().await.weight_g = Some(grams);
        true
    }

    /// Validate preconditions and issue exactly one remote commit call.
    ///
    /// On failure the session moves to `Failed` with the ledger and locked
    /// code preserved; a retry without re-scanning is legal. The gate
    /// refuses while a scan acknowledgement is still open, and while the
    /// commit is in flight the throttle rejects every code at admission —
    /// the session never has two remote calls open at once.
    pub async fn confirm(&self) -> Result<CommitSummary, ConfirmError> {
        let (epoch, request) = {
            let mut inner = self.inner.lock().await;
            if let ConfirmVerdict::Blocked(reason) = self.gate_verdict(&inner) {
                return Err(ConfirmError::Blocked(reason));
            }
            inner.transition(SessionStatus::Confirming, self.session_id);
            inner.throttle.hold();
            (
                inner.epoch,
                CommitRequest {
                    target_ref: self.config.target_ref.clone(),
                    code: inner.last_code.clone(),
                    weight_g: inner.weight_g,
                },
            )
        };
        self.emit_status(SessionStatus::Confirming);
        info!(session = %self.session_id, "commit dispatched");

        let result = self.remote.commit(&request).await;

        let outcome = {
            let mut inner = self.inner.lock().await;
            if inner.epoch != epoch {
                debug!(session = %self.session_id, "stale commit result discarded");
                return Err(ConfirmError::Superseded);
            }
            inner.throttle.release();
            match result {
                Ok(summary) => {
                    inner.transition(SessionStatus::Confirmed, self.session_id);
                    Ok(summary)
                }
                Err(err) => {
                    inner.transition(SessionStatus::Failed, self.session_id);
                    Err(err)
                }
            }
        };

        match outcome {
            Ok(summary) => {
                self.emit_status(SessionStatus::Confirmed);
                info!(session = %self.session_id, status = %summary.status, "commit confirmed");
                Ok(summary)
            }
            Err(err) => {
                self.emit_status(SessionStatus::Failed);
                self.emit_notice(&SessionNotice::RemoteFailed {
                    message: err.to_string(),
                });
                warn!(session = %self.session_id, %err, "commit failed");
                Err(ConfirmError::Remote(err))
            }
        }
    }

    fn gate_verdict(&self, inner: &SessionInner) -> ConfirmVerdict {
        check_confirm_gate(&ConfirmContext {
            mode: &self.config.mode,
            status: inner.status,
            scan_in_flight: inner.throttle.is_locked(),
            target_ref: self.config.target_ref.as_deref(),
            last_code: inner.last_code.as_deref(),
            ledger_complete: inner.ledger.is_complete(),
            require_weight: self.config.require_weight,
            weight_g: inner.weight_g,
        })
    }

    // -- accessors ----------------------------------------------------------

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub async fn status(&self) -> SessionStatus {
        self.inner.lock().await.status
    }

    pub async fn last_code(&self) -> Option<String> {
        self.inner.lock().await.last_code.clone()
    }

    pub async fn ledger_snapshot(&self) -> Vec<LedgerLine> {
        self.inner.lock().await.ledger.lines().to_vec()
    }

    pub async fn ledger_summary(&self) -> LedgerSummary {
        self.inner.lock().await.ledger.summary()
    }

    pub async fn is_ledger_complete(&self) -> bool {
        self.inner.lock().await.ledger.is_complete()
    }

    /// Live media tracks held by the decode loop (0 when stopped).
    pub fn decode_track_count(&self) -> usize {
        self.decode_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|h| h.live_track_count())
            .unwrap_or(0)
    }

    // -- listeners ----------------------------------------------------------

    pub fn on_status_change(&self, listener: impl Fn(SessionStatus) + Send + Sync + 'static) {
        self.status_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    pub fn on_ledger_change(&self, listener: impl Fn(&[LedgerLine]) + Send + Sync + 'static) {
        self.ledger_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    pub fn on_notice(&self, listener: impl Fn(&SessionNotice) + Send + Sync + 'static) {
        self.notice_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    // -- internals ----------------------------------------------------------

    async fn open_decode_loop(self: &Arc<Self>) -> Result<(), DecodeError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<ScanEvent>();
        let on_code: RawCodeFn = {
            let tx = tx.clone();
            Arc::new(move |event| {
                // Pump gone (stop/reset): the frame is dropped on the floor,
                // which is exactly the contract.
                let _ = tx.send(event);
            })
        };

        let handle = match DecodeLoop::start(self.decoder.as_ref(), on_code).await {
            Ok(handle) => Arc::new(handle),
            Err(err) => {
                error!(session = %self.session_id, %err, "camera acquisition failed");
                self.emit_notice(&SessionNotice::DecodeUnavailable {
                    message: err.to_string(),
                });
                return Err(err);
            }
        };

        *self
            .decode_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        *self.feed_tx.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);

        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(engine) = weak.upgrade() else { break };
                engine.on_code(event).await;
            }
        });
        Ok(())
    }

    /// Ordered teardown: stop the decode handle (latch, subscription,
    /// tracks, stream ref), then drop the feed sender so the pump ends.
    fn close_decode_loop(&self) {
        let handle = self
            .decode_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.stop();
        }
        *self.feed_tx.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    async fn success_feedback(&self) {
        self.haptics.vibrate(FEEDBACK_VIBRATE_MS);
        if !self.audio.signal().await {
            // Non-fatal by contract: the scanner keeps working silently.
            warn!(session = %self.session_id, "feedback tone unavailable");
        }
    }

    fn emit_status(&self, status: SessionStatus) {
        let listeners = self
            .status_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for l in listeners {
            l(status);
        }
    }

    fn emit_ledger(&self, lines: &[LedgerLine]) {
        let listeners = self
            .ledger_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for l in listeners {
            l(lines);
        }
    }

    fn emit_notice(&self, notice: &SessionNotice) {
        let listeners = self
            .notice_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for l in listeners {
            l(notice);
        }
    }
}

impl std::fmt::Debug for ScanEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanEngine")
            .field("session_id", &self.session_id)
            .field("mode", &self.config.mode)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use smk_device::{
        ActiveDecode, AudioError, AudioSink, CameraFacing, MediaTrack, NullHaptics,
    };
    use smk_remote::{RemoteError, ScanAck, SkuInfo};

    // -- fakes --------------------------------------------------------------

    struct TestTrack {
        live: AtomicBool,
    }

    impl MediaTrack for TestTrack {
        fn stop(&self) {
            self.live.store(false, Ordering::SeqCst);
        }
        fn is_live(&self) -> bool {
            self.live.load(Ordering::SeqCst)
        }
    }

    struct FakeDecoder;

    #[async_trait::async_trait]
    impl ContinuousDecoder for FakeDecoder {
        async fn begin(
            &self,
            _facing: CameraFacing,
            _emit: RawCodeFn,
        ) -> Result<ActiveDecode, DecodeError> {
            Ok(ActiveDecode {
                subscription: Box::new(|| {}),
                tracks: vec![Arc::new(TestTrack {
                    live: AtomicBool::new(true),
                })],
            })
        }
    }

    struct DeniedDecoder;

    #[async_trait::async_trait]
    impl ContinuousDecoder for DeniedDecoder {
        async fn begin(
            &self,
            _facing: CameraFacing,
            _emit: RawCodeFn,
        ) -> Result<ActiveDecode, DecodeError> {
            Err(DecodeError::PermissionDenied)
        }
    }

    struct SilentSink;

    #[async_trait::async_trait]
    impl AudioSink for SilentSink {
        async fn play(&self) -> Result<(), AudioError> {
            Ok(())
        }
        fn pause_and_rewind(&self) {}
        fn volume(&self) -> f32 {
            1.0
        }
        fn set_volume(&self, _volume: f32) {}
        fn muted(&self) -> bool {
            false
        }
        fn set_muted(&self, _muted: bool) {}
    }

    /// Remote that acknowledges scans against an in-memory transaction.
    /// Barcodes double as SKUs.
    struct FakeRemote {
        lines: StdMutex<HashMap<String, (u32, u32)>>,
        fail_commits: AtomicU32,
        commit_calls: AtomicU32,
        scan_calls: AtomicU32,
    }

    impl FakeRemote {
        fn new(lines: &[(&str, u32)]) -> Arc<Self> {
            Arc::new(Self {
                lines: StdMutex::new(
                    lines
                        .iter()
                        .map(|(k, q)| (k.to_string(), (*q, 0)))
                        .collect(),
                ),
                fail_commits: AtomicU32::new(0),
                commit_calls: AtomicU32::new(0),
                scan_calls: AtomicU32::new(0),
            })
        }

        fn fail_next_commits(&self, n: u32) {
            self.fail_commits.store(n, Ordering::SeqCst);
        }
    }

    #[async_trait::async_trait]
    impl ScanRemote for FakeRemote {
        async fn lookup_barcode(&self, code: &str) -> Result<SkuInfo, RemoteError> {
            Err(RemoteError::Api {
                code: "STOCK-NOTFOUND-101".to_string(),
                message: format!("unknown barcode {code}"),
            })
        }

        async fn acknowledge_scan(
            &self,
            _target_ref: &str,
            code: &str,
        ) -> Result<ScanAck, RemoteError> {
            self.scan_calls.fetch_add(1, Ordering::SeqCst);
            let mut lines = self.lines.lock().unwrap();
            let Some((required, scanned)) = lines.get_mut(code) else {
                return Err(RemoteError::Api {
                    code: "OUTBOUND-NOTFOUND-101".to_string(),
                    message: "no such product in this invoice".to_string(),
                });
            };
            let over_scan = *scanned >= *required;
            if !over_scan {
                *scanned += 1;
            }
            Ok(ScanAck {
                item_key: code.to_string(),
                required_qty: *required,
                scanned_qty: *scanned,
                over_scan,
            })
        }

        async fn commit(&self, req: &CommitRequest) -> Result<CommitSummary, RemoteError> {
            self.commit_calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.fail_commits.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_commits.store(remaining - 1, Ordering::SeqCst);
                return Err(RemoteError::Transport("connection reset".to_string()));
            }
            Ok(CommitSummary {
                target_ref: req.target_ref.clone().unwrap_or_default(),
                status: "completed".to_string(),
            })
        }
    }

    fn engine(config: SessionConfig, remote: Arc<FakeRemote>) -> Arc<ScanEngine> {
        ScanEngine::new(
            config,
            Arc::new(FakeDecoder),
            remote,
            AudioGate::new(Arc::new(SilentSink)),
            Arc::new(NullHaptics),
        )
    }

    // -- single shot / match ------------------------------------------------

    #[tokio::test]
    async fn single_shot_locks_first_code_and_releases_camera() {
        let remote = FakeRemote::new(&[]);
        let engine = engine(SessionConfig::single_shot(), remote);

        engine.start().await.unwrap();
        assert_eq!(engine.status().await, SessionStatus::Scanning);
        assert_eq!(engine.decode_track_count(), 1);

        engine.on_code(ScanEvent::new("8801234567890", 1_000)).await;
        assert_eq!(engine.status().await, SessionStatus::Locked);
        assert_eq!(engine.last_code().await.as_deref(), Some("8801234567890"));
        assert_eq!(engine.decode_track_count(), 0, "camera stopped on lock");

        // Further codes are ignored once locked.
        engine.on_code(ScanEvent::new("9999999999999", 2_000)).await;
        assert_eq!(engine.last_code().await.as_deref(), Some("8801234567890"));
    }

    #[tokio::test]
    async fn match_mode_rejects_wrong_item_then_locks_on_hit() {
        let remote = FakeRemote::new(&[]);
        let engine = engine(SessionConfig::match_against("123"), remote);
        let notices: Arc<StdMutex<Vec<SessionNotice>>> = Arc::default();
        {
            let notices = Arc::clone(&notices);
            engine.on_notice(move |n| notices.lock().unwrap().push(n.clone()));
        }

        engine.start().await.unwrap();
        engine.on_code(ScanEvent::new("999", 1_000)).await;
        assert_eq!(engine.status().await, SessionStatus::Scanning);
        assert_eq!(
            notices.lock().unwrap().as_slice(),
            &[SessionNotice::WrongItem {
                got: "999".to_string()
            }]
        );

        engine.on_code(ScanEvent::new("123", 1_100)).await;
        assert_eq!(engine.status().await, SessionStatus::Locked);
    }

    #[tokio::test]
    async fn camera_failure_surfaces_notice_and_stays_idle() {
        let remote = FakeRemote::new(&[]);
        let engine = ScanEngine::new(
            SessionConfig::single_shot(),
            Arc::new(DeniedDecoder),
            remote,
            AudioGate::new(Arc::new(SilentSink)),
            Arc::new(NullHaptics),
        );
        let notices: Arc<StdMutex<Vec<SessionNotice>>> = Arc::default();
        {
            let notices = Arc::clone(&notices);
            engine.on_notice(move |n| notices.lock().unwrap().push(n.clone()));
        }

        let err = engine.start().await.unwrap_err();
        assert_eq!(err, DecodeError::PermissionDenied);
        assert_eq!(engine.status().await, SessionStatus::Idle);
        assert!(matches!(
            notices.lock().unwrap().as_slice(),
            [SessionNotice::DecodeUnavailable { .. }]
        ));
    }

    // -- accumulate ---------------------------------------------------------

    #[tokio::test]
    async fn accumulate_completes_only_when_every_line_balances() {
        let remote = FakeRemote::new(&[("A", 2), ("B", 1)]);
        let engine = engine(
            SessionConfig::accumulate(
                "INV-1",
                vec![
                    ExpectedLine::new("A", "Item A", 2),
                    ExpectedLine::new("B", "Item B", 1),
                ],
            ),
            remote,
        );

        engine.start().await.unwrap();

        engine.on_code(ScanEvent::new("A", 1_000)).await;
        assert!(!engine.can_confirm().await);
        engine.on_code(ScanEvent::new("B", 2_000)).await;
        assert!(!engine.can_confirm().await);
        engine.on_code(ScanEvent::new("A", 3_000)).await;

        assert!(engine.is_ledger_complete().await);
        assert!(engine.can_confirm().await);
        // Camera stays live for corrections.
        assert_eq!(engine.status().await, SessionStatus::Scanning);
        assert_eq!(engine.decode_track_count(), 1);
    }

    #[tokio::test]
    async fn unknown_code_leaves_ledger_untouched() {
        let remote = FakeRemote::new(&[("A", 1)]);
        let engine = engine(
            SessionConfig::accumulate("INV-1", vec![ExpectedLine::new("A", "Item A", 1)]),
            remote,
        );
        let notices: Arc<StdMutex<Vec<SessionNotice>>> = Arc::default();
        {
            let notices = Arc::clone(&notices);
            engine.on_notice(move |n| notices.lock().unwrap().push(n.clone()));
        }

        engine.start().await.unwrap();
        engine.on_code(ScanEvent::new("ZZZ", 1_000)).await;

        assert_eq!(
            notices.lock().unwrap().as_slice(),
            &[SessionNotice::NotInTransaction {
                code: "ZZZ".to_string()
            }]
        );
        assert_eq!(engine.ledger_summary().await.total_scanned, 0);
        assert_eq!(engine.status().await, SessionStatus::Scanning);
    }

    #[tokio::test]
    async fn over_scan_is_acknowledged_without_counting() {
        let remote = FakeRemote::new(&[("A", 1)]);
        let engine = engine(
            SessionConfig::accumulate("INV-1", vec![ExpectedLine::new("A", "Item A", 1)]),
            remote,
        );
        let notices: Arc<StdMutex<Vec<SessionNotice>>> = Arc::default();
        {
            let notices = Arc::clone(&notices);
            engine.on_notice(move |n| notices.lock().unwrap().push(n.clone()));
        }

        engine.start().await.unwrap();
        engine.on_code(ScanEvent::new("A", 1_000)).await;
        engine.on_code(ScanEvent::new("A", 2_000)).await;

        let snapshot = engine.ledger_snapshot().await;
        assert_eq!(snapshot[0].scanned_qty, 1, "count never passes required");
        assert_eq!(
            notices.lock().unwrap().as_slice(),
            &[SessionNotice::OverScan {
                item_key: "A".to_string()
            }]
        );
    }

    // -- confirm ------------------------------------------------------------

    #[tokio::test]
    async fn confirm_is_refused_until_complete_and_issues_no_remote_call() {
        let remote = FakeRemote::new(&[("A", 1)]);
        let engine = engine(
            SessionConfig::accumulate("INV-1", vec![ExpectedLine::new("A", "Item A", 1)]),
            Arc::clone(&remote),
        );

        engine.start().await.unwrap();
        let err = engine.confirm().await.unwrap_err();
        assert_eq!(
            err,
            ConfirmError::Blocked(crate::ConfirmBlocked::LedgerIncomplete)
        );
        assert_eq!(remote.commit_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_commit_preserves_state_and_retry_succeeds() {
        let remote = FakeRemote::new(&[("A", 1)]);
        remote.fail_next_commits(1);
        let engine = engine(
            SessionConfig::accumulate("INV-1", vec![ExpectedLine::new("A", "Item A", 1)]),
            Arc::clone(&remote),
        );

        engine.start().await.unwrap();
        engine.on_code(ScanEvent::new("A", 1_000)).await;

        let err = engine.confirm().await.unwrap_err();
        assert!(matches!(err, ConfirmError::Remote(_)));
        assert_eq!(engine.status().await, SessionStatus::Failed);
        assert!(engine.is_ledger_complete().await, "ledger preserved");

        let summary = engine.confirm().await.unwrap();
        assert_eq!(summary.status, "completed");
        assert_eq!(engine.status().await, SessionStatus::Confirmed);
        assert_eq!(remote.commit_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn confirmed_session_refuses_second_commit() {
        let remote = FakeRemote::new(&[("A", 1)]);
        let engine = engine(
            SessionConfig::accumulate("INV-1", vec![ExpectedLine::new("A", "Item A", 1)]),
            Arc::clone(&remote),
        );

        engine.start().await.unwrap();
        engine.on_code(ScanEvent::new("A", 1_000)).await;
        engine.confirm().await.unwrap();

        let err = engine.confirm().await.unwrap_err();
        assert_eq!(
            err,
            ConfirmError::Blocked(crate::ConfirmBlocked::AlreadyConfirmed)
        );
        assert_eq!(remote.commit_calls.load(Ordering::SeqCst), 1);
        // Scans after Confirmed are ignored entirely.
        engine.on_code(ScanEvent::new("A", 9_000)).await;
        assert_eq!(remote.scan_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn weight_gate_blocks_until_positive_value_entered() {
        let remote = FakeRemote::new(&[("A", 1)]);
        let engine = engine(
            SessionConfig::accumulate("INV-1", vec![ExpectedLine::new("A", "Item A", 1)])
                .with_weight_required(),
            remote,
        );

        engine.start().await.unwrap();
        engine.on_code(ScanEvent::new("A", 1_000)).await;
        assert!(!engine.can_confirm().await);

        assert!(!engine.set_weight_g(0).await, "zero weight rejected");
        assert!(engine.set_weight_g(1_250).await);
        assert!(engine.can_confirm().await);
    }

    // -- reset / stop -------------------------------------------------------

    #[tokio::test]
    async fn reset_clears_scan_state_and_resumes_scanning() {
        let remote = FakeRemote::new(&[("A", 1)]);
        let engine = engine(
            SessionConfig::accumulate("INV-1", vec![ExpectedLine::new("A", "Item A", 1)]),
            remote,
        );

        engine.start().await.unwrap();
        engine.on_code(ScanEvent::new("A", 1_000)).await;
        engine.confirm().await.unwrap();

        engine.reset().await.unwrap();
        assert_eq!(engine.status().await, SessionStatus::Scanning);
        assert_eq!(engine.ledger_summary().await.total_scanned, 0);
        assert_eq!(engine.last_code().await, None);
        assert_eq!(engine.decode_track_count(), 1, "fresh camera handle");
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_ignores_later_codes() {
        let remote = FakeRemote::new(&[("A", 1)]);
        let engine = engine(
            SessionConfig::accumulate("INV-1", vec![ExpectedLine::new("A", "Item A", 1)]),
            Arc::clone(&remote),
        );

        engine.start().await.unwrap();
        engine.stop().await;
        engine.stop().await;

        assert_eq!(engine.status().await, SessionStatus::Idle);
        assert_eq!(engine.decode_track_count(), 0);
        engine.on_code(ScanEvent::new("A", 1_000)).await;
        assert_eq!(remote.scan_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn throttle_suppresses_duplicate_frames_of_one_scan() {
        let remote = FakeRemote::new(&[("A", 3)]);
        let engine = engine(
            SessionConfig::accumulate("INV-1", vec![ExpectedLine::new("A", "Item A", 3)]),
            Arc::clone(&remote),
        );

        engine.start().await.unwrap();
        // One physical scan, three decode frames inside the window.
        engine.on_code(ScanEvent::new("A", 1_000)).await;
        engine.on_code(ScanEvent::new("A", 1_050)).await;
        engine.on_code(ScanEvent::new("A", 1_400)).await;
        assert_eq!(remote.scan_calls.load(Ordering::SeqCst), 1);

        // Same code again after the window: a second physical scan.
        engine.on_code(ScanEvent::new("A", 1_700)).await;
        assert_eq!(remote.scan_calls.load(Ordering::SeqCst), 2);
    }
}
