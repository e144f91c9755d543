//! Pre-wired engine harness for scenario tests.

use std::sync::{Arc, Mutex, PoisonError};

use smk_device::{AudioGate, DecodeError};
use smk_ledger::LedgerLine;
use smk_session::{ScanEngine, SessionConfig, SessionNotice, SessionStatus};

use crate::{CountingHaptics, FakeAudioSink, InMemoryRemote, ScriptedDecoder};

/// One engine wired to scriptable fakes, with every listener recorded.
///
/// Tests drive scans either through [`ScanRig::scan`] (deterministic, awaits
/// the full handling turn) or through `decoder.emit(..)` plus a yield when
/// the pump path itself is under test.
pub struct ScanRig {
    pub engine: Arc<ScanEngine>,
    pub decoder: Arc<ScriptedDecoder>,
    pub audio: Arc<FakeAudioSink>,
    pub haptics: Arc<CountingHaptics>,
    pub remote: Arc<InMemoryRemote>,
    pub statuses: Arc<Mutex<Vec<SessionStatus>>>,
    pub notices: Arc<Mutex<Vec<SessionNotice>>>,
    pub ledger_updates: Arc<Mutex<Vec<Vec<LedgerLine>>>>,
}

impl ScanRig {
    pub fn new(config: SessionConfig, remote: InMemoryRemote) -> Self {
        let decoder = ScriptedDecoder::new();
        let audio = FakeAudioSink::new();
        let haptics = Arc::new(CountingHaptics::new());
        let remote = Arc::new(remote);

        let engine = ScanEngine::new(
            config,
            Arc::clone(&decoder) as _,
            Arc::clone(&remote) as _,
            AudioGate::new(Arc::clone(&audio) as _),
            Arc::clone(&haptics) as _,
        );

        let statuses: Arc<Mutex<Vec<SessionStatus>>> = Arc::default();
        let notices: Arc<Mutex<Vec<SessionNotice>>> = Arc::default();
        let ledger_updates: Arc<Mutex<Vec<Vec<LedgerLine>>>> = Arc::default();

        {
            let statuses = Arc::clone(&statuses);
            engine.on_status_change(move |s| {
                statuses
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(s);
            });
        }
        {
            let notices = Arc::clone(&notices);
            engine.on_notice(move |n| {
                notices
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(n.clone());
            });
        }
        {
            let ledger_updates = Arc::clone(&ledger_updates);
            engine.on_ledger_change(move |lines| {
                ledger_updates
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(lines.to_vec());
            });
        }

        Self {
            engine,
            decoder,
            audio,
            haptics,
            remote,
            statuses,
            notices,
            ledger_updates,
        }
    }

    /// Unlock audio (as the screen's first gesture would) and start the
    /// session.
    pub async fn start(&self) -> Result<(), DecodeError> {
        self.engine.unlock_audio().await;
        self.engine.start().await
    }

    /// Drive one decode frame straight into the engine and await its full
    /// handling, remote round-trip included.
    pub async fn scan(&self, code: &str, timestamp_ms: u64) {
        self.engine
            .on_code(smk_device::ScanEvent::new(code, timestamp_ms))
            .await;
    }

    pub fn recorded_notices(&self) -> Vec<SessionNotice> {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn recorded_statuses(&self) -> Vec<SessionStatus> {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
