//! Scriptable decoder seam: the test drives frame emission by hand.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use smk_device::{
    ActiveDecode, CameraFacing, ContinuousDecoder, DecodeError, MediaTrack, RawCodeFn, ScanEvent,
};

/// Media track whose liveness the test can observe.
pub struct FakeTrack {
    live: AtomicBool,
}

impl FakeTrack {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            live: AtomicBool::new(true),
        })
    }
}

impl MediaTrack for FakeTrack {
    fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }
    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

/// Decoder that hands its emit callback back to the test instead of running
/// a camera. `emit` plays the role of "the decode library recognized a
/// frame"; acquisition failures are scripted per `begin()` call.
pub struct ScriptedDecoder {
    emit_slot: Arc<Mutex<Option<RawCodeFn>>>,
    tracks_per_begin: usize,
    fail_begins: AtomicU32,
    begin_count: AtomicU32,
    handed_tracks: Mutex<Vec<Arc<FakeTrack>>>,
}

impl ScriptedDecoder {
    pub fn new() -> Arc<Self> {
        Self::with_tracks(1)
    }

    /// A camera stream usually carries one video track; some hosts hand back
    /// more.
    pub fn with_tracks(tracks_per_begin: usize) -> Arc<Self> {
        Arc::new(Self {
            emit_slot: Arc::new(Mutex::new(None)),
            tracks_per_begin,
            fail_begins: AtomicU32::new(0),
            begin_count: AtomicU32::new(0),
            handed_tracks: Mutex::new(Vec::new()),
        })
    }

    /// Script the next `n` acquisitions to fail with `PermissionDenied`.
    pub fn fail_next_begins(&self, n: u32) {
        self.fail_begins.store(n, Ordering::SeqCst);
    }

    /// Emit one recognized frame, as the decode library would.
    pub fn emit(&self, code: &str, timestamp_ms: u64) {
        let emit = self
            .emit_slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(emit) = emit {
            emit(ScanEvent::new(code, timestamp_ms));
        }
    }

    /// How many times `begin()` was called (restart assertions).
    pub fn begin_count(&self) -> u32 {
        self.begin_count.load(Ordering::SeqCst)
    }

    /// Still-live tracks across every stream ever handed out. Zero means no
    /// camera handle has leaked.
    pub fn live_track_count(&self) -> usize {
        self.handed_tracks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|t| t.is_live())
            .count()
    }
}

#[async_trait::async_trait]
impl ContinuousDecoder for ScriptedDecoder {
    async fn begin(
        &self,
        _facing: CameraFacing,
        emit: RawCodeFn,
    ) -> Result<ActiveDecode, DecodeError> {
        self.begin_count.fetch_add(1, Ordering::SeqCst);

        let remaining = self.fail_begins.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_begins.store(remaining - 1, Ordering::SeqCst);
            return Err(DecodeError::PermissionDenied);
        }

        *self
            .emit_slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(emit);

        let tracks: Vec<Arc<FakeTrack>> =
            (0..self.tracks_per_begin).map(|_| FakeTrack::new()).collect();
        self.handed_tracks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(tracks.iter().map(Arc::clone));

        let slot = Arc::clone(&self.emit_slot);
        Ok(ActiveDecode {
            subscription: Box::new(move || {
                *slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
            }),
            tracks: tracks
                .into_iter()
                .map(|t| t as Arc<dyn MediaTrack>)
                .collect(),
        })
    }
}
