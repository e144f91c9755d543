//! Continuous camera decode loop.
//!
//! # Contract
//!
//! A [`ContinuousDecoder`] binds a camera stream to the host decode library
//! and invokes the emit callback for every frame in which a barcode is
//! recognized — an infinite, non-restartable sequence per `begin()` call.
//! Callbacks arrive on the host's own scheduling and may come in rapid
//! near-duplicate bursts for one physical scan; deduplication is explicitly
//! NOT this layer's job (the session throttle owns it).
//!
//! [`DecodeHandle::stop`] is idempotent and tears down in a fixed order:
//!
//! 1. close the callback latch — no `on_code` delivery after `stop` returns
//! 2. cancel the decode subscription
//! 3. stop every media track of the underlying stream
//! 4. drop the stream reference
//!
//! Restarting after a stop requires a fresh [`DecodeLoop::start`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ScanEvent
// ---------------------------------------------------------------------------

/// One raw decode emission. Ephemeral: produced here, consumed once by the
/// session throttle, discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEvent {
    /// Decoded barcode text, verbatim from the decode library.
    pub raw_code: String,
    /// Host-supplied timestamp (epoch milliseconds).
    pub timestamp_ms: u64,
}

impl ScanEvent {
    pub fn new(raw_code: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            raw_code: raw_code.into(),
            timestamp_ms,
        }
    }
}

/// Callback invoked for every recognized frame.
pub type RawCodeFn = Arc<dyn Fn(ScanEvent) + Send + Sync>;

// ---------------------------------------------------------------------------
// Camera / decoder seams
// ---------------------------------------------------------------------------

/// Which camera to prefer when acquiring the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraFacing {
    /// Rear-facing (environment) camera — preferred for scanning.
    Rear,
    Front,
}

/// One media track of the acquired camera stream.
///
/// `stop()` must be safe to call more than once.
pub trait MediaTrack: Send + Sync {
    fn stop(&self);
    fn is_live(&self) -> bool;
}

/// A running decode subscription as handed back by the decode library.
pub struct ActiveDecode {
    /// Cancels the continuous decode subscription. Consumed on teardown.
    pub subscription: Box<dyn FnOnce() + Send>,
    /// Every media track of the underlying stream.
    pub tracks: Vec<Arc<dyn MediaTrack>>,
}

impl std::fmt::Debug for ActiveDecode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveDecode")
            .field("tracks", &self.tracks.len())
            .finish()
    }
}

/// The host decode library seam (`decodeFromVideoDevice`-style API).
#[async_trait::async_trait]
pub trait ContinuousDecoder: Send + Sync {
    /// Acquire a camera stream and begin continuous decoding, invoking
    /// `emit` for every recognized frame until the subscription is
    /// cancelled.
    async fn begin(
        &self,
        facing: CameraFacing,
        emit: RawCodeFn,
    ) -> Result<ActiveDecode, DecodeError>;
}

// ---------------------------------------------------------------------------
// DecodeError
// ---------------------------------------------------------------------------

/// Camera acquisition / decode backend failure.
///
/// The only error class that is fatal to a scanning session: the engine
/// surfaces it once and waits for a manual restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The user or embedding policy denied camera access.
    PermissionDenied,
    /// No capture device is available on this host.
    NoCamera,
    /// The decode library failed internally.
    Backend(String),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::PermissionDenied => write!(f, "camera permission denied"),
            DecodeError::NoCamera => write!(f, "no camera device available"),
            DecodeError::Backend(msg) => write!(f, "decode backend error: {msg}"),
        }
    }
}

impl std::error::Error for DecodeError {}

// ---------------------------------------------------------------------------
// DecodeLoop / DecodeHandle
// ---------------------------------------------------------------------------

/// Entry point: start a decode loop over a decoder seam.
pub struct DecodeLoop;

impl DecodeLoop {
    /// Acquire the camera (rear-facing preferred) and begin continuous
    /// decoding into `on_code`.
    ///
    /// The returned handle is the only way to tear the loop down; dropping
    /// it without calling [`DecodeHandle::stop`] is a bug in the embedder
    /// (stream teardown must never rely on garbage collection).
    pub async fn start(
        decoder: &dyn ContinuousDecoder,
        on_code: RawCodeFn,
    ) -> Result<DecodeHandle, DecodeError> {
        let closed = Arc::new(AtomicBool::new(false));

        let gate = {
            let closed = Arc::clone(&closed);
            Arc::new(move |event: ScanEvent| {
                // Checked on the delivery path: the decode library may race
                // its own queued frames against stop().
                if !closed.load(Ordering::SeqCst) {
                    on_code(event);
                }
            }) as RawCodeFn
        };

        let active = decoder.begin(CameraFacing::Rear, gate).await?;
        tracing::debug!(tracks = active.tracks.len(), "decode loop started");

        Ok(DecodeHandle {
            closed,
            active: Mutex::new(Some(active)),
        })
    }
}

/// Handle to a running decode loop.
pub struct DecodeHandle {
    closed: Arc<AtomicBool>,
    active: Mutex<Option<ActiveDecode>>,
}

impl DecodeHandle {
    /// Tear down the loop. Idempotent; see module docs for ordering.
    pub fn stop(&self) {
        // 1. Latch first: once this returns, no further on_code delivery.
        self.closed.store(true, Ordering::SeqCst);

        let taken = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(active) = taken {
            // 2. Cancel the decode subscription.
            (active.subscription)();
            // 3. Stop every media track.
            for track in &active.tracks {
                track.stop();
            }
            // 4. Stream reference dropped here with `active`.
            tracing::debug!("decode loop stopped");
        }
    }

    /// `true` after the first `stop()`.
    pub fn is_stopped(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of still-live media tracks held by this handle (0 after stop).
    pub fn live_track_count(&self) -> usize {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|a| a.tracks.iter().filter(|t| t.is_live()).count())
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for DecodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeHandle")
            .field("stopped", &self.is_stopped())
            .field("live_tracks", &self.live_track_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
