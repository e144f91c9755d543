//! Gesture-unlocked feedback audio.
//!
//! Many embedding runtimes only grant programmatic audio after a real
//! `play()` succeeds inside a user-gesture handler — a muted or zero-volume
//! playback does not earn the grant. [`AudioGate::unlock`] therefore performs
//! one genuinely audible playback at the lowest non-zero volume, then pauses,
//! rewinds and restores the prior volume/mute settings.
//!
//! The grant can also silently expire mid-session (observed in some
//! embeddings): [`AudioGate::signal`] detects the rejected playback, drops
//! `ready`, retries one re-unlock, and otherwise stays quiet. Audio failure
//! is never fatal to scanning — the worst outcome is a silent scanner.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

/// Volume used for the unlock playback: minimal but non-zero, so the
/// playback counts as audible to the host's autoplay policy.
const UNLOCK_VOLUME: f32 = 0.01;

// ---------------------------------------------------------------------------
// AudioSink seam
// ---------------------------------------------------------------------------

/// Host audio element seam.
///
/// Implementations wrap whatever the embedding offers (an `<audio>` element,
/// a platform media player). All operations may silently no-op; only
/// `play()` reports rejection, because rejection is the signal the gate
/// reacts to.
#[async_trait::async_trait]
pub trait AudioSink: Send + Sync {
    /// One playback of the feedback tone from its current position.
    async fn play(&self) -> Result<(), AudioError>;
    /// Pause and seek back to the start of the tone.
    fn pause_and_rewind(&self);
    fn volume(&self) -> f32;
    fn set_volume(&self, volume: f32);
    fn muted(&self) -> bool;
    fn set_muted(&self, muted: bool);
}

/// Playback rejection reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    /// The host refused playback (no gesture grant, policy, interruption).
    Rejected(String),
    /// No audio output is available at all.
    Unavailable(String),
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::Rejected(msg) => write!(f, "playback rejected: {msg}"),
            AudioError::Unavailable(msg) => write!(f, "audio unavailable: {msg}"),
        }
    }
}

impl std::error::Error for AudioError {}

// ---------------------------------------------------------------------------
// AudioGate
// ---------------------------------------------------------------------------

/// Unlock state. Explicit, injected state — not a module-level singleton —
/// so tests can construct independent gates. Share one gate per page
/// lifetime by cloning (the state is behind an `Arc`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioGateState {
    /// The gesture-derived playback grant is currently held.
    pub ready: bool,
    /// An unlock playback is in progress.
    pub unlocking: bool,
}

/// Manages the gesture-bound unlock of the feedback tone.
#[derive(Clone)]
pub struct AudioGate {
    sink: Arc<dyn AudioSink>,
    state: Arc<Mutex<AudioGateState>>,
}

impl AudioGate {
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self {
            sink,
            state: Arc::new(Mutex::new(AudioGateState::default())),
        }
    }

    /// Perform the gesture-bound unlock playback.
    ///
    /// Must be invoked synchronously from a user input-gesture handler —
    /// the host only honors the grant in that context. Returns `true` once
    /// the grant is held (including when it already was). A concurrent
    /// unlock in progress returns `false` without a second playback.
    pub async fn unlock(&self) -> bool {
        {
            let mut state = self.state.lock().await;
            if state.ready {
                return true;
            }
            if state.unlocking {
                return false;
            }
            state.unlocking = true;
        }

        let ok = self.unlock_playback().await;

        let mut state = self.state.lock().await;
        state.unlocking = false;
        state.ready = ok;
        ok
    }

    /// Play the feedback tone for a successful scan.
    ///
    /// If the playback rejects (the grant silently expired), the gate resets
    /// `ready`, attempts exactly one re-unlock and one replay, then gives
    /// up. Always returns rather than erroring: audio is best-effort.
    pub async fn signal(&self) -> bool {
        if !self.is_ready().await {
            return false;
        }

        if self.sink.play().await.is_ok() {
            return true;
        }

        // Grant expired under us. One recovery attempt, then silence.
        warn!("feedback tone rejected; attempting audio re-unlock");
        {
            let mut state = self.state.lock().await;
            state.ready = false;
        }

        if !self.unlock_playback().await {
            return false;
        }
        {
            let mut state = self.state.lock().await;
            state.ready = true;
        }

        match self.sink.play().await {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, "feedback tone still rejected after re-unlock");
                false
            }
        }
    }

    pub async fn is_ready(&self) -> bool {
        self.state.lock().await.ready
    }

    pub async fn state(&self) -> AudioGateState {
        *self.state.lock().await
    }

    /// The actual near-silent playback: save settings, play once at minimal
    /// audible volume, pause + rewind, restore settings.
    async fn unlock_playback(&self) -> bool {
        let prev_volume = self.sink.volume();
        let prev_muted = self.sink.muted();

        self.sink.set_muted(false);
        self.sink.set_volume(UNLOCK_VOLUME);

        let result = self.sink.play().await;

        self.sink.pause_and_rewind();
        self.sink.set_volume(prev_volume);
        self.sink.set_muted(prev_muted);

        match result {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, "audio unlock playback failed");
                false
            }
        }
    }
}

impl std::fmt::Debug for AudioGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioGate").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;

    /// Sink that records operations and fails play() a scriptable number of
    /// times.
    struct ScriptedSink {
        plays: AtomicU32,
        fail_next: AtomicU32,
        volume: StdMutex<f32>,
        muted: AtomicBool,
        paused_after_play: AtomicBool,
    }

    impl ScriptedSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                plays: AtomicU32::new(0),
                fail_next: AtomicU32::new(0),
                volume: StdMutex::new(1.0),
                muted: AtomicBool::new(false),
                paused_after_play: AtomicBool::new(false),
            })
        }

        fn fail_next_plays(&self, n: u32) {
            self.fail_next.store(n, Ordering::SeqCst);
        }

        fn play_count(&self) -> u32 {
            self.plays.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl AudioSink for ScriptedSink {
        async fn play(&self) -> Result<(), AudioError> {
            self.plays.fetch_add(1, Ordering::SeqCst);
            let remaining = self.fail_next.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_next.store(remaining - 1, Ordering::SeqCst);
                return Err(AudioError::Rejected("no gesture grant".to_string()));
            }
            Ok(())
        }

        fn pause_and_rewind(&self) {
            self.paused_after_play.store(true, Ordering::SeqCst);
        }

        fn volume(&self) -> f32 {
            *self.volume.lock().unwrap()
        }

        fn set_volume(&self, volume: f32) {
            *self.volume.lock().unwrap() = volume;
        }

        fn muted(&self) -> bool {
            self.muted.load(Ordering::SeqCst)
        }

        fn set_muted(&self, muted: bool) {
            self.muted.store(muted, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn unlock_restores_prior_settings() {
        let sink = ScriptedSink::new();
        sink.set_volume(0.7);
        sink.set_muted(true);

        let gate = AudioGate::new(sink.clone());
        assert!(gate.unlock().await);
        assert!(gate.is_ready().await);

        // Settings restored after the near-silent playback.
        assert_eq!(sink.volume(), 0.7);
        assert!(sink.muted());
        assert!(sink.paused_after_play.load(Ordering::SeqCst));
        assert_eq!(sink.play_count(), 1);
    }

    #[tokio::test]
    async fn unlock_is_idempotent_once_ready() {
        let sink = ScriptedSink::new();
        let gate = AudioGate::new(sink.clone());
        assert!(gate.unlock().await);
        assert!(gate.unlock().await);
        assert_eq!(sink.play_count(), 1, "second unlock must not replay");
    }

    #[tokio::test]
    async fn failed_unlock_reports_false_and_not_ready() {
        let sink = ScriptedSink::new();
        sink.fail_next_plays(1);
        let gate = AudioGate::new(sink.clone());
        assert!(!gate.unlock().await);
        assert!(!gate.is_ready().await);
    }

    #[tokio::test]
    async fn signal_without_grant_is_silent_false() {
        let sink = ScriptedSink::new();
        let gate = AudioGate::new(sink.clone());
        assert!(!gate.signal().await);
        assert_eq!(sink.play_count(), 0);
    }

    #[tokio::test]
    async fn signal_plays_when_ready() {
        let sink = ScriptedSink::new();
        let gate = AudioGate::new(sink.clone());
        gate.unlock().await;
        assert!(gate.signal().await);
        assert_eq!(sink.play_count(), 2);
    }

    #[tokio::test]
    async fn expired_grant_recovers_via_one_reunlock() {
        let sink = ScriptedSink::new();
        let gate = AudioGate::new(sink.clone());
        gate.unlock().await;

        // The grant expires: the next play rejects, the re-unlock and the
        // replay succeed.
        sink.fail_next_plays(1);
        assert!(gate.signal().await);
        assert!(gate.is_ready().await);
        // unlock + rejected signal + re-unlock + replay
        assert_eq!(sink.play_count(), 4);
    }

    #[tokio::test]
    async fn expired_grant_gives_up_after_one_attempt() {
        let sink = ScriptedSink::new();
        let gate = AudioGate::new(sink.clone());
        gate.unlock().await;

        // Signal, re-unlock and replay all reject.
        sink.fail_next_plays(3);
        assert!(!gate.signal().await);
        assert!(!gate.is_ready().await, "ready dropped after failed recovery");
    }
}
