//! Recording audio sink with scriptable playback rejection.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use smk_device::{AudioError, AudioSink};

/// Sink that records every operation and fails `play()` a scriptable number
/// of times — enough to exercise the gate's unlock and recovery paths.
pub struct FakeAudioSink {
    plays: AtomicU32,
    fail_next: AtomicU32,
    volume: Mutex<f32>,
    muted: AtomicBool,
}

impl FakeAudioSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            plays: AtomicU32::new(0),
            fail_next: AtomicU32::new(0),
            volume: Mutex::new(1.0),
            muted: AtomicBool::new(false),
        })
    }

    pub fn fail_next_plays(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn play_count(&self) -> u32 {
        self.plays.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AudioSink for FakeAudioSink {
    async fn play(&self) -> Result<(), AudioError> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(AudioError::Rejected("no gesture grant".to_string()));
        }
        Ok(())
    }

    fn pause_and_rewind(&self) {}

    fn volume(&self) -> f32 {
        *self.volume.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_volume(&self, volume: f32) {
        *self.volume.lock().unwrap_or_else(PoisonError::into_inner) = volume;
    }

    fn muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }
}
