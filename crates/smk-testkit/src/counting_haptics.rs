//! Vibration recorder.

use std::sync::{Mutex, PoisonError};

use smk_device::Haptics;

/// Records every vibration pulse the engine requests.
#[derive(Debug, Default)]
pub struct CountingHaptics {
    pulses: Mutex<Vec<u64>>,
}

impl CountingHaptics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pulse_count(&self) -> usize {
        self.pulses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Haptics for CountingHaptics {
    fn vibrate(&self, duration_ms: u64) {
        self.pulses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration_ms);
    }
}
