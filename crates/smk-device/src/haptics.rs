//! Vibration feedback seam.

/// Host vibration API. May silently no-op depending on device/embedding
/// policy; implementations must never fail loudly.
pub trait Haptics: Send + Sync {
    fn vibrate(&self, duration_ms: u64);
}

/// No-op haptics for hosts without a vibration motor.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHaptics;

impl Haptics for NullHaptics {
    fn vibrate(&self, _duration_ms: u64) {}
}
