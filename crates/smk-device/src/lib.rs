//! smk-device
//!
//! Host-device seams for the scanning engine: the continuous camera decode
//! loop, the gesture-unlocked audio gate, and haptics.
//!
//! This crate owns no business logic. It defines object-safe traits for the
//! three device collaborators (decode library, audio element, vibration API)
//! and the two resource-discipline wrappers around them:
//!
//! - [`DecodeLoop`] / [`DecodeHandle`] — guarantees no decode callback is
//!   delivered after `stop()` returns and that every media track is stopped
//!   on every exit path. Leaked camera handles are the failure mode this
//!   crate exists to prevent.
//! - [`AudioGate`] — performs the one real gesture-bound playback many
//!   embeddings require before programmatic audio is allowed, and degrades
//!   to silence (never to an error) when the grant expires.
//!
//! Device APIs may silently no-op or reject depending on embedding policy;
//! nothing in this crate treats that as fatal except camera acquisition
//! itself.

mod audio;
mod decode;
mod haptics;

pub use audio::{AudioError, AudioGate, AudioGateState, AudioSink};
pub use decode::{
    ActiveDecode, CameraFacing, ContinuousDecoder, DecodeError, DecodeHandle, DecodeLoop,
    MediaTrack, RawCodeFn, ScanEvent,
};
pub use haptics::{Haptics, NullHaptics};
