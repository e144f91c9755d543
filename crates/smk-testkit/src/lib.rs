//! smk-testkit
//!
//! Scriptable fakes for every device and backend seam the scanning engine
//! touches, plus the [`ScanRig`] harness that wires them to one engine with
//! all listeners recorded. Scenario tests under `tests/` run entirely
//! in-process: no camera, no audio output, no network.

mod counting_haptics;
mod fake_audio;
mod in_memory_remote;
mod rig;
mod scripted_decoder;

pub use counting_haptics::CountingHaptics;
pub use fake_audio::FakeAudioSink;
pub use in_memory_remote::InMemoryRemote;
pub use rig::ScanRig;
pub use scripted_decoder::{FakeTrack, ScriptedDecoder};
