//! Voice I/O: microphone capture, wake gating, transcription, synthesis,
//! and speaker playback.

pub mod capture;
pub mod playback;
pub mod stt;
pub mod tts;
pub mod wake_word;

pub use capture::{AudioCapture, CHUNK_SAMPLES, SAMPLE_RATE, samples_to_wav};
pub use playback::AudioPlayback;
pub use stt::Transcriber;
pub use tts::Synthesizer;
pub use wake_word::{GateState, WakeGate};
