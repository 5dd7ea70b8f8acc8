//! Wake-word gating
//!
//! Hybrid detection: a cheap RMS-energy voice-activity gate segments the
//! microphone stream into candidate utterances, and the transcript of a
//! candidate segment is then checked for the wake phrase. Once armed, the
//! gate keeps accumulating until end-of-speech (or the hard length cap)
//! to capture the command utterance.

use crate::Result;

/// Minimum RMS energy to count a chunk as speech
const ENERGY_THRESHOLD: f32 = 0.015;

/// Silence run that ends an utterance (1s at 16kHz)
const SILENCE_SAMPLES: usize = 16000;

/// Minimum utterance length worth transcribing (1.5s, trailing silence
/// included)
const MIN_UTTERANCE_SAMPLES: usize = 24000;

/// Minimum voiced samples within an utterance (0.5s); filters blips
/// that are mostly silence
const MIN_VOICED_SAMPLES: usize = 8000;

/// Hard cap on a single utterance (10s); longer input is cut here
const MAX_SPEECH_SAMPLES: usize = 160_000;

/// Wake gate state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Passive: waiting for any speech energy
    Idle,
    /// Speech energy seen, accumulating a candidate segment
    Gathering,
    /// Wake phrase confirmed, capturing the command utterance
    Armed,
}

/// Segments the audio stream and gates it on a wake phrase
pub struct WakeGate {
    wake_phrases: Vec<String>,
    state: GateState,
    segment: Vec<f32>,
    silence_run: usize,
    voiced: usize,
}

impl WakeGate {
    /// Create a gate for the given wake phrases (e.g. "hey hearth").
    ///
    /// # Errors
    ///
    /// Returns error if no wake phrase is configured.
    pub fn new(wake_phrases: Vec<String>) -> Result<Self> {
        if wake_phrases.is_empty() {
            return Err(crate::Error::Config(
                "at least one wake phrase required".to_string(),
            ));
        }

        let normalized: Vec<String> = wake_phrases
            .into_iter()
            .map(|w| w.to_lowercase().trim().to_string())
            .collect();

        tracing::debug!(wake_phrases = ?normalized, "wake gate initialized");

        Ok(Self {
            wake_phrases: normalized,
            state: GateState::Idle,
            segment: Vec::new(),
            silence_run: 0,
            voiced: 0,
        })
    }

    /// Feed a chunk of samples. Returns true when a complete candidate
    /// segment is ready for transcription (not yet wake-confirmed).
    pub fn feed(&mut self, samples: &[f32]) -> bool {
        let is_speech = rms_energy(samples) > ENERGY_THRESHOLD;

        match self.state {
            GateState::Idle => {
                if is_speech {
                    self.state = GateState::Gathering;
                    self.segment.clear();
                    self.segment.extend_from_slice(samples);
                    self.silence_run = 0;
                    self.voiced = samples.len();
                }
            }
            GateState::Gathering => {
                self.segment.extend_from_slice(samples);
                self.track_silence(is_speech, samples.len());

                if self.segment_ended() {
                    tracing::debug!(samples = self.segment.len(), "candidate segment complete");
                    return true;
                }

                // Long silence without enough speech: give up on this segment
                if self.silence_run > SILENCE_SAMPLES * 2 {
                    self.reset();
                }
            }
            GateState::Armed => {
                // Skip leading silence so a bare wake word followed by
                // nothing never looks like a completed utterance.
                if self.segment.is_empty() && !is_speech {
                    self.silence_run += samples.len();
                    if self.silence_run > SILENCE_SAMPLES * 5 {
                        tracing::debug!("no follow-up speech, disarming");
                        self.reset();
                    }
                    return false;
                }

                self.segment.extend_from_slice(samples);
                self.track_silence(is_speech, samples.len());
            }
        }

        false
    }

    /// Check a candidate transcript for the wake phrase; arms the gate
    /// on a match, resets it otherwise.
    pub fn confirm_wake(&mut self, transcript: &str) -> bool {
        let normalized = transcript.to_lowercase();

        for phrase in &self.wake_phrases {
            if normalized.contains(phrase.as_str()) {
                tracing::info!(phrase, transcript, "wake phrase detected");
                self.state = GateState::Armed;
                self.silence_run = 0;
                self.voiced = 0;
                return true;
            }
        }

        self.reset();
        false
    }

    /// Whether the armed gate has a complete command utterance
    /// (end-of-speech silence, or the hard length cap).
    #[must_use]
    pub fn utterance_complete(&self) -> bool {
        self.state == GateState::Armed && self.segment_ended()
    }

    /// Take the accumulated segment, leaving the gate buffer empty.
    pub fn take_segment(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.segment)
    }

    /// Arm the gate directly (push-to-talk / follow-up capture).
    pub const fn arm(&mut self) {
        self.state = GateState::Armed;
        self.silence_run = 0;
        self.voiced = 0;
    }

    /// Reset to passive listening.
    pub fn reset(&mut self) {
        self.state = GateState::Idle;
        self.segment.clear();
        self.silence_run = 0;
        self.voiced = 0;
    }

    /// Current gate state
    #[must_use]
    pub const fn state(&self) -> GateState {
        self.state
    }

    /// Whether the wake phrase has been confirmed
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.state == GateState::Armed
    }

    /// Configured wake phrases
    #[must_use]
    pub fn wake_phrases(&self) -> &[String] {
        &self.wake_phrases
    }

    fn track_silence(&mut self, is_speech: bool, len: usize) {
        if is_speech {
            self.silence_run = 0;
            self.voiced += len;
        } else {
            self.silence_run += len;
        }
    }

    fn segment_ended(&self) -> bool {
        (self.silence_run > SILENCE_SAMPLES
            && self.segment.len() > MIN_UTTERANCE_SAMPLES
            && self.voiced > MIN_VOICED_SAMPLES)
            || self.segment.len() >= MAX_SPEECH_SAMPLES
    }
}

/// RMS energy of a chunk of samples
#[allow(clippy::cast_precision_loss)]
fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
