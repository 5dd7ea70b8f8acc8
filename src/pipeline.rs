//! Dialogue orchestrator
//!
//! The main loop of the daemon: tick the microphone, gate on the wake
//! phrase, transcribe utterances, and run each accepted command on a
//! spawned task so the wake monitor never stops listening. At most one
//! command task is in flight; a wake trigger while one is running sets
//! its cancellation flag (barge-in) and the new utterance replaces it.
//!
//! No error escapes this module: every failure path becomes a spoken
//! apology, or silence for a cancelled task, and the loop returns to
//! passive listening.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::seq::SliceRandom;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::Result;
use crate::agent::Agent;
use crate::config::{Config, SttProvider, TtsProvider};
use crate::llm::OpenAiChat;
use crate::router::{RouteDecision, Router};
use crate::speaker::Speaker;
use crate::timers::{TimerAlert, TimerSet, format_duration};
use crate::tools::{
    BridgeMedia, ControlLights, ControlMedia, ControlReceiver, ControlTv, GetApplianceStatus,
    GetCalendarEvents, GetTemperature, GetWeather, HomeClient, MediaTransport, OfflineMedia,
    SearchWeb, SetTemperature, ToolRegistry,
};
use crate::voice::{
    AudioCapture, CHUNK_SAMPLES, SAMPLE_RATE, Synthesizer, Transcriber, WakeGate, samples_to_wav,
};

/// Audio poll interval
const TICK: Duration = Duration::from_millis(100);

const APOLOGIES: &[&str] = &[
    "Sorry, something went wrong with that.",
    "Sorry, I couldn't do that.",
    "That didn't work, sorry.",
];

const MISHEARD: &[&str] = &[
    "Sorry, I didn't catch that.",
    "Sorry, could you say that again?",
];

const WAKE_REPLIES: &[&str] = &["Yes?", "I'm listening.", "What can I do?"];

const FALLBACK: &str = "Sorry, I can't help with that.";

/// The single in-flight command task
struct ActiveTask {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Everything a spawned command task needs
struct TaskDeps {
    router: Router,
    agent: Option<Agent>,
    transcriber: Transcriber,
    synthesizer: Synthesizer,
    speaker: Speaker,
}

/// The voice loop: wake monitoring, command dispatch, timer alerts
pub struct Pipeline {
    capture: AudioCapture,
    gate: WakeGate,
    alerts: Option<UnboundedReceiver<TimerAlert>>,
    deps: Arc<TaskDeps>,
    active: Option<ActiveTask>,
}

impl Pipeline {
    /// Build the full pipeline from configuration: audio devices, voice
    /// adapters, tools, router, and agent.
    ///
    /// # Errors
    ///
    /// Returns error when an audio device, a required API key, or a
    /// configured endpoint is unusable. A missing chat key only
    /// disables the agent; a missing `home.toml` only disables the
    /// home tools.
    pub fn new(config: &Config) -> Result<Self> {
        let capture = AudioCapture::new()?;
        let gate = WakeGate::new(config.wake_phrases.clone())?;

        let transcriber = match config.stt_provider {
            SttProvider::Whisper => Transcriber::whisper(
                config.openai_api_key.clone(),
                config.stt_model.clone(),
            )?,
            SttProvider::Deepgram => Transcriber::deepgram(
                config.deepgram_api_key.clone(),
                config.stt_model.clone(),
            )?,
        };

        let synthesizer = match config.tts_provider {
            TtsProvider::OpenAi => Synthesizer::openai(
                config.openai_api_key.clone(),
                config.tts_model.clone(),
                config.tts_voice.clone(),
                config.tts_speed,
            )?,
            TtsProvider::ElevenLabs => Synthesizer::elevenlabs(
                config.elevenlabs_api_key.clone(),
                config.tts_model.clone(),
                config.tts_voice.clone(),
            )?,
        };

        let speaker = Speaker::spawn()?;
        let (timers, alerts) = TimerSet::new();
        let timers = Arc::new(timers);

        let bridge = if config.home.bridge_url.is_empty() {
            tracing::warn!("no home bridge configured, home tools disabled");
            None
        } else {
            Some(Arc::new(HomeClient::new(&config.home.bridge_url)?))
        };

        let media: Arc<dyn MediaTransport> = match &bridge {
            Some(client) => Arc::new(BridgeMedia::new(Arc::clone(client))),
            None => Arc::new(OfflineMedia),
        };

        let mut registry = ToolRegistry::new();
        if let Some(client) = &bridge {
            registry.register(Arc::new(GetTemperature::new(Arc::clone(client))));
            registry.register(Arc::new(SetTemperature::new(Arc::clone(client))));
            registry.register(Arc::new(ControlLights::new(Arc::clone(client))));
            registry.register(Arc::new(GetCalendarEvents::new(Arc::clone(client))));
            registry.register(Arc::new(GetWeather::new(Arc::clone(client))));
            registry.register(Arc::new(ControlTv::new(Arc::clone(client))));
            registry.register(Arc::new(ControlReceiver::new(Arc::clone(client))));
            registry.register(Arc::new(GetApplianceStatus::new(Arc::clone(client))));
            registry.register(Arc::new(ControlMedia::new(Arc::clone(&media))));
        }
        if !config.home.search_url.is_empty() {
            registry.register(Arc::new(SearchWeb::new(&config.home.search_url)?));
        }

        let agent = if config.openai_api_key.is_empty() {
            tracing::warn!("no chat API key, agent disabled");
            None
        } else {
            let backend = OpenAiChat::new(
                config.chat_base_url.clone(),
                config.openai_api_key.clone(),
                config.chat_model.clone(),
                config.chat_temperature,
            )?;
            Some(Agent::new(Arc::new(backend), Arc::new(registry)))
        };

        let router = Router::new(Arc::clone(&timers), media);

        Ok(Self {
            capture,
            gate,
            alerts: Some(alerts),
            deps: Arc::new(TaskDeps {
                router,
                agent,
                transcriber,
                synthesizer,
                speaker,
            }),
            active: None,
        })
    }

    /// Run until Ctrl-C, then drain the in-flight task and queued audio.
    ///
    /// # Errors
    ///
    /// Only startup failures (microphone) escape; runtime failures are
    /// spoken and swallowed.
    pub async fn run(&mut self) -> Result<()> {
        self.capture.start()?;
        tracing::info!(wake_phrases = ?self.gate.wake_phrases(), "listening");

        let mut tick = tokio::time::interval(TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // One drain task keeps alert announcements in fire order
        let announcer = self
            .alerts
            .take()
            .map(|alerts| tokio::spawn(announce_alerts(Arc::clone(&self.deps), alerts)));

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown requested");
                    break;
                }
                _ = tick.tick() => {
                    self.poll_audio().await;
                }
            }
        }

        if let Some(handle) = announcer {
            handle.abort();
        }
        self.shutdown().await;
        Ok(())
    }

    /// Drain buffered microphone samples through the wake gate.
    async fn poll_audio(&mut self) {
        let samples = self.capture.take_buffer();

        for chunk in samples.chunks(CHUNK_SAMPLES) {
            if self.gate.is_armed() {
                self.gate.feed(chunk);
                if self.gate.utterance_complete() {
                    let segment = self.gate.take_segment();
                    self.gate.reset();
                    // Transcription happens on the task, not here; the
                    // wake monitor keeps ticking
                    self.dispatch(TaskInput::Audio(segment));
                }
            } else if self.gate.feed(chunk) {
                self.candidate_segment().await;
            }
        }
    }

    /// A candidate speech segment completed while passive: transcribe
    /// it and check for the wake phrase.
    async fn candidate_segment(&mut self) {
        let segment = self.gate.take_segment();
        let wav = match samples_to_wav(&segment, SAMPLE_RATE) {
            Ok(wav) => wav,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode candidate segment");
                self.gate.reset();
                return;
            }
        };

        let transcript = match self.deps.transcriber.transcribe(&wav).await {
            Ok(text) => text,
            Err(e) => {
                // Passive listening: a failed candidate costs nothing
                tracing::debug!(error = %e, "candidate transcription failed");
                self.gate.reset();
                return;
            }
        };

        if !self.gate.confirm_wake(&transcript) {
            return;
        }

        // Wake while a task is running is a barge-in
        self.interrupt_active();

        if let Some(command) = extract_command(&transcript, self.gate.wake_phrases()) {
            // Command spoken in the same breath as the wake phrase
            self.gate.reset();
            self.dispatch(TaskInput::Text(command));
        } else {
            // Bare wake word: acknowledge and capture the follow-up
            self.speak_canned(pick(WAKE_REPLIES));
        }
    }

    /// Set the active task's cancel flag. Its queued speaker items are
    /// skipped by the flag; its result is discarded.
    fn interrupt_active(&mut self) {
        if let Some(active) = &self.active {
            if !active.handle.is_finished() {
                tracing::info!("barge-in, cancelling active task");
                active.cancel.store(true, Ordering::Relaxed);
            }
        }
    }

    /// Start a command task, replacing (and cancelling) any previous one.
    fn dispatch(&mut self, input: TaskInput) {
        self.interrupt_active();

        let cancel = Arc::new(AtomicBool::new(false));
        let deps = Arc::clone(&self.deps);
        let task_cancel = Arc::clone(&cancel);

        let handle = tokio::spawn(async move {
            execute(&deps, input, &task_cancel).await;
        });

        self.active = Some(ActiveTask { cancel, handle });
    }

    /// Speak a canned line not tied to any command task.
    fn speak_canned(&self, text: String) {
        let deps = Arc::clone(&self.deps);
        tokio::spawn(async move {
            match deps.synthesizer.synthesize(&text).await {
                Ok(mp3) => deps.speaker.alert(mp3),
                Err(e) => tracing::error!(error = %e, "failed to synthesize response"),
            }
        });
    }

    async fn shutdown(&mut self) {
        self.capture.stop();

        if let Some(active) = self.active.take() {
            tracing::info!("waiting for in-flight command");
            let _ = active.handle.await;
        }

        // Joins the playback thread after the queue drains
        self.deps.speaker.shutdown();
        tracing::info!("pipeline stopped");
    }
}

/// What a command task starts from: captured audio, or text already
/// extracted from the wake utterance
enum TaskInput {
    Audio(Vec<f32>),
    Text(String),
}

/// One command task end to end: transcribe, route, execute, speak.
async fn execute(deps: &TaskDeps, input: TaskInput, cancel: &Arc<AtomicBool>) {
    if cancel.load(Ordering::Relaxed) {
        return;
    }

    let utterance = match input {
        TaskInput::Text(text) => text,
        TaskInput::Audio(segment) => match transcribe_segment(deps, &segment).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                tracing::debug!("empty transcription, back to listening");
                return;
            }
            Err(e) => {
                // No retry: apologize and return to passive listening
                tracing::error!(error = %e, "transcription failed");
                speak(deps, &pick(MISHEARD), cancel).await;
                return;
            }
        },
    };

    respond(deps, &utterance, cancel).await;
}

/// Route and answer an accepted utterance. Re-checks the cancel flag
/// first: a barge-in that lands while transcription is in flight must
/// not reach the router's side effects.
async fn respond(deps: &TaskDeps, utterance: &str, cancel: &Arc<AtomicBool>) {
    if cancel.load(Ordering::Relaxed) {
        tracing::debug!("task cancelled before routing");
        return;
    }

    tracing::info!(%utterance, "command accepted");

    let outcome = match deps.router.route(utterance) {
        RouteDecision::Handled(response) => {
            tracing::debug!("fast path handled");
            Ok(response)
        }
        // Each command task starts a fresh conversation; no history
        // carries over from earlier tasks.
        RouteDecision::Declined => match &deps.agent {
            Some(agent) => agent.run(utterance, &[], cancel).await,
            None => Ok(FALLBACK.to_string()),
        },
    };

    match outcome {
        Ok(text) => speak(deps, &text, cancel).await,
        Err(e) if e.is_cancelled() => {
            tracing::debug!("task cancelled, staying quiet");
        }
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            speak(deps, &pick(APOLOGIES), cancel).await;
        }
    }
}

/// Synthesize and queue timer alerts one at a time, so they hit the
/// speaker FIFO in the order they fired.
async fn announce_alerts(deps: Arc<TaskDeps>, mut alerts: UnboundedReceiver<TimerAlert>) {
    while let Some(alert) = alerts.recv().await {
        let text = match &alert.label {
            Some(label) => format!("Your {label} timer is done."),
            None => format!("Your {} timer is done.", format_duration(alert.duration)),
        };
        tracing::info!(id = %alert.id, "announcing timer");

        match deps.synthesizer.synthesize(&text).await {
            Ok(mp3) => deps.speaker.alert(mp3),
            Err(e) => tracing::error!(error = %e, "failed to synthesize timer alert"),
        }
    }
}

/// Encode and transcribe a captured utterance. `Ok(None)` means the
/// audio transcribed to nothing.
async fn transcribe_segment(deps: &TaskDeps, segment: &[f32]) -> Result<Option<String>> {
    let wav = samples_to_wav(segment, SAMPLE_RATE)?;
    let text = deps.transcriber.transcribe(&wav).await?;
    let text = text.trim();
    if text.is_empty() {
        Ok(None)
    } else {
        Ok(Some(text.to_string()))
    }
}

async fn speak(deps: &TaskDeps, text: &str, cancel: &Arc<AtomicBool>) {
    if cancel.load(Ordering::Relaxed) {
        return;
    }

    match deps.synthesizer.synthesize(text).await {
        Ok(mp3) => deps.speaker.say(mp3, Arc::clone(cancel)),
        Err(e) => {
            // No retry; the response is lost and the loop moves on
            tracing::error!(error = %e, "synthesis failed");
        }
    }
}

fn pick(lines: &[&str]) -> String {
    let mut rng = rand::thread_rng();
    lines.choose(&mut rng).copied().unwrap_or("Sorry.").to_string()
}

/// Pull the command text spoken after the wake phrase, if any.
fn extract_command(transcript: &str, wake_phrases: &[String]) -> Option<String> {
    let lower = transcript.to_lowercase();

    for phrase in wake_phrases {
        if let Some(pos) = lower.find(phrase.as_str()) {
            let after = lower[pos + phrase.len()..]
                .trim_start_matches([',', '.', '!', '?', ' '])
                .trim();
            if !after.is_empty() {
                return Some(after.to_string());
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_inline_command() {
        let phrases = vec!["hey hearth".to_string()];
        assert_eq!(
            extract_command("Hey Hearth, set a timer for ten minutes", &phrases),
            Some("set a timer for ten minutes".to_string())
        );
    }

    #[test]
    fn bare_wake_word_has_no_command() {
        let phrases = vec!["hey hearth".to_string()];
        assert_eq!(extract_command("Hey Hearth!", &phrases), None);
        assert_eq!(extract_command("Hey Hearth.", &phrases), None);
    }

    #[test]
    fn first_matching_phrase_wins() {
        let phrases = vec!["hey hearth".to_string(), "hearth".to_string()];
        assert_eq!(
            extract_command("hey hearth turn off the lights", &phrases),
            Some("turn off the lights".to_string())
        );
    }

    #[test]
    fn canned_lines_are_not_empty() {
        for line in APOLOGIES.iter().chain(MISHEARD).chain(WAKE_REPLIES) {
            assert!(!line.is_empty());
        }
    }

    #[tokio::test]
    async fn cancel_set_during_transcription_blocks_routing() {
        let (timers, _alerts) = TimerSet::new();
        let timers = Arc::new(timers);
        let deps = TaskDeps {
            router: Router::new(Arc::clone(&timers), Arc::new(OfflineMedia)),
            agent: None,
            transcriber: Transcriber::whisper("key".to_string(), "whisper-1".to_string()).unwrap(),
            synthesizer: Synthesizer::openai(
                "key".to_string(),
                "tts-1".to_string(),
                "nova".to_string(),
                1.0,
            )
            .unwrap(),
            speaker: Speaker::spawn().unwrap(),
        };

        // Barge-in arrived while the utterance was being transcribed
        let cancel = Arc::new(AtomicBool::new(true));
        respond(&deps, "set a timer for 10 minutes", &cancel).await;

        assert!(timers.is_empty());
    }
}
