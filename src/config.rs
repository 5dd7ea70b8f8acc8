//! Configuration
//!
//! Everything is environment-driven with sensible defaults, except the
//! home-device endpoints, which live in an optional `home.toml` (looked
//! up next to the data dir, or wherever `HEARTH_HOME_CONFIG` points).

use std::path::PathBuf;
use std::str::FromStr;

use directories::ProjectDirs;
use serde::Deserialize;

use crate::{Error, Result};

/// Which transcription service to use
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SttProvider {
    Whisper,
    Deepgram,
}

impl FromStr for SttProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "whisper" | "openai" => Ok(Self::Whisper),
            "deepgram" => Ok(Self::Deepgram),
            other => Err(Error::Config(format!("unknown STT provider '{other}'"))),
        }
    }
}

/// Which synthesis service to use
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TtsProvider {
    OpenAi,
    ElevenLabs,
}

impl FromStr for TtsProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "elevenlabs" => Ok(Self::ElevenLabs),
            other => Err(Error::Config(format!("unknown TTS provider '{other}'"))),
        }
    }
}

/// Home-device endpoints, from `home.toml`
#[derive(Clone, Debug, Default, Deserialize)]
pub struct HomeConfig {
    /// Base URL of the home-automation bridge
    #[serde(default)]
    pub bridge_url: String,
    /// Base URL of the web-search service
    #[serde(default)]
    pub search_url: String,
}

/// Runtime configuration for the daemon
#[derive(Clone, Debug)]
pub struct Config {
    pub wake_phrases: Vec<String>,

    pub stt_provider: SttProvider,
    pub stt_model: String,

    pub tts_provider: TtsProvider,
    pub tts_model: String,
    pub tts_voice: String,
    pub tts_speed: f32,

    pub chat_base_url: String,
    pub chat_model: String,
    pub chat_temperature: f32,

    pub openai_api_key: String,
    pub deepgram_api_key: String,
    pub elevenlabs_api_key: String,

    pub home: HomeConfig,
}

impl Config {
    /// Load configuration from the environment and the optional
    /// `home.toml`.
    ///
    /// # Errors
    ///
    /// Returns error on an unknown provider name, an unparseable
    /// numeric value, or a malformed `home.toml`.
    pub fn load() -> Result<Self> {
        let wake_phrases: Vec<String> = var_or("HEARTH_WAKE_PHRASES", "hey hearth,hearth")
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        let stt_provider = var_or("HEARTH_STT_PROVIDER", "whisper").parse()?;
        let stt_model = match stt_provider {
            SttProvider::Whisper => var_or("HEARTH_STT_MODEL", "whisper-1"),
            SttProvider::Deepgram => var_or("HEARTH_STT_MODEL", "nova-2"),
        };

        let tts_provider = var_or("HEARTH_TTS_PROVIDER", "openai").parse()?;
        let tts_model = match tts_provider {
            TtsProvider::OpenAi => var_or("HEARTH_TTS_MODEL", "tts-1"),
            TtsProvider::ElevenLabs => var_or("HEARTH_TTS_MODEL", "eleven_turbo_v2_5"),
        };
        let tts_voice = var_or("HEARTH_TTS_VOICE", "nova");
        let tts_speed = parse_var("HEARTH_TTS_SPEED", 1.0)?;

        let chat_base_url = var_or("HEARTH_CHAT_BASE_URL", "https://api.openai.com/v1");
        let chat_model = var_or("HEARTH_CHAT_MODEL", "gpt-4o-mini");
        let chat_temperature = parse_var("HEARTH_CHAT_TEMPERATURE", 0.3)?;

        let config = Self {
            wake_phrases,
            stt_provider,
            stt_model,
            tts_provider,
            tts_model,
            tts_voice,
            tts_speed,
            chat_base_url,
            chat_model,
            chat_temperature,
            openai_api_key: var_or("OPENAI_API_KEY", ""),
            deepgram_api_key: var_or("DEEPGRAM_API_KEY", ""),
            elevenlabs_api_key: var_or("ELEVENLABS_API_KEY", ""),
            home: load_home_config()?,
        };

        tracing::debug!(
            stt = ?config.stt_provider,
            tts = ?config.tts_provider,
            chat_model = %config.chat_model,
            bridge = %config.home.bridge_url,
            "configuration loaded"
        );

        Ok(config)
    }
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("invalid value for {key}: '{raw}'"))),
        Err(_) => Ok(default),
    }
}

fn load_home_config() -> Result<HomeConfig> {
    let path = home_config_path();
    let Some(path) = path else {
        return Ok(HomeConfig::default());
    };

    if !path.exists() {
        tracing::debug!(path = %path.display(), "no home.toml, home tools disabled");
        return Ok(HomeConfig::default());
    }

    let raw = std::fs::read_to_string(&path)?;
    let home: HomeConfig = toml::from_str(&raw)?;
    tracing::debug!(path = %path.display(), "home.toml loaded");
    Ok(home)
}

fn home_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("HEARTH_HOME_CONFIG") {
        return Some(PathBuf::from(path));
    }

    ProjectDirs::from("dev", "hearth", "hearth").map(|dirs| dirs.config_dir().join("home.toml"))
}
