//! Error types for the Hearth assistant

use thiserror::Error;

/// Result type alias for Hearth operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Hearth assistant
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Tool call arguments did not match the declared schema
    #[error("invalid tool call for {tool}: {reason}")]
    InvalidToolCall {
        /// Tool name
        tool: String,
        /// What was wrong with the arguments
        reason: String,
    },

    /// A tool invocation exceeded its deadline
    #[error("tool {tool} timed out after {seconds}s")]
    ToolTimeout {
        /// Tool name
        tool: String,
        /// Configured timeout
        seconds: u64,
    },

    /// Tool execution error
    #[error("tool error: {0}")]
    Tool(String),

    /// Agent loop hit its turn limit without producing a final answer
    #[error("agent exhausted after {0} turns")]
    AgentExhausted(usize),

    /// The owning command task was cancelled (barge-in); never user-visible
    #[error("cancelled")]
    Cancelled,

    /// Agent/LLM error
    #[error("agent error: {0}")]
    Agent(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error represents an intentional cancellation rather
    /// than a failure. Cancelled tasks produce no spoken output.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
