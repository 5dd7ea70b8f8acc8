//! Hearth: a voice-driven home-control assistant.
//!
//! A single-binary daemon that listens for a wake phrase on the
//! microphone, transcribes the command that follows, and either handles
//! it deterministically (timers, playback transport, the time) or runs
//! it through an LLM tool-calling agent wired to the home-automation
//! bridge. Responses are synthesized and played through a single
//! arbitrated speaker queue that timer alerts also use.

pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod router;
pub mod speaker;
pub mod timers;
pub mod tools;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::Pipeline;
