//! Agent loop
//!
//! Multi-turn tool-calling conversation for utterances the fast path
//! declines. Each turn asks the chat backend for a completion; tool
//! calls are validated and executed through the registry, their results
//! folded back into the transcript, and the loop continues until the
//! model answers in plain text or the turn budget runs out.
//!
//! A failing tool call gets exactly one self-correction: the error is
//! folded back as an observation so the model can fix its arguments; a
//! second failure of the same tool aborts the task.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::llm::{ChatBackend, ChatMessage, ToolSpec};
use crate::tools::ToolRegistry;
use crate::{Error, Result};

/// Turn budget before the task is abandoned
const MAX_TURNS: usize = 8;

/// Spoken-answer persona; responses are read aloud, so short
const SYSTEM_PROMPT: &str = "You are a voice assistant for a smart home. \
    Answer in at most three short sentences, with no markdown or lists, \
    because your reply will be spoken aloud. Use the available tools to \
    check or change anything in the house rather than guessing.";

/// Runs declined utterances through the chat backend and tools
pub struct Agent {
    backend: Arc<dyn ChatBackend>,
    registry: Arc<ToolRegistry>,
    specs: Vec<ToolSpec>,
}

impl Agent {
    #[must_use]
    pub fn new(backend: Arc<dyn ChatBackend>, registry: Arc<ToolRegistry>) -> Self {
        let specs = registry.specs();
        Self {
            backend,
            registry,
            specs,
        }
    }

    /// Run one utterance to a final spoken answer.
    ///
    /// `history` is the prior conversation (user/assistant pairs only);
    /// `cancel` is checked at every turn boundary and before each tool
    /// dispatch. A dispatched tool call is never force-killed; its
    /// result is simply discarded when the task is cancelled.
    ///
    /// # Errors
    ///
    /// `Error::Cancelled` when the cancel flag is observed;
    /// `Error::AgentExhausted` when the turn budget runs out; tool and
    /// backend failures that defeat self-correction propagate as-is.
    pub async fn run(
        &self,
        utterance: &str,
        history: &[ChatMessage],
        cancel: &Arc<AtomicBool>,
    ) -> Result<String> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(SYSTEM_PROMPT));
        messages.extend_from_slice(history);
        messages.push(ChatMessage::user(utterance));

        let mut corrections: HashMap<String, u32> = HashMap::new();

        for turn in 0..MAX_TURNS {
            if cancel.load(Ordering::Relaxed) {
                tracing::debug!(turn, "agent task cancelled at turn boundary");
                return Err(Error::Cancelled);
            }

            let completion = self.backend.complete(&messages, &self.specs).await?;
            let tool_calls = completion.message.tool_calls.clone().unwrap_or_default();
            let wants_tools = completion.wants_tools();
            messages.push(completion.message.clone());

            if !wants_tools {
                let answer = completion.message.content.unwrap_or_default();
                tracing::info!(turn, "agent answered");
                return Ok(answer);
            }

            for call in tool_calls {
                if cancel.load(Ordering::Relaxed) {
                    tracing::debug!(tool = %call.function.name, "cancelled before tool dispatch");
                    return Err(Error::Cancelled);
                }

                let name = call.function.name.clone();
                match self.registry.call(&name, &call.function.arguments).await {
                    Ok(result) => {
                        messages.push(ChatMessage::tool_result(call.id, result.to_string()));
                    }
                    Err(e) => {
                        let attempts = corrections.entry(name.clone()).or_insert(0);
                        *attempts += 1;
                        if *attempts > 1 {
                            tracing::warn!(tool = %name, error = %e, "tool failed twice, giving up");
                            return Err(e);
                        }

                        tracing::warn!(tool = %name, error = %e, "tool failed, folding back error");
                        messages.push(ChatMessage::tool_result(
                            call.id,
                            format!("Error: {e}. Correct the call and try again."),
                        ));
                    }
                }
            }
        }

        tracing::warn!(max_turns = MAX_TURNS, "agent exhausted turn budget");
        Err(Error::AgentExhausted(MAX_TURNS))
    }
}
