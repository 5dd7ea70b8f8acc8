//! Tool registry
//!
//! Tools the agent can call. Every call is validated against the tool's
//! declared parameter schema before execution and wrapped in the tool's
//! own timeout, so one stuck integration cannot wedge a command task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::ToolSpec;
use crate::{Error, Result};

/// Default per-call timeout when a tool does not override it
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 10;

/// A capability callable by the agent
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model calls this tool by
    fn name(&self) -> &str;

    /// One-line description shown to the model
    fn description(&self) -> &str;

    /// JSON schema for the arguments object
    fn parameters(&self) -> Value;

    /// Per-call deadline in seconds
    fn timeout_secs(&self) -> u64 {
        DEFAULT_TOOL_TIMEOUT_SECS
    }

    /// Run the tool with validated arguments.
    async fn execute(&self, args: Value) -> Result<Value>;
}

/// Name-indexed collection of the agent's tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. Later registrations replace earlier ones with the
    /// same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        tracing::debug!(tool = tool.name(), "tool registered");
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Tool specs to advertise to the model
    #[must_use]
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .values()
            .map(|t| ToolSpec::function(t.name(), t.description(), t.parameters()))
            .collect();
        specs.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        specs
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Validate and execute a tool call with the model's raw JSON
    /// argument string.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidToolCall` for an unknown tool, unparseable
    /// arguments, or arguments that fail schema validation;
    /// `Error::ToolTimeout` when the call exceeds the tool's deadline;
    /// otherwise whatever the tool itself returns.
    pub async fn call(&self, name: &str, raw_args: &str) -> Result<Value> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| Error::InvalidToolCall {
                tool: name.to_string(),
                reason: "no such tool".to_string(),
            })?;

        let args: Value = if raw_args.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(raw_args).map_err(|e| Error::InvalidToolCall {
                tool: name.to_string(),
                reason: format!("arguments are not valid JSON: {e}"),
            })?
        };

        validate_args(name, &tool.parameters(), &args)?;

        let seconds = tool.timeout_secs();
        tracing::info!(tool = name, args = %args, "executing tool");

        match tokio::time::timeout(Duration::from_secs(seconds), tool.execute(args)).await {
            Ok(result) => result,
            Err(_) => Err(Error::ToolTimeout {
                tool: name.to_string(),
                seconds,
            }),
        }
    }
}

/// Check an arguments object against a tool's parameter schema: required
/// keys present, declared property types respected, no unknown keys.
fn validate_args(tool: &str, schema: &Value, args: &Value) -> Result<()> {
    let invalid = |reason: String| Error::InvalidToolCall {
        tool: tool.to_string(),
        reason,
    };

    let Some(obj) = args.as_object() else {
        return Err(invalid("arguments must be a JSON object".to_string()));
    };

    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !obj.contains_key(key) {
                return Err(invalid(format!("missing required argument '{key}'")));
            }
        }
    }

    for (key, value) in obj {
        let Some(prop) = properties.get(key) else {
            return Err(invalid(format!("unknown argument '{key}'")));
        };

        if let Some(expected) = prop.get("type").and_then(Value::as_str) {
            let ok = match expected {
                "string" => value.is_string(),
                "number" => value.is_number(),
                "integer" => value.is_i64() || value.is_u64(),
                "boolean" => value.is_boolean(),
                "array" => value.is_array(),
                "object" => value.is_object(),
                _ => true,
            };
            if !ok {
                return Err(invalid(format!("argument '{key}' must be a {expected}")));
            }
        }

        if let Some(allowed) = prop.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                return Err(invalid(format!("argument '{key}' is not an allowed value")));
            }
        }
    }

    Ok(())
}
