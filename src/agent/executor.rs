//! Allow-listed tool execution for the reasoning loop.
//!
//! The model asks for a tool by emitting `{"tool": ..., "args": {...}}`.
//! Only names in [`ALLOWED_TOOLS`] are ever dispatched, and a handler
//! failure (error or panic) degrades to "no observation" instead of
//! propagating.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};

use serde_json::{Map, Value};

use crate::core::{Command, Issue};
use crate::error::AgentError;

/// Maximum raw byte length of a tool call accepted from the model.
const MAX_TOOL_CALL_LEN: usize = 100_000;
/// Maximum issues kept from one structured diagnosis.
const MAX_ISSUES: usize = 50;

/// Tools the model may invoke.
pub const ALLOWED_TOOLS: [&str; 1] = [Command::STRUCTURED_DIAGNOSIS];

/// A tool implementation.
pub trait ToolHandler: Send + Sync {
    /// Tool name as emitted by the model.
    fn name(&self) -> &'static str;

    /// Runs the tool on the `args` object.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ToolExecution`] if the arguments are unusable.
    fn handle(&self, args: &Map<String, Value>) -> Result<Command, AgentError>;
}

/// Normalises model-produced issues into a [`Command`].
///
/// Non-object entries are dropped; every field is coerced to a trimmed
/// string. A missing or non-list `issues` yields an empty list.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredDiagnosisTool;

impl ToolHandler for StructuredDiagnosisTool {
    fn name(&self) -> &'static str {
        Command::STRUCTURED_DIAGNOSIS
    }

    fn handle(&self, args: &Map<String, Value>) -> Result<Command, AgentError> {
        let issues = args
            .get("issues")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_object)
                    .take(MAX_ISSUES)
                    .map(|item| {
                        Issue::new(
                            &field_text(item, "name"),
                            &field_text(item, "reason"),
                            &field_text(item, "suggestion"),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Command::GenerateStructuredDiagnosis { issues })
    }
}

fn field_text(item: &Map<String, Value>, key: &str) -> String {
    match item.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Dispatches tool calls to registered, allow-listed handlers.
pub struct ToolExecutor {
    handlers: HashMap<&'static str, Box<dyn ToolHandler>>,
}

impl ToolExecutor {
    /// Creates an executor with the built-in tools registered.
    #[must_use]
    pub fn new() -> Self {
        let mut handlers: HashMap<&'static str, Box<dyn ToolHandler>> = HashMap::new();
        handlers.insert(Command::STRUCTURED_DIAGNOSIS, Box::new(StructuredDiagnosisTool));
        Self { handlers }
    }

    /// Replaces the handler for an allow-listed tool.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ToolExecution`] if the handler's name is not in
    /// [`ALLOWED_TOOLS`].
    pub fn register(&mut self, handler: Box<dyn ToolHandler>) -> Result<(), AgentError> {
        let name = handler.name();
        if !ALLOWED_TOOLS.contains(&name) {
            return Err(AgentError::ToolExecution {
                name: name.to_string(),
                message: "tool is not allow-listed".to_string(),
            });
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    /// Parses and executes a raw tool call.
    ///
    /// Returns `None` for invalid JSON, a non-object, an unknown tool, or a
    /// failing handler.
    #[must_use]
    pub fn execute(&self, raw: &str) -> Option<Command> {
        if raw.len() > MAX_TOOL_CALL_LEN {
            tracing::warn!(bytes = raw.len(), "tool call too large, ignoring");
            return None;
        }
        let value: Value = serde_json::from_str(raw).ok()?;
        self.execute_value(&value)
    }

    /// Executes an already parsed tool call.
    #[must_use]
    pub fn execute_value(&self, call: &Value) -> Option<Command> {
        let call = call.as_object()?;
        let tool = call.get("tool").and_then(Value::as_str)?;

        if !ALLOWED_TOOLS.contains(&tool) {
            tracing::warn!(tool, "rejected tool call outside the allow-list");
            return None;
        }
        let handler = self.handlers.get(tool)?;

        let empty = Map::new();
        let args = call.get("args").and_then(Value::as_object).unwrap_or(&empty);

        match catch_unwind(AssertUnwindSafe(|| handler.handle(args))) {
            Ok(Ok(command)) => {
                tracing::debug!(tool, issues = command.issues().len(), "tool executed");
                Some(command)
            }
            Ok(Err(e)) => {
                tracing::warn!(tool, error = %e, "tool handler failed");
                None
            }
            Err(_) => {
                tracing::error!(tool, "tool handler panicked");
                None
            }
        }
    }
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&&str> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("ToolExecutor").field("tools", &names).finish()
    }
}
