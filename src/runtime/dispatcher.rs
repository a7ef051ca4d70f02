//! Validates and executes the tool calls of one `ai` message
//!
//! Calls run concurrently, one task each; results come back in call order.

use super::error::{ProtocolViolation, TurnError};
use crate::conversation::{Message, Role};
use crate::tools::{OutputMode, ToolContext, ToolError, ToolOutput, ToolRegistry};
use futures::FutureExt;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Key written into the args of a call that arrived without arguments
pub const REASONING_KEY: &str = "__reasoning";

/// Written into an empty-argument call instead of executing it
pub const SELF_REFLECTION_NOTE: &str = "This call was made without any arguments, so it was not executed. \
Check the tool's expected arguments and call it again with every required argument filled in.";

type Outcome = (usize, String, OutputMode, Result<Result<ToolOutput, ToolError>, Box<dyn Any + Send>>);

pub struct ToolDispatcher {
    registry: ToolRegistry,
    working_dir: PathBuf,
}

impl ToolDispatcher {
    pub fn new(registry: ToolRegistry, working_dir: PathBuf) -> Self {
        Self {
            registry,
            working_dir,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run every call proposed by `last`, the most recent message.
    ///
    /// Empty-argument calls are rewritten in place (in both `tool_calls` and
    /// the matching structured part) so the correction is visible to the
    /// model next step. Tool failures become error results; only
    /// `ToolError::Interrupted` or cancellation aborts with
    /// `TurnError::Interrupted`.
    pub async fn dispatch(
        &self,
        last: Option<&mut Message>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Message>, TurnError> {
        let message = last.ok_or(ProtocolViolation::NoMessage)?;
        if message.role != Role::Ai {
            return Err(ProtocolViolation::NotAiMessage { role: message.role }.into());
        }
        if message.tool_calls.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(call) = message.tool_calls.iter().find(|c| c.id.trim().is_empty()) {
            return Err(ProtocolViolation::MissingToolCallId {
                tool: call.name.clone(),
            }
            .into());
        }

        let Message {
            tool_calls, content, ..
        } = message;
        let mut slots: Vec<Option<Message>> = vec![None; tool_calls.len()];
        let mut tasks: JoinSet<Outcome> = JoinSet::new();

        for (index, call) in tool_calls.iter_mut().enumerate() {
            let Some(tool) = self.registry.lookup(&call.name) else {
                tracing::warn!(tool = %call.name, call_id = %call.id, "Unknown tool requested");
                slots[index] = Some(Message::tool_result(
                    &call.id,
                    format!(
                        "Error: unknown tool `{}`. Available tools: {}",
                        call.name,
                        self.registry.names().join(", ")
                    ),
                    true,
                ));
                continue;
            };

            if call.args.is_empty() {
                tracing::info!(tool = %call.name, call_id = %call.id, "Empty arguments, asking model to reflect");
                let mut args = Map::new();
                args.insert(REASONING_KEY.to_string(), Value::String(SELF_REFLECTION_NOTE.to_string()));
                content.set_tool_use_input(&call.id, Value::Object(args.clone()));
                call.args = args;
                slots[index] = Some(Message::tool_result(
                    &call.id,
                    format!(
                        "Error: `{}` was called with empty arguments. {SELF_REFLECTION_NOTE}\nExpected arguments:\n{}",
                        call.name,
                        render_schema(&tool.input_schema)
                    ),
                    true,
                ));
                continue;
            }

            let input = Value::Object(call.args.clone());
            if let Err(violations) = validate_args(&tool.input_schema, &input) {
                tracing::info!(tool = %call.name, call_id = %call.id, %violations, "Tool arguments failed validation");
                slots[index] = Some(Message::tool_result(
                    &call.id,
                    format!(
                        "Error: invalid arguments for `{}`: {violations}\nExpected arguments:\n{}",
                        call.name,
                        render_schema(&tool.input_schema)
                    ),
                    true,
                ));
                continue;
            }

            let tool = tool.clone();
            let name = call.name.clone();
            let ctx = ToolContext::new(cancel.child_token(), self.working_dir.clone());
            tracing::debug!(tool = %name, call_id = %call.id, remote = tool.is_remote(), "Executing tool");
            tasks.spawn(async move {
                let mode = tool.output_mode();
                let outcome = AssertUnwindSafe(tool.invoke(input, ctx)).catch_unwind().await;
                (index, name, mode, outcome)
            });
        }

        loop {
            let joined = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tasks.abort_all();
                    return Err(TurnError::Interrupted);
                }
                joined = tasks.join_next() => joined,
            };
            let Some(joined) = joined else { break };

            let (index, name, mode, outcome) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(error = %e, "Tool task ended abnormally");
                    continue;
                }
            };
            let call_id = &tool_calls[index].id;

            let result = match outcome {
                Ok(Ok(output)) => {
                    let is_error = !output.success;
                    Message::tool_result(call_id, output.into_content(mode), is_error)
                }
                Ok(Err(ToolError::Interrupted)) => {
                    tasks.abort_all();
                    return Err(TurnError::Interrupted);
                }
                Ok(Err(e)) => {
                    tracing::warn!(tool = %name, error = %e, "Tool failed");
                    Message::tool_result(call_id, format!("Error: {e}"), true)
                }
                Err(panic) => {
                    let reason = panic_message(panic.as_ref());
                    tracing::error!(tool = %name, %reason, "Tool panicked");
                    Message::tool_result(call_id, format!("Error: tool `{name}` crashed: {reason}"), true)
                }
            };
            slots[index] = Some(result);
        }

        Ok(slots
            .into_iter()
            .zip(tool_calls.iter())
            .map(|(slot, call)| {
                slot.unwrap_or_else(|| {
                    Message::tool_result(&call.id, "Error: tool ended without a result", true)
                })
            })
            .collect())
    }
}

fn validate_args(schema: &Value, args: &Value) -> Result<(), String> {
    let validator = match jsonschema::validator_for(schema) {
        Ok(validator) => validator,
        Err(e) => {
            tracing::warn!(error = %e, "Tool schema does not compile, skipping validation");
            return Ok(());
        }
    };
    let errors: Vec<String> = validator.iter_errors(args).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}

/// One line per argument: name, type, required flag and description.
fn render_schema(schema: &Value) -> String {
    let required: HashSet<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return schema.to_string();
    };
    if properties.is_empty() {
        return "(no arguments)".to_string();
    }

    properties
        .iter()
        .map(|(name, property)| {
            let kind = match property.get("type") {
                Some(Value::String(kind)) => kind.clone(),
                Some(other) => other.to_string(),
                None => "any".to_string(),
            };
            let flag = if required.contains(name.as_str()) {
                "required"
            } else {
                "optional"
            };
            match property.get("description").and_then(Value::as_str) {
                Some(description) => format!("- {name} ({kind}, {flag}): {description}"),
                None => format!("- {name} ({kind}, {flag})"),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
