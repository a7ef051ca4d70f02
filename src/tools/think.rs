//! Think tool - lets the model reason out loud without side effects

use super::{Tool, ToolContext, ToolError, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct ThinkTool;

#[derive(Debug, Deserialize)]
struct ThinkInput {
    thoughts: String,
}

#[async_trait]
impl Tool for ThinkTool {
    fn name(&self) -> &'static str {
        "think"
    }

    fn description(&self) -> String {
        "Reason through a problem before acting: plan multi-step approaches, debug unexpected results, or weigh options. No side effects; the thoughts are only recorded.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["thoughts"],
            "properties": {
                "thoughts": {
                    "type": "string",
                    "description": "The thoughts, notes, or plans to record"
                }
            }
        })
    }

    async fn run(&self, input: Value, _ctx: ToolContext) -> Result<ToolOutput, ToolError> {
        match serde_json::from_value::<ThinkInput>(input) {
            Ok(input) => {
                tracing::debug!(chars = input.thoughts.chars().count(), "Thought recorded");
                Ok(ToolOutput::success("recorded"))
            }
            Err(e) => Ok(ToolOutput::error(format!("Invalid input: {e}"))),
        }
    }
}
