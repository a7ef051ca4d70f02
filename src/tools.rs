//! Tools the model can call
//!
//! Local tools run in-process; remote tools are listed from and executed by
//! an out-of-process tool service. Each registered entry is tagged with its
//! kind once, at registration time.

mod bash;
mod read_image;
mod remote;
mod think;

pub use bash::BashTool;
pub use read_image::ReadImageTool;
pub use remote::{RemoteTool, RemoteToolService};
pub use think::ThinkTool;

use crate::conversation::{ContentPart, MessageContent};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// How a tool's output becomes the content of its tool-result message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Output is sent to the model as text
    #[default]
    Text,
    /// Output may carry pre-structured parts such as images
    ContentParts,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolPayload {
    Text(String),
    Json(Value),
    Parts(Vec<ContentPart>),
}

/// Result from tool execution
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub success: bool,
    pub payload: ToolPayload,
}

impl ToolOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            payload: ToolPayload::Text(output.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: ToolPayload::Text(message.into()),
        }
    }

    pub fn json(value: Value, success: bool) -> Self {
        Self {
            success,
            payload: ToolPayload::Json(value),
        }
    }

    pub fn parts(parts: Vec<ContentPart>) -> Self {
        Self {
            success: true,
            payload: ToolPayload::Parts(parts),
        }
    }

    /// Plain-text view of the output, used for logging and tests
    pub fn text(&self) -> String {
        match &self.payload {
            ToolPayload::Text(text) => text.clone(),
            ToolPayload::Json(Value::String(text)) => text.clone(),
            ToolPayload::Json(value) => value.to_string(),
            ToolPayload::Parts(parts) => MessageContent::Parts(parts.clone()).text(),
        }
    }

    /// Convert into message content according to the tool's output mode.
    ///
    /// Structured parts only survive in `ContentParts` mode; in `Text` mode
    /// they are serialized.
    pub fn into_content(self, mode: OutputMode) -> MessageContent {
        match (self.payload, mode) {
            (ToolPayload::Text(text), _) | (ToolPayload::Json(Value::String(text)), _) => {
                MessageContent::Text(text)
            }
            (ToolPayload::Json(value), _) => MessageContent::Text(value.to_string()),
            (ToolPayload::Parts(parts), OutputMode::ContentParts) => MessageContent::Parts(parts),
            (ToolPayload::Parts(parts), OutputMode::Text) => MessageContent::Text(
                serde_json::to_string(&parts).unwrap_or_else(|e| format!("[unserializable output: {e}]")),
            ),
        }
    }
}

/// Tool failures. Only `Interrupted` aborts a turn; the rest are reported to
/// the model as error results.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    #[error("tool execution interrupted")]
    Interrupted,
    #[error("{0}")]
    Failed(String),
    #[error("tool unavailable: {0}")]
    Unavailable(String),
}

/// All context needed for a tool invocation.
///
/// Created fresh for each tool call. Tools are stateless and derive
/// everything per-call from this struct.
#[derive(Clone)]
pub struct ToolContext {
    /// Cancellation signal for long-running operations
    pub cancel: CancellationToken,

    /// Working directory for file operations
    pub working_dir: PathBuf,
}

impl ToolContext {
    pub fn new(cancel: CancellationToken, working_dir: PathBuf) -> Self {
        Self { cancel, working_dir }
    }
}

/// Trait for in-process tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name
    fn name(&self) -> &str;

    /// Tool description for LLM
    fn description(&self) -> String;

    /// JSON schema for tool input
    fn input_schema(&self) -> Value;

    fn output_mode(&self) -> OutputMode {
        OutputMode::Text
    }

    /// Execute the tool with all context provided via `ToolContext`.
    ///
    /// Tools that spawn long-running work must watch `ctx.cancel` and return
    /// `ToolError::Interrupted` when it fires.
    async fn run(&self, input: Value, ctx: ToolContext) -> Result<ToolOutput, ToolError>;
}

#[derive(Clone)]
pub enum ToolKind {
    Local(Arc<dyn Tool>),
    Remote(RemoteTool),
}

/// One entry of the registry, resolved at registration time
#[derive(Clone)]
pub struct RegisteredTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub kind: ToolKind,
}

impl RegisteredTool {
    fn local(tool: Arc<dyn Tool>) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description(),
            input_schema: tool.input_schema(),
            kind: ToolKind::Local(tool),
        }
    }

    fn remote(tool: RemoteTool) -> Self {
        Self {
            name: tool.spec.name.clone(),
            description: tool.spec.description.clone(),
            input_schema: tool.spec.input_schema.clone(),
            kind: ToolKind::Remote(tool),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.kind, ToolKind::Remote(_))
    }

    /// Remote tools always return serializable content.
    pub fn output_mode(&self) -> OutputMode {
        match &self.kind {
            ToolKind::Local(tool) => tool.output_mode(),
            ToolKind::Remote(_) => OutputMode::Text,
        }
    }

    pub async fn invoke(&self, input: Value, ctx: ToolContext) -> Result<ToolOutput, ToolError> {
        match &self.kind {
            ToolKind::Local(tool) => tool.run(input, ctx).await,
            ToolKind::Remote(tool) => tool.call(input, &ctx.cancel).await,
        }
    }
}

/// Collection of tools available to the session
#[derive(Clone, Default)]
pub struct ToolRegistry {
    locals: Vec<RegisteredTool>,
    remotes: Vec<RegisteredTool>,
    remote_service: Option<RemoteToolService>,
}

impl ToolRegistry {
    /// The built-in local tools
    pub fn local_tools() -> Vec<Arc<dyn Tool>> {
        vec![Arc::new(ThinkTool), Arc::new(BashTool), Arc::new(ReadImageTool)]
    }

    /// Registry of local tools only
    pub fn from_tools(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self {
            locals: tools.into_iter().map(RegisteredTool::local).collect(),
            remotes: Vec::new(),
            remote_service: None,
        }
    }

    /// Build the registry, listing remote tools once.
    ///
    /// An unreachable remote service leaves the registry with local tools
    /// only; `reconnect` may pick the remote tools up later.
    pub async fn connect(locals: Vec<Arc<dyn Tool>>, remote: Option<RemoteToolService>) -> Self {
        let mut registry = Self::from_tools(locals);
        registry.remote_service = remote;
        if let Err(e) = registry.reconnect().await {
            tracing::warn!(error = %e, "Remote tool service unavailable, continuing with local tools");
        }
        registry
    }

    /// Re-list remote tools. On failure the previous remote set is kept.
    pub async fn reconnect(&mut self) -> Result<usize, ToolError> {
        let Some(service) = &self.remote_service else {
            return Ok(0);
        };

        let specs = service.list_tools().await?;
        let local_names: HashSet<&str> = self.locals.iter().map(|t| t.name.as_str()).collect();

        let mut remotes = Vec::with_capacity(specs.len());
        for spec in specs {
            if local_names.contains(spec.name.as_str()) {
                tracing::warn!(tool = %spec.name, "Remote tool shadowed by local tool");
                continue;
            }
            remotes.push(RegisteredTool::remote(service.tool(spec)));
        }

        tracing::info!(count = remotes.len(), "Registered remote tools");
        self.remotes = remotes;
        Ok(self.remotes.len())
    }

    fn entries(&self) -> impl Iterator<Item = &RegisteredTool> {
        self.locals.iter().chain(self.remotes.iter())
    }

    pub fn lookup(&self, name: &str) -> Option<&RegisteredTool> {
        self.entries().find(|t| t.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries().map(|t| t.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.locals.len() + self.remotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get all tool definitions for LLM
    pub fn definitions(&self) -> Vec<crate::llm::ToolDefinition> {
        self.entries()
            .map(|t| crate::llm::ToolDefinition {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.input_schema.clone(),
            })
            .collect()
    }
}
