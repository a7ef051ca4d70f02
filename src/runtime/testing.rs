//! Mock implementations for testing
//!
//! Scripted model clients and recording tools, so turns can be driven
//! without network or subprocess I/O.

use super::traits::LlmClient;
use crate::conversation::ContentPart;
use crate::llm::{
    LlmError, LlmRequest, LlmResponse, LlmStream, ModelInfo, RawStep, Usage,
};
use crate::tools::{OutputMode, Tool, ToolContext, ToolError, ToolOutput, ToolRegistry};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

// ============================================================================
// Response builders
// ============================================================================

pub fn text_response(text: &str) -> LlmResponse {
    LlmResponse {
        content: vec![ContentPart::text(text)],
        end_turn: true,
        usage: Usage::default(),
    }
}

/// Response proposing the given `(id, name, input)` calls
pub fn tool_response(text: &str, calls: &[(&str, &str, Value)]) -> LlmResponse {
    let mut content = Vec::new();
    if !text.is_empty() {
        content.push(ContentPart::text(text));
    }
    content.extend(calls.iter().map(|(id, name, input)| ContentPart::ToolUse {
        id: (*id).to_string(),
        name: (*name).to_string(),
        input: input.clone(),
    }));
    LlmResponse {
        content,
        end_turn: false,
        usage: Usage::default(),
    }
}

// ============================================================================
// Mock LLM Client
// ============================================================================

enum Script {
    Steps {
        steps: Vec<Result<RawStep, LlmError>>,
        /// Never finish after the scripted steps
        hang: bool,
    },
    OpenError(LlmError),
    Panic,
}

/// LLM client that plays back queued step scripts, one per model step
pub struct MockLlmClient {
    scripts: Mutex<VecDeque<Script>>,
    model_id: Mutex<String>,
    requests: Mutex<Vec<LlmRequest>>,
    reconnects: AtomicUsize,
    /// Notified each time a stream is opened
    pub stream_opened: Arc<Notify>,
}

impl MockLlmClient {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            model_id: Mutex::new(model_id.into()),
            requests: Mutex::new(Vec::new()),
            reconnects: AtomicUsize::new(0),
            stream_opened: Arc::new(Notify::new()),
        }
    }

    fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub fn queue_steps(&self, steps: Vec<RawStep>) {
        self.push(Script::Steps {
            steps: steps.into_iter().map(Ok).collect(),
            hang: false,
        });
    }

    /// Queue a completed response, preceded by text deltas of its text
    pub fn queue_response(&self, response: LlmResponse) {
        let mut steps: Vec<RawStep> = response
            .text()
            .split_inclusive(' ')
            .map(|chunk| RawStep::TextDelta(chunk.to_string()))
            .collect();
        steps.push(RawStep::Completed(response));
        self.queue_steps(steps);
    }

    pub fn queue_text(&self, text: &str) {
        self.queue_response(text_response(text));
    }

    /// Queue steps after which the stream stays open forever
    pub fn queue_hanging(&self, steps: Vec<RawStep>) {
        self.push(Script::Steps {
            steps: steps.into_iter().map(Ok).collect(),
            hang: true,
        });
    }

    /// Queue a failure to open the stream
    pub fn queue_error(&self, error: LlmError) {
        self.push(Script::OpenError(error));
    }

    /// Queue a provider call that panics the calling task
    pub fn queue_panic(&self) {
        self.push(Script::Panic);
    }

    /// Queue steps followed by a mid-stream failure
    pub fn queue_stream_error(&self, steps: Vec<RawStep>, error: LlmError) {
        let mut steps: Vec<_> = steps.into_iter().map(Ok).collect();
        steps.push(Err(error));
        self.push(Script::Steps { steps, hang: false });
    }

    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn reconnect_count(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        use futures::StreamExt;

        let mut stream = self.stream(request).await?;
        while let Some(step) = stream.next().await {
            if let RawStep::Completed(response) = step? {
                return Ok(response);
            }
        }
        Err(LlmError::stream("Mock script has no completed step"))
    }

    async fn stream(&self, request: &LlmRequest) -> Result<LlmStream, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.stream_opened.notify_one();

        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::network("No mock response queued"))?;

        match script {
            Script::OpenError(error) => Err(error),
            Script::Panic => panic!("mock provider panicked"),
            Script::Steps { steps, hang: false } => Ok(Box::pin(futures::stream::iter(steps))),
            Script::Steps { steps, hang: true } => {
                use futures::StreamExt;
                Ok(Box::pin(
                    futures::stream::iter(steps).chain(futures::stream::pending()),
                ))
            }
        }
    }

    async fn model_id(&self) -> String {
        self.model_id.lock().unwrap().clone()
    }

    async fn switch_model(&self, query: &str) -> Result<String, LlmError> {
        if query.starts_with("unknown") {
            return Err(LlmError::invalid_request(format!("Unknown model `{query}`")));
        }
        query.clone_into(&mut self.model_id.lock().unwrap());
        Ok(query.to_string())
    }

    async fn reconnect(&self) -> Result<(), LlmError> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn available_models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo {
            id: self.model_id.lock().unwrap().clone(),
            provider: "mock".to_string(),
            description: "Scripted responses".to_string(),
            context_window: 1000,
        }]
    }
}

// ============================================================================
// Mock Tools
// ============================================================================

#[derive(Debug, Clone)]
pub enum MockBehavior {
    Reply(ToolOutput),
    Fail(String),
    Panic,
    Interrupt,
    /// Block until cancelled
    Hang,
}

/// Tool with scripted behavior that records every invocation
pub struct MockTool {
    name: String,
    schema: Value,
    output_mode: OutputMode,
    behavior: MockBehavior,
    delay: Duration,
    invocations: Mutex<Vec<Value>>,
    /// Notified when an invocation starts
    pub started: Arc<Notify>,
}

impl MockTool {
    pub fn new(name: &str, behavior: MockBehavior) -> Self {
        Self {
            name: name.to_string(),
            schema: json!({"type": "object", "properties": {}}),
            output_mode: OutputMode::Text,
            behavior,
            delay: Duration::ZERO,
            invocations: Mutex::new(Vec::new()),
            started: Arc::new(Notify::new()),
        }
    }

    pub fn replying(name: &str, output: &str) -> Self {
        Self::new(name, MockBehavior::Reply(ToolOutput::success(output)))
    }

    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn with_output_mode(mut self, mode: OutputMode) -> Self {
        self.output_mode = mode;
        self
    }

    pub fn invocations(&self) -> Vec<Value> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl Tool for MockTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("Mock {}", self.name)
    }

    fn input_schema(&self) -> Value {
        self.schema.clone()
    }

    fn output_mode(&self) -> OutputMode {
        self.output_mode
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<ToolOutput, ToolError> {
        self.invocations.lock().unwrap().push(input);
        self.started.notify_one();

        tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => return Err(ToolError::Interrupted),
            () = tokio::time::sleep(self.delay) => {}
        }

        match &self.behavior {
            MockBehavior::Reply(output) => Ok(output.clone()),
            MockBehavior::Fail(message) => Err(ToolError::Failed(message.clone())),
            MockBehavior::Panic => panic!("mock tool {} panicked", self.name),
            MockBehavior::Interrupt => Err(ToolError::Interrupted),
            MockBehavior::Hang => {
                ctx.cancel.cancelled().await;
                Err(ToolError::Interrupted)
            }
        }
    }
}

/// Registry holding the given mock tools
pub fn registry_of(tools: &[Arc<MockTool>]) -> ToolRegistry {
    ToolRegistry::from_tools(tools.iter().map(|t| Arc::clone(t) as Arc<dyn Tool>).collect())
}
