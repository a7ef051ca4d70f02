//! Anthropic Claude provider implementation

use super::sse::SseReader;
use super::types::{LlmRequest, LlmResponse, RawStep, Usage};
use super::{LlmError, LlmService, LlmStream};
use crate::conversation::{ContentPart, Message, MessageContent, Role};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 8192;
const STREAM_CHANNEL_CAPACITY: usize = 64;

/// Anthropic model variants
#[derive(Debug, Clone, Copy)]
pub enum AnthropicModel {
    Claude45Opus,
    Claude45Sonnet,
    Claude45Haiku,
}

impl AnthropicModel {
    pub fn api_name(self) -> &'static str {
        match self {
            AnthropicModel::Claude45Opus => "claude-opus-4-5-20251101",
            AnthropicModel::Claude45Sonnet => "claude-sonnet-4-5-20250929",
            AnthropicModel::Claude45Haiku => "claude-haiku-4-5-20251001",
        }
    }

    pub fn model_id(self) -> &'static str {
        match self {
            AnthropicModel::Claude45Opus => "claude-4.5-opus",
            AnthropicModel::Claude45Sonnet => "claude-4.5-sonnet",
            AnthropicModel::Claude45Haiku => "claude-4.5-haiku",
        }
    }
}

/// Anthropic service implementation
pub struct AnthropicService {
    client: Client,
    api_key: String,
    model: AnthropicModel,
    base_url: String,
}

impl AnthropicService {
    pub fn new(api_key: String, model: AnthropicModel, gateway: Option<&str>) -> Result<Self, LlmError> {
        let base_url = match gateway {
            Some(gw) => format!("{}/_/gateway/anthropic/v1/messages", gw.trim_end_matches('/')),
            None => "https://api.anthropic.com/v1/messages".to_string(),
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url,
        })
    }

    fn translate_request(&self, request: &LlmRequest, stream: bool) -> AnthropicRequest {
        let system = request
            .system
            .iter()
            .map(|s| AnthropicSystemBlock {
                r#type: "text",
                text: s.text.clone(),
                cache_control: s.cache.then_some(CacheControl { r#type: "ephemeral" }),
            })
            .collect();

        let tools: Vec<AnthropicTool> = request
            .tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.input_schema.clone(),
            })
            .collect();

        AnthropicRequest {
            model: self.model.api_name(),
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            messages: translate_messages(&request.messages),
            tools: if tools.is_empty() { None } else { Some(tools) },
            stream,
        }
    }

    async fn send(&self, body: &AnthropicRequest) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;
            return Err(LlmError::from_status(status, &body));
        }
        Ok(response)
    }
}

/// Convert the conversation into Anthropic's alternating-role format.
///
/// Tool messages become `tool_result` blocks on a user turn, consecutive
/// same-role messages are merged, and results whose call id never appeared
/// as a `tool_use` earlier in the payload are dropped.
fn translate_messages(messages: &[Message]) -> Vec<AnthropicMessage> {
    let mut out: Vec<AnthropicMessage> = Vec::new();
    let mut known_tool_ids: HashSet<&str> = HashSet::new();

    for message in messages {
        let (role, blocks) = match message.role {
            Role::Human => ("user", content_blocks(&message.content)),
            Role::Ai => {
                let mut blocks: Vec<AnthropicContentBlock> = content_blocks(&message.content)
                    .into_iter()
                    .filter(|block| matches!(block, AnthropicContentBlock::Text { .. }))
                    .collect();
                for call in &message.tool_calls {
                    known_tool_ids.insert(call.id.as_str());
                    blocks.push(AnthropicContentBlock::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: Value::Object(call.args.clone()),
                    });
                }
                ("assistant", blocks)
            }
            Role::Tool => {
                let Some(tool_use_id) = message.tool_call_id.as_deref() else {
                    tracing::warn!(message_id = %message.id, "Dropping tool message without call id");
                    continue;
                };
                if !known_tool_ids.contains(tool_use_id) {
                    tracing::warn!(tool_use_id, "Dropping tool result with no matching tool_use");
                    continue;
                }
                let content = match &message.content {
                    MessageContent::Text(text) => ToolResultContent::Text(text.clone()),
                    MessageContent::Parts(_) => {
                        ToolResultContent::Blocks(content_blocks(&message.content))
                    }
                };
                let block = AnthropicContentBlock::ToolResult {
                    tool_use_id: tool_use_id.to_string(),
                    content,
                    is_error: message.is_error,
                };
                ("user", vec![block])
            }
        };

        if blocks.is_empty() {
            continue;
        }

        match out.last_mut() {
            Some(last) if last.role == role => last.content.extend(blocks),
            _ => out.push(AnthropicMessage {
                role,
                content: blocks,
            }),
        }
    }

    out
}

/// Text and image blocks of a message body. Tool uses travel through
/// `tool_calls` instead.
fn content_blocks(content: &MessageContent) -> Vec<AnthropicContentBlock> {
    match content {
        MessageContent::Text(text) if text.trim().is_empty() => Vec::new(),
        MessageContent::Text(text) => vec![AnthropicContentBlock::Text { text: text.clone() }],
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } if !text.trim().is_empty() => {
                    Some(AnthropicContentBlock::Text { text: text.clone() })
                }
                ContentPart::Image { media_type, data } => Some(AnthropicContentBlock::Image {
                    source: AnthropicImageSource {
                        r#type: "base64".to_string(),
                        media_type: media_type.clone(),
                        data: data.clone(),
                    },
                }),
                ContentPart::Other { data } => Some(AnthropicContentBlock::Text {
                    text: data.to_string(),
                }),
                ContentPart::Text { .. } | ContentPart::ToolUse { .. } => None,
            })
            .collect(),
    }
}

fn normalize_response(resp: AnthropicResponse) -> LlmResponse {
    let content = resp
        .content
        .into_iter()
        .filter_map(|block| match block {
            AnthropicContentBlock::Text { text } => Some(ContentPart::Text { text }),
            AnthropicContentBlock::ToolUse { id, name, input } => {
                Some(ContentPart::ToolUse { id, name, input })
            }
            // Never produced by the model
            AnthropicContentBlock::Image { .. } | AnthropicContentBlock::ToolResult { .. } => None,
        })
        .collect();

    LlmResponse {
        content,
        end_turn: resp.stop_reason.as_deref() == Some("end_turn"),
        usage: Usage {
            input_tokens: resp.usage.input_tokens,
            output_tokens: resp.usage.output_tokens,
            cache_creation_tokens: resp.usage.cache_creation_input_tokens.unwrap_or(0),
            cache_read_tokens: resp.usage.cache_read_input_tokens.unwrap_or(0),
        },
    }
}

#[async_trait]
impl LlmService for AnthropicService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let body = self.translate_request(request, false);
        let response = self.send(&body).await?;
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;

        let parsed: AnthropicResponse = serde_json::from_str(&text).map_err(|e| {
            LlmError::unknown(format!("Failed to parse response: {e} - body: {text}"))
        })?;

        Ok(normalize_response(parsed))
    }

    async fn stream(&self, request: &LlmRequest) -> Result<LlmStream, LlmError> {
        let body = self.translate_request(request, true);
        let response = self.send(&body).await?;
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

        // Dropping the receiver ends the task and closes the connection
        tokio::spawn(async move {
            let mut reader = SseReader::new(Box::pin(response.bytes_stream()));
            let mut assembler = StreamAssembler::default();

            while let Some(data) = reader.next_data().await {
                match data.and_then(|data| assembler.apply(&data)) {
                    Ok(steps) => {
                        for step in steps {
                            let done = matches!(step, RawStep::Completed(_));
                            if tx.send(Ok(step)).await.is_err() || done {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }

            let _ = tx
                .send(Err(LlmError::stream("Stream ended before message_stop")))
                .await;
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    fn model_id(&self) -> &str {
        self.model.model_id()
    }

    fn context_window(&self) -> usize {
        200_000
    }
}

// Streaming assembly

enum PendingBlock {
    Text(String),
    ToolUse { id: String, name: String, json: String },
    Ignored,
}

/// Folds typed stream events into raw steps and the final response.
#[derive(Default)]
struct StreamAssembler {
    blocks: BTreeMap<usize, PendingBlock>,
    stop_reason: Option<String>,
    usage: Usage,
}

impl StreamAssembler {
    fn apply(&mut self, data: &str) -> Result<Vec<RawStep>, LlmError> {
        let event = match serde_json::from_str::<SseEvent>(data) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to parse Anthropic stream event");
                return Ok(Vec::new());
            }
        };

        let mut steps = Vec::new();
        match event {
            SseEvent::MessageStart { message } => {
                if let Some(usage) = message.usage {
                    self.usage.input_tokens = usage.input_tokens;
                    self.usage.cache_creation_tokens = usage.cache_creation_input_tokens.unwrap_or(0);
                    self.usage.cache_read_tokens = usage.cache_read_input_tokens.unwrap_or(0);
                }
            }
            SseEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                let block = match content_block {
                    BlockStart::Text { text } => {
                        if !text.is_empty() {
                            steps.push(RawStep::TextDelta(text.clone()));
                        }
                        PendingBlock::Text(text)
                    }
                    BlockStart::ToolUse { id, name } => {
                        steps.push(RawStep::ToolUseStart {
                            id: id.clone(),
                            name: name.clone(),
                        });
                        PendingBlock::ToolUse {
                            id,
                            name,
                            json: String::new(),
                        }
                    }
                    BlockStart::Unknown => PendingBlock::Ignored,
                };
                self.blocks.insert(index, block);
            }
            SseEvent::ContentBlockDelta { index, delta } => {
                match (self.blocks.get_mut(&index), delta) {
                    (Some(PendingBlock::Text(buffer)), Delta::TextDelta { text }) => {
                        buffer.push_str(&text);
                        steps.push(RawStep::TextDelta(text));
                    }
                    (Some(PendingBlock::ToolUse { json, .. }), Delta::InputJsonDelta { partial_json }) => {
                        json.push_str(&partial_json);
                        steps.push(RawStep::ToolInputDelta(partial_json));
                    }
                    _ => {}
                }
            }
            SseEvent::MessageDelta { delta, usage } => {
                if let Some(reason) = delta.stop_reason {
                    self.stop_reason = Some(reason);
                }
                if let Some(usage) = usage {
                    self.usage.output_tokens = usage.output_tokens;
                }
            }
            SseEvent::MessageStop => {
                steps.push(RawStep::Completed(self.finish()));
            }
            SseEvent::Error { error } => {
                return Err(LlmError::server_error(format!(
                    "Anthropic stream error ({}): {}",
                    error.error_type, error.message
                )));
            }
            SseEvent::ContentBlockStop { .. } | SseEvent::Ping | SseEvent::Unknown => {}
        }

        Ok(steps)
    }

    fn finish(&mut self) -> LlmResponse {
        let content = std::mem::take(&mut self.blocks)
            .into_values()
            .filter_map(|block| match block {
                PendingBlock::Text(text) => Some(ContentPart::Text { text }),
                PendingBlock::ToolUse { id, name, json } => {
                    let input = if json.trim().is_empty() {
                        json!({})
                    } else {
                        serde_json::from_str(&json).unwrap_or_else(|e| {
                            tracing::warn!(tool = %name, error = %e, "Unparseable tool input, treating as empty");
                            json!({})
                        })
                    };
                    Some(ContentPart::ToolUse { id, name, input })
                }
                PendingBlock::Ignored => None,
            })
            .collect();

        LlmResponse {
            content,
            end_turn: self.stop_reason.as_deref() == Some("end_turn"),
            usage: std::mem::take(&mut self.usage),
        }
    }
}

// Anthropic API types

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: &'static str,
    max_tokens: u32,
    system: Vec<AnthropicSystemBlock>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct AnthropicSystemBlock {
    r#type: &'static str,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_control: Option<CacheControl>,
}

#[derive(Debug, Serialize)]
struct CacheControl {
    r#type: &'static str,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text {
        text: String,
    },
    Image {
        source: AnthropicImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: ToolResultContent,
        #[serde(default)]
        is_error: bool,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ToolResultContent {
    Text(String),
    Blocks(Vec<AnthropicContentBlock>),
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicImageSource {
    r#type: String,
    media_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    cache_creation_input_tokens: Option<u64>,
    cache_read_input_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SseEvent {
    MessageStart {
        message: MessageStartInfo,
    },
    ContentBlockStart {
        index: usize,
        content_block: BlockStart,
    },
    ContentBlockDelta {
        index: usize,
        delta: Delta,
    },
    ContentBlockStop {
        #[allow(dead_code)] // Part of the wire format
        index: usize,
    },
    MessageDelta {
        delta: MessageDeltaInfo,
        #[serde(default)]
        usage: Option<AnthropicUsage>,
    },
    MessageStop,
    Ping,
    Error {
        error: StreamError,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct MessageStartInfo {
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockStart {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta {
        text: String,
    },
    InputJsonDelta {
        partial_json: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaInfo {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(rename = "type", default)]
    error_type: String,
    #[serde(default)]
    message: String,
}
