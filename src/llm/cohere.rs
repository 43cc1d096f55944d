// Cohere Provider implementation using reqwest.
// Supports Command R+, Command R, and Command Light models.
//
// Cohere's wire format differs from both the OpenAI family and Gemini:
// messages collapse to `message` + `chat_history` + `preamble` instead of
// a flat array, tool parameters are a `parameter_definitions` map instead
// of JSON Schema, and streaming responses are newline-delimited JSON
// objects tagged by `event_type`, not SSE `data:` framing.

use crate::llm::model_adapter::adapter_for_model;
use crate::llm::provider::*;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

const COHERE_API_BASE: &str = "https://api.cohere.ai/v1";

#[derive(Clone)]
pub struct CohereProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    config: Arc<RwLock<ProviderConfig>>,
    state: Arc<RwLock<ProviderState>>,
    history: Arc<RwLock<Vec<Message>>>,
    call_counter: Arc<AtomicU64>,
}

impl CohereProvider {
    pub fn new(model: String, api_key: String) -> Result<Self, ProviderError> {
        if !Self::is_supported_model(&model) {
            return Err(ProviderError::ConfigError(format!(
                "Model '{}' is not a recognized Cohere model (expected a 'command' model)",
                model
            )));
        }

        if api_key.trim().is_empty() {
            return Err(ProviderError::ConfigError(
                "Cohere API key must not be empty".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            config: Arc::new(RwLock::new(ProviderConfig::default())),
            state: Arc::new(RwLock::new(ProviderState::default())),
            history: Arc::new(RwLock::new(Vec::new())),
            call_counter: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Embed/rerank models don't support chat or tools; only Command
    /// models do.
    fn is_supported_model(model: &str) -> bool {
        let lower = model.to_lowercase();
        lower.contains("command") && !lower.contains("embed") && !lower.contains("rerank")
    }

    fn next_call_id(&self) -> String {
        let idx = self.call_counter.fetch_add(1, Ordering::SeqCst);
        format!("cohere_call_{}", idx)
    }

    /// Collapse message history into Cohere's `message` / `chat_history` /
    /// `preamble` shape: system content becomes the preamble, the last
    /// user turn becomes `message`, everything else becomes history.
    fn build_request_body(&self, history: &[Message], tools: Option<&[Tool]>) -> CohereChatRequest {
        let mut preamble = String::new();
        let mut chat_history = Vec::new();
        let mut pending_user: Option<String> = None;

        for msg in history {
            match msg.role {
                Role::System => {
                    if !preamble.is_empty() {
                        preamble.push('\n');
                    }
                    preamble.push_str(&msg.content);
                }
                Role::User => {
                    if let Some(prev) = pending_user.take() {
                        chat_history.push(CohereChatTurn {
                            role: "USER".to_string(),
                            message: prev,
                        });
                    }
                    pending_user = Some(msg.content.clone());
                }
                Role::Assistant => {
                    if let Some(prev) = pending_user.take() {
                        chat_history.push(CohereChatTurn {
                            role: "USER".to_string(),
                            message: prev,
                        });
                    }
                    chat_history.push(CohereChatTurn {
                        role: "CHATBOT".to_string(),
                        message: msg.content.clone(),
                    });
                }
                Role::Tool => {
                    // Cohere's v1 chat API has no first-class tool-result
                    // turn; fold the result back in as a chatbot-visible
                    // observation so the model can react to it.
                    chat_history.push(CohereChatTurn {
                        role: "CHATBOT".to_string(),
                        message: format!("[tool result] {}", msg.content),
                    });
                }
            }
        }

        CohereChatRequest {
            model: self.model.clone(),
            message: pending_user.unwrap_or_else(|| "Hello".to_string()),
            chat_history: if chat_history.is_empty() {
                None
            } else {
                Some(chat_history)
            },
            preamble: if preamble.is_empty() {
                None
            } else {
                Some(preamble)
            },
            tools: tools.map(Self::convert_tools),
            stream: true,
        }
    }

    fn convert_tools(tools: &[Tool]) -> Vec<CohereTool> {
        tools
            .iter()
            .map(|tool| {
                let params = tool.parameters.clone();
                let properties = params
                    .get("properties")
                    .and_then(|p| p.as_object())
                    .cloned()
                    .unwrap_or_default();
                let required: Vec<String> = params
                    .get("required")
                    .and_then(|r| r.as_array())
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|v| v.as_str().map(|s| s.to_string()))
                            .collect()
                    })
                    .unwrap_or_default();

                let mut parameter_definitions = serde_json::Map::new();
                for (name, info) in properties {
                    parameter_definitions.insert(
                        name.clone(),
                        serde_json::json!({
                            "description": info.get("description").and_then(|d| d.as_str()).unwrap_or(""),
                            "type": info.get("type").and_then(|t| t.as_str()).unwrap_or("string"),
                            "required": required.contains(&name),
                        }),
                    );
                }

                CohereTool {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameter_definitions: serde_json::Value::Object(parameter_definitions),
                }
            })
            .collect()
    }

    fn parse_tool_calls(&self, raw: &[CohereToolCall]) -> Vec<ToolCall> {
        raw.iter()
            .map(|tc| ToolCall {
                id: self.next_call_id(),
                name: tc.name.clone(),
                arguments: tc.parameters.clone(),
            })
            .collect()
    }

    fn update_usage_state(&self, usage: &CohereUsage) {
        if let Ok(mut state) = self.state.write() {
            state.input_tokens += usage.input_tokens.unwrap_or(0.0) as u64;
            state.output_tokens += usage.output_tokens.unwrap_or(0.0) as u64;
            state.request_count += 1;
            state.last_request_time = Some(std::time::SystemTime::now());
        }
    }

    fn convert_usage(usage: &CohereUsage) -> TokenUsage {
        TokenUsage {
            input_tokens: usage.input_tokens.unwrap_or(0.0) as u32,
            output_tokens: usage.output_tokens.unwrap_or(0.0) as u32,
            cached_tokens: 0,
        }
    }

}

/// Drain one NDJSON-framed HTTP response body, calling `on_chunk` for
/// every complete line. Cohere's streaming wire format has no `data:`
/// prefix to split on, just one JSON object per line.
async fn read_ndjson_lines<F: FnMut(&str)>(
    mut byte_stream: impl futures::Stream<Item = reqwest::Result<bytes::Bytes>> + Unpin,
    mut on_chunk: F,
) -> Result<(), ProviderError> {
    let mut buffer = String::new();
    while let Some(chunk) = byte_stream.next().await {
        let bytes = chunk.map_err(|e| ProviderError::ApiError(e.to_string()))?;
        buffer.push_str(&String::from_utf8_lossy(&bytes));

        while let Some(pos) = buffer.find('\n') {
            let line = buffer[..pos].trim().to_string();
            buffer.drain(..=pos);
            if !line.is_empty() {
                on_chunk(&line);
            }
        }
    }
    let tail = buffer.trim().to_string();
    if !tail.is_empty() {
        on_chunk(&tail);
    }
    Ok(())
}

#[async_trait::async_trait]
impl LLMProvider for CohereProvider {
    fn create(model: String, api_key: String) -> Result<Self, ProviderError> {
        Self::new(model, api_key)
    }

    fn state(&self) -> ProviderState {
        self.state.read().map(|s| s.clone()).unwrap_or_default()
    }

    fn config(&self) -> ProviderConfig {
        self.config.read().map(|c| c.clone()).unwrap_or_default()
    }

    fn update_config(&self, f: impl FnOnce(&mut ProviderConfig)) {
        if let Ok(mut config) = self.config.write() {
            f(&mut config);
        }
    }

    async fn chat(
        &self,
        prompt: &str,
    ) -> Result<
        Pin<Box<dyn futures::Stream<Item = Result<StreamChunk, ProviderError>> + Send>>,
        ProviderError,
    > {
        let cfg = self.config();
        let mut history = Vec::new();

        if let Some(system_prompt) = &cfg.system_prompt {
            history.push(Message {
                role: Role::System,
                content: system_prompt.clone(),
                tool_call_id: None,
                tool_calls: None,
                is_error: false,
            });
        }

        history.push(Message {
            role: Role::User,
            content: prompt.to_string(),
            tool_call_id: None,
            tool_calls: None,
            is_error: false,
        });

        let request_body = self.build_request_body(&history, None);

        let response = self
            .client
            .post(format!("{}/chat", COHERE_API_BASE))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| ProviderError::ApiError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::ApiError(format!(
                "Cohere HTTP {}: {}",
                status, text
            )));
        }

        let usage_state = self.state.clone();
        let byte_stream = response.bytes_stream();

        let output_stream = async_stream::stream! {
            let mut full_content = String::new();
            let mut done = false;

            let result = read_ndjson_lines(byte_stream, |line| {
                if done {
                    return;
                }
                match serde_json::from_str::<CohereStreamEvent>(line) {
                    Ok(event) => match event.event_type.as_str() {
                        "text-generation" => {
                            if let Some(text) = event.text {
                                full_content.push_str(&text);
                            }
                        }
                        "stream-end" => {
                            done = true;
                        }
                        _ => {}
                    },
                    Err(_) => {}
                }
            })
            .await;

            if let Err(err) = result {
                yield Err(err);
                return;
            }

            if !full_content.is_empty() {
                yield Ok(StreamChunk::Content(full_content.clone()));
            }

            if let Ok(mut state) = usage_state.write() {
                state.request_count += 1;
                state.last_request_time = Some(std::time::SystemTime::now());
            }

            yield Ok(StreamChunk::Done {
                finish_reason: FinishReason::Stop,
                usage: TokenUsage::default(),
                full_content,
            });
        };

        Ok(Box::pin(output_stream))
    }

    async fn chat_loop(
        &self,
        mut history: Vec<Message>,
        tools: Option<Vec<Tool>>,
    ) -> Result<ChatLoopHandle, ProviderError> {
        let (event_tx, event_rx) = mpsc::unbounded_channel::<Result<LoopStep, ProviderError>>();
        let (tool_result_tx, mut tool_result_rx) =
            mpsc::unbounded_channel::<ToolResultSubmission>();

        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let cfg = self.config();
        let history_store = self.history.clone();
        let provider_clone = self.clone();

        tokio::spawn(async move {
            let mut accumulated_usage = TokenUsage::default();
            let mut all_tool_calls: Vec<ToolCall> = Vec::new();
            let tools_opt = tools;

            loop {
                history = prune_tool_turns(&history, cfg.max_tool_turns);

                let request_body = provider_clone.build_request_body(&history, tools_opt.as_deref());

                let response = match client
                    .post(format!("{}/chat", COHERE_API_BASE))
                    .header("Authorization", format!("Bearer {}", api_key))
                    .header("Content-Type", "application/json")
                    .json(&request_body)
                    .send()
                    .await
                {
                    Ok(r) => r,
                    Err(e) => {
                        let _ = event_tx.send(Err(ProviderError::ApiError(e.to_string())));
                        break;
                    }
                };

                if !response.status().is_success() {
                    let status = response.status();
                    let text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    let _ = event_tx.send(Err(ProviderError::ApiError(format!(
                        "Cohere HTTP {}: {}",
                        status, text
                    ))));
                    break;
                }

                let byte_stream = response.bytes_stream();

                let mut content_accumulator = String::new();
                let mut pending_tool_calls: Vec<ToolCall> = Vec::new();
                let mut loop_usage: Option<CohereUsage> = None;

                let read_result = read_ndjson_lines(byte_stream, |line| {
                    match serde_json::from_str::<CohereStreamEvent>(line) {
                        Ok(event) => match event.event_type.as_str() {
                            "text-generation" => {
                                if let Some(text) = event.text {
                                    if !text.is_empty() {
                                        content_accumulator.push_str(&text);
                                        let _ = event_tx.send(Ok(LoopStep::Content(text)));
                                    }
                                }
                            }
                            "tool-calls-generation" => {
                                if let Some(raw) = event.tool_calls {
                                    pending_tool_calls.extend(provider_clone.parse_tool_calls(&raw));
                                }
                            }
                            "stream-end" => {
                                if let Some(response) = event.response {
                                    loop_usage = response.meta.and_then(|m| m.billed_units);
                                    if pending_tool_calls.is_empty() {
                                        if let Some(raw) = response.tool_calls {
                                            pending_tool_calls
                                                .extend(provider_clone.parse_tool_calls(&raw));
                                        }
                                    }
                                }
                            }
                            _ => {}
                        },
                        Err(_) => {}
                    }
                })
                .await;

                if let Err(err) = read_result {
                    let _ = event_tx.send(Err(err));
                    break;
                }

                if let Some(usage) = loop_usage {
                    provider_clone.update_usage_state(&usage);
                    let token_usage = Self::convert_usage(&usage);
                    accumulated_usage.input_tokens += token_usage.input_tokens;
                    accumulated_usage.output_tokens += token_usage.output_tokens;
                }

                let parsed = adapter_for_model(&provider_clone.model)
                    .parse(&content_accumulator, pending_tool_calls.clone());
                content_accumulator = parsed.content;
                let pending_tool_calls = parsed.tool_calls;

                if !pending_tool_calls.is_empty() {
                    all_tool_calls.extend(pending_tool_calls.iter().cloned());

                    history.push(Message {
                        role: Role::Assistant,
                        content: content_accumulator.clone(),
                        tool_call_id: None,
                        tool_calls: Some(pending_tool_calls.clone()),
                        is_error: false,
                    });

                    let _ = event_tx.send(Ok(LoopStep::ToolCallsRequested {
                        tool_calls: pending_tool_calls.clone(),
                        content: content_accumulator.clone(),
                    }));

                    match tool_result_rx.recv().await {
                        Some(submission) => {
                            let _ = event_tx.send(Ok(LoopStep::ToolResultsReceived {
                                count: submission.results.len(),
                            }));

                            for result in submission.results {
                                history.push(Message {
                                    role: Role::Tool,
                                    is_error: result.is_error,
                                    content: result.content.clone(),
                                    tool_call_id: Some(result.tool_call_id.clone()),
                                    tool_calls: None,
                                });
                            }

                            continue;
                        }
                        None => {
                            break;
                        }
                    }
                } else {
                    history.push(Message {
                        role: Role::Assistant,
                        content: content_accumulator.clone(),
                        tool_call_id: None,
                        tool_calls: None,
                        is_error: false,
                    });

                    let _ = event_tx.send(Ok(LoopStep::Done {
                        content: content_accumulator,
                        finish_reason: FinishReason::Stop,
                        total_usage: accumulated_usage.clone(),
                        all_tool_calls: all_tool_calls.clone(),
                    }));
                    break;
                }
            }

            if let Ok(mut store) = history_store.write() {
                *store = history;
            }
        });

        Ok(ChatLoopHandle::new(event_rx, tool_result_tx))
    }

    fn prompt_cache(&mut self, _cache_prompt: String) -> Result<(), ProviderError> {
        Err(ProviderError::CachingNotSupported)
    }

    async fn compact(&self, _history: Vec<Message>) -> Result<Vec<Message>, ProviderError> {
        Err(ProviderError::ApiError(
            "Cohere compact not implemented".to_string(),
        ))
    }

    fn get_history(&self) -> Vec<Message> {
        self.history.read().map(|h| h.clone()).unwrap_or_default()
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct CohereChatRequest {
    model: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    chat_history: Option<Vec<CohereChatTurn>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    preamble: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<CohereTool>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct CohereChatTurn {
    role: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct CohereTool {
    name: String,
    description: String,
    parameter_definitions: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
struct CohereToolCall {
    name: String,
    #[serde(default)]
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CohereStreamEvent {
    event_type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<CohereToolCall>>,
    #[serde(default)]
    response: Option<CohereStreamEndResponse>,
}

#[derive(Debug, Deserialize)]
struct CohereStreamEndResponse {
    #[serde(default)]
    tool_calls: Option<Vec<CohereToolCall>>,
    #[serde(default)]
    meta: Option<CohereMeta>,
}

#[derive(Debug, Deserialize)]
struct CohereMeta {
    #[serde(default)]
    billed_units: Option<CohereUsage>,
}

#[derive(Debug, Clone, Deserialize)]
struct CohereUsage {
    #[serde(default)]
    input_tokens: Option<f64>,
    #[serde(default)]
    output_tokens: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_supported_model() {
        assert!(CohereProvider::is_supported_model("command-r-plus"));
        assert!(CohereProvider::is_supported_model("command-r"));
        assert!(!CohereProvider::is_supported_model("embed-english-v3.0"));
        assert!(!CohereProvider::is_supported_model("rerank-english-v3.0"));
    }

    #[test]
    fn test_build_request_body_collapses_history() {
        let provider = CohereProvider::new("command-r-plus".to_string(), "x".repeat(32)).unwrap();
        let history = vec![
            Message {
                role: Role::System,
                content: "Be terse.".to_string(),
                tool_call_id: None,
                tool_calls: None,
                is_error: false,
            },
            Message {
                role: Role::User,
                content: "hi".to_string(),
                tool_call_id: None,
                tool_calls: None,
                is_error: false,
            },
            Message {
                role: Role::Assistant,
                content: "hello".to_string(),
                tool_call_id: None,
                tool_calls: None,
                is_error: false,
            },
            Message {
                role: Role::User,
                content: "how are you".to_string(),
                tool_call_id: None,
                tool_calls: None,
                is_error: false,
            },
        ];

        let request = provider.build_request_body(&history, None);
        assert_eq!(request.message, "how are you");
        assert_eq!(request.preamble.as_deref(), Some("Be terse."));
        let history = request.chat_history.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, "USER");
        assert_eq!(history[1].role, "CHATBOT");
    }

    #[test]
    fn test_convert_tools_builds_parameter_definitions() {
        let tools = vec![Tool::new(
            "read_file",
            "Read a file",
            "Read a file",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string", "description": "path"}
                },
                "required": ["file_path"]
            }),
        )];

        let cohere_tools = CohereProvider::convert_tools(&tools);
        assert_eq!(cohere_tools.len(), 1);
        let def = cohere_tools[0]
            .parameter_definitions
            .get("file_path")
            .unwrap();
        assert_eq!(def.get("required").unwrap(), true);
    }
}
