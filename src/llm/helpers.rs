//! Helper functions for common LLM interaction patterns
//!
//! This module provides high-level helpers that wrap common patterns
//! like chat loops with tool execution.

use super::rate_limiter::RateLimiter;
use super::registry::{not_found_message, ToolRegistry};
use super::{LLMProvider, LoopAction, LoopDetector, LoopStep, Message, Tool, ToolCall, ToolResult};
use crate::log;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;

/// Maximum number of tool-calling rounds a single chat loop may run before
/// it is aborted, even if no other termination condition fires.
pub const MAX_ITERATIONS: usize = 12;

/// Tool executor function type
///
/// Takes a ToolCall and returns a Future that resolves to a Result<String, String>
/// - Ok(String) for successful execution with output
/// - Err(String) for execution errors
pub type ToolExecutor =
    Box<dyn Fn(ToolCall) -> Pin<Box<dyn Future<Output = Result<String, String>> + Send>> + Send>;

/// Event callback for streaming content
///
/// Called when the LLM generates text content
pub type ContentCallback = Box<dyn Fn(&str) + Send>;

/// Callback for when tool calls are requested
///
/// Called before tool execution, allows for logging/UI updates
pub type ToolCallCallback = Box<dyn Fn(&[ToolCall]) + Send>;

/// Callback for when tool results are ready
///
/// Called after tool execution, before submitting to LLM
pub type ToolResultCallback = Box<dyn Fn(&[ToolResult]) + Send>;

/// Confirmation gate invoked before executing a tool call when `autorun`
/// is false. Returns `true` to proceed, `false` to cancel that call.
pub type ConfirmCallback = Box<dyn Fn(&str, &serde_json::Value) -> bool + Send + Sync>;

/// Configuration for chat_loop_with_tools
pub struct ChatLoopConfig {
    /// Tool executors by tool name (legacy, used when registry is None)
    pub tool_executors: HashMap<String, ToolExecutor>,
    /// Tool registry for lazy loading (preferred over tool_executors)
    pub registry: Option<ToolRegistry>,
    /// Optional callback for streaming content
    pub on_content: Option<ContentCallback>,
    /// Optional callback when tool calls are requested
    pub on_tool_calls: Option<ToolCallCallback>,
    /// Optional callback when tool results are ready
    pub on_tool_results: Option<ToolResultCallback>,
    /// Optional callback for thinking content (Claude, o1, etc.)
    pub on_thinking: Option<ContentCallback>,
    /// Maximum number of tool call rounds (default: [`MAX_ITERATIONS`])
    pub max_rounds: usize,
    /// Loop detector guarding against repetitive tool-calling patterns.
    /// Disabled (`None`) by default so callers opt in explicitly.
    pub loop_detector: Option<LoopDetector>,
    /// When `false`, every tool call must be confirmed via `on_confirm`
    /// before it executes. Defaults to `true`, matching `LegacyConfig`'s
    /// default.
    pub autorun: bool,
    /// Confirmation gate consulted when `autorun` is `false`. A call with
    /// no callback set is treated as refused, never silently executed.
    pub on_confirm: Option<ConfirmCallback>,
    /// Shared rate limiter gating provider dispatch. Disabled (`None`) by
    /// default so callers opt in explicitly.
    pub rate_limiter: Option<Arc<RateLimiter>>,
}

impl ChatLoopConfig {
    /// Create a new configuration
    pub fn new() -> Self {
        Self {
            tool_executors: HashMap::new(),
            registry: None,
            on_content: None,
            on_tool_calls: None,
            on_tool_results: None,
            on_thinking: None,
            max_rounds: MAX_ITERATIONS,
            loop_detector: None,
            autorun: true,
            on_confirm: None,
            rate_limiter: None,
        }
    }

    /// Use a ToolRegistry for lazy tool loading
    ///
    /// When set, the registry handles all tool execution automatically.
    pub fn with_registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Guard the loop with a [`LoopDetector`], terminating or warning when
    /// the model repeats the same tool calls.
    pub fn with_loop_detector(mut self, detector: LoopDetector) -> Self {
        self.loop_detector = Some(detector);
        self
    }

    /// Register a tool executor (legacy method)
    ///
    /// Prefer `with_registry()` for new code.
    pub fn with_tool<F, Fut>(mut self, name: impl Into<String>, executor: F) -> Self
    where
        F: Fn(ToolCall) -> Fut + Send + 'static,
        Fut: Future<Output = Result<String, String>> + Send + 'static,
    {
        self.tool_executors
            .insert(name.into(), Box::new(move |call| Box::pin(executor(call))));
        self
    }

    /// Set content callback
    pub fn on_content<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + 'static,
    {
        self.on_content = Some(Box::new(callback));
        self
    }

    /// Set tool call callback
    pub fn on_tool_calls<F>(mut self, callback: F) -> Self
    where
        F: Fn(&[ToolCall]) + Send + 'static,
    {
        self.on_tool_calls = Some(Box::new(callback));
        self
    }

    /// Set tool result callback
    pub fn on_tool_results<F>(mut self, callback: F) -> Self
    where
        F: Fn(&[ToolResult]) + Send + 'static,
    {
        self.on_tool_results = Some(Box::new(callback));
        self
    }

    /// Set thinking callback
    pub fn on_thinking<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + 'static,
    {
        self.on_thinking = Some(Box::new(callback));
        self
    }

    /// Set maximum rounds
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Gate tool execution on a confirmation callback instead of running
    /// every requested tool call automatically.
    pub fn with_autorun(mut self, autorun: bool) -> Self {
        self.autorun = autorun;
        self
    }

    /// Set the confirmation callback consulted when `autorun` is `false`.
    pub fn on_confirm<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &serde_json::Value) -> bool + Send + Sync + 'static,
    {
        self.on_confirm = Some(Box::new(callback));
        self
    }

    /// Share a [`RateLimiter`] across provider dispatches for this loop.
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }
}

impl Default for ChatLoopConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Response from chat_loop_with_tools
#[derive(Debug, Clone)]
pub struct ChatLoopResponse {
    /// Final content from the LLM
    pub content: String,
    /// Total token usage
    pub usage: super::TokenUsage,
    /// All tool calls made during the conversation
    pub all_tool_calls: Vec<ToolCall>,
    /// Number of rounds executed
    pub rounds: usize,
}

/// High-level helper for running a chat loop with automatic tool execution
///
/// This function handles the entire chat loop lifecycle:
/// - Streams content to callbacks
/// - Automatically executes tools using registered executors or registry
/// - Handles multiple rounds of tool calling
/// - Returns the final result
///
/// # Example (with registry - recommended)
///
/// ```no_run
/// use agent_runtime::llm::*;
///
/// async fn example() -> Result<(), Box<dyn std::error::Error>> {
///     let provider = OpenAIProvider::create("gpt-4".to_string(), "key".to_string())?;
///     let registry = ToolRegistry::new().register_all_builtin();
///
///     let config = ChatLoopConfig::new()
///         .with_registry(registry)
///         .on_content(|text| print!("{}", text));
///
///     let response = chat_with_registry(
///         &provider,
///         vec![Message {
///             role: Role::User,
///             content: "List files in current directory".to_string(),
///             tool_call_id: None,
///             tool_calls: None,
///             is_error: false,
///         }],
///         config
///     ).await?;
///
///     println!("Done! Used {} tokens", response.usage.total());
///     Ok(())
/// }
/// ```
pub async fn chat_loop_with_tools<P: LLMProvider>(
    provider: &P,
    messages: Vec<Message>,
    tools: Vec<Tool>,
    mut config: ChatLoopConfig,
) -> Result<ChatLoopResponse, super::ProviderError> {
    log("Start chat_loop_with_tools");

    for (idx, msg) in messages.iter().enumerate() {
        log(format!("  [input:{}]  {}", idx + 1, msg));
    }

    // Determine which tools to send to LLM
    let tools_for_llm = if let Some(ref registry) = config.registry {
        registry.get_tools_for_llm()
    } else {
        tools.clone()
    };

    let (_cancel_tx, cancel_rx) = watch::channel(false);

    if let Some(ref limiter) = config.rate_limiter {
        let message_texts: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        let tool_schema_texts: Vec<String> = tools_for_llm
            .iter()
            .map(|t| t.description.clone())
            .collect();
        let tool_schema_refs: Vec<&str> = tool_schema_texts.iter().map(|s| s.as_str()).collect();
        let est = super::rate_limiter::estimate_tokens(&message_texts, &tool_schema_refs);

        match limiter.smart_delay(est, cancel_rx.clone()).await {
            super::rate_limiter::WaitOutcome::Cancelled => {
                return Err(super::ProviderError::Cancelled);
            }
            _ => {}
        }
        limiter.record(est).await;
    }

    let mut handle = provider.chat_loop(messages, Some(tools_for_llm)).await?;

    let mut full_content = String::new();
    let mut all_tool_calls = Vec::new();
    let mut rounds = 0;
    let mut total_usage = super::TokenUsage::default();

    loop {
        let event_result = handle.next().await;

        let event = match event_result {
            Some(Ok(e)) => e,
            Some(Err(e)) => return Err(e),
            None => {
                log("[error] chat_loop ended unexpectedly");
                return Err(super::ProviderError::ApiError(
                    "Chat loop ended unexpectedly".to_string(),
                ));
            }
        };

        match event {
            LoopStep::Thinking(thought) => {
                log(format!("[thinking] {}", truncate_for_log(&thought)));
                if let Some(ref callback) = config.on_thinking {
                    callback(&thought);
                }
            }
            LoopStep::Content(text) => {
                log(format!("[content] {}", truncate_for_log(&text)));
                full_content.push_str(&text);
                if let Some(ref callback) = config.on_content {
                    callback(&text);
                }
            }
            LoopStep::ToolCallsRequested {
                tool_calls,
                content,
            } => {
                rounds += 1;
                log(format!(
                    "[tool_calls] round={} content={}",
                    rounds,
                    truncate_for_log(&content)
                ));
                for call in &tool_calls {
                    log(format!("  [call] {} -> {}", call.id, call.name));
                }

                if rounds > config.max_rounds {
                    log(format!(
                        "[error] max rounds exceeded ({})",
                        config.max_rounds
                    ));
                    return Err(super::ProviderError::ApiError(format!(
                        "Maximum rounds ({}) exceeded",
                        config.max_rounds
                    )));
                }

                if !content.is_empty() {
                    full_content.push_str(&content);
                }

                if let Some(ref callback) = config.on_tool_calls {
                    callback(&tool_calls);
                }

                // Execute tools
                let mut results = Vec::new();
                for call in &tool_calls {
                    all_tool_calls.push(call.clone());

                    if let Some(ref mut detector) = config.loop_detector {
                        if let Some(detection) = detector.check(call) {
                            log(format!(
                                "[loop_detector] {} (confidence={:.2}) action={:?}",
                                detection.suggestion, detection.confidence, detection.action
                            ));
                            if detection.action == LoopAction::Terminate {
                                return Err(super::ProviderError::ApiError(format!(
                                    "Loop detected: {}",
                                    detection.suggestion
                                )));
                            }
                        }
                    }

                    if !config.autorun {
                        let confirmed = config
                            .on_confirm
                            .as_ref()
                            .map(|cb| cb(&call.name, &call.arguments))
                            .unwrap_or(false);

                        if !confirmed {
                            log(format!(
                                "[cancelled] {} ({}) — not confirmed",
                                call.id, call.name
                            ));
                            results.push(ToolResult {
                                tool_call_id: call.id.clone(),
                                content: "cancelled by user".to_string(),
                                is_error: true,
                            });
                            break;
                        }
                    }

                    let result = if let Some(ref registry) = config.registry {
                        log(format!("[exec:registry] {} ({})", call.id, call.name));
                        match registry.execute(call).await {
                            Some(result) => result,
                            None => ToolResult {
                                tool_call_id: call.id.clone(),
                                content: registry.not_found_message(&call.name),
                                is_error: true,
                            },
                        }
                    } else if let Some(executor) = config.tool_executors.get(&call.name) {
                        log(format!("[exec] {} ({})", call.id, call.name));
                        match executor(call.clone()).await {
                            Ok(output) => ToolResult {
                                tool_call_id: call.id.clone(),
                                content: output,
                                is_error: false,
                            },
                            Err(error) => ToolResult {
                                tool_call_id: call.id.clone(),
                                content: error,
                                is_error: true,
                            },
                        }
                    } else {
                        log(format!(
                            "[error] missing executor: {} ({})",
                            call.id, call.name
                        ));
                        let available: Vec<&str> =
                            config.tool_executors.keys().map(|s| s.as_str()).collect();
                        ToolResult {
                            tool_call_id: call.id.clone(),
                            content: not_found_message(&call.name, available),
                            is_error: true,
                        }
                    };

                    results.push(result);
                }

                if let Some(ref callback) = config.on_tool_results {
                    callback(&results);
                }

                for result in &results {
                    let tag = if result.is_error {
                        "[result:error]"
                    } else {
                        "[result]"
                    };
                    log(format!(
                        "{} {} {}",
                        tag,
                        result.tool_call_id,
                        truncate_for_log(&result.content)
                    ));
                }

                if let Some(ref limiter) = config.rate_limiter {
                    let result_texts: Vec<&str> =
                        results.iter().map(|r| r.content.as_str()).collect();
                    let est = super::rate_limiter::estimate_tokens(&result_texts, &[]);
                    match limiter.smart_delay(est, cancel_rx.clone()).await {
                        super::rate_limiter::WaitOutcome::Cancelled => {
                            return Err(super::ProviderError::Cancelled);
                        }
                        _ => {}
                    }
                    limiter.record(est).await;
                }

                handle.submit_tool_results(results)?;
            }
            LoopStep::ToolResultsReceived { .. } => {
                log("[results_received]");
            }
            LoopStep::Done {
                content,
                total_usage: usage,
                finish_reason,
                ..
            } => {
                log(format!(
                    "[done] reason={:?} in={} out={}",
                    finish_reason, usage.input_tokens, usage.output_tokens
                ));

                total_usage.input_tokens += usage.input_tokens;
                total_usage.output_tokens += usage.output_tokens;
                total_usage.cached_tokens += usage.cached_tokens;

                if !content.is_empty() && content != full_content {
                    full_content = content;
                }

                return Ok(ChatLoopResponse {
                    content: full_content,
                    usage: total_usage,
                    all_tool_calls,
                    rounds,
                });
            }
        }
    }
}

/// Convenience function for chat loop with ToolRegistry
///
/// This is the recommended way to use the chat loop with lazy tool loading.
/// Tools are registered once, and the registry handles both description
/// serving and execution.
///
/// # Example
///
/// ```no_run
/// use agent_runtime::llm::*;
///
/// async fn example() -> Result<(), Box<dyn std::error::Error>> {
///     let provider = OpenAIProvider::create("gpt-4".to_string(), "key".to_string())?;
///
///     // Register all built-in tools
///     let registry = ToolRegistry::new().register_all_builtin();
///
///     let config = ChatLoopConfig::new()
///         .with_registry(registry)
///         .on_content(|text| print!("{}", text));
///
///     let messages = vec![Message {
///         role: Role::User,
///         content: "List files".to_string(),
///         tool_call_id: None,
///         tool_calls: None,
///         is_error: false,
///     }];
///     let response = chat_with_registry(&provider, messages, config).await?;
///     Ok(())
/// }
/// ```
pub async fn chat_with_registry<P: LLMProvider>(
    provider: &P,
    messages: Vec<Message>,
    config: ChatLoopConfig,
) -> Result<ChatLoopResponse, super::ProviderError> {
    if config.registry.is_none() {
        return Err(super::ProviderError::ConfigError(
            "chat_with_registry requires config.with_registry() to be set".to_string(),
        ));
    }
    chat_loop_with_tools(provider, messages, vec![], config).await
}

fn truncate_for_log(text: &str) -> String {
    const LIMIT: usize = 120;
    let mut result = String::new();
    for (i, ch) in text.chars().enumerate() {
        if i >= LIMIT {
            result.push_str("...");
            return result;
        }
        result.push(ch);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ChatLoopConfig::new()
            .with_tool("test", |_call| async { Ok("result".to_string()) })
            .with_max_rounds(5);

        assert_eq!(config.max_rounds, 5);
        assert_eq!(config.tool_executors.len(), 1);
        assert!(config.tool_executors.contains_key("test"));
    }

    #[test]
    fn test_default_max_rounds_is_iteration_cap() {
        let config = ChatLoopConfig::new();
        assert_eq!(config.max_rounds, MAX_ITERATIONS);
        assert!(config.loop_detector.is_none());
    }

    #[test]
    fn test_with_loop_detector() {
        let config = ChatLoopConfig::new().with_loop_detector(LoopDetector::new());
        assert!(config.loop_detector.is_some());
    }

    #[test]
    fn test_autorun_defaults_to_true() {
        let config = ChatLoopConfig::new();
        assert!(config.autorun);
        assert!(config.on_confirm.is_none());
    }

    #[test]
    fn test_with_autorun_and_confirm_callback() {
        let config = ChatLoopConfig::new()
            .with_autorun(false)
            .on_confirm(|name, _args| name == "execute_bash");

        assert!(!config.autorun);
        assert!(config.on_confirm.is_some());
        let cb = config.on_confirm.as_ref().unwrap();
        assert!(cb("execute_bash", &serde_json::json!({})));
        assert!(!cb("read_file", &serde_json::json!({})));
    }

    #[test]
    fn test_with_rate_limiter() {
        use super::super::rate_limiter::{ModelLimits, RateLimiter};
        let limiter = Arc::new(RateLimiter::new(ModelLimits::new(30, 10_000)));
        let config = ChatLoopConfig::new().with_rate_limiter(limiter);
        assert!(config.rate_limiter.is_some());
    }
}
