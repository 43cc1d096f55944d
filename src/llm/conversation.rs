//! Append-only conversation log with token estimation and mechanical
//! compression of older turns.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::provider::{Message, Role, ToolCall};

/// Keep the last N messages verbatim whenever compression fires.
const COMPRESSION_TAIL: usize = 20;
/// Estimated-token threshold above which `Append` triggers compression.
const COMPRESSION_THRESHOLD: u32 = 50_000;
/// Content-truncation limit applied to tool results surfaced as text.
const TEXT_VIEW_TRUNCATE: usize = 2000;

const IMPORTANT_DECISION_KEYWORDS: &[&str] = &[
    "completed",
    "finished",
    "done",
    "created",
    "modified",
    "changed",
    "updated",
    "fixed",
    "implemented",
];

/// Append-only message log for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub session_id: String,
    pub messages: Vec<Message>,
    pub created_at: u64,
    pub last_updated: u64,
    pub compression_count: u32,
}

impl Conversation {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = unix_now();
        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
            created_at: now,
            last_updated: now,
            compression_count: 0,
        }
    }

    /// The only mutator. Consults the compressor before inserting, then
    /// normalises tool-call shape and timestamps the log.
    pub fn append(&mut self, message: Message, compressor: &Compressor) {
        if compressor.should_compress(self) {
            compressor.compress(self);
        }
        self.messages.push(message);
        self.last_updated = unix_now();
    }

    /// Rough token estimate: 4 characters per token, summed across message
    /// content and JSON-encoded tool-call arguments.
    pub fn estimate_tokens(&self) -> u32 {
        let mut total_chars = 0usize;
        for msg in &self.messages {
            total_chars += msg.content.len();
            if let Some(calls) = &msg.tool_calls {
                for call in calls {
                    total_chars += call.name.len();
                    total_chars += call.arguments.to_string().len();
                }
            }
        }
        (total_chars / 4) as u32
    }

    /// Provider-bound view of the conversation.
    ///
    /// `convert_tools_to_text = true` is the universal fallback for
    /// providers that cannot represent `role: tool` messages natively:
    /// every assistant-with-tool-calls message collapses to a single
    /// text message, and every tool result becomes a `user` message.
    pub fn messages_for_api(&self, convert_tools_to_text: bool) -> Vec<Message> {
        if !convert_tools_to_text {
            return self.messages.clone();
        }

        let mut out = Vec::with_capacity(self.messages.len());
        for msg in &self.messages {
            match (&msg.role, &msg.tool_calls) {
                (Role::Assistant, Some(calls)) if !calls.is_empty() => {
                    let mut text = msg.content.clone();
                    for call in calls {
                        if !text.is_empty() {
                            text.push('\n');
                        }
                        text.push_str(&format!("Ejecuté {}({})", call.name, call.arguments));
                    }
                    out.push(Message {
                        role: Role::Assistant,
                        content: text,
                        tool_call_id: None,
                        tool_calls: None,
                        is_error: false,
                    });
                }
                (Role::Tool, _) => {
                    let mut content = msg.content.clone();
                    if content.len() > TEXT_VIEW_TRUNCATE {
                        content.truncate(TEXT_VIEW_TRUNCATE);
                    }
                    let name = msg.tool_call_id.clone().unwrap_or_default();
                    out.push(Message {
                        role: Role::User,
                        content: format!("[Resultado de {name}]: {content}"),
                        tool_call_id: None,
                        tool_calls: None,
                        is_error: false,
                    });
                }
                _ => out.push(msg.clone()),
            }
        }
        out
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Pre-compression archive written to `resume/<session>_compressed.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionSummary {
    pub session_id: String,
    pub compressed_at: u64,
    pub original_message_count: usize,
    pub original_tokens: u32,
    pub tools_used: Vec<String>,
    pub key_files: Vec<String>,
    pub important_decisions: Vec<String>,
    pub summary_text: String,
}

/// Mechanical, LLM-free compressor for long conversations.
pub struct Compressor {
    pub max_tokens: u32,
    pub compression_threshold: u32,
    pub resume_dir: PathBuf,
}

impl Compressor {
    pub fn new(resume_dir: PathBuf) -> Self {
        Self {
            max_tokens: 150_000,
            compression_threshold: COMPRESSION_THRESHOLD,
            resume_dir,
        }
    }

    pub fn should_compress(&self, conversation: &Conversation) -> bool {
        conversation.estimate_tokens() > self.compression_threshold
    }

    /// Replace everything older than the last 20 messages with one
    /// synthesised system summary, archive the replaced tail, and mark
    /// the conversation compressed. Idempotent: running it again on an
    /// already-compressed log still keeps the last-20 invariant.
    pub fn compress(&self, conversation: &mut Conversation) {
        let total_tokens = conversation.estimate_tokens();
        let total_messages = conversation.messages.len();

        if total_messages <= COMPRESSION_TAIL {
            // Nothing old enough to summarise; still counts as a run so
            // repeated calls stay idempotent.
            conversation.compression_count += 1;
            return;
        }

        let split_at = total_messages - COMPRESSION_TAIL;
        let (old, tail) = conversation.messages.split_at(split_at);

        let tools_used = collect_tools_used(old);
        let key_files = collect_key_files(old);
        let important_decisions = collect_important_decisions(old);
        let summary_text = build_summary_text(
            total_messages,
            total_tokens,
            old.len(),
            &tools_used,
            &key_files,
            &important_decisions,
        );

        let summary = CompressionSummary {
            session_id: conversation.session_id.clone(),
            compressed_at: unix_now(),
            original_message_count: total_messages,
            original_tokens: total_tokens,
            tools_used,
            key_files,
            important_decisions,
            summary_text: summary_text.clone(),
        };

        self.archive(&summary);

        let mut new_messages = Vec::with_capacity(COMPRESSION_TAIL + 1);
        new_messages.push(Message {
            role: Role::System,
            content: format!(
                "CONTEXT COMPRESSED: {summary_text}\n\nThis conversation has been compressed to save tokens. Key information from previous messages is summarised above."
            ),
            tool_call_id: None,
            tool_calls: None,
            is_error: false,
        });
        new_messages.extend_from_slice(tail);

        conversation.messages = new_messages;
        conversation.compression_count += 1;
        crate::log(format!(
            "compressed conversation {}: {} -> {} messages",
            conversation.session_id,
            total_messages,
            conversation.messages.len()
        ));
    }

    fn archive(&self, summary: &CompressionSummary) {
        if let Err(err) = std::fs::create_dir_all(&self.resume_dir) {
            crate::log(format!("failed to create resume dir: {err}"));
            return;
        }
        let path = self
            .resume_dir
            .join(format!("{}_compressed.json", summary.session_id));
        match serde_json::to_string_pretty(summary) {
            Ok(json) => {
                if let Err(err) = std::fs::write(&path, json) {
                    crate::log(format!("failed to write compression archive: {err}"));
                }
            }
            Err(err) => crate::log(format!("failed to serialise compression summary: {err}")),
        }
    }

    pub fn load_archive(&self, session_id: &str) -> Option<CompressionSummary> {
        let path = self.resume_dir.join(format!("{session_id}_compressed.json"));
        let contents = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&contents).ok()
    }
}

fn collect_tools_used(messages: &[Message]) -> Vec<String> {
    let mut set = HashSet::new();
    for msg in messages {
        if let Some(calls) = &msg.tool_calls {
            for call in calls {
                set.insert(call.name.clone());
            }
        }
    }
    let mut out: Vec<String> = set.into_iter().collect();
    out.sort();
    out
}

fn collect_key_files(messages: &[Message]) -> Vec<String> {
    let mut files = Vec::new();
    for msg in messages {
        if let Some(calls) = &msg.tool_calls {
            for call in calls {
                if matches!(call.name.as_str(), "read_file" | "write_file" | "edit_file") {
                    if let Some(path) = extract_file_path(call) {
                        if !files.contains(&path) {
                            files.push(path);
                        }
                    }
                }
            }
        }
    }
    files.truncate(20);
    files
}

fn extract_file_path(call: &ToolCall) -> Option<String> {
    call.arguments
        .get("file_path")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn collect_important_decisions(messages: &[Message]) -> Vec<String> {
    let mut decisions = Vec::new();
    for msg in messages {
        if !matches!(msg.role, Role::Assistant) || msg.content.is_empty() {
            continue;
        }
        let lower = msg.content.to_lowercase();
        if IMPORTANT_DECISION_KEYWORDS
            .iter()
            .any(|kw| lower.contains(kw))
        {
            let mut snippet = msg.content.clone();
            snippet.truncate(200);
            decisions.push(snippet);
        }
    }
    let skip = decisions.len().saturating_sub(10);
    decisions.split_off(skip)
}

fn build_summary_text(
    total_messages: usize,
    total_tokens: u32,
    _old_count: usize,
    tools_used: &[String],
    key_files: &[String],
    important_decisions: &[String],
) -> String {
    let mut parts = Vec::new();
    parts.push(format!(
        "This conversation had {total_messages} messages and used approximately {total_tokens} tokens."
    ));
    if !tools_used.is_empty() {
        parts.push(format!("Used tools: {}.", tools_used.join(", ")));
    }
    if !key_files.is_empty() {
        parts.push(format!("Touched files: {}.", key_files.join(", ")));
    }
    if !important_decisions.is_empty() {
        parts.push(format!(
            "Made {} important decisions/completions.",
            important_decisions.len()
        ));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_message(role: Role, content: &str) -> Message {
        Message {
            role,
            content: content.to_string(),
            tool_call_id: None,
            tool_calls: None,
            is_error: false,
        }
    }

    #[test]
    fn test_estimate_tokens() {
        let mut convo = Conversation::new("s1");
        convo.messages.push(text_message(Role::User, &"a".repeat(400)));
        assert_eq!(convo.estimate_tokens(), 100);
    }

    #[test]
    fn test_compression_keeps_last_20() {
        let dir = tempfile::tempdir().unwrap();
        let compressor = Compressor::new(dir.path().to_path_buf());
        let mut convo = Conversation::new("s1");
        for i in 0..40 {
            convo.messages.push(text_message(Role::User, &format!("msg {i}")));
        }
        compressor.compress(&mut convo);
        assert_eq!(convo.messages.len(), 21);
        assert_eq!(convo.messages[0].role, Role::System);
        assert!(convo.messages[0].content.contains("compressed"));
        assert!(dir.path().join("s1_compressed.json").exists());
    }

    #[test]
    fn test_compression_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let compressor = Compressor::new(dir.path().to_path_buf());
        let mut convo = Conversation::new("s1");
        for i in 0..40 {
            convo.messages.push(text_message(Role::User, &format!("msg {i}")));
        }
        compressor.compress(&mut convo);
        compressor.compress(&mut convo);
        assert_eq!(convo.messages.len(), 21);
        assert_eq!(convo.messages[0].role, Role::System);
    }

    #[test]
    fn test_messages_for_api_text_mode_hides_tool_roles() {
        let mut convo = Conversation::new("s1");
        convo.messages.push(text_message(Role::User, "hola"));
        convo.messages.push(Message {
            role: Role::Assistant,
            content: String::new(),
            tool_call_id: None,
            tool_calls: Some(vec![ToolCall {
                id: "c1".into(),
                name: "read_file".into(),
                arguments: serde_json::json!({"file_path": "README.md"}),
            }]),
            is_error: false,
        });
        convo.messages.push(Message {
            role: Role::Tool,
            content: "# Demo".into(),
            tool_call_id: Some("c1".into()),
            tool_calls: None,
            is_error: false,
        });

        let view = convo.messages_for_api(true);
        assert!(view.iter().all(|m| !matches!(m.role, Role::Tool)));
        assert!(view
            .iter()
            .all(|m| m.tool_calls.is_none() || m.tool_calls.as_ref().unwrap().is_empty()));
    }
}
