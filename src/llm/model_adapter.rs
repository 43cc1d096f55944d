//! Model Adapters (C5): per-model tool-call parsing and repair.
//!
//! A provider adapter (openai/anthropic/gemini/cohere) speaks one wire
//! protocol; a model adapter is selected per *model identifier* and fixes
//! up what weaker models get wrong when asked to call tools: missing
//! native `tool_calls`, fenced pseudo-code blocks, bare JSON objects loose
//! in the text, or (for small Llama-family models) a `[Acción: …]`
//! prefix standing in for a shell command.

use super::ToolCall;
use regex::Regex;
use std::sync::OnceLock;

/// Coarse family a model identifier is bucketed into. Drives both repair
/// heuristics and `StrictnessHint`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    Llama70BPlus,
    LlamaSmall,
    Claude,
    Gpt4,
    Gpt35,
    Gemini,
    Qwen,
    DeepSeek,
    Mistral,
    CohereCommand,
    Generic,
}

/// How much hand-holding a model needs in its tool-use prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrictnessHint {
    Minimal,
    Standard,
    Detailed,
    Maximum,
}

/// Support level and capabilities reported for a model.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub family: ModelFamily,
    pub support_level: StrictnessHint,
    pub supports_tools: bool,
}

/// Result of parsing one provider response through a model adapter.
#[derive(Debug, Clone, Default)]
pub struct ParsedResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    /// True if any repair path fired; the raw text that was mined for a
    /// pseudo tool call is not meant to also show up as chat content.
    pub repaired: bool,
}

/// Per-model behavior: parsing/repair, native tool-message support, and
/// the strictness hint consumed by prompt construction.
pub trait ModelAdapter: Send + Sync {
    fn parse(&self, raw_content: &str, native_tool_calls: Vec<ToolCall>) -> ParsedResponse;
    fn supports_native_tool_messages(&self) -> bool;
    fn strictness_hint(&self) -> StrictnessHint;
    fn model_info(&self) -> ModelInfo;
}

fn fenced_tool_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```tool_code\s*(.*?)\s*```").expect("valid fenced tool_code regex")
    })
}

fn xml_tool_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<tool_call>\s*(\{.*?\})\s*</tool_call>").expect("valid xml tool_call regex")
    })
}

fn bare_json_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)\{\s*"(?:name|function)"\s*:\s*"[^"]+"\s*,\s*"arguments"\s*:\s*\{.*?\}\s*\}"#)
            .expect("valid bare json call regex")
    })
}

fn name_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^([A-Za-z_][A-Za-z0-9_]*)\((.*)\)$").expect("valid name(args) regex")
    })
}

fn accion_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^\s*\[Acci[oó]n:\s*(.*?)\]\s*(.*)$").expect("valid Acción prefix regex")
    })
}

fn fresh_tool_call_id(seed: usize) -> String {
    format!("repaired-{seed}")
}

/// Try to synthesise a `ToolCall` from a `name(json_args)` or bare
/// shell-command fragment.
fn synthesize_from_fragment(fragment: &str, id: String) -> Option<ToolCall> {
    let fragment = fragment.trim();
    if let Some(caps) = name_call_re().captures(fragment) {
        let name = caps.get(1)?.as_str().to_string();
        let args_raw = caps.get(2)?.as_str().trim();
        let arguments = if args_raw.is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(args_raw).unwrap_or_else(|_| serde_json::json!({"raw": args_raw}))
        };
        return Some(ToolCall { id, name, arguments });
    }
    // Bare shell-style command: treat as an execute_bash call.
    if !fragment.is_empty() {
        return Some(ToolCall {
            id,
            name: "execute_bash".to_string(),
            arguments: serde_json::json!({"command": fragment}),
        });
    }
    None
}

fn synthesize_from_json_object(json_text: &str, id: String) -> Option<ToolCall> {
    let value: serde_json::Value = serde_json::from_str(json_text).ok()?;
    let name = value
        .get("name")
        .or_else(|| value.get("function"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())?;
    let arguments = value
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));
    Some(ToolCall { id, name, arguments })
}

/// Run the shared repair chain (§4.5 rules 2-3) against `text`, stopping
/// at the first rule that yields at least one tool call.
fn repair_chain(text: &str) -> (String, Vec<ToolCall>, bool) {
    let mut seed = 0usize;

    // Rule 2: fenced ```tool_code``` blocks.
    let mut calls = Vec::new();
    for caps in fenced_tool_code_re().captures_iter(text) {
        let body = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        if let Some(call) = synthesize_from_fragment(body, fresh_tool_call_id(seed)) {
            seed += 1;
            calls.push(call);
        }
    }
    if !calls.is_empty() {
        let stripped = fenced_tool_code_re().replace_all(text, "").trim().to_string();
        return (stripped, calls, true);
    }

    // Rule 3a: <tool_call>{...}</tool_call>.
    for caps in xml_tool_call_re().captures_iter(text) {
        let body = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        if let Some(call) = synthesize_from_json_object(body, fresh_tool_call_id(seed)) {
            seed += 1;
            calls.push(call);
        }
    }
    if !calls.is_empty() {
        let stripped = xml_tool_call_re().replace_all(text, "").trim().to_string();
        return (stripped, calls, true);
    }

    // Rule 3b: bare {"name":...,"arguments":{...}} anywhere in the text.
    for m in bare_json_call_re().find_iter(text) {
        if let Some(call) = synthesize_from_json_object(m.as_str(), fresh_tool_call_id(seed)) {
            seed += 1;
            calls.push(call);
        }
    }
    if !calls.is_empty() {
        let stripped = bare_json_call_re().replace_all(text, "").trim().to_string();
        return (stripped, calls, true);
    }

    (text.to_string(), calls, false)
}

/// Default adapter: applies the shared repair chain (rules 1-3), no
/// model-family-specific rule 4.
pub struct GenericAdapter {
    family: ModelFamily,
    strictness: StrictnessHint,
    supports_native_tools: bool,
}

impl GenericAdapter {
    pub fn new(family: ModelFamily, strictness: StrictnessHint, supports_native_tools: bool) -> Self {
        Self {
            family,
            strictness,
            supports_native_tools,
        }
    }
}

impl ModelAdapter for GenericAdapter {
    fn parse(&self, raw_content: &str, native_tool_calls: Vec<ToolCall>) -> ParsedResponse {
        // Rule 1: native tool_calls win outright.
        if !native_tool_calls.is_empty() {
            return ParsedResponse {
                content: raw_content.to_string(),
                tool_calls: native_tool_calls,
                repaired: false,
            };
        }

        let (content, tool_calls, repaired) = repair_chain(raw_content);
        ParsedResponse {
            content,
            tool_calls,
            repaired,
        }
    }

    fn supports_native_tool_messages(&self) -> bool {
        self.supports_native_tools
    }

    fn strictness_hint(&self) -> StrictnessHint {
        self.strictness
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            family: self.family,
            support_level: self.strictness,
            supports_tools: true,
        }
    }
}

/// Small-Llama adapter: applies the shared chain, then additionally
/// strips a `[Acción: …]` pseudo-prefix and reinterprets it as a bash
/// call when no other rule fired (§4.5 rule 4).
pub struct LlamaSmallAdapter;

impl ModelAdapter for LlamaSmallAdapter {
    fn parse(&self, raw_content: &str, native_tool_calls: Vec<ToolCall>) -> ParsedResponse {
        if !native_tool_calls.is_empty() {
            return ParsedResponse {
                content: raw_content.to_string(),
                tool_calls: native_tool_calls,
                repaired: false,
            };
        }

        let (content, tool_calls, repaired) = repair_chain(raw_content);
        if repaired {
            return ParsedResponse {
                content,
                tool_calls,
                repaired,
            };
        }

        if let Some(caps) = accion_prefix_re().captures(raw_content) {
            let command = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
            let rest = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
            if !command.is_empty() {
                let call = ToolCall {
                    id: fresh_tool_call_id(0),
                    name: "execute_bash".to_string(),
                    arguments: serde_json::json!({"command": command}),
                };
                return ParsedResponse {
                    content: rest.to_string(),
                    tool_calls: vec![call],
                    repaired: true,
                };
            }
        }

        ParsedResponse {
            content,
            tool_calls,
            repaired,
        }
    }

    fn supports_native_tool_messages(&self) -> bool {
        false
    }

    fn strictness_hint(&self) -> StrictnessHint {
        StrictnessHint::Maximum
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            family: ModelFamily::LlamaSmall,
            support_level: StrictnessHint::Maximum,
            supports_tools: true,
        }
    }
}

/// Classify a model identifier into a family, matching on the
/// substrings vendors actually ship in their model names.
pub fn classify_model_family(model_id: &str) -> ModelFamily {
    let lower = model_id.to_lowercase();
    if lower.contains("claude") {
        ModelFamily::Claude
    } else if lower.contains("gemini") {
        ModelFamily::Gemini
    } else if lower.contains("gpt-4") || lower.contains("gpt-5") || lower.contains("o1") || lower.contains("o3") {
        ModelFamily::Gpt4
    } else if lower.contains("gpt-3.5") {
        ModelFamily::Gpt35
    } else if lower.contains("command") {
        ModelFamily::CohereCommand
    } else if lower.contains("deepseek") {
        ModelFamily::DeepSeek
    } else if lower.contains("mistral") || lower.contains("mixtral") {
        ModelFamily::Mistral
    } else if lower.contains("qwen") {
        ModelFamily::Qwen
    } else if lower.contains("llama") {
        if is_small_llama(&lower) {
            ModelFamily::LlamaSmall
        } else {
            ModelFamily::Llama70BPlus
        }
    } else {
        ModelFamily::Generic
    }
}

fn is_small_llama(lower_model_id: &str) -> bool {
    const SMALL_MARKERS: &[&str] = &["-1b", "-3b", "-7b", "-8b", "1b-", "3b-", "7b-", "8b-"];
    SMALL_MARKERS.iter().any(|m| lower_model_id.contains(m))
}

/// Build the right adapter instance for a model identifier.
pub fn adapter_for_model(model_id: &str) -> Box<dyn ModelAdapter> {
    let family = classify_model_family(model_id);
    match family {
        ModelFamily::LlamaSmall => Box::new(LlamaSmallAdapter),
        ModelFamily::Claude | ModelFamily::Gpt4 | ModelFamily::Gemini => {
            Box::new(GenericAdapter::new(family, StrictnessHint::Minimal, true))
        }
        ModelFamily::Llama70BPlus | ModelFamily::Qwen | ModelFamily::CohereCommand => {
            Box::new(GenericAdapter::new(family, StrictnessHint::Standard, true))
        }
        ModelFamily::Gpt35 | ModelFamily::Mistral | ModelFamily::DeepSeek => {
            Box::new(GenericAdapter::new(family, StrictnessHint::Detailed, true))
        }
        ModelFamily::Generic => Box::new(GenericAdapter::new(family, StrictnessHint::Detailed, false)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_tool_calls_short_circuit_repair() {
        let adapter = adapter_for_model("gpt-4o");
        let native = vec![ToolCall {
            id: "1".into(),
            name: "read_file".into(),
            arguments: serde_json::json!({"file_path": "a.txt"}),
        }];
        let parsed = adapter.parse("ignored", native.clone());
        assert!(!parsed.repaired);
        assert_eq!(parsed.tool_calls, native);
    }

    #[test]
    fn test_fenced_tool_code_repair() {
        let adapter = adapter_for_model("llama-3.1-70b");
        let raw = "Sure, let me check.\n```tool_code\nread_file({\"file_path\": \"a.txt\"})\n```";
        let parsed = adapter.parse(raw, vec![]);
        assert!(parsed.repaired);
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].name, "read_file");
    }

    #[test]
    fn test_xml_tool_call_repair() {
        let adapter = adapter_for_model("mistral-large");
        let raw = r#"<tool_call>{"name": "write_file", "arguments": {"file_path": "a.txt", "content": "x"}}</tool_call>"#;
        let parsed = adapter.parse(raw, vec![]);
        assert!(parsed.repaired);
        assert_eq!(parsed.tool_calls[0].name, "write_file");
    }

    #[test]
    fn test_bare_json_repair() {
        let adapter = adapter_for_model("deepseek-chat");
        let raw = r#"I'll do that now. {"name": "execute_bash", "arguments": {"command": "ls"}} done."#;
        let parsed = adapter.parse(raw, vec![]);
        assert!(parsed.repaired);
        assert_eq!(parsed.tool_calls[0].name, "execute_bash");
    }

    #[test]
    fn test_accion_prefix_repair_small_llama() {
        let adapter = adapter_for_model("llama-3.2-1b-instruct");
        let raw = "[Acción: ls -la] Voy a listar los archivos.";
        let parsed = adapter.parse(raw, vec![]);
        assert!(parsed.repaired);
        assert_eq!(parsed.tool_calls[0].name, "execute_bash");
        assert_eq!(parsed.tool_calls[0].arguments["command"], "ls -la");
    }

    #[test]
    fn test_no_repair_when_plain_text() {
        let adapter = adapter_for_model("claude-3-5-sonnet");
        let parsed = adapter.parse("Just a normal answer.", vec![]);
        assert!(!parsed.repaired);
        assert!(parsed.tool_calls.is_empty());
        assert_eq!(parsed.content, "Just a normal answer.");
    }

    #[test]
    fn test_classify_model_family() {
        assert_eq!(classify_model_family("claude-3-opus"), ModelFamily::Claude);
        assert_eq!(classify_model_family("gemini-1.5-pro"), ModelFamily::Gemini);
        assert_eq!(classify_model_family("gpt-4o-mini"), ModelFamily::Gpt4);
        assert_eq!(classify_model_family("command-r-plus"), ModelFamily::CohereCommand);
        assert_eq!(classify_model_family("llama-3.1-70b-instruct"), ModelFamily::Llama70BPlus);
        assert_eq!(classify_model_family("llama-3.2-3b-instruct"), ModelFamily::LlamaSmall);
        assert_eq!(classify_model_family("some-unknown-model"), ModelFamily::Generic);
    }
}
