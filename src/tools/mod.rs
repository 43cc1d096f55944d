//! Built-in tools for LLM agent interactions
//!
//! This module provides ready-to-use tools that can be used with any LLM
//! provider through the [`ToolProvider`] trait, plus the registry that the
//! agent loop dispatches tool calls through.

pub mod bash;
pub mod editor_edit;
pub mod read_file;
pub mod web_search;
pub mod write_file;

pub use bash::BashTool;
pub use editor_edit::EditorEditTool;
pub use read_file::{ProjectContext, ReadFileTool};
pub use web_search::WebSearchTool;
pub use write_file::WriteFileTool;

use crate::llm::ToolCall;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed, pinned future returned by [`ToolProvider::execute`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A tool the agent loop can offer to a model and dispatch calls to.
///
/// Implementors describe themselves twice: [`brief`](ToolProvider::brief) is
/// the short line shown in a tool's top-level listing, while
/// [`full_description`](ToolProvider::full_description) is sent as the
/// tool's description in the request payload and may include per-session
/// context hints.
pub trait ToolProvider: Send + Sync {
    /// Stable identifier the model uses to call this tool.
    fn name(&self) -> &str;

    /// One-line summary for human-facing tool listings.
    fn brief(&self) -> &str;

    /// Full description sent to the model, may be session-specific.
    fn full_description(&self) -> String {
        self.brief().to_string()
    }

    /// JSON schema for this tool's parameters.
    fn parameters(&self) -> serde_json::Value;

    /// Execute a call to this tool, returning its result or an error
    /// message. Both variants are plain strings so every provider adapter
    /// can fold them into its tool-result wire format uniformly.
    fn execute<'a>(&'a self, call: &'a ToolCall) -> BoxFuture<'a, Result<String, String>>;
}

/// The five built-in tools, in the order they are offered to a model.
pub fn all_tools() -> Vec<Arc<dyn ToolProvider>> {
    vec![
        Arc::new(ReadFileTool::new()),
        Arc::new(WriteFileTool::new()),
        Arc::new(EditorEditTool::new()),
        Arc::new(BashTool::new()),
        Arc::new(WebSearchTool::new()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_tools_names_unique_and_match_spec() {
        let tools = all_tools();
        let names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        assert_eq!(
            names,
            vec!["read_file", "write_file", "edit_file", "execute_bash", "web_search"]
        );
    }

    #[test]
    fn test_all_tools_have_valid_schemas() {
        for tool in all_tools() {
            let schema = tool.parameters();
            assert_eq!(schema["type"], "object");
            assert!(schema["properties"].is_object());
        }
    }
}
