//! File-writing tool: creates or overwrites a file, making parent
//! directories as needed.

use super::{BoxFuture, ToolProvider};
use crate::llm::ToolCall;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct WriteFileRequest {
    file_path: String,
    content: String,
}

#[derive(Clone, Default)]
pub struct WriteFileTool;

impl WriteFileTool {
    pub fn new() -> Self {
        Self
    }
}

impl ToolProvider for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn brief(&self) -> &str {
        "✏️ CREATE OR OVERWRITE A FILE: write full file contents to disk, creating parent directories as needed."
    }

    fn full_description(&self) -> String {
        format!(
            "{} Use this for new files or full rewrites; use edit_file for targeted changes.",
            self.brief()
        )
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path of the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "Full contents to write to the file"
                }
            },
            "required": ["file_path", "content"]
        })
    }

    fn execute<'a>(&'a self, call: &'a ToolCall) -> BoxFuture<'a, Result<String, String>> {
        Box::pin(async move {
            let request: WriteFileRequest = serde_json::from_value(call.arguments.clone())
                .map_err(|e| format!("Invalid arguments: {e}"))?;

            let path = std::path::Path::new(&request.file_path);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| format!("Failed to create directory {}: {e}", parent.display()))?;
                }
            }

            let bytes_written = request.content.len();
            std::fs::write(path, &request.content)
                .map_err(|e| format!("Failed to write {}: {e}", request.file_path))?;

            let result = json!({
                "success": true,
                "message": format!("Wrote {bytes_written} bytes to {}", request.file_path),
                "file_path": request.file_path,
                "bytes_written": bytes_written,
                "summary": format!("wrote {bytes_written} bytes to {}", path.display()),
            });
            Ok(result.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let tool = WriteFileTool::new();
        let call = ToolCall {
            id: "c1".into(),
            name: "write_file".into(),
            arguments: json!({"file_path": path.to_str().unwrap(), "content": "hello"}),
        };
        let result = ToolProvider::execute(&tool, &call).await.unwrap();
        assert!(result.contains("\"success\":true"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deep/out.txt");
        let tool = WriteFileTool::new();
        let call = ToolCall {
            id: "c1".into(),
            name: "write_file".into(),
            arguments: json!({"file_path": path.to_str().unwrap(), "content": "x"}),
        };
        ToolProvider::execute(&tool, &call).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_write_overwrites_existing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write as _;
        writeln!(file, "old content").unwrap();
        let tool = WriteFileTool::new();
        let call = ToolCall {
            id: "c1".into(),
            name: "write_file".into(),
            arguments: json!({"file_path": file.path().to_str().unwrap(), "content": "new"}),
        };
        ToolProvider::execute(&tool, &call).await.unwrap();
        assert_eq!(std::fs::read_to_string(file.path()).unwrap(), "new");
    }
}
