//! File-reading tool with intelligent reference resolution.

use super::{BoxFuture, ToolProvider};
use crate::llm::ToolCall;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Project context supplied by the caller (a CLI collaborator building a
/// project index) used to resolve semantic references like "readme" or
/// "el archivo html" against real files.
#[derive(Debug, Clone, Default)]
pub struct ProjectContext {
    pub file_index: HashMap<String, Vec<PathBuf>>,
    pub has_readme: Option<String>,
    pub has_package_json: bool,
    pub has_requirements: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReadFileRequest {
    file_path: String,
    #[serde(default = "default_start_line")]
    start_line: i64,
    #[serde(default = "default_end_line")]
    end_line: i64,
}

fn default_start_line() -> i64 {
    1
}
fn default_end_line() -> i64 {
    -1
}

/// Tool for reading file contents, with a small amount of intelligent
/// path resolution for references a project index can answer.
#[derive(Clone, Default)]
pub struct ReadFileTool {
    project_context: Option<ProjectContext>,
}

impl ReadFileTool {
    pub fn new() -> Self {
        Self {
            project_context: None,
        }
    }

    pub fn with_project_context(mut self, ctx: ProjectContext) -> Self {
        self.project_context = Some(ctx);
        self
    }

    fn resolve_file_reference(&self, reference: &str) -> PathBuf {
        if let Some(ctx) = &self.project_context {
            if let Some(resolved) = self.resolve_intelligent_reference(ctx, reference) {
                return resolved;
            }
        }

        let path = Path::new(reference);
        let expanded = shellexpand_home(path);
        if expanded.exists() {
            return expanded;
        }

        if let Ok(cwd) = std::env::current_dir() {
            let candidate = cwd.join(reference);
            if candidate.exists() {
                return candidate;
            }
        }

        expanded
    }

    fn resolve_intelligent_reference(
        &self,
        ctx: &ProjectContext,
        reference: &str,
    ) -> Option<PathBuf> {
        let lower = reference.to_lowercase();

        if matches!(
            lower.as_str(),
            "readme" | "readme.md" | "el readme" | "la documentación"
        ) {
            if let Some(readme) = &ctx.has_readme {
                return Some(PathBuf::from(readme));
            }
        }

        if lower.contains("html") {
            if let Some(html_files) = ctx.file_index.get(".html") {
                if let Some(exact) = html_files
                    .iter()
                    .find(|f| f.file_name().and_then(|n| n.to_str()) == Some(reference))
                {
                    return Some(exact.clone());
                }
                return html_files.first().cloned();
            }
        }

        if lower.contains("python") || lower.contains("py") {
            if let Some(py_files) = ctx.file_index.get(".py") {
                let priority = ["main.py", "app.py", "server.py", "index.py"];
                for name in priority {
                    if let Some(found) = py_files
                        .iter()
                        .find(|f| f.file_name().and_then(|n| n.to_str()) == Some(name))
                    {
                        return Some(found.clone());
                    }
                }
                return py_files.first().cloned();
            }
        }

        if (lower.contains("package") || lower.contains("npm")) && ctx.has_package_json {
            return Some(PathBuf::from("package.json"));
        }

        if (lower.contains("requirements") || lower.contains("pip")) && ctx.has_requirements.is_some()
        {
            return ctx.has_requirements.clone().map(PathBuf::from);
        }

        None
    }
}

fn shellexpand_home(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}

impl ToolProvider for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn brief(&self) -> &str {
        "📖 READ FILE CONTENTS: view the contents of existing files. Perfect for examining code, config files, or any text document."
    }

    fn full_description(&self) -> String {
        let mut description = self.brief().to_string();
        if let Some(ctx) = &self.project_context {
            let mut hints = Vec::new();
            if ctx.file_index.contains_key(".html") {
                hints.push("Use \"index.html\" or \"main.html\" for HTML files".to_string());
            }
            if ctx.file_index.contains_key(".py") {
                hints.push("Use \"main.py\" or \"app.py\" for Python files".to_string());
            }
            if let Some(readme) = &ctx.has_readme {
                hints.push(format!("Use \"{readme}\" for documentation"));
            }
            if !hints.is_empty() {
                description.push_str("\n\nContext hints:\n");
                for hint in hints {
                    description.push_str(&format!("- {hint}\n"));
                }
            }
        }
        description
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file to read (absolute, relative, or reference like 'index.html', 'readme')"
                },
                "start_line": {
                    "type": "integer",
                    "description": "Starting line number (1-indexed, default: 1)",
                    "default": 1
                },
                "end_line": {
                    "type": "integer",
                    "description": "Ending line number (-1 for end of file, default: -1)",
                    "default": -1
                }
            },
            "required": ["file_path"]
        })
    }

    fn execute<'a>(&'a self, call: &'a ToolCall) -> BoxFuture<'a, Result<String, String>> {
        Box::pin(async move {
            let request: ReadFileRequest = serde_json::from_value(call.arguments.clone())
                .map_err(|e| format!("Invalid arguments: {e}"))?;

            let resolved = self.resolve_file_reference(&request.file_path);

            if !resolved.exists() {
                return Err(format!(
                    "File not found: {} (resolved to: {})",
                    request.file_path,
                    resolved.display()
                ));
            }
            if !resolved.is_file() {
                return Err(format!("Not a file: {}", resolved.display()));
            }

            let content = std::fs::read_to_string(&resolved)
                .map_err(|_| format!("File appears to be binary or has encoding issues: {}", request.file_path))?;

            let lines: Vec<&str> = content.split_inclusive('\n').collect();
            let total_lines = lines.len();
            let start_line = request.start_line.max(1).min(total_lines.max(1) as i64) as usize;
            let end_line = if request.end_line == -1 {
                total_lines
            } else {
                request.end_line.max(start_line as i64).min(total_lines as i64) as usize
            };

            let selected: String = lines
                .get(start_line.saturating_sub(1)..end_line)
                .unwrap_or_default()
                .concat();

            let file_name = resolved
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("");
            let lines_read = end_line.saturating_sub(start_line) + 1;
            let mut summary = format!("read {lines_read} lines from {file_name}");
            if lines_read != total_lines {
                summary.push_str(&format!(" (lines {start_line}-{end_line} of {total_lines})"));
            }

            let result = json!({
                "success": true,
                "content": selected,
                "file_path": resolved.display().to_string(),
                "start_line": start_line,
                "end_line": end_line,
                "total_lines": total_lines,
                "summary": summary,
            });
            Ok(result.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_read_full_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "line1\nline2\nline3").unwrap();
        let tool = ReadFileTool::new();
        let call = ToolCall {
            id: "c1".into(),
            name: "read_file".into(),
            arguments: json!({"file_path": file.path().to_str().unwrap()}),
        };
        let result = ToolProvider::execute(&tool, &call).await.unwrap();
        assert!(result.contains("line1"));
        assert!(result.contains("\"success\":true"));
    }

    #[tokio::test]
    async fn test_read_line_range() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "a\nb\nc\nd").unwrap();
        let tool = ReadFileTool::new();
        let call = ToolCall {
            id: "c1".into(),
            name: "read_file".into(),
            arguments: json!({"file_path": file.path().to_str().unwrap(), "start_line": 2, "end_line": 3}),
        };
        let result = ToolProvider::execute(&tool, &call).await.unwrap();
        assert!(result.contains("\\nb\\nc\\n") || result.contains("b\\nc"));
    }

    #[tokio::test]
    async fn test_file_not_found() {
        let tool = ReadFileTool::new();
        let call = ToolCall {
            id: "c1".into(),
            name: "read_file".into(),
            arguments: json!({"file_path": "/nonexistent/path/xyz.txt"}),
        };
        let result = ToolProvider::execute(&tool, &call).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("not found"));
    }

    #[tokio::test]
    async fn test_readme_reference_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let readme_path = dir.path().join("README.md");
        std::fs::write(&readme_path, "# Demo\n").unwrap();

        let ctx = ProjectContext {
            has_readme: Some(readme_path.to_str().unwrap().to_string()),
            ..Default::default()
        };
        let tool = ReadFileTool::new().with_project_context(ctx);
        let call = ToolCall {
            id: "c1".into(),
            name: "read_file".into(),
            arguments: json!({"file_path": "readme"}),
        };
        let result = ToolProvider::execute(&tool, &call).await.unwrap();
        assert!(result.contains("Demo"));
    }
}
