//! String-replace file editor tool.
//!
//! Implements the `str_replace_editor` contract: `view`, `create`,
//! `str_replace`, and `insert` commands against files inside the working
//! directory. Paths that escape the working directory are rejected.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use super::{ExecutionContext, Tool, ToolError, ToolOutput};

/// Parameters for the edit tool.
#[derive(Debug, Clone, Deserialize)]
struct EditParams {
    /// One of: view, create, str_replace, insert.
    command: String,
    /// Path to the target file, relative to the working directory.
    path: String,
    /// Full file contents for `create`.
    #[serde(default)]
    file_text: Option<String>,
    /// Text to find for `str_replace` (must occur exactly once).
    #[serde(default)]
    old_str: Option<String>,
    /// Replacement text for `str_replace`, inserted text for `insert`.
    #[serde(default)]
    new_str: Option<String>,
    /// 1-indexed line after which `insert` places the new text (0 = top).
    #[serde(default)]
    insert_line: Option<usize>,
    /// Optional [start, end] line range for `view`.
    #[serde(default)]
    view_range: Option<(usize, usize)>,
}

/// File editor tool scoped to the working directory.
pub struct EditTool;

impl Default for EditTool {
    fn default() -> Self {
        Self::new()
    }
}

impl EditTool {
    /// Create a new EditTool instance.
    pub fn new() -> Self {
        Self
    }

    /// Resolve a tool-supplied path inside the working directory.
    ///
    /// Relative paths are joined onto the working directory; absolute paths
    /// must already live under it. Parent-directory components are rejected
    /// outright since the target may not exist yet for canonicalization.
    fn resolve(path: &str, working_dir: &Path) -> Result<PathBuf, ToolError> {
        if path.trim().is_empty() {
            return Err(ToolError::InvalidParameters(
                "Path cannot be empty".to_string(),
            ));
        }
        let candidate = Path::new(path);
        if candidate
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(ToolError::InvalidParameters(format!(
                "Path '{}' escapes the working directory",
                path
            )));
        }
        let resolved = if candidate.is_absolute() {
            if !candidate.starts_with(working_dir) {
                return Err(ToolError::InvalidParameters(format!(
                    "Path '{}' is outside the working directory",
                    path
                )));
            }
            candidate.to_path_buf()
        } else {
            working_dir.join(candidate)
        };
        Ok(resolved)
    }

    async fn view(path: &Path, range: Option<(usize, usize)>) -> Result<ToolOutput, ToolError> {
        if path.is_dir() {
            let mut entries = Vec::new();
            let mut reader = fs::read_dir(path).await?;
            while let Some(entry) = reader.next_entry().await? {
                entries.push(entry.file_name().to_string_lossy().into_owned());
            }
            entries.sort();
            return Ok(ToolOutput::text(entries.join("\n")));
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("Cannot read {}: {}", path.display(), e)))?;

        let numbered: Vec<String> = content
            .lines()
            .enumerate()
            .filter(|(i, _)| match range {
                Some((start, end)) => *i + 1 >= start && *i + 1 <= end,
                None => true,
            })
            .map(|(i, line)| format!("{:>6}\t{}", i + 1, line))
            .collect();

        Ok(ToolOutput::text(numbered.join("\n")))
    }

    async fn create(path: &Path, file_text: &str) -> Result<ToolOutput, ToolError> {
        if path.exists() {
            return Err(ToolError::InvalidParameters(format!(
                "File already exists: {}",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, file_text).await?;
        Ok(ToolOutput::text(format!("Created {}", path.display())))
    }

    async fn str_replace(
        path: &Path,
        old_str: &str,
        new_str: &str,
    ) -> Result<ToolOutput, ToolError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("Cannot read {}: {}", path.display(), e)))?;

        let occurrences = content.matches(old_str).count();
        if occurrences == 0 {
            return Err(ToolError::InvalidParameters(
                "old_str not found in file".to_string(),
            ));
        }
        if occurrences > 1 {
            return Err(ToolError::InvalidParameters(format!(
                "old_str occurs {} times; it must be unique",
                occurrences
            )));
        }

        let updated = content.replacen(old_str, new_str, 1);
        fs::write(path, updated).await?;
        Ok(ToolOutput::text(format!("Edited {}", path.display())))
    }

    async fn insert(path: &Path, line: usize, new_str: &str) -> Result<ToolOutput, ToolError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("Cannot read {}: {}", path.display(), e)))?;

        let mut lines: Vec<&str> = content.lines().collect();
        if line > lines.len() {
            return Err(ToolError::InvalidParameters(format!(
                "insert_line {} is beyond end of file ({} lines)",
                line,
                lines.len()
            )));
        }
        lines.insert(line, new_str);
        fs::write(path, lines.join("\n") + "\n").await?;
        Ok(ToolOutput::text(format!(
            "Inserted after line {} in {}",
            line,
            path.display()
        )))
    }
}

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "str_replace_editor"
    }

    fn description(&self) -> &str {
        "View, create, and edit files in the working directory using exact string replacement."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "enum": ["view", "create", "str_replace", "insert"],
                    "description": "The edit operation to perform"
                },
                "path": {
                    "type": "string",
                    "description": "Target path, relative to the working directory"
                },
                "file_text": {"type": "string"},
                "old_str": {"type": "string"},
                "new_str": {"type": "string"},
                "insert_line": {"type": "integer"},
                "view_range": {
                    "type": "array",
                    "items": {"type": "integer"},
                    "minItems": 2,
                    "maxItems": 2
                }
            },
            "required": ["command", "path"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ExecutionContext) -> Result<ToolOutput, ToolError> {
        let params: EditParams = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidParameters(e.to_string()))?;
        let path = Self::resolve(&params.path, &ctx.working_dir)?;

        match params.command.as_str() {
            "view" => Self::view(&path, params.view_range).await,
            "create" => {
                let file_text = params.file_text.as_deref().ok_or_else(|| {
                    ToolError::InvalidParameters("create requires file_text".to_string())
                })?;
                Self::create(&path, file_text).await
            }
            "str_replace" => {
                let old_str = params.old_str.as_deref().ok_or_else(|| {
                    ToolError::InvalidParameters("str_replace requires old_str".to_string())
                })?;
                Self::str_replace(&path, old_str, params.new_str.as_deref().unwrap_or("")).await
            }
            "insert" => {
                let new_str = params.new_str.as_deref().ok_or_else(|| {
                    ToolError::InvalidParameters("insert requires new_str".to_string())
                })?;
                let line = params.insert_line.ok_or_else(|| {
                    ToolError::InvalidParameters("insert requires insert_line".to_string())
                })?;
                Self::insert(&path, line, new_str).await
            }
            other => Err(ToolError::InvalidParameters(format!(
                "Unknown command: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ctx(dir: &Path) -> ExecutionContext {
        ExecutionContext::new(dir)
    }

    #[tokio::test]
    async fn test_create_and_view() {
        let dir = tempdir().unwrap();
        let tool = EditTool::new();

        tool.execute(
            json!({"command": "create", "path": "main.tf", "file_text": "resource \"x\" \"y\" {}\n"}),
            &ctx(dir.path()),
        )
        .await
        .unwrap();

        let view = tool
            .execute(json!({"command": "view", "path": "main.tf"}), &ctx(dir.path()))
            .await
            .unwrap();
        assert!(view.output.unwrap().contains("resource"));
    }

    #[tokio::test]
    async fn test_create_refuses_overwrite() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("main.tf"), "old").unwrap();
        let tool = EditTool::new();

        let result = tool
            .execute(
                json!({"command": "create", "path": "main.tf", "file_text": "new"}),
                &ctx(dir.path()),
            )
            .await;
        assert!(matches!(result, Err(ToolError::InvalidParameters(_))));
    }

    #[tokio::test]
    async fn test_str_replace_requires_unique_match() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("main.tf"), "a\nb\na\n").unwrap();
        let tool = EditTool::new();

        let result = tool
            .execute(
                json!({"command": "str_replace", "path": "main.tf", "old_str": "a", "new_str": "c"}),
                &ctx(dir.path()),
            )
            .await;
        assert!(matches!(result, Err(ToolError::InvalidParameters(_))));

        tool.execute(
            json!({"command": "str_replace", "path": "main.tf", "old_str": "b", "new_str": "c"}),
            &ctx(dir.path()),
        )
        .await
        .unwrap();
        let content = std::fs::read_to_string(dir.path().join("main.tf")).unwrap();
        assert_eq!(content, "a\nc\na\n");
    }

    #[tokio::test]
    async fn test_insert_at_top() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "second\n").unwrap();
        let tool = EditTool::new();

        tool.execute(
            json!({"command": "insert", "path": "notes.txt", "insert_line": 0, "new_str": "first"}),
            &ctx(dir.path()),
        )
        .await
        .unwrap();
        let content = std::fs::read_to_string(dir.path().join("notes.txt")).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }

    #[tokio::test]
    async fn test_path_escape_rejected() {
        let dir = tempdir().unwrap();
        let tool = EditTool::new();

        let result = tool
            .execute(
                json!({"command": "view", "path": "../outside.txt"}),
                &ctx(dir.path()),
            )
            .await;
        assert!(matches!(result, Err(ToolError::InvalidParameters(_))));

        let result = tool
            .execute(
                json!({"command": "view", "path": "/etc/passwd"}),
                &ctx(dir.path()),
            )
            .await;
        assert!(matches!(result, Err(ToolError::InvalidParameters(_))));
    }
}
