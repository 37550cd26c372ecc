//! Filesystem and subprocess tools, constrained to a per-agent workspace
//! root. Every relative path is resolved under that root; attempts to
//! escape it are rejected with `ToolError::PathEscape`.

use async_trait::async_trait;
use prime_core::error::{SandboxError, ToolError};
use prime_core::sandbox::SandboxExecutor;
use prime_core::types::RiskLevel;
use prime_core::tools::Tool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Resolves `path_str` under `workspace`, rejecting `..` escapes without
/// requiring the target to already exist.
fn resolve_in_workspace(workspace: &Path, path_str: &str, tool_name: &str) -> Result<PathBuf, ToolError> {
    let workspace = workspace
        .canonicalize()
        .unwrap_or_else(|_| workspace.to_path_buf());

    let joined = if Path::new(path_str).is_absolute() {
        PathBuf::from(path_str)
    } else {
        workspace.join(path_str)
    };

    let mut normalized = Vec::new();
    for component in joined.components() {
        match component {
            std::path::Component::ParentDir => {
                if normalized.pop().is_none() {
                    return Err(ToolError::PathEscape { path: path_str.to_string() });
                }
            }
            std::path::Component::CurDir => {}
            other => normalized.push(other),
        }
    }
    let resolved: PathBuf = normalized.iter().collect();

    if !resolved.starts_with(&workspace) {
        return Err(ToolError::PathEscape { path: path_str.to_string() });
    }
    Ok(resolved)
}

pub struct ReadFileTool {
    workspace: PathBuf,
}

impl ReadFileTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file in the workspace, optionally restricted to a line range."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path relative to the workspace root"},
                "start_line": {"type": "integer", "description": "1-based inclusive start line"},
                "end_line": {"type": "integer", "description": "1-based inclusive end line"}
            },
            "required": ["path"]
        })
    }

    fn disables_streaming(&self) -> bool {
        false
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let path_str = args["path"].as_str().ok_or_else(|| ToolError::InvalidArguments {
            name: "read_file".into(),
            reason: "'path' is required".into(),
        })?;
        let path = resolve_in_workspace(&self.workspace, path_str, "read_file")?;

        let content = tokio::fs::read_to_string(&path).await.map_err(|e| ToolError::ExecutionFailed {
            name: "read_file".into(),
            message: format!("failed to read '{path_str}': {e}"),
        })?;

        let start_line = args["start_line"].as_u64().map(|n| n as usize);
        let end_line = args["end_line"].as_u64().map(|n| n as usize);
        if start_line.is_none() && end_line.is_none() {
            return Ok(content);
        }

        let lines: Vec<&str> = content.lines().collect();
        let start = start_line.unwrap_or(1).saturating_sub(1);
        let end = end_line.unwrap_or(lines.len()).min(lines.len());
        if start >= lines.len() {
            return Ok(String::new());
        }
        Ok(lines[start..end].join("\n"))
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Low
    }
}

pub struct WriteFileTool {
    workspace: PathBuf,
}

impl WriteFileTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating it (and any parent directories) if needed. Overwrites existing content."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "content": {"type": "string"}
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let path_str = args["path"].as_str().ok_or_else(|| ToolError::InvalidArguments {
            name: "write_file".into(),
            reason: "'path' is required".into(),
        })?;
        let content = args["content"].as_str().ok_or_else(|| ToolError::InvalidArguments {
            name: "write_file".into(),
            reason: "'content' is required".into(),
        })?;
        let path = resolve_in_workspace(&self.workspace, path_str, "write_file")?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| ToolError::ExecutionFailed {
                name: "write_file".into(),
                message: format!("failed to create parent directories: {e}"),
            })?;
        }
        tokio::fs::write(&path, content).await.map_err(|e| ToolError::ExecutionFailed {
            name: "write_file".into(),
            message: format!("failed to write '{path_str}': {e}"),
        })?;
        debug!(path = %path.display(), bytes = content.len(), "wrote file");
        Ok(format!("wrote {} bytes to {path_str}", content.len()))
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
}

pub struct EditFileTool {
    workspace: PathBuf,
}

impl EditFileTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace an exact substring match in a file with new text. Fails if old_text is not found, \
         or is found more than once and replace_all is not set."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "old_text": {"type": "string"},
                "new_text": {"type": "string"},
                "replace_all": {"type": "boolean", "default": false}
            },
            "required": ["path", "old_text", "new_text"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let path_str = args["path"].as_str().ok_or_else(|| ToolError::InvalidArguments {
            name: "edit_file".into(),
            reason: "'path' is required".into(),
        })?;
        let old_text = args["old_text"].as_str().ok_or_else(|| ToolError::InvalidArguments {
            name: "edit_file".into(),
            reason: "'old_text' is required".into(),
        })?;
        let new_text = args["new_text"].as_str().ok_or_else(|| ToolError::InvalidArguments {
            name: "edit_file".into(),
            reason: "'new_text' is required".into(),
        })?;
        let replace_all = args["replace_all"].as_bool().unwrap_or(false);

        let path = resolve_in_workspace(&self.workspace, path_str, "edit_file")?;
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| ToolError::ExecutionFailed {
            name: "edit_file".into(),
            message: format!("failed to read '{path_str}': {e}"),
        })?;

        let occurrences = content.matches(old_text).count();
        if occurrences == 0 {
            return Err(ToolError::ExecutionFailed {
                name: "edit_file".into(),
                message: format!("'{old_text}' not found in {path_str}"),
            });
        }
        if occurrences > 1 && !replace_all {
            return Err(ToolError::ExecutionFailed {
                name: "edit_file".into(),
                message: format!(
                    "'{old_text}' matches {occurrences} locations in {path_str}; pass replace_all to replace them all"
                ),
            });
        }

        let updated = if replace_all {
            content.replace(old_text, new_text)
        } else {
            content.replacen(old_text, new_text, 1)
        };
        tokio::fs::write(&path, &updated).await.map_err(|e| ToolError::ExecutionFailed {
            name: "edit_file".into(),
            message: format!("failed to write '{path_str}': {e}"),
        })?;
        Ok(format!("replaced {occurrences} occurrence(s) in {path_str}"))
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
}

pub struct ListFilesTool {
    workspace: PathBuf,
}

impl ListFilesTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }

    fn walk(dir: &Path, recursive: bool, max_depth: usize, depth: usize, out: &mut Vec<String>) {
        let Ok(entries) = std::fs::read_dir(dir) else { return };
        for entry in entries.flatten() {
            let path = entry.path();
            let is_dir = path.is_dir();
            out.push(format!("{}{}", path.display(), if is_dir { "/" } else { "" }));
            if is_dir && recursive && depth < max_depth {
                Self::walk(&path, recursive, max_depth, depth + 1, out);
            }
        }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files and directories under a workspace path, optionally recursive."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Defaults to the workspace root"},
                "recursive": {"type": "boolean", "default": false},
                "max_depth": {"type": "integer", "default": 3}
            }
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let path_str = args["path"].as_str().unwrap_or(".");
        let recursive = args["recursive"].as_bool().unwrap_or(false);
        let max_depth = args["max_depth"].as_u64().unwrap_or(3) as usize;
        let dir = resolve_in_workspace(&self.workspace, path_str, "list_files")?;

        let mut out = Vec::new();
        Self::walk(&dir, recursive, max_depth, 0, &mut out);
        Ok(out.join("\n"))
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Low
    }

    fn disables_streaming(&self) -> bool {
        false
    }
}

pub struct RunCommandTool {
    workspace: PathBuf,
    sandbox: Option<Arc<dyn SandboxExecutor>>,
}

impl RunCommandTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace, sandbox: None }
    }

    pub fn with_sandbox(workspace: PathBuf, sandbox: Arc<dyn SandboxExecutor>) -> Self {
        Self { workspace, sandbox: Some(sandbox) }
    }
}

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Run a shell command in the workspace, via the configured sandbox executor when one is set."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {"type": "string"},
                "working_dir": {"type": "string", "description": "Relative to the workspace root"}
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let command = args["command"].as_str().ok_or_else(|| ToolError::InvalidArguments {
            name: "run_command".into(),
            reason: "'command' is required".into(),
        })?;
        let cwd = match args["working_dir"].as_str() {
            Some(rel) => Some(resolve_in_workspace(&self.workspace, rel, "run_command")?),
            None => None,
        };

        let output = match &self.sandbox {
            Some(sandbox) => sandbox
                .execute(command, cwd.as_deref(), &Default::default())
                .await
                .map_err(|e| sandbox_to_tool_error(e))?,
            None => {
                let exec = prime_core::sandbox::SubprocessExecutor::new(self.workspace.clone());
                exec.execute(command, cwd.as_deref(), &Default::default())
                    .await
                    .map_err(sandbox_to_tool_error)?
            }
        };

        Ok(format!(
            "exit code: {}\nstdout:\n{}\nstderr:\n{}",
            output.exit_code, output.stdout, output.stderr
        ))
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::High
    }

    fn disables_streaming(&self) -> bool {
        true
    }
}

fn sandbox_to_tool_error(err: SandboxError) -> ToolError {
    ToolError::ExecutionFailed {
        name: "run_command".into(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let write = WriteFileTool::new(dir.path().to_path_buf());
        write.execute(serde_json::json!({"path": "a.txt", "content": "hello"})).await.unwrap();

        let read = ReadFileTool::new(dir.path().to_path_buf());
        let out = read.execute(serde_json::json!({"path": "a.txt"})).await.unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn read_file_rejects_escape() {
        let dir = tempdir().unwrap();
        let read = ReadFileTool::new(dir.path().to_path_buf());
        let err = read.execute(serde_json::json!({"path": "../../etc/passwd"})).await.unwrap_err();
        assert!(matches!(err, ToolError::PathEscape { .. }));
    }

    #[tokio::test]
    async fn edit_file_requires_unique_match_without_replace_all() {
        let dir = tempdir().unwrap();
        let write = WriteFileTool::new(dir.path().to_path_buf());
        write.execute(serde_json::json!({"path": "a.txt", "content": "foo foo"})).await.unwrap();

        let edit = EditFileTool::new(dir.path().to_path_buf());
        let err = edit
            .execute(serde_json::json!({"path": "a.txt", "old_text": "foo", "new_text": "bar"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));

        edit.execute(serde_json::json!({"path": "a.txt", "old_text": "foo", "new_text": "bar", "replace_all": true}))
            .await
            .unwrap();
        let read = ReadFileTool::new(dir.path().to_path_buf());
        let out = read.execute(serde_json::json!({"path": "a.txt"})).await.unwrap();
        assert_eq!(out, "bar bar");
    }

    #[tokio::test]
    async fn run_command_executes_via_default_subprocess() {
        let dir = tempdir().unwrap();
        let tool = RunCommandTool::new(dir.path().to_path_buf());
        let out = tool.execute(serde_json::json!({"command": "echo hi"})).await.unwrap();
        assert!(out.contains("hi"));
    }
}
