//! Sandbox & Worker Pool (C16).
//!
//! Commands classified as risky by the node runtime (C11), and any tool
//! with [`crate::types::RiskLevel::Critical`] or above, dispatch through a
//! `SandboxExecutor` rather than running inline on the gateway's async
//! worker threads. The default implementation just shells out with
//! `tokio::process::Command`; a real deployment can swap in a
//! container/VM-backed executor behind the same trait.

use crate::error::SandboxError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct SandboxOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait SandboxExecutor: Send + Sync {
    async fn execute(
        &self,
        command: &str,
        working_dir: Option<&Path>,
        env: &HashMap<String, String>,
    ) -> Result<SandboxOutput, SandboxError>;
}

/// Shells out via `sh -c`, capturing stdio, mirroring the teacher's
/// buffered shell-execution path.
pub struct SubprocessExecutor {
    default_working_dir: PathBuf,
    timeout_secs: u64,
}

impl SubprocessExecutor {
    pub fn new(default_working_dir: PathBuf) -> Self {
        Self {
            default_working_dir,
            timeout_secs: 120,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

#[async_trait]
impl SandboxExecutor for SubprocessExecutor {
    async fn execute(
        &self,
        command: &str,
        working_dir: Option<&Path>,
        env: &HashMap<String, String>,
    ) -> Result<SandboxOutput, SandboxError> {
        let cwd = working_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.default_working_dir.clone());

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(command).current_dir(&cwd);
        for (k, v) in env {
            cmd.env(k, v);
        }

        let fut = cmd.output();
        let output = tokio::time::timeout(std::time::Duration::from_secs(self.timeout_secs), fut)
            .await
            .map_err(|_| SandboxError::Execution {
                message: format!("command timed out after {}s", self.timeout_secs),
            })?
            .map_err(|e| SandboxError::Spawn {
                message: e.to_string(),
            })?;

        Ok(SandboxOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_command_and_captures_stdout() {
        let exec = SubprocessExecutor::new(std::env::temp_dir());
        let out = exec.execute("echo hello", None, &HashMap::new()).await.unwrap();
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn nonzero_exit_code_is_not_an_error() {
        let exec = SubprocessExecutor::new(std::env::temp_dir());
        let out = exec.execute("exit 3", None, &HashMap::new()).await.unwrap();
        assert_eq!(out.exit_code, 3);
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let exec = SubprocessExecutor::new(std::env::temp_dir()).with_timeout(1);
        let err = exec.execute("sleep 5", None, &HashMap::new()).await.unwrap_err();
        assert!(matches!(err, SandboxError::Execution { .. }));
    }
}
