//! A filesystem-backed skills registry: a "skill" is a directory under
//! `<workspace>/.skills/<name>/` holding a `SKILL.md` description plus
//! whatever supporting files the skill needs. This is the fallback the
//! tool executor consults when a requested tool name isn't in the
//! registry (see `prime_core::tools::ToolRegistry::execute`).

use async_trait::async_trait;
use prime_core::error::ToolError;
use prime_core::tools::Tool;
use prime_core::types::RiskLevel;
use std::path::PathBuf;

fn skills_dir(workspace: &std::path::Path) -> PathBuf {
    workspace.join(".skills")
}

pub struct SkillListTool {
    workspace: PathBuf,
}

impl SkillListTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for SkillListTool {
    fn name(&self) -> &str {
        "skill_list"
    }

    fn description(&self) -> &str {
        "List installed skills (name and first line of their SKILL.md)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _args: serde_json::Value) -> Result<String, ToolError> {
        let dir = skills_dir(&self.workspace);
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return Ok("[]".to_string());
        };

        let mut skills = Vec::new();
        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let summary = std::fs::read_to_string(entry.path().join("SKILL.md"))
                .ok()
                .and_then(|s| s.lines().next().map(str::to_string))
                .unwrap_or_default();
            skills.push(serde_json::json!({ "name": name, "summary": summary }));
        }
        serde_json::to_string(&skills).map_err(|e| ToolError::ExecutionFailed {
            name: "skill_list".into(),
            message: e.to_string(),
        })
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Low
    }

    fn disables_streaming(&self) -> bool {
        false
    }
}

pub struct SkillInstallTool {
    workspace: PathBuf,
    client: reqwest::Client,
}

impl SkillInstallTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self {
            workspace,
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(15))
                .build()
                .expect("static reqwest client config is always valid"),
        }
    }
}

#[async_trait]
impl Tool for SkillInstallTool {
    fn name(&self) -> &str {
        "skill_install"
    }

    fn description(&self) -> &str {
        "Install a skill by downloading its SKILL.md from a URL into the local skills directory."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "skill_md_url": {"type": "string"}
            },
            "required": ["name", "skill_md_url"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let name = args["name"].as_str().ok_or_else(|| ToolError::InvalidArguments {
            name: "skill_install".into(),
            reason: "'name' is required".into(),
        })?;
        let url = args["skill_md_url"].as_str().ok_or_else(|| ToolError::InvalidArguments {
            name: "skill_install".into(),
            reason: "'skill_md_url' is required".into(),
        })?;

        let body = self.client.get(url).send().await.and_then(|r| r.error_for_status());
        let text = match body {
            Ok(resp) => resp.text().await.map_err(|e| ToolError::ExecutionFailed {
                name: "skill_install".into(),
                message: format!("failed reading skill body: {e}"),
            })?,
            Err(e) => {
                return Err(ToolError::ExecutionFailed {
                    name: "skill_install".into(),
                    message: format!("failed to download skill: {e}"),
                });
            }
        };

        let dir = skills_dir(&self.workspace).join(name);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| ToolError::ExecutionFailed {
            name: "skill_install".into(),
            message: format!("failed to create skill directory: {e}"),
        })?;
        tokio::fs::write(dir.join("SKILL.md"), text).await.map_err(|e| ToolError::ExecutionFailed {
            name: "skill_install".into(),
            message: format!("failed to write SKILL.md: {e}"),
        })?;
        Ok(format!("installed skill '{name}'"))
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
}

pub struct SkillCreateTool {
    workspace: PathBuf,
}

impl SkillCreateTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for SkillCreateTool {
    fn name(&self) -> &str {
        "skill_create"
    }

    fn description(&self) -> &str {
        "Create a new local skill from inline SKILL.md content."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "content": {"type": "string", "description": "SKILL.md content, first line used as the summary"}
            },
            "required": ["name", "content"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let name = args["name"].as_str().ok_or_else(|| ToolError::InvalidArguments {
            name: "skill_create".into(),
            reason: "'name' is required".into(),
        })?;
        let content = args["content"].as_str().ok_or_else(|| ToolError::InvalidArguments {
            name: "skill_create".into(),
            reason: "'content' is required".into(),
        })?;

        let dir = skills_dir(&self.workspace).join(name);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| ToolError::ExecutionFailed {
            name: "skill_create".into(),
            message: format!("failed to create skill directory: {e}"),
        })?;
        tokio::fs::write(dir.join("SKILL.md"), content).await.map_err(|e| ToolError::ExecutionFailed {
            name: "skill_create".into(),
            message: format!("failed to write SKILL.md: {e}"),
        })?;
        Ok(format!("created skill '{name}'"))
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn create_then_list_round_trips() {
        let dir = tempdir().unwrap();
        let create = SkillCreateTool::new(dir.path().to_path_buf());
        create
            .execute(serde_json::json!({"name": "greeter", "content": "Greets the user.\nMore detail."}))
            .await
            .unwrap();

        let list = SkillListTool::new(dir.path().to_path_buf());
        let out = list.execute(serde_json::json!({})).await.unwrap();
        assert!(out.contains("greeter"));
        assert!(out.contains("Greets the user."));
    }

    #[tokio::test]
    async fn list_with_no_skills_dir_is_empty() {
        let dir = tempdir().unwrap();
        let list = SkillListTool::new(dir.path().to_path_buf());
        assert_eq!(list.execute(serde_json::json!({})).await.unwrap(), "[]");
    }
}
