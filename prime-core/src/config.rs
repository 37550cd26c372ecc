//! Layered configuration for Prime.
//!
//! Mirrors the teacher's `figment`-based layering: built-in defaults, then an
//! optional `prime.toml` file, then `PRIME_`-prefixed environment variables
//! win. See spec §6 for the full environment variable list.

use crate::error::ConfigError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
    pub broadcast_capacity: usize,
    pub mailbox_depth: usize,
    pub heartbeat_interval_secs: u64,
    pub idle_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            max_connections: 1024,
            broadcast_capacity: 1024,
            mailbox_depth: 1024,
            heartbeat_interval_secs: 20,
            idle_timeout_secs: 45,
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretsConfig {
    pub secret_key: Option<String>,
    pub jwt_secret: Option<String>,
    pub app_public_url: Option<String>,
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_tokens: Vec<String>,
    pub allowed_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackConfig {
    pub bot_token: Option<String>,
    pub app_token: Option<String>,
    pub signing_secret: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    pub token: Option<String>,
    pub phone_id: Option<String>,
    pub verify_token: Option<String>,
    pub app_secret: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderKeys {
    pub openai: Option<String>,
    pub anthropic: Option<String>,
    pub deepseek: Option<String>,
    pub kimi: Option<String>,
    pub gemini: Option<String>,
    pub mistral: Option<String>,
    pub zai: Option<String>,
    pub qwen: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub rest: RestConfig,
    pub secrets: SecretsConfig,
    pub telegram: TelegramConfig,
    pub slack: SlackConfig,
    pub whatsapp: WhatsAppConfig,
    pub provider_keys: ProviderKeys,
    /// Default DM policy applied when an agent doesn't specify one explicitly.
    pub dm_policy: Option<String>,
}

impl AppConfig {
    /// Load configuration from built-in defaults, an optional `prime.toml`
    /// in the current directory, then `PRIME_`-prefixed environment
    /// variables (double-underscore separated for nested keys).
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

        if let Some(dirs) = directories::ProjectDirs::from("dev", "prime", "prime") {
            let user_config = dirs.config_dir().join("config.toml");
            if user_config.exists() {
                figment = figment.merge(Toml::file(&user_config));
            }
        }

        if let Some(path) = config_path {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        } else if Path::new("prime.toml").exists() {
            figment = figment.merge(Toml::file("prime.toml"));
        }
        figment = figment.merge(Env::prefixed("PRIME_").split("__"));

        figment.extract().map_err(|e| ConfigError::Invalid {
            message: e.to_string(),
        })
    }

    /// Validate required environment per spec §6; used by the CLI's
    /// `onboard`/`doctor` verbs.
    pub fn validate_environment(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.secrets.database_url.is_none() {
            problems.push("DATABASE_URL is not set".to_string());
        }
        match &self.secrets.secret_key {
            Some(key) if key.len() >= 16 => {}
            Some(_) => problems.push("SECRET_KEY must be at least 16 characters".to_string()),
            None => problems.push("SECRET_KEY is not set".to_string()),
        }
        if self.secrets.jwt_secret.is_none() {
            problems.push("JWT_SECRET is not set".to_string());
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.gateway.port, 8787);
        assert_eq!(cfg.gateway.heartbeat_interval_secs, 20);
    }

    #[test]
    fn validate_environment_flags_missing_secret_key() {
        let cfg = AppConfig::default();
        let problems = cfg.validate_environment();
        assert!(problems.iter().any(|p| p.contains("SECRET_KEY")));
    }

    #[test]
    fn validate_environment_flags_short_secret_key() {
        let mut cfg = AppConfig::default();
        cfg.secrets.secret_key = Some("short".into());
        cfg.secrets.jwt_secret = Some("x".repeat(20));
        cfg.secrets.database_url = Some("postgres://x".into());
        let problems = cfg.validate_environment();
        assert!(problems.iter().any(|p| p.contains("16 characters")));
    }
}
