//! Engine and server configuration.
//!
//! Settings come from an optional TOML file named by `QUIZDUEL_CONFIG_PATH`; every field has a
//! default. Environment variables (`PORT`, `DATABASE_PATH`, `OPENAI_API_KEY`, `OPENAI_BASE_URL`,
//! `OPENAI_MODEL`) override the file.

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

use crate::content::BankEntry;

pub const CONFIG_PATH_ENV: &str = "QUIZDUEL_CONFIG_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}

/// Tunables of the challenge engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How many questions Start asks the content provider for.
    pub questions_per_challenge: usize,
    pub invite_code_attempts: usize,
    /// Age after which an unjoined challenge is expired by the sweep.
    pub waiting_expiry_secs: u64,
    /// Zero disables the background sweep.
    pub sweep_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            questions_per_challenge: 10,
            invite_code_attempts: crate::invite::DEFAULT_INVITE_ATTEMPTS,
            waiting_expiry_secs: 86400,
            sweep_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        OpenAiConfig {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// SQLite path; `":memory:"` keeps everything in process.
    pub database_path: String,
    pub engine: EngineConfig,
    pub openai: OpenAiConfig,
    /// User id to display handle.
    pub display_names: HashMap<String, String>,
    pub question_bank: Vec<BankEntry>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 3000,
            database_path: "quizduel.db".to_string(),
            engine: EngineConfig::default(),
            openai: OpenAiConfig::default(),
            display_names: HashMap::new(),
            question_bank: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(raw: &str) -> Result<ServerConfig, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_file(path: &str) -> Result<ServerConfig, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        let config = ServerConfig::from_toml_str(&raw)?;
        tracing::info!(%path, "loaded config file");
        Ok(config)
    }

    /// File named by `QUIZDUEL_CONFIG_PATH` (or defaults), then environment overrides.
    pub fn load() -> Result<ServerConfig, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => ServerConfig::from_file(&path)?,
            Err(_) => ServerConfig::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "PORT".to_string(),
                value: port.clone(),
            })?;
        }
        if let Some(path) = lookup("DATABASE_PATH") {
            self.database_path = path;
        }
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.openai.api_key = Some(key);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.openai.base_url = url;
        }
        if let Some(model) = lookup("OPENAI_MODEL") {
            self.openai.model = model;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = ServerConfig::from_toml_str("").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.engine.questions_per_challenge, 10);
        assert_eq!(config.engine.invite_code_attempts, 5);
    }

    #[test]
    fn parses_nested_tables() {
        let raw = r#"
            port = 8080
            database_path = ":memory:"

            [engine]
            questions_per_challenge = 3
            sweep_interval_secs = 0

            [display_names]
            X = "Ada"

            [[question_bank]]
            subject = "History"
            topic = "Rome"
            questions = [
                { text = "First emperor?", options = ["Augustus", "Nero"], correct_answer = "Augustus" },
            ]
        "#;
        let config = ServerConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.engine.questions_per_challenge, 3);
        assert_eq!(config.engine.waiting_expiry_secs, 86400);
        assert_eq!(config.engine.sweep_interval_secs, 0);
        assert_eq!(config.display_names.get("X").map(String::as_str), Some("Ada"));
        assert_eq!(config.question_bank.len(), 1);
        assert_eq!(config.question_bank[0].questions[0].correct_answer, "Augustus");
    }

    #[test]
    fn rejects_broken_toml() {
        assert!(matches!(
            ServerConfig::from_toml_str("port = \"not a number\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut config = ServerConfig::default();
        let env: HashMap<&str, &str> = HashMap::from([
            ("PORT", "4000"),
            ("DATABASE_PATH", "/tmp/duel.db"),
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_MODEL", "gpt-test"),
        ]);
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.database_path, "/tmp/duel.db");
        assert_eq!(config.openai.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.openai.model, "gpt-test");
        assert_eq!(config.openai.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn invalid_port_override_is_reported() {
        let mut config = ServerConfig::default();
        let result = config.apply_overrides(|key| (key == "PORT").then(|| "eighty".to_string()));
        assert!(matches!(result, Err(ConfigError::InvalidValue { key, .. }) if key == "PORT"));
    }

    #[test]
    fn blank_api_key_is_ignored() {
        let mut config = ServerConfig::default();
        config.apply_overrides(|key| (key == "OPENAI_API_KEY").then(|| "  ".to_string())).unwrap();
        assert_eq!(config.openai.api_key, None);
    }
}
