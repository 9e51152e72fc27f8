use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::config::ConfigError;

pub const DEFAULT_CONFIG_FILE: &str = "agentx.toml";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScreenSide {
    Left,
    Right,
}

impl Default for ScreenSide {
    fn default() -> Self {
        ScreenSide::Right
    }
}

/// The `[agentx]` table of agentx.toml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentxConfig {
    #[serde(default = "default_ollama_host")]
    pub ollama_host: String,
    #[serde(default = "default_ollama_model")]
    pub ollama_model: String,
    #[serde(default = "default_initial_load_timeout")]
    pub ollama_initial_load_timeout_seconds: u64,
    #[serde(default = "default_sessions_root")]
    pub sessions_root: String,
    #[serde(default)]
    pub screen_side: ScreenSide,
    #[serde(default = "default_user_prompt_background")]
    pub user_prompt_font_background: String,
    #[serde(default = "default_agent_response_background")]
    pub agent_response_font_background: String,
    #[serde(default = "default_agent_thinking_background")]
    pub agent_thinking_font_background: String,
    #[serde(default = "default_system_background")]
    pub system_font_background: String,
}

fn default_ollama_host() -> String {
    "localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.2".to_string()
}

fn default_initial_load_timeout() -> u64 {
    120
}

fn default_sessions_root() -> String {
    "sessions".to_string()
}

fn default_user_prompt_background() -> String {
    "lightblue".to_string()
}

fn default_agent_response_background() -> String {
    "white".to_string()
}

fn default_agent_thinking_background() -> String {
    "lightgray".to_string()
}

fn default_system_background() -> String {
    "#ffffff".to_string()
}

impl Default for AgentxConfig {
    fn default() -> Self {
        Self {
            ollama_host: default_ollama_host(),
            ollama_model: default_ollama_model(),
            ollama_initial_load_timeout_seconds: default_initial_load_timeout(),
            sessions_root: default_sessions_root(),
            screen_side: ScreenSide::default(),
            user_prompt_font_background: default_user_prompt_background(),
            agent_response_font_background: default_agent_response_background(),
            agent_thinking_font_background: default_agent_thinking_background(),
            system_font_background: default_system_background(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub agentx: AgentxConfig,
}

impl AppConfig {
    /// Platform config location, e.g. ~/.config/agentx/agentx.toml
    fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "agentx")
            .map(|dirs| dirs.config_dir().join(DEFAULT_CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// ./agentx.toml, then the platform config dir, then defaults.
    /// A file that exists but cannot be parsed is reported and skipped.
    pub fn load() -> Self {
        let candidates = std::iter::once(PathBuf::from(DEFAULT_CONFIG_FILE)).chain(Self::config_path());
        for path in candidates {
            if !path.exists() {
                continue;
            }
            match Self::load_from(&path) {
                Ok(config) => {
                    debug!(path = %path.display(), "loaded config");
                    return config;
                }
                Err(e) => warn!(error = %e, "ignoring config file"),
            }
        }
        Self::default()
    }

    /// Values from the environment win over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("AGENTX_OLLAMA_HOST") {
            if !host.is_empty() {
                self.agentx.ollama_host = host;
            }
        }
        if let Ok(model) = std::env::var("AGENTX_OLLAMA_MODEL") {
            if !model.is_empty() {
                self.agentx.ollama_model = model;
            }
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path()
            .ok_or_else(|| ConfigError::Write("Could not determine config path".to_string()))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::Write(format!("Failed to create config directory: {e}"))
            })?;
        }

        let toml_str = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Write(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, toml_str)
            .map_err(|e| ConfigError::Write(format!("Failed to write file: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_partial_table_when_parsed_then_missing_keys_default() {
        // Given
        let text = r#"
            [agentx]
            ollama_host = "10.0.0.5:11434"
            ollama_model = "qwen3:8b"
            screen_side = "left"
        "#;

        // When
        let config: AppConfig = toml::from_str(text).unwrap();

        // Then
        assert_eq!(config.agentx.ollama_host, "10.0.0.5:11434");
        assert_eq!(config.agentx.ollama_model, "qwen3:8b");
        assert_eq!(config.agentx.screen_side, ScreenSide::Left);
        assert_eq!(config.agentx.ollama_initial_load_timeout_seconds, 120);
        assert_eq!(config.agentx.sessions_root, "sessions");
        assert_eq!(config.agentx.agent_thinking_font_background, "lightgray");
    }

    #[test]
    fn given_empty_file_when_parsed_then_defaults() {
        // When
        let config: AppConfig = toml::from_str("").unwrap();

        // Then
        assert_eq!(config.agentx.ollama_host, default_ollama_host());
        assert_eq!(config.agentx.screen_side, ScreenSide::Right);
    }

    #[test]
    fn given_saved_config_when_loaded_then_values_match() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(DEFAULT_CONFIG_FILE);
        let mut config = AppConfig::default();
        config.agentx.ollama_model = "gpt-oss:20b".to_string();

        // When
        config.save_to(&path).unwrap();
        let loaded = AppConfig::load_from(&path).unwrap();

        // Then
        assert_eq!(loaded.agentx.ollama_model, "gpt-oss:20b");
    }

    #[test]
    fn given_bad_toml_when_loaded_then_parse_error() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "[agentx\nollama_host = ").unwrap();

        // When
        let result = AppConfig::load_from(&path);

        // Then
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn given_layout_and_colour_keys_when_saved_then_they_round_trip() {
        // Given
        let text = r##"
            [agentx]
            screen_side = "left"
            user_prompt_font_background = "#ddeeff"
            agent_response_font_background = "ivory"
            agent_thinking_font_background = "silver"
            system_font_background = "#000000"
        "##;
        let config: AppConfig = toml::from_str(text).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);

        // When
        config.save_to(&path).unwrap();
        let loaded = AppConfig::load_from(&path).unwrap();

        // Then
        assert_eq!(loaded.agentx.screen_side, ScreenSide::Left);
        assert_eq!(loaded.agentx.user_prompt_font_background, "#ddeeff");
        assert_eq!(loaded.agentx.agent_response_font_background, "ivory");
        assert_eq!(loaded.agentx.agent_thinking_font_background, "silver");
        assert_eq!(loaded.agentx.system_font_background, "#000000");
    }
}
