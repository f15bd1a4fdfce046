//! Persistent configuration.
//!
//! Stored as `config.toml` in the platform config directory. Custom
//! model descriptors live here (the secret values themselves never do;
//! those belong to the credential store).

use std::fs;
use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::core::registry::ModelDescriptor;

/// Instruction text sent with every chat request unless overridden.
pub const DEFAULT_SYSTEM_PROMPT: &str = "Please respond as succinctly as possible, ensuring clarity and completeness. Prioritize brevity without sacrificing precision or understanding. Use concise language, expanding only when necessary to maintain accuracy. Incorporate principles of Nonviolent Communication naturally and thoughtfully, where relevant. When sharing code, provide only the complete code and add additional explanations only if absolutely necessary for clarity.";

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    /// Overrides [`DEFAULT_SYSTEM_PROMPT`] when set.
    pub system_prompt: Option<String>,
    /// Model id routed to when the caller does not pick one.
    pub selected_model: Option<String>,
    /// Transcription provider chosen in settings.
    pub transcription_provider: Option<String>,
    #[serde(default)]
    pub custom_models: Vec<ModelDescriptor>,
}

impl Config {
    pub fn load() -> Result<Config, Box<dyn std::error::Error>> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    pub fn load_from_path(config_path: &PathBuf) -> Result<Config, Box<dyn std::error::Error>> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let config_path = Self::config_path();
        self.save_to_path(&config_path)
    }

    pub fn save_to_path(&self, config_path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    fn project_dirs() -> ProjectDirs {
        ProjectDirs::from("org", "permacommons", "palaver")
            .expect("failed to determine config directory")
    }

    fn config_path() -> PathBuf {
        Self::project_dirs().config_dir().join("config.toml")
    }

    /// Where archived conversations are persisted.
    pub fn history_path() -> PathBuf {
        Self::project_dirs().data_dir().join("history.json")
    }

    pub fn system_prompt(&self) -> &str {
        self.system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }

    pub fn add_custom_model(&mut self, model: ModelDescriptor) {
        self.custom_models.push(model);
    }

    pub fn remove_custom_model(&mut self, model_id: &str) {
        self.custom_models.retain(|model| model.id != model_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn loading_a_missing_config_yields_defaults() {
        let temp_dir = TempDir::new().expect("temp dir");
        let config_path = temp_dir.path().join("missing.toml");

        let config = Config::load_from_path(&config_path).expect("load succeeds");
        assert_eq!(config.selected_model, None);
        assert_eq!(config.system_prompt(), DEFAULT_SYSTEM_PROMPT);
        assert!(config.custom_models.is_empty());
    }

    #[test]
    fn save_and_load_round_trip() {
        let temp_dir = TempDir::new().expect("temp dir");
        let config_path = temp_dir.path().join("config.toml");

        let mut config = Config {
            selected_model: Some("gemini-2.0-flash-exp".to_string()),
            transcription_provider: Some("lemonfox".to_string()),
            ..Default::default()
        };
        config.add_custom_model(ModelDescriptor {
            id: "qwen-72b".to_string(),
            display_label: "Qwen 72B".to_string(),
            short_label: "Q".to_string(),
            provider_id: "openrouter".to_string(),
            quick_access: false,
        });
        config.save_to_path(&config_path).expect("save succeeds");

        let loaded = Config::load_from_path(&config_path).expect("load succeeds");
        assert_eq!(
            loaded.selected_model,
            Some("gemini-2.0-flash-exp".to_string())
        );
        assert_eq!(loaded.transcription_provider, Some("lemonfox".to_string()));
        assert_eq!(loaded.custom_models.len(), 1);
        assert_eq!(loaded.custom_models[0].id, "qwen-72b");
    }

    #[test]
    fn system_prompt_override_wins() {
        let config = Config {
            system_prompt: Some("Answer in haiku.".to_string()),
            ..Default::default()
        };
        assert_eq!(config.system_prompt(), "Answer in haiku.");
    }

    #[test]
    fn remove_custom_model_by_id() {
        let mut config = Config::default();
        config.add_custom_model(ModelDescriptor {
            id: "m1".to_string(),
            display_label: "One".to_string(),
            short_label: "1".to_string(),
            provider_id: "openai".to_string(),
            quick_access: false,
        });
        config.remove_custom_model("m1");
        assert!(config.custom_models.is_empty());
    }
}
