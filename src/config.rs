//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use crate::Result;
use crate::error::Error;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Chat model to use
    #[serde(default = "default_model")]
    pub model: String,

    /// OpenAI API key (or `OPENAI_API_KEY`)
    #[serde(default)]
    pub openai_api_key: String,

    /// Base URL of an OpenAI-compatible chat completions API
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    /// Maximum model/tool round trips within one user turn
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Google OAuth client
    #[serde(default)]
    pub google: GoogleConfig,

    /// Tools that must be approved by the user before they run
    #[serde(default)]
    pub tools_requiring_confirmation: Vec<String>,

    /// Request timeout for every outbound HTTP call
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default)]
    pub endpoints: Endpoints,
}

/// Google OAuth client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: default_redirect_uri(),
        }
    }
}

/// Remote endpoints, overridable for tests and proxies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoints {
    #[serde(default = "default_gmail_api_base")]
    pub gmail_api_base: String,

    #[serde(default = "default_calendar_api_base")]
    pub calendar_api_base: String,

    #[serde(default = "default_oauth_auth_url")]
    pub oauth_auth_url: String,

    #[serde(default = "default_oauth_token_url")]
    pub oauth_token_url: String,

    #[serde(default = "default_userinfo_url")]
    pub userinfo_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            gmail_api_base: default_gmail_api_base(),
            calendar_api_base: default_calendar_api_base(),
            oauth_auth_url: default_oauth_auth_url(),
            oauth_token_url: default_oauth_token_url(),
            userinfo_url: default_userinfo_url(),
        }
    }
}

fn default_model() -> String {
    "gpt-5-mini".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_max_steps() -> usize {
    10
}

fn default_temperature() -> f32 {
    1.0
}

fn default_http_timeout() -> u64 {
    30
}

fn default_redirect_uri() -> String {
    "http://127.0.0.1:8787/oauth/gmail/callback".to_string()
}

fn default_gmail_api_base() -> String {
    "https://gmail.googleapis.com/gmail/v1".to_string()
}

fn default_calendar_api_base() -> String {
    "https://www.googleapis.com/calendar/v3".to_string()
}

fn default_oauth_auth_url() -> String {
    "https://accounts.google.com/o/oauth2/v2/auth".to_string()
}

fn default_oauth_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_userinfo_url() -> String {
    "https://www.googleapis.com/oauth2/v2/userinfo".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            openai_api_key: String::new(),
            openai_base_url: default_openai_base_url(),
            max_steps: default_max_steps(),
            temperature: default_temperature(),
            google: GoogleConfig::default(),
            tools_requiring_confirmation: Vec::new(),
            http_timeout_secs: default_http_timeout(),
            endpoints: Endpoints::default(),
        }
    }
}

impl Config {
    /// Apply environment overrides on top of file values.
    pub fn with_env_overrides(mut self) -> Self {
        let lookup = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.openai_api_key = key;
        }
        if let Some(id) = lookup("GOOGLE_CLIENT_ID") {
            self.google.client_id = id;
        }
        if let Some(secret) = lookup("GOOGLE_CLIENT_SECRET") {
            self.google.client_secret = secret;
        }
        if let Some(uri) = lookup("GOOGLE_REDIRECT_URI") {
            self.google.redirect_uri = uri;
        }
        self
    }

    /// Whether a chat model can be called at all.
    pub fn has_model_credentials(&self) -> bool {
        !self.openai_api_key.trim().is_empty()
    }

    /// Fails before any chat input is accepted when the model key is missing.
    pub fn require_model_credentials(&self) -> Result<()> {
        if self.has_model_credentials() {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "OPENAI_API_KEY is not set. Add \"openai_api_key\" to {:?} or export OPENAI_API_KEY.",
                config_path()
            )))
        }
    }

    /// Fails when the Google OAuth client is not configured.
    pub fn require_google_client(&self) -> Result<()> {
        if self.google.client_id.is_empty() || self.google.client_secret.is_empty() {
            return Err(Error::Config("Gmail OAuth not configured".to_string()));
        }
        Ok(())
    }
}

/// Get the config directory path
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".orbit")
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Stored OAuth tokens
pub fn tokens_path() -> PathBuf {
    config_dir().join("tokens.json")
}

/// Persisted scheduled tasks
pub fn tasks_path() -> PathBuf {
    config_dir().join("tasks.json")
}

/// Persisted conversation history
pub fn history_path() -> PathBuf {
    config_dir().join("history.json")
}

/// Load configuration from file, falling back to defaults when absent.
pub fn load() -> Result<Config> {
    let path = config_path();

    let config = if path.exists() {
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str::<Config>(&content)
            .map_err(|e| Error::Config(format!("Invalid config at {:?}: {}", path, e)))?
    } else {
        tracing::debug!("No config at {:?}, using defaults", path);
        Config::default()
    };

    Ok(config.with_env_overrides())
}

/// Save configuration to file
pub fn save(config: &Config) -> Result<()> {
    let path = config_path();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, content)?;
    Ok(())
}

/// Interactive first-run setup.
pub fn init() -> Result<()> {
    use crate::ui;
    use inquire::{Confirm, Password, Text};

    ui::print_header("Setup", "Gmail & Calendar");

    let mut config = if config_path().exists() { load()? } else { Config::default() };

    let prompt_err = |e: inquire::InquireError| Error::Config(format!("Prompt failed: {}", e));

    if !config.has_model_credentials() {
        config.openai_api_key = Password::new("Enter your OpenAI API key:")
            .without_confirmation()
            .prompt()
            .map_err(prompt_err)?;
    }

    let configure_google = Confirm::new("Configure the Google OAuth client now?")
        .with_default(true)
        .prompt()
        .map_err(prompt_err)?;

    if configure_google {
        ui::print_step("Create an OAuth client of type \"Web application\" in Google Cloud Console");
        ui::print_step(&format!("Add {} as an authorized redirect URI", config.google.redirect_uri));
        config.google.client_id = Text::new("Client ID:").prompt().map_err(prompt_err)?;
        config.google.client_secret = Password::new("Client secret:")
            .without_confirmation()
            .prompt()
            .map_err(prompt_err)?;
    }

    ui::print_thinking("Saving configuration");
    save(&config)?;
    ui::print_success(&format!("Configuration written to {:?}", config_path()));
    ui::print_step("Next: run 'orbit connect' to link your Google account.");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model, "gpt-5-mini");
        assert_eq!(config.max_steps, 10);
        assert!(config.tools_requiring_confirmation.is_empty());
        assert!(!config.has_model_credentials());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"openai_api_key": "sk-test", "max_steps": 4}"#).unwrap();
        assert_eq!(config.max_steps, 4);
        assert_eq!(config.endpoints.gmail_api_base, "https://gmail.googleapis.com/gmail/v1");
        assert!(config.require_model_credentials().is_ok());
    }

    #[test]
    fn test_missing_model_key_is_reported() {
        let config = Config::default();
        let err = config.require_model_credentials().unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_missing_google_client_is_reported() {
        let err = Config::default().require_google_client().unwrap_err();
        assert!(err.to_string().contains("Gmail OAuth not configured"));
    }
}
