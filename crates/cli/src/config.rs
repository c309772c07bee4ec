//! Configuration loading from musezen.toml.

use std::path::Path;
use std::time::Duration;

use runtime::{AgentConfig, CommandClassifier, SYSTEM_PROMPT, SessionOptions, WELCOME_MESSAGE};
use serde::Deserialize;

pub const CONFIG_FILE: &str = "musezen.toml";

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub agent: AgentSection,
    pub artsy: ArtsyConfig,
    pub classifier: Option<ClassifierConfig>,
    pub guard: GuardConfig,
}

/// Model gateway settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Provider name (only "openai" is supported).
    pub provider: String,
    pub model: String,
    /// Falls back to `OPENAI_API_KEY`.
    pub api_key: Option<String>,
    pub base_url: String,
    pub max_tokens: Option<u32>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens: None,
        }
    }
}

/// Agent loop and persona settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub max_round_trips: usize,
    /// Per-tool time limit; 0 disables it.
    pub tool_timeout_secs: u64,
    /// An empty prompt disables the system turn.
    pub system_prompt: Option<String>,
    pub welcome_message: Option<String>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_round_trips: runtime::DEFAULT_MAX_ROUND_TRIPS,
            tool_timeout_secs: 30,
            system_prompt: None,
            welcome_message: None,
        }
    }
}

/// Art database credentials. Falls back to `ARTSY_CLIENT_ID` / `ARTSY_CLIENT_SECRET`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ArtsyConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Prompt budget and reply moderation. Both are off unless set.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Refuse prompts estimated at this many tokens or more.
    pub max_prompt_tokens: Option<usize>,
    /// Safety classifier model (e.g. a Llama Guard deployment) vetting each answer.
    pub moderation_model: Option<String>,
    /// Defaults to `backend.base_url`.
    pub moderation_base_url: Option<String>,
}

/// External style classifier process.
#[derive(Debug, Deserialize)]
pub struct ClassifierConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Load `path` when given, else `musezen.toml` if present, else defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(CONFIG_FILE).exists() => Self::load(CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if config.backend.provider != "openai" {
            return Err(ConfigError::UnsupportedProvider(config.backend.provider));
        }
        Ok(config)
    }

    pub fn api_key(&self) -> Result<String, ConfigError> {
        self.api_key_from(env_var)
    }

    fn api_key_from(&self, env: impl Fn(&str) -> Option<String>) -> Result<String, ConfigError> {
        self.backend
            .api_key
            .clone()
            .or_else(|| env("OPENAI_API_KEY"))
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    /// Art database credentials, if any are configured.
    pub fn artsy_credentials(&self) -> Option<(String, String)> {
        self.artsy_credentials_from(env_var)
    }

    fn artsy_credentials_from(
        &self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Option<(String, String)> {
        let id = self.artsy.client_id.clone().or_else(|| env("ARTSY_CLIENT_ID"))?;
        let secret = self
            .artsy
            .client_secret
            .clone()
            .or_else(|| env("ARTSY_CLIENT_SECRET"))?;
        (!id.is_empty() && !secret.is_empty()).then_some((id, secret))
    }

    pub fn session_options(&self) -> SessionOptions {
        let system_prompt = match self.agent.system_prompt.as_deref() {
            None => Some(SYSTEM_PROMPT.to_string()),
            Some("") => None,
            Some(prompt) => Some(prompt.to_string()),
        };
        let tool_timeout = (self.agent.tool_timeout_secs > 0)
            .then(|| Duration::from_secs(self.agent.tool_timeout_secs));

        SessionOptions {
            system_prompt,
            welcome_message: self
                .agent
                .welcome_message
                .clone()
                .unwrap_or_else(|| WELCOME_MESSAGE.to_string()),
            agent: AgentConfig {
                max_round_trips: self.agent.max_round_trips,
                tool_timeout,
            },
        }
    }

    /// Model and endpoint of the reply moderator, if one is configured.
    pub fn moderation(&self) -> Option<(&str, &str)> {
        let model = self.guard.moderation_model.as_deref().filter(|m| !m.is_empty())?;
        let base_url = self
            .guard
            .moderation_base_url
            .as_deref()
            .unwrap_or(&self.backend.base_url);
        Some((model, base_url))
    }

    pub fn classifier(&self) -> Option<CommandClassifier> {
        self.classifier
            .as_ref()
            .map(|c| CommandClassifier::new(&c.command).with_args(&c.args))
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("unsupported provider '{0}': only 'openai' is available")]
    UnsupportedProvider(String),

    #[error("no API key: set backend.api_key in musezen.toml or OPENAI_API_KEY")]
    MissingApiKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.backend.provider, "openai");
        assert_eq!(config.backend.model, "gpt-4o-mini");
        assert_eq!(config.backend.base_url, "https://api.openai.com/v1");
        assert_eq!(config.agent.max_round_trips, 8);
        assert!(config.classifier.is_none());
        assert_eq!(config.guard.max_prompt_tokens, None);
        assert_eq!(config.moderation(), None);

        let options = config.session_options();
        assert_eq!(options.system_prompt.as_deref(), Some(SYSTEM_PROMPT));
        assert_eq!(options.welcome_message, WELCOME_MESSAGE);
        assert_eq!(options.agent.tool_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn full_file_parses() {
        let config = Config::parse(
            r#"
            [backend]
            model = "gpt-4o"
            api_key = "sk-file"
            base_url = "http://localhost:8080/v1"
            max_tokens = 1024

            [agent]
            max_round_trips = 3
            tool_timeout_secs = 0
            system_prompt = ""
            welcome_message = "Bonjour!"

            [artsy]
            client_id = "id"
            client_secret = "secret"

            [classifier]
            command = "python3"
            args = ["classify.py", "--model", "weights.h5"]
            "#,
        )
        .unwrap();

        assert_eq!(config.backend.model, "gpt-4o");
        assert_eq!(config.backend.max_tokens, Some(1024));
        assert_eq!(config.api_key_from(no_env).unwrap(), "sk-file");
        assert_eq!(
            config.artsy_credentials_from(no_env),
            Some(("id".to_string(), "secret".to_string()))
        );
        assert!(config.classifier().is_some());

        let options = config.session_options();
        assert_eq!(options.system_prompt, None);
        assert_eq!(options.welcome_message, "Bonjour!");
        assert_eq!(options.agent.max_round_trips, 3);
        assert_eq!(options.agent.tool_timeout, None);
    }

    #[test]
    fn guard_section_parses() {
        let config = Config::parse(
            r#"
            [backend]
            base_url = "http://localhost:8080/v1"

            [guard]
            max_prompt_tokens = 3072
            moderation_model = "meta-llama/Llama-Guard-3-8B"
            "#,
        )
        .unwrap();

        assert_eq!(config.guard.max_prompt_tokens, Some(3072));
        assert_eq!(
            config.moderation(),
            Some(("meta-llama/Llama-Guard-3-8B", "http://localhost:8080/v1"))
        );

        let elsewhere = Config::parse(
            "[guard]\nmoderation_model = \"guard\"\nmoderation_base_url = \"http://guard:9000/v1\"\n",
        )
        .unwrap();
        assert_eq!(elsewhere.moderation(), Some(("guard", "http://guard:9000/v1")));

        let blank = Config::parse("[guard]\nmoderation_model = \"\"\n").unwrap();
        assert_eq!(blank.moderation(), None);
    }

    #[test]
    fn credentials_fall_back_to_environment() {
        let env = |key: &str| match key {
            "OPENAI_API_KEY" => Some("sk-env".to_string()),
            "ARTSY_CLIENT_ID" => Some("env-id".to_string()),
            "ARTSY_CLIENT_SECRET" => Some("env-secret".to_string()),
            _ => None,
        };
        let config = Config::default();
        assert_eq!(config.api_key_from(env).unwrap(), "sk-env");
        assert_eq!(
            config.artsy_credentials_from(env),
            Some(("env-id".to_string(), "env-secret".to_string()))
        );
    }

    #[test]
    fn missing_credentials() {
        let config = Config::default();
        assert!(matches!(
            config.api_key_from(no_env),
            Err(ConfigError::MissingApiKey)
        ));
        assert_eq!(config.artsy_credentials_from(no_env), None);

        let half = Config::parse("[artsy]\nclient_id = \"id\"\n").unwrap();
        assert_eq!(half.artsy_credentials_from(no_env), None);
    }

    #[test]
    fn other_providers_are_rejected() {
        let err = Config::parse("[backend]\nprovider = \"anthropic\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedProvider(ref p) if p == "anthropic"));
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        assert!(matches!(
            Config::parse("[backend\nmodel = 1"),
            Err(ConfigError::Parse(_))
        ));
    }
}
