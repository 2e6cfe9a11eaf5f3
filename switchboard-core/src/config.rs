use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Unknown provider type: {0}. Supported: openai, ollama")]
    UnknownProvider(String),

    #[error("Missing API key for provider: {0}")]
    MissingApiKey(ProviderKind),

    #[error("Invalid base URL `{0}`, expected an http(s) URL")]
    InvalidBaseUrl(String),

    #[error("Model name must not be empty")]
    EmptyModel,
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// The supported backend families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProviderKind {
    /// OpenAI's chat-completions API and compatible proxies.
    OpenAi,
    /// A local or remote Ollama server.
    Ollama,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Ollama => "ollama",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => OPENAI_BASE_URL,
            ProviderKind::Ollama => OLLAMA_BASE_URL,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "open_ai" | "openai-compatible" | "openai_compatible" => {
                Ok(ProviderKind::OpenAi)
            }
            "ollama" => Ok(ProviderKind::Ollama),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

impl TryFrom<String> for ProviderKind {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ProviderKind> for String {
    fn from(kind: ProviderKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Connection settings for one backend.
///
/// Built once, then handed to [`get_provider`](crate::get_provider). The
/// builder methods consume and return the value.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    pub model: String,
    /// Already resolved by the caller; the core never reads the environment.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Overrides [`ProviderKind::default_base_url`].
    #[serde(default)]
    pub base_url: Option<String>,
    /// Applied to every request sent through the default transport.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl LlmConfig {
    pub fn new(provider: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            api_key: None,
            base_url: None,
            timeout_ms: None,
        }
    }

    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Set the API key sent as a bearer token.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the base URL for the provider.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// The configured base URL, or the provider's default, without a trailing slash.
    pub fn resolved_base_url(&self) -> String {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Checks the settings the selected provider needs.
    ///
    /// OpenAI's own endpoint needs a key; compatible proxies behind a custom
    /// base URL may not. Ollama needs none.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::EmptyModel);
        }

        let base_url = self.resolved_base_url();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(base_url));
        }

        let has_key = self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty());
        if self.provider == ProviderKind::OpenAi && base_url == OPENAI_BASE_URL && !has_key {
            return Err(ConfigError::MissingApiKey(self.provider));
        }
        Ok(())
    }
}

/// Builds a configuration from the plain strings a settings form collects.
pub fn build_config(
    provider: &str,
    model: &str,
    api_key: Option<&str>,
    base_url: Option<&str>,
) -> Result<LlmConfig> {
    let mut config = LlmConfig::new(provider.parse()?, model);
    if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
        config = config.with_api_key(key);
    }
    if let Some(url) = base_url.filter(|u| !u.trim().is_empty()) {
        config = config.with_base_url(url);
    }
    config.validate()?;
    Ok(config)
}
