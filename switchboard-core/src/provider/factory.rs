//! Provider factory for creating LLM providers based on configuration.

use super::error::Result;
use super::{OllamaProvider, OpenAiProvider, Provider, SharedProvider};
use crate::config::{LlmConfig, ProviderKind};
use crate::transport::http::HttpTransport;
use crate::transport::Transport;
use std::sync::Arc;
use tracing::info;

/// Creates a provider for `config`, talking HTTP through `reqwest`.
///
/// Supported providers:
/// - `ProviderKind::OpenAi` - OpenAI and OpenAI-compatible endpoints
/// - `ProviderKind::Ollama` - Ollama's `/api/chat`
///
/// The configuration is validated before anything else is built.
pub fn get_provider(config: &LlmConfig) -> Result<SharedProvider> {
    config.validate()?;
    let transport = HttpTransport::new(config.timeout())?;
    Ok(build(config, Arc::new(transport)))
}

/// Like [`get_provider`], but sends every request through `transport`.
pub fn get_provider_with_transport(
    config: &LlmConfig,
    transport: Arc<dyn Transport>,
) -> Result<SharedProvider> {
    config.validate()?;
    Ok(build(config, transport))
}

fn build(config: &LlmConfig, transport: Arc<dyn Transport>) -> SharedProvider {
    info!("Creating provider: {}", config.provider);

    let provider = match config.provider {
        ProviderKind::OpenAi => {
            let provider = OpenAiProvider::new(config, transport);
            info!("Using OpenAI-compatible provider at {}", provider.base_url());
            Provider::OpenAi(provider)
        }
        ProviderKind::Ollama => {
            let provider = OllamaProvider::new(config, transport);
            info!("Using Ollama provider at {}", provider.base_url());
            Provider::Ollama(provider)
        }
    };
    Arc::new(provider)
}
