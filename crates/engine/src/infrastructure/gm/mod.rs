//! GM providers and the response parsing pipeline.
//!
//! A provider is whatever mechanism turns prompt + history into raw text:
//! a CLI subprocess with session continuation or a hosted streaming API.
//! Both feed the same line streamer and tag parser, so the rest of the
//! engine never knows which one is configured.

pub mod parser;
pub mod stream;

mod anthropic;
mod claude_cli;

pub use anthropic::{AnthropicProvider, DEFAULT_ANTHROPIC_BASE_URL};
pub use claude_cli::ClaudeCliProvider;

use std::sync::Arc;

use crate::app::{EngineConfig, GmProviderKind};
use crate::infrastructure::ports::GmPort;

/// Build the configured provider. Selection happens once here; the core
/// only ever sees `dyn GmPort`.
pub fn provider_from_config(config: &EngineConfig) -> Arc<dyn GmPort> {
    match config.gm_provider {
        GmProviderKind::ClaudeCli => {
            tracing::info!(model = %config.cli_model, "GM provider: Claude CLI");
            Arc::new(ClaudeCliProvider::new(
                &config.cli_model,
                config.oauth_token.clone(),
            ))
        }
        GmProviderKind::AnthropicSdk => {
            tracing::info!(model = %config.sdk_model, "GM provider: Anthropic API");
            Arc::new(AnthropicProvider::new(
                &config.anthropic_base_url,
                &config.sdk_model,
                &config.api_key,
            ))
        }
    }
}
