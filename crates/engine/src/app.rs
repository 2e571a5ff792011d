//! Application state and composition.

use std::sync::Arc;
use std::time::Duration;

use crate::infrastructure::gm::provider_from_config;
use crate::infrastructure::ports::{GmPort, RewardPort};
use crate::infrastructure::prompts::{default_sections, PromptStore};
use crate::infrastructure::rewards::DisabledRewards;
use crate::infrastructure::session::SessionManager;

/// Which GM provider strategy to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GmProviderKind {
    /// `claude` CLI subprocess with session continuation.
    ClaudeCli,
    /// Anthropic Messages API with SSE streaming.
    AnthropicSdk,
}

/// Engine configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub host: String,
    pub port: u16,
    pub gm_provider: GmProviderKind,
    pub cli_model: String,
    pub sdk_model: String,
    pub anthropic_base_url: String,
    pub api_key: String,
    pub oauth_token: Option<String>,
    /// Hard ceiling on one provider call; a hung call becomes an `error`.
    pub turn_timeout: Duration,
    /// How often the staleness sweep runs.
    pub sweep_interval: Duration,
    pub cors_allowed_origins: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            gm_provider: GmProviderKind::AnthropicSdk,
            cli_model: "sonnet".to_string(),
            sdk_model: "claude-sonnet-4-5-20250929".to_string(),
            anthropic_base_url: crate::infrastructure::gm::DEFAULT_ANTHROPIC_BASE_URL.to_string(),
            api_key: String::new(),
            oauth_token: None,
            turn_timeout: Duration::from_secs(120),
            sweep_interval: Duration::from_secs(60),
            cors_allowed_origins: None,
        }
    }
}

impl EngineConfig {
    /// Read configuration from environment variables, with defaults for
    /// everything so a bare `cargo run` works.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let gm_provider = match std::env::var("GM_PROVIDER").as_deref() {
            Ok("claude-cli") => GmProviderKind::ClaudeCli,
            _ => GmProviderKind::AnthropicSdk,
        };

        Self {
            host: std::env::var("SERVER_HOST").unwrap_or(defaults.host),
            port: std::env::var("SERVER_PORT")
                .or_else(|_| std::env::var("PORT"))
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            gm_provider,
            cli_model: std::env::var("CLAUDE_CLI_MODEL").unwrap_or(defaults.cli_model),
            sdk_model: std::env::var("CLAUDE_MODEL").unwrap_or(defaults.sdk_model),
            anthropic_base_url: std::env::var("ANTHROPIC_BASE_URL")
                .unwrap_or(defaults.anthropic_base_url),
            api_key: std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            oauth_token: std::env::var("ANTHROPIC_AUTH_TOKEN").ok(),
            turn_timeout: std::env::var("GM_TURN_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.turn_timeout),
            sweep_interval: defaults.sweep_interval,
            cors_allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        }
    }
}

/// Main application state, passed to HTTP/WebSocket handlers via Axum.
pub struct App {
    pub config: EngineConfig,
    pub gm: Arc<dyn GmPort>,
    pub sessions: SessionManager,
    pub prompts: PromptStore,
    pub rewards: Arc<dyn RewardPort>,
}

impl App {
    pub fn new(config: EngineConfig) -> Self {
        let gm = provider_from_config(&config);
        Self {
            config,
            gm,
            sessions: SessionManager::new(),
            prompts: PromptStore::with_defaults(default_sections()),
            rewards: Arc::new(DisabledRewards),
        }
    }
}
