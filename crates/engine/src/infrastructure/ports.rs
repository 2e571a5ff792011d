//! Port traits for external collaborators.
//!
//! The engine core depends only on these interfaces; concrete providers
//! (CLI subprocess, hosted streaming API) and the reward granter are wired
//! up in `main` and can be swapped without touching the core.

use async_trait::async_trait;

use dungeonterm_shared::ServerMessage;

use crate::infrastructure::gm::parser::ParsedHp;
use crate::infrastructure::session::{ConversationTurn, Role};

/// Callback invoked for every message as it is parsed out of the stream,
/// so clients see narration progressively instead of after the full turn.
pub type MessageSink = dyn Fn(ServerMessage) + Send + Sync;

/// Result of one full GM turn.
///
/// `raw_text` is the exact concatenation of everything the provider
/// produced, pre-parse; it is what goes into conversation history so the
/// model's context window sees exactly what it generated.
#[derive(Debug, Clone, Default)]
pub struct GmTurn {
    pub messages: Vec<ServerMessage>,
    pub hp_changes: Vec<ParsedHp>,
    pub raw_text: String,
    /// Opaque continuation id for providers with session resume.
    pub provider_session_id: Option<String>,
}

impl GmTurn {
    /// Append a single `error` message for a provider failure, forwarding
    /// it through the sink. The turn still resolves with whatever partial
    /// content was accumulated.
    pub fn push_error(&mut self, text: impl Into<String>, on_message: &MessageSink) {
        let msg = ServerMessage::Error { text: text.into() };
        self.messages.push(msg.clone());
        on_message(msg);
    }
}

/// Internal provider failures. These never cross the turn boundary as
/// errors; providers convert them into a single `error` message.
#[derive(Debug, thiserror::Error)]
pub enum GmError {
    #[error("failed to spawn GM process: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("GM request failed: {0}")]
    Request(String),
    #[error("invalid GM response: {0}")]
    InvalidResponse(String),
}

/// A GM provider: anything that can turn a prompt plus history into a raw
/// text stream. Selected via configuration, never branched on in the core.
#[async_trait]
pub trait GmPort: Send + Sync {
    async fn invoke(
        &self,
        system_prompt: &str,
        history: &[ConversationTurn],
        on_message: &MessageSink,
        resume_id: Option<&str>,
    ) -> GmTurn;
}

/// Grants earned XP to external reward tokens. Fire-and-forget with its
/// own retry policy; the engine never blocks a turn on it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RewardPort: Send + Sync {
    async fn grant(&self, token_id: u64, amount: u32);

    async fn record_adventure(&self, record: AdventureRecord);
}

/// Per-floor adventure stats reported when a session ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdventureRecord {
    pub token_ids: Vec<u64>,
    pub floor: u32,
    /// 0 = abandoned/disconnect, 1 = floor cleared, 2 = party wipe.
    pub result: u8,
    pub xp_earned: u32,
    pub kill_count: u32,
}

/// Build the single prompt string sent to providers without native
/// role-separated history.
pub fn flatten_history(history: &[ConversationTurn]) -> String {
    let mut parts = Vec::with_capacity(history.len());
    for turn in history {
        match turn.role {
            Role::User => parts.push(format!("[Player]: {}", turn.content)),
            Role::Assistant => parts.push(format!("[Previous GM Response]:\n{}", turn.content)),
        }
    }
    parts.join("\n\n")
}
