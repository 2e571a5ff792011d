//! Conversation history for GM context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn in the conversation history sent to the GM provider.
///
/// Assistant content is the raw pre-parse text the model produced, so its
/// context window sees exactly what it generated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(role: Role, content: String) -> Self {
        Self {
            role,
            content,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_records_role_and_recent_timestamp() {
        let turn = ConversationTurn::new(Role::User, "advance".to_string());
        assert_eq!(turn.role, Role::User);
        let elapsed = Utc::now().signed_duration_since(turn.timestamp);
        assert!(elapsed.num_seconds() < 1);
    }
}
