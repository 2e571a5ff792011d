//! WebSocket message types for client-engine communication.

use serde::{Deserialize, Serialize};

use dungeonterm_domain::PartyMember;

/// Messages from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start a game session with the given party.
    Init {
        party: Vec<PartyMember>,
        #[serde(default)]
        locale: Option<String>,
        #[serde(default)]
        floor: Option<u32>,
        #[serde(default, rename = "stageName")]
        stage_name: Option<String>,
    },
    /// Free-text player command for the GM.
    Command { text: String },
}

/// A resolved HP change for one party member, already clamped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HpUpdate {
    pub name: String,
    pub hp: i32,
    pub max_hp: i32,
}

/// Messages from server to client. One JSON object per frame.
///
/// A turn always produces exactly one `stream_start`, zero or more content
/// messages, and exactly one `stream_end`; provider failures surface as a
/// single `error` within the turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    StreamStart,
    /// GM narration.
    Gm { text: String },
    /// Companion dialogue, attributed by name.
    Nfa { name: String, text: String },
    /// Dice roll line.
    Roll { text: String },
    /// Damage description.
    Dmg { text: String },
    /// System state change (combat start/end, floor transitions, ...).
    Sys { text: String },
    /// Clamped HP values after applying this turn's deltas.
    HpUpdate { updates: Vec<HpUpdate> },
    /// Visual scene directive forwarded to the client renderer.
    Scene { command: String, args: Vec<String> },
    /// Player action options for the next turn.
    Choices { options: Vec<String> },
    /// Experience awarded to the whole party.
    XpGain { amount: u32 },
    StreamEnd,
    Error { text: String },
}

impl ServerMessage {
    /// Scene command name, when this is a `scene` message.
    pub fn scene_command(&self) -> Option<&str> {
        match self {
            ServerMessage::Scene { command, .. } => Some(command.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_messages_use_snake_case_type_tags() {
        let json = serde_json::to_value(ServerMessage::StreamStart).unwrap();
        assert_eq!(json["type"], "stream_start");

        let json = serde_json::to_value(ServerMessage::HpUpdate {
            updates: vec![HpUpdate {
                name: "Warrior #1".into(),
                hp: 16,
                max_hp: 20,
            }],
        })
        .unwrap();
        assert_eq!(json["type"], "hp_update");
        assert_eq!(json["updates"][0]["maxHp"], 20);

        let json = serde_json::to_value(ServerMessage::XpGain { amount: 50 }).unwrap();
        assert_eq!(json["type"], "xp_gain");
        assert_eq!(json["amount"], 50);
    }

    #[test]
    fn scene_message_round_trips() {
        let msg = ServerMessage::Scene {
            command: "spawn".into(),
            args: vec!["slime".into(), "12".into(), "6".into()],
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: ServerMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
        assert_eq!(back.scene_command(), Some("spawn"));
    }

    #[test]
    fn client_init_accepts_optional_fields() {
        let json = r#"{
            "type": "init",
            "party": [{
                "name": "Dwarf #2", "level": 1, "className": "Warrior",
                "hp": 24, "maxHp": 24
            }],
            "locale": "zh",
            "stageName": "the Shadowmere Depths"
        }"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Init {
                party,
                locale,
                floor,
                stage_name,
            } => {
                assert_eq!(party.len(), 1);
                assert_eq!(locale.as_deref(), Some("zh"));
                assert_eq!(floor, None);
                assert_eq!(stage_name.as_deref(), Some("the Shadowmere Depths"));
            }
            _ => panic!("expected init"),
        }
    }

    #[test]
    fn unknown_client_type_is_a_parse_error_naming_the_type() {
        let err = serde_json::from_str::<ClientMessage>(r#"{"type": "teleport"}"#).unwrap_err();
        assert!(err.to_string().contains("teleport"));
    }
}
