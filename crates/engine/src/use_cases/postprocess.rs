//! Scene post-processor.
//!
//! The GM is instructed to pair every narrative event with a scene
//! command, but compliance is unreliable. After a turn is parsed, these
//! rules inspect what the model actually emitted against session state and
//! synthesize the missing visual-sync commands. Injections are additions:
//! a rule never fires when the model already issued the command itself.

use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;

use dungeonterm_domain::{enemies_for_floor, entity_kind, room_for_floor};
use dungeonterm_shared::ServerMessage;

use crate::infrastructure::ports::GmTurn;
use crate::infrastructure::session::GameSession;

// Playfield bounds for synthesized coordinates.
const X_RANGE: (i32, i32) = (2, 17);
const Y_RANGE: (i32, i32) = (2, 12);

// English keywords get word boundaries; CJK keywords are matched by
// containment because CJK text has no word boundaries to anchor on.
static DEATH_EN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(defeat|destroy|kill|slay|collapse|dies|died|slain|vanquish|fall|fallen|perish)\b")
        .expect("valid regex")
});
const DEATH_CJK: [&str; 6] = ["消滅", "擊敗", "死亡", "倒下", "击败", "消灭"];

static EXPLORE_EN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(advance|move|walk|continue|proceed|enter|venture|step|explore|forward)")
        .expect("valid regex")
});
const EXPLORE_CJK: [&str; 11] = [
    "前進", "進入", "走", "繼續", "前进", "进入", "继续", "向前", "探索", "往前", "深入",
];

static FLOOR_EN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(floor|descend|next level|deeper)\b").expect("valid regex")
});
static FLOOR_CJK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"下一層|下一层|進入.*層|进入.*层").expect("valid regex"));

static COMBAT_START_EN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(combat initiated|combat start|ambush|attack|engage)\b")
        .expect("valid regex")
});
const COMBAT_START_CJK: [&str; 4] = ["战斗开始", "戰鬥開始", "進入戰鬥", "进入战斗"];

static HEAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[HP:.+?:\+(\d+)\]").expect("valid regex"));

fn death_vocab(text: &str) -> bool {
    DEATH_EN_RE.is_match(text) || DEATH_CJK.iter().any(|k| text.contains(k))
}

fn explore_vocab(text: &str) -> bool {
    EXPLORE_EN_RE.is_match(text) || EXPLORE_CJK.iter().any(|k| text.contains(k))
}

fn floor_transition_vocab(text: &str) -> bool {
    FLOOR_EN_RE.is_match(text) || FLOOR_CJK_RE.is_match(text)
}

fn combat_start_vocab(text: &str) -> bool {
    COMBAT_START_EN_RE.is_match(text) || COMBAT_START_CJK.iter().any(|k| text.contains(k))
}

fn has_scene_command(msgs: &[ServerMessage], cmd: &str) -> bool {
    msgs.iter().any(|m| m.scene_command() == Some(cmd))
}

fn has_combat_message(msgs: &[ServerMessage]) -> bool {
    msgs.iter()
        .any(|m| matches!(m, ServerMessage::Dmg { .. } | ServerMessage::Roll { .. }))
}

fn sys_text_matches(msgs: &[ServerMessage], pred: impl Fn(&str) -> bool) -> bool {
    msgs.iter().any(|m| match m {
        ServerMessage::Sys { text } => pred(text),
        _ => false,
    })
}

fn clamp_x(x: i32) -> i32 {
    x.clamp(X_RANGE.0, X_RANGE.1)
}

fn clamp_y(y: i32) -> i32 {
    y.clamp(Y_RANGE.0, Y_RANGE.1)
}

fn scene_msg(command: &str, args: &[String]) -> ServerMessage {
    ServerMessage::Scene {
        command: command.to_string(),
        args: args.to_vec(),
    }
}

/// Flanking positions for synthesized combat spawns.
fn combat_zone_positions(party_pos: (i32, i32)) -> [(i32, i32); 2] {
    let (px, py) = party_pos;
    [
        (clamp_x(px + 3), clamp_y(py - 2)),
        (clamp_x(px - 3), clamp_y(py - 2)),
    ]
}

/// Best-guess enemy position: coordinates from this turn's spawn commands,
/// else an offset from the party. A visual cue, not a correctness claim.
fn find_enemy_position(turn: &GmTurn, session: &GameSession) -> (i32, i32) {
    for m in &turn.messages {
        if let ServerMessage::Scene { command, args } = m {
            if command == "spawn" && args.len() >= 3 {
                if let (Ok(x), Ok(y)) = (args[1].trim().parse(), args[2].trim().parse()) {
                    return (clamp_x(x), clamp_y(y));
                }
            }
        }
    }
    let (px, py) = session.scene.party_pos;
    (clamp_x(px + 3), clamp_y(py - 2))
}

/// The tracked enemy whose type appears in the raw text, else the first.
fn find_matching_enemy(raw_lower: &str, enemies: &[&str]) -> Option<String> {
    enemies
        .iter()
        .find(|id| raw_lower.contains(entity_kind(id)))
        .or_else(|| enemies.first())
        .map(|id| id.to_string())
}

fn detect_enemy_type(raw_lower: &str) -> Option<&'static str> {
    dungeonterm_domain::ENEMY_TYPES
        .iter()
        .copied()
        .find(|t| raw_lower.contains(t))
}

/// Inspect a parsed turn against session state and synthesize the scene
/// commands the model forgot. Returned messages must be sent to the client
/// and applied to the session, in order, after the turn's own messages.
pub fn post_process_scene(
    turn: &GmTurn,
    session: &mut GameSession,
    floor: u32,
) -> Vec<ServerMessage> {
    let mut injected = Vec::new();
    let msgs = &turn.messages;
    let raw_text = &turn.raw_text;
    let raw_lower = raw_text.to_lowercase();
    let mut skip_move_party = false;

    // Rule: room transition. Evaluated first because repositioning the
    // whole party suppresses the exploration nudge below.
    if !has_scene_command(msgs, "set_map")
        && sys_text_matches(msgs, floor_transition_vocab)
    {
        let target_room = room_for_floor(floor);
        if target_room != session.scene.map {
            injected.push(scene_msg("set_map", &[target_room.to_string()]));
            injected.push(scene_msg("move_party", &["9".to_string(), "8".to_string()]));
            skip_move_party = true;
            tracing::debug!(room = target_room, "Injected room transition");
        }
    }

    // Rule: combat visual effect.
    if has_combat_message(msgs) && !has_scene_command(msgs, "effect") {
        if HEAL_RE.is_match(raw_text) {
            let (px, py) = session.scene.party_pos;
            injected.push(scene_msg(
                "effect",
                &["heal".to_string(), px.to_string(), py.to_string()],
            ));
            tracing::debug!(x = px, y = py, "Injected heal effect");
        } else {
            let (ex, ey) = find_enemy_position(turn, session);
            injected.push(scene_msg(
                "effect",
                &["fireball".to_string(), ex.to_string(), ey.to_string()],
            ));
            tracing::debug!(x = ex, y = ey, "Injected fireball effect");
        }
    }

    // Rule: enemy death cleanup.
    if death_vocab(raw_text) && !has_scene_command(msgs, "remove") {
        let enemies = session.scene.enemy_entities();
        if let Some(target) = find_matching_enemy(&raw_lower, &enemies) {
            let (px, py) = session.scene.party_pos;
            let (ex, ey) = (clamp_x(px + 3), clamp_y(py - 2));
            injected.push(scene_msg(
                "effect",
                &["smoke".to_string(), ex.to_string(), ey.to_string()],
            ));
            injected.push(scene_msg("remove", &[target.clone()]));
            tracing::debug!(entity = %target, "Injected death cleanup");
        }
    }

    // The model frequently forgets an explicit combat-end tag; an empty
    // battlefield is authoritative.
    if session.in_combat && session.scene.enemy_entities().is_empty() {
        session.in_combat = false;
        tracing::debug!("Auto-cleared combat flag (no enemies remain)");
    }

    // Rule: exploration movement. A minimal "something visibly happened"
    // nudge toward the top of the map.
    if !skip_move_party
        && !has_scene_command(msgs, "move_party")
        && !has_scene_command(msgs, "set_map")
        && !session.in_combat
        && explore_vocab(raw_text)
    {
        let (px, py) = session.scene.party_pos;
        if py > 2 {
            injected.push(scene_msg(
                "move_party",
                &[px.to_string(), (py - 1).to_string()],
            ));
            tracing::debug!(x = px, y = py - 1, "Injected exploration movement");
        }
    }

    // Rule: combat spawn. Only when combat starts with an empty field and
    // the model spawned nothing itself.
    if !has_scene_command(msgs, "spawn")
        && sys_text_matches(msgs, combat_start_vocab)
        && session.scene.enemy_entities().is_empty()
    {
        let detected = detect_enemy_type(&raw_lower);
        let pool = enemies_for_floor(floor);
        let positions = combat_zone_positions(session.scene.party_pos);
        let mut rng = rand::thread_rng();
        let count = if rng.gen_bool(0.5) { 1 } else { 2 };
        for (x, y) in positions.iter().take(count) {
            let kind = detected.unwrap_or_else(|| pool[rng.gen_range(0..pool.len())]);
            injected.push(scene_msg(
                "spawn",
                &[kind.to_string(), x.to_string(), y.to_string()],
            ));
            tracing::debug!(kind, x, y, "Injected combat spawn");
        }
    }

    // Re-check after all rules: injected spawns are about to be applied,
    // so only clear when the field stays empty.
    if session.in_combat
        && session.scene.enemy_entities().is_empty()
        && !injected.iter().any(|m| m.scene_command() == Some("spawn"))
    {
        session.in_combat = false;
        tracing::debug!("Auto-cleared combat flag after injection pass");
    }

    injected
}

#[cfg(test)]
mod tests {
    use super::*;
    use dungeonterm_domain::PartyMember;

    fn session() -> GameSession {
        GameSession::new(
            vec![PartyMember {
                name: "Warrior #1".to_string(),
                level: 1,
                class_name: "Warrior".to_string(),
                hp: 20,
                max_hp: 20,
                is_character: true,
                token_id: 0,
                traits: Default::default(),
            }],
            None,
            None,
            None,
        )
    }

    fn turn(messages: Vec<ServerMessage>, raw_text: &str) -> GmTurn {
        GmTurn {
            messages,
            hp_changes: Vec::new(),
            raw_text: raw_text.to_string(),
            provider_session_id: None,
        }
    }

    fn sys(text: &str) -> ServerMessage {
        ServerMessage::Sys { text: text.into() }
    }

    fn scene(command: &str, args: &[&str]) -> ServerMessage {
        ServerMessage::Scene {
            command: command.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn commands(injected: &[ServerMessage]) -> Vec<&str> {
        injected.iter().filter_map(|m| m.scene_command()).collect()
    }

    #[test]
    fn room_transition_injects_map_and_reposition() {
        let mut s = session();
        s.floor = 4;
        let t = turn(
            vec![sys("— Descending to Floor 4 —")],
            "The party advances down the broken stairs.",
        );
        let injected = post_process_scene(&t, &mut s, 4);
        // "advances" also trips the exploration rule, but the transition
        // suppressed it: only set_map + move_party are injected.
        assert_eq!(commands(&injected), vec!["set_map", "move_party"]);
        assert_eq!(injected[0], scene("set_map", &["shrine"]));
        assert_eq!(injected[1], scene("move_party", &["9", "8"]));
    }

    #[test]
    fn room_transition_skipped_when_model_complied() {
        let mut s = session();
        let t = turn(
            vec![
                sys("— Floor 2 —"),
                scene("set_map", &["chamber"]),
            ],
            "Next floor.",
        );
        let injected = post_process_scene(&t, &mut s, 2);
        assert!(!commands(&injected).contains(&"set_map"));
    }

    #[test]
    fn combat_effect_uses_spawn_coordinates_from_turn() {
        let mut s = session();
        s.update_scene("spawn", &["slime".to_string()]);
        s.in_combat = true;
        let t = turn(
            vec![
                ServerMessage::Dmg {
                    text: "6 damage".into(),
                },
                scene("spawn", &["slime", "12", "6"]),
            ],
            "The slime takes a hit.",
        );
        let injected = post_process_scene(&t, &mut s, 1);
        assert!(injected.contains(&scene("effect", &["fireball", "12", "6"])));
    }

    #[test]
    fn healing_text_injects_heal_at_party_position() {
        let mut s = session();
        s.update_scene("spawn", &["slime".to_string()]);
        s.in_combat = true;
        let t = turn(
            vec![ServerMessage::Roll {
                text: "heal check".into(),
            }],
            "[ROLL] heal check\n[HP:Warrior #1:+6]",
        );
        let injected = post_process_scene(&t, &mut s, 1);
        assert!(injected.contains(&scene("effect", &["heal", "9", "8"])));
    }

    #[test]
    fn death_text_injects_smoke_and_remove_of_matching_enemy() {
        let mut s = session();
        s.update_scene("spawn", &["goblin".to_string()]);
        s.update_scene("spawn", &["skeleton".to_string()]);
        s.in_combat = true;
        let t = turn(
            vec![ServerMessage::Gm {
                text: "The skeleton is slain!".into(),
            }],
            "The skeleton is slain!",
        );
        let injected = post_process_scene(&t, &mut s, 1);
        assert_eq!(commands(&injected), vec!["effect", "remove"]);
        assert_eq!(injected[1], scene("remove", &["skeleton_1"]));
    }

    #[test]
    fn death_rule_idempotent_after_injections_applied() {
        let mut s = session();
        s.update_scene("spawn", &["goblin".to_string()]);
        let t = turn(
            vec![ServerMessage::Gm {
                text: "The goblin dies.".into(),
            }],
            "The goblin dies.",
        );
        let injected = post_process_scene(&t, &mut s, 1);
        assert_eq!(commands(&injected), vec!["effect", "remove"]);
        for m in &injected {
            if let ServerMessage::Scene { command, args } = m {
                s.update_scene(command, args);
            }
        }
        // Same turn re-processed against the mutated session: nothing left
        // to remove, so no re-injection.
        let again = post_process_scene(&t, &mut s, 1);
        assert!(again.is_empty());
    }

    #[test]
    fn combat_auto_clears_when_no_enemies_remain() {
        let mut s = session();
        s.in_combat = true;
        let t = turn(vec![], "Silence settles over the chamber.");
        post_process_scene(&t, &mut s, 1);
        assert!(!s.in_combat);
    }

    #[test]
    fn exploration_nudges_party_one_tile_up() {
        let mut s = session();
        let t = turn(
            vec![ServerMessage::Gm {
                text: "You advance down the corridor.".into(),
            }],
            "You advance down the corridor.",
        );
        let injected = post_process_scene(&t, &mut s, 1);
        assert_eq!(injected, vec![scene("move_party", &["9", "7"])]);
    }

    #[test]
    fn exploration_clamped_at_top_of_map() {
        let mut s = session();
        s.update_scene("move_party", &["9".to_string(), "2".to_string()]);
        let t = turn(vec![], "You continue forward.");
        let injected = post_process_scene(&t, &mut s, 1);
        assert!(injected.is_empty());
    }

    #[test]
    fn exploration_suppressed_in_combat() {
        let mut s = session();
        s.update_scene("spawn", &["goblin".to_string()]);
        s.in_combat = true;
        let t = turn(vec![], "You step back carefully.");
        let injected = post_process_scene(&t, &mut s, 1);
        assert!(!commands(&injected).contains(&"move_party"));
    }

    #[test]
    fn combat_start_spawns_when_model_forgot() {
        let mut s = session();
        let t = turn(
            vec![sys("Combat initiated — wraiths emerge!")],
            "Combat initiated — wraiths emerge!",
        );
        let injected = post_process_scene(&t, &mut s, 3);
        let spawns: Vec<_> = injected
            .iter()
            .filter(|m| m.scene_command() == Some("spawn"))
            .collect();
        assert!((1..=2).contains(&spawns.len()));
        // Type detected from the narration text.
        for spawn in spawns {
            if let ServerMessage::Scene { args, .. } = spawn {
                assert_eq!(args[0], "wraith");
            }
        }
    }

    #[test]
    fn combat_start_spawn_suppressed_when_model_complied() {
        let mut s = session();
        let t = turn(
            vec![
                sys("Combat initiated — 2 Slimes emerge!"),
                scene("spawn", &["slime", "12", "6"]),
            ],
            "Combat initiated — 2 Slimes emerge!\n[SCENE:spawn:slime:12:6]\n",
        );
        let injected = post_process_scene(&t, &mut s, 1);
        assert!(!commands(&injected).contains(&"spawn"));
    }

    #[test]
    fn spawn_rule_skipped_when_enemies_already_tracked() {
        let mut s = session();
        s.update_scene("spawn", &["goblin".to_string()]);
        s.in_combat = true;
        let t = turn(
            vec![sys("An ambush! Combat start!")],
            "An ambush! Combat start!",
        );
        let injected = post_process_scene(&t, &mut s, 1);
        assert!(!commands(&injected).contains(&"spawn"));
    }
}
