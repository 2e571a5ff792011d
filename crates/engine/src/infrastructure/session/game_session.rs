//! Per-connection game session state.
//!
//! Owns the authoritative party HP, conversation history, floor/combat
//! status and the scene mirror. The parser and post-processor are pure
//! transformers over this state; all mutation happens here.

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;

use dungeonterm_domain::{HpPool, PartyMember, SceneChange, SceneState};
use dungeonterm_shared::HpUpdate;

use super::conversation::{ConversationTurn, Role};
use crate::infrastructure::ports::AdventureRecord;

/// Conversation entries retained per session; oldest dropped first.
const MAX_HISTORY: usize = 50;

/// Idle time after which the staleness sweep closes the connection.
const STALE_AFTER: Duration = Duration::from_secs(30 * 60);

// Combat state transitions are driven by [SYS] text.
const COMBAT_START_MARKERS: [&str; 4] =
    ["combat initiated", "combat start", "战斗开始", "進入戰鬥"];
const COMBAT_END_MARKERS: [&str; 4] = ["combat end", "victory", "战斗结束", "胜利"];

static FLOOR_NUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:floor|第)\s*(\d+)").expect("valid regex"));

/// An XP grant drained from the session accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XpGrant {
    pub token_id: u64,
    pub amount: u32,
}

pub struct GameSession {
    pub party: Vec<PartyMember>,
    pub party_hp: HashMap<String, HpPool>,
    pub conversation: Vec<ConversationTurn>,
    pub floor: u32,
    pub in_combat: bool,
    pub locale: String,
    pub stage_name: Option<String>,
    pub scene: SceneState,
    /// Opaque continuation id from session-resuming providers.
    pub provider_session_id: Option<String>,
    /// Reward tokens backing the party (token_id > 0 only).
    pub token_ids: Vec<u64>,
    pending_xp: HashMap<u64, u32>,
    pub kill_count: u32,
    pub floor_xp_earned: u32,
    pub(crate) last_activity: Instant,
}

impl GameSession {
    pub fn new(
        party: Vec<PartyMember>,
        locale: Option<String>,
        floor: Option<u32>,
        stage_name: Option<String>,
    ) -> Self {
        let party_hp = party
            .iter()
            .map(|m| {
                (
                    m.name.clone(),
                    HpPool {
                        hp: m.hp,
                        max_hp: m.max_hp,
                    },
                )
            })
            .collect();
        let token_ids = party.iter().map(|m| m.token_id).filter(|&id| id > 0).collect();

        Self {
            party,
            party_hp,
            conversation: Vec::new(),
            floor: floor.unwrap_or(1),
            in_combat: false,
            locale: locale.unwrap_or_else(|| "en".to_string()),
            stage_name,
            scene: SceneState::default(),
            provider_session_id: None,
            token_ids,
            pending_xp: HashMap::new(),
            kill_count: 0,
            floor_xp_earned: 0,
            last_activity: Instant::now(),
        }
    }

    /// Apply a parsed HP delta, returning the clamped update.
    ///
    /// The model drifts on names, so lookup degrades gracefully: exact
    /// match, then a generic "player" alias to the player character, then
    /// substring containment either direction. A reference that resolves
    /// to nothing is a silent no-op, never a phantom member.
    pub fn apply_hp(&mut self, name: &str, delta: i32) -> Option<HpUpdate> {
        let key = self.resolve_member(name)?;
        let pool = self.party_hp.get_mut(&key)?;
        pool.apply(delta);
        Some(HpUpdate {
            name: key,
            hp: pool.hp,
            max_hp: pool.max_hp,
        })
    }

    fn resolve_member(&self, name: &str) -> Option<String> {
        if self.party_hp.contains_key(name) {
            return Some(name.to_string());
        }

        if name.eq_ignore_ascii_case("player") {
            if let Some(pc) = self.party.iter().find(|m| m.is_character) {
                return Some(pc.name.clone());
            }
        }

        // Party order keeps fuzzy resolution deterministic.
        self.party
            .iter()
            .map(|m| &m.name)
            .find(|known| known.contains(name) || name.contains(known.as_str()))
            .cloned()
    }

    /// Apply a scene command to the server-side mirror.
    pub fn update_scene(&mut self, command: &str, args: &[String]) {
        if let SceneChange::Removed {
            id,
            was_enemy: true,
        } = self.scene.apply(command, args)
        {
            self.kill_count += 1;
            tracing::debug!(entity = %id, kills = self.kill_count, "Enemy removed from scene");
        }
    }

    /// Combat/floor transitions driven by `[SYS]` message text.
    pub fn apply_sys_transitions(&mut self, text: &str) {
        let lower = text.to_lowercase();
        if COMBAT_START_MARKERS.iter().any(|m| lower.contains(m)) {
            self.in_combat = true;
        } else if COMBAT_END_MARKERS.iter().any(|m| lower.contains(m)) {
            self.in_combat = false;
        } else if lower.contains("floor") || lower.contains('层') || lower.contains('樓') {
            if let Some(caps) = FLOOR_NUM_RE.captures(&lower) {
                if let Ok(floor) = caps[1].parse::<u32>() {
                    if floor != self.floor {
                        self.floor = floor;
                        self.reset_floor_tracking();
                    }
                }
            }
        }
    }

    pub fn add_user_message(&mut self, text: &str) {
        self.conversation
            .push(ConversationTurn::new(Role::User, text.to_string()));
        self.trim_history();
        self.touch();
    }

    pub fn add_assistant_message(&mut self, text: &str) {
        self.conversation
            .push(ConversationTurn::new(Role::Assistant, text.to_string()));
        self.trim_history();
        self.touch();
    }

    fn trim_history(&mut self) {
        if self.conversation.len() > MAX_HISTORY {
            let excess = self.conversation.len() - MAX_HISTORY;
            self.conversation.drain(..excess);
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn is_stale(&self) -> bool {
        self.is_stale_at(Instant::now())
    }

    pub fn is_stale_at(&self, now: Instant) -> bool {
        now.duration_since(self.last_activity) > STALE_AFTER
    }

    /// Accumulate shared XP onto every tracked reward token.
    pub fn accumulate_xp(&mut self, amount: u32) {
        for token_id in &self.token_ids {
            *self.pending_xp.entry(*token_id).or_insert(0) += amount;
        }
        self.floor_xp_earned += amount;
    }

    /// Drain accumulated grants for the reward collaborator.
    pub fn flush_pending_xp(&mut self) -> Vec<XpGrant> {
        let mut grants: Vec<XpGrant> = self
            .pending_xp
            .drain()
            .filter(|(_, amount)| *amount > 0)
            .map(|(token_id, amount)| XpGrant { token_id, amount })
            .collect();
        grants.sort_by_key(|g| g.token_id);
        grants
    }

    pub fn adventure_record(&self, result: u8) -> AdventureRecord {
        AdventureRecord {
            token_ids: self.token_ids.clone(),
            floor: self.floor,
            result,
            xp_earned: self.floor_xp_earned,
            kill_count: self.kill_count,
        }
    }

    /// Per-floor stats restart when the session moves to a new floor.
    /// Pending XP grants are unaffected.
    pub fn reset_floor_tracking(&mut self) {
        self.kill_count = 0;
        self.floor_xp_earned = 0;
    }

    /// `[Scene: ...]` context line prepended to player commands.
    pub fn scene_context(&self) -> String {
        let entities = if self.scene.entities.is_empty() {
            "none".to_string()
        } else {
            self.scene.entities.join(", ")
        };
        format!(
            "[Scene: map={}, entities=[{}], party=({},{})]",
            self.scene.map, entities, self.scene.party_pos.0, self.scene.party_pos.1
        )
    }

    /// `[HP Status: ...]` context line, in party order.
    pub fn hp_context(&self) -> String {
        let parts: Vec<String> = self
            .party
            .iter()
            .filter_map(|m| {
                self.party_hp
                    .get(&m.name)
                    .map(|pool| format!("{}: {}/{}", m.name, pool.hp, pool.max_hp))
            })
            .collect();
        format!("[HP Status: {}]", parts.join(", "))
    }

    pub fn full_context(&self) -> String {
        format!("{}\n{}", self.scene_context(), self.hp_context())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(name: &str, hp: i32, max_hp: i32, is_character: bool, token_id: u64) -> PartyMember {
        PartyMember {
            name: name.to_string(),
            level: 1,
            class_name: "Warrior".to_string(),
            hp,
            max_hp,
            is_character,
            token_id,
            traits: Default::default(),
        }
    }

    fn session() -> GameSession {
        GameSession::new(
            vec![
                member("兽族 #1", 20, 20, true, 7),
                member("Elf #2", 18, 18, false, 9),
            ],
            None,
            None,
            None,
        )
    }

    #[test]
    fn apply_hp_exact_match_clamps() {
        let mut s = session();
        let update = s.apply_hp("Elf #2", -4).unwrap();
        assert_eq!(
            update,
            HpUpdate {
                name: "Elf #2".into(),
                hp: 14,
                max_hp: 18
            }
        );
        assert_eq!(s.apply_hp("Elf #2", -999).unwrap().hp, 0);
        assert_eq!(s.apply_hp("Elf #2", 999).unwrap().hp, 18);
    }

    #[test]
    fn apply_hp_resolves_truncated_name() {
        let mut s = session();
        let update = s.apply_hp("兽族", -5).unwrap();
        assert_eq!(update.name, "兽族 #1");
        assert_eq!(update.hp, 15);
    }

    #[test]
    fn apply_hp_resolves_player_alias() {
        let mut s = session();
        let update = s.apply_hp("Player", -3).unwrap();
        assert_eq!(update.name, "兽族 #1");
        assert_eq!(update.hp, 17);
    }

    #[test]
    fn apply_hp_unknown_target_is_silent_noop() {
        let mut s = session();
        assert!(s.apply_hp("Goblin", -8).is_none());
        assert_eq!(s.party_hp.len(), 2);
    }

    #[test]
    fn conversation_cap_drops_oldest_first() {
        let mut s = session();
        for i in 0..30 {
            s.add_user_message(&format!("cmd {}", i));
            s.add_assistant_message(&format!("resp {}", i));
        }
        assert_eq!(s.conversation.len(), 50);
        // 60 appended, so the oldest 10 are gone.
        assert_eq!(s.conversation[0].content, "cmd 5");
        assert_eq!(s.conversation[49].content, "resp 29");
    }

    #[test]
    fn sys_transitions_toggle_combat_and_track_floor() {
        let mut s = session();
        s.apply_sys_transitions("— Combat initiated —");
        assert!(s.in_combat);
        s.apply_sys_transitions("— Victory! Combat end —");
        assert!(!s.in_combat);
        s.apply_sys_transitions("— Descending to Floor 3 —");
        assert_eq!(s.floor, 3);
        s.apply_sys_transitions("进入第 4 层");
        assert_eq!(s.floor, 4);
    }

    #[test]
    fn kill_counter_only_counts_enemy_archetypes() {
        let mut s = session();
        s.update_scene("spawn", &["goblin".to_string()]);
        s.update_scene("spawn", &["chest".to_string()]);
        s.update_scene("remove", &["goblin_1".to_string()]);
        s.update_scene("remove", &["chest_1".to_string()]);
        assert_eq!(s.kill_count, 1);
    }

    #[test]
    fn xp_accumulates_per_token_and_flushes_once() {
        let mut s = session();
        s.accumulate_xp(15);
        s.accumulate_xp(25);
        assert_eq!(s.floor_xp_earned, 40);

        let grants = s.flush_pending_xp();
        assert_eq!(
            grants,
            vec![
                XpGrant {
                    token_id: 7,
                    amount: 40
                },
                XpGrant {
                    token_id: 9,
                    amount: 40
                },
            ]
        );
        assert!(s.flush_pending_xp().is_empty());
    }

    #[test]
    fn staleness_is_strictly_greater_than_threshold() {
        let s = session();
        let exactly = s.last_activity + Duration::from_millis(1_800_000);
        assert!(!s.is_stale_at(exactly));
        assert!(s.is_stale_at(exactly + Duration::from_millis(1)));
    }

    #[test]
    fn context_lines_reflect_scene_and_hp() {
        let mut s = session();
        s.update_scene("spawn", &["slime".to_string()]);
        s.update_scene("move_party", &["10".to_string(), "6".to_string()]);
        assert_eq!(
            s.scene_context(),
            "[Scene: map=chamber, entities=[slime_1], party=(10,6)]"
        );
        assert_eq!(s.hp_context(), "[HP Status: 兽族 #1: 20/20, Elf #2: 18/18]");
    }
}
