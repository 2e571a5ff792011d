//! Scene state mirroring the client's visual map.
//!
//! The session tracks which map is loaded, which entities are on it and
//! where the party token sits, so the post-processor can detect when GM
//! narration and the rendered scene have drifted apart.

use std::collections::HashMap;

/// Entity types counted as enemies (doors, chests and NPCs are not).
pub const ENEMY_TYPES: [&str; 6] = ["skeleton", "slime", "goblin", "wraith", "golem", "dragon"];

/// Canonical room layout per floor.
pub fn room_for_floor(floor: u32) -> &'static str {
    match floor {
        1 => "corridor",
        2 => "chamber",
        3 => "crossroads",
        4 => "shrine",
        5 => "boss_room",
        _ => "chamber",
    }
}

/// Enemy pool per floor, used when a spawn must be synthesized.
pub fn enemies_for_floor(floor: u32) -> &'static [&'static str] {
    match floor {
        1 => &["slime", "goblin"],
        2 => &["skeleton", "goblin"],
        3 => &["wraith", "goblin", "skeleton"],
        4 => &["wraith", "golem"],
        5 => &["golem", "dragon"],
        _ => &["slime"],
    }
}

/// Strip the `_{n}` suffix from an entity id (`"skeleton_2"` -> `"skeleton"`).
///
/// Ids without a numeric suffix are returned unchanged.
pub fn entity_kind(id: &str) -> &str {
    match id.rfind('_') {
        Some(i) if i + 1 < id.len() && id[i + 1..].chars().all(|c| c.is_ascii_digit()) => &id[..i],
        _ => id,
    }
}

/// Whether a tracked entity id denotes an enemy archetype.
pub fn is_enemy_entity(id: &str) -> bool {
    ENEMY_TYPES.contains(&entity_kind(id))
}

/// Result of applying one scene command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneChange {
    MapChanged,
    Spawned(String),
    Removed { id: String, was_enemy: bool },
    PartyMoved,
    /// Command not tracked server-side (`move`, `interact`, `effect`, ...).
    Ignored,
}

/// Server-side mirror of the client's visual scene.
#[derive(Debug, Clone)]
pub struct SceneState {
    pub map: String,
    /// Ordered entity ids of form `{type}_{n}`, unique within the current map.
    pub entities: Vec<String>,
    pub party_pos: (i32, i32),
    /// Monotonic per-type spawn counters; reset when the map changes so a
    /// removed-then-respawned entity never reuses a freed number.
    spawn_counters: HashMap<String, u32>,
}

impl Default for SceneState {
    fn default() -> Self {
        Self {
            map: "chamber".to_string(),
            entities: Vec::new(),
            party_pos: (9, 8),
            spawn_counters: HashMap::new(),
        }
    }
}

impl SceneState {
    /// Apply one `[SCENE:command:args...]` directive.
    pub fn apply(&mut self, command: &str, args: &[String]) -> SceneChange {
        match command {
            "set_map" => {
                self.map = args
                    .first()
                    .filter(|s| !s.is_empty())
                    .cloned()
                    .unwrap_or_else(|| "chamber".to_string());
                self.entities.clear();
                self.spawn_counters.clear();
                SceneChange::MapChanged
            }
            "spawn" => {
                let kind = args
                    .first()
                    .filter(|s| !s.is_empty())
                    .cloned()
                    .unwrap_or_else(|| "entity".to_string());
                let counter = self.spawn_counters.entry(kind.clone()).or_insert(0);
                *counter += 1;
                let id = format!("{}_{}", kind, counter);
                self.entities.push(id.clone());
                SceneChange::Spawned(id)
            }
            "remove" => {
                let target = args.first().map(String::as_str).unwrap_or("");
                let before = self.entities.len();
                self.entities.retain(|id| id != target);
                if self.entities.len() < before {
                    SceneChange::Removed {
                        id: target.to_string(),
                        was_enemy: is_enemy_entity(target),
                    }
                } else {
                    SceneChange::Ignored
                }
            }
            "move_party" => {
                let x = args
                    .first()
                    .and_then(|s| s.trim().parse::<i32>().ok())
                    .unwrap_or(9);
                let y = args
                    .get(1)
                    .and_then(|s| s.trim().parse::<i32>().ok())
                    .unwrap_or(8);
                self.party_pos = (x, y);
                SceneChange::PartyMoved
            }
            _ => SceneChange::Ignored,
        }
    }

    /// Tracked entity ids whose type is an enemy archetype.
    pub fn enemy_entities(&self) -> Vec<&str> {
        self.entities
            .iter()
            .map(String::as_str)
            .filter(|id| is_enemy_entity(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn spawn_numbers_are_monotonic_per_type() {
        let mut scene = SceneState::default();
        assert_eq!(
            scene.apply("spawn", &args(&["goblin", "12", "6"])),
            SceneChange::Spawned("goblin_1".into())
        );
        scene.apply("spawn", &args(&["goblin", "6", "6"]));
        scene.apply("spawn", &args(&["chest", "4", "4"]));
        assert_eq!(scene.entities, vec!["goblin_1", "goblin_2", "chest_1"]);

        // Removing goblin_2 must not free its number for reuse.
        scene.apply("remove", &args(&["goblin_2"]));
        assert_eq!(
            scene.apply("spawn", &args(&["goblin"])),
            SceneChange::Spawned("goblin_3".into())
        );
    }

    #[test]
    fn set_map_wipes_entities_and_counters() {
        let mut scene = SceneState::default();
        scene.apply("spawn", &args(&["skeleton"]));
        scene.apply("set_map", &args(&["shrine"]));
        assert_eq!(scene.map, "shrine");
        assert!(scene.entities.is_empty());
        // Counters reset with the map, so numbering restarts.
        assert_eq!(
            scene.apply("spawn", &args(&["skeleton"])),
            SceneChange::Spawned("skeleton_1".into())
        );
    }

    #[test]
    fn remove_distinguishes_enemy_from_object() {
        let mut scene = SceneState::default();
        scene.apply("spawn", &args(&["dragon"]));
        scene.apply("spawn", &args(&["chest"]));
        assert_eq!(
            scene.apply("remove", &args(&["dragon_1"])),
            SceneChange::Removed {
                id: "dragon_1".into(),
                was_enemy: true
            }
        );
        assert_eq!(
            scene.apply("remove", &args(&["chest_1"])),
            SceneChange::Removed {
                id: "chest_1".into(),
                was_enemy: false
            }
        );
        // Removing an unknown id is a no-op.
        assert_eq!(
            scene.apply("remove", &args(&["wraith_9"])),
            SceneChange::Ignored
        );
    }

    #[test]
    fn move_party_defaults_on_unparsable_args() {
        let mut scene = SceneState::default();
        scene.apply("move_party", &args(&["12", "4"]));
        assert_eq!(scene.party_pos, (12, 4));
        scene.apply("move_party", &args(&["left", "down"]));
        assert_eq!(scene.party_pos, (9, 8));
    }

    #[test]
    fn entity_kind_handles_odd_ids() {
        assert_eq!(entity_kind("skeleton_12"), "skeleton");
        assert_eq!(entity_kind("boss_room"), "boss_room");
        assert_eq!(entity_kind("slime"), "slime");
        assert!(is_enemy_entity("wraith_3"));
        assert!(!is_enemy_entity("door_1"));
    }
}
