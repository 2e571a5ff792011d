//! Dungeon Terminal domain types.
//!
//! Pure game-domain data shared by the engine and the wire protocol:
//! party members with their minted trait data, and the scene state that
//! mirrors the client's visual map. No I/O, no business orchestration.

pub mod party;
pub mod scene;

pub use party::{
    HpPool, NfaTraits, PartyMember, CLASSES, PERSONALITIES, RACES, STAT_NAMES, TALENTS,
    TALENT_RARITIES,
};
pub use scene::{
    enemies_for_floor, entity_kind, is_enemy_entity, room_for_floor, SceneChange, SceneState,
    ENEMY_TYPES,
};
