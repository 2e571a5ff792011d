//! Party members and their minted trait data.
//!
//! Trait indexes mirror the on-chain enums; the name tables below are the
//! authoritative display strings used when building GM prompts.

use serde::{Deserialize, Serialize};

/// Race names, indexed by `NfaTraits::race`.
pub const RACES: [&str; 5] = ["Human", "Elf", "Dwarf", "Tiefling", "Beastkin"];

/// Class names, indexed by `NfaTraits::class`.
pub const CLASSES: [&str; 6] = ["Warrior", "Mage", "Rogue", "Ranger", "Cleric", "Bard"];

/// Personality names, indexed by `NfaTraits::personality`.
pub const PERSONALITIES: [&str; 8] = [
    "Passionate",
    "Calm",
    "Cunning",
    "Kind",
    "Dark",
    "Cheerful",
    "Scholar",
    "Silent",
];

/// Talent rarity names, indexed by `NfaTraits::talent_rarity`.
pub const TALENT_RARITIES: [&str; 5] = ["Common", "Rare", "Epic", "Legendary", "Mythic"];

/// Stat names in base-stats order.
pub const STAT_NAMES: [&str; 6] = ["STR", "DEX", "CON", "INT", "WIS", "CHA"];

/// Talent names, indexed by `NfaTraits::talent_id`.
pub const TALENTS: [&str; 30] = [
    "Iron Will",
    "Quick Draw",
    "Mana Surge",
    "Shadow Step",
    "Battle Cry",
    "Arcane Shield",
    "Poison Blade",
    "Healing Touch",
    "Eagle Eye",
    "Stone Skin",
    "Fire Breath",
    "Frost Nova",
    "Lightning Reflexes",
    "Dark Pact",
    "Holy Light",
    "Beast Form",
    "Time Warp",
    "Blood Rage",
    "Wind Walk",
    "Earth Shatter",
    "Spirit Link",
    "Void Step",
    "Solar Flare",
    "Lunar Blessing",
    "Thorn Armor",
    "Chain Lightning",
    "Death Grip",
    "Life Drain",
    "Mirror Image",
    "Berserker Rage",
];

/// Minted trait data for a party member (mirrors the contract enums).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NfaTraits {
    /// 0-4: Human, Elf, Dwarf, Tiefling, Beastkin
    pub race: u8,
    /// 0-5: Warrior, Mage, Rogue, Ranger, Cleric, Bard
    #[serde(rename = "class_")]
    pub class: u8,
    /// 0-7: Passionate..Silent
    pub personality: u8,
    /// 0-29
    pub talent_id: u8,
    /// 0-4: Common..Mythic
    pub talent_rarity: u8,
    /// [STR, DEX, CON, INT, WIS, CHA] with race bonuses applied
    pub base_stats: Vec<i32>,
}

impl NfaTraits {
    pub fn race_name(&self) -> &'static str {
        RACES.get(self.race as usize).copied().unwrap_or("Unknown")
    }

    pub fn class_name(&self) -> &'static str {
        CLASSES
            .get(self.class as usize)
            .copied()
            .unwrap_or("Unknown")
    }

    pub fn personality_name(&self) -> &'static str {
        PERSONALITIES
            .get(self.personality as usize)
            .copied()
            .unwrap_or("Unknown")
    }

    pub fn talent_name(&self) -> &'static str {
        TALENTS
            .get(self.talent_id as usize)
            .copied()
            .unwrap_or("Unknown")
    }

    pub fn talent_rarity_name(&self) -> &'static str {
        TALENT_RARITIES
            .get(self.talent_rarity as usize)
            .copied()
            .unwrap_or("Common")
    }

    /// Stat value by index, defaulting to 10 when the stats array is short.
    pub fn stat(&self, index: usize) -> i32 {
        self.base_stats.get(index).copied().unwrap_or(10)
    }
}

/// A party member as sent by the client during `init`.
///
/// `name` is the only HP lookup key and must be unique within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyMember {
    pub name: String,
    pub level: u32,
    pub class_name: String,
    pub hp: i32,
    pub max_hp: i32,
    /// True for the player character (party leader); companions omit it.
    #[serde(default)]
    pub is_character: bool,
    /// Reward token backing this member; 0 means untracked.
    #[serde(default)]
    pub token_id: u64,
    #[serde(default)]
    pub traits: NfaTraits,
}

/// Current/maximum hit points for one party member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HpPool {
    pub hp: i32,
    pub max_hp: i32,
}

impl HpPool {
    /// Apply a signed delta, clamping into `[0, max_hp]`.
    pub fn apply(&mut self, delta: i32) {
        self.hp = (self.hp + delta).clamp(0, self.max_hp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hp_pool_clamps_both_ends() {
        let mut pool = HpPool { hp: 10, max_hp: 20 };
        pool.apply(-999);
        assert_eq!(pool.hp, 0);
        pool.apply(999);
        assert_eq!(pool.hp, 20);
        pool.apply(-4);
        assert_eq!(pool.hp, 16);
    }

    #[test]
    fn trait_names_resolve_in_range() {
        let traits = NfaTraits {
            race: 1,
            class: 4,
            personality: 7,
            talent_id: 29,
            talent_rarity: 4,
            base_stats: vec![10, 12, 10, 14, 16, 8],
        };
        assert_eq!(traits.race_name(), "Elf");
        assert_eq!(traits.class_name(), "Cleric");
        assert_eq!(traits.personality_name(), "Silent");
        assert_eq!(traits.talent_name(), "Berserker Rage");
        assert_eq!(traits.talent_rarity_name(), "Mythic");
        assert_eq!(traits.stat(4), 16);
    }

    #[test]
    fn trait_names_out_of_range_fall_back() {
        let traits = NfaTraits {
            race: 9,
            talent_rarity: 9,
            ..Default::default()
        };
        assert_eq!(traits.race_name(), "Unknown");
        assert_eq!(traits.talent_rarity_name(), "Common");
        assert_eq!(traits.stat(11), 10);
    }

    #[test]
    fn party_member_wire_format_is_camel_case() {
        let json = r#"{
            "name": "Elf #1",
            "level": 3,
            "className": "Mage",
            "hp": 18,
            "maxHp": 22,
            "isCharacter": true,
            "traits": {
                "race": 1, "class_": 1, "personality": 0,
                "talentId": 2, "talentRarity": 1,
                "baseStats": [10, 14, 10, 16, 10, 12]
            }
        }"#;
        let member: PartyMember = serde_json::from_str(json).expect("valid party member");
        assert_eq!(member.name, "Elf #1");
        assert_eq!(member.max_hp, 22);
        assert!(member.is_character);
        assert_eq!(member.token_id, 0);
        assert_eq!(member.traits.class_name(), "Mage");
    }
}
