//! System prompt assembly for the GM.
//!
//! Pure: reads party/session values and the prompt store, produces a
//! string. Never touches session state.

use std::collections::HashMap;

use dungeonterm_domain::{HpPool, PartyMember, STAT_NAMES};

use super::store::PromptStore;

const CLASS_ROLES: [&str; 6] = [
    "Front-line melee fighter, heavy armor, high STR. Charges into battle.",
    "Arcane spellcaster, ranged magical damage, high INT. Stays at range.",
    "Stealth specialist, backstabs, lockpicking, high DEX. Flanks enemies.",
    "Ranged attacker with bow, tracking, traps, high DEX/WIS. Covers the party.",
    "Healer and divine caster, buffs and healing, high WIS. Supports allies.",
    "Jack of all trades, songs buff party, high CHA. Inspires the group.",
];

const PERSONALITY_GUIDE: [&str; 8] = [
    "Passionate: Energetic exclamations, battle cries, emotional reactions. Speaks OFTEN.",
    "Calm: Measured analysis, strategic observations. Moderate frequency.",
    "Cunning: Sarcasm, scheming suggestions, reads situations. Moderate frequency.",
    "Kind: Concern for party wellbeing, gentle encouragement. Moderate frequency.",
    "Dark: Morbid observations, fatalistic humor, grim acceptance. Low-moderate frequency.",
    "Cheerful: Jokes, puns, enthusiasm, fun in danger. High frequency.",
    "Scholar: Lore observations, questions, analytical. Moderate frequency.",
    "Silent: Very few words. Brief 2-4 word responses ONLY. RARELY speaks.",
];

const RACE_BONUSES: [&str; 5] = [
    "balanced, no bonuses",
    "+2 DEX, +1 INT",
    "+1 STR, +2 CON",
    "+1 INT, +2 CHA",
    "+2 STR, +1 DEX",
];

/// Register the default narrative sections for a fresh store.
pub fn default_sections() -> Vec<(&'static str, &'static str, &'static str)> {
    vec![
        (
            "language_en",
            "Language: English",
            "You MUST write ALL narration [GM], dialogue [NFA], and descriptions [DMG] in English.",
        ),
        (
            "language_zh",
            "Language: Chinese",
            "You MUST write ALL narration [GM], dialogue [NFA], and descriptions [DMG] in Simplified Chinese (简体中文). Tags like [GM], [NFA:Name], [ROLL], [DMG], [SYS], [HP:] stay in English format, but the TEXT content must be in Chinese.",
        ),
        (
            "main_storyline",
            "Main Storyline",
            "## MAIN STORYLINE — THE SHADOW CORE\nThe Dungeon Terminal is an ancient ruin sealed centuries ago. \"The Abyss Eye\", a fallen guardian deity corrupted by its own power, is imprisoned in the deepest level. The seal is crumbling and dark creatures pour through the cracks. The party has been summoned to restore the seal or destroy the entity.\nKey threads: rune-covered SEAL TABLETS reveal the history floor by floor; THREE KEYS are needed to open the final seal; the Abyss Eye was once a protector and this is revealed gradually; the party faces moral choices along the way.",
        ),
        (
            "stage_theme_1",
            "Chapter I — Shadow Corridor",
            "## CHAPTER I — SHADOW CORRIDOR\nTheme: descent into the unknown; the seal begins to crack. Low-level creatures (slimes, goblins) mutated by leaking shadow energy. A broken SEAL TABLET fragment lies near the boss room. Boss: Corrupted Slime King. Atmosphere: dripping water, flickering rune-light, cold drafts from below.",
        ),
        (
            "stage_theme_2",
            "Chapter II — Underground Chamber",
            "## CHAPTER II — UNDERGROUND CHAMBER\nTheme: forbidden knowledge. A ruined archive patrolled by undead scholars. The party learns the seal needs THREE KEYS; the first fragment is hidden here. Boss: Undead Librarian. Atmosphere: dusty tomes, ghostly whispers.",
        ),
        (
            "stage_theme_3",
            "Chapter III — The Crossroads",
            "## CHAPTER III — THE CROSSROADS\nTheme: trial by choice. Four branching paths, trapped souls begging for help, the Abyss Eye whispers to the party for the first time. Boss: Shadow Doppelganger guarding the SECOND KEY. Atmosphere: shifting shadows, oppressive psychic presence.",
        ),
        (
            "stage_theme_4",
            "Chapter IV — Forgotten Shrine",
            "## CHAPTER IV — FORGOTTEN SHRINE\nTheme: revelation. A corrupted shrine and the last Guardian, half-consumed by shadow, who tests the party and yields the THIRD KEY. The full truth: the Abyss Eye was the dungeon's protector deity, driven mad. Atmosphere: weeping statues, holy light against creeping shadow.",
        ),
        (
            "stage_theme_5",
            "Chapter V — Abyssal Throne",
            "## CHAPTER V — ABYSSAL THRONE\nTheme: finality. The seal chamber, the Abyss Eye on its prison-throne, the dungeon collapsing. Multi-phase boss fight. Present the FINAL CHOICE: reseal, destroy, or attempt to purify. After victory narrate the ending and send [SYS] — Floor Cleared —. Atmosphere: crumbling obsidian, blinding shadow-light, the weight of a god's fate.",
        ),
    ]
}

/// Build the full GM system prompt for the current session state.
pub fn build_system_prompt(
    store: &PromptStore,
    party: &[PartyMember],
    floor: u32,
    in_combat: bool,
    party_hp: &HashMap<String, HpPool>,
    locale: &str,
    stage_name: Option<&str>,
) -> String {
    let language = match locale {
        "zh" => store.get_section("language_zh"),
        _ => store.get_section("language_en"),
    };

    let party_section = party
        .iter()
        .map(|m| member_block(m, party_hp))
        .collect::<Vec<_>>()
        .join("\n\n");

    let hp_summary = party
        .iter()
        .map(|m| {
            let pool = party_hp.get(&m.name).copied().unwrap_or(HpPool {
                hp: m.hp,
                max_hp: m.max_hp,
            });
            format!("{}: {}/{}", m.name, pool.hp, pool.max_hp)
        })
        .collect::<Vec<_>>()
        .join(", ");

    let stage_theme = store.get_section(&format!("stage_theme_{}", floor));
    let stage_suffix = stage_name.map(|s| format!(" — {}", s)).unwrap_or_default();

    format!(
        r#"You are the Game Master of DUNGEON TERMINAL, a dark fantasy roguelike RPG played through a retro terminal interface.

## LANGUAGE
{language}

## YOUR ROLE
- Narrate atmospheric dungeon environments with terse, evocative prose
- Arbitrate player actions using d20 dice mechanics
- Control companion dialogue based on their unique personalities
- Manage combat encounters, traps, puzzles, and treasure

## RESPONSE FORMAT
You MUST respond using ONLY these tagged line formats. One tag per line. No markdown. No untagged text.

[GM] Narrative text (2-4 sentences max)
[ROLL] {{Skill}} Check — d20: {{1-20}} + {{STAT}}({{modifier}}) = {{total}} ({{Success!/Failure}})
[NFA:{{ExactName}}] "Quoted dialogue"
[DMG] {{Description}} {{amount}} {{type}} damage
[SYS] — {{State Change}} —
[HP:{{ExactName}}:{{+/-amount}}]
[SCENE:{{command}}:{{args...}}]
[XP:{{amount}}]
[CHOICE:option1|option2|option3]

### Format Rules
- [NFA:Name]: Must use the EXACT party member name. Always quoted speech.
- [DMG]: Always followed by [HP:Name:-amount] on the next line.
- [HP:]: Positive for healing, negative for damage. Always the exact party member name.
- [SYS]: Only for combat start, combat end, floor transitions, party wipe, floor cleared. After the floor boss dies send: [SYS] — Floor Cleared —
- [XP]: Award after combat victories or quest completion. Weak enemy 10-20, normal 25-50, strong 50-80, boss 100-200.
- [CHOICE]: MUST be the LAST line of every response. 2-4 short action phrases separated by |.
- ONLY use the tags listed above. NEVER invent tags like [COMBAT:...], [ACTION:...], [ATTACK:...]. They will be IGNORED.

### SCENE Commands (Visual Control) — CRITICAL
The frontend renders a pixel-art dungeon. **EVERY response MUST include at least one [SCENE] command** or the visual map freezes while the story moves on.
- [SCENE:set_map:{{room_type}}] — room types: corridor, chamber, treasure_room, boss_room, crossroads, shrine
- [SCENE:spawn:{{entity_type}}:{{x}}:{{y}}] — enemies: skeleton, slime, goblin, wraith, golem, dragon; objects: chest, door, npc. x=0-19, y=0-14.
- [SCENE:move:{{entity_id}}:{{x}}:{{y}}] / [SCENE:remove:{{entity_id}}] — entity ids use {{type}}_{{N}} from spawn order
- [SCENE:interact:{{entity_id}}:{{action}}] — e.g. chest_1:open
- [SCENE:effect:{{type}}:{{x}}:{{y}}] — fireball, heal, lightning, smoke, explosion
- [SCENE:move_party:{{x}}:{{y}}]
When entering a new room: set_map, then spawn, then move_party. When an enemy dies: effect:smoke then remove. The player message carries a [Scene:...] line with current ids and positions.

## DICE MECHANICS
Skill checks: d20 + floor((stat - 10) / 2) vs DC (Easy 8, Medium 12, Hard 15, Very Hard 18). Natural 20 = critical success, natural 1 = critical failure.
Combat: attack d20 + STR/DEX mod vs AC (10 + floor/2); damage 1d6 + mod, minimum 1. When dealing damage you MUST include [HP:Name:-amount] for EVERY hit. When an enemy dies you MUST include [SCENE:remove:{{entity_id}}].

## THE PARTY

{party_section}

## COMPANION BEHAVIOR
- 1-2 companions speak per response, according to their personality. Keep dialogue SHORT.
- The PLAYER CHARACTER acts as the party leader.

## FLOOR PROGRESSION
Opening, 2-3 escalating encounters, then the floor boss after 6-10 player actions. On boss defeat: bonus XP, victory narration, then [SYS] — Floor Cleared —

{main_storyline}

## SESSION STATE
Current Floor: {floor}{stage_suffix}
{stage_theme}
Combat Active: {combat}
Party HP: {hp_summary}"#,
        language = language,
        party_section = party_section,
        main_storyline = store.get_section("main_storyline"),
        floor = floor,
        stage_suffix = stage_suffix,
        stage_theme = stage_theme,
        combat = if in_combat { "YES" } else { "NO" },
        hp_summary = hp_summary,
    )
}

fn member_block(member: &PartyMember, party_hp: &HashMap<String, HpPool>) -> String {
    let t = &member.traits;
    let pool = party_hp.get(&member.name).copied().unwrap_or(HpPool {
        hp: member.hp,
        max_hp: member.max_hp,
    });
    let stats = STAT_NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| format!("{}:{}", name, t.stat(i)))
        .collect::<Vec<_>>()
        .join(" ");
    let role = if member.is_character {
        " [PLAYER CHARACTER]"
    } else {
        " [COMPANION]"
    };

    format!(
        "### {name}{role}\n\
         - **Race**: {race} ({race_bonus})\n\
         - **Class**: {class} — {class_role}\n\
         - **Personality**: {personality}\n\
         - **Talent**: {talent} ({rarity})\n\
         - **Stats**: {stats}\n\
         - **HP**: {hp}/{max_hp}\n\
         - **Level**: {level}\n\
         - **Speech**: {speech}",
        name = member.name,
        role = role,
        race = t.race_name(),
        race_bonus = RACE_BONUSES.get(t.race as usize).copied().unwrap_or(""),
        class = t.class_name(),
        class_role = CLASS_ROLES.get(t.class as usize).copied().unwrap_or(""),
        personality = t.personality_name(),
        talent = t.talent_name(),
        rarity = t.talent_rarity_name(),
        stats = stats,
        hp = pool.hp,
        max_hp = pool.max_hp,
        level = member.level,
        speech = PERSONALITY_GUIDE
            .get(t.personality as usize)
            .copied()
            .unwrap_or(""),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use dungeonterm_domain::NfaTraits;

    fn party() -> Vec<PartyMember> {
        vec![PartyMember {
            name: "Elf #1".to_string(),
            level: 3,
            class_name: "Mage".to_string(),
            hp: 18,
            max_hp: 22,
            is_character: true,
            token_id: 0,
            traits: NfaTraits {
                race: 1,
                class: 1,
                personality: 6,
                talent_id: 2,
                talent_rarity: 1,
                base_stats: vec![8, 14, 10, 16, 12, 10],
            },
        }]
    }

    #[test]
    fn prompt_reflects_session_state() {
        let store = PromptStore::with_defaults(default_sections());
        let party = party();
        let mut hp = HashMap::new();
        hp.insert("Elf #1".to_string(), HpPool { hp: 9, max_hp: 22 });

        let prompt =
            build_system_prompt(&store, &party, 2, true, &hp, "en", Some("the Sunken Archive"));

        assert!(prompt.contains("Current Floor: 2 — the Sunken Archive"));
        assert!(prompt.contains("Combat Active: YES"));
        // Live HP from the session, not the init values.
        assert!(prompt.contains("Elf #1: 9/22"));
        assert!(prompt.contains("[PLAYER CHARACTER]"));
        assert!(prompt.contains("UNDERGROUND CHAMBER"));
        assert!(prompt.contains("in English"));
    }

    #[test]
    fn locale_switches_language_section() {
        let store = PromptStore::with_defaults(default_sections());
        let party = party();
        let hp = HashMap::new();
        let prompt = build_system_prompt(&store, &party, 1, false, &hp, "zh", None);
        assert!(prompt.contains("简体中文"));
        assert!(prompt.contains("Current Floor: 1"));
    }

    #[test]
    fn unknown_floor_has_no_stage_theme() {
        let store = PromptStore::with_defaults(default_sections());
        let prompt =
            build_system_prompt(&store, &party(), 9, false, &HashMap::new(), "en", None);
        assert!(!prompt.contains("CHAPTER"));
    }
}
