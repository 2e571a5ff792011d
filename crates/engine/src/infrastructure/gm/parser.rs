//! GM response line parser.
//!
//! Turns one line of raw GM output into typed server messages and HP
//! deltas. The model's compliance with the tag protocol is unreliable, so
//! the parser is built as an ordered chain of independent pattern rules:
//! canonical tags first, then heuristics for tags the model invents, then
//! ignore filters, then free-text fallbacks. The first matching rule wins.
//! New heuristics are appended to the chain without touching existing ones.
//!
//! Whatever comes in, the output vocabulary stays closed: every produced
//! message is one of the `ServerMessage` variants, never a new shape.

use std::sync::LazyLock;

use regex::Regex;

use dungeonterm_shared::ServerMessage;

/// A parsed HP delta, pre-session. Negative = damage, positive = healing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHp {
    pub name: String,
    pub delta: i32,
}

/// One parse result. A line can yield a message, an HP delta, or both.
#[derive(Debug, Clone, Default)]
pub struct ParsedEvent {
    pub message: Option<ServerMessage>,
    pub hp: Option<ParsedHp>,
}

impl ParsedEvent {
    fn msg(message: ServerMessage) -> Self {
        Self {
            message: Some(message),
            hp: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.message.is_none() && self.hp.is_none()
    }
}

// Inline tags that may be embedded mid-sentence in narrative text.
static INLINE_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(?:SCENE|CHOICE|XP|HP|ATTACK|DAMAGE|COMBAT):[^\]]+\]").expect("valid regex")
});

// Leading markdown bullet the model likes to add.
static BULLET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\*\s+").expect("valid regex"));
static LOOSE_BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*\s*").expect("valid regex"));

// Canonical tags.
static GM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\[GM\]\s*(.+)$").expect("valid regex"));
static NFA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[NFA:(.+?)\]\s*(.+)$").expect("valid regex"));
static ROLL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[ROLL\]\s*(.+)$").expect("valid regex"));
static DMG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[DMG\]\s*(.+)$").expect("valid regex"));
static SYS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[SYS\]\s*(.+)$").expect("valid regex"));
static SCENE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[SCENE:(.+?)\]").expect("valid regex"));
static CHOICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[CHOICE:(.+?)\]").expect("valid regex"));
static XP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[XP:(\d+)\]").expect("valid regex"));
static HP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[HP:(.+?):([+-]?\d+)\]").expect("valid regex"));

// Heuristic fallbacks for invented combat tags.
static ATTACK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[ATTACK:.*?→\s*(.+?),\s*(?:伤害|damage|傷害)[:\s]*(\d+)\s*\]")
        .expect("valid regex")
});
static COMBAT_ACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[COMBAT:(\w+_?\w*):(\w+(?:\s*#\d+)?):(\d+)\]").expect("valid regex")
});
static COMBAT_CJK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\[COMBAT:(.+?)\s+(?:攻击|攻擊|反击|反擊|attacks?)\s+(.+?)[,，]\s*(?:造成|dealing)\s*(\d+)\s*(?:点|點)?\s*(?:伤害|傷害|damage)",
    )
    .expect("valid regex")
});
static COMBAT_DEFEAT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[COMBAT:(.+?)(?:被击败|被擊敗|defeated|dies)\]").expect("valid regex")
});
static GENERIC_DMG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\[(?:DAMAGE|DMG|COMBAT)[:\s].*?(\S+(?:\s+#\d+)?)\s*(?:takes?|受到|receives?)\s*(\d+)\s*(?:damage|点伤害|點傷害|伤害)?",
    )
    .expect("valid regex")
});
static GENERIC_DMG_STRIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[\w+[:\s]").expect("valid regex"));

// Invented tags the protocol discards outright.
static IGNORE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\[(?:REWARD|ITEM|LOOT|GOLD|QUEST|STATUS|INFO|NOTE|MUSIC|SOUND|BGM|ENEMY|EFFECT|EVENT):",
    )
    .expect("valid regex")
});
static COMBAT_START_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[COMBAT:(?:START|END|start|end)\]").expect("valid regex"));
static COMBAT_NO_DMG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[COMBAT:\w+_attack:").expect("valid regex"));
static HP_STATUS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\[HP\s*Status:").expect("valid regex"));

// Bare natural-language Chinese damage, no brackets at all.
static CJK_FREE_DMG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"对\s*(.+?)\s*造成\s*(\d+)\s*(?:点|點)\s*(?:伤害|傷害)").expect("valid regex")
});
static LEADING_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[.*?\]\s*").expect("valid regex"));

// The model breaking character; must never reach the player.
static META_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:\*\s*)?(?:I can see|Here'?s|This (?:continues|is|shows|demonstrates)|Note:|Let me|Now the|---\s*$)",
    )
    .expect("valid regex")
});

// Untagged companion dialogue, Latin or CJK names.
static DIALOGUE_HASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?#\d+)\s*[:：]\s*(.+)$").expect("valid regex"));
static DIALOGUE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^([A-Za-z\x{4e00}-\x{9fff}]+(?:\s+#\d+)?)\s*[:：]\s*["“「](.+)$"#)
        .expect("valid regex")
});

/// Parse one line of GM output.
///
/// Embedded `[SCENE:...]`-style tags are extracted first and parsed as
/// their own candidates, so narration that buries a tag mid-sentence still
/// yields both the narration and the tag. May return multiple results per
/// line; an empty result means the line was protocol noise.
pub fn parse_line(line: &str) -> Vec<ParsedEvent> {
    let mut inline_tags = Vec::new();
    let cleaned = INLINE_TAG_RE
        .replace_all(line, |caps: &regex::Captures<'_>| {
            inline_tags.push(caps[0].to_string());
            ""
        })
        .trim()
        .to_string();

    let mut results = Vec::new();

    if !cleaned.is_empty() {
        let event = parse_candidate(&cleaned);
        if !event.is_empty() {
            results.push(event);
        }
    }

    for tag in inline_tags {
        let event = parse_candidate(&tag);
        if !event.is_empty() {
            results.push(event);
        }
    }

    results
}

type Rule = fn(&str) -> Option<ParsedEvent>;

/// Priority-ordered rule chain. First match wins per candidate.
const RULES: [Rule; 18] = [
    rule_gm,
    rule_nfa,
    rule_roll,
    rule_dmg,
    rule_sys,
    rule_scene,
    rule_choice,
    rule_xp,
    rule_hp,
    rule_attack,
    rule_combat_action,
    rule_combat_cjk,
    rule_combat_defeat,
    rule_generic_damage,
    rule_ignored_tags,
    rule_cjk_free_damage,
    rule_meta_commentary,
    rule_dialogue,
];

/// Parse a single candidate (a stripped line or an extracted inline tag).
fn parse_candidate(raw: &str) -> ParsedEvent {
    let line = BULLET_RE.replace(raw, "");
    let line = line.as_ref();

    for rule in RULES {
        if let Some(event) = rule(line) {
            return event;
        }
    }

    // Unrecognized line: treat as GM narration if non-empty.
    let text = LOOSE_BULLET_RE.replace(line, "").trim().to_string();
    if text.is_empty() {
        ParsedEvent::default()
    } else {
        ParsedEvent::msg(ServerMessage::Gm { text })
    }
}

fn rule_gm(line: &str) -> Option<ParsedEvent> {
    let caps = GM_RE.captures(line)?;
    Some(ParsedEvent::msg(ServerMessage::Gm {
        text: caps[1].to_string(),
    }))
}

fn rule_nfa(line: &str) -> Option<ParsedEvent> {
    let caps = NFA_RE.captures(line)?;
    Some(ParsedEvent::msg(ServerMessage::Nfa {
        name: caps[1].to_string(),
        text: caps[2].to_string(),
    }))
}

fn rule_roll(line: &str) -> Option<ParsedEvent> {
    let caps = ROLL_RE.captures(line)?;
    Some(ParsedEvent::msg(ServerMessage::Roll {
        text: caps[1].to_string(),
    }))
}

fn rule_dmg(line: &str) -> Option<ParsedEvent> {
    let caps = DMG_RE.captures(line)?;
    Some(ParsedEvent::msg(ServerMessage::Dmg {
        text: caps[1].to_string(),
    }))
}

fn rule_sys(line: &str) -> Option<ParsedEvent> {
    let caps = SYS_RE.captures(line)?;
    Some(ParsedEvent::msg(ServerMessage::Sys {
        text: caps[1].to_string(),
    }))
}

fn rule_scene(line: &str) -> Option<ParsedEvent> {
    let caps = SCENE_RE.captures(line)?;
    let mut parts = caps[1].split(':');
    let command = parts.next().unwrap_or_default().to_string();
    let args: Vec<String> = parts.map(str::to_string).collect();
    Some(ParsedEvent::msg(ServerMessage::Scene { command, args }))
}

fn rule_choice(line: &str) -> Option<ParsedEvent> {
    let caps = CHOICE_RE.captures(line)?;
    let options: Vec<String> = caps[1]
        .split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    Some(ParsedEvent::msg(ServerMessage::Choices { options }))
}

fn rule_xp(line: &str) -> Option<ParsedEvent> {
    let caps = XP_RE.captures(line)?;
    let amount: u32 = caps[1].parse().ok()?;
    Some(ParsedEvent::msg(ServerMessage::XpGain { amount }))
}

fn rule_hp(line: &str) -> Option<ParsedEvent> {
    let caps = HP_RE.captures(line)?;
    let delta: i32 = caps[2].parse().ok()?;
    Some(ParsedEvent {
        message: None,
        hp: Some(ParsedHp {
            name: caps[1].to_string(),
            delta,
        }),
    })
}

/// `[ATTACK: attacker → target, damage: N]` — the model sometimes emits
/// these instead of `[HP:Name:-N]`.
fn rule_attack(line: &str) -> Option<ParsedEvent> {
    let caps = ATTACK_RE.captures(line)?;
    let name = caps[1].trim().to_string();
    let dmg: i32 = caps[2].parse().ok()?;
    let text = line.strip_prefix("[ATTACK:").unwrap_or(line);
    let text = text.strip_suffix(']').unwrap_or(text).trim().to_string();
    Some(ParsedEvent {
        message: Some(ServerMessage::Dmg { text }),
        hp: Some(ParsedHp { name, delta: -dmg }),
    })
}

/// `[COMBAT:enemy_attack:target:N]` and friends.
fn rule_combat_action(line: &str) -> Option<ParsedEvent> {
    let caps = COMBAT_ACTION_RE.captures(line)?;
    let action = caps[1].to_lowercase();
    let target = caps[2].trim().to_string();
    let amount: i32 = caps[3].parse().ok()?;
    if action.contains("enemy") || action.contains("monster") {
        return Some(ParsedEvent {
            message: Some(ServerMessage::Dmg {
                text: format!("{} takes {} damage", target, amount),
            }),
            hp: Some(ParsedHp {
                name: target,
                delta: -amount,
            }),
        });
    }
    Some(ParsedEvent::msg(ServerMessage::Dmg {
        text: format!("Attack on {} for {} damage", target, amount),
    }))
}

/// Free-form `[COMBAT:X 攻击 Y, 造成 N 点伤害]`. The delta lands on the
/// target unless the attacker looks like a party member.
fn rule_combat_cjk(line: &str) -> Option<ParsedEvent> {
    let caps = COMBAT_CJK_RE.captures(line)?;
    let attacker = caps[1].trim().to_string();
    let target = caps[2].trim().to_string();
    let amount: i32 = caps[3].parse().ok()?;
    let text = format!("{} attacks {} for {} damage", attacker, target, amount);
    let is_enemy_attack = !attacker.contains('#') && !attacker.to_lowercase().contains("player");
    Some(ParsedEvent {
        message: Some(ServerMessage::Dmg { text }),
        hp: is_enemy_attack.then_some(ParsedHp {
            name: target,
            delta: -amount,
        }),
    })
}

/// `[COMBAT:X 被击败]` / `[COMBAT:X defeated]` defeat notices.
fn rule_combat_defeat(line: &str) -> Option<ParsedEvent> {
    let caps = COMBAT_DEFEAT_RE.captures(line)?;
    Some(ParsedEvent::msg(ServerMessage::Sys {
        text: format!("{} defeated", caps[1].trim()),
    }))
}

/// Generic `[DAMAGE|DMG|COMBAT: target takes N damage]`.
fn rule_generic_damage(line: &str) -> Option<ParsedEvent> {
    let caps = GENERIC_DMG_RE.captures(line)?;
    let name = caps[1].trim().to_string();
    let dmg: i32 = caps[2].parse().ok()?;
    let text = GENERIC_DMG_STRIP_RE.replace(line, "");
    let text = text.strip_suffix(']').unwrap_or(&text).trim().to_string();
    Some(ParsedEvent {
        message: Some(ServerMessage::Dmg { text }),
        hp: Some(ParsedHp { name, delta: -dmg }),
    })
}

/// Invented tags the protocol always discards, yielding nothing at all.
fn rule_ignored_tags(line: &str) -> Option<ParsedEvent> {
    if IGNORE_RE.is_match(line) || COMBAT_START_END_RE.is_match(line) || HP_STATUS_RE.is_match(line)
    {
        return Some(ParsedEvent::default());
    }
    // [COMBAT:enemy_attack:Well Horror] with no damage number is useless.
    if COMBAT_NO_DMG_RE.is_match(line) && !line.chars().any(|c| c.is_ascii_digit()) {
        return Some(ParsedEvent::default());
    }
    None
}

/// Bare `对{target}造成{N}点伤害`, no brackets at all.
fn rule_cjk_free_damage(line: &str) -> Option<ParsedEvent> {
    let caps = CJK_FREE_DMG_RE.captures(line)?;
    let target = caps[1].trim().to_string();
    let amount: i32 = caps[2].parse().ok()?;
    let text = LOOSE_BULLET_RE.replace(line, "");
    let text = LEADING_TAG_RE.replace(&text, "").trim().to_string();
    Some(ParsedEvent {
        message: Some(ServerMessage::Dmg { text }),
        hp: Some(ParsedHp {
            name: target,
            delta: -amount,
        }),
    })
}

/// AI self-commentary ("I can see", "Here's", ...) never reaches the player.
fn rule_meta_commentary(line: &str) -> Option<ParsedEvent> {
    META_RE.is_match(line).then(ParsedEvent::default)
}

/// Untagged dialogue like `Name #2: "text"` or `名字：「text」`.
fn rule_dialogue(line: &str) -> Option<ParsedEvent> {
    let caps = DIALOGUE_HASH_RE
        .captures(line)
        .or_else(|| DIALOGUE_NAME_RE.captures(line))?;
    let name = caps[1].trim().to_string();
    let text = caps[2].replace('*', "").trim().to_string();
    Some(ParsedEvent::msg(ServerMessage::Nfa { name, text }))
}
