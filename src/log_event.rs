/// Typed combat log events as produced by an upstream log parser.
///
/// Text parsing of WoWCombatLog.txt happens outside this crate. What arrives
/// here is one `RawEvent` per log line: the line's timestamp, the byte offset
/// where the line starts (so ingestion can resume mid-file), and the typed
/// payload. On disk this is JSON lines:
///
///   {"timestamp_ms":1000,"offset":0,"type":"EncounterStart","encounter_id":2820,...}
///
/// Unit flags follow the game's bit layout:
///   0x00000100  CONTROL_PLAYER  (player-owned: players, their pets, guardians)
///   0x00000400  TYPE_PLAYER     (the unit itself is a player character)
use serde::{Deserialize, Serialize};

use crate::build_version::BuildVersion;

// ---------------------------------------------------------------------------
// Shared payload pieces
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitFlags(pub u32);

impl UnitFlags {
    pub const CONTROL_PLAYER: u32 = 0x0000_0100;
    pub const TYPE_PLAYER:    u32 = 0x0000_0400;

    /// Controlled by a player: the player, their pets and guardians.
    pub fn is_player_owned(self) -> bool {
        self.0 & Self::CONTROL_PLAYER != 0
    }

    /// The unit is a player character.
    pub fn is_player_type(self) -> bool {
        self.0 & Self::TYPE_PLAYER != 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub guid:  String,
    #[serde(default)]
    pub name:  String,
    #[serde(default)]
    pub flags: UnitFlags,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombatHeader {
    pub source: Unit,
    pub dest:   Unit,
}

/// The advanced-logging block: who the acting unit is and who owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvancedInfo {
    pub unit_guid:  String,
    pub owner_guid: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DamageInfo {
    /// Final amount after absorbs, as the game reports it.
    pub amount: i64,
    #[serde(default)]
    pub crit:   bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Talent {
    pub trait_node_id:       u32,
    pub trait_node_entry_id: u32,
    #[serde(default = "default_rank")]
    pub rank:                u8,
}

fn default_rank() -> u8 { 1 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub item_id:              u64,
    pub ilvl:                 u16,
    #[serde(default)]
    pub permanent_enchant_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestingAura {
    pub caster_guid: String,
    pub spell_id:    u64,
}

/// COMBATANT_INFO: loadout snapshot of one player at encounter start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatantInfo {
    pub guid:              String,
    pub spec_id:           u32,
    #[serde(default)]
    pub talents:           Vec<Talent>,
    #[serde(default)]
    pub items:             Vec<Item>,
    #[serde(default)]
    pub interesting_auras: Vec<InterestingAura>,
}

impl CombatantInfo {
    /// Item level of the first equipped copy of `item_id`.
    pub fn ilvl_of(&self, item_id: u64) -> Option<u16> {
        self.items.iter().find(|i| i.item_id == item_id).map(|i| i.ilvl)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncounterInfo {
    pub encounter_id:   u32,
    pub encounter_name: String,
    pub difficulty_id:  u32,
    pub instance_size:  u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncounterEndInfo {
    pub encounter_id:   u32,
    pub encounter_name: String,
    pub difficulty_id:  u32,
    pub group_size:     u32,
    pub success:        bool,
}

// ---------------------------------------------------------------------------
// LogEvent
// ---------------------------------------------------------------------------

/// Typed combat log events the ingestor cares about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LogEvent {
    CombatLogVersion {
        build: BuildVersion,
    },
    EncounterStart(EncounterInfo),
    EncounterEnd(EncounterEndInfo),
    CombatantInfo(CombatantInfo),
    ZoneChange {
        instance_id:   u32,
        #[serde(default)]
        zone_name:     String,
        #[serde(default)]
        difficulty_id: u32,
    },
    SpellCastSuccess {
        header:   CombatHeader,
        #[serde(default)]
        advanced: Option<AdvancedInfo>,
        spell_id: u64,
    },
    SpellSummon {
        header:   CombatHeader,
        spell_id: u64,
    },
    SpellDamage {
        header:   CombatHeader,
        #[serde(default)]
        advanced: Option<AdvancedInfo>,
        spell_id: u64,
        damage:   DamageInfo,
    },
    SpellPeriodicDamage {
        header:   CombatHeader,
        #[serde(default)]
        advanced: Option<AdvancedInfo>,
        spell_id: u64,
        damage:   DamageInfo,
    },
    SwingDamage {
        header:   CombatHeader,
        #[serde(default)]
        advanced: Option<AdvancedInfo>,
        damage:   DamageInfo,
    },
    SwingDamageLanded {
        header:   CombatHeader,
        #[serde(default)]
        advanced: Option<AdvancedInfo>,
        damage:   DamageInfo,
    },
    SpellDamageSupport {
        header:         CombatHeader,
        #[serde(default)]
        advanced:       Option<AdvancedInfo>,
        spell_id:       u64,
        damage:         DamageInfo,
        supporter_guid: String,
    },
    SpellPeriodicDamageSupport {
        header:         CombatHeader,
        #[serde(default)]
        advanced:       Option<AdvancedInfo>,
        spell_id:       u64,
        damage:         DamageInfo,
        supporter_guid: String,
    },
    SwingDamageSupport {
        header:         CombatHeader,
        #[serde(default)]
        advanced:       Option<AdvancedInfo>,
        damage:         DamageInfo,
        supporter_guid: String,
    },
    SpellAuraApplied {
        header:   CombatHeader,
        spell_id: u64,
    },
    SpellAuraAppliedDose {
        header:   CombatHeader,
        spell_id: u64,
        stacks:   u8,
    },
    SpellAuraRemoved {
        header:   CombatHeader,
        spell_id: u64,
    },
    SpellAuraRemovedDose {
        header:   CombatHeader,
        spell_id: u64,
        stacks:   u8,
    },
    UnitDied {
        header: CombatHeader,
    },
    SpellResurrect {
        header:   CombatHeader,
        spell_id: u64,
    },
}

impl LogEvent {
    /// Source/dest block, for events that carry one.
    pub fn header(&self) -> Option<&CombatHeader> {
        match self {
            Self::SpellCastSuccess           { header, .. } => Some(header),
            Self::SpellSummon                { header, .. } => Some(header),
            Self::SpellDamage                { header, .. } => Some(header),
            Self::SpellPeriodicDamage        { header, .. } => Some(header),
            Self::SwingDamage                { header, .. } => Some(header),
            Self::SwingDamageLanded          { header, .. } => Some(header),
            Self::SpellDamageSupport         { header, .. } => Some(header),
            Self::SpellPeriodicDamageSupport { header, .. } => Some(header),
            Self::SwingDamageSupport         { header, .. } => Some(header),
            Self::SpellAuraApplied           { header, .. } => Some(header),
            Self::SpellAuraAppliedDose       { header, .. } => Some(header),
            Self::SpellAuraRemoved           { header, .. } => Some(header),
            Self::SpellAuraRemovedDose       { header, .. } => Some(header),
            Self::UnitDied                   { header }     => Some(header),
            Self::SpellResurrect             { header, .. } => Some(header),
            Self::CombatLogVersion { .. }
            | Self::EncounterStart(_)
            | Self::EncounterEnd(_)
            | Self::CombatantInfo(_)
            | Self::ZoneChange { .. }                       => None,
        }
    }

    /// Advanced-logging ownership block, when the line carried one.
    pub fn advanced(&self) -> Option<&AdvancedInfo> {
        match self {
            Self::SpellCastSuccess           { advanced, .. } => advanced.as_ref(),
            Self::SpellDamage                { advanced, .. } => advanced.as_ref(),
            Self::SpellPeriodicDamage        { advanced, .. } => advanced.as_ref(),
            Self::SwingDamage                { advanced, .. } => advanced.as_ref(),
            Self::SwingDamageLanded          { advanced, .. } => advanced.as_ref(),
            Self::SpellDamageSupport         { advanced, .. } => advanced.as_ref(),
            Self::SpellPeriodicDamageSupport { advanced, .. } => advanced.as_ref(),
            Self::SwingDamageSupport         { advanced, .. } => advanced.as_ref(),
            _                                                 => None,
        }
    }
}

/// One log line: when it happened, where it started in the file, what it was.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub timestamp_ms: i64,
    #[serde(default)]
    pub offset:       u64,
    #[serde(flatten)]
    pub event:        LogEvent,
}

impl RawEvent {
    pub fn new(timestamp_ms: i64, offset: u64, event: LogEvent) -> Self {
        Self { timestamp_ms, offset, event }
    }
}

/// Parse a JSON-lines document into events. Blank lines are skipped; a bad
/// line is logged and skipped rather than failing the whole file.
pub fn parse_json_lines(raw: &str) -> Vec<RawEvent> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(n, line)| {
            serde_json::from_str::<RawEvent>(line)
                .map_err(|e| tracing::warn!("Skipping event line {}: {}", n + 1, e))
                .ok()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;

    const SPELL_DAMAGE_LINE: &str = r#"{"timestamp_ms":5000,"offset":120,"type":"SpellDamage","header":{"source":{"guid":"Player-1234-0ABCDEF","name":"Stonebraid","flags":1297},"dest":{"guid":"Creature-0-4372-2549-000","name":"Boss","flags":2632}},"spell_id":361469,"damage":{"amount":55000,"crit":true}}"#;

    const START_LINE: &str = r#"{"timestamp_ms":1000,"offset":0,"type":"EncounterStart","encounter_id":2820,"encounter_name":"Gnarlroot","difficulty_id":16,"instance_size":20}"#;

    const VERSION_LINE: &str = r#"{"timestamp_ms":0,"type":"CombatLogVersion","build":"10.2.5"}"#;

    #[test]
    fn parses_spell_damage() {
        let e: RawEvent = serde_json::from_str(SPELL_DAMAGE_LINE).expect("should parse");
        assert_eq!(e.timestamp_ms, 5000);
        assert_eq!(e.offset,       120);
        match e.event {
            LogEvent::SpellDamage { header, spell_id, damage, advanced } => {
                assert_eq!(spell_id,           361469);
                assert_eq!(damage.amount,      55000);
                assert!(damage.crit);
                assert!(advanced.is_none());
                assert_eq!(header.source.name, "Stonebraid");
                assert!(header.source.flags.is_player_owned());
                assert!(header.source.flags.is_player_type());
                assert!(!header.dest.flags.is_player_owned());
            }
            other => panic!("Wrong variant: {:?}", other),
        }
    }

    #[test]
    fn parses_encounter_start() {
        let e: RawEvent = serde_json::from_str(START_LINE).expect("should parse");
        match e.event {
            LogEvent::EncounterStart(info) => {
                assert_eq!(info.encounter_id,  2820);
                assert_eq!(info.instance_size, 20);
                assert_eq!(info.difficulty_id, 16);
            }
            other => panic!("Wrong variant: {:?}", other),
        }
    }

    #[test]
    fn parses_version_marker() {
        let e: RawEvent = serde_json::from_str(VERSION_LINE).expect("should parse");
        assert_eq!(e.offset, 0);
        match e.event {
            LogEvent::CombatLogVersion { build } => assert_eq!(build.to_string(), "10.2.5"),
            other => panic!("Wrong variant: {:?}", other),
        }
    }

    #[test]
    fn header_accessor_matches_variant() {
        let e: RawEvent = serde_json::from_str(SPELL_DAMAGE_LINE).unwrap();
        assert_eq!(e.event.header().map(|h| h.dest.name.as_str()), Some("Boss"));
        let s: RawEvent = serde_json::from_str(START_LINE).unwrap();
        assert!(s.event.header().is_none());
    }

    #[test]
    fn pet_flags_are_owned_but_not_player_type() {
        // 0x1111: pet, controlled by a player, in the raid
        let flags = UnitFlags(0x1111);
        assert!(flags.is_player_owned());
        assert!(!flags.is_player_type());
    }

    #[test]
    fn json_lines_skip_garbage() {
        let doc = format!("{}\n\nnot json\n{}\n", START_LINE, SPELL_DAMAGE_LINE);
        let events = parse_json_lines(&doc);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn round_trips_through_json() {
        let e: RawEvent = serde_json::from_str(SPELL_DAMAGE_LINE).unwrap();
        let back: RawEvent = serde_json::from_str(&serde_json::to_string(&e).unwrap()).unwrap();
        assert_eq!(e, back);
    }
}
