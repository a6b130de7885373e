pub mod aug;
pub mod generic;

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::{
    damage::DamageAmp,
    game_data::PrimaryAttribute,
    log_event::Talent,
    player_state::AuraCaster,
    stats::CombatStats,
};

/// Augmentation Evoker.
pub const AUGMENTATION: u32 = 1473;

/// Per-spec behavior layered on top of the shared player model.
///
/// Only the spec-specific parts live here; gear, shared auras and the damage
/// normalization itself are handled by `PlayerState`.
pub trait SpecBehavior: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Base offsets and talent effects. Applied once, after gear and auras.
    fn apply_bonuses(&mut self, stats: &mut CombatStats, talents: &[Talent]);

    /// Extra amp for a direct hit of `spell_id`.
    fn impact(&self, _spell_id: u64) -> DamageAmp {
        DamageAmp::default()
    }

    /// Extra amp for a periodic tick of `spell_id`.
    fn tick(&self, spell_id: u64) -> DamageAmp {
        self.impact(spell_id)
    }

    /// Spec-only aura handling. Return `true` to stop the shared handlers
    /// from also seeing the aura.
    fn handle_aura(
        &mut self,
        _stats:    &mut CombatStats,
        _caster:   AuraCaster<'_>,
        _spell_id: u64,
        _new:      u8,
        _old:      u8,
    ) -> bool {
        false
    }
}

pub type SpecConstructor = fn() -> Box<dyn SpecBehavior>;

/// One registry row.
#[derive(Clone, Copy)]
pub struct SpecEntry {
    pub name:    &'static str,
    pub primary: PrimaryAttribute,
    pub create:  SpecConstructor,
}

impl std::fmt::Debug for SpecEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecEntry")
            .field("name", &self.name)
            .field("primary", &self.primary)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Class table
// ---------------------------------------------------------------------------

use crate::game_data::PrimaryAttribute::{Agility as AGI, Intellect as INT, Strength as STR};

/// (spec id, name, primary). Spec 0 is what the game logs for a character
/// with no spec at all.
const CLASS_TABLE: &[(u32, &str, PrimaryAttribute)] = &[
    (0,    "Invalid",              STR),

    (250,  "Blood",                STR),
    (251,  "Frost DK",             STR),
    (252,  "Unholy",               STR),
    (1455, "Death Knight",         STR),

    (577,  "Havoc",                AGI),
    (581,  "Vengeance",            AGI),
    (1456, "Demon Hunter",         AGI),

    (102,  "Balance",              INT),
    (103,  "Feral",                AGI),
    (104,  "Guardian",             AGI),
    (105,  "Restoration Druid",    INT),
    (1447, "Druid",                INT),

    (1467, "Devastation",          INT),
    (1468, "Preservation",         INT),
    (1465, "Evoker",               INT),

    (253,  "Beast Mastery",        AGI),
    (254,  "Marksmanship",         AGI),
    (255,  "Survival",             AGI),
    (1448, "Hunter",               AGI),

    (62,   "Arcane",               INT),
    (63,   "Fire",                 INT),
    (64,   "Frost Mage",           INT),
    (1449, "Mage",                 INT),

    (268,  "Brewmaster",           AGI),
    (269,  "Windwalker",           AGI),
    (270,  "Mistweaver",           INT),
    (1450, "Monk",                 AGI),

    (65,   "Holy Paladin",         INT),
    (66,   "Protection Paladin",   STR),
    (70,   "Retribution",          STR),
    (1451, "Paladin",              STR),

    (256,  "Discipline",           INT),
    (257,  "Holy Priest",          INT),
    (258,  "Shadow",               INT),
    (1452, "Priest",               INT),

    (259,  "Assassination",        AGI),
    (260,  "Outlaw",               AGI),
    (261,  "Subtlety",             AGI),
    (1453, "Rogue",                AGI),

    (262,  "Elemental",            INT),
    (263,  "Enhancement",          AGI),
    (264,  "Restoration Shaman",   INT),
    (1444, "Shaman",               INT),

    (265,  "Affliction",           INT),
    (266,  "Demonology",           INT),
    (267,  "Destruction",          INT),
    (1454, "Warlock",              INT),

    (71,   "Arms",                 STR),
    (72,   "Fury",                 STR),
    (73,   "Protection Warrior",   STR),
    (1446, "Warrior",              STR),
];

static REGISTRY: Lazy<HashMap<u32, SpecEntry>> = Lazy::new(|| {
    let mut map: HashMap<u32, SpecEntry> = CLASS_TABLE
        .iter()
        .map(|&(id, name, primary)| {
            (id, SpecEntry { name, primary, create: generic::create as SpecConstructor })
        })
        .collect();
    map.insert(AUGMENTATION, SpecEntry {
        name:    "Augmentation",
        primary: INT,
        create:  aug::create,
    });
    map
});

/// Registry row for `spec_id`, if the spec is known.
pub fn lookup(spec_id: u32) -> Option<SpecEntry> {
    REGISTRY.get(&spec_id).copied()
}
