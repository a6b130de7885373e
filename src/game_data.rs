/// Game data tables: items, per-ilvl stat budgets, combat-rating multipliers
/// and spell flags.
///
/// A small sample table is embedded at compile time from
/// `data/game_data.toml`. A full export can be loaded at runtime with
/// `GameData::load` and selected through `AppConfig.game_data_path`.
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{LedgerError, LedgerResult};
use crate::stats::{CombatStat, CombatStats};

// ---------------------------------------------------------------------------
// Embedded TOML data
// ---------------------------------------------------------------------------

const EMBEDDED_GAME_DATA: &str = include_str!("../data/game_data.toml");

static EMBEDDED: Lazy<GameData> = Lazy::new(|| {
    GameData::from_toml_str(EMBEDDED_GAME_DATA).unwrap_or_else(|e| {
        tracing::error!("Embedded game data is unreadable: {}", e);
        GameData::default()
    })
});

/// Items carry at most this many stat pairs.
const MAX_ITEM_STATS: usize = 10;

// ---------------------------------------------------------------------------
// TOML deserialization structs (private)
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct TomlFile {
    #[serde(default)]
    item:        Vec<TomlItem>,
    #[serde(default)]
    rand_prop:   Vec<TomlRandProp>,
    #[serde(default)]
    rating_mult: Vec<TomlRatingMult>,
    #[serde(default)]
    spell:       Vec<TomlSpell>,
}

#[derive(Deserialize)]
struct TomlItem {
    id:    u64,
    slot:  ItemSlot,
    #[serde(default)]
    stats: Vec<(u8, f64)>,
}

#[derive(Deserialize)]
struct TomlRandProp {
    ilvl:                u16,
    damage_replace_stat: f64,
    budget:              [f64; 5],
}

#[derive(Deserialize)]
struct TomlRatingMult {
    ilvl:    u16,
    armor:   f64,
    weapon:  f64,
    trinket: f64,
    jewelry: f64,
}

#[derive(Deserialize)]
struct TomlSpell {
    id:                        u64,
    scales_with_primary:       bool,
    can_not_crit:              bool,
    allow_class_ability_procs: bool,
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemSlot {
    Ranged,
    RangedRight,
    TwoHand,
    Head,
    Chest,
    Robe,
    Legs,
    Shoulder,
    Waist,
    Feet,
    Hands,
    Trinket,
    Neck,
    Wrist,
    Finger,
    Back,
    Holdable,
    OffHandWeapon,
    OneHand,
    MainHand,
    Shield,
    Shirt,
    Tabard,
    Bag,
    Ammo,
    Thrown,
    Relic,
}

/// Which combat-rating multiplier column applies to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingCategory {
    Weapon,
    Armor,
    Trinket,
    Jewelry,
}

impl ItemSlot {
    /// Index into `RandProp::budget`. `Ok(None)` for slots that never carry stats.
    pub fn budget_tier(self) -> LedgerResult<Option<usize>> {
        use ItemSlot::*;
        match self {
            Ranged | RangedRight | TwoHand | Head | Chest | Robe | Legs => Ok(Some(0)),
            Shoulder | Waist | Feet | Hands | Trinket                   => Ok(Some(1)),
            Neck | Wrist | Finger | Back                                => Ok(Some(2)),
            Holdable | OffHandWeapon | OneHand | MainHand | Shield      => Ok(Some(3)),
            Shirt | Tabard                                              => Ok(None),
            other => Err(LedgerError::InvariantViolation(format!("no stat budget for slot {:?}", other))),
        }
    }

    pub fn rating_category(self) -> Option<RatingCategory> {
        use ItemSlot::*;
        match self {
            Ranged | RangedRight | TwoHand | OffHandWeapon | OneHand | MainHand => Some(RatingCategory::Weapon),
            Head | Chest | Robe | Legs | Shoulder | Waist | Feet | Hands | Wrist | Back | Holdable | Shield => {
                Some(RatingCategory::Armor)
            }
            Trinket        => Some(RatingCategory::Trinket),
            Neck | Finger  => Some(RatingCategory::Jewelry),
            _              => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimaryAttribute {
    Strength,
    Agility,
    Intellect,
}

/// Stat type ids as they appear in item data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    Agility,
    Strength,
    Intellect,
    CritRating,
    HasteRating,
    VersRating,
    MasteryRating,
    AnyPrimary,
    AgilityOrStrength,
    AgilityOrIntellect,
    StrengthOrIntellect,
    Other(u8),
}

impl From<u8> for StatKind {
    fn from(id: u8) -> Self {
        match id {
            3  => StatKind::Agility,
            4  => StatKind::Strength,
            5  => StatKind::Intellect,
            32 => StatKind::CritRating,
            36 => StatKind::HasteRating,
            40 => StatKind::VersRating,
            49 => StatKind::MasteryRating,
            71 => StatKind::AnyPrimary,
            72 => StatKind::AgilityOrStrength,
            73 => StatKind::AgilityOrIntellect,
            74 => StatKind::StrengthOrIntellect,
            other => StatKind::Other(other),
        }
    }
}

impl StatKind {
    /// True when this is a primary stat type that `primary` users benefit from.
    pub fn grants_primary(self, primary: PrimaryAttribute) -> bool {
        use PrimaryAttribute as P;
        match self {
            StatKind::Agility             => primary == P::Agility,
            StatKind::Strength            => primary == P::Strength,
            StatKind::Intellect           => primary == P::Intellect,
            StatKind::AnyPrimary          => true,
            StatKind::AgilityOrStrength   => matches!(primary, P::Agility | P::Strength),
            StatKind::AgilityOrIntellect  => matches!(primary, P::Agility | P::Intellect),
            StatKind::StrengthOrIntellect => matches!(primary, P::Strength | P::Intellect),
            _ => false,
        }
    }

    /// The secondary rating this stat type feeds, if tracked.
    pub fn rating(self) -> Option<CombatStat> {
        match self {
            StatKind::CritRating    => Some(CombatStat::CritRating),
            StatKind::VersRating    => Some(CombatStat::VersRating),
            StatKind::MasteryRating => Some(CombatStat::MasteryRating),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemStat {
    pub kind:   StatKind,
    /// Share of the slot budget in units of 1/10000.
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemData {
    pub id:    u64,
    pub slot:  ItemSlot,
    pub stats: Vec<ItemStat>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandProp {
    pub damage_replace_stat: f64,
    pub budget:              [f64; 5],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingMult {
    pub armor:   f64,
    pub weapon:  f64,
    pub trinket: f64,
    pub jewelry: f64,
}

impl RatingMult {
    pub fn for_category(&self, category: RatingCategory) -> f64 {
        match category {
            RatingCategory::Weapon  => self.weapon,
            RatingCategory::Armor   => self.armor,
            RatingCategory::Trinket => self.trinket,
            RatingCategory::Jewelry => self.jewelry,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpellFlags {
    pub scales_with_primary:       bool,
    pub can_not_crit:              bool,
    pub allow_class_ability_procs: bool,
}

/// Read-only keyed lookup over every table.
#[derive(Debug, Clone, Default)]
pub struct GameData {
    items:        HashMap<u64, ItemData>,
    rand_props:   HashMap<u16, RandProp>,
    rating_mults: HashMap<u16, RatingMult>,
    spells:       HashMap<u64, SpellFlags>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl GameData {
    /// The sample table compiled into the binary.
    pub fn embedded() -> &'static GameData {
        &EMBEDDED
    }

    pub fn from_toml_str(text: &str) -> LedgerResult<Self> {
        let file: TomlFile = toml::from_str(text)
            .map_err(|e| LedgerError::MalformedInput(format!("game data TOML: {}", e)))?;

        let mut data = GameData::default();
        for item in file.item {
            if item.stats.len() > MAX_ITEM_STATS {
                return Err(LedgerError::MalformedInput(format!(
                    "item {} has {} stats (max {})",
                    item.id, item.stats.len(), MAX_ITEM_STATS
                )));
            }
            let stats = item
                .stats
                .into_iter()
                .map(|(kind, weight)| ItemStat { kind: kind.into(), weight })
                .collect();
            data.items.insert(item.id, ItemData { id: item.id, slot: item.slot, stats });
        }
        for rp in file.rand_prop {
            data.rand_props.insert(rp.ilvl, RandProp {
                damage_replace_stat: rp.damage_replace_stat,
                budget:              rp.budget,
            });
        }
        for rm in file.rating_mult {
            data.rating_mults.insert(rm.ilvl, RatingMult {
                armor:   rm.armor,
                weapon:  rm.weapon,
                trinket: rm.trinket,
                jewelry: rm.jewelry,
            });
        }
        for sp in file.spell {
            data.spells.insert(sp.id, SpellFlags {
                scales_with_primary:       sp.scales_with_primary,
                can_not_crit:              sp.can_not_crit,
                allow_class_ability_procs: sp.allow_class_ability_procs,
            });
        }
        Ok(data)
    }

    /// Read a full external table.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Game data read error ({}): {}", path.display(), e))?;
        let data = Self::from_toml_str(&text)
            .map_err(|e| anyhow::anyhow!("Game data parse error ({}): {}", path.display(), e))?;
        tracing::info!(
            "Loaded game data from {}: {} items, {} ilvls, {} spells",
            path.display(), data.items.len(), data.rand_props.len(), data.spells.len()
        );
        Ok(data)
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    pub fn item(&self, id: u64) -> LedgerResult<&ItemData> {
        self.items.get(&id).ok_or_else(|| LedgerError::unknown("item", id))
    }

    pub fn rand_prop(&self, ilvl: u16) -> LedgerResult<&RandProp> {
        self.rand_props.get(&ilvl).ok_or_else(|| LedgerError::unknown("item level", ilvl))
    }

    pub fn rating_mult(&self, ilvl: u16) -> LedgerResult<&RatingMult> {
        self.rating_mults.get(&ilvl).ok_or_else(|| LedgerError::unknown("rating multiplier ilvl", ilvl))
    }

    pub fn spell(&self, id: u64) -> LedgerResult<SpellFlags> {
        self.spells.get(&id).copied().ok_or_else(|| LedgerError::unknown("spell", id))
    }

    /// Stats granted by one equipped item to a `primary` user.
    pub fn item_stats(&self, primary: PrimaryAttribute, item_id: u64, ilvl: u16) -> LedgerResult<CombatStats> {
        let mut stats = CombatStats::ZERO;
        let item = self.item(item_id)?;
        let Some(tier) = item.slot.budget_tier()? else {
            return Ok(stats);
        };
        let budget = self.rand_prop(ilvl)?.budget[tier];

        for stat in &item.stats {
            let amount = budget * stat.weight * 0.0001;
            if stat.kind.grants_primary(primary) {
                stats[CombatStat::Primary] += amount;
            } else if let Some(rating) = stat.kind.rating() {
                let category = item.slot.rating_category().ok_or_else(|| {
                    LedgerError::InvariantViolation(format!("no rating multiplier for slot {:?}", item.slot))
                })?;
                stats[rating] += amount * self.rating_mult(ilvl)?.for_category(category);
            }
        }
        Ok(stats)
    }
}
