/// Per-unit event payloads produced by the ingestor and consumed by the
/// simulator and aggregator.
///
/// Units refer to each other by arena index (`TargetId`, `PlayerId`) into the
/// owning `Encounter`, never by pointer, so collections can grow freely while
/// an encounter is being built.
use serde::{Deserialize, Serialize};

/// A payload stamped with milliseconds since encounter start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event<T> {
    pub when: i64,
    pub what: T,
}

impl<T> Event<T> {
    pub fn new(when: i64, what: T) -> Self {
        Self { when, what }
    }
}

/// Deaths and resurrections carry nothing but a time.
pub type Marker = Event<()>;

pub fn marker(when: i64) -> Marker {
    Event { when, what: () }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub usize);

/// Either side of an interaction: a plain target or a registered player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitRef {
    Target(TargetId),
    Player(PlayerId),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AuraChanged {
    pub caster:   UnitRef,
    pub spell_id: u64,
    pub stacks:   u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpellImpact {
    pub spell_id:    u64,
    pub crit:        bool,
    pub damage_done: i64,
    pub target:      UnitRef,
}

/// Periodic damage. Same shape as an impact; kept apart so callers can tell
/// direct hits from ticks.
pub type SpellTick = SpellImpact;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Swing {
    pub crit:        bool,
    pub damage_done: i64,
    pub target:      UnitRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PetSwing {
    pub pet_name: String,
    pub swing:    Swing,
}

/// Stable sort by time. Equal timestamps keep insertion order.
pub fn sort_by_time<T>(events: &mut [Event<T>]) {
    events.sort_by_key(|e| e.when);
}
