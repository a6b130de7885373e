/// Encounter ingestion: turns a chronological `RawEvent` stream into
/// completed `Encounter` records with per-unit event lists.
///
/// Pets and guardians are not known to belong to anyone until an advanced-info
/// block or a summon event says so, which may happen after their first hit.
/// Their events are therefore buffered per pet guid ("friendlies") and folded
/// into the owning player only when the encounter closes.
use std::collections::HashMap;

use crate::{
    build_version::BuildVersion,
    event::{
        marker, sort_by_time, AuraChanged, Event, Marker, PetSwing, PlayerId, SpellImpact,
        SpellTick, Swing, TargetId, UnitRef,
    },
    log_event::{CombatHeader, CombatantInfo, EncounterEndInfo, EncounterInfo, LogEvent, RawEvent},
};

/// Groups of this size or smaller are not raids and are ignored entirely.
const MIN_RAID_SIZE_EXCLUSIVE: u32 = 5;

/// Names the game uses when it has none. Never recorded as a real name.
const INVALID_NAME: &str = "Unknown";

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Target {
    pub guid:         String,
    pub name:         String,
    pub aura_changed: Vec<Event<AuraChanged>>,
}

#[derive(Debug, Clone)]
pub struct Player {
    pub guid:         String,
    pub name:         String,
    pub info:         CombatantInfo,
    pub aura_changed: Vec<Event<AuraChanged>>,
    pub spell_impact: Vec<Event<SpellImpact>>,
    pub spell_tick:   Vec<Event<SpellTick>>,
    pub swing:        Vec<Event<Swing>>,
    pub pet_swing:    Vec<Event<PetSwing>>,
    pub died:         Vec<Marker>,
    pub rezzed:       Vec<Marker>,
}

impl Player {
    fn new(info: CombatantInfo) -> Self {
        Self {
            guid:         info.guid.clone(),
            name:         String::new(),
            info,
            aura_changed: Vec::new(),
            spell_impact: Vec::new(),
            spell_tick:   Vec::new(),
            swing:        Vec::new(),
            pet_swing:    Vec::new(),
            died:         Vec::new(),
            rezzed:       Vec::new(),
        }
    }

    /// True when nothing was attributed to this player as outgoing damage.
    pub fn dealt_no_damage(&self) -> bool {
        self.spell_impact.is_empty()
            && self.spell_tick.is_empty()
            && self.swing.is_empty()
            && self.pet_swing.is_empty()
    }
}

/// One boss attempt. All event times are relative to `start_time`.
#[derive(Debug, Clone)]
pub struct Encounter {
    pub start:      EncounterInfo,
    pub end:        Option<EncounterEndInfo>,
    pub build:      Option<BuildVersion>,
    pub start_time: i64,
    pub end_time:   i64,
    /// Byte offsets of the opening and closing lines in the source log.
    pub start_byte: u64,
    pub end_byte:   u64,
    pub targets:    Vec<Target>,
    pub players:    Vec<Player>,
}

impl Encounter {
    pub fn duration_ms(&self) -> i64 {
        self.end_time - self.start_time
    }

    pub fn target(&self, id: TargetId) -> Option<&Target> {
        self.targets.get(id.0)
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(id.0)
    }

    pub fn player_by_guid(&self, guid: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.guid == guid)
    }

    /// Display name of either kind of unit.
    pub fn unit_name(&self, unit: UnitRef) -> Option<&str> {
        match unit {
            UnitRef::Target(id) => self.target(id).map(|t| t.name.as_str()),
            UnitRef::Player(id) => self.player(id).map(|p| p.name.as_str()),
        }
    }
}

// ---------------------------------------------------------------------------
// Open-encounter bookkeeping (private)
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Friendly {
    guid:         String,
    name:         String,
    spell_impact: Vec<Event<SpellImpact>>,
    spell_tick:   Vec<Event<SpellTick>>,
    swing:        Vec<Event<Swing>>,
    owner:        Option<PlayerId>,
}

#[derive(Debug)]
struct OpenEncounter {
    encounter:      Encounter,
    target_index:   HashMap<String, TargetId>,
    player_index:   HashMap<String, PlayerId>,
    friendlies:     Vec<Friendly>,
    friendly_index: HashMap<String, usize>,
}

impl OpenEncounter {
    fn new(info: EncounterInfo, start_time: i64, start_byte: u64, build: Option<BuildVersion>) -> Self {
        Self {
            encounter: Encounter {
                start: info,
                end: None,
                build,
                start_time,
                end_time: start_time,
                start_byte,
                end_byte: start_byte,
                targets: Vec::new(),
                players: Vec::new(),
            },
            target_index:   HashMap::new(),
            player_index:   HashMap::new(),
            friendlies:     Vec::new(),
            friendly_index: HashMap::new(),
        }
    }

    fn relative(&self, timestamp_ms: i64) -> i64 {
        timestamp_ms - self.encounter.start_time
    }

    fn player_id(&self, guid: &str) -> Option<PlayerId> {
        self.player_index.get(guid).copied()
    }

    fn register_player(&mut self, info: CombatantInfo) {
        match self.player_index.get(&info.guid) {
            Some(id) => self.encounter.players[id.0].info = info,
            None => {
                let id = PlayerId(self.encounter.players.len());
                self.player_index.insert(info.guid.clone(), id);
                self.encounter.players.push(Player::new(info));
            }
        }
    }

    /// The player with this guid if registered, otherwise a target (created on demand).
    fn unit_for(&mut self, guid: &str) -> UnitRef {
        if let Some(id) = self.player_id(guid) {
            return UnitRef::Player(id);
        }
        if let Some(id) = self.target_index.get(guid) {
            return UnitRef::Target(*id);
        }
        let id = TargetId(self.encounter.targets.len());
        self.target_index.insert(guid.to_owned(), id);
        self.encounter.targets.push(Target { guid: guid.to_owned(), ..Target::default() });
        UnitRef::Target(id)
    }

    fn friendly(&mut self, guid: &str) -> &mut Friendly {
        let idx = match self.friendly_index.get(guid) {
            Some(idx) => *idx,
            None => {
                let idx = self.friendlies.len();
                self.friendly_index.insert(guid.to_owned(), idx);
                self.friendlies.push(Friendly { guid: guid.to_owned(), ..Friendly::default() });
                idx
            }
        };
        &mut self.friendlies[idx]
    }

    fn set_owner(&mut self, pet_guid: &str, owner_guid: &str) {
        let Some(owner) = self.player_id(owner_guid) else {
            return;
        };
        let friendly = self.friendly(pet_guid);
        if let Some(prev) = friendly.owner {
            if prev != owner {
                tracing::debug!("Pet {} changed owner {:?} -> {:?}", pet_guid, prev, owner);
            }
        }
        friendly.owner = Some(owner);
    }

    fn push_aura(&mut self, when: i64, header: &CombatHeader, spell_id: u64, stacks: u8) {
        let caster = self.unit_for(&header.source.guid);
        let adding = Event::new(when, AuraChanged { caster, spell_id, stacks });

        if header.dest.flags.is_player_type() {
            if let Some(id) = self.player_id(&header.dest.guid) {
                self.encounter.players[id.0].aura_changed.push(adding);
            }
            return;
        }
        match self.unit_for(&header.dest.guid) {
            UnitRef::Player(id) => self.encounter.players[id.0].aura_changed.push(adding),
            UnitRef::Target(id) => self.encounter.targets[id.0].aura_changed.push(adding),
        }
    }

    fn push_impact(&mut self, when: i64, header: &CombatHeader, spell_id: u64, crit: bool, amount: i64) {
        let target = self.unit_for(&header.dest.guid);
        let adding = Event::new(when, SpellImpact { spell_id, crit, damage_done: amount, target });
        match self.player_id(&header.source.guid) {
            Some(id) => self.encounter.players[id.0].spell_impact.push(adding),
            None     => self.friendly(&header.source.guid).spell_impact.push(adding),
        }
    }

    fn push_tick(&mut self, when: i64, header: &CombatHeader, spell_id: u64, crit: bool, amount: i64) {
        let target = self.unit_for(&header.dest.guid);
        let adding = Event::new(when, SpellTick { spell_id, crit, damage_done: amount, target });
        match self.player_id(&header.source.guid) {
            Some(id) => self.encounter.players[id.0].spell_tick.push(adding),
            None     => self.friendly(&header.source.guid).spell_tick.push(adding),
        }
    }

    fn push_swing(&mut self, when: i64, header: &CombatHeader, crit: bool, amount: i64) {
        let target = self.unit_for(&header.dest.guid);
        let adding = Event::new(when, Swing { crit, damage_done: amount, target });
        match self.player_id(&header.source.guid) {
            Some(id) => self.encounter.players[id.0].swing.push(adding),
            None     => self.friendly(&header.source.guid).swing.push(adding),
        }
    }

    /// Name every unit, fold owned pets into their owners and sort.
    fn finalize(mut self, names: &HashMap<String, String>) -> Encounter {
        let mut unknown_count = 1usize;
        let mut name_for = |guid: &str| -> String {
            match names.get(guid) {
                Some(name) => name.clone(),
                None => {
                    let name = format!("Unknown{}", unknown_count);
                    unknown_count += 1;
                    name
                }
            }
        };

        for target in &mut self.encounter.targets {
            target.name = name_for(&target.guid);
        }
        for friendly in &mut self.friendlies {
            friendly.name = name_for(&friendly.guid);
        }
        for player in &mut self.encounter.players {
            player.name = name_for(&player.guid);
        }

        for friendly in self.friendlies.drain(..) {
            let Some(owner) = friendly.owner else {
                continue;
            };
            let player = &mut self.encounter.players[owner.0];
            player.spell_impact.extend(friendly.spell_impact);
            player.spell_tick.extend(friendly.spell_tick);
            player.pet_swing.extend(friendly.swing.into_iter().map(|e| {
                Event::new(e.when, PetSwing { pet_name: friendly.name.clone(), swing: e.what })
            }));
        }

        for target in &mut self.encounter.targets {
            sort_by_time(&mut target.aura_changed);
        }
        for player in &mut self.encounter.players {
            sort_by_time(&mut player.aura_changed);
            sort_by_time(&mut player.spell_impact);
            sort_by_time(&mut player.spell_tick);
            sort_by_time(&mut player.swing);
            sort_by_time(&mut player.pet_swing);
            sort_by_time(&mut player.died);
            sort_by_time(&mut player.rezzed);
        }

        self.encounter
    }
}

// ---------------------------------------------------------------------------
// Ingestor
// ---------------------------------------------------------------------------

/// Incremental ingestion state. Feed events in log order, then `finish`.
#[derive(Debug, Default)]
pub struct Ingestor {
    completed: Vec<Encounter>,
    current:   Option<OpenEncounter>,
    build:     Option<BuildVersion>,
    /// guid -> first name seen. Survives across encounters.
    names:     HashMap<String, String>,
}

impl Ingestor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_encounter(&self) -> bool {
        self.current.is_some()
    }

    /// Build announced most recently by the stream.
    pub fn build(&self) -> Option<BuildVersion> {
        self.build
    }

    /// Completed encounters so far, without consuming the ingestor.
    pub fn completed(&self) -> &[Encounter] {
        &self.completed
    }

    pub fn feed(&mut self, raw: &RawEvent) {
        let ts = raw.timestamp_ms;

        match &raw.event {
            LogEvent::CombatLogVersion { build } => {
                self.build = Some(*build);
                self.end_encounter(ts, None, raw.offset);
                return;
            }
            LogEvent::EncounterStart(info) => {
                self.start_encounter(info, ts, raw.offset);
                return;
            }
            LogEvent::EncounterEnd(info) => {
                self.end_encounter(ts, Some(info.clone()), raw.offset);
                return;
            }
            LogEvent::ZoneChange { .. } => {
                self.end_encounter(ts, None, raw.offset);
                return;
            }
            _ => {}
        }

        let Some(open) = self.current.as_mut() else {
            return;
        };

        if let Some(header) = raw.event.header() {
            note_name(&mut self.names, &header.source.guid, &header.source.name);
            note_name(&mut self.names, &header.dest.guid,   &header.dest.name);
        }
        if let Some(adv) = raw.event.advanced() {
            open.set_owner(&adv.unit_guid, &adv.owner_guid);
        }

        let when = open.relative(ts);

        match &raw.event {
            LogEvent::CombatantInfo(info) => open.register_player(info.clone()),

            LogEvent::SpellSummon { header, .. } => {
                open.set_owner(&header.dest.guid, &header.source.guid);
            }

            LogEvent::SpellDamage { header, spell_id, damage, .. } => {
                if is_outgoing(header) {
                    open.push_impact(when, header, *spell_id, damage.crit, damage.amount);
                }
            }
            LogEvent::SpellPeriodicDamage { header, spell_id, damage, .. } => {
                if is_outgoing(header) {
                    open.push_tick(when, header, *spell_id, damage.crit, damage.amount);
                }
            }
            LogEvent::SwingDamage { header, damage, .. } => {
                if is_outgoing(header) {
                    open.push_swing(when, header, damage.crit, damage.amount);
                }
            }

            // Support damage is already inside the supported player's own
            // hit; recording it negated takes the supporter's share back out.
            LogEvent::SpellDamageSupport { header, spell_id, damage, .. } => {
                if is_outgoing(header) {
                    open.push_impact(when, header, *spell_id, damage.crit, -damage.amount);
                }
            }
            LogEvent::SpellPeriodicDamageSupport { header, spell_id, damage, .. } => {
                if is_outgoing(header) {
                    open.push_tick(when, header, *spell_id, damage.crit, -damage.amount);
                }
            }
            LogEvent::SwingDamageSupport { header, damage, .. } => {
                if is_outgoing(header) {
                    open.push_swing(when, header, damage.crit, -damage.amount);
                }
            }

            LogEvent::SpellAuraApplied { header, spell_id } => {
                open.push_aura(when, header, *spell_id, 1);
            }
            LogEvent::SpellAuraAppliedDose { header, spell_id, stacks } => {
                open.push_aura(when, header, *spell_id, *stacks);
            }
            LogEvent::SpellAuraRemoved { header, spell_id } => {
                open.push_aura(when, header, *spell_id, 0);
            }
            LogEvent::SpellAuraRemovedDose { header, spell_id, stacks } => {
                open.push_aura(when, header, *spell_id, *stacks);
            }

            LogEvent::UnitDied { header } => {
                if header.dest.flags.is_player_owned() {
                    if let Some(id) = open.player_id(&header.dest.guid) {
                        open.encounter.players[id.0].died.push(marker(when));
                    }
                }
            }
            LogEvent::SpellResurrect { header, .. } => {
                if header.dest.flags.is_player_owned() {
                    if let Some(id) = open.player_id(&header.dest.guid) {
                        open.encounter.players[id.0].rezzed.push(marker(when));
                    }
                }
            }

            // Names and ownership were already noted above.
            LogEvent::SpellCastSuccess { .. } | LogEvent::SwingDamageLanded { .. } => {}

            LogEvent::CombatLogVersion { .. }
            | LogEvent::EncounterStart(_)
            | LogEvent::EncounterEnd(_)
            | LogEvent::ZoneChange { .. } => {}
        }
    }

    /// Close the stream. An encounter still open is incomplete and dropped.
    pub fn finish(mut self) -> Vec<Encounter> {
        if let Some(open) = self.current.take() {
            tracing::debug!(
                "Stream ended inside '{}', discarding partial encounter",
                open.encounter.start.encounter_name
            );
        }
        self.completed
    }

    fn start_encounter(&mut self, info: &EncounterInfo, ts: i64, offset: u64) {
        if info.instance_size <= MIN_RAID_SIZE_EXCLUSIVE {
            tracing::debug!(
                "Ignoring '{}' with group size {}",
                info.encounter_name, info.instance_size
            );
            return;
        }
        if let Some(open) = self.current.take() {
            tracing::warn!(
                "Encounter '{}' restarted before it ended, discarding unfinished attempt",
                open.encounter.start.encounter_name
            );
        }
        tracing::debug!("Encounter '{}' opened at byte {}", info.encounter_name, offset);
        self.current = Some(OpenEncounter::new(info.clone(), ts, offset, self.build));
    }

    fn end_encounter(&mut self, ts: i64, end: Option<EncounterEndInfo>, offset: u64) {
        let Some(mut open) = self.current.take() else {
            return;
        };
        open.encounter.end      = end;
        open.encounter.end_time = ts;
        open.encounter.end_byte = offset;

        let encounter = open.finalize(&self.names);
        tracing::info!(
            "Encounter '{}' closed: {} ms, {} players, {} targets",
            encounter.start.encounter_name,
            encounter.duration_ms(),
            encounter.players.len(),
            encounter.targets.len()
        );
        self.completed.push(encounter);
    }
}

/// Ingest a whole stream at once.
pub fn ingest<'a, I>(events: I) -> Vec<Encounter>
where
    I: IntoIterator<Item = &'a RawEvent>,
{
    let mut ingestor = Ingestor::new();
    for raw in events {
        ingestor.feed(raw);
    }
    ingestor.finish()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Player-side damage into a non-player-side unit.
fn is_outgoing(header: &CombatHeader) -> bool {
    header.source.flags.is_player_owned() && !header.dest.flags.is_player_owned()
}

fn note_name(names: &mut HashMap<String, String>, guid: &str, name: &str) {
    if guid.is_empty() || name.is_empty() || name == INVALID_NAME {
        return;
    }
    names.entry(guid.to_owned()).or_insert_with(|| name.to_owned());
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_event::{AdvancedInfo, DamageInfo, Unit, UnitFlags};

    const PLAYER_FLAGS: u32 = 0x511;
    const PET_FLAGS:    u32 = 0x1111;
    const NPC_FLAGS:    u32 = 0xa48;

    fn unit(guid: &str, name: &str, flags: u32) -> Unit {
        Unit { guid: guid.to_owned(), name: name.to_owned(), flags: UnitFlags(flags) }
    }

    fn header(src: Unit, dst: Unit) -> CombatHeader {
        CombatHeader { source: src, dest: dst }
    }

    fn raw(ts: i64, event: LogEvent) -> RawEvent {
        RawEvent::new(ts, ts as u64 * 10, event)
    }

    fn start(ts: i64, size: u32) -> RawEvent {
        raw(ts, LogEvent::EncounterStart(EncounterInfo {
            encounter_id:   2820,
            encounter_name: "Gnarlroot".to_owned(),
            difficulty_id:  16,
            instance_size:  size,
        }))
    }

    fn end(ts: i64) -> RawEvent {
        raw(ts, LogEvent::EncounterEnd(EncounterEndInfo {
            encounter_id:   2820,
            encounter_name: "Gnarlroot".to_owned(),
            difficulty_id:  16,
            group_size:     20,
            success:        true,
        }))
    }

    fn combatant(ts: i64, guid: &str) -> RawEvent {
        raw(ts, LogEvent::CombatantInfo(CombatantInfo {
            guid:              guid.to_owned(),
            spec_id:           1473,
            talents:           vec![],
            items:             vec![],
            interesting_auras: vec![],
        }))
    }

    fn spell_hit(ts: i64, src: Unit, dst: Unit, amount: i64) -> RawEvent {
        raw(ts, LogEvent::SpellDamage {
            header:   header(src, dst),
            advanced: None,
            spell_id: 361469,
            damage:   DamageInfo { amount, crit: false },
        })
    }

    fn swing_hit(ts: i64, src: Unit, dst: Unit, amount: i64) -> RawEvent {
        raw(ts, LogEvent::SwingDamage {
            header:   header(src, dst),
            advanced: None,
            damage:   DamageInfo { amount, crit: true },
        })
    }

    fn player() -> Unit { unit("Player-1-AAA", "Stonebraid", PLAYER_FLAGS) }
    fn boss()   -> Unit { unit("Creature-0-1-2-BOSS", "Gnarlroot", NPC_FLAGS) }

    #[test]
    fn five_man_is_ignored() {
        let events = vec![start(0, 5), combatant(1, "Player-1-AAA"), end(100)];
        assert!(ingest(&events).is_empty());
    }

    #[test]
    fn six_man_with_immediate_end_is_one_encounter() {
        let events = vec![start(0, 6), combatant(1, "Player-1-AAA"), end(2)];
        let encounters = ingest(&events);
        assert_eq!(encounters.len(), 1);
        let p = &encounters[0].players[0];
        assert!(p.dealt_no_damage());
        assert!(p.died.is_empty());
        assert_eq!(encounters[0].duration_ms(), 2);
        assert_eq!(encounters[0].end_byte, 20);
    }

    #[test]
    fn stream_ending_mid_encounter_discards_it() {
        let events = vec![start(0, 20), combatant(1, "Player-1-AAA")];
        assert!(ingest(&events).is_empty());
    }

    #[test]
    fn end_without_start_is_noop() {
        let events = vec![end(5), raw(6, LogEvent::ZoneChange { instance_id: 1, zone_name: String::new(), difficulty_id: 0 })];
        assert!(ingest(&events).is_empty());
    }

    #[test]
    fn zone_change_closes_encounter() {
        let events = vec![
            start(1000, 20),
            combatant(1000, "Player-1-AAA"),
            raw(4000, LogEvent::ZoneChange { instance_id: 2549, zone_name: "Amirdrassil".to_owned(), difficulty_id: 16 }),
        ];
        let encounters = ingest(&events);
        assert_eq!(encounters.len(), 1);
        assert!(encounters[0].end.is_none());
        assert_eq!(encounters[0].duration_ms(), 3000);
    }

    #[test]
    fn restart_discards_unfinished_attempt() {
        let events = vec![
            start(0, 20),
            combatant(1, "Player-1-AAA"),
            start(500, 20),
            end(900),
        ];
        let encounters = ingest(&events);
        assert_eq!(encounters.len(), 1);
        assert_eq!(encounters[0].start_time, 500);
        assert!(encounters[0].players.is_empty());
    }

    #[test]
    fn version_marker_sets_build_and_closes() {
        let v = |ts, s: &str| raw(ts, LogEvent::CombatLogVersion { build: s.parse().unwrap() });
        let events = vec![v(0, "10.2.5"), start(10, 20), v(50, "10.2.6"), start(60, 20), end(70)];
        let encounters = ingest(&events);
        assert_eq!(encounters.len(), 2);
        assert_eq!(encounters[0].build.map(|b| b.to_string()).as_deref(), Some("10.2.5"));
        assert_eq!(encounters[1].build.map(|b| b.to_string()).as_deref(), Some("10.2.6"));
    }

    #[test]
    fn attributes_outgoing_damage_relative_to_start() {
        let events = vec![
            start(1000, 20),
            combatant(1000, "Player-1-AAA"),
            spell_hit(1500, player(), boss(), 1234),
            swing_hit(1600, player(), boss(), 50),
            end(3000),
        ];
        let encounters = ingest(&events);
        let p = &encounters[0].players[0];
        assert_eq!(p.spell_impact.len(), 1);
        assert_eq!(p.spell_impact[0].when, 500);
        assert_eq!(p.spell_impact[0].what.damage_done, 1234);
        assert_eq!(p.swing.len(), 1);
        assert!(p.swing[0].what.crit);
        match p.spell_impact[0].what.target {
            UnitRef::Target(id) => assert_eq!(encounters[0].targets[id.0].name, "Gnarlroot"),
            other => panic!("Wrong variant: {:?}", other),
        }
    }

    #[test]
    fn friendly_fire_and_npc_damage_are_dropped() {
        let ally = unit("Player-1-BBB", "Ally", PLAYER_FLAGS);
        let events = vec![
            start(0, 20),
            combatant(0, "Player-1-AAA"),
            spell_hit(10, player(), ally, 100),
            spell_hit(20, boss(), player(), 100),
            end(100),
        ];
        let encounters = ingest(&events);
        assert!(encounters[0].players[0].dealt_no_damage());
    }

    #[test]
    fn pet_damage_is_folded_after_late_ownership() {
        let wolf = unit("Pet-0-1-2-WOLF", "Wolf", PET_FLAGS);
        let events = vec![
            start(0, 20),
            combatant(0, "Player-1-AAA"),
            // pet hits before anyone knows who owns it
            swing_hit(10, wolf.clone(), boss(), 300),
            spell_hit(20, wolf.clone(), boss(), 400),
            raw(30, LogEvent::SpellCastSuccess {
                header:   header(wolf.clone(), boss()),
                advanced: Some(AdvancedInfo { unit_guid: wolf.guid.clone(), owner_guid: "Player-1-AAA".to_owned() }),
                spell_id: 17253,
            }),
            end(100),
        ];
        let encounters = ingest(&events);
        let p = &encounters[0].players[0];
        assert_eq!(p.pet_swing.len(), 1);
        assert_eq!(p.pet_swing[0].what.pet_name, "Wolf");
        assert_eq!(p.pet_swing[0].what.swing.damage_done, 300);
        assert_eq!(p.spell_impact.len(), 1);
        assert_eq!(p.spell_impact[0].what.damage_done, 400);
    }

    #[test]
    fn summon_establishes_ownership() {
        let totem = unit("Creature-0-1-2-TOTEM", "", PET_FLAGS);
        let events = vec![
            start(0, 20),
            combatant(0, "Player-1-AAA"),
            raw(5, LogEvent::SpellSummon { header: header(player(), totem.clone()), spell_id: 192222 }),
            spell_hit(10, totem, boss(), 77),
            end(100),
        ];
        let encounters = ingest(&events);
        let p = &encounters[0].players[0];
        assert_eq!(p.spell_impact.len(), 1);
        assert_eq!(p.spell_impact[0].what.damage_done, 77);
    }

    #[test]
    fn unowned_pet_damage_is_dropped() {
        let stray = unit("Pet-0-1-2-STRAY", "Stray", PET_FLAGS);
        let events = vec![
            start(0, 20),
            combatant(0, "Player-1-AAA"),
            swing_hit(10, stray, boss(), 300),
            end(100),
        ];
        let encounters = ingest(&events);
        assert!(encounters[0].players[0].dealt_no_damage());
    }

    #[test]
    fn support_damage_is_negated() {
        let events = vec![
            start(0, 20),
            combatant(0, "Player-1-AAA"),
            spell_hit(10, player(), boss(), 1000),
            raw(10, LogEvent::SpellDamageSupport {
                header:         header(player(), boss()),
                advanced:       None,
                spell_id:       361469,
                damage:         DamageInfo { amount: 90, crit: false },
                supporter_guid: "Player-1-AUG".to_owned(),
            }),
            end(100),
        ];
        let encounters = ingest(&events);
        let total: i64 = encounters[0].players[0].spell_impact.iter().map(|e| e.what.damage_done).sum();
        assert_eq!(total, 910);
    }

    #[test]
    fn unknown_names_are_numbered_in_first_seen_order() {
        let nameless_a = unit("Creature-0-1-2-A", "", NPC_FLAGS);
        let nameless_b = unit("Creature-0-1-2-B", "Unknown", NPC_FLAGS);
        let events = vec![
            start(0, 20),
            combatant(0, "Player-1-AAA"),
            spell_hit(10, player(), nameless_a, 1),
            spell_hit(20, player(), nameless_b, 1),
            end(100),
        ];
        let encounters = ingest(&events);
        let e = &encounters[0];
        assert_eq!(e.targets[0].name, "Unknown1");
        assert_eq!(e.targets[1].name, "Unknown2");
        assert_eq!(e.players[0].name, "Stonebraid");
    }

    #[test]
    fn aura_stacks_and_casters() {
        let aug = unit("Player-1-AUG", "Scale", PLAYER_FLAGS);
        let events = vec![
            start(0, 20),
            combatant(0, "Player-1-AAA"),
            combatant(0, "Player-1-AUG"),
            raw(10, LogEvent::SpellAuraApplied     { header: header(aug.clone(), player()), spell_id: 410089 }),
            raw(20, LogEvent::SpellAuraAppliedDose { header: header(aug.clone(), player()), spell_id: 410089, stacks: 3 }),
            raw(30, LogEvent::SpellAuraRemovedDose { header: header(aug.clone(), player()), spell_id: 410089, stacks: 2 }),
            raw(40, LogEvent::SpellAuraRemoved     { header: header(aug.clone(), player()), spell_id: 410089 }),
            raw(50, LogEvent::SpellAuraApplied     { header: header(boss(), boss()), spell_id: 1 }),
            // unknown player destination is dropped
            raw(60, LogEvent::SpellAuraApplied     { header: header(aug, unit("Player-9-ZZZ", "Nobody", PLAYER_FLAGS)), spell_id: 2 }),
            end(100),
        ];
        let encounters = ingest(&events);
        let e = &encounters[0];
        let stacks: Vec<u8> = e.players[0].aura_changed.iter().map(|a| a.what.stacks).collect();
        assert_eq!(stacks, vec![1, 3, 2, 0]);
        assert_eq!(e.players[0].aura_changed[0].what.caster, UnitRef::Player(PlayerId(1)));
        let boss_target = e.targets.iter().find(|t| t.name == "Gnarlroot").expect("boss target");
        assert_eq!(boss_target.aura_changed.len(), 1);
        assert!(matches!(boss_target.aura_changed[0].what.caster, UnitRef::Target(_)));
        assert!(e.players.iter().all(|p| p.aura_changed.iter().all(|a| a.what.spell_id != 2)));
    }

    #[test]
    fn deaths_and_rezzes_only_for_known_players() {
        let died = |ts, u: Unit| raw(ts, LogEvent::UnitDied { header: header(unit("", "", 0), u) });
        let events = vec![
            start(0, 20),
            combatant(0, "Player-1-AAA"),
            died(100, player()),
            died(150, boss()),
            died(160, unit("Player-9-ZZZ", "Nobody", PLAYER_FLAGS)),
            raw(200, LogEvent::SpellResurrect { header: header(unit("Player-1-BBB", "Healer", PLAYER_FLAGS), player()), spell_id: 20484 }),
            end(300),
        ];
        let encounters = ingest(&events);
        let p = &encounters[0].players[0];
        assert_eq!(p.died.iter().map(|d| d.when).collect::<Vec<_>>(), vec![100]);
        assert_eq!(p.rezzed.iter().map(|d| d.when).collect::<Vec<_>>(), vec![200]);
    }

    #[test]
    fn folded_lists_are_sorted() {
        let wolf = unit("Pet-0-1-2-WOLF", "Wolf", PET_FLAGS);
        let events = vec![
            start(0, 20),
            combatant(0, "Player-1-AAA"),
            spell_hit(50, wolf.clone(), boss(), 1),
            spell_hit(10, player(), boss(), 2),
            spell_hit(30, player(), boss(), 3),
            raw(60, LogEvent::SpellSummon { header: header(player(), wolf), spell_id: 1 }),
            end(100),
        ];
        let encounters = ingest(&events);
        let whens: Vec<i64> = encounters[0].players[0].spell_impact.iter().map(|e| e.when).collect();
        assert_eq!(whens, vec![10, 30, 50]);
    }
}
