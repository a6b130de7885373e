/// Simulated character state during an on-rails replay.
///
/// `TargetState` is the part every unit has (an aura table and a damage-taken
/// amp). `PlayerState` adds a stat sheet driven by gear and auras, the support
/// buffs each aug currently has on the player, and a spec behavior chosen from
/// the registry in `specs`.
use std::collections::HashMap;

use crate::{
    damage::{normalize, ActiveBuff, Attacker, BuffFlags, Damage, DamageAmp, SWING_FLAGS},
    error::{LedgerError, LedgerResult},
    event::PlayerId,
    game_data::{GameData, PrimaryAttribute},
    log_event::{CombatantInfo, Item, Talent},
    specs::{self, SpecBehavior},
    stats::{aura_adder, aura_multiplier, CombatStat, CombatStats, BASE_PRIMARY},
};

/// Aura spell ids with a shared (non-spec) effect.
pub mod aura {
    pub const MARK_OF_THE_WILD:      u64 = 1126;
    pub const ARCANE_INTELLECT:      u64 = 1459;
    pub const BATTLE_SHOUT:          u64 = 6673;
    pub const KINDLED_SOUL:          u64 = 268998;
    pub const RALLIED_TO_VICTORY:    u64 = 378139;
    pub const SOPHIC_DEVOTION:       u64 = 390224;
    pub const DRACONIC_AUGMENTATION: u64 = 393438;
    pub const EBON_MIGHT:            u64 = 395152;
    pub const WELL_FED:              u64 = 396092;
    pub const PRESCIENCE:            u64 = 410089;
    pub const SHIFTING_SANDS:        u64 = 413984;
}

mod item {
    pub const BALEFIRE_BRANCH: u64 = 159630;
    /// Rallied to Victory sources, in lookup order.
    pub const ALLIED_SET: [u64; 4] = [190519, 193464, 193453, 193530];
}

const RALLIED_TO_VICTORY_COEFF: f64 = 0.74680960178;
const KINDLED_SOUL_COEFF:       f64 = 0.03685048223;
const RAID_BUFF_PRIMARY_SCALING: f64 = 0.05;

/// Sophic Devotion enchant ranks and their primary stat proc.
const SOPHIC_DEVOTION_RANKS: [(u32, f64); 3] = [(6641, 783.0), (6642, 857.0), (6643, 932.0)];

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetState {
    /// spell id -> stacks. Zero is never stored.
    pub auras:        HashMap<u64, u8>,
    pub damage_taken: DamageAmp,
}

impl TargetState {
    pub fn stacks_of(&self, spell_id: u64) -> u8 {
        self.auras.get(&spell_id).copied().unwrap_or(0)
    }

    /// Record a stack change. Returns `(new, old)` if anything changed.
    pub fn aura_changed(&mut self, spell_id: u64, stacks: u8) -> Option<(u8, u8)> {
        let old = self.stacks_of(spell_id);
        if old == stacks {
            return None;
        }
        if stacks == 0 {
            self.auras.remove(&spell_id);
        } else {
            self.auras.insert(spell_id, stacks);
        }
        Some((stacks, old))
    }
}

// ---------------------------------------------------------------------------
// Players
// ---------------------------------------------------------------------------

/// Who applied an aura, as far as aura handlers care.
#[derive(Debug, Clone, Copy)]
pub enum AuraCaster<'a> {
    Target,
    Player { id: PlayerId, items: &'a [Item] },
}

/// The buffs one aug currently has on this player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AugBuff {
    pub aug:   PlayerId,
    pub flags: BuffFlags,
}

/// Read-only inputs for one damage hook.
pub struct HitContext<'a> {
    pub game_data: &'a GameData,
    pub target:    &'a TargetState,
    /// Active buffs already resolved against their aug's current stats.
    pub buffs:     &'a [ActiveBuff],
}

#[derive(Debug)]
pub struct PlayerState {
    pub id:          PlayerId,
    pub spec_id:     u32,
    pub primary:     PrimaryAttribute,
    pub stats:       CombatStats,
    pub unit:        TargetState,
    pub aug_buffs:   Vec<AugBuff>,
    pub items:       Vec<Item>,
    pub talents:     Vec<Talent>,
    pub damage_done: DamageAmp,
    behavior:        Box<dyn SpecBehavior>,
}

impl PlayerState {
    /// Build the starting state from a loadout snapshot.
    pub fn create(id: PlayerId, info: &CombatantInfo, game_data: &GameData) -> LedgerResult<Self> {
        let entry = specs::lookup(info.spec_id).ok_or_else(|| LedgerError::unknown("spec", info.spec_id))?;

        let mut state = PlayerState {
            id,
            spec_id:     info.spec_id,
            primary:     entry.primary,
            stats:       CombatStats::ZERO,
            unit:        TargetState::default(),
            aug_buffs:   Vec::new(),
            items:       info.items.clone(),
            talents:     info.talents.clone(),
            damage_done: DamageAmp::default(),
            behavior:    (entry.create)(),
        };
        state.stats[CombatStat::Primary]        = BASE_PRIMARY;
        state.stats[CombatStat::PrimaryScaling] = 1.0;

        for equipped in info.items.iter().filter(|i| i.item_id != 0) {
            state.stats += game_data.item_stats(state.primary, equipped.item_id, equipped.ilvl)?;
        }

        let own_items = state.items.clone();
        for aura in &info.interesting_auras {
            let me = AuraCaster::Player { id, items: &own_items };
            state.aura_changed(me, aura.spell_id, 1, game_data);
        }

        state.behavior.apply_bonuses(&mut state.stats, &info.talents);
        Ok(state)
    }

    pub fn spec_name(&self) -> &'static str {
        self.behavior.name()
    }

    pub fn stacks_of(&self, spell_id: u64) -> u8 {
        self.unit.stacks_of(spell_id)
    }

    pub fn aura_changed(&mut self, caster: AuraCaster<'_>, spell_id: u64, stacks: u8, game_data: &GameData) {
        let Some((new, old)) = self.unit.aura_changed(spell_id, stacks) else {
            return;
        };
        if self.behavior.handle_aura(&mut self.stats, caster, spell_id, new, old) {
            return;
        }
        if let Err(e) = self.handle_aura(caster, spell_id, new, old, game_data) {
            tracing::warn!("Aura {} on player {:?} skipped: {}", spell_id, self.id, e);
        }
    }

    fn handle_aura(
        &mut self,
        caster:    AuraCaster<'_>,
        spell_id:  u64,
        new:       u8,
        old:       u8,
        game_data: &GameData,
    ) -> LedgerResult<()> {
        match spell_id {
            aura::MARK_OF_THE_WILD => {
                self.stats[CombatStat::VersVal] += aura_adder(0.03, new, old);
            }
            aura::SOPHIC_DEVOTION => {
                self.stats[CombatStat::Primary] += aura_adder(self.sophic_devotion()?, new, old);
            }
            aura::KINDLED_SOUL => {
                if self.primary != PrimaryAttribute::Intellect {
                    return Ok(());
                }
                let ilvl = ilvl_of(&self.items, item::BALEFIRE_BRANCH)
                    .ok_or_else(|| LedgerError::unknown("item", item::BALEFIRE_BRANCH))?;
                let per_stack = KINDLED_SOUL_COEFF * game_data.rand_prop(ilvl)?.budget[0];
                self.stats[CombatStat::Primary] += aura_adder(per_stack, new, old);
            }
            aura::RALLIED_TO_VICTORY => {
                let AuraCaster::Player { items, .. } = caster else {
                    return Ok(());
                };
                let ilvl = item::ALLIED_SET
                    .iter()
                    .find_map(|id| ilvl_of(items, *id))
                    .ok_or_else(|| LedgerError::unknown("item", item::ALLIED_SET[0]))?;
                let per_stack = RALLIED_TO_VICTORY_COEFF * game_data.rand_prop(ilvl)?.damage_replace_stat;
                self.stats[CombatStat::VersRating] += aura_adder(per_stack, new, old);
            }
            aura::PRESCIENCE     => self.set_buff(caster, new, |f, on| f.prescience = on),
            aura::EBON_MIGHT     => self.set_buff(caster, new, |f, on| f.ebon_might = on),
            aura::SHIFTING_SANDS => self.set_buff(caster, new, |f, on| f.shifting_sands = on),
            aura::WELL_FED => {
                self.stats[CombatStat::Primary] += aura_adder(76.0, new, old);
            }
            aura::DRACONIC_AUGMENTATION => {
                self.stats[CombatStat::Primary] += aura_adder(87.0, new, old);
            }
            aura::ARCANE_INTELLECT => {
                if self.primary == PrimaryAttribute::Intellect {
                    self.stats[CombatStat::PrimaryScaling] *= aura_multiplier(RAID_BUFF_PRIMARY_SCALING, new, old);
                }
            }
            aura::BATTLE_SHOUT => {
                if matches!(self.primary, PrimaryAttribute::Strength | PrimaryAttribute::Agility) {
                    self.stats[CombatStat::PrimaryScaling] *= aura_multiplier(RAID_BUFF_PRIMARY_SCALING, new, old);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn set_buff(&mut self, caster: AuraCaster<'_>, new: u8, set: impl FnOnce(&mut BuffFlags, bool)) {
        let AuraCaster::Player { id: aug, .. } = caster else {
            return;
        };
        let idx = match self.aug_buffs.iter().position(|b| b.aug == aug) {
            Some(idx) => idx,
            None => {
                self.aug_buffs.push(AugBuff { aug, flags: BuffFlags::default() });
                self.aug_buffs.len() - 1
            }
        };
        set(&mut self.aug_buffs[idx].flags, new != 0);
    }

    fn sophic_devotion(&self) -> LedgerResult<f64> {
        let procs: Vec<f64> = self
            .items
            .iter()
            .filter_map(|i| i.permanent_enchant_id)
            .filter_map(|enchant| {
                SOPHIC_DEVOTION_RANKS.iter().find(|(id, _)| *id == enchant).map(|(_, v)| *v)
            })
            .collect();
        if procs.is_empty() {
            return Err(LedgerError::InvariantViolation(
                "Sophic Devotion without a Sophic Devotion enchant".to_owned(),
            ));
        }
        Ok(procs.iter().sum::<f64>() / procs.len() as f64)
    }

    /// Buffs with at least one flag set, paired with their aug's stats.
    /// Augs that `aug_stats` cannot resolve are left out.
    pub fn active_buffs(&self, aug_stats: impl Fn(PlayerId) -> Option<CombatStats>) -> Vec<ActiveBuff> {
        self.aug_buffs
            .iter()
            .filter(|b| b.flags != BuffFlags::default())
            .filter_map(|b| aug_stats(b.aug).map(|stats| ActiveBuff { flags: b.flags, aug_stats: stats }))
            .collect()
    }

    fn attacker<'a>(&'a self, buffs: &'a [ActiveBuff]) -> Attacker<'a> {
        Attacker { stats: &self.stats, damage_done: self.damage_done, buffs }
    }

    // -----------------------------------------------------------------------
    // Damage hooks
    // -----------------------------------------------------------------------

    pub fn swing(&self, ctx: &HitContext<'_>, crit: bool, historical: i64) -> LedgerResult<Damage> {
        normalize(crit, &self.attacker(ctx.buffs), ctx.target.damage_taken, historical, DamageAmp::default(), SWING_FLAGS)
    }

    pub fn pet_swing(&self, ctx: &HitContext<'_>, crit: bool, historical: i64) -> LedgerResult<Damage> {
        self.swing(ctx, crit, historical)
    }

    pub fn impact(&self, ctx: &HitContext<'_>, spell_id: u64, crit: bool, historical: i64) -> LedgerResult<Damage> {
        let flags = ctx.game_data.spell(spell_id)?;
        let amp = self.behavior.impact(spell_id);
        normalize(crit, &self.attacker(ctx.buffs), ctx.target.damage_taken, historical, amp, flags)
    }

    pub fn tick(&self, ctx: &HitContext<'_>, spell_id: u64, crit: bool, historical: i64) -> LedgerResult<Damage> {
        let flags = ctx.game_data.spell(spell_id)?;
        let amp = self.behavior.tick(spell_id);
        normalize(crit, &self.attacker(ctx.buffs), ctx.target.damage_taken, historical, amp, flags)
    }
}

fn ilvl_of(items: &[Item], item_id: u64) -> Option<u16> {
    items.iter().find(|i| i.item_id == item_id).map(|i| i.ilvl)
}
