/// Augmentation Evoker: the one spec modelled beyond placeholders.
///
/// The spec passive doubles the primary stat share Ebon Might hands out, which
/// shows up here as `primary_scaling` starting at 2.
use super::SpecBehavior;
use crate::{
    damage::DamageAmp,
    log_event::Talent,
    stats::{CombatStat, CombatStats},
};

pub mod spell {
    pub const LIVING_FLAME:           u64 = 361469;
    pub const ERUPTION:               u64 = 395160;
    pub const TREMBLING_EARTH_BUFF:   u64 = 424368;
    pub const TREMBLING_EARTH_DAMAGE: u64 = 424428;
    pub const UPHEAVAL:               u64 = 396288;
}

/// Trait node entry ids.
pub mod talent {
    pub const ENKINDLED:              u32 = 115603;
    pub const INSTINCTIVE_ARCANA:     u32 = 115619;
    pub const RICOCHETING_PYROCLAST:  u32 = 115507;
    pub const UNYIELDING_DOMAIN:      u32 = 115501;
    pub const TECTONIC_LOCUS:         u32 = 115500;
}

const UNYIELDING_DOMAIN_CRIT: f64 = 0.1;

#[derive(Debug, Default)]
pub struct Augmentation {
    upheaval: DamageAmp,
}

pub fn create() -> Box<dyn SpecBehavior> {
    Box::new(Augmentation::default())
}

impl Augmentation {
    fn apply_talent(&mut self, t: &Talent) {
        match t.trait_node_entry_id {
            talent::UNYIELDING_DOMAIN => self.upheaval.crit_chance_add += UNYIELDING_DOMAIN_CRIT,
            // recognized, no effect on the modelled spells
            talent::ENKINDLED
            | talent::INSTINCTIVE_ARCANA
            | talent::RICOCHETING_PYROCLAST
            | talent::TECTONIC_LOCUS => {}
            _ => tracing::trace!("Unmodelled aug talent {}", t.trait_node_entry_id),
        }
    }
}

impl SpecBehavior for Augmentation {
    fn name(&self) -> &'static str {
        "Augmentation"
    }

    fn apply_bonuses(&mut self, stats: &mut CombatStats, talents: &[Talent]) {
        stats[CombatStat::MasteryVal]     += 8.0;
        stats[CombatStat::CritVal]        += 0.05;
        stats[CombatStat::PrimaryScaling] += 1.0;

        for t in talents {
            self.apply_talent(t);
        }
    }

    fn impact(&self, spell_id: u64) -> DamageAmp {
        match spell_id {
            spell::UPHEAVAL => self.upheaval,
            _ => DamageAmp::default(),
        }
    }
}
