/// Placeholder for every spec without its own model: flat base crit and
/// mastery, no talents, no spell-specific amps.
use super::SpecBehavior;
use crate::{
    log_event::Talent,
    stats::{CombatStat, CombatStats},
};

#[derive(Debug, Default)]
pub struct Placeholder;

pub fn create() -> Box<dyn SpecBehavior> {
    Box::new(Placeholder)
}

impl SpecBehavior for Placeholder {
    fn name(&self) -> &'static str {
        "Placeholder"
    }

    fn apply_bonuses(&mut self, stats: &mut CombatStats, _talents: &[Talent]) {
        stats[CombatStat::CritVal]    += 0.05;
        stats[CombatStat::MasteryVal] += 8.0;
    }
}
