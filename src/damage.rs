/// Counterfactual damage formulas.
///
/// A logged hit is first *normalized*: every known scaling factor (primary
/// stat, versatility, crit) is divided back out, leaving a `Damage` that can
/// be re-evaluated against any stat sheet. `Damage::calc` then evaluates it
/// with and without each support buff to get the buff's multiplier.
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign};

use crate::error::{LedgerError, LedgerResult};
use crate::game_data::SpellFlags;
use crate::stats::{CombatStat, CombatStats};

pub const EBON_MIGHT_PRIMARY_SHARE:   f64 = 0.065;
pub const SHIFTING_SANDS_MASTERY_MULT: f64 = 0.0034;
pub const PRESCIENCE_CRIT:            f64 = 0.03;
/// Extra damage on Prescience targets from the Fate Mirror talent.
pub const FATE_MIRROR_MULT:           f64 = 1.015;

// ---------------------------------------------------------------------------
// Amps
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DamageAmp {
    pub crit_amp:        f64,
    pub crit_chance_add: f64,
}

impl Default for DamageAmp {
    fn default() -> Self {
        Self { crit_amp: 1.0, crit_chance_add: 0.0 }
    }
}

impl DamageAmp {
    /// Crit chance adds are summed, crit amps multiplied.
    pub fn combine(amps: &[DamageAmp]) -> DamageAmp {
        amps.iter().fold(DamageAmp::default(), |acc, a| DamageAmp {
            crit_amp:        acc.crit_amp * a.crit_amp,
            crit_chance_add: acc.crit_chance_add + a.crit_chance_add,
        })
    }
}

// ---------------------------------------------------------------------------
// Calculated damage
// ---------------------------------------------------------------------------

/// Damage with no support buffs, plus the factor each buff alone would add.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalcedDamage {
    pub base:                     f64,
    pub with_ebon_mult:           f64,
    pub with_prescience_mult:     f64,
    pub with_shifting_sands_mult: f64,
}

impl Default for CalcedDamage {
    fn default() -> Self {
        Self {
            base:                     0.0,
            with_ebon_mult:           1.0,
            with_prescience_mult:     1.0,
            with_shifting_sands_mult: 1.0,
        }
    }
}

impl CalcedDamage {
    /// Sum of bases; multipliers are base-weighted means.
    pub fn combine(dmgs: &[CalcedDamage]) -> CalcedDamage {
        let base: f64 = dmgs.iter().map(|d| d.base).sum();
        if base == 0.0 {
            let first = dmgs.first().copied().unwrap_or_default();
            return CalcedDamage { base, ..first };
        }
        let weighted = |f: fn(&CalcedDamage) -> f64| dmgs.iter().map(|d| d.base * f(d)).sum::<f64>() / base;
        CalcedDamage {
            base,
            with_ebon_mult:           weighted(|d| d.with_ebon_mult),
            with_prescience_mult:     weighted(|d| d.with_prescience_mult),
            with_shifting_sands_mult: weighted(|d| d.with_shifting_sands_mult),
        }
    }
}

impl AddAssign for CalcedDamage {
    fn add_assign(&mut self, o: CalcedDamage) {
        *self = CalcedDamage::combine(&[*self, o]);
    }
}

impl Add for CalcedDamage {
    type Output = CalcedDamage;
    fn add(mut self, o: CalcedDamage) -> CalcedDamage {
        self += o;
        self
    }
}

impl MulAssign<f64> for CalcedDamage {
    fn mul_assign(&mut self, v: f64) {
        self.base *= v;
    }
}

impl Mul<f64> for CalcedDamage {
    type Output = CalcedDamage;
    fn mul(mut self, v: f64) -> CalcedDamage {
        self *= v;
        self
    }
}

impl DivAssign<f64> for CalcedDamage {
    fn div_assign(&mut self, v: f64) {
        self.base /= v;
    }
}

impl Div<f64> for CalcedDamage {
    type Output = CalcedDamage;
    fn div(mut self, v: f64) -> CalcedDamage {
        self /= v;
        self
    }
}

// ---------------------------------------------------------------------------
// Normalized damage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Damage {
    pub base_scaling:              f64,
    pub scales_with_primary:       bool,
    pub can_not_crit:              bool,
    pub allow_class_ability_procs: bool,
    pub amp:                       DamageAmp,
}

impl Default for Damage {
    fn default() -> Self {
        Self {
            base_scaling:              1.0,
            scales_with_primary:       false,
            can_not_crit:              false,
            allow_class_ability_procs: false,
            amp:                       DamageAmp::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Toggles {
    ebon_might:     bool,
    shifting_sands: bool,
    prescience:     bool,
    fate_mirror:    bool,
}

impl Damage {
    /// Evaluate against `attacker` with each of `aug`'s buffs toggled alone.
    pub fn calc(&self, attacker: &CombatStats, aug: &CombatStats, fate_mirror: bool) -> CalcedDamage {
        let base = self.evaluate(attacker, aug, Toggles::default());
        let mult = |toggles: Toggles| {
            if base == 0.0 {
                1.0
            } else {
                self.evaluate(attacker, aug, toggles) / base
            }
        };
        CalcedDamage {
            base,
            with_ebon_mult:           mult(Toggles { ebon_might: true, ..Toggles::default() }),
            with_shifting_sands_mult: mult(Toggles { shifting_sands: true, ..Toggles::default() }),
            with_prescience_mult:     mult(Toggles { prescience: true, fate_mirror, ..Toggles::default() }),
        }
    }

    fn evaluate(&self, attacker: &CombatStats, aug: &CombatStats, t: Toggles) -> f64 {
        let mut vers    = 1.0 + attacker.vers();
        let mut primary = attacker[CombatStat::Primary];
        let mut crit    = attacker.crit() + self.amp.crit_chance_add;
        let mut extra   = 1.0;

        if t.ebon_might {
            primary += aug[CombatStat::Primary] * aug[CombatStat::PrimaryScaling] * EBON_MIGHT_PRIMARY_SHARE;
        }
        if t.shifting_sands {
            vers += SHIFTING_SANDS_MASTERY_MULT * aug.mastery();
        }
        if t.prescience {
            crit += PRESCIENCE_CRIT;
            if t.fate_mirror {
                extra *= FATE_MIRROR_MULT;
            }
        }

        let crit = crit.min(1.0);
        let crit_scaling = (1.0 - crit) + 2.0 * self.amp.crit_amp * crit;
        let primary = if self.scales_with_primary { primary } else { 1.0 };

        self.base_scaling * vers * primary * crit_scaling * extra
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Which support buffs one aug currently has on a player.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuffFlags {
    pub ebon_might:     bool,
    pub prescience:     bool,
    pub shifting_sands: bool,
}

/// A buff set together with the stats of the aug that cast it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveBuff {
    pub flags:     BuffFlags,
    pub aug_stats: CombatStats,
}

/// Everything about the damage dealer that normalization needs.
#[derive(Debug, Clone, Copy)]
pub struct Attacker<'a> {
    pub stats:       &'a CombatStats,
    pub damage_done: DamageAmp,
    pub buffs:       &'a [ActiveBuff],
}

impl Attacker<'_> {
    /// The attacker's stats with every active support buff folded in.
    pub fn stats_with_buffs(&self) -> CombatStats {
        let mut with_aug = *self.stats;
        for buff in self.buffs {
            if buff.flags.prescience {
                with_aug[CombatStat::CritVal] += PRESCIENCE_CRIT;
            }
            if buff.flags.ebon_might {
                with_aug[CombatStat::Primary] += EBON_MIGHT_PRIMARY_SHARE
                    * buff.aug_stats[CombatStat::Primary]
                    * buff.aug_stats[CombatStat::PrimaryScaling];
            }
            if buff.flags.shifting_sands {
                with_aug[CombatStat::VersVal] += buff.aug_stats.mastery() * SHIFTING_SANDS_MASTERY_MULT;
            }
        }
        with_aug
    }
}

/// Flags used for melee and pet melee.
pub const SWING_FLAGS: SpellFlags = SpellFlags {
    scales_with_primary:       true,
    can_not_crit:              false,
    allow_class_ability_procs: false,
};

/// Strip the attacker's scaling out of one logged hit.
pub fn normalize(
    crit:         bool,
    attacker:     &Attacker<'_>,
    damage_taken: DamageAmp,
    historical:   i64,
    extra_amp:    DamageAmp,
    flags:        SpellFlags,
) -> LedgerResult<Damage> {
    if flags.can_not_crit && crit {
        return Err(LedgerError::InvariantViolation(
            "crit on a damage event that cannot crit".to_owned(),
        ));
    }

    let with_aug = attacker.stats_with_buffs();
    let amp = DamageAmp::combine(&[extra_amp, attacker.damage_done, damage_taken]);

    let mut base_scaling = historical as f64;
    if flags.scales_with_primary {
        base_scaling /= with_aug[CombatStat::Primary];
    }
    base_scaling /= 1.0 + with_aug.vers();

    let amp = if flags.can_not_crit {
        DamageAmp::default()
    } else {
        if crit {
            base_scaling /= 2.0 * amp.crit_amp;
        }
        amp
    };

    Ok(Damage {
        base_scaling,
        scales_with_primary:       flags.scales_with_primary,
        can_not_crit:              flags.can_not_crit,
        allow_class_ability_procs: flags.allow_class_ability_procs,
        amp,
    })
}
