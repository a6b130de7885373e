/// Combat stats, rating conversion and stacking-aura arithmetic.
///
/// Only the stats that move the support-buff formulas are tracked; haste is not
/// modelled.
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Div, DivAssign, Index, IndexMut, Mul, MulAssign};

/// Rating per point of crit chance and mastery at max level.
pub const RATING_PER_CRIT:    f64 = 179.995151;
pub const RATING_PER_MASTERY: f64 = 179.995151;
/// Rating per point of damage versatility at max level.
pub const RATING_PER_VERS:    f64 = 204.9944775;

/// Primary stat every character starts from before gear.
pub const BASE_PRIMARY: f64 = 2089.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatStat {
    MasteryRating,
    MasteryVal,
    CritRating,
    CritVal,
    VersRating,
    VersVal,
    Primary,
    PrimaryScaling,
}

impl CombatStat {
    pub const COUNT: usize = 8;

    /// Every stat in storage (and wire) order.
    pub const ALL: [CombatStat; Self::COUNT] = [
        CombatStat::MasteryRating,
        CombatStat::MasteryVal,
        CombatStat::CritRating,
        CombatStat::CritVal,
        CombatStat::VersRating,
        CombatStat::VersVal,
        CombatStat::Primary,
        CombatStat::PrimaryScaling,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Dense stat vector indexed by `CombatStat`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CombatStats(pub [f64; CombatStat::COUNT]);

impl CombatStats {
    pub const ZERO: CombatStats = CombatStats([0.0; CombatStat::COUNT]);

    pub fn iter(&self) -> impl Iterator<Item = (CombatStat, f64)> + '_ {
        CombatStat::ALL.iter().map(move |s| (*s, self[*s]))
    }

    pub fn mastery(&self) -> f64 {
        self[CombatStat::MasteryVal] + scale_rating(self[CombatStat::MasteryRating] / RATING_PER_MASTERY)
    }

    /// Crit chance as a fraction (0.25 == 25%).
    pub fn crit(&self) -> f64 {
        self[CombatStat::CritVal] + scale_rating(self[CombatStat::CritRating] / RATING_PER_CRIT) / 100.0
    }

    /// Damage versatility as a fraction.
    pub fn vers(&self) -> f64 {
        self[CombatStat::VersVal] + scale_rating(self[CombatStat::VersRating] / RATING_PER_VERS) / 100.0
    }
}

impl Index<CombatStat> for CombatStats {
    type Output = f64;
    fn index(&self, stat: CombatStat) -> &f64 {
        &self.0[stat.index()]
    }
}

impl IndexMut<CombatStat> for CombatStats {
    fn index_mut(&mut self, stat: CombatStat) -> &mut f64 {
        &mut self.0[stat.index()]
    }
}

impl AddAssign for CombatStats {
    fn add_assign(&mut self, o: CombatStats) {
        for (a, b) in self.0.iter_mut().zip(o.0) {
            *a += b;
        }
    }
}

impl Add for CombatStats {
    type Output = CombatStats;
    fn add(mut self, o: CombatStats) -> CombatStats {
        self += o;
        self
    }
}

impl MulAssign<f64> for CombatStats {
    fn mul_assign(&mut self, v: f64) {
        self.0.iter_mut().for_each(|a| *a *= v);
    }
}

impl Mul<f64> for CombatStats {
    type Output = CombatStats;
    fn mul(mut self, v: f64) -> CombatStats {
        self *= v;
        self
    }
}

impl DivAssign<f64> for CombatStats {
    fn div_assign(&mut self, v: f64) {
        self.0.iter_mut().for_each(|a| *a /= v);
    }
}

impl Div<f64> for CombatStats {
    type Output = CombatStats;
    fn div(mut self, v: f64) -> CombatStats {
        self /= v;
        self
    }
}

// ---------------------------------------------------------------------------
// Rating diminishing returns
// ---------------------------------------------------------------------------

struct Segment {
    min:   f64,
    max:   f64,
    base:  f64,
    slope: f64,
}

impl Segment {
    const fn new(min: f64, max: f64, base: f64, slope: f64) -> Self {
        Self { min, max, base, slope }
    }

    fn apply(&self, v: f64) -> f64 {
        self.base + (v - self.min) * self.slope
    }
}

const SEGMENTS: [Segment; 7] = [
    Segment::new(0.0,   30.0,  0.0,  1.0),
    Segment::new(30.0,  40.0,  30.0, 0.9),
    Segment::new(40.0,  50.0,  39.0, 0.8),
    Segment::new(50.0,  60.0,  47.0, 0.7),
    Segment::new(60.0,  80.0,  54.0, 0.6),
    Segment::new(80.0,  100.0, 66.0, 0.5),
    Segment::new(100.0, 200.0, 76.0, 0.4),
];

/// Piecewise-linear diminishing returns on a raw rating percentage.
/// Negative input reads as 0; anything past the last segment is capped.
pub fn scale_rating(v: f64) -> f64 {
    let v = v.max(0.0);
    SEGMENTS
        .iter()
        .find(|s| s.min <= v && v <= s.max)
        .map(|s| s.apply(v))
        .unwrap_or_else(|| {
            let last = &SEGMENTS[SEGMENTS.len() - 1];
            last.apply(last.max)
        })
}

// ---------------------------------------------------------------------------
// Aura arithmetic
// ---------------------------------------------------------------------------

/// Additive change when an aura worth `per_stack` goes from `old` to `new` stacks.
pub fn aura_adder(per_stack: f64, new: u8, old: u8) -> f64 {
    per_stack * (i32::from(new) - i32::from(old)) as f64
}

/// Factor to multiply into a stat already carrying `old` stacks of a
/// `(1 + stacks * per_stack)` multiplier so it carries `new` stacks instead.
pub fn aura_multiplier(per_stack: f64, new: u8, old: u8) -> f64 {
    1.0 + (i32::from(new) - i32::from(old)) as f64 * per_stack / (1.0 + f64::from(old) * per_stack)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn scale_rating_segments() {
        assert!(close(scale_rating(0.0), 0.0));
        assert!(close(scale_rating(30.0), 30.0));
        assert!(close(scale_rating(35.0), 34.5));
        assert!(close(scale_rating(90.0), 71.0));
        assert!(close(scale_rating(200.0), 116.0));
        assert!(close(scale_rating(500.0), 116.0));
        assert!(close(scale_rating(-3.0), 0.0));
    }

    #[test]
    fn adder_stacking_is_path_independent() {
        let direct  = aura_adder(0.03, 3, 0);
        let stepped = aura_adder(0.03, 1, 0) + aura_adder(0.03, 3, 1);
        assert!(close(direct, stepped));
        assert!(close(aura_adder(0.03, 0, 3), -direct));
    }

    #[test]
    fn multiplier_stacking_is_path_independent() {
        let direct  = aura_multiplier(0.05, 3, 0);
        let stepped = aura_multiplier(0.05, 1, 0) * aura_multiplier(0.05, 3, 1);
        assert!(close(direct, stepped));
        assert!(close(direct, 1.15));
        assert!(close(direct * aura_multiplier(0.05, 0, 3), 1.0));
    }

    #[test]
    fn rating_helpers() {
        let mut s = CombatStats::ZERO;
        s[CombatStat::CritVal]    = 0.05;
        s[CombatStat::CritRating] = RATING_PER_CRIT * 10.0;
        assert!(close(s.crit(), 0.15));

        s[CombatStat::VersRating] = RATING_PER_VERS * 40.0;
        assert!(close(s.vers(), 0.39));

        s[CombatStat::MasteryVal] = 8.0;
        assert!(close(s.mastery(), 8.0));
    }

    #[test]
    fn arithmetic() {
        let mut a = CombatStats::ZERO;
        a[CombatStat::Primary] = 10.0;
        let b = (a + a) * 3.0 / 2.0;
        assert!(close(b[CombatStat::Primary], 30.0));
        assert_eq!(b[CombatStat::VersVal], 0.0);
        assert_eq!(CombatStats::default(), CombatStats::ZERO);
    }
}
