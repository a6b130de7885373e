/// Cross-attempt aggregation.
///
/// Many simulated attempts of the same encounter are folded into one
/// expected timeline: a weighted stat series for the aug, and a windowed,
/// alive-weighted damage series for each player the aug might buff.
///
/// Both outputs mark each point valid or not. A point is invalid when no
/// attempt contributed to it (everyone dead, or past the end). Invalid points
/// carry the series mean instead of zeros and are trimmed from the tail.
use serde::Serialize;

use crate::{
    damage::{CalcedDamage, Damage},
    event::{sort_by_time, Event, Marker},
    stats::CombatStats,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregated<T> {
    pub points: Vec<Event<T>>,
    pub valid:  Vec<bool>,
}

impl<T> Default for Aggregated<T> {
    fn default() -> Self {
        Self { points: Vec::new(), valid: Vec::new() }
    }
}

impl<T> Aggregated<T> {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Event<T>, bool)> {
        self.points.iter().zip(self.valid.iter().copied())
    }

    fn push(&mut self, when: i64, what: T, valid: bool) {
        self.points.push(Event::new(when, what));
        self.valid.push(valid);
    }

    fn trim_invalid_tail(&mut self) {
        while self.valid.last() == Some(&false) {
            self.valid.pop();
            self.points.pop();
        }
    }
}

impl<T: PartialEq> Aggregated<T> {
    fn same_as_last(&self, what: &T, valid: bool) -> bool {
        match (self.points.last(), self.valid.last()) {
            (Some(p), Some(v)) => p.what == *what && *v == valid,
            _ => false,
        }
    }
}

/// Parallel per-attempt inputs. Index `i` of every slice is attempt `i`.
#[derive(Debug, Clone, Copy)]
pub struct Attempts<'a> {
    pub durations: &'a [i64],
    pub stats:     &'a [Vec<Event<CombatStats>>],
    pub died:      &'a [Vec<Marker>],
    pub rezzed:    &'a [Vec<Marker>],
    pub weights:   &'a [f64],
}

impl Attempts<'_> {
    fn len(&self) -> usize {
        self.durations.len()
    }

    fn lengths_match(&self) -> bool {
        let n = self.len();
        self.stats.len() == n && self.died.len() == n && self.rezzed.len() == n && self.weights.len() == n
    }

    fn max_duration(&self) -> i64 {
        self.durations.iter().copied().max().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum StatStep {
    Stats(usize, CombatStats),
    Died(usize),
    Rezzed(usize),
}

/// Weighted mean stat sheet over time across attempts.
pub fn aggregate_stats(attempts: &Attempts<'_>) -> Aggregated<CombatStats> {
    let mut out = Aggregated::default();
    if !attempts.lengths_match() {
        return out;
    }
    let n = attempts.len();

    let mut steps = Vec::new();
    for i in 0..n {
        // the end of an attempt counts as a death
        steps.push(Event::new(attempts.durations[i], StatStep::Died(i)));
        steps.extend(attempts.stats[i].iter().map(|e| Event::new(e.when, StatStep::Stats(i, e.what))));
        steps.extend(attempts.died[i].iter().map(|e| Event::new(e.when, StatStep::Died(i))));
        steps.extend(attempts.rezzed[i].iter().map(|e| Event::new(e.when, StatStep::Rezzed(i))));
    }
    sort_by_time(&mut steps);

    let mut current = vec![CombatStats::ZERO; n];
    let mut alive   = vec![true; n];

    let mut idx = 0;
    while idx < steps.len() {
        let now = steps[idx].when;
        while idx < steps.len() && steps[idx].when == now {
            match steps[idx].what {
                StatStep::Stats(i, s) => current[i] = s,
                StatStep::Died(i)     => alive[i] = false,
                StatStep::Rezzed(i)   => alive[i] = true,
            }
            idx += 1;
        }

        let mut mean = CombatStats::ZERO;
        let mut total_weight = 0.0;
        for i in (0..n).filter(|i| alive[*i]) {
            mean += current[i] * attempts.weights[i];
            total_weight += attempts.weights[i];
        }
        let valid = total_weight != 0.0;
        if valid {
            mean /= total_weight;
        }

        if !out.same_as_last(&mean, valid) {
            out.push(now, mean, valid);
        }
    }

    if out.is_empty() {
        return out;
    }

    if out.valid.last() == Some(&true) {
        let last_when = out.points.last().map(|p| p.when).unwrap_or(0);
        out.push(attempts.max_duration().max(last_when), CombatStats::ZERO, false);
    }

    let mut avg = CombatStats::ZERO;
    let mut total_ms = 0i64;
    for i in 1..out.len() {
        if out.valid[i - 1] {
            let span = out.points[i].when - out.points[i - 1].when;
            avg += out.points[i - 1].what * span as f64;
            total_ms += span;
        }
    }
    if total_ms > 0 {
        avg /= total_ms as f64;
    }

    backfill(&mut out, avg);
    out
}

// ---------------------------------------------------------------------------
// Damage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum DamageStep {
    Damage(usize, Damage),
    Stats(usize, CombatStats),
    AugStats(CombatStats),
    Died(usize),
    Rezzed(usize),
}

/// Windowed damage the aug's buffs would affect, per window of `window_ms`.
///
/// Each window is the weighted mean over attempts, where an attempt that
/// is dead for part of a window only counts for the part it was alive.
pub fn aggregate_damage(
    aug_stats:   &[Event<CombatStats>],
    attempts:    &Attempts<'_>,
    damage:      &[Vec<Event<Damage>>],
    fate_mirror: bool,
    window_ms:   i64,
) -> Aggregated<CalcedDamage> {
    let mut out = Aggregated::default();
    let Some(first_aug) = aug_stats.first() else {
        return out;
    };
    if !attempts.lengths_match() || damage.len() != attempts.len() || window_ms <= 0 {
        return out;
    }
    let n = attempts.len();

    let mut current = Vec::with_capacity(n);
    for series in attempts.stats {
        let Some(first) = series.first() else {
            return out;
        };
        current.push(first.what);
    }

    let mut steps = Vec::new();
    for i in 0..n {
        steps.push(Event::new(attempts.durations[i], DamageStep::Died(i)));
        steps.extend(damage[i].iter().map(|e| Event::new(e.when, DamageStep::Damage(i, e.what))));
        steps.extend(attempts.stats[i].iter().map(|e| Event::new(e.when, DamageStep::Stats(i, e.what))));
        steps.extend(attempts.died[i].iter().map(|e| Event::new(e.when, DamageStep::Died(i))));
        steps.extend(attempts.rezzed[i].iter().map(|e| Event::new(e.when, DamageStep::Rezzed(i))));
    }
    steps.extend(aug_stats.iter().map(|e| Event::new(e.when, DamageStep::AugStats(e.what))));
    sort_by_time(&mut steps);

    let w = window_ms as f64;
    let mut aug = first_aug.what;
    let mut alive = vec![true; n];
    let mut alive_weight = vec![0.0; n];

    let mut until = window_ms;
    let mut idx = 0;
    while idx < steps.len() {
        for i in 0..n {
            alive_weight[i] = if alive[i] { 1.0 } else { 0.0 };
        }
        let mut window = CalcedDamage::default();

        while idx < steps.len() && steps[idx].when < until {
            let when = steps[idx].when;
            match steps[idx].what {
                DamageStep::Damage(i, d) => {
                    if alive[i] {
                        window += d.calc(&current[i], &aug, fate_mirror) * attempts.weights[i];
                    }
                }
                DamageStep::Stats(i, s) => current[i] = s,
                DamageStep::AugStats(s) => aug = s,
                DamageStep::Died(i) => {
                    // the end of the attempt is also a death, so guard against a double count
                    if alive[i] {
                        alive[i] = false;
                        alive_weight[i] -= (until - when) as f64 / w;
                    }
                }
                DamageStep::Rezzed(i) => {
                    alive[i] = true;
                    alive_weight[i] += (until - when) as f64 / w;
                }
            }
            idx += 1;
        }

        let total_weight: f64 = (0..n).map(|i| attempts.weights[i] * alive_weight[i]).sum();
        let valid = total_weight != 0.0;
        if valid {
            window /= total_weight;
        }

        if !out.same_as_last(&window, valid) {
            out.push(until - window_ms, window, valid);
        }
        until += window_ms;
    }

    if out.is_empty() {
        return out;
    }

    if out.valid.last() == Some(&true) {
        out.push(until, CalcedDamage::default(), false);
    }

    let mut avg = CalcedDamage::default();
    let mut total_windows = 0i64;
    for i in 1..out.len() {
        if out.valid[i - 1] {
            let windows = (out.points[i].when - out.points[i - 1].when) / window_ms;
            avg += out.points[i - 1].what * windows as f64;
            total_windows += windows;
        }
    }
    if total_windows > 0 {
        avg /= total_windows as f64;
    }

    backfill(&mut out, avg);
    out
}

fn backfill<T: Copy>(out: &mut Aggregated<T>, mean: T) {
    for (point, valid) in out.points.iter_mut().zip(out.valid.iter()) {
        if !*valid {
            point.what = mean;
        }
    }
    out.trim_invalid_tail();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{event::marker, stats::CombatStat};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn sheet(primary: f64) -> CombatStats {
        let mut s = CombatStats::ZERO;
        s[CombatStat::Primary]        = primary;
        s[CombatStat::PrimaryScaling] = 1.0;
        s
    }

    fn hit(when: i64) -> Event<Damage> {
        Event::new(when, Damage { base_scaling: 100.0, ..Damage::default() })
    }

    #[test]
    fn stats_identity_law() {
        let series = vec![Event::new(0, sheet(2000.0)), Event::new(5000, sheet(2100.0)), Event::new(7000, sheet(1900.0))];
        let stats = [series.clone()];
        let attempts = Attempts {
            durations: &[10_000],
            stats:     &stats,
            died:      &[vec![]],
            rezzed:    &[vec![]],
            weights:   &[1.0],
        };
        let agg = aggregate_stats(&attempts);
        assert_eq!(agg.points, series);
        assert!(agg.valid.iter().all(|v| *v));
    }

    #[test]
    fn stats_mismatched_lengths_are_empty() {
        let stats = [vec![Event::new(0, sheet(1.0))]];
        let attempts = Attempts {
            durations: &[10, 20],
            stats:     &stats,
            died:      &[vec![]],
            rezzed:    &[vec![]],
            weights:   &[1.0],
        };
        assert!(aggregate_stats(&attempts).is_empty());
    }

    #[test]
    fn stats_weighted_mean() {
        let stats = [vec![Event::new(0, sheet(1000.0))], vec![Event::new(0, sheet(4000.0))]];
        let attempts = Attempts {
            durations: &[100, 100],
            stats:     &stats,
            died:      &[vec![], vec![]],
            rezzed:    &[vec![], vec![]],
            weights:   &[2.0, 1.0],
        };
        let agg = aggregate_stats(&attempts);
        assert_eq!(agg.len(), 1);
        assert!(close(agg.points[0].what[CombatStat::Primary], 2000.0));
    }

    #[test]
    fn stats_dead_span_is_backfilled() {
        let stats = [vec![Event::new(0, sheet(2000.0))]];
        let attempts = Attempts {
            durations: &[1000],
            stats:     &stats,
            died:      &[vec![marker(400)]],
            rezzed:    &[vec![marker(600)]],
            weights:   &[1.0],
        };
        let agg = aggregate_stats(&attempts);
        let whens: Vec<i64> = agg.points.iter().map(|p| p.when).collect();
        assert_eq!(whens, vec![0, 400, 600]);
        assert_eq!(agg.valid, vec![true, false, true]);
        assert!(close(agg.points[1].what[CombatStat::Primary], 2000.0));
    }

    #[test]
    fn damage_mismatched_lengths_are_empty() {
        let stats = [vec![Event::new(0, sheet(1.0))]];
        let attempts = Attempts {
            durations: &[1000],
            stats:     &stats,
            died:      &[vec![]],
            rezzed:    &[vec![]],
            weights:   &[1.0],
        };
        let aug = [Event::new(0, sheet(2000.0))];
        assert!(aggregate_damage(&aug, &attempts, &[vec![hit(0)], vec![hit(0)]], true, 1000).is_empty());
        assert!(aggregate_damage(&[], &attempts, &[vec![hit(0)]], true, 1000).is_empty());
        assert!(aggregate_damage(&aug, &attempts, &[vec![hit(0)]], true, 0).is_empty());
    }

    #[test]
    fn damage_empty_stats_series_is_empty() {
        let stats = [vec![]];
        let attempts = Attempts {
            durations: &[1000],
            stats:     &stats,
            died:      &[vec![]],
            rezzed:    &[vec![]],
            weights:   &[1.0],
        };
        let aug = [Event::new(0, sheet(2000.0))];
        assert!(aggregate_damage(&aug, &attempts, &[vec![hit(0)]], true, 1000).is_empty());
    }

    #[test]
    fn half_window_death_counts_half() {
        // A deals one hit then dies mid-window; B keeps hitting at the same rate.
        let stats = [vec![Event::new(0, sheet(1.0))], vec![Event::new(0, sheet(1.0))]];
        let attempts = Attempts {
            durations: &[1000, 1000],
            stats:     &stats,
            died:      &[vec![marker(500)], vec![]],
            rezzed:    &[vec![], vec![]],
            weights:   &[1.0, 1.0],
        };
        let damage = [vec![hit(100)], vec![hit(100), hit(600)]];
        let aug = [Event::new(0, sheet(2000.0))];

        let agg = aggregate_damage(&aug, &attempts, &damage, false, 1000);
        let one_hit = hit(0).what.calc(&sheet(1.0), &sheet(2000.0), false).base;
        assert_eq!(agg.len(), 1);
        assert_eq!(agg.points[0].when, 0);
        assert!(close(agg.points[0].what.base, 2.0 * one_hit));
    }

    #[test]
    fn event_on_window_edge_goes_to_next_window() {
        let stats = [vec![Event::new(0, sheet(1.0))]];
        let attempts = Attempts {
            durations: &[3000],
            stats:     &stats,
            died:      &[vec![]],
            rezzed:    &[vec![]],
            weights:   &[1.0],
        };
        let damage = [vec![hit(1000)]];
        let aug = [Event::new(0, sheet(2000.0))];

        let agg = aggregate_damage(&aug, &attempts, &damage, false, 1000);
        let whens: Vec<i64> = agg.points.iter().map(|p| p.when).collect();
        assert_eq!(whens, vec![0, 1000, 2000]);
        assert_eq!(agg.points[0].what.base, 0.0);
        assert!(agg.points[1].what.base > 0.0);
        assert_eq!(agg.points[2].what.base, 0.0);
        assert!(agg.valid.iter().all(|v| *v));
    }

    #[test]
    fn all_dead_window_is_backfilled_with_mean() {
        let stats = [vec![Event::new(0, sheet(1.0))]];
        let attempts = Attempts {
            durations: &[4000],
            stats:     &stats,
            died:      &[vec![marker(1000)]],
            rezzed:    &[vec![marker(2000)]],
            weights:   &[1.0],
        };
        let damage = [vec![hit(0), hit(2500)]];
        let aug = [Event::new(0, sheet(2000.0))];

        let agg = aggregate_damage(&aug, &attempts, &damage, false, 1000);
        let whens: Vec<i64> = agg.points.iter().map(|p| p.when).collect();
        assert_eq!(whens, vec![0, 1000, 2000, 3000]);
        assert_eq!(agg.valid, vec![true, false, true, true]);
        // mean over three valid windows holding two hits
        let one_hit = hit(0).what.calc(&sheet(1.0), &sheet(2000.0), false).base;
        assert!(close(agg.points[1].what.base, 2.0 * one_hit / 3.0));
    }
}
