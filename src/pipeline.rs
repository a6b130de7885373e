/// Glue between the stages: event stream in, simulated encounters out; stored
/// attempts in, forecast out.
///
///   events ─► ingest ─► difficulty filter ─► build gate ─► simulate
///   store  ─► aggregate aug stats ─► aggregate each member's damage ─► Forecast
use anyhow::Result;
use serde::Serialize;

use crate::{
    aggregate::{aggregate_damage, aggregate_stats, Aggregated, Attempts},
    build_version::{classify, BuildStatus, BuildVersion},
    codec,
    config::AppConfig,
    damage::{CalcedDamage, Damage},
    event::{Event, Marker},
    game_data::GameData,
    ingest::ingest,
    log_event::RawEvent,
    on_rails::{simulate, SimulatedEncounter},
    stats::CombatStats,
    store::{Attempt, Store},
};

// ---------------------------------------------------------------------------
// Processing
// ---------------------------------------------------------------------------

/// An encounter logged on a newer build than the formulas cover.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Deferred {
    pub encounter_name: String,
    pub build:          Option<BuildVersion>,
    /// Where to resume reading once the build is supported.
    pub start_byte:     u64,
}

#[derive(Debug, Default)]
pub struct ProcessReport {
    pub simulated:  Vec<SimulatedEncounter>,
    pub deferred:   Vec<Deferred>,
    /// Older or unannounced builds. Never simulated.
    pub skipped:    usize,
    /// Closed encounters on a difficulty the config does not track.
    pub filtered:   usize,
}

impl ProcessReport {
    /// Earliest offset that must be read again later, if anything was deferred.
    pub fn resume_offset(&self) -> Option<u64> {
        self.deferred.iter().map(|d| d.start_byte).min()
    }
}

pub fn process(events: &[RawEvent], cfg: &AppConfig, game_data: &GameData) -> ProcessReport {
    let mut report = ProcessReport::default();

    for encounter in ingest(events) {
        if !cfg.tracks_difficulty(encounter.start.difficulty_id) {
            tracing::debug!(
                "Ignoring {} on difficulty {}",
                encounter.start.encounter_name,
                encounter.start.difficulty_id
            );
            report.filtered += 1;
            continue;
        }

        match classify(encounter.build) {
            BuildStatus::Supported => {
                let simulated = simulate(&encounter, game_data);
                tracing::info!(
                    "Simulated {} ({} ms, {} players, {} skipped)",
                    simulated.start.encounter_name,
                    simulated.duration_ms(),
                    simulated.players.len(),
                    simulated.skipped_players.len()
                );
                report.simulated.push(simulated);
            }
            BuildStatus::Future => {
                tracing::info!(
                    "Deferring {}: build {:?} is newer than supported",
                    encounter.start.encounter_name,
                    encounter.build.map(|b| b.to_string())
                );
                report.deferred.push(Deferred {
                    encounter_name: encounter.start.encounter_name.clone(),
                    build:          encounter.build,
                    start_byte:     encounter.start_byte,
                });
            }
            status @ (BuildStatus::Past | BuildStatus::Unknown) => {
                tracing::warn!("Skipping {}: build status {:?}", encounter.start.encounter_name, status);
                report.skipped += 1;
            }
        }
    }
    report
}

/// Store every simulated encounter of `report`. Returns the number of
/// player attempts written.
pub fn store_report(store: &mut Store, report: &ProcessReport) -> Result<usize> {
    let mut stored = 0;
    for encounter in &report.simulated {
        stored += store
            .save_encounter(encounter)
            .map_err(|e| anyhow::anyhow!("Store write error ({}): {}", encounter.start.encounter_name, e))?;
    }
    Ok(stored)
}

// ---------------------------------------------------------------------------
// Forecasting
// ---------------------------------------------------------------------------

/// A raid member to forecast for.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberRequest {
    pub guid:    String,
    pub name:    String,
    pub spec_id: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberForecast {
    pub guid:     String,
    pub name:     String,
    pub spec_id:  u32,
    pub attempts: usize,
    pub damage:   Aggregated<CalcedDamage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Forecast {
    pub encounter_id: u32,
    pub difficulty:   u32,
    pub window_ms:    i64,
    pub aug_guid:     String,
    pub aug_attempts: usize,
    pub aug_stats:    Aggregated<CombatStats>,
    pub members:      Vec<MemberForecast>,
}

impl Forecast {
    /// Compact payload for the in-game helper.
    pub fn pack(&self) -> Result<Vec<u8>> {
        let members: Vec<(&str, &Aggregated<CalcedDamage>)> =
            self.members.iter().map(|m| (m.guid.as_str(), &m.damage)).collect();
        codec::pack_forecast(self.window_ms, &members)
            .map_err(|e| anyhow::anyhow!("Forecast pack error: {}", e))
    }
}

/// Per-attempt columns, split out of stored rows so the aggregator can
/// borrow them as parallel slices.
struct Columns {
    durations: Vec<i64>,
    stats:     Vec<Vec<Event<CombatStats>>>,
    died:      Vec<Vec<Marker>>,
    rezzed:    Vec<Vec<Marker>>,
    weights:   Vec<f64>,
}

impl Columns {
    fn split(attempts: Vec<Attempt>) -> (Self, Vec<Vec<Event<Damage>>>) {
        let mut cols = Columns {
            durations: Vec::with_capacity(attempts.len()),
            stats:     Vec::with_capacity(attempts.len()),
            died:      Vec::with_capacity(attempts.len()),
            rezzed:    Vec::with_capacity(attempts.len()),
            weights:   Vec::with_capacity(attempts.len()),
        };
        let mut damage = Vec::with_capacity(attempts.len());
        for a in attempts {
            cols.durations.push(a.duration_ms);
            cols.stats.push(a.stats);
            cols.died.push(a.died);
            cols.rezzed.push(a.rezzed);
            cols.weights.push(1.0);
            damage.push(a.damage);
        }
        (cols, damage)
    }

    fn view(&self) -> Attempts<'_> {
        Attempts {
            durations: &self.durations,
            stats:     &self.stats,
            died:      &self.died,
            rezzed:    &self.rezzed,
            weights:   &self.weights,
        }
    }
}

pub fn forecast(
    store:        &Store,
    cfg:          &AppConfig,
    aug_guid:     &str,
    members:      &[MemberRequest],
    encounter_id: u32,
    difficulty:   u32,
) -> Result<Forecast> {
    let aug_attempts = store.attempts(aug_guid, cfg.aug_spec_id, encounter_id, difficulty, cfg.max_attempts)?;
    if aug_attempts.is_empty() {
        return Err(anyhow::anyhow!(
            "Forecast error: no stored attempts for {} on encounter {} difficulty {}",
            aug_guid,
            encounter_id,
            difficulty
        ));
    }
    let aug_count = aug_attempts.len();
    let (aug_cols, _) = Columns::split(aug_attempts);
    let aug_stats = aggregate_stats(&aug_cols.view());
    tracing::info!("Aggregated {} aug attempts into {} stat points", aug_count, aug_stats.len());

    let mut out = Vec::with_capacity(members.len());
    for member in members {
        let attempts = store.attempts(&member.guid, member.spec_id, encounter_id, difficulty, cfg.max_attempts)?;
        let count = attempts.len();
        let (cols, damage) = Columns::split(attempts);
        let series = aggregate_damage(&aug_stats.points, &cols.view(), &damage, cfg.fate_mirror, cfg.window_ms);
        if series.is_empty() {
            tracing::warn!("No usable attempts for {} ({})", member.name, member.guid);
        }
        out.push(MemberForecast {
            guid:     member.guid.clone(),
            name:     member.name.clone(),
            spec_id:  member.spec_id,
            attempts: count,
            damage:   series,
        });
    }

    Ok(Forecast {
        encounter_id,
        difficulty,
        window_ms:    cfg.window_ms,
        aug_guid:     aug_guid.to_owned(),
        aug_attempts: aug_count,
        aug_stats,
        members:      out,
    })
}

/// Parse `guid:name:spec`.
pub fn parse_member(raw: &str) -> Result<MemberRequest> {
    let mut parts = raw.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(guid), Some(name), Some(spec)) if !guid.is_empty() => {
            let spec_id = spec
                .trim()
                .parse::<u32>()
                .map_err(|e| anyhow::anyhow!("Member spec parse error in '{}': {}", raw, e))?;
            Ok(MemberRequest { guid: guid.to_owned(), name: name.to_owned(), spec_id })
        }
        _ => Err(anyhow::anyhow!("Member parse error: expected guid:name:spec, got '{}'", raw)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_event::parse_json_lines;

    const AUG:  &str = "Player-1305-0A000001";
    const RET:  &str = "Player-1305-0B000002";
    const BOSS: &str = "Creature-0-1-2-3-209333-0001";

    fn unit(guid: &str, name: &str, flags: u32) -> String {
        format!(r#"{{"guid":"{}","name":"{}","flags":{}}}"#, guid, name, flags)
    }

    fn header(src: &str, dst: &str) -> String {
        format!(r#""header":{{"source":{},"dest":{}}}"#, src, dst)
    }

    /// One 20-player attempt on `build` at `t0`: the ret hits twice, the aug once.
    fn attempt(t0: i64, build: &str, difficulty: u32) -> String {
        let aug  = unit(AUG, "Scales", 0x511);
        let ret  = unit(RET, "Stonebraid", 0x511);
        let boss = unit(BOSS, "Gnarlroot", 0xa48);
        let hit = |ts: i64, src: &str, amount: i64| {
            format!(
                r#"{{"timestamp_ms":{},"type":"SpellDamage",{},"spell_id":361469,"damage":{{"amount":{},"crit":false}}}}"#,
                ts,
                header(src, &boss),
                amount
            )
        };
        [
            format!(r#"{{"timestamp_ms":{},"type":"CombatLogVersion","build":"{}"}}"#, t0 - 1, build),
            format!(
                r#"{{"timestamp_ms":{},"offset":{},"type":"EncounterStart","encounter_id":2820,"encounter_name":"Gnarlroot","difficulty_id":{},"instance_size":20}}"#,
                t0, t0, difficulty
            ),
            format!(r#"{{"timestamp_ms":{},"type":"CombatantInfo","guid":"{}","spec_id":1473}}"#, t0, AUG),
            format!(r#"{{"timestamp_ms":{},"type":"CombatantInfo","guid":"{}","spec_id":70}}"#, t0, RET),
            hit(t0 + 100, &ret, 10_000),
            hit(t0 + 200, &aug, 5_000),
            hit(t0 + 1500, &ret, 12_000),
            format!(
                r#"{{"timestamp_ms":{},"type":"EncounterEnd","encounter_id":2820,"encounter_name":"Gnarlroot","difficulty_id":{},"group_size":20,"success":false}}"#,
                t0 + 3000, difficulty
            ),
        ]
        .join("\n")
    }

    fn events(parts: &[String]) -> Vec<RawEvent> {
        parse_json_lines(&parts.join("\n"))
    }

    #[test]
    fn sorts_encounters_by_build_and_difficulty() {
        let events = events(&[
            attempt(10_000, "10.2.5", 16),
            attempt(20_000, "10.2.6", 16),
            attempt(30_000, "10.1.7", 16),
            attempt(40_000, "10.2.5", 8),
        ]);
        let report = process(&events, &AppConfig::default(), GameData::embedded());
        assert_eq!(report.simulated.len(), 1);
        assert_eq!(report.deferred.len(), 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.filtered, 1);
        assert_eq!(report.resume_offset(), Some(20_000));
    }

    #[test]
    fn simulated_players_carry_damage() {
        let events = events(&[attempt(10_000, "10.2.5", 16)]);
        let report = process(&events, &AppConfig::default(), GameData::embedded());
        let enc = &report.simulated[0];
        assert_eq!(enc.duration_ms(), 3000);
        assert_eq!(enc.player(RET).expect("ret simulated").damage_events.len(), 2);
        assert_eq!(enc.player(AUG).expect("aug simulated").damage_events.len(), 1);
    }

    #[test]
    fn end_to_end_forecast() {
        let cfg = AppConfig::default();
        let events = events(&[attempt(10_000, "10.2.5", 16), attempt(20_000, "10.2.5", 16)]);
        let report = process(&events, &cfg, GameData::embedded());

        let mut store = Store::open_in_memory().unwrap();
        assert_eq!(store_report(&mut store, &report).unwrap(), 4);

        let members = [parse_member(&format!("{}:Stonebraid:70", RET)).unwrap()];
        let fc = forecast(&store, &cfg, AUG, &members, 2820, 16).unwrap();
        assert_eq!(fc.aug_attempts, 2);
        assert_eq!(fc.members[0].attempts, 2);

        let damage = &fc.members[0].damage;
        assert!(!damage.is_empty());
        assert!(damage.points[0].what.base > 0.0);
        assert!(damage.points[0].what.with_ebon_mult > 1.0);

        let packed = fc.pack().unwrap();
        assert_eq!(packed[0], 10);
        assert_eq!(packed[1], 1);
        assert_eq!(*packed.last().unwrap(), codec::FORECAST_TERMINATOR);
    }

    #[test]
    fn forecast_without_aug_history_fails() {
        let store = Store::open_in_memory().unwrap();
        let err = forecast(&store, &AppConfig::default(), AUG, &[], 2820, 16).unwrap_err();
        assert!(err.to_string().starts_with("Forecast error"));
    }

    #[test]
    fn parses_members() {
        let m = parse_member("Player-1-2:Stone:braid:70").unwrap_err();
        assert!(m.to_string().contains("spec parse error"));
        let m = parse_member("Player-1-2:Stonebraid:70").unwrap();
        assert_eq!(m, MemberRequest { guid: "Player-1-2".to_owned(), name: "Stonebraid".to_owned(), spec_id: 70 });
        assert!(parse_member("Player-1-2").is_err());
    }
}
