/// Fixed-size little-endian records for the per-attempt series kept in the
/// store, plus the compact forecast payload.
use crate::{
    aggregate::Aggregated,
    damage::{CalcedDamage, Damage, DamageAmp},
    error::{LedgerError, LedgerResult},
    event::{marker, Event, Marker},
    stats::{CombatStat, CombatStats},
};

pub const DAMAGE_RECORD_SIZE: usize = 8 + 8 * 3 + 1;
pub const STATS_RECORD_SIZE:  usize = 8 + 8 * CombatStat::COUNT;
pub const MARKER_RECORD_SIZE: usize = 8;

const FLAG_SCALES_WITH_PRIMARY: u8 = 1;
const FLAG_CAN_NOT_CRIT:        u8 = 2;
const FLAG_ALLOW_PROCS:         u8 = 4;

/// Ends one member's windows in the forecast payload. A window delta byte
/// never reaches it.
pub const FORECAST_TERMINATOR: u8 = 0xFF;

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take<const N: usize>(&mut self) -> LedgerResult<[u8; N]> {
        let end = self.pos + N;
        let bytes = self
            .buf
            .get(self.pos..end)
            .ok_or_else(|| LedgerError::MalformedInput(format!("record truncated at byte {}", self.pos)))?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn i64(&mut self) -> LedgerResult<i64> {
        self.take::<8>().map(i64::from_le_bytes)
    }

    fn f64(&mut self) -> LedgerResult<f64> {
        self.take::<8>().map(f64::from_le_bytes)
    }

    fn u8(&mut self) -> LedgerResult<u8> {
        self.take::<1>().map(|b| b[0])
    }
}

fn check_len(kind: &str, buf: &[u8], record: usize) -> LedgerResult<usize> {
    if buf.len() % record != 0 {
        return Err(LedgerError::MalformedInput(format!(
            "{} buffer of {} bytes is not a multiple of {}",
            kind,
            buf.len(),
            record
        )));
    }
    Ok(buf.len() / record)
}

// ---------------------------------------------------------------------------
// Damage
// ---------------------------------------------------------------------------

/// Stored flag byte. Only the highest-precedence flag survives: existing
/// stores were written this way, so decoders must keep seeing the same bytes.
fn damage_flags(d: &Damage) -> u8 {
    if d.allow_class_ability_procs {
        FLAG_ALLOW_PROCS
    } else if d.can_not_crit {
        FLAG_CAN_NOT_CRIT
    } else if d.scales_with_primary {
        FLAG_SCALES_WITH_PRIMARY
    } else {
        0
    }
}

pub fn serialize_damage(events: &[Event<Damage>]) -> Vec<u8> {
    let mut out = Vec::with_capacity(events.len() * DAMAGE_RECORD_SIZE);
    for e in events {
        out.extend_from_slice(&e.when.to_le_bytes());
        out.extend_from_slice(&e.what.base_scaling.to_le_bytes());
        out.extend_from_slice(&e.what.amp.crit_amp.to_le_bytes());
        out.extend_from_slice(&e.what.amp.crit_chance_add.to_le_bytes());
        out.push(damage_flags(&e.what));
    }
    out
}

pub fn deserialize_damage(buf: &[u8]) -> LedgerResult<Vec<Event<Damage>>> {
    let count = check_len("damage", buf, DAMAGE_RECORD_SIZE)?;
    let mut r = Reader::new(buf);
    let mut out = Vec::with_capacity(count);
    while r.remaining() > 0 {
        let when            = r.i64()?;
        let base_scaling    = r.f64()?;
        let crit_amp        = r.f64()?;
        let crit_chance_add = r.f64()?;
        let flags           = r.u8()?;
        out.push(Event::new(when, Damage {
            base_scaling,
            scales_with_primary:       flags & FLAG_SCALES_WITH_PRIMARY != 0,
            can_not_crit:              flags & FLAG_CAN_NOT_CRIT != 0,
            allow_class_ability_procs: flags & FLAG_ALLOW_PROCS != 0,
            amp: DamageAmp { crit_amp, crit_chance_add },
        }));
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

pub fn serialize_stats(events: &[Event<CombatStats>]) -> Vec<u8> {
    let mut out = Vec::with_capacity(events.len() * STATS_RECORD_SIZE);
    for e in events {
        out.extend_from_slice(&e.when.to_le_bytes());
        for (_, v) in e.what.iter() {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
    out
}

pub fn deserialize_stats(buf: &[u8]) -> LedgerResult<Vec<Event<CombatStats>>> {
    let count = check_len("stats", buf, STATS_RECORD_SIZE)?;
    let mut r = Reader::new(buf);
    let mut out = Vec::with_capacity(count);
    while r.remaining() > 0 {
        let when = r.i64()?;
        let mut stats = CombatStats::ZERO;
        for stat in CombatStat::ALL {
            stats[stat] = r.f64()?;
        }
        out.push(Event::new(when, stats));
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Deaths / rezzes
// ---------------------------------------------------------------------------

pub fn serialize_markers(events: &[Marker]) -> Vec<u8> {
    events.iter().flat_map(|e| e.when.to_le_bytes()).collect()
}

pub fn deserialize_markers(buf: &[u8]) -> LedgerResult<Vec<Marker>> {
    let count = check_len("marker", buf, MARKER_RECORD_SIZE)?;
    let mut r = Reader::new(buf);
    let mut out = Vec::with_capacity(count);
    while r.remaining() > 0 {
        out.push(marker(r.i64()?));
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Forecast payload
// ---------------------------------------------------------------------------

/// Splits `Player-<server>-<hexuid>` into its numeric parts.
pub fn parse_player_guid(guid: &str) -> LedgerResult<(u16, u32)> {
    let bad = || LedgerError::MalformedInput(format!("unexpected guid format '{}'", guid));
    let mut parts = guid.splitn(3, '-');
    let (server, uid) = match (parts.next(), parts.next(), parts.next()) {
        (Some("Player"), Some(server), Some(uid)) => (server, uid),
        _ => return Err(bad()),
    };
    let server = server.parse::<u16>().map_err(|_| bad())?;
    let uid = u32::from_str_radix(uid, 16).map_err(|_| bad())?;
    Ok((server, uid))
}

fn clamped_u8(v: f64) -> u8 {
    v.clamp(0.0, u8::MAX as f64) as u8
}

fn clamped_u16(v: f64) -> u16 {
    v.clamp(0.0, u16::MAX as f64) as u16
}

fn push_window(out: &mut Vec<u8>, delta: i64, d: &CalcedDamage) {
    out.push((delta - 1) as u8);
    out.extend_from_slice(&clamped_u16(d.base / 1000.0).to_le_bytes());
    out.push(clamped_u8((d.with_ebon_mult - 1.0) * 100.0));
    out.push(clamped_u8((d.with_prescience_mult - 1.0) * 100.0));
    out.push(clamped_u8((d.with_shifting_sands_mult - 1.0) * 100.0));
}

/// Compact payload for the in-game helper.
///
/// Each window stores how many windows it sits after the previous one
/// (minus one), so a member's series starts with the distance from window 0.
/// Gaps wider than one byte repeat the window's values until covered.
pub fn pack_forecast(window_ms: i64, members: &[(&str, &Aggregated<CalcedDamage>)]) -> LedgerResult<Vec<u8>> {
    if window_ms <= 0 || window_ms % 100 != 0 || window_ms / 100 > u8::MAX as i64 {
        return Err(LedgerError::MalformedInput(format!("window of {} ms cannot be packed", window_ms)));
    }
    let count = u8::try_from(members.len())
        .map_err(|_| LedgerError::MalformedInput(format!("{} members cannot be packed", members.len())))?;

    let mut out = vec![(window_ms / 100) as u8, count];
    for (guid, damage) in members {
        let (server, uid) = parse_player_guid(guid)?;
        out.extend_from_slice(&server.to_le_bytes());
        out.extend_from_slice(&uid.to_le_bytes());

        let mut prev_window = -1i64;
        for point in &damage.points {
            let window = point.when / window_ms;
            let mut delta = window - prev_window;
            while delta > 0 {
                let step = delta.min(u8::MAX as i64);
                push_window(&mut out, step, &point.what);
                delta -= step;
            }
            prev_window = window;
        }
        out.push(FORECAST_TERMINATOR);
    }
    Ok(out)
}
