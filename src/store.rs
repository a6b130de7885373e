/// SQLite storage for simulated attempts.
///
/// Uses `rusqlite` with the `bundled` feature so SQLite is compiled in, no
/// system installation required.
///
/// One row in `logged` is one player's simulated series for one encounter,
/// stored as codec blobs. Forecasts read the most recent rows back for a
/// given player, spec, encounter and difficulty.
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::{
    codec,
    damage::Damage,
    event::{Event, Marker},
    on_rails::SimulatedEncounter,
    stats::CombatStats,
};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// One stored attempt, decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub duration_ms: i64,
    pub damage:      Vec<Event<Damage>>,
    pub stats:       Vec<Event<CombatStats>>,
    pub died:        Vec<Marker>,
    pub rezzed:      Vec<Marker>,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database at `db_path` and apply the schema.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)
            .map_err(|e| anyhow::anyhow!("DB open error: {}", e))?;
        apply_schema(&conn)?;
        tracing::info!("SQLite store opened at {:?}", db_path);
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Store every player of `encounter` that dealt damage. Returns how many
    /// were stored; an encounter already on file stores nothing.
    pub fn save_encounter(&mut self, encounter: &SimulatedEncounter) -> Result<usize> {
        let build = encounter.build.as_ref().map(|b| b.to_string());
        let tx = self.conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM encounter \
                 WHERE start_time = ?1 AND type = ?2 AND difficulty = ?3 AND build IS ?4",
                params![encounter.start_time, encounter.start.encounter_id, encounter.start.difficulty_id, build],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            tracing::debug!(
                "Encounter {} at {} already stored, skipping",
                encounter.start.encounter_name,
                encounter.start_time
            );
            return Ok(0);
        }

        tx.execute(
            "INSERT INTO encounter_type (id, name) VALUES (?1, ?2) \
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
            params![encounter.start.encounter_id, encounter.start.encounter_name],
        )?;
        tx.execute(
            "INSERT INTO encounter (type, difficulty, build, start_time, duration_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                encounter.start.encounter_id,
                encounter.start.difficulty_id,
                build,
                encounter.start_time,
                encounter.duration_ms(),
            ],
        )?;
        let encounter_row = tx.last_insert_rowid();

        let mut stored = 0;
        for player in &encounter.players {
            if player.damage_events.is_empty() {
                continue;
            }
            tx.execute("INSERT OR IGNORE INTO player (guid) VALUES (?1)", params![player.guid])?;
            let player_row: i64 = tx.query_row(
                "SELECT id FROM player WHERE guid = ?1",
                params![player.guid],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO logged (player, spec, encounter, damage, stats, deaths, rezzes) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    player_row,
                    player.info.spec_id,
                    encounter_row,
                    codec::serialize_damage(&player.damage_events),
                    codec::serialize_stats(&player.stat_events),
                    codec::serialize_markers(&player.died),
                    codec::serialize_markers(&player.rezzed),
                ],
            )?;
            stored += 1;
        }
        tx.commit()?;

        tracing::info!(
            "Stored {} players for {} (difficulty {})",
            stored,
            encounter.start.encounter_name,
            encounter.start.difficulty_id
        );
        Ok(stored)
    }

    /// Up to `limit` attempts of `guid` playing `spec_id`, most recent first.
    pub fn attempts(
        &self,
        guid:         &str,
        spec_id:      u32,
        encounter_id: u32,
        difficulty:   u32,
        limit:        u32,
    ) -> Result<Vec<Attempt>> {
        let mut stmt = self.conn.prepare(
            "SELECT encounter.duration_ms, logged.damage, logged.stats, logged.deaths, logged.rezzes \
             FROM logged \
             JOIN player    ON logged.player    = player.id \
             JOIN encounter ON logged.encounter = encounter.id \
             WHERE player.guid = ?1 AND logged.spec = ?2 AND encounter.type = ?3 AND encounter.difficulty = ?4 \
             ORDER BY encounter.start_time DESC \
             LIMIT ?5",
        )?;
        let rows = stmt.query_map(params![guid, spec_id, encounter_id, difficulty, limit], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, Vec<u8>>(2)?,
                row.get::<_, Vec<u8>>(3)?,
                row.get::<_, Vec<u8>>(4)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (duration_ms, damage, stats, died, rezzed) = row?;
            out.push(Attempt {
                duration_ms,
                damage: codec::deserialize_damage(&damage)
                    .map_err(|e| anyhow::anyhow!("Stored damage decode error: {}", e))?,
                stats:  codec::deserialize_stats(&stats)
                    .map_err(|e| anyhow::anyhow!("Stored stats decode error: {}", e))?,
                died:   codec::deserialize_markers(&died)
                    .map_err(|e| anyhow::anyhow!("Stored deaths decode error: {}", e))?,
                rezzed: codec::deserialize_markers(&rezzed)
                    .map_err(|e| anyhow::anyhow!("Stored rezzes decode error: {}", e))?,
            });
        }
        Ok(out)
    }

    /// Known encounters as `(id, name)`, by id.
    pub fn encounter_types(&self) -> Result<Vec<(u32, String)>> {
        let mut stmt = self.conn.prepare("SELECT id, name FROM encounter_type ORDER BY id")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch("
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS encounter_type (
            id   INTEGER PRIMARY KEY,
            name TEXT    NOT NULL
        );

        CREATE TABLE IF NOT EXISTS encounter (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            type        INTEGER NOT NULL REFERENCES encounter_type(id),
            difficulty  INTEGER NOT NULL,
            build       TEXT,
            start_time  INTEGER NOT NULL,
            duration_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS player (
            id   INTEGER PRIMARY KEY AUTOINCREMENT,
            guid TEXT    NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS logged (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            player    INTEGER NOT NULL REFERENCES player(id),
            spec      INTEGER NOT NULL,
            encounter INTEGER NOT NULL REFERENCES encounter(id) ON DELETE CASCADE,
            damage    BLOB    NOT NULL,
            stats     BLOB    NOT NULL,
            deaths    BLOB    NOT NULL,
            rezzes    BLOB    NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_encounter_lookup ON encounter(type, difficulty, start_time);
        CREATE INDEX IF NOT EXISTS idx_logged_player    ON logged(player, spec);
    ")?;
    Ok(())
}
