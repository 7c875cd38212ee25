//! SQLite-backed store.
//!
//! Single bundled SQLite database holding pools, participants, fixtures and
//! guesses. WAL mode keeps rank reads cheap while settlements write. All
//! timestamps are stored as RFC 3339 UTC text with second precision, so
//! lexicographic order is chronological order.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex; // Faster than std::sync::Mutex
use rusqlite::{params, Connection, OpenFlags};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{Fixture, Guess, Participant, Pool, Score};
use crate::store::{FixtureStore, GuessStore, ParticipantStore, PoolStore};

const SCHEMA_SQL: &str = r#"
-- Enable WAL mode so rank queries read while settlements write
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS pools (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    created_at TEXT NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS participants (
    id TEXT PRIMARY KEY,
    pool_id TEXT NOT NULL REFERENCES pools(id),
    user_id TEXT NOT NULL,
    join_seq INTEGER NOT NULL,
    total_points INTEGER NOT NULL DEFAULT 0,
    joined_at TEXT NOT NULL,
    UNIQUE(pool_id, user_id),
    UNIQUE(pool_id, join_seq)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_participants_pool
    ON participants(pool_id, join_seq);

CREATE TABLE IF NOT EXISTS fixtures (
    id TEXT PRIMARY KEY,
    first_team TEXT NOT NULL,
    second_team TEXT NOT NULL,
    kickoff_at TEXT NOT NULL,
    final_first INTEGER,
    final_second INTEGER
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_fixtures_kickoff
    ON fixtures(kickoff_at DESC, id);

-- One guess per participant per fixture, enforced by the database
CREATE TABLE IF NOT EXISTS guesses (
    id TEXT PRIMARY KEY,
    fixture_id TEXT NOT NULL REFERENCES fixtures(id),
    participant_id TEXT NOT NULL REFERENCES participants(id),
    predicted_first INTEGER NOT NULL,
    predicted_second INTEGER NOT NULL,
    awarded_points INTEGER,
    created_at TEXT NOT NULL,
    UNIQUE(participant_id, fixture_id)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_guesses_fixture
    ON guesses(fixture_id);

CREATE INDEX IF NOT EXISTS idx_guesses_participant
    ON guesses(participant_id);
"#;

/// SQLite store behind a single mutex-guarded connection.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX; // We handle our own locking

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("Failed to open database at {}", db_path))?;

        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize database schema")?;

        // Verify WAL mode is active (in-memory databases stay on "memory")
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();

        if db_path != ":memory:" && journal_mode.to_lowercase() != "wal" {
            warn!("WAL mode not active, journal_mode = {}", journal_mode);
        }

        info!("📊 Pool database ready at: {}", db_path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn ts(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    fn parse_ts(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
    }

    fn row_to_fixture(row: &rusqlite::Row) -> rusqlite::Result<Fixture> {
        let kickoff_raw: String = row.get(3)?;
        let final_first: Option<i64> = row.get(4)?;
        let final_second: Option<i64> = row.get(5)?;

        let final_score = match (final_first, final_second) {
            (Some(first), Some(second)) => Some(Score { first, second }),
            _ => None,
        };

        Ok(Fixture {
            id: row.get(0)?,
            first_team: row.get(1)?,
            second_team: row.get(2)?,
            kickoff_at: Self::parse_ts(&kickoff_raw)?,
            final_score,
        })
    }

    fn row_to_guess(row: &rusqlite::Row) -> rusqlite::Result<Guess> {
        let created_raw: String = row.get(6)?;

        Ok(Guess {
            id: row.get(0)?,
            fixture_id: row.get(1)?,
            participant_id: row.get(2)?,
            predicted: Score {
                first: row.get(3)?,
                second: row.get(4)?,
            },
            awarded_points: row.get(5)?,
            created_at: Self::parse_ts(&created_raw)?,
        })
    }

    fn row_to_participant(row: &rusqlite::Row) -> rusqlite::Result<Participant> {
        let joined_raw: String = row.get(5)?;

        Ok(Participant {
            id: row.get(0)?,
            pool_id: row.get(1)?,
            user_id: row.get(2)?,
            join_seq: row.get(3)?,
            total_points: row.get(4)?,
            joined_at: Self::parse_ts(&joined_raw)?,
        })
    }
}

#[async_trait]
impl FixtureStore for SqliteStore {
    async fn fixture_by_id(&self, fixture_id: &str) -> Result<Option<Fixture>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, first_team, second_team, kickoff_at, final_first, final_second
             FROM fixtures WHERE id = ?1",
        )?;

        let mut rows = stmt.query([fixture_id])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        Ok(Some(Self::row_to_fixture(row)?))
    }

    async fn insert_fixture(&self, fixture: &Fixture) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO fixtures (id, first_team, second_team, kickoff_at, final_first, final_second)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &fixture.id,
                &fixture.first_team,
                &fixture.second_team,
                Self::ts(&fixture.kickoff_at),
                fixture.final_score.map(|s| s.first),
                fixture.final_score.map(|s| s.second),
            ],
        )?;
        Ok(())
    }

    async fn set_final_score(&self, fixture_id: &str, score: Score) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE fixtures SET final_first = ?2, final_second = ?3 WHERE id = ?1",
            params![fixture_id, score.first, score.second],
        )?;
        Ok(())
    }

    async fn list_fixtures(&self) -> Result<Vec<Fixture>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, first_team, second_team, kickoff_at, final_first, final_second
             FROM fixtures
             ORDER BY kickoff_at DESC, id",
        )?;

        let fixtures = stmt
            .query_map([], Self::row_to_fixture)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(fixtures)
    }
}

#[async_trait]
impl GuessStore for SqliteStore {
    async fn insert_guess(&self, guess: &Guess) -> Result<bool> {
        let conn = self.conn.lock();

        // INSERT OR IGNORE leans on the UNIQUE(participant_id, fixture_id)
        // constraint; changes == 0 means the participant already guessed.
        let changes = conn.execute(
            "INSERT OR IGNORE INTO guesses
             (id, fixture_id, participant_id, predicted_first, predicted_second, awarded_points, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &guess.id,
                &guess.fixture_id,
                &guess.participant_id,
                guess.predicted.first,
                guess.predicted.second,
                guess.awarded_points,
                Self::ts(&guess.created_at),
            ],
        )?;

        Ok(changes > 0)
    }

    async fn guesses_for_fixture(&self, fixture_id: &str) -> Result<Vec<Guess>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, fixture_id, participant_id, predicted_first, predicted_second,
                    awarded_points, created_at
             FROM guesses
             WHERE fixture_id = ?1
             ORDER BY created_at, id",
        )?;

        let guesses = stmt
            .query_map([fixture_id], Self::row_to_guess)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(guesses)
    }

    async fn guesses_for_participant(&self, participant_id: &str) -> Result<Vec<Guess>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, fixture_id, participant_id, predicted_first, predicted_second,
                    awarded_points, created_at
             FROM guesses
             WHERE participant_id = ?1
             ORDER BY created_at, id",
        )?;

        let guesses = stmt
            .query_map([participant_id], Self::row_to_guess)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(guesses)
    }

    async fn set_awarded_points(&self, guess_id: &str, points: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE guesses SET awarded_points = ?2 WHERE id = ?1",
            params![guess_id, points],
        )?;
        Ok(())
    }
}

#[async_trait]
impl ParticipantStore for SqliteStore {
    async fn participant_by_id(&self, participant_id: &str) -> Result<Option<Participant>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, pool_id, user_id, join_seq, total_points, joined_at
             FROM participants WHERE id = ?1",
        )?;

        let mut rows = stmt.query([participant_id])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        Ok(Some(Self::row_to_participant(row)?))
    }

    async fn participants_of_pool(&self, pool_id: &str) -> Result<Vec<Participant>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, pool_id, user_id, join_seq, total_points, joined_at
             FROM participants
             WHERE pool_id = ?1
             ORDER BY join_seq",
        )?;

        let participants = stmt
            .query_map([pool_id], Self::row_to_participant)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(participants)
    }

    async fn add_participant(&self, pool_id: &str, user_id: &str) -> Result<Participant> {
        let joined_at = Utc::now();
        let id = Uuid::new_v4().to_string();

        let conn = self.conn.lock();

        // Holding the connection lock makes the MAX+1 read and the insert
        // atomic with respect to other writers.
        let join_seq: i64 = conn.query_row(
            "SELECT COALESCE(MAX(join_seq), 0) + 1 FROM participants WHERE pool_id = ?1",
            params![pool_id],
            |row| row.get(0),
        )?;

        conn.execute(
            "INSERT INTO participants (id, pool_id, user_id, join_seq, total_points, joined_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            params![&id, pool_id, user_id, join_seq, Self::ts(&joined_at)],
        )
        .with_context(|| format!("Failed to add user {} to pool {}", user_id, pool_id))?;

        Ok(Participant {
            id,
            pool_id: pool_id.to_string(),
            user_id: user_id.to_string(),
            join_seq,
            total_points: 0,
            joined_at,
        })
    }

    async fn set_total_points(&self, participant_id: &str, total: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE participants SET total_points = ?2 WHERE id = ?1",
            params![participant_id, total],
        )?;
        Ok(())
    }
}

#[async_trait]
impl PoolStore for SqliteStore {
    async fn pool_by_id(&self, pool_id: &str) -> Result<Option<Pool>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare_cached("SELECT id, title, created_at FROM pools WHERE id = ?1")?;

        let mut rows = stmt.query([pool_id])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let created_raw: String = row.get(2)?;
        Ok(Some(Pool {
            id: row.get(0)?,
            title: row.get(1)?,
            created_at: Self::parse_ts(&created_raw)?,
        }))
    }

    async fn create_pool(&self, title: &str) -> Result<Pool> {
        let pool = Pool {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            created_at: Utc::now(),
        };

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO pools (id, title, created_at) VALUES (?1, ?2, ?3)",
            params![&pool.id, &pool.title, Self::ts(&pool.created_at)],
        )?;

        Ok(pool)
    }
}
