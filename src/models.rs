//! Core domain types for the settlement & ranking engine.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A score pair: goals for the first-listed team and the second-listed team.
///
/// Used both for predictions and for final results. Components are plain
/// integers; non-negativity is enforced at the engine boundary, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub first: i64,
    pub second: i64,
}

impl Score {
    pub fn new(first: i64, second: i64) -> Self {
        Self { first, second }
    }

    /// Which way the result leans: `Greater` = first-team win,
    /// `Less` = second-team win, `Equal` = draw.
    pub fn tendency(&self) -> Ordering {
        self.first.cmp(&self.second)
    }

    pub fn is_non_negative(&self) -> bool {
        self.first >= 0 && self.second >= 0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.first, self.second)
    }
}

/// A scheduled contest between two teams.
///
/// `final_score` stays `None` until settlement; a fixture counts as settled
/// exactly when it is `Some`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    pub id: String,
    pub first_team: String,
    pub second_team: String,
    pub kickoff_at: DateTime<Utc>,
    pub final_score: Option<Score>,
}

impl Fixture {
    pub fn new(first_team: &str, second_team: &str, kickoff_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            first_team: first_team.to_string(),
            second_team: second_team.to_string(),
            kickoff_at,
            final_score: None,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.final_score.is_some()
    }

    /// Guessing closes at kickoff, and stays closed once a final score is in.
    pub fn guessing_closed(&self, now: DateTime<Utc>) -> bool {
        self.is_settled() || self.kickoff_at <= now
    }
}

/// A participant's score prediction for one fixture.
///
/// The prediction is fixed at creation; only `awarded_points` changes, and
/// only through settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guess {
    pub id: String,
    pub fixture_id: String,
    pub participant_id: String,
    pub predicted: Score,
    pub awarded_points: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Guess {
    pub fn new(fixture_id: &str, participant_id: &str, predicted: Score) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            fixture_id: fixture_id.to_string(),
            participant_id: participant_id.to_string(),
            predicted,
            awarded_points: None,
            created_at: Utc::now(),
        }
    }
}

/// A user's membership record within one pool.
///
/// `join_seq` is assigned by the store in arrival order and is the ranking
/// tie-break. `total_points` is always a full recomputation over the
/// participant's guesses, never an incremental patch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub pool_id: String,
    pub user_id: String,
    pub join_seq: i64,
    pub total_points: i64,
    pub joined_at: DateTime<Utc>,
}

/// A group of participants competing on the same fixtures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub bind_addr: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "./goalpool.db".to_string());

        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        Ok(Self {
            database_path,
            bind_addr,
            port,
        })
    }
}
