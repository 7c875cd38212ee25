//! Persistence boundary for the settlement & ranking engine.
//!
//! The engine never sees a schema — only these capability traits. Anything
//! that can load and persist fixtures, guesses, participants and pools can
//! back the engine: the bundled SQLite store for the service, the in-memory
//! store for deterministic tests, or an external system wrapping its own
//! database.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Fixture, Guess, Participant, Pool, Score};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Fixture persistence: lookup, scheduling, and the settlement write.
#[async_trait]
pub trait FixtureStore: Send + Sync {
    async fn fixture_by_id(&self, fixture_id: &str) -> Result<Option<Fixture>>;

    async fn insert_fixture(&self, fixture: &Fixture) -> Result<()>;

    /// Persist a fixture's final score, overwriting any previous one.
    async fn set_final_score(&self, fixture_id: &str, score: Score) -> Result<()>;

    /// All fixtures, newest kickoff first (ties broken by id for a stable
    /// listing).
    async fn list_fixtures(&self) -> Result<Vec<Fixture>>;
}

/// Guess persistence.
#[async_trait]
pub trait GuessStore: Send + Sync {
    /// Insert a guess. Returns `false` (and writes nothing) when the
    /// participant already has a guess for that fixture.
    async fn insert_guess(&self, guess: &Guess) -> Result<bool>;

    async fn guesses_for_fixture(&self, fixture_id: &str) -> Result<Vec<Guess>>;

    async fn guesses_for_participant(&self, participant_id: &str) -> Result<Vec<Guess>>;

    /// Persist a guess's awarded points, overwriting any previous award.
    async fn set_awarded_points(&self, guess_id: &str, points: i64) -> Result<()>;
}

/// Participant persistence. Membership rows are created here by the
/// external membership layer (and by tests and the seed tool); the engine
/// only reads them and writes totals.
#[async_trait]
pub trait ParticipantStore: Send + Sync {
    async fn participant_by_id(&self, participant_id: &str) -> Result<Option<Participant>>;

    /// All participants of a pool in join order (`join_seq` ascending).
    async fn participants_of_pool(&self, pool_id: &str) -> Result<Vec<Participant>>;

    /// Add a user to a pool; the store assigns the next `join_seq`.
    async fn add_participant(&self, pool_id: &str, user_id: &str) -> Result<Participant>;

    /// Persist a participant's recomputed total.
    async fn set_total_points(&self, participant_id: &str, total: i64) -> Result<()>;
}

/// Pool persistence.
#[async_trait]
pub trait PoolStore: Send + Sync {
    async fn pool_by_id(&self, pool_id: &str) -> Result<Option<Pool>>;

    async fn create_pool(&self, title: &str) -> Result<Pool>;
}

/// Umbrella trait: everything the engine needs from one backing store.
pub trait Store: FixtureStore + GuessStore + ParticipantStore + PoolStore {}

impl<T: FixtureStore + GuessStore + ParticipantStore + PoolStore> Store for T {}
