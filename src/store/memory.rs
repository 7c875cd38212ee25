//! In-memory store.
//!
//! Deterministic test double for the SQLite store: same trait contract, same
//! observable ordering, no disk. A write-failure budget lets tests check that
//! settlement aborts cleanly when persistence fails mid-flight.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{Fixture, Guess, Participant, Pool, Score};
use crate::store::{FixtureStore, GuessStore, ParticipantStore, PoolStore};

#[derive(Default)]
struct MemoryInner {
    pools: HashMap<String, Pool>,
    participants: HashMap<String, Participant>,
    fixtures: HashMap<String, Fixture>,
    guesses: HashMap<String, Guess>,
    /// `Some(n)`: the next n writes succeed, everything after errors.
    write_budget: Option<u64>,
}

impl MemoryInner {
    fn note_write(&mut self) -> Result<()> {
        if let Some(remaining) = self.write_budget.as_mut() {
            if *remaining == 0 {
                return Err(anyhow!("injected write failure"));
            }
            *remaining -= 1;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `remaining` more writes, then fail every write after that.
    pub fn fail_after_writes(&self, remaining: u64) {
        self.inner.lock().write_budget = Some(remaining);
    }

    /// Lift a previously set write-failure budget.
    pub fn clear_write_failures(&self) {
        self.inner.lock().write_budget = None;
    }
}

#[async_trait]
impl FixtureStore for MemoryStore {
    async fn fixture_by_id(&self, fixture_id: &str) -> Result<Option<Fixture>> {
        Ok(self.inner.lock().fixtures.get(fixture_id).cloned())
    }

    async fn insert_fixture(&self, fixture: &Fixture) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.note_write()?;
        inner.fixtures.insert(fixture.id.clone(), fixture.clone());
        Ok(())
    }

    async fn set_final_score(&self, fixture_id: &str, score: Score) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.note_write()?;
        if let Some(fixture) = inner.fixtures.get_mut(fixture_id) {
            fixture.final_score = Some(score);
        }
        Ok(())
    }

    async fn list_fixtures(&self) -> Result<Vec<Fixture>> {
        let inner = self.inner.lock();
        let mut fixtures: Vec<Fixture> = inner.fixtures.values().cloned().collect();
        fixtures.sort_by(|a, b| (Reverse(a.kickoff_at), &a.id).cmp(&(Reverse(b.kickoff_at), &b.id)));
        Ok(fixtures)
    }
}

#[async_trait]
impl GuessStore for MemoryStore {
    async fn insert_guess(&self, guess: &Guess) -> Result<bool> {
        let mut inner = self.inner.lock();
        inner.note_write()?;

        let duplicate = inner.guesses.values().any(|existing| {
            existing.participant_id == guess.participant_id
                && existing.fixture_id == guess.fixture_id
        });
        if duplicate {
            return Ok(false);
        }

        inner.guesses.insert(guess.id.clone(), guess.clone());
        Ok(true)
    }

    async fn guesses_for_fixture(&self, fixture_id: &str) -> Result<Vec<Guess>> {
        let inner = self.inner.lock();
        let mut guesses: Vec<Guess> = inner
            .guesses
            .values()
            .filter(|g| g.fixture_id == fixture_id)
            .cloned()
            .collect();
        guesses.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(guesses)
    }

    async fn guesses_for_participant(&self, participant_id: &str) -> Result<Vec<Guess>> {
        let inner = self.inner.lock();
        let mut guesses: Vec<Guess> = inner
            .guesses
            .values()
            .filter(|g| g.participant_id == participant_id)
            .cloned()
            .collect();
        guesses.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(guesses)
    }

    async fn set_awarded_points(&self, guess_id: &str, points: i64) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.note_write()?;
        if let Some(guess) = inner.guesses.get_mut(guess_id) {
            guess.awarded_points = Some(points);
        }
        Ok(())
    }
}

#[async_trait]
impl ParticipantStore for MemoryStore {
    async fn participant_by_id(&self, participant_id: &str) -> Result<Option<Participant>> {
        Ok(self.inner.lock().participants.get(participant_id).cloned())
    }

    async fn participants_of_pool(&self, pool_id: &str) -> Result<Vec<Participant>> {
        let inner = self.inner.lock();
        let mut participants: Vec<Participant> = inner
            .participants
            .values()
            .filter(|p| p.pool_id == pool_id)
            .cloned()
            .collect();
        participants.sort_by_key(|p| p.join_seq);
        Ok(participants)
    }

    async fn add_participant(&self, pool_id: &str, user_id: &str) -> Result<Participant> {
        let mut inner = self.inner.lock();
        inner.note_write()?;

        if inner
            .participants
            .values()
            .any(|p| p.pool_id == pool_id && p.user_id == user_id)
        {
            return Err(anyhow!("user {} already in pool {}", user_id, pool_id));
        }

        let join_seq = inner
            .participants
            .values()
            .filter(|p| p.pool_id == pool_id)
            .map(|p| p.join_seq)
            .max()
            .unwrap_or(0)
            + 1;

        let participant = Participant {
            id: Uuid::new_v4().to_string(),
            pool_id: pool_id.to_string(),
            user_id: user_id.to_string(),
            join_seq,
            total_points: 0,
            joined_at: Utc::now(),
        };
        inner
            .participants
            .insert(participant.id.clone(), participant.clone());
        Ok(participant)
    }

    async fn set_total_points(&self, participant_id: &str, total: i64) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.note_write()?;
        if let Some(participant) = inner.participants.get_mut(participant_id) {
            participant.total_points = total;
        }
        Ok(())
    }
}

#[async_trait]
impl PoolStore for MemoryStore {
    async fn pool_by_id(&self, pool_id: &str) -> Result<Option<Pool>> {
        Ok(self.inner.lock().pools.get(pool_id).cloned())
    }

    async fn create_pool(&self, title: &str) -> Result<Pool> {
        let mut inner = self.inner.lock();
        inner.note_write()?;

        let pool = Pool {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            created_at: Utc::now(),
        };
        inner.pools.insert(pool.id.clone(), pool.clone());
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn duplicate_guess_is_ignored() {
        let store = MemoryStore::new();
        let pool = store.create_pool("office pool").await.unwrap();
        let alice = store.add_participant(&pool.id, "alice").await.unwrap();
        let fx = Fixture::new("Germany", "Brazil", Utc::now() + Duration::hours(2));
        store.insert_fixture(&fx).await.unwrap();

        let first = Guess::new(&fx.id, &alice.id, Score { first: 2, second: 1 });
        assert!(store.insert_guess(&first).await.unwrap());

        let second = Guess::new(&fx.id, &alice.id, Score { first: 0, second: 0 });
        assert!(!store.insert_guess(&second).await.unwrap());

        let guesses = store.guesses_for_fixture(&fx.id).await.unwrap();
        assert_eq!(guesses.len(), 1);
        assert_eq!(guesses[0].predicted, Score { first: 2, second: 1 });
    }

    #[tokio::test]
    async fn write_budget_trips_after_allowed_writes() {
        let store = MemoryStore::new();
        let pool = store.create_pool("office pool").await.unwrap();

        store.fail_after_writes(1);
        store.add_participant(&pool.id, "alice").await.unwrap();
        let err = store.add_participant(&pool.id, "bob").await.unwrap_err();
        assert!(err.to_string().contains("injected write failure"));

        // Reads keep working while writes fail.
        let members = store.participants_of_pool(&pool.id).await.unwrap();
        assert_eq!(members.len(), 1);

        store.clear_write_failures();
        store.add_participant(&pool.id, "bob").await.unwrap();
        assert_eq!(store.participants_of_pool(&pool.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn join_seq_assigned_in_arrival_order() {
        let store = MemoryStore::new();
        let pool = store.create_pool("office pool").await.unwrap();

        let alice = store.add_participant(&pool.id, "alice").await.unwrap();
        let bob = store.add_participant(&pool.id, "bob").await.unwrap();
        assert_eq!(alice.join_seq, 1);
        assert_eq!(bob.join_seq, 2);

        let members = store.participants_of_pool(&pool.id).await.unwrap();
        let ids: Vec<_> = members.iter().map(|p| p.user_id.as_str()).collect();
        assert_eq!(ids, vec!["alice", "bob"]);
    }
}
