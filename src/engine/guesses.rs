//! Guess placement.
//!
//! Predictions are immutable once placed: one guess per participant per
//! fixture, accepted only while the fixture is open (before kickoff, never
//! after settlement).

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::engine::{validate_score, EngineError, EntityLocks};
use crate::models::{Guess, Score};
use crate::store::Store;

pub struct GuessService {
    store: Arc<dyn Store>,
    fixture_locks: Arc<EntityLocks>,
}

impl GuessService {
    /// `fixture_locks` is the registry the settlement engine locks on, so
    /// a placement and a settlement of the same fixture never interleave.
    pub fn new(store: Arc<dyn Store>, fixture_locks: Arc<EntityLocks>) -> Self {
        Self {
            store,
            fixture_locks,
        }
    }

    pub async fn place(
        &self,
        pool_id: &str,
        participant_id: &str,
        fixture_id: &str,
        predicted: Score,
    ) -> Result<Guess, EngineError> {
        validate_score(predicted)?;

        let pool = self
            .store
            .pool_by_id(pool_id)
            .await?
            .ok_or_else(|| EngineError::not_found("pool", pool_id))?;

        let participant = self
            .store
            .participant_by_id(participant_id)
            .await?
            .ok_or_else(|| EngineError::not_found("participant", participant_id))?;
        if participant.pool_id != pool.id {
            return Err(EngineError::invalid(format!(
                "participant {} does not belong to pool {}",
                participant_id, pool_id
            )));
        }

        // Settlement holds the same lock for its whole write cycle, so the
        // fixture cannot settle between the open check and the insert.
        let _guard = self.fixture_locks.acquire(fixture_id).await;

        let fixture = self
            .store
            .fixture_by_id(fixture_id)
            .await?
            .ok_or_else(|| EngineError::not_found("fixture", fixture_id))?;
        if fixture.guessing_closed(Utc::now()) {
            return Err(EngineError::invalid(format!(
                "guessing for fixture {} is closed",
                fixture_id
            )));
        }

        let guess = Guess::new(&fixture.id, &participant.id, predicted);
        if !self.store.insert_guess(&guess).await? {
            return Err(EngineError::invalid(format!(
                "participant {} already guessed fixture {}",
                participant_id, fixture_id
            )));
        }

        debug!(
            "guess placed: {} predicts {} for {} vs {}",
            participant.user_id, predicted, fixture.first_team, fixture.second_team
        );
        Ok(guess)
    }
}
