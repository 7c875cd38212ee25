//! Pool ranking: full recomputation and the read path.

use std::cmp::Reverse;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::engine::{EngineError, EntityLocks};
use crate::models::Participant;
use crate::store::Store;

/// One row of a pool's standings. `position` is 1-based.
#[derive(Debug, Clone, Serialize)]
pub struct RankEntry {
    pub position: usize,
    pub participant_id: String,
    pub user_id: String,
    pub total_points: i64,
}

pub struct RankingService {
    store: Arc<dyn Store>,
    pool_locks: EntityLocks,
}

impl RankingService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            pool_locks: EntityLocks::new(),
        }
    }

    /// Recompute and persist every participant's total in `pool_id`, then
    /// return the fresh standings.
    ///
    /// Totals are rebuilt from scratch on every call: the sum of awarded
    /// points over exactly the participant's guesses, with unsettled guesses
    /// contributing nothing. Never an increment, so repeated settlements and
    /// corrections cannot drift. The pool lock is held across the whole
    /// read/compute/write cycle so two recomputes of one pool cannot
    /// interleave and persist stale totals out of order.
    pub async fn recompute(&self, pool_id: &str) -> Result<Vec<RankEntry>, EngineError> {
        let _guard = self.pool_locks.acquire(pool_id).await;

        self.store
            .pool_by_id(pool_id)
            .await?
            .ok_or_else(|| EngineError::not_found("pool", pool_id))?;

        let mut participants = self.store.participants_of_pool(pool_id).await?;
        for participant in &mut participants {
            let guesses = self.store.guesses_for_participant(&participant.id).await?;
            let total: i64 = guesses.iter().filter_map(|g| g.awarded_points).sum();
            self.store.set_total_points(&participant.id, total).await?;
            participant.total_points = total;
        }

        debug!(
            "🏆 recomputed ranking for pool {} ({} participants)",
            pool_id,
            participants.len()
        );
        Ok(Self::order(participants))
    }

    /// Current standings from persisted totals. Pure read: no lock, no
    /// recomputation, so repeated calls with no settlement in between return
    /// identical sequences.
    pub async fn standings(&self, pool_id: &str) -> Result<Vec<RankEntry>, EngineError> {
        self.store
            .pool_by_id(pool_id)
            .await?
            .ok_or_else(|| EngineError::not_found("pool", pool_id))?;

        let participants = self.store.participants_of_pool(pool_id).await?;
        Ok(Self::order(participants))
    }

    // Descending by total, ties broken by earliest join. join_seq is unique
    // per pool, so the order is total.
    fn order(mut participants: Vec<Participant>) -> Vec<RankEntry> {
        participants.sort_by_key(|p| (Reverse(p.total_points), p.join_seq));
        participants
            .into_iter()
            .enumerate()
            .map(|(idx, p)| RankEntry {
                position: idx + 1,
                participant_id: p.id,
                user_id: p.user_id,
                total_points: p.total_points,
            })
            .collect()
    }
}
