//! Fixture settlement: record a final score, score every guess, refresh
//! every touched pool.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::engine::{validate_score, EngineError, EntityLocks, RankingService};
use crate::models::Score;
use crate::scoring;
use crate::store::Store;

/// What one `settle` call did.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementSummary {
    pub fixture_id: String,
    pub final_score: Score,
    pub guesses_scored: usize,
    pub pools_recomputed: usize,
    /// True when the fixture already carried this exact score; the cycle
    /// still ran, rewriting identical values.
    pub already_settled: bool,
}

pub struct SettlementEngine {
    store: Arc<dyn Store>,
    ranking: Arc<RankingService>,
    fixture_locks: Arc<EntityLocks>,
}

impl SettlementEngine {
    /// `fixture_locks` is shared with guess placement, which takes the
    /// same lock to keep its open-window check and insert consistent with
    /// a settlement running on the fixture.
    pub fn new(
        store: Arc<dyn Store>,
        ranking: Arc<RankingService>,
        fixture_locks: Arc<EntityLocks>,
    ) -> Self {
        Self {
            store,
            ranking,
            fixture_locks,
        }
    }

    /// Settle a fixture with its final score.
    ///
    /// Safe to retry: the full write cycle runs even when the fixture
    /// already carries this exact score, rewriting every award and total
    /// with identical values. A retry after a mid-settlement store failure
    /// therefore completes whatever the failed run left unscored;
    /// `already_settled` in the summary reports the repeat. Settling with
    /// a *different* score is a correction: every guess is re-scored
    /// against the new result and every touched pool's totals are rebuilt,
    /// so nothing from the earlier settlement survives.
    ///
    /// Calls for the same fixture serialize on a per-fixture lock; calls
    /// for different fixtures run in parallel. Any store failure aborts the
    /// remaining steps and surfaces to the caller.
    pub async fn settle(
        &self,
        fixture_id: &str,
        final_score: Score,
    ) -> Result<SettlementSummary, EngineError> {
        validate_score(final_score)?;

        let _guard = self.fixture_locks.acquire(fixture_id).await;

        let fixture = self
            .store
            .fixture_by_id(fixture_id)
            .await?
            .ok_or_else(|| EngineError::not_found("fixture", fixture_id))?;

        // A repeated score does not short-circuit: the cycle re-runs with
        // identical values, so an award a previously failed run never
        // wrote gets written now.
        let already_settled = fixture.final_score == Some(final_score);
        match fixture.final_score {
            Some(previous) if previous != final_score => info!(
                "correcting fixture {} result: {} -> {}",
                fixture_id, previous, final_score
            ),
            Some(_) => debug!(
                "fixture {} already settled at {}, re-confirming every award",
                fixture_id, final_score
            ),
            None => {}
        }

        self.store.set_final_score(fixture_id, final_score).await?;

        let guesses = self.store.guesses_for_fixture(fixture_id).await?;
        let mut touched_pools = BTreeSet::new();
        for guess in &guesses {
            let points = scoring::award_points(guess.predicted, final_score);
            self.store.set_awarded_points(&guess.id, points).await?;

            match self.store.participant_by_id(&guess.participant_id).await? {
                Some(participant) => {
                    touched_pools.insert(participant.pool_id);
                }
                None => warn!(
                    "guess {} references missing participant {}",
                    guess.id, guess.participant_id
                ),
            }
        }

        // BTreeSet gives a stable pool order, so two settlements touching
        // the same pools take the pool locks in the same sequence.
        for pool_id in &touched_pools {
            self.ranking.recompute(pool_id).await?;
        }

        info!(
            "⚽ settled fixture {} at {} ({} guesses, {} pools)",
            fixture_id,
            final_score,
            guesses.len(),
            touched_pools.len()
        );

        Ok(SettlementSummary {
            fixture_id: fixture_id.to_string(),
            final_score,
            guesses_scored: guesses.len(),
            pools_recomputed: touched_pools.len(),
            already_settled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Fixture, Guess};
    use crate::store::{FixtureStore, GuessStore, MemoryStore, ParticipantStore, PoolStore};
    use chrono::{Duration, Utc};

    struct Scenario {
        store: Arc<MemoryStore>,
        engine: SettlementEngine,
        pool_id: String,
        fixture_id: String,
        exact: String,   // participant who predicted 2:1
        drawish: String, // participant who predicted 1:1
    }

    /// Germany vs Brazil, one guess predicting 2:1, one predicting 1:1.
    async fn scenario() -> Scenario {
        let store = Arc::new(MemoryStore::new());
        let ranking = Arc::new(RankingService::new(store.clone()));
        let engine = SettlementEngine::new(store.clone(), ranking, Arc::new(EntityLocks::new()));

        let pool = store.create_pool("office pool").await.unwrap();
        let alice = store.add_participant(&pool.id, "alice").await.unwrap();
        let bob = store.add_participant(&pool.id, "bob").await.unwrap();

        let fx = Fixture::new("Germany", "Brazil", Utc::now() + Duration::hours(1));
        store.insert_fixture(&fx).await.unwrap();

        store
            .insert_guess(&Guess::new(&fx.id, &alice.id, Score::new(2, 1)))
            .await
            .unwrap();
        store
            .insert_guess(&Guess::new(&fx.id, &bob.id, Score::new(1, 1)))
            .await
            .unwrap();

        Scenario {
            store,
            engine,
            pool_id: pool.id,
            fixture_id: fx.id,
            exact: alice.id,
            drawish: bob.id,
        }
    }

    async fn awards(store: &MemoryStore, fixture_id: &str) -> Vec<(String, Option<i64>)> {
        store
            .guesses_for_fixture(fixture_id)
            .await
            .unwrap()
            .into_iter()
            .map(|g| (g.participant_id, g.awarded_points))
            .collect()
    }

    async fn total(store: &MemoryStore, participant_id: &str) -> i64 {
        store
            .participant_by_id(participant_id)
            .await
            .unwrap()
            .unwrap()
            .total_points
    }

    #[tokio::test]
    async fn settlement_scores_guesses_and_totals() {
        let s = scenario().await;

        let summary = s.engine.settle(&s.fixture_id, Score::new(2, 1)).await.unwrap();
        assert!(!summary.already_settled);
        assert_eq!(summary.guesses_scored, 2);
        assert_eq!(summary.pools_recomputed, 1);

        // Exact prediction earns 3; a predicted draw against a win earns 0.
        for (participant_id, points) in awards(&s.store, &s.fixture_id).await {
            if participant_id == s.exact {
                assert_eq!(points, Some(3));
            } else {
                assert_eq!(points, Some(0));
            }
        }
        assert_eq!(total(&s.store, &s.exact).await, 3);
        assert_eq!(total(&s.store, &s.drawish).await, 0);
    }

    #[tokio::test]
    async fn repeat_settlement_changes_nothing() {
        let s = scenario().await;

        s.engine.settle(&s.fixture_id, Score::new(2, 1)).await.unwrap();
        let before = awards(&s.store, &s.fixture_id).await;

        // The repeat re-runs the cycle with identical values; only the
        // summary flag tells it apart from the first call.
        let summary = s.engine.settle(&s.fixture_id, Score::new(2, 1)).await.unwrap();
        assert!(summary.already_settled);
        assert_eq!(summary.guesses_scored, 2);
        assert_eq!(summary.pools_recomputed, 1);

        assert_eq!(awards(&s.store, &s.fixture_id).await, before);
        assert_eq!(total(&s.store, &s.exact).await, 3);
        assert_eq!(total(&s.store, &s.drawish).await, 0);
    }

    #[tokio::test]
    async fn correction_leaves_no_residue() {
        let s = scenario().await;

        s.engine.settle(&s.fixture_id, Score::new(2, 1)).await.unwrap();
        assert_eq!(total(&s.store, &s.exact).await, 3);

        // Result corrected to a draw: the old 3-point award must vanish.
        let summary = s.engine.settle(&s.fixture_id, Score::new(1, 1)).await.unwrap();
        assert!(!summary.already_settled);

        for (participant_id, points) in awards(&s.store, &s.fixture_id).await {
            if participant_id == s.drawish {
                assert_eq!(points, Some(3));
            } else {
                // 2:1 predicted a home win, actual is a draw.
                assert_eq!(points, Some(0));
            }
        }
        assert_eq!(total(&s.store, &s.exact).await, 0);
        assert_eq!(total(&s.store, &s.drawish).await, 3);
    }

    #[tokio::test]
    async fn unknown_fixture_is_not_found() {
        let s = scenario().await;

        let err = s.engine.settle("missing", Score::new(1, 0)).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::NotFound {
                entity: "fixture",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn negative_score_is_rejected_without_side_effects() {
        let s = scenario().await;

        let err = s.engine.settle(&s.fixture_id, Score::new(-1, 0)).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));

        let fx = s.store.fixture_by_id(&s.fixture_id).await.unwrap().unwrap();
        assert!(!fx.is_settled());
        assert!(awards(&s.store, &s.fixture_id)
            .await
            .iter()
            .all(|(_, points)| points.is_none()));
    }

    #[tokio::test]
    async fn store_failure_aborts_remaining_writes() {
        let s = scenario().await;

        // Allow the final-score write and the first award, then fail. The
        // second award and all totals must never be written.
        s.store.fail_after_writes(2);
        let err = s.engine.settle(&s.fixture_id, Score::new(2, 1)).await.unwrap_err();
        assert!(matches!(err, EngineError::Persistence(_)));

        let scored: Vec<_> = awards(&s.store, &s.fixture_id)
            .await
            .into_iter()
            .filter(|(_, points)| points.is_some())
            .collect();
        assert_eq!(scored.len(), 1);
        assert_eq!(total(&s.store, &s.exact).await, 0);
        assert_eq!(total(&s.store, &s.drawish).await, 0);
    }

    #[tokio::test]
    async fn same_score_retry_repairs_a_torn_settlement() {
        let s = scenario().await;

        // A failure between the final-score write and the award writes
        // leaves the fixture settled with an unscored guess behind it.
        s.store.fail_after_writes(2);
        s.engine.settle(&s.fixture_id, Score::new(2, 1)).await.unwrap_err();
        let fx = s.store.fixture_by_id(&s.fixture_id).await.unwrap().unwrap();
        assert!(fx.is_settled());
        assert!(awards(&s.store, &s.fixture_id)
            .await
            .iter()
            .any(|(_, points)| points.is_none()));

        // The retry carries the score the fixture already holds; it must
        // still write every award and total, not skip the torn state.
        s.store.clear_write_failures();
        let summary = s.engine.settle(&s.fixture_id, Score::new(2, 1)).await.unwrap();
        assert!(summary.already_settled);
        assert_eq!(summary.guesses_scored, 2);

        assert!(awards(&s.store, &s.fixture_id)
            .await
            .iter()
            .all(|(_, points)| points.is_some()));
        assert_eq!(total(&s.store, &s.exact).await, 3);
        assert_eq!(total(&s.store, &s.drawish).await, 0);
    }

    #[tokio::test]
    async fn concurrent_settles_of_one_fixture_serialize() {
        let s = scenario().await;
        let engine = Arc::new(s.engine);

        // Race an original result against a correction. Whichever order the
        // lock imposes, the awards must be consistent with the fixture's
        // final score afterwards — never a torn mix.
        let e1 = engine.clone();
        let id1 = s.fixture_id.clone();
        let t1 = tokio::spawn(async move { e1.settle(&id1, Score::new(2, 1)).await });
        let e2 = engine.clone();
        let id2 = s.fixture_id.clone();
        let t2 = tokio::spawn(async move { e2.settle(&id2, Score::new(0, 0)).await });

        t1.await.unwrap().unwrap();
        t2.await.unwrap().unwrap();

        let fx = s.store.fixture_by_id(&s.fixture_id).await.unwrap().unwrap();
        let final_score = fx.final_score.unwrap();
        for guess in s.store.guesses_for_fixture(&s.fixture_id).await.unwrap() {
            assert_eq!(
                guess.awarded_points,
                Some(crate::scoring::award_points(guess.predicted, final_score))
            );
        }
    }

    #[tokio::test]
    async fn settlement_reaches_every_touched_pool() {
        let store = Arc::new(MemoryStore::new());
        let ranking = Arc::new(RankingService::new(store.clone()));
        let engine = SettlementEngine::new(store.clone(), ranking, Arc::new(EntityLocks::new()));

        // Two pools guess the same fixture.
        let pool_a = store.create_pool("pool a").await.unwrap();
        let pool_b = store.create_pool("pool b").await.unwrap();
        let alice = store.add_participant(&pool_a.id, "alice").await.unwrap();
        let carol = store.add_participant(&pool_b.id, "carol").await.unwrap();

        let fx = Fixture::new("Germany", "Brazil", Utc::now() + Duration::hours(1));
        store.insert_fixture(&fx).await.unwrap();
        store
            .insert_guess(&Guess::new(&fx.id, &alice.id, Score::new(2, 1)))
            .await
            .unwrap();
        store
            .insert_guess(&Guess::new(&fx.id, &carol.id, Score::new(3, 1)))
            .await
            .unwrap();

        let summary = engine.settle(&fx.id, Score::new(2, 1)).await.unwrap();
        assert_eq!(summary.pools_recomputed, 2);
        assert_eq!(total(&store, &alice.id).await, 3);
        assert_eq!(total(&store, &carol.id).await, 1);
    }
}
