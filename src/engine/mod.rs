//! Settlement & Ranking Engine
//!
//! This module handles:
//! 1. Recording a fixture's final score and scoring every guess against it
//! 2. Full recomputation of per-participant totals in every touched pool
//! 3. The rank read path (persisted totals, deterministic tie-break)
//!
//! Architecture:
//! - All state lives behind the store traits; the engine is read/compute/write
//! - Per-fixture and per-pool locks serialize conflicting operations
//! - Re-settlement overwrites, never patches, so corrections leave no residue

pub mod error;
pub mod guesses;
pub mod locks;
pub mod ranking;
pub mod settlement;

pub use error::EngineError;
pub use guesses::GuessService;
pub use locks::EntityLocks;
pub use ranking::{RankEntry, RankingService};
pub use settlement::{SettlementEngine, SettlementSummary};

use crate::models::Score;

/// Boundary check shared by settlement and guess placement. Score values
/// are plain integers everywhere below this point.
pub(crate) fn validate_score(score: Score) -> Result<(), EngineError> {
    if !score.is_non_negative() {
        return Err(EngineError::invalid(format!(
            "score values must be non-negative, got {}:{}",
            score.first, score.second
        )));
    }
    Ok(())
}
