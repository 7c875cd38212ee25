//! Guess scoring rules.
//!
//! One three-tier rule, applied uniformly at settlement time:
//! exact score → 3, correct outcome (winner or draw) → 1, anything else → 0.

use crate::models::Score;

/// Points for predicting the exact final score.
pub const EXACT_SCORE_POINTS: i64 = 3;

/// Points for predicting the right outcome with the wrong score.
pub const OUTCOME_POINTS: i64 = 1;

/// Score a prediction against a final result.
///
/// Rules are evaluated in order, first hit wins:
/// 1. Prediction matches the final score exactly → [`EXACT_SCORE_POINTS`].
/// 2. Prediction and result agree on the outcome — same winning side, or
///    both draws → [`OUTCOME_POINTS`].
/// 3. Otherwise → 0.
///
/// Pure function; inputs are assumed non-negative (validated by callers).
pub fn award_points(predicted: Score, actual: Score) -> i64 {
    if predicted == actual {
        return EXACT_SCORE_POINTS;
    }
    if predicted.tendency() == actual.tendency() {
        return OUTCOME_POINTS;
    }
    0
}
