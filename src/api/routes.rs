use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::engine::{
    EngineError, EntityLocks, GuessService, RankEntry, RankingService, SettlementEngine,
    SettlementSummary,
};
use crate::models::{Fixture, Guess, Score};
use crate::store::Store;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub settlement: Arc<SettlementEngine>,
    pub ranking: Arc<RankingService>,
    pub guesses: Arc<GuessService>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let ranking = Arc::new(RankingService::new(store.clone()));
        // One lock registry for settlement and guess placement, so both
        // serialize on the same fixture.
        let fixture_locks = Arc::new(EntityLocks::new());
        let settlement = Arc::new(SettlementEngine::new(
            store.clone(),
            ranking.clone(),
            fixture_locks.clone(),
        ));
        let guesses = Arc::new(GuessService::new(store.clone(), fixture_locks));
        Self {
            store,
            settlement,
            ranking,
            guesses,
        }
    }
}

/// Create the API router
pub fn create_router(store: Arc<dyn Store>) -> Router {
    let state = AppState::new(store);

    Router::new()
        .route("/health", get(health_check))
        .route("/fixtures", post(create_fixture))
        .route("/fixtures/:fixture_id/score", put(settle_fixture))
        .route("/pools/:pool_id/fixtures", get(get_pool_fixtures))
        .route(
            "/pools/:pool_id/fixtures/:fixture_id/guesses",
            post(place_guess),
        )
        .route("/pools/:pool_id/ranking", get(get_ranking))
        .with_state(state)
}

// ===== Route Handlers =====

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Schedule a fixture
async fn create_fixture(
    State(state): State<AppState>,
    Json(req): Json<CreateFixtureRequest>,
) -> Result<(StatusCode, Json<Fixture>), ApiError> {
    if req.first_team.trim().is_empty() || req.second_team.trim().is_empty() {
        return Err(ApiError::BadRequest("team names must be non-empty".to_string()));
    }

    let fixture = Fixture::new(req.first_team.trim(), req.second_team.trim(), req.kickoff_at);
    state.store.insert_fixture(&fixture).await?;
    Ok((StatusCode::CREATED, Json(fixture)))
}

/// Record a fixture's final score and settle every guess against it
async fn settle_fixture(
    State(state): State<AppState>,
    Path(fixture_id): Path<String>,
    Json(req): Json<ScoreRequest>,
) -> Result<Json<SettlementSummary>, ApiError> {
    let summary = state
        .settlement
        .settle(&fixture_id, Score::new(req.first, req.second))
        .await?;
    Ok(Json(summary))
}

/// List fixtures, optionally with one participant's guesses attached
async fn get_pool_fixtures(
    State(state): State<AppState>,
    Path(pool_id): Path<String>,
    Query(params): Query<FixtureQuery>,
) -> Result<Json<FixturesResponse>, ApiError> {
    state
        .store
        .pool_by_id(&pool_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("pool not found: {}", pool_id)))?;

    let fixtures = state.store.list_fixtures().await?;

    let mut guesses_by_fixture = std::collections::HashMap::new();
    if let Some(participant_id) = &params.participant_id {
        let participant = state
            .store
            .participant_by_id(participant_id)
            .await?
            .ok_or_else(|| {
                ApiError::NotFound(format!("participant not found: {}", participant_id))
            })?;
        if participant.pool_id != pool_id {
            return Err(ApiError::BadRequest(format!(
                "participant {} does not belong to pool {}",
                participant_id, pool_id
            )));
        }
        for guess in state.store.guesses_for_participant(participant_id).await? {
            guesses_by_fixture.insert(guess.fixture_id.clone(), guess);
        }
    }

    let now = Utc::now();
    let fixtures: Vec<FixtureEntry> = fixtures
        .into_iter()
        .map(|fixture| {
            let guess = guesses_by_fixture.remove(&fixture.id);
            let expired = fixture.guessing_closed(now);
            FixtureEntry {
                fixture,
                guess,
                expired,
            }
        })
        .collect();

    Ok(Json(FixturesResponse {
        count: fixtures.len(),
        fixtures,
    }))
}

/// Place a prediction for a fixture
async fn place_guess(
    State(state): State<AppState>,
    Path((pool_id, fixture_id)): Path<(String, String)>,
    Json(req): Json<PlaceGuessRequest>,
) -> Result<(StatusCode, Json<Guess>), ApiError> {
    let guess = state
        .guesses
        .place(
            &pool_id,
            &req.participant_id,
            &fixture_id,
            Score::new(req.first, req.second),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(guess)))
}

/// Current standings of a pool
async fn get_ranking(
    State(state): State<AppState>,
    Path(pool_id): Path<String>,
) -> Result<Json<RankingResponse>, ApiError> {
    let ranking = state.ranking.standings(&pool_id).await?;
    Ok(Json(RankingResponse {
        count: ranking.len(),
        ranking,
    }))
}

// ===== Request/Response Types =====

#[derive(Deserialize)]
struct CreateFixtureRequest {
    first_team: String,
    second_team: String,
    kickoff_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ScoreRequest {
    first: i64,
    second: i64,
}

#[derive(Deserialize)]
struct FixtureQuery {
    /// Attach this participant's guesses to the listed fixtures
    participant_id: Option<String>,
}

#[derive(Deserialize)]
struct PlaceGuessRequest {
    participant_id: String,
    first: i64,
    second: i64,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct FixtureEntry {
    #[serde(flatten)]
    fixture: Fixture,
    guess: Option<Guess>,
    /// Guessing window closed (kickoff passed or fixture settled)
    expired: bool,
}

#[derive(Serialize)]
struct FixturesResponse {
    count: usize,
    fixtures: Vec<FixtureEntry>,
}

#[derive(Serialize)]
struct RankingResponse {
    count: usize,
    ranking: Vec<RankEntry>,
}

// ===== Error Handling =====

#[derive(Debug)]
enum ApiError {
    Database(anyhow::Error),
    NotFound(String),
    BadRequest(String),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Database(err)
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            EngineError::InvalidInput(msg) => ApiError::BadRequest(msg),
            EngineError::Persistence(err) => ApiError::Database(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Database(err) => {
                tracing::error!("Database error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
