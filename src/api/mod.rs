use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::error::EngineError;
use crate::models::{ApiResponse, Fixture, FixtureForecast, Market, OddsMap, Outcome, VenueContext};
use crate::services::artifact::save_model_set;
use crate::services::{train_all, ForestParams, PredictionEngine, TrainingParams, TrainingReport};

#[derive(Clone)]
pub struct AppState {
    pub engine: PredictionEngine,
    pub config: Arc<AppConfig>,
    pub params: TrainingParams,
    /// Held while a re-train runs; a second request is refused
    training: Arc<tokio::sync::Mutex<()>>,
}

impl AppState {
    pub fn new(engine: PredictionEngine, config: AppConfig, params: TrainingParams) -> Self {
        Self {
            engine,
            config: Arc::new(config),
            params,
            training: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let port = state.config.port;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!("Glitch API server listening on port {}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/teams", get(list_teams_handler))
        .route("/models", get(list_models_handler))
        .route("/predict", post(predict_handler))
        .route("/train", post(train_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Engine failure rendered as a status code plus an `ApiResponse` body
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::UnknownTeam(_) => StatusCode::NOT_FOUND,
            EngineError::InvalidParams(_)
            | EngineError::EmptyDataset { .. }
            | EngineError::InsufficientTrainingData { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::NoModels | EngineError::MissingArtifact(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("Request failed: {}", err);
        } else {
            tracing::warn!("Request rejected: {}", err);
        }
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::error(self.message))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

// GET /health
#[derive(Serialize)]
struct HealthStatus {
    status: &'static str,
    matches: usize,
    teams: usize,
    models_loaded: bool,
    model_generation: u64,
}

async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthStatus>> {
    let store = state.engine.store();
    let registry = state.engine.registry();
    Json(ApiResponse::success(HealthStatus {
        status: "ok",
        matches: store.len(),
        teams: store.teams().len(),
        models_loaded: registry.snapshot().is_some(),
        model_generation: registry.generation(),
    }))
}

// GET /teams
async fn list_teams_handler(State(state): State<AppState>) -> Json<ApiResponse<Vec<String>>> {
    Json(ApiResponse::success(state.engine.known_teams()))
}

// GET /models
#[derive(Serialize)]
struct ModelSummary {
    market: Market,
    outcomes: Vec<Outcome>,
    trained_from: NaiveDate,
    trained_to: NaiveDate,
    train_rows: usize,
    seed: u64,
    test_accuracy: Option<f64>,
}

#[derive(Serialize)]
struct ModelsOverview {
    generation: u64,
    published_at: Option<DateTime<Utc>>,
    window: usize,
    markets: Vec<ModelSummary>,
}

async fn list_models_handler(State(state): State<AppState>) -> ApiResult<ModelsOverview> {
    let registry = state.engine.registry();
    let models = registry.snapshot().ok_or(EngineError::NoModels)?;
    let markets = models
        .models()
        .iter()
        .map(|m| ModelSummary {
            market: m.market,
            outcomes: m.market.outcomes().to_vec(),
            trained_from: m.metadata.trained_from,
            trained_to: m.metadata.trained_to,
            train_rows: m.metadata.train_rows,
            seed: m.metadata.seed,
            test_accuracy: m.evaluation.as_ref().map(|e| e.accuracy),
        })
        .collect();

    Ok(Json(ApiResponse::success(ModelsOverview {
        generation: registry.generation(),
        published_at: registry.published_at(),
        window: models.window(),
        markets,
    })))
}

// POST /predict
#[derive(Deserialize)]
struct PredictRequest {
    home_team: String,
    away_team: String,
    /// Defaults to today
    as_of_date: Option<NaiveDate>,
    #[serde(default)]
    venue_context: VenueContext,
    /// Decimal odds keyed by outcome name, e.g. {"home": 2.1, "over_2_5": 1.9}
    #[serde(default)]
    odds: HashMap<String, f64>,
}

fn parse_odds(raw: &HashMap<String, f64>) -> Result<OddsMap, ApiError> {
    raw.iter()
        .map(|(key, price)| {
            key.parse::<Outcome>()
                .map(|outcome| (outcome, *price))
                .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e))
        })
        .collect()
}

async fn predict_handler(
    State(state): State<AppState>,
    Json(request): Json<PredictRequest>,
) -> ApiResult<FixtureForecast> {
    let odds = parse_odds(&request.odds)?;
    let fixture = Fixture {
        home_team: request.home_team.trim().to_string(),
        away_team: request.away_team.trim().to_string(),
        as_of_date: request.as_of_date.unwrap_or_else(|| Utc::now().date_naive()),
        venue_context: request.venue_context,
    };
    let odds = (!odds.is_empty()).then_some(odds);

    let forecast = state.engine.predict_fixture(&fixture, odds.as_ref())?;
    Ok(Json(ApiResponse::success(forecast)))
}

// POST /train
#[derive(Deserialize, Default)]
#[serde(default)]
struct TrainRequest {
    seed: Option<u64>,
    window: Option<usize>,
    split_ratio: Option<f64>,
    n_trees: Option<usize>,
    max_depth: Option<usize>,
}

impl TrainRequest {
    fn apply(&self, base: TrainingParams) -> TrainingParams {
        let mut params = base;
        if let Some(seed) = self.seed {
            params.seed = seed;
        }
        if let Some(window) = self.window {
            params.window = window;
        }
        if let Some(ratio) = self.split_ratio {
            params.split_ratio = ratio;
        }
        if self.n_trees.is_some() || self.max_depth.is_some() {
            let forest = ForestParams {
                n_trees: self.n_trees.unwrap_or(params.match_result.n_trees),
                max_depth: self.max_depth.unwrap_or(params.match_result.max_depth),
                ..params.match_result
            };
            params = params.with_forest(forest);
        }
        params
    }
}

#[derive(Serialize)]
struct TrainResponse {
    generation: u64,
    saved_to: Option<String>,
    report: TrainingReport,
}

async fn train_handler(State(state): State<AppState>, body: Bytes) -> ApiResult<TrainResponse> {
    let request: TrainRequest = if body.is_empty() {
        TrainRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, format!("invalid training request: {}", e)))?
    };
    let params = request.apply(state.params);

    let _guard = state
        .training
        .try_lock()
        .map_err(|_| ApiError::new(StatusCode::CONFLICT, "a training run is already in progress"))?;

    tracing::info!("Re-training models (seed {}, window {})", params.seed, params.window);
    let store = state.engine.store().clone();
    let outcome = tokio::task::spawn_blocking(move || train_all(&store, &params))
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("training task failed: {}", e)))??;

    let model_dir = state.config.model_dir.clone();
    let models = outcome.models;
    let (models, saved) = tokio::task::spawn_blocking(move || {
        let saved = save_model_set(&models, &model_dir);
        (models, saved.map(|_| model_dir))
    })
    .await
    .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("save task failed: {}", e)))?;

    let saved_to = match saved {
        Ok(dir) => Some(dir.display().to_string()),
        Err(e) => {
            tracing::warn!("Trained models were not saved: {}", e);
            None
        }
    };
    let generation = state.engine.registry().publish(models);

    Ok(Json(ApiResponse::success(TrainResponse {
        generation,
        saved_to,
        report: outcome.report,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::services::{MatchStore, ModelRegistry};

    fn state(model_dir: &std::path::Path) -> AppState {
        let engine = PredictionEngine::new(
            Arc::new(MatchStore::from_records(Vec::new())),
            Arc::new(ModelRegistry::new()),
        );
        let config = AppConfig {
            model_dir: model_dir.to_path_buf(),
            ..AppConfig::default()
        };
        AppState::new(engine, config, TrainingParams::default())
    }

    #[tokio::test]
    async fn concurrent_train_is_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let _running = state.training.try_lock().unwrap();

        let request = Request::builder()
            .method("POST")
            .uri("/train")
            .body(Body::empty())
            .unwrap();
        let response = create_router(state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("already in progress"));
        assert_eq!(state.engine.registry().generation(), 0);
        assert!(!dir.path().join("manifest.json").exists());
    }
}
