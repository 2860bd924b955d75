use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use leo_db::{RecordStore, StoreError};
use leo_models::{
    CalibrationWeight, Fixture, HeadToHead, LeoError, MatchResult, PerformanceReport,
    PredictionDecision, PredictionInputs, TeamForm,
};
use leo_services::{ConfidenceCalibrator, EngineMetrics, OutcomeReviewLoop, PredictionService, ReviewSummary};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub predictions: Arc<PredictionService>,
    pub review: Arc<OutcomeReviewLoop>,
    pub store: Arc<dyn RecordStore>,
    pub calibrator: Arc<ConfidenceCalibrator>,
    pub metrics: Arc<EngineMetrics>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        predictions: Arc<PredictionService>,
        review: Arc<OutcomeReviewLoop>,
        store: Arc<dyn RecordStore>,
        calibrator: Arc<ConfidenceCalibrator>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            predictions,
            review,
            store,
            calibrator,
            metrics,
            started_at: Utc::now(),
        }
    }
}

#[derive(Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            message: None,
        })
    }

    fn with_message(data: T, message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
        })
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub uptime_seconds: i64,
}

/// Either a fixture already in the store, or a fixture with its history
/// supplied inline.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PredictRequest {
    Inline {
        fixture: Fixture,
        #[serde(default)]
        home_results: Vec<MatchResult>,
        #[serde(default)]
        away_results: Vec<MatchResult>,
        #[serde(default)]
        head_to_head: Vec<MatchResult>,
    },
    Stored {
        fixture_id: String,
    },
}

#[derive(Serialize)]
pub struct FixtureDecisions {
    pub active: Option<PredictionDecision>,
    pub history: Vec<PredictionDecision>,
}

const DEFAULT_HISTORY_LIMIT: usize = 500;

pub fn create_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_exposition))

        // Predictions
        .route("/api/v1/predictions", post(create_prediction))
        .route("/api/v1/predictions/:fixture_id", get(get_predictions_for_fixture))
        .route("/api/v1/decisions/:decision_id/confirm", post(confirm_decision))

        // Review and calibration
        .route("/api/v1/reviews/run", post(run_review_cycle))
        .route("/api/v1/calibration/weights", get(get_calibration_weights))

        // Analytics
        .route("/api/v1/analytics/performance", get(get_performance_report))
}

/// Full application router with request tracing and CORS.
pub fn router(state: AppState) -> Router {
    create_routes()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn internal_error(context: &str, e: impl std::fmt::Display) -> StatusCode {
    error!("❌ {}: {}", context, e);
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let now = Utc::now();
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: now.to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: (now - state.started_at).num_seconds(),
    })
}

async fn metrics_exposition(State(state): State<AppState>) -> Result<impl IntoResponse, StatusCode> {
    let body = state
        .metrics
        .encode()
        .map_err(|e| internal_error("metrics encoding failed", e))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}

async fn create_prediction(
    State(state): State<AppState>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<ApiResponse<PredictionDecision>>, StatusCode> {
    let result = match request {
        PredictRequest::Inline {
            fixture,
            home_results,
            away_results,
            head_to_head,
        } => {
            let as_of = fixture.kickoff;
            let inputs = PredictionInputs::new(
                TeamForm::new(fixture.home_team.clone(), home_results, as_of),
                TeamForm::new(fixture.away_team.clone(), away_results, as_of),
                HeadToHead::new(head_to_head, as_of),
            );
            state.predictions.predict(&fixture, &inputs).await
        }
        PredictRequest::Stored { fixture_id } => state.predictions.predict_fixture(&fixture_id).await,
    };

    match result {
        Ok(decision) => {
            let message = decision.status.to_string();
            Ok(ApiResponse::with_message(decision, message))
        }
        Err(e) => match e.downcast_ref::<LeoError>() {
            Some(LeoError::FixtureNotFound { .. }) => Err(StatusCode::NOT_FOUND),
            _ => Err(internal_error("prediction failed", e)),
        },
    }
}

async fn get_predictions_for_fixture(
    Path(fixture_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<FixtureDecisions>>, StatusCode> {
    let history = state
        .store
        .decisions_for(&fixture_id)
        .await
        .map_err(|e| internal_error("decision lookup failed", e))?;

    if history.is_empty() {
        return Err(StatusCode::NOT_FOUND);
    }

    let active = history.iter().find(|d| d.is_active()).cloned();
    Ok(ApiResponse::ok(FixtureDecisions { active, history }))
}

async fn confirm_decision(
    Path(decision_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<PredictionDecision>>, StatusCode> {
    match state.store.confirm_decision(decision_id).await {
        Ok(decision) => Ok(ApiResponse::ok(decision)),
        Err(StoreError::DecisionNotFound(_)) => Err(StatusCode::NOT_FOUND),
        Err(StoreError::Model(LeoError::InvalidTransition { .. })) => Err(StatusCode::CONFLICT),
        Err(e) => Err(internal_error("confirmation failed", e)),
    }
}

async fn run_review_cycle(State(state): State<AppState>) -> Result<Json<ApiResponse<ReviewSummary>>, StatusCode> {
    let summary = state
        .review
        .run_review_cycle()
        .await
        .map_err(|e| internal_error("review cycle failed", e))?;
    Ok(ApiResponse::ok(summary))
}

async fn get_calibration_weights(State(state): State<AppState>) -> Json<ApiResponse<Vec<CalibrationWeight>>> {
    let weights = state.calibrator.snapshot();
    let message = format!("{} adjusted weights", weights.len());
    ApiResponse::with_message(weights, message)
}

async fn get_performance_report(
    Query(params): Query<HistoryParams>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<PerformanceReport>>, StatusCode> {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).min(5_000);
    let decisions = state
        .store
        .recent_decisions(limit)
        .await
        .map_err(|e| internal_error("decision history failed", e))?;
    let outcomes = state
        .store
        .review_outcomes(limit)
        .await
        .map_err(|e| internal_error("review history failed", e))?;

    Ok(ApiResponse::ok(PerformanceReport::build(&decisions, &outcomes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::Duration;
    use leo_db::MemoryStore;
    use leo_ml::{GoalEstimator, LogisticMarketModel};
    use leo_models::FinalScore;
    use leo_services::{
        GuardSettings, PredictionOrchestrator, ReviewConfig, RuleBasedSelector, ThresholdTable,
    };
    use leo_stream::EventBus;
    use tower::ServiceExt;

    fn app(store: Arc<MemoryStore>) -> Router {
        let calibrator = Arc::new(ConfidenceCalibrator::default());
        let metrics = Arc::new(EngineMetrics::new().unwrap());
        let bus = EventBus::default();
        let orchestrator = Arc::new(PredictionOrchestrator::new(
            GoalEstimator::default(),
            RuleBasedSelector::new(ThresholdTable::default()),
            Arc::new(LogisticMarketModel::untrained()),
            calibrator.clone(),
            GuardSettings::default(),
        ));
        let predictions = Arc::new(PredictionService::new(
            orchestrator,
            store.clone(),
            bus.clone(),
            metrics.clone(),
        ));
        let review = Arc::new(OutcomeReviewLoop::new(
            store.clone(),
            store.clone(),
            calibrator.clone(),
            bus,
            metrics.clone(),
            ReviewConfig::default(),
        ));

        router(AppState::new(predictions, review, store, calibrator, metrics))
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(Arc::new(MemoryStore::new()))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_inline_prediction_then_lookup() {
        let store = Arc::new(MemoryStore::new());
        let kickoff = Utc::now() + Duration::days(1);
        let request = serde_json::json!({
            "fixture": {
                "fixture_id": "fx_api_1",
                "league": "Eredivisie",
                "home_team": "Ajax",
                "away_team": "Utrecht",
                "kickoff": kickoff,
            }
        });

        let response = app(store.clone())
            .oneshot(post_json("/api/v1/predictions", request))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["data"]["fixture_id"], "fx_api_1");

        let response = app(store)
            .oneshot(Request::builder().uri("/api/v1/predictions/fx_api_1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["data"]["history"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_stored_fixture_is_not_found() {
        let response = app(Arc::new(MemoryStore::new()))
            .oneshot(post_json("/api/v1/predictions", serde_json::json!({ "fixture_id": "nope" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_review_run_and_weights() {
        let store = Arc::new(MemoryStore::new());
        let fixture = Fixture::new(
            "fx_api_2".to_string(),
            "Ligue 1".to_string(),
            "Lens".to_string(),
            "Nantes".to_string(),
            Utc::now() - Duration::hours(5),
        );
        let decision = PredictionDecision::new(&fixture, "v1")
            .with_pick(leo_models::Pick::for_selection(leo_models::ProbabilityQuery::HomeWin).unwrap())
            .with_sources(vec![leo_models::SignalSource::RuleBased]);
        store.save_decision(&decision).await.unwrap();
        store.set_final_score("fx_api_2", FinalScore::new(3, 1));

        let app = app(store);
        let response = app
            .clone()
            .oneshot(Request::builder().method("POST").uri("/api/v1/reviews/run").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["data"]["reviewed"], 1);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/api/v1/calibration/weights").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let response = app
            .oneshot(Request::builder().uri("/api/v1/analytics/performance").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["data"]["reviewed"], 1);
        assert_eq!(body["data"]["correct"], 1);
    }

    #[tokio::test]
    async fn test_confirm_unknown_decision() {
        let uri = format!("/api/v1/decisions/{}/confirm", Uuid::new_v4());
        let response = app(Arc::new(MemoryStore::new()))
            .oneshot(Request::builder().method("POST").uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_exposition() {
        let response = app(Arc::new(MemoryStore::new()))
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
