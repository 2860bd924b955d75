mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crate::config::AppConfig;
use leo_api::{router, AppState};
use leo_db::{DatabaseConnection, MemoryStore, PgRecordStore, RecordStore, ResultSource};
use leo_ml::{GoalEstimator, LogisticMarketModel};
use leo_services::{
    ConfidenceCalibrator, EngineMetrics, OutcomeReviewLoop, PredictionOrchestrator,
    PredictionService, RuleBasedSelector,
};
use leo_stream::{EventBus, RedisStream};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "leo_rs=debug,leo_services=debug,tower_http=debug".into());

    if std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn load_model(config: &AppConfig) -> Result<LogisticMarketModel> {
    let Some(path) = config.model.path.as_deref() else {
        info!("🧠 No statistical model configured, rule-only confidence");
        return Ok(LogisticMarketModel::untrained());
    };

    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading model file {path}"))?;
    let model = LogisticMarketModel::from_json(&json)?;
    info!("🧠 Loaded statistical model from {} ({} heads)", path, model.head_count());
    Ok(model)
}

async fn open_store(config: &AppConfig) -> Result<(Arc<dyn RecordStore>, Arc<dyn ResultSource>)> {
    match config.database_url() {
        Some(url) => {
            let connection = DatabaseConnection::new(url, config.database.max_connections).await?;
            connection.run_migrations().await?;
            let store = Arc::new(PgRecordStore::new(connection.pool().clone()));
            let records: Arc<dyn RecordStore> = store.clone();
            let results: Arc<dyn ResultSource> = store;
            Ok((records, results))
        }
        None => {
            warn!("⚠️  No database configured, decisions are kept in memory only");
            let store = Arc::new(MemoryStore::new());
            let records: Arc<dyn RecordStore> = store.clone();
            let results: Arc<dyn ResultSource> = store;
            Ok((records, results))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("🚀 Starting Leo fixture prediction engine");

    let config = AppConfig::new()?;
    config.thresholds.validate()?;
    info!("✅ Configuration loaded (thresholds {})", config.thresholds.version);
    info!("🌐 Server will bind to: {}", config.server_addr());

    let (store, results) = open_store(&config).await?;

    let calibrator = Arc::new(ConfidenceCalibrator::new(&config.calibration)?);
    let restored = calibrator.restore(store.load_weights().await?);
    info!("⚖️  Restored {} calibration weights", restored);

    let metrics = Arc::new(EngineMetrics::new()?);
    let bus = EventBus::default();

    let orchestrator = Arc::new(PredictionOrchestrator::new(
        GoalEstimator::new(config.engine.goal_model.clone()),
        RuleBasedSelector::new(config.thresholds.clone()),
        Arc::new(load_model(&config).await?),
        calibrator.clone(),
        config.engine.guards.clone(),
    ));
    let predictions = Arc::new(PredictionService::new(
        orchestrator,
        store.clone(),
        bus.clone(),
        metrics.clone(),
    ));
    let review = Arc::new(OutcomeReviewLoop::new(
        store.clone(),
        results,
        calibrator.clone(),
        bus.clone(),
        metrics.clone(),
        config.review.clone(),
    ));

    let forwarder = if config.redis.enabled {
        let stream = RedisStream::new(config.redis_url(), &config.redis.stream_key, config.redis.max_len).await?;
        info!("📡 Forwarding engine events to Redis stream {}", config.redis.stream_key);
        Some(stream.spawn_forwarder(&bus))
    } else {
        None
    };

    let cancel = CancellationToken::new();
    let review_handle = {
        let review = review.clone();
        let cancel = cancel.clone();
        let interval = Duration::from_secs(config.review.interval_secs.max(1));
        tokio::spawn(async move { review.run_forever(interval, cancel).await })
    };

    let app = router(AppState::new(predictions, review, store, calibrator, metrics));
    let listener = tokio::net::TcpListener::bind(config.server_addr()).await?;
    info!("✅ All services started, listening on {}", config.server_addr());

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("👋 Shutting down gracefully");
            shutdown.cancel();
        })
        .await?;

    cancel.cancel();
    review_handle.await?;
    if let Some(handle) = forwarder {
        handle.abort();
    }

    Ok(())
}
