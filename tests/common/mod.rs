// Shared builders for the workspace integration tests
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use leo_db::{MemoryStore, RecordStore, ResultSource};
use leo_ml::{GoalEstimator, LogisticMarketModel};
use leo_models::{
    Fixture, Ground, MatchResult, Pick, PredictionDecision, ProbabilityQuery, SignalSource,
};
use leo_services::{
    ConfidenceCalibrator, EngineMetrics, GuardSettings, OutcomeReviewLoop, PredictionOrchestrator,
    PredictionService, ReviewConfig, RuleBasedSelector, ThresholdTable,
};
use leo_stream::EventBus;

pub struct Engine {
    pub store: Arc<MemoryStore>,
    pub calibrator: Arc<ConfidenceCalibrator>,
    pub metrics: Arc<EngineMetrics>,
    pub bus: EventBus,
    pub predictions: PredictionService,
}

impl Engine {
    pub fn new(thresholds: ThresholdTable) -> Self {
        let store = Arc::new(MemoryStore::new());
        let calibrator = Arc::new(ConfidenceCalibrator::default());
        let metrics = Arc::new(EngineMetrics::new().unwrap());
        let bus = EventBus::default();
        let predictions = PredictionService::new(
            Arc::new(orchestrator(thresholds, calibrator.clone())),
            store.clone(),
            bus.clone(),
            metrics.clone(),
        );

        Self { store, calibrator, metrics, bus, predictions }
    }

    /// A review loop reading results from the engine's own store.
    pub fn review_loop(&self) -> OutcomeReviewLoop {
        self.review_loop_with(self.store.clone())
    }

    pub fn review_loop_with(&self, results: Arc<dyn ResultSource>) -> OutcomeReviewLoop {
        OutcomeReviewLoop::new(
            self.store.clone(),
            results,
            self.calibrator.clone(),
            self.bus.clone(),
            self.metrics.clone(),
            fast_review_config(),
        )
    }

    pub fn records(&self) -> Arc<dyn RecordStore> {
        self.store.clone()
    }
}

pub fn orchestrator(thresholds: ThresholdTable, calibrator: Arc<ConfidenceCalibrator>) -> PredictionOrchestrator {
    PredictionOrchestrator::new(
        GoalEstimator::default(),
        RuleBasedSelector::new(thresholds),
        Arc::new(LogisticMarketModel::untrained()),
        calibrator,
        GuardSettings::default(),
    )
}

pub fn fast_review_config() -> ReviewConfig {
    ReviewConfig {
        base_delay_ms: 1,
        max_jitter_ms: 0,
        ..ReviewConfig::default()
    }
}

pub fn fixture(id: &str, home: &str, away: &str, kickoff: DateTime<Utc>) -> Fixture {
    Fixture::new(
        id.to_string(),
        "Premier League".to_string(),
        home.to_string(),
        away.to_string(),
        kickoff,
    )
}

/// `scores` as (for, against), most recent first, one week apart before `before`.
pub fn results(scores: &[(u8, u8)], before: DateTime<Utc>) -> Vec<MatchResult> {
    scores
        .iter()
        .enumerate()
        .map(|(i, (goals_for, goals_against))| {
            MatchResult::new(
                before - Duration::days(7 * (i as i64 + 1)),
                format!("Opponent {i}"),
                if i % 2 == 0 { Ground::Home } else { Ground::Away },
                *goals_for,
                *goals_against,
            )
        })
        .collect()
}

/// Registers a fixture with a dominant home side and a toothless visitor.
pub fn seed_lopsided_fixture(store: &MemoryStore, id: &str, kickoff: DateTime<Utc>) -> Fixture {
    let fixture = fixture(id, "Arsenal", "Luton", kickoff);
    store.insert_team_results("Arsenal", results(&[(3, 0); 6], kickoff));
    store.insert_team_results("Luton", results(&[(0, 2); 6], kickoff));
    store.insert_fixture(fixture.clone());
    fixture
}

pub fn decision_with_pick(id: &str, kickoff: DateTime<Utc>, selection: ProbabilityQuery) -> PredictionDecision {
    PredictionDecision::new(&fixture(id, "Home", "Away", kickoff), "test")
        .with_pick(Pick::for_selection(selection).unwrap())
        .with_sources(vec![SignalSource::RuleBased])
}
