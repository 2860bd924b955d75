// Prediction service

use std::sync::Arc;

use anyhow::Result;
use leo_db::{RecordStore, StoreError};
use leo_ml::{
    FeatureEngineer, GoalEstimator, GoalRateEstimate, MarketProbabilities, MatchFeatures,
    StatisticalModel,
};
use leo_models::{
    Fixture, LeoError, PredictionDecision, PredictionInputs, SignalSource, SkipReason,
};
use leo_stream::{EngineEvent, EventBus};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::calibrator::ConfidenceCalibrator;
use crate::explanation::explain;
use crate::metrics::EngineMetrics;
use crate::selector::{Proposal, RuleBasedSelector};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardSettings {
    /// Largest expected-goal deficit the backed side may carry.
    pub alignment_margin: f64,
    /// A statistical probability below this vetoes the rule pick.
    pub stat_veto_probability: f64,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            alignment_margin: 0.5,
            stat_veto_probability: 0.3,
        }
    }
}

/// Turns one fixture into one decision. Synchronous and free of I/O; the
/// only shared state it touches is a read of the calibration weights.
pub struct PredictionOrchestrator {
    estimator: GoalEstimator,
    features: FeatureEngineer,
    selector: RuleBasedSelector,
    stat_model: Arc<dyn StatisticalModel>,
    calibrator: Arc<ConfidenceCalibrator>,
    guards: GuardSettings,
}

impl PredictionOrchestrator {
    pub fn new(
        estimator: GoalEstimator,
        selector: RuleBasedSelector,
        stat_model: Arc<dyn StatisticalModel>,
        calibrator: Arc<ConfidenceCalibrator>,
        guards: GuardSettings,
    ) -> Self {
        Self {
            estimator,
            features: FeatureEngineer::new(),
            selector,
            stat_model,
            calibrator,
            guards,
        }
    }

    pub fn calibrator(&self) -> &Arc<ConfidenceCalibrator> {
        &self.calibrator
    }

    pub fn predict(&self, fixture: &Fixture, inputs: &PredictionInputs) -> Result<PredictionDecision, LeoError> {
        let estimate = self.estimator.estimate(fixture, inputs);
        let probabilities = estimate.probabilities();
        let features = self.features.extract(fixture, inputs);
        self.decide(fixture, &estimate, &probabilities, &features)
    }

    /// Everything after estimation: propose, veto, align, calibrate, explain.
    pub fn decide(
        &self,
        fixture: &Fixture,
        estimate: &GoalRateEstimate,
        probabilities: &MarketProbabilities,
        features: &MatchFeatures,
    ) -> Result<PredictionDecision, LeoError> {
        let thresholds = self.selector.thresholds();
        let proposal = self.selector.propose(estimate, probabilities);
        let reasoning = explain(estimate, probabilities, thresholds, proposal.candidate());

        let decision = PredictionDecision::new(fixture, thresholds.version.clone())
            .with_rates(estimate.home_rate, estimate.away_rate, estimate.low_confidence)
            .with_reasoning(reasoning);

        let candidate = match proposal {
            Proposal::Candidate(candidate) => candidate,
            Proposal::Skip => {
                debug!(fixture_id = %fixture.fixture_id, "no selector rule fired");
                return Ok(decision.skipped(SkipReason::NoRuleMatched));
            }
        };

        let stat_probability = self
            .stat_model
            .opinion(features, &candidate.pick.selection)
            .probability();

        let mut sources = vec![SignalSource::RuleBased];
        if stat_probability.is_some() {
            sources.push(SignalSource::Statistical);
        }

        let decision = decision
            .with_pick(candidate.pick)
            .with_rule_confidence(candidate.raw_confidence)?
            .with_stat_probability(stat_probability)?
            .with_sources(sources);

        if let Some(p) = stat_probability {
            if p < self.guards.stat_veto_probability {
                debug!(fixture_id = %fixture.fixture_id, stat_probability = p, "statistical veto");
                return Ok(decision.skipped(SkipReason::StatisticalVeto));
            }
        }

        if let Some(side) = candidate.pick.selection.favored_side() {
            let deficit = estimate.rate_of(side.opposite()) - estimate.rate_of(side);
            if deficit > self.guards.alignment_margin {
                info!(
                    fixture_id = %fixture.fixture_id,
                    pick = %candidate.pick,
                    deficit,
                    "⚠️ Pick contradicts goal model, skipping"
                );
                return Ok(decision.skipped(SkipReason::AlignmentContradiction));
            }
        }

        let confidence = self
            .calibrator
            .blend(candidate.raw_confidence, stat_probability, candidate.pick.market);

        decision.with_confidence(confidence)
    }
}

/// The orchestrator plus the store hand-off.
pub struct PredictionService {
    orchestrator: Arc<PredictionOrchestrator>,
    store: Arc<dyn RecordStore>,
    bus: EventBus,
    metrics: Arc<EngineMetrics>,
}

impl PredictionService {
    pub fn new(
        orchestrator: Arc<PredictionOrchestrator>,
        store: Arc<dyn RecordStore>,
        bus: EventBus,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self { orchestrator, store, bus, metrics }
    }

    /// Returns the fixture's existing active decision if there is one,
    /// otherwise decides, persists and announces a new one.
    pub async fn predict(&self, fixture: &Fixture, inputs: &PredictionInputs) -> Result<PredictionDecision> {
        if let Some(existing) = self.store.active_decision(&fixture.fixture_id).await? {
            debug!(fixture_id = %fixture.fixture_id, decision_id = %existing.id, "active decision exists");
            return Ok(existing);
        }

        let timer = self.metrics.start_prediction_timer();
        let decision = self.orchestrator.predict(fixture, inputs)?;
        timer.observe_duration();

        self.store.save_fixture(fixture).await?;
        match self.store.save_decision(&decision).await {
            Ok(()) => {}
            Err(StoreError::DuplicateDecision { .. }) => {
                // another caller won the race for this fixture
                if let Some(existing) = self.store.active_decision(&fixture.fixture_id).await? {
                    return Ok(existing);
                }
                anyhow::bail!("fixture {} reported a duplicate decision that cannot be found", fixture.fixture_id);
            }
            Err(e) => return Err(e.into()),
        }

        self.metrics.record_decision(decision.status);
        self.bus.publish(EngineEvent::DecisionRecorded { decision: decision.clone() });

        info!(
            "🎯 {} {} vs {}: {} ({}, confidence {:.2})",
            decision.fixture_id,
            fixture.home_team,
            fixture.away_team,
            decision.pick.map_or_else(|| "-".to_string(), |p| p.to_string()),
            decision.status,
            decision.confidence
        );

        Ok(decision)
    }

    /// Loads the fixture and its inputs from the store, then predicts.
    pub async fn predict_fixture(&self, fixture_id: &str) -> Result<PredictionDecision> {
        let fixture = self
            .store
            .fixture(fixture_id)
            .await?
            .ok_or_else(|| LeoError::FixtureNotFound { fixture_id: fixture_id.to_string() })?;
        let inputs = self.store.prediction_inputs(&fixture).await?;
        self.predict(&fixture, &inputs).await
    }
}
