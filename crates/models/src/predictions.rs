use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::calibration::SignalSource;
use crate::error::{LeoError, Result};
use crate::fixture::{FinalScore, Fixture};
use crate::market::{MarketId, Pick};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionStatus {
    Pending,
    Skipped,
    Confirmed,
    Reviewed,
}

impl DecisionStatus {
    pub fn code(&self) -> &'static str {
        match self {
            DecisionStatus::Pending => "PENDING",
            DecisionStatus::Skipped => "SKIPPED",
            DecisionStatus::Confirmed => "CONFIRMED",
            DecisionStatus::Reviewed => "REVIEWED",
        }
    }
}

impl fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for DecisionStatus {
    type Err = LeoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(DecisionStatus::Pending),
            "SKIPPED" => Ok(DecisionStatus::Skipped),
            "CONFIRMED" => Ok(DecisionStatus::Confirmed),
            "REVIEWED" => Ok(DecisionStatus::Reviewed),
            other => Err(LeoError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    NoRuleMatched,
    StatisticalVeto,
    AlignmentContradiction,
}

impl SkipReason {
    pub fn code(&self) -> &'static str {
        match self {
            SkipReason::NoRuleMatched => "no-rule-matched",
            SkipReason::StatisticalVeto => "statistical-veto",
            SkipReason::AlignmentContradiction => "alignment-contradiction",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for SkipReason {
    type Err = LeoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "no-rule-matched" => Ok(SkipReason::NoRuleMatched),
            "statistical-veto" => Ok(SkipReason::StatisticalVeto),
            "alignment-contradiction" => Ok(SkipReason::AlignmentContradiction),
            other => Err(LeoError::UnknownStatus(other.to_string())),
        }
    }
}

/// The engine's verdict for one fixture.
///
/// `pick` is only absent when no selector rule fired. History is
/// append-only: decisions change status but are never removed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionDecision {
    pub id: Uuid,
    pub fixture_id: String,
    pub kickoff: DateTime<Utc>,
    pub pick: Option<Pick>,
    pub confidence: f64,
    pub rule_confidence: f64,
    pub stat_probability: Option<f64>,
    pub reasoning: Vec<String>,
    pub status: DecisionStatus,
    pub skip_reason: Option<SkipReason>,
    pub sources: Vec<SignalSource>,
    pub home_rate: f64,
    pub away_rate: f64,
    pub low_confidence: bool,
    pub thresholds_version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PredictionDecision {
    pub fn new(fixture: &Fixture, thresholds_version: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            fixture_id: fixture.fixture_id.clone(),
            kickoff: fixture.kickoff,
            pick: None,
            confidence: 0.0,
            rule_confidence: 0.0,
            stat_probability: None,
            reasoning: Vec::new(),
            status: DecisionStatus::Pending,
            skip_reason: None,
            sources: Vec::new(),
            home_rate: 0.0,
            away_rate: 0.0,
            low_confidence: false,
            thresholds_version: thresholds_version.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_pick(mut self, pick: Pick) -> Self {
        self.pick = Some(pick);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(LeoError::InvalidProbability { prob: confidence });
        }
        self.confidence = confidence;
        Ok(self)
    }

    pub fn with_rule_confidence(mut self, confidence: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(LeoError::InvalidProbability { prob: confidence });
        }
        self.rule_confidence = confidence;
        Ok(self)
    }

    pub fn with_stat_probability(mut self, probability: Option<f64>) -> Result<Self> {
        if let Some(prob) = probability {
            if !(0.0..=1.0).contains(&prob) {
                return Err(LeoError::InvalidProbability { prob });
            }
        }
        self.stat_probability = probability;
        Ok(self)
    }

    pub fn with_rates(mut self, home_rate: f64, away_rate: f64, low_confidence: bool) -> Self {
        self.home_rate = home_rate;
        self.away_rate = away_rate;
        self.low_confidence = low_confidence;
        self
    }

    pub fn with_reasoning(mut self, reasoning: Vec<String>) -> Self {
        self.reasoning = reasoning;
        self
    }

    pub fn with_sources(mut self, sources: Vec<SignalSource>) -> Self {
        self.sources = sources;
        self
    }

    /// Terminal: a skipped decision carries no confidence.
    pub fn skipped(mut self, reason: SkipReason) -> Self {
        self.status = DecisionStatus::Skipped;
        self.skip_reason = Some(reason);
        self.confidence = 0.0;
        self.updated_at = Utc::now();
        self
    }

    pub fn confirm(&mut self) -> Result<()> {
        self.transition(DecisionStatus::Confirmed, &[DecisionStatus::Pending])
    }

    pub fn mark_reviewed(&mut self) -> Result<()> {
        self.transition(
            DecisionStatus::Reviewed,
            &[DecisionStatus::Pending, DecisionStatus::Confirmed],
        )
    }

    fn transition(&mut self, to: DecisionStatus, allowed_from: &[DecisionStatus]) -> Result<()> {
        if !allowed_from.contains(&self.status) {
            return Err(LeoError::InvalidTransition {
                decision_id: self.id,
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Anything but SKIPPED counts towards the one-per-fixture limit.
    pub fn is_active(&self) -> bool {
        self.status != DecisionStatus::Skipped
    }

    pub fn is_awaiting_review(&self) -> bool {
        matches!(self.status, DecisionStatus::Pending | DecisionStatus::Confirmed)
            && self.pick.is_some()
    }
}

/// The settled verdict for one decision; the unit the calibrator learns from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewOutcome {
    pub decision_id: Uuid,
    pub fixture_id: String,
    pub pick: Pick,
    pub sources: Vec<SignalSource>,
    pub confidence: f64,
    pub final_score: FinalScore,
    pub market_correct: bool,
    pub reviewed_at: DateTime<Utc>,
}

impl ReviewOutcome {
    pub fn settle(decision: &PredictionDecision, final_score: FinalScore) -> Result<Self> {
        let pick = decision
            .pick
            .ok_or(LeoError::NothingToReview { decision_id: decision.id })?;
        let market_correct = pick
            .selection
            .is_satisfied(u32::from(final_score.home), u32::from(final_score.away));

        Ok(Self {
            decision_id: decision.id,
            fixture_id: decision.fixture_id.clone(),
            pick,
            sources: decision.sources.clone(),
            confidence: decision.confidence,
            final_score,
            market_correct,
            reviewed_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketPerformance {
    pub market: MarketId,
    pub total_reviewed: u32,
    pub correct: u32,
    pub accuracy: f64,
    pub brier_score: f64,
    pub last_updated: DateTime<Utc>,
}

impl MarketPerformance {
    pub fn new(market: MarketId) -> Self {
        Self {
            market,
            total_reviewed: 0,
            correct: 0,
            accuracy: 0.0,
            brier_score: 0.0,
            last_updated: Utc::now(),
        }
    }

    pub fn record(&mut self, is_correct: bool, confidence: f64) {
        self.total_reviewed += 1;
        if is_correct {
            self.correct += 1;
        }
        self.accuracy = f64::from(self.correct) / f64::from(self.total_reviewed);

        let outcome_value = if is_correct { 1.0 } else { 0.0 };
        let score = (confidence - outcome_value).powi(2);

        // Running average of Brier score
        let weight = 1.0 / f64::from(self.total_reviewed);
        self.brier_score = (1.0 - weight) * self.brier_score + weight * score;
        self.last_updated = Utc::now();
    }
}

/// Decision-history quality summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub total_decisions: usize,
    pub skipped: usize,
    pub reviewed: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub coverage: f64,
    pub by_market: Vec<MarketPerformance>,
    pub generated_at: DateTime<Utc>,
}

impl PerformanceReport {
    pub fn build(decisions: &[PredictionDecision], outcomes: &[ReviewOutcome]) -> Self {
        let mut by_market: BTreeMap<MarketId, MarketPerformance> = BTreeMap::new();
        for outcome in outcomes {
            by_market
                .entry(outcome.pick.market)
                .or_insert_with(|| MarketPerformance::new(outcome.pick.market))
                .record(outcome.market_correct, outcome.confidence);
        }

        let skipped = decisions.iter().filter(|d| !d.is_active()).count();
        let active = decisions.len() - skipped;
        let reviewed = outcomes.len();
        let correct = outcomes.iter().filter(|o| o.market_correct).count();

        Self {
            total_decisions: decisions.len(),
            skipped,
            reviewed,
            correct,
            accuracy: if reviewed > 0 { correct as f64 / reviewed as f64 } else { 0.0 },
            coverage: if active > 0 { reviewed as f64 / active as f64 } else { 0.0 },
            by_market: by_market.into_values().collect(),
            generated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::ProbabilityQuery;
    use chrono::Duration;

    fn fixture() -> Fixture {
        Fixture::new(
            "match_123".to_string(),
            "Premier League".to_string(),
            "Arsenal".to_string(),
            "Chelsea".to_string(),
            Utc::now() + Duration::hours(2),
        )
    }

    fn home_win_decision() -> PredictionDecision {
        PredictionDecision::new(&fixture(), "v1")
            .with_pick(Pick::new(MarketId::MatchResult, ProbabilityQuery::HomeWin).unwrap())
            .with_confidence(0.7)
            .unwrap()
            .with_sources(vec![SignalSource::RuleBased])
    }

    #[test]
    fn test_decision_creation() {
        let decision = home_win_decision();

        assert_eq!(decision.fixture_id, "match_123");
        assert_eq!(decision.status, DecisionStatus::Pending);
        assert!(decision.is_active());
        assert!(decision.is_awaiting_review());
    }

    #[test]
    fn test_invalid_confidence() {
        let result = PredictionDecision::new(&fixture(), "v1").with_confidence(1.5);
        assert!(result.is_err());

        let result = PredictionDecision::new(&fixture(), "v1").with_stat_probability(Some(-0.1));
        assert!(result.is_err());
    }

    #[test]
    fn test_status_transitions() {
        let mut decision = home_win_decision();
        decision.confirm().unwrap();
        assert_eq!(decision.status, DecisionStatus::Confirmed);

        decision.mark_reviewed().unwrap();
        assert_eq!(decision.status, DecisionStatus::Reviewed);

        // terminal
        assert!(decision.mark_reviewed().is_err());
        assert!(decision.confirm().is_err());

        let mut skipped = home_win_decision().skipped(SkipReason::AlignmentContradiction);
        assert_eq!(skipped.confidence, 0.0);
        assert!(!skipped.is_active());
        assert!(skipped.mark_reviewed().is_err());
    }

    #[test]
    fn test_settle_review_outcome() {
        let decision = home_win_decision();

        let won = ReviewOutcome::settle(&decision, FinalScore::new(2, 0)).unwrap();
        assert!(won.market_correct);
        assert_eq!(won.decision_id, decision.id);

        let lost = ReviewOutcome::settle(&decision, FinalScore::new(1, 1)).unwrap();
        assert!(!lost.market_correct);

        let no_pick = PredictionDecision::new(&fixture(), "v1").skipped(SkipReason::NoRuleMatched);
        assert!(ReviewOutcome::settle(&no_pick, FinalScore::new(1, 0)).is_err());
    }

    #[test]
    fn test_market_performance() {
        let mut performance = MarketPerformance::new(MarketId::MatchResult);

        performance.record(true, 0.8);
        performance.record(true, 0.7);
        performance.record(false, 0.6);

        assert_eq!(performance.total_reviewed, 3);
        assert_eq!(performance.correct, 2);
        assert!((performance.accuracy - 0.6666666666666666).abs() < 0.0001);
        let expected_brier = (0.04 + 0.09 + 0.36) / 3.0;
        assert!((performance.brier_score - expected_brier).abs() < 1e-9);
    }

    #[test]
    fn test_performance_report() {
        let decision = home_win_decision();
        let skipped = home_win_decision().skipped(SkipReason::StatisticalVeto);
        let outcome = ReviewOutcome::settle(&decision, FinalScore::new(3, 1)).unwrap();

        let report = PerformanceReport::build(&[decision, skipped], &[outcome]);

        assert_eq!(report.total_decisions, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.reviewed, 1);
        assert_eq!(report.correct, 1);
        assert!((report.coverage - 1.0).abs() < 1e-9);
        assert_eq!(report.by_market.len(), 1);
    }
}
