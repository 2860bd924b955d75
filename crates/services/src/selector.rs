//! Rule-based market selection.
//!
//! Rules are checked in a fixed priority order and the first one whose
//! condition holds wins:
//!
//! 1. home win
//! 2. away win
//! 3. both teams score
//! 4. over 2.5 goals
//! 5. under 2.5 goals
//! 6. home or draw
//! 7. away or draw
//! 8. over 1.5 goals
//! 9. home team over 0.5 goals
//! 10. away team over 0.5 goals
//!
//! When none holds the selector skips the fixture. The order is part of the
//! decision contract: changing it changes which pick a stored threshold
//! version reproduces.

use leo_ml::{GoalRateEstimate, MarketProbabilities};
use leo_models::{LeoError, MarketId, Pick, ProbabilityQuery, Side};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Named decision boundaries. Versioned so every decision records which
/// table produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThresholdTable {
    pub version: String,
    /// Minimum expected-goal lead for a straight win pick.
    pub win_rate_differential: f64,
    pub win_probability: f64,
    pub btts_probability: f64,
    pub over_2_5_probability: f64,
    /// Over-2.5 probability at or below which under 2.5 is picked.
    pub under_2_5_probability: f64,
    pub double_chance_probability: f64,
    pub over_1_5_probability: f64,
    /// Expected-goal rate at which a side is backed to score.
    pub team_scores_rate: f64,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self {
            version: "2024.1".to_string(),
            win_rate_differential: 0.8,
            win_probability: 0.55,
            btts_probability: 0.6,
            over_2_5_probability: 0.65,
            under_2_5_probability: 0.35,
            double_chance_probability: 0.8,
            over_1_5_probability: 0.8,
            team_scores_rate: 1.3,
        }
    }
}

impl ThresholdTable {
    pub fn validate(&self) -> Result<(), LeoError> {
        let probabilities = [
            ("win_probability", self.win_probability),
            ("btts_probability", self.btts_probability),
            ("over_2_5_probability", self.over_2_5_probability),
            ("under_2_5_probability", self.under_2_5_probability),
            ("double_chance_probability", self.double_chance_probability),
            ("over_1_5_probability", self.over_1_5_probability),
        ];
        for (name, value) in probabilities {
            if !(0.0..=1.0).contains(&value) {
                return Err(LeoError::Config(format!("threshold {name} = {value} is not a probability")));
            }
        }
        if !self.win_rate_differential.is_finite() || !self.team_scores_rate.is_finite() {
            return Err(LeoError::Config("rate thresholds must be finite".to_string()));
        }
        if self.version.trim().is_empty() {
            return Err(LeoError::Config("threshold table needs a version".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub pick: Pick,
    pub raw_confidence: f64,
    pub rule: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Proposal {
    Candidate(Candidate),
    Skip,
}

impl Proposal {
    pub fn candidate(&self) -> Option<&Candidate> {
        match self {
            Proposal::Candidate(c) => Some(c),
            Proposal::Skip => None,
        }
    }
}

struct Rule {
    name: &'static str,
    market: MarketId,
    selection: ProbabilityQuery,
}

const RULES: [Rule; 10] = [
    Rule { name: "home-win", market: MarketId::MatchResult, selection: ProbabilityQuery::HomeWin },
    Rule { name: "away-win", market: MarketId::MatchResult, selection: ProbabilityQuery::AwayWin },
    Rule { name: "btts", market: MarketId::BothTeamsToScore, selection: ProbabilityQuery::BothTeamsScore },
    Rule { name: "over-2.5", market: MarketId::OverUnder25, selection: ProbabilityQuery::TotalOver { goals: 2 } },
    Rule { name: "under-2.5", market: MarketId::OverUnder25, selection: ProbabilityQuery::TotalUnder { goals: 2 } },
    Rule { name: "home-or-draw", market: MarketId::DoubleChance, selection: ProbabilityQuery::HomeOrDraw },
    Rule { name: "away-or-draw", market: MarketId::DoubleChance, selection: ProbabilityQuery::AwayOrDraw },
    Rule { name: "over-1.5", market: MarketId::OverUnder15, selection: ProbabilityQuery::TotalOver { goals: 1 } },
    Rule {
        name: "home-scores",
        market: MarketId::HomeTeamGoals,
        selection: ProbabilityQuery::TeamOver { side: Side::Home, goals: 0 },
    },
    Rule {
        name: "away-scores",
        market: MarketId::AwayTeamGoals,
        selection: ProbabilityQuery::TeamOver { side: Side::Away, goals: 0 },
    },
];

pub struct RuleBasedSelector {
    thresholds: ThresholdTable,
}

impl RuleBasedSelector {
    pub fn new(thresholds: ThresholdTable) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &ThresholdTable {
        &self.thresholds
    }

    fn fires(&self, index: usize, estimate: &GoalRateEstimate, p: &MarketProbabilities) -> bool {
        let t = &self.thresholds;
        let diff = estimate.rate_differential();
        match index {
            0 => diff >= t.win_rate_differential && p.home_win >= t.win_probability,
            1 => -diff >= t.win_rate_differential && p.away_win >= t.win_probability,
            2 => p.btts >= t.btts_probability,
            3 => p.over_2_5 >= t.over_2_5_probability,
            4 => p.over_2_5 <= t.under_2_5_probability,
            5 => p.home_or_draw >= t.double_chance_probability,
            6 => p.away_or_draw >= t.double_chance_probability,
            7 => p.over_1_5 >= t.over_1_5_probability,
            8 => estimate.home_rate >= t.team_scores_rate,
            9 => estimate.away_rate >= t.team_scores_rate,
            _ => false,
        }
    }

    pub fn propose(&self, estimate: &GoalRateEstimate, probabilities: &MarketProbabilities) -> Proposal {
        for (index, rule) in RULES.iter().enumerate() {
            if !self.fires(index, estimate, probabilities) {
                continue;
            }
            let Some(raw_confidence) = probabilities.of(&rule.selection) else {
                continue;
            };
            trace!(rule = rule.name, raw_confidence, "selector rule fired");
            return Proposal::Candidate(Candidate {
                pick: Pick { market: rule.market, selection: rule.selection },
                raw_confidence,
                rule: rule.name,
            });
        }
        Proposal::Skip
    }
}
