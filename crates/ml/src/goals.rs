//! Poisson goal model.
//!
//! Each side's goal count is an independent Poisson variable whose rate is
//! derived from trailing scoring and conceding averages. Market probabilities
//! are sums over the joint distribution on `0..=max_goals` for both sides.

use leo_models::{Fixture, PredictionInputs, ProbabilityQuery, Side, Venue};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Truncation point of the goal distribution.
pub const MAX_GOALS: usize = 10;

const MIN_RATE: f64 = 0.05;
const MAX_RATE: f64 = 6.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoalModelConfig {
    /// Matches per side below which the estimate is flagged low-confidence.
    pub min_matches: usize,
    pub home_advantage: f64,
    pub prior_home_rate: f64,
    pub prior_away_rate: f64,
    pub head_to_head_weight: f64,
    pub min_head_to_head: usize,
    pub max_goals: usize,
}

impl Default for GoalModelConfig {
    fn default() -> Self {
        Self {
            min_matches: 5,
            home_advantage: 1.10,
            prior_home_rate: 1.45,
            prior_away_rate: 1.15,
            head_to_head_weight: 0.25,
            min_head_to_head: 3,
            max_goals: MAX_GOALS,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GoalRateEstimate {
    pub home_rate: f64,
    pub away_rate: f64,
    pub home_matches: usize,
    pub away_matches: usize,
    pub low_confidence: bool,
    #[serde(default = "default_max_goals")]
    pub max_goals: usize,
}

fn default_max_goals() -> usize {
    MAX_GOALS
}

impl GoalRateEstimate {
    pub fn new(home_rate: f64, away_rate: f64) -> Self {
        Self {
            home_rate: home_rate.max(0.0),
            away_rate: away_rate.max(0.0),
            home_matches: 0,
            away_matches: 0,
            low_confidence: false,
            max_goals: MAX_GOALS,
        }
    }

    /// Positive when the home side is expected to outscore the away side.
    pub fn rate_differential(&self) -> f64 {
        self.home_rate - self.away_rate
    }

    pub fn total_rate(&self) -> f64 {
        self.home_rate + self.away_rate
    }

    pub fn rate_of(&self, side: Side) -> f64 {
        match side {
            Side::Home => self.home_rate,
            Side::Away => self.away_rate,
        }
    }

    pub fn score_matrix(&self) -> ScoreMatrix {
        ScoreMatrix::from_rates(self.home_rate, self.away_rate, self.max_goals.max(1))
    }

    pub fn probabilities(&self) -> MarketProbabilities {
        MarketProbabilities::from_matrix(&self.score_matrix())
    }
}

/// Poisson pmf on `0..=max_k`; the tail beyond `max_k` is folded into the
/// last bucket so the support sums to one.
pub fn poisson_pmf(lambda: f64, max_k: usize) -> Vec<f64> {
    let lambda = if lambda.is_finite() { lambda.max(0.0) } else { 0.0 };
    let mut out = vec![0.0; max_k + 1];

    out[0] = (-lambda).exp();
    for k in 1..=max_k {
        out[k] = out[k - 1] * lambda / k as f64;
    }

    let sum: f64 = out.iter().sum();
    if sum < 1.0 {
        out[max_k] += 1.0 - sum;
    }
    out
}

/// Joint final-score distribution, indexed `[home_goals][away_goals]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreMatrix {
    cells: Vec<Vec<f64>>,
}

impl ScoreMatrix {
    pub fn from_rates(home_rate: f64, away_rate: f64, max_goals: usize) -> Self {
        let home = poisson_pmf(home_rate, max_goals);
        let away = poisson_pmf(away_rate, max_goals);
        let cells = home
            .iter()
            .map(|p_h| away.iter().map(|p_a| p_h * p_a).collect())
            .collect();
        Self { cells }
    }

    pub fn max_goals(&self) -> usize {
        self.cells.len().saturating_sub(1)
    }

    pub fn cell(&self, home: usize, away: usize) -> f64 {
        self.cells
            .get(home)
            .and_then(|row| row.get(away))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn total_mass(&self) -> f64 {
        self.cells.iter().flatten().sum()
    }

    pub fn probability(&self, query: &ProbabilityQuery) -> f64 {
        let mut p = 0.0;
        for (h, row) in self.cells.iter().enumerate() {
            for (a, cell) in row.iter().enumerate() {
                if query.is_satisfied(h as u32, a as u32) {
                    p += cell;
                }
            }
        }
        p.clamp(0.0, 1.0)
    }

    /// Most likely exact score.
    pub fn most_likely_score(&self) -> (usize, usize) {
        let mut best = (0, 0);
        let mut best_p = f64::MIN;
        for (h, row) in self.cells.iter().enumerate() {
            for (a, cell) in row.iter().enumerate() {
                if *cell > best_p {
                    best_p = *cell;
                    best = (h, a);
                }
            }
        }
        best
    }
}

/// The derived probabilities the selector and explanation generator read.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MarketProbabilities {
    pub home_win: f64,
    pub draw: f64,
    pub away_win: f64,
    pub home_or_draw: f64,
    pub away_or_draw: f64,
    pub over_1_5: f64,
    pub over_2_5: f64,
    pub btts: f64,
    pub home_scores: f64,
    pub away_scores: f64,
}

impl MarketProbabilities {
    pub fn from_matrix(matrix: &ScoreMatrix) -> Self {
        use ProbabilityQuery as Q;
        Self {
            home_win: matrix.probability(&Q::HomeWin),
            draw: matrix.probability(&Q::Draw),
            away_win: matrix.probability(&Q::AwayWin),
            home_or_draw: matrix.probability(&Q::HomeOrDraw),
            away_or_draw: matrix.probability(&Q::AwayOrDraw),
            over_1_5: matrix.probability(&Q::TotalOver { goals: 1 }),
            over_2_5: matrix.probability(&Q::TotalOver { goals: 2 }),
            btts: matrix.probability(&Q::BothTeamsScore),
            home_scores: matrix.probability(&Q::TeamOver { side: Side::Home, goals: 0 }),
            away_scores: matrix.probability(&Q::TeamOver { side: Side::Away, goals: 0 }),
        }
    }

    /// Probability of a catalog selection, when it is one of the tracked ones.
    pub fn of(&self, query: &ProbabilityQuery) -> Option<f64> {
        use ProbabilityQuery as Q;
        let p = match *query {
            Q::HomeWin => self.home_win,
            Q::Draw => self.draw,
            Q::AwayWin => self.away_win,
            Q::HomeOrDraw => self.home_or_draw,
            Q::AwayOrDraw => self.away_or_draw,
            Q::HomeOrAway => 1.0 - self.draw,
            Q::TotalOver { goals: 1 } => self.over_1_5,
            Q::TotalUnder { goals: 1 } => 1.0 - self.over_1_5,
            Q::TotalOver { goals: 2 } => self.over_2_5,
            Q::TotalUnder { goals: 2 } => 1.0 - self.over_2_5,
            Q::BothTeamsScore => self.btts,
            Q::NotBothTeamsScore => 1.0 - self.btts,
            Q::TeamOver { side: Side::Home, goals: 0 } => self.home_scores,
            Q::TeamOver { side: Side::Away, goals: 0 } => self.away_scores,
            _ => return None,
        };
        Some(p.clamp(0.0, 1.0))
    }
}

pub struct GoalEstimator {
    config: GoalModelConfig,
}

impl GoalEstimator {
    pub fn new(config: GoalModelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GoalModelConfig {
        &self.config
    }

    /// Never fails: thin history shrinks toward the league priors and
    /// flags the estimate instead.
    pub fn estimate(&self, fixture: &Fixture, inputs: &PredictionInputs) -> GoalRateEstimate {
        let cfg = &self.config;
        let home = &inputs.home_form;
        let away = &inputs.away_form;

        let home_attack = self.shrunk(home.scoring_average(), home.len(), cfg.prior_home_rate);
        let home_defense = self.shrunk(home.conceding_average(), home.len(), cfg.prior_away_rate);
        let away_attack = self.shrunk(away.scoring_average(), away.len(), cfg.prior_away_rate);
        let away_defense = self.shrunk(away.conceding_average(), away.len(), cfg.prior_home_rate);

        let advantage = match fixture.venue {
            Venue::Home => cfg.home_advantage.max(f64::EPSILON),
            Venue::Neutral => 1.0,
        };

        let mut home_rate = (home_attack + away_defense) / 2.0 * advantage;
        let mut away_rate = (away_attack + home_defense) / 2.0 / advantage;

        let h2h = &inputs.head_to_head;
        if h2h.len() >= cfg.min_head_to_head {
            if let (Some(h2h_home), Some(h2h_away)) =
                (h2h.home_goals_average(), h2h.away_goals_average())
            {
                let w = cfg.head_to_head_weight.clamp(0.0, 1.0);
                home_rate = (1.0 - w) * home_rate + w * h2h_home;
                away_rate = (1.0 - w) * away_rate + w * h2h_away;
            }
        }

        let low_confidence = home.len() < cfg.min_matches || away.len() < cfg.min_matches;
        let estimate = GoalRateEstimate {
            home_rate: home_rate.clamp(MIN_RATE, MAX_RATE),
            away_rate: away_rate.clamp(MIN_RATE, MAX_RATE),
            home_matches: home.len(),
            away_matches: away.len(),
            low_confidence,
            max_goals: cfg.max_goals.max(1),
        };

        debug!(
            fixture_id = %fixture.fixture_id,
            home_rate = estimate.home_rate,
            away_rate = estimate.away_rate,
            low_confidence,
            "goal rates estimated"
        );

        estimate
    }

    fn shrunk(&self, observed: Option<f64>, n: usize, prior: f64) -> f64 {
        let min = self.config.min_matches;
        match observed {
            Some(avg) if n >= min => avg,
            Some(avg) => (avg * n as f64 + prior * (min - n) as f64) / min as f64,
            None => prior,
        }
    }
}

impl Default for GoalEstimator {
    fn default() -> Self {
        Self::new(GoalModelConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use leo_models::{Ground, HeadToHead, MatchResult, TeamForm};
    use proptest::prelude::*;

    fn form(team: &str, scores: &[(u8, u8)]) -> TeamForm {
        let results = scores
            .iter()
            .enumerate()
            .map(|(i, (f, a))| {
                MatchResult::new(
                    Utc::now() - Duration::days(7 * (i as i64 + 1)),
                    "Opponent".to_string(),
                    Ground::Home,
                    *f,
                    *a,
                )
            })
            .collect();
        TeamForm::new(team, results, Utc::now())
    }

    fn fixture() -> Fixture {
        Fixture::new(
            "fx_1".to_string(),
            "Premier League".to_string(),
            "Home".to_string(),
            "Away".to_string(),
            Utc::now() + Duration::days(1),
        )
    }

    #[test]
    fn test_pmf_sums_to_one() {
        for lambda in [0.0, 0.3, 1.4, 3.2, 8.0] {
            let pmf = poisson_pmf(lambda, MAX_GOALS);
            let sum: f64 = pmf.iter().sum();
            assert!((sum - 1.0).abs() < 1e-12, "lambda {lambda}: {sum}");
        }
    }

    #[test]
    fn test_matrix_outcomes_partition() {
        let probs = GoalRateEstimate::new(1.6, 1.1).probabilities();
        assert!((probs.home_win + probs.draw + probs.away_win - 1.0).abs() < 1e-9);
        assert!(probs.home_win > probs.away_win);
        assert!(probs.over_1_5 > probs.over_2_5);
        assert!((probs.home_or_draw - (probs.home_win + probs.draw)).abs() < 1e-9);
    }

    #[test]
    fn test_btts_matches_closed_form() {
        let estimate = GoalRateEstimate::new(2.1, 0.6);
        let expected = (1.0 - (-2.1f64).exp()) * (1.0 - (-0.6f64).exp());
        assert!((estimate.probabilities().btts - expected).abs() < 1e-6);
    }

    #[test]
    fn test_strong_home_side() {
        let estimator = GoalEstimator::default();
        let inputs = PredictionInputs::new(
            form("Home", &[(3, 0), (2, 1), (4, 1), (2, 0), (3, 1), (2, 2)]),
            form("Away", &[(0, 2), (1, 3), (0, 1), (1, 2), (0, 0), (0, 3)]),
            HeadToHead::empty(),
        );

        let estimate = estimator.estimate(&fixture(), &inputs);
        assert!(!estimate.low_confidence);
        assert!(estimate.home_rate > 2.0);
        assert!(estimate.away_rate < 1.3);
    }

    #[test]
    fn test_thin_history_is_flagged_not_failed() {
        let estimator = GoalEstimator::default();
        let inputs = PredictionInputs::new(
            form("Home", &[(5, 0)]),
            form("Away", &[]),
            HeadToHead::empty(),
        );

        let estimate = estimator.estimate(&fixture(), &inputs);
        assert!(estimate.low_confidence);
        assert_eq!(estimate.away_matches, 0);
        // one 5-0 win is pulled toward the prior rather than taken at face value
        assert!(estimate.home_rate < 3.0);
        assert!(estimate.away_rate > 0.0);
    }

    #[test]
    fn test_neutral_venue_removes_advantage() {
        let estimator = GoalEstimator::default();
        let scores = [(1, 1), (1, 1), (1, 1), (1, 1), (1, 1)];
        let inputs = PredictionInputs::new(form("Home", &scores), form("Away", &scores), HeadToHead::empty());

        let home = estimator.estimate(&fixture(), &inputs);
        let neutral = estimator.estimate(&fixture().with_venue(Venue::Neutral), &inputs);

        assert!(home.home_rate > home.away_rate);
        assert!((neutral.home_rate - neutral.away_rate).abs() < 1e-9);
    }

    #[test]
    fn test_configured_max_goals_truncates_matrix() {
        let estimator = GoalEstimator::new(GoalModelConfig { max_goals: 3, ..GoalModelConfig::default() });
        let scores = [(2, 1), (1, 1), (3, 0), (0, 2), (1, 0)];
        let inputs = PredictionInputs::new(form("Home", &scores), form("Away", &scores), HeadToHead::empty());

        let estimate = estimator.estimate(&fixture(), &inputs);
        assert_eq!(estimate.max_goals, 3);

        let matrix = estimate.score_matrix();
        assert_eq!(matrix.max_goals(), 3);
        let probs = estimate.probabilities();
        assert!((probs.home_win + probs.draw + probs.away_win - 1.0).abs() < 1e-9);

        assert_eq!(GoalEstimator::default().estimate(&fixture(), &inputs).score_matrix().max_goals(), MAX_GOALS);
    }

    #[test]
    fn test_head_to_head_pulls_rates() {
        let estimator = GoalEstimator::default();
        let scores = [(1, 1), (1, 1), (1, 1), (1, 1), (1, 1)];
        let meetings: Vec<MatchResult> = (0..4)
            .map(|i| {
                MatchResult::new(
                    Utc::now() - Duration::days(60 * (i + 1)),
                    "Away".to_string(),
                    Ground::Home,
                    4,
                    0,
                )
            })
            .collect();

        let without = estimator.estimate(
            &fixture(),
            &PredictionInputs::new(form("Home", &scores), form("Away", &scores), HeadToHead::empty()),
        );
        let with = estimator.estimate(
            &fixture(),
            &PredictionInputs::new(
                form("Home", &scores),
                form("Away", &scores),
                HeadToHead::new(meetings, Utc::now()),
            ),
        );

        assert!(with.home_rate > without.home_rate);
        assert!(with.away_rate < without.away_rate);
    }

    proptest! {
        #[test]
        fn prop_rates_non_negative_and_support_sums_to_one(
            home in proptest::collection::vec((0u8..7, 0u8..7), 5..20),
            away in proptest::collection::vec((0u8..7, 0u8..7), 5..20),
        ) {
            let estimator = GoalEstimator::default();
            let inputs = PredictionInputs::new(form("Home", &home), form("Away", &away), HeadToHead::empty());
            let estimate = estimator.estimate(&fixture(), &inputs);

            prop_assert!(estimate.home_rate >= 0.0);
            prop_assert!(estimate.away_rate >= 0.0);

            let matrix = estimate.score_matrix();
            prop_assert!((matrix.total_mass() - 1.0).abs() < 1e-9);

            let probs = estimate.probabilities();
            prop_assert!((probs.home_win + probs.draw + probs.away_win - 1.0).abs() < 1e-9);
        }
    }
}
