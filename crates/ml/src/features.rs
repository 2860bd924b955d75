// Feature engineering

use leo_models::{Fixture, PredictionInputs, TeamForm};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

pub const FEATURE_COUNT: usize = 8;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "ppg_diff",
    "goal_diff_per_game_diff",
    "home_scoring",
    "away_scoring",
    "home_conceding",
    "away_conceding",
    "standings_gap",
    "h2h_balance",
];

// League-wide fallbacks for a side with no recorded matches.
const DEFAULT_GOALS_PER_GAME: f64 = 1.3;
const DEFAULT_POINTS_PER_GAME: f64 = 1.35;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchFeatures {
    pub league: String,
    pub values: [f64; FEATURE_COUNT],
}

impl MatchFeatures {
    pub fn new(league: impl Into<String>, values: [f64; FEATURE_COUNT]) -> Self {
        Self { league: league.into(), values }
    }

    pub fn to_array(&self) -> Array1<f64> {
        Array1::from(self.values.to_vec())
    }

    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    pub fn named(&self) -> Vec<(&'static str, f64)> {
        FEATURE_NAMES.iter().copied().zip(self.values).collect()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.values[i])
    }
}

#[derive(Debug, Default)]
pub struct FeatureEngineer;

impl FeatureEngineer {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, fixture: &Fixture, inputs: &PredictionInputs) -> MatchFeatures {
        let home = &inputs.home_form;
        let away = &inputs.away_form;

        let ppg_diff = ppg(home) - ppg(away);
        let gd_diff = home.goal_difference_per_game().unwrap_or(0.0)
            - away.goal_difference_per_game().unwrap_or(0.0);

        let standings_gap = fixture
            .standings
            .filter(|s| s.league_size > 1)
            .map_or(0.0, |s| {
                (f64::from(s.away_position) - f64::from(s.home_position)) / f64::from(s.league_size)
            });

        let tally = inputs.head_to_head.tally();
        let h2h_balance = if tally.meetings() == 0 {
            0.0
        } else {
            (f64::from(tally.home_wins) - f64::from(tally.away_wins)) / f64::from(tally.meetings())
        };

        MatchFeatures::new(
            fixture.league.clone(),
            [
                ppg_diff,
                gd_diff,
                home.scoring_average().unwrap_or(DEFAULT_GOALS_PER_GAME),
                away.scoring_average().unwrap_or(DEFAULT_GOALS_PER_GAME),
                home.conceding_average().unwrap_or(DEFAULT_GOALS_PER_GAME),
                away.conceding_average().unwrap_or(DEFAULT_GOALS_PER_GAME),
                standings_gap,
                h2h_balance,
            ],
        )
    }
}

fn ppg(form: &TeamForm) -> f64 {
    form.points_per_game().unwrap_or(DEFAULT_POINTS_PER_GAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use leo_models::{Ground, HeadToHead, MatchResult, StandingsContext};

    fn form(team: &str, scores: &[(u8, u8)]) -> TeamForm {
        let results = scores
            .iter()
            .enumerate()
            .map(|(i, (f, a))| {
                MatchResult::new(
                    Utc::now() - Duration::days(10 * (i as i64 + 1)),
                    "Rival".to_string(),
                    Ground::Away,
                    *f,
                    *a,
                )
            })
            .collect();
        TeamForm::new(team, results, Utc::now())
    }

    #[test]
    fn test_extract_features() {
        let fixture = Fixture::new(
            "fx_9".to_string(),
            "Serie A".to_string(),
            "Inter".to_string(),
            "Lecce".to_string(),
            Utc::now() + Duration::hours(3),
        )
        .with_standings(StandingsContext { home_position: 1, away_position: 17, league_size: 20 });

        let inputs = PredictionInputs::new(
            form("Inter", &[(2, 0), (3, 1), (1, 1)]),
            form("Lecce", &[(0, 1), (1, 2), (0, 0)]),
            HeadToHead::empty(),
        );

        let features = FeatureEngineer::new().extract(&fixture, &inputs);

        assert_eq!(features.league, "Serie A");
        assert!(features.get("ppg_diff").unwrap() > 0.0);
        assert!((features.get("standings_gap").unwrap() - 0.8).abs() < 1e-9);
        assert_eq!(features.get("h2h_balance"), Some(0.0));
        assert_eq!(features.to_array().len(), FEATURE_COUNT);
        assert!(features.is_finite());
    }

    #[test]
    fn test_empty_history_uses_fallbacks() {
        let fixture = Fixture::new(
            "fx_10".to_string(),
            "Serie A".to_string(),
            "A".to_string(),
            "B".to_string(),
            Utc::now(),
        );
        let inputs = PredictionInputs::new(form("A", &[]), form("B", &[]), HeadToHead::empty());

        let features = FeatureEngineer::new().extract(&fixture, &inputs);
        assert_eq!(features.get("ppg_diff"), Some(0.0));
        assert_eq!(features.get("home_scoring"), Some(DEFAULT_GOALS_PER_GAME));
    }
}
