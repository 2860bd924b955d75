// Property checks across the estimator, selector and calibrator

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use leo_ml::{FeatureEngineer, GoalEstimator};
use leo_models::{
    FinalScore, HeadToHead, MarketId, PredictionInputs, ProbabilityQuery, ReviewOutcome,
    SignalSource, TeamForm, MAX_MULTIPLIER, MIN_MULTIPLIER,
};
use leo_services::{ConfidenceCalibrator, ThresholdTable};
use proptest::prelude::*;

fn scores() -> impl Strategy<Value = Vec<(u8, u8)>> {
    proptest::collection::vec((0u8..8, 0u8..8), 0..25)
}

fn inputs(home: &[(u8, u8)], away: &[(u8, u8)], h2h: &[(u8, u8)]) -> PredictionInputs {
    let now = Utc::now();
    PredictionInputs::new(
        TeamForm::new("Home FC", common::results(home, now), now),
        TeamForm::new("Away FC", common::results(away, now), now),
        HeadToHead::new(common::results(h2h, now), now),
    )
}

proptest! {
    #[test]
    fn prop_rates_non_negative_and_mass_sums_to_one(
        home in scores(),
        away in scores(),
        h2h in proptest::collection::vec((0u8..6, 0u8..6), 0..6),
    ) {
        let fixture = common::fixture("fx_prop", "Home FC", "Away FC", Utc::now() + Duration::days(1));
        let estimate = GoalEstimator::default().estimate(&fixture, &inputs(&home, &away, &h2h));

        prop_assert!(estimate.home_rate >= 0.0);
        prop_assert!(estimate.away_rate >= 0.0);
        prop_assert!((estimate.score_matrix().total_mass() - 1.0).abs() < 1e-9);

        let p = estimate.probabilities();
        prop_assert!((p.home_win + p.draw + p.away_win - 1.0).abs() < 1e-9);
    }

    #[test]
    fn prop_decisions_are_deterministic(
        home in scores(),
        away in scores(),
    ) {
        let fixture = common::fixture("fx_det", "Home FC", "Away FC", Utc::now() + Duration::days(1));
        let inputs = inputs(&home, &away, &[]);
        let orchestrator = common::orchestrator(
            ThresholdTable::default(),
            Arc::new(ConfidenceCalibrator::default()),
        );

        let first = orchestrator.predict(&fixture, &inputs).unwrap();
        let second = orchestrator.predict(&fixture, &inputs).unwrap();

        prop_assert_eq!(first.status, second.status);
        prop_assert_eq!(first.pick, second.pick);
        prop_assert_eq!(first.skip_reason, second.skip_reason);
        prop_assert_eq!(&first.reasoning, &second.reasoning);
        prop_assert!((first.confidence - second.confidence).abs() < 1e-12);
        prop_assert!((0.0..=1.0).contains(&first.confidence));
    }

    #[test]
    fn prop_features_stay_finite(home in scores(), away in scores()) {
        let fixture = common::fixture("fx_feat", "Home FC", "Away FC", Utc::now() + Duration::days(1));
        let features = FeatureEngineer::new().extract(&fixture, &inputs(&home, &away, &[]));
        prop_assert!(features.is_finite());
    }

    #[test]
    fn prop_weights_bounded_under_any_history(
        history in proptest::collection::vec((0u8..5, 0u8..5, 0usize..3), 0..300),
    ) {
        let calibrator = ConfidenceCalibrator::default();
        let selections = [
            ProbabilityQuery::HomeWin,
            ProbabilityQuery::BothTeamsScore,
            ProbabilityQuery::TotalUnder { goals: 2 },
        ];

        for (home, away, index) in history {
            let decision = common::decision_with_pick("fx_hist", Utc::now(), selections[index]);
            let outcome = ReviewOutcome::settle(&decision, FinalScore::new(home, away)).unwrap();
            calibrator.apply_outcome(&outcome);
        }

        for market in [MarketId::MatchResult, MarketId::BothTeamsToScore, MarketId::OverUnder25] {
            let weight = calibrator.weight(SignalSource::RuleBased, market);
            prop_assert!((MIN_MULTIPLIER..=MAX_MULTIPLIER).contains(&weight));
        }
    }
}
