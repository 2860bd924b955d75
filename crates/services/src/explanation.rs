// Reasoning tags for auditability

use leo_ml::{GoalRateEstimate, MarketProbabilities};

use crate::selector::{Candidate, ThresholdTable};

/// Expected-goal gap under which neither side is said to have the edge.
pub const CLOSE_XG_MARGIN: f64 = 0.5;
pub const HIGH_SCORING_TOTAL: f64 = 3.0;
pub const LOW_SCORING_TOTAL: f64 = 2.0;
pub const STRONG_ATTACK_RATE: f64 = 2.0;

/// Derives the ordered tag list from what the selector saw. Calibration
/// state never enters here, so identical inputs always explain identically.
pub fn explain(
    estimate: &GoalRateEstimate,
    probabilities: &MarketProbabilities,
    thresholds: &ThresholdTable,
    candidate: Option<&Candidate>,
) -> Vec<String> {
    let mut tags = Vec::new();

    if estimate.low_confidence {
        tags.push("low-data".to_string());
    }

    let diff = estimate.rate_differential();
    tags.push(
        if diff >= CLOSE_XG_MARGIN {
            "home-xg-advantage"
        } else if diff <= -CLOSE_XG_MARGIN {
            "away-xg-advantage"
        } else {
            "close-xg"
        }
        .to_string(),
    );

    let total = estimate.total_rate();
    if total >= HIGH_SCORING_TOTAL {
        tags.push("high-scoring".to_string());
    } else if total <= LOW_SCORING_TOTAL {
        tags.push("low-scoring".to_string());
    }

    if estimate.home_rate >= STRONG_ATTACK_RATE {
        tags.push("home-scores-2+".to_string());
    }
    if estimate.away_rate >= STRONG_ATTACK_RATE {
        tags.push("away-scores-2+".to_string());
    }

    if probabilities.btts >= thresholds.btts_probability {
        tags.push("both-teams-score-high".to_string());
    } else if probabilities.btts <= 1.0 - thresholds.btts_probability {
        tags.push("both-teams-score-low".to_string());
    }

    if probabilities.over_2_5 >= thresholds.over_2_5_probability {
        tags.push("over-2.5-likely".to_string());
    } else if probabilities.over_2_5 <= thresholds.under_2_5_probability {
        tags.push("under-2.5-likely".to_string());
    }

    if let Some(candidate) = candidate {
        tags.push(format!("rule:{}", candidate.rule));
    }

    tags
}
