// Statistical predictor

use std::collections::{BTreeSet, HashMap};

use leo_models::{FinalScore, MarketCatalog, ProbabilityQuery};
use linfa::traits::Fit;
use linfa::Dataset;
use linfa_logistic::LogisticRegression;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::MlError;
use crate::features::{MatchFeatures, FEATURE_COUNT};

/// What a statistical model has to say about one selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatOpinion {
    NoOpinion,
    Estimate { probability: f64 },
}

impl StatOpinion {
    pub fn probability(&self) -> Option<f64> {
        match self {
            StatOpinion::NoOpinion => None,
            StatOpinion::Estimate { probability } => Some(*probability),
        }
    }
}

pub trait StatisticalModel: Send + Sync {
    fn model_name(&self) -> &str;
    fn model_version(&self) -> &str;

    /// Probability that `selection` holds; `NoOpinion` when the fixture's
    /// league or the selection is not covered.
    fn opinion(&self, features: &MatchFeatures, selection: &ProbabilityQuery) -> StatOpinion;

    /// The model's own favourite selection, if it covers the fixture at all.
    fn best_guess(&self, features: &MatchFeatures) -> Option<(ProbabilityQuery, f64)>;
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// One binary logistic head.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogisticHead {
    pub weights: Vec<f64>,
    pub intercept: f64,
}

impl LogisticHead {
    pub fn probability(&self, x: &ArrayView1<f64>) -> f64 {
        if self.weights.len() != x.len() {
            return 0.5;
        }
        let w = ArrayView1::from(&self.weights[..]);
        sigmoid(w.dot(x) + self.intercept)
    }

    fn negated(&self) -> Self {
        Self {
            weights: self.weights.iter().map(|w| -w).collect(),
            intercept: -self.intercept,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Samples a league needs before the model offers opinions on it.
    pub min_league_samples: usize,
    pub min_samples: usize,
    pub max_iterations: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_league_samples: 20,
            min_samples: 30,
            max_iterations: 200,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainingSample {
    pub features: MatchFeatures,
    pub final_score: FinalScore,
}

impl TrainingSample {
    pub fn new(features: MatchFeatures, final_score: FinalScore) -> Self {
        Self { features, final_score }
    }
}

/// Per-selection logistic heads over [`MatchFeatures`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticMarketModel {
    name: String,
    version: String,
    leagues: BTreeSet<String>,
    heads: HashMap<ProbabilityQuery, LogisticHead>,
}

impl LogisticMarketModel {
    /// A model that covers nothing and therefore never has an opinion.
    pub fn untrained() -> Self {
        Self {
            name: "logistic_market".to_string(),
            version: "0".to_string(),
            leagues: BTreeSet::new(),
            heads: HashMap::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, MlError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, MlError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_head(mut self, selection: ProbabilityQuery, head: LogisticHead) -> Self {
        self.heads.insert(selection, head);
        self
    }

    pub fn with_league(mut self, league: impl Into<String>) -> Self {
        self.leagues.insert(league.into());
        self
    }

    pub fn covers(&self, league: &str) -> bool {
        self.leagues.contains(league)
    }

    pub fn head_count(&self) -> usize {
        self.heads.len()
    }

    pub fn train(samples: &[TrainingSample], config: &TrainingConfig) -> Result<Self, MlError> {
        let samples: Vec<&TrainingSample> =
            samples.iter().filter(|s| s.features.is_finite()).collect();
        if samples.len() < config.min_samples {
            return Err(MlError::InsufficientSamples {
                got: samples.len(),
                need: config.min_samples,
            });
        }

        let mut per_league: HashMap<&str, usize> = HashMap::new();
        for sample in &samples {
            *per_league.entry(sample.features.league.as_str()).or_default() += 1;
        }
        let leagues: BTreeSet<String> = per_league
            .into_iter()
            .filter(|(_, n)| *n >= config.min_league_samples)
            .map(|(league, _)| league.to_string())
            .collect();

        let flat: Vec<f64> = samples
            .iter()
            .flat_map(|s| s.features.values.iter().copied())
            .collect();
        let records = Array2::from_shape_vec((samples.len(), FEATURE_COUNT), flat)?;

        let mut heads = HashMap::new();
        for selection in MarketCatalog::standard().selections() {
            let targets: Array1<bool> = samples
                .iter()
                .map(|s| {
                    selection.is_satisfied(
                        u32::from(s.final_score.home),
                        u32::from(s.final_score.away),
                    )
                })
                .collect();

            let positives = targets.iter().filter(|t| **t).count();
            if positives == 0 || positives == targets.len() {
                debug!(%selection, "single-class targets, no head trained");
                continue;
            }

            match fit_head(&records, targets, config.max_iterations) {
                Ok(head) => {
                    heads.insert(selection, head);
                }
                Err(e) => warn!(%selection, error = %e, "logistic head failed to train"),
            }
        }

        info!(
            "🧠 Trained logistic market model: {} heads, {} leagues, {} samples",
            heads.len(),
            leagues.len(),
            samples.len()
        );

        Ok(Self {
            name: "logistic_market".to_string(),
            version: "1".to_string(),
            leagues,
            heads,
        })
    }
}

fn fit_head(records: &Array2<f64>, targets: Array1<bool>, max_iterations: u64) -> Result<LogisticHead, MlError> {
    let dataset = Dataset::new(records.clone(), targets);
    let fitted = LogisticRegression::default()
        .max_iterations(max_iterations)
        .fit(&dataset)
        .map_err(|e| MlError::Training(e.to_string()))?;

    let head = LogisticHead {
        weights: fitted.params().to_vec(),
        intercept: fitted.intercept(),
    };

    // linfa picks the positive class itself; the head always scores `true`.
    if fitted.labels().pos.class {
        Ok(head)
    } else {
        Ok(head.negated())
    }
}

impl StatisticalModel for LogisticMarketModel {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn model_version(&self) -> &str {
        &self.version
    }

    fn opinion(&self, features: &MatchFeatures, selection: &ProbabilityQuery) -> StatOpinion {
        if !self.covers(&features.league) || !features.is_finite() {
            return StatOpinion::NoOpinion;
        }
        match self.heads.get(selection) {
            Some(head) => StatOpinion::Estimate {
                probability: head.probability(&features.to_array().view()).clamp(0.0, 1.0),
            },
            None => StatOpinion::NoOpinion,
        }
    }

    fn best_guess(&self, features: &MatchFeatures) -> Option<(ProbabilityQuery, f64)> {
        let mut best: Option<(ProbabilityQuery, f64)> = None;
        for selection in MarketCatalog::standard().selections() {
            if let Some(p) = self.opinion(features, &selection).probability() {
                if best.map_or(true, |(_, bp)| p > bp) {
                    best = Some((selection, p));
                }
            }
        }
        best
    }
}
