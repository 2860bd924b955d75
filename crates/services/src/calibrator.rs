//! Confidence calibration.
//!
//! Holds one multiplier per (signal source, market). `blend` reads them,
//! `apply_outcome` is the only path that changes them. Each key sits behind
//! its own mutex so updates to different keys never wait on each other and
//! updates to the same key are applied one after another.

use std::sync::Arc;

use dashmap::DashMap;
use leo_models::{
    CalibrationWeight, LeoError, MarketId, ReviewOutcome, SignalSource, WeightEntry, WeightKey,
    DEFAULT_MULTIPLIER,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub learning_rate: f64,
    pub rule_share: f64,
    pub stat_share: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.05,
            rule_share: 0.6,
            stat_share: 0.4,
        }
    }
}

pub struct ConfidenceCalibrator {
    weights: DashMap<WeightKey, Arc<Mutex<WeightEntry>>>,
    learning_rate: f64,
    rule_share: f64,
    stat_share: f64,
}

impl ConfidenceCalibrator {
    pub fn new(config: &CalibrationConfig) -> Result<Self, LeoError> {
        if !(config.learning_rate > 0.0 && config.learning_rate < 1.0) {
            return Err(LeoError::InvalidLearningRate(config.learning_rate));
        }
        if !(config.rule_share > 0.0 && config.stat_share >= 0.0) {
            return Err(LeoError::Config(format!(
                "source shares must be positive (rule {}, stat {})",
                config.rule_share, config.stat_share
            )));
        }

        Ok(Self {
            weights: DashMap::new(),
            learning_rate: config.learning_rate,
            rule_share: config.rule_share,
            stat_share: config.stat_share,
        })
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Current multiplier, 1.0 for keys never adjusted.
    pub fn weight(&self, source: SignalSource, market: MarketId) -> f64 {
        self.weights
            .get(&WeightKey::new(source, market))
            .map_or(DEFAULT_MULTIPLIER, |cell| cell.lock().multiplier)
    }

    /// Share-weighted mean of the calibrated source probabilities. A missing
    /// statistical opinion drops out of both numerator and denominator.
    pub fn blend(&self, rule_probability: f64, stat_probability: Option<f64>, market: MarketId) -> f64 {
        let mut numerator =
            self.rule_share * self.weight(SignalSource::RuleBased, market) * rule_probability;
        let mut denominator = self.rule_share;

        if let Some(p) = stat_probability {
            numerator += self.stat_share * self.weight(SignalSource::Statistical, market) * p;
            denominator += self.stat_share;
        }

        if denominator <= 0.0 || !numerator.is_finite() {
            return 0.0;
        }
        (numerator / denominator).clamp(0.0, 1.0)
    }

    fn cell(&self, key: WeightKey) -> Arc<Mutex<WeightEntry>> {
        self.weights
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(WeightEntry::initial())))
            .clone()
    }

    fn adjust(&self, key: WeightKey, correct: bool) -> WeightEntry {
        let factor = if correct {
            1.0 + self.learning_rate
        } else {
            1.0 - self.learning_rate
        };

        let cell = self.cell(key);
        let mut entry = cell.lock();
        *entry = entry.scaled(factor);
        debug!(%key, multiplier = entry.multiplier, revision = entry.revision, correct, "weight adjusted");
        *entry
    }

    /// Adjusts every source that contributed to the reviewed decision and
    /// returns the new entries for persistence.
    pub fn apply_outcome(&self, outcome: &ReviewOutcome) -> Vec<CalibrationWeight> {
        let mut sources = outcome.sources.clone();
        sources.sort();
        sources.dedup();

        sources
            .into_iter()
            .map(|source| {
                let key = WeightKey::new(source, outcome.pick.market);
                CalibrationWeight::new(key, self.adjust(key, outcome.market_correct))
            })
            .collect()
    }

    pub fn snapshot(&self) -> Vec<CalibrationWeight> {
        let mut weights: Vec<CalibrationWeight> = self
            .weights
            .iter()
            .map(|item| CalibrationWeight::new(*item.key(), *item.value().lock()))
            .collect();
        weights.sort_by_key(CalibrationWeight::key);
        weights
    }

    /// Loads persisted weights. An entry only replaces what is held when its
    /// revision is newer.
    pub fn restore(&self, weights: impl IntoIterator<Item = CalibrationWeight>) -> usize {
        let mut restored = 0;
        for weight in weights {
            let cell = self.cell(weight.key());
            let mut entry = cell.lock();
            if weight.revision > entry.revision {
                *entry = weight.entry();
                restored += 1;
            }
        }
        restored
    }
}

impl Default for ConfidenceCalibrator {
    fn default() -> Self {
        Self {
            weights: DashMap::new(),
            learning_rate: CalibrationConfig::default().learning_rate,
            rule_share: CalibrationConfig::default().rule_share,
            stat_share: CalibrationConfig::default().stat_share,
        }
    }
}
