use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use crate::error::{LeoError, Result};
use crate::market::MarketId;

/// Lower bound for any calibration multiplier.
pub const MIN_MULTIPLIER: f64 = 0.1;

/// Upper bound for any calibration multiplier.
pub const MAX_MULTIPLIER: f64 = 3.0;

pub const DEFAULT_MULTIPLIER: f64 = 1.0;

pub fn clamp_multiplier(value: f64) -> f64 {
    if value.is_nan() {
        return DEFAULT_MULTIPLIER;
    }
    value.clamp(MIN_MULTIPLIER, MAX_MULTIPLIER)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    RuleBased,
    Statistical,
}

impl SignalSource {
    pub fn code(&self) -> &'static str {
        match self {
            SignalSource::RuleBased => "rule_based",
            SignalSource::Statistical => "statistical",
        }
    }
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for SignalSource {
    type Err = LeoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rule_based" => Ok(SignalSource::RuleBased),
            "statistical" => Ok(SignalSource::Statistical),
            other => Err(LeoError::UnknownSource(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WeightKey {
    pub source: SignalSource,
    pub market: MarketId,
}

impl WeightKey {
    pub fn new(source: SignalSource, market: MarketId) -> Self {
        Self { source, market }
    }
}

impl fmt::Display for WeightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source, self.market)
    }
}

/// Current value of one calibration multiplier.
///
/// `revision` increases by one on every adjustment; stores use it to refuse
/// writes older than what they already hold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WeightEntry {
    pub multiplier: f64,
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
}

impl WeightEntry {
    pub fn initial() -> Self {
        Self {
            multiplier: DEFAULT_MULTIPLIER,
            revision: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            multiplier: clamp_multiplier(self.multiplier * factor),
            revision: self.revision + 1,
            updated_at: Utc::now(),
        }
    }
}

/// Flat, persistable view of one weight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CalibrationWeight {
    pub source: SignalSource,
    pub market: MarketId,
    pub multiplier: f64,
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
}

impl CalibrationWeight {
    pub fn new(key: WeightKey, entry: WeightEntry) -> Self {
        Self {
            source: key.source,
            market: key.market,
            multiplier: entry.multiplier,
            revision: entry.revision,
            updated_at: entry.updated_at,
        }
    }

    pub fn key(&self) -> WeightKey {
        WeightKey::new(self.source, self.market)
    }

    pub fn entry(&self) -> WeightEntry {
        WeightEntry {
            multiplier: clamp_multiplier(self.multiplier),
            revision: self.revision,
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_multiplier() {
        assert_eq!(clamp_multiplier(5.0), MAX_MULTIPLIER);
        assert_eq!(clamp_multiplier(0.0), MIN_MULTIPLIER);
        assert_eq!(clamp_multiplier(1.3), 1.3);
        assert_eq!(clamp_multiplier(f64::NAN), DEFAULT_MULTIPLIER);
    }

    #[test]
    fn test_scaled_entry_bumps_revision() {
        let entry = WeightEntry::initial();
        let up = entry.scaled(1.1);

        assert!((up.multiplier - 1.1).abs() < 1e-12);
        assert_eq!(up.revision, 1);
        assert_eq!(up.scaled(100.0).multiplier, MAX_MULTIPLIER);
    }

    #[test]
    fn test_source_codes() {
        assert_eq!("statistical".parse::<SignalSource>().unwrap(), SignalSource::Statistical);
        assert_eq!(SignalSource::RuleBased.to_string(), "rule_based");
        assert!("gut_feeling".parse::<SignalSource>().is_err());
    }
}
