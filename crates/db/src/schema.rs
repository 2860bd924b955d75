use chrono::{DateTime, Utc};
use leo_models::{
    CalibrationWeight, FinalScore, Fixture, Ground, MatchResult, Pick, PredictionDecision,
    ReviewOutcome, SignalSource, StandingsContext, Venue,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

fn corrupt(what: &str, value: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(format!("{what}: {value}"))
}

fn small(value: i32, what: &str) -> StoreResult<u8> {
    u8::try_from(value).map_err(|_| corrupt(what, value))
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FixtureRecord {
    pub fixture_id: String,
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub kickoff: DateTime<Utc>,
    pub venue: String,
    pub home_position: Option<i32>,
    pub away_position: Option<i32>,
    pub league_size: Option<i32>,
    pub status: String,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
}

impl FixtureRecord {
    pub fn into_fixture(self) -> StoreResult<Fixture> {
        let venue = match self.venue.as_str() {
            "home" => Venue::Home,
            "neutral" => Venue::Neutral,
            other => return Err(corrupt("venue", other)),
        };

        let mut fixture = Fixture::new(
            self.fixture_id,
            self.league,
            self.home_team,
            self.away_team,
            self.kickoff,
        )
        .with_venue(venue);

        if let (Some(h), Some(a), Some(n)) = (self.home_position, self.away_position, self.league_size) {
            let position = |v: i32| u16::try_from(v).map_err(|_| corrupt("standings", v));
            fixture = fixture.with_standings(StandingsContext {
                home_position: position(h)?,
                away_position: position(a)?,
                league_size: position(n)?,
            });
        }
        Ok(fixture)
    }

    /// The final score, once the fixture is marked finished.
    pub fn final_score(&self) -> StoreResult<Option<FinalScore>> {
        if self.status != "finished" {
            return Ok(None);
        }
        match (self.home_score, self.away_score) {
            (Some(h), Some(a)) => Ok(Some(FinalScore::new(small(h, "home_score")?, small(a, "away_score")?))),
            _ => Ok(None),
        }
    }

    pub fn venue_code(venue: Venue) -> &'static str {
        match venue {
            Venue::Home => "home",
            Venue::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TeamResultRecord {
    pub team: String,
    pub played_at: DateTime<Utc>,
    pub opponent: String,
    pub ground: String,
    pub goals_for: i32,
    pub goals_against: i32,
}

impl TryFrom<TeamResultRecord> for MatchResult {
    type Error = StoreError;

    fn try_from(r: TeamResultRecord) -> StoreResult<Self> {
        let ground = match r.ground.as_str() {
            "home" => Ground::Home,
            "away" => Ground::Away,
            other => return Err(corrupt("ground", other)),
        };
        Ok(MatchResult::new(
            r.played_at,
            r.opponent,
            ground,
            small(r.goals_for, "goals_for")?,
            small(r.goals_against, "goals_against")?,
        ))
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: Uuid,
    pub fixture_id: String,
    pub kickoff: DateTime<Utc>,
    pub market: Option<String>,
    pub selection: Option<String>,
    pub confidence: f64,
    pub rule_confidence: f64,
    pub stat_probability: Option<f64>,
    pub reasoning: Vec<String>,
    pub status: String,
    pub skip_reason: Option<String>,
    pub sources: Vec<String>,
    pub home_rate: f64,
    pub away_rate: f64,
    pub low_confidence: bool,
    pub thresholds_version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn parse_sources(codes: &[String]) -> StoreResult<Vec<SignalSource>> {
    codes
        .iter()
        .map(|c| c.parse::<SignalSource>().map_err(StoreError::from))
        .collect()
}

fn source_codes(sources: &[SignalSource]) -> Vec<String> {
    sources.iter().map(|s| s.code().to_string()).collect()
}

fn parse_pick(market: &str, selection: &str) -> StoreResult<Pick> {
    Ok(Pick::new(market.parse()?, selection.parse()?)?)
}

impl From<&PredictionDecision> for DecisionRecord {
    fn from(d: &PredictionDecision) -> Self {
        Self {
            id: d.id,
            fixture_id: d.fixture_id.clone(),
            kickoff: d.kickoff,
            market: d.pick.map(|p| p.market.code().to_string()),
            selection: d.pick.map(|p| p.selection.code()),
            confidence: d.confidence,
            rule_confidence: d.rule_confidence,
            stat_probability: d.stat_probability,
            reasoning: d.reasoning.clone(),
            status: d.status.code().to_string(),
            skip_reason: d.skip_reason.map(|r| r.code().to_string()),
            sources: source_codes(&d.sources),
            home_rate: d.home_rate,
            away_rate: d.away_rate,
            low_confidence: d.low_confidence,
            thresholds_version: d.thresholds_version.clone(),
            created_at: d.created_at,
            updated_at: d.updated_at,
        }
    }
}

impl TryFrom<DecisionRecord> for PredictionDecision {
    type Error = StoreError;

    fn try_from(r: DecisionRecord) -> StoreResult<Self> {
        let pick = match (r.market.as_deref(), r.selection.as_deref()) {
            (Some(market), Some(selection)) => Some(parse_pick(market, selection)?),
            _ => None,
        };

        Ok(Self {
            id: r.id,
            fixture_id: r.fixture_id,
            kickoff: r.kickoff,
            pick,
            confidence: r.confidence,
            rule_confidence: r.rule_confidence,
            stat_probability: r.stat_probability,
            reasoning: r.reasoning,
            status: r.status.parse()?,
            skip_reason: r.skip_reason.as_deref().map(str::parse).transpose()?,
            sources: parse_sources(&r.sources)?,
            home_rate: r.home_rate,
            away_rate: r.away_rate,
            low_confidence: r.low_confidence,
            thresholds_version: r.thresholds_version,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ReviewOutcomeRecord {
    pub decision_id: Uuid,
    pub fixture_id: String,
    pub market: String,
    pub selection: String,
    pub sources: Vec<String>,
    pub confidence: f64,
    pub home_score: i32,
    pub away_score: i32,
    pub market_correct: bool,
    pub reviewed_at: DateTime<Utc>,
}

impl From<&ReviewOutcome> for ReviewOutcomeRecord {
    fn from(o: &ReviewOutcome) -> Self {
        Self {
            decision_id: o.decision_id,
            fixture_id: o.fixture_id.clone(),
            market: o.pick.market.code().to_string(),
            selection: o.pick.selection.code(),
            sources: source_codes(&o.sources),
            confidence: o.confidence,
            home_score: i32::from(o.final_score.home),
            away_score: i32::from(o.final_score.away),
            market_correct: o.market_correct,
            reviewed_at: o.reviewed_at,
        }
    }
}

impl TryFrom<ReviewOutcomeRecord> for ReviewOutcome {
    type Error = StoreError;

    fn try_from(r: ReviewOutcomeRecord) -> StoreResult<Self> {
        Ok(Self {
            decision_id: r.decision_id,
            fixture_id: r.fixture_id,
            pick: parse_pick(&r.market, &r.selection)?,
            sources: parse_sources(&r.sources)?,
            confidence: r.confidence,
            final_score: FinalScore::new(small(r.home_score, "home_score")?, small(r.away_score, "away_score")?),
            market_correct: r.market_correct,
            reviewed_at: r.reviewed_at,
        })
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CalibrationWeightRecord {
    pub source: String,
    pub market: String,
    pub multiplier: f64,
    pub revision: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<&CalibrationWeight> for CalibrationWeightRecord {
    fn from(w: &CalibrationWeight) -> Self {
        Self {
            source: w.source.code().to_string(),
            market: w.market.code().to_string(),
            multiplier: w.multiplier,
            revision: i64::try_from(w.revision).unwrap_or(i64::MAX),
            updated_at: w.updated_at,
        }
    }
}

impl TryFrom<CalibrationWeightRecord> for CalibrationWeight {
    type Error = StoreError;

    fn try_from(r: CalibrationWeightRecord) -> StoreResult<Self> {
        Ok(Self {
            source: r.source.parse()?,
            market: r.market.parse()?,
            multiplier: leo_models::clamp_multiplier(r.multiplier),
            revision: u64::try_from(r.revision).map_err(|_| corrupt("revision", r.revision))?,
            updated_at: r.updated_at,
        })
    }
}
