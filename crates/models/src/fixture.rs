use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use crate::error::{LeoError, Result};

/// Trailing horizon for form and head-to-head history.
pub const FORM_WINDOW_MONTHS: u32 = 18;

/// Upper bound on the number of matches kept per form window.
pub const MAX_FORM_MATCHES: usize = 40;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Venue {
    #[default]
    Home,
    Neutral,
}

/// Which side of a past match the team was on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Ground {
    Home,
    Away,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StandingsContext {
    pub home_position: u16,
    pub away_position: u16,
    pub league_size: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fixture {
    pub fixture_id: String,
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub kickoff: DateTime<Utc>,
    #[serde(default)]
    pub venue: Venue,
    #[serde(default)]
    pub standings: Option<StandingsContext>,
}

impl Fixture {
    pub fn new(
        fixture_id: String,
        league: String,
        home_team: String,
        away_team: String,
        kickoff: DateTime<Utc>,
    ) -> Self {
        Self {
            fixture_id,
            league,
            home_team,
            away_team,
            kickoff,
            venue: Venue::Home,
            standings: None,
        }
    }

    pub fn with_venue(mut self, venue: Venue) -> Self {
        self.venue = venue;
        self
    }

    pub fn with_standings(mut self, standings: StandingsContext) -> Self {
        self.standings = Some(standings);
        self
    }

    /// True once kickoff plus the expected match duration lies in the past.
    pub fn is_concluded(&self, now: DateTime<Utc>, match_duration: Duration) -> bool {
        concluded(self.kickoff, now, match_duration)
    }
}

pub fn concluded(kickoff: DateTime<Utc>, now: DateTime<Utc>, match_duration: Duration) -> bool {
    kickoff + match_duration <= now
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchResult {
    pub played_at: DateTime<Utc>,
    pub opponent: String,
    pub ground: Ground,
    pub goals_for: u8,
    pub goals_against: u8,
}

impl MatchResult {
    pub fn new(
        played_at: DateTime<Utc>,
        opponent: String,
        ground: Ground,
        goals_for: u8,
        goals_against: u8,
    ) -> Self {
        Self { played_at, opponent, ground, goals_for, goals_against }
    }

    pub fn points(&self) -> u8 {
        match self.goals_for.cmp(&self.goals_against) {
            std::cmp::Ordering::Greater => 3,
            std::cmp::Ordering::Equal => 1,
            std::cmp::Ordering::Less => 0,
        }
    }

    pub fn goal_difference(&self) -> i16 {
        i16::from(self.goals_for) - i16::from(self.goals_against)
    }
}

fn window_start(as_of: DateTime<Utc>) -> DateTime<Utc> {
    as_of
        .checked_sub_months(Months::new(FORM_WINDOW_MONTHS))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn windowed(results: Vec<MatchResult>, as_of: DateTime<Utc>) -> Vec<MatchResult> {
    let start = window_start(as_of);
    let mut kept: Vec<MatchResult> = results
        .into_iter()
        .filter(|r| r.played_at >= start && r.played_at <= as_of)
        .collect();
    kept.sort_by(|a, b| b.played_at.cmp(&a.played_at));
    kept.truncate(MAX_FORM_MATCHES);
    kept
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

/// A team's recent results, restricted to the trailing form window.
///
/// Built wholesale from raw results; there is no way to push into an
/// existing form, so new results mean a new `TeamForm`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TeamForm {
    team: String,
    as_of: DateTime<Utc>,
    results: Vec<MatchResult>,
}

impl TeamForm {
    pub fn new(team: impl Into<String>, results: Vec<MatchResult>, as_of: DateTime<Utc>) -> Self {
        Self {
            team: team.into(),
            as_of,
            results: windowed(results, as_of),
        }
    }

    pub fn team(&self) -> &str {
        &self.team
    }

    pub fn as_of(&self) -> DateTime<Utc> {
        self.as_of
    }

    /// Most recent first.
    pub fn results(&self) -> &[MatchResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn scoring_average(&self) -> Option<f64> {
        mean(self.results.iter().map(|r| f64::from(r.goals_for)))
    }

    pub fn conceding_average(&self) -> Option<f64> {
        mean(self.results.iter().map(|r| f64::from(r.goals_against)))
    }

    pub fn points_per_game(&self) -> Option<f64> {
        mean(self.results.iter().map(|r| f64::from(r.points())))
    }

    pub fn goal_difference_per_game(&self) -> Option<f64> {
        mean(self.results.iter().map(|r| f64::from(r.goal_difference())))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct HeadToHeadTally {
    pub home_wins: u32,
    pub draws: u32,
    pub away_wins: u32,
}

impl HeadToHeadTally {
    pub fn meetings(&self) -> u32 {
        self.home_wins + self.draws + self.away_wins
    }
}

/// Past meetings, recorded from the perspective of the fixture's home team.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct HeadToHead {
    results: Vec<MatchResult>,
}

impl HeadToHead {
    pub fn new(results: Vec<MatchResult>, as_of: DateTime<Utc>) -> Self {
        Self { results: windowed(results, as_of) }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn results(&self) -> &[MatchResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn tally(&self) -> HeadToHeadTally {
        self.results.iter().fold(HeadToHeadTally::default(), |mut t, r| {
            match r.points() {
                3 => t.home_wins += 1,
                1 => t.draws += 1,
                _ => t.away_wins += 1,
            }
            t
        })
    }

    pub fn home_goals_average(&self) -> Option<f64> {
        mean(self.results.iter().map(|r| f64::from(r.goals_for)))
    }

    pub fn away_goals_average(&self) -> Option<f64> {
        mean(self.results.iter().map(|r| f64::from(r.goals_against)))
    }
}

/// Everything the prediction path needs besides the fixture itself.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PredictionInputs {
    pub home_form: TeamForm,
    pub away_form: TeamForm,
    pub head_to_head: HeadToHead,
}

impl PredictionInputs {
    pub fn new(home_form: TeamForm, away_form: TeamForm, head_to_head: HeadToHead) -> Self {
        Self { home_form, away_form, head_to_head }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FinalScore {
    pub home: u8,
    pub away: u8,
}

impl FinalScore {
    pub fn new(home: u8, away: u8) -> Self {
        Self { home, away }
    }

    pub fn total(&self) -> u32 {
        u32::from(self.home) + u32::from(self.away)
    }
}

impl fmt::Display for FinalScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.home, self.away)
    }
}

impl FromStr for FinalScore {
    type Err = LeoError;

    fn from_str(s: &str) -> Result<Self> {
        let (home, away) = s
            .split_once('-')
            .ok_or_else(|| LeoError::InvalidScore(s.to_string()))?;
        let home = home.trim().parse().map_err(|_| LeoError::InvalidScore(s.to_string()))?;
        let away = away.trim().parse().map_err(|_| LeoError::InvalidScore(s.to_string()))?;
        Ok(Self { home, away })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(days_ago: i64, goals_for: u8, goals_against: u8) -> MatchResult {
        MatchResult::new(
            Utc::now() - Duration::days(days_ago),
            "Opponent".to_string(),
            Ground::Home,
            goals_for,
            goals_against,
        )
    }

    #[test]
    fn test_form_window_drops_stale_results() {
        let results = vec![result(10, 2, 0), result(400, 1, 1), result(600, 5, 0)];
        let form = TeamForm::new("Arsenal", results, Utc::now());

        assert_eq!(form.len(), 2);
        assert_eq!(form.team(), "Arsenal");
        // most recent first
        assert_eq!(form.results()[0].goals_for, 2);
    }

    #[test]
    fn test_form_window_is_bounded() {
        let results = (0..60).map(|d| result(d + 1, 1, 0)).collect();
        let form = TeamForm::new("Arsenal", results, Utc::now());
        assert_eq!(form.len(), MAX_FORM_MATCHES);
    }

    #[test]
    fn test_form_averages() {
        let form = TeamForm::new(
            "Chelsea",
            vec![result(1, 3, 1), result(2, 1, 1), result(3, 0, 2)],
            Utc::now(),
        );

        assert!((form.scoring_average().unwrap() - 4.0 / 3.0).abs() < 1e-9);
        assert!((form.conceding_average().unwrap() - 4.0 / 3.0).abs() < 1e-9);
        assert!((form.points_per_game().unwrap() - 4.0 / 3.0).abs() < 1e-9);

        let empty = TeamForm::new("Nobody", vec![], Utc::now());
        assert!(empty.scoring_average().is_none());
    }

    #[test]
    fn test_head_to_head_tally() {
        let h2h = HeadToHead::new(
            vec![result(30, 2, 1), result(200, 0, 0), result(300, 0, 3)],
            Utc::now(),
        );
        let tally = h2h.tally();

        assert_eq!(tally.home_wins, 1);
        assert_eq!(tally.draws, 1);
        assert_eq!(tally.away_wins, 1);
        assert_eq!(tally.meetings(), 3);
    }

    #[test]
    fn test_final_score_parsing() {
        let score: FinalScore = "2-1".parse().unwrap();
        assert_eq!(score, FinalScore::new(2, 1));
        assert_eq!(score.to_string(), "2-1");
        assert_eq!(score.total(), 3);

        assert!("2:1".parse::<FinalScore>().is_err());
        assert!("a-1".parse::<FinalScore>().is_err());
    }

    #[test]
    fn test_fixture_conclusion() {
        let fixture = Fixture::new(
            "fx_1".to_string(),
            "Premier League".to_string(),
            "Arsenal".to_string(),
            "Chelsea".to_string(),
            Utc::now() - Duration::hours(3),
        );

        assert!(fixture.is_concluded(Utc::now(), Duration::minutes(120)));
        assert!(!fixture.is_concluded(Utc::now(), Duration::hours(4)));
    }
}
