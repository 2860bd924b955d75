use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use crate::error::{LeoError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Home => Side::Away,
            Side::Away => Side::Home,
        }
    }
}

/// A predicate over the final score.
///
/// Goal lines are half-goal lines: `goals: 2` means the 2.5 line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub enum ProbabilityQuery {
    HomeWin,
    Draw,
    AwayWin,
    HomeOrDraw,
    AwayOrDraw,
    HomeOrAway,
    TotalOver { goals: u8 },
    TotalUnder { goals: u8 },
    BothTeamsScore,
    NotBothTeamsScore,
    TeamOver { side: Side, goals: u8 },
}

impl ProbabilityQuery {
    pub fn is_satisfied(&self, home: u32, away: u32) -> bool {
        match *self {
            ProbabilityQuery::HomeWin => home > away,
            ProbabilityQuery::Draw => home == away,
            ProbabilityQuery::AwayWin => away > home,
            ProbabilityQuery::HomeOrDraw => home >= away,
            ProbabilityQuery::AwayOrDraw => away >= home,
            ProbabilityQuery::HomeOrAway => home != away,
            ProbabilityQuery::TotalOver { goals } => home + away > u32::from(goals),
            ProbabilityQuery::TotalUnder { goals } => home + away <= u32::from(goals),
            ProbabilityQuery::BothTeamsScore => home > 0 && away > 0,
            ProbabilityQuery::NotBothTeamsScore => home == 0 || away == 0,
            ProbabilityQuery::TeamOver { side: Side::Home, goals } => home > u32::from(goals),
            ProbabilityQuery::TeamOver { side: Side::Away, goals } => away > u32::from(goals),
        }
    }

    /// The side this selection backs to come out on top, if any.
    pub fn favored_side(&self) -> Option<Side> {
        match self {
            ProbabilityQuery::HomeWin | ProbabilityQuery::HomeOrDraw => Some(Side::Home),
            ProbabilityQuery::AwayWin | ProbabilityQuery::AwayOrDraw => Some(Side::Away),
            _ => None,
        }
    }

    pub fn code(&self) -> String {
        match self {
            ProbabilityQuery::HomeWin => "home_win".to_string(),
            ProbabilityQuery::Draw => "draw".to_string(),
            ProbabilityQuery::AwayWin => "away_win".to_string(),
            ProbabilityQuery::HomeOrDraw => "home_or_draw".to_string(),
            ProbabilityQuery::AwayOrDraw => "away_or_draw".to_string(),
            ProbabilityQuery::HomeOrAway => "home_or_away".to_string(),
            ProbabilityQuery::TotalOver { goals } => format!("over_{goals}.5"),
            ProbabilityQuery::TotalUnder { goals } => format!("under_{goals}.5"),
            ProbabilityQuery::BothTeamsScore => "btts_yes".to_string(),
            ProbabilityQuery::NotBothTeamsScore => "btts_no".to_string(),
            ProbabilityQuery::TeamOver { side: Side::Home, goals } => format!("home_over_{goals}.5"),
            ProbabilityQuery::TeamOver { side: Side::Away, goals } => format!("away_over_{goals}.5"),
        }
    }
}

fn parse_line(raw: &str, original: &str) -> Result<u8> {
    let goals = raw
        .strip_suffix(".5")
        .ok_or_else(|| LeoError::UnknownSelection(original.to_string()))?;
    goals
        .parse()
        .map_err(|_| LeoError::UnknownSelection(original.to_string()))
}

impl FromStr for ProbabilityQuery {
    type Err = LeoError;

    fn from_str(s: &str) -> Result<Self> {
        let query = match s {
            "home_win" => ProbabilityQuery::HomeWin,
            "draw" => ProbabilityQuery::Draw,
            "away_win" => ProbabilityQuery::AwayWin,
            "home_or_draw" => ProbabilityQuery::HomeOrDraw,
            "away_or_draw" => ProbabilityQuery::AwayOrDraw,
            "home_or_away" => ProbabilityQuery::HomeOrAway,
            "btts_yes" => ProbabilityQuery::BothTeamsScore,
            "btts_no" => ProbabilityQuery::NotBothTeamsScore,
            other => {
                if let Some(line) = other.strip_prefix("home_over_") {
                    ProbabilityQuery::TeamOver { side: Side::Home, goals: parse_line(line, s)? }
                } else if let Some(line) = other.strip_prefix("away_over_") {
                    ProbabilityQuery::TeamOver { side: Side::Away, goals: parse_line(line, s)? }
                } else if let Some(line) = other.strip_prefix("over_") {
                    ProbabilityQuery::TotalOver { goals: parse_line(line, s)? }
                } else if let Some(line) = other.strip_prefix("under_") {
                    ProbabilityQuery::TotalUnder { goals: parse_line(line, s)? }
                } else {
                    return Err(LeoError::UnknownSelection(s.to_string()));
                }
            }
        };
        Ok(query)
    }
}

impl fmt::Display for ProbabilityQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

impl TryFrom<String> for ProbabilityQuery {
    type Error = LeoError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ProbabilityQuery> for String {
    fn from(query: ProbabilityQuery) -> Self {
        query.code()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MarketId {
    #[serde(rename = "1x2")]
    MatchResult,
    #[serde(rename = "double_chance")]
    DoubleChance,
    #[serde(rename = "over_under_1_5")]
    OverUnder15,
    #[serde(rename = "over_under_2_5")]
    OverUnder25,
    #[serde(rename = "btts")]
    BothTeamsToScore,
    #[serde(rename = "home_goals_0_5")]
    HomeTeamGoals,
    #[serde(rename = "away_goals_0_5")]
    AwayTeamGoals,
}

impl MarketId {
    pub const ALL: [MarketId; 7] = [
        MarketId::MatchResult,
        MarketId::DoubleChance,
        MarketId::OverUnder15,
        MarketId::OverUnder25,
        MarketId::BothTeamsToScore,
        MarketId::HomeTeamGoals,
        MarketId::AwayTeamGoals,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            MarketId::MatchResult => "1x2",
            MarketId::DoubleChance => "double_chance",
            MarketId::OverUnder15 => "over_under_1_5",
            MarketId::OverUnder25 => "over_under_2_5",
            MarketId::BothTeamsToScore => "btts",
            MarketId::HomeTeamGoals => "home_goals_0_5",
            MarketId::AwayTeamGoals => "away_goals_0_5",
        }
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for MarketId {
    type Err = LeoError;

    fn from_str(s: &str) -> Result<Self> {
        MarketId::ALL
            .into_iter()
            .find(|m| m.code() == s)
            .ok_or_else(|| LeoError::UnknownMarket(s.to_string()))
    }
}

/// A static catalog entry: what the market asks and what it can settle on.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MarketDefinition {
    pub id: MarketId,
    pub name: &'static str,
    pub required_query: ProbabilityQuery,
    pub outcomes: Vec<ProbabilityQuery>,
}

impl MarketDefinition {
    pub fn offers(&self, selection: &ProbabilityQuery) -> bool {
        self.outcomes.contains(selection)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketCatalog {
    definitions: Vec<MarketDefinition>,
}

impl MarketCatalog {
    /// The catalog every component shares. Built once, never modified.
    pub fn standard() -> &'static MarketCatalog {
        static CATALOG: OnceLock<MarketCatalog> = OnceLock::new();
        CATALOG.get_or_init(Self::build)
    }

    fn build() -> Self {
        use ProbabilityQuery as Q;

        let definitions = vec![
            MarketDefinition {
                id: MarketId::MatchResult,
                name: "Full Time Result (1X2)",
                required_query: Q::HomeWin,
                outcomes: vec![Q::HomeWin, Q::Draw, Q::AwayWin],
            },
            MarketDefinition {
                id: MarketId::DoubleChance,
                name: "Double Chance",
                required_query: Q::HomeOrDraw,
                outcomes: vec![Q::HomeOrDraw, Q::AwayOrDraw, Q::HomeOrAway],
            },
            MarketDefinition {
                id: MarketId::OverUnder15,
                name: "Over/Under 1.5 Goals",
                required_query: Q::TotalOver { goals: 1 },
                outcomes: vec![Q::TotalOver { goals: 1 }, Q::TotalUnder { goals: 1 }],
            },
            MarketDefinition {
                id: MarketId::OverUnder25,
                name: "Over/Under 2.5 Goals",
                required_query: Q::TotalOver { goals: 2 },
                outcomes: vec![Q::TotalOver { goals: 2 }, Q::TotalUnder { goals: 2 }],
            },
            MarketDefinition {
                id: MarketId::BothTeamsToScore,
                name: "Both Teams To Score",
                required_query: Q::BothTeamsScore,
                outcomes: vec![Q::BothTeamsScore, Q::NotBothTeamsScore],
            },
            MarketDefinition {
                id: MarketId::HomeTeamGoals,
                name: "Home Team Over 0.5 Goals",
                required_query: Q::TeamOver { side: Side::Home, goals: 0 },
                outcomes: vec![Q::TeamOver { side: Side::Home, goals: 0 }],
            },
            MarketDefinition {
                id: MarketId::AwayTeamGoals,
                name: "Away Team Over 0.5 Goals",
                required_query: Q::TeamOver { side: Side::Away, goals: 0 },
                outcomes: vec![Q::TeamOver { side: Side::Away, goals: 0 }],
            },
        ];

        Self { definitions }
    }

    pub fn get(&self, id: MarketId) -> Option<&MarketDefinition> {
        self.definitions.iter().find(|d| d.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MarketDefinition> {
        self.definitions.iter()
    }

    /// The market a selection settles in.
    pub fn market_for(&self, selection: &ProbabilityQuery) -> Option<MarketId> {
        self.definitions
            .iter()
            .find(|d| d.offers(selection))
            .map(|d| d.id)
    }

    pub fn selections(&self) -> impl Iterator<Item = ProbabilityQuery> + '_ {
        self.definitions.iter().flat_map(|d| d.outcomes.iter().copied())
    }
}

/// A concrete selection within a catalog market.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Pick {
    pub market: MarketId,
    pub selection: ProbabilityQuery,
}

impl Pick {
    pub fn new(market: MarketId, selection: ProbabilityQuery) -> Result<Self> {
        let definition = MarketCatalog::standard()
            .get(market)
            .ok_or_else(|| LeoError::UnknownMarket(market.to_string()))?;
        if !definition.offers(&selection) {
            return Err(LeoError::SelectionNotInMarket {
                market: market.to_string(),
                selection: selection.to_string(),
            });
        }
        Ok(Self { market, selection })
    }

    /// Resolves the market from the catalog.
    pub fn for_selection(selection: ProbabilityQuery) -> Result<Self> {
        let market = MarketCatalog::standard()
            .market_for(&selection)
            .ok_or_else(|| LeoError::UnknownSelection(selection.to_string()))?;
        Ok(Self { market, selection })
    }
}

impl fmt::Display for Pick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.market, self.selection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_codes_parse_back() {
        for selection in MarketCatalog::standard().selections() {
            let parsed: ProbabilityQuery = selection.code().parse().unwrap();
            assert_eq!(parsed, selection);
        }
        assert!("over_2".parse::<ProbabilityQuery>().is_err());
        assert!("corners_over_9.5".parse::<ProbabilityQuery>().is_err());
    }

    #[test]
    fn test_query_settlement() {
        assert!(ProbabilityQuery::HomeWin.is_satisfied(2, 0));
        assert!(!ProbabilityQuery::HomeWin.is_satisfied(1, 1));
        assert!(ProbabilityQuery::HomeOrDraw.is_satisfied(1, 1));
        assert!(ProbabilityQuery::HomeOrAway.is_satisfied(0, 1));
        assert!(ProbabilityQuery::TotalOver { goals: 2 }.is_satisfied(2, 1));
        assert!(!ProbabilityQuery::TotalOver { goals: 2 }.is_satisfied(1, 1));
        assert!(ProbabilityQuery::TotalUnder { goals: 2 }.is_satisfied(1, 1));
        assert!(ProbabilityQuery::BothTeamsScore.is_satisfied(1, 1));
        assert!(ProbabilityQuery::NotBothTeamsScore.is_satisfied(3, 0));
        assert!(ProbabilityQuery::TeamOver { side: Side::Away, goals: 0 }.is_satisfied(0, 1));
    }

    #[test]
    fn test_outcomes_are_mutually_exclusive() {
        for definition in MarketCatalog::standard().iter() {
            if definition.outcomes.len() < 2 || definition.id == MarketId::DoubleChance {
                continue;
            }
            for home in 0..6 {
                for away in 0..6 {
                    let hits = definition
                        .outcomes
                        .iter()
                        .filter(|q| q.is_satisfied(home, away))
                        .count();
                    assert_eq!(hits, 1, "{} at {home}-{away}", definition.id);
                }
            }
        }
    }

    #[test]
    fn test_pick_validation() {
        assert!(Pick::new(MarketId::MatchResult, ProbabilityQuery::HomeWin).is_ok());
        assert!(Pick::new(MarketId::MatchResult, ProbabilityQuery::BothTeamsScore).is_err());

        let pick = Pick::for_selection(ProbabilityQuery::TotalUnder { goals: 2 }).unwrap();
        assert_eq!(pick.market, MarketId::OverUnder25);
        assert_eq!(pick.to_string(), "over_under_2_5:under_2.5");
    }

    #[test]
    fn test_market_codes() {
        for id in MarketId::ALL {
            assert_eq!(id.code().parse::<MarketId>().unwrap(), id);
        }
        assert_eq!(
            serde_json::to_string(&MarketId::MatchResult).unwrap(),
            "\"1x2\""
        );
        assert_eq!(
            serde_json::to_string(&ProbabilityQuery::TotalOver { goals: 2 }).unwrap(),
            "\"over_2.5\""
        );
    }
}
