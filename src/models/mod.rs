mod market;
mod prediction;

pub use market::{Market, Outcome};
pub use prediction::{
    Fixture, FixtureForecast, OddsMap, OutcomePrediction, OutcomeProbabilities, PredictionResult,
    SafestPick,
};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One played match. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub date: NaiveDate,
    pub home_team: String,
    pub away_team: String,
    pub home_goals: u8,
    pub away_goals: u8,
    pub league: String,
}

/// Full-time result from the home side's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchOutcome {
    Home,
    Draw,
    Away,
}

impl MatchRecord {
    pub fn result(&self) -> MatchOutcome {
        match self.home_goals.cmp(&self.away_goals) {
            std::cmp::Ordering::Greater => MatchOutcome::Home,
            std::cmp::Ordering::Equal => MatchOutcome::Draw,
            std::cmp::Ordering::Less => MatchOutcome::Away,
        }
    }

    pub fn total_goals(&self) -> u16 {
        self.home_goals as u16 + self.away_goals as u16
    }

    pub fn is_over_25(&self) -> bool {
        self.total_goals() > 2
    }

    /// Both teams scored at least once
    pub fn btts(&self) -> bool {
        self.home_goals > 0 && self.away_goals > 0
    }

    pub fn goals_for(&self, team: &str) -> Option<u8> {
        if team == self.home_team {
            Some(self.home_goals)
        } else if team == self.away_team {
            Some(self.away_goals)
        } else {
            None
        }
    }

    pub fn goals_against(&self, team: &str) -> Option<u8> {
        if team == self.home_team {
            Some(self.away_goals)
        } else if team == self.away_team {
            Some(self.home_goals)
        } else {
            None
        }
    }

    /// League points earned by `team`: win 3, draw 1, loss 0
    pub fn points_for(&self, team: &str) -> Option<u32> {
        self.result_for(team).map(|r| match r {
            'W' => 3,
            'D' => 1,
            _ => 0,
        })
    }

    /// 'W', 'D' or 'L' from `team`'s perspective
    pub fn result_for(&self, team: &str) -> Option<char> {
        let scored = self.goals_for(team)?;
        let conceded = self.goals_against(team)?;
        Some(match scored.cmp(&conceded) {
            std::cmp::Ordering::Greater => 'W',
            std::cmp::Ordering::Equal => 'D',
            std::cmp::Ordering::Less => 'L',
        })
    }
}

/// Which slice of a team's history feeds a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Venue {
    Home,
    Away,
    Any,
}

/// How the fixture is staged. `Neutral` drops the home/away split for both sides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueContext {
    #[default]
    HomeAdvantage,
    Neutral,
}

impl VenueContext {
    pub fn venues(&self) -> (Venue, Venue) {
        match self {
            VenueContext::HomeAdvantage => (Venue::Home, Venue::Away),
            VenueContext::Neutral => (Venue::Any, Venue::Any),
        }
    }
}

/// Rolling form of one team as of a date, built only from earlier matches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamFormSnapshot {
    pub team: String,
    pub as_of_date: NaiveDate,
    pub venue: Venue,
    pub window: usize,
    /// Raw points sum over the window, not normalised
    pub points: u32,
    pub goals_scored_avg: f64,
    pub goals_conceded_avg: f64,
    /// Fraction in [0, 1]
    pub btts_rate: f64,
    /// Most recent first, e.g. "WDLWW"
    pub form: String,
    pub venue_matches: usize,
    pub form_matches: usize,
    pub low_confidence: bool,
}

/// Model input for one fixture, in the order fixed by the feature builder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub values: Vec<f64>,
    pub schema_version: u32,
    pub home_low_confidence: bool,
    pub away_low_confidence: bool,
}

impl FeatureVector {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn low_confidence(&self) -> bool {
        self.home_low_confidence || self.away_low_confidence
    }
}

/// A labelled historical fixture. Never mutated after assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRow {
    pub match_date: NaiveDate,
    pub home_team: String,
    pub away_team: String,
    pub features: FeatureVector,
    pub match_result: MatchOutcome,
    pub over25: bool,
    pub btts: bool,
}

// API Response types
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now(),
        }
    }
}
