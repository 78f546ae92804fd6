use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{MatchOutcome, TrainingRow};

/// Betting market covered by one classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    MatchResult,
    #[serde(rename = "over_under_25")]
    OverUnder25,
    Btts,
}

impl Market {
    pub const ALL: [Market; 3] = [Market::MatchResult, Market::OverUnder25, Market::Btts];

    /// Classes in label-index order
    pub fn outcomes(&self) -> &'static [Outcome] {
        match self {
            Market::MatchResult => &[Outcome::Home, Outcome::Draw, Outcome::Away],
            Market::OverUnder25 => &[Outcome::Under25, Outcome::Over25],
            Market::Btts => &[Outcome::BttsNo, Outcome::BttsYes],
        }
    }

    pub fn n_classes(&self) -> usize {
        self.outcomes().len()
    }

    /// Class index of `row` for this market
    pub fn label(&self, row: &TrainingRow) -> usize {
        match self {
            Market::MatchResult => match row.match_result {
                MatchOutcome::Home => 0,
                MatchOutcome::Draw => 1,
                MatchOutcome::Away => 2,
            },
            Market::OverUnder25 => usize::from(row.over25),
            Market::Btts => usize::from(row.btts),
        }
    }

    /// File stem used for the persisted artifact
    pub fn key(&self) -> &'static str {
        match self {
            Market::MatchResult => "match_result",
            Market::OverUnder25 => "over_under_25",
            Market::Btts => "btts",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Market::MatchResult => write!(f, "Match Result"),
            Market::OverUnder25 => write!(f, "Over/Under 2.5"),
            Market::Btts => write!(f, "Both Teams to Score"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Home,
    Draw,
    Away,
    #[serde(rename = "under_2_5")]
    Under25,
    #[serde(rename = "over_2_5")]
    Over25,
    BttsNo,
    BttsYes,
}

impl Outcome {
    pub fn market(&self) -> Market {
        match self {
            Outcome::Home | Outcome::Draw | Outcome::Away => Market::MatchResult,
            Outcome::Under25 | Outcome::Over25 => Market::OverUnder25,
            Outcome::BttsNo | Outcome::BttsYes => Market::Btts,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Home => "Home Win",
            Outcome::Draw => "Draw",
            Outcome::Away => "Away Win",
            Outcome::Under25 => "Under 2.5",
            Outcome::Over25 => "Over 2.5",
            Outcome::BttsNo => "BTTS No",
            Outcome::BttsYes => "BTTS Yes",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' ', '.'], "_").as_str() {
            "home" | "h" | "1" => Ok(Outcome::Home),
            "draw" | "d" | "x" => Ok(Outcome::Draw),
            "away" | "a" | "2" => Ok(Outcome::Away),
            "under" | "under_2_5" | "under25" => Ok(Outcome::Under25),
            "over" | "over_2_5" | "over25" => Ok(Outcome::Over25),
            "btts_no" | "no" => Ok(Outcome::BttsNo),
            "btts_yes" | "btts" | "yes" => Ok(Outcome::BttsYes),
            other => Err(format!("unknown outcome '{}'", other)),
        }
    }
}
