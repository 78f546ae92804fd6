use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Market, Outcome, TeamFormSnapshot, VenueContext};

/// Decimal odds keyed by outcome, as supplied by the caller
pub type OddsMap = HashMap<Outcome, f64>;

/// Class probabilities produced by one market model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeProbabilities {
    pub market: Market,
    pub probabilities: Vec<(Outcome, f64)>,
}

impl OutcomeProbabilities {
    pub fn get(&self, outcome: Outcome) -> Option<f64> {
        self.probabilities
            .iter()
            .find(|(o, _)| *o == outcome)
            .map(|(_, p)| *p)
    }

    /// Most probable outcome; ties resolve to the earlier class
    pub fn best(&self) -> Option<(Outcome, f64)> {
        self.probabilities.iter().copied().fold(None, |best, (o, p)| match best {
            Some((_, bp)) if bp >= p => best,
            _ => Some((o, p)),
        })
    }

    pub fn total(&self) -> f64 {
        self.probabilities.iter().map(|(_, p)| p).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomePrediction {
    pub outcome: Outcome,
    pub label: String,
    pub probability: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimal_odds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implied_probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kelly_fraction: Option<f64>,
    pub is_value: bool,
}

/// Per-market prediction handed to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub market: Market,
    pub outcomes: Vec<OutcomePrediction>,
    /// True when at least one outcome beats its implied probability
    pub is_value_bet: bool,
    pub low_confidence: bool,
}

impl PredictionResult {
    pub fn probability(&self, outcome: Outcome) -> Option<f64> {
        self.outcomes
            .iter()
            .find(|o| o.outcome == outcome)
            .map(|o| o.probability)
    }

    pub fn best_outcome(&self) -> Option<&OutcomePrediction> {
        self.outcomes.iter().fold(None, |best, o| match best {
            Some(b) if b.probability >= o.probability => Some(b),
            _ => Some(o),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub home_team: String,
    pub away_team: String,
    pub as_of_date: NaiveDate,
    #[serde(default)]
    pub venue_context: VenueContext,
}

/// The single most probable outcome across every market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafestPick {
    pub market: Market,
    pub outcome: Outcome,
    pub label: String,
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureForecast {
    pub fixture: Fixture,
    pub home_form: TeamFormSnapshot,
    pub away_form: TeamFormSnapshot,
    pub results: Vec<PredictionResult>,
    pub safest_pick: Option<SafestPick>,
}

impl FixtureForecast {
    pub fn result(&self, market: Market) -> Option<&PredictionResult> {
        self.results.iter().find(|r| r.market == market)
    }
}
