use chrono::NaiveDate;

use crate::error::{EngineError, Result};
use crate::models::{FeatureVector, MatchRecord, TeamFormSnapshot, Venue, VenueContext};
use crate::services::match_store::MatchStore;
use crate::utils::mean;

pub const DEFAULT_WINDOW: usize = 5;

/// Bumped whenever the order or meaning of `FEATURE_NAMES` changes
pub const FEATURE_SCHEMA_VERSION: u32 = 1;

pub const FEATURE_NAMES: [&str; 8] = [
    "home_form_points",
    "away_form_points",
    "home_avg_goals",
    "away_avg_goals",
    "home_avg_conceded",
    "away_avg_conceded",
    "home_btts_rate",
    "away_btts_rate",
];

pub const FEATURE_COUNT: usize = FEATURE_NAMES.len();

/// Rolling-form features for a team as of a date.
///
/// Training and inference both go through this type so the window and
/// column order cannot drift between the two.
#[derive(Debug, Clone, Copy)]
pub struct FeatureBuilder<'a> {
    store: &'a MatchStore,
    window: usize,
}

impl<'a> FeatureBuilder<'a> {
    pub fn new(store: &'a MatchStore) -> Self {
        Self {
            store,
            window: DEFAULT_WINDOW,
        }
    }

    pub fn with_window(store: &'a MatchStore, window: usize) -> Result<Self> {
        if window == 0 {
            return Err(EngineError::InvalidParams(
                "form window must be at least 1".to_string(),
            ));
        }
        Ok(Self { store, window })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Snapshot of `team` from matches strictly before `as_of`.
    ///
    /// Points and the form string come from the most recent matches at any
    /// venue. Goal averages and BTTS rate come from the `venue` history.
    /// Missing history averages to zero and sets `low_confidence`.
    pub fn build(&self, team: &str, as_of: NaiveDate, venue: Venue) -> TeamFormSnapshot {
        let recent: Vec<&MatchRecord> = self
            .store
            .matches_before(team, as_of, Venue::Any)
            .take(self.window)
            .collect();
        let venue_recent: Vec<&MatchRecord> = self
            .store
            .matches_before(team, as_of, venue)
            .take(self.window)
            .collect();

        let points = recent.iter().filter_map(|m| m.points_for(team)).sum();
        let form: String = recent.iter().filter_map(|m| m.result_for(team)).collect();

        let scored: Vec<f64> = venue_recent
            .iter()
            .filter_map(|m| m.goals_for(team))
            .map(f64::from)
            .collect();
        let conceded: Vec<f64> = venue_recent
            .iter()
            .filter_map(|m| m.goals_against(team))
            .map(f64::from)
            .collect();
        let btts_rate = if venue_recent.is_empty() {
            0.0
        } else {
            venue_recent.iter().filter(|m| m.btts()).count() as f64 / venue_recent.len() as f64
        };

        TeamFormSnapshot {
            team: team.to_string(),
            as_of_date: as_of,
            venue,
            window: self.window,
            points,
            goals_scored_avg: mean(&scored),
            goals_conceded_avg: mean(&conceded),
            btts_rate,
            form,
            venue_matches: venue_recent.len(),
            form_matches: recent.len(),
            low_confidence: venue_recent.len() < self.window,
        }
    }

    /// Home and away snapshots for a fixture. Under home advantage the home
    /// side reads its home history and the away side its away history.
    pub fn snapshots(
        &self,
        home_team: &str,
        away_team: &str,
        as_of: NaiveDate,
        context: VenueContext,
    ) -> (TeamFormSnapshot, TeamFormSnapshot) {
        let (home_venue, away_venue) = context.venues();
        (
            self.build(home_team, as_of, home_venue),
            self.build(away_team, as_of, away_venue),
        )
    }

    pub fn fixture(
        &self,
        home_team: &str,
        away_team: &str,
        as_of: NaiveDate,
        context: VenueContext,
    ) -> FeatureVector {
        let (home, away) = self.snapshots(home_team, away_team, as_of, context);
        Self::combine(&home, &away)
    }

    /// Interleave two snapshots in `FEATURE_NAMES` order
    pub fn combine(home: &TeamFormSnapshot, away: &TeamFormSnapshot) -> FeatureVector {
        FeatureVector {
            values: vec![
                f64::from(home.points),
                f64::from(away.points),
                home.goals_scored_avg,
                away.goals_scored_avg,
                home.goals_conceded_avg,
                away.goals_conceded_avg,
                home.btts_rate,
                away.btts_rate,
            ],
            schema_version: FEATURE_SCHEMA_VERSION,
            home_low_confidence: home.low_confidence,
            away_low_confidence: away.low_confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(d: NaiveDate, home: &str, away: &str, hg: u8, ag: u8) -> MatchRecord {
        MatchRecord {
            date: d,
            home_team: home.to_string(),
            away_team: away.to_string(),
            home_goals: hg,
            away_goals: ag,
            league: "Premier League".to_string(),
        }
    }

    fn store() -> MatchStore {
        MatchStore::from_records(vec![
            record(date(2024, 1, 6), "Arsenal", "Chelsea", 2, 1),
            record(date(2024, 1, 13), "Spurs", "Arsenal", 1, 1),
            record(date(2024, 1, 20), "Arsenal", "Everton", 0, 1),
            record(date(2024, 1, 27), "Fulham", "Arsenal", 0, 3),
            record(date(2024, 2, 3), "Arsenal", "Spurs", 3, 0),
        ])
    }

    #[test]
    fn home_snapshot_uses_home_history_and_all_venue_points() {
        let store = store();
        let builder = FeatureBuilder::new(&store);
        let snap = builder.build("Arsenal", date(2024, 2, 10), Venue::Home);

        // W L W D W across all venues
        assert_eq!(snap.points, 3 + 3 + 0 + 1 + 3);
        assert_eq!(snap.form, "WWLDW");
        assert_eq!(snap.form_matches, 5);
        // home games: 3-0, 0-1, 2-1
        assert_eq!(snap.venue_matches, 3);
        assert!((snap.goals_scored_avg - 5.0 / 3.0).abs() < 1e-12);
        assert!((snap.goals_conceded_avg - 2.0 / 3.0).abs() < 1e-12);
        assert!((snap.btts_rate - 1.0 / 3.0).abs() < 1e-12);
        assert!(snap.low_confidence);
    }

    #[test]
    fn window_limits_history() {
        let store = store();
        let builder = FeatureBuilder::with_window(&store, 2).unwrap();
        let snap = builder.build("Arsenal", date(2024, 2, 10), Venue::Any);
        assert_eq!(snap.form, "WW");
        assert_eq!(snap.points, 6);
        assert!((snap.goals_scored_avg - 3.0).abs() < 1e-12);
        assert!(!snap.low_confidence);

        assert!(FeatureBuilder::with_window(&store, 0).is_err());
    }

    #[test]
    fn cold_start_defaults_to_zero() {
        let store = store();
        let builder = FeatureBuilder::new(&store);
        let snap = builder.build("Ipswich", date(2024, 2, 10), Venue::Away);
        assert_eq!(snap.points, 0);
        assert_eq!(snap.goals_scored_avg, 0.0);
        assert_eq!(snap.goals_conceded_avg, 0.0);
        assert_eq!(snap.btts_rate, 0.0);
        assert!(snap.form.is_empty());
        assert!(snap.low_confidence);

        let before_any = builder.build("Arsenal", date(2024, 1, 6), Venue::Home);
        assert_eq!(before_any.venue_matches, 0);
        assert!(before_any.goals_scored_avg.is_finite());
    }

    #[test]
    fn later_records_never_leak_into_a_snapshot() {
        let mut records = store().records().to_vec();
        let as_of = date(2024, 2, 10);
        let baseline = {
            let store = MatchStore::from_records(records.clone());
            FeatureBuilder::new(&store).build("Arsenal", as_of, Venue::Home)
        };

        records.push(record(as_of, "Arsenal", "Wolves", 9, 9));
        records.push(record(date(2024, 3, 1), "Arsenal", "Leeds", 7, 0));
        let store = MatchStore::from_records(records);
        let snap = FeatureBuilder::new(&store).build("Arsenal", as_of, Venue::Home);
        assert_eq!(snap, baseline);
    }

    #[test]
    fn fixture_vector_follows_feature_names() {
        let store = store();
        let builder = FeatureBuilder::new(&store);
        let features = builder.fixture("Arsenal", "Spurs", date(2024, 2, 10), VenueContext::HomeAdvantage);
        assert_eq!(features.len(), FEATURE_COUNT);
        assert_eq!(features.schema_version, FEATURE_SCHEMA_VERSION);
        assert_eq!(features.values[0], 10.0);
        // Spurs: D at home, L away; away history is the 3-0 loss
        assert_eq!(features.values[1], 1.0);
        assert_eq!(features.values[3], 0.0);
        assert_eq!(features.values[5], 3.0);
        assert!(features.low_confidence());

        let neutral = builder.fixture("Arsenal", "Spurs", date(2024, 2, 10), VenueContext::Neutral);
        assert!((neutral.values[2] - 9.0 / 5.0).abs() < 1e-12);
    }
}
