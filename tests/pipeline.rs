use std::sync::Arc;

use chrono::{Days, NaiveDate};

use glitch::error::EngineError;
use glitch::models::{FeatureVector, Market, MatchRecord, Outcome, OddsMap, Venue, VenueContext};
use glitch::services::artifact::{artifact_path, load_model_set, save_model_set};
use glitch::services::{
    train_all, FeatureBuilder, ForestParams, MatchStore, ModelRegistry, PredictionEngine, TrainingOutcome,
    TrainingParams, FEATURE_SCHEMA_VERSION,
};

const TEAMS: [&str; 4] = ["Alpha", "Bravo", "Charlie", "Delta"];

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Alpha wins every home game 2-0 and Bravo loses every away game
fn score(home: &str, away: &str, week: usize) -> (u8, u8) {
    match (home, away) {
        ("Alpha", _) => (2, 0),
        (_, "Bravo") => (3, 1),
        (_, "Alpha") => (0, 1),
        _ if week % 2 == 0 => (1, 1),
        _ => (0, 2),
    }
}

/// Three seasons' worth of weekly double round-robins, two matches a week
fn history() -> Vec<MatchRecord> {
    let first_leg = [[(0, 1), (2, 3)], [(0, 2), (1, 3)], [(0, 3), (1, 2)]];
    let rounds: Vec<[(usize, usize); 2]> = first_leg
        .iter()
        .copied()
        .chain(first_leg.iter().map(|r| r.map(|(h, a)| (a, h))))
        .collect();

    let start = date(2021, 8, 7);
    (0..114)
        .flat_map(|week| {
            let day = start + Days::new(week as u64 * 7);
            rounds[week % rounds.len()].map(|(h, a)| {
                let (home_goals, away_goals) = score(TEAMS[h], TEAMS[a], week);
                MatchRecord {
                    date: day,
                    home_team: TEAMS[h].to_string(),
                    away_team: TEAMS[a].to_string(),
                    home_goals,
                    away_goals,
                    league: "Test League".to_string(),
                }
            })
        })
        .collect()
}

fn params() -> TrainingParams {
    TrainingParams {
        seed: 7,
        ..TrainingParams::default()
    }
    .with_forest(ForestParams {
        n_trees: 25,
        max_depth: 6,
        ..ForestParams::default()
    })
}

fn trained() -> (Arc<MatchStore>, TrainingOutcome) {
    let store = Arc::new(MatchStore::from_records(history()));
    let outcome = train_all(&store, &params()).unwrap();
    (store, outcome)
}

fn engine() -> PredictionEngine {
    let (store, outcome) = trained();
    PredictionEngine::new(store, Arc::new(ModelRegistry::with_models(outcome.models)))
        .with_extra_teams(["Echo"])
}

#[test]
fn learns_a_dominant_home_side() {
    let engine = engine();
    let results = engine
        .predict("Alpha", "Bravo", date(2024, 1, 1), VenueContext::HomeAdvantage, None)
        .unwrap();
    assert_eq!(results.len(), 3);

    let match_result = &results[0];
    assert_eq!(match_result.market, Market::MatchResult);
    let home = match_result.probability(Outcome::Home).unwrap();
    assert!(home > match_result.probability(Outcome::Draw).unwrap());
    assert!(home > match_result.probability(Outcome::Away).unwrap());
    assert!(!match_result.low_confidence);
}

#[test]
fn every_market_sums_to_one() {
    let engine = engine();
    for (home, away) in [("Alpha", "Bravo"), ("Delta", "Charlie"), ("Bravo", "Alpha")] {
        for context in [VenueContext::HomeAdvantage, VenueContext::Neutral] {
            let results = engine.predict(home, away, date(2023, 3, 1), context, None).unwrap();
            for result in &results {
                let total: f64 = result.outcomes.iter().map(|o| o.probability).sum();
                assert!((total - 1.0).abs() < 1e-9, "{} sums to {}", result.market, total);
                assert!(result.outcomes.iter().all(|o| (0.0..=1.0).contains(&o.probability)));
                assert_eq!(result.outcomes.len(), result.market.n_classes());
            }
        }
    }
}

#[test]
fn forms_ignore_matches_on_or_after_the_cutoff() {
    let matches = history();
    let store = MatchStore::from_records(matches.clone());
    let builder = FeatureBuilder::new(&store);

    let opening_day = matches[0].date;
    let snapshot = builder.build("Alpha", opening_day, Venue::Any);
    assert_eq!(snapshot.form_matches, 0);
    assert_eq!(snapshot.points, 0);
    assert!(snapshot.low_confidence);

    // Appending future results changes nothing about an earlier cut-off
    let cutoff = date(2022, 6, 1);
    let before = builder.build("Alpha", cutoff, Venue::Home);
    let truncated: Vec<MatchRecord> = matches.iter().filter(|m| m.date < cutoff).cloned().collect();
    let past_only = MatchStore::from_records(truncated);
    assert_eq!(FeatureBuilder::new(&past_only).build("Alpha", cutoff, Venue::Home), before);
    assert_eq!(before.goals_scored_avg, 2.0);
    assert_eq!(before.goals_conceded_avg, 0.0);
}

#[test]
fn test_rows_come_strictly_after_training_rows() {
    let (_, outcome) = trained();
    let report = &outcome.report;
    let (_, train_to) = report.train_range.unwrap();
    let (test_from, _) = report.test_range.unwrap();
    assert!(train_to < test_from);
    assert_eq!(report.train_rows + report.test_rows, report.total_rows);
    assert_eq!(report.evaluations.len(), 3);
    for model in outcome.models.models() {
        assert!(model.metadata.trained_to < test_from);
    }
}

#[test]
fn same_seed_same_probabilities() {
    let store = MatchStore::from_records(history());
    let a = train_all(&store, &params()).unwrap();
    let b = train_all(&store, &params()).unwrap();

    let builder = FeatureBuilder::new(&store);
    let features = builder.fixture("Charlie", "Delta", date(2023, 5, 1), VenueContext::HomeAdvantage);
    assert_eq!(
        a.models.predict_all(&features).unwrap(),
        b.models.predict_all(&features).unwrap()
    );
}

#[test]
fn cold_start_and_unknown_teams() {
    let engine = engine();

    let results = engine
        .predict("Echo", "Alpha", date(2024, 1, 1), VenueContext::HomeAdvantage, None)
        .unwrap();
    assert!(results.iter().all(|r| r.low_confidence));

    match engine.predict("Alpa", "Bravo", date(2024, 1, 1), VenueContext::HomeAdvantage, None) {
        Err(EngineError::UnknownTeam(err)) => {
            assert_eq!(err.team, "Alpa");
            assert!(err.suggestions.contains(&"Alpha".to_string()));
        }
        other => panic!("expected UnknownTeam, got {:?}", other.map(|r| r.len())),
    }

    assert!(matches!(
        engine.predict("Alpha", "Alpha", date(2024, 1, 1), VenueContext::Neutral, None),
        Err(EngineError::InvalidParams(_))
    ));
}

#[test]
fn long_odds_on_a_likely_outcome_are_value() {
    let engine = engine();
    let mut odds = OddsMap::new();
    odds.insert(Outcome::Home, 10.0);
    odds.insert(Outcome::Away, 1.01);

    let results = engine
        .predict("Alpha", "Bravo", date(2024, 1, 1), VenueContext::HomeAdvantage, Some(&odds))
        .unwrap();
    let match_result = &results[0];
    let home = match_result.outcomes.iter().find(|o| o.outcome == Outcome::Home).unwrap();
    let away = match_result.outcomes.iter().find(|o| o.outcome == Outcome::Away).unwrap();

    assert!(home.is_value);
    assert!(match_result.is_value_bet);
    assert!((home.implied_probability.unwrap() - 0.1).abs() < 1e-12);
    let kelly = home.kelly_fraction.unwrap();
    assert!(kelly > 0.0 && kelly <= 0.25);

    assert!(!away.is_value);
    assert_eq!(away.kelly_fraction, None);
    // No odds supplied for the other markets
    assert!(results[1..].iter().all(|r| !r.is_value_bet));
}

#[test]
fn saved_models_reload_with_identical_output() {
    let (store, outcome) = trained();
    let dir = tempfile::tempdir().unwrap();
    save_model_set(&outcome.models, dir.path()).unwrap();
    let reloaded = load_model_set(dir.path()).unwrap();

    let features = FeatureBuilder::new(&store).fixture("Alpha", "Delta", date(2023, 9, 1), VenueContext::Neutral);
    assert_eq!(
        outcome.models.predict_all(&features).unwrap(),
        reloaded.predict_all(&features).unwrap()
    );
}

#[test]
fn schema_drift_is_refused() {
    let (_, outcome) = trained();

    let wide = FeatureVector {
        values: vec![0.5; 10],
        schema_version: FEATURE_SCHEMA_VERSION,
        home_low_confidence: false,
        away_low_confidence: false,
    };
    assert!(matches!(
        outcome.models.predict_all(&wide),
        Err(EngineError::ShapeMismatch(_))
    ));

    let dir = tempfile::tempdir().unwrap();
    save_model_set(&outcome.models, dir.path()).unwrap();
    let path = artifact_path(dir.path(), Market::Btts);
    let mut artifact: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    artifact["model"]["feature_names"]
        .as_array_mut()
        .unwrap()
        .extend([serde_json::json!("home_rest_days"), serde_json::json!("away_rest_days")]);
    std::fs::write(&path, serde_json::to_string(&artifact).unwrap()).unwrap();

    assert!(matches!(load_model_set(dir.path()), Err(EngineError::ShapeMismatch(_))));
}
