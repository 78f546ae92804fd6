use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::error::{EngineError, Result, UnknownTeamError};
use crate::models::{Fixture, FixtureForecast, OddsMap, PredictionResult, SafestPick, VenueContext};
use crate::services::feature_builder::FeatureBuilder;
use crate::services::match_store::MatchStore;
use crate::services::registry::ModelRegistry;
use crate::services::value::assess;
use crate::utils::closest_names;

const MAX_SUGGESTIONS: usize = 3;

/// Turns a fixture into per-market probabilities and value flags.
///
/// Cheap to clone; the store and registry are shared.
#[derive(Clone)]
pub struct PredictionEngine {
    store: Arc<MatchStore>,
    registry: Arc<ModelRegistry>,
    extra_teams: Arc<BTreeSet<String>>,
}

impl PredictionEngine {
    pub fn new(store: Arc<MatchStore>, registry: Arc<ModelRegistry>) -> Self {
        Self {
            store,
            registry,
            extra_teams: Arc::new(BTreeSet::new()),
        }
    }

    /// Teams accepted with no history at all, e.g. newly promoted sides
    pub fn with_extra_teams<I, S>(mut self, teams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_teams = Arc::new(teams.into_iter().map(Into::into).collect());
        self
    }

    pub fn store(&self) -> &Arc<MatchStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Every team a fixture may name, sorted
    pub fn known_teams(&self) -> Vec<String> {
        let mut teams: BTreeSet<String> = self.store.teams().into_iter().map(str::to_string).collect();
        teams.extend(self.extra_teams.iter().cloned());
        teams.into_iter().collect()
    }

    /// A team with no history and no configured entry is unknown.
    pub fn resolve_team(&self, team: &str) -> Result<()> {
        if self.store.contains_team(team) || self.extra_teams.contains(team) {
            return Ok(());
        }
        let known = self.known_teams();
        Err(UnknownTeamError {
            team: team.to_string(),
            suggestions: closest_names(team, known.iter().map(String::as_str), MAX_SUGGESTIONS),
        }
        .into())
    }

    /// One result per market, in `Market::ALL` order
    pub fn predict(
        &self,
        home_team: &str,
        away_team: &str,
        as_of: NaiveDate,
        venue_context: VenueContext,
        odds: Option<&OddsMap>,
    ) -> Result<Vec<PredictionResult>> {
        let fixture = Fixture {
            home_team: home_team.to_string(),
            away_team: away_team.to_string(),
            as_of_date: as_of,
            venue_context,
        };
        Ok(self.predict_fixture(&fixture, odds)?.results)
    }

    pub fn predict_fixture(&self, fixture: &Fixture, odds: Option<&OddsMap>) -> Result<FixtureForecast> {
        if fixture.home_team == fixture.away_team {
            return Err(EngineError::InvalidParams(format!(
                "'{}' cannot play itself",
                fixture.home_team
            )));
        }
        self.resolve_team(&fixture.home_team)?;
        self.resolve_team(&fixture.away_team)?;

        let models = self.registry.snapshot().ok_or(EngineError::NoModels)?;
        // Same builder and window the models were trained with
        let builder = FeatureBuilder::with_window(&self.store, models.window())?;
        let (home_form, away_form) = builder.snapshots(
            &fixture.home_team,
            &fixture.away_team,
            fixture.as_of_date,
            fixture.venue_context,
        );
        let features = FeatureBuilder::combine(&home_form, &away_form);
        let low_confidence = features.low_confidence();

        let results: Vec<PredictionResult> = models
            .predict_all(&features)?
            .iter()
            .map(|probs| assess(probs, odds, low_confidence))
            .collect();
        let safest_pick = safest_pick(&results);

        if let Some(pick) = &safest_pick {
            tracing::info!(
                "Predicted {} vs {} as of {}: safest pick {} ({:.1}%){}",
                fixture.home_team,
                fixture.away_team,
                fixture.as_of_date,
                pick.label,
                pick.probability * 100.0,
                if low_confidence { " [low confidence]" } else { "" }
            );
        }

        Ok(FixtureForecast {
            fixture: fixture.clone(),
            home_form,
            away_form,
            results,
            safest_pick,
        })
    }
}

/// Most probable outcome over all markets; ties keep the earlier market
pub fn safest_pick(results: &[PredictionResult]) -> Option<SafestPick> {
    results
        .iter()
        .filter_map(|r| r.best_outcome().map(|o| (r.market, o)))
        .fold(None, |best: Option<SafestPick>, (market, o)| match best {
            Some(b) if b.probability >= o.probability => Some(b),
            _ => Some(SafestPick {
                market,
                outcome: o.outcome,
                label: o.label.clone(),
                probability: o.probability,
            }),
        })
}
