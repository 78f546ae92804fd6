use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::models::{Market, TrainingRow};
use crate::services::dataset::{split, DatasetAssembler, DEFAULT_SPLIT_RATIO};
use crate::services::evaluation::Evaluation;
use crate::services::feature_builder::{FeatureBuilder, DEFAULT_WINDOW};
use crate::services::forest::ForestParams;
use crate::services::market_model::{
    BttsModel, MarketClassifier, MarketModel, MatchResultModel, ModelSet, OverUnderModel,
};
use crate::services::match_store::MatchStore;

/// Everything a training run depends on. Nothing is read from globals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingParams {
    pub window: usize,
    pub split_ratio: f64,
    pub seed: u64,
    pub min_history: usize,
    pub match_result: ForestParams,
    pub over_under: ForestParams,
    pub btts: ForestParams,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            split_ratio: DEFAULT_SPLIT_RATIO,
            seed: 42,
            min_history: 0,
            match_result: ForestParams::default(),
            over_under: ForestParams::default(),
            btts: ForestParams::default(),
        }
    }
}

impl TrainingParams {
    pub fn forest(&self, market: Market) -> &ForestParams {
        match market {
            Market::MatchResult => &self.match_result,
            Market::OverUnder25 => &self.over_under,
            Market::Btts => &self.btts,
        }
    }

    /// Same forest settings for every market
    pub fn with_forest(mut self, forest: ForestParams) -> Self {
        self.match_result = forest;
        self.over_under = forest;
        self.btts = forest;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub total_rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub low_confidence_rows: usize,
    pub train_range: Option<(NaiveDate, NaiveDate)>,
    pub test_range: Option<(NaiveDate, NaiveDate)>,
    pub evaluations: Vec<Evaluation>,
    pub params: TrainingParams,
}

pub struct TrainingOutcome {
    pub models: ModelSet,
    pub report: TrainingReport,
}

fn date_range(rows: &[TrainingRow]) -> Option<(NaiveDate, NaiveDate)> {
    Some((rows.first()?.match_date, rows.last()?.match_date))
}

fn fit_market<C: MarketClassifier>(
    train: &[TrainingRow],
    test: &[TrainingRow],
    params: &TrainingParams,
) -> Result<C> {
    let market = C::MARKET;
    let mut model = MarketModel::fit(market, train, params.forest(market), params.seed, params.window)?;
    if !test.is_empty() {
        let evaluation = model.evaluate(test)?;
        tracing::info!(
            "{}: accuracy {:.1}%, log loss {:.3}, brier {:.3} on {} test rows",
            market,
            evaluation.accuracy * 100.0,
            evaluation.log_loss,
            evaluation.brier,
            evaluation.samples
        );
        model.evaluation = Some(evaluation);
    }
    C::from_model(model)
}

/// Build features, split by date and fit all three markets.
///
/// The markets share no state, so they are fitted concurrently; each is
/// seeded explicitly and the result matches a sequential run.
pub fn train_all(store: &MatchStore, params: &TrainingParams) -> Result<TrainingOutcome> {
    let builder = FeatureBuilder::with_window(store, params.window)?;
    let rows = DatasetAssembler::new(builder)
        .with_min_history(params.min_history)
        .assemble(store.records());
    let total_rows = rows.len();
    let low_confidence_rows = rows.iter().filter(|r| r.features.low_confidence()).count();

    let (train, test) = split(rows, params.split_ratio)?;
    if train.is_empty() {
        return Err(EngineError::InsufficientTrainingData {
            market: Market::MatchResult,
            rows: 0,
        });
    }

    let (match_result, (over_under, btts)) = rayon::join(
        || fit_market::<MatchResultModel>(&train, &test, params),
        || {
            rayon::join(
                || fit_market::<OverUnderModel>(&train, &test, params),
                || fit_market::<BttsModel>(&train, &test, params),
            )
        },
    );
    let models = ModelSet::new(match_result?, over_under?, btts?)?;

    let report = TrainingReport {
        total_rows,
        train_rows: train.len(),
        test_rows: test.len(),
        low_confidence_rows,
        train_range: date_range(&train),
        test_range: date_range(&test),
        evaluations: models
            .models()
            .iter()
            .filter_map(|m| m.evaluation.clone())
            .collect(),
        params: *params,
    };
    Ok(TrainingOutcome { models, report })
}
