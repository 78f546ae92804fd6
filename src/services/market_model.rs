use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result, ShapeMismatchError};
use crate::models::{FeatureVector, Market, OutcomeProbabilities, TrainingRow};
use crate::services::evaluation::Evaluation;
use crate::services::feature_builder::{FEATURE_COUNT, FEATURE_NAMES, FEATURE_SCHEMA_VERSION};
use crate::services::forest::{ForestParams, RandomForest};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub trained_from: NaiveDate,
    pub trained_to: NaiveDate,
    pub seed: u64,
    pub train_rows: usize,
    pub params: ForestParams,
    pub trained_at: DateTime<Utc>,
}

/// A fitted classifier for one market, together with the exact feature
/// layout it was trained on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketModel {
    pub market: Market,
    pub schema_version: u32,
    pub feature_names: Vec<String>,
    /// Form window the training features were built with
    pub window: usize,
    pub metadata: ModelMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Evaluation>,
    forest: RandomForest,
}

impl MarketModel {
    pub fn fit(
        market: Market,
        rows: &[TrainingRow],
        params: &ForestParams,
        seed: u64,
        window: usize,
    ) -> Result<Self> {
        let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
            return Err(EngineError::InsufficientTrainingData { market, rows: 0 });
        };
        for row in rows {
            check_shape(&format!("{} training row", market), &row.features)?;
        }

        let x: Vec<Vec<f64>> = rows.iter().map(|r| r.features.values.clone()).collect();
        let y: Vec<usize> = rows.iter().map(|r| market.label(r)).collect();
        let forest = RandomForest::fit(&x, &y, market.n_classes(), params, seed)?;

        tracing::debug!(
            "Fitted {} forest: {} trees, depth {}",
            market,
            forest.n_trees(),
            forest.max_depth()
        );

        Ok(Self {
            market,
            schema_version: FEATURE_SCHEMA_VERSION,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            window,
            metadata: ModelMetadata {
                trained_from: first.match_date.min(last.match_date),
                trained_to: first.match_date.max(last.match_date),
                seed,
                train_rows: rows.len(),
                params: *params,
                trained_at: Utc::now(),
            },
            evaluation: None,
            forest,
        })
    }

    pub fn predict_proba(&self, features: &FeatureVector) -> Result<OutcomeProbabilities> {
        if features.schema_version != self.schema_version || features.len() != self.forest.n_features() {
            return Err(ShapeMismatchError {
                context: format!("{} model", self.market),
                expected_version: self.schema_version,
                found_version: features.schema_version,
                expected_arity: self.forest.n_features(),
                found_arity: features.len(),
            }
            .into());
        }

        let probabilities = self
            .market
            .outcomes()
            .iter()
            .copied()
            .zip(self.forest.predict_proba(&features.values))
            .collect();
        Ok(OutcomeProbabilities {
            market: self.market,
            probabilities,
        })
    }

    pub fn evaluate(&self, rows: &[TrainingRow]) -> Result<Evaluation> {
        let predictions = rows
            .iter()
            .map(|row| {
                let probs = self.predict_proba(&row.features)?;
                let values = probs.probabilities.into_iter().map(|(_, p)| p).collect();
                Ok((values, self.market.label(row)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Evaluation::from_predictions(self.market, &predictions))
    }

    /// Fails unless this model reads the features the current builder emits
    pub fn check_compatible(&self) -> Result<()> {
        let names_match = self.feature_names.len() == FEATURE_COUNT
            && self.feature_names.iter().zip(FEATURE_NAMES).all(|(a, b)| a == b);
        if self.schema_version != FEATURE_SCHEMA_VERSION
            || self.forest.n_features() != FEATURE_COUNT
            || !names_match
        {
            return Err(ShapeMismatchError {
                context: format!("{} artifact", self.market),
                expected_version: FEATURE_SCHEMA_VERSION,
                found_version: self.schema_version,
                expected_arity: FEATURE_COUNT,
                found_arity: self.forest.n_features().max(self.feature_names.len()),
            }
            .into());
        }
        if self.forest.n_classes() != self.market.n_classes() || !self.forest.is_well_formed() {
            return Err(EngineError::InvalidParams(format!(
                "{} artifact has a malformed forest",
                self.market
            )));
        }
        Ok(())
    }

    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }
}

fn check_shape(context: &str, features: &FeatureVector) -> Result<()> {
    if features.schema_version != FEATURE_SCHEMA_VERSION || features.len() != FEATURE_COUNT {
        return Err(ShapeMismatchError {
            context: context.to_string(),
            expected_version: FEATURE_SCHEMA_VERSION,
            found_version: features.schema_version,
            expected_arity: FEATURE_COUNT,
            found_arity: features.len(),
        }
        .into());
    }
    Ok(())
}

/// Capability shared by the three market classifiers
pub trait MarketClassifier: Sized {
    const MARKET: Market;

    fn from_model(model: MarketModel) -> Result<Self>;

    fn model(&self) -> &MarketModel;

    fn train(rows: &[TrainingRow], params: &ForestParams, seed: u64, window: usize) -> Result<Self> {
        Self::from_model(MarketModel::fit(Self::MARKET, rows, params, seed, window)?)
    }

    fn predict_proba(&self, features: &FeatureVector) -> Result<OutcomeProbabilities> {
        self.model().predict_proba(features)
    }

    fn evaluate(&self, rows: &[TrainingRow]) -> Result<Evaluation> {
        self.model().evaluate(rows)
    }
}

fn expect_market(model: &MarketModel, expected: Market) -> Result<()> {
    if model.market != expected {
        return Err(EngineError::MarketMismatch {
            expected,
            found: model.market,
        });
    }
    Ok(())
}

/// Home / Draw / Away
#[derive(Debug, Clone)]
pub struct MatchResultModel(MarketModel);

impl MarketClassifier for MatchResultModel {
    const MARKET: Market = Market::MatchResult;

    fn from_model(model: MarketModel) -> Result<Self> {
        expect_market(&model, Self::MARKET)?;
        Ok(Self(model))
    }

    fn model(&self) -> &MarketModel {
        &self.0
    }
}

/// Total goals over or under 2.5
#[derive(Debug, Clone)]
pub struct OverUnderModel(MarketModel);

impl MarketClassifier for OverUnderModel {
    const MARKET: Market = Market::OverUnder25;

    fn from_model(model: MarketModel) -> Result<Self> {
        expect_market(&model, Self::MARKET)?;
        Ok(Self(model))
    }

    fn model(&self) -> &MarketModel {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct BttsModel(MarketModel);

impl MarketClassifier for BttsModel {
    const MARKET: Market = Market::Btts;

    fn from_model(model: MarketModel) -> Result<Self> {
        expect_market(&model, Self::MARKET)?;
        Ok(Self(model))
    }

    fn model(&self) -> &MarketModel {
        &self.0
    }
}

/// The three trained markets. Immutable once built; re-training produces a
/// new set.
#[derive(Debug, Clone)]
pub struct ModelSet {
    match_result: MatchResultModel,
    over_under: OverUnderModel,
    btts: BttsModel,
}

impl ModelSet {
    pub fn new(match_result: MatchResultModel, over_under: OverUnderModel, btts: BttsModel) -> Result<Self> {
        let window = match_result.model().window;
        if over_under.model().window != window || btts.model().window != window {
            return Err(EngineError::InvalidParams(
                "all market models must share one form window".to_string(),
            ));
        }
        Ok(Self {
            match_result,
            over_under,
            btts,
        })
    }

    /// Form window every model was trained with
    pub fn window(&self) -> usize {
        self.match_result.model().window
    }

    pub fn get(&self, market: Market) -> &MarketModel {
        match market {
            Market::MatchResult => self.match_result.model(),
            Market::OverUnder25 => self.over_under.model(),
            Market::Btts => self.btts.model(),
        }
    }

    /// Models in `Market::ALL` order
    pub fn models(&self) -> [&MarketModel; 3] {
        Market::ALL.map(|m| self.get(m))
    }

    pub fn predict_all(&self, features: &FeatureVector) -> Result<Vec<OutcomeProbabilities>> {
        Ok(vec![
            self.match_result.predict_proba(features)?,
            self.over_under.predict_proba(features)?,
            self.btts.predict_proba(features)?,
        ])
    }
}
