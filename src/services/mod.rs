pub mod artifact;
pub mod dataset;
pub mod evaluation;
pub mod feature_builder;
pub mod forest;
pub mod leagues;
pub mod market_model;
pub mod match_store;
pub mod predictor;
pub mod registry;
pub mod trainer;
pub mod value;

pub use dataset::{split, DatasetAssembler};
pub use evaluation::{ClassMetrics, Evaluation};
pub use feature_builder::{FeatureBuilder, FEATURE_COUNT, FEATURE_NAMES, FEATURE_SCHEMA_VERSION};
pub use forest::{ForestParams, RandomForest};
pub use market_model::{BttsModel, MarketClassifier, MarketModel, MatchResultModel, ModelSet, OverUnderModel};
pub use match_store::{LoadOptions, LoadReport, MatchSource, MatchStore, RawMatchRow};
pub use predictor::PredictionEngine;
pub use registry::ModelRegistry;
pub use trainer::{train_all, TrainingOutcome, TrainingParams, TrainingReport};
