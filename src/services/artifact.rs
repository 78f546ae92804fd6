//! JSON model artifacts: one file per market plus a manifest.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::models::{Market, Outcome};
use crate::services::feature_builder::{FEATURE_NAMES, FEATURE_SCHEMA_VERSION};
use crate::services::market_model::{
    BttsModel, MarketClassifier, MarketModel, MatchResultModel, ModelSet, OverUnderModel,
};

const ARTIFACT_FORMAT: &str = "glitch-market-model";
const ARTIFACT_FORMAT_VERSION: u32 = 1;
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Serialize, Deserialize)]
struct Envelope<M> {
    format: String,
    format_version: u32,
    model: M,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub market: Market,
    pub file: String,
    pub outcomes: Vec<Outcome>,
    pub trained_from: NaiveDate,
    pub trained_to: NaiveDate,
    pub seed: u64,
    pub train_rows: usize,
    pub test_accuracy: Option<f64>,
}

/// Human-readable summary of a saved model set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub created_at: DateTime<Utc>,
    pub feature_schema_version: u32,
    pub features: Vec<String>,
    pub window: usize,
    pub markets: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn for_models(models: &ModelSet) -> Self {
        Self {
            created_at: Utc::now(),
            feature_schema_version: FEATURE_SCHEMA_VERSION,
            features: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            window: models.window(),
            markets: models
                .models()
                .iter()
                .map(|m| ManifestEntry {
                    market: m.market,
                    file: artifact_file_name(m.market),
                    outcomes: m.market.outcomes().to_vec(),
                    trained_from: m.metadata.trained_from,
                    trained_to: m.metadata.trained_to,
                    seed: m.metadata.seed,
                    train_rows: m.metadata.train_rows,
                    test_accuracy: m.evaluation.as_ref().map(|e| e.accuracy),
                })
                .collect(),
        }
    }
}

pub fn artifact_file_name(market: Market) -> String {
    format!("model_{}.json", market.key())
}

pub fn artifact_path(dir: &Path, market: Market) -> PathBuf {
    dir.join(artifact_file_name(market))
}

/// Write via a temporary file so readers never see a half-written artifact
fn write_json<T: Serialize>(path: &Path, value: &T, pretty: bool) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        if pretty {
            serde_json::to_writer_pretty(&mut writer, value)?;
        } else {
            serde_json::to_writer(&mut writer, value)?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Hidden sibling of `dir`, e.g. `models` -> `.models.staging`
fn sibling_dir(dir: &Path, tag: &str) -> PathBuf {
    let name = dir
        .file_name()
        .map_or_else(|| "models".to_string(), |n| n.to_string_lossy().into_owned());
    dir.with_file_name(format!(".{}.{}", name, tag))
}

fn clear_dir(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)?;
    }
    Ok(())
}
pub fn save_model(model: &MarketModel, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = artifact_path(dir, model.market);
    let envelope = Envelope {
        format: ARTIFACT_FORMAT.to_string(),
        format_version: ARTIFACT_FORMAT_VERSION,
        model,
    };
    write_json(&path, &envelope, false)?;
    tracing::info!("Saved {} model to {}", model.market, path.display());
    Ok(path)
}

/// Load one artifact and check it against the current feature schema
pub fn load_model(path: &Path, expected: Market) -> Result<MarketModel> {
    if !path.exists() {
        return Err(EngineError::MissingArtifact(path.display().to_string()));
    }
    let reader = BufReader::new(File::open(path)?);
    let envelope: Envelope<MarketModel> = serde_json::from_reader(reader)?;

    if envelope.format != ARTIFACT_FORMAT || envelope.format_version != ARTIFACT_FORMAT_VERSION {
        return Err(EngineError::InvalidParams(format!(
            "{} is not a v{} {} artifact",
            path.display(),
            ARTIFACT_FORMAT_VERSION,
            ARTIFACT_FORMAT
        )));
    }
    let model = envelope.model;
    if model.market != expected {
        return Err(EngineError::MarketMismatch {
            expected,
            found: model.market,
        });
    }
    model.check_compatible()?;
    Ok(model)
}

/// Save all three markets as one unit.
///
/// The set is written into a staging directory next to `dir` and swapped in
/// only once every file is on disk, so a failed save leaves the previous set
/// untouched. `dir` is owned by the model set: anything else in it is replaced.
pub fn save_model_set(models: &ModelSet, dir: &Path) -> Result<Manifest> {
    let staging = sibling_dir(dir, "staging");
    clear_dir(&staging)?;
    fs::create_dir_all(&staging)?;

    let manifest = match write_set(models, &staging) {
        Ok(manifest) => manifest,
        Err(e) => {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }
    };

    let previous = sibling_dir(dir, "previous");
    clear_dir(&previous)?;
    if dir.exists() {
        fs::rename(dir, &previous)?;
    }
    if let Err(e) = fs::rename(&staging, dir) {
        if previous.exists() {
            let _ = fs::rename(&previous, dir);
        }
        let _ = fs::remove_dir_all(&staging);
        return Err(e.into());
    }
    if let Err(e) = clear_dir(&previous) {
        tracing::warn!("Could not remove old model set {}: {}", previous.display(), e);
    }
    tracing::info!("Saved model set to {}", dir.display());
    Ok(manifest)
}

fn write_set(models: &ModelSet, dir: &Path) -> Result<Manifest> {
    for model in models.models() {
        save_model(model, dir)?;
    }
    let manifest = Manifest::for_models(models);
    write_json(&dir.join(MANIFEST_FILE), &manifest, true)?;
    Ok(manifest)
}

pub fn load_model_set(dir: &Path) -> Result<ModelSet> {
    let set = ModelSet::new(
        MatchResultModel::from_model(load_model(
            &artifact_path(dir, Market::MatchResult),
            Market::MatchResult,
        )?)?,
        OverUnderModel::from_model(load_model(
            &artifact_path(dir, Market::OverUnder25),
            Market::OverUnder25,
        )?)?,
        BttsModel::from_model(load_model(&artifact_path(dir, Market::Btts), Market::Btts)?)?,
    )?;
    check_same_run(&set, dir)?;
    tracing::info!("Loaded model set from {}", dir.display());
    Ok(set)
}

/// One training run fits every market with the same seed on the same rows
fn check_same_run(set: &ModelSet, dir: &Path) -> Result<()> {
    let [first, rest @ ..] = set.models();
    let run = |m: &MarketModel| {
        (
            m.metadata.seed,
            m.metadata.trained_from,
            m.metadata.trained_to,
            m.metadata.train_rows,
        )
    };
    if let Some(odd) = rest.iter().copied().find(|&m| run(m) != run(first)) {
        return Err(EngineError::MixedArtifacts(format!(
            "{} ({} disagrees with {})",
            dir.display(),
            odd.market.key(),
            first.market.key()
        )));
    }
    Ok(())
}

pub fn read_manifest(dir: &Path) -> Result<Manifest> {
    let path = dir.join(MANIFEST_FILE);
    if !path.exists() {
        return Err(EngineError::MissingArtifact(path.display().to_string()));
    }
    Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeatureVector, MatchOutcome, TrainingRow};
    use crate::services::forest::ForestParams;

    fn rows() -> Vec<TrainingRow> {
        (0..12u64)
            .map(|i| TrainingRow {
                match_date: NaiveDate::from_ymd_opt(2023, 8, 1).unwrap() + chrono::Days::new(i * 7),
                home_team: "A".to_string(),
                away_team: "B".to_string(),
                features: FeatureVector {
                    values: vec![i as f64, 1.0, 2.0, 1.0, 1.0, 2.0, 0.5, 0.25],
                    schema_version: FEATURE_SCHEMA_VERSION,
                    home_low_confidence: false,
                    away_low_confidence: false,
                },
                match_result: if i < 6 { MatchOutcome::Away } else { MatchOutcome::Home },
                over25: i % 3 == 0,
                btts: i % 2 == 0,
            })
            .collect()
    }

    fn params() -> ForestParams {
        ForestParams {
            n_trees: 5,
            max_depth: 3,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        }
    }

    fn model_set(seed: u64) -> ModelSet {
        let rows = rows();
        ModelSet::new(
            MatchResultModel::train(&rows, &params(), seed, 5).unwrap(),
            OverUnderModel::train(&rows, &params(), seed, 5).unwrap(),
            BttsModel::train(&rows, &params(), seed, 5).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn model_set_round_trips_through_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let set = model_set(1);
        let manifest = save_model_set(&set, dir.path()).unwrap();
        assert_eq!(manifest.markets.len(), 3);
        assert_eq!(manifest.markets[1].file, "model_over_under_25.json");
        assert!(dir.path().join("model_match_result.json").exists());
        assert!(dir.path().join("model_btts.json").exists());

        let loaded = load_model_set(dir.path()).unwrap();
        let features = &rows()[3].features;
        for market in Market::ALL {
            assert_eq!(
                loaded.get(market).predict_proba(features).unwrap(),
                set.get(market).predict_proba(features).unwrap()
            );
        }
        assert_eq!(read_manifest(dir.path()).unwrap(), manifest);
    }

    #[test]
    fn missing_and_misplaced_artifacts_fail() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_model_set(dir.path()),
            Err(EngineError::MissingArtifact(_))
        ));

        let set = model_set(1);
        let path = save_model(set.get(Market::Btts), dir.path()).unwrap();
        assert!(matches!(
            load_model(&path, Market::MatchResult),
            Err(EngineError::MarketMismatch {
                expected: Market::MatchResult,
                found: Market::Btts
            })
        ));
    }

    #[test]
    fn schema_version_drift_is_a_shape_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let set = model_set(1);
        let path = save_model(set.get(Market::MatchResult), dir.path()).unwrap();

        let mut json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        json["model"]["schema_version"] = serde_json::json!(FEATURE_SCHEMA_VERSION + 1);
        fs::write(&path, json.to_string()).unwrap();

        assert!(matches!(
            load_model(&path, Market::MatchResult),
            Err(EngineError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn resaving_replaces_the_whole_set() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("models");
        save_model_set(&model_set(1), &dir).unwrap();
        save_model_set(&model_set(99), &dir).unwrap();

        let loaded = load_model_set(&dir).unwrap();
        assert!(loaded.models().iter().all(|m| m.metadata.seed == 99));
        assert!(read_manifest(&dir).unwrap().markets.iter().all(|e| e.seed == 99));

        let leftovers: Vec<_> = fs::read_dir(root.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("models")]);
        assert!(!dir.join("model_btts.json.tmp").exists());
    }

    #[test]
    fn failed_save_keeps_the_previous_set() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("models");
        save_model_set(&model_set(1), &dir).unwrap();

        // A stray file where the staging directory goes makes the save fail
        fs::write(sibling_dir(&dir, "staging"), b"").unwrap();
        assert!(save_model_set(&model_set(99), &dir).is_err());

        let loaded = load_model_set(&dir).unwrap();
        assert!(loaded.models().iter().all(|m| m.metadata.seed == 1));
    }

    #[test]
    fn artifacts_from_different_runs_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        save_model_set(&model_set(1), dir.path()).unwrap();
        save_model(model_set(99).get(Market::Btts), dir.path()).unwrap();

        match load_model_set(dir.path()) {
            Err(EngineError::MixedArtifacts(msg)) => assert!(msg.contains("btts")),
            other => panic!("expected MixedArtifacts, got {:?}", other.map(|s| s.window())),
        }
    }
}
