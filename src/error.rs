use thiserror::Error;

use crate::models::Market;

/// Why a historical row was rejected at the load boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataFormatKind {
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    #[error("invalid date '{0}'")]
    InvalidDate(String),
    #[error("non-numeric score '{0}'")]
    InvalidScore(String),
    #[error("blank team name")]
    BlankTeam,
    #[error("'{0}' listed as both home and away")]
    SameTeam(String),
    #[error("unknown league tag '{0}'")]
    UnknownLeague(String),
    #[error("unreadable row: {0}")]
    Unreadable(String),
}

/// A malformed historical record. Recoverable: the row is skipped and counted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{source_name}:{line}: {kind}")]
pub struct DataFormatError {
    pub source_name: String,
    pub line: u64,
    pub kind: DataFormatKind,
}

/// Model and feature schema disagree. Never truncate or pad, fail instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error(
    "feature shape mismatch in {context}: expected schema v{expected_version} with {expected_arity} features, found v{found_version} with {found_arity}"
)]
pub struct ShapeMismatchError {
    pub context: String,
    pub expected_version: u32,
    pub found_version: u32,
    pub expected_arity: usize,
    pub found_arity: usize,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown team '{team}'{}", format_suggestions(.suggestions))]
pub struct UnknownTeamError {
    pub team: String,
    pub suggestions: Vec<String>,
}

fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (did you mean: {}?)", suggestions.join(", "))
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    ShapeMismatch(#[from] ShapeMismatchError),

    #[error(transparent)]
    UnknownTeam(#[from] UnknownTeamError),

    #[error("no usable match records ({dropped} rows dropped as malformed)")]
    EmptyDataset { dropped: usize },

    #[error("invalid parameter: {0}")]
    InvalidParams(String),

    #[error("not enough training rows for {market}: {rows}")]
    InsufficientTrainingData { market: Market, rows: usize },

    #[error("artifact holds a {found} model, expected {expected}")]
    MarketMismatch { expected: Market, found: Market },

    #[error("no model artifact at {0}")]
    MissingArtifact(String),

    #[error("model artifacts come from different training runs: {0}")]
    MixedArtifacts(String),

    #[error("no trained models are loaded")]
    NoModels,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_team_lists_suggestions() {
        let err = UnknownTeamError {
            team: "Arsnal".to_string(),
            suggestions: vec!["Arsenal".to_string()],
        };
        assert_eq!(err.to_string(), "unknown team 'Arsnal' (did you mean: Arsenal?)");

        let bare = UnknownTeamError {
            team: "Nowhere FC".to_string(),
            suggestions: vec![],
        };
        assert_eq!(bare.to_string(), "unknown team 'Nowhere FC'");
    }

    #[test]
    fn data_format_error_names_row() {
        let err = DataFormatError {
            source_name: "E0.csv".to_string(),
            line: 12,
            kind: DataFormatKind::InvalidScore("two".to_string()),
        };
        assert_eq!(err.to_string(), "E0.csv:12: non-numeric score 'two'");
    }

    #[test]
    fn data_format_kinds_describe_the_problem() {
        assert_eq!(DataFormatKind::MissingField("Date").to_string(), "missing field 'Date'");
        assert_eq!(DataFormatKind::BlankTeam.to_string(), "blank team name");
        assert_eq!(
            DataFormatKind::SameTeam("Leeds".to_string()).to_string(),
            "'Leeds' listed as both home and away"
        );
        assert_eq!(
            DataFormatKind::Unreadable("bad utf-8".to_string()).to_string(),
            "unreadable row: bad utf-8"
        );
    }

    #[test]
    fn mixed_artifacts_name_the_directory() {
        let err = EngineError::MixedArtifacts("models (btts disagrees with match_result)".to_string());
        assert!(err.to_string().contains("different training runs"));
    }
}
