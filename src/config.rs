use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::services::LoadOptions;

pub const DEFAULT_PORT: u16 = 3000;

/// Process configuration, read once at startup and passed down explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// CSV file or directory of CSV files with match history
    pub data_path: PathBuf,
    pub database_url: String,
    pub model_dir: PathBuf,
    /// Teams accepted for prediction even without any history
    pub extra_teams: Vec<String>,
    /// Empty accepts every league tag
    pub allowed_leagues: Vec<String>,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/master_data.csv"),
            database_url: "sqlite:data/glitch.db".to_string(),
            model_dir: PathBuf::from("models"),
            extra_teams: Vec::new(),
            allowed_leagues: Vec::new(),
            port: DEFAULT_PORT,
        }
    }
}

impl AppConfig {
    /// Read `.env` (if present) and the `GLITCH_*` / `DATABASE_URL` variables
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let port = match lookup("GLITCH_PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("GLITCH_PORT is not a valid port: {}", raw))?,
            None => defaults.port,
        };

        Ok(Self {
            data_path: lookup("GLITCH_DATA_PATH").map_or(defaults.data_path, PathBuf::from),
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            model_dir: lookup("GLITCH_MODEL_DIR").map_or(defaults.model_dir, PathBuf::from),
            extra_teams: lookup("GLITCH_EXTRA_TEAMS").map(|v| split_list(&v)).unwrap_or_default(),
            allowed_leagues: lookup("GLITCH_ALLOWED_LEAGUES")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            port,
        })
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            allowed_leagues: self.allowed_leagues.clone(),
            default_league: None,
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
