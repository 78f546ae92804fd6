//! Historical match records and the single read path over them.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{DataFormatError, DataFormatKind, EngineError, Result};
use crate::models::{MatchRecord, Venue};
use crate::services::leagues::league_from_filename;
use crate::utils::parse_match_date;

/// How many rejected rows are kept verbatim in a load report
pub const MAX_REPORTED_ERRORS: usize = 5;

/// A row as read from a tabular source, before validation.
///
/// Field aliases accept football-data.co.uk headers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMatchRow {
    #[serde(default, alias = "Date")]
    pub date: Option<String>,
    #[serde(default, alias = "HomeTeam")]
    pub home_team: Option<String>,
    #[serde(default, alias = "AwayTeam")]
    pub away_team: Option<String>,
    #[serde(default, alias = "FTHG")]
    pub home_goals: Option<String>,
    #[serde(default, alias = "FTAG")]
    pub away_goals: Option<String>,
    #[serde(default, alias = "League")]
    pub league: Option<String>,
}

#[derive(Debug, Clone)]
pub enum MatchSource {
    CsvFile(PathBuf),
    /// Every `*.csv` in the directory, merged in file-name order
    CsvDir(PathBuf),
    Rows { name: String, rows: Vec<RawMatchRow> },
}

impl MatchSource {
    /// File or directory, whichever `path` is
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.is_dir() {
            MatchSource::CsvDir(path)
        } else {
            MatchSource::CsvFile(path)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Accepted league tags; empty accepts any non-blank tag
    pub allowed_leagues: Vec<String>,
    /// Used when neither the row nor the file name carries a league
    pub default_league: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub rows_read: usize,
    pub loaded: usize,
    pub dropped: usize,
    pub duplicates: usize,
    pub examples: Vec<DataFormatError>,
}

impl LoadReport {
    fn reject(&mut self, error: DataFormatError) {
        tracing::debug!("Dropping row: {}", error);
        self.dropped += 1;
        if self.examples.len() < MAX_REPORTED_ERRORS {
            self.examples.push(error);
        }
    }

    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} rows read, {} loaded, {} dropped, {} duplicates",
            self.rows_read, self.loaded, self.dropped, self.duplicates
        );
        for example in &self.examples {
            summary.push_str(&format!("\n  - {}", example));
        }
        summary
    }
}

/// Per-team positions into the date-sorted record list
#[derive(Debug, Default)]
struct TeamIndex {
    home: Vec<usize>,
    away: Vec<usize>,
    all: Vec<usize>,
}

impl TeamIndex {
    fn slice(&self, venue: Venue) -> &[usize] {
        match venue {
            Venue::Home => &self.home,
            Venue::Away => &self.away,
            Venue::Any => &self.all,
        }
    }
}

/// Append-only, date-ordered store of played matches
#[derive(Debug, Default)]
pub struct MatchStore {
    records: Vec<MatchRecord>,
    index: HashMap<String, TeamIndex>,
}

impl MatchStore {
    /// Build from already-validated records. Sorting is stable, so same-day
    /// fixtures keep their source order.
    pub fn from_records(mut records: Vec<MatchRecord>) -> Self {
        records.sort_by_key(|m| m.date);

        let mut index: HashMap<String, TeamIndex> = HashMap::new();
        for (i, record) in records.iter().enumerate() {
            let home = index.entry(record.home_team.clone()).or_default();
            home.home.push(i);
            home.all.push(i);
            let away = index.entry(record.away_team.clone()).or_default();
            away.away.push(i);
            away.all.push(i);
        }

        Self { records, index }
    }

    /// Load and validate a source. Malformed rows are dropped and counted;
    /// only an empty result is fatal.
    pub fn load(source: MatchSource, options: &LoadOptions) -> Result<(Self, LoadReport)> {
        let mut loader = Loader::new(options);

        match source {
            MatchSource::CsvFile(path) => loader.read_csv(&path)?,
            MatchSource::CsvDir(dir) => {
                let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)?
                    .filter_map(|entry| entry.ok().map(|e| e.path()))
                    .filter(|p| {
                        p.extension()
                            .and_then(|e| e.to_str())
                            .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
                    })
                    .collect();
                files.sort();
                tracing::info!("Merging {} CSV files from {}", files.len(), dir.display());
                for file in files {
                    loader.read_csv(&file)?;
                }
            }
            MatchSource::Rows { name, rows } => {
                for (i, row) in rows.into_iter().enumerate() {
                    loader.accept(row, &name, i as u64 + 1, None);
                }
            }
        }

        let (records, report) = loader.finish();
        if records.is_empty() {
            tracing::error!("No usable match records: {}", report.summary());
            return Err(EngineError::EmptyDataset {
                dropped: report.dropped,
            });
        }

        if report.dropped > 0 {
            tracing::warn!("Dropped malformed rows: {}", report.summary());
        }
        let store = Self::from_records(records);
        tracing::info!(
            "Loaded {} matches for {} teams{}",
            store.len(),
            store.index.len(),
            store
                .date_range()
                .map_or(String::new(), |(from, to)| format!(" ({} to {})", from, to))
        );
        Ok((store, report))
    }

    /// Matches of `team` played strictly before `as_of`, most recent first.
    ///
    /// Every feature reads history through here, so no record dated on or
    /// after `as_of` can leak into a snapshot.
    pub fn matches_before<'a>(
        &'a self,
        team: &str,
        as_of: NaiveDate,
        venue: Venue,
    ) -> impl Iterator<Item = &'a MatchRecord> + 'a {
        let positions: &'a [usize] = match self.index.get(team) {
            Some(history) => history.slice(venue),
            None => &[],
        };
        let cutoff = positions.partition_point(|&i| self.records[i].date < as_of);
        positions[..cutoff]
            .iter()
            .rev()
            .map(move |&i| &self.records[i])
    }

    pub fn records(&self) -> &[MatchRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains_team(&self, team: &str) -> bool {
        self.index.contains_key(team)
    }

    /// Sorted team names
    pub fn teams(&self) -> Vec<&str> {
        let mut teams: Vec<&str> = self.index.keys().map(String::as_str).collect();
        teams.sort_unstable();
        teams
    }

    pub fn leagues(&self) -> Vec<&str> {
        let mut leagues: Vec<&str> = self
            .records
            .iter()
            .map(|m| m.league.as_str())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        leagues.sort_unstable();
        leagues
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.records.first()?.date, self.records.last()?.date))
    }
}

struct Loader<'a> {
    options: &'a LoadOptions,
    records: Vec<MatchRecord>,
    seen: HashSet<(NaiveDate, String, String, String)>,
    report: LoadReport,
}

impl<'a> Loader<'a> {
    fn new(options: &'a LoadOptions) -> Self {
        Self {
            options,
            records: Vec::new(),
            seen: HashSet::new(),
            report: LoadReport::default(),
        }
    }

    fn read_csv(&mut self, path: &Path) -> Result<()> {
        let source_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let file_league = league_from_filename(path);

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;
        let headers = reader.headers()?.clone();
        let before = self.report.rows_read;

        for result in reader.records() {
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    self.report.rows_read += 1;
                    let line = e.position().map_or(0, |p| p.line());
                    self.report.reject(DataFormatError {
                        source_name: source_name.clone(),
                        line,
                        kind: DataFormatKind::Unreadable(e.to_string()),
                    });
                    continue;
                }
            };
            let line = record.position().map_or(0, |p| p.line());
            match record.deserialize::<RawMatchRow>(Some(&headers)) {
                Ok(row) => self.accept(row, &source_name, line, file_league),
                Err(e) => {
                    self.report.rows_read += 1;
                    self.report.reject(DataFormatError {
                        source_name: source_name.clone(),
                        line,
                        kind: DataFormatKind::Unreadable(e.to_string()),
                    });
                }
            }
        }

        tracing::debug!(
            "Read {} rows from {}",
            self.report.rows_read - before,
            source_name
        );
        Ok(())
    }

    fn accept(&mut self, row: RawMatchRow, source_name: &str, line: u64, file_league: Option<&str>) {
        self.report.rows_read += 1;
        match self.validate(row, file_league) {
            Ok(record) => {
                let key = (
                    record.date,
                    record.home_team.clone(),
                    record.away_team.clone(),
                    record.league.clone(),
                );
                if self.seen.insert(key) {
                    self.records.push(record);
                } else {
                    self.report.duplicates += 1;
                }
            }
            Err(kind) => self.report.reject(DataFormatError {
                source_name: source_name.to_string(),
                line,
                kind,
            }),
        }
    }

    fn validate(
        &self,
        row: RawMatchRow,
        file_league: Option<&str>,
    ) -> std::result::Result<MatchRecord, DataFormatKind> {
        let raw_date = required(row.date, "date")?;
        let date = parse_match_date(&raw_date).ok_or(DataFormatKind::InvalidDate(raw_date))?;

        let home_team = team_name(row.home_team, "home_team")?;
        let away_team = team_name(row.away_team, "away_team")?;
        if home_team == away_team {
            return Err(DataFormatKind::SameTeam(home_team));
        }

        let home_goals = goals(row.home_goals, "home_goals")?;
        let away_goals = goals(row.away_goals, "away_goals")?;

        let league = row
            .league
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .or_else(|| file_league.map(str::to_string))
            .or_else(|| self.options.default_league.clone())
            .ok_or(DataFormatKind::MissingField("league"))?;
        if !self.options.allowed_leagues.is_empty()
            && !self.options.allowed_leagues.iter().any(|l| *l == league)
        {
            return Err(DataFormatKind::UnknownLeague(league));
        }

        Ok(MatchRecord {
            date,
            home_team,
            away_team,
            home_goals,
            away_goals,
            league,
        })
    }

    fn finish(mut self) -> (Vec<MatchRecord>, LoadReport) {
        self.report.loaded = self.records.len();
        (self.records, self.report)
    }
}

fn required(value: Option<String>, field: &'static str) -> std::result::Result<String, DataFormatKind> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(DataFormatKind::MissingField(field))
}

fn team_name(value: Option<String>, field: &'static str) -> std::result::Result<String, DataFormatKind> {
    match value {
        None => Err(DataFormatKind::MissingField(field)),
        Some(v) if v.trim().is_empty() => Err(DataFormatKind::BlankTeam),
        Some(v) => Ok(v.trim().to_string()),
    }
}

/// Whole-number goal count. Exports that passed through a float column
/// write `2.0`; fractional or negative values are still rejected.
fn goals(value: Option<String>, field: &'static str) -> std::result::Result<u8, DataFormatKind> {
    let raw = required(value, field)?;
    if let Ok(goals) = raw.parse::<u8>() {
        return Ok(goals);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= f64::from(u8::MAX) => Ok(v as u8),
        _ => Err(DataFormatKind::InvalidScore(raw)),
    }
}
