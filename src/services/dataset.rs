use crate::error::{EngineError, Result};
use crate::models::{MatchRecord, TrainingRow, VenueContext};
use crate::services::feature_builder::FeatureBuilder;

pub const DEFAULT_SPLIT_RATIO: f64 = 0.8;

/// Turns played matches into labelled rows using the same feature path
/// as live inference.
pub struct DatasetAssembler<'a> {
    builder: FeatureBuilder<'a>,
    min_history: usize,
}

impl<'a> DatasetAssembler<'a> {
    pub fn new(builder: FeatureBuilder<'a>) -> Self {
        Self {
            builder,
            min_history: 0,
        }
    }

    /// Skip fixtures where either side has fewer prior venue matches.
    /// Zero keeps cold-start rows, flagged low confidence.
    pub fn with_min_history(mut self, min_history: usize) -> Self {
        self.min_history = min_history;
        self
    }

    pub fn assemble(&self, matches: &[MatchRecord]) -> Vec<TrainingRow> {
        let mut rows: Vec<TrainingRow> = matches
            .iter()
            .filter_map(|m| {
                let (home, away) = self.builder.snapshots(
                    &m.home_team,
                    &m.away_team,
                    m.date,
                    VenueContext::HomeAdvantage,
                );
                if home.venue_matches < self.min_history || away.venue_matches < self.min_history {
                    return None;
                }
                Some(TrainingRow {
                    match_date: m.date,
                    home_team: m.home_team.clone(),
                    away_team: m.away_team.clone(),
                    features: FeatureBuilder::combine(&home, &away),
                    match_result: m.result(),
                    over25: m.is_over_25(),
                    btts: m.btts(),
                })
            })
            .collect();
        rows.sort_by_key(|r| r.match_date);

        let cold = rows.iter().filter(|r| r.features.low_confidence()).count();
        tracing::info!(
            "Assembled {} training rows from {} matches ({} low confidence)",
            rows.len(),
            matches.len(),
            cold
        );
        rows
    }
}

/// Time-ordered train/test split. The earliest `ratio` share trains.
///
/// The cut never falls inside a single match day, so every training date is
/// strictly earlier than every test date.
pub fn split(mut rows: Vec<TrainingRow>, ratio: f64) -> Result<(Vec<TrainingRow>, Vec<TrainingRow>)> {
    if !(ratio > 0.0 && ratio < 1.0) {
        return Err(EngineError::InvalidParams(format!(
            "split ratio must be between 0 and 1, got {}",
            ratio
        )));
    }
    rows.sort_by_key(|r| r.match_date);

    let mut cut = (rows.len() as f64 * ratio) as usize;
    if cut > 0 && cut < rows.len() && rows[cut - 1].match_date == rows[cut].match_date {
        let boundary = rows[cut].match_date;
        let group_start = rows.partition_point(|r| r.match_date < boundary);
        cut = if group_start > 0 {
            group_start
        } else {
            rows.partition_point(|r| r.match_date <= boundary)
        };
    }

    let test = rows.split_off(cut);
    tracing::info!(
        "Split {} rows into {} train / {} test",
        rows.len() + test.len(),
        rows.len(),
        test.len()
    );
    Ok((rows, test))
}
