use std::path::Path;

use chrono::{Datelike, Days, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sqlx::SqlitePool;

use crate::error::{EngineError, Result};
use crate::models::MatchRecord;

use super::{count_matches, insert_matches};

pub const DEMO_LEAGUE: &str = "Premier League";

pub const DEMO_TEAMS: [&str; 20] = [
    "Arsenal",
    "Liverpool",
    "Manchester City",
    "Chelsea",
    "Aston Villa",
    "Tottenham Hotspur",
    "Newcastle United",
    "Manchester United",
    "Brighton",
    "West Ham United",
    "Everton",
    "Fulham",
    "Crystal Palace",
    "Brentford",
    "Wolves",
    "Nottingham Forest",
    "Bournemouth",
    "Leicester City",
    "Ipswich Town",
    "Southampton",
];

const HOME_GOAL_RATE: f64 = 1.5;
const AWAY_GOAL_RATE: f64 = 1.2;
const MAX_GOALS: u8 = 9;

/// Knuth's method; fine for the small rates used here
fn poisson(rng: &mut StdRng, lambda: f64) -> u8 {
    let limit = (-lambda).exp();
    let mut product: f64 = rng.gen();
    let mut k = 0;
    while product > limit && k < MAX_GOALS {
        k += 1;
        product *= rng.gen::<f64>();
    }
    k
}

/// Round-robin pairings by the circle method, first leg only
fn round_robin(n: usize) -> Vec<Vec<(usize, usize)>> {
    let mut slots: Vec<Option<usize>> = (0..n).map(Some).collect();
    if n % 2 == 1 {
        slots.push(None);
    }
    let size = slots.len();
    let mut rounds = Vec::with_capacity(size.saturating_sub(1));

    for round in 0..size.saturating_sub(1) {
        let mut pairs = Vec::new();
        for i in 0..size / 2 {
            if let (Some(a), Some(b)) = (slots[i], slots[size - 1 - i]) {
                // alternate so nobody hosts every first-leg game
                if (round + i) % 2 == 0 {
                    pairs.push((a, b));
                } else {
                    pairs.push((b, a));
                }
            }
        }
        rounds.push(pairs);
        slots[1..].rotate_right(1);
    }
    rounds
}

/// Synthetic double round-robin seasons with Poisson scores.
///
/// Each team gets fixed attack and defence multipliers, so stronger sides
/// win more often and the form features carry signal.
pub fn generate_seasons(
    teams: &[&str],
    seasons: usize,
    first_season: i32,
    league: &str,
    seed: u64,
) -> Result<Vec<MatchRecord>> {
    if teams.len() < 2 {
        return Err(EngineError::InvalidParams(
            "need at least two teams to build a fixture list".to_string(),
        ));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let strength: Vec<(f64, f64)> = teams
        .iter()
        .map(|_| (rng.gen_range(0.7..1.4), rng.gen_range(0.7..1.4)))
        .collect();

    let first_leg = round_robin(teams.len());
    let mut matches = Vec::new();

    for season in 0..seasons {
        let year = first_season + season as i32;
        let kickoff = NaiveDate::from_ymd_opt(year, 8, 10).ok_or_else(|| {
            EngineError::InvalidParams(format!("season {} is out of range", year))
        })?;

        let legs = first_leg
            .iter()
            .cloned()
            .chain(first_leg.iter().map(|r| r.iter().map(|&(h, a)| (a, h)).collect()));
        for (week, round) in legs.enumerate() {
            let date = kickoff + Days::new(week as u64 * 7);
            for (home, away) in round {
                let (home_attack, home_defence) = strength[home];
                let (away_attack, away_defence) = strength[away];
                matches.push(MatchRecord {
                    date,
                    home_team: teams[home].to_string(),
                    away_team: teams[away].to_string(),
                    home_goals: poisson(&mut rng, HOME_GOAL_RATE * home_attack / away_defence),
                    away_goals: poisson(&mut rng, AWAY_GOAL_RATE * away_attack / home_defence),
                    league: league.to_string(),
                });
            }
        }
    }

    tracing::debug!(
        "Generated {} matches over {} seasons from {}",
        matches.len(),
        seasons,
        matches.first().map_or(first_season, |m| m.date.year())
    );
    Ok(matches)
}

/// Fill an empty database with demo seasons. Leaves existing data alone.
pub async fn seed_data(pool: &SqlitePool, seasons: usize, first_season: i32, seed: u64) -> Result<u64> {
    let count = count_matches(pool).await?;
    if count > 0 {
        tracing::info!("Database already seeded ({} matches found), skipping.", count);
        return Ok(0);
    }

    tracing::info!("Seeding database with {} demo seasons...", seasons);
    let matches = generate_seasons(&DEMO_TEAMS, seasons, first_season, DEMO_LEAGUE, seed)?;
    let inserted = insert_matches(pool, &matches).await?;
    tracing::info!("Database seeded successfully.");
    Ok(inserted)
}

/// Write matches as a CSV the loader reads back unchanged
pub fn write_csv(path: &Path, matches: &[MatchRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut writer = csv::Writer::from_path(path)?;
    for m in matches {
        writer.serialize(m)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{LoadOptions, MatchSource, MatchStore};
    use std::collections::HashSet;

    #[test]
    fn every_pair_meets_home_and_away() {
        let teams = ["A", "B", "C", "D", "E"];
        let matches = generate_seasons(&teams, 1, 2023, "Test", 7).unwrap();
        assert_eq!(matches.len(), 5 * 4);

        let pairs: HashSet<(&str, &str)> = matches
            .iter()
            .map(|m| (m.home_team.as_str(), m.away_team.as_str()))
            .collect();
        assert_eq!(pairs.len(), 20);
        assert!(matches.iter().all(|m| m.home_team != m.away_team));
    }

    #[test]
    fn no_team_plays_twice_in_a_week() {
        let matches = generate_seasons(&DEMO_TEAMS, 1, 2024, DEMO_LEAGUE, 1).unwrap();
        let mut seen = HashSet::new();
        for m in &matches {
            assert!(seen.insert((m.date, m.home_team.clone())));
            assert!(seen.insert((m.date, m.away_team.clone())));
        }
        assert_eq!(matches.len(), 380);
    }

    #[test]
    fn same_seed_same_results() {
        let a = generate_seasons(&DEMO_TEAMS, 2, 2022, DEMO_LEAGUE, 99).unwrap();
        let b = generate_seasons(&DEMO_TEAMS, 2, 2022, DEMO_LEAGUE, 99).unwrap();
        assert_eq!(a, b);
        assert!(generate_seasons(&["Solo"], 1, 2022, DEMO_LEAGUE, 1).is_err());
    }

    #[test]
    fn csv_output_loads_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.csv");
        let matches = generate_seasons(&["A", "B", "C", "D"], 1, 2024, DEMO_LEAGUE, 3).unwrap();
        write_csv(&path, &matches).unwrap();

        let (store, report) =
            MatchStore::load(MatchSource::CsvFile(path), &LoadOptions::default()).unwrap();
        assert_eq!(report.dropped, 0);
        assert_eq!(store.len(), matches.len());
    }

    #[tokio::test]
    async fn seeds_only_once() {
        let pool = crate::db::init_database("sqlite::memory:").await.unwrap();
        let first = seed_data(&pool, 1, 2024, 5).await.unwrap();
        assert_eq!(first, 380);
        assert_eq!(seed_data(&pool, 1, 2024, 5).await.unwrap(), 0);
    }
}
