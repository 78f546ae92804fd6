pub mod seed;
pub use seed::seed_data;

use chrono::Utc;
use sqlx::{sqlite::SqliteConnectOptions, Row, SqlitePool};
use std::str::FromStr;

use crate::error::Result;
use crate::models::MatchRecord;
use crate::services::RawMatchRow;

pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    // Strip the "sqlite:" prefix to get the file path, create parent dir if needed
    let file_path = database_url
        .strip_prefix("sqlite:///")
        .or_else(|| database_url.strip_prefix("sqlite://"))
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);

    if !file_path.starts_with(":memory:") {
        if let Some(parent) = std::path::Path::new(file_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let pool = SqlitePool::connect_with(options).await?;
    Ok(pool)
}

/// Called from the CLI where no pool exists yet.
pub async fn init_database(database_url: &str) -> Result<SqlitePool> {
    let pool = create_pool(database_url).await?;
    init_database_with_pool(&pool).await?;
    Ok(pool)
}

pub async fn init_database_with_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS matches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            match_date TEXT NOT NULL,
            home_team TEXT NOT NULL,
            away_team TEXT NOT NULL,
            home_goals INTEGER NOT NULL,
            away_goals INTEGER NOT NULL,
            league TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (match_date, home_team, away_team, league)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_matches_date ON matches (match_date)")
        .execute(pool)
        .await?;

    tracing::info!("Database schema ready");
    Ok(())
}

/// Insert played matches, skipping fixtures already stored. Returns rows added.
pub async fn insert_matches(pool: &SqlitePool, matches: &[MatchRecord]) -> Result<u64> {
    let now = Utc::now().to_rfc3339();
    let mut tx = pool.begin().await?;
    let mut inserted = 0;

    for m in matches {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO matches
            (match_date, home_team, away_team, home_goals, away_goals, league, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(m.date.format("%Y-%m-%d").to_string())
        .bind(&m.home_team)
        .bind(&m.away_team)
        .bind(i64::from(m.home_goals))
        .bind(i64::from(m.away_goals))
        .bind(&m.league)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        inserted += result.rows_affected();
    }

    tx.commit().await?;
    tracing::info!("Stored {} new matches ({} skipped as duplicates)", inserted, matches.len() as u64 - inserted);
    Ok(inserted)
}

/// Stored matches as raw rows, so they pass the same validation as CSV input
pub async fn load_match_rows(pool: &SqlitePool) -> Result<Vec<RawMatchRow>> {
    let rows = sqlx::query(
        "SELECT match_date, home_team, away_team, home_goals, away_goals, league FROM matches ORDER BY match_date ASC, id ASC",
    )
    .fetch_all(pool)
    .await?;

    let mut matches = Vec::with_capacity(rows.len());
    for row in rows {
        matches.push(RawMatchRow {
            date: row.get("match_date"),
            home_team: row.get("home_team"),
            away_team: row.get("away_team"),
            home_goals: row.get::<Option<i64>, _>("home_goals").map(|g| g.to_string()),
            away_goals: row.get::<Option<i64>, _>("away_goals").map(|g| g.to_string()),
            league: row.get("league"),
        });
    }
    Ok(matches)
}

pub async fn count_matches(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM matches")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn clear_matches(pool: &SqlitePool) -> Result<()> {
    sqlx::query("DELETE FROM matches").execute(pool).await?;
    tracing::info!("All matches cleared");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{LoadOptions, MatchSource, MatchStore};
    use chrono::NaiveDate;

    fn record(day: u32, home: &str, away: &str) -> MatchRecord {
        MatchRecord {
            date: NaiveDate::from_ymd_opt(2024, 8, day).unwrap(),
            home_team: home.to_string(),
            away_team: away.to_string(),
            home_goals: 2,
            away_goals: 1,
            league: "Premier League".to_string(),
        }
    }

    #[tokio::test]
    async fn stored_matches_feed_the_store() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let matches = vec![record(17, "Arsenal", "Wolves"), record(10, "Chelsea", "City")];
        assert_eq!(insert_matches(&pool, &matches).await.unwrap(), 2);
        assert_eq!(insert_matches(&pool, &matches[..1]).await.unwrap(), 0);
        assert_eq!(count_matches(&pool).await.unwrap(), 2);

        let rows = load_match_rows(&pool).await.unwrap();
        assert_eq!(rows[0].home_team.as_deref(), Some("Chelsea"));
        assert_eq!(rows[0].home_goals.as_deref(), Some("2"));

        let source = MatchSource::Rows {
            name: "sqlite".to_string(),
            rows,
        };
        let (store, report) = MatchStore::load(source, &LoadOptions::default()).unwrap();
        assert_eq!(report.dropped, 0);
        assert_eq!(store.records()[1], matches[0]);

        clear_matches(&pool).await.unwrap();
        assert_eq!(count_matches(&pool).await.unwrap(), 0);
    }
}
