use anyhow::{Context, Result};
use chrono::{Days, NaiveDate, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::api::{self, AppState};
use crate::config::AppConfig;
use crate::db::{self, seed};
use crate::models::{Fixture, FixtureForecast, OddsMap, Outcome, Venue};
use crate::services::artifact::{load_model_set, save_model_set};
use crate::services::{
    train_all, FeatureBuilder, LoadOptions, MatchSource, MatchStore, ModelRegistry, PredictionEngine,
    TrainingParams,
};

/// Load history from the configured CSV path, or from SQLite with `from_db`
pub async fn load_store(config: &AppConfig, from_db: bool) -> Result<MatchStore> {
    let options = config.load_options();
    let source = if from_db {
        let pool = db::init_database(&config.database_url).await?;
        MatchSource::Rows {
            name: config.database_url.clone(),
            rows: db::load_match_rows(&pool).await?,
        }
    } else {
        MatchSource::from_path(&config.data_path)
    };

    let (store, report) = MatchStore::load(source, &options).context("failed to load match history")?;
    if report.dropped > 0 || report.duplicates > 0 {
        println!("⚠️  {}", report.summary());
    }
    Ok(store)
}

pub async fn train_models(config: &AppConfig, from_db: bool, params: TrainingParams) -> Result<()> {
    let store = load_store(config, from_db).await?;
    println!(
        "🧠 Training on {} matches (window {}, split {:.0}%, seed {})...",
        store.len(),
        params.window,
        params.split_ratio * 100.0,
        params.seed
    );

    let outcome = train_all(&store, &params)?;
    let report = &outcome.report;

    println!(
        "📊 {} rows: {} train / {} test ({} low confidence)",
        report.total_rows, report.train_rows, report.test_rows, report.low_confidence_rows
    );
    if let (Some((train_from, train_to)), Some((test_from, test_to))) = (report.train_range, report.test_range) {
        println!("   Train: {} → {} | Test: {} → {}", train_from, train_to, test_from, test_to);
    }

    for evaluation in &report.evaluations {
        println!(
            "\n🎯 {}: accuracy {:.1}% | log loss {:.3} | brier {:.3}",
            evaluation.market,
            evaluation.accuracy * 100.0,
            evaluation.log_loss,
            evaluation.brier
        );
        for class in &evaluation.per_class {
            println!(
                "   {:<10} precision {:>5.1}% | recall {:>5.1}% | support {}",
                class.outcome.label(),
                class.precision * 100.0,
                class.recall * 100.0,
                class.support
            );
        }
    }

    save_model_set(&outcome.models, &config.model_dir)?;
    println!("\n✅ Models saved to {}", config.model_dir.display());
    Ok(())
}

/// Parse `home=2.10,draw=3.40,over=1.95` into an odds map
pub fn parse_odds_arg(raw: &str) -> Result<OddsMap> {
    let mut odds = OddsMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("expected outcome=odds, got '{}'", pair))?;
        let outcome: Outcome = key.parse().map_err(anyhow::Error::msg)?;
        let price: f64 = value
            .trim()
            .parse()
            .with_context(|| format!("invalid odds '{}' for {}", value, key))?;
        odds.insert(outcome, price);
    }
    Ok(odds)
}

pub async fn predict_fixture(config: &AppConfig, from_db: bool, fixture: Fixture, odds: OddsMap) -> Result<()> {
    let store = Arc::new(load_store(config, from_db).await?);
    let models = load_model_set(&config.model_dir)
        .with_context(|| format!("no usable models in {}; run `glitch train` first", config.model_dir.display()))?;
    let engine = PredictionEngine::new(store, Arc::new(ModelRegistry::with_models(models)))
        .with_extra_teams(config.extra_teams.iter().cloned());

    let odds = (!odds.is_empty()).then_some(odds);
    let forecast = engine.predict_fixture(&fixture, odds.as_ref())?;
    print_forecast(&forecast);
    Ok(())
}

fn print_forecast(forecast: &FixtureForecast) {
    let fixture = &forecast.fixture;
    println!(
        "🔮 {} vs {} (as of {})",
        fixture.home_team, fixture.away_team, fixture.as_of_date
    );
    for form in [&forecast.home_form, &forecast.away_form] {
        println!(
            "   {:<20} form {:<5} | {} pts | {:.2} scored | {:.2} conceded | BTTS {:.0}%{}",
            form.team,
            if form.form.is_empty() { "-" } else { form.form.as_str() },
            form.points,
            form.goals_scored_avg,
            form.goals_conceded_avg,
            form.btts_rate * 100.0,
            if form.low_confidence { " ⚠️" } else { "" }
        );
    }

    for result in &forecast.results {
        println!("\n📊 {}:", result.market);
        for o in &result.outcomes {
            let odds = match (o.decimal_odds, o.edge) {
                (Some(price), Some(edge)) => format!(" @ {:.2} (edge {:+.1}%)", price, edge * 100.0),
                _ => String::new(),
            };
            let value = if o.is_value {
                o.kelly_fraction
                    .map_or(" 💰".to_string(), |k| format!(" 💰 kelly {:.1}%", k * 100.0))
            } else {
                String::new()
            };
            println!("   {:<10} {:>5.1}%{}{}", o.label, o.probability * 100.0, odds, value);
        }
    }

    if let Some(pick) = &forecast.safest_pick {
        println!(
            "\n✅ Safest pick: {} ({}) at {:.1}%",
            pick.label,
            pick.market,
            pick.probability * 100.0
        );
    }
    if forecast.results.iter().any(|r| r.low_confidence) {
        println!("⚠️  Limited history for at least one side; treat with caution.");
    }
}

pub async fn query_teams(config: &AppConfig, from_db: bool, filter: Option<&str>) -> Result<()> {
    let store = load_store(config, from_db).await?;
    let needle = filter.map(str::to_lowercase);
    let teams: Vec<&str> = store
        .teams()
        .into_iter()
        .filter(|t| needle.as_ref().map_or(true, |n| t.to_lowercase().contains(n.as_str())))
        .collect();

    if teams.is_empty() {
        println!("❌ No teams found matching '{}'", filter.unwrap_or_default());
        return Ok(());
    }

    if teams.len() > 1 || filter.is_none() {
        println!("📋 {} teams:\n", teams.len());
        for team in &teams {
            println!("   • {}", team);
        }
        return Ok(());
    }

    let team = teams[0];
    let tomorrow = Utc::now().date_naive() + Days::new(1);
    let snapshot = FeatureBuilder::new(&store).build(team, tomorrow, Venue::Any);
    println!("📊 {}", team);
    println!("   Form: {} ({} pts from {} games)", snapshot.form, snapshot.points, snapshot.form_matches);
    println!(
        "   Averages: {:.2} scored | {:.2} conceded | BTTS {:.0}%",
        snapshot.goals_scored_avg,
        snapshot.goals_conceded_avg,
        snapshot.btts_rate * 100.0
    );

    println!("\n📅 Recent Matches:");
    for m in store.matches_before(team, tomorrow, Venue::Any).take(5) {
        let (venue, opponent) = if m.home_team == team {
            ("vs", &m.away_team)
        } else {
            ("at", &m.home_team)
        };
        println!(
            "   {} {} {} ({}-{}) {}",
            m.date.format("%Y-%m-%d"),
            venue,
            opponent,
            m.home_goals,
            m.away_goals,
            m.result_for(team).unwrap_or('?')
        );
    }
    Ok(())
}

pub async fn import_matches(config: &AppConfig, path: &Path, league: Option<String>) -> Result<()> {
    let options = LoadOptions {
        default_league: league,
        ..config.load_options()
    };
    let (store, report) = MatchStore::load(MatchSource::from_path(path), &options)
        .with_context(|| format!("failed to read {}", path.display()))?;
    println!("📥 {}", report.summary());

    let pool = db::init_database(&config.database_url).await?;
    let inserted = db::insert_matches(&pool, store.records()).await?;
    println!("✅ Imported {} new matches into {}", inserted, config.database_url);
    Ok(())
}

pub async fn seed_demo(
    config: &AppConfig,
    seasons: usize,
    first_season: i32,
    seed_value: u64,
    csv: Option<PathBuf>,
) -> Result<()> {
    if let Some(path) = csv {
        let matches = seed::generate_seasons(&seed::DEMO_TEAMS, seasons, first_season, seed::DEMO_LEAGUE, seed_value)?;
        seed::write_csv(&path, &matches)?;
        println!("✅ Wrote {} demo matches to {}", matches.len(), path.display());
        return Ok(());
    }

    let pool = db::init_database(&config.database_url).await?;
    let inserted = seed::seed_data(&pool, seasons, first_season, seed_value).await?;
    if inserted == 0 {
        println!("📭 Database already has matches; nothing seeded.");
    } else {
        println!("✅ Seeded {} demo matches into {}", inserted, config.database_url);
    }
    Ok(())
}

pub async fn init_db(config: &AppConfig) -> Result<()> {
    db::init_database(&config.database_url).await?;
    println!("✅ Database ready at {}", config.database_url);
    Ok(())
}

pub async fn serve(config: AppConfig, from_db: bool, params: TrainingParams) -> Result<()> {
    let store = Arc::new(load_store(&config, from_db).await?);
    let registry = match load_model_set(&config.model_dir) {
        Ok(models) => ModelRegistry::with_models(models),
        Err(e) => {
            tracing::warn!("Starting without models ({}); POST /train to build them", e);
            ModelRegistry::new()
        }
    };
    let engine = PredictionEngine::new(store, Arc::new(registry)).with_extra_teams(config.extra_teams.iter().cloned());
    api::serve(AppState::new(engine, config, params)).await
}

/// `--date` value, defaulting to today
pub fn as_of_or_today(date: Option<NaiveDate>) -> NaiveDate {
    date.unwrap_or_else(|| Utc::now().date_naive())
}
