use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use glitch::cli;
use glitch::config::AppConfig;
use glitch::models::{Fixture, VenueContext};
use glitch::services::{ForestParams, TrainingParams};

#[derive(Parser)]
#[command(name = "glitch")]
#[command(about = "Football match prediction with rolling form and random forests")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Where match history comes from
#[derive(Args, Clone, Copy)]
struct SourceArgs {
    /// Read matches from the SQLite database instead of the CSV path
    #[arg(long)]
    from_db: bool,
}

#[derive(Args, Clone, Copy)]
struct TrainArgs {
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Matches per rolling window
    #[arg(long, default_value_t = 5)]
    window: usize,
    /// Fraction of rows (by date) used for training
    #[arg(long, default_value_t = 0.8)]
    split_ratio: f64,
    #[arg(long, default_value_t = 200)]
    n_trees: usize,
    #[arg(long, default_value_t = 10)]
    max_depth: usize,
    /// Skip fixtures where either side has fewer prior matches
    #[arg(long, default_value_t = 0)]
    min_history: usize,
}

impl TrainArgs {
    fn params(&self) -> TrainingParams {
        let forest = ForestParams {
            n_trees: self.n_trees,
            max_depth: self.max_depth,
            ..ForestParams::default()
        };
        TrainingParams {
            window: self.window,
            split_ratio: self.split_ratio,
            seed: self.seed,
            min_history: self.min_history,
            ..TrainingParams::default()
        }
        .with_forest(forest)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        train: TrainArgs,
    },
    /// Train all three market models and save them
    Train {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        train: TrainArgs,
    },
    /// Predict a fixture
    Predict {
        home: String,
        away: String,
        /// Cut-off date for form (defaults to today)
        #[arg(short, long)]
        date: Option<NaiveDate>,
        /// Neutral ground: no home/away split
        #[arg(long)]
        neutral: bool,
        /// Decimal odds, e.g. "home=2.1,draw=3.4,away=3.6,over=1.9"
        #[arg(short, long)]
        odds: Option<String>,
        #[command(flatten)]
        source: SourceArgs,
    },
    /// List teams, or show form for one
    Teams {
        #[arg(short, long)]
        name: Option<String>,
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Import a CSV file or directory into the database
    Import {
        path: PathBuf,
        /// League tag for rows that carry none
        #[arg(short, long)]
        league: Option<String>,
    },
    /// Generate demo seasons into the database, or a CSV file with --csv
    Seed {
        #[arg(long, default_value_t = 3)]
        seasons: usize,
        #[arg(long, default_value_t = 2021)]
        first_season: i32,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Initialize the database
    InitDb,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = AppConfig::from_env()?;
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { port, source, train }) => {
            if let Some(port) = port {
                config.port = port;
            }
            tracing::info!("Starting Glitch API server on port {}", config.port);
            cli::serve(config, source.from_db, train.params()).await?;
        }
        Some(Commands::Train { source, train }) => {
            tracing::info!("Training models...");
            cli::train_models(&config, source.from_db, train.params()).await?;
        }
        Some(Commands::Predict {
            home,
            away,
            date,
            neutral,
            odds,
            source,
        }) => {
            let fixture = Fixture {
                home_team: home,
                away_team: away,
                as_of_date: cli::as_of_or_today(date),
                venue_context: if neutral {
                    VenueContext::Neutral
                } else {
                    VenueContext::HomeAdvantage
                },
            };
            let odds = cli::parse_odds_arg(odds.as_deref().unwrap_or_default())?;
            cli::predict_fixture(&config, source.from_db, fixture, odds).await?;
        }
        Some(Commands::Teams { name, source }) => {
            cli::query_teams(&config, source.from_db, name.as_deref()).await?;
        }
        Some(Commands::Import { path, league }) => {
            tracing::info!("Importing matches from {}", path.display());
            cli::import_matches(&config, &path, league).await?;
        }
        Some(Commands::Seed {
            seasons,
            first_season,
            seed,
            csv,
        }) => {
            cli::seed_demo(&config, seasons, first_season, seed, csv).await?;
        }
        Some(Commands::InitDb) => {
            tracing::info!("Initializing database...");
            cli::init_db(&config).await?;
        }
        None => {
            tracing::info!("Starting Glitch API server on port {}", config.port);
            cli::serve(config, false, TrainingParams::default()).await?;
        }
    }

    Ok(())
}
