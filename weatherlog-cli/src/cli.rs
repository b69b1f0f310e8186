use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use inquire::Text;
use std::path::{Path, PathBuf};

use weatherlog_core::{
    Config, Ingestor, ObservationStore, OpenWeatherClient, RunReport, SqliteStore,
    WeatherObservation,
    report::{self, DailyComparison, DailySummary},
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weatherlog", version, about = "Collect and store city weather observations")]
pub struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log debug output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch and store the current weather for each city.
    Run {
        /// Cities to ingest, in order; defaults to the configured list.
        cities: Vec<String>,
    },

    /// Show stored observations, for one city or for all of them.
    History {
        city: Option<String>,

        /// Show per-day temperature statistics instead of every row.
        #[arg(long, requires = "city")]
        daily: bool,
    },

    /// Compare daily mean temperatures of several cities.
    Compare {
        #[arg(required = true)]
        cities: Vec<String>,
    },

    /// Set the API key, city list and database location.
    Configure,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config_path = match self.config {
            Some(path) => path,
            None => Config::config_file_path()?,
        };
        let config = Config::load_from(&config_path)?;

        match self.command {
            Command::Run { cities } => run_ingestion(config, cities).await,
            Command::History { city, daily } => show_history(&config, city.as_deref(), daily),
            Command::Compare { cities } => show_comparison(&config, &cities),
            Command::Configure => configure(config, &config_path),
        }
    }
}

async fn run_ingestion(mut config: Config, cities: Vec<String>) -> Result<()> {
    if !cities.is_empty() {
        config.cities = cities;
    }
    config.validate()?;

    let client =
        OpenWeatherClient::new(&config.api).context("Failed to build weather API client")?;

    let mut store = SqliteStore::open(&config.database.path)?;
    store
        .ensure_schema()
        .context("Failed to create the weather table")?;

    log::info!(
        "ingesting {} cities into {}",
        config.cities.len(),
        store.path().display()
    );

    let report = Ingestor::new(client, store).run(&config.cities).await;
    print!("{}", format_report(&report));

    Ok(())
}

/// Opens the database for reading only; `None` when it has not been created yet.
fn open_for_reading(config: &Config) -> Result<Option<SqliteStore>> {
    let path = &config.database.path;
    if !path.exists() {
        log::debug!("database {} does not exist yet", path.display());
        return Ok(None);
    }
    Ok(Some(SqliteStore::open_read_only(path)?))
}

fn show_history(config: &Config, city: Option<&str>, daily: bool) -> Result<()> {
    let rows = match open_for_reading(config)? {
        Some(store) => match city {
            Some(city) => report::history(&store, city)?,
            None => report::all_rows(&store)?,
        },
        None => Vec::new(),
    };

    if rows.is_empty() {
        match city {
            Some(city) => println!("No observations stored for {city}."),
            None => println!("No observations stored."),
        }
        return Ok(());
    }

    if daily {
        for day in report::daily_summaries(&rows) {
            println!("{}", format_daily(&day));
        }
    } else {
        for row in &rows {
            match city {
                Some(_) => println!("{}", format_observation(row)),
                None => println!("{:<12} {}", row.city, format_observation(row)),
            }
        }
    }

    Ok(())
}

fn show_comparison(config: &Config, cities: &[String]) -> Result<()> {
    let rows = match open_for_reading(config)? {
        Some(store) => report::all_rows(&store)?,
        None => Vec::new(),
    };

    let table = report::compare_daily(&rows, cities);
    if table.is_empty() {
        println!("No observations stored for {}.", cities.join(", "));
        return Ok(());
    }

    print!("{}", format_comparison(cities, &table));
    Ok(())
}

fn configure(mut config: Config, path: &Path) -> Result<()> {
    let api_key = Text::new("OpenWeather API key:")
        .with_initial_value(&config.api.api_key)
        .prompt()
        .context("Failed to read API key")?;

    let current_cities = config.cities.join(", ");
    let cities = Text::new("Cities (comma-separated, in processing order):")
        .with_initial_value(&current_cities)
        .prompt()
        .context("Failed to read city list")?;

    let current_db = config.database.path.display().to_string();
    let database = Text::new("Database file:")
        .with_initial_value(&current_db)
        .prompt()
        .context("Failed to read database path")?;

    config.api.api_key = api_key.trim().to_string();
    config.cities = parse_city_list(&cities);
    config.database.path = PathBuf::from(database.trim());

    config.validate()?;
    config.save_to(path)?;

    println!("Configuration saved to {}", path.display());
    Ok(())
}

fn parse_city_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

fn format_observation(obs: &WeatherObservation) -> String {
    format!(
        "{}  {:>6.1}°C  {:>3}%  {}",
        obs.captured_at.format("%Y-%m-%d %H:%M:%S"),
        obs.temperature_c,
        obs.humidity,
        obs.description
    )
}

fn format_daily(day: &DailySummary) -> String {
    format!(
        "{}  min {:>5.1}°C  max {:>5.1}°C  mean {:>5.1}°C  ({} readings)",
        day.date, day.min_c, day.max_c, day.mean_c, day.readings
    )
}

fn format_comparison(cities: &[String], table: &[DailyComparison]) -> String {
    let mut out = format!("{:<10}", "date");
    for city in cities {
        out.push_str(&format!("  {city:>12}"));
    }
    out.push('\n');

    for day in table {
        out.push_str(&format!("{:<10}", day.date.to_string()));
        for mean in &day.mean_c {
            match mean {
                Some(t) => out.push_str(&format!("  {t:>10.1}°C")),
                None => out.push_str(&format!("  {:>12}", "-")),
            }
        }
        out.push('\n');
    }
    out
}

fn format_report(report: &RunReport) -> String {
    let mut out = format!(
        "Stored {} of {} cities",
        report.stored.len(),
        report.attempted()
    );
    if report.reconnects > 0 {
        out.push_str(&format!(" ({} reconnect(s))", report.reconnects));
    }
    out.push('\n');

    for failure in &report.failures {
        out.push_str(&format!(
            "  failed: {} ({}, while {})\n",
            failure.city,
            failure.kind(),
            failure.stage
        ));
    }
    out
}
