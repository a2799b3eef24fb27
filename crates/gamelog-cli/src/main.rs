use std::fs;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use chrono::{Datelike, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use gamelog::aggregate::AggregateResult;
use gamelog::park_factor::HttpParkFactorClient;
use gamelog::pipeline::GameLogReader;
use gamelog::retry::{Pacing, RetryPolicy};
use gamelog::scraper::GameLogSource;
use gamelog::types::SplitType;
use gamelog::upsert::HttpSplitLogApi;
use gamelog::{Pipeline, PlayerRequest, UpsertClient, WebScraper};
use log::LevelFilter;
use serde::Serialize;

#[derive(Parser)]
#[command(name = "gamelog")]
#[command(about = "Publishes batting game-log splits to a split-log API", long_about = None)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        global = true,
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Args)]
struct SourceArgs {
    #[arg(
        long,
        env = "GAMELOG_SOURCE_URL",
        help = "Base URL of the game-log site (defaults to baseball-reference.com)"
    )]
    source_url: Option<String>,

    #[arg(long, help = "Season to fetch (defaults to the current year)")]
    year: Option<i32>,

    #[arg(
        long,
        env = "GAMELOG_TIMEOUT_SECS",
        default_value_t = 30,
        help = "Per-request timeout in seconds"
    )]
    timeout_secs: u64,

    #[arg(
        long,
        env = "GAMELOG_MAX_ATTEMPTS",
        default_value_t = 3,
        value_parser = clap::value_parser!(u32).range(1..),
        help = "Attempts per request before giving up"
    )]
    max_attempts: u32,

    #[arg(
        long,
        env = "GAMELOG_BACKOFF_MS",
        default_value_t = 1000,
        help = "Backoff after the first failed attempt, grows linearly"
    )]
    backoff_ms: u64,
}

impl SourceArgs {
    fn year(&self) -> i32 {
        self.year.unwrap_or_else(|| Utc::now().year())
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.backoff_ms))
    }

    fn scraper(&self) -> WebScraper {
        let scraper = WebScraper::new(self.timeout(), self.retry()).unwrap_or_else(|e| {
            log::error!("Error creating scraper: {}", e);
            process::exit(1);
        });
        match &self.source_url {
            Some(url) => scraper.with_base_url(url),
            None => scraper,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch game logs and publish every split for each player
    Run {
        #[arg(long = "player", help = "Player id, e.g. judgeaa01 (repeatable)")]
        players: Vec<String>,

        #[arg(long, help = "File with one player id per line ('#' starts a comment)")]
        players_file: Option<PathBuf>,

        #[arg(long, help = "Team code recorded on the season split")]
        team: Option<String>,

        #[arg(long, env = "GAMELOG_API_URL", help = "Base URL of the split-log API")]
        api_url: String,

        #[arg(
            long,
            env = "GAMELOG_NORMALIZE_URL",
            help = "Park-factor normalization endpoint"
        )]
        normalize_url: String,

        #[arg(
            long,
            env = "GAMELOG_DELAY_MS",
            default_value_t = 2000,
            help = "Pause between players in milliseconds"
        )]
        delay_ms: u64,

        #[arg(
            long,
            env = "GAMELOG_JITTER_MS",
            default_value_t = 1000,
            help = "Maximum random extra pause between players in milliseconds"
        )]
        jitter_ms: u64,

        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format for the run report"
        )]
        format: OutputFormat,

        #[command(flatten)]
        source: SourceArgs,
    },
    /// Fetch one game log and print its splits without publishing anything
    Show {
        #[arg(long = "player", help = "Player id, e.g. judgeaa01")]
        player: String,

        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,

        #[command(flatten)]
        source: SourceArgs,
    },
}

#[derive(Serialize)]
struct SplitSummary {
    split: SplitType,
    #[serde(flatten)]
    result: AggregateResult,
}

fn serialize_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            log::error!("Error serializing to JSON: {}", e);
            process::exit(1);
        }
    }
}

fn read_players_file(path: &PathBuf) -> Vec<String> {
    let contents = fs::read_to_string(path).unwrap_or_else(|e| {
        log::error!("Error reading {}: {}", path.display(), e);
        process::exit(1);
    });
    contents
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.clone().into())
        .init();

    match cli.command {
        Commands::Run {
            mut players,
            players_file,
            team,
            api_url,
            normalize_url,
            delay_ms,
            jitter_ms,
            format,
            source,
        } => {
            if let Some(path) = &players_file {
                players.extend(read_players_file(path));
            }
            if players.is_empty() {
                log::error!("Invalid args: no players given (use --player or --players-file)");
                process::exit(1);
            }

            let year = source.year();
            let requests: Vec<PlayerRequest> = players
                .iter()
                .map(|id| PlayerRequest {
                    team: team.clone(),
                    ..PlayerRequest::new(id, year)
                })
                .collect();

            let park = HttpParkFactorClient::new(&normalize_url, source.timeout(), source.retry())
                .unwrap_or_else(|e| {
                    log::error!("Error creating normalization client: {}", e);
                    process::exit(1);
                });
            let api = HttpSplitLogApi::new(&api_url, source.timeout()).unwrap_or_else(|e| {
                log::error!("Error creating split-log client: {}", e);
                process::exit(1);
            });
            let pacing = Pacing {
                fixed: Duration::from_millis(delay_ms),
                jitter: Duration::from_millis(jitter_ms),
            };

            log::info!("Publishing {} splits for {} player(s)...", year, requests.len());

            let pipeline = Pipeline::new(park, UpsertClient::new(api, source.retry()));
            let report = pipeline.run(&source.scraper(), &requests, pacing).await;

            match format {
                OutputFormat::Json => serialize_json(&report),
                OutputFormat::Text => print!("{}", report),
            }

            if report.has_failures() {
                process::exit(1);
            }
        }
        Commands::Show {
            player,
            format,
            source,
        } => {
            let html = source
                .scraper()
                .fetch_game_log(&player, source.year())
                .await
                .unwrap_or_else(|e| {
                    log::error!("Error fetching game log: {}", e);
                    process::exit(1);
                });

            let windows = GameLogReader::default().windows(&html).unwrap_or_else(|e| {
                log::error!("Error reading game log: {}", e);
                process::exit(1);
            });

            match format {
                OutputFormat::Json => {
                    let summaries: Vec<SplitSummary> = windows
                        .iter()
                        .map(|w| SplitSummary {
                            split: w.split(),
                            result: w.aggregate(),
                        })
                        .collect();
                    serialize_json(&summaries);
                }
                OutputFormat::Text => {
                    if windows.iter().all(|w| w.is_empty()) {
                        println!("No games to display.");
                    }
                    for window in windows.iter().filter(|w| !w.is_empty()) {
                        let dates: Vec<&str> =
                            window.games().iter().map(|g| g.date_text.as_str()).collect();
                        println!("{} ({})", window.split(), dates.join(", "));
                        println!("{}", window.aggregate());
                        println!();
                    }
                }
            }
        }
    }
}
