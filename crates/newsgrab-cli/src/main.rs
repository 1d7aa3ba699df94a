use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newsgrab_core::{AppConfig, SourceMode};

mod commands;

#[derive(Parser)]
#[command(name = "newsgrab")]
#[command(author, version, about = "Fetch news from recipes and feeds into a deduplicated article store")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to config.toml (default: ~/.config/newsgrab/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch all enabled sources (default)
    Fetch(FetchArgs),
    /// List the source catalog
    Sources,
    /// Show recent fetch runs
    Runs {
        /// Number of runs to show
        #[arg(short, long, default_value_t = 20)]
        limit: u32,

        /// Only show runs for this source id
        #[arg(short, long)]
        source: Option<String>,
    },
    /// List recently stored articles
    Articles {
        /// Number of articles to show
        #[arg(short, long, default_value_t = 20)]
        limit: u32,

        /// Only show articles from this source id
        #[arg(short, long)]
        source: Option<String>,
    },
}

#[derive(clap::Args, Default)]
pub struct FetchArgs {
    /// Override every source's mode: recipe, rss or auto
    #[arg(short, long)]
    pub mode: Option<SourceMode>,

    /// Seconds between cycle starts; omit or 0 to run once
    #[arg(short, long)]
    pub interval: Option<u64>,

    /// Comma-separated source ids to fetch
    #[arg(short, long, value_delimiter = ',')]
    pub source: Vec<String>,

    /// Maximum articles per source per provider attempt
    #[arg(long)]
    pub max_articles: Option<usize>,
}

fn init_logging(verbose: bool, config_level: &str) {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if verbose {
            "debug".to_string()
        } else {
            config_level.to_string()
        }
    });

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };

    init_logging(cli.verbose, &config.general.log_level);

    match cli.command {
        Some(Commands::Fetch(args)) => commands::fetch::run(config, args).await,
        None => commands::fetch::run(config, FetchArgs::default()).await,
        Some(Commands::Sources) => commands::sources::run(&config).await.map(|_| ExitCode::SUCCESS),
        Some(Commands::Runs { limit, source }) => {
            commands::runs::run(&config, limit, source.as_deref())
                .await
                .map(|_| ExitCode::SUCCESS)
        }
        Some(Commands::Articles { limit, source }) => {
            commands::articles::run(&config, limit, source.as_deref())
                .await
                .map(|_| ExitCode::SUCCESS)
        }
    }
}
