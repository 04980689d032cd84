use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use libra::config::Config;
use libra::player::mpd::Mpd;
use libra::target::{lastfm_auth, Service};
use libra::text_cleanup::TextCleaner;
use libra::Driver;

#[derive(Parser)]
#[command(name = "libra", version, about)]
struct Cli {
    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Watch the configured players and submit listens (default)
    Run,
    /// Get a Last.fm session key for the config file
    LastfmAuth {
        #[arg(long)]
        api_key: String,
        #[arg(long)]
        api_secret: String,
    },
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {:?}", path))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn run(config_path: Option<PathBuf>) -> Result<()> {
    let config_path = match config_path {
        Some(path) => path,
        None => Config::config_path()?,
    };
    let config = Config::load(&config_path)?;

    let cleaner = Arc::new(TextCleaner::new(&config.cleanup));
    let players: Vec<Mpd> = config
        .mpd
        .iter()
        .filter(|mpd| mpd.enabled)
        .map(|mpd| Mpd::new(mpd, Arc::clone(&cleaner)))
        .collect();
    let targets = Service::from_config(&config)?;

    if targets.is_empty() {
        log::warn!("No scrobbling services enabled, edit {:?} to add one", config_path);
    }
    log::info!(
        "Watching {} player(s), submitting to {} service(s)",
        players.len(),
        targets.len()
    );

    Driver::new(players, targets).run(shutdown_signal()).await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli {
        config,
        log_file,
        command,
    } = Cli::parse();

    init_logging(log_file.as_deref())?;

    match command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::LastfmAuth {
            api_key,
            api_secret,
        } => {
            let session_key = tokio::task::spawn_blocking(move || {
                lastfm_auth::authenticate(&api_key, &api_secret)
            })
            .await??;

            println!("Add this to the [lastfm] section of your config:");
            println!("session_key = \"{}\"", session_key);
            Ok(())
        }
    }
}
