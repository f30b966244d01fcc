mod commands;
mod render;
mod utils;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use urus_core::{Session, UrusConfig};

#[derive(Parser)]
#[command(name = "urus")]
#[command(about = "Routines and priorities on your machine, synced to the cloud and your calendar")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show account, sync state and what's stored
    Status,
    /// Sign in to the cloud account
    Login {
        email: String,
        /// Cloud backend URL, saved to the config for later runs
        #[arg(long)]
        api_url: Option<String>,
    },
    /// Sign out and continue as guest
    Logout,
    /// Push queued offline changes and reload everything
    Refresh,
    Routine {
        #[command(subcommand)]
        action: RoutineAction,
    },
    Priority {
        #[command(subcommand)]
        action: PriorityAction,
    },
    Calendar {
        #[command(subcommand)]
        action: CalendarAction,
    },
    /// Write a JSON backup (defaults to urus-diri-backup-<date>.json)
    Export { path: Option<PathBuf> },
    /// Restore a JSON backup
    Import { path: PathBuf },
}

#[derive(Subcommand)]
pub enum RoutineAction {
    List,
    Add {
        /// Start time (HH:MM)
        start: String,
        /// End time (HH:MM)
        end: String,
        activity: String,
        #[arg(short, long, default_value = "General")]
        category: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Toggle a routine done / not done
    Done {
        id: String,
        #[arg(short, long)]
        note: Option<String>,
    },
    Remove { id: String },
}

#[derive(Subcommand)]
pub enum PriorityAction {
    List,
    Add {
        text: String,
        /// Only for this day (YYYY-MM-DD). Without it the priority shows every day.
        #[arg(long)]
        on: Option<String>,
    },
    /// Toggle a priority done / not done
    Done {
        id: String,
        #[arg(short, long)]
        note: Option<String>,
    },
    Remove { id: String },
}

#[derive(Subcommand)]
pub enum CalendarAction {
    /// Push today's routines and priorities into the calendar
    Sync,
    /// Remove the events written for today
    Clear,
    /// List the calendars the provider offers
    List,
    /// Choose the calendar to sync into
    Select { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let mut config = UrusConfig::load()?;
    if let Commands::Login {
        api_url: Some(url), ..
    } = &cli.command
    {
        config.cloud.api_url = Some(url.clone());
        config.save(&UrusConfig::config_path()?)?;
    }

    let session = Session::open(config)?;
    let status = session.initialize().await;
    if let Some(error) = &status.error {
        log::warn!("Loading data failed: {}", error);
    }

    match cli.command {
        Commands::Status => commands::status::run(&session).await,
        Commands::Login { email, .. } => commands::auth::login(&session, &email).await,
        Commands::Logout => commands::auth::logout(&session).await,
        Commands::Refresh => commands::refresh::run(&session).await,
        Commands::Routine { action } => commands::routine::run(&session, action).await,
        Commands::Priority { action } => commands::priority::run(&session, action).await,
        Commands::Calendar { action } => commands::calendar::run(&session, action).await,
        Commands::Export { path } => commands::backup::export(&session, path).await,
        Commands::Import { path } => commands::backup::import(&session, &path).await,
    }
}
