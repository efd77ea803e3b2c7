mod commands;
mod config;
mod notify;
mod remote;
mod server;
mod session;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    cmd_clear, cmd_log, cmd_login, cmd_logout, cmd_profile_avg_window, cmd_profile_daily_change,
    cmd_profile_goal_weight, cmd_profile_lock, cmd_profile_show, cmd_profile_start_date,
    cmd_profile_start_weight, cmd_profile_units, cmd_profile_week_start,
    cmd_profile_weekly_change, cmd_pull, cmd_push, cmd_status, cmd_week_add, cmd_week_lock,
    cmd_week_show, cmd_weeks,
};
use crate::config::Config;
use crate::notify::StderrNotifier;
use crate::remote::HttpRemoteStore;
use crate::session::SessionAuth;
use tdee_core::db::Database;
use tdee_core::identity::{IdentityResolver, StorageKeys};
use tdee_core::storage::LocalStore;
use tdee_core::store::CalcStore;
use tdee_core::sync::{SyncConfig, SyncCoordinator};

#[derive(Parser)]
#[command(
    name = "tdee",
    version,
    about = "Weekly TDEE tracker with local-first sync",
    long_about = "Log daily weight and calories week by week. tdee estimates your real \
                  energy expenditure from the trend and tells you how much to eat to hit \
                  your goal. Data is saved on this device and, when signed in, synced to a \
                  `tdee serve` instance."
)]
struct Cli {
    /// Hide sync success notices
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show current TDEE, recommended intake and progress
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show per-week averages and TDEE
    Weeks {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Log weight and/or calories for a day
    Log {
        /// Week number (1 = first tracked week)
        week: u32,
        /// Day: 1-7 or a weekday name (mon, tue, ...)
        day: String,
        /// Body weight in the current unit
        #[arg(short, long, visible_alias = "kg")]
        weight: Option<f64>,
        /// Calories eaten
        #[arg(short, long)]
        kcal: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear weight and/or calories for a day (both when no flag is given)
    Clear {
        /// Week number
        week: u32,
        /// Day: 1-7 or a weekday name
        day: String,
        /// Clear the weight only
        #[arg(long)]
        weight: bool,
        /// Clear the calories only
        #[arg(long)]
        kcal: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add, lock or inspect weeks
    Week {
        #[command(subcommand)]
        command: WeekCommands,
    },
    /// Show or change start/goal weight, pace and preferences
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Sign in; syncs this user's data with the remote server
    Login {
        /// User id
        uid: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sign out and switch to the guest session
    Logout {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace local data with the remote copy
    Pull {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Upload local data to the remote server now
    Push {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the document sync server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
enum WeekCommands {
    /// Append the next week
    Add {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Lock or unlock a week
    Lock {
        /// Week number
        week: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the days of one week
    Show {
        /// Week number
        week: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Show the profile
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set the start weight
    StartWeight {
        weight: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set the goal weight
    GoalWeight {
        weight: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set the target weekly change (daily calories follow)
    WeeklyChange {
        #[arg(allow_negative_numbers = true)]
        change: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set the target daily calorie change (weekly change follows)
    DailyChange {
        #[arg(allow_negative_numbers = true)]
        kcal: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Switch units: kg or lb (toggles when omitted)
    Units {
        unit: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set the start date (YYYY-MM-DD, today, or none to clear)
    StartDate {
        date: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Number of recent weeks averaged into the current TDEE
    AvgWindow {
        weeks: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// First day of the calendar week: monday or sunday
    WeekStart {
        day: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Lock start weight and start date for good
    Lock {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TDEE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn new_key_notice(key: &str) -> String {
    format!(
        "Generated API key: {key}\nInclude in requests: Authorization: Bearer {key}\n\
         Clients on this machine pick it up automatically. Elsewhere, set TDEE_API_KEY."
    )
}

async fn serve(config: &Config, port: u16, bind: &str, no_auth: bool) -> Result<()> {
    let db = Database::open(&config.server_db_path)?;
    let api_key = if no_auth {
        None
    } else {
        let (key, new) = config.load_or_create_api_key()?;
        if new {
            eprintln!("{}", new_key_notice(&key));
        }
        Some(key)
    };
    server::start_server(db, port, bind, api_key).await
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    match cli.command {
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => serve(&config, port, &bind, no_auth).await,
        command => run_tracker(&config, cli.quiet, command).await,
    }
}

#[allow(clippy::too_many_lines)]
async fn run_tracker(config: &Config, quiet: bool, command: Commands) -> Result<()> {
    let session = Arc::new(SessionAuth::new(config.session_path.clone()));
    let identity = IdentityResolver::new(session.clone(), StorageKeys::default());
    let local = Arc::new(LocalStore::new(Database::open(&config.db_path)?, identity));
    let remote = Arc::new(HttpRemoteStore::new(
        &config.remote_url,
        config.remote_api_key.clone(),
    )?);
    let notifier = Arc::new(StderrNotifier { quiet });
    let sync = SyncCoordinator::new(local, remote, notifier, SyncConfig::from_env());
    let store = CalcStore::open(sync);

    match command {
        Commands::Status { json } => cmd_status(&store, json),
        Commands::Weeks { json } => cmd_weeks(&store, json),
        Commands::Log {
            week,
            day,
            weight,
            kcal,
            json,
        } => cmd_log(&store, week, &day, weight, kcal, json).await,
        Commands::Clear {
            week,
            day,
            weight,
            kcal,
            json,
        } => cmd_clear(&store, week, &day, weight, kcal, json).await,
        Commands::Week { command } => match command {
            WeekCommands::Add { json } => cmd_week_add(&store, json).await,
            WeekCommands::Lock { week, json } => cmd_week_lock(&store, week, json).await,
            WeekCommands::Show { week, json } => cmd_week_show(&store, week, json),
        },
        Commands::Profile { command } => match command {
            ProfileCommands::Show { json } => cmd_profile_show(&store, json),
            ProfileCommands::StartWeight { weight, json } => {
                cmd_profile_start_weight(&store, weight, json).await
            }
            ProfileCommands::GoalWeight { weight, json } => {
                cmd_profile_goal_weight(&store, weight, json).await
            }
            ProfileCommands::WeeklyChange { change, json } => {
                cmd_profile_weekly_change(&store, change, json).await
            }
            ProfileCommands::DailyChange { kcal, json } => {
                cmd_profile_daily_change(&store, kcal, json).await
            }
            ProfileCommands::Units { unit, json } => {
                cmd_profile_units(&store, unit.as_deref(), json).await
            }
            ProfileCommands::StartDate { date, json } => {
                cmd_profile_start_date(&store, &date, json).await
            }
            ProfileCommands::AvgWindow { weeks, json } => {
                cmd_profile_avg_window(&store, weeks, json).await
            }
            ProfileCommands::WeekStart { day, json } => {
                cmd_profile_week_start(&store, &day, json).await
            }
            ProfileCommands::Lock { json } => cmd_profile_lock(&store, json).await,
        },
        Commands::Login { uid, json } => cmd_login(&session, &store, &uid, json).await,
        Commands::Logout { json } => cmd_logout(&session, &store, json).await,
        Commands::Pull { json } => cmd_pull(&store, json).await,
        Commands::Push { json } => cmd_push(&store, json).await,
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => serve(config, port, &bind, no_auth).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_key_notice_shows_key_once_per_line() {
        let notice = new_key_notice("abc123");
        let lines: Vec<&str> = notice.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Generated API key: abc123");
        assert_eq!(lines[1], "Include in requests: Authorization: Bearer abc123");
        assert!(!lines[2].contains("abc123"));
    }
}
