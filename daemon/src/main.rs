//! invitewatch - follow a game client's log and auto-invite the players you meet.
//!
//! Single binary. Tails the newest log file, tracks which world you are in,
//! and sends group invites through a paced queue.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod cli;
mod config;
mod error;
mod queue;
mod storage;
mod watcher;

pub use error::Error;

#[derive(Parser)]
#[command(name = "invitewatch")]
#[command(about = "Follow the client log and invite players who join your instance")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the log and invite players as they join
    Watch {
        /// Classify outcomes without calling the API
        #[arg(long)]
        dry_run: bool,

        /// Log directory (overrides config)
        #[arg(long)]
        log_dir: Option<PathBuf>,

        /// Your display name, used to detect world changes
        #[arg(long)]
        local_actor: Option<String>,
    },

    /// Show config, log file and history status
    Status,

    /// Inspect or change settings
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },

    /// Print the events found in a log file
    Parse {
        file: PathBuf,

        /// Your display name, used to detect world changes
        #[arg(long)]
        local_actor: Option<String>,

        /// One JSON object per line
        #[arg(long)]
        json: bool,
    },

    /// Show recent invite outcomes
    History {
        #[arg(long, short, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective config (auth cookie masked)
    Show,
    /// Print the config file location
    Path,
    /// Print one setting
    Get { key: String },
    /// Change one setting, e.g. `rate_limit.batch_count 10`
    Set { key: String, value: String },
}

fn main() -> Result<(), Error> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("invitewatch=info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
        Some(Commands::Watch {
            dry_run,
            log_dir,
            local_actor,
        }) => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(cli::watch::run(cli::watch::WatchArgs {
                dry_run,
                log_dir,
                local_actor,
            }))?;
        }
        Some(Commands::Status) => {
            let exit_code = cli::status::run()?;
            if exit_code != 0 {
                std::process::exit(exit_code);
            }
        }
        Some(Commands::Config { cmd }) => match cmd {
            ConfigCommands::Show => cli::config::show()?,
            ConfigCommands::Path => cli::config::path()?,
            ConfigCommands::Get { key } => cli::config::get(&key)?,
            ConfigCommands::Set { key, value } => cli::config::set(&key, &value)?,
        },
        Some(Commands::Parse {
            file,
            local_actor,
            json,
        }) => {
            cli::parse::run(&file, local_actor, json)?;
        }
        Some(Commands::History { limit }) => {
            cli::history::run(limit)?;
        }
    }

    Ok(())
}
