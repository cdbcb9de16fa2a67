mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tabfocus_core::Config;

#[derive(Parser)]
#[command(name = "tabfocus")]
#[command(about = "Focus mode and work/break timer host for the TabFocus extension", long_about = None)]
struct Cli {
    /// Config file (defaults to <data dir>/tabfocus/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the host (started by the browser over native messaging)
    Host {
        /// Use an in-memory browser and only serve the control socket
        #[arg(long)]
        headless: bool,
    },
    /// Show focus mode and timer state
    Status,
    /// Focus mode control
    Focus {
        #[command(subcommand)]
        action: FocusAction,
    },
    /// Work/break timer control
    Timer {
        #[command(subcommand)]
        action: TimerAction,
    },
    /// Manage blocked sites
    Blacklist {
        #[command(subcommand)]
        action: BlacklistAction,
    },
    /// Turn automatic work/break chaining on or off
    AutoContinue {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Show or set the message displayed on the warning page
    WarningMessage {
        /// New message; omit to show the current one
        text: Option<String>,
        /// Remove the custom message
        #[arg(long, conflicts_with = "text")]
        clear: bool,
    },
    /// Print the native-messaging host manifest
    Manifest {
        /// ID of the installed extension
        #[arg(long)]
        extension_id: String,
        /// Host binary path (defaults to this executable)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum FocusAction {
    Start,
    Stop,
}

#[derive(Subcommand, Debug)]
enum TimerAction {
    /// Start a work session (enters focus mode)
    Work {
        minutes: Option<u32>,
        /// Start a break automatically when it ends
        #[arg(long)]
        auto: bool,
    },
    /// Start a break (leaves focus mode)
    Break {
        minutes: Option<u32>,
        /// Start a work session automatically when it ends
        #[arg(long)]
        auto: bool,
    },
    Stop,
}

#[derive(Subcommand, Debug)]
enum BlacklistAction {
    List,
    Add { site: String },
    Remove { site: String },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Toggle {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let native_host = matches!(cli.command, Commands::Host { headless: false });
    if native_host {
        commands::host::setup_host_logging()?;
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp_secs()
            .target(env_logger::Target::Stderr)
            .init();
    }

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Host { headless } => commands::host::run_host(config, headless).await,
        Commands::Manifest { extension_id, path } => {
            commands::manifest::print_manifest(&extension_id, path)
        }
        command => commands::control::run(&config, command).await,
    }
}
