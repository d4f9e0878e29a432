//! Donzelas CLI - account and session management for the Donzelas core.

mod commands;

use clap::{Parser, Subcommand};
use donzelas_config::{init_logging, Config, Paths};
use std::path::PathBuf;

/// Donzelas CLI - sign in, sign up, and inspect the stored session.
#[derive(Parser)]
#[command(name = "donzelas")]
#[command(about = "Donzelas CLI for account and session management")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    /// Base directory for config and session files (default: ~/.donzelas)
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Login with email and password
    Login {
        /// Account email (prompted for when omitted)
        #[arg(short, long)]
        email: Option<String>,
    },

    /// Create a new account
    Signup {
        /// Account email (prompted for when omitted)
        #[arg(short, long)]
        email: Option<String>,

        /// Contact phone stored on the new profile
        #[arg(short, long)]
        phone: Option<String>,
    },

    /// Logout and clear the stored session
    Logout,

    /// Check authentication status
    Status,

    /// Show the signed-in user and profile
    Whoami,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;

    let config = Config::load(&paths)?;
    config.require_credentials()?;

    match cli.command {
        Commands::Login { email } => commands::login(&config, &paths, email.as_deref()).await,
        Commands::Signup { email, phone } => {
            commands::signup(&config, &paths, email.as_deref(), phone.as_deref()).await
        }
        Commands::Logout => commands::logout(&config, &paths).await,
        Commands::Status => commands::status(&config, &paths).await,
        Commands::Whoami => commands::whoami(&config, &paths).await,
    }
}
