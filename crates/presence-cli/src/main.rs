mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, user::UserSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "presence",
    about = "Presence engine: work sessions, decay sweep, and SLA pings",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to the presence database
    #[arg(long, global = true, env = "PRESENCE_DB", default_value = "presence.db")]
    db: PathBuf,

    /// Path to the YAML tunables file (missing file = defaults)
    #[arg(long, global = true, env = "PRESENCE_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP/SSE server
    Serve {
        /// Port to listen on (0 = OS-assigned)
        #[arg(long, env = "PRESENCE_PORT", default_value = "3141")]
        port: u16,

        /// Bearer secret for POST /api/cron/availability
        #[arg(long, env = "PRESENCE_CRON_SECRET", hide_env_values = true)]
        cron_secret: Option<String>,

        /// Run the decay sweep in-process every N seconds (0 = disabled)
        #[arg(long, env = "PRESENCE_SWEEP_INTERVAL", default_value = "0")]
        sweep_interval_secs: u64,
    },

    /// Run one decay sweep against the database and exit
    Sweep {
        /// Sweep as of this RFC 3339 instant instead of now
        #[arg(long)]
        at: Option<String>,
    },

    /// Manage users known to the presence engine
    User {
        #[command(subcommand)]
        subcommand: UserSubcommand,
    },

    /// Show a user's effective presence
    State {
        user_id: String,

        /// Evaluate at this RFC 3339 instant instead of now
        #[arg(long)]
        at: Option<String>,
    },

    /// Inspect and validate the tunables
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let store = cmd::Store {
        db: cli.db,
        config: cli.config,
    };

    let result = match cli.command {
        Commands::Serve {
            port,
            cron_secret,
            sweep_interval_secs,
        } => cmd::serve::run(&store, port, cron_secret, sweep_interval_secs),
        Commands::Sweep { at } => cmd::sweep::run(&store, at.as_deref(), cli.json),
        Commands::User { subcommand } => cmd::user::run(&store, subcommand, cli.json),
        Commands::State { user_id, at } => {
            cmd::state::run(&store, &user_id, at.as_deref(), cli.json)
        }
        Commands::Config { subcommand } => cmd::config::run(&store, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
