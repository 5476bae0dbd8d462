use anyhow::Result;
use cairn::cli;
use cairn::config::CairnConfig;
use cairn::server;
use cairn::users::UserUpsert;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cairn", version, about = "Recovery-support conversational backend")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP API server
    Serve,
    /// Index the literature directory into the store
    Ingest {
        /// Source directory (defaults to the configured literature dir)
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Re-chunk and re-embed documents even when unchanged
        #[arg(long)]
        overwrite: bool,
    },
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create or update a user
    Add {
        /// Name the caller goes by
        #[arg(long)]
        name: String,
        /// Preferred display name, when different
        #[arg(long)]
        display_name: Option<String>,
        /// Contact number
        #[arg(long)]
        number: Option<String>,
        /// External id code
        #[arg(long)]
        id_code: Option<String>,
        /// Spoken passphrase for identity verification
        #[arg(long)]
        passphrase: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let config = CairnConfig::load()?;

    // Log to stderr so stdout stays clean for command output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Serve => {
            let state = server::build_state(config.clone())?;
            server::run(config, state).await?;
        }
        Command::Ingest { dir, overwrite } => {
            cli::ingest(&config, dir, overwrite).await?;
        }
        Command::User { action } => match action {
            UserAction::Add {
                name,
                display_name,
                number,
                id_code,
                passphrase,
            } => {
                cli::user_add(
                    &config,
                    UserUpsert {
                        name,
                        display_name,
                        number,
                        id_code,
                        passphrase,
                    },
                )?;
            }
        },
    }

    Ok(())
}
