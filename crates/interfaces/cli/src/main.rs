mod interactive;
mod note_cmds;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use scribe_config::AppConfig;

#[derive(Debug, Parser)]
#[command(
    name = "scribe",
    version,
    about = "Turn Obsidian daily notes into reviewed knowledge notes"
)]
struct Cli {
    /// Configuration file.
    #[arg(long, global = true, value_name = "PATH", default_value = "config/default.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List daily notes, newest first.
    List,
    /// List every tag used in the vault.
    Tags,
    /// Extract entries from one daily note and print them as JSON.
    Extract {
        #[arg(value_name = "NOTE")]
        note: String,
    },
    /// Extract, draft and review daily notes.
    Process {
        /// Daily notes by id or date (defaults to the newest one).
        #[arg(value_name = "NOTES")]
        notes: Vec<String>,
        /// Pick notes from a numbered menu.
        #[arg(long, conflicts_with = "notes")]
        select: bool,
        /// Approve every draft without prompting.
        #[arg(long)]
        auto_approve: bool,
    },
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigCommands {
    /// Print the resolved configuration.
    Show,
    /// Write the default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.telemetry.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::List => note_cmds::run_list(&config)?,
        Commands::Tags => note_cmds::run_tags(&config)?,
        Commands::Extract { note } => note_cmds::run_extract(&config, &note).await?,
        Commands::Process {
            notes,
            select,
            auto_approve,
        } => note_cmds::run_process(&config, notes, select, auto_approve).await?,
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                print!("{}", toml::to_string_pretty(&config)?);
            }
            ConfigCommands::Init { force } => {
                if cli.config.exists() && !force {
                    anyhow::bail!(
                        "{} already exists (pass --force to overwrite)",
                        cli.config.display()
                    );
                }
                AppConfig::default().save_to(&cli.config)?;
                println!("wrote {}", cli.config.display());
            }
        },
    }

    Ok(())
}
