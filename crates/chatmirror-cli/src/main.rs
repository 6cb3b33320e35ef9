use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;
mod paths;
mod ui;

use commands::digest::{DigestArgs, OutputFormat};
use commands::export::{ExportArgs, SourceArgs};
use config::Config;

#[derive(Parser)]
#[command(name = "chatmirror")]
#[command(about = "Mirror team conversations into documents, then digest them.")]
#[command(version)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a conversation, or bring an existing export up to date
    Export {
        /// chat:<id> or channel:<team>/<channel>
        #[arg(value_name = "SOURCE", conflicts_with_all = ["chat", "team", "channel"])]
        source: Option<String>,

        /// Chat identifier
        #[arg(long, conflicts_with_all = ["team", "channel"])]
        chat: Option<String>,

        /// Team identifier (with --channel)
        #[arg(long, requires = "channel")]
        team: Option<String>,

        /// Channel identifier (with --team)
        #[arg(long, requires = "team")]
        channel: Option<String>,

        /// Export file (defaults to <output_dir>/<topic>.md)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Keep at most this many of the most recent messages
        #[arg(long)]
        limit: Option<usize>,

        /// Re-fetch everything and rewrite the export
        #[arg(long)]
        full: bool,
    },

    /// Extract topics, decisions and action items from an export
    Digest {
        /// Export file
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Structured)]
        format: OutputFormat,

        /// Maximum characters per chunk sent to the model
        #[arg(long)]
        chunk_chars: Option<usize>,
    },

    /// Show the header state of an export
    Status {
        /// Export file
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logs (hidden by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(paths::get_config_path);
    let config = Config::load(&config_path)?;

    let result = match cli.command {
        Commands::Export {
            source,
            chat,
            team,
            channel,
            output,
            limit,
            full,
        } => {
            let args = ExportArgs {
                source: SourceArgs {
                    source,
                    chat,
                    team,
                    channel,
                },
                output,
                limit,
                full,
            };
            commands::export::run(&config, args).await
        }
        Commands::Digest {
            path,
            format,
            chunk_chars,
        } => {
            let args = DigestArgs {
                path,
                format,
                chunk_chars,
            };
            commands::digest::run(&config, args).await
        }
        Commands::Status { path, json } => commands::status::run(&path, json).await,
    };

    if let Err(e) = &result {
        ui::error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}
