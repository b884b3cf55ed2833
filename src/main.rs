use std::path::PathBuf;

use anyhow::Result;
use audience_match::commands::{build_index, generate, parse_report_command, search, show_status};
use audience_match::config::{get_config_dir, run_interactive_config, show_config};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "audience-match")]
#[command(about = "Match campaign briefs to audience segments and propose new ones")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the segment store
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure embedding and generation providers
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Embed a keyword/answer corpus and write the segment store
    Build {
        /// JSON corpus: an object of keyword -> answer, or a list of records
        #[arg(long)]
        input: PathBuf,
        /// Optional JSON object of keyword -> display name
        #[arg(long)]
        display_names: Option<PathBuf>,
    },
    /// Rank catalog segments against a query
    Search {
        query: String,
        /// Number of segments to return
        #[arg(long)]
        top_k: Option<usize>,
        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Retrieve segments for a campaign brief and propose new ones
    Generate {
        brief: String,
        /// Number of segments to retrieve
        #[arg(long)]
        top_k: Option<usize>,
        /// Fail instead of degrading when generation is unavailable
        #[arg(long)]
        require_generation: bool,
        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Parse a rendered report back into JSON
    ParseReport {
        /// Report file, or "-" to read stdin
        input: String,
    },
    /// Show store and provider status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => get_config_dir()?,
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config_dir)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Build {
            input,
            display_names,
        } => {
            build_index(&config_dir, &input, display_names.as_deref()).await?;
        }
        Commands::Search { query, top_k, json } => {
            search(&config_dir, query, top_k, json).await?;
        }
        Commands::Generate {
            brief,
            top_k,
            require_generation,
            json,
        } => {
            generate(&config_dir, brief, top_k, require_generation, json).await?;
        }
        Commands::ParseReport { input } => {
            parse_report_command(&input)?;
        }
        Commands::Status => {
            show_status(&config_dir).await?;
        }
    }

    Ok(())
}
