use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "vibe-pacer")]
#[command(version, about = "Paced relay for streamed AI output")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Path to pacer.toml (defaults to ./pacer.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP relay server
    Serve {
        /// Port to serve on (overrides pacer.toml)
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind (overrides pacer.toml)
        #[arg(long)]
        host: Option<String>,

        /// Bind all interfaces and allow any CORS origin
        #[arg(long)]
        dev: bool,
    },
    /// Pace stdin to stdout
    Pipe {
        /// Delay floor in milliseconds
        #[arg(long)]
        min_delay_ms: Option<u64>,

        /// Delay ceiling in milliseconds
        #[arg(long)]
        max_delay_ms: Option<u64>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show effective configuration
    Show,
    /// Validate configuration and report the first problem
    Validate,
    /// Write a default pacer.toml
    Init,
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // stdout carries paced output in `pipe` mode, so logs go to stderr.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();
    init_tracing(cli.verbose, cli.json_logs);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let config_path = cli.config.as_deref();

    match &cli.command {
        Commands::Serve { port, host, dev } => {
            let config = cmd::load_config(&project_dir, config_path)?;
            cmd::cmd_serve(config, *port, host.clone(), *dev).await?;
        }
        Commands::Pipe {
            min_delay_ms,
            max_delay_ms,
        } => {
            let mut config = cmd::load_config(&project_dir, config_path)?;
            if let Some(ms) = min_delay_ms {
                config.pacing.min_delay_ms = *ms;
            }
            if let Some(ms) = max_delay_ms {
                config.pacing.max_delay_ms = *ms;
            }
            cmd::cmd_pipe(&config.pacing).await?;
        }
        Commands::Config { command } => {
            cmd::cmd_config(&project_dir, config_path, command.clone())?;
        }
    }

    Ok(())
}
