use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lodge_host::{LodgeConfig, SavedStateStore};
use tracing_subscriber::{EnvFilter, fmt};

mod run;
mod scenario;

use scenario::Scenario;

#[derive(Parser)]
#[command(name = "lodge", about = "lodge: embedded component lifecycle driver")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a host lifecycle scenario against the simulated platform
    Run {
        /// Scenario file (TOML)
        scenario: PathBuf,

        /// Config file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory holding persisted host state
        #[arg(long)]
        state_dir: Option<PathBuf>,

        /// Ignore previously persisted state
        #[arg(long)]
        fresh: bool,
    },
    /// List persisted host keys and the component ids they hold
    Inspect {
        /// Config file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory holding persisted host state
        #[arg(long)]
        state_dir: Option<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<LodgeConfig> {
    match path {
        Some(path) => LodgeConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(LodgeConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the step report
    fmt()
        .with_env_filter(EnvFilter::from_env("LODGE_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            scenario,
            config,
            state_dir,
            fresh,
        } => {
            let config = load_config(config.as_ref())?;
            let store = SavedStateStore::new(state_dir.unwrap_or_else(|| config.storage.state_dir()));
            let host_key = config.storage.host_key.clone();
            let scenario = Scenario::from_file(&scenario)?;

            let restored = if fresh {
                None
            } else {
                store.load(&host_key).await?
            };
            tracing::info!(
                host_key = %host_key,
                restored = restored.as_ref().map_or(0, |s| s.len()),
                "Starting scenario run"
            );

            let report = run::run_scenario(&scenario, &config, restored)?;
            for line in &report.lines {
                println!("{line}");
            }
            println!("{}", run::persist(&store, &host_key, &report).await?);
        }
        Command::Inspect { config, state_dir } => {
            let config = load_config(config.as_ref())?;
            let store = SavedStateStore::new(state_dir.unwrap_or_else(|| config.storage.state_dir()));
            let keys = store.list_host_keys().await?;
            if keys.is_empty() {
                println!("no persisted state in {}", store.base_dir().display());
            }
            for key in keys {
                match store.load(&key).await? {
                    Some(state) => {
                        let ids: Vec<_> = state.ids().collect();
                        println!("{key}: {}", ids.join(", "));
                    }
                    None => println!("{key}: (empty)"),
                }
            }
        }
    }
    Ok(())
}
