//! Workshop CLI: inspect and manage workbenches from the terminal.
//!
//! Commands:
//! - `init`: Write the default config
//! - `create`: Create a workbench
//! - `list`: List workbenches
//! - `status`: Draft, run progress and tool log of a workbench
//! - `plan`: Print the current plan
//! - `tool-log`: Print tool log entries
//! - `diff`: Text diff of one draft file
//! - `publish`: Publish the draft
//! - `discard`: Discard the draft
//! - `checkpoints`: List checkpoints

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use workshop_config::EngineConfig;

mod commands;

use commands::Engine;

#[derive(Parser)]
#[command(
    name = "workshop",
    about = "Workshop: draft-first AI file editing engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Data directory holding config.toml and the workbenches
    #[arg(long, global = true, env = "WORKSHOP_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default config.toml
    Init,

    /// Create a workbench
    Create {
        name: String,
    },

    /// List workbenches
    List,

    /// Show draft state, run progress and tool log size
    Status {
        workbench: String,
    },

    /// Print the plan items
    Plan {
        workbench: String,
    },

    /// Print tool log entries
    ToolLog {
        workbench: String,

        /// Show one entry with its full result
        #[arg(long)]
        id: Option<u64>,
    },

    /// Text diff of one draft file against Published
    Diff {
        workbench: String,
        path: String,
    },

    /// Publish the draft
    Publish {
        workbench: String,
    },

    /// Discard the draft
    Discard {
        workbench: String,
    },

    /// List checkpoints
    Checkpoints {
        workbench: String,
    },
}

fn init_tracing(config: &EngineConfig, verbose: bool) {
    let level = if verbose { "debug" } else { config.logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match cli.data_dir {
        Some(dir) => EngineConfig::load_in(dir),
        None => EngineConfig::load(),
    }
    .context("Failed to load config")?;
    init_tracing(&config, cli.verbose);

    let engine = Engine::open(config);
    let output = match cli.command {
        Commands::Init => commands::init::run(engine.config())?,
        Commands::Create { name } => commands::workbench::create(&engine, &name)?,
        Commands::List => commands::workbench::list(&engine)?,
        Commands::Status { workbench } => commands::workbench::status(&engine, &workbench)?,
        Commands::Plan { workbench } => commands::run_log::plan(&engine, &workbench)?,
        Commands::ToolLog { workbench, id } => commands::run_log::tool_log(&engine, &workbench, id)?,
        Commands::Diff { workbench, path } => commands::draft::diff(&engine, &workbench, &path).await?,
        Commands::Publish { workbench } => commands::draft::publish(&engine, &workbench)?,
        Commands::Discard { workbench } => commands::draft::discard(&engine, &workbench)?,
        Commands::Checkpoints { workbench } => commands::draft::checkpoints(&engine, &workbench)?,
    };

    print!("{output}");
    Ok(())
}
