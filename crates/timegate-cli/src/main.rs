use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "timegate", version, about = "Timegate CLI")]
struct Cli {
    /// Path to the durable store (default: ~/.config/timegate/timegate.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed threshold events through the engine
    Ingest(commands::ingest::IngestArgs),
    /// Event mapping registry
    Registry {
        #[command(subcommand)]
        action: commands::registry::RegistryAction,
    },
    /// Gated-entity configuration and lock states
    Shields {
        #[command(subcommand)]
        action: commands::shields::ShieldsAction,
    },
    /// Usage statistics
    Stats {
        #[command(subcommand)]
        action: commands::stats::StatsAction,
    },
    /// Archived daily usage for an entity
    History {
        /// Entity logical id
        entity: String,
        /// Most recent entries to show
        #[arg(long, default_value_t = 30)]
        limit: usize,
    },
    /// Force the idempotent global day rollover
    Rollover,
    /// Engine liveness fields
    Diagnostics,
}

fn main() {
    // Log to stderr; stdout is reserved for command output.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Ingest(args) => commands::ingest::run(args, &cli.db),
        Commands::Registry { action } => commands::registry::run(action, &cli.db),
        Commands::Shields { action } => commands::shields::run(action, &cli.db),
        Commands::Stats { action } => commands::stats::run(action, &cli.db),
        Commands::History { entity, limit } => commands::history::run(&entity, limit, &cli.db),
        Commands::Rollover => commands::rollover::run(&cli.db),
        Commands::Diagnostics => commands::diagnostics::run(&cli.db),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
