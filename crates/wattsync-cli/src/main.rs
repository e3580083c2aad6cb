//! CLI for wattsync: grid power and weather ingestion into CouchDB.

mod commands;

use clap::{Parser, Subcommand};

use commands::ConfigArgs;

#[derive(Parser)]
#[command(name = "wattsync")]
#[command(about = "wattsync: ingest grid power and weather readings into CouchDB")]
#[command(version = wattsync_core::VERSION)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the /update and /seed trigger endpoints
    Serve {
        /// Bind address (defaults to the configured server host)
        #[arg(long)]
        host: Option<String>,

        /// Port (defaults to the configured server port, 8080)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run one incremental cycle: persist readings newer than the store
    Update,

    /// Run one seed cycle: backfill the trailing 24 hours from both sources
    Seed,
}

fn main() {
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(env).init();

    let cli = Cli::parse();
    let config = cli.config.resolve().unwrap_or_else(|err| {
        eprintln!("Invalid configuration: {err}");
        std::process::exit(2);
    });

    match cli.command {
        Commands::Serve { host, port } => commands::serve::run(config, host, port),
        Commands::Update => commands::cycle::run(&config, wattsync_core::CycleKind::Incremental),
        Commands::Seed => commands::cycle::run(&config, wattsync_core::CycleKind::Seed),
    }
}
