use std::sync::Arc;

use wattsync_core::{Config, Reconciler};

pub fn run(config: Config, host: Option<String>, port: Option<u16>) {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    let logger = super::root_logger();
    let reconciler = Arc::new(Reconciler::from_config(&config, logger.clone()));

    let base = format!("http://{host}:{port}");
    println!("wattsync server v{}", wattsync_core::VERSION);
    println!("   {base}");
    println!(
        "   zone {} at ({}, {})",
        config.energy.zone, config.weather.latitude, config.weather.longitude
    );
    println!("   store {}", config.store.database_url());
    println!();
    println!("   Endpoints:");
    println!("     GET|POST /update   Persist readings newer than the store");
    println!("     GET|POST /seed     Backfill the trailing 24 hours");
    println!("     GET /health        Health check");
    println!();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("Cannot start async runtime: {err}");
            std::process::exit(1);
        }
    };
    if let Err(err) = rt.block_on(wattsync_server::run_server(reconciler, &host, port, logger)) {
        eprintln!("Server error on {base}: {err}");
        std::process::exit(1);
    }
}
