use wattsync_core::{Config, CycleKind, CycleOutcome, Reconciler};

/// Run one cycle in the foreground and exit non-zero on dependency failure.
pub fn run(config: &Config, kind: CycleKind) {
    let reconciler = Reconciler::from_config(config, super::root_logger());
    let result = match kind {
        CycleKind::Incremental => reconciler.run_incremental(),
        CycleKind::Seed => reconciler.run_seed(),
    };

    match result {
        Ok(CycleOutcome::NoUpdate) => println!("{kind}: no update"),
        Ok(CycleOutcome::Persisted { documents }) => {
            println!("{kind}: persisted {documents} document(s)")
        }
        Err(err) => {
            eprintln!("{kind}: {err}");
            std::process::exit(1);
        }
    }
}
