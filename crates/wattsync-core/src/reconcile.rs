//! Reconciliation cycles.
//!
//! A [`Reconciler`] drives one cycle per trigger and keeps no state between
//! cycles. Each cycle walks `Idle -> Fetching -> Reconciling -> Persisting`:
//!
//! - **incremental**: fetch what is newer than the store's latest timestamp
//!   for each kind. A failing source counts as "no update" from that source;
//!   if nothing is new, nothing is written.
//! - **seed**: fetch the trailing 24 hours from both sources. Any source
//!   failure aborts the cycle before anything is written.
//!
//! Store failures are fatal to either cycle. Nothing is retried here; the
//! external trigger's cadence is the retry policy.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::document::{Document, DocumentKind};
use crate::fetch::{FetchClient, UreqTransport};
use crate::logging::Logger;
use crate::source::{SourceError, TelemetrySource};
use crate::sources::{ElectricityMapsSource, OpenMeteoSource};
use crate::store::{CouchStore, DocumentStore, StoreError};

/// Step of a cycle, reported in logs and in [`CycleError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Fetching,
    Reconciling,
    Persisting,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Reconciling => "reconciling",
            Self::Persisting => "persisting",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    Incremental,
    Seed,
}

impl fmt::Display for CycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incremental => f.write_str("incremental"),
            Self::Seed => f.write_str("seed"),
        }
    }
}

/// Successful end of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Neither source had anything newer than the store. Incremental only.
    NoUpdate,
    /// One batch was written.
    Persisted { documents: usize },
}

/// What a failed cycle depended on.
#[derive(Debug, thiserror::Error)]
pub enum DependencyCause {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("{kind} cycle failed while {phase}: {cause}")]
    DependencyFailure {
        kind: CycleKind,
        phase: CyclePhase,
        #[source]
        cause: DependencyCause,
    },
}

impl CycleError {
    fn dependency(kind: CycleKind, phase: CyclePhase, cause: impl Into<DependencyCause>) -> Self {
        Self::DependencyFailure {
            kind,
            phase,
            cause: cause.into(),
        }
    }

    pub fn phase(&self) -> CyclePhase {
        match self {
            Self::DependencyFailure { phase, .. } => *phase,
        }
    }

    pub fn cause(&self) -> &DependencyCause {
        match self {
            Self::DependencyFailure { cause, .. } => cause,
        }
    }
}

/// Orchestrates the two sources and the store.
pub struct Reconciler {
    energy: Arc<dyn TelemetrySource>,
    weather: Arc<dyn TelemetrySource>,
    store: Arc<dyn DocumentStore>,
    logger: Logger,
}

impl Reconciler {
    pub fn new(
        energy: Arc<dyn TelemetrySource>,
        weather: Arc<dyn TelemetrySource>,
        store: Arc<dyn DocumentStore>,
        logger: Logger,
    ) -> Self {
        Self {
            energy,
            weather,
            store,
            logger,
        }
    }

    /// Wire the production adapters and CouchDB gateway over one shared
    /// blocking HTTP agent.
    pub fn from_config(config: &Config, logger: Logger) -> Self {
        let transport = Arc::new(UreqTransport::new(&config.http));
        let client = FetchClient::new(transport, logger.child("component", "fetch"));
        let energy = ElectricityMapsSource::new(client.clone(), &config.energy, logger.clone());
        let weather = OpenMeteoSource::new(client.clone(), &config.weather, logger.clone());
        let store = CouchStore::new(client, &config.store, logger.clone());
        Self::new(Arc::new(energy), Arc::new(weather), Arc::new(store), logger)
    }

    /// Persist whatever is newer than the store, tolerating one failing source.
    pub fn run_incremental(&self) -> Result<CycleOutcome, CycleError> {
        let kind = CycleKind::Incremental;
        let logger = self.cycle_logger(kind);
        let fail = |phase: CyclePhase, cause: DependencyCause| {
            logger.error(format_args!("dependency failure while {phase}: {cause}"));
            CycleError::dependency(kind, phase, cause)
        };

        enter(&logger, CyclePhase::Fetching);
        let energy_since = self
            .store
            .latest_timestamp(DocumentKind::Energy)
            .map_err(|err| fail(CyclePhase::Fetching, err.into()))?;
        let weather_since = self
            .store
            .latest_timestamp(DocumentKind::Weather)
            .map_err(|err| fail(CyclePhase::Fetching, err.into()))?;

        let (energy, weather) = self.fetch_both(
            |source| source.fetch_since(energy_since),
            |source| source.fetch_since(weather_since),
        );

        enter(&logger, CyclePhase::Reconciling);
        let batch: Vec<Document> = [
            (self.energy.name(), energy_since, energy),
            (self.weather.name(), weather_since, weather),
        ]
        .into_iter()
        .filter_map(|(name, since, result)| keep_update(&logger, name, since, result))
        .collect();

        if batch.is_empty() {
            logger.info("no update from either source");
            return Ok(CycleOutcome::NoUpdate);
        }

        enter(&logger, CyclePhase::Persisting);
        let documents = self
            .store
            .bulk_upsert(batch, false)
            .map_err(|err| fail(CyclePhase::Persisting, err.into()))?;
        logger.info(format_args!("persisted {documents} document(s)"));
        Ok(CycleOutcome::Persisted { documents })
    }

    /// Backfill the trailing 24 hours from both sources, or write nothing.
    pub fn run_seed(&self) -> Result<CycleOutcome, CycleError> {
        let kind = CycleKind::Seed;
        let logger = self.cycle_logger(kind);
        let fail = |phase: CyclePhase, cause: DependencyCause| {
            logger.error(format_args!("dependency failure while {phase}: {cause}"));
            CycleError::dependency(kind, phase, cause)
        };

        enter(&logger, CyclePhase::Fetching);
        let (energy, weather) = self.fetch_both(
            |source| source.fetch_last_24_hours(),
            |source| source.fetch_last_24_hours(),
        );

        enter(&logger, CyclePhase::Reconciling);
        let mut batch = energy.map_err(|err| fail(CyclePhase::Fetching, err.into()))?;
        let weather = weather.map_err(|err| fail(CyclePhase::Fetching, err.into()))?;
        logger.debug(format_args!(
            "{} energy and {} weather reading(s)",
            batch.len(),
            weather.len()
        ));
        batch.extend(weather);

        enter(&logger, CyclePhase::Persisting);
        let documents = self
            .store
            .bulk_upsert(batch, true)
            .map_err(|err| fail(CyclePhase::Persisting, err.into()))?;
        logger.info(format_args!("seeded {documents} document(s)"));
        Ok(CycleOutcome::Persisted { documents })
    }

    /// Run one call per source in parallel and wait for both.
    ///
    /// A panicking adapter is reported as [`SourceError::Panicked`] for that
    /// source only.
    fn fetch_both<T, E, W>(
        &self,
        energy: E,
        weather: W,
    ) -> (Result<T, SourceError>, Result<T, SourceError>)
    where
        T: Send,
        E: FnOnce(&dyn TelemetrySource) -> Result<T, SourceError> + Send,
        W: FnOnce(&dyn TelemetrySource) -> Result<T, SourceError> + Send,
    {
        let energy_source: &dyn TelemetrySource = self.energy.as_ref();
        let weather_source: &dyn TelemetrySource = self.weather.as_ref();

        std::thread::scope(|s| {
            let energy_handle = s.spawn(move || guarded(energy_source, energy));
            let weather_handle = s.spawn(move || guarded(weather_source, weather));
            let energy = energy_handle.join().unwrap_or_else(|_| {
                Err(SourceError::Panicked {
                    origin: energy_source.name(),
                })
            });
            let weather = weather_handle.join().unwrap_or_else(|_| {
                Err(SourceError::Panicked {
                    origin: weather_source.name(),
                })
            });
            (energy, weather)
        })
    }

    fn cycle_logger(&self, kind: CycleKind) -> Logger {
        let logger = self
            .logger
            .child("cycle", uuid::Uuid::new_v4())
            .child("kind", kind);
        logger.info("cycle started");
        logger
    }
}

fn guarded<T>(
    source: &dyn TelemetrySource,
    call: impl FnOnce(&dyn TelemetrySource) -> Result<T, SourceError>,
) -> Result<T, SourceError> {
    catch_unwind(AssertUnwindSafe(|| call(source))).unwrap_or_else(|_| {
        Err(SourceError::Panicked {
            origin: source.name(),
        })
    })
}

fn enter(logger: &Logger, phase: CyclePhase) {
    logger.debug(format_args!("phase -> {phase}"));
}

/// Incremental partial-failure policy: a failed fetch counts as no update.
fn keep_update(
    logger: &Logger,
    name: &str,
    since: Option<DateTime<Utc>>,
    result: Result<Option<Document>, SourceError>,
) -> Option<Document> {
    match result {
        Ok(Some(doc)) => {
            logger.debug(format_args!("{name}: new reading at {:?}", doc.timestamp));
            Some(doc)
        }
        Ok(None) => {
            logger.debug(format_args!("{name}: nothing newer than {since:?}"));
            None
        }
        Err(err) => {
            logger.warn(format_args!(
                "{name}: {err} (status {}), treating as no update",
                err.status()
            ));
            None
        }
    }
}
