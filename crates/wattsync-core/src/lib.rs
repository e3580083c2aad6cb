//! # wattsync-core
//!
//! Ingestion pipeline for grid power and local weather telemetry.
//!
//! Two upstreams (Electricity Maps for the grid breakdown, Open-Meteo for
//! weather) are polled on external triggers and their readings are appended to
//! a CouchDB database, where a separate process materializes aggregated
//! metrics.
//!
//! ## Quick Start
//!
//! ```no_run
//! use wattsync_core::{Config, Logger, Reconciler};
//!
//! let config = Config::default();
//! let reconciler = Reconciler::from_config(&config, Logger::default());
//!
//! match reconciler.run_incremental() {
//!     Ok(outcome) => println!("{outcome:?}"),
//!     Err(err) => eprintln!("{err}"),
//! }
//! ```
//!
//! ## Architecture
//!
//! Fetch client → Source adapters → Reconciler → Store gateway
//!
//! Every upstream implements [`TelemetrySource`] and the store implements
//! [`DocumentStore`], so the [`Reconciler`] can be driven entirely by test
//! doubles. HTTP goes through the [`Transport`] seam for the same reason.

pub mod config;
pub mod document;
pub mod fetch;
pub mod logging;
pub mod reconcile;
pub mod source;
pub mod sources;
pub mod store;

#[cfg(test)]
mod test_support;

pub use config::{
    Config, ConfigError, EnergyConfig, HttpConfig, ServerConfig, StoreConfig, WeatherConfig,
};
pub use document::{
    Document, DocumentKind, EnergySnapshot, GenerationSource, Metric, PowerBreakdown, Snapshot,
    WeatherConditions, WeatherSnapshot,
};
pub use fetch::{
    Body, FetchClient, FetchError, RawResponse, Request, RequestOptions, Response, Transport,
    TransportError, UreqTransport,
};
pub use logging::Logger;
pub use reconcile::{
    CycleError, CycleKind, CycleOutcome, CyclePhase, DependencyCause, Reconciler,
};
pub use source::{Clock, SourceError, SourceInfo, SystemClock, TelemetrySource};
pub use sources::{ElectricityMapsSource, OpenMeteoSource};
pub use store::{CouchStore, DocumentStore, StoreError, ViewQuery};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
