//! Source adapter contract.
//!
//! Every upstream implements [`TelemetrySource`]: "what changed since the
//! last reading I know about" and "the last 24 hours". Adapters own the
//! translation from the generic fetch client to source-specific endpoints
//! and always hand back timestamped [`Document`]s.

use chrono::{DateTime, Utc};

use crate::document::{Document, DocumentKind};
use crate::fetch::{Body, FetchError, Response, TransportError};

/// Metadata about a source adapter.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    /// Unique identifier (e.g. `"electricity_maps"`).
    pub name: &'static str,
    /// One-line human-readable description.
    pub description: &'static str,
    /// Document kind this source produces.
    pub kind: DocumentKind,
}

/// Failure of a single adapter call.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("{origin}: {error}")]
    Transport {
        origin: &'static str,
        #[source]
        error: TransportError,
    },

    /// The upstream answered, but not with a success status.
    #[error("{origin} answered with status {status}")]
    UpstreamStatus { origin: &'static str, status: u16 },

    #[error("{origin} returned a malformed payload: {detail}")]
    Decode { origin: &'static str, detail: String },

    #[error("{origin} returned no JSON body (status {status})")]
    MissingBody { origin: &'static str, status: u16 },

    #[error("{origin} adapter panicked")]
    Panicked { origin: &'static str },
}

impl SourceError {
    pub fn from_fetch(origin: &'static str, err: FetchError) -> Self {
        match err {
            FetchError::Transport(error) => Self::Transport { origin, error },
            FetchError::Decode { url, source } => Self::Decode {
                origin,
                detail: format!("{url}: {source}"),
            },
            FetchError::Encode(source) => Self::Decode {
                origin,
                detail: source.to_string(),
            },
        }
    }

    pub fn decode(origin: &'static str, detail: impl Into<String>) -> Self {
        Self::Decode {
            origin,
            detail: detail.into(),
        }
    }

    /// Adapter that produced this error.
    pub fn origin(&self) -> &'static str {
        match self {
            Self::Transport { origin, .. }
            | Self::UpstreamStatus { origin, .. }
            | Self::Decode { origin, .. }
            | Self::MissingBody { origin, .. }
            | Self::Panicked { origin } => *origin,
        }
    }

    /// HTTP status involved, [`TransportError::NO_STATUS`] when there was none.
    pub fn status(&self) -> u16 {
        match self {
            Self::Transport { error, .. } => error.status,
            Self::UpstreamStatus { status, .. } | Self::MissingBody { status, .. } => *status,
            Self::Decode { .. } | Self::Panicked { .. } => TransportError::NO_STATUS,
        }
    }
}

/// Unwrap a successful JSON response or explain why there is none.
pub(crate) fn expect_json<T>(
    origin: &'static str,
    response: Response<T>,
) -> Result<T, SourceError> {
    if !response.is_success() {
        return Err(SourceError::UpstreamStatus {
            origin,
            status: response.status,
        });
    }
    match response.body {
        Some(Body::Json(value)) => Ok(value),
        _ => Err(SourceError::MissingBody {
            origin,
            status: response.status,
        }),
    }
}

/// Inclusive-boundary freshness check: a reading exactly at `last_known` is
/// not new.
pub fn is_newer(reading: DateTime<Utc>, last_known: Option<DateTime<Utc>>) -> bool {
    match last_known {
        Some(known) => reading > known,
        None => true,
    }
}

/// Wall-clock source, injectable for the forecast cut-off.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// [`Clock`] reading the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Trait that every telemetry source adapter must implement.
pub trait TelemetrySource: Send + Sync {
    /// Source metadata.
    fn info(&self) -> &SourceInfo;

    /// Latest reading, or `None` when it is not newer than `last_known`.
    fn fetch_since(
        &self,
        last_known: Option<DateTime<Utc>>,
    ) -> Result<Option<Document>, SourceError>;

    /// Every reading from the trailing 24-hour window.
    fn fetch_last_24_hours(&self) -> Result<Vec<Document>, SourceError>;

    /// Convenience: name from info.
    fn name(&self) -> &'static str {
        self.info().name
    }

    /// Convenience: kind from info.
    fn kind(&self) -> DocumentKind {
        self.info().kind
    }
}
