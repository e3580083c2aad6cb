//! CouchDB document store gateway.
//!
//! Writes go through `_bulk_docs` in one request per batch. Reads go through
//! time-ordered views in the `views` design document, keyed by the
//! document's `timestamp`:
//!
//! | view                 | documents          |
//! |----------------------|--------------------|
//! | `energy_by_time`     | `ENERGY_DATA`      |
//! | `weather_by_time`    | `WEATHER_DATA`     |
//! | `aggregated_by_time` | `AGGREGATED_DATA`  |
//!
//! The gateway performs no deduplication; callers decide what is new.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::StoreConfig;
use crate::document::{Document, DocumentKind, Metric};
use crate::fetch::{FetchClient, FetchError, RequestOptions, Response, TransportError};
use crate::logging::Logger;

/// Design document holding the time-ordered views.
pub const DESIGN_DOC: &str = "views";
/// View over materialized metric documents.
pub const METRIC_VIEW: &str = "aggregated_by_time";

/// Time-ordered view for a raw snapshot kind.
pub fn view_for(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Energy => "energy_by_time",
        DocumentKind::Weather => "weather_by_time",
    }
}

/// Store gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("store answered with status {status}")]
    Status { status: u16 },

    #[error("malformed store response: {0}")]
    Decode(String),

    /// The batch reached the store but some documents were refused.
    #[error("store rejected {rejected} document(s): {first_reason}")]
    WriteRejected { rejected: usize, first_reason: String },

    #[error("{kind} document has no timestamp")]
    MissingTimestamp { kind: DocumentKind },
}

impl From<FetchError> for StoreError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Transport(inner) => Self::Transport(inner),
            other => Self::Decode(other.to_string()),
        }
    }
}

impl StoreError {
    /// HTTP status involved, [`TransportError::NO_STATUS`] when there was none.
    pub fn status(&self) -> u16 {
        match self {
            Self::Transport(err) => err.status,
            Self::Status { status } => *status,
            _ => TransportError::NO_STATUS,
        }
    }
}

/// Persistence contract used by the reconciler.
pub trait DocumentStore: Send + Sync {
    /// Write `documents` in one batch, every one flagged with
    /// `historical_seed`. Returns the number of documents written.
    fn bulk_upsert(
        &self,
        documents: Vec<Document>,
        historical_seed: bool,
    ) -> Result<usize, StoreError>;

    /// Timestamp of the newest stored document of `kind`, `None` on cold start.
    fn latest_timestamp(&self, kind: DocumentKind) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Newest materialized metric.
    fn latest_metric(&self) -> Result<Option<Metric>, StoreError>;

    /// Metrics at or after `since`, newest first.
    fn metrics_since(&self, since: DateTime<Utc>) -> Result<Vec<Metric>, StoreError>;
}

/// Apply the batch-wide seed flag and check every document is persistable.
pub fn tag_batch(
    mut documents: Vec<Document>,
    historical_seed: bool,
) -> Result<Vec<Document>, StoreError> {
    for doc in &mut documents {
        if doc.timestamp.is_none() {
            return Err(StoreError::MissingTimestamp { kind: doc.kind() });
        }
        doc.historical_seed = historical_seed;
    }
    Ok(documents)
}

/// Render a timestamp as a view key.
pub fn view_key(at: DateTime<Utc>) -> String {
    // Quoted: view keys are JSON values.
    format!("\"{}\"", at.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// Parameters of one time-ordered view read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewQuery {
    pub descending: bool,
    pub limit: Option<usize>,
    pub lower_bound: Option<DateTime<Utc>>,
}

impl ViewQuery {
    /// Newest single row.
    pub fn latest() -> Self {
        Self {
            descending: true,
            limit: Some(1),
            lower_bound: None,
        }
    }

    /// Every row at or after `since`, newest first.
    pub fn newest_since(since: DateTime<Utc>) -> Self {
        Self {
            descending: true,
            limit: None,
            lower_bound: Some(since),
        }
    }

    pub fn to_query_string(&self) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("include_docs", "true");
        if self.descending {
            query.append_pair("descending", "true");
        }
        if let Some(limit) = self.limit {
            query.append_pair("limit", &limit.to_string());
        }
        if let Some(bound) = self.lower_bound {
            // Descending scans start at the newest key, so the lower bound ends the range.
            let param = if self.descending { "endkey" } else { "startkey" };
            query.append_pair(param, &view_key(bound));
        }
        query.finish()
    }
}

#[derive(Serialize)]
struct BulkRequest<'a> {
    docs: &'a [Document],
}

#[derive(Debug, Deserialize)]
struct BulkDocResult {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Deserialize)]
struct ViewResponse<T> {
    rows: Vec<ViewRow<T>>,
}

#[derive(Deserialize)]
struct ViewRow<T> {
    doc: Option<T>,
}

#[derive(Deserialize)]
struct TimestampOnly {
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

/// [`DocumentStore`] over the CouchDB HTTP API.
pub struct CouchStore {
    client: FetchClient,
    database_url: String,
    options: RequestOptions,
    logger: Logger,
}

impl CouchStore {
    pub fn new(client: FetchClient, config: &StoreConfig, logger: Logger) -> Self {
        let mut options = RequestOptions::new();
        if !config.username.is_empty() {
            let credentials = BASE64.encode(format!("{}:{}", config.username, config.password));
            options = options.header("Authorization", format!("Basic {credentials}"));
        }
        Self {
            client,
            database_url: config.database_url(),
            options,
            logger: logger.child("store", &config.database),
        }
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn view_url(&self, view: &str, query: &ViewQuery) -> String {
        format!(
            "{}/_design/{DESIGN_DOC}/_view/{view}?{}",
            self.database_url,
            query.to_query_string()
        )
    }

    fn query_view<T: DeserializeOwned>(
        &self,
        view: &str,
        query: &ViewQuery,
    ) -> Result<Vec<T>, StoreError> {
        let url = self.view_url(view, query);
        let response = self.client.get::<ViewResponse<T>>(&url, &self.options)?;
        let body = success_json(response)?;
        Ok(body.rows.into_iter().filter_map(|row| row.doc).collect())
    }
}

fn success_json<T>(response: Response<T>) -> Result<T, StoreError> {
    if !response.is_success() {
        return Err(StoreError::Status {
            status: response.status,
        });
    }
    let status = response.status;
    response
        .into_json()
        .ok_or_else(|| StoreError::Decode(format!("status {status} without a JSON body")))
}

impl DocumentStore for CouchStore {
    fn bulk_upsert(
        &self,
        documents: Vec<Document>,
        historical_seed: bool,
    ) -> Result<usize, StoreError> {
        let documents = tag_batch(documents, historical_seed)?;
        if documents.is_empty() {
            self.logger.debug("empty batch, nothing to write");
            return Ok(0);
        }

        let url = format!("{}/_bulk_docs", self.database_url);
        let response = self.client.post::<_, Vec<BulkDocResult>>(
            &url,
            &BulkRequest { docs: &documents },
            &self.options,
        )?;
        if !response.is_success() {
            return Err(StoreError::Status {
                status: response.status,
            });
        }

        let results = response.into_json().unwrap_or_default();
        let rejected: Vec<&BulkDocResult> = results.iter().filter(|r| r.error.is_some()).collect();
        if let Some(first) = rejected.first() {
            let first_reason = format!(
                "{} ({})",
                first.error.as_deref().unwrap_or_default(),
                first
                    .reason
                    .as_deref()
                    .or(first.id.as_deref())
                    .unwrap_or("no reason given")
            );
            return Err(StoreError::WriteRejected {
                rejected: rejected.len(),
                first_reason,
            });
        }

        self.logger.info(format_args!(
            "wrote {} document(s), historicalSeed={historical_seed}",
            documents.len()
        ));
        Ok(documents.len())
    }

    fn latest_timestamp(&self, kind: DocumentKind) -> Result<Option<DateTime<Utc>>, StoreError> {
        let rows: Vec<TimestampOnly> = self.query_view(view_for(kind), &ViewQuery::latest())?;
        let latest = rows.into_iter().next().and_then(|row| row.timestamp);
        self.logger
            .debug(format_args!("latest {kind} timestamp: {latest:?}"));
        Ok(latest)
    }

    fn latest_metric(&self) -> Result<Option<Metric>, StoreError> {
        let rows: Vec<Metric> = self.query_view(METRIC_VIEW, &ViewQuery::latest())?;
        Ok(rows.into_iter().next())
    }

    fn metrics_since(&self, since: DateTime<Utc>) -> Result<Vec<Metric>, StoreError> {
        self.query_view(METRIC_VIEW, &ViewQuery::newest_since(since))
    }
}
