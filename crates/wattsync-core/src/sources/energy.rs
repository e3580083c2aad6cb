//! Grid power breakdown from Electricity Maps.
//!
//! Two endpoints, both keyed by zone and authenticated with an `auth-token`
//! header:
//! - `power-breakdown/latest`: the single most recent reading
//! - `power-breakdown/history`: always exactly the trailing 24 hours
//!
//! Every reading is timestamped from its own reported `datetime`.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::EnergyConfig;
use crate::document::{Document, DocumentKind, EnergySnapshot, Snapshot};
use crate::fetch::{FetchClient, RequestOptions};
use crate::logging::Logger;
use crate::source::{SourceError, SourceInfo, TelemetrySource, expect_json, is_newer};

/// Header carrying the Electricity Maps API key.
pub const API_KEY_HEADER: &str = "auth-token";

const INFO: SourceInfo = SourceInfo {
    name: "electricity_maps",
    description: "Grid power production/consumption breakdown per generation source",
    kind: DocumentKind::Energy,
};

#[derive(Deserialize)]
struct HistoryResponse {
    history: Vec<EnergySnapshot>,
}

/// Energy adapter over the Electricity Maps v3 API.
pub struct ElectricityMapsSource {
    client: FetchClient,
    latest_url: String,
    history_url: String,
    options: RequestOptions,
    logger: Logger,
}

impl ElectricityMapsSource {
    pub fn new(client: FetchClient, config: &EnergyConfig, logger: Logger) -> Self {
        let base = config.base_url.trim_end_matches('/');
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("zone", &config.zone)
            .append_pair("disableEstimations", "true")
            .finish();
        Self {
            client,
            latest_url: format!("{base}/v3/power-breakdown/latest?{query}"),
            history_url: format!("{base}/v3/power-breakdown/history?{query}"),
            options: RequestOptions::new().header(API_KEY_HEADER, config.api_key.clone()),
            logger: logger.child("source", INFO.name),
        }
    }

    pub fn latest_url(&self) -> &str {
        &self.latest_url
    }

    pub fn history_url(&self) -> &str {
        &self.history_url
    }
}

impl TelemetrySource for ElectricityMapsSource {
    fn info(&self) -> &SourceInfo {
        &INFO
    }

    fn fetch_since(
        &self,
        last_known: Option<DateTime<Utc>>,
    ) -> Result<Option<Document>, SourceError> {
        let response = self
            .client
            .get::<EnergySnapshot>(&self.latest_url, &self.options)
            .map_err(|err| SourceError::from_fetch(INFO.name, err))?;
        let reading = expect_json(INFO.name, response)?;

        if !is_newer(reading.source_time, last_known) {
            self.logger.debug(format_args!(
                "reading at {} is not newer than {:?}, no update",
                reading.source_time, last_known
            ));
            return Ok(None);
        }

        Ok(Some(Document::new(
            reading.source_time,
            Snapshot::Energy(reading),
        )))
    }

    fn fetch_last_24_hours(&self) -> Result<Vec<Document>, SourceError> {
        let response = self
            .client
            .get::<HistoryResponse>(&self.history_url, &self.options)
            .map_err(|err| SourceError::from_fetch(INFO.name, err))?;
        let body = expect_json(INFO.name, response)?;

        self.logger
            .debug(format_args!("{} historical readings", body.history.len()));
        Ok(body
            .history
            .into_iter()
            .map(|reading| Document::new(reading.source_time, Snapshot::Energy(reading)))
            .collect())
    }
}
