//! Local weather from Open-Meteo.
//!
//! Times come back as `YYYY-MM-DDTHH:MM` strings in GMT; they are parsed into
//! instants and dropped from the stored payload. The hourly endpoint spans one
//! past day and one forecast day, so points after "now" are discarded.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::config::WeatherConfig;
use crate::document::{Document, DocumentKind, Snapshot, WeatherConditions, WeatherSnapshot};
use crate::fetch::{FetchClient, RequestOptions};
use crate::logging::Logger;
use crate::source::{
    Clock, SourceError, SourceInfo, SystemClock, TelemetrySource, expect_json, is_newer,
};

/// Layout of upstream time strings.
pub const TIME_LAYOUT: &str = "%Y-%m-%dT%H:%M";

const VARIABLES: &str = "temperature_2m,direct_radiation,cloud_cover,wind_speed_10m";

const INFO: SourceInfo = SourceInfo {
    name: "open_meteo",
    description: "Temperature, direct radiation, cloud cover and wind speed at one point",
    kind: DocumentKind::Weather,
};

#[derive(Deserialize)]
struct CurrentResponse {
    current: CurrentConditions,
}

#[derive(Deserialize)]
struct CurrentConditions {
    time: String,
    #[serde(flatten)]
    conditions: WeatherConditions,
}

#[derive(Deserialize)]
struct HourlyResponse {
    hourly: HourlySeries,
}

#[derive(Deserialize)]
struct HourlySeries {
    time: Vec<String>,
    temperature_2m: Vec<Option<f32>>,
    direct_radiation: Vec<Option<f32>>,
    cloud_cover: Vec<Option<u8>>,
    wind_speed_10m: Vec<Option<f32>>,
}

/// Parse an upstream time string as a UTC instant.
pub fn parse_time(raw: &str) -> Result<DateTime<Utc>, SourceError> {
    NaiveDateTime::parse_from_str(raw, TIME_LAYOUT)
        .map(|naive| naive.and_utc())
        .map_err(|err| SourceError::decode(INFO.name, format!("time {raw:?}: {err}")))
}

/// Weather adapter over the Open-Meteo forecast API.
pub struct OpenMeteoSource {
    client: FetchClient,
    current_url: String,
    hourly_url: String,
    clock: Arc<dyn Clock>,
    logger: Logger,
}

impl OpenMeteoSource {
    pub fn new(client: FetchClient, config: &WeatherConfig, logger: Logger) -> Self {
        let base = config.base_url.trim_end_matches('/');
        let location = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("latitude", &config.latitude.to_string())
            .append_pair("longitude", &config.longitude.to_string())
            .finish();
        let current = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("current", VARIABLES)
            .finish();
        let hourly = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("hourly", VARIABLES)
            .append_pair("past_days", "1")
            .append_pair("forecast_days", "1")
            .finish();
        Self {
            client,
            current_url: format!("{base}/v1/forecast?{location}&{current}"),
            hourly_url: format!("{base}/v1/forecast?{location}&{hourly}"),
            clock: Arc::new(SystemClock),
            logger: logger.child("source", INFO.name),
        }
    }

    /// Replace the wall clock used for the forecast cut-off.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn current_url(&self) -> &str {
        &self.current_url
    }

    pub fn hourly_url(&self) -> &str {
        &self.hourly_url
    }
}

impl TelemetrySource for OpenMeteoSource {
    fn info(&self) -> &SourceInfo {
        &INFO
    }

    fn fetch_since(
        &self,
        last_known: Option<DateTime<Utc>>,
    ) -> Result<Option<Document>, SourceError> {
        let response = self
            .client
            .get::<CurrentResponse>(&self.current_url, &RequestOptions::new())
            .map_err(|err| SourceError::from_fetch(INFO.name, err))?;
        let body = expect_json(INFO.name, response)?;
        let observed_at = parse_time(&body.current.time)?;

        if !is_newer(observed_at, last_known) {
            self.logger.debug(format_args!(
                "reading at {observed_at} is not newer than {last_known:?}, no update"
            ));
            return Ok(None);
        }

        Ok(Some(Document::new(
            observed_at,
            Snapshot::Weather(WeatherSnapshot {
                current: body.current.conditions,
            }),
        )))
    }

    fn fetch_last_24_hours(&self) -> Result<Vec<Document>, SourceError> {
        let response = self
            .client
            .get::<HourlyResponse>(&self.hourly_url, &RequestOptions::new())
            .map_err(|err| SourceError::from_fetch(INFO.name, err))?;
        let series = expect_json(INFO.name, response)?.hourly;

        let points = series.time.len();
        let lengths = [
            series.temperature_2m.len(),
            series.direct_radiation.len(),
            series.cloud_cover.len(),
            series.wind_speed_10m.len(),
        ];
        if lengths.iter().any(|&len| len != points) {
            return Err(SourceError::decode(
                INFO.name,
                format!("hourly arrays disagree in length: {points} times vs {lengths:?}"),
            ));
        }

        let now = self.clock.now();
        let mut documents = Vec::with_capacity(points);
        let mut discarded = 0usize;
        for (i, raw_time) in series.time.iter().enumerate() {
            let at = parse_time(raw_time)?;
            if at > now {
                discarded += 1;
                continue;
            }
            let conditions = WeatherConditions {
                temperature: required(series.temperature_2m[i], "temperature_2m", raw_time)?,
                direct_radiation: required(
                    series.direct_radiation[i],
                    "direct_radiation",
                    raw_time,
                )?,
                cloud_cover: required(series.cloud_cover[i], "cloud_cover", raw_time)?,
                wind_speed: required(series.wind_speed_10m[i], "wind_speed_10m", raw_time)?,
            };
            documents.push(Document::new(
                at,
                Snapshot::Weather(WeatherSnapshot {
                    current: conditions,
                }),
            ));
        }

        self.logger.debug(format_args!(
            "{} hourly readings kept, {discarded} forecast points discarded",
            documents.len()
        ));
        Ok(documents)
    }
}

fn required<T>(value: Option<T>, variable: &str, time: &str) -> Result<T, SourceError> {
    value.ok_or_else(|| SourceError::decode(INFO.name, format!("{variable} missing at {time}")))
}
