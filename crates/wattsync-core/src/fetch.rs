//! Blocking HTTP fetch client with content-type driven decoding.
//!
//! The [`Transport`] trait is the seam between the pipeline and the network:
//! [`UreqTransport`] talks to real upstreams, tests plug in canned responses.
//! [`FetchClient`] layers the decoding policy on top of any transport:
//!
//! - status above 299: the response carries only the status, body undecoded
//! - `application/json`: the body is decoded into the requested shape
//! - `text/plain`: the raw string is returned
//! - anything else: a warning is logged and the body is left absent
//!
//! Connection and timeout failures surface as [`TransportError`], which
//! always carries a concrete status ([`TransportError::NO_STATUS`]).

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::HttpConfig;
use crate::logging::Logger;

/// Content-type marker selecting JSON decoding.
pub const JSON_MEDIA_MARKER: &str = "application/json";
/// Content-type marker selecting raw text passthrough.
pub const TEXT_MEDIA_MARKER: &str = "text/plain";

/// HTTP verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call options. Currently just extra request headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header, builder style.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A fully built request handed to a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl Request {
    /// First header value matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// What came back over the wire, before any decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// The upstream could not be reached or the exchange broke off midway.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transport failure reaching {url} (status {status}): {message}")]
pub struct TransportError {
    pub url: String,
    pub status: u16,
    pub message: String,
}

impl TransportError {
    /// Status reported when no HTTP status line was ever received.
    pub const NO_STATUS: u16 = 0;

    pub fn new(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: Self::NO_STATUS,
            message: message.into(),
        }
    }
}

/// Errors returned by [`FetchClient`].
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("malformed JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),
}

impl FetchError {
    /// Concrete status for this failure; transport and codec failures report
    /// [`TransportError::NO_STATUS`].
    pub fn status(&self) -> u16 {
        match self {
            Self::Transport(err) => err.status,
            Self::Decode { .. } | Self::Encode(_) => TransportError::NO_STATUS,
        }
    }
}

/// Decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body<T> {
    Json(T),
    Text(String),
}

/// Status plus, when available, a decoded body.
#[derive(Debug, Clone, PartialEq)]
pub struct Response<T> {
    pub status: u16,
    pub body: Option<Body<T>>,
}

impl<T> Response<T> {
    pub fn status_only(status: u16) -> Self {
        Self { status, body: None }
    }

    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    /// The JSON body, if the response carried one.
    pub fn into_json(self) -> Option<T> {
        match self.body {
            Some(Body::Json(value)) => Some(value),
            _ => None,
        }
    }
}

/// Synchronous request/response primitive.
pub trait Transport: Send + Sync {
    fn send(&self, request: &Request) -> Result<RawResponse, TransportError>;
}

/// [`Transport`] backed by a blocking `ureq` agent.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(config: &HttpConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(config.connect_timeout_secs))
            .timeout_read(Duration::from_secs(config.read_timeout_secs))
            .timeout_write(Duration::from_secs(config.write_timeout_secs))
            .user_agent(&config.user_agent)
            .build();
        Self { agent }
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &Request) -> Result<RawResponse, TransportError> {
        let mut call = self.agent.request(request.method.as_str(), &request.url);
        for (name, value) in &request.headers {
            call = call.set(name, value);
        }

        let outcome = match &request.body {
            Some(body) => call.send_bytes(body),
            None => call.call(),
        };

        // ureq reports >= 400 as an error; the client wants the response.
        let response = match outcome {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(transport)) => {
                return Err(TransportError::new(&request.url, transport.to_string()));
            }
        };

        let status = response.status();
        let content_type = response.header("content-type").map(str::to_string);
        let mut body = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|err| TransportError::new(&request.url, format!("reading body: {err}")))?;

        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Generic GET/POST client shared by the source adapters and the store.
#[derive(Clone)]
pub struct FetchClient {
    transport: Arc<dyn Transport>,
    logger: Logger,
}

impl FetchClient {
    pub fn new(transport: Arc<dyn Transport>, logger: Logger) -> Self {
        Self { transport, logger }
    }

    /// GET `url`, decoding a JSON body into `T`.
    pub fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<Response<T>, FetchError> {
        self.execute(Request {
            method: Method::Get,
            url: url.to_string(),
            headers: options.headers.clone(),
            body: None,
        })
    }

    /// POST `body` JSON-encoded to `url`, decoding a JSON reply into `T`.
    pub fn post<B, T>(
        &self,
        url: &str,
        body: &B,
        options: &RequestOptions,
    ) -> Result<Response<T>, FetchError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let encoded = serde_json::to_vec(body).map_err(FetchError::Encode)?;
        let mut headers = Vec::with_capacity(options.headers.len() + 1);
        headers.push(("Content-Type".to_string(), JSON_MEDIA_MARKER.to_string()));
        headers.extend(options.headers.iter().cloned());
        self.execute(Request {
            method: Method::Post,
            url: url.to_string(),
            headers,
            body: Some(encoded),
        })
    }

    fn execute<T: DeserializeOwned>(&self, request: Request) -> Result<Response<T>, FetchError> {
        self.logger
            .debug(format_args!("{} {}", request.method, request.url));
        let raw = self.transport.send(&request).inspect_err(|err| {
            self.logger.warn(format_args!("{err}"));
        })?;
        self.logger.debug(format_args!(
            "{} {} -> {}",
            request.method, request.url, raw.status
        ));
        decode(&self.logger, &request.url, raw)
    }
}

/// Apply the content-type decoding policy to a raw response.
pub fn decode<T: DeserializeOwned>(
    logger: &Logger,
    url: &str,
    raw: RawResponse,
) -> Result<Response<T>, FetchError> {
    if raw.status > 299 {
        logger.warn(format_args!(
            "{url} answered {}: {}",
            raw.status,
            String::from_utf8_lossy(&raw.body)
        ));
        return Ok(Response::status_only(raw.status));
    }
    if raw.body.is_empty() {
        return Ok(Response::status_only(raw.status));
    }

    let content_type = raw.content_type.as_deref().unwrap_or_default();
    let body = if content_type.contains(JSON_MEDIA_MARKER) {
        let value = serde_json::from_slice(&raw.body).map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })?;
        Some(Body::Json(value))
    } else if content_type.contains(TEXT_MEDIA_MARKER) {
        Some(Body::Text(String::from_utf8_lossy(&raw.body).into_owned()))
    } else {
        logger.warn(format_args!(
            "unsupported content type {content_type:?} from {url}, not decoding"
        ));
        None
    };

    Ok(Response {
        status: raw.status,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CannedTransport, json_response, raw_response};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Reading {
        value: u32,
    }

    fn client(transport: CannedTransport) -> (FetchClient, Arc<CannedTransport>) {
        let transport = Arc::new(transport);
        let client = FetchClient::new(transport.clone(), Logger::new("test"));
        (client, transport)
    }

    fn serving(path: &str, response: RawResponse) -> (FetchClient, Arc<CannedTransport>) {
        client(CannedTransport::new().route(path, response))
    }

    fn get(client: &FetchClient, url: &str) -> Response<Reading> {
        client.get(url, &RequestOptions::new()).unwrap()
    }

    // -----------------------------------------------------------------------
    // Decoding policy
    // -----------------------------------------------------------------------

    #[test]
    fn test_get_decodes_json() {
        let (client, _) = serving("/reading", json_response(200, json!({"value": 42})));
        let response = get(&client, "http://up/reading");
        assert_eq!(response.status, 200);
        assert_eq!(response.into_json(), Some(Reading { value: 42 }));
    }

    #[test]
    fn test_json_marker_with_charset() {
        let (client, _) = serving(
            "/reading",
            raw_response(200, "application/json; charset=utf-8", br#"{"value": 1}"#),
        );
        let response = get(&client, "http://up/reading");
        assert_eq!(response.body, Some(Body::Json(Reading { value: 1 })));
    }

    #[test]
    fn test_plain_text_passthrough() {
        let (client, _) = serving("/ping", raw_response(200, "text/plain", b"pong"));
        let response = get(&client, "http://up/ping");
        assert_eq!(response.body, Some(Body::Text("pong".into())));
        assert_eq!(response.into_json(), None);
    }

    #[test]
    fn test_unknown_content_type_leaves_body_absent() {
        let (client, _) = serving("/blob", raw_response(200, "image/png", &[0x89, 0x50]));
        let response = get(&client, "http://up/blob");
        assert_eq!(response.status, 200);
        assert!(response.body.is_none());
    }

    #[test]
    fn test_error_status_carries_only_status() {
        let (client, _) = serving("/reading", json_response(503, json!({"value": 9})));
        let response = get(&client, "http://up/reading");
        assert_eq!(response.status, 503);
        assert!(response.body.is_none());
        assert!(!response.is_success());
    }

    #[test]
    fn test_status_299_still_decodes() {
        let (client, _) = serving("/reading", json_response(299, json!({"value": 3})));
        let response = get(&client, "http://up/reading");
        assert_eq!(response.into_json(), Some(Reading { value: 3 }));
    }

    #[test]
    fn test_empty_body_is_status_only() {
        let (client, _) = serving("/empty", raw_response(204, "application/json", b""));
        let response = get(&client, "http://up/empty");
        assert_eq!(response, Response::status_only(204));
    }

    #[test]
    fn test_malformed_json_is_decode_error() {
        let (client, _) = serving(
            "/reading",
            raw_response(200, "application/json", b"{\"value\": "),
        );
        let err = client
            .get::<Reading>("http://up/reading", &RequestOptions::new())
            .unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
        assert_eq!(err.status(), TransportError::NO_STATUS);
    }

    #[test]
    fn test_transport_failure_has_no_status_sentinel() {
        let (client, _) = client(CannedTransport::new());
        let err = client
            .get::<Reading>("http://unreachable/reading", &RequestOptions::new())
            .unwrap_err();
        match err {
            FetchError::Transport(inner) => {
                assert_eq!(inner.status, TransportError::NO_STATUS);
                assert_eq!(inner.url, "http://unreachable/reading");
            }
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    // -----------------------------------------------------------------------
    // Request shaping
    // -----------------------------------------------------------------------

    #[test]
    fn test_get_forwards_headers() {
        let (client, transport) = serving("/reading", json_response(200, json!({"value": 1})));
        let options = RequestOptions::new().header("auth-token", "secret");
        let _ = client.get::<Reading>("http://up/reading", &options).unwrap();
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::Get);
        assert_eq!(requests[0].header("AUTH-TOKEN"), Some("secret"));
        assert!(requests[0].body.is_none());
    }

    #[test]
    fn test_post_json_encodes_body() {
        let (client, transport) = serving("/bulk", json_response(201, json!({"value": 0})));
        let body = json!({"docs": [1, 2]});
        let response: Response<Reading> = client
            .post("http://up/bulk", &body, &RequestOptions::new())
            .unwrap();
        assert_eq!(response.status, 201);

        let requests = transport.requests();
        assert_eq!(requests[0].method, Method::Post);
        assert_eq!(requests[0].header("content-type"), Some(JSON_MEDIA_MARKER));
        let sent = requests[0].body.as_deref().unwrap();
        let sent: serde_json::Value = serde_json::from_slice(sent).unwrap();
        assert_eq!(sent, body);
    }

    #[test]
    fn test_request_options_builder() {
        let options = RequestOptions::new().header("a", "1").header("b", "2");
        assert_eq!(options.headers.len(), 2);
        assert_eq!(options.headers[1], ("b".to_string(), "2".to_string()));
    }

    #[test]
    fn test_method_display() {
        assert_eq!(Method::Get.to_string(), "GET");
        assert_eq!(Method::Post.as_str(), "POST");
    }
}
