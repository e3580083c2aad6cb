//! Shared doubles for unit tests.

use std::sync::Mutex;

use crate::fetch::{JSON_MEDIA_MARKER, RawResponse, Request, Transport, TransportError};

/// Transport answering from a fixed routing table and recording every request.
///
/// A route matches when its fragment is contained in the request URL; the
/// first match wins. Unrouted URLs fail like an unreachable host.
#[derive(Default)]
pub struct CannedTransport {
    routes: Vec<(String, Result<RawResponse, TransportError>)>,
    requests: Mutex<Vec<Request>>,
}

impl CannedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, fragment: &str, response: RawResponse) -> Self {
        self.routes.push((fragment.to_string(), Ok(response)));
        self
    }

    pub fn unreachable(mut self, fragment: &str) -> Self {
        self.routes.push((
            fragment.to_string(),
            Err(TransportError::new(fragment, "connection refused")),
        ));
        self
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for CannedTransport {
    fn send(&self, request: &Request) -> Result<RawResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        match self
            .routes
            .iter()
            .find(|(fragment, _)| request.url.contains(fragment.as_str()))
        {
            Some((_, Ok(response))) => Ok(response.clone()),
            Some((_, Err(err))) => Err(TransportError::new(&request.url, err.message.clone())),
            None => Err(TransportError::new(&request.url, "no route to host")),
        }
    }
}

pub fn json_response(status: u16, body: serde_json::Value) -> RawResponse {
    RawResponse {
        status,
        content_type: Some(JSON_MEDIA_MARKER.to_string()),
        body: serde_json::to_vec(&body).unwrap(),
    }
}

pub fn raw_response(status: u16, content_type: &str, body: &[u8]) -> RawResponse {
    RawResponse {
        status,
        content_type: Some(content_type.to_string()),
        body: body.to_vec(),
    }
}
