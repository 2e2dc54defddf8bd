//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via a trait so the app can plug in
//! whatever network stack it already uses. Bodies are JSON; every resource
//! exposes the same two endpoints:
//!
//! - `POST <base>/<resource>/sync` with `{"<resource>": [...]}`
//! - `GET <base>/<resource>/sync?limit=N[&process_token=T]` with a
//!   form-encoded query, answered with
//!   `{"<resource>": [...], "process_token": "..."}`

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use clinic_sync_protocol::{DataPullResponse, DataPushResponse};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::marker::PhantomData;
use url::Url;

/// A raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implementations attach authentication headers and map connection
/// failures to [`SyncError::Io`], [`SyncError::Timeout`] or
/// [`SyncError::Tls`] so they classify as network errors.
pub trait HttpClient: Send + Sync {
    /// Sends a POST request with a JSON body.
    fn post(&self, url: &str, body: Vec<u8>) -> SyncResult<HttpResponse>;

    /// Sends a GET request.
    fn get(&self, url: &str) -> SyncResult<HttpResponse>;
}

/// JSON-over-HTTP transport for one resource.
pub struct HttpTransport<C: HttpClient, T, P> {
    /// Base URL of the sync API (e.g., "https://api.example.com/api/v3").
    base_url: String,
    resource: String,
    client: C,
    last_error: RwLock<Option<String>>,
    _records: PhantomData<fn(&T) -> P>,
}

impl<C: HttpClient, T, P> HttpTransport<C, T, P> {
    /// Creates a transport for `resource` (e.g. "patients").
    pub fn new(base_url: impl Into<String>, resource: impl Into<String>, client: C) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            resource: resource.into(),
            client,
            last_error: RwLock::new(None),
            _records: PhantomData,
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the resource name.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn endpoint(&self) -> String {
        format!("{}/{}/sync", self.base_url, self.resource)
    }

    fn pull_url(&self, process_token: Option<&str>, limit: u32) -> SyncResult<String> {
        let mut url = Url::parse(&self.endpoint())?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &limit.to_string());
            if let Some(token) = process_token {
                query.append_pair("process_token", token);
            }
        }
        Ok(url.into())
    }

    fn check(&self, result: SyncResult<HttpResponse>) -> SyncResult<HttpResponse> {
        self.remember(result.and_then(|response| {
            if response.is_success() {
                Ok(response)
            } else {
                let message = String::from_utf8_lossy(&response.body).into_owned();
                Err(SyncError::http(response.status, message))
            }
        }))
    }

    /// Records the outcome of the latest exchange.
    fn remember<V>(&self, outcome: SyncResult<V>) -> SyncResult<V> {
        match &outcome {
            Ok(_) => *self.last_error.write() = None,
            Err(e) => *self.last_error.write() = Some(e.to_string()),
        }
        outcome
    }

    fn encode_push(&self, records: &[T]) -> SyncResult<Vec<u8>>
    where
        T: Serialize,
    {
        let mut body = Map::new();
        body.insert(self.resource.clone(), serde_json::to_value(records)?);
        Ok(serde_json::to_vec(&Value::Object(body))?)
    }

    fn decode_pull(&self, body: &[u8]) -> SyncResult<DataPullResponse<P>>
    where
        P: DeserializeOwned,
    {
        let mut object = match serde_json::from_slice::<Value>(body)? {
            Value::Object(object) => object,
            _ => return Err(SyncError::Codec("pull response is not an object".into())),
        };

        let payloads = match object.remove(&self.resource) {
            Some(records) => serde_json::from_value(records)?,
            None => {
                return Err(SyncError::Codec(format!(
                    "pull response has no \"{}\" field",
                    self.resource
                )))
            }
        };
        let process_token = match object.remove("process_token") {
            Some(Value::String(token)) => token,
            _ => {
                return Err(SyncError::Codec(
                    "pull response has no process_token".into(),
                ))
            }
        };

        Ok(DataPullResponse::new(payloads, process_token))
    }
}

impl<C, T, P> SyncTransport<T, P> for HttpTransport<C, T, P>
where
    C: HttpClient,
    T: Serialize,
    P: DeserializeOwned,
{
    fn push(&self, records: &[T]) -> SyncResult<DataPushResponse> {
        let body = self.encode_push(records)?;
        let response = self.check(self.client.post(&self.endpoint(), body))?;
        if response.body.is_empty() {
            return Ok(DataPushResponse::accepted());
        }
        self.remember(serde_json::from_slice(&response.body).map_err(SyncError::from))
    }

    fn pull(&self, process_token: Option<&str>, limit: u32) -> SyncResult<DataPullResponse<P>> {
        let request = self
            .pull_url(process_token, limit)
            .and_then(|url| self.client.get(&url));
        let response = self.check(request)?;
        self.remember(self.decode_pull(&response.body))
    }
}
