//! HTTP client fetching JSON snapshots from the source app.

use expvar_bridge::Snapshot;
use http_body_util::{BodyExt as _, Empty};
use hyper::{body::Bytes, header, Method, Request, StatusCode, Uri};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use std::{error, fmt};

/// Error fetching a snapshot from the source app.
#[derive(Debug)]
#[non_exhaustive]
pub enum FetchError {
    /// Error sending the request or receiving response headers (e.g., the connection was refused).
    Request(hyper_util::client::legacy::Error),
    /// Error reading the response body.
    Body(hyper::Error),
    /// Source app responded with a non-successful status.
    Status(StatusCode),
    /// Response body is not a JSON object.
    Json(serde_json::Error),
}

impl fmt::Display for FetchError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request(err) => write!(formatter, "failed sending request: {err}"),
            Self::Body(err) => write!(formatter, "failed reading response body: {err}"),
            Self::Status(status) => write!(formatter, "unexpected response status: {status}"),
            Self::Json(err) => write!(formatter, "failed parsing JSON snapshot: {err}"),
        }
    }
}

impl error::Error for FetchError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Request(err) => Some(err),
            Self::Body(err) => Some(err),
            Self::Status(_) => None,
            Self::Json(err) => Some(err),
        }
    }
}

/// Client fetching snapshots from a fixed URI.
#[derive(Debug, Clone)]
pub(crate) struct SourceClient {
    uri: Uri,
    client: Client<HttpConnector, Empty<Bytes>>,
}

impl SourceClient {
    pub(crate) fn new(uri: Uri) -> Self {
        Self {
            uri,
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    pub(crate) fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Fetches a single snapshot. No retries are performed.
    pub(crate) async fn fetch(&self) -> Result<Snapshot, FetchError> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(self.uri.clone())
            .header(header::ACCEPT, "application/json")
            .body(Empty::new())
            .expect("Failed creating snapshot request");
        let response = self
            .client
            .request(request)
            .await
            .map_err(FetchError::Request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(FetchError::Body)?
            .to_bytes();
        serde_json::from_slice(&body).map_err(FetchError::Json)
    }
}
